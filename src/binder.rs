//! Symbol resolution into a typed entry-point table.
//!
//! [`EntryPoints::resolve`] looks up every name in
//! [`REQUIRED_SYMBOLS`](crate::ffi::REQUIRED_SYMBOLS) and either returns a
//! complete table or the first failure. A partially bound table is never
//! constructed, so no caller can reach an unbound entry point.

use std::ffi::{c_char, c_void, CString};
use std::ptr::{self, NonNull};

use thiserror::Error;

use crate::call::{AsipBackend, CallError, CallResult, EntryPoint};
use crate::ffi::{
    self, ExecuteInstruction32Fn, ExecuteInstruction64Fn, InitializeMachineFn, ReleaseFn,
    UnpackInstructionFn, STATUS_OK,
};
use crate::message::ForeignString;

/// Failure to bring the extension module into the `BOUND` state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BindError {
    /// The module file could not be opened.
    #[error("cannot open {path}: {reason}")]
    Open { path: String, reason: String },

    /// A required entry point is not exported.
    #[error("missing symbol: {symbol} ({reason})")]
    MissingSymbol { symbol: &'static str, reason: String },
}

impl BindError {
    /// Name of the missing symbol, for bind failures.
    pub fn missing_symbol(&self) -> Option<&'static str> {
        match self {
            BindError::MissingSymbol { symbol, .. } => Some(*symbol),
            BindError::Open { .. } => None,
        }
    }
}

/// Anything symbols can be looked up in.
///
/// Implemented by the loaded module and by in-process test doubles.
///
/// # Safety
/// Every address returned for one of [`REQUIRED_SYMBOLS`](crate::ffi::REQUIRED_SYMBOLS)
/// must be a function with the matching signature from [`ffi`](crate::ffi),
/// and must stay mapped for the rest of the process.
///
/// Implementing it requires `unsafe`:
///
/// ```compile_fail
/// use std::ffi::c_void;
/// use std::ptr::NonNull;
/// use asip_bridge::{BindError, SymbolSource};
///
/// struct Anywhere;
///
/// impl SymbolSource for Anywhere {
///     fn lookup(&self, _name: &'static str) -> Result<NonNull<c_void>, BindError> {
///         Ok(NonNull::dangling())
///     }
/// }
/// ```
pub unsafe trait SymbolSource {
    /// Address of the exported symbol `name`.
    fn lookup(&self, name: &'static str) -> Result<NonNull<c_void>, BindError>;
}

/// Fully bound entry points of an extension module.
///
/// The table holds plain function pointers into a module that is never
/// unloaded, so copies of it stay callable for the life of the process.
#[derive(Clone, Copy)]
pub struct EntryPoints {
    unpack: UnpackInstructionFn,
    execute32: ExecuteInstruction32Fn,
    execute64: ExecuteInstruction64Fn,
    initialize: InitializeMachineFn,
    release: ReleaseFn,
}

impl EntryPoints {
    /// Resolve all required symbols from `source`.
    ///
    /// Sound because [`SymbolSource`] implementors vouch for the addresses.
    pub fn resolve<S: SymbolSource + ?Sized>(source: &S) -> Result<Self, BindError> {
        let unpack = source.lookup(ffi::UNPACK_INSTRUCTION)?;
        let execute32 = source.lookup(ffi::EXECUTE_INSTRUCTION_32)?;
        let execute64 = source.lookup(ffi::EXECUTE_INSTRUCTION_64)?;
        let initialize = source.lookup(ffi::INITIALIZE_MACHINE)?;
        log::debug!("resolved {} entry points", ffi::REQUIRED_SYMBOLS.len());

        // SAFETY: SymbolSource guarantees each address is a live function of
        // the matching signature; data and function pointers share a
        // representation on every platform libloading supports.
        unsafe {
            Ok(Self {
                unpack: std::mem::transmute::<*mut c_void, UnpackInstructionFn>(unpack.as_ptr()),
                execute32: std::mem::transmute::<*mut c_void, ExecuteInstruction32Fn>(
                    execute32.as_ptr(),
                ),
                execute64: std::mem::transmute::<*mut c_void, ExecuteInstruction64Fn>(
                    execute64.as_ptr(),
                ),
                initialize: std::mem::transmute::<*mut c_void, InitializeMachineFn>(
                    initialize.as_ptr(),
                ),
                release: ffi::default_release(),
            })
        }
    }

    /// Use `release` instead of `free` for strings returned by the module.
    ///
    /// # Safety
    /// `release` must accept every string the bound entry points hand out,
    /// exactly once each.
    pub unsafe fn with_release(mut self, release: ReleaseFn) -> Self {
        self.release = release;
        self
    }

    /// Adopt an out-parameter string.
    fn adopt(&self, ptr: *mut c_char) -> Option<ForeignString> {
        // SAFETY: the call contract transfers ownership of out-parameter
        // strings to the caller.
        unsafe { ForeignString::adopt(ptr, self.release) }
    }

    /// Drop a diagnostic the module wrote despite reporting success.
    fn discard(&self, error: *mut c_char) {
        drop(self.adopt(error));
    }

    fn failed(&self, entry: EntryPoint, status: i32, error: *mut c_char) -> CallError {
        CallError::Failed {
            entry,
            status,
            message: self.adopt(error),
        }
    }
}

fn c_string(entry: EntryPoint, what: &str, value: &str) -> CallResult<CString> {
    CString::new(value).map_err(|_| CallError::InvalidArgument {
        entry,
        reason: format!("{} contains an interior NUL byte", what),
    })
}

impl AsipBackend for EntryPoints {
    fn unpack_instruction(&self, opcode: u32) -> CallResult<String> {
        let mut output: *mut c_char = ptr::null_mut();
        let mut error: *mut c_char = ptr::null_mut();
        let status = unsafe { (self.unpack)(opcode, &mut output, &mut error) };
        if status != STATUS_OK {
            return Err(self.failed(EntryPoint::UnpackInstruction, status, error));
        }
        self.discard(error);

        match self.adopt(output) {
            Some(text) => Ok(text.to_string_lossy().into_owned()),
            None => Err(CallError::MissingOutput {
                entry: EntryPoint::UnpackInstruction,
            }),
        }
    }

    fn execute_instruction32(&self, op_name: &str, inputs: &[u32]) -> CallResult<u32> {
        let entry = EntryPoint::ExecuteInstruction32;
        let op = c_string(entry, "op name", op_name)?;
        let count = u32::try_from(inputs.len()).map_err(|_| CallError::InvalidArgument {
            entry,
            reason: format!("{} operands exceed the 32-bit count", inputs.len()),
        })?;

        let mut output = 0u32;
        let mut error: *mut c_char = ptr::null_mut();
        let status =
            unsafe { (self.execute32)(op.as_ptr(), inputs.as_ptr(), count, &mut output, &mut error) };
        if status != STATUS_OK {
            return Err(self.failed(entry, status, error));
        }
        self.discard(error);
        Ok(output)
    }

    fn execute_instruction64(&self, op_name: &str, inputs: &[u64]) -> CallResult<u64> {
        let entry = EntryPoint::ExecuteInstruction64;
        let op = c_string(entry, "op name", op_name)?;

        let mut output = 0u64;
        let mut error: *mut c_char = ptr::null_mut();
        let status = unsafe {
            (self.execute64)(
                op.as_ptr(),
                inputs.as_ptr(),
                inputs.len() as u64,
                &mut output,
                &mut error,
            )
        };
        if status != STATUS_OK {
            return Err(self.failed(entry, status, error));
        }
        self.discard(error);
        Ok(output)
    }

    fn initialize_machine(&self, machine_path: &str) -> CallResult<()> {
        let entry = EntryPoint::InitializeMachine;
        let path = c_string(entry, "machine path", machine_path)?;

        let mut error: *mut c_char = ptr::null_mut();
        let status = unsafe { (self.initialize)(path.as_ptr(), &mut error) };
        if status != STATUS_OK {
            return Err(self.failed(entry, status, error));
        }
        self.discard(error);
        Ok(())
    }
}

impl std::fmt::Debug for EntryPoints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryPoints")
            .field("unpackInstruction", &(self.unpack as *const ()))
            .field("executeInstruction32", &(self.execute32 as *const ()))
            .field("executeInstruction64", &(self.execute64 as *const ()))
            .field("initializeMachine", &(self.initialize as *const ()))
            .finish()
    }
}
