//! Typed call contracts for the bound entry points.
//!
//! [`AsipBackend`] is the seam the rest of the host programs against. The
//! loaded module implements it through [`EntryPoints`](crate::binder::EntryPoints),
//! and tests can substitute their own implementation.
//!
//! A failing call never crashes the host: the status code and the module's
//! diagnostic come back as a [`CallError`], and the caller decides how to
//! surface it (typically as an illegal instruction in the emulated machine).

use std::ffi::c_int;
use std::fmt;

use thiserror::Error;

use crate::ffi;
use crate::message::ForeignString;

/// One of the four required entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryPoint {
    UnpackInstruction,
    ExecuteInstruction32,
    ExecuteInstruction64,
    InitializeMachine,
}

impl EntryPoint {
    pub const ALL: [EntryPoint; 4] = [
        EntryPoint::UnpackInstruction,
        EntryPoint::ExecuteInstruction32,
        EntryPoint::ExecuteInstruction64,
        EntryPoint::InitializeMachine,
    ];

    /// Exported symbol name.
    pub fn symbol(self) -> &'static str {
        match self {
            EntryPoint::UnpackInstruction => ffi::UNPACK_INSTRUCTION,
            EntryPoint::ExecuteInstruction32 => ffi::EXECUTE_INSTRUCTION_32,
            EntryPoint::ExecuteInstruction64 => ffi::EXECUTE_INSTRUCTION_64,
            EntryPoint::InitializeMachine => ffi::INITIALIZE_MACHINE,
        }
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Error returned by a call into the extension module.
#[derive(Debug, Error)]
pub enum CallError {
    /// The entry point returned a non-zero status.
    #[error("{entry} failed with status {status}: {}", describe(.message))]
    Failed {
        entry: EntryPoint,
        status: c_int,
        /// Diagnostic written by the module, owned until this error is dropped.
        message: Option<ForeignString>,
    },

    /// The module reported success but left its output unset.
    #[error("{entry} reported success without output")]
    MissingOutput { entry: EntryPoint },

    /// An argument could not be passed across the ABI; the module was not called.
    #[error("invalid argument for {entry}: {reason}")]
    InvalidArgument {
        entry: EntryPoint,
        reason: String,
    },
}

fn describe(message: &Option<ForeignString>) -> String {
    match message {
        Some(msg) => msg.to_string_lossy().into_owned(),
        None => "<no diagnostic>".to_string(),
    }
}

impl CallError {
    pub fn entry(&self) -> EntryPoint {
        match self {
            CallError::Failed { entry, .. }
            | CallError::MissingOutput { entry }
            | CallError::InvalidArgument { entry, .. } => *entry,
        }
    }

    /// Status code reported by the module, if it was called.
    pub fn status(&self) -> Option<c_int> {
        match self {
            CallError::Failed { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Diagnostic text from the module, readable until the error is released.
    pub fn message(&self) -> Option<&ForeignString> {
        match self {
            CallError::Failed { message, .. } => message.as_ref(),
            _ => None,
        }
    }

    /// Release the module's diagnostic now rather than at drop.
    pub fn release(self) {
        drop(self);
    }
}

/// Result of a call into the extension module.
pub type CallResult<T> = Result<T, CallError>;

/// Instruction semantics supplied by an ASIP extension.
///
/// The 32-bit and 64-bit execute paths are separate contracts; an operand
/// vector of one width cannot be passed to the other.
pub trait AsipBackend: Send + Sync {
    /// Decode `opcode` into the module's textual form.
    fn unpack_instruction(&self, opcode: u32) -> CallResult<String>;

    /// Execute `op_name` over 32-bit operands.
    fn execute_instruction32(&self, op_name: &str, inputs: &[u32]) -> CallResult<u32>;

    /// Execute `op_name` over 64-bit operands.
    fn execute_instruction64(&self, op_name: &str, inputs: &[u64]) -> CallResult<u64>;

    /// Load the machine description at `machine_path`.
    ///
    /// The path is passed through untouched and interpreted by the module.
    fn initialize_machine(&self, machine_path: &str) -> CallResult<()>;
}

impl<B: AsipBackend + ?Sized> AsipBackend for &B {
    fn unpack_instruction(&self, opcode: u32) -> CallResult<String> {
        (**self).unpack_instruction(opcode)
    }

    fn execute_instruction32(&self, op_name: &str, inputs: &[u32]) -> CallResult<u32> {
        (**self).execute_instruction32(op_name, inputs)
    }

    fn execute_instruction64(&self, op_name: &str, inputs: &[u64]) -> CallResult<u64> {
        (**self).execute_instruction64(op_name, inputs)
    }

    fn initialize_machine(&self, machine_path: &str) -> CallResult<()> {
        (**self).initialize_machine(machine_path)
    }
}
