//! Symbol table and entry points of the test double.

use std::collections::HashMap;
use std::ffi::{c_char, c_int, c_void, CStr};
use std::ptr::NonNull;
use std::slice;
use std::sync::{Mutex, MutexGuard, OnceLock};

use crate::binder::{BindError, EntryPoints, SymbolSource};
use crate::ffi::{
    self, ExecuteInstruction32Fn, ExecuteInstruction64Fn, InitializeMachineFn,
    UnpackInstructionFn, STATUS_OK,
};

const STATUS_FAIL: c_int = 1;

/// Release count per string handed out; zero while the string is live.
static RELEASES: OnceLock<Mutex<HashMap<usize, usize>>> = OnceLock::new();

fn releases() -> MutexGuard<'static, HashMap<usize, usize>> {
    RELEASES
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Copy `text` into a tracked `malloc` buffer.
pub fn alloc_string(text: &str) -> *mut c_char {
    let bytes = text.as_bytes();
    // SAFETY: the buffer is sized for the bytes plus the terminator.
    let buf = unsafe {
        let buf = libc::malloc(bytes.len() + 1) as *mut c_char;
        if buf.is_null() {
            return buf;
        }
        std::ptr::copy_nonoverlapping(bytes.as_ptr().cast::<c_char>(), buf, bytes.len());
        *buf.add(bytes.len()) = 0;
        buf
    };
    releases().insert(buf as usize, 0);
    buf
}

/// Release function for strings from [`alloc_string`].
///
/// Safe to call from any thread. Released buffers are kept allocated so
/// their addresses are never reused, which keeps [`is_live`] and
/// [`release_count`] exact; a second release is counted, not freed.
///
/// # Safety
/// `ptr` must come from [`alloc_string`].
pub unsafe extern "C" fn tracked_release(ptr: *mut c_void) {
    if let Some(count) = releases().get_mut(&(ptr as usize)) {
        *count += 1;
    }
}

/// Whether the string at `addr` is still owned by someone.
pub fn is_live(addr: usize) -> bool {
    releases().get(&addr) == Some(&0)
}

/// How many times the string at `addr` has been released.
pub fn release_count(addr: usize) -> usize {
    releases().get(&addr).copied().unwrap_or(0)
}

/// Symbol table standing in for a loaded module.
#[derive(Debug, Clone)]
pub struct TestModule {
    symbols: HashMap<&'static str, *mut c_void>,
}

impl TestModule {
    /// Module exporting all four entry points with working semantics.
    ///
    /// Opcodes decode as `op rD, rA, rB` with the operation in the top byte
    /// (`0x01` add, `0x02` sub, `0x03` mul). Execution folds the operands
    /// with wrapping arithmetic. Any non-empty machine path initializes.
    pub fn complete() -> Self {
        Self::from_entries(
            unpack_ok as UnpackInstructionFn,
            execute32_ok as ExecuteInstruction32Fn,
            execute64_ok as ExecuteInstruction64Fn,
            initialize_ok as InitializeMachineFn,
        )
    }

    /// Module whose entry points all fail with a diagnostic.
    pub fn failing() -> Self {
        Self::from_entries(
            unpack_fail as UnpackInstructionFn,
            execute32_fail as ExecuteInstruction32Fn,
            execute64_fail as ExecuteInstruction64Fn,
            initialize_fail as InitializeMachineFn,
        )
    }

    fn from_entries(
        unpack: UnpackInstructionFn,
        execute32: ExecuteInstruction32Fn,
        execute64: ExecuteInstruction64Fn,
        initialize: InitializeMachineFn,
    ) -> Self {
        let mut symbols = HashMap::new();
        symbols.insert(ffi::UNPACK_INSTRUCTION, unpack as *mut c_void);
        symbols.insert(ffi::EXECUTE_INSTRUCTION_32, execute32 as *mut c_void);
        symbols.insert(ffi::EXECUTE_INSTRUCTION_64, execute64 as *mut c_void);
        symbols.insert(ffi::INITIALIZE_MACHINE, initialize as *mut c_void);
        Self { symbols }
    }

    /// Stop exporting `name`.
    pub fn without(mut self, name: &str) -> Self {
        self.symbols.remove(name);
        self
    }

    /// Export `address` under `name`.
    ///
    /// # Safety
    /// `address` must be null or a function with the signature `ffi`
    /// documents for `name`.
    ///
    /// ```compile_fail
    /// use asip_bridge::testing::TestModule;
    ///
    /// let module = TestModule::complete()
    ///     .with_symbol("unpackInstruction", 0x10 as *mut std::ffi::c_void);
    /// ```
    pub unsafe fn with_symbol(mut self, name: &'static str, address: *mut c_void) -> Self {
        self.symbols.insert(name, address);
        self
    }

    /// Bind this module, releasing strings through [`tracked_release`].
    pub fn entry_points(&self) -> Result<EntryPoints, BindError> {
        // SAFETY: every string the double hands out comes from alloc_string.
        EntryPoints::resolve(self)
            .map(|entry_points| unsafe { entry_points.with_release(tracked_release) })
    }
}

// SAFETY: the built-in symbols are functions compiled into this crate with
// the `ffi` signatures; `with_symbol` callers vouch for anything else.
unsafe impl SymbolSource for TestModule {
    fn lookup(&self, name: &'static str) -> Result<NonNull<c_void>, BindError> {
        self.symbols
            .get(name)
            .and_then(|&address| NonNull::new(address))
            .ok_or_else(|| BindError::MissingSymbol {
                symbol: name,
                reason: "not exported by test module".to_string(),
            })
    }
}

fn decode(opcode: u32) -> Result<String, String> {
    let op = match opcode >> 24 {
        0x01 => "add",
        0x02 => "sub",
        0x03 => "mul",
        _ => return Err(format!("unknown opcode 0x{:08x}", opcode)),
    };
    Ok(format!(
        "{} r{}, r{}, r{}",
        op,
        (opcode >> 16) & 0xFF,
        (opcode >> 8) & 0xFF,
        opcode & 0xFF
    ))
}

// Wrapping arithmetic commutes with truncation, so the 32-bit path folds
// in 64 bits and narrows the result.
fn fold(op: &str, inputs: impl Iterator<Item = u64>) -> Result<u64, String> {
    let combine: fn(u64, u64) -> u64 = match op {
        "add" => u64::wrapping_add,
        "sub" => u64::wrapping_sub,
        "mul" => u64::wrapping_mul,
        _ => return Err(format!("unknown operation '{}'", op)),
    };
    let mut inputs = inputs;
    let first = inputs.next().ok_or_else(|| format!("{} needs at least one operand", op))?;
    Ok(inputs.fold(first, combine))
}

unsafe fn op_name<'a>(ptr: *const c_char) -> Result<&'a str, String> {
    if ptr.is_null() {
        return Err("null operation name".to_string());
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| "operation name is not UTF-8".to_string())
}

unsafe fn operands<'a, T>(ptr: *const T, count: usize) -> &'a [T] {
    if count == 0 {
        &[]
    } else {
        slice::from_raw_parts(ptr, count)
    }
}

unsafe fn report(error: *mut *mut c_char, message: &str) -> c_int {
    *error = alloc_string(message);
    STATUS_FAIL
}

unsafe extern "C" fn unpack_ok(
    opcode: u32,
    output: *mut *mut c_char,
    error: *mut *mut c_char,
) -> c_int {
    match decode(opcode) {
        Ok(text) => {
            *output = alloc_string(&text);
            STATUS_OK
        }
        Err(message) => report(error, &message),
    }
}

unsafe extern "C" fn execute32_ok(
    op_name_ptr: *const c_char,
    inputs: *const u32,
    inputs_count: u32,
    output: *mut u32,
    error: *mut *mut c_char,
) -> c_int {
    let result = op_name(op_name_ptr).and_then(|op| {
        let inputs = operands(inputs, inputs_count as usize);
        fold(op, inputs.iter().map(|&v| u64::from(v)))
    });
    match result {
        Ok(value) => {
            *output = value as u32;
            STATUS_OK
        }
        Err(message) => report(error, &message),
    }
}

unsafe extern "C" fn execute64_ok(
    op_name_ptr: *const c_char,
    inputs: *const u64,
    inputs_count: u64,
    output: *mut u64,
    error: *mut *mut c_char,
) -> c_int {
    let result = op_name(op_name_ptr).and_then(|op| {
        let inputs = operands(inputs, inputs_count as usize);
        fold(op, inputs.iter().copied())
    });
    match result {
        Ok(value) => {
            *output = value;
            STATUS_OK
        }
        Err(message) => report(error, &message),
    }
}

unsafe extern "C" fn initialize_ok(machine_path: *const c_char, error: *mut *mut c_char) -> c_int {
    if machine_path.is_null() || *machine_path == 0 {
        return report(error, "empty machine description path");
    }
    STATUS_OK
}

unsafe extern "C" fn unpack_fail(
    opcode: u32,
    _output: *mut *mut c_char,
    error: *mut *mut c_char,
) -> c_int {
    report(error, &format!("cannot decode 0x{:08x}", opcode))
}

unsafe extern "C" fn execute32_fail(
    _op_name: *const c_char,
    _inputs: *const u32,
    _inputs_count: u32,
    _output: *mut u32,
    error: *mut *mut c_char,
) -> c_int {
    report(error, "executeInstruction32 unavailable")
}

unsafe extern "C" fn execute64_fail(
    _op_name: *const c_char,
    _inputs: *const u64,
    _inputs_count: u64,
    _output: *mut u64,
    error: *mut *mut c_char,
) -> c_int {
    report(error, "executeInstruction64 unavailable")
}

unsafe extern "C" fn initialize_fail(
    _machine_path: *const c_char,
    error: *mut *mut c_char,
) -> c_int {
    report(error, "no machine description support")
}
