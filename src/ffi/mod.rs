//! Raw ABI surface of an ASIP extension module.
//!
//! The host does not implement any instruction semantics itself. An
//! externally built shared module named [`MODULE_NAME`] exports four
//! C-callable entry points, and this module spells out their exact
//! signatures so the binder can cast resolved addresses to them.
//!
//! # Calling Convention
//!
//! Every entry point returns a C `int` status. Zero means success and the
//! output parameter is valid. Any other value means failure: the callee
//! stores a `malloc`-allocated, NUL-terminated diagnostic in the error
//! out-parameter and the caller must release it. Output parameters are
//! unspecified on failure and must not be read.
//!
//! # Memory Management
//! - Strings written through `*mut *mut c_char` out-parameters are owned
//!   by the caller once the call returns.
//! - They are returned to the allocator through a [`ReleaseFn`], which is
//!   the C library's `free` unless overridden for testing.
//! - Operand slices are borrowed for the duration of a call only.

use std::ffi::{c_char, c_int, c_void};

/// File name of the extension module.
///
/// Resolved through the platform's dynamic library search path unless the
/// deployment configures a directory for it.
pub const MODULE_NAME: &str = "libopenasip.so";

/// Decode an opcode into its textual form.
pub const UNPACK_INSTRUCTION: &str = "unpackInstruction";

/// Execute one operation over 32-bit operands.
pub const EXECUTE_INSTRUCTION_32: &str = "executeInstruction32";

/// Execute one operation over 64-bit operands.
pub const EXECUTE_INSTRUCTION_64: &str = "executeInstruction64";

/// Load a machine description.
pub const INITIALIZE_MACHINE: &str = "initializeMachine";

/// Every symbol the module must export, in resolution order.
pub const REQUIRED_SYMBOLS: [&str; 4] = [
    UNPACK_INSTRUCTION,
    EXECUTE_INSTRUCTION_32,
    EXECUTE_INSTRUCTION_64,
    INITIALIZE_MACHINE,
];

/// `int unpackInstruction(uint32_t opcode, char **output, char **error)`
pub type UnpackInstructionFn =
    unsafe extern "C" fn(opcode: u32, output: *mut *mut c_char, error: *mut *mut c_char) -> c_int;

/// `int executeInstruction32(const char *op, const uint32_t *inputs,
/// uint32_t count, uint32_t *output, char **error)`
pub type ExecuteInstruction32Fn = unsafe extern "C" fn(
    op_name: *const c_char,
    inputs: *const u32,
    inputs_count: u32,
    output: *mut u32,
    error: *mut *mut c_char,
) -> c_int;

/// `int executeInstruction64(const char *op, const uint64_t *inputs,
/// uint64_t count, uint64_t *output, char **error)`
pub type ExecuteInstruction64Fn = unsafe extern "C" fn(
    op_name: *const c_char,
    inputs: *const u64,
    inputs_count: u64,
    output: *mut u64,
    error: *mut *mut c_char,
) -> c_int;

/// `int initializeMachine(const char *machine_path, char **error)`
pub type InitializeMachineFn =
    unsafe extern "C" fn(machine_path: *const c_char, error: *mut *mut c_char) -> c_int;

/// Returns a callee-allocated string to its allocator.
pub type ReleaseFn = unsafe extern "C" fn(ptr: *mut c_void);

/// Release function matching the module's `malloc`.
pub fn default_release() -> ReleaseFn {
    libc::free
}

/// Status code a successful entry point returns.
pub const STATUS_OK: c_int = 0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_symbols_order() {
        assert_eq!(
            REQUIRED_SYMBOLS,
            [
                "unpackInstruction",
                "executeInstruction32",
                "executeInstruction64",
                "initializeMachine",
            ]
        );
    }

    #[test]
    fn test_module_name() {
        assert_eq!(MODULE_NAME, "libopenasip.so");
    }
}
