//! Call contracts: widths, status/output coupling and diagnostic ownership.

use std::ffi::{c_char, c_int, c_void};

use asip_bridge::ffi::UnpackInstructionFn;
use asip_bridge::testing::{self, TestModule};
use asip_bridge::{AsipBackend, CallError, EntryPoint};

#[test]
fn test_unpack_always_failing() {
    let entry_points = TestModule::failing().entry_points().unwrap();

    let err = entry_points.unpack_instruction(0xDEAD_BEEF).unwrap_err();

    assert_eq!(err.entry(), EntryPoint::UnpackInstruction);
    assert_ne!(err.status(), Some(0));
    let message = err.message().expect("failing call carries a diagnostic");
    assert!(!message.is_empty());
    assert_eq!(message.to_str().unwrap(), "cannot decode 0xdeadbeef");
}

#[test]
fn test_unpack_decodes() {
    let entry_points = TestModule::complete().entry_points().unwrap();
    assert_eq!(
        entry_points.unpack_instruction(0x0304_0506).unwrap(),
        "mul r4, r5, r6"
    );
}

#[test]
fn test_execute32_wraps_at_32_bits() {
    let entry_points = TestModule::complete().entry_points().unwrap();

    let sum: u32 = entry_points
        .execute_instruction32("add", &[u32::MAX, 2])
        .unwrap();
    assert_eq!(sum, 1);
}

#[test]
fn test_execute64_keeps_64_bits() {
    let entry_points = TestModule::complete().entry_points().unwrap();

    let sum: u64 = entry_points
        .execute_instruction64("add", &[u64::from(u32::MAX), 2])
        .unwrap();
    assert_eq!(sum, 0x1_0000_0001);

    let product = entry_points
        .execute_instruction64("mul", &[0x1_0000_0000, 3])
        .unwrap();
    assert_eq!(product, 0x3_0000_0000);
}

#[test]
fn test_status_and_output_coupling() {
    let entry_points = TestModule::complete().entry_points().unwrap();

    let ok = entry_points.execute_instruction32("sub", &[10, 4]);
    assert_eq!(ok.unwrap(), 6);

    let err = entry_points.execute_instruction32("div", &[10, 4]).unwrap_err();
    assert!(matches!(
        err,
        CallError::Failed { entry: EntryPoint::ExecuteInstruction32, status: 1, .. }
    ));
    assert_eq!(
        err.message().unwrap().to_str().unwrap(),
        "unknown operation 'div'"
    );

    let err = entry_points.execute_instruction64("add", &[]).unwrap_err();
    assert_eq!(err.status(), Some(1));
}

#[test]
fn test_initialize_machine_failure() {
    let entry_points = TestModule::complete().entry_points().unwrap();
    let err = entry_points.initialize_machine("").unwrap_err();
    assert_eq!(err.entry(), EntryPoint::InitializeMachine);
    assert_eq!(
        err.to_string(),
        "initializeMachine failed with status 1: empty machine description path"
    );
}

#[test]
fn test_diagnostic_released_exactly_once() {
    let entry_points = TestModule::failing().entry_points().unwrap();

    let err = entry_points.execute_instruction64("add", &[1, 2]).unwrap_err();
    let addr = err.message().unwrap().addr();

    // Still readable while the error is held.
    assert!(testing::is_live(addr));
    assert_eq!(
        err.message().unwrap().to_str().unwrap(),
        "executeInstruction64 unavailable"
    );

    err.release();
    assert!(!testing::is_live(addr));
    assert_eq!(testing::release_count(addr), 1);
}

#[test]
fn test_error_dropped_on_another_thread() {
    let entry_points = TestModule::failing().entry_points().unwrap();
    let err = entry_points.unpack_instruction(0x0100_0000).unwrap_err();
    let addr = err.message().unwrap().addr();

    std::thread::spawn(move || drop(err)).join().unwrap();

    assert!(!testing::is_live(addr));
    assert_eq!(testing::release_count(addr), 1);
}

#[test]
fn test_dropped_error_releases_diagnostic() {
    let entry_points = TestModule::failing().entry_points().unwrap();
    let addr = {
        let err = entry_points.initialize_machine("m.adf").unwrap_err();
        err.message().unwrap().addr()
    };
    assert!(!testing::is_live(addr));
}

unsafe extern "C" fn unpack_without_output(
    _opcode: u32,
    _output: *mut *mut c_char,
    _error: *mut *mut c_char,
) -> c_int {
    0
}

#[test]
fn test_success_without_output_is_reported() {
    let module = unsafe {
        TestModule::complete().with_symbol(
            "unpackInstruction",
            unpack_without_output as UnpackInstructionFn as *mut c_void,
        )
    };
    let entry_points = module.entry_points().unwrap();

    let err = entry_points.unpack_instruction(0x0100_0000).unwrap_err();
    assert!(matches!(
        err,
        CallError::MissingOutput { entry: EntryPoint::UnpackInstruction }
    ));
}
