//! Binding scenarios against the in-process test module.

use asip_bridge::ffi::REQUIRED_SYMBOLS;
use asip_bridge::testing::TestModule;
use asip_bridge::{AsipBackend, BindError, BindingSlot, EntryPoints};

#[test]
fn test_complete_module_binds_and_initializes() {
    let entry_points = TestModule::complete()
        .entry_points()
        .expect("all four symbols are exported");

    assert!(entry_points.initialize_machine("valid/path").is_ok());
}

#[test]
fn test_missing_execute64_is_named() {
    let err = TestModule::complete()
        .without("executeInstruction64")
        .entry_points()
        .unwrap_err();

    assert_eq!(err.missing_symbol(), Some("executeInstruction64"));
    assert!(err.to_string().starts_with("missing symbol: executeInstruction64"));
}

#[test]
fn test_every_missing_subset_fails_binding() {
    // Each bit of `mask` removes one required symbol.
    for mask in 1u32..(1 << REQUIRED_SYMBOLS.len()) {
        let mut module = TestModule::complete();
        for (bit, name) in REQUIRED_SYMBOLS.iter().enumerate() {
            if mask & (1 << bit) != 0 {
                module = module.without(name);
            }
        }

        let first_missing = REQUIRED_SYMBOLS[mask.trailing_zeros() as usize];
        match module.entry_points() {
            Err(BindError::MissingSymbol { symbol, .. }) => {
                assert_eq!(symbol, first_missing, "mask {:04b}", mask);
            }
            Err(other) => panic!("mask {:04b}: unexpected error {:?}", mask, other),
            Ok(_) => panic!("mask {:04b}: binding succeeded with missing symbols", mask),
        }
    }
}

#[test]
fn test_null_symbol_counts_as_missing() {
    let module =
        unsafe { TestModule::complete().with_symbol("initializeMachine", std::ptr::null_mut()) };
    let err = module.entry_points().unwrap_err();
    assert_eq!(err.missing_symbol(), Some("initializeMachine"));
}

#[test]
fn test_binding_slot_is_idempotent() {
    let slot: BindingSlot<EntryPoints> = BindingSlot::new();

    let first: *const EntryPoints = slot.get_or_bind(|| TestModule::complete().entry_points());
    let second: *const EntryPoints = slot.get_or_bind(|| {
        panic!("binder must not run twice");
    });

    assert_eq!(first, second);
    assert_eq!(slot.attempts(), 1);
}

#[test]
fn test_backend_is_injectable() {
    fn decode_all(backend: &dyn AsipBackend, opcodes: &[u32]) -> Vec<String> {
        opcodes
            .iter()
            .map(|&op| backend.unpack_instruction(op).unwrap_or_else(|e| e.to_string()))
            .collect()
    }

    let entry_points = TestModule::complete().entry_points().unwrap();
    let decoded = decode_all(&entry_points, &[0x0201_0203, 0xFF00_0000]);

    assert_eq!(decoded[0], "sub r1, r2, r3");
    assert_eq!(
        decoded[1],
        "unpackInstruction failed with status 1: unknown opcode 0xff000000"
    );
}
