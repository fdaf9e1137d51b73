//! Contract tests for interpreter API
//!
//! These tests pin down what the generated interpreter guarantees to the
//! runtime: every slot of every table leads somewhere, entries exist for
//! every method kind and result state, and generation is deterministic.

use bytecode_system::Bytecode;
use core_types::{BasicType, MethodKind, TosState};
use interpreter::{Interpreter, InterpreterConfig, Vm};

fn interpreter() -> Interpreter {
    Interpreter::generate(&InterpreterConfig::default()).unwrap()
}

/// Generating twice from the same configuration yields the same tables.
#[test]
fn test_generation_is_deterministic() {
    let a = interpreter();
    let b = interpreter();
    assert_eq!(a.normal_table(), b.normal_table());
    assert_eq!(a.safept_table(), b.safept_table());
    assert_eq!(a.method_entries(), b.method_entries());
    assert_eq!(a.bounds(), b.bounds());
}

/// Every dispatch slot points at generated code.
#[test]
fn test_every_dispatch_slot_is_populated() {
    let interp = interpreter();
    for tos in TosState::ALL {
        for opcode in 0..=255u8 {
            let normal = interp.normal_table().entry(tos, opcode);
            let safept = interp.safept_table().entry(tos, opcode);
            assert!(interp.contains(normal), "{} {:#x}", tos.name(), opcode);
            assert!(interp.contains(safept), "{} {:#x}", tos.name(), opcode);
        }
    }
}

/// Implemented bytecodes never land on the unimplemented stub; vtos
/// templates accept every cached state.
#[test]
fn test_implemented_bytecodes_have_real_entries() {
    let interp = interpreter();
    for &bc in Bytecode::ALL {
        let vtos = interp.normal_table().entry(TosState::Vtos, bc.as_u8());
        assert_ne!(vtos, interp.unimplemented_bytecode(), "{}", bc.name());
    }
    let nop = Bytecode::Nop.as_u8();
    for tos in TosState::ALL {
        assert_ne!(interp.normal_table().entry(tos, nop), interp.illegal_bytecode_sequence());
    }
}

/// The safepoint table differs from the normal table for implemented
/// bytecodes.
#[test]
fn test_safepoint_table_routes_elsewhere() {
    let interp = interpreter();
    let iadd = Bytecode::Iadd.as_u8();
    assert_ne!(
        interp.normal_table().entry(TosState::Itos, iadd),
        interp.safept_table().entry(TosState::Itos, iadd)
    );
}

/// Return entries exist for both invoke lengths and every result state.
#[test]
fn test_return_entries_cover_every_state() {
    let interp = interpreter();
    for length in [3, 5] {
        for tos in TosState::ALL {
            assert!(interp.contains(interp.return_entry(length, tos)));
        }
    }
    assert_ne!(
        interp.return_entry(3, TosState::Itos),
        interp.return_entry(5, TosState::Itos)
    );
}

/// Every method kind has an entry.
#[test]
fn test_every_method_kind_has_an_entry() {
    let interp = interpreter();
    for kind in MethodKind::ALL {
        assert_ne!(interp.method_entry(kind), 0, "{}", kind);
    }
}

/// Result handlers exist for every native result type.
#[test]
fn test_result_handlers_exist() {
    let interp = interpreter();
    for ty in [
        BasicType::Boolean,
        BasicType::Char,
        BasicType::Byte,
        BasicType::Short,
        BasicType::Int,
        BasicType::Long,
        BasicType::Float,
        BasicType::Double,
        BasicType::Void,
        BasicType::Object,
    ] {
        assert!(interp.contains(interp.result_handler(ty)), "{:?}", ty);
    }
}

/// Exception entries are inside the interpreter; shared stubs are not.
#[test]
fn test_exception_entries_location() {
    let interp = interpreter();
    let ex = interp.exceptions();
    for entry in [
        ex.rethrow_exception,
        ex.throw_exception,
        ex.remove_activation,
        ex.remove_activation_preserving_args,
        ex.throw_stack_overflow_error,
        ex.throw_array_index_out_of_bounds,
        ex.throw_class_cast_exception,
        ex.throw_arithmetic_exception,
        ex.throw_null_pointer_exception,
    ] {
        assert!(interp.contains(entry));
    }
    let stubs = interp.stubs();
    for stub in [
        stubs.forward_exception,
        stubs.throw_stack_overflow_error,
        stubs.throw_abstract_method_error,
        stubs.throw_null_pointer_exception,
    ] {
        assert!(!interp.contains(stub));
        assert!(interp.code().contains(stub));
    }
}

/// A named stub covers each entry.
#[test]
fn test_stub_containing_names_entries() {
    let interp = interpreter();
    let stub = interp
        .stub_containing(interp.stubs().call_stub)
        .expect("call stub is registered");
    assert_eq!(stub.name, "call stub");
}

/// `Vm::new` exposes the generated code and its configuration.
#[test]
fn test_vm_exposes_interpreter() {
    let config = InterpreterConfig::default().with_count_bytecodes(true);
    let vm = Vm::new(config.clone()).unwrap();
    assert_eq!(vm.config(), &config);
    assert_eq!(vm.interpreter().config(), &config);
    assert_eq!(vm.bytecode_count().unwrap(), 0);
}
