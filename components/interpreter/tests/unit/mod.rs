//! Unit tests for interpreter components

use bytecode_system::{Bytecode, ClassDefinition, CodeBuilder, MethodDefinition};
use core_types::{AccessFlags, GuestException, MethodKind, TosState, Value, VmError};
use interpreter::{CallOutcome, ConfigError, InterpreterConfig, TraceRecord, Vm};

fn vm() -> Vm {
    Vm::new(InterpreterConfig::default()).unwrap()
}

fn static_method(name: &str, descriptor: &str, code: &CodeBuilder) -> MethodDefinition {
    MethodDefinition::new(name, descriptor)
        .with_access(AccessFlags::PUBLIC | AccessFlags::STATIC)
        .with_code(code.finish().unwrap())
}

// ============================================================================
// Configuration Tests
// ============================================================================

#[test]
fn test_default_config_is_valid() {
    assert!(InterpreterConfig::default().validate().is_ok());
}

#[test]
fn test_config_rejects_odd_page_size() {
    let config = InterpreterConfig::default().with_page_size(3000);
    assert_eq!(config.validate(), Err(ConfigError::PageSize(3000)));
}

#[test]
fn test_config_rejects_unaligned_stack() {
    let config = InterpreterConfig::default().with_stack_size(4096 * 20 + 8);
    assert!(matches!(
        config.validate(),
        Err(ConfigError::Unaligned { name: "stack_size", .. })
    ));
}

#[test]
fn test_config_rejects_stack_without_room_for_guards() {
    let config = InterpreterConfig::default()
        .with_stack_size(4096 * 8)
        .with_stack_shadow_pages(6);
    assert!(matches!(config.validate(), Err(ConfigError::StackTooSmall { .. })));
}

#[test]
fn test_config_rejects_empty_zone() {
    let config = InterpreterConfig::default().with_stack_yellow_pages(0);
    assert_eq!(config.validate(), Err(ConfigError::EmptyZone("yellow")));
}

#[test]
fn test_config_from_partial_json() {
    let config = InterpreterConfig::from_json_str(r#"{ "count_bytecodes": true, "compile_threshold": 7 }"#).unwrap();
    assert!(config.count_bytecodes);
    assert_eq!(config.compile_threshold, 7);
    assert_eq!(config.page_size, InterpreterConfig::default().page_size);
}

#[test]
fn test_config_from_bad_json() {
    let err = InterpreterConfig::from_json_str("{ not json").unwrap_err();
    assert!(matches!(err, VmError::Config(_)));
}

#[test]
fn test_config_json_round_trip() {
    let config = InterpreterConfig::default()
        .with_trace_bytecodes(true)
        .with_max_steps(1234);
    let back = InterpreterConfig::from_json_str(&config.to_json()).unwrap();
    assert_eq!(back, config);
}

#[test]
fn test_config_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("interp.json");
    std::fs::write(&path, r#"{ "use_stack_banging": false }"#).unwrap();
    let config = InterpreterConfig::from_json_file(&path).unwrap();
    assert!(!config.use_stack_banging);

    let missing = InterpreterConfig::from_json_file(dir.path().join("nope.json"));
    assert!(matches!(missing, Err(VmError::Config(_))));
}

#[test]
fn test_vm_rejects_invalid_config() {
    let result = Vm::new(InterpreterConfig::default().with_max_steps(0));
    assert!(matches!(result, Err(VmError::Config(_))));
}

// ============================================================================
// Vm Host API Tests
// ============================================================================

#[test]
fn test_vm_bootstraps_well_known_classes() {
    let vm = vm();
    for kind in GuestException::ALL {
        assert!(vm.class(kind.class_name()).is_some(), "{} missing", kind.class_name());
    }
    assert!(vm.class("java/lang/Object").is_some());
    assert!(vm.class("[I").is_some());
}

#[test]
fn test_load_class_counts() {
    let mut vm = vm();
    let before = vm.class_count();
    vm.load_class(&ClassDefinition::new("demo/Empty")).unwrap();
    assert_eq!(vm.class_count(), before + 1);
    assert!(vm.class("demo/Empty").is_some());
}

#[test]
fn test_load_class_with_unknown_super_fails() {
    let mut vm = vm();
    let def = ClassDefinition::new("demo/Orphan").with_super("demo/Missing");
    assert!(vm.load_class(&def).is_err());
}

#[test]
fn test_int_array_round_trip_through_heap() {
    let mut vm = vm();
    let array = vm.new_int_array(&[3, -1, 7]).unwrap();
    assert_eq!(vm.int_array(array).unwrap(), vec![3, -1, 7]);
    assert_eq!(vm.class_name_of(array).unwrap(), "[I");
    assert_eq!(vm.heap_stats().arrays, 1);
}

#[test]
fn test_object_fields() {
    let mut vm = vm();
    let point = vm
        .load_class(
            &ClassDefinition::new("demo/Point")
                .with_field("x", "I")
                .with_field("next", "Ldemo/Point;"),
        )
        .unwrap();
    let a = vm.new_object(point).unwrap();
    let b = vm.new_object(point).unwrap();
    assert_eq!(vm.int_field(a, "x").unwrap(), 0);
    vm.set_int_field(a, "x", 41).unwrap();
    vm.set_object_field(a, "next", "Ldemo/Point;", b).unwrap();
    assert_eq!(vm.int_field(a, "x").unwrap(), 41);
    assert_eq!(vm.object_field(a, "next", "Ldemo/Point;").unwrap(), b);
    assert!(vm.int_field(a, "y").is_err());
}

#[test]
fn test_allocate_exception_keeps_message() {
    let mut vm = vm();
    let e = vm
        .allocate_exception(GuestException::ClassCast, Some("bad cast"))
        .unwrap();
    assert_eq!(vm.class_name_of(e).unwrap(), "java/lang/ClassCastException");
    assert_eq!(vm.exception_message(e), Some("bad cast"));
}

#[test]
fn test_call_static_rejects_wrong_arity() {
    let mut vm = vm();
    let mut code = CodeBuilder::new();
    code.iload(0).op(Bytecode::Ireturn);
    vm.load_class(&ClassDefinition::new("demo/Id").with_method(static_method("id", "(I)I", &code)))
        .unwrap();
    let err = vm.call_static("demo/Id", "id", &[]).unwrap_err();
    assert!(matches!(err, VmError::Linkage(_)));
}

#[test]
fn test_call_static_unknown_class_or_method() {
    let mut vm = vm();
    assert!(matches!(vm.call_static("demo/Nope", "m", &[]), Err(VmError::Linkage(_))));
    vm.load_class(&ClassDefinition::new("demo/Empty")).unwrap();
    assert!(matches!(vm.call_static("demo/Empty", "m", &[]), Err(VmError::Linkage(_))));
}

#[test]
fn test_call_instance_rejects_static_method() {
    let mut vm = vm();
    let mut code = CodeBuilder::new();
    code.op(Bytecode::Return);
    vm.load_class(&ClassDefinition::new("demo/S").with_method(static_method("run", "()V", &code)))
        .unwrap();
    assert!(vm.call_instance("demo/S", "run", 0, &[]).is_err());
}

#[test]
fn test_call_outcome_accessors() {
    let returned = CallOutcome::Returned(Value::Int(1));
    assert_eq!(returned.value(), Some(Value::Int(1)));
    assert_eq!(returned.exception_class(), None);

    let threw = CallOutcome::Threw {
        exception: 0x10,
        class_name: "java/lang/ArithmeticException".to_string(),
        message: None,
    };
    assert_eq!(threw.value(), None);
    assert_eq!(threw.exception_class(), Some("java/lang/ArithmeticException"));
}

#[test]
fn test_native_registration_requires_a_function() {
    let mut vm = vm();
    let result = unsafe { vm.register_native("demo/N", "f", std::ptr::null(), "()V") };
    assert!(matches!(result, Err(VmError::Linkage(_))));
}

// ============================================================================
// Generated Code Tests
// ============================================================================

#[test]
fn test_entries_lie_inside_the_interpreter() {
    let vm = vm();
    let interp = vm.interpreter();
    for kind in MethodKind::ALL {
        assert!(interp.contains(interp.method_entry(kind)));
    }
    assert!(!interp.contains(interp.stubs().call_stub));
}

#[test]
fn test_listing_names_stubs() {
    let vm = vm();
    let listing = vm.interpreter().listing();
    assert!(listing.contains("call stub"));
    assert!(listing.contains("method entry point"));
}

#[test]
fn test_trace_record_display_uses_bytecode_name() {
    let record = TraceRecord {
        method: "demo/A.f()V".to_string(),
        bci: 0,
        bytecode: Some(Bytecode::Return),
        tos: TosState::Vtos,
        x0: 0,
        v0: 0,
    };
    assert_eq!(record.to_string(), "demo/A.f()V @0 return [vtos]");
}
