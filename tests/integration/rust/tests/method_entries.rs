//! Method entry scenarios
//!
//! One scenario per special entry kind: natives of every calling shape,
//! math intrinsics, `Reference.get`, method handles, abstract methods and
//! the empty and accessor fast paths.

use bytecode_system::{Bytecode, ClassDefinition, CodeBuilder, MethodDefinition};
use core_types::{AccessFlags, Value};
use integration_tests::{method, returned, static_method, threw, vm, vm_with};
use interpreter::InterpreterConfig;

// ============================================================================
// Native Methods
// ============================================================================

extern "C" fn add(_env: u64, _class: u64, a: i32, b: i32) -> i32 {
    a.wrapping_add(b)
}

extern "C" fn scale(_env: u64, _class: u64, x: f64, factor: f32) -> f64 {
    x * factor as f64
}

extern "C" fn mix(_env: u64, _class: u64, a: i64, b: i32, c: i64) -> i64 {
    a * 100 + b as i64 * 10 + c
}

extern "C" fn is_present(_env: u64, _class: u64, handle: u64) -> i32 {
    (handle != 0) as i32
}

extern "C" fn instance_plus(_env: u64, receiver: u64, x: i32) -> i32 {
    if receiver == 0 {
        -1
    } else {
        x + 1
    }
}

fn native(name: &str, descriptor: &str) -> MethodDefinition {
    MethodDefinition::new(name, descriptor)
        .with_access(AccessFlags::PUBLIC | AccessFlags::STATIC | AccessFlags::NATIVE)
}

fn natives_class() -> ClassDefinition {
    ClassDefinition::new("demo/Native")
        .with_method(native("add", "(II)I"))
        .with_method(native("scale", "(DF)D"))
        .with_method(native("mix", "(JIJ)J"))
        .with_method(native("isPresent", "(Ljava/lang/Object;)Z"))
        .with_method(native("missing", "()V"))
        .with_method(
            MethodDefinition::new("plusOne", "(I)I").with_access(AccessFlags::PUBLIC | AccessFlags::NATIVE),
        )
}

fn natives_vm() -> interpreter::Vm {
    let mut vm = vm();
    vm.load_class(&natives_class()).unwrap();
    // SAFETY: every function matches its descriptor's native signature.
    unsafe {
        vm.register_native("demo/Native", "add", add as *const (), "(II)I").unwrap();
        vm.register_native("demo/Native", "scale", scale as *const (), "(DF)D").unwrap();
        vm.register_native("demo/Native", "mix", mix as *const (), "(JIJ)J").unwrap();
        vm.register_native("demo/Native", "isPresent", is_present as *const (), "(Ljava/lang/Object;)Z")
            .unwrap();
        vm.register_native("demo/Native", "plusOne", instance_plus as *const (), "(I)I")
            .unwrap();
    }
    vm
}

#[test]
fn test_native_int_arguments() {
    let mut vm = natives_vm();
    let v = returned(vm.call_static("demo/Native", "add", &[Value::Int(40), Value::Int(2)]).unwrap());
    assert_eq!(v, Value::Int(42));
    // linked once, called again through the same handler
    let v = returned(vm.call_static("demo/Native", "add", &[Value::Int(-5), Value::Int(2)]).unwrap());
    assert_eq!(v, Value::Int(-3));
}

#[test]
fn test_native_floating_arguments() {
    let mut vm = natives_vm();
    let v = returned(
        vm.call_static("demo/Native", "scale", &[Value::Double(1.5), Value::Float(4.0)])
            .unwrap(),
    );
    assert_eq!(v, Value::Double(6.0));
}

#[test]
fn test_native_long_arguments() {
    let mut vm = natives_vm();
    let v = returned(
        vm.call_static(
            "demo/Native",
            "mix",
            &[Value::Long(1), Value::Int(2), Value::Long(3)],
        )
        .unwrap(),
    );
    assert_eq!(v, Value::Long(123));
}

#[test]
fn test_native_object_argument_is_a_handle() {
    let mut vm = natives_vm();
    let class = vm.class("demo/Native").unwrap();
    let obj = vm.new_object(class).unwrap();
    let present = returned(vm.call_static("demo/Native", "isPresent", &[Value::Object(obj)]).unwrap());
    assert_eq!(present, Value::Boolean(true));
    let absent = returned(vm.call_static("demo/Native", "isPresent", &[Value::Object(0)]).unwrap());
    assert_eq!(absent, Value::Boolean(false));
}

#[test]
fn test_native_instance_method_receives_receiver_handle() {
    let mut vm = natives_vm();
    let class = vm.class("demo/Native").unwrap();
    let obj = vm.new_object(class).unwrap();
    let v = returned(vm.call_instance("demo/Native", "plusOne", obj, &[Value::Int(9)]).unwrap());
    assert_eq!(v, Value::Int(10));
}

#[test]
fn test_unregistered_native_throws_unsatisfied_link_error() {
    let mut vm = natives_vm();
    let outcome = vm.call_static("demo/Native", "missing", &[]).unwrap();
    assert_eq!(
        threw(&outcome),
        ("java/lang/UnsatisfiedLinkError", Some("demo.Native.missing()V"))
    );
}

#[test]
fn test_synchronized_native_releases_lock() {
    let mut vm = vm();
    let class = vm
        .load_class(
            &ClassDefinition::new("demo/SyncNative").with_method(
                native("add", "(II)I").with_access(
                    AccessFlags::PUBLIC | AccessFlags::STATIC | AccessFlags::NATIVE | AccessFlags::SYNCHRONIZED,
                ),
            ),
        )
        .unwrap();
    // SAFETY: `add` matches (II)I.
    unsafe { vm.register_native("demo/SyncNative", "add", add as *const (), "(II)I") }.unwrap();
    let v = returned(vm.call_static("demo/SyncNative", "add", &[Value::Int(1), Value::Int(2)]).unwrap());
    assert_eq!(v, Value::Int(3));
    assert!(!vm.is_locked(vm.mirror(class)));
}

// ============================================================================
// Math Intrinsics
// ============================================================================

fn math_class() -> ClassDefinition {
    // the bodies are never run: intrinsic entries compute the result
    let mut unary = CodeBuilder::new();
    unary.local(Bytecode::Dload, 0).op(Bytecode::Dreturn);
    let mut class = ClassDefinition::new("java/lang/Math");
    for name in ["sqrt", "abs", "sin", "cos", "log", "exp"] {
        class = class.with_method(static_method(name, "(D)D", 2, &unary));
    }
    class.with_method(static_method("pow", "(DD)D", 4, &unary))
}

fn math(vm: &mut interpreter::Vm, name: &str, args: &[f64]) -> f64 {
    let args: Vec<Value> = args.iter().copied().map(Value::Double).collect();
    match returned(vm.call_static("java/lang/Math", name, &args).unwrap()) {
        Value::Double(d) => d,
        other => panic!("expected a double, got {:?}", other),
    }
}

#[test]
fn test_math_intrinsics() {
    let mut vm = vm();
    vm.load_class(&math_class()).unwrap();
    assert_eq!(math(&mut vm, "sqrt", &[16.0]), 4.0);
    assert_eq!(math(&mut vm, "abs", &[-2.5]), 2.5);
    assert_eq!(math(&mut vm, "pow", &[2.0, 10.0]), 1024.0);
    assert_eq!(math(&mut vm, "sin", &[0.0]), 0.0);
    assert_eq!(math(&mut vm, "cos", &[0.0]), 1.0);
    assert_eq!(math(&mut vm, "exp", &[0.0]), 1.0);
    assert!((math(&mut vm, "log", &[std::f64::consts::E]) - 1.0).abs() < 1e-12);
}

// ============================================================================
// Reference.get
// ============================================================================

const REFERENCE: &str = "java/lang/ref/Reference";

#[test]
fn test_reference_get_reports_referent_while_marking() {
    let mut vm = vm_with(InterpreterConfig::default().with_satb_barrier(true));
    let referent = vm.new_int_array(&[1, 2]).unwrap();
    let reference = vm.new_reference(referent).unwrap();

    // not marking: nothing recorded
    let v = returned(vm.call_instance(REFERENCE, "get", reference, &[]).unwrap());
    assert_eq!(v, Value::Object(referent));
    assert!(vm.drain_satb_queue().is_empty());

    vm.set_concurrent_marking(true).unwrap();
    let v = returned(vm.call_instance(REFERENCE, "get", reference, &[]).unwrap());
    assert_eq!(v, Value::Object(referent));
    assert_eq!(vm.drain_satb_queue(), vec![referent]);
    assert!(vm.drain_satb_queue().is_empty());
}

#[test]
fn test_reference_get_without_barrier_skips_queue() {
    let mut vm = vm();
    let referent = vm.new_int_array(&[1]).unwrap();
    let reference = vm.new_reference(referent).unwrap();
    vm.set_concurrent_marking(true).unwrap();
    let v = returned(vm.call_instance(REFERENCE, "get", reference, &[]).unwrap());
    assert_eq!(v, Value::Object(referent));
    assert!(vm.drain_satb_queue().is_empty());
}

#[test]
fn test_reference_get_on_null_throws_npe() {
    let mut vm = vm_with(InterpreterConfig::default().with_satb_barrier(true));
    let outcome = vm.call_instance(REFERENCE, "get", 0, &[]).unwrap();
    assert_eq!(threw(&outcome).0, "java/lang/NullPointerException");
}

// ============================================================================
// Method Handles
// ============================================================================

fn handle_target() -> ClassDefinition {
    let mut code = CodeBuilder::new();
    code.iload(0).iload(1).op(Bytecode::Iadd).op(Bytecode::Ireturn);
    ClassDefinition::new("demo/Target").with_method(static_method("add", "(II)I", 2, &code))
}

#[test]
fn test_invoke_exact_calls_target() {
    let mut vm = vm();
    vm.load_class(&handle_target()).unwrap();
    let handle = vm.new_method_handle("demo/Target", "add").unwrap();
    let v = returned(vm.invoke_exact(handle, "(II)I", &[Value::Int(2), Value::Int(3)]).unwrap());
    assert_eq!(v, Value::Int(5));
}

#[test]
fn test_invoke_exact_on_null_handle_throws_npe() {
    let mut vm = vm();
    vm.load_class(&handle_target()).unwrap();
    let outcome = vm.invoke_exact(0, "(II)I", &[Value::Int(2), Value::Int(3)]).unwrap();
    assert_eq!(threw(&outcome).0, "java/lang/NullPointerException");
}

// ============================================================================
// Abstract, Empty and Accessor Entries
// ============================================================================

#[test]
fn test_abstract_method_throws_abstract_method_error() {
    let mut vm = vm();
    let class = vm
        .load_class(
            &ClassDefinition::new("demo/Shape")
                .with_method(MethodDefinition::new("area", "()I").with_access(AccessFlags::PUBLIC | AccessFlags::ABSTRACT)),
        )
        .unwrap();
    let receiver = vm.new_object(class).unwrap();
    let outcome = vm.call_instance("demo/Shape", "area", receiver, &[]).unwrap();
    assert_eq!(threw(&outcome).0, "java/lang/AbstractMethodError");
}

#[test]
fn test_empty_and_accessor_entries_with_and_without_fast_paths() {
    for fast in [true, false] {
        let config = InterpreterConfig::default()
            .with_fast_empty_methods(fast)
            .with_fast_accessor_methods(fast);
        let mut vm = vm_with(config);

        let mut class = ClassDefinition::new("demo/Bean").with_field("value", "I");
        let field = class.add_field_ref("demo/Bean", "value", "I");
        let mut getter = CodeBuilder::new();
        getter.aload(0).op_u2(Bytecode::Getfield, field).op(Bytecode::Ireturn);
        let mut empty = CodeBuilder::new();
        empty.op(Bytecode::Return);
        let class = class
            .with_method(method("value", "()I", 1, &getter))
            .with_method(static_method("touch", "()V", 0, &empty));

        let bean = vm.load_class(&class).unwrap();
        let obj = vm.new_object(bean).unwrap();
        vm.set_int_field(obj, "value", 77).unwrap();

        let v = returned(vm.call_instance("demo/Bean", "value", obj, &[]).unwrap());
        assert_eq!(v, Value::Int(77), "fast = {}", fast);
        assert_eq!(returned(vm.call_static("demo/Bean", "touch", &[]).unwrap()), Value::Void);
    }
}
