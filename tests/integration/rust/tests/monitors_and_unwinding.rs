//! Monitor, stack overflow and unwinding scenarios
//!
//! Locks taken by synchronized entries and `monitorenter` must be released
//! on every way out of a frame, and a stack overflow must leave the VM
//! usable.

use bytecode_system::{Bytecode, ClassDefinition, CodeBuilder};
use core_types::{AccessFlags, GuestException, Value};
use interpreter::CallOutcome;
use integration_tests::{method, returned, static_method, threw, vm};

const SYNC_STATIC: AccessFlags = AccessFlags::PUBLIC
    .union(AccessFlags::STATIC)
    .union(AccessFlags::SYNCHRONIZED);

// ============================================================================
// Synchronized Methods
// ============================================================================

fn synchronized_class() -> ClassDefinition {
    let mut inc = CodeBuilder::new();
    inc.iload(0).iconst(1).op(Bytecode::Iadd).op(Bytecode::Ireturn);
    let mut div = CodeBuilder::new();
    div.iload(0).iconst(0).op(Bytecode::Idiv).op(Bytecode::Ireturn);
    let mut get = CodeBuilder::new();
    get.iload(1).op(Bytecode::Ireturn);

    let mut class = ClassDefinition::new("demo/Sync")
        .with_method(static_method("inc", "(I)I", 1, &inc).with_access(SYNC_STATIC))
        .with_method(static_method("fail", "(I)I", 1, &div).with_access(SYNC_STATIC))
        .with_method(
            method("echo", "(I)I", 2, &get).with_access(AccessFlags::PUBLIC | AccessFlags::SYNCHRONIZED),
        );

    // countdown(n) = n == 0 ? 0 : countdown(n - 1) + 1, re-entering the lock
    let countdown = class.add_method_ref("demo/Sync", "countdown", "(I)I");
    let mut code = CodeBuilder::new();
    let recurse = code.new_label();
    code.iload(0).branch(Bytecode::Ifne, recurse);
    code.iconst(0).op(Bytecode::Ireturn);
    code.bind(recurse);
    code.iload(0)
        .iconst(1)
        .op(Bytecode::Isub)
        .op_u2(Bytecode::Invokestatic, countdown)
        .iconst(1)
        .op(Bytecode::Iadd)
        .op(Bytecode::Ireturn);
    class.with_method(static_method("countdown", "(I)I", 1, &code).with_access(SYNC_STATIC))
}

#[test]
fn test_static_synchronized_releases_mirror_on_return() {
    let mut vm = vm();
    let class = vm.load_class(&synchronized_class()).unwrap();
    let v = returned(vm.call_static("demo/Sync", "inc", &[Value::Int(41)]).unwrap());
    assert_eq!(v, Value::Int(42));
    assert!(!vm.is_locked(vm.mirror(class)));
}

#[test]
fn test_static_synchronized_releases_mirror_on_exception() {
    let mut vm = vm();
    let class = vm.load_class(&synchronized_class()).unwrap();
    let outcome = vm.call_static("demo/Sync", "fail", &[Value::Int(1)]).unwrap();
    assert_eq!(threw(&outcome), ("java/lang/ArithmeticException", Some("/ by zero")));
    assert!(!vm.is_locked(vm.mirror(class)));

    // the lock is free for the next caller
    let v = returned(vm.call_static("demo/Sync", "inc", &[Value::Int(0)]).unwrap());
    assert_eq!(v, Value::Int(1));
}

#[test]
fn test_synchronized_recursion_reenters_lock() {
    let mut vm = vm();
    let class = vm.load_class(&synchronized_class()).unwrap();
    let v = returned(vm.call_static("demo/Sync", "countdown", &[Value::Int(20)]).unwrap());
    assert_eq!(v, Value::Int(20));
    assert!(!vm.is_locked(vm.mirror(class)));
}

#[test]
fn test_instance_synchronized_locks_receiver() {
    let mut vm = vm();
    let class = vm.load_class(&synchronized_class()).unwrap();
    let receiver = vm.new_object(class).unwrap();
    let v = returned(vm.call_instance("demo/Sync", "echo", receiver, &[Value::Int(5)]).unwrap());
    assert_eq!(v, Value::Int(5));
    assert!(!vm.is_locked(receiver));
}

// ============================================================================
// monitorenter / monitorexit
// ============================================================================

fn monitors_class() -> ClassDefinition {
    let mut balanced = CodeBuilder::new();
    balanced
        .aload(0)
        .op(Bytecode::Monitorenter)
        .aload(0)
        .op(Bytecode::Monitorenter)
        .aload(0)
        .op(Bytecode::Monitorexit)
        .aload(0)
        .op(Bytecode::Monitorexit)
        .iconst(1)
        .op(Bytecode::Ireturn);

    let mut exit_only = CodeBuilder::new();
    exit_only
        .aload(0)
        .op(Bytecode::Monitorexit)
        .iconst(1)
        .op(Bytecode::Ireturn);

    let mut enter_only = CodeBuilder::new();
    enter_only
        .aload(0)
        .op(Bytecode::Monitorenter)
        .iconst(1)
        .op(Bytecode::Ireturn);

    let mut null_enter = CodeBuilder::new();
    null_enter
        .op(Bytecode::AconstNull)
        .op(Bytecode::Monitorenter)
        .iconst(1)
        .op(Bytecode::Ireturn);

    ClassDefinition::new("demo/Mon")
        .with_method(static_method("balanced", "(Ljava/lang/Object;)I", 1, &balanced))
        .with_method(static_method("exitOnly", "(Ljava/lang/Object;)I", 1, &exit_only))
        .with_method(static_method("enterOnly", "(Ljava/lang/Object;)I", 1, &enter_only))
        .with_method(static_method("nullEnter", "()I", 0, &null_enter))
}

#[test]
fn test_balanced_monitors_unlock() {
    let mut vm = vm();
    let class = vm.load_class(&monitors_class()).unwrap();
    let obj = vm.new_object(class).unwrap();
    let v = returned(vm.call_static("demo/Mon", "balanced", &[Value::Object(obj)]).unwrap());
    assert_eq!(v, Value::Int(1));
    assert!(!vm.is_locked(obj));
}

#[test]
fn test_monitorexit_without_enter_throws() {
    let mut vm = vm();
    let class = vm.load_class(&monitors_class()).unwrap();
    let obj = vm.new_object(class).unwrap();
    let outcome = vm.call_static("demo/Mon", "exitOnly", &[Value::Object(obj)]).unwrap();
    assert_eq!(threw(&outcome).0, "java/lang/IllegalMonitorStateException");
}

#[test]
fn test_return_with_held_monitor_throws_and_unlocks() {
    let mut vm = vm();
    let class = vm.load_class(&monitors_class()).unwrap();
    let obj = vm.new_object(class).unwrap();
    let outcome = vm.call_static("demo/Mon", "enterOnly", &[Value::Object(obj)]).unwrap();
    assert_eq!(threw(&outcome).0, "java/lang/IllegalMonitorStateException");
    assert!(!vm.is_locked(obj));
}

#[test]
fn test_monitorenter_null_throws_npe() {
    let mut vm = vm();
    vm.load_class(&monitors_class()).unwrap();
    let outcome = vm.call_static("demo/Mon", "nullEnter", &[]).unwrap();
    assert_eq!(threw(&outcome).0, "java/lang/NullPointerException");
}

// ============================================================================
// Stack Overflow and Unwinding
// ============================================================================

fn recursion_class() -> ClassDefinition {
    let mut class = ClassDefinition::new("demo/Deep");
    let recurse = class.add_method_ref("demo/Deep", "recurse", "(I)I");
    let mut code = CodeBuilder::new();
    code.iload(0)
        .iconst(1)
        .op(Bytecode::Iadd)
        .op_u2(Bytecode::Invokestatic, recurse)
        .op(Bytecode::Ireturn);

    let mut id = CodeBuilder::new();
    id.iload(0).op(Bytecode::Ireturn);

    // catches the overflow of its callee
    let mut guarded = CodeBuilder::new();
    guarded.iconst(0).op_u2(Bytecode::Invokestatic, recurse).op(Bytecode::Ireturn);
    let handler = guarded.pc() as u16;
    guarded.op(Bytecode::Pop).iconst(-1).op(Bytecode::Ireturn);

    class
        .with_method(static_method("recurse", "(I)I", 1, &code))
        .with_method(static_method("id", "(I)I", 1, &id))
        .with_method(static_method("guarded", "()I", 0, &guarded).with_handler(
            0,
            handler,
            handler,
            Some("java/lang/StackOverflowError"),
        ))
}

#[test]
fn test_unbounded_recursion_throws_stack_overflow_error() {
    let mut vm = vm();
    vm.load_class(&recursion_class()).unwrap();
    let outcome = vm.call_static("demo/Deep", "recurse", &[Value::Int(0)]).unwrap();
    assert_eq!(threw(&outcome).0, "java/lang/StackOverflowError");

    // the guard zone is re-armed: the VM runs and overflows again
    let v = returned(vm.call_static("demo/Deep", "id", &[Value::Int(3)]).unwrap());
    assert_eq!(v, Value::Int(3));
    let again = vm.call_static("demo/Deep", "recurse", &[Value::Int(0)]).unwrap();
    assert_eq!(threw(&again).0, "java/lang/StackOverflowError");
}

#[test]
fn test_stack_overflow_caught_by_guest_handler() {
    let mut vm = vm();
    vm.load_class(&recursion_class()).unwrap();
    let v = returned(vm.call_static("demo/Deep", "guarded", &[]).unwrap());
    assert_eq!(v, Value::Int(-1));
}

#[test]
fn test_exception_from_nested_frames_reaches_host() {
    let mut throw = CodeBuilder::new();
    throw.aload(0).op(Bytecode::Athrow);
    let mut class = ClassDefinition::new("demo/Nest")
        .with_method(static_method("thrower", "(Ljava/lang/Throwable;)V", 1, &throw));
    let thrower = class.add_method_ref("demo/Nest", "thrower", "(Ljava/lang/Throwable;)V");
    let mut outer = CodeBuilder::new();
    outer.aload(0).op_u2(Bytecode::Invokestatic, thrower).op(Bytecode::Return);
    let class = class.with_method(static_method("outer", "(Ljava/lang/Throwable;)V", 1, &outer));

    let mut vm = vm();
    vm.load_class(&class).unwrap();
    let e = vm
        .allocate_exception(GuestException::ClassCast, Some("custom"))
        .unwrap();
    let outcome = vm.call_static("demo/Nest", "outer", &[Value::Object(e)]).unwrap();
    match outcome {
        CallOutcome::Threw { exception, message, .. } => {
            assert_eq!(exception, e);
            assert_eq!(message.as_deref(), Some("custom"));
        }
        other => panic!("expected an exception, got {:?}", other),
    }
}
