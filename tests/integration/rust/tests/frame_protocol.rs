//! Frame construction and removal scenarios
//!
//! Additional locals start zeroed, frames larger than a page are checked
//! against the stack limit before anything is reserved, and every way out
//! of an activation hands the caller back its exact stack pointer (the
//! call stub stops the VM otherwise while debug checks are on).

use bytecode_system::{Bytecode, ClassDefinition, CodeBuilder, MethodDefinition};
use core_types::{AccessFlags, Value};
use integration_tests::{returned, static_method, threw, vm, vm_with};
use interpreter::generator::ZERO_LOCALS_MARK;
use interpreter::InterpreterConfig;

fn locals_class() -> ClassDefinition {
    // dirty(a): locals 1..8 = a
    let mut dirty = CodeBuilder::new();
    for i in 1..8 {
        dirty.iload(0).istore(i);
    }
    dirty.iload(0).op(Bytecode::Ireturn);

    // fresh(a, b): sum of locals 2..8
    let mut fresh = CodeBuilder::new();
    fresh.iload(2);
    for i in 3..8 {
        fresh.iload(i).op(Bytecode::Iadd);
    }
    fresh.op(Bytecode::Ireturn);

    // two parameters, three locals
    let mut third = CodeBuilder::new();
    third.iload(2).op(Bytecode::Ireturn);

    ClassDefinition::new("demo/Locals")
        .with_method(static_method("dirty", "(I)I", 8, &dirty))
        .with_method(static_method("fresh", "(II)I", 8, &fresh))
        .with_method(static_method("third", "(II)I", 3, &third))
        .with_method(static_method("exact", "(II)I", 2, &load_local(1)))
}

fn load_local(index: u8) -> CodeBuilder {
    let mut code = CodeBuilder::new();
    code.iload(index).op(Bytecode::Ireturn);
    code
}

#[test]
fn test_additional_locals_start_zeroed() {
    let mut vm = vm();
    vm.load_class(&locals_class()).unwrap();
    // leave non-zero words where the next activation's locals go
    let v = returned(vm.call_static("demo/Locals", "dirty", &[Value::Int(77)]).unwrap());
    assert_eq!(v, Value::Int(77));

    let v = returned(vm.call_static("demo/Locals", "fresh", &[Value::Int(1), Value::Int(2)]).unwrap());
    assert_eq!(v, Value::Int(0));

    returned(vm.call_static("demo/Locals", "dirty", &[Value::Int(77)]).unwrap());
    let v = returned(vm.call_static("demo/Locals", "third", &[Value::Int(1), Value::Int(2)]).unwrap());
    assert_eq!(v, Value::Int(0));
}

#[test]
fn test_one_zeroing_store_per_additional_local() {
    let mut vm = vm();
    vm.load_class(&locals_class()).unwrap();
    let store = vm.interpreter().mark(ZERO_LOCALS_MARK).unwrap();
    vm.watch_pc(store);

    // two parameters, three locals: exactly one store
    returned(vm.call_static("demo/Locals", "third", &[Value::Int(1), Value::Int(2)]).unwrap());
    assert_eq!(vm.pc_hits(store), Some(1));

    // no additional locals: the loop is skipped
    let v = returned(vm.call_static("demo/Locals", "exact", &[Value::Int(1), Value::Int(2)]).unwrap());
    assert_eq!(v, Value::Int(2));
    assert_eq!(vm.pc_hits(store), Some(1));

    // two parameters, eight locals: six stores
    returned(vm.call_static("demo/Locals", "fresh", &[Value::Int(1), Value::Int(2)]).unwrap());
    assert_eq!(vm.pc_hits(store), Some(7));
}

fn sized_class() -> ClassDefinition {
    let mut code = CodeBuilder::new();
    code.iconst(7).op(Bytecode::Ireturn);
    ClassDefinition::new("demo/Sized")
        // several pages of locals, within the stack
        .with_method(static_method("large", "()I", 1000, &code))
        // more locals than the whole stack holds
        .with_method(static_method("huge", "()I", 60_000, &code))
}

#[test]
fn test_frame_larger_than_a_page_that_fits_runs() {
    let mut vm = vm();
    vm.load_class(&sized_class()).unwrap();
    let v = returned(vm.call_static("demo/Sized", "large", &[]).unwrap());
    assert_eq!(v, Value::Int(7));
}

#[test]
fn test_frame_beyond_the_stack_limit_throws_before_reserving() {
    let mut vm = vm();
    vm.load_class(&sized_class()).unwrap();
    let outcome = vm.call_static("demo/Sized", "huge", &[]).unwrap();
    assert_eq!(threw(&outcome).0, "java/lang/StackOverflowError");

    // nothing was left behind
    let v = returned(vm.call_static("demo/Sized", "large", &[]).unwrap());
    assert_eq!(v, Value::Int(7));
}

extern "C" fn negate(_env: u64, _class: u64, x: i32) -> i32 {
    -x
}

#[test]
fn test_every_exit_restores_the_callers_stack_pointer() {
    let mut add = CodeBuilder::new();
    add.iload(0).iload(1).op(Bytecode::Iadd).op(Bytecode::Ireturn);
    let mut div = CodeBuilder::new();
    div.iload(0).iload(1).op(Bytecode::Idiv).op(Bytecode::Ireturn);
    let mut empty = CodeBuilder::new();
    empty.op(Bytecode::Return);

    let mut class = ClassDefinition::new("demo/Exits")
        .with_method(static_method("add", "(II)I", 2, &add))
        .with_method(
            static_method("syncDiv", "(II)I", 2, &div)
                .with_access(AccessFlags::PUBLIC | AccessFlags::STATIC | AccessFlags::SYNCHRONIZED),
        )
        .with_method(static_method("empty", "()V", 0, &empty))
        .with_method(
            MethodDefinition::new("negate", "(I)I")
                .with_access(AccessFlags::PUBLIC | AccessFlags::STATIC | AccessFlags::NATIVE),
        );
    let recurse = class.add_method_ref("demo/Exits", "recurse", "(I)I");
    let mut deep = CodeBuilder::new();
    deep.iload(0).op_u2(Bytecode::Invokestatic, recurse).op(Bytecode::Ireturn);
    let class = class.with_method(static_method("recurse", "(I)I", 1, &deep));

    let mut vm = vm_with(InterpreterConfig::default().with_debug_checks(true));
    vm.load_class(&class).unwrap();
    unsafe { vm.register_native("demo/Exits", "negate", negate as *const (), "(I)I") }.unwrap();

    let v = returned(vm.call_static("demo/Exits", "add", &[Value::Int(2), Value::Int(3)]).unwrap());
    assert_eq!(v, Value::Int(5));
    let v = returned(vm.call_static("demo/Exits", "syncDiv", &[Value::Int(9), Value::Int(3)]).unwrap());
    assert_eq!(v, Value::Int(3));
    let outcome = vm.call_static("demo/Exits", "syncDiv", &[Value::Int(9), Value::Int(0)]).unwrap();
    assert_eq!(threw(&outcome).0, "java/lang/ArithmeticException");
    let v = returned(vm.call_static("demo/Exits", "empty", &[]).unwrap());
    assert_eq!(v, Value::Void);
    let v = returned(vm.call_static("demo/Exits", "negate", &[Value::Int(4)]).unwrap());
    assert_eq!(v, Value::Int(-4));
    let outcome = vm.call_static("demo/Exits", "recurse", &[Value::Int(1)]).unwrap();
    assert_eq!(threw(&outcome).0, "java/lang/StackOverflowError");
}
