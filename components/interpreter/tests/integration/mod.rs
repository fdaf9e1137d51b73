//! Integration tests for interpreter
//!
//! Runs small programs through the generated call stub, templates and
//! method entries.

use bytecode_system::{Bytecode, ClassDefinition, CodeBuilder, MethodDefinition, T_INT};
use core_types::{AccessFlags, GuestException, Value};
use interpreter::{CallOutcome, InterpreterConfig, Vm};

fn vm() -> Vm {
    Vm::new(InterpreterConfig::default()).unwrap()
}

fn static_method(name: &str, descriptor: &str, max_locals: u16, code: &CodeBuilder) -> MethodDefinition {
    MethodDefinition::new(name, descriptor)
        .with_access(AccessFlags::PUBLIC | AccessFlags::STATIC)
        .with_max_locals(max_locals)
        .with_code(code.finish().unwrap())
}

fn returned(outcome: CallOutcome) -> Value {
    match outcome {
        CallOutcome::Returned(v) => v,
        other => panic!("expected a return, got {:?}", other),
    }
}

fn threw(outcome: &CallOutcome) -> (&str, Option<&str>) {
    match outcome {
        CallOutcome::Threw {
            class_name, message, ..
        } => (class_name.as_str(), message.as_deref()),
        other => panic!("expected an exception, got {:?}", other),
    }
}

// ============================================================================
// Arithmetic and Control Flow
// ============================================================================

#[test]
fn test_int_add() {
    let mut vm = vm();
    let mut code = CodeBuilder::new();
    code.iload(0).iload(1).op(Bytecode::Iadd).op(Bytecode::Ireturn);
    vm.load_class(&ClassDefinition::new("demo/M").with_method(static_method("add", "(II)I", 0, &code)))
        .unwrap();
    let v = returned(vm.call_static("demo/M", "add", &[Value::Int(-7), Value::Int(10)]).unwrap());
    assert_eq!(v, Value::Int(3));
}

#[test]
fn test_int_arithmetic_wraps() {
    let mut vm = vm();
    let mut code = CodeBuilder::new();
    code.iload(0).iload(1).op(Bytecode::Imul).op(Bytecode::Ineg).op(Bytecode::Ireturn);
    vm.load_class(&ClassDefinition::new("demo/M").with_method(static_method("f", "(II)I", 0, &code)))
        .unwrap();
    let v = returned(
        vm.call_static("demo/M", "f", &[Value::Int(i32::MAX), Value::Int(2)])
            .unwrap(),
    );
    assert_eq!(v, Value::Int(i32::MAX.wrapping_mul(2).wrapping_neg()));
}

#[test]
fn test_loop_sums_to_n() {
    // s = 0; for (i = 1; i <= n; i++) s += i; return s;
    let mut vm = vm();
    let mut code = CodeBuilder::new();
    let head = code.new_label();
    let done = code.new_label();
    code.iconst(0).istore(1).iconst(1).istore(2);
    code.bind(head);
    code.iload(2).iload(0).branch(Bytecode::IfIcmpgt, done);
    code.iload(1).iload(2).op(Bytecode::Iadd).istore(1);
    code.iinc(2, 1).branch(Bytecode::Goto, head);
    code.bind(done);
    code.iload(1).op(Bytecode::Ireturn);
    vm.load_class(&ClassDefinition::new("demo/Loop").with_method(static_method("sum", "(I)I", 3, &code)))
        .unwrap();

    for (n, expected) in [(0, 0), (1, 1), (10, 55), (1000, 500_500)] {
        let v = returned(vm.call_static("demo/Loop", "sum", &[Value::Int(n)]).unwrap());
        assert_eq!(v, Value::Int(expected), "sum({})", n);
    }
}

#[test]
fn test_conditional_branches() {
    // sign(x): -1, 0 or 1
    let mut vm = vm();
    let mut code = CodeBuilder::new();
    let negative = code.new_label();
    let positive = code.new_label();
    code.iload(0).branch(Bytecode::Iflt, negative);
    code.iload(0).branch(Bytecode::Ifgt, positive);
    code.iconst(0).op(Bytecode::Ireturn);
    code.bind(negative);
    code.iconst(-1).op(Bytecode::Ireturn);
    code.bind(positive);
    code.iconst(1).op(Bytecode::Ireturn);
    vm.load_class(&ClassDefinition::new("demo/Sign").with_method(static_method("sign", "(I)I", 1, &code)))
        .unwrap();

    for (x, expected) in [(-42, -1), (0, 0), (9, 1)] {
        let v = returned(vm.call_static("demo/Sign", "sign", &[Value::Int(x)]).unwrap());
        assert_eq!(v, Value::Int(expected));
    }
}

#[test]
fn test_long_float_and_double_arithmetic() {
    let mut vm = vm();
    let mut ladd = CodeBuilder::new();
    ladd.local(Bytecode::Lload, 0)
        .local(Bytecode::Lload, 2)
        .op(Bytecode::Ladd)
        .op(Bytecode::Lreturn);
    let mut fadd = CodeBuilder::new();
    fadd.local(Bytecode::Fload, 0)
        .local(Bytecode::Fload, 1)
        .op(Bytecode::Fadd)
        .op(Bytecode::Freturn);
    let mut dadd = CodeBuilder::new();
    dadd.local(Bytecode::Dload, 0)
        .local(Bytecode::Dload, 2)
        .op(Bytecode::Dadd)
        .op(Bytecode::Dreturn);
    let mut widen = CodeBuilder::new();
    widen.iload(0).op(Bytecode::I2l).op(Bytecode::Lreturn);
    let class = ClassDefinition::new("demo/Wide")
        .with_method(static_method("ladd", "(JJ)J", 4, &ladd))
        .with_method(static_method("fadd", "(FF)F", 2, &fadd))
        .with_method(static_method("dadd", "(DD)D", 4, &dadd))
        .with_method(static_method("widen", "(I)J", 1, &widen));
    vm.load_class(&class).unwrap();

    let v = returned(
        vm.call_static("demo/Wide", "ladd", &[Value::Long(1 << 40), Value::Long(-1)])
            .unwrap(),
    );
    assert_eq!(v, Value::Long((1 << 40) - 1));
    let v = returned(
        vm.call_static("demo/Wide", "fadd", &[Value::Float(1.5), Value::Float(2.25)])
            .unwrap(),
    );
    assert_eq!(v, Value::Float(3.75));
    let v = returned(
        vm.call_static("demo/Wide", "dadd", &[Value::Double(0.5), Value::Double(-2.0)])
            .unwrap(),
    );
    assert_eq!(v, Value::Double(-1.5));
    let v = returned(vm.call_static("demo/Wide", "widen", &[Value::Int(-5)]).unwrap());
    assert_eq!(v, Value::Long(-5));
}

#[test]
fn test_empty_method_returns_void() {
    let mut vm = vm();
    let mut code = CodeBuilder::new();
    code.op(Bytecode::Return);
    vm.load_class(&ClassDefinition::new("demo/E").with_method(static_method("nothing", "()V", 0, &code)))
        .unwrap();
    assert_eq!(
        vm.call_static("demo/E", "nothing", &[]).unwrap(),
        CallOutcome::Returned(Value::Void)
    );
}

// ============================================================================
// Exceptions
// ============================================================================

fn divider() -> ClassDefinition {
    let mut div = CodeBuilder::new();
    div.iload(0).iload(1).op(Bytecode::Idiv).op(Bytecode::Ireturn);

    // return a / b, or -1 on ArithmeticException
    let mut safe = CodeBuilder::new();
    safe.iload(0).iload(1).op(Bytecode::Idiv).op(Bytecode::Ireturn);
    let handler = safe.pc() as u16;
    safe.op(Bytecode::Pop).iconst(-1).op(Bytecode::Ireturn);

    ClassDefinition::new("demo/Div")
        .with_method(static_method("div", "(II)I", 2, &div))
        .with_method(
            static_method("safeDiv", "(II)I", 2, &safe).with_handler(
                0,
                handler,
                handler,
                Some("java/lang/ArithmeticException"),
            ),
        )
}

#[test]
fn test_idiv_by_zero_throws() {
    let mut vm = vm();
    vm.load_class(&divider()).unwrap();
    let outcome = vm
        .call_static("demo/Div", "div", &[Value::Int(1), Value::Int(0)])
        .unwrap();
    assert_eq!(threw(&outcome), ("java/lang/ArithmeticException", Some("/ by zero")));
}

#[test]
fn test_idiv_min_by_minus_one_wraps() {
    let mut vm = vm();
    vm.load_class(&divider()).unwrap();
    let v = returned(
        vm.call_static("demo/Div", "div", &[Value::Int(i32::MIN), Value::Int(-1)])
            .unwrap(),
    );
    assert_eq!(v, Value::Int(i32::MIN));
    let v = returned(
        vm.call_static("demo/Div", "div", &[Value::Int(-7), Value::Int(2)])
            .unwrap(),
    );
    assert_eq!(v, Value::Int(-3));
}

#[test]
fn test_handler_in_same_method() {
    let mut vm = vm();
    vm.load_class(&divider()).unwrap();
    let v = returned(
        vm.call_static("demo/Div", "safeDiv", &[Value::Int(9), Value::Int(0)])
            .unwrap(),
    );
    assert_eq!(v, Value::Int(-1));
    let v = returned(
        vm.call_static("demo/Div", "safeDiv", &[Value::Int(9), Value::Int(3)])
            .unwrap(),
    );
    assert_eq!(v, Value::Int(3));
}

#[test]
fn test_handler_type_must_match() {
    // a NullPointerException handler does not catch ArithmeticException
    let mut vm = vm();
    let mut code = CodeBuilder::new();
    code.iload(0).iconst(0).op(Bytecode::Idiv).op(Bytecode::Ireturn);
    let handler = code.pc() as u16;
    code.op(Bytecode::Pop).iconst(0).op(Bytecode::Ireturn);
    let m = static_method("f", "(I)I", 1, &code).with_handler(
        0,
        handler,
        handler,
        Some("java/lang/NullPointerException"),
    );
    vm.load_class(&ClassDefinition::new("demo/H").with_method(m)).unwrap();
    let outcome = vm.call_static("demo/H", "f", &[Value::Int(1)]).unwrap();
    assert_eq!(outcome.exception_class(), Some("java/lang/ArithmeticException"));
}

#[test]
fn test_handler_for_superclass_catches() {
    let mut vm = vm();
    let mut code = CodeBuilder::new();
    code.iload(0).iconst(0).op(Bytecode::Idiv).op(Bytecode::Ireturn);
    let handler = code.pc() as u16;
    code.op(Bytecode::Pop).iconst(7).op(Bytecode::Ireturn);
    let m = static_method("f", "(I)I", 1, &code).with_handler(
        0,
        handler,
        handler,
        Some("java/lang/RuntimeException"),
    );
    vm.load_class(&ClassDefinition::new("demo/H").with_method(m)).unwrap();
    let v = returned(vm.call_static("demo/H", "f", &[Value::Int(1)]).unwrap());
    assert_eq!(v, Value::Int(7));
}

#[test]
fn test_exception_propagates_to_interpreted_caller() {
    let mut class = divider();
    let div = class.add_method_ref("demo/Div", "div", "(II)I");
    let mut caller = CodeBuilder::new();
    caller.iload(0).iconst(0).op_u2(Bytecode::Invokestatic, div).op(Bytecode::Ireturn);
    let handler = caller.pc() as u16;
    caller.op(Bytecode::Pop).op_u1(Bytecode::Bipush, 99).op(Bytecode::Ireturn);
    let class = class.with_method(static_method("caller", "(I)I", 1, &caller).with_handler(0, handler, handler, None));

    let mut vm = vm();
    vm.load_class(&class).unwrap();
    let v = returned(vm.call_static("demo/Div", "caller", &[Value::Int(5)]).unwrap());
    assert_eq!(v, Value::Int(99));
}

#[test]
fn test_handler_covering_only_a_resolved_invoke() {
    let mut class = divider();
    let div = class.add_method_ref("demo/Div", "div", "(II)I");
    let mut caller = CodeBuilder::new();
    caller.iload(0).iload(1);
    let start = caller.pc() as u16;
    caller.op_u2(Bytecode::Invokestatic, div);
    let end = caller.pc() as u16;
    caller.op(Bytecode::Ireturn);
    let handler = caller.pc() as u16;
    caller.op(Bytecode::Pop).iconst(-1).op(Bytecode::Ireturn);
    let class = class.with_method(static_method("caller", "(II)I", 2, &caller).with_handler(start, end, handler, None));

    let mut vm = vm();
    vm.load_class(&class).unwrap();
    let v = returned(vm.call_static("demo/Div", "caller", &[Value::Int(6), Value::Int(3)]).unwrap());
    assert_eq!(v, Value::Int(2));
    // the call site is resolved now; the handler must still see the invoke
    for _ in 0..2 {
        let v = returned(vm.call_static("demo/Div", "caller", &[Value::Int(1), Value::Int(0)]).unwrap());
        assert_eq!(v, Value::Int(-1));
    }
}

#[test]
fn test_recursion_returns_through_each_frame() {
    // count(n) = n == 0 ? 0 : count(n - 1) + 1
    let mut class = ClassDefinition::new("demo/Count");
    let count = class.add_method_ref("demo/Count", "count", "(I)I");
    let mut code = CodeBuilder::new();
    let recurse = code.new_label();
    code.iload(0).branch(Bytecode::Ifne, recurse);
    code.iconst(0).op(Bytecode::Ireturn);
    code.bind(recurse);
    code.iload(0)
        .iconst(1)
        .op(Bytecode::Isub)
        .op_u2(Bytecode::Invokestatic, count)
        .iconst(1)
        .op(Bytecode::Iadd)
        .op(Bytecode::Ireturn);
    let class = class.with_method(static_method("count", "(I)I", 1, &code));

    let mut vm = vm();
    vm.load_class(&class).unwrap();
    for n in [1, 2, 3, 5, 12] {
        let v = returned(vm.call_static("demo/Count", "count", &[Value::Int(n)]).unwrap());
        assert_eq!(v, Value::Int(n));
    }
}

#[test]
fn test_uncaught_exception_unwinds_every_frame() {
    let mut class = divider();
    let div = class.add_method_ref("demo/Div", "div", "(II)I");
    let mut middle = CodeBuilder::new();
    middle.iload(0).iconst(0).op_u2(Bytecode::Invokestatic, div).op(Bytecode::Ireturn);
    let mut class = class.with_method(static_method("middle", "(I)I", 1, &middle));
    let middle_ref = class.add_method_ref("demo/Div", "middle", "(I)I");
    let mut outer = CodeBuilder::new();
    outer.iload(0).op_u2(Bytecode::Invokestatic, middle_ref).op(Bytecode::Ireturn);
    let class = class.with_method(static_method("outer", "(I)I", 1, &outer));

    let mut vm = vm();
    vm.load_class(&class).unwrap();
    let outcome = vm.call_static("demo/Div", "outer", &[Value::Int(3)]).unwrap();
    assert_eq!(threw(&outcome), ("java/lang/ArithmeticException", Some("/ by zero")));

    // the VM is usable afterwards
    let v = returned(
        vm.call_static("demo/Div", "div", &[Value::Int(8), Value::Int(2)])
            .unwrap(),
    );
    assert_eq!(v, Value::Int(4));
}

#[test]
fn test_athrow_rethrows_given_exception() {
    let mut vm = vm();
    let mut code = CodeBuilder::new();
    code.aload(0).op(Bytecode::Athrow);
    vm.load_class(
        &ClassDefinition::new("demo/T").with_method(static_method("raise", "(Ljava/lang/Throwable;)V", 1, &code)),
    )
    .unwrap();
    let e = vm
        .allocate_exception(GuestException::IllegalMonitorState, Some("custom"))
        .unwrap();
    match vm.call_static("demo/T", "raise", &[Value::Object(e)]).unwrap() {
        CallOutcome::Threw {
            exception, message, ..
        } => {
            assert_eq!(exception, e);
            assert_eq!(message.as_deref(), Some("custom"));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_athrow_null_throws_npe() {
    let mut vm = vm();
    let mut code = CodeBuilder::new();
    code.op(Bytecode::AconstNull).op(Bytecode::Athrow);
    vm.load_class(&ClassDefinition::new("demo/T").with_method(static_method("raise", "()V", 0, &code)))
        .unwrap();
    let outcome = vm.call_static("demo/T", "raise", &[]).unwrap();
    assert_eq!(outcome.exception_class(), Some("java/lang/NullPointerException"));
}

// ============================================================================
// Arrays, Objects and Casts
// ============================================================================

fn arrays() -> ClassDefinition {
    let mut sum = CodeBuilder::new();
    let head = sum.new_label();
    let done = sum.new_label();
    sum.iconst(0).istore(1).iconst(0).istore(2);
    sum.bind(head);
    sum.iload(2).aload(0).op(Bytecode::Arraylength).branch(Bytecode::IfIcmpge, done);
    sum.iload(1).aload(0).iload(2).op(Bytecode::Iaload).op(Bytecode::Iadd).istore(1);
    sum.iinc(2, 1).branch(Bytecode::Goto, head);
    sum.bind(done);
    sum.iload(1).op(Bytecode::Ireturn);

    let mut get = CodeBuilder::new();
    get.aload(0).iload(1).op(Bytecode::Iaload).op(Bytecode::Ireturn);

    let mut put = CodeBuilder::new();
    put.aload(0).iload(1).iload(2).op(Bytecode::Iastore).op(Bytecode::Return);

    let mut make = CodeBuilder::new();
    make.iload(0).op_u1(Bytecode::Newarray, T_INT).op(Bytecode::Areturn);

    ClassDefinition::new("demo/Arrays")
        .with_method(static_method("sum", "([I)I", 3, &sum))
        .with_method(static_method("get", "([II)I", 2, &get))
        .with_method(static_method("put", "([III)V", 3, &put))
        .with_method(static_method("make", "(I)[I", 1, &make))
}

#[test]
fn test_array_sum() {
    let mut vm = vm();
    vm.load_class(&arrays()).unwrap();
    let array = vm.new_int_array(&[1, 2, 3, 4, -20]).unwrap();
    let v = returned(vm.call_static("demo/Arrays", "sum", &[Value::Object(array)]).unwrap());
    assert_eq!(v, Value::Int(-10));
}

#[test]
fn test_array_store() {
    let mut vm = vm();
    vm.load_class(&arrays()).unwrap();
    let array = vm.new_int_array(&[0, 0, 0]).unwrap();
    let outcome = vm
        .call_static(
            "demo/Arrays",
            "put",
            &[Value::Object(array), Value::Int(1), Value::Int(77)],
        )
        .unwrap();
    assert_eq!(outcome, CallOutcome::Returned(Value::Void));
    assert_eq!(vm.int_array(array).unwrap(), vec![0, 77, 0]);
}

#[test]
fn test_array_index_out_of_bounds() {
    let mut vm = vm();
    vm.load_class(&arrays()).unwrap();
    let array = vm.new_int_array(&[1, 2, 3]).unwrap();
    for index in [3, -1] {
        let outcome = vm
            .call_static("demo/Arrays", "get", &[Value::Object(array), Value::Int(index)])
            .unwrap();
        let expected = index.to_string();
        assert_eq!(
            threw(&outcome),
            ("java/lang/ArrayIndexOutOfBoundsException", Some(expected.as_str()))
        );
    }
}

#[test]
fn test_newarray() {
    let mut vm = vm();
    vm.load_class(&arrays()).unwrap();
    let v = returned(vm.call_static("demo/Arrays", "make", &[Value::Int(4)]).unwrap());
    let array = v.as_oop().unwrap();
    assert_eq!(vm.int_array(array).unwrap(), vec![0; 4]);

    let outcome = vm.call_static("demo/Arrays", "make", &[Value::Int(-2)]).unwrap();
    assert_eq!(outcome.exception_class(), Some("java/lang/NegativeArraySizeException"));
}

fn points() -> ClassDefinition {
    let mut class = ClassDefinition::new("demo/Point").with_field("x", "I");
    let x = class.add_field_ref("demo/Point", "x", "I");
    let point = class.add_class_ref("demo/Point");

    let mut get = CodeBuilder::new();
    get.aload(0).op_u2(Bytecode::Getfield, x).op(Bytecode::Ireturn);
    let mut set = CodeBuilder::new();
    set.aload(0).iload(1).op_u2(Bytecode::Putfield, x).op(Bytecode::Return);
    let mut make = CodeBuilder::new();
    make.op_u2(Bytecode::New, point)
        .op(Bytecode::Dup)
        .iload(0)
        .op_u2(Bytecode::Putfield, x)
        .op(Bytecode::Areturn);
    let mut cast = CodeBuilder::new();
    cast.aload(0).op_u2(Bytecode::Checkcast, point).op(Bytecode::Areturn);
    let mut accessor = CodeBuilder::new();
    accessor.aload(0).op_u2(Bytecode::Getfield, x).op(Bytecode::Ireturn);

    class
        .with_method(static_method("getX", "(Ldemo/Point;)I", 1, &get))
        .with_method(static_method("setX", "(Ldemo/Point;I)V", 2, &set))
        .with_method(static_method("make", "(I)Ldemo/Point;", 1, &make))
        .with_method(static_method("cast", "(Ljava/lang/Object;)Ldemo/Point;", 1, &cast))
        .with_method(
            MethodDefinition::new("x", "()I")
                .with_access(AccessFlags::PUBLIC)
                .with_code(accessor.finish().unwrap()),
        )
}

#[test]
fn test_getfield_and_putfield() {
    let mut vm = vm();
    let class = vm.load_class(&points()).unwrap();
    let p = vm.new_object(class).unwrap();
    vm.set_int_field(p, "x", 12).unwrap();
    let v = returned(vm.call_static("demo/Point", "getX", &[Value::Object(p)]).unwrap());
    assert_eq!(v, Value::Int(12));

    vm.call_static("demo/Point", "setX", &[Value::Object(p), Value::Int(-4)])
        .unwrap();
    assert_eq!(vm.int_field(p, "x").unwrap(), -4);
}

#[test]
fn test_getfield_on_null_throws_npe() {
    let mut vm = vm();
    vm.load_class(&points()).unwrap();
    let outcome = vm.call_static("demo/Point", "getX", &[Value::NULL]).unwrap();
    assert_eq!(outcome.exception_class(), Some("java/lang/NullPointerException"));
}

#[test]
fn test_new_initializes_instance() {
    let mut vm = vm();
    vm.load_class(&points()).unwrap();
    let v = returned(vm.call_static("demo/Point", "make", &[Value::Int(31)]).unwrap());
    let p = v.as_oop().unwrap();
    assert_eq!(vm.class_name_of(p).unwrap(), "demo/Point");
    assert_eq!(vm.int_field(p, "x").unwrap(), 31);
}

#[test]
fn test_checkcast() {
    let mut vm = vm();
    let class = vm.load_class(&points()).unwrap();
    let p = vm.new_object(class).unwrap();
    let v = returned(vm.call_static("demo/Point", "cast", &[Value::Object(p)]).unwrap());
    assert_eq!(v, Value::Object(p));
    let v = returned(vm.call_static("demo/Point", "cast", &[Value::NULL]).unwrap());
    assert_eq!(v, Value::NULL);

    let array = vm.new_int_array(&[1]).unwrap();
    let outcome = vm.call_static("demo/Point", "cast", &[Value::Object(array)]).unwrap();
    assert_eq!(threw(&outcome), ("java/lang/ClassCastException", Some("[I")));
}

#[test]
fn test_accessor_entry() {
    let mut vm = vm();
    let class = vm.load_class(&points()).unwrap();
    let p = vm.new_object(class).unwrap();
    vm.set_int_field(p, "x", 5).unwrap();
    // first call resolves through the normal entry, the second takes the
    // fast path
    for _ in 0..2 {
        let v = returned(vm.call_instance("demo/Point", "x", p, &[]).unwrap());
        assert_eq!(v, Value::Int(5));
    }
    let outcome = vm.call_instance("demo/Point", "x", 0, &[]).unwrap();
    assert_eq!(outcome.exception_class(), Some("java/lang/NullPointerException"));
}

// ============================================================================
// Linkage
// ============================================================================

#[test]
fn test_missing_class_throws_no_class_def_found() {
    let mut class = ClassDefinition::new("demo/L");
    let missing = class.add_class_ref("demo/Missing");
    let mut code = CodeBuilder::new();
    code.op_u2(Bytecode::New, missing).op(Bytecode::Areturn);
    let class = class.with_method(static_method("make", "()Ljava/lang/Object;", 0, &code));
    let mut vm = vm();
    vm.load_class(&class).unwrap();
    let outcome = vm.call_static("demo/L", "make", &[]).unwrap();
    assert_eq!(threw(&outcome), ("java/lang/NoClassDefFoundError", Some("demo/Missing")));
}

#[test]
fn test_missing_method_throws_no_such_method() {
    let mut class = ClassDefinition::new("demo/L");
    let missing = class.add_method_ref("demo/L", "ghost", "()V");
    let mut code = CodeBuilder::new();
    code.op_u2(Bytecode::Invokestatic, missing).op(Bytecode::Return);
    let class = class.with_method(static_method("call", "()V", 0, &code));
    let mut vm = vm();
    vm.load_class(&class).unwrap();
    let outcome = vm.call_static("demo/L", "call", &[]).unwrap();
    assert_eq!(outcome.exception_class(), Some("java/lang/NoSuchMethodError"));
}

fn call_site_class() -> ClassDefinition {
    let mut class = ClassDefinition::new("demo/Indy");
    let site = class.add_call_site("demo/Indy", "twice", "(I)I");
    let mut twice = CodeBuilder::new();
    twice.iload(0).iload(0).op(Bytecode::Iadd).op(Bytecode::Ireturn);
    let mut caller = CodeBuilder::new();
    caller
        .iload(0)
        .cp_op(Bytecode::Invokedynamic, site)
        .iconst(1)
        .op(Bytecode::Iadd)
        .op(Bytecode::Ireturn);
    class
        .with_method(static_method("twice", "(I)I", 1, &twice))
        .with_method(static_method("run", "(I)I", 1, &caller))
}

#[test]
fn test_invokedynamic_links_to_static_target() {
    let mut vm = vm();
    vm.load_class(&call_site_class()).unwrap();
    let v = returned(vm.call_static("demo/Indy", "run", &[Value::Int(20)]).unwrap());
    assert_eq!(v, Value::Int(41));
}

#[test]
fn test_invokedynamic_disabled() {
    let mut vm = Vm::new(InterpreterConfig::default().with_invoke_dynamic(false)).unwrap();
    vm.load_class(&call_site_class()).unwrap();
    let outcome = vm.call_static("demo/Indy", "run", &[Value::Int(20)]).unwrap();
    assert_eq!(outcome.exception_class(), Some("java/lang/IncompatibleClassChangeError"));
}
