//! Diagnostics scenarios
//!
//! Bytecode counting, the histogram, tracing, the stop counter, the
//! simulator step limit and oop verification.

use bytecode_system::{Bytecode, ClassDefinition, CodeBuilder};
use core_types::{Value, VmError};
use integration_tests::{returned, static_method, vm, vm_with};
use interpreter::InterpreterConfig;

fn program() -> ClassDefinition {
    let mut add = CodeBuilder::new();
    add.iload(0).iload(1).op(Bytecode::Iadd).op(Bytecode::Ireturn);

    // sum(n) = 1 + ... + n; locals: n, acc, i
    let mut sum = CodeBuilder::new();
    let head = sum.new_label();
    let done = sum.new_label();
    sum.iconst(0).istore(1).iconst(1).istore(2);
    sum.bind(head);
    sum.iload(2).iload(0).branch(Bytecode::IfIcmpgt, done);
    sum.iload(1).iload(2).op(Bytecode::Iadd).istore(1);
    sum.iinc(2, 1).branch(Bytecode::Goto, head);
    sum.bind(done);
    sum.iload(1).op(Bytecode::Ireturn);

    let mut same = CodeBuilder::new();
    same.aload(0).op(Bytecode::Areturn);

    ClassDefinition::new("demo/Diag")
        .with_method(static_method("add", "(II)I", 2, &add))
        .with_method(static_method("sum", "(I)I", 3, &sum))
        .with_method(static_method("same", "([I)[I", 1, &same))
}

#[test]
fn test_bytecode_counter() {
    let mut vm = vm_with(InterpreterConfig::default().with_count_bytecodes(true));
    vm.load_class(&program()).unwrap();
    returned(vm.call_static("demo/Diag", "add", &[Value::Int(1), Value::Int(2)]).unwrap());
    assert_eq!(vm.bytecode_count().unwrap(), 4);
    returned(vm.call_static("demo/Diag", "add", &[Value::Int(1), Value::Int(2)]).unwrap());
    assert_eq!(vm.bytecode_count().unwrap(), 8);
}

#[test]
fn test_counter_stays_zero_when_off() {
    let mut vm = vm();
    vm.load_class(&program()).unwrap();
    returned(vm.call_static("demo/Diag", "sum", &[Value::Int(10)]).unwrap());
    assert_eq!(vm.bytecode_count().unwrap(), 0);
    assert!(vm.bytecode_histogram().unwrap().is_empty());
    assert_eq!(vm.trace_records().count(), 0);
}

#[test]
fn test_histogram_counts_each_bytecode() {
    let mut vm = vm_with(InterpreterConfig::default().with_bytecode_histogram(true));
    vm.load_class(&program()).unwrap();
    let v = returned(vm.call_static("demo/Diag", "sum", &[Value::Int(3)]).unwrap());
    assert_eq!(v, Value::Int(6));

    let histogram = vm.bytecode_histogram().unwrap();
    let count = |bc: Bytecode| histogram.iter().find(|(b, _)| *b == bc).map_or(0, |&(_, n)| n);
    assert_eq!(count(Bytecode::Iadd), 3);
    assert_eq!(count(Bytecode::Iinc), 3);
    assert_eq!(count(Bytecode::Goto), 3);
    assert_eq!(count(Bytecode::IfIcmpgt), 4);
    assert_eq!(count(Bytecode::Ireturn), 1);
    // most frequent first
    assert!(histogram.windows(2).all(|w| w[0].1 >= w[1].1));
}

#[test]
fn test_trace_records_each_bytecode_of_a_call() {
    let mut vm = vm_with(InterpreterConfig::default().with_trace_bytecodes(true));
    vm.load_class(&program()).unwrap();
    returned(vm.call_static("demo/Diag", "add", &[Value::Int(5), Value::Int(6)]).unwrap());

    let records: Vec<_> = vm
        .trace_records()
        .filter(|r| r.method == "demo/Diag.add(II)I")
        .collect();
    let bytecodes: Vec<_> = records.iter().map(|r| r.bytecode).collect();
    assert_eq!(
        bytecodes,
        vec![
            Some(Bytecode::Iload0),
            Some(Bytecode::Iload1),
            Some(Bytecode::Iadd),
            Some(Bytecode::Ireturn)
        ]
    );
    let bcis: Vec<_> = records.iter().map(|r| r.bci).collect();
    assert_eq!(bcis, vec![0, 1, 2, 3]);
}

#[test]
fn test_stop_interpreter_at_hits_breakpoint() {
    let config = InterpreterConfig::default()
        .with_count_bytecodes(true)
        .with_stop_interpreter_at(10);
    let mut vm = vm_with(config);
    vm.load_class(&program()).unwrap();
    let err = vm.call_static("demo/Diag", "sum", &[Value::Int(100)]).unwrap_err();
    assert!(matches!(err, VmError::Breakpoint { count: 10, .. }), "{:?}", err);
}

#[test]
fn test_step_limit_stops_runaway_code() {
    let mut vm = vm_with(InterpreterConfig::default().with_max_steps(500));
    vm.load_class(&program()).unwrap();
    let err = vm.call_static("demo/Diag", "sum", &[Value::Int(1_000_000)]).unwrap_err();
    assert_eq!(err, VmError::StepLimitExceeded(500));
}

#[test]
fn test_verify_oops_accepts_heap_references() {
    let mut vm = vm_with(InterpreterConfig::default().with_verify_oops(true));
    vm.load_class(&program()).unwrap();
    let array = vm.new_int_array(&[4, 5]).unwrap();
    let v = returned(vm.call_static("demo/Diag", "same", &[Value::Object(array)]).unwrap());
    assert_eq!(v, Value::Object(array));
    let v = returned(vm.call_static("demo/Diag", "same", &[Value::Object(0)]).unwrap());
    assert_eq!(v, Value::Object(0));
}

#[test]
fn test_diagnostics_do_not_change_results() {
    let config = InterpreterConfig::default()
        .with_count_bytecodes(true)
        .with_bytecode_histogram(true)
        .with_trace_bytecodes(true)
        .with_verify_oops(true)
        .with_debug_checks(true);
    let mut plain = vm();
    let mut checked = vm_with(config);
    plain.load_class(&program()).unwrap();
    checked.load_class(&program()).unwrap();
    for n in [0, 1, 7, 50] {
        let a = returned(plain.call_static("demo/Diag", "sum", &[Value::Int(n)]).unwrap());
        let b = returned(checked.call_static("demo/Diag", "sum", &[Value::Int(n)]).unwrap());
        assert_eq!(a, b);
    }
}
