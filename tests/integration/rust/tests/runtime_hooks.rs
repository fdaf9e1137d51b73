//! Collaborator scenarios
//!
//! Debugger events and frame popping, the compilation policy, safepoint
//! operations and native call observers, each driven through real
//! generated code.

use bytecode_system::{Bytecode, ClassDefinition, CodeBuilder, MethodDefinition};
use core_types::{AccessFlags, TosState, Value};
use integration_tests::{returned, static_method, vm, vm_with};
use interpreter::{
    CallOutcome, CompilationPolicy, DebuggerAction, DebuggerHooks, InterpreterConfig, MethodEvent, NativeCallHook,
    NativeCallRequest,
};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// `caller(a, b) = callee(a, b) * 2` and `callee(a, b) = a - b`.
fn call_chain() -> ClassDefinition {
    let mut callee = CodeBuilder::new();
    callee.iload(0).iload(1).op(Bytecode::Isub).op(Bytecode::Ireturn);
    let mut class = ClassDefinition::new("demo/Chain").with_method(static_method("callee", "(II)I", 2, &callee));
    let callee_ref = class.add_method_ref("demo/Chain", "callee", "(II)I");
    let mut caller = CodeBuilder::new();
    caller
        .iload(0)
        .iload(1)
        .op_u2(Bytecode::Invokestatic, callee_ref)
        .iconst(2)
        .op(Bytecode::Imul)
        .op(Bytecode::Ireturn);
    class.with_method(static_method("caller", "(II)I", 2, &caller))
}

// ============================================================================
// Debugger
// ============================================================================

#[derive(Default)]
struct Log {
    entries: Vec<String>,
    exits: Vec<(String, TosState)>,
}

/// Records events; pops the first activation of `pop` when set.
struct Recorder {
    log: Rc<RefCell<Log>>,
    pop: Option<&'static str>,
}

impl DebuggerHooks for Recorder {
    fn method_entry(&mut self, method: &MethodEvent) -> DebuggerAction {
        self.log.borrow_mut().entries.push(method.to_string());
        if self.pop == Some(method.method_name.as_str()) {
            self.pop = None;
            return DebuggerAction::PopFrame;
        }
        DebuggerAction::Continue
    }

    fn method_exit(&mut self, method: &MethodEvent, tos: TosState) -> DebuggerAction {
        self.log.borrow_mut().exits.push((method.to_string(), tos));
        DebuggerAction::Continue
    }
}

fn recorder(pop: Option<&'static str>) -> (Box<Recorder>, Rc<RefCell<Log>>) {
    let log = Rc::new(RefCell::new(Log::default()));
    (
        Box::new(Recorder {
            log: Rc::clone(&log),
            pop,
        }),
        log,
    )
}

#[test]
fn test_debugger_sees_entries_and_exits_in_order() {
    let mut vm = vm();
    vm.load_class(&call_chain()).unwrap();
    let (debugger, log) = recorder(None);
    vm.set_debugger(debugger).unwrap();

    let v = returned(vm.call_static("demo/Chain", "caller", &[Value::Int(9), Value::Int(4)]).unwrap());
    assert_eq!(v, Value::Int(10));

    let log = log.borrow();
    assert_eq!(log.entries, vec!["demo/Chain.caller(II)I", "demo/Chain.callee(II)I"]);
    assert_eq!(
        log.exits,
        vec![
            ("demo/Chain.callee(II)I".to_string(), TosState::Itos),
            ("demo/Chain.caller(II)I".to_string(), TosState::Itos),
        ]
    );
}

#[test]
fn test_no_events_without_debugger() {
    let mut vm = vm();
    vm.load_class(&call_chain()).unwrap();
    let (debugger, log) = recorder(None);
    vm.set_debugger(debugger).unwrap();
    vm.clear_debugger().unwrap();
    returned(vm.call_static("demo/Chain", "caller", &[Value::Int(1), Value::Int(1)]).unwrap());
    assert!(log.borrow().entries.is_empty());
}

#[test]
fn test_popframe_reexecutes_invoke_in_interpreted_caller() {
    let mut vm = vm();
    vm.load_class(&call_chain()).unwrap();
    let (debugger, log) = recorder(Some("callee"));
    vm.set_debugger(debugger).unwrap();

    let v = returned(vm.call_static("demo/Chain", "caller", &[Value::Int(9), Value::Int(4)]).unwrap());
    assert_eq!(v, Value::Int(10));
    assert_eq!(
        log.borrow().entries,
        vec![
            "demo/Chain.caller(II)I",
            "demo/Chain.callee(II)I",
            "demo/Chain.callee(II)I"
        ]
    );
}

#[test]
fn test_popframe_reexecutes_an_already_resolved_invoke() {
    let mut vm = vm();
    vm.load_class(&call_chain()).unwrap();
    // resolve the call site without any debugger attached
    let v = returned(vm.call_static("demo/Chain", "caller", &[Value::Int(3), Value::Int(1)]).unwrap());
    assert_eq!(v, Value::Int(4));

    let (debugger, log) = recorder(Some("callee"));
    vm.set_debugger(debugger).unwrap();
    let v = returned(vm.call_static("demo/Chain", "caller", &[Value::Int(9), Value::Int(4)]).unwrap());
    assert_eq!(v, Value::Int(10));
    assert_eq!(
        log.borrow().entries,
        vec![
            "demo/Chain.caller(II)I",
            "demo/Chain.callee(II)I",
            "demo/Chain.callee(II)I"
        ]
    );
}

#[test]
fn test_popframe_of_outermost_frame_preserves_arguments() {
    let mut vm = vm();
    vm.load_class(&call_chain()).unwrap();
    let (debugger, _log) = recorder(Some("callee"));
    vm.set_debugger(debugger).unwrap();

    let outcome = vm.call_static("demo/Chain", "callee", &[Value::Int(7), Value::Int(9)]).unwrap();
    assert_eq!(
        outcome,
        CallOutcome::FramePopped {
            preserved_args: vec![7, 9]
        }
    );

    // the condition is cleared; the next call runs normally
    let v = returned(vm.call_static("demo/Chain", "callee", &[Value::Int(7), Value::Int(9)]).unwrap());
    assert_eq!(v, Value::Int(-2));
}

// ============================================================================
// Compilation Policy
// ============================================================================

struct CountingPolicy {
    events: Rc<RefCell<Vec<(String, u32)>>>,
}

impl CompilationPolicy for CountingPolicy {
    fn invocation_counter_overflow(&mut self, method: &MethodEvent, count: u32) {
        self.events.borrow_mut().push((method.to_string(), count));
    }
}

#[test]
fn test_invocation_counter_overflow_posts_once() {
    let mut vm = vm_with(InterpreterConfig::default().with_compile_threshold(3));
    let class = vm.load_class(&call_chain()).unwrap();
    let events = Rc::new(RefCell::new(Vec::new()));
    vm.set_compilation_policy(Box::new(CountingPolicy {
        events: Rc::clone(&events),
    }));

    for _ in 0..5 {
        returned(vm.call_static("demo/Chain", "callee", &[Value::Int(1), Value::Int(2)]).unwrap());
    }
    assert_eq!(vm.invocation_count(class, "callee").unwrap(), 5);
    assert_eq!(*events.borrow(), vec![("demo/Chain.callee(II)I".to_string(), 3)]);
}

#[test]
fn test_no_counting_without_compiler() {
    let config = InterpreterConfig::default()
        .with_compiler(false)
        .with_compile_threshold(1);
    let mut vm = vm_with(config);
    let class = vm.load_class(&call_chain()).unwrap();
    returned(vm.call_static("demo/Chain", "callee", &[Value::Int(1), Value::Int(2)]).unwrap());
    assert_eq!(vm.invocation_count(class, "callee").unwrap(), 0);
}

// ============================================================================
// Safepoints
// ============================================================================

fn long_loop() -> ClassDefinition {
    // locals: n, acc, i
    let mut code = CodeBuilder::new();
    let head = code.new_label();
    let done = code.new_label();
    code.iconst(0).istore(1).iconst(0).istore(2);
    code.bind(head);
    code.iload(2).iload(0).branch(Bytecode::IfIcmpge, done);
    code.iinc(1, 3).iinc(2, 1).branch(Bytecode::Goto, head);
    code.bind(done);
    code.iload(1).op(Bytecode::Ireturn);
    ClassDefinition::new("demo/Spin").with_method(static_method("spin", "(I)I", 3, &code))
}

#[test]
fn test_safepoint_operation_runs_during_loop() {
    let mut vm = vm();
    vm.load_class(&long_loop()).unwrap();
    let ran = Arc::new(AtomicUsize::new(0));
    let flag = Arc::clone(&ran);
    let handle = vm.safepoint();
    handle.request("count", Box::new(move || {
        flag.fetch_add(1, Ordering::SeqCst);
    }));
    assert!(handle.is_pending());
    assert_eq!(handle.pending_operations(), 1);

    let v = returned(vm.call_static("demo/Spin", "spin", &[Value::Int(2000)]).unwrap());
    assert_eq!(v, Value::Int(6000));
    assert_eq!(ran.load(Ordering::SeqCst), 1);
    assert!(!handle.is_pending());
    let stats = vm.safepoint_stats();
    assert_eq!(stats.safepoints, 1);
    assert_eq!(stats.operations, 1);
}

#[test]
fn test_safepoint_from_another_thread() {
    let mut vm = vm();
    vm.load_class(&long_loop()).unwrap();
    let handle = vm.safepoint();
    std::thread::spawn(move || handle.begin()).join().unwrap();
    let v = returned(vm.call_static("demo/Spin", "spin", &[Value::Int(2000)]).unwrap());
    assert_eq!(v, Value::Int(6000));
    assert_eq!(vm.safepoint_stats().safepoints, 1);
}

// ============================================================================
// Native Call Observers
// ============================================================================

extern "C" fn triple(_env: u64, _class: u64, x: i32) -> i32 {
    x * 3
}

struct Requesting {
    request: NativeCallRequest,
    calls: Rc<RefCell<u32>>,
}

impl NativeCallHook for Requesting {
    fn after_native_call(&mut self, _target: u64) -> NativeCallRequest {
        *self.calls.borrow_mut() += 1;
        self.request
    }
}

fn native_caller() -> ClassDefinition {
    let native = MethodDefinition::new("triple", "(I)I")
        .with_access(AccessFlags::PUBLIC | AccessFlags::STATIC | AccessFlags::NATIVE);
    let mut class = ClassDefinition::new("demo/Nat").with_method(native);
    let triple_ref = class.add_method_ref("demo/Nat", "triple", "(I)I");
    let mut code = CodeBuilder::new();
    code.iload(0)
        .op_u2(Bytecode::Invokestatic, triple_ref)
        .iconst(1)
        .op(Bytecode::Iadd)
        .op(Bytecode::Ireturn);
    class.with_method(static_method("run", "(I)I", 1, &code))
}

fn run_with_request(request: NativeCallRequest) -> (interpreter::Vm, u32) {
    let mut vm = vm();
    vm.load_class(&native_caller()).unwrap();
    unsafe { vm.register_native("demo/Nat", "triple", triple as *const (), "(I)I") }.unwrap();
    let calls = Rc::new(RefCell::new(0));
    vm.set_native_call_hook(Box::new(Requesting {
        request,
        calls: Rc::clone(&calls),
    }));
    let v = returned(vm.call_static("demo/Nat", "run", &[Value::Int(5)]).unwrap());
    assert_eq!(v, Value::Int(16));
    let calls = *calls.borrow();
    (vm, calls)
}

#[test]
fn test_native_hook_sees_every_call() {
    let (vm, calls) = run_with_request(NativeCallRequest::None);
    assert_eq!(calls, 1);
    assert_eq!(vm.safepoint_stats().safepoints, 0);
}

#[test]
fn test_safepoint_requested_during_native_call_completes_on_return() {
    let (vm, _) = run_with_request(NativeCallRequest::Safepoint);
    assert_eq!(vm.safepoint_stats().safepoints, 1);
    assert!(!vm.safepoint().is_pending());
}

#[test]
fn test_suspend_requested_during_native_call_resumes() {
    let (_vm, calls) = run_with_request(NativeCallRequest::Suspend);
    assert_eq!(calls, 1);
}
