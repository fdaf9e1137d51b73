//! Virtual machine façade
//!
//! Ties the generated interpreter, the simulator and the runtime together:
//! load classes, bind natives, install collaborators and call methods
//! through the call stub.

use crate::config::InterpreterConfig;
use crate::generator::{Interpreter, REFERENT_OFFSET, VMTARGET_OFFSET};
use crate::layout::{BYTECODE_COUNTER, BYTECODE_HISTOGRAM, HOST_RETURN, SATB_MARKING_ACTIVE};
use crate::metadata::method;
use crate::runtime::hooks::{CompilationPolicy, DebuggerHooks, GuardPolicy, NativeCallHook};
use crate::runtime::safepoint::{SafepointHandle, SafepointStats};
use crate::runtime::universe::{element_size, KlassId, MethodId, METHOD_HANDLE, REFERENCE};
use crate::runtime::{Runtime, TraceRecord};
use crate::simulator::{Simulator, StepEvent};
use assembler::registers::{C_RARGS, LR, RFP, SP};
use bytecode_system::{Bytecode, ClassDefinition};
use core_types::{
    BasicType, GuestException, Oop, PopframeCondition, StackGuardState, ThreadState, Value, VmError, VmResult,
};
use memory_manager::layout::{ARRAY_BASE_OFFSET, ARRAY_LENGTH_OFFSET};
use memory_manager::HeapStats;

/// Steps between safepoint polls of the run loop.
pub const SAFEPOINT_POLL_INTERVAL: u64 = 256;

/// A loaded class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassHandle(KlassId);

/// How a call ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    /// Normal return
    Returned(Value),
    /// An exception escaped the outermost frame
    Threw {
        /// Exception object
        exception: Oop,
        /// Internal class name
        class_name: String,
        /// Detail message
        message: Option<String>,
    },
    /// A debugger popped the outermost frame
    FramePopped {
        /// The call's arguments as the callee last saw them, first
        /// parameter first
        preserved_args: Vec<u64>,
    },
}

impl CallOutcome {
    /// The returned value, if the call returned.
    pub fn value(&self) -> Option<Value> {
        match self {
            CallOutcome::Returned(v) => Some(*v),
            _ => None,
        }
    }

    /// Class of the escaping exception, if one escaped.
    pub fn exception_class(&self) -> Option<&str> {
        match self {
            CallOutcome::Threw { class_name, .. } => Some(class_name),
            _ => None,
        }
    }
}

/// Virtual machine running generated interpreter code.
#[derive(Debug)]
pub struct Vm {
    runtime: Runtime,
    simulator: Simulator,
}

impl Vm {
    /// Generate the interpreter for `config` and bootstrap the VM.
    ///
    /// # Errors
    ///
    /// Fails when the configuration is invalid or code generation fails.
    pub fn new(config: InterpreterConfig) -> VmResult<Self> {
        config.validate()?;
        let runtime = Runtime::new(&config)?;
        log::info!(
            "interpreter generated: {} bytes of code",
            runtime.interpreter.bounds().1 - runtime.interpreter.bounds().0
        );
        Ok(Self {
            simulator: Simulator::new(config.max_steps),
            runtime,
        })
    }

    /// Generated code.
    pub fn interpreter(&self) -> &Interpreter {
        &self.runtime.interpreter
    }

    /// Settings the VM runs with.
    pub fn config(&self) -> &InterpreterConfig {
        &self.runtime.config
    }

    /// Load a class.
    ///
    /// # Arguments
    ///
    /// * `def` - The class; its superclass must already be loaded
    pub fn load_class(&mut self, def: &ClassDefinition) -> VmResult<ClassHandle> {
        let rt = &mut self.runtime;
        rt.universe.load(&mut rt.mem, &mut rt.heap, def).map(ClassHandle)
    }

    /// Handle of the loaded class `name`.
    pub fn class(&self, name: &str) -> Option<ClassHandle> {
        self.runtime.universe.klass_id(name).map(ClassHandle)
    }

    /// Bind the native method `class.name` with `descriptor` to `function`.
    ///
    /// # Safety
    ///
    /// `function` must be an `extern "C"` function taking the environment,
    /// the receiver or class handle and then the declared parameters
    /// (`int`-like as `i32`, `long` and references as `u64`, `float` as
    /// `f32`, `double` as `f64`) and returning the declared result the same
    /// way. It stays callable for the life of the VM.
    pub unsafe fn register_native(
        &mut self,
        class: &str,
        name: &str,
        function: *const (),
        descriptor: &str,
    ) -> VmResult<()> {
        self.runtime
            .natives
            .register(class, name, function as usize as u64, descriptor)
    }

    /// Install a debugger. Method entry and exit events are posted while
    /// one is installed.
    pub fn set_debugger(&mut self, debugger: Box<dyn DebuggerHooks>) -> VmResult<()> {
        self.runtime.hooks.debugger = Some(debugger);
        self.runtime
            .thread
            .set_interp_only_mode(&mut self.runtime.mem, true)
    }

    /// Remove the debugger.
    pub fn clear_debugger(&mut self) -> VmResult<()> {
        self.runtime.hooks.debugger = None;
        self.runtime
            .thread
            .set_interp_only_mode(&mut self.runtime.mem, false)
    }

    /// Replace the compilation policy.
    pub fn set_compilation_policy(&mut self, policy: Box<dyn CompilationPolicy>) {
        self.runtime.hooks.compilation = policy;
    }

    /// Observe native calls.
    pub fn set_native_call_hook(&mut self, hook: Box<dyn NativeCallHook>) {
        self.runtime.hooks.native_call = Some(hook);
    }

    /// Replace the yellow-zone re-arming policy.
    pub fn set_guard_policy(&mut self, policy: Box<dyn GuardPolicy>) {
        self.runtime.hooks.guard = policy;
    }

    /// Handle for requesting safepoints from outside the run loop.
    pub fn safepoint(&self) -> SafepointHandle {
        self.runtime.safepoints.handle()
    }

    /// Safepoint counters.
    pub fn safepoint_stats(&self) -> SafepointStats {
        self.runtime.safepoints.stats()
    }

    /// Ask for the top frame to be popped at its next VM call.
    pub fn request_popframe(&mut self) -> VmResult<()> {
        let rt = &mut self.runtime;
        let condition = rt.thread.popframe_condition(&rt.mem)? | PopframeCondition::PENDING;
        rt.thread.set_popframe_condition(&mut rt.mem, condition)
    }

    /// Start or stop concurrent marking for the SATB barrier.
    pub fn set_concurrent_marking(&mut self, active: bool) -> VmResult<()> {
        self.runtime.satb.set_marking_active(active);
        self.runtime.mem.write_u8(SATB_MARKING_ACTIVE, active as u8)
    }

    /// References recorded by the SATB barrier since the last drain.
    pub fn drain_satb_queue(&mut self) -> Vec<Oop> {
        self.runtime.satb.drain()
    }

    /// The `java/lang/Class` instance of `class`; static synchronized
    /// methods lock it.
    pub fn mirror(&self, class: ClassHandle) -> Oop {
        self.runtime.universe.klass(class.0).mirror
    }

    /// Whether some monitor currently holds `obj`.
    pub fn is_locked(&self, obj: Oop) -> bool {
        self.runtime.locks.contains_key(&obj)
    }

    /// Allocate an instance of `class` with zeroed fields.
    pub fn new_object(&mut self, class: ClassHandle) -> VmResult<Oop> {
        let rt = &mut self.runtime;
        let klass = rt.universe.klass(class.0);
        let (address, slots) = (klass.address, klass.fields.len());
        rt.heap.allocate_instance(&mut rt.mem, address, slots)
    }

    /// Allocate an `int[]` holding `values`.
    pub fn new_int_array(&mut self, values: &[i32]) -> VmResult<Oop> {
        let rt = &mut self.runtime;
        let id = rt
            .universe
            .array_klass(BasicType::Int)
            .ok_or_else(|| VmError::Internal("int[] is not loaded".to_string()))?;
        let klass = rt.universe.klass(id).address;
        let oop = rt
            .heap
            .allocate_array(&mut rt.mem, klass, element_size(BasicType::Int), values.len() as u32)?;
        for (i, &v) in values.iter().enumerate() {
            rt.mem
                .write_u32(oop + ARRAY_BASE_OFFSET as u64 + i as u64 * 4, v as u32)?;
        }
        Ok(oop)
    }

    /// Elements of the `int[]` at `array`.
    pub fn int_array(&self, array: Oop) -> VmResult<Vec<i32>> {
        let mem = &self.runtime.mem;
        let len = mem.read_u32(array + ARRAY_LENGTH_OFFSET as u64)?;
        (0..len as u64)
            .map(|i| Ok(mem.read_u32(array + ARRAY_BASE_OFFSET as u64 + i * 4)? as i32))
            .collect()
    }

    /// Allocate an exception of `kind` carrying `message`.
    pub fn allocate_exception(&mut self, kind: GuestException, message: Option<&str>) -> VmResult<Oop> {
        self.runtime
            .allocate_exception(kind, message.map(str::to_string))
    }

    /// Detail message of an exception object.
    pub fn exception_message(&self, exception: Oop) -> Option<&str> {
        self.runtime.messages.get(&exception).map(String::as_str)
    }

    /// Internal class name of the object at `oop`.
    pub fn class_name_of(&self, oop: Oop) -> VmResult<&str> {
        let id = self.runtime.universe.klass_of(&self.runtime.mem, oop)?;
        Ok(&self.runtime.universe.klass(id).name)
    }

    fn field_offset(&self, obj: Oop, name: &str, descriptor: &str) -> VmResult<i64> {
        let id = self.runtime.universe.klass_of(&self.runtime.mem, obj)?;
        self.runtime
            .universe
            .find_field(id, name, descriptor)
            .map(|f| f.offset)
            .ok_or_else(|| VmError::Linkage(format!("no field {}:{}", name, descriptor)))
    }

    /// Read the `int` field `name` of `obj`.
    pub fn int_field(&self, obj: Oop, name: &str) -> VmResult<i32> {
        let offset = self.field_offset(obj, name, "I")?;
        Ok(self.runtime.mem.read_u32(obj + offset as u64)? as i32)
    }

    /// Write the `int` field `name` of `obj`.
    pub fn set_int_field(&mut self, obj: Oop, name: &str, value: i32) -> VmResult<()> {
        let offset = self.field_offset(obj, name, "I")?;
        self.runtime.mem.write_u32(obj + offset as u64, value as u32)
    }

    /// Read the reference field `name` with `descriptor` of `obj`.
    pub fn object_field(&self, obj: Oop, name: &str, descriptor: &str) -> VmResult<Oop> {
        let offset = self.field_offset(obj, name, descriptor)?;
        self.runtime.mem.read_u64(obj + offset as u64)
    }

    /// Write the reference field `name` with `descriptor` of `obj`.
    pub fn set_object_field(&mut self, obj: Oop, name: &str, descriptor: &str, value: Oop) -> VmResult<()> {
        let offset = self.field_offset(obj, name, descriptor)?;
        self.runtime.mem.write_u64(obj + offset as u64, value)
    }

    /// Invocation counter of `class.name` (first method with that name).
    pub fn invocation_count(&self, class: ClassHandle, name: &str) -> VmResult<u32> {
        let id = self
            .runtime
            .universe
            .find_method(class.0, name, None)
            .ok_or_else(|| VmError::Linkage(format!("no method {}", name)))?;
        let address = self.runtime.universe.method(id).address;
        self.runtime
            .mem
            .read_u32(address + method::INVOCATION_COUNTER as u64)
    }

    /// Count executions of the generated instruction at `pc`.
    pub fn watch_pc(&mut self, pc: u64) {
        self.simulator.watch(pc);
    }

    /// Executions of a watched instruction so far.
    pub fn pc_hits(&self, pc: u64) -> Option<u64> {
        self.simulator.hits(pc)
    }

    /// Bytecodes executed, when counting is on.
    pub fn bytecode_count(&self) -> VmResult<u64> {
        self.runtime.mem.read_u64(BYTECODE_COUNTER)
    }

    /// Nonzero histogram counts, most frequent first.
    pub fn bytecode_histogram(&self) -> VmResult<Vec<(Bytecode, u64)>> {
        let mut out = Vec::new();
        for bc in crate::generator::implemented_bytecodes() {
            let count = self
                .runtime
                .mem
                .read_u64(BYTECODE_HISTOGRAM + bc.as_u8() as u64 * 8)?;
            if count > 0 {
                out.push((bc, count));
            }
        }
        out.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.as_u8().cmp(&b.0.as_u8())));
        Ok(out)
    }

    /// Most recent traced bytecodes, oldest first.
    pub fn trace_records(&self) -> impl Iterator<Item = &TraceRecord> {
        self.runtime.trace.iter()
    }

    /// Heap counters.
    pub fn heap_stats(&self) -> HeapStats {
        self.runtime.heap.stats()
    }

    /// Number of loaded classes.
    pub fn class_count(&self) -> usize {
        self.runtime.universe.klass_count()
    }

    /// Call the static method `class.name` with `args`.
    ///
    /// # Arguments
    ///
    /// * `class` - Internal name of the holder
    /// * `name` - Method name; the first method with this name is called
    /// * `args` - One value per declared parameter
    ///
    /// # Returns
    ///
    /// How the call ended. Guest exceptions and popped frames are outcomes;
    /// `Err` means the VM itself stopped (fatal overflow, stop, breakpoint,
    /// step limit, bad linkage).
    pub fn call_static(&mut self, class: &str, name: &str, args: &[Value]) -> VmResult<CallOutcome> {
        let id = self.lookup(class, name)?;
        if !self.runtime.universe.method(id).access.is_static() {
            return Err(VmError::Linkage(format!("{}.{} is not static", class, name)));
        }
        self.invoke(id, args)
    }

    /// Call the instance method `class.name` on `receiver`.
    ///
    /// The receiver is passed as local 0 the way an invoke would pass it;
    /// no virtual dispatch takes place.
    pub fn call_instance(&mut self, class: &str, name: &str, receiver: Oop, args: &[Value]) -> VmResult<CallOutcome> {
        let id = self.lookup(class, name)?;
        if self.runtime.universe.method(id).access.is_static() {
            return Err(VmError::Linkage(format!("{}.{} is static", class, name)));
        }
        let mut all = Vec::with_capacity(args.len() + 1);
        all.push(Value::Object(receiver));
        all.extend_from_slice(args);
        self.invoke(id, &all)
    }

    /// Allocate a `MethodHandle` whose target is the static method
    /// `class.name`.
    pub fn new_method_handle(&mut self, class: &str, name: &str) -> VmResult<Oop> {
        let target = self.lookup(class, name)?;
        let target = self.runtime.universe.method(target).address;
        let class = self.require_class(METHOD_HANDLE)?;
        let handle = self.new_object(class)?;
        self.runtime.mem.write_u64(handle + VMTARGET_OFFSET as u64, target)?;
        Ok(handle)
    }

    /// `handle.invokeExact(args)` with the invoker for `descriptor`.
    ///
    /// A null `handle` throws NullPointerException in the guest.
    pub fn invoke_exact(&mut self, handle: Oop, descriptor: &str, args: &[Value]) -> VmResult<CallOutcome> {
        let rt = &mut self.runtime;
        let id = rt.universe.method_handle_invoker(&mut rt.mem, "invokeExact", descriptor)?;
        let mut all = Vec::with_capacity(args.len() + 1);
        all.push(Value::Object(handle));
        all.extend_from_slice(args);
        self.invoke(id, &all)
    }

    /// Allocate a `java/lang/ref/Reference` to `referent`.
    pub fn new_reference(&mut self, referent: Oop) -> VmResult<Oop> {
        let class = self.require_class(REFERENCE)?;
        let reference = self.new_object(class)?;
        self.runtime
            .mem
            .write_u64(reference + REFERENT_OFFSET as u64, referent)?;
        Ok(reference)
    }

    fn require_class(&self, name: &str) -> VmResult<ClassHandle> {
        self.class(name)
            .ok_or_else(|| VmError::Linkage(format!("class {} is not loaded", name)))
    }

    fn lookup(&self, class: &str, name: &str) -> VmResult<MethodId> {
        let universe = &self.runtime.universe;
        let holder = universe
            .klass_id(class)
            .ok_or_else(|| VmError::Linkage(format!("class {} is not loaded", class)))?;
        universe
            .find_method(holder, name, None)
            .ok_or_else(|| VmError::Linkage(format!("{}.{} not found", class, name)))
    }

    /// Run `id` through the call stub with `args`, receiver first.
    fn invoke(&mut self, id: MethodId, args: &[Value]) -> VmResult<CallOutcome> {
        let rt = &mut self.runtime;
        let m = rt.universe.method(id);
        let event = rt.universe.event(id);
        let words: Vec<u64> = args.iter().flat_map(Value::to_stack_words).collect();
        if words.len() != m.size_of_parameters {
            return Err(VmError::Linkage(format!(
                "{} takes {} parameter words, got {}",
                event,
                m.size_of_parameters,
                words.len()
            )));
        }
        let (method_address, return_type) = (m.address, m.descriptor.return_type());

        let thread = rt.thread;
        let result = thread.args_slot(0);
        let parameters = thread.args_slot(2);
        for (i, &w) in words.iter().enumerate() {
            rt.mem.write_u64(parameters + i as u64 * 8, w)?;
        }
        rt.mem.write_u64(result, 0)?;
        rt.mem.write_u64(result + 8, 0)?;
        let entry = rt.mem.read_u64(method_address + method::FROM_INTERPRETED as u64)?;
        thread.reset_handles(&mut rt.mem)?;
        thread.set_pending_exception(&mut rt.mem, 0)?;
        thread.set_vm_result(&mut rt.mem, 0)?;
        thread.set_state(&mut rt.mem, ThreadState::InJava)?;
        rt.preserved_args = None;

        let cpu = &mut self.simulator.cpu;
        cpu.set_reg(C_RARGS[0], result);
        cpu.set_reg(C_RARGS[1], method_address);
        cpu.set_reg(C_RARGS[2], entry);
        cpu.set_reg(C_RARGS[3], parameters);
        cpu.set_reg(C_RARGS[4], words.len() as u64);
        cpu.set_reg(C_RARGS[5], thread.address());
        cpu.set_reg(RFP, 0);
        cpu.set_reg(SP, rt.map.stack_base & !15);
        cpu.set_reg(LR, HOST_RETURN);
        cpu.pc = rt.interpreter.stubs().call_stub;
        self.simulator.reset_steps();

        log::debug!("calling {}", event);
        let run = self.run();
        let rt = &mut self.runtime;
        rt.thread.set_state(&mut rt.mem, ThreadState::InVm)?;
        run?;
        log::debug!("{} finished after {} steps", event, self.simulator.steps());
        self.finish_call(return_type)
    }

    fn run(&mut self) -> VmResult<()> {
        let mut since_poll = 0;
        loop {
            let rt = &mut self.runtime;
            let event = match self.simulator.step(&mut rt.mem, rt.interpreter.code()) {
                Ok(event) => event,
                Err(fault @ VmError::MemoryFault { .. }) => {
                    rt.handle_fault(&mut self.simulator.cpu, fault)?;
                    continue;
                }
                Err(e) => return Err(e),
            };
            let cpu = &mut self.simulator.cpu;
            match event {
                StepEvent::Continue => {}
                StepEvent::RuntimeCall(entry) => rt.call(cpu, entry)?,
                StepEvent::NativeCall { target, format } => rt.native_call(cpu, target, format)?,
                StepEvent::HostReturn => return Ok(()),
            }
            since_poll += 1;
            if since_poll == SAFEPOINT_POLL_INTERVAL {
                since_poll = 0;
                rt.safepoints.poll(&mut rt.mem)?;
            }
        }
    }

    fn finish_call(&mut self, return_type: BasicType) -> VmResult<CallOutcome> {
        let rt = &mut self.runtime;
        if rt.thread.stack_guard_state(&rt.mem)? == StackGuardState::YellowDisabled {
            rt.reguard_yellow_pages()?;
        }
        if let Some(exception) = rt.thread.pending_exception(&rt.mem)? {
            rt.thread.set_pending_exception(&mut rt.mem, 0)?;
            let id = rt.universe.klass_of(&rt.mem, exception)?;
            let class_name = rt.universe.klass(id).name.clone();
            log::debug!("{} escaped", class_name);
            return Ok(CallOutcome::Threw {
                exception,
                class_name,
                message: rt.messages.get(&exception).cloned(),
            });
        }
        let condition = rt.thread.popframe_condition(&rt.mem)?;
        if condition.contains(PopframeCondition::FORCE_DEOPT_REEXECUTION) {
            rt.thread
                .set_popframe_condition(&mut rt.mem, PopframeCondition::empty())?;
            return Ok(CallOutcome::FramePopped {
                preserved_args: rt.preserved_args.take().unwrap_or_default(),
            });
        }
        let result = rt.thread.args_slot(0);
        let x0 = rt.mem.read_u64(result)?;
        let v0 = rt.mem.read_u64(result + 8)?;
        Ok(CallOutcome::Returned(Value::from_registers(return_type, x0, v0)))
    }
}
