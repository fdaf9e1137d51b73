//! Runtime collaborators
//!
//! Generated code reaches the VM through the entries of
//! [`entry::RuntimeEntry`]. [`Runtime`] owns the state those entries work
//! on: simulated memory, the heap, loaded classes, the thread block and the
//! generated interpreter. It services each call the simulator reports,
//! performs native calls through the bridge and claims the memory faults
//! that have a defined continuation (null page, yellow zone).

pub mod entry;
pub mod hooks;
mod interpreter_runtime;
pub mod natives;
pub mod safepoint;
mod shared_runtime;
pub mod universe;

pub use shared_runtime::{TraceRecord, TRACE_CAPACITY};

use crate::call_frame::InterpreterFrame;
use crate::config::InterpreterConfig;
use crate::generator::Interpreter;
use crate::layout::{MemoryMap, NULL_PAGE_END, NULL_PAGE_TAG, RED_ZONE_TAG, YELLOW_ZONE_TAG};
use crate::simulator::Cpu;
use crate::thread::JavaThread;
use assembler::registers::{C_RARGS, LR, V0};
use bytecode_system::KindPolicy;
use core_types::{GuestException, Oop, StackGuardState, ThreadState, VmError, VmResult};
use entry::RuntimeEntry;
use hooks::{Hooks, NativeCallRequest};
use memory_manager::{AddressSpace, Heap, SatbQueue};
use native_bridge::{CallFormat, NativeBridge};
use natives::NativeRegistry;
use safepoint::SafepointSynchronizer;
use std::collections::{HashMap, VecDeque};
use universe::{MethodId, Universe};

/// VM state shared by generated code and the host.
pub struct Runtime {
    pub(crate) config: InterpreterConfig,
    pub(crate) map: MemoryMap,
    pub(crate) mem: AddressSpace,
    pub(crate) heap: Heap,
    pub(crate) universe: Universe,
    pub(crate) interpreter: Interpreter,
    pub(crate) thread: JavaThread,
    pub(crate) safepoints: SafepointSynchronizer,
    pub(crate) natives: NativeRegistry,
    pub(crate) bridge: Option<NativeBridge>,
    pub(crate) hooks: Hooks,
    pub(crate) satb: SatbQueue,
    /// Detail messages of exception objects
    pub(crate) messages: HashMap<Oop, String>,
    pub(crate) locks: HashMap<Oop, interpreter_runtime::ObjectLock>,
    pub(crate) trace: VecDeque<TraceRecord>,
    pub(crate) preserved_args: Option<Vec<u64>>,
}

impl Runtime {
    /// Generate the interpreter for `config`, lay out memory and load the
    /// bootstrap classes.
    pub fn new(config: &InterpreterConfig) -> VmResult<Self> {
        let interpreter = Interpreter::generate(config)?;
        let map = MemoryMap::new(config);
        let mut mem = AddressSpace::new(map.size);
        mem.protect(0, NULL_PAGE_END, NULL_PAGE_TAG);
        let (red_start, red_end) = map.red_zone();
        mem.protect(red_start, red_end - red_start, RED_ZONE_TAG);
        let (yellow_start, yellow_end) = map.yellow_zone();
        mem.protect(yellow_start, yellow_end - yellow_start, YELLOW_ZONE_TAG);
        interpreter.install(&mut mem)?;

        let mut heap = Heap::new(map.heap_start, map.heap_size);
        let policy = KindPolicy {
            use_fast_empty_methods: config.use_fast_empty_methods,
            use_fast_accessor_methods: config.use_fast_accessor_methods,
        };
        let mut universe = Universe::new(
            map.metaspace_start,
            map.metaspace_size,
            interpreter.method_entries(),
            policy,
        );
        universe.bootstrap(&mut mem, &mut heap)?;

        let thread = JavaThread::at(map.thread);
        thread.initialize(&mut mem, map.stack_base, map.stack_size())?;
        log::debug!(
            "memory: metaspace {:#x}, heap {:#x}, thread {:#x}, stack [{:#x}, {:#x})",
            map.metaspace_start,
            map.heap_start,
            map.thread,
            map.stack_limit,
            map.stack_base
        );

        Ok(Self {
            config: config.clone(),
            map,
            mem,
            heap,
            universe,
            interpreter,
            thread,
            safepoints: SafepointSynchronizer::new(),
            natives: NativeRegistry::new(),
            bridge: None,
            hooks: Hooks::default(),
            satb: SatbQueue::new(),
            messages: HashMap::new(),
            locks: HashMap::new(),
            trace: VecDeque::new(),
            preserved_args: None,
        })
    }

    /// Service a branch into `entry` and return to `lr`.
    ///
    /// Non-leaf entries run with the thread in the VM state.
    pub(crate) fn call(&mut self, cpu: &mut Cpu, entry: RuntimeEntry) -> VmResult<()> {
        let leaf = entry.is_leaf();
        log::trace!("runtime call {} from {:#x}", entry, cpu.reg(LR));
        if !leaf {
            self.thread.set_state(&mut self.mem, ThreadState::InVm)?;
        }
        let a1 = cpu.reg(C_RARGS[1]);
        let a2 = cpu.reg(C_RARGS[2]);
        match entry {
            RuntimeEntry::Resolve => self.resolve(a1)?,
            RuntimeEntry::New => self.new_instance(a1)?,
            RuntimeEntry::NewArray => self.new_array(a1, a2)?,
            RuntimeEntry::CreateException => self.create_exception(a1, a2)?,
            RuntimeEntry::CreateKlassException => self.create_klass_exception(a1, a2)?,
            RuntimeEntry::ThrowArrayIndexOutOfBounds => {
                let message = (a1 as i32).to_string();
                self.post_exception(GuestException::ArrayIndexOutOfBounds, Some(message))?;
            }
            RuntimeEntry::ThrowIllegalMonitorState => {
                self.post_exception(GuestException::IllegalMonitorState, None)?;
            }
            RuntimeEntry::NewIllegalMonitorState => self.new_illegal_monitor_state()?,
            RuntimeEntry::ThrowIncompatibleClassChange => {
                self.post_exception(
                    GuestException::IncompatibleClassChange,
                    Some("invokedynamic is disabled".to_string()),
                )?;
            }
            // the exception stays pending; the caller forwards it
            RuntimeEntry::ThrowPendingException => {}
            RuntimeEntry::ExceptionHandlerForException => {
                let handler = self.exception_handler_for_exception(a1)?;
                cpu.set_reg(C_RARGS[0], handler);
            }
            RuntimeEntry::MonitorEnter => self.monitor_enter(a1)?,
            RuntimeEntry::MonitorExit => self.monitor_exit(a1)?,
            RuntimeEntry::FrequencyCounterOverflow => self.frequency_counter_overflow()?,
            RuntimeEntry::PrepareNativeCall => self.prepare_native_call(a1)?,
            RuntimeEntry::PostMethodEntry => self.post_method_entry()?,
            RuntimeEntry::PostMethodExit => self.post_method_exit(a1)?,
            RuntimeEntry::AtSafepoint => self.safepoints.at_safepoint(&mut self.mem)?,
            RuntimeEntry::InterpreterContains => {
                let inside = self.interpreter.contains(cpu.reg(C_RARGS[0]));
                cpu.set_reg(C_RARGS[0], inside as u64);
            }
            RuntimeEntry::PopframeMoveOutgoingArgs => self.popframe_move_outgoing_args(cpu, a1, a2)?,
            RuntimeEntry::PopframePreserveArgs => self.popframe_preserve_args(a1, a2)?,
            RuntimeEntry::TraceBytecode => self.trace_bytecode(a1, a2, cpu.reg(C_RARGS[3]))?,
            RuntimeEntry::ExceptionHandlerForReturnAddress => {
                let handler = self.exception_handler_for_return_address(a1)?;
                cpu.set_reg(C_RARGS[0], handler);
            }
            RuntimeEntry::ThrowStackOverflowError => {
                self.post_exception(GuestException::StackOverflow, None)?;
            }
            RuntimeEntry::ThrowAbstractMethodError => {
                self.post_exception(GuestException::AbstractMethod, None)?;
            }
            RuntimeEntry::ThrowNullPointerException => {
                self.post_exception(GuestException::NullPointer, None)?;
            }
            RuntimeEntry::CheckSpecialConditionForNativeTrans => {
                self.check_special_condition_for_native_trans()?;
            }
            RuntimeEntry::ReguardYellowPages => {
                let reguarded = self.reguard_yellow_pages()?;
                cpu.set_reg(C_RARGS[0], reguarded as u64);
            }
            RuntimeEntry::DSin
            | RuntimeEntry::DCos
            | RuntimeEntry::DTan
            | RuntimeEntry::DLog
            | RuntimeEntry::DLog10
            | RuntimeEntry::DExp
            | RuntimeEntry::DPow => shared_runtime::math(cpu, entry)?,
            RuntimeEntry::G1WbPre => self.g1_wb_pre(cpu.reg(C_RARGS[0])),
            RuntimeEntry::VerifyOop => self.verify_oop(cpu.reg(C_RARGS[0]), cpu.reg(LR))?,
        }
        if !leaf {
            self.thread.set_state(&mut self.mem, ThreadState::InJava)?;
        }
        cpu.pc = cpu.reg(LR);
        Ok(())
    }

    /// Call the host function at `target` with the argument registers.
    /// The pc already points past the call instruction.
    pub(crate) fn native_call(&mut self, cpu: &mut Cpu, target: u64, format: u32) -> VmResult<()> {
        let format = CallFormat::unpack(format).map_err(VmError::NativeBridge)?;
        if self.bridge.is_none() {
            self.bridge = Some(NativeBridge::new().map_err(VmError::NativeBridge)?);
        }
        let bridge = self
            .bridge
            .as_mut()
            .ok_or_else(|| VmError::Internal("native bridge unavailable".to_string()))?;
        let gpr = cpu.gpr_args();
        let fpr = cpu.fpr_args();
        // SAFETY: `target` was linked by `prepare_native_call` from the
        // registry, whose registration contract requires a host function
        // with exactly the C signature of the method's call format.
        let result = unsafe { bridge.invoke(target, &format, &gpr, &fpr) }.map_err(VmError::NativeBridge)?;
        cpu.set_reg(C_RARGS[0], result.x0);
        cpu.set_freg(V0, result.v0);

        let request = match self.hooks.native_call.as_mut() {
            Some(hook) => hook.after_native_call(target),
            None => NativeCallRequest::None,
        };
        match request {
            NativeCallRequest::None => {}
            NativeCallRequest::Safepoint => {
                self.safepoints.handle().begin();
                self.safepoints.poll(&mut self.mem)?;
            }
            NativeCallRequest::Suspend => self.thread.set_suspend_flags(&mut self.mem, 1)?,
        }
        Ok(())
    }

    /// Continue after a fault on a guarded page, or give the fault back.
    ///
    /// A null-page touch in interpreter code throws NullPointerException;
    /// the first yellow-zone touch disables the zone and throws
    /// StackOverflowError; anything in the red zone is fatal.
    pub(crate) fn handle_fault(&mut self, cpu: &mut Cpu, fault: VmError) -> VmResult<()> {
        let VmError::MemoryFault {
            address,
            guard: Some(tag),
            ..
        } = fault
        else {
            return Err(fault);
        };
        let pc = cpu.pc;
        match tag {
            NULL_PAGE_TAG if self.interpreter.contains(pc) => {
                log::debug!("implicit null check at {:#x} (address {:#x})", pc, address);
                cpu.pc = self.interpreter.exceptions().throw_null_pointer_exception;
                Ok(())
            }
            YELLOW_ZONE_TAG if self.interpreter.contains(pc) => {
                let (start, end) = self.map.yellow_zone();
                self.mem.unprotect(start, end - start);
                self.thread
                    .set_stack_guard_state(&mut self.mem, StackGuardState::YellowDisabled)?;
                log::warn!(
                    "stack overflow at {:#x}: yellow zone disabled, throwing StackOverflowError",
                    address
                );
                cpu.pc = self.interpreter.exceptions().throw_stack_overflow_error;
                Ok(())
            }
            RED_ZONE_TAG => {
                log::error!("red zone touched at {:#x} (pc {:#x})", address, pc);
                Err(VmError::StackOverflowFatal { address })
            }
            _ => Err(fault),
        }
    }

    /// The frame of the code that made the current VM call.
    pub(crate) fn last_frame(&self) -> VmResult<InterpreterFrame> {
        let (sp, fp, _) = self.thread.last_java_frame(&self.mem)?;
        if sp == 0 {
            return Err(VmError::Internal("VM call without a last Java frame".to_string()));
        }
        Ok(InterpreterFrame::at(fp))
    }

    /// Method running in `frame`.
    pub(crate) fn frame_method(&self, frame: &InterpreterFrame) -> VmResult<MethodId> {
        let address = frame.method(&self.mem)?;
        self.universe
            .method_at(address)
            .ok_or_else(|| VmError::Internal(format!("frame {:#x} has bad method {:#x}", frame.fp(), address)))
    }

    /// Allocate an exception of class `kind` with `message`.
    pub fn allocate_exception(&mut self, kind: GuestException, message: Option<String>) -> VmResult<Oop> {
        let id = self
            .universe
            .klass_id(kind.class_name())
            .ok_or_else(|| VmError::Internal(format!("{} is not loaded", kind.class_name())))?;
        let klass = self.universe.klass(id);
        let (address, slots) = (klass.address, klass.fields.len());
        let oop = self.heap.allocate_instance(&mut self.mem, address, slots)?;
        if let Some(message) = message {
            self.messages.insert(oop, message);
        }
        Ok(oop)
    }

    /// Make a new exception the thread's pending exception.
    pub(crate) fn post_exception(&mut self, kind: GuestException, message: Option<String>) -> VmResult<()> {
        log::debug!(
            "throwing {}{}",
            kind.class_name(),
            message.as_deref().map(|m| format!(": {}", m)).unwrap_or_default()
        );
        let oop = self.allocate_exception(kind, message)?;
        self.thread.set_pending_exception(&mut self.mem, oop)
    }

    /// Re-protect a disabled yellow zone when the guard policy agrees.
    pub(crate) fn reguard_yellow_pages(&mut self) -> VmResult<bool> {
        if self.thread.stack_guard_state(&self.mem)? != StackGuardState::YellowDisabled {
            return Ok(true);
        }
        if !self.hooks.guard.should_reguard() {
            return Ok(false);
        }
        let (start, end) = self.map.yellow_zone();
        self.mem.protect(start, end - start, YELLOW_ZONE_TAG);
        self.thread
            .set_stack_guard_state(&mut self.mem, StackGuardState::Enabled)?;
        log::debug!("yellow zone re-armed");
        Ok(true)
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("interpreter", &self.interpreter)
            .field("classes", &self.universe.klass_count())
            .field("heap_used", &self.heap.used())
            .field("natives", &self.natives.len())
            .field("hooks", &self.hooks)
            .finish()
    }
}
