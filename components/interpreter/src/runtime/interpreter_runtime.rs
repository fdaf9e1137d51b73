//! Calls from templates and entries
//!
//! Each handler runs with the thread's last Java frame pointing at the
//! interpreter activation that made the call. Guest errors become pending
//! exceptions; host errors (`Err`) stop the VM.

use super::hooks::DebuggerAction;
use super::universe::{element_size, KlassId, MethodId};
use super::Runtime;
use crate::call_frame::InterpreterFrame;
use crate::frame::{MONITOR_LOCK_OFFSET, MONITOR_OBJ_OFFSET};
use crate::generator::exception_message;
use crate::layout::{dispatch_slot, ACTIVE_TABLE};
use crate::metadata::{cp_cache, method, pack_flags, result_tos, unpack_flags};
use crate::simulator::Cpu;
use assembler::registers::RFP;
use bytecode_system::{Bytecode, ConstantPoolEntry};
use core_types::{BasicType, GuestException, Oop, PopframeCondition, TosState, VmError, VmResult, WORD};
use memory_manager::layout::MARK_OFFSET;

/// A locked object: recursion depth and the mark word it had before the
/// first lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ObjectLock {
    pub(crate) count: u32,
    pub(crate) displaced_mark: u64,
}

enum Resolved {
    Field { offset: i64, ty: BasicType },
    Method { address: u64, parameters: usize, result: TosState },
    Klass { address: u64 },
}

impl Runtime {
    fn cp_index(&self, bc: Bytecode, bcp: u64) -> VmResult<usize> {
        let index = if bc == Bytecode::Invokedynamic {
            self.mem.read_u32(bcp + 1)?
        } else {
            self.mem.read_u16(bcp + 1)? as u32
        };
        Ok(index as usize)
    }

    /// Resolve the constant pool cache entry of the bytecode at the frame's
    /// bcp.
    pub(super) fn resolve(&mut self, raw: u64) -> VmResult<()> {
        let bc = Bytecode::from_u8(raw as u8)
            .ok_or_else(|| VmError::Internal(format!("resolve of unknown bytecode {:#x}", raw)))?;
        let frame = self.last_frame()?;
        let holder = self.universe.method(self.frame_method(&frame)?).holder;
        let bcp = frame.bcp(&self.mem)?;
        let index = self.cp_index(bc, bcp)?;
        let klass = self.universe.klass(holder);
        let entry = klass.constant_pool.get(index).cloned().ok_or_else(|| {
            VmError::Linkage(format!("{}: constant pool index {} out of range", klass.name, index))
        })?;
        let cache = klass.cache_address;

        let resolved = match (bc, &entry) {
            (
                Bytecode::Getfield | Bytecode::Putfield,
                ConstantPoolEntry::Field {
                    class,
                    name,
                    descriptor,
                },
            ) => {
                let Some(k) = self.require_klass(class)? else {
                    return Ok(());
                };
                match self.universe.find_field(k, name, descriptor) {
                    Some(field) => Resolved::Field {
                        offset: field.offset,
                        ty: field.ty,
                    },
                    None => {
                        return self.post_exception(GuestException::NoSuchField, Some(format!("{}.{}", class, name)));
                    }
                }
            }
            (Bytecode::Invokestatic, ConstantPoolEntry::Method { class, name, descriptor })
            | (Bytecode::Invokedynamic, ConstantPoolEntry::CallSite { class, name, descriptor }) => {
                let Some(k) = self.require_klass(class)? else {
                    return Ok(());
                };
                let Some(id) = self.universe.find_method(k, name, Some(descriptor)) else {
                    return self.post_exception(
                        GuestException::NoSuchMethod,
                        Some(format!("{}.{}{}", class, name, descriptor)),
                    );
                };
                let target = self.universe.method(id);
                if !target.access.is_static() {
                    return self.post_exception(
                        GuestException::IncompatibleClassChange,
                        Some(format!("Expected static method {}.{}{}", class, name, descriptor)),
                    );
                }
                Resolved::Method {
                    address: target.address,
                    parameters: target.size_of_parameters,
                    result: result_tos(TosState::from_basic_type(target.descriptor.return_type())),
                }
            }
            (Bytecode::New | Bytecode::Checkcast, ConstantPoolEntry::Class { name }) => {
                let Some(k) = self.require_klass(name)? else {
                    return Ok(());
                };
                Resolved::Klass {
                    address: self.universe.klass(k).address,
                }
            }
            _ => {
                return Err(VmError::Linkage(format!(
                    "{} at {:#x} refers to {:?}",
                    bc.name(),
                    bcp,
                    entry
                )))
            }
        };

        let field = |f: i64| cache + cp_cache::entry_field(index as u64, f);
        match resolved {
            Resolved::Field { offset, ty } => {
                self.mem.write_u64(field(cp_cache::F2), offset as u64)?;
                self.mem
                    .write_u64(field(cp_cache::FLAGS), pack_flags(0, TosState::from_basic_type(ty)))?;
                self.mem.write_u8(field(cp_cache::B1), Bytecode::Getfield.as_u8())?;
                if bc == Bytecode::Putfield {
                    self.mem.write_u8(field(cp_cache::B2), Bytecode::Putfield.as_u8())?;
                }
            }
            Resolved::Method {
                address,
                parameters,
                result,
            } => {
                self.mem.write_u64(field(cp_cache::F1), address)?;
                self.mem.write_u64(field(cp_cache::FLAGS), pack_flags(parameters, result))?;
                self.mem.write_u8(field(cp_cache::B1), bc.as_u8())?;
            }
            Resolved::Klass { address } => {
                self.mem.write_u64(field(cp_cache::F1), address)?;
                self.mem.write_u8(field(cp_cache::B1), bc.as_u8())?;
            }
        }
        log::trace!("resolved {} #{} -> {:?}", bc.name(), index, entry);
        Ok(())
    }

    /// Klass named `name`, or `None` after posting NoClassDefFoundError.
    fn require_klass(&mut self, name: &str) -> VmResult<Option<KlassId>> {
        match self.universe.klass_id(name) {
            Some(id) => Ok(Some(id)),
            None => {
                self.post_exception(GuestException::NoClassDefFound, Some(name.to_string()))?;
                Ok(None)
            }
        }
    }

    pub(super) fn new_instance(&mut self, klass_address: u64) -> VmResult<()> {
        let id = self
            .universe
            .klass_at(klass_address)
            .ok_or_else(|| VmError::Internal(format!("new of bad klass {:#x}", klass_address)))?;
        let slots = self.universe.klass(id).fields.len();
        let oop = self.heap.allocate_instance(&mut self.mem, klass_address, slots)?;
        self.thread.set_vm_result(&mut self.mem, oop)
    }

    pub(super) fn new_array(&mut self, atype: u64, length: u64) -> VmResult<()> {
        let length = length as i32;
        if length < 0 {
            return self.post_exception(GuestException::NegativeArraySize, Some(length.to_string()));
        }
        let ty = BasicType::from_u8(atype as u8)
            .ok_or_else(|| VmError::Internal(format!("newarray of bad type {}", atype)))?;
        let id = self
            .universe
            .array_klass(ty)
            .ok_or_else(|| VmError::Internal(format!("no array class for {}", ty.name())))?;
        let klass = self.universe.klass(id).address;
        let oop = self
            .heap
            .allocate_array(&mut self.mem, klass, element_size(ty), length as u32)?;
        self.thread.set_vm_result(&mut self.mem, oop)
    }

    fn guest_exception(index: u64) -> VmResult<GuestException> {
        GuestException::ALL
            .get(index as usize)
            .copied()
            .ok_or_else(|| VmError::Internal(format!("bad exception index {}", index)))
    }

    pub(super) fn create_exception(&mut self, index: u64, message: u64) -> VmResult<()> {
        let kind = Self::guest_exception(index)?;
        let oop = self.allocate_exception(kind, exception_message(message).map(str::to_string))?;
        self.thread.set_vm_result(&mut self.mem, oop)
    }

    /// Exception whose message names the class of `obj`.
    pub(super) fn create_klass_exception(&mut self, index: u64, obj: Oop) -> VmResult<()> {
        let kind = Self::guest_exception(index)?;
        let id = self.universe.klass_of(&self.mem, obj)?;
        let message = self.universe.klass(id).name.replace('/', ".");
        let oop = self.allocate_exception(kind, Some(message))?;
        self.thread.set_vm_result(&mut self.mem, oop)
    }

    /// Replace the exception being propagated.
    pub(super) fn new_illegal_monitor_state(&mut self) -> VmResult<()> {
        let oop = self.allocate_exception(GuestException::IllegalMonitorState, None)?;
        self.thread.set_pending_exception(&mut self.mem, 0)?;
        self.thread.set_vm_result(&mut self.mem, oop)
    }

    /// Find the handler for `exception` thrown at the frame's bcp.
    ///
    /// Returns the continuation: the vtos entry of the handler bytecode
    /// (with the frame's bcp moved to it) or `remove_activation`. The
    /// exception is handed back in vm_result.
    pub(super) fn exception_handler_for_exception(&mut self, exception: Oop) -> VmResult<u64> {
        let frame = self.last_frame()?;
        let id = self.frame_method(&frame)?;
        let bcp = frame.bcp(&self.mem)?;
        let exception_klass = self.universe.klass_of(&self.mem, exception)?;
        let handler_bcp = self.find_handler(id, bcp, exception_klass);

        self.thread.set_pending_exception(&mut self.mem, 0)?;
        self.thread.set_vm_result(&mut self.mem, exception)?;
        match handler_bcp {
            Some(handler_bcp) => {
                log::debug!(
                    "{} caught in {} at bci {}",
                    self.universe.klass(exception_klass).name,
                    self.universe.event(id),
                    handler_bcp - self.universe.method(id).code_base
                );
                frame.set_bcp(&mut self.mem, handler_bcp)?;
                let opcode = self.mem.read_u8(handler_bcp)?;
                self.mem
                    .read_u64(dispatch_slot(ACTIVE_TABLE, TosState::Vtos, opcode))
            }
            None => Ok(self.interpreter.exceptions().remove_activation),
        }
    }

    fn find_handler(&self, id: MethodId, bcp: u64, exception_klass: KlassId) -> Option<u64> {
        let m = self.universe.method(id);
        let bci = m.bci(bcp)?;
        m.exception_table
            .iter()
            .filter(|h| (h.start_pc..h.end_pc).contains(&bci))
            .find(|h| match &h.catch_type {
                None => true,
                Some(name) => self
                    .universe
                    .klass_id(name)
                    .is_some_and(|catch| self.universe.is_subclass(exception_klass, catch)),
            })
            .map(|h| m.code_base + h.handler_pc as u64)
    }

    /// Lock the object of the monitor record at `record`.
    pub(super) fn monitor_enter(&mut self, record: u64) -> VmResult<()> {
        let obj = self.mem.read_u64(record + MONITOR_OBJ_OFFSET as u64)?;
        if obj == 0 {
            return self.post_exception(GuestException::NullPointer, None);
        }
        let lock_word = record + MONITOR_LOCK_OFFSET as u64;
        match self.locks.get_mut(&obj) {
            Some(lock) => {
                lock.count += 1;
                // recursive: the record carries no displaced mark
                self.mem.write_u64(lock_word, 0)?;
            }
            None => {
                let displaced_mark = self.mem.read_u64(obj + MARK_OFFSET as u64)?;
                self.mem.write_u64(lock_word, displaced_mark)?;
                self.mem.write_u64(obj + MARK_OFFSET as u64, record)?;
                self.locks.insert(
                    obj,
                    ObjectLock {
                        count: 1,
                        displaced_mark,
                    },
                );
            }
        }
        log::trace!("lock {:#x} with record {:#x}", obj, record);
        Ok(())
    }

    /// Unlock the object of the monitor record at `record` and free the
    /// record. The record is freed even when the object is not locked, so
    /// unwinding does not try again.
    pub(super) fn monitor_exit(&mut self, record: u64) -> VmResult<()> {
        let obj = self.mem.read_u64(record + MONITOR_OBJ_OFFSET as u64)?;
        self.mem.write_u64(record + MONITOR_OBJ_OFFSET as u64, 0)?;
        self.mem.write_u64(record + MONITOR_LOCK_OFFSET as u64, 0)?;
        let Some(lock) = self.locks.get_mut(&obj) else {
            return self.post_exception(GuestException::IllegalMonitorState, None);
        };
        lock.count -= 1;
        if lock.count == 0 {
            let mark = lock.displaced_mark;
            self.locks.remove(&obj);
            self.mem.write_u64(obj + MARK_OFFSET as u64, mark)?;
        }
        log::trace!("unlock {:#x} from record {:#x}", obj, record);
        Ok(())
    }

    pub(super) fn frequency_counter_overflow(&mut self) -> VmResult<()> {
        let frame = self.last_frame()?;
        let id = self.frame_method(&frame)?;
        let address = self.universe.method(id).address;
        let count = self.mem.read_u32(address + method::INVOCATION_COUNTER as u64)?;
        let event = self.universe.event(id);
        self.hooks.compilation.invocation_counter_overflow(&event, count);
        Ok(())
    }

    /// Link the native method at `method_address`: its function, signature
    /// handler and call format.
    pub(super) fn prepare_native_call(&mut self, method_address: u64) -> VmResult<()> {
        let id = self
            .universe
            .method_at(method_address)
            .ok_or_else(|| VmError::Internal(format!("native call of bad method {:#x}", method_address)))?;
        let m = self.universe.method(id);
        let class_name = self.universe.klass(m.holder).name.clone();
        let descriptor = m.descriptor.clone();
        let is_static = m.access.is_static();
        let Some(function) = self.natives.lookup(&class_name, &m.name, descriptor.as_str()) else {
            let message = format!("{}.{}{}", class_name.replace('/', "."), m.name, descriptor.as_str());
            return self.post_exception(GuestException::UnsatisfiedLink, Some(message));
        };
        let address = function.address;
        let handler = self.interpreter.signature_handler(&descriptor, is_static)?;
        let format = crate::generator::call_format(&descriptor, is_static)?;

        self.mem.write_u64(method_address + method::NATIVE_FUNCTION as u64, address)?;
        self.mem.write_u64(method_address + method::SIGNATURE_HANDLER as u64, handler)?;
        self.mem.write_u32(method_address + method::CALL_FORMAT as u64, format.pack())?;
        log::debug!(
            "linked native {} to {:#x} (handler {:#x})",
            self.universe.event(id),
            address,
            handler
        );
        Ok(())
    }

    fn apply_debugger_action(&mut self, action: DebuggerAction) -> VmResult<()> {
        if action == DebuggerAction::PopFrame {
            let condition = self.thread.popframe_condition(&self.mem)? | PopframeCondition::PENDING;
            self.thread.set_popframe_condition(&mut self.mem, condition)?;
        }
        Ok(())
    }

    pub(super) fn post_method_entry(&mut self) -> VmResult<()> {
        let frame = self.last_frame()?;
        let event = self.universe.event(self.frame_method(&frame)?);
        let action = match self.hooks.debugger.as_mut() {
            Some(debugger) => debugger.method_entry(&event),
            None => DebuggerAction::Continue,
        };
        self.apply_debugger_action(action)
    }

    pub(super) fn post_method_exit(&mut self, tos: u64) -> VmResult<()> {
        let tos = TosState::from_index(tos as usize)
            .ok_or_else(|| VmError::Internal(format!("method exit with bad tos {}", tos)))?;
        let frame = self.last_frame()?;
        let event = self.universe.event(self.frame_method(&frame)?);
        let action = match self.hooks.debugger.as_mut() {
            Some(debugger) => debugger.method_exit(&event, tos),
            None => DebuggerAction::Continue,
        };
        self.apply_debugger_action(action)
    }

    /// Move the arguments of the caller's invoke from `src` to `dest`.
    /// The caller's frame is current (`rfp`).
    pub(super) fn popframe_move_outgoing_args(&mut self, cpu: &Cpu, src: u64, dest: u64) -> VmResult<()> {
        let caller = InterpreterFrame::at(cpu.reg(RFP));
        let id = self.frame_method(&caller)?;
        let bcp = caller.bcp(&self.mem)?;
        let bc = Bytecode::from_u8(self.mem.read_u8(bcp)?)
            .ok_or_else(|| VmError::Internal(format!("popframe into a non-invoke at {:#x}", bcp)))?;
        let index = self.cp_index(bc, bcp)?;
        let cache = self.universe.klass(self.universe.method(id).holder).cache_address;
        let flags = self
            .mem
            .read_u64(cache + cp_cache::entry_field(index as u64, cp_cache::FLAGS))?;
        let (words, _) = unpack_flags(flags);
        if src != dest && words > 0 {
            let bytes = self.mem.read_bytes(src, words as u64 * WORD as u64)?.to_vec();
            self.mem.write_bytes(dest, &bytes)?;
        }
        log::debug!("popframe: {} argument words kept for re-execution", words);
        Ok(())
    }

    /// Save `bytes` of arguments starting at `start` for a caller that is
    /// not interpreted, first parameter first.
    pub(super) fn popframe_preserve_args(&mut self, bytes: u64, start: u64) -> VmResult<()> {
        let mut words = Vec::with_capacity((bytes / WORD as u64) as usize);
        for i in 0..bytes / WORD as u64 {
            words.push(self.mem.read_u64(start + i * WORD as u64)?);
        }
        words.reverse();
        log::debug!("popframe: preserved {} argument words", words.len());
        self.preserved_args = Some(words);
        Ok(())
    }
}
