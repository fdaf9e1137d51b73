//! Template interpreter generator
//!
//! Produces, once at start-up, all machine code the interpreter runs:
//!
//! 1. The shared stub routines (call stub, exception forwarding, throw
//!    stubs) into blob `stubs`.
//! 2. The interpreter proper into blob `interpreter`: error stops, trace
//!    code, return entries, result handlers, safepoint entries, exception
//!    entries, method entries and one code template per bytecode and tos
//!    state.
//!
//! Native signature handlers are generated lazily, one blob per distinct
//! signature, when a native method is first linked.
//!
//! The result is an [`Interpreter`]: the code cache plus the addresses the
//! runtime and the host need (method entries per kind, dispatch tables,
//! return tables, result handlers, exception entries).

mod diagnostics;
mod dispatch;
mod entries;
mod exceptions;
mod native;
mod signature;
mod stubs;
mod templates;

pub use dispatch::{DispatchTable, EntryPoint};
pub use entries::{REFERENT_OFFSET, VMTARGET_OFFSET, ZERO_LOCALS_MARK, ZERO_LOCALS_SYNCHRONIZED_MARK};
pub use exceptions::{exception_index, exception_message, ExceptionEntries, MESSAGE_DIVIDE_BY_ZERO, MESSAGE_NONE};
pub use signature::{call_format, SignatureFingerprint};
pub use stubs::StubRoutines;

use crate::config::InterpreterConfig;
use crate::layout::{self, CODE_BASE, CODE_LIMIT, NORMAL_TABLE, RETURN_TABLE, SAFEPT_TABLE};
use crate::masm::InterpreterMacroAssembler;
use assembler::{AsmError, CodeCache, Label, StubDescriptor};
use bytecode_system::{Bytecode, MethodDescriptor};
use core_types::{BasicType, MethodKind, TosState, VmError, VmResult};
use memory_manager::AddressSpace;
use std::collections::HashMap;

pub(crate) fn codegen_error(err: AsmError) -> VmError {
    VmError::CodeGeneration(err.to_string())
}

/// Rows of the invoke return table: 3-byte invokes, then `invokedynamic`.
pub const RETURN_ROWS: usize = 2;

/// The generated interpreter.
pub struct Interpreter {
    config: InterpreterConfig,
    code: CodeCache,
    stubs: StubRoutines,
    exceptions: ExceptionEntries,
    bounds: (u64, u64),
    method_entries: [u64; MethodKind::COUNT],
    return_entries: [[u64; TosState::COUNT]; RETURN_ROWS],
    result_handlers: [u64; BasicType::RESULT_HANDLER_COUNT],
    normal_table: DispatchTable,
    safept_table: DispatchTable,
    illegal_bytecode_sequence: u64,
    unimplemented_bytecode: u64,
    signature_handlers: HashMap<SignatureFingerprint, u64>,
}

impl Interpreter {
    /// Generate everything for `config`.
    pub fn generate(config: &InterpreterConfig) -> VmResult<Self> {
        config.validate()?;
        let mut code = CodeCache::new(CODE_BASE, CODE_LIMIT);

        let stubs = StubRoutines::generate(&mut code, config)?;

        let mut generator = TemplateInterpreterGenerator::new(code.next_base(), config, stubs);
        generator.generate_all()?;
        let generated = generator.finish()?;
        let blob = code.install(generated.blob).map_err(codegen_error)?;
        let bounds = (blob.begin(), blob.end());
        log::info!(
            "interpreter generated: {:#x}..{:#x} ({} instructions, {} stubs)",
            bounds.0,
            bounds.1,
            blob.len(),
            blob.stubs().len()
        );

        Ok(Self {
            config: config.clone(),
            code,
            stubs,
            exceptions: generated.exceptions,
            bounds,
            method_entries: generated.method_entries,
            return_entries: generated.return_entries,
            result_handlers: generated.result_handlers,
            normal_table: generated.normal_table,
            safept_table: generated.safept_table,
            illegal_bytecode_sequence: generated.illegal_bytecode_sequence,
            unimplemented_bytecode: generated.unimplemented_bytecode,
            signature_handlers: HashMap::new(),
        })
    }

    /// Write the dispatch and return tables into simulated memory.
    ///
    /// The active table starts out as a copy of the normal table.
    pub fn install(&self, mem: &mut AddressSpace) -> VmResult<()> {
        self.normal_table.write(mem, NORMAL_TABLE)?;
        self.safept_table.write(mem, SAFEPT_TABLE)?;
        self.normal_table.write(mem, layout::ACTIVE_TABLE)?;
        for (row, entries) in self.return_entries.iter().enumerate() {
            for (tos, &entry) in entries.iter().enumerate() {
                let slot = RETURN_TABLE + ((row * TosState::COUNT + tos) * 8) as u64;
                mem.write_u64(slot, entry)?;
            }
        }
        Ok(())
    }

    /// Settings the code was generated for.
    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// All generated code.
    pub fn code(&self) -> &CodeCache {
        &self.code
    }

    /// Address of a named mark in the generated code.
    pub fn mark(&self, name: &str) -> Option<u64> {
        self.code.blobs().iter().find_map(|blob| blob.mark(name))
    }

    /// Shared stub routines.
    pub fn stubs(&self) -> &StubRoutines {
        &self.stubs
    }

    /// Exception entries and local throw handlers.
    pub fn exceptions(&self) -> &ExceptionEntries {
        &self.exceptions
    }

    /// Entry of `kind`.
    pub fn method_entry(&self, kind: MethodKind) -> u64 {
        self.method_entries[kind.index()]
    }

    /// Entries of every kind, indexed by [`MethodKind::index`].
    pub fn method_entries(&self) -> [u64; MethodKind::COUNT] {
        self.method_entries
    }

    /// Where a callee returning `tos` resumes an invoke of `length` bytes.
    pub fn return_entry(&self, length: usize, tos: TosState) -> u64 {
        let row = if length == 5 { 1 } else { 0 };
        self.return_entries[row][tos.index()]
    }

    /// Result handler for native methods returning `ty`.
    pub fn result_handler(&self, ty: BasicType) -> u64 {
        self.result_handlers[ty.result_handler_index()]
    }

    /// Dispatch table used outside safepoints.
    pub fn normal_table(&self) -> &DispatchTable {
        &self.normal_table
    }

    /// Dispatch table that routes every bytecode to the safepoint entry.
    pub fn safept_table(&self) -> &DispatchTable {
        &self.safept_table
    }

    /// Target of undefined opcodes.
    pub fn unimplemented_bytecode(&self) -> u64 {
        self.unimplemented_bytecode
    }

    /// Target of tos states a bytecode cannot start in.
    pub fn illegal_bytecode_sequence(&self) -> u64 {
        self.illegal_bytecode_sequence
    }

    /// Whether `pc` is interpreter code (not stubs or signature handlers).
    pub fn contains(&self, pc: u64) -> bool {
        (self.bounds.0..self.bounds.1).contains(&pc)
    }

    /// `[begin, end)` of the interpreter blob.
    pub fn bounds(&self) -> (u64, u64) {
        self.bounds
    }

    /// Named code region containing `pc`.
    pub fn stub_containing(&self, pc: u64) -> Option<&StubDescriptor> {
        self.code.stub_containing(pc)
    }

    /// Signature handler for a native method, generating it on first use.
    pub fn signature_handler(&mut self, descriptor: &MethodDescriptor, is_static: bool) -> VmResult<u64> {
        let fingerprint = SignatureFingerprint::new(descriptor, is_static)?;
        if let Some(&handler) = self.signature_handlers.get(&fingerprint) {
            return Ok(handler);
        }
        let result_handler = self.result_handler(descriptor.return_type());
        let base = self.code.next_base();
        let blob = signature::generate(base, &self.config, &fingerprint, result_handler)?;
        let handler = self.code.install(blob).map_err(codegen_error)?.begin();
        log::debug!(
            "signature handler for {} ({}) at {:#x}",
            descriptor.as_str(),
            if is_static { "static" } else { "instance" },
            handler
        );
        self.signature_handlers.insert(fingerprint, handler);
        Ok(handler)
    }

    /// Number of generated signature handlers.
    pub fn signature_handler_count(&self) -> usize {
        self.signature_handlers.len()
    }

    /// One line per named code region.
    pub fn listing(&self) -> String {
        let mut out = String::new();
        for blob in self.code.blobs() {
            out.push_str(&format!("{} [{:#x}, {:#x})\n", blob.name(), blob.begin(), blob.end()));
            for stub in blob.stubs() {
                out.push_str(&format!(
                    "  {:<48} [{:#x}, {:#x}) {} bytes\n",
                    stub.name,
                    stub.begin,
                    stub.end,
                    stub.size()
                ));
            }
        }
        out
    }
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("bounds", &format_args!("{:#x}..{:#x}", self.bounds.0, self.bounds.1))
            .field("blobs", &self.code.blobs().len())
            .field("signature_handlers", &self.signature_handlers.len())
            .finish()
    }
}

/// What [`TemplateInterpreterGenerator::finish`] hands back.
struct Generated {
    blob: assembler::CodeBlob,
    exceptions: ExceptionEntries,
    method_entries: [u64; MethodKind::COUNT],
    return_entries: [[u64; TosState::COUNT]; RETURN_ROWS],
    result_handlers: [u64; BasicType::RESULT_HANDLER_COUNT],
    normal_table: DispatchTable,
    safept_table: DispatchTable,
    illegal_bytecode_sequence: u64,
    unimplemented_bytecode: u64,
}

/// Emits the interpreter blob.
///
/// Routines are generated in dependency order so that branch targets in
/// earlier routines are known when later ones are emitted; the
/// preserving-args entry is the one forward reference and goes through a
/// label.
pub(crate) struct TemplateInterpreterGenerator {
    masm: InterpreterMacroAssembler,
    stubs: StubRoutines,
    preserving_args: Label,
    illegal_bytecode_sequence: u64,
    unimplemented_bytecode: u64,
    trace_code: [u64; TosState::COUNT],
    return_entries: [[u64; TosState::COUNT]; RETURN_ROWS],
    result_handlers: [u64; BasicType::RESULT_HANDLER_COUNT],
    safept_entry: EntryPoint,
    exceptions: ExceptionEntries,
    method_entries: [u64; MethodKind::COUNT],
    normal_table: DispatchTable,
    safept_table: DispatchTable,
}

impl TemplateInterpreterGenerator {
    fn new(base: u64, config: &InterpreterConfig, stubs: StubRoutines) -> Self {
        let mut masm = InterpreterMacroAssembler::new(base, config);
        masm.set_forward_exception(stubs.forward_exception);
        let preserving_args = masm.create_label();
        masm.set_preserving_args_label(preserving_args);
        Self {
            masm,
            stubs,
            preserving_args,
            illegal_bytecode_sequence: 0,
            unimplemented_bytecode: 0,
            trace_code: [0; TosState::COUNT],
            return_entries: [[0; TosState::COUNT]; RETURN_ROWS],
            result_handlers: [0; BasicType::RESULT_HANDLER_COUNT],
            safept_entry: EntryPoint::default(),
            exceptions: ExceptionEntries::default(),
            method_entries: [0; MethodKind::COUNT],
            normal_table: DispatchTable::new(),
            safept_table: DispatchTable::new(),
        }
    }

    fn config(&self) -> &InterpreterConfig {
        self.masm.config()
    }

    /// Run `body` as the named stub and return its start address.
    fn stub<F>(&mut self, name: &str, body: F) -> VmResult<u64>
    where
        F: FnOnce(&mut Self) -> VmResult<()>,
    {
        let begin = self.masm.begin_stub(name).map_err(codegen_error)?;
        body(self)?;
        let stub = self.masm.end_stub().map_err(codegen_error)?;
        log::debug!("generated {} at {:#x} ({} bytes)", stub.name, stub.begin, stub.size());
        Ok(begin)
    }

    fn generate_all(&mut self) -> VmResult<()> {
        self.generate_error_exits()?;
        if self.config().trace_bytecodes {
            self.generate_trace_code()?;
        }
        self.generate_return_entries()?;
        self.generate_result_handlers()?;
        self.generate_safepoint_entries()?;
        self.generate_exception_entries()?;
        self.generate_method_entries()?;
        self.set_entry_points_for_all_bytes()?;
        self.set_safepoints_for_all_bytes();
        Ok(())
    }

    fn generate_error_exits(&mut self) -> VmResult<()> {
        self.illegal_bytecode_sequence = self.stub("illegal bytecode sequence", |g| {
            g.masm.stop("illegal bytecode sequence - method not verified");
            Ok(())
        })?;
        self.unimplemented_bytecode = self.stub("unimplemented bytecode", |g| {
            g.masm.stop("unimplemented bytecode");
            Ok(())
        })?;
        Ok(())
    }

    fn finish(self) -> VmResult<Generated> {
        if self.masm.label_address(self.preserving_args).is_none() {
            return Err(VmError::CodeGeneration(
                "remove_activation_preserving_args entry was never generated".to_string(),
            ));
        }
        let blob = self.masm.into_inner().finalize("interpreter").map_err(codegen_error)?;
        Ok(Generated {
            blob,
            exceptions: self.exceptions,
            method_entries: self.method_entries,
            return_entries: self.return_entries,
            result_handlers: self.result_handlers,
            normal_table: self.normal_table,
            safept_table: self.safept_table,
            illegal_bytecode_sequence: self.illegal_bytecode_sequence,
            unimplemented_bytecode: self.unimplemented_bytecode,
        })
    }
}

/// Bytecodes the template table has code for.
pub fn implemented_bytecodes() -> impl Iterator<Item = Bytecode> {
    Bytecode::ALL.iter().copied()
}
