//! Template table
//!
//! One code template per bytecode. Each template is described by the tos
//! state it expects, the state it leaves, and whether it dispatches itself
//! (branches, invokes, returns) or falls through to `dispatch_next`.
//!
//! Locals grow downward from `rlocals`: local `n` is at `rlocals - 8n`, and
//! a long or double in locals `n, n+1` is stored in the slot of `n+1`.

use super::TemplateInterpreterGenerator;
use crate::frame;
use crate::layout::{RETURN_TABLE, SATB_MARKING_ACTIVE};
use crate::masm::InterpreterMacroAssembler;
use crate::metadata::{cp_cache, klass};
use crate::runtime::entry::RuntimeEntry;
use assembler::registers::{
    ESP, RBCP, RFP, RLOCALS, RMETHOD, RSCRATCH1, SP, V0, V1, X0, X1, X2, X3, X4, X5, ZR,
};
use assembler::{Address, Condition, FpBinary, Operand, Precision, Register};
use bytecode_system::Bytecode;
use core_types::{TosState, VmResult, WORD};
use memory_manager::layout::{ARRAY_BASE_OFFSET, ARRAY_LENGTH_OFFSET, KLASS_OFFSET};

type Generator = fn(&mut TemplateInterpreterGenerator, Bytecode) -> VmResult<()>;

/// Code template of one bytecode.
#[derive(Clone, Copy)]
pub(crate) struct Template {
    pub(crate) bytecode: Bytecode,
    pub(crate) tos_in: TosState,
    pub(crate) tos_out: TosState,
    pub(crate) does_dispatch: bool,
    pub(crate) generator: Generator,
}

impl std::fmt::Debug for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Template")
            .field("bytecode", &self.bytecode)
            .field("tos_in", &self.tos_in)
            .field("tos_out", &self.tos_out)
            .field("does_dispatch", &self.does_dispatch)
            .finish()
    }
}

fn def(bytecode: Bytecode, tos_in: TosState, tos_out: TosState, generator: Generator) -> Template {
    Template {
        bytecode,
        tos_in,
        tos_out,
        does_dispatch: false,
        generator,
    }
}

fn def_dispatching(bytecode: Bytecode, tos_in: TosState, generator: Generator) -> Template {
    Template {
        bytecode,
        tos_in,
        tos_out: TosState::Vtos,
        does_dispatch: true,
        generator,
    }
}

/// The template for `bc`.
pub(crate) fn template_for(bc: Bytecode) -> Template {
    use Bytecode::*;
    use TosState::{Atos, Dtos, Ftos, Itos, Ltos, Vtos};
    type G = TemplateInterpreterGenerator;

    match bc {
        Nop => def(bc, Vtos, Vtos, G::nop),
        AconstNull => def(bc, Vtos, Atos, G::aconst_null),
        IconstM1 | Iconst0 | Iconst1 | Iconst2 | Iconst3 | Iconst4 | Iconst5 => {
            def(bc, Vtos, Itos, G::iconst)
        }
        Lconst0 | Lconst1 => def(bc, Vtos, Ltos, G::lconst),
        Fconst0 | Fconst1 | Fconst2 => def(bc, Vtos, Ftos, G::fconst),
        Dconst0 | Dconst1 => def(bc, Vtos, Dtos, G::dconst),
        Bipush => def(bc, Vtos, Itos, G::bipush),
        Sipush => def(bc, Vtos, Itos, G::sipush),

        Iload => def(bc, Vtos, Itos, G::iload),
        Lload => def(bc, Vtos, Ltos, G::lload),
        Fload => def(bc, Vtos, Ftos, G::fload),
        Dload => def(bc, Vtos, Dtos, G::dload),
        Aload => def(bc, Vtos, Atos, G::aload),
        Iload0 | Iload1 | Iload2 | Iload3 => def(bc, Vtos, Itos, G::iload_n),
        Aload0 | Aload1 | Aload2 | Aload3 => def(bc, Vtos, Atos, G::aload_n),
        Iaload => def(bc, Itos, Itos, G::iaload),

        Istore => def(bc, Itos, Vtos, G::istore),
        Lstore => def(bc, Ltos, Vtos, G::lstore),
        Fstore => def(bc, Ftos, Vtos, G::fstore),
        Dstore => def(bc, Dtos, Vtos, G::dstore),
        Astore => def(bc, Vtos, Vtos, G::astore),
        Istore0 | Istore1 | Istore2 | Istore3 => def(bc, Itos, Vtos, G::istore_n),
        Astore0 | Astore1 | Astore2 | Astore3 => def(bc, Vtos, Vtos, G::astore_n),
        Iastore => def(bc, Itos, Vtos, G::iastore),

        Pop => def(bc, Vtos, Vtos, G::pop),
        Dup => def(bc, Vtos, Vtos, G::dup),

        Iadd | Isub | Imul => def(bc, Itos, Itos, G::iop2),
        Ladd => def(bc, Ltos, Ltos, G::ladd),
        Fadd => def(bc, Ftos, Ftos, G::fadd),
        Dadd => def(bc, Dtos, Dtos, G::dadd),
        Idiv => def(bc, Itos, Itos, G::idiv),
        Ineg => def(bc, Itos, Itos, G::ineg),
        Iinc => def(bc, Vtos, Vtos, G::iinc),
        I2l => def(bc, Itos, Ltos, G::i2l),

        Ifeq | Ifne | Iflt | Ifge | Ifgt | Ifle => def(bc, Itos, Vtos, G::if_0cmp),
        IfIcmpeq | IfIcmpne | IfIcmplt | IfIcmpge | IfIcmpgt | IfIcmple => {
            def(bc, Itos, Vtos, G::if_icmp)
        }
        Ifnull | Ifnonnull => def(bc, Atos, Vtos, G::if_nullcmp),
        Goto => def_dispatching(bc, Vtos, G::goto),

        Ireturn => def_dispatching(bc, Itos, G::return_),
        Lreturn => def_dispatching(bc, Ltos, G::return_),
        Freturn => def_dispatching(bc, Ftos, G::return_),
        Dreturn => def_dispatching(bc, Dtos, G::return_),
        Areturn => def_dispatching(bc, Atos, G::return_),
        Return => def_dispatching(bc, Vtos, G::return_),

        Getfield => def(bc, Vtos, Vtos, G::getfield),
        Putfield => def(bc, Vtos, Vtos, G::putfield),
        Invokestatic => def_dispatching(bc, Vtos, G::invokestatic),
        Invokedynamic => def_dispatching(bc, Vtos, G::invokedynamic),

        New => def(bc, Vtos, Atos, G::new_),
        Newarray => def(bc, Itos, Atos, G::newarray),
        Arraylength => def(bc, Atos, Itos, G::arraylength),
        Athrow => def_dispatching(bc, Atos, G::athrow),
        Checkcast => def(bc, Atos, Atos, G::checkcast),
        Monitorenter => def_dispatching(bc, Atos, G::monitorenter),
        Monitorexit => def(bc, Atos, Vtos, G::monitorexit),
    }
}

fn local(n: i64) -> Address {
    Address::new(RLOCALS, -n * WORD)
}

fn at_bcp(offset: i64) -> Address {
    Address::new(RBCP, offset)
}

impl TemplateInterpreterGenerator {
    // =========================================================================
    // Constants
    // =========================================================================

    fn nop(&mut self, _bc: Bytecode) -> VmResult<()> {
        Ok(())
    }

    fn aconst_null(&mut self, _bc: Bytecode) -> VmResult<()> {
        self.masm.mov(X0, ZR);
        Ok(())
    }

    fn iconst(&mut self, bc: Bytecode) -> VmResult<()> {
        let value = bc.as_u8() as i64 - Bytecode::Iconst0.as_u8() as i64;
        if value == 0 {
            self.masm.mov(X0, ZR);
        } else {
            self.masm.mov_imm(X0, value as u64);
        }
        Ok(())
    }

    fn lconst(&mut self, bc: Bytecode) -> VmResult<()> {
        let value = (bc.as_u8() - Bytecode::Lconst0.as_u8()) as u64;
        self.masm.mov_imm(X0, value);
        Ok(())
    }

    fn fconst(&mut self, bc: Bytecode) -> VmResult<()> {
        let value = (bc.as_u8() - Bytecode::Fconst0.as_u8()) as f32;
        self.masm.mov_imm(RSCRATCH1, value.to_bits() as u64);
        self.masm.fmov_from_gp(V0, RSCRATCH1, Precision::Single);
        Ok(())
    }

    fn dconst(&mut self, bc: Bytecode) -> VmResult<()> {
        let value = (bc.as_u8() - Bytecode::Dconst0.as_u8()) as f64;
        self.masm.mov_imm(RSCRATCH1, value.to_bits());
        self.masm.fmov_from_gp(V0, RSCRATCH1, Precision::Double);
        Ok(())
    }

    fn bipush(&mut self, _bc: Bytecode) -> VmResult<()> {
        self.masm.ldrsb(X0, at_bcp(1));
        Ok(())
    }

    fn sipush(&mut self, _bc: Bytecode) -> VmResult<()> {
        // big-endian s16
        self.masm.ldrsb(X0, at_bcp(1));
        self.masm.ldrb(X1, at_bcp(2));
        self.masm.lsl(X0, X0, 8);
        self.masm.orr(X0, X0, X1);
        Ok(())
    }

    // =========================================================================
    // Locals
    // =========================================================================

    /// Address of the local named by the byte after the opcode, in `x1`.
    fn locals_index(&mut self) {
        self.masm.ldrb(X1, at_bcp(1));
        self.masm.sub(X1, RLOCALS, Operand::Lsl(X1, 3));
    }

    fn iload(&mut self, _bc: Bytecode) -> VmResult<()> {
        self.locals_index();
        self.masm.ldrsw(X0, Address::new(X1, 0));
        Ok(())
    }

    fn lload(&mut self, _bc: Bytecode) -> VmResult<()> {
        self.locals_index();
        self.masm.ldr(X0, Address::new(X1, -WORD));
        Ok(())
    }

    fn fload(&mut self, _bc: Bytecode) -> VmResult<()> {
        self.locals_index();
        self.masm.ldrs(V0, Address::new(X1, 0));
        Ok(())
    }

    fn dload(&mut self, _bc: Bytecode) -> VmResult<()> {
        self.locals_index();
        self.masm.ldrd(V0, Address::new(X1, -WORD));
        Ok(())
    }

    fn aload(&mut self, _bc: Bytecode) -> VmResult<()> {
        self.locals_index();
        self.masm.ldr(X0, Address::new(X1, 0));
        Ok(())
    }

    fn iload_n(&mut self, bc: Bytecode) -> VmResult<()> {
        let n = (bc.as_u8() - Bytecode::Iload0.as_u8()) as i64;
        self.masm.ldrsw(X0, local(n));
        Ok(())
    }

    fn aload_n(&mut self, bc: Bytecode) -> VmResult<()> {
        let n = (bc.as_u8() - Bytecode::Aload0.as_u8()) as i64;
        self.masm.ldr(X0, local(n));
        Ok(())
    }

    fn istore(&mut self, _bc: Bytecode) -> VmResult<()> {
        self.locals_index();
        self.masm.str(X0, Address::new(X1, 0));
        Ok(())
    }

    fn lstore(&mut self, _bc: Bytecode) -> VmResult<()> {
        self.locals_index();
        self.masm.str(X0, Address::new(X1, -WORD));
        Ok(())
    }

    fn fstore(&mut self, _bc: Bytecode) -> VmResult<()> {
        self.locals_index();
        self.masm.strs(V0, Address::new(X1, 0));
        Ok(())
    }

    fn dstore(&mut self, _bc: Bytecode) -> VmResult<()> {
        self.locals_index();
        self.masm.strd(V0, Address::new(X1, -WORD));
        Ok(())
    }

    /// vtos: the value may be a reference or a return address.
    fn astore(&mut self, _bc: Bytecode) -> VmResult<()> {
        self.masm.pop_ptr(X0);
        self.locals_index();
        self.masm.str(X0, Address::new(X1, 0));
        Ok(())
    }

    fn istore_n(&mut self, bc: Bytecode) -> VmResult<()> {
        let n = (bc.as_u8() - Bytecode::Istore0.as_u8()) as i64;
        self.masm.str(X0, local(n));
        Ok(())
    }

    fn astore_n(&mut self, bc: Bytecode) -> VmResult<()> {
        let n = (bc.as_u8() - Bytecode::Astore0.as_u8()) as i64;
        self.masm.pop_ptr(X0);
        self.masm.str(X0, local(n));
        Ok(())
    }

    fn iinc(&mut self, _bc: Bytecode) -> VmResult<()> {
        self.masm.ldrsb(X2, at_bcp(2));
        self.locals_index();
        self.masm.ldrsw(X3, Address::new(X1, 0));
        self.masm.add(X3, X3, X2);
        self.masm.sxtw(X3, X3);
        self.masm.str(X3, Address::new(X1, 0));
        Ok(())
    }

    // =========================================================================
    // Stack and arithmetic
    // =========================================================================

    fn pop(&mut self, _bc: Bytecode) -> VmResult<()> {
        self.masm.add(ESP, ESP, WORD);
        Ok(())
    }

    fn dup(&mut self, _bc: Bytecode) -> VmResult<()> {
        self.masm.ldr(X0, Address::new(ESP, 0));
        self.masm.push_ptr(X0);
        Ok(())
    }

    /// `x0 = x1 op x0`, wrapped to 32 bits.
    fn iop2(&mut self, bc: Bytecode) -> VmResult<()> {
        self.masm.pop_i(X1);
        match bc {
            Bytecode::Iadd => self.masm.add(X0, X1, X0),
            Bytecode::Isub => self.masm.sub(X0, X1, X0),
            _ => self.masm.mul(X0, X1, X0),
        }
        self.masm.sxtw(X0, X0);
        Ok(())
    }

    fn ladd(&mut self, _bc: Bytecode) -> VmResult<()> {
        self.masm.pop_l(X1);
        self.masm.add(X0, X1, X0);
        Ok(())
    }

    fn fadd(&mut self, _bc: Bytecode) -> VmResult<()> {
        self.masm.pop_f(V1);
        self.masm.farith(FpBinary::Add, Precision::Single, V0, V1, V0);
        Ok(())
    }

    fn dadd(&mut self, _bc: Bytecode) -> VmResult<()> {
        self.masm.pop_d(V1);
        self.masm.farith(FpBinary::Add, Precision::Double, V0, V1, V0);
        Ok(())
    }

    fn idiv(&mut self, _bc: Bytecode) -> VmResult<()> {
        let ok = self.masm.create_label();
        self.masm.pop_i(X1);
        self.masm.cbnz(X0, ok);
        self.masm.b_to(self.exceptions.throw_arithmetic_exception);
        self.masm.bind(ok);
        // MIN_VALUE / -1 is exact in 64 bits and wraps back on truncation
        self.masm.sdiv(X0, X1, X0);
        self.masm.sxtw(X0, X0);
        Ok(())
    }

    fn ineg(&mut self, _bc: Bytecode) -> VmResult<()> {
        self.masm.neg(X0, X0);
        self.masm.sxtw(X0, X0);
        Ok(())
    }

    fn i2l(&mut self, _bc: Bytecode) -> VmResult<()> {
        self.masm.sxtw(X0, X0);
        Ok(())
    }

    // =========================================================================
    // Branches
    // =========================================================================

    /// Add the branch offset at `bcp + 1` to `rbcp` and dispatch the
    /// target through the active table, which polls for safepoints.
    fn branch(&mut self) {
        self.masm.ldrsb(X2, at_bcp(1));
        self.masm.ldrb(X3, at_bcp(2));
        self.masm.lsl(X2, X2, 8);
        self.masm.orr(X2, X2, X3);
        self.masm.add(RBCP, RBCP, X2);
        self.masm.ldrb(RSCRATCH1, at_bcp(0));
        self.masm.dispatch_only(TosState::Vtos);
    }

    fn branch_condition(bc: Bytecode) -> Condition {
        match bc {
            Bytecode::Ifeq | Bytecode::IfIcmpeq | Bytecode::Ifnull => Condition::Eq,
            Bytecode::Ifne | Bytecode::IfIcmpne | Bytecode::Ifnonnull => Condition::Ne,
            Bytecode::Iflt | Bytecode::IfIcmplt => Condition::Lt,
            Bytecode::Ifge | Bytecode::IfIcmpge => Condition::Ge,
            Bytecode::Ifgt | Bytecode::IfIcmpgt => Condition::Gt,
            _ => Condition::Le,
        }
    }

    fn conditional_branch(&mut self, bc: Bytecode) {
        let not_taken = self.masm.create_label();
        self.masm.br_cond(Self::branch_condition(bc).invert(), not_taken);
        self.branch();
        self.masm.bind(not_taken);
    }

    fn if_0cmp(&mut self, bc: Bytecode) -> VmResult<()> {
        self.masm.cmp(X0, 0i64);
        self.conditional_branch(bc);
        Ok(())
    }

    fn if_icmp(&mut self, bc: Bytecode) -> VmResult<()> {
        self.masm.pop_i(X1);
        self.masm.cmp(X1, X0);
        self.conditional_branch(bc);
        Ok(())
    }

    fn if_nullcmp(&mut self, bc: Bytecode) -> VmResult<()> {
        self.masm.cmp(X0, 0i64);
        self.conditional_branch(bc);
        Ok(())
    }

    fn goto(&mut self, _bc: Bytecode) -> VmResult<()> {
        self.branch();
        Ok(())
    }

    // =========================================================================
    // Returns
    // =========================================================================

    fn return_(&mut self, bc: Bytecode) -> VmResult<()> {
        let state = template_for(bc).tos_in;
        if state == TosState::Atos {
            self.masm.verify_oop(X0);
        }
        self.masm.remove_activation(state, true, true, true);
        self.masm.ret(assembler::registers::LR);
        Ok(())
    }

    // =========================================================================
    // Constant pool cache
    // =========================================================================

    /// Leave the cache entry of the bytecode at `rbcp` in `cache`,
    /// resolving it first when byte `byte_no` does not yet name `bc`.
    fn resolve_cache_and_index(&mut self, bc: Bytecode, byte_no: i64, cache: Register, index: Register) {
        let index_size = if bc == Bytecode::Invokedynamic { 4 } else { 2 };
        let resolved = self.masm.create_label();
        self.masm.get_cache_and_index_at_bcp(cache, index, 1, index_size);
        self.masm
            .ldrb(RSCRATCH1, InterpreterMacroAssembler::cache_field(cache, byte_no));
        self.masm.cmp(RSCRATCH1, bc.as_u8() as i64);
        self.masm.br_cond(Condition::Eq, resolved);

        self.masm.mov_imm(X1, bc.as_u8() as u64);
        self.masm.call_vm(None, RuntimeEntry::Resolve, &[X1]);
        self.masm.get_cache_and_index_at_bcp(cache, index, 1, index_size);
        self.masm.bind(resolved);
    }

    /// Field offset into `x1` and field tos state into `tos`.
    fn load_field_cp_cache_entry(&mut self, cache: Register, tos: Register) {
        self.masm
            .ldr(X1, InterpreterMacroAssembler::cache_field(cache, cp_cache::F2));
        self.masm
            .ldr(tos, InterpreterMacroAssembler::cache_field(cache, cp_cache::FLAGS));
        self.masm.lsr(tos, tos, cp_cache::TOS_STATE_SHIFT);
    }

    // =========================================================================
    // Fields
    // =========================================================================

    /// Load the field at `x0 + x1` whose tos state index is in `tos` into
    /// the tos cache, pushing it when `push`.
    ///
    /// A null `x0` faults in the null page and surfaces as
    /// NullPointerException.
    pub(super) fn load_field(&mut self, tos: Register, push: bool) {
        let done = self.masm.create_label();
        let field = Address::Index(X0, X1, 0);
        for state in [
            TosState::Btos,
            TosState::Ztos,
            TosState::Ctos,
            TosState::Stos,
            TosState::Itos,
            TosState::Ltos,
            TosState::Ftos,
            TosState::Dtos,
            TosState::Atos,
        ] {
            let next = self.masm.create_label();
            self.masm.cmp(tos, state.index() as i64);
            self.masm.br_cond(Condition::Ne, next);
            match state {
                TosState::Btos => self.masm.ldrsb(X0, field),
                TosState::Ztos => self.masm.ldrb(X0, field),
                TosState::Ctos => self.masm.ldrh(X0, field),
                TosState::Stos => self.masm.ldrsh(X0, field),
                TosState::Itos => self.masm.ldrsw(X0, field),
                TosState::Ftos => self.masm.ldrs(V0, field),
                TosState::Dtos => self.masm.ldrd(V0, field),
                _ => self.masm.ldr(X0, field),
            }
            if push {
                self.masm.push(state);
            } else if state == TosState::Atos {
                self.masm.verify_oop(X0);
            }
            self.masm.b(done);
            self.masm.bind(next);
        }
        self.masm.stop("bad field tos state");
        self.masm.bind(done);
    }

    fn getfield(&mut self, bc: Bytecode) -> VmResult<()> {
        self.resolve_cache_and_index(bc, cp_cache::B1, X2, X3);
        self.load_field_cp_cache_entry(X2, X2);
        self.masm.pop_ptr(X0);
        self.load_field(X2, true);
        Ok(())
    }

    fn putfield(&mut self, bc: Bytecode) -> VmResult<()> {
        self.resolve_cache_and_index(bc, cp_cache::B2, X2, X3);
        self.load_field_cp_cache_entry(X2, X4);

        let done = self.masm.create_label();
        let field = Address::Index(X3, X1, 0);
        for state in [
            TosState::Btos,
            TosState::Ztos,
            TosState::Ctos,
            TosState::Stos,
            TosState::Itos,
            TosState::Ltos,
            TosState::Ftos,
            TosState::Dtos,
            TosState::Atos,
        ] {
            let next = self.masm.create_label();
            self.masm.cmp(X4, state.index() as i64);
            self.masm.br_cond(Condition::Ne, next);
            self.masm.pop(state);
            self.masm.pop_ptr(X3);
            match state {
                TosState::Btos | TosState::Ztos => self.masm.strb(X0, field),
                TosState::Ctos | TosState::Stos => self.masm.strh(X0, field),
                TosState::Itos => self.masm.strw(X0, field),
                TosState::Ftos => self.masm.strs(V0, field),
                TosState::Dtos => self.masm.strd(V0, field),
                TosState::Ltos => self.masm.str(X0, field),
                _ => {
                    self.satb_pre_barrier(X3, X1);
                    self.masm.str(X0, field);
                }
            }
            self.masm.b(done);
            self.masm.bind(next);
        }
        self.masm.stop("bad field tos state");
        self.masm.bind(done);
        Ok(())
    }

    /// Log the reference about to be overwritten at `obj + offset` while
    /// concurrent marking is active.
    fn satb_pre_barrier(&mut self, obj: Register, offset: Register) {
        if !self.config().use_satb_barrier {
            return;
        }
        let done = self.masm.create_label();
        self.masm.load_global(RSCRATCH1, SATB_MARKING_ACTIVE);
        self.masm.ldrb(RSCRATCH1, Address::new(RSCRATCH1, 0));
        self.masm.cbz(RSCRATCH1, done);
        self.masm.ldr(X5, Address::Index(obj, offset, 0));
        self.masm.cbz(X5, done);
        self.masm.stp(X0, X1, Address::Pre(SP, -16));
        self.masm.stp(X3, X4, Address::Pre(SP, -16));
        self.masm.call_vm_leaf(RuntimeEntry::G1WbPre, &[X5]);
        self.masm.ldp(X3, X4, Address::Post(SP, 16));
        self.masm.ldp(X0, X1, Address::Post(SP, 16));
        self.masm.bind(done);
    }

    // =========================================================================
    // Invokes
    // =========================================================================

    /// Call the method in `rmethod`, returning to the return entry for
    /// the result tos state in `x4`. The frame's bcp must name the invoke
    /// for the return entry, exception lookup and popframe.
    fn invoke(&mut self, row: usize) {
        self.masm.save_bcp();
        let table = RETURN_TABLE + (row * TosState::COUNT) as u64 * WORD as u64;
        self.masm.mov_imm(RSCRATCH1, table);
        self.masm.ldr(assembler::registers::LR, Address::Index(RSCRATCH1, X4, 3));
        self.masm.jump_from_interpreted();
    }

    fn invokestatic(&mut self, bc: Bytecode) -> VmResult<()> {
        self.resolve_cache_and_index(bc, cp_cache::B1, X2, X3);
        self.masm
            .ldr(RMETHOD, InterpreterMacroAssembler::cache_field(X2, cp_cache::F1));
        self.masm
            .ldr(X4, InterpreterMacroAssembler::cache_field(X2, cp_cache::FLAGS));
        self.masm.lsr(X4, X4, cp_cache::TOS_STATE_SHIFT);
        self.invoke(0);
        Ok(())
    }

    /// Call sites link straight to a static target; the 4-byte index
    /// selects the second return table row.
    fn invokedynamic(&mut self, bc: Bytecode) -> VmResult<()> {
        if !self.config().enable_invoke_dynamic {
            self.masm
                .call_vm(None, RuntimeEntry::ThrowIncompatibleClassChange, &[]);
            self.masm.should_not_reach_here();
            return Ok(());
        }
        self.resolve_cache_and_index(bc, cp_cache::B1, X2, X3);
        self.masm
            .ldr(RMETHOD, InterpreterMacroAssembler::cache_field(X2, cp_cache::F1));
        self.masm
            .ldr(X4, InterpreterMacroAssembler::cache_field(X2, cp_cache::FLAGS));
        self.masm.lsr(X4, X4, cp_cache::TOS_STATE_SHIFT);
        self.invoke(1);
        Ok(())
    }

    // =========================================================================
    // Allocation, arrays, casts and exceptions
    // =========================================================================

    fn new_(&mut self, bc: Bytecode) -> VmResult<()> {
        self.resolve_cache_and_index(bc, cp_cache::B1, X2, X3);
        self.masm
            .ldr(X1, InterpreterMacroAssembler::cache_field(X2, cp_cache::F1));
        self.masm.call_vm(Some(X0), RuntimeEntry::New, &[X1]);
        Ok(())
    }

    fn newarray(&mut self, _bc: Bytecode) -> VmResult<()> {
        self.masm.ldrb(X1, at_bcp(1));
        self.masm.mov(X2, X0);
        self.masm.call_vm(Some(X0), RuntimeEntry::NewArray, &[X1, X2]);
        Ok(())
    }

    fn arraylength(&mut self, _bc: Bytecode) -> VmResult<()> {
        self.masm.ldrw(X0, Address::new(X0, ARRAY_LENGTH_OFFSET));
        Ok(())
    }

    /// Fall through when `index` is within the array in `array`; the
    /// unsigned compare also rejects negative indices.
    fn index_check(&mut self, array: Register, index: Register) {
        let ok = self.masm.create_label();
        self.masm
            .ldrw(RSCRATCH1, Address::new(array, ARRAY_LENGTH_OFFSET));
        self.masm.cmp(index, RSCRATCH1);
        self.masm.br_cond(Condition::Lo, ok);
        if index != X1 {
            self.masm.mov(X1, index);
        }
        self.masm.b_to(self.exceptions.throw_array_index_out_of_bounds);
        self.masm.bind(ok);
    }

    fn iaload(&mut self, _bc: Bytecode) -> VmResult<()> {
        self.masm.pop_ptr(X1);
        self.index_check(X1, X0);
        self.masm.add(X1, X1, Operand::Lsl(X0, 2));
        self.masm.ldrsw(X0, Address::new(X1, ARRAY_BASE_OFFSET));
        Ok(())
    }

    fn iastore(&mut self, _bc: Bytecode) -> VmResult<()> {
        self.masm.pop_i(X2);
        self.masm.pop_ptr(X3);
        self.index_check(X3, X2);
        self.masm.add(X3, X3, Operand::Lsl(X2, 2));
        self.masm.strw(X0, Address::new(X3, ARRAY_BASE_OFFSET));
        Ok(())
    }

    fn athrow(&mut self, _bc: Bytecode) -> VmResult<()> {
        let not_null = self.masm.create_label();
        self.masm.cbnz(X0, not_null);
        self.masm.b_to(self.exceptions.throw_null_pointer_exception);
        self.masm.bind(not_null);
        self.masm.verify_oop(X0);
        self.masm.b_to(self.exceptions.throw_exception);
        Ok(())
    }

    /// Null passes. Otherwise walk the superclass chain of the object's
    /// klass looking for the resolved klass.
    fn checkcast(&mut self, bc: Bytecode) -> VmResult<()> {
        let done = self.masm.create_label();
        let is_subtype = self.masm.create_label();
        let walk = self.masm.create_label();

        self.masm.cbz(X0, done);
        // the object stays on the stack across resolution and is where the
        // ClassCastException handler expects it
        self.masm.push_ptr(X0);
        self.resolve_cache_and_index(bc, cp_cache::B1, X2, X3);
        self.masm
            .ldr(X1, InterpreterMacroAssembler::cache_field(X2, cp_cache::F1));
        self.masm.ldr(X0, Address::new(ESP, 0));
        self.masm.ldr(X2, Address::new(X0, KLASS_OFFSET));

        self.masm.bind(walk);
        self.masm.cmp(X2, X1);
        self.masm.br_cond(Condition::Eq, is_subtype);
        self.masm.ldr(X2, Address::new(X2, klass::SUPER));
        self.masm.cbnz(X2, walk);
        self.masm.b_to(self.exceptions.throw_class_cast_exception);

        self.masm.bind(is_subtype);
        self.masm.pop_ptr(X0);
        self.masm.bind(done);
        Ok(())
    }

    // =========================================================================
    // Monitors
    // =========================================================================

    fn null_check(&mut self, r: Register) {
        let not_null = self.masm.create_label();
        self.masm.cbnz(r, not_null);
        self.masm.b_to(self.exceptions.throw_null_pointer_exception);
        self.masm.bind(not_null);
    }

    fn monitorenter(&mut self, _bc: Bytecode) -> VmResult<()> {
        self.null_check(X0);

        let entry_size = frame::MONITOR_SIZE * WORD;
        let top = frame::at(frame::MONITOR_BLOCK_TOP_OFFSET);

        // x1: free slot, if any; stop early at a record for the same object
        {
            let loop_ = self.masm.create_label();
            let entry = self.masm.create_label();
            let exit = self.masm.create_label();
            self.masm.mov(X1, ZR);
            self.masm.ldr(X3, top);
            self.masm
                .add(X2, RFP, frame::MONITOR_BLOCK_BOTTOM_OFFSET * WORD);
            self.masm.b(entry);

            self.masm.bind(loop_);
            self.masm
                .ldr(RSCRATCH1, Address::new(X3, frame::MONITOR_OBJ_OFFSET));
            self.masm.cmp(RSCRATCH1, 0i64);
            self.masm.csel(X1, X3, X1, Condition::Eq);
            self.masm.cmp(RSCRATCH1, X0);
            self.masm.br_cond(Condition::Eq, exit);
            self.masm.add(X3, X3, entry_size);
            self.masm.bind(entry);
            self.masm.cmp(X3, X2);
            self.masm.br_cond(Condition::Ne, loop_);
            self.masm.bind(exit);
        }

        // no free slot: grow the monitor block by moving the expression
        // stack down one record
        let allocated = self.masm.create_label();
        self.masm.cbnz(X1, allocated);
        {
            let loop_ = self.masm.create_label();
            let entry = self.masm.create_label();
            self.masm.ldr(X1, top);
            self.masm.sub(SP, SP, entry_size);
            self.masm.sub(ESP, ESP, entry_size);
            self.masm.sub(X1, X1, entry_size);
            self.masm.str(X1, top);
            self.masm.mov(X2, ESP);
            self.masm.b(entry);

            self.masm.bind(loop_);
            self.masm.ldr(RSCRATCH1, Address::new(X2, entry_size));
            self.masm.str(RSCRATCH1, Address::new(X2, 0));
            self.masm.add(X2, X2, WORD);
            self.masm.bind(entry);
            self.masm.cmp(X2, X1);
            self.masm.br_cond(Condition::Ne, loop_);
        }

        self.masm.bind(allocated);
        // the frame's bcp already points past the monitorenter when the
        // lock call observes it
        self.masm.add(RBCP, RBCP, 1i64);
        self.masm
            .str(X0, Address::new(X1, frame::MONITOR_OBJ_OFFSET));
        self.masm.lock_object(X1);
        self.masm.dispatch_next(TosState::Vtos, 0);
        Ok(())
    }

    fn monitorexit(&mut self, _bc: Bytecode) -> VmResult<()> {
        self.null_check(X0);

        let found = self.masm.create_label();
        let loop_ = self.masm.create_label();
        let entry = self.masm.create_label();
        self.masm.ldr(X1, frame::at(frame::MONITOR_BLOCK_TOP_OFFSET));
        self.masm
            .add(X2, RFP, frame::MONITOR_BLOCK_BOTTOM_OFFSET * WORD);
        self.masm.b(entry);

        self.masm.bind(loop_);
        self.masm
            .ldr(RSCRATCH1, Address::new(X1, frame::MONITOR_OBJ_OFFSET));
        self.masm.cmp(RSCRATCH1, X0);
        self.masm.br_cond(Condition::Eq, found);
        self.masm.add(X1, X1, frame::MONITOR_SIZE * WORD);
        self.masm.bind(entry);
        self.masm.cmp(X1, X2);
        self.masm.br_cond(Condition::Ne, loop_);

        self.masm
            .call_vm(None, RuntimeEntry::ThrowIllegalMonitorState, &[]);
        self.masm.should_not_reach_here();

        self.masm.bind(found);
        self.masm.push_ptr(X0);
        self.masm.unlock_object(X1);
        self.masm.pop_ptr(X0);
        Ok(())
    }
}
