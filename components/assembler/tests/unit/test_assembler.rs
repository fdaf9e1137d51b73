//! Tests for emission, label patching and code cache lookups

use assembler::registers::*;
use assembler::{Address, Assembler, CodeCache, Condition, Insn, Width};

#[test]
fn test_conditional_branch_patched_after_bind() {
    let mut asm = Assembler::new(0x100);
    let out = asm.create_label();
    asm.cmp(X0, 5);
    asm.br_cond(Condition::Gt, out);
    asm.mov_imm(X0, 5);
    asm.bind(out);
    asm.ret(LR);
    let blob = asm.finalize("clamp").unwrap();
    assert_eq!(
        blob.insn_at(0x104),
        Some(Insn::BCond {
            cond: Condition::Gt,
            target: 0x10c
        })
    );
}

#[test]
fn test_marks_are_recorded() {
    let mut asm = Assembler::new(0x200);
    asm.nop();
    asm.mark("after_nop");
    asm.str(X1, Address::Pre(ESP, -8));
    let blob = asm.finalize("marks").unwrap();
    assert_eq!(blob.mark("after_nop"), Some(0x204));
    assert_eq!(blob.mark("missing"), None);
    assert_eq!(
        blob.insn_at(0x204),
        Some(Insn::Str {
            rt: X1,
            addr: Address::Pre(ESP, -8),
            width: Width::X
        })
    );
}

#[test]
fn test_cache_lookup_across_blobs() {
    let mut cache = CodeCache::new(0x4000_0000, 0x4010_0000);
    for name in ["a", "b", "c"] {
        let mut asm = Assembler::new(cache.next_base());
        asm.begin_stub(name).unwrap();
        asm.nop();
        asm.end_stub().unwrap();
        cache.install(asm.finalize(name).unwrap()).unwrap();
    }
    let names: Vec<_> = cache.blobs().iter().map(|b| b.name().to_string()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
    for blob in cache.blobs() {
        assert_eq!(cache.stub_containing(blob.begin()).unwrap().name, blob.name());
        assert!(!cache.contains(blob.end()));
    }
    assert!(cache.disassemble_blob("b").unwrap().contains("nop"));
}
