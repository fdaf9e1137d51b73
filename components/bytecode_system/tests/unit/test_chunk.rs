//! Tests for CodeBuilder and BytecodeStream

use bytecode_system::{Bytecode, BytecodeStream, CodeBuilder};

#[test]
fn test_forward_branch_offset() {
    let mut b = CodeBuilder::new();
    let skip = b.new_label();
    b.iload(0).branch(Bytecode::Ifeq, skip).iconst(1).op(Bytecode::Pop);
    b.bind(skip).op(Bytecode::Return);
    let code = b.finish().unwrap();
    // ifeq at bci 1, target at bci 6
    assert_eq!(&code[1..4], &[Bytecode::Ifeq.as_u8(), 0, 5]);
}

#[test]
fn test_short_local_forms() {
    let mut b = CodeBuilder::new();
    b.iload(3).iload(4).astore(0).istore(2);
    let code = b.finish().unwrap();
    assert_eq!(
        code,
        vec![
            Bytecode::Iload3.as_u8(),
            Bytecode::Iload.as_u8(),
            4,
            Bytecode::Astore0.as_u8(),
            Bytecode::Istore2.as_u8(),
        ]
    );
}

#[test]
fn test_stream_display() {
    let mut b = CodeBuilder::new();
    let top = b.new_label();
    b.bind(top).iinc(1, -1).branch(Bytecode::Goto, top);
    let code = b.finish().unwrap();
    let lines: Vec<String> = BytecodeStream::new(&code).map(|d| d.to_string()).collect();
    assert_eq!(lines, vec!["   0: iinc -1", "   3: goto 0"]);
}

#[test]
fn test_stream_stops_on_unknown_byte() {
    let code = [Bytecode::Nop.as_u8(), 0xfe, Bytecode::Return.as_u8()];
    assert_eq!(BytecodeStream::new(&code).count(), 1);
}
