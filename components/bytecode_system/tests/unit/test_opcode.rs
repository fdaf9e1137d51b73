//! Tests for the Bytecode table

use bytecode_system::Bytecode;

#[test]
fn test_returns() {
    let returns: Vec<_> = Bytecode::ALL.iter().filter(|b| b.is_return()).collect();
    assert_eq!(returns.len(), 6);
}

#[test]
fn test_cp_cache_users_have_index_operands() {
    for &bc in Bytecode::ALL {
        if bc.uses_cp_cache() {
            assert!(bc.length() >= 3, "{} must carry an index", bc);
        }
    }
}

#[test]
fn test_known_encodings() {
    assert_eq!(Bytecode::Aload0.as_u8(), 0x2a);
    assert_eq!(Bytecode::Getfield.as_u8(), 0xb4);
    assert_eq!(Bytecode::Athrow.as_u8(), 0xbf);
    assert_eq!(Bytecode::from_u8(0xba), Some(Bytecode::Invokedynamic));
}

#[test]
fn test_unimplemented_bytes_do_not_decode() {
    assert_eq!(Bytecode::from_u8(0xca), None);
    assert_eq!(Bytecode::from_u8(0x12), None);
}
