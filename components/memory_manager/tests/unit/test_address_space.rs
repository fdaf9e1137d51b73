//! Tests for guard ranges and access widths

use core_types::{MemoryAccess, VmError};
use memory_manager::AddressSpace;

#[test]
fn test_null_page_guard() {
    let mut mem = AddressSpace::new(0x4000);
    mem.protect(0, 0x1000, 0);
    match mem.read_u64(0x10) {
        Err(VmError::MemoryFault { guard: Some(0), access: MemoryAccess::Read, .. }) => {}
        other => panic!("expected null page fault, got {:?}", other),
    }
    assert!(mem.write_u64(0x1000, 1).is_ok());
}

#[test]
fn test_write_fault_kind() {
    let mut mem = AddressSpace::new(0x4000);
    mem.protect(0x2000, 0x1000, 3);
    match mem.write_u32(0x2ffe, 1) {
        Err(VmError::MemoryFault { access, guard, .. }) => {
            assert_eq!(access, MemoryAccess::Write);
            assert_eq!(guard, Some(3));
        }
        other => panic!("expected fault, got {:?}", other),
    }
}

#[test]
fn test_unprotect_only_enclosed_ranges() {
    let mut mem = AddressSpace::new(0x8000);
    mem.protect(0x1000, 0x1000, 1);
    mem.protect(0x2000, 0x2000, 2);
    mem.unprotect(0x2000, 0x2000);
    assert_eq!(mem.guard_at(0x1800), Some(1));
    assert_eq!(mem.guard_at(0x2800), None);
    assert_eq!(mem.guards().len(), 1);
}

#[test]
fn test_partial_widths() {
    let mut mem = AddressSpace::new(64);
    mem.write_u64(0, u64::MAX).unwrap();
    mem.write_u16(2, 0).unwrap();
    assert_eq!(mem.read_u64(0).unwrap(), 0xffff_ffff_0000_ffff);
    mem.write_bytes(8, &[1, 2, 3]).unwrap();
    assert_eq!(mem.read_bytes(8, 3).unwrap(), &[1, 2, 3]);
}
