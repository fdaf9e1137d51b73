//! Tests for heap allocation and the SATB queue

use memory_manager::{layout, AddressSpace, Heap, SatbQueue};

#[test]
fn test_distinct_objects() {
    let mut mem = AddressSpace::new(0x10000);
    let mut heap = Heap::new(0x8000, 0x8000);
    let a = heap.allocate_instance(&mut mem, 0x100, 1).unwrap();
    let b = heap.allocate_instance(&mut mem, 0x100, 1).unwrap();
    assert_eq!(b - a, (layout::FIELDS_OFFSET + layout::FIELD_SLOT_SIZE) as u64);
    assert!(heap.contains(a) && heap.contains(b));
    assert_eq!(heap.stats().objects, 2);
}

#[test]
fn test_exhaustion_is_an_error() {
    let mut mem = AddressSpace::new(0x10000);
    let mut heap = Heap::new(0x8000, 0x20);
    assert!(heap.allocate_instance(&mut mem, 0x100, 0).is_ok());
    assert!(heap.allocate_instance(&mut mem, 0x100, 4).is_err());
}

#[test]
fn test_int_array_elements_zeroed() {
    let mut mem = AddressSpace::new(0x10000);
    mem.fill(0x8000, 0x100, 0xff).unwrap();
    let mut heap = Heap::new(0x8000, 0x8000);
    let arr = heap.allocate_array(&mut mem, 0x200, 4, 3).unwrap();
    for i in 0..3 {
        let at = arr + layout::ARRAY_BASE_OFFSET as u64 + i * 4;
        assert_eq!(mem.read_u32(at).unwrap(), 0);
    }
}

#[test]
fn test_satb_drain_order() {
    let mut q = SatbQueue::new();
    q.set_marking_active(true);
    q.enqueue(0x30);
    q.enqueue(0x10);
    assert_eq!(q.len(), 2);
    assert_eq!(q.drain(), vec![0x30, 0x10]);
}
