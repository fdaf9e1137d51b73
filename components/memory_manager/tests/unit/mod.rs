//! Unit tests for memory_manager

mod test_address_space;
mod test_heap;
