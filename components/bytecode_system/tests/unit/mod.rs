//! Unit tests for bytecode_system

mod test_chunk;
mod test_class;
mod test_opcode;
