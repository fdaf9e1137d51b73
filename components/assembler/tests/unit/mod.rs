//! Unit tests for the assembler

mod test_assembler;
