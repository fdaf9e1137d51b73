//! Unit tests for VmError and GuestException

use core_types::{GuestException, MemoryAccess, VmError, VmResult};

#[cfg(test)]
mod guest_exception_tests {
    use super::*;

    #[test]
    fn test_stack_overflow_is_an_error_subclass() {
        assert_eq!(
            GuestException::StackOverflow.class_name(),
            "java/lang/StackOverflowError"
        );
        assert_eq!(
            GuestException::StackOverflow.super_class_name(),
            "java/lang/VirtualMachineError"
        );
    }

    #[test]
    fn test_runtime_exceptions() {
        for exc in [
            GuestException::ClassCast,
            GuestException::NullPointer,
            GuestException::Arithmetic,
            GuestException::IllegalMonitorState,
        ] {
            assert_eq!(exc.super_class_name(), "java/lang/RuntimeException");
        }
    }

    #[test]
    fn test_class_names_unique() {
        let mut names: Vec<_> = GuestException::ALL.iter().map(|e| e.class_name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), GuestException::ALL.len());
    }
}

#[cfg(test)]
mod vm_error_tests {
    use super::*;

    fn fails() -> VmResult<u32> {
        Err(VmError::Linkage("demo/Missing".to_string()))
    }

    fn propagates() -> VmResult<u32> {
        let v = fails()?;
        Ok(v + 1)
    }

    #[test]
    fn test_question_mark_propagation() {
        assert_eq!(
            propagates(),
            Err(VmError::Linkage("demo/Missing".to_string()))
        );
    }

    #[test]
    fn test_memory_fault_display() {
        let err = VmError::MemoryFault {
            address: 0x10,
            access: MemoryAccess::Write,
            guard: None,
        };
        assert_eq!(err.to_string(), "memory fault: write at 0x10");
    }

    #[test]
    fn test_breakpoint_display() {
        let err = VmError::Breakpoint { pc: 0x4000_0000, count: 12 };
        assert!(err.to_string().contains("after 12 bytecodes"));
    }
}
