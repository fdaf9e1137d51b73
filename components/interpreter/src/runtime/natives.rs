//! Native method registry
//!
//! Host functions bound to native methods by class, name and descriptor.
//! Linking happens lazily on the first call of a native method.

use bytecode_system::MethodDescriptor;
use core_types::{VmError, VmResult};
use std::collections::HashMap;

/// A registered host function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeFunction {
    /// Host address of an `extern "C"` function
    pub address: u64,
    /// Descriptor the function implements
    pub descriptor: String,
}

/// Host functions by `(class, name)`, one per descriptor.
#[derive(Debug, Default)]
pub struct NativeRegistry {
    functions: HashMap<(String, String), Vec<NativeFunction>>,
}

impl NativeRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `class.name` with `descriptor` to the host function at `address`.
    ///
    /// The function receives the JNI environment, the class mirror or
    /// receiver handle, then the declared parameters.
    pub fn register(&mut self, class: &str, name: &str, address: u64, descriptor: &str) -> VmResult<()> {
        if address == 0 {
            return Err(VmError::Linkage(format!("{}.{}: null native function", class, name)));
        }
        MethodDescriptor::parse(descriptor)?;
        let entries = self
            .functions
            .entry((class.to_string(), name.to_string()))
            .or_default();
        entries.retain(|f| f.descriptor != descriptor);
        entries.push(NativeFunction {
            address,
            descriptor: descriptor.to_string(),
        });
        log::debug!("registered native {}.{}{} at {:#x}", class, name, descriptor, address);
        Ok(())
    }

    /// The function bound to `class.name` with `descriptor`.
    pub fn lookup(&self, class: &str, name: &str, descriptor: &str) -> Option<&NativeFunction> {
        self.functions
            .get(&(class.to_string(), name.to_string()))?
            .iter()
            .find(|f| f.descriptor == descriptor)
    }

    /// Number of bound functions.
    pub fn len(&self) -> usize {
        self.functions.values().map(Vec::len).sum()
    }

    /// Whether nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
