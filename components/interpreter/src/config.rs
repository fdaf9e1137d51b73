//! Interpreter configuration
//!
//! Every switch that changes what the generator emits or how the runtime
//! sizes its memory lives in [`InterpreterConfig`]. Values load from JSON
//! over the defaults, so a file only has to name what it changes.

use core_types::{VmError, VmResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Reasons a configuration is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// `page_size` is not a power of two of at least 1 KiB.
    #[error("page_size {0} must be a power of two >= 1024")]
    PageSize(u64),
    /// A size is not a positive multiple of the page size.
    #[error("{name} ({value}) must be a positive multiple of page_size")]
    Unaligned {
        /// Setting name
        name: &'static str,
        /// Offending value
        value: u64,
    },
    /// The stack cannot hold the guard zones plus one usable page.
    #[error("stack_size {stack_size} leaves no room beyond {guard_pages} guard pages")]
    StackTooSmall {
        /// Configured stack size
        stack_size: u64,
        /// Pages taken by red, yellow and shadow zones
        guard_pages: u64,
    },
    /// Some guard zone has zero pages.
    #[error("stack_{0}_pages must be at least 1")]
    EmptyZone(&'static str),
    /// Counting would trigger on every call.
    #[error("compile_threshold must be positive")]
    CompileThreshold,
    /// The simulator needs a positive step budget.
    #[error("max_steps must be positive")]
    MaxSteps,
    /// The JSON could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),
}

impl From<ConfigError> for VmError {
    fn from(err: ConfigError) -> Self {
        VmError::Config(err.to_string())
    }
}

/// Generator and runtime settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Virtual memory page size in bytes
    pub page_size: u64,
    /// Pages below sp touched by stack banging
    pub stack_shadow_pages: u64,
    /// Pages in the red (fatal) zone
    pub stack_red_pages: u64,
    /// Pages in the yellow (recoverable) zone
    pub stack_yellow_pages: u64,
    /// Thread stack size in bytes
    pub stack_size: u64,
    /// Emit shadow-page banging at method entry
    pub use_stack_banging: bool,
    /// A compiler exists; emit invocation counters
    pub use_compiler: bool,
    /// Emit invocation counters even without a compiler
    pub count_compiled_calls: bool,
    /// Invocation count that triggers the overflow callback
    pub compile_threshold: u32,
    /// Use the empty-method fast entry
    pub use_fast_empty_methods: bool,
    /// Use the accessor fast entry
    pub use_fast_accessor_methods: bool,
    /// Use a barrier instead of the serialization page after native calls
    pub use_membar: bool,
    /// Count executed bytecodes
    pub count_bytecodes: bool,
    /// Keep per-opcode execution counters
    pub print_bytecode_histogram: bool,
    /// Call the tracer before every bytecode
    pub trace_bytecodes: bool,
    /// Break when the bytecode counter reaches this value (0 = off)
    pub stop_interpreter_at: u64,
    /// Check oops returned through the interpreter
    pub verify_oops: bool,
    /// Emit internal consistency assertions
    pub debug_checks: bool,
    /// Report referents loaded by `Reference.get` to the SATB queue
    pub use_satb_barrier: bool,
    /// Allow `invokedynamic`
    pub enable_invoke_dynamic: bool,
    /// Heap size in bytes
    pub heap_size: u64,
    /// Metaspace size in bytes
    pub metaspace_size: u64,
    /// Simulator instruction budget per host call
    pub max_steps: u64,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            page_size: 4096,
            stack_shadow_pages: 4,
            stack_red_pages: 1,
            stack_yellow_pages: 2,
            stack_size: 256 * 1024,
            use_stack_banging: true,
            use_compiler: true,
            count_compiled_calls: false,
            compile_threshold: 10_000,
            use_fast_empty_methods: true,
            use_fast_accessor_methods: true,
            use_membar: true,
            count_bytecodes: false,
            print_bytecode_histogram: false,
            trace_bytecodes: false,
            stop_interpreter_at: 0,
            verify_oops: false,
            debug_checks: true,
            use_satb_barrier: false,
            enable_invoke_dynamic: true,
            heap_size: 4 * 1024 * 1024,
            metaspace_size: 4 * 1024 * 1024,
            max_steps: 50_000_000,
        }
    }
}

macro_rules! with_setters {
    ($($(#[$doc:meta])* $name:ident: $field:ident: $ty:ty;)*) => {
        $(
            $(#[$doc])*
            pub fn $name(mut self, value: $ty) -> Self {
                self.$field = value;
                self
            }
        )*
    };
}

impl InterpreterConfig {
    with_setters! {
        /// Set `page_size`.
        with_page_size: page_size: u64;
        /// Set `stack_shadow_pages`.
        with_stack_shadow_pages: stack_shadow_pages: u64;
        /// Set `stack_red_pages`.
        with_stack_red_pages: stack_red_pages: u64;
        /// Set `stack_yellow_pages`.
        with_stack_yellow_pages: stack_yellow_pages: u64;
        /// Set `stack_size`.
        with_stack_size: stack_size: u64;
        /// Set `use_stack_banging`.
        with_stack_banging: use_stack_banging: bool;
        /// Set `use_compiler`.
        with_compiler: use_compiler: bool;
        /// Set `count_compiled_calls`.
        with_count_compiled_calls: count_compiled_calls: bool;
        /// Set `compile_threshold`.
        with_compile_threshold: compile_threshold: u32;
        /// Set `use_fast_empty_methods`.
        with_fast_empty_methods: use_fast_empty_methods: bool;
        /// Set `use_fast_accessor_methods`.
        with_fast_accessor_methods: use_fast_accessor_methods: bool;
        /// Set `use_membar`.
        with_membar: use_membar: bool;
        /// Set `count_bytecodes`.
        with_count_bytecodes: count_bytecodes: bool;
        /// Set `print_bytecode_histogram`.
        with_bytecode_histogram: print_bytecode_histogram: bool;
        /// Set `trace_bytecodes`.
        with_trace_bytecodes: trace_bytecodes: bool;
        /// Set `stop_interpreter_at`.
        with_stop_interpreter_at: stop_interpreter_at: u64;
        /// Set `verify_oops`.
        with_verify_oops: verify_oops: bool;
        /// Set `debug_checks`.
        with_debug_checks: debug_checks: bool;
        /// Set `use_satb_barrier`.
        with_satb_barrier: use_satb_barrier: bool;
        /// Set `enable_invoke_dynamic`.
        with_invoke_dynamic: enable_invoke_dynamic: bool;
        /// Set `heap_size`.
        with_heap_size: heap_size: u64;
        /// Set `metaspace_size`.
        with_metaspace_size: metaspace_size: u64;
        /// Set `max_steps`.
        with_max_steps: max_steps: u64;
    }

    /// Parse JSON, filling unnamed settings with defaults.
    pub fn from_json_str(text: &str) -> VmResult<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> VmResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| VmError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> String {
        // a struct of plain scalars always serializes
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Reject inconsistent settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.page_size.is_power_of_two() || self.page_size < 1024 {
            return Err(ConfigError::PageSize(self.page_size));
        }
        for (name, value) in [
            ("stack_size", self.stack_size),
            ("heap_size", self.heap_size),
            ("metaspace_size", self.metaspace_size),
        ] {
            if value == 0 || value % self.page_size != 0 {
                return Err(ConfigError::Unaligned { name, value });
            }
        }
        for (name, pages) in [
            ("shadow", self.stack_shadow_pages),
            ("red", self.stack_red_pages),
            ("yellow", self.stack_yellow_pages),
        ] {
            if pages == 0 {
                return Err(ConfigError::EmptyZone(name));
            }
        }
        let guard_pages = self.stack_red_pages + self.stack_yellow_pages + self.stack_shadow_pages;
        if self.stack_size / self.page_size <= guard_pages + 1 {
            return Err(ConfigError::StackTooSmall {
                stack_size: self.stack_size,
                guard_pages,
            });
        }
        if self.compile_threshold == 0 {
            return Err(ConfigError::CompileThreshold);
        }
        if self.max_steps == 0 {
            return Err(ConfigError::MaxSteps);
        }
        Ok(())
    }

    /// Whether method entries maintain invocation counters.
    pub fn inc_counter(&self) -> bool {
        self.use_compiler || self.count_compiled_calls
    }

    /// Whether templates bump the global bytecode counter.
    pub fn counts_bytecodes(&self) -> bool {
        self.count_bytecodes || self.trace_bytecodes || self.stop_interpreter_at > 0
    }

    /// Pages the overflow check keeps free below the would-be sp.
    pub fn max_guard_pages(&self) -> u64 {
        self.stack_shadow_pages
            .max(self.stack_red_pages + self.stack_yellow_pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert_eq!(InterpreterConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = InterpreterConfig::from_json_str(r#"{"trace_bytecodes": true}"#).unwrap();
        assert!(config.trace_bytecodes);
        assert_eq!(config.page_size, 4096);
        assert!(config.counts_bytecodes());
    }

    #[test]
    fn test_rejects_odd_page_size() {
        let config = InterpreterConfig::default().with_page_size(3000);
        assert_eq!(config.validate(), Err(ConfigError::PageSize(3000)));
    }

    #[test]
    fn test_rejects_tiny_stack() {
        let config = InterpreterConfig::default().with_stack_size(8 * 4096);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::StackTooSmall { .. })
        ));
    }

    #[test]
    fn test_max_guard_pages() {
        let config = InterpreterConfig::default();
        assert_eq!(config.max_guard_pages(), 4);
        let config = config.with_stack_red_pages(3).with_stack_yellow_pages(3);
        assert_eq!(config.max_guard_pages(), 6);
    }
}
