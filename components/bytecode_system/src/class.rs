//! Class definitions handed to the loader
//!
//! A [`ClassDefinition`] is the already-parsed form of a class: its name,
//! superclass, instance fields, methods and constant pool. Bytecodes index
//! the constant pool directly (the pool doubles as the cache index space).

use crate::descriptor::{parse_field_descriptor, MethodDescriptor};
use crate::opcode::Bytecode;
use core_types::{AccessFlags, VmError, VmResult};

/// A constant pool entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstantPoolEntry {
    /// Class reference (`new`, `checkcast`)
    Class {
        /// Internal class name
        name: String,
    },
    /// Instance field reference (`getfield`, `putfield`)
    Field {
        /// Holder class
        class: String,
        /// Field name
        name: String,
        /// Field descriptor
        descriptor: String,
    },
    /// Static method reference (`invokestatic`)
    Method {
        /// Holder class
        class: String,
        /// Method name
        name: String,
        /// Method descriptor
        descriptor: String,
    },
    /// Call site (`invokedynamic`); links to the named static method
    CallSite {
        /// Holder of the target method
        class: String,
        /// Target method name
        name: String,
        /// Target method descriptor
        descriptor: String,
    },
}

/// One exception table row. `[start_pc, end_pc)` is the protected range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// First protected bci
    pub start_pc: u16,
    /// One past the last protected bci
    pub end_pc: u16,
    /// Handler bci
    pub handler_pc: u16,
    /// Caught class; `None` catches everything
    pub catch_type: Option<String>,
}

/// An instance field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefinition {
    /// Field name
    pub name: String,
    /// Field descriptor
    pub descriptor: String,
}

/// A method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDefinition {
    /// Method name
    pub name: String,
    /// Method descriptor
    pub descriptor: String,
    /// Modifiers
    pub access: AccessFlags,
    /// Local variable words; raised to the parameter size at load time
    pub max_locals: u16,
    /// Expression stack words
    pub max_stack: u16,
    /// Encoded body (empty for native and abstract methods)
    pub code: Vec<u8>,
    /// Exception table
    pub exception_table: Vec<ExceptionHandler>,
}

impl MethodDefinition {
    /// A public static method with an empty body.
    pub fn new(name: &str, descriptor: &str) -> Self {
        Self {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            access: AccessFlags::default(),
            max_locals: 0,
            max_stack: 8,
            code: Vec::new(),
            exception_table: Vec::new(),
        }
    }

    /// Replace the modifiers.
    pub fn with_access(mut self, access: AccessFlags) -> Self {
        self.access = access;
        self
    }

    /// Set the local variable words.
    pub fn with_max_locals(mut self, max_locals: u16) -> Self {
        self.max_locals = max_locals;
        self
    }

    /// Set the expression stack words.
    pub fn with_max_stack(mut self, max_stack: u16) -> Self {
        self.max_stack = max_stack;
        self
    }

    /// Set the body.
    pub fn with_code(mut self, code: Vec<u8>) -> Self {
        self.code = code;
        self
    }

    /// Append an exception table row.
    pub fn with_handler(
        mut self,
        start_pc: u16,
        end_pc: u16,
        handler_pc: u16,
        catch_type: Option<&str>,
    ) -> Self {
        self.exception_table.push(ExceptionHandler {
            start_pc,
            end_pc,
            handler_pc,
            catch_type: catch_type.map(str::to_string),
        });
        self
    }

    /// Parameter words including the receiver of instance methods.
    pub fn size_of_parameters(&self) -> VmResult<usize> {
        let desc = MethodDescriptor::parse(&self.descriptor)?;
        let receiver = usize::from(!self.access.is_static());
        Ok(desc.parameter_words() + receiver)
    }
}

/// A class as handed to the loader.
///
/// # Examples
///
/// ```
/// use bytecode_system::{Bytecode, ClassDefinition, CodeBuilder, MethodDefinition};
///
/// let mut b = CodeBuilder::new();
/// b.iload(0).iload(1).op(Bytecode::Iadd).op(Bytecode::Ireturn);
/// let class = ClassDefinition::new("demo/Adder")
///     .with_method(MethodDefinition::new("add", "(II)I").with_code(b.finish().unwrap()));
/// assert!(class.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDefinition {
    /// Internal name
    pub name: String,
    /// Superclass; `None` means `java/lang/Object`
    pub super_name: Option<String>,
    /// Instance fields, in slot order after the superclass's
    pub fields: Vec<FieldDefinition>,
    /// Methods
    pub methods: Vec<MethodDefinition>,
    /// Constant pool
    pub constant_pool: Vec<ConstantPoolEntry>,
}

impl ClassDefinition {
    /// An empty class extending `java/lang/Object`.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            super_name: None,
            fields: Vec::new(),
            methods: Vec::new(),
            constant_pool: Vec::new(),
        }
    }

    /// Set the superclass.
    pub fn with_super(mut self, super_name: &str) -> Self {
        self.super_name = Some(super_name.to_string());
        self
    }

    /// Append an instance field.
    pub fn with_field(mut self, name: &str, descriptor: &str) -> Self {
        self.fields.push(FieldDefinition {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        });
        self
    }

    /// Append a method.
    pub fn with_method(mut self, method: MethodDefinition) -> Self {
        self.methods.push(method);
        self
    }

    /// Append a constant and return its index.
    pub fn add_constant(&mut self, entry: ConstantPoolEntry) -> u16 {
        self.constant_pool.push(entry);
        (self.constant_pool.len() - 1) as u16
    }

    /// Append a static method reference and return its index.
    pub fn add_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        self.add_constant(ConstantPoolEntry::Method {
            class: class.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        })
    }

    /// Append a field reference and return its index.
    pub fn add_field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        self.add_constant(ConstantPoolEntry::Field {
            class: class.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        })
    }

    /// Append a class reference and return its index.
    pub fn add_class_ref(&mut self, name: &str) -> u16 {
        self.add_constant(ConstantPoolEntry::Class {
            name: name.to_string(),
        })
    }

    /// Append a call site and return its index.
    pub fn add_call_site(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        self.add_constant(ConstantPoolEntry::CallSite {
            class: class.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        })
    }

    /// Find a method by name and descriptor.
    pub fn method(&self, name: &str, descriptor: &str) -> Option<&MethodDefinition> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }

    /// Structural checks performed by the loader.
    pub fn validate(&self) -> VmResult<()> {
        if self.name.is_empty() {
            return Err(VmError::InvalidClass("empty class name".to_string()));
        }
        for field in &self.fields {
            parse_field_descriptor(&field.descriptor)?;
        }
        for (i, entry) in self.constant_pool.iter().enumerate() {
            match entry {
                ConstantPoolEntry::Field { descriptor, .. } => {
                    parse_field_descriptor(descriptor)?;
                }
                ConstantPoolEntry::Method { descriptor, .. }
                | ConstantPoolEntry::CallSite { descriptor, .. } => {
                    MethodDescriptor::parse(descriptor)?;
                }
                ConstantPoolEntry::Class { name } if name.is_empty() => {
                    return Err(VmError::InvalidClass(format!(
                        "{}: empty class reference at #{}",
                        self.name, i
                    )));
                }
                ConstantPoolEntry::Class { .. } => {}
            }
        }
        for method in &self.methods {
            self.validate_method(method)?;
        }
        Ok(())
    }

    fn validate_method(&self, method: &MethodDefinition) -> VmResult<()> {
        let where_ = || format!("{}.{}{}", self.name, method.name, method.descriptor);
        MethodDescriptor::parse(&method.descriptor)?;
        let bodyless = method.access.is_native() || method.access.is_abstract();
        if bodyless && !method.code.is_empty() {
            return Err(VmError::InvalidClass(format!(
                "{}: native or abstract method has a body",
                where_()
            )));
        }
        if !bodyless && method.code.is_empty() {
            return Err(VmError::InvalidClass(format!("{}: missing body", where_())));
        }
        if method.code.len() > u16::MAX as usize {
            return Err(VmError::InvalidClass(format!("{}: body too large", where_())));
        }
        for handler in &method.exception_table {
            let len = method.code.len();
            if handler.start_pc >= handler.end_pc
                || handler.end_pc as usize > len
                || handler.handler_pc as usize >= len
            {
                return Err(VmError::InvalidClass(format!(
                    "{}: bad exception table row {:?}",
                    where_(),
                    handler
                )));
            }
        }
        let mut bci = 0;
        while bci < method.code.len() {
            let byte = method.code[bci];
            match Bytecode::from_u8(byte) {
                Some(bc) => bci += bc.length(),
                // left for the interpreter to reject at dispatch
                None => bci += 1,
            }
        }
        Ok(())
    }
}
