//! Loaded classes
//!
//! The loader writes each class into metaspace in the layout generated code
//! reads (see [`crate::metadata`]) and keeps a host-side index of klasses,
//! fields and methods for the runtime. Every method's interpreter entry is
//! chosen from its kind at load time.
//!
//! The bootstrap set covers what the runtime itself instantiates: the root
//! classes, the exception hierarchy, `Reference`, `MethodHandle` and the
//! primitive array classes.

use crate::metadata::{const_method, constant_pool, cp_cache, klass, method, rewrite};
use crate::runtime::hooks::MethodEvent;
use bytecode_system::{
    method_kind, parse_field_descriptor, Bytecode, ClassDefinition, ConstantPoolEntry,
    ExceptionHandler, KindPolicy, MethodDefinition, MethodDescriptor,
};
use core_types::{AccessFlags, BasicType, GuestException, MethodKind, Oop, VmError, VmResult};
use memory_manager::{layout, AddressSpace, Arena, Heap};
use std::collections::HashMap;

/// `java/lang/Object`
pub const OBJECT: &str = "java/lang/Object";
/// `java/lang/Class`
pub const CLASS: &str = "java/lang/Class";
/// `java/lang/Throwable`
pub const THROWABLE: &str = "java/lang/Throwable";
/// `java/lang/ref/Reference`
pub const REFERENCE: &str = "java/lang/ref/Reference";
/// `java/lang/invoke/MethodHandle`
pub const METHOD_HANDLE: &str = "java/lang/invoke/MethodHandle";

const BOOTSTRAP_HIERARCHY: &[(&str, &str)] = &[
    (THROWABLE, OBJECT),
    ("java/lang/Exception", THROWABLE),
    ("java/lang/Error", THROWABLE),
    ("java/lang/RuntimeException", "java/lang/Exception"),
    ("java/lang/VirtualMachineError", "java/lang/Error"),
    ("java/lang/LinkageError", "java/lang/Error"),
    ("java/lang/IndexOutOfBoundsException", "java/lang/RuntimeException"),
];

const PRIMITIVE_ARRAYS: [BasicType; 8] = [
    BasicType::Boolean,
    BasicType::Char,
    BasicType::Float,
    BasicType::Double,
    BasicType::Byte,
    BasicType::Short,
    BasicType::Int,
    BasicType::Long,
];

/// Index of a loaded klass.
pub type KlassId = usize;
/// Index of a loaded method.
pub type MethodId = usize;

/// An instance field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    /// Field name
    pub name: String,
    /// Field descriptor
    pub descriptor: String,
    /// Field type
    pub ty: BasicType,
    /// Byte offset from the object start
    pub offset: i64,
}

/// Host view of a loaded class.
#[derive(Debug, Clone)]
pub struct KlassInfo {
    /// Internal name
    pub name: String,
    /// `Klass*`
    pub address: u64,
    /// Superclass
    pub super_id: Option<KlassId>,
    /// Every instance field, inherited ones first
    pub fields: Vec<FieldInfo>,
    /// `java/lang/Class` instance, 0 until `Class` is loaded
    pub mirror: Oop,
    /// Constant pool as defined
    pub constant_pool: Vec<ConstantPoolEntry>,
    /// `ConstantPool*`
    pub cp_address: u64,
    /// `ConstantPoolCache*`
    pub cache_address: u64,
    /// Declared methods
    pub methods: Vec<MethodId>,
    /// Element type of a primitive array class
    pub array_element: Option<BasicType>,
}

/// Host view of a loaded method.
#[derive(Debug, Clone)]
pub struct MethodInfo {
    /// Holder
    pub holder: KlassId,
    /// Name
    pub name: String,
    /// Parsed descriptor
    pub descriptor: MethodDescriptor,
    /// Modifiers
    pub access: AccessFlags,
    /// Entry kind
    pub kind: MethodKind,
    /// `Method*`
    pub address: u64,
    /// Address of bytecode 0
    pub code_base: u64,
    /// Bytes of code
    pub code_len: usize,
    /// Parameter words, receiver included
    pub size_of_parameters: usize,
    /// Exception table
    pub exception_table: Vec<ExceptionHandler>,
}

impl MethodInfo {
    /// Bci of the instruction at `bcp`, if it lies in this method's code.
    pub fn bci(&self, bcp: u64) -> Option<u16> {
        let offset = bcp.checked_sub(self.code_base)?;
        (offset < self.code_len as u64).then_some(offset as u16)
    }
}

/// Every loaded class.
#[derive(Debug)]
pub struct Universe {
    metaspace: Arena,
    klasses: Vec<KlassInfo>,
    methods: Vec<MethodInfo>,
    by_name: HashMap<String, KlassId>,
    by_klass_address: HashMap<u64, KlassId>,
    by_method_address: HashMap<u64, MethodId>,
    by_mirror: HashMap<Oop, KlassId>,
    entries: [u64; MethodKind::COUNT],
    policy: KindPolicy,
}

impl Universe {
    /// Empty universe allocating metadata in `[start, start + size)`;
    /// methods enter through `entries[kind.index()]`.
    pub fn new(start: u64, size: u64, entries: [u64; MethodKind::COUNT], policy: KindPolicy) -> Self {
        Self {
            metaspace: Arena::new(start, size),
            klasses: Vec::new(),
            methods: Vec::new(),
            by_name: HashMap::new(),
            by_klass_address: HashMap::new(),
            by_method_address: HashMap::new(),
            by_mirror: HashMap::new(),
            entries,
            policy,
        }
    }

    /// Load the classes the runtime depends on.
    pub fn bootstrap(&mut self, mem: &mut AddressSpace, heap: &mut Heap) -> VmResult<()> {
        self.load(mem, heap, &ClassDefinition::new(OBJECT))?;
        self.load(mem, heap, &ClassDefinition::new(CLASS))?;
        // the first two classes predate their mirror class
        for id in 0..self.klasses.len() {
            self.install_mirror(mem, heap, id)?;
        }
        for (name, super_name) in BOOTSTRAP_HIERARCHY {
            self.load(mem, heap, &ClassDefinition::new(name).with_super(super_name))?;
        }

        let mut pending: Vec<GuestException> = GuestException::ALL.to_vec();
        while !pending.is_empty() {
            let before = pending.len();
            let mut deferred = Vec::new();
            for exc in pending {
                if self.klass_id(exc.super_class_name()).is_some() {
                    let def = ClassDefinition::new(exc.class_name()).with_super(exc.super_class_name());
                    self.load(mem, heap, &def)?;
                } else {
                    deferred.push(exc);
                }
            }
            if deferred.len() == before {
                return Err(VmError::Internal(format!(
                    "unresolvable exception hierarchy: {:?}",
                    deferred
                )));
            }
            pending = deferred;
        }

        let mut reference = ClassDefinition::new(REFERENCE).with_field("referent", "Ljava/lang/Object;");
        let field = reference.add_field_ref(REFERENCE, "referent", "Ljava/lang/Object;");
        let [hi, lo] = field.to_be_bytes();
        let get = MethodDefinition::new("get", "()Ljava/lang/Object;")
            .with_access(AccessFlags::PUBLIC)
            .with_code(vec![
                Bytecode::Aload0.as_u8(),
                Bytecode::Getfield.as_u8(),
                hi,
                lo,
                Bytecode::Areturn.as_u8(),
            ]);
        self.load(mem, heap, &reference.with_method(get))?;

        // the first field holds the target Method*
        self.load(mem, heap, &ClassDefinition::new(METHOD_HANDLE).with_field("vmtarget", "J"))?;

        for ty in PRIMITIVE_ARRAYS {
            let id = self.load(mem, heap, &ClassDefinition::new(&array_class_name(ty)))?;
            self.klasses[id].array_element = Some(ty);
        }
        log::debug!(
            "bootstrapped {} classes, {} bytes of metaspace",
            self.klasses.len(),
            self.metaspace.used()
        );
        Ok(())
    }

    fn alloc(&mut self, size: u64) -> VmResult<u64> {
        self.metaspace.allocate(size, 8).ok_or_else(|| {
            VmError::Internal(format!(
                "metaspace exhausted: {} of {} bytes used",
                self.metaspace.used(),
                self.metaspace.capacity()
            ))
        })
    }

    /// Load `def`, returning its id.
    pub fn load(&mut self, mem: &mut AddressSpace, heap: &mut Heap, def: &ClassDefinition) -> VmResult<KlassId> {
        def.validate()?;
        if self.by_name.contains_key(&def.name) {
            return Err(VmError::InvalidClass(format!("{} is already loaded", def.name)));
        }
        let super_id = match def.super_name.as_deref() {
            Some(name) => Some(self.require(name)?),
            None if def.name == OBJECT => None,
            None => Some(self.require(OBJECT)?),
        };

        let mut fields = super_id
            .map(|s| self.klasses[s].fields.clone())
            .unwrap_or_default();
        for field in &def.fields {
            let offset = layout::FIELDS_OFFSET + fields.len() as i64 * layout::FIELD_SLOT_SIZE;
            fields.push(FieldInfo {
                name: field.name.clone(),
                descriptor: field.descriptor.clone(),
                ty: parse_field_descriptor(&field.descriptor)?,
                offset,
            });
        }

        let id = self.klasses.len();
        let address = self.alloc(klass::SIZE)?;
        let super_address = super_id.map(|s| self.klasses[s].address).unwrap_or(0);
        mem.write_u64(at(address, klass::SUPER), super_address)?;
        mem.write_u32(at(address, klass::INSTANCE_SLOTS), fields.len() as u32)?;
        mem.write_u32(at(address, klass::ID), id as u32)?;

        let length = def.constant_pool.len() as u64;
        let cp_address = self.alloc(constant_pool::SIZE)?;
        let cache_address = self.alloc(cp_cache::entry_field(length, 0))?;
        mem.write_u64(at(cp_address, constant_pool::POOL_HOLDER), address)?;
        mem.write_u64(at(cp_address, constant_pool::CACHE), cache_address)?;
        mem.write_u64(at(cp_address, constant_pool::LENGTH), length)?;
        mem.write_u64(cache_address, cp_address)?;
        mem.write_u64(cache_address + 8, length)?;
        for index in 0..length {
            mem.write_u32(cache_address + cp_cache::entry_field(index, cp_cache::INDICES), index as u32)?;
        }

        self.klasses.push(KlassInfo {
            name: def.name.clone(),
            address,
            super_id,
            fields,
            mirror: 0,
            constant_pool: def.constant_pool.clone(),
            cp_address,
            cache_address,
            methods: Vec::new(),
            array_element: None,
        });
        self.by_name.insert(def.name.clone(), id);
        self.by_klass_address.insert(address, id);
        self.install_mirror(mem, heap, id)?;

        for m in &def.methods {
            self.load_method(mem, id, m)?;
        }
        log::debug!(
            "loaded {} ({} methods) at {:#x}",
            def.name,
            def.methods.len(),
            address
        );
        Ok(id)
    }

    fn install_mirror(&mut self, mem: &mut AddressSpace, heap: &mut Heap, id: KlassId) -> VmResult<()> {
        if self.klasses[id].mirror != 0 {
            return Ok(());
        }
        let Some(class_id) = self.klass_id(CLASS) else {
            return Ok(());
        };
        let class = &self.klasses[class_id];
        let mirror = heap.allocate_instance(mem, class.address, class.fields.len())?;
        mem.write_u64(at(self.klasses[id].address, klass::MIRROR), mirror)?;
        self.klasses[id].mirror = mirror;
        self.by_mirror.insert(mirror, id);
        Ok(())
    }

    fn load_method(&mut self, mem: &mut AddressSpace, holder: KlassId, def: &MethodDefinition) -> VmResult<MethodId> {
        let descriptor = MethodDescriptor::parse(&def.descriptor)?;
        let size_of_parameters = def.size_of_parameters()?;
        let max_locals = def.max_locals.max(size_of_parameters as u16);
        let kind = method_kind(&self.klasses[holder].name, def, &self.policy);
        let code = rewrite(&def.code)?;

        let const_method_address = self.alloc(const_method::CODES as u64 + code.len().max(1) as u64)?;
        mem.write_u64(
            at(const_method_address, const_method::CONSTANTS),
            self.klasses[holder].cp_address,
        )?;
        mem.write_u16(
            at(const_method_address, const_method::SIZE_OF_PARAMETERS),
            size_of_parameters as u16,
        )?;
        mem.write_u16(at(const_method_address, const_method::MAX_LOCALS), max_locals)?;
        mem.write_u16(at(const_method_address, const_method::MAX_STACK), def.max_stack)?;
        mem.write_u16(at(const_method_address, const_method::CODE_SIZE), code.len() as u16)?;
        let code_base = at(const_method_address, const_method::CODES);
        mem.write_bytes(code_base, &code)?;

        let id = self.methods.len();
        let address = self.alloc(method::SIZE)?;
        mem.write_u64(at(address, method::CONST_METHOD), const_method_address)?;
        mem.write_u32(at(address, method::ACCESS_FLAGS), def.access.bits())?;
        mem.write_u64(at(address, method::FROM_INTERPRETED), self.entries[kind.index()])?;
        mem.write_u32(at(address, method::ID), id as u32)?;

        log::trace!(
            "{}.{}{}: {} entry, method at {:#x}",
            self.klasses[holder].name,
            def.name,
            def.descriptor,
            kind.name(),
            address
        );
        self.methods.push(MethodInfo {
            holder,
            name: def.name.clone(),
            descriptor,
            access: def.access,
            kind,
            address,
            code_base,
            code_len: code.len(),
            size_of_parameters,
            exception_table: def.exception_table.clone(),
        });
        self.klasses[holder].methods.push(id);
        self.by_method_address.insert(address, id);
        Ok(id)
    }

    /// The `MethodHandle` invoker for `name` with `descriptor`, created on
    /// first use. Invokers are signature polymorphic: one exists per
    /// descriptor.
    pub fn method_handle_invoker(&mut self, mem: &mut AddressSpace, name: &str, descriptor: &str) -> VmResult<MethodId> {
        let holder = self.require(METHOD_HANDLE)?;
        if let Some(id) = self.declared_method(holder, name, descriptor) {
            return Ok(id);
        }
        if !matches!(name, "invokeExact" | "invoke") {
            return Err(VmError::Linkage(format!("{}.{}{}", METHOD_HANDLE, name, descriptor)));
        }
        let def = MethodDefinition::new(name, descriptor)
            .with_access(AccessFlags::PUBLIC | AccessFlags::FINAL | AccessFlags::NATIVE);
        self.load_method(mem, holder, &def)
    }

    fn require(&self, name: &str) -> VmResult<KlassId> {
        self.klass_id(name)
            .ok_or_else(|| VmError::Linkage(format!("class {} is not loaded", name)))
    }

    /// Id of the class called `name`.
    pub fn klass_id(&self, name: &str) -> Option<KlassId> {
        self.by_name.get(name).copied()
    }

    /// Loaded class `id`.
    pub fn klass(&self, id: KlassId) -> &KlassInfo {
        &self.klasses[id]
    }

    /// Class whose `Klass*` is `address`.
    pub fn klass_at(&self, address: u64) -> Option<KlassId> {
        self.by_klass_address.get(&address).copied()
    }

    /// Class whose mirror is `mirror`.
    pub fn klass_of_mirror(&self, mirror: Oop) -> Option<KlassId> {
        self.by_mirror.get(&mirror).copied()
    }

    /// Class of the object at `oop`.
    pub fn klass_of(&self, mem: &AddressSpace, oop: Oop) -> VmResult<KlassId> {
        let address = mem.read_u64(oop + layout::KLASS_OFFSET as u64)?;
        self.klass_at(address)
            .ok_or_else(|| VmError::Internal(format!("object {:#x} has bad klass {:#x}", oop, address)))
    }

    /// Number of loaded classes.
    pub fn klass_count(&self) -> usize {
        self.klasses.len()
    }

    /// Loaded method `id`.
    pub fn method(&self, id: MethodId) -> &MethodInfo {
        &self.methods[id]
    }

    /// Method whose `Method*` is `address`.
    pub fn method_at(&self, address: u64) -> Option<MethodId> {
        self.by_method_address.get(&address).copied()
    }

    fn declared_method(&self, holder: KlassId, name: &str, descriptor: &str) -> Option<MethodId> {
        self.klasses[holder].methods.iter().copied().find(|&m| {
            let info = &self.methods[m];
            info.name == name && info.descriptor.as_str() == descriptor
        })
    }

    /// Look `name` up in `holder` and its superclasses. Without a
    /// descriptor the first method with that name matches.
    pub fn find_method(&self, holder: KlassId, name: &str, descriptor: Option<&str>) -> Option<MethodId> {
        let mut current = Some(holder);
        while let Some(k) = current {
            let found = self.klasses[k].methods.iter().copied().find(|&m| {
                let info = &self.methods[m];
                info.name == name && descriptor.map_or(true, |d| info.descriptor.as_str() == d)
            });
            if found.is_some() {
                return found;
            }
            current = self.klasses[k].super_id;
        }
        None
    }

    /// Field `name` with `descriptor` of `holder`, the most derived
    /// declaration winning.
    pub fn find_field(&self, holder: KlassId, name: &str, descriptor: &str) -> Option<&FieldInfo> {
        self.klasses[holder]
            .fields
            .iter()
            .rev()
            .find(|f| f.name == name && f.descriptor == descriptor)
    }

    /// Whether `sub` is `sup` or one of its subclasses.
    pub fn is_subclass(&self, sub: KlassId, sup: KlassId) -> bool {
        let mut current = Some(sub);
        while let Some(k) = current {
            if k == sup {
                return true;
            }
            current = self.klasses[k].super_id;
        }
        false
    }

    /// Array class of primitive `ty`.
    pub fn array_klass(&self, ty: BasicType) -> Option<KlassId> {
        self.klass_id(&array_class_name(ty))
    }

    /// Event payload naming method `id`.
    pub fn event(&self, id: MethodId) -> MethodEvent {
        let m = &self.methods[id];
        MethodEvent {
            class_name: self.klasses[m.holder].name.clone(),
            method_name: m.name.clone(),
            descriptor: m.descriptor.as_str().to_string(),
        }
    }

    /// Bytes of metaspace in use.
    pub fn metaspace_used(&self) -> u64 {
        self.metaspace.used()
    }
}

fn at(base: u64, offset: i64) -> u64 {
    base.wrapping_add(offset as u64)
}

/// Internal name of the array class of primitive `ty`.
pub fn array_class_name(ty: BasicType) -> String {
    let c = match ty {
        BasicType::Boolean => 'Z',
        BasicType::Char => 'C',
        BasicType::Float => 'F',
        BasicType::Double => 'D',
        BasicType::Byte => 'B',
        BasicType::Short => 'S',
        BasicType::Int => 'I',
        BasicType::Long => 'J',
        _ => 'L',
    };
    format!("[{}", c)
}

/// Bytes per element of a primitive array.
pub fn element_size(ty: BasicType) -> u64 {
    match ty {
        BasicType::Boolean | BasicType::Byte => 1,
        BasicType::Char | BasicType::Short => 2,
        BasicType::Int | BasicType::Float => 4,
        _ => 8,
    }
}
