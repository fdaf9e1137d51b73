//! Tests for class definitions and descriptors

use bytecode_system::{
    method_kind, Bytecode, ClassDefinition, CodeBuilder, KindPolicy, MethodDefinition,
    MethodDescriptor,
};
use core_types::{AccessFlags, BasicType, MethodKind};

fn returning(bc: Bytecode) -> Vec<u8> {
    let mut b = CodeBuilder::new();
    b.op(bc);
    b.finish().unwrap()
}

#[test]
fn test_descriptor_return_types() {
    let d = MethodDescriptor::parse("()Ljava/lang/Object;").unwrap();
    assert_eq!(d.return_type(), BasicType::Object);
    assert_eq!(d.parameter_words(), 0);
}

#[test]
fn test_lookup_by_name_and_descriptor() {
    let class = ClassDefinition::new("demo/A")
        .with_method(MethodDefinition::new("f", "()V").with_code(returning(Bytecode::Return)))
        .with_method(MethodDefinition::new("f", "(I)V").with_code(returning(Bytecode::Return)));
    assert_eq!(class.method("f", "(I)V").unwrap().descriptor, "(I)V");
    assert!(class.method("g", "()V").is_none());
}

#[test]
fn test_missing_body_rejected() {
    let class = ClassDefinition::new("demo/A").with_method(MethodDefinition::new("f", "()V"));
    assert!(class.validate().is_err());
}

#[test]
fn test_reference_get_kind() {
    let m = MethodDefinition::new("get", "()Ljava/lang/Object;")
        .with_access(AccessFlags::PUBLIC)
        .with_code(returning(Bytecode::Areturn));
    assert_eq!(
        method_kind("java/lang/ref/Reference", &m, &KindPolicy::default()),
        MethodKind::ReferenceGet
    );
}

#[test]
fn test_method_handle_kind() {
    let m = MethodDefinition::new("invokeExact", "(Ljava/lang/invoke/MethodHandle;I)I")
        .with_access(AccessFlags::PUBLIC | AccessFlags::NATIVE | AccessFlags::VARARGS);
    assert_eq!(
        method_kind("java/lang/invoke/MethodHandle", &m, &KindPolicy::default()),
        MethodKind::MethodHandle
    );
}
