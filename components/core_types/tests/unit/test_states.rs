//! Unit tests for tos states, method kinds and thread states

use core_types::{
    AccessFlags, MethodKind, PopframeCondition, PopframeState, StackGuardState, TosState,
};

#[test]
fn test_int_like_states() {
    let int_like: Vec<_> = TosState::ALL.iter().filter(|s| s.is_int_like()).collect();
    assert_eq!(int_like.len(), 5);
    assert!(!TosState::Ltos.is_int_like());
    assert!(TosState::Dtos.is_float_like());
}

#[test]
fn test_method_kind_names_unique() {
    let mut names: Vec<_> = MethodKind::ALL.iter().map(|k| k.name()).collect();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), MethodKind::COUNT);
}

#[test]
fn test_popframe_transitions() {
    let mut cond = PopframeCondition::PENDING;
    assert_eq!(cond.state(), PopframeState::Pending);
    cond |= PopframeCondition::PROCESSING;
    assert_eq!(cond.state(), PopframeState::Processing);
    cond = PopframeCondition::empty();
    assert_eq!(cond.state(), PopframeState::Inactive);
}

#[test]
fn test_stack_guard_decode() {
    assert_eq!(StackGuardState::from_u32(2), Some(StackGuardState::Enabled));
    assert_eq!(StackGuardState::from_u32(7), None);
}

#[test]
fn test_default_access_flags() {
    let flags = AccessFlags::default();
    assert!(flags.is_static());
    assert!(!flags.is_abstract());
}
