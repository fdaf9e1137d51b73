//! Unit tests for host-side values

use core_types::{BasicType, Value};

#[cfg(test)]
mod value_tests {
    use super::*;

    #[test]
    fn test_basic_types() {
        assert_eq!(Value::Boolean(true).basic_type(), BasicType::Boolean);
        assert_eq!(Value::NULL.basic_type(), BasicType::Object);
        assert_eq!(Value::Void.basic_type(), BasicType::Void);
    }

    #[test]
    fn test_stack_words_match_type_size() {
        let values = [
            Value::Boolean(false),
            Value::Byte(-1),
            Value::Char(65),
            Value::Short(-2),
            Value::Int(3),
            Value::Long(4),
            Value::Float(1.5),
            Value::Double(2.5),
            Value::Object(0x1000),
        ];
        for v in values {
            assert_eq!(v.to_stack_words().len(), v.basic_type().size_in_words());
        }
    }

    #[test]
    fn test_int_words_are_sign_extended() {
        assert_eq!(Value::Int(-2).to_stack_words(), vec![0xffff_ffff_ffff_fffe]);
        assert_eq!(Value::Byte(-1).to_stack_words(), vec![u64::MAX]);
        assert_eq!(Value::Char(0xffff).to_stack_words(), vec![0xffff]);
    }

    #[test]
    fn test_double_payload_is_second_word() {
        let words = Value::Double(1.0).to_stack_words();
        assert_eq!(words[0], 0);
        assert_eq!(f64::from_bits(words[1]), 1.0);
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Value::Int(9).as_int(), Some(9));
        assert_eq!(Value::Long(9).as_int(), None);
        assert_eq!(Value::Object(0x20).as_oop(), Some(0x20));
    }
}
