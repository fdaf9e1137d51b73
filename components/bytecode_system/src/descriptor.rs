//! Method and field descriptors
//!
//! Parses descriptors such as `(IJ[Ljava/lang/Object;)D` into basic types.

use core_types::{BasicType, VmError, VmResult};

/// A parsed method descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    text: String,
    parameters: Vec<BasicType>,
    return_type: BasicType,
}

impl MethodDescriptor {
    /// Parse a method descriptor.
    pub fn parse(text: &str) -> VmResult<Self> {
        let malformed = || VmError::InvalidClass(format!("malformed method descriptor {:?}", text));
        let bytes = text.as_bytes();
        if bytes.first() != Some(&b'(') {
            return Err(malformed());
        }
        let mut pos = 1;
        let mut parameters = Vec::new();
        loop {
            match bytes.get(pos) {
                Some(b')') => {
                    pos += 1;
                    break;
                }
                Some(_) => {
                    let (ty, next) = parse_field_type(text, pos).ok_or_else(malformed)?;
                    if ty == BasicType::Void {
                        return Err(malformed());
                    }
                    parameters.push(ty);
                    pos = next;
                }
                None => return Err(malformed()),
            }
        }
        let (return_type, end) = parse_field_type(text, pos).ok_or_else(malformed)?;
        if end != bytes.len() {
            return Err(malformed());
        }
        Ok(Self {
            text: text.to_string(),
            parameters,
            return_type,
        })
    }

    /// Descriptor text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Declared parameter types, receiver excluded.
    pub fn parameters(&self) -> &[BasicType] {
        &self.parameters
    }

    /// Return type.
    pub fn return_type(&self) -> BasicType {
        self.return_type
    }

    /// Words the declared parameters occupy, receiver excluded.
    pub fn parameter_words(&self) -> usize {
        self.parameters.iter().map(|t| t.size_in_words()).sum()
    }
}

impl std::fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// Parse a single field descriptor such as `I` or `Ljava/lang/String;`.
pub fn parse_field_descriptor(text: &str) -> VmResult<BasicType> {
    match parse_field_type(text, 0) {
        Some((ty, end)) if end == text.len() && ty != BasicType::Void => Ok(ty),
        _ => Err(VmError::InvalidClass(format!(
            "malformed field descriptor {:?}",
            text
        ))),
    }
}

/// Parse one type starting at `pos`; returns the type and the position
/// after it.
fn parse_field_type(text: &str, pos: usize) -> Option<(BasicType, usize)> {
    let bytes = text.as_bytes();
    let c = *bytes.get(pos)? as char;
    let ty = BasicType::from_descriptor_char(c)?;
    match ty {
        BasicType::Object => {
            let rest = &text[pos + 1..];
            let semi = rest.find(';')?;
            if semi == 0 {
                return None;
            }
            Some((ty, pos + 1 + semi + 1))
        }
        BasicType::Array => {
            let mut end = pos;
            while bytes.get(end) == Some(&b'[') {
                end += 1;
            }
            let (elem, next) = parse_field_type(text, end)?;
            if elem == BasicType::Void {
                return None;
            }
            Some((BasicType::Array, next))
        }
        _ => Some((ty, pos + 1)),
    }
}
