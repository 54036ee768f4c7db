//! Field and method descriptors (JVMS §4.3).
//!
//! Descriptors drive almost every decision the instrumentation pass makes: which load and
//! return opcodes to emit, how many local slots the arguments occupy, which wrapper type a
//! primitive is boxed into, and the source-form type names handed to the dispatch runtime.
//!
//! # Examples
//!
//! ```rust
//! use shadowloader::classfile::{MethodDescriptor, ReturnType};
//!
//! let descriptor: MethodDescriptor = "(I[Ljava/lang/String;J)Z".parse()?;
//! assert_eq!(descriptor.params.len(), 3);
//! assert_eq!(descriptor.params[1].java_name(), "java.lang.String[]");
//! assert_eq!(descriptor.argument_slots(), 4);
//! assert!(matches!(descriptor.ret, ReturnType::Value(_)));
//! # Ok::<(), shadowloader::Error>(())
//! ```

use std::{fmt, str::FromStr};

use strum::{Display, EnumIter};

use crate::{Error, Result};

/// A field type, or the type of a single method parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// `B`
    Byte,
    /// `C`
    Char,
    /// `D`
    Double,
    /// `F`
    Float,
    /// `I`
    Int,
    /// `J`
    Long,
    /// `S`
    Short,
    /// `Z`
    Boolean,
    /// `L<internal name>;`
    Object(String),
    /// `[<component>`
    Array(Box<FieldType>),
}

/// Primitive wrapper information used when boxing and unboxing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boxing {
    /// Internal name of the wrapper class (`java/lang/Integer`)
    pub wrapper: &'static str,
    /// Descriptor of the static `valueOf` factory
    pub value_of: &'static str,
    /// Name of the unboxing accessor (`intValue`)
    pub accessor: &'static str,
}

impl FieldType {
    /// Parse one field type starting at `pos`, returning it and the position after it.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an invalid or truncated descriptor.
    pub fn parse_at(descriptor: &str, pos: usize) -> Result<(FieldType, usize)> {
        let bytes = descriptor.as_bytes();
        let Some(&tag) = bytes.get(pos) else {
            return Err(malformed_error!("Truncated descriptor '{}'", descriptor));
        };

        let simple = match tag {
            b'B' => Some(FieldType::Byte),
            b'C' => Some(FieldType::Char),
            b'D' => Some(FieldType::Double),
            b'F' => Some(FieldType::Float),
            b'I' => Some(FieldType::Int),
            b'J' => Some(FieldType::Long),
            b'S' => Some(FieldType::Short),
            b'Z' => Some(FieldType::Boolean),
            _ => None,
        };
        if let Some(simple) = simple {
            return Ok((simple, pos + 1));
        }

        match tag {
            b'L' => {
                let Some(end) = descriptor[pos..].find(';').map(|offset| pos + offset) else {
                    return Err(malformed_error!("Unterminated class type in '{}'", descriptor));
                };
                if end == pos + 1 {
                    return Err(malformed_error!("Empty class name in '{}'", descriptor));
                }
                Ok((FieldType::Object(descriptor[pos + 1..end].to_string()), end + 1))
            }
            b'[' => {
                let (component, next) = FieldType::parse_at(descriptor, pos + 1)?;
                Ok((FieldType::Array(Box::new(component)), next))
            }
            other => Err(malformed_error!(
                "Invalid type tag '{}' in descriptor '{}'",
                char::from(other),
                descriptor
            )),
        }
    }

    /// Number of local variable / operand stack slots a value of this type occupies.
    #[must_use]
    pub fn slot_size(&self) -> u16 {
        match self {
            FieldType::Long | FieldType::Double => 2,
            _ => 1,
        }
    }

    /// `true` for the eight primitive types
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        !matches!(self, FieldType::Object(_) | FieldType::Array(_))
    }

    /// The name used by Java source code and `Class.getName()` for components:
    /// `int`, `java.lang.String`, `int[]`, `java.lang.Object[][]`.
    #[must_use]
    pub fn java_name(&self) -> String {
        match self {
            FieldType::Byte => "byte".to_string(),
            FieldType::Char => "char".to_string(),
            FieldType::Double => "double".to_string(),
            FieldType::Float => "float".to_string(),
            FieldType::Int => "int".to_string(),
            FieldType::Long => "long".to_string(),
            FieldType::Short => "short".to_string(),
            FieldType::Boolean => "boolean".to_string(),
            FieldType::Object(name) => name.replace('/', "."),
            FieldType::Array(component) => format!("{}[]", component.java_name()),
        }
    }

    /// The operand of a `checkcast` to this type: the internal name for classes, the full
    /// descriptor for arrays.
    #[must_use]
    pub fn cast_target(&self) -> String {
        match self {
            FieldType::Object(name) => name.clone(),
            other => other.to_string(),
        }
    }

    /// Wrapper class used to box this primitive, `None` for reference types.
    #[must_use]
    pub fn boxing(&self) -> Option<Boxing> {
        let (wrapper, value_of, accessor) = match self {
            FieldType::Byte => ("java/lang/Byte", "(B)Ljava/lang/Byte;", "byteValue"),
            FieldType::Char => ("java/lang/Character", "(C)Ljava/lang/Character;", "charValue"),
            FieldType::Double => ("java/lang/Double", "(D)Ljava/lang/Double;", "doubleValue"),
            FieldType::Float => ("java/lang/Float", "(F)Ljava/lang/Float;", "floatValue"),
            FieldType::Int => ("java/lang/Integer", "(I)Ljava/lang/Integer;", "intValue"),
            FieldType::Long => ("java/lang/Long", "(J)Ljava/lang/Long;", "longValue"),
            FieldType::Short => ("java/lang/Short", "(S)Ljava/lang/Short;", "shortValue"),
            FieldType::Boolean => ("java/lang/Boolean", "(Z)Ljava/lang/Boolean;", "booleanValue"),
            FieldType::Object(_) | FieldType::Array(_) => return None,
        };
        Some(Boxing {
            wrapper,
            value_of,
            accessor,
        })
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Byte => f.write_str("B"),
            FieldType::Char => f.write_str("C"),
            FieldType::Double => f.write_str("D"),
            FieldType::Float => f.write_str("F"),
            FieldType::Int => f.write_str("I"),
            FieldType::Long => f.write_str("J"),
            FieldType::Short => f.write_str("S"),
            FieldType::Boolean => f.write_str("Z"),
            FieldType::Object(name) => write!(f, "L{name};"),
            FieldType::Array(component) => write!(f, "[{component}"),
        }
    }
}

impl FromStr for FieldType {
    type Err = Error;

    fn from_str(descriptor: &str) -> Result<Self> {
        let (field_type, end) = FieldType::parse_at(descriptor, 0)?;
        if end != descriptor.len() {
            return Err(malformed_error!("Trailing data in field descriptor '{}'", descriptor));
        }
        Ok(field_type)
    }
}

/// Return type of a method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReturnType {
    /// `V`
    Void,
    /// Any field type
    Value(FieldType),
}

/// Coarse classification of a return type, selecting how a handler result is converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
pub enum ReturnCategory {
    /// Result is discarded
    Void,
    /// Result is cast to the wrapper and unboxed
    Primitive,
    /// Result is cast to the declared type
    Reference,
}

impl ReturnType {
    /// Classify this return type
    #[must_use]
    pub fn category(&self) -> ReturnCategory {
        match self {
            ReturnType::Void => ReturnCategory::Void,
            ReturnType::Value(value) if value.is_primitive() => ReturnCategory::Primitive,
            ReturnType::Value(_) => ReturnCategory::Reference,
        }
    }

    /// Operand stack slots the returned value occupies
    #[must_use]
    pub fn slot_size(&self) -> u16 {
        match self {
            ReturnType::Void => 0,
            ReturnType::Value(value) => value.slot_size(),
        }
    }
}

impl fmt::Display for ReturnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnType::Void => f.write_str("V"),
            ReturnType::Value(value) => value.fmt(f),
        }
    }
}

/// A parsed method descriptor: ordered parameter types and a return type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    /// Parameter types in declaration order
    pub params: Vec<FieldType>,
    /// Return type
    pub ret: ReturnType,
}

impl MethodDescriptor {
    /// Build a descriptor from parts.
    #[must_use]
    pub fn new(params: Vec<FieldType>, ret: ReturnType) -> Self {
        MethodDescriptor { params, ret }
    }

    /// Total local slots used by the parameters (excluding the receiver).
    #[must_use]
    pub fn argument_slots(&self) -> u16 {
        self.params.iter().map(FieldType::slot_size).sum()
    }

    /// Source-form parameter type names, as handed to the dispatch runtime
    #[must_use]
    pub fn param_java_names(&self) -> Vec<String> {
        self.params.iter().map(FieldType::java_name).collect()
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for param in &self.params {
            param.fmt(f)?;
        }
        write!(f, "){}", self.ret)
    }
}

impl FromStr for MethodDescriptor {
    type Err = Error;

    fn from_str(descriptor: &str) -> Result<Self> {
        let bytes = descriptor.as_bytes();
        if bytes.first() != Some(&b'(') {
            return Err(malformed_error!("Method descriptor '{}' lacks '('", descriptor));
        }

        let mut params = Vec::new();
        let mut pos = 1;
        loop {
            match bytes.get(pos) {
                Some(b')') => break,
                Some(_) => {
                    let (param, next) = FieldType::parse_at(descriptor, pos)?;
                    params.push(param);
                    pos = next;
                }
                None => {
                    return Err(malformed_error!("Unterminated parameters in '{}'", descriptor))
                }
            }
        }

        pos += 1;
        let ret = if descriptor[pos..] == *"V" {
            ReturnType::Void
        } else {
            let (value, end) = FieldType::parse_at(descriptor, pos)?;
            if end != descriptor.len() {
                return Err(malformed_error!("Trailing data in method descriptor '{}'", descriptor));
            }
            ReturnType::Value(value)
        };

        Ok(MethodDescriptor { params, ret })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_parse_and_display() {
        for text in ["()V", "(IJ)D", "([[Ljava/lang/Object;Z)Ljava/lang/String;", "(CSBF)[I"] {
            let parsed: MethodDescriptor = text.parse().unwrap();
            assert_eq!(parsed.to_string(), text);
        }
    }

    #[test]
    fn test_argument_slots() {
        let descriptor: MethodDescriptor = "(JDILjava/lang/Object;)V".parse().unwrap();
        assert_eq!(descriptor.argument_slots(), 6);
    }

    #[test]
    fn test_java_names() {
        let descriptor: MethodDescriptor = "(I[ILjava/lang/String;[[Lp/Outer$Inner;)V"
            .parse()
            .unwrap();
        assert_eq!(
            descriptor.param_java_names(),
            vec!["int", "int[]", "java.lang.String", "p.Outer$Inner[][]"]
        );
    }

    #[test]
    fn test_return_categories() {
        let categories: Vec<_> = ["()V", "()I", "()[I", "()Ljava/lang/Object;"]
            .iter()
            .map(|text| text.parse::<MethodDescriptor>().unwrap().ret.category())
            .collect();
        assert_eq!(
            categories,
            vec![
                ReturnCategory::Void,
                ReturnCategory::Primitive,
                ReturnCategory::Reference,
                ReturnCategory::Reference
            ]
        );
        assert_eq!(ReturnCategory::iter().count(), 3);
    }

    #[test]
    fn test_invalid_descriptors() {
        for text in ["", "V", "(I", "(Q)V", "(Ljava/lang/Object)V", "()II", "(L;)V"] {
            assert!(text.parse::<MethodDescriptor>().is_err(), "{text} should fail");
        }
        assert!("II".parse::<FieldType>().is_err());
    }

    #[test]
    fn test_boxing_and_cast_target() {
        assert_eq!(FieldType::Int.boxing().unwrap().wrapper, "java/lang/Integer");
        assert!(FieldType::Object("a/B".into()).boxing().is_none());
        assert_eq!(FieldType::Object("a/B".into()).cast_target(), "a/B");
        assert_eq!(
            FieldType::Array(Box::new(FieldType::Int)).cast_target(),
            "[I"
        );
    }
}
