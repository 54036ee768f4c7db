//! Runtime values of the dispatch emulator.

use std::fmt;

use crate::classfile::descriptor::FieldType;

/// Reference to an object on the emulator [`Heap`](crate::emulation::Heap).
///
/// Two `HeapRef` values are equal if they point to the same heap object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HeapRef(pub(crate) usize);

impl HeapRef {
    /// Returns the internal ID of this heap reference.
    #[must_use]
    pub fn id(&self) -> usize {
        self.0
    }
}

impl fmt::Display for HeapRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HeapRef({})", self.0)
    }
}

/// A value on the operand stack, in a local or in a field.
///
/// | JVM type | Variant |
/// |----------|---------|
/// | `boolean`, `byte`, `char`, `short`, `int` | [`Value::Int`] |
/// | `long` | [`Value::Long`] |
/// | `float` | [`Value::Float`] |
/// | `double` | [`Value::Double`] |
/// | any reference | [`Value::Ref`] or [`Value::Null`] |
///
/// One stack entry holds one value regardless of its slot size; locals store `long` and
/// `double` in their first slot and leave [`Value::Top`] in the second.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value {
    /// Unusable slot (second half of a wide local, or never written)
    Top,
    /// 32-bit integer, also carries the sub-int primitives
    Int(i32),
    /// 64-bit integer
    Long(i64),
    /// 32-bit float
    Float(f32),
    /// 64-bit float
    Double(f64),
    /// The null reference
    Null,
    /// A heap reference
    Ref(HeapRef),
}

impl Value {
    /// Default value of a field or array element of `field_type`
    #[must_use]
    pub fn default_for(field_type: &FieldType) -> Self {
        match field_type {
            FieldType::Long => Value::Long(0),
            FieldType::Float => Value::Float(0.0),
            FieldType::Double => Value::Double(0.0),
            FieldType::Object(_) | FieldType::Array(_) => Value::Null,
            _ => Value::Int(0),
        }
    }

    /// `true` for values occupying two slots
    #[must_use]
    pub fn is_wide(&self) -> bool {
        matches!(self, Value::Long(_) | Value::Double(_))
    }

    /// The integer payload, if this is an `Int`
    #[must_use]
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// The referenced object, if this is a non-null reference
    #[must_use]
    pub fn as_heap_ref(&self) -> Option<HeapRef> {
        match self {
            Value::Ref(reference) => Some(*reference),
            _ => None,
        }
    }

    /// `true` for `null` and references
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(self, Value::Null | Value::Ref(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Top => f.write_str("top"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Long(value) => write!(f, "{value}L"),
            Value::Float(value) => write!(f, "{value}F"),
            Value::Double(value) => write!(f, "{value}D"),
            Value::Null => f.write_str("null"),
            Value::Ref(reference) => write!(f, "{reference}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_width() {
        assert_eq!(Value::default_for(&FieldType::Boolean), Value::Int(0));
        assert_eq!(
            Value::default_for(&FieldType::Object("java/lang/String".into())),
            Value::Null
        );
        assert!(Value::default_for(&FieldType::Double).is_wide());
        assert!(!Value::Int(3).is_wide());
        assert_eq!(Value::Ref(HeapRef(4)).to_string(), "HeapRef(4)");
    }
}
