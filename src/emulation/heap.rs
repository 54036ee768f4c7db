//! Object storage of the dispatch emulator.
//!
//! The heap never collects; references stay valid for the lifetime of the emulator.

use std::collections::HashMap;

use crate::{
    emulation::value::{HeapRef, Value},
    Error, Result,
};

/// An object allocated by emulated code or by the emulator itself.
#[derive(Clone, Debug, PartialEq)]
pub enum HeapObject {
    /// An instance of a loaded class, fields keyed by name
    Instance {
        /// Internal name of the runtime class
        class: String,
        /// Instance field values
        fields: HashMap<String, Value>,
    },
    /// A primitive wrapper (`java/lang/Integer`, `java/lang/Boolean`, ...)
    Boxed {
        /// Internal name of the wrapper class
        wrapper: String,
        /// The wrapped primitive
        value: Value,
    },
    /// A `java/lang/String`
    Str(String),
    /// A `java/lang/Class` for the given internal name
    ClassLiteral(String),
    /// A one-dimensional array
    Array {
        /// Internal name or descriptor of the element type
        element: String,
        /// Elements
        values: Vec<Value>,
    },
}

impl HeapObject {
    /// Internal name of the object's runtime class
    #[must_use]
    pub fn class_name(&self) -> String {
        match self {
            HeapObject::Instance { class, .. } => class.clone(),
            HeapObject::Boxed { wrapper, .. } => wrapper.clone(),
            HeapObject::Str(_) => "java/lang/String".to_string(),
            HeapObject::ClassLiteral(_) => "java/lang/Class".to_string(),
            HeapObject::Array { element, .. } if element.starts_with('[') || element.len() == 1 => {
                format!("[{element}")
            }
            HeapObject::Array { element, .. } => format!("[L{element};"),
        }
    }
}

/// Emulator heap.
#[derive(Debug, Default)]
pub struct Heap {
    objects: Vec<HeapObject>,
    strings: HashMap<String, HeapRef>,
    classes: HashMap<String, HeapRef>,
    limit: usize,
}

impl Heap {
    /// Create a heap holding at most `limit` objects (0 for unlimited).
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Heap {
            limit,
            ..Self::default()
        }
    }

    /// Number of allocated objects
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// `true` if nothing has been allocated
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Allocate `object`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Emulation`] when the object limit is reached.
    pub fn alloc(&mut self, object: HeapObject) -> Result<HeapRef> {
        if self.limit != 0 && self.objects.len() >= self.limit {
            return Err(Error::Emulation(format!(
                "heap limit of {} objects reached",
                self.limit
            )));
        }
        self.objects.push(object);
        Ok(HeapRef(self.objects.len() - 1))
    }

    /// Interned string constant.
    ///
    /// # Errors
    /// See [`Heap::alloc`].
    pub fn intern_string(&mut self, value: &str) -> Result<HeapRef> {
        if let Some(existing) = self.strings.get(value) {
            return Ok(*existing);
        }
        let reference = self.alloc(HeapObject::Str(value.to_string()))?;
        self.strings.insert(value.to_string(), reference);
        Ok(reference)
    }

    /// The unique class literal for `internal_name`.
    ///
    /// # Errors
    /// See [`Heap::alloc`].
    pub fn class_literal(&mut self, internal_name: &str) -> Result<HeapRef> {
        if let Some(existing) = self.classes.get(internal_name) {
            return Ok(*existing);
        }
        let reference = self.alloc(HeapObject::ClassLiteral(internal_name.to_string()))?;
        self.classes.insert(internal_name.to_string(), reference);
        Ok(reference)
    }

    /// Look up an object.
    ///
    /// # Errors
    /// Returns [`crate::Error::Emulation`] for a dangling reference.
    pub fn get(&self, reference: HeapRef) -> Result<&HeapObject> {
        self.objects
            .get(reference.0)
            .ok_or_else(|| Error::Emulation(format!("dangling {reference}")))
    }

    /// Look up an object for modification.
    ///
    /// # Errors
    /// Returns [`crate::Error::Emulation`] for a dangling reference.
    pub fn get_mut(&mut self, reference: HeapRef) -> Result<&mut HeapObject> {
        self.objects
            .get_mut(reference.0)
            .ok_or_else(|| Error::Emulation(format!("dangling {reference}")))
    }

    /// Contents of a string object, `None` for other objects
    #[must_use]
    pub fn string(&self, reference: HeapRef) -> Option<&str> {
        match self.objects.get(reference.0) {
            Some(HeapObject::Str(value)) => Some(value),
            _ => None,
        }
    }

    /// Elements of an array object, `None` for other objects
    #[must_use]
    pub fn array(&self, reference: HeapRef) -> Option<&[Value]> {
        match self.objects.get(reference.0) {
            Some(HeapObject::Array { values, .. }) => Some(values),
            _ => None,
        }
    }

    /// Unwrap a boxed primitive; other values are returned unchanged.
    #[must_use]
    pub fn unboxed(&self, value: Value) -> Value {
        match value {
            Value::Ref(reference) => match self.objects.get(reference.0) {
                Some(HeapObject::Boxed { value, .. }) => *value,
                _ => value,
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_and_literals() {
        let mut heap = Heap::new(0);
        let first = heap.intern_string("a").unwrap();
        assert_eq!(heap.intern_string("a").unwrap(), first);
        assert_eq!(heap.string(first), Some("a"));

        let class = heap.class_literal("p/A").unwrap();
        assert_eq!(heap.class_literal("p/A").unwrap(), class);
        assert_eq!(heap.get(class).unwrap().class_name(), "java/lang/Class");
        assert_eq!(heap.len(), 2);
    }

    #[test]
    fn test_limit_and_unboxing() {
        let mut heap = Heap::new(1);
        let boxed = heap
            .alloc(HeapObject::Boxed {
                wrapper: "java/lang/Integer".to_string(),
                value: Value::Int(7),
            })
            .unwrap();
        assert_eq!(heap.unboxed(Value::Ref(boxed)), Value::Int(7));
        assert!(matches!(heap.alloc(HeapObject::Str(String::new())), Err(Error::Emulation(_))));
    }
}
