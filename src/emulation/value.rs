//! Runtime values of the verification interpreter.

use std::{collections::BTreeMap, fmt};

/// Handle of an object on the emulated heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeapRef(pub(crate) usize);

impl HeapRef {
    /// Heap slot.
    #[must_use]
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Location a managed pointer refers to.
#[derive(Debug, Clone, PartialEq)]
pub enum Pointer {
    /// An argument of the executing method
    Arg(u16),
    /// A local of the executing method
    Local(u16),
    /// Storage of a by-reference argument supplied by the caller
    Cell(usize),
    /// A field of the value type behind another pointer
    Field(Box<Pointer>, String),
    /// A field of a heap object
    HeapField(HeapRef, String),
}

/// A value type instance: its type id and its fields by name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StructValue {
    /// Canonical type id
    pub type_id: String,
    /// Field values
    pub fields: BTreeMap<String, EmValue>,
}

impl StructValue {
    /// Creates an instance without fields.
    #[must_use]
    pub fn new(type_id: impl Into<String>) -> Self {
        StructValue {
            type_id: type_id.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field assignment.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: EmValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// A field value.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&EmValue> {
        self.fields.get(name)
    }

    /// Element `index` of an argument pack (field `t{index}`).
    #[must_use]
    pub fn element(&self, index: usize) -> Option<&EmValue> {
        self.fields.get(&format!("t{index}"))
    }

    /// Sets element `index` of an argument pack.
    pub fn set_element(&mut self, index: usize, value: EmValue) {
        self.fields.insert(format!("t{index}"), value);
    }
}

/// A value on the evaluation stack, in a local, argument or field.
///
/// Small integers, booleans and chars are widened to [`EmValue::I32`]; native integers
/// use [`EmValue::I64`]; both float widths use [`EmValue::F64`].
#[derive(Debug, Clone, PartialEq)]
pub enum EmValue {
    /// No value
    Void,
    /// 32-bit integer
    I32(i32),
    /// 64-bit or native integer
    I64(i64),
    /// Floating point
    F64(f64),
    /// The null reference
    Null,
    /// A string reference
    Str(String),
    /// A value type instance
    Struct(StructValue),
    /// A reference type instance
    Object(HeapRef),
    /// A managed pointer
    Ptr(Pointer),
}

impl EmValue {
    /// Truth value as tested by `brtrue`.
    #[must_use]
    pub fn is_true(&self) -> bool {
        match self {
            EmValue::Void | EmValue::Null => false,
            EmValue::I32(value) => *value != 0,
            EmValue::I64(value) => *value != 0,
            EmValue::F64(value) => *value != 0.0,
            EmValue::Str(_) | EmValue::Struct(_) | EmValue::Object(_) | EmValue::Ptr(_) => true,
        }
    }

    /// The value as a 64-bit integer, if it is an integer.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            EmValue::I32(value) => Some(i64::from(*value)),
            EmValue::I64(value) => Some(*value),
            _ => None,
        }
    }

    /// The value as a struct, if it is one.
    #[must_use]
    pub fn as_struct(&self) -> Option<&StructValue> {
        match self {
            EmValue::Struct(value) => Some(value),
            _ => None,
        }
    }
}

impl From<i32> for EmValue {
    fn from(value: i32) -> Self {
        EmValue::I32(value)
    }
}

impl From<i64> for EmValue {
    fn from(value: i64) -> Self {
        EmValue::I64(value)
    }
}

impl From<bool> for EmValue {
    fn from(value: bool) -> Self {
        EmValue::I32(i32::from(value))
    }
}

impl From<StructValue> for EmValue {
    fn from(value: StructValue) -> Self {
        EmValue::Struct(value)
    }
}

impl fmt::Display for EmValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmValue::Void => write!(f, "void"),
            EmValue::I32(value) => write!(f, "{value}"),
            EmValue::I64(value) => write!(f, "{value}L"),
            EmValue::F64(value) => write!(f, "{value}"),
            EmValue::Null => write!(f, "null"),
            EmValue::Str(value) => write!(f, "{value:?}"),
            EmValue::Struct(value) => {
                write!(f, "{} {{ {} fields }}", value.type_id, value.fields.len())
            }
            EmValue::Object(object) => write!(f, "object#{}", object.0),
            EmValue::Ptr(pointer) => write!(f, "&{pointer:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness() {
        assert!(!EmValue::I32(0).is_true());
        assert!(EmValue::I64(-1).is_true());
        assert!(!EmValue::Null.is_true());
        assert!(EmValue::Str(String::new()).is_true());
        assert!(EmValue::from(true).is_true());
    }

    #[test]
    fn pack_elements() {
        let mut pack = StructValue::new("Hotfix.ArgPack`2").with_field("t0", EmValue::I32(3));
        pack.set_element(1, EmValue::Null);
        assert_eq!(pack.element(0), Some(&EmValue::I32(3)));
        assert_eq!(pack.element(1), Some(&EmValue::Null));
        assert_eq!(pack.element(2), None);
        assert_eq!(EmValue::from(pack).as_struct().map(|s| s.fields.len()), Some(2));
    }
}
