//! Custom attributes attached to types, methods and properties.
//!
//! Attributes are kept in decoded form: the attribute type's canonical id, the constructor
//! arguments and the named field/property assignments. The work-set selector only needs to
//! answer one question about them, which [`marker_state`] does: does a member carry the
//! marker attribute, and if so, does the marker forbid interception.

use serde::{Deserialize, Serialize};

/// A decoded attribute argument value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CustomAttributeArgument {
    /// Boolean value
    Bool(bool),
    /// Character value
    Char(char),
    /// Signed 32-bit integer
    I4(i32),
    /// Signed 64-bit integer
    I8(i64),
    /// 64-bit floating point
    R8(f64),
    /// String value, `None` for a null string
    String(Option<String>),
    /// Type reference by canonical id
    Type(String),
    /// Enum value (enum type id + underlying value)
    Enum(String, i64),
    /// Array of arguments
    Array(Vec<CustomAttributeArgument>),
}

/// A named argument (field or property assignment) of an attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomAttributeNamedArgument {
    /// Whether this is a field (true) or property (false)
    pub is_field: bool,
    /// Name of the field or property
    pub name: String,
    /// Assigned value
    pub value: CustomAttributeArgument,
}

/// An attribute instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomAttribute {
    /// Canonical id of the attribute type
    pub attribute_type: String,
    /// Constructor arguments in declaration order
    pub fixed_args: Vec<CustomAttributeArgument>,
    /// Field and property assignments
    pub named_args: Vec<CustomAttributeNamedArgument>,
}

impl CustomAttribute {
    /// An attribute without arguments.
    #[must_use]
    pub fn new(attribute_type: impl Into<String>) -> Self {
        CustomAttribute {
            attribute_type: attribute_type.into(),
            fixed_args: Vec::new(),
            named_args: Vec::new(),
        }
    }

    /// Adds a named field assignment.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: CustomAttributeArgument) -> Self {
        self.named_args.push(CustomAttributeNamedArgument {
            is_field: true,
            name: name.into(),
            value,
        });
        self
    }

    /// The value assigned to the named field `name`.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&CustomAttributeArgument> {
        self.named_args
            .iter()
            .find(|arg| arg.is_field && arg.name == name)
            .map(|arg| &arg.value)
    }
}

/// Outcome of the marker capability query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerState {
    /// The member carries no marker
    None,
    /// The member carries the marker
    Included,
    /// The member carries the marker with its forbidden flag set
    Forbidden,
}

/// Classifies a member by its attributes.
///
/// The first attribute of type `marker` decides: if it assigns `true` to the field
/// `forbidden_field` the member is [`MarkerState::Forbidden`], otherwise
/// [`MarkerState::Included`].
#[must_use]
pub fn marker_state(
    attributes: &[CustomAttribute],
    marker: &str,
    forbidden_field: &str,
) -> MarkerState {
    match attributes.iter().find(|attr| attr.attribute_type == marker) {
        None => MarkerState::None,
        Some(attr) => match attr.field(forbidden_field) {
            Some(CustomAttributeArgument::Bool(true)) => MarkerState::Forbidden,
            _ => MarkerState::Included,
        },
    }
}
