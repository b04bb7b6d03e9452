//! Type, method and member reference signatures.
//!
//! These types describe every type that can appear in a method signature, a local slot, a
//! field or an instruction operand. References to named types carry the canonical type id
//! (see [`crate::metadata::identity`]) together with an optional resolution scope naming
//! the assembly that defines the type, so a signature can be resolved through a
//! [`crate::project::Session`] without holding references into another module.
//!
//! Generic parameters are positional: [`TypeSignature::GenericParamType`] indexes the
//! declaring type's parameters (`!0`), [`TypeSignature::GenericParamMethod`] the method's
//! (`!!0`). Member references on generic instances keep their declared signature in terms
//! of these positions, exactly like a `MemberRef` on a `TypeSpec`.

use serde::{Deserialize, Serialize};

/// A reference to a named type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeRef {
    /// Assembly defining the type; `None` for the module holding the signature.
    pub scope: Option<String>,
    /// Canonical type id, e.g. `Game.Player+State` or ``System.Collections.Generic.List`1``.
    pub id: String,
}

impl TypeRef {
    /// A type defined in the module that holds the signature.
    #[must_use]
    pub fn local(id: impl Into<String>) -> Self {
        TypeRef {
            scope: None,
            id: id.into(),
        }
    }

    /// A type defined in the assembly `scope`.
    #[must_use]
    pub fn external(scope: impl Into<String>, id: impl Into<String>) -> Self {
        TypeRef {
            scope: Some(scope.into()),
            id: id.into(),
        }
    }
}

/// The shape of a type as it appears in a signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeSignature {
    /// `void`
    Void,
    /// `bool`
    Boolean,
    /// `char`
    Char,
    /// `sbyte`
    I1,
    /// `byte`
    U1,
    /// `short`
    I2,
    /// `ushort`
    U2,
    /// `int`
    I4,
    /// `uint`
    U4,
    /// `long`
    I8,
    /// `ulong`
    U8,
    /// `float`
    R4,
    /// `double`
    R8,
    /// `nint`
    I,
    /// `nuint`
    U,
    /// `string`
    String,
    /// `object`
    Object,
    /// A reference type.
    Class(TypeRef),
    /// A value type.
    ValueType(TypeRef),
    /// A generic type instantiated with arguments.
    GenericInst(Box<TypeSignature>, Vec<TypeSignature>),
    /// Generic parameter of the declaring type (`!n`).
    GenericParamType(u32),
    /// Generic parameter of the method (`!!n`).
    GenericParamMethod(u32),
    /// Managed pointer (`T&`).
    ByRef(Box<TypeSignature>),
    /// Unmanaged pointer (`T*`).
    Ptr(Box<TypeSignature>),
    /// Single-dimensional zero-based array (`T[]`).
    SzArray(Box<TypeSignature>),
    /// Multi-dimensional array with the given rank.
    Array(Box<TypeSignature>, u32),
}

impl TypeSignature {
    /// Shorthand for a by-reference wrapper.
    #[must_use]
    pub fn by_ref(inner: TypeSignature) -> Self {
        TypeSignature::ByRef(Box::new(inner))
    }

    /// Shorthand for a generic instantiation.
    #[must_use]
    pub fn generic(definition: TypeSignature, args: Vec<TypeSignature>) -> Self {
        TypeSignature::GenericInst(Box::new(definition), args)
    }

    /// Returns true for `void`.
    #[must_use]
    pub fn is_void(&self) -> bool {
        matches!(self, TypeSignature::Void)
    }

    /// Returns true for managed pointers.
    #[must_use]
    pub fn is_by_ref(&self) -> bool {
        matches!(self, TypeSignature::ByRef(_))
    }

    /// Returns the referent of a by-reference type, or `self` otherwise.
    #[must_use]
    pub fn element(&self) -> &TypeSignature {
        match self {
            TypeSignature::ByRef(inner) => inner,
            other => other,
        }
    }

    /// Returns true if values of this type are stored inline.
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        match self {
            TypeSignature::Boolean
            | TypeSignature::Char
            | TypeSignature::I1
            | TypeSignature::U1
            | TypeSignature::I2
            | TypeSignature::U2
            | TypeSignature::I4
            | TypeSignature::U4
            | TypeSignature::I8
            | TypeSignature::U8
            | TypeSignature::R4
            | TypeSignature::R8
            | TypeSignature::I
            | TypeSignature::U
            | TypeSignature::ValueType(_) => true,
            TypeSignature::GenericInst(definition, _) => definition.is_value_type(),
            _ => false,
        }
    }

    /// Returns the named type at the root of this signature, if any.
    #[must_use]
    pub fn type_ref(&self) -> Option<&TypeRef> {
        match self {
            TypeSignature::Class(reference) | TypeSignature::ValueType(reference) => {
                Some(reference)
            }
            TypeSignature::GenericInst(definition, _) => definition.type_ref(),
            _ => None,
        }
    }

    /// Generic arguments of an instantiation; empty otherwise.
    #[must_use]
    pub fn generic_args(&self) -> &[TypeSignature] {
        match self {
            TypeSignature::GenericInst(_, args) => args,
            _ => &[],
        }
    }

    /// The full name of built-in types, e.g. `System.Int32`.
    #[must_use]
    pub fn primitive_name(&self) -> Option<&'static str> {
        Some(match self {
            TypeSignature::Void => "System.Void",
            TypeSignature::Boolean => "System.Boolean",
            TypeSignature::Char => "System.Char",
            TypeSignature::I1 => "System.SByte",
            TypeSignature::U1 => "System.Byte",
            TypeSignature::I2 => "System.Int16",
            TypeSignature::U2 => "System.UInt16",
            TypeSignature::I4 => "System.Int32",
            TypeSignature::U4 => "System.UInt32",
            TypeSignature::I8 => "System.Int64",
            TypeSignature::U8 => "System.UInt64",
            TypeSignature::R4 => "System.Single",
            TypeSignature::R8 => "System.Double",
            TypeSignature::I => "System.IntPtr",
            TypeSignature::U => "System.UIntPtr",
            TypeSignature::String => "System.String",
            TypeSignature::Object => "System.Object",
            _ => return None,
        })
    }

    /// Replaces generic parameters with the supplied arguments.
    ///
    /// Parameters without a matching argument are left untouched.
    #[must_use]
    pub fn substitute(&self, type_args: &[TypeSignature], method_args: &[TypeSignature]) -> Self {
        let recurse = |inner: &TypeSignature| Box::new(inner.substitute(type_args, method_args));
        match self {
            TypeSignature::GenericParamType(index) => type_args
                .get(*index as usize)
                .cloned()
                .unwrap_or_else(|| self.clone()),
            TypeSignature::GenericParamMethod(index) => method_args
                .get(*index as usize)
                .cloned()
                .unwrap_or_else(|| self.clone()),
            TypeSignature::GenericInst(definition, args) => TypeSignature::GenericInst(
                recurse(definition),
                args.iter()
                    .map(|arg| arg.substitute(type_args, method_args))
                    .collect(),
            ),
            TypeSignature::ByRef(inner) => TypeSignature::ByRef(recurse(inner)),
            TypeSignature::Ptr(inner) => TypeSignature::Ptr(recurse(inner)),
            TypeSignature::SzArray(inner) => TypeSignature::SzArray(recurse(inner)),
            TypeSignature::Array(inner, rank) => TypeSignature::Array(recurse(inner), *rank),
            other => other.clone(),
        }
    }
}

/// A stand-alone method signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodSignature {
    /// Instance methods receive `this` as argument 0.
    pub has_this: bool,
    /// Return type, [`TypeSignature::Void`] if none.
    pub return_type: TypeSignature,
    /// Declared parameter types, excluding `this`.
    pub params: Vec<TypeSignature>,
}

impl MethodSignature {
    /// Creates a signature.
    #[must_use]
    pub fn new(has_this: bool, return_type: TypeSignature, params: Vec<TypeSignature>) -> Self {
        MethodSignature {
            has_this,
            return_type,
            params,
        }
    }

    /// Number of stack slots consumed by a call, including `this`.
    #[must_use]
    pub fn arg_count(&self) -> usize {
        self.params.len() + usize::from(self.has_this)
    }
}

/// A reference to a field, possibly on a generic instantiation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldReference {
    /// Type declaring the field.
    pub declaring: TypeSignature,
    /// Field name.
    pub name: String,
    /// Declared field type.
    pub field_type: TypeSignature,
}

/// A reference to a method, possibly on a generic instantiation and/or instantiated itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodReference {
    /// Type declaring the method.
    pub declaring: TypeSignature,
    /// Method name.
    pub name: String,
    /// Declared signature, generic parameters unresolved.
    pub signature: MethodSignature,
    /// Method instantiation arguments.
    pub generic_args: Vec<TypeSignature>,
}

impl MethodReference {
    /// Signature with declaring-type and method generic parameters substituted.
    #[must_use]
    pub fn resolved_signature(&self) -> MethodSignature {
        let type_args = self.declaring.generic_args();
        MethodSignature {
            has_this: self.signature.has_this,
            return_type: self
                .signature
                .return_type
                .substitute(type_args, &self.generic_args),
            params: self
                .signature
                .params
                .iter()
                .map(|param| param.substitute(type_args, &self.generic_args))
                .collect(),
        }
    }
}
