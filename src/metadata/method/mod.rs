//! Method definitions and their bodies.
//!
//! # Key Components
//!
//! - [`MethodDef`] - a method of a type: name, flags, signature, parameters, optional body
//! - [`MethodBody`] - the editable instruction arena (see [`body`])
//! - [`ExceptionHandler`] - protected regions referencing instructions by identity
//! - [`compute_max_stack`] - evaluation stack depth analysis
//!
//! Mutation of a method's code always goes through [`MethodDef::body_mut`], which rejects
//! methods that have no body (abstract, extern, runtime-implemented).

mod body;
mod exceptions;
mod stack;
mod types;

pub use body::{MethodBody, Referrer};
pub use exceptions::{ExceptionHandler, ExceptionHandlerFlags, HandlerEdge};
pub use stack::compute_max_stack;
pub use types::{MethodAccess, MethodAttributes, ParamAttributes};

use serde::{Deserialize, Serialize};

use crate::{
    metadata::{
        customattributes::CustomAttribute,
        debuginfo::MethodDebugInfo,
        module::TypeId,
        signatures::{MethodSignature, TypeSignature},
        token::Token,
    },
    Error, Result,
};

/// A formal parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamDef {
    /// Parameter name
    pub name: String,
    /// Declared type, [`TypeSignature::ByRef`] for `ref`/`out`/`in` parameters
    pub param_type: TypeSignature,
    /// `in`/`out` markers
    pub flags: ParamAttributes,
}

impl ParamDef {
    /// A by-value parameter.
    #[must_use]
    pub fn new(name: impl Into<String>, param_type: TypeSignature) -> Self {
        ParamDef {
            name: name.into(),
            param_type,
            flags: ParamAttributes::empty(),
        }
    }

    /// An `out` parameter of the given referent type.
    #[must_use]
    pub fn out(name: impl Into<String>, referent: TypeSignature) -> Self {
        ParamDef {
            name: name.into(),
            param_type: TypeSignature::by_ref(referent),
            flags: ParamAttributes::OUT,
        }
    }

    /// A `ref` parameter of the given referent type.
    #[must_use]
    pub fn by_ref(name: impl Into<String>, referent: TypeSignature) -> Self {
        ParamDef {
            name: name.into(),
            param_type: TypeSignature::by_ref(referent),
            flags: ParamAttributes::empty(),
        }
    }
}

/// A method of a type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDef {
    /// `MethodDef` token
    pub token: Token,
    /// Method name
    pub name: String,
    /// Attribute flags
    pub flags: MethodAttributes,
    /// Owning type
    pub declaring_type: TypeId,
    /// Return type
    pub return_type: TypeSignature,
    /// Formal parameters, excluding `this`
    pub params: Vec<ParamDef>,
    /// Names of the method's generic parameters
    pub generic_params: Vec<String>,
    /// The IL body, `None` for abstract or extern methods
    pub body: Option<MethodBody>,
    /// Attached custom attributes
    pub custom_attributes: Vec<CustomAttribute>,
    /// Debug information from the symbol companion, if loaded
    #[serde(skip)]
    pub debug: Option<MethodDebugInfo>,
}

impl MethodDef {
    /// Creates a method without body. Token and declaring type are assigned when the method
    /// is added to a module.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        flags: MethodAttributes,
        return_type: TypeSignature,
        params: Vec<ParamDef>,
    ) -> Self {
        MethodDef {
            token: Token::new(0),
            name: name.into(),
            flags,
            declaring_type: TypeId(0),
            return_type,
            params,
            generic_params: Vec::new(),
            body: None,
            custom_attributes: Vec::new(),
            debug: None,
        }
    }

    /// Attaches a body.
    #[must_use]
    pub fn with_body(mut self, body: MethodBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Returns true for static methods.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodAttributes::STATIC)
    }

    /// Returns true for public methods.
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.flags.access() == MethodAccess::Public
    }

    /// Returns true for instance and type constructors.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == ".ctor" || self.name == ".cctor"
    }

    /// Returns true if the method has an IL body.
    #[must_use]
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// Returns true if the method receives `this` as argument 0.
    #[must_use]
    pub fn has_this(&self) -> bool {
        !self.is_static()
    }

    /// Returns true if the method returns a value.
    #[must_use]
    pub fn returns_value(&self) -> bool {
        !self.return_type.is_void()
    }

    /// Declared parameter types in order.
    #[must_use]
    pub fn param_types(&self) -> Vec<TypeSignature> {
        self.params
            .iter()
            .map(|param| param.param_type.clone())
            .collect()
    }

    /// The method's signature.
    #[must_use]
    pub fn signature(&self) -> MethodSignature {
        MethodSignature::new(self.has_this(), self.return_type.clone(), self.param_types())
    }

    /// Read access to the body.
    #[must_use]
    pub fn body(&self) -> Option<&MethodBody> {
        self.body.as_ref()
    }

    /// Mutable access to the body.
    ///
    /// # Errors
    /// Returns [`Error::NoBody`] if the method has no body.
    pub fn body_mut(&mut self) -> Result<&mut MethodBody> {
        let token = self.token;
        self.body.as_mut().ok_or(Error::NoBody(token))
    }
}
