//! The in-memory module model.
//!
//! A [`Module`] owns every type and method definition of one assembly in two arenas,
//! addressed by [`TypeId`] and [`MethodId`] handles. Types reference their methods, nested
//! types and declaring type through these handles, never through shared pointers, so the
//! model is plain data: it can be cloned, serialized and mutated in place without any
//! reference bookkeeping.
//!
//! # Key Components
//!
//! - [`Module`] - the arenas, lookups and mutation entry points
//! - [`TypeDef`] - a type with its fields, properties, methods and nested types
//! - [`FieldDef`], [`PropertyDef`] - members addressed by name
//!
//! Lookups never fail with an error: a miss is `None` (or an empty list). Mutations mark the
//! module dirty, which tells [`crate::project::Session::close`] to write it back.
//!
//! # Examples
//!
//! ```rust
//! use dotpatch::metadata::module::{Module, TypeAttributes};
//! use dotpatch::metadata::method::{MethodAttributes, MethodDef};
//! use dotpatch::metadata::signatures::TypeSignature;
//!
//! let mut module = Module::new("Assembly-CSharp");
//! let player = module.add_type("Game", "Player", TypeAttributes::PUBLIC, None);
//! let run = module.add_method(
//!     player,
//!     MethodDef::new("Run", MethodAttributes::PUBLIC, TypeSignature::Void, vec![]),
//! );
//!
//! assert_eq!(module.find_type("Game.Player"), Some(player));
//! assert_eq!(module.find_methods(player, "Run"), vec![run]);
//! assert!(module.is_dirty());
//! ```

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::metadata::{
    customattributes::CustomAttribute,
    identity::{compose_type_id, method_signature},
    method::MethodDef,
    signatures::{TypeRef, TypeSignature},
    token::Token,
};

/// Name of the marker type added by [`Module::mark_injected`].
pub const INJECTED_MARKER: &str = "<Indicator_Injected>";

/// Canonical id of the root value type.
pub const VALUE_TYPE_ID: &str = "System.ValueType";

/// Canonical id of the root object type.
pub const OBJECT_TYPE_ID: &str = "System.Object";

/// Bitmask for visibility extraction
pub const TYPE_VISIBILITY_MASK: u32 = 0x0000_0007;

/// Handle of a type inside its module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TypeId(pub(crate) u32);

impl TypeId {
    /// Arena index.
    #[must_use]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Handle of a method inside its module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MethodId(pub(crate) u32);

impl MethodId {
    /// Arena index.
    #[must_use]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

bitflags! {
    /// Type attribute flags (§II.23.1.15)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct TypeAttributes: u32 {
        /// Visible outside the assembly
        const PUBLIC = 0x0000_0001;
        /// Nested, public
        const NESTED_PUBLIC = 0x0000_0002;
        /// Nested, private
        const NESTED_PRIVATE = 0x0000_0003;
        /// Fields are laid out sequentially
        const SEQUENTIAL_LAYOUT = 0x0000_0008;
        /// Type is an interface
        const INTERFACE = 0x0000_0020;
        /// Type is abstract
        const ABSTRACT = 0x0000_0080;
        /// Type cannot be derived from
        const SEALED = 0x0000_0100;
        /// Name is special
        const SPECIAL_NAME = 0x0000_0400;
        /// Static initializer may run before first static field access
        const BEFORE_FIELD_INIT = 0x0010_0000;
    }
}

bitflags! {
    /// Field attribute flags (§II.23.1.5)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct FieldAttributes: u16 {
        /// Accessible only by the parent type
        const PRIVATE = 0x0001;
        /// Accessible by anyone in the assembly
        const ASSEMBLY = 0x0003;
        /// Accessible by anyone
        const PUBLIC = 0x0006;
        /// Defined on type, else per instance
        const STATIC = 0x0010;
        /// Field can only be initialized
        const INIT_ONLY = 0x0020;
    }
}

/// A field of a type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// `Field` token
    pub token: Token,
    /// Field name
    pub name: String,
    /// Attribute flags
    pub flags: FieldAttributes,
    /// Declared type
    pub field_type: TypeSignature,
}

impl FieldDef {
    /// Returns true for static fields.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(FieldAttributes::STATIC)
    }
}

/// A property of a type with its accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDef {
    /// `Property` token
    pub token: Token,
    /// Property name
    pub name: String,
    /// Property type
    pub property_type: TypeSignature,
    /// `get_` accessor
    pub getter: Option<MethodId>,
    /// `set_` accessor
    pub setter: Option<MethodId>,
    /// Attached custom attributes
    pub custom_attributes: Vec<CustomAttribute>,
}

impl PropertyDef {
    /// The accessors that exist, getter first.
    #[must_use]
    pub fn accessors(&self) -> Vec<MethodId> {
        self.getter.into_iter().chain(self.setter).collect()
    }
}

/// A type definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDef {
    /// `TypeDef` token
    pub token: Token,
    /// Canonical type id
    pub id: String,
    /// Namespace, empty for nested types
    pub namespace: String,
    /// Simple name including the generic arity suffix
    pub name: String,
    /// Attribute flags
    pub flags: TypeAttributes,
    /// Base type
    pub extends: Option<TypeSignature>,
    /// Implemented interfaces
    pub interfaces: Vec<TypeSignature>,
    /// Names of the generic parameters
    pub generic_params: Vec<String>,
    /// Fields in declaration order
    pub fields: Vec<FieldDef>,
    /// Properties in declaration order
    pub properties: Vec<PropertyDef>,
    /// Methods in declaration order
    pub methods: Vec<MethodId>,
    /// Nested types in declaration order
    pub nested: Vec<TypeId>,
    /// Declaring type of a nested type
    pub declaring: Option<TypeId>,
    /// Attached custom attributes
    pub custom_attributes: Vec<CustomAttribute>,
}

impl TypeDef {
    /// Returns true for generic type definitions.
    #[must_use]
    pub fn is_generic(&self) -> bool {
        !self.generic_params.is_empty()
    }

    /// Returns true if the type derives directly from `System.ValueType`.
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        self.extends
            .as_ref()
            .and_then(TypeSignature::type_ref)
            .is_some_and(|base| base.id == VALUE_TYPE_ID)
    }

    /// Returns true for public or nested-public types.
    #[must_use]
    pub fn is_public(&self) -> bool {
        matches!(self.flags.bits() & TYPE_VISIBILITY_MASK, 0x1 | 0x2)
    }
}

/// One assembly's types and methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    /// Assembly name without extension
    pub name: String,
    /// Names of referenced assemblies
    assembly_refs: Vec<String>,
    types: Vec<TypeDef>,
    methods: Vec<MethodDef>,
    top_level: Vec<TypeId>,
    field_rows: u32,
    property_rows: u32,
    #[serde(skip)]
    dirty: bool,
}

impl Module {
    /// Creates an empty module.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Module {
            name: name.into(),
            assembly_refs: Vec::new(),
            types: Vec::new(),
            methods: Vec::new(),
            top_level: Vec::new(),
            field_rows: 0,
            property_rows: 0,
            dirty: false,
        }
    }

    /// Returns true if the module was mutated since it was loaded or last written.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Flags the module for write-back.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Referenced assembly names.
    #[must_use]
    pub fn assembly_refs(&self) -> &[String] {
        &self.assembly_refs
    }

    /// Adds an assembly reference unless it is already present.
    pub fn add_assembly_ref(&mut self, name: &str) {
        if name != self.name && !self.assembly_refs.iter().any(|existing| existing == name) {
            self.assembly_refs.push(name.to_string());
            self.dirty = true;
        }
    }

    /// A signature for a type of this module as seen from module `from`.
    #[must_use]
    pub fn type_ref_from(&self, from: &str, id: &str) -> TypeRef {
        if from == self.name {
            TypeRef::local(id)
        } else {
            TypeRef::external(self.name.clone(), id)
        }
    }

    /// Adds a top-level type.
    pub fn add_type(
        &mut self,
        namespace: &str,
        name: &str,
        flags: TypeAttributes,
        extends: Option<TypeSignature>,
    ) -> TypeId {
        let id = self.push_type(namespace, name, flags, extends, None);
        self.top_level.push(id);
        id
    }

    /// Adds a type nested in `declaring`.
    pub fn add_nested_type(
        &mut self,
        declaring: TypeId,
        name: &str,
        flags: TypeAttributes,
        extends: Option<TypeSignature>,
    ) -> TypeId {
        let id = self.push_type("", name, flags, extends, Some(declaring));
        if let Some(outer) = self.types.get_mut(declaring.index()) {
            outer.nested.push(id);
        }
        id
    }

    fn push_type(
        &mut self,
        namespace: &str,
        name: &str,
        flags: TypeAttributes,
        extends: Option<TypeSignature>,
        declaring: Option<TypeId>,
    ) -> TypeId {
        #[allow(clippy::cast_possible_truncation)]
        let id = TypeId(self.types.len() as u32);
        let outer_id = declaring
            .and_then(|outer| self.types.get(outer.index()))
            .map(|outer| outer.id.clone());
        self.types.push(TypeDef {
            token: Token::from_parts(Token::TYPE_DEF, id.0 + 1),
            id: compose_type_id(namespace, name, outer_id.as_deref()),
            namespace: namespace.to_string(),
            name: name.to_string(),
            flags,
            extends,
            interfaces: Vec::new(),
            generic_params: Vec::new(),
            fields: Vec::new(),
            properties: Vec::new(),
            methods: Vec::new(),
            nested: Vec::new(),
            declaring,
            custom_attributes: Vec::new(),
        });
        self.dirty = true;
        id
    }

    /// Adds `method` to `owner`, assigning its token and declaring type.
    pub fn add_method(&mut self, owner: TypeId, mut method: MethodDef) -> MethodId {
        #[allow(clippy::cast_possible_truncation)]
        let id = MethodId(self.methods.len() as u32);
        method.token = Token::from_parts(Token::METHOD_DEF, id.0 + 1);
        method.declaring_type = owner;
        self.methods.push(method);
        if let Some(ty) = self.types.get_mut(owner.index()) {
            ty.methods.push(id);
        }
        self.dirty = true;
        id
    }

    /// Adds a field to `owner` and returns its index in the type's field list.
    pub fn add_field(
        &mut self,
        owner: TypeId,
        name: &str,
        flags: FieldAttributes,
        field_type: TypeSignature,
    ) -> Option<usize> {
        self.field_rows += 1;
        let token = Token::from_parts(Token::FIELD, self.field_rows);
        let ty = self.types.get_mut(owner.index())?;
        ty.fields.push(FieldDef {
            token,
            name: name.to_string(),
            flags,
            field_type,
        });
        self.dirty = true;
        Some(ty.fields.len() - 1)
    }

    /// Adds a property to `owner` and returns its index in the type's property list.
    pub fn add_property(
        &mut self,
        owner: TypeId,
        name: &str,
        property_type: TypeSignature,
        getter: Option<MethodId>,
        setter: Option<MethodId>,
    ) -> Option<usize> {
        self.property_rows += 1;
        let token = Token::from_parts(Token::PROPERTY, self.property_rows);
        let ty = self.types.get_mut(owner.index())?;
        ty.properties.push(PropertyDef {
            token,
            name: name.to_string(),
            property_type,
            getter,
            setter,
            custom_attributes: Vec::new(),
        });
        self.dirty = true;
        Some(ty.properties.len() - 1)
    }

    /// A type by handle.
    #[must_use]
    pub fn type_def(&self, id: TypeId) -> Option<&TypeDef> {
        self.types.get(id.index())
    }

    /// A type by handle, mutable.
    pub fn type_def_mut(&mut self, id: TypeId) -> Option<&mut TypeDef> {
        self.types.get_mut(id.index())
    }

    /// A method by handle.
    #[must_use]
    pub fn method(&self, id: MethodId) -> Option<&MethodDef> {
        self.methods.get(id.index())
    }

    /// A method by handle, mutable.
    pub fn method_mut(&mut self, id: MethodId) -> Option<&mut MethodDef> {
        self.methods.get_mut(id.index())
    }

    /// Top-level types in declaration order.
    #[must_use]
    pub fn top_level_types(&self) -> &[TypeId] {
        &self.top_level
    }

    /// Every type, nested ones included.
    #[allow(clippy::cast_possible_truncation)]
    pub fn types(&self) -> impl Iterator<Item = (TypeId, &TypeDef)> + '_ {
        self.types
            .iter()
            .enumerate()
            .map(|(index, ty)| (TypeId(index as u32), ty))
    }

    /// Every method of every type.
    #[allow(clippy::cast_possible_truncation)]
    pub fn methods(&self) -> impl Iterator<Item = (MethodId, &MethodDef)> + '_ {
        self.methods
            .iter()
            .enumerate()
            .map(|(index, method)| (MethodId(index as u32), method))
    }

    /// Methods declared by `owner`.
    #[must_use]
    pub fn methods_of(&self, owner: TypeId) -> &[MethodId] {
        self.type_def(owner).map_or(&[], |ty| ty.methods.as_slice())
    }

    /// Finds a type by canonical id, searching nested types recursively.
    #[must_use]
    pub fn find_type(&self, id: &str) -> Option<TypeId> {
        fn search(module: &Module, candidates: &[TypeId], id: &str) -> Option<TypeId> {
            for candidate in candidates {
                let ty = module.type_def(*candidate)?;
                if ty.id == id {
                    return Some(*candidate);
                }
                if id.starts_with(ty.id.as_str()) {
                    if let Some(found) = search(module, &ty.nested, id) {
                        return Some(found);
                    }
                }
            }
            None
        }
        search(self, &self.top_level, id)
    }

    /// Finds a nested type of `outer` by simple name.
    #[must_use]
    pub fn find_nested_type(&self, outer: TypeId, name: &str) -> Option<TypeId> {
        self.type_def(outer)?
            .nested
            .iter()
            .copied()
            .find(|nested| self.type_def(*nested).is_some_and(|ty| ty.name == name))
    }

    /// Methods of `owner` called `name`.
    #[must_use]
    pub fn find_methods(&self, owner: TypeId, name: &str) -> Vec<MethodId> {
        self.methods_of(owner)
            .iter()
            .copied()
            .filter(|id| self.method(*id).is_some_and(|method| method.name == name))
            .collect()
    }

    /// The first method of `owner` called `name` taking `count` parameters.
    #[must_use]
    pub fn find_method_with_param_count(
        &self,
        owner: TypeId,
        name: &str,
        count: usize,
    ) -> Option<MethodId> {
        self.find_methods(owner, name)
            .into_iter()
            .find(|id| self.method(*id).is_some_and(|method| method.params.len() == count))
    }

    /// The method of `owner` called `name` with exactly these parameter types.
    #[must_use]
    pub fn find_method_exact(
        &self,
        owner: TypeId,
        name: &str,
        params: &[TypeSignature],
    ) -> Option<MethodId> {
        self.find_methods(owner, name).into_iter().find(|id| {
            self.method(*id).is_some_and(|method| {
                method.params.len() == params.len()
                    && method
                        .params
                        .iter()
                        .zip(params)
                        .all(|(param, expected)| param.param_type == *expected)
            })
        })
    }

    /// The method of `owner` whose canonical signature equals `signature`.
    #[must_use]
    pub fn find_method_by_signature(&self, owner: TypeId, signature: &str) -> Option<MethodId> {
        let type_params = &self.type_def(owner)?.generic_params;
        self.methods_of(owner).iter().copied().find(|id| {
            self.method(*id)
                .is_some_and(|method| method_signature(method, type_params) == signature)
        })
    }

    /// Canonical signature of a method.
    #[must_use]
    pub fn method_signature(&self, id: MethodId) -> Option<String> {
        let method = self.method(id)?;
        let owner = self.type_def(method.declaring_type)?;
        Some(method_signature(method, &owner.generic_params))
    }

    /// A field of `owner` by name.
    #[must_use]
    pub fn find_field(&self, owner: TypeId, name: &str) -> Option<&FieldDef> {
        self.type_def(owner)?
            .fields
            .iter()
            .find(|field| field.name == name)
    }

    /// A property of `owner` by name.
    #[must_use]
    pub fn find_property(&self, owner: TypeId, name: &str) -> Option<&PropertyDef> {
        self.type_def(owner)?
            .properties
            .iter()
            .find(|property| property.name == name)
    }

    /// The type of `this` inside `owner`'s methods, as seen from module `from`.
    ///
    /// Generic types are instantiated over their own parameters (`Foo<!0,!1>`).
    #[must_use]
    pub fn self_signature(&self, owner: TypeId, from: &str) -> Option<TypeSignature> {
        let ty = self.type_def(owner)?;
        let reference = self.type_ref_from(from, &ty.id);
        let named = if ty.is_value_type() {
            TypeSignature::ValueType(reference)
        } else {
            TypeSignature::Class(reference)
        };
        if !ty.is_generic() {
            return Some(named);
        }
        #[allow(clippy::cast_possible_truncation)]
        let args = (0..ty.generic_params.len())
            .map(|index| TypeSignature::GenericParamType(index as u32))
            .collect();
        Some(TypeSignature::generic(named, args))
    }

    /// Adds the injection marker type, once.
    pub fn mark_injected(&mut self) {
        if self.is_injected() {
            return;
        }
        self.add_type(
            "",
            INJECTED_MARKER,
            TypeAttributes::PUBLIC | TypeAttributes::SEALED | TypeAttributes::BEFORE_FIELD_INIT,
            Some(TypeSignature::Class(TypeRef::external(
                "mscorlib",
                OBJECT_TYPE_ID,
            ))),
        );
    }

    /// Returns true if the injection marker type is present.
    #[must_use]
    pub fn is_injected(&self) -> bool {
        self.find_type(INJECTED_MARKER).is_some()
    }

    /// Rebuilds the instruction referrer index of every body.
    pub(crate) fn reindex_bodies(&mut self) {
        for method in &mut self.methods {
            if let Some(body) = method.body.as_mut() {
                body.reindex();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::method::{MethodAttributes, ParamDef};

    fn sample() -> (Module, TypeId, TypeId) {
        let mut module = Module::new("Game");
        let outer = module.add_type("Game.World", "Map`1", TypeAttributes::PUBLIC, None);
        module
            .type_def_mut(outer)
            .unwrap()
            .generic_params
            .push("T".into());
        let inner = module.add_nested_type(outer, "Cell", TypeAttributes::NESTED_PUBLIC, None);
        (module, outer, inner)
    }

    #[test]
    fn nested_lookup() {
        let (module, outer, inner) = sample();
        assert_eq!(module.type_def(inner).unwrap().id, "Game.World.Map`1+Cell");
        assert_eq!(module.find_type("Game.World.Map`1+Cell"), Some(inner));
        assert_eq!(module.find_type("Game.World.Map`1"), Some(outer));
        assert_eq!(module.find_nested_type(outer, "Cell"), Some(inner));
        assert_eq!(module.find_type("Game.World.Map`1+Missing"), None);
        assert_eq!(module.find_type("Cell"), None);
    }

    #[test]
    fn method_lookups() {
        let (mut module, outer, _) = sample();
        let by_int = module.add_method(
            outer,
            MethodDef::new(
                "Get",
                MethodAttributes::PUBLIC,
                TypeSignature::GenericParamType(0),
                vec![ParamDef::new("x", TypeSignature::I4)],
            ),
        );
        let by_name = module.add_method(
            outer,
            MethodDef::new(
                "Get",
                MethodAttributes::PUBLIC,
                TypeSignature::GenericParamType(0),
                vec![ParamDef::new("name", TypeSignature::String)],
            ),
        );
        let pair = module.add_method(
            outer,
            MethodDef::new(
                "Get",
                MethodAttributes::PRIVATE,
                TypeSignature::Void,
                vec![
                    ParamDef::new("x", TypeSignature::I4),
                    ParamDef::out("value", TypeSignature::GenericParamType(0)),
                ],
            ),
        );

        assert_eq!(module.find_methods(outer, "Get").len(), 3);
        assert_eq!(module.find_method_with_param_count(outer, "Get", 1), Some(by_int));
        assert_eq!(module.find_method_with_param_count(outer, "Get", 2), Some(pair));
        assert_eq!(
            module.find_method_exact(outer, "Get", &[TypeSignature::String]),
            Some(by_name)
        );
        assert_eq!(module.find_method_exact(outer, "Get", &[TypeSignature::R8]), None);
        assert_eq!(
            module.find_method_by_signature(outer, "Get(System.Int32,T&)"),
            Some(pair)
        );
        assert_eq!(module.method(pair).unwrap().token.row(), 3);
        assert_eq!(module.method_signature(by_name).unwrap(), "Get(System.String)");
    }

    #[test]
    fn members_and_self_signature() {
        let (mut module, outer, inner) = sample();
        module.add_field(outer, "cells", FieldAttributes::PRIVATE, TypeSignature::I4);
        module.add_property(outer, "Size", TypeSignature::I4, None, None);
        assert!(module.find_field(outer, "cells").is_some());
        assert!(module.find_property(outer, "Size").is_some());
        assert!(module.find_field(outer, "missing").is_none());

        let this = module.self_signature(outer, "Game").unwrap();
        assert_eq!(
            this,
            TypeSignature::generic(
                TypeSignature::Class(TypeRef::local("Game.World.Map`1")),
                vec![TypeSignature::GenericParamType(0)]
            )
        );
        assert_eq!(
            module.self_signature(inner, "Other").unwrap(),
            TypeSignature::Class(TypeRef::external("Game", "Game.World.Map`1+Cell"))
        );
    }

    #[test]
    fn injection_marker_is_added_once() {
        let mut module = Module::new("Game");
        assert!(!module.is_injected());
        module.mark_injected();
        module.mark_injected();
        assert!(module.is_injected());
        assert_eq!(module.top_level_types().len(), 1);
        assert!(module.is_dirty());
    }
}
