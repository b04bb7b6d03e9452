//! Argument-pack synthesis.
//!
//! The dispatch hook receives every marshalled value through a single typed carrier: a
//! generic value type `ArgPack<T0, .., TN-1>` holding the values in fields `t0 .. tN-1`. One
//! pack definition exists per arity; it is generated into the runtime assembly the first time
//! a call site needs it and reused afterwards.
//!
//! A synthesized pack of arity `N` contains:
//!
//! | Member | Purpose |
//! |--------|---------|
//! | `t0 .. tN-1` | the values |
//! | `.ctor(T0, .., TN-1)` | positional construction |
//! | `Deconstruct(out T0, ..)` | positional extraction |
//! | `GetFromChannel(IntPtr)` / `PushToChannel(IntPtr)` | per-element channel marshalling |
//! | `Length` | element count |
//! | `Item[int]` | boxed element access through a static accessor table |
//! | `GetType(int)` | element type by index |
//! | `.cctor` | builds the accessor table and the element type array |
//! | nested `<>indexer` | typed static getter/setter per element, referenced by the table |
//!
//! The arity-0 pack is named after the base name alone and has no generic parameters.

use std::collections::HashMap;

use tracing::info;

use crate::{
    assembly::{Emitter, OpCode, Operand},
    hotfix::HotfixConfig,
    metadata::{
        customattributes::{CustomAttribute, CustomAttributeArgument},
        method::{compute_max_stack, MethodAttributes, MethodBody, MethodDef, ParamDef},
        module::{FieldAttributes, Module, TypeAttributes, TypeId, OBJECT_TYPE_ID, VALUE_TYPE_ID},
        signatures::{FieldReference, MethodReference, MethodSignature, TypeRef, TypeSignature},
    },
    Result,
};

/// Assembly defining the framework base types.
pub const CORE_LIBRARY: &str = "mscorlib";

const INDEXER_NAME: &str = "<>indexer";
const ACCESSORS_FIELD: &str = "_IndexAccessors";
const ELEMENT_TYPES_FIELD: &str = "ElementTypes";
const PULL_METHOD: &str = "GetFromChannel";
const PUSH_METHOD: &str = "PushToChannel";

fn core_type(id: &str) -> TypeSignature {
    TypeSignature::Class(TypeRef::external(CORE_LIBRARY, id))
}

#[allow(clippy::cast_possible_truncation)]
fn type_params(arity: usize) -> Vec<TypeSignature> {
    (0..arity)
        .map(|index| TypeSignature::GenericParamType(index as u32))
        .collect()
}

fn instantiate(definition: TypeSignature, args: Vec<TypeSignature>) -> TypeSignature {
    if args.is_empty() {
        definition
    } else {
        TypeSignature::generic(definition, args)
    }
}

/// The pack instantiation for the given element types, as seen from module `from`.
#[must_use]
pub fn pack_instance(
    runtime: &Module,
    config: &HotfixConfig,
    from: &str,
    elements: Vec<TypeSignature>,
) -> TypeSignature {
    let reference = runtime.type_ref_from(from, &config.pack_type_id(elements.len()));
    instantiate(TypeSignature::ValueType(reference), elements)
}

/// Field `t{index}` of a pack instantiation.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn pack_field(pack: &TypeSignature, index: usize) -> FieldReference {
    FieldReference {
        declaring: pack.clone(),
        name: format!("t{}", index),
        field_type: TypeSignature::GenericParamType(index as u32),
    }
}

/// The positional constructor of a pack instantiation.
#[must_use]
pub fn pack_constructor(pack: &TypeSignature) -> MethodReference {
    MethodReference {
        declaring: pack.clone(),
        name: ".ctor".to_string(),
        signature: MethodSignature::new(
            true,
            TypeSignature::Void,
            type_params(pack.generic_args().len()),
        ),
        generic_args: Vec::new(),
    }
}

/// Lazily synthesizes argument packs, one definition per module and arity.
#[derive(Debug, Default)]
pub struct PackSynthesizer {
    cache: HashMap<(String, usize), TypeId>,
}

impl PackSynthesizer {
    /// Creates a synthesizer with an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the pack definition of `arity` in `module`, synthesizing it on first request.
    ///
    /// A pack already present in the module (from an earlier run) is reused.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a synthesized body fails stack analysis.
    pub fn ensure(
        &mut self,
        module: &mut Module,
        config: &HotfixConfig,
        arity: usize,
    ) -> Result<TypeId> {
        let key = (module.name.clone(), arity);
        if let Some(ty) = self.cache.get(&key) {
            return Ok(*ty);
        }

        let ty = match module.find_type(&config.pack_type_id(arity)) {
            Some(existing) => existing,
            None => {
                let ty = PackBuilder::new(module, config, arity).build()?;
                module.mark_dirty();
                info!(module = %module.name, arity, "argument pack synthesized");
                ty
            }
        };
        self.cache.insert(key, ty);
        Ok(ty)
    }

    /// Number of cached definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

struct PackBuilder<'a> {
    module: &'a mut Module,
    config: &'a HotfixConfig,
    arity: usize,
    pack_id: String,
    indexer_id: String,
    self_type: TypeSignature,
}

impl<'a> PackBuilder<'a> {
    fn new(module: &'a mut Module, config: &'a HotfixConfig, arity: usize) -> Self {
        let pack_id = config.pack_type_id(arity);
        let indexer_id = format!("{}+{}", pack_id, INDEXER_NAME);
        let self_type = instantiate(
            TypeSignature::ValueType(TypeRef::local(pack_id.clone())),
            type_params(arity),
        );
        PackBuilder {
            module,
            config,
            arity,
            pack_id,
            indexer_id,
            self_type,
        }
    }

    fn local(&self, id: &str) -> TypeSignature {
        TypeSignature::Class(TypeRef::local(id))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn param(index: usize) -> TypeSignature {
        TypeSignature::GenericParamType(index as u32)
    }

    fn accessor_list(&self) -> TypeSignature {
        TypeSignature::generic(
            self.local(&self.config.accessor_list_type),
            vec![self.self_type.clone()],
        )
    }

    fn element_types(&self) -> TypeSignature {
        TypeSignature::SzArray(Box::new(core_type("System.Type")))
    }

    fn static_field(&self, name: &str, field_type: TypeSignature) -> FieldReference {
        FieldReference {
            declaring: self.self_type.clone(),
            name: name.to_string(),
            field_type,
        }
    }

    fn accessor_delegate(&self, name: &str) -> TypeSignature {
        let id = format!("{}+{}", self.config.accessor_type, name);
        TypeSignature::generic(self.local(&id), vec![self.self_type.clone()])
    }

    fn indexer_method(
        &self,
        name: String,
        return_type: TypeSignature,
        with_value: bool,
    ) -> MethodReference {
        let mut params = vec![TypeSignature::by_ref(self.self_type.clone())];
        if with_value {
            params.push(TypeSignature::Object);
        }
        MethodReference {
            declaring: instantiate(self.local(&self.indexer_id), type_params(self.arity)),
            name,
            signature: MethodSignature::new(false, return_type, params),
            generic_args: Vec::new(),
        }
    }

    fn add(&mut self, owner: TypeId, method: MethodDef, body: MethodBody) -> Result<()> {
        let mut body = body;
        body.max_stack = compute_max_stack(&body, method.returns_value())?;
        self.module.add_method(owner, method.with_body(body));
        Ok(())
    }

    fn build(mut self) -> Result<TypeId> {
        let name = self.config.pack_name(self.arity);
        let ty = self.module.add_type(
            &self.config.pack_namespace,
            &name,
            TypeAttributes::PUBLIC
                | TypeAttributes::SEQUENTIAL_LAYOUT
                | TypeAttributes::SEALED
                | TypeAttributes::BEFORE_FIELD_INIT,
            Some(core_type(VALUE_TYPE_ID)),
        );
        let interface = self.local(&self.config.pack_interface);
        if let Some(def) = self.module.type_def_mut(ty) {
            def.interfaces.push(interface);
            def.generic_params = (0..self.arity).map(|index| format!("T{}", index)).collect();
            let mut default_member =
                CustomAttribute::new("System.Reflection.DefaultMemberAttribute");
            default_member
                .fixed_args
                .push(CustomAttributeArgument::String(Some("Item".to_string())));
            def.custom_attributes.push(default_member);
        }

        for index in 0..self.arity {
            self.module.add_field(
                ty,
                &format!("t{}", index),
                FieldAttributes::PUBLIC,
                Self::param(index),
            );
        }
        let accessors = self.accessor_list();
        let element_types = self.element_types();
        let private_static = FieldAttributes::PRIVATE | FieldAttributes::STATIC;
        self.module.add_field(ty, ACCESSORS_FIELD, private_static, accessors);
        self.module.add_field(ty, ELEMENT_TYPES_FIELD, private_static, element_types);

        self.build_indexer(ty)?;
        self.build_type_initializer(ty)?;
        self.build_constructor(ty)?;
        self.build_deconstruct(ty)?;
        self.build_channel_methods(ty)?;
        self.build_length(ty)?;
        self.build_item(ty)?;
        self.build_get_type(ty)?;
        Ok(ty)
    }

    fn build_indexer(&mut self, ty: TypeId) -> Result<()> {
        let indexer = self.module.add_nested_type(
            ty,
            INDEXER_NAME,
            TypeAttributes::NESTED_PRIVATE
                | TypeAttributes::SEALED
                | TypeAttributes::ABSTRACT
                | TypeAttributes::BEFORE_FIELD_INIT,
            Some(core_type(OBJECT_TYPE_ID)),
        );
        if let Some(def) = self.module.type_def_mut(indexer) {
            def.generic_params = (0..self.arity).map(|index| format!("T{}", index)).collect();
        }

        let flags =
            MethodAttributes::STATIC | MethodAttributes::ASSEM | MethodAttributes::HIDE_BY_SIG;
        let thiz = TypeSignature::by_ref(self.self_type.clone());
        for index in 0..self.arity {
            let field = pack_field(&self.self_type, index);

            let mut body = MethodBody::new();
            let mut emit = Emitter::append(&mut body);
            emit.ldarg(0)?;
            emit.ldfld(field.clone())?;
            emit.op_with(OpCode::Box, Operand::Type(Self::param(index)))?;
            emit.op(OpCode::Ret)?;
            let getter = MethodDef::new(
                format!("getter{}", index),
                flags,
                TypeSignature::Object,
                vec![ParamDef::new("thiz", thiz.clone())],
            );
            self.add(indexer, getter, body)?;

            let mut body = MethodBody::new();
            let mut emit = Emitter::append(&mut body);
            emit.ldarg(0)?;
            emit.ldarg(1)?;
            emit.op_with(OpCode::UnboxAny, Operand::Type(Self::param(index)))?;
            emit.stfld(field)?;
            emit.op(OpCode::Ret)?;
            let setter = MethodDef::new(
                format!("setter{}", index),
                flags,
                TypeSignature::Void,
                vec![
                    ParamDef::new("thiz", thiz.clone()),
                    ParamDef::new("val", TypeSignature::Object),
                ],
            );
            self.add(indexer, setter, body)?;
        }
        Ok(())
    }

    fn build_type_initializer(&mut self, ty: TypeId) -> Result<()> {
        let accessors = self.accessor_list();
        let delegate_ctor = |declaring: TypeSignature| MethodReference {
            declaring,
            name: ".ctor".to_string(),
            signature: MethodSignature::new(
                true,
                TypeSignature::Void,
                vec![TypeSignature::Object, TypeSignature::I],
            ),
            generic_args: Vec::new(),
        };
        let getter_ctor = delegate_ctor(self.accessor_delegate("DelGetter"));
        let setter_ctor = delegate_ctor(self.accessor_delegate("DelSetter"));
        let list_param = |name: &str| {
            TypeSignature::generic(
                self.local(&format!("{}+{}", self.config.accessor_type, name)),
                vec![TypeSignature::GenericParamType(0)],
            )
        };
        let add = MethodReference {
            declaring: accessors.clone(),
            name: "Add".to_string(),
            signature: MethodSignature::new(
                true,
                TypeSignature::Void,
                vec![list_param("DelGetter"), list_param("DelSetter")],
            ),
            generic_args: Vec::new(),
        };
        let list_ctor = MethodReference {
            declaring: accessors.clone(),
            name: ".ctor".to_string(),
            signature: MethodSignature::new(true, TypeSignature::Void, Vec::new()),
            generic_args: Vec::new(),
        };
        let type_class = core_type("System.Type");
        let from_handle = MethodReference {
            declaring: type_class.clone(),
            name: "GetTypeFromHandle".to_string(),
            signature: MethodSignature::new(
                false,
                type_class.clone(),
                vec![TypeSignature::ValueType(TypeRef::external(
                    CORE_LIBRARY,
                    "System.RuntimeTypeHandle",
                ))],
            ),
            generic_args: Vec::new(),
        };

        let mut body = MethodBody::new();
        let mut emit = Emitter::append(&mut body);
        emit.op_with(OpCode::Newobj, Operand::Method(list_ctor))?;
        for index in 0..self.arity {
            emit.op(OpCode::Dup)?;
            emit.op(OpCode::Ldnull)?;
            emit.op_with(
                OpCode::Ldftn,
                Operand::Method(self.indexer_method(
                    format!("getter{}", index),
                    TypeSignature::Object,
                    false,
                )),
            )?;
            emit.op_with(OpCode::Newobj, Operand::Method(getter_ctor.clone()))?;
            emit.op(OpCode::Ldnull)?;
            emit.op_with(
                OpCode::Ldftn,
                Operand::Method(self.indexer_method(
                    format!("setter{}", index),
                    TypeSignature::Void,
                    true,
                )),
            )?;
            emit.op_with(OpCode::Newobj, Operand::Method(setter_ctor.clone()))?;
            emit.op_with(OpCode::Callvirt, Operand::Method(add.clone()))?;
        }
        emit.op_with(
            OpCode::Stsfld,
            Operand::Field(self.static_field(ACCESSORS_FIELD, accessors)),
        )?;

        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        emit.ldc_i4(self.arity as i32)?;
        emit.op_with(OpCode::Newarr, Operand::Type(type_class))?;
        for index in 0..self.arity {
            emit.op(OpCode::Dup)?;
            #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            emit.ldc_i4(index as i32)?;
            emit.op_with(OpCode::Ldtoken, Operand::Type(Self::param(index)))?;
            emit.call(from_handle.clone())?;
            emit.op(OpCode::StelemRef)?;
        }
        emit.op_with(
            OpCode::Stsfld,
            Operand::Field(self.static_field(ELEMENT_TYPES_FIELD, self.element_types())),
        )?;
        emit.op(OpCode::Ret)?;

        let cctor = MethodDef::new(
            ".cctor",
            MethodAttributes::PRIVATE
                | MethodAttributes::HIDE_BY_SIG
                | MethodAttributes::SPECIAL_NAME
                | MethodAttributes::RTSPECIAL_NAME
                | MethodAttributes::STATIC,
            TypeSignature::Void,
            Vec::new(),
        );
        self.add(ty, cctor, body)
    }

    fn build_constructor(&mut self, ty: TypeId) -> Result<()> {
        let mut body = MethodBody::new();
        let mut emit = Emitter::append(&mut body);
        for index in 0..self.arity {
            emit.ldarg(0)?;
            #[allow(clippy::cast_possible_truncation)]
            emit.ldarg(index as u16 + 1)?;
            emit.stfld(pack_field(&self.self_type, index))?;
        }
        emit.op(OpCode::Ret)?;

        let ctor = MethodDef::new(
            ".ctor",
            MethodAttributes::PUBLIC
                | MethodAttributes::HIDE_BY_SIG
                | MethodAttributes::SPECIAL_NAME
                | MethodAttributes::RTSPECIAL_NAME,
            TypeSignature::Void,
            (0..self.arity)
                .map(|index| ParamDef::new(format!("p{}", index), Self::param(index)))
                .collect(),
        );
        self.add(ty, ctor, body)
    }

    fn build_deconstruct(&mut self, ty: TypeId) -> Result<()> {
        let mut body = MethodBody::new();
        let mut emit = Emitter::append(&mut body);
        for index in 0..self.arity {
            #[allow(clippy::cast_possible_truncation)]
            emit.ldarg(index as u16 + 1)?;
            emit.ldarg(0)?;
            emit.ldfld(pack_field(&self.self_type, index))?;
            emit.stobj(Self::param(index))?;
        }
        emit.op(OpCode::Ret)?;

        let deconstruct = MethodDef::new(
            "Deconstruct",
            MethodAttributes::PUBLIC | MethodAttributes::HIDE_BY_SIG,
            TypeSignature::Void,
            (0..self.arity)
                .map(|index| ParamDef::out(format!("o{}", index), Self::param(index)))
                .collect(),
        );
        self.add(ty, deconstruct, body)
    }

    fn channel_method(
        &self,
        name: &str,
        params: Vec<TypeSignature>,
        element: TypeSignature,
    ) -> MethodReference {
        MethodReference {
            declaring: self.local(&self.config.channel_type),
            name: name.to_string(),
            signature: MethodSignature::new(false, TypeSignature::Void, params),
            generic_args: vec![element],
        }
    }

    fn build_channel_methods(&mut self, ty: TypeId) -> Result<()> {
        let flags = MethodAttributes::PUBLIC
            | MethodAttributes::HIDE_BY_SIG
            | MethodAttributes::NEW_SLOT
            | MethodAttributes::VIRTUAL
            | MethodAttributes::FINAL;

        // Elements come off the channel top first, so the last field is filled first.
        let mut body = MethodBody::new();
        let mut emit = Emitter::append(&mut body);
        for index in 0..self.arity {
            let field = self.arity - 1 - index;
            emit.ldarg(1)?;
            #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            emit.ldc_i4(-1 - index as i32)?;
            emit.ldarg(0)?;
            emit.op_with(OpCode::Ldflda, Operand::Field(pack_field(&self.self_type, field)))?;
            emit.call(self.channel_method(
                &self.config.channel_pull,
                vec![
                    TypeSignature::I,
                    TypeSignature::I4,
                    TypeSignature::by_ref(TypeSignature::GenericParamMethod(0)),
                ],
                Self::param(field),
            ))?;
        }
        emit.op(OpCode::Ret)?;
        let pull = MethodDef::new(
            PULL_METHOD,
            flags,
            TypeSignature::Void,
            vec![ParamDef::new("l", TypeSignature::I)],
        );
        self.add(ty, pull, body)?;

        let mut body = MethodBody::new();
        let mut emit = Emitter::append(&mut body);
        for index in 0..self.arity {
            emit.ldarg(1)?;
            emit.ldarg(0)?;
            emit.ldfld(pack_field(&self.self_type, index))?;
            emit.call(self.channel_method(
                &self.config.channel_push,
                vec![TypeSignature::I, TypeSignature::GenericParamMethod(0)],
                Self::param(index),
            ))?;
        }
        emit.op(OpCode::Ret)?;
        let push = MethodDef::new(
            PUSH_METHOD,
            flags,
            TypeSignature::Void,
            vec![ParamDef::new("l", TypeSignature::I)],
        );
        self.add(ty, push, body)
    }

    fn accessor_flags() -> MethodAttributes {
        MethodAttributes::PUBLIC
            | MethodAttributes::HIDE_BY_SIG
            | MethodAttributes::SPECIAL_NAME
            | MethodAttributes::NEW_SLOT
            | MethodAttributes::VIRTUAL
            | MethodAttributes::FINAL
    }

    fn build_length(&mut self, ty: TypeId) -> Result<()> {
        let mut body = MethodBody::new();
        let mut emit = Emitter::append(&mut body);
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        emit.ldc_i4(self.arity as i32)?;
        emit.op(OpCode::Ret)?;

        let getter = MethodDef::new(
            "get_Length",
            Self::accessor_flags(),
            TypeSignature::I4,
            Vec::new(),
        );
        let mut getter_body = body;
        getter_body.max_stack = compute_max_stack(&getter_body, true)?;
        let getter = self.module.add_method(ty, getter.with_body(getter_body));
        self.module.add_property(ty, "Length", TypeSignature::I4, Some(getter), None);
        Ok(())
    }

    fn build_item(&mut self, ty: TypeId) -> Result<()> {
        let accessors = self.accessor_list();
        let table = self.static_field(ACCESSORS_FIELD, accessors.clone());
        let thiz = TypeSignature::by_ref(TypeSignature::GenericParamType(0));

        let mut body = MethodBody::new();
        let mut emit = Emitter::append(&mut body);
        emit.op_with(OpCode::Ldsfld, Operand::Field(table.clone()))?;
        emit.ldarg(0)?;
        emit.ldarg(1)?;
        emit.op_with(
            OpCode::Callvirt,
            Operand::Method(MethodReference {
                declaring: accessors.clone(),
                name: "GetItem".to_string(),
                signature: MethodSignature::new(
                    true,
                    TypeSignature::Object,
                    vec![thiz.clone(), TypeSignature::I4],
                ),
                generic_args: Vec::new(),
            }),
        )?;
        emit.op(OpCode::Ret)?;
        body.max_stack = compute_max_stack(&body, true)?;
        let getter = self.module.add_method(
            ty,
            MethodDef::new(
                "get_Item",
                Self::accessor_flags(),
                TypeSignature::Object,
                vec![ParamDef::new("index", TypeSignature::I4)],
            )
            .with_body(body),
        );

        let mut body = MethodBody::new();
        let mut emit = Emitter::append(&mut body);
        emit.op_with(OpCode::Ldsfld, Operand::Field(table))?;
        emit.ldarg(0)?;
        emit.ldarg(1)?;
        emit.ldarg(2)?;
        emit.op_with(
            OpCode::Callvirt,
            Operand::Method(MethodReference {
                declaring: accessors,
                name: "SetItem".to_string(),
                signature: MethodSignature::new(
                    true,
                    TypeSignature::Void,
                    vec![thiz, TypeSignature::I4, TypeSignature::Object],
                ),
                generic_args: Vec::new(),
            }),
        )?;
        emit.op(OpCode::Ret)?;
        body.max_stack = compute_max_stack(&body, false)?;
        let setter = self.module.add_method(
            ty,
            MethodDef::new(
                "set_Item",
                Self::accessor_flags(),
                TypeSignature::Void,
                vec![
                    ParamDef::new("index", TypeSignature::I4),
                    ParamDef::new("value", TypeSignature::Object),
                ],
            )
            .with_body(body),
        );

        self.module
            .add_property(ty, "Item", TypeSignature::Object, Some(getter), Some(setter));
        Ok(())
    }

    fn build_get_type(&mut self, ty: TypeId) -> Result<()> {
        let mut body = MethodBody::new();
        let mut emit = Emitter::append(&mut body);
        emit.op_with(
            OpCode::Ldsfld,
            Operand::Field(self.static_field(ELEMENT_TYPES_FIELD, self.element_types())),
        )?;
        emit.ldarg(1)?;
        emit.op(OpCode::LdelemRef)?;
        emit.op(OpCode::Ret)?;

        let get_type = MethodDef::new(
            "GetType",
            MethodAttributes::PUBLIC
                | MethodAttributes::HIDE_BY_SIG
                | MethodAttributes::NEW_SLOT
                | MethodAttributes::VIRTUAL
                | MethodAttributes::FINAL,
            core_type("System.Type"),
            vec![ParamDef::new("index", TypeSignature::I4)],
        );
        self.add(ty, get_type, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesis_is_memoized() {
        let config = HotfixConfig::default();
        let mut runtime = Module::new("HotfixRuntime");
        let mut packs = PackSynthesizer::new();

        let first = packs.ensure(&mut runtime, &config, 2).unwrap();
        let types_after_first = runtime.types().count();
        let second = packs.ensure(&mut runtime, &config, 2).unwrap();
        assert_eq!(first, second);
        assert_eq!(runtime.types().count(), types_after_first);
        assert!(runtime.is_dirty());

        // A fresh synthesizer finds the existing definition instead of adding another.
        let mut fresh = PackSynthesizer::new();
        assert_eq!(fresh.ensure(&mut runtime, &config, 2).unwrap(), first);
        assert_eq!(runtime.types().count(), types_after_first);
    }

    #[test]
    fn pack_shape() {
        let config = HotfixConfig::default();
        let mut runtime = Module::new("HotfixRuntime");
        let ty = PackSynthesizer::new().ensure(&mut runtime, &config, 3).unwrap();

        let def = runtime.type_def(ty).unwrap();
        assert_eq!(def.id, "Hotfix.ArgPack`3");
        assert!(def.is_value_type());
        assert_eq!(def.generic_params, vec!["T0", "T1", "T2"]);
        assert_eq!(def.interfaces, vec![TypeSignature::Class(TypeRef::local("Hotfix.IArgPack"))]);
        assert!(runtime.find_field(ty, "t2").is_some());
        assert!(runtime.find_field(ty, ELEMENT_TYPES_FIELD).unwrap().is_static());

        let ctor = runtime.find_method_with_param_count(ty, ".ctor", 3).unwrap();
        assert_eq!(runtime.method(ctor).unwrap().body().unwrap().len(), 10);
        for name in ["Deconstruct", ".cctor", PULL_METHOD, PUSH_METHOD, "GetType"] {
            assert_eq!(runtime.find_methods(ty, name).len(), 1, "{name}");
        }
        assert_eq!(runtime.find_property(ty, "Item").unwrap().accessors().len(), 2);
        assert_eq!(runtime.find_property(ty, "Length").unwrap().accessors().len(), 1);

        let indexer = runtime.find_nested_type(ty, INDEXER_NAME).unwrap();
        assert_eq!(runtime.methods_of(indexer).len(), 6);
        assert_eq!(runtime.find_type("Hotfix.ArgPack`3+<>indexer"), Some(indexer));
    }

    #[test]
    fn empty_pack() {
        let config = HotfixConfig::default();
        let mut runtime = Module::new("HotfixRuntime");
        let ty = PackSynthesizer::new().ensure(&mut runtime, &config, 0).unwrap();
        let def = runtime.type_def(ty).unwrap();
        assert_eq!(def.id, "Hotfix.ArgPack");
        assert!(!def.is_generic());

        let pack = pack_instance(&runtime, &config, "Game", Vec::new());
        assert_eq!(
            pack,
            TypeSignature::ValueType(TypeRef::external("HotfixRuntime", "Hotfix.ArgPack"))
        );
        assert!(pack_constructor(&pack).signature.params.is_empty());
    }

    #[test]
    fn instance_references() {
        let config = HotfixConfig::default();
        let runtime = Module::new("HotfixRuntime");
        let pack = pack_instance(
            &runtime,
            &config,
            "Game",
            vec![TypeSignature::I4, TypeSignature::String],
        );
        let ctor = pack_constructor(&pack);
        assert_eq!(
            ctor.resolved_signature().params,
            vec![TypeSignature::I4, TypeSignature::String]
        );
        assert_eq!(pack_field(&pack, 1).name, "t1");
    }
}
