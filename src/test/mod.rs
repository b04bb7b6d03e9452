//! Module factories shared by unit tests.
//!
//! [`game_module`] is a small assembly covering every method shape the rewriter and selector
//! care about; [`runtime_module`] provides the dispatch hook.

use crate::{
    assembly::{Instruction, OpCode, Operand},
    hotfix::HotfixConfig,
    metadata::{
        customattributes::{CustomAttribute, CustomAttributeArgument},
        method::{MethodAttributes, MethodBody, MethodDef, ParamDef},
        module::{
            FieldAttributes, MethodId, Module, TypeAttributes, TypeId, OBJECT_TYPE_ID,
            VALUE_TYPE_ID,
        },
        signatures::{FieldReference, TypeRef, TypeSignature},
    },
    project::{Session, SessionConfig},
};

pub const GAME: &str = "Game";

pub fn object() -> Option<TypeSignature> {
    Some(TypeSignature::Class(TypeRef::external("mscorlib", OBJECT_TYPE_ID)))
}

pub fn marker() -> CustomAttribute {
    CustomAttribute::new(HotfixConfig::default().marker_attribute)
}

pub fn forbidden_marker() -> CustomAttribute {
    marker().with_field("Forbidden", CustomAttributeArgument::Bool(true))
}

// Helper function to build a body from a straight instruction list
pub fn body_of(code: Vec<Instruction>) -> MethodBody {
    let mut body = MethodBody::new();
    for instruction in code {
        body.push(instruction);
    }
    body
}

pub fn op(opcode: OpCode) -> Instruction {
    Instruction::new(opcode)
}

// Helper function to create a method with a body
pub fn create_method(
    module: &mut Module,
    owner: TypeId,
    name: &str,
    flags: MethodAttributes,
    return_type: TypeSignature,
    params: Vec<ParamDef>,
    body: MethodBody,
) -> MethodId {
    module.add_method(owner, MethodDef::new(name, flags, return_type, params).with_body(body))
}

pub fn method_named(module: &Module, type_id: &str, name: &str) -> MethodId {
    let ty = module.find_type(type_id).unwrap();
    module.find_methods(ty, name)[0]
}

pub fn runtime_module() -> Module {
    let config = HotfixConfig::default();
    let mut module = Module::new(config.runtime_assembly.as_str());
    let caller = module.add_type(
        "Hotfix",
        "HotfixCaller",
        TypeAttributes::PUBLIC | TypeAttributes::ABSTRACT | TypeAttributes::SEALED,
        object(),
    );
    let mut hook = MethodDef::new(
        config.hook_method.as_str(),
        MethodAttributes::PUBLIC | MethodAttributes::STATIC | MethodAttributes::HIDE_BY_SIG,
        TypeSignature::Boolean,
        vec![
            ParamDef::new("token", TypeSignature::I8),
            ParamDef::new("args", TypeSignature::GenericParamMethod(0)),
            ParamDef::by_ref("results", TypeSignature::GenericParamMethod(1)),
        ],
    )
    .with_body(body_of(vec![op(OpCode::LdcI40), op(OpCode::Ret)]));
    hook.generic_params = vec!["TIn".to_string(), "TOut".to_string()];
    module.add_method(caller, hook);
    module.clear_dirty();
    module
}

/// `Game`: players, math helpers, a value type, a framework object subclass and marked types.
pub fn game_module() -> Module {
    let public = MethodAttributes::PUBLIC | MethodAttributes::HIDE_BY_SIG;
    let public_static = public | MethodAttributes::STATIC;
    let ctor_flags = public | MethodAttributes::SPECIAL_NAME | MethodAttributes::RTSPECIAL_NAME;
    let ret = || body_of(vec![op(OpCode::Ret)]);

    let mut module = Module::new(GAME);
    module.add_assembly_ref("mscorlib");

    let player = module.add_type("Game", "Player", TypeAttributes::PUBLIC, object());
    module.add_field(player, "hp", FieldAttributes::PUBLIC, TypeSignature::I4);
    let hp = FieldReference {
        declaring: TypeSignature::Class(TypeRef::local("Game.Player")),
        name: "hp".to_string(),
        field_type: TypeSignature::I4,
    };
    create_method(&mut module, player, ".ctor", ctor_flags, TypeSignature::Void, vec![], ret());
    create_method(
        &mut module,
        player,
        "Reset",
        public,
        TypeSignature::Void,
        vec![],
        body_of(vec![
            op(OpCode::Ldarg0),
            op(OpCode::LdcI40),
            Instruction::with(OpCode::Stfld, Operand::Field(hp.clone())),
            op(OpCode::Ret),
        ]),
    );
    // int TryRead(int key, out int value) { value = key + 1; return 1; }
    create_method(
        &mut module,
        player,
        "TryRead",
        public,
        TypeSignature::I4,
        vec![
            ParamDef::new("key", TypeSignature::I4),
            ParamDef::out("value", TypeSignature::I4),
        ],
        body_of(vec![
            op(OpCode::Ldarg2),
            op(OpCode::Ldarg1),
            op(OpCode::LdcI41),
            op(OpCode::Add),
            Instruction::with(OpCode::Stobj, Operand::Type(TypeSignature::I4)),
            op(OpCode::LdcI41),
            op(OpCode::Ret),
        ]),
    );
    let secret = create_method(
        &mut module,
        player,
        "Secret",
        MethodAttributes::PRIVATE,
        TypeSignature::Void,
        vec![],
        ret(),
    );
    if let Some(method) = module.method_mut(secret) {
        method.custom_attributes.push(marker());
    }
    let get_health = create_method(
        &mut module,
        player,
        "get_Health",
        public | MethodAttributes::SPECIAL_NAME,
        TypeSignature::I4,
        vec![],
        body_of(vec![
            op(OpCode::Ldarg0),
            Instruction::with(OpCode::Ldfld, Operand::Field(hp)),
            op(OpCode::Ret),
        ]),
    );
    module.add_property(player, "Health", TypeSignature::I4, Some(get_health), None);

    let math = module.add_type("Game", "Math", TypeAttributes::PUBLIC, object());
    create_method(
        &mut module,
        math,
        "Twice",
        public_static,
        TypeSignature::I4,
        vec![ParamDef::new("x", TypeSignature::I4)],
        body_of(vec![
            op(OpCode::Ldarg0),
            op(OpCode::LdcI42),
            op(OpCode::Mul),
            op(OpCode::Ret),
        ]),
    );
    // int Clamp(int x) { if (x < 0) return 0; return x; }
    let mut clamp = MethodBody::new();
    let positive = clamp.create(op(OpCode::Ldarg0));
    clamp.push(op(OpCode::Ldarg0));
    clamp.push(op(OpCode::LdcI40));
    clamp.push(Instruction::with(OpCode::BgeS, Operand::Target(positive)));
    clamp.push(op(OpCode::LdcI40));
    clamp.push(op(OpCode::Ret));
    clamp.append(positive).ok();
    clamp.push(op(OpCode::Ret));
    create_method(
        &mut module,
        math,
        "Clamp",
        public_static,
        TypeSignature::I4,
        vec![ParamDef::new("x", TypeSignature::I4)],
        clamp,
    );
    create_method(
        &mut module,
        math,
        "Internal",
        MethodAttributes::ASSEM,
        TypeSignature::Void,
        vec![],
        ret(),
    );

    let vector = module.add_type(
        "Game",
        "Vector",
        TypeAttributes::PUBLIC | TypeAttributes::SEQUENTIAL_LAYOUT | TypeAttributes::SEALED,
        Some(TypeSignature::ValueType(TypeRef::external("mscorlib", VALUE_TYPE_ID))),
    );
    module.add_field(vector, "x", FieldAttributes::PUBLIC, TypeSignature::I4);
    let x = FieldReference {
        declaring: TypeSignature::ValueType(TypeRef::local("Game.Vector")),
        name: "x".to_string(),
        field_type: TypeSignature::I4,
    };
    create_method(
        &mut module,
        vector,
        "Scale",
        public,
        TypeSignature::Void,
        vec![ParamDef::new("k", TypeSignature::I4)],
        body_of(vec![
            op(OpCode::Ldarg0),
            op(OpCode::Ldarg0),
            Instruction::with(OpCode::Ldfld, Operand::Field(x.clone())),
            op(OpCode::Ldarg1),
            op(OpCode::Mul),
            Instruction::with(OpCode::Stfld, Operand::Field(x)),
            op(OpCode::Ret),
        ]),
    );

    let actor = module.add_type(
        "Game",
        "Actor",
        TypeAttributes::PUBLIC,
        Some(TypeSignature::Class(TypeRef::external("UnityEngine", "UnityEngine.Object"))),
    );
    create_method(&mut module, actor, ".ctor", ctor_flags, TypeSignature::Void, vec![], ret());
    create_method(&mut module, actor, "Tick", public, TypeSignature::Void, vec![], ret());

    let marked = module.add_type("Game", "Marked", TypeAttributes::PUBLIC, object());
    if let Some(ty) = module.type_def_mut(marked) {
        ty.custom_attributes.push(marker());
    }
    create_method(&mut module, marked, "Run", public, TypeSignature::Void, vec![], ret());
    create_method(
        &mut module,
        marked,
        "Hidden",
        MethodAttributes::PRIVATE,
        TypeSignature::Void,
        vec![],
        ret(),
    );
    let skip = create_method(
        &mut module,
        marked,
        "Skip",
        public,
        TypeSignature::Void,
        vec![],
        ret(),
    );
    if let Some(method) = module.method_mut(skip) {
        method.custom_attributes.push(forbidden_marker());
    }
    let inner = module.add_nested_type(
        marked,
        "Inner",
        TypeAttributes::NESTED_PUBLIC,
        object(),
    );
    if let Some(ty) = module.type_def_mut(inner) {
        ty.custom_attributes.push(marker());
    }
    create_method(&mut module, inner, "Go", public, TypeSignature::Void, vec![], ret());
    let sealed = module.add_nested_type(marked, "Sealed", TypeAttributes::NESTED_PUBLIC, object());
    if let Some(ty) = module.type_def_mut(sealed) {
        ty.custom_attributes.push(forbidden_marker());
    }
    create_method(&mut module, sealed, "Stop", public, TypeSignature::Void, vec![], ret());

    module.clear_dirty();
    module
}

// Helper function to create a session holding the runtime and the game module
pub fn hotfix_session() -> Session {
    let mut session = Session::open(SessionConfig::new("unused"));
    session.insert(runtime_module());
    session.insert(game_module());
    session
}
