//! Module fixtures shared by the integration tests.
//!
//! `shop_module` builds a small game assembly through the public API; `runtime_module`
//! provides the dispatch hook the rewritten bodies call into.

#![allow(dead_code)]

use dotpatch::{
    assembly::{Instruction, OpCode, Operand},
    hotfix::HotfixConfig,
    metadata::{
        customattributes::CustomAttribute,
        method::{MethodAttributes, MethodBody, MethodDef, ParamDef},
        module::{
            FieldAttributes, MethodId, Module, TypeAttributes, TypeId, OBJECT_TYPE_ID,
            VALUE_TYPE_ID,
        },
        signatures::{FieldReference, TypeRef, TypeSignature},
    },
    project::{Session, SessionConfig},
};

pub const SHOP: &str = "Shop";

/// Instructions executed by `Shop.Math::Long` between its early exit and its tail.
pub const LONG_PADDING: usize = 140;

pub fn object() -> Option<TypeSignature> {
    Some(TypeSignature::Class(TypeRef::external("mscorlib", OBJECT_TYPE_ID)))
}

pub fn op(opcode: OpCode) -> Instruction {
    Instruction::new(opcode)
}

pub fn body_of(code: Vec<Instruction>) -> MethodBody {
    let mut body = MethodBody::new();
    for instruction in code {
        body.push(instruction);
    }
    body
}

pub fn method_named(module: &Module, type_id: &str, name: &str) -> MethodId {
    let ty = module.find_type(type_id).expect("type exists");
    module.find_methods(ty, name)[0]
}

fn add(module: &mut Module, owner: TypeId, method: MethodDef, body: MethodBody) -> MethodId {
    module.add_method(owner, method.with_body(body))
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
        MethodAttributes::PUBLIC | MethodAttributes::STATIC,
        TypeSignature::Boolean,
        vec![
            ParamDef::new("token", TypeSignature::I8),
            ParamDef::new("args", TypeSignature::GenericParamMethod(0)),
            ParamDef::by_ref("results", TypeSignature::GenericParamMethod(1)),
        ],
    );
    hook.generic_params = vec!["TIn".to_string(), "TOut".to_string()];
    add(&mut module, caller, hook, body_of(vec![op(OpCode::LdcI40), op(OpCode::Ret)]));
    module
}

/// `Shop`: a counter class, static math helpers, a value type and a marked type.
pub fn shop_module() -> Module {
    let public = MethodAttributes::PUBLIC | MethodAttributes::HIDE_BY_SIG;
    let public_static = public | MethodAttributes::STATIC;

    let mut module = Module::new(SHOP);
    module.add_assembly_ref("mscorlib");

    // int Add(int n) { count += n; return count; }
    let counter = module.add_type("Shop", "Counter", TypeAttributes::PUBLIC, object());
    module.add_field(counter, "count", FieldAttributes::PUBLIC, TypeSignature::I4);
    let count = FieldReference {
        declaring: TypeSignature::Class(TypeRef::local("Shop.Counter")),
        name: "count".to_string(),
        field_type: TypeSignature::I4,
    };
    add(
        &mut module,
        counter,
        MethodDef::new(
            "Add",
            public,
            TypeSignature::I4,
            vec![ParamDef::new("n", TypeSignature::I4)],
        ),
        body_of(vec![
            op(OpCode::Ldarg0),
            op(OpCode::Ldarg0),
            Instruction::with(OpCode::Ldfld, Operand::Field(count.clone())),
            op(OpCode::Ldarg1),
            op(OpCode::Add),
            Instruction::with(OpCode::Stfld, Operand::Field(count.clone())),
            op(OpCode::Ldarg0),
            Instruction::with(OpCode::Ldfld, Operand::Field(count.clone())),
            op(OpCode::Ret),
        ]),
    );
    add(
        &mut module,
        counter,
        MethodDef::new("Clear", public, TypeSignature::Void, vec![]),
        body_of(vec![
            op(OpCode::Ldarg0),
            op(OpCode::LdcI40),
            Instruction::with(OpCode::Stfld, Operand::Field(count)),
            op(OpCode::Ret),
        ]),
    );

    let math = module.add_type("Shop", "Math", TypeAttributes::PUBLIC, object());
    add(
        &mut module,
        math,
        MethodDef::new(
            "Twice",
            public_static,
            TypeSignature::I4,
            vec![ParamDef::new("x", TypeSignature::I4)],
        ),
        body_of(vec![
            op(OpCode::Ldarg0),
            op(OpCode::LdcI42),
            op(OpCode::Mul),
            op(OpCode::Ret),
        ]),
    );

    // int Divide(int a, int b, out int rest) { rest = a % b; return a / b; }
    add(
        &mut module,
        math,
        MethodDef::new(
            "Divide",
            public_static,
            TypeSignature::I4,
            vec![
                ParamDef::new("a", TypeSignature::I4),
                ParamDef::new("b", TypeSignature::I4),
                ParamDef::out("rest", TypeSignature::I4),
            ],
        ),
        body_of(vec![
            op(OpCode::Ldarg2),
            op(OpCode::Ldarg0),
            op(OpCode::Ldarg1),
            op(OpCode::Rem),
            op(OpCode::StindI4),
            op(OpCode::Ldarg0),
            op(OpCode::Ldarg1),
            op(OpCode::Div),
            op(OpCode::Ret),
        ]),
    );

    // int Long(int x) { if (x == 0) return -1; <padding>; return x; }
    let mut long = MethodBody::new();
    let padded = long.create(op(OpCode::Nop));
    long.push(op(OpCode::Ldarg0));
    long.push(Instruction::with(OpCode::BrtrueS, Operand::Target(padded)));
    long.push(op(OpCode::LdcI4M1));
    long.push(op(OpCode::Ret));
    long.append(padded).expect("fresh instruction");
    for _ in 1..LONG_PADDING {
        long.push(op(OpCode::Nop));
    }
    long.push(op(OpCode::Ldarg0));
    long.push(op(OpCode::Ret));
    add(
        &mut module,
        math,
        MethodDef::new(
            "Long",
            public_static,
            TypeSignature::I4,
            vec![ParamDef::new("x", TypeSignature::I4)],
        ),
        long,
    );
    add(
        &mut module,
        math,
        MethodDef::new(
            "Helper",
            MethodAttributes::PRIVATE | MethodAttributes::STATIC,
            TypeSignature::Void,
            vec![],
        ),
        body_of(vec![op(OpCode::Ret)]),
    );

    let money = module.add_type(
        "Shop",
        "Money",
        TypeAttributes::PUBLIC | TypeAttributes::SEQUENTIAL_LAYOUT | TypeAttributes::SEALED,
        Some(TypeSignature::ValueType(TypeRef::external("mscorlib", VALUE_TYPE_ID))),
    );
    module.add_field(money, "cents", FieldAttributes::PUBLIC, TypeSignature::I4);
    let cents = FieldReference {
        declaring: TypeSignature::ValueType(TypeRef::local("Shop.Money")),
        name: "cents".to_string(),
        field_type: TypeSignature::I4,
    };
    // void Raise(int by) { cents += by; }
    add(
        &mut module,
        money,
        MethodDef::new(
            "Raise",
            public,
            TypeSignature::Void,
            vec![ParamDef::new("by", TypeSignature::I4)],
        ),
        body_of(vec![
            op(OpCode::Ldarg0),
            op(OpCode::Ldarg0),
            Instruction::with(OpCode::Ldfld, Operand::Field(cents.clone())),
            op(OpCode::Ldarg1),
            op(OpCode::Add),
            Instruction::with(OpCode::Stfld, Operand::Field(cents)),
            op(OpCode::Ret),
        ]),
    );

    let till = module.add_type("Shop", "Till", TypeAttributes::PUBLIC, object());
    if let Some(ty) = module.type_def_mut(till) {
        ty.custom_attributes
            .push(CustomAttribute::new(HotfixConfig::default().marker_attribute));
    }
    add(
        &mut module,
        till,
        MethodDef::new("Open", public, TypeSignature::Void, vec![]),
        body_of(vec![op(OpCode::Ret)]),
    );

    module
}

/// A session holding the runtime and the shop module, not backed by files.
pub fn shop_session() -> Session {
    let mut session = Session::open(SessionConfig::new("unused"));
    session.insert(runtime_module());
    session.insert(shop_module());
    session
}
