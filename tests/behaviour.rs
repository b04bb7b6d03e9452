//! Rewritten methods behave like the originals while the dispatch hook declines, and yield
//! to the hook when it handles a call.

mod common;

use common::{method_named, shop_module, shop_session, SHOP};
use dotpatch::prelude::*;
use dotpatch::emulation::ExecutionResult;

fn rewrite(session: &mut Session, type_id: &str, name: &str) -> Injection {
    let method = method_named(session.get(SHOP).unwrap(), type_id, name);
    Rewriter::new(HotfixConfig::default())
        .rewrite(session, SHOP, method)
        .unwrap()
}

fn declined(module: &Module, method: MethodId, args: Vec<EmValue>) -> (ExecutionResult, Vec<i64>) {
    let config = HotfixConfig::default();
    let mut interpreter = Interpreter::new(module, &config, DecliningHandler::new());
    let result = interpreter.execute(method, args).unwrap();
    (result, interpreter.into_handler().tokens())
}

#[test]
fn declined_hooks_preserve_results() {
    let original = shop_module();
    let cases: Vec<(&str, Vec<Vec<EmValue>>)> = vec![
        ("Twice", vec![vec![EmValue::I32(21)], vec![EmValue::I32(-4)]]),
        ("Long", vec![vec![EmValue::I32(0)], vec![EmValue::I32(7)]]),
        (
            "Divide",
            vec![
                vec![EmValue::I32(17), EmValue::I32(5), EmValue::I32(0)],
                vec![EmValue::I32(-9), EmValue::I32(2), EmValue::I32(0)],
            ],
        ),
    ];

    for (name, inputs) in cases {
        let mut session = shop_session();
        let injection = rewrite(&mut session, "Shop.Math", name);
        let rewritten = session.get(SHOP).unwrap();

        for args in inputs {
            let (expected, untouched) = declined(&original, injection.method, args.clone());
            let (actual, tokens) = declined(rewritten, injection.method, args);
            assert_eq!(actual.return_value, expected.return_value, "{name}");
            assert_eq!(actual.by_ref, expected.by_ref, "{name}");
            assert!(untouched.is_empty());
            assert_eq!(tokens, vec![injection.head_token, injection.tail_token], "{name}");
        }
    }
}

#[test]
fn out_arguments_survive_the_post_call() {
    let mut session = shop_session();
    let injection = rewrite(&mut session, "Shop.Math", "Divide");
    assert_eq!((injection.in_arity, injection.post_in_arity, injection.out_arity), (2, 4, 2));

    let (result, _) = declined(
        session.get(SHOP).unwrap(),
        injection.method,
        vec![EmValue::I32(17), EmValue::I32(5), EmValue::I32(0)],
    );
    assert_eq!(result.return_value, Some(EmValue::I32(3)));
    assert_eq!(result.by_ref_arg(2), Some(&EmValue::I32(2)));
}

#[test]
fn value_type_receiver_is_written_back() {
    let mut session = shop_session();
    let injection = rewrite(&mut session, "Shop.Money", "Raise");
    assert_eq!(injection.out_arity, 1);

    let money = StructValue::new("Shop.Money").with_field("cents", EmValue::I32(150));
    let (result, _) = declined(
        session.get(SHOP).unwrap(),
        injection.method,
        vec![EmValue::Struct(money), EmValue::I32(50)],
    );
    assert_eq!(result.return_value, None);
    let receiver = result.by_ref_arg(0).and_then(EmValue::as_struct).unwrap();
    assert_eq!(receiver.field("cents"), Some(&EmValue::I32(200)));
}

#[test]
fn instance_body_runs_exactly_once() {
    let mut session = shop_session();
    let injection = rewrite(&mut session, "Shop.Counter", "Add");
    let config = HotfixConfig::default();
    let mut interpreter =
        Interpreter::new(session.get(SHOP).unwrap(), &config, DecliningHandler::new());

    let counter = interpreter.alloc("Shop.Counter");
    let EmValue::Object(object) = counter.clone() else {
        panic!("allocation returned {counter}");
    };
    let first = interpreter
        .execute(injection.method, vec![counter.clone(), EmValue::I32(5)])
        .unwrap();
    let second = interpreter.execute(injection.method, vec![counter, EmValue::I32(2)]).unwrap();
    assert_eq!(first.return_value, Some(EmValue::I32(5)));
    assert_eq!(second.return_value, Some(EmValue::I32(7)));
    assert_eq!(
        interpreter.object(object).and_then(|counter| counter.field("count")),
        Some(&EmValue::I32(7))
    );
    assert_eq!(interpreter.handler().calls.len(), 4);
}

fn clear_counter(
    module: &Module,
    method: MethodId,
) -> (ExecutionResult, Option<EmValue>, Vec<i64>) {
    let config = HotfixConfig::default();
    let mut interpreter = Interpreter::new(module, &config, DecliningHandler::new());
    let counter = interpreter.alloc("Shop.Counter");
    let EmValue::Object(object) = counter.clone() else {
        panic!("allocation returned {counter}");
    };
    if let Some(state) = interpreter.object_mut(object) {
        state.fields.insert("count".to_string(), EmValue::I32(9));
    }
    let result = interpreter.execute(method, vec![counter]).unwrap();
    let count = interpreter
        .object(object)
        .and_then(|counter| counter.field("count"))
        .cloned();
    (result, count, interpreter.into_handler().tokens())
}

#[test]
fn void_instance_method_without_parameters() {
    let original = shop_module();
    let mut session = shop_session();
    let injection = rewrite(&mut session, "Shop.Counter", "Clear");
    assert_eq!((injection.in_arity, injection.post_in_arity, injection.out_arity), (1, 1, 0));

    let (expected, expected_count, untouched) = clear_counter(&original, injection.method);
    let (actual, count, tokens) = clear_counter(session.get(SHOP).unwrap(), injection.method);
    assert_eq!(expected_count, Some(EmValue::I32(0)));
    assert_eq!(count, expected_count);
    assert_eq!(actual.return_value, None);
    assert_eq!(actual.return_value, expected.return_value);
    assert!(untouched.is_empty());
    assert_eq!(tokens, vec![injection.head_token, injection.tail_token]);
}

#[test]
fn handled_pre_hook_replaces_the_body() {
    let mut session = shop_session();
    let injection = rewrite(&mut session, "Shop.Math", "Divide");
    let config = HotfixConfig::default();
    let mut seen = Vec::new();

    let result = {
        let handler = |token: i64, args: &StructValue, results: &mut StructValue| {
            seen.push((token, args.element(0).cloned()));
            results.set_element(0, EmValue::I32(99));
            results.set_element(1, EmValue::I32(4));
            true
        };
        let mut interpreter = Interpreter::new(session.get(SHOP).unwrap(), &config, handler);
        interpreter
            .execute(
                injection.method,
                vec![EmValue::I32(17), EmValue::I32(5), EmValue::I32(0)],
            )
            .unwrap()
    };

    assert_eq!(result.return_value, Some(EmValue::I32(99)));
    assert_eq!(result.by_ref_arg(2), Some(&EmValue::I32(4)));
    assert_eq!(seen, vec![(injection.head_token, Some(EmValue::I32(17)))]);
}

#[test]
fn post_hook_sees_the_original_result() {
    let mut session = shop_session();
    let injection = rewrite(&mut session, "Shop.Math", "Twice");
    let config = HotfixConfig::default();

    let handler = |token: i64, args: &StructValue, results: &mut StructValue| {
        if token > 0 {
            return false;
        }
        let original = args.element(0).and_then(EmValue::as_i64).unwrap_or_default();
        results.set_element(0, EmValue::I32(i32::try_from(original).unwrap() + 1));
        true
    };
    let mut interpreter = Interpreter::new(session.get(SHOP).unwrap(), &config, handler);
    let result = interpreter.execute(injection.method, vec![EmValue::I32(21)]).unwrap();
    assert_eq!(result.return_value, Some(EmValue::I32(43)));
}

#[test]
fn long_bodies_are_legalized() {
    let mut session = shop_session();
    let injection = rewrite(&mut session, "Shop.Math", "Long");
    assert!(injection.widened_branches >= 1);
    assert_eq!(injection.elided_branches, 1);

    let rewritten = session.get(SHOP).unwrap();
    let body = rewritten.method(injection.method).and_then(MethodDef::body).unwrap();
    body.validate().unwrap();
    assert!(body
        .iter()
        .any(|(_, instruction)| instruction.opcode == OpCode::Br));

    let original = shop_module();
    for x in [0, 3] {
        let (expected, _) = declined(&original, injection.method, vec![EmValue::I32(x)]);
        let (actual, _) = declined(rewritten, injection.method, vec![EmValue::I32(x)]);
        assert_eq!(actual.return_value, expected.return_value);
    }
}
