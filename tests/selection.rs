//! Directive resolution and the run driver over a whole session.

mod common;

use std::collections::BTreeSet;

use common::{method_named, shop_session, SHOP};
use dotpatch::prelude::*;

fn ids(session: &Session, members: &[(&str, &str)]) -> BTreeSet<MethodId> {
    let module = session.get(SHOP).unwrap();
    members
        .iter()
        .map(|(type_id, name)| method_named(module, type_id, name))
        .collect()
}

fn selected(session: &mut Session, config: &HotfixConfig) -> BTreeSet<MethodId> {
    select(session, config)
        .iter()
        .inspect(|(assembly, _, _)| assert_eq!(*assembly, SHOP))
        .map(|(_, _, method)| method)
        .collect()
}

#[test]
fn exclusions_win_regardless_of_order() {
    let mut session = shop_session();
    let config = HotfixConfig::default()
        .with_directive("--member func Shop.Math Long(System.Int32)")
        .with_directive("type Shop.Math");

    let expected = ids(
        &session,
        &[
            ("Shop.Math", "Twice"),
            ("Shop.Math", "Divide"),
            ("Shop.Till", "Open"),
        ],
    );
    assert_eq!(selected(&mut session, &config), expected);

    let config = HotfixConfig::default()
        .with_directive("--type Shop.Math")
        .with_directive("member func Shop.Math Twice(System.Int32)")
        .with_directive("type Shop.Math");
    let expected = ids(&session, &[("Shop.Till", "Open")]);
    assert_eq!(selected(&mut session, &config), expected);
}

#[test]
fn forced_patterns_bypass_the_filter() {
    let mut session = shop_session();
    let config = HotfixConfig::default()
        .with_attribute_scan(false)
        .with_directive("member func static Shop.Math **");
    let all = selected(&mut session, &config);
    assert!(all.contains(&method_named(session.get(SHOP).unwrap(), "Shop.Math", "Helper")));
    assert_eq!(all.len(), 4);

    let config = HotfixConfig::default()
        .with_attribute_scan(false)
        .with_directive("member func Shop.Math *");
    assert_eq!(selected(&mut session, &config).len(), 3);
}

#[test]
fn regex_members_and_comments() {
    let mut session = shop_session();
    let config = HotfixConfig::default()
        .with_attribute_scan(false)
        .with_directive("# math helpers")
        .with_directive("member func Shop.Math ^(Twice|Long)\\(")
        .with_directive("--member func Shop.Math ^Long")
        .with_directive("not a directive");
    let expected = ids(&session, &[("Shop.Math", "Twice")]);
    assert_eq!(selected(&mut session, &config), expected);
}

#[test]
fn run_rewrites_and_marks_once() {
    let mut session = shop_session();
    let config = HotfixConfig::default().with_directive("type Shop.Counter");
    let mut rewriter = Rewriter::new(config);

    let report = run(&mut session, &mut rewriter);
    assert!(report.is_complete_success());
    assert_eq!(report.injected.len(), 3);
    assert_eq!(report.touched_assemblies().into_iter().collect::<Vec<_>>(), vec![SHOP]);
    assert_eq!(rewriter.tokens().len(), 3);
    for injection in &report.injected {
        assert_eq!(injection.head_token, -injection.tail_token);
        assert!(injection.identity.starts_with("Shop."));
    }

    let shop = session.get(SHOP).unwrap();
    assert!(shop.is_injected());
    assert!(shop.is_dirty());
    assert!(session.get("HotfixRuntime").unwrap().is_dirty());

    let again = run(&mut session, &mut rewriter);
    assert!(again.injected.is_empty());
    assert_eq!(again.skipped, vec![SHOP.to_string()]);
    assert!(!again.is_complete_success());
}

#[test]
fn runtime_assembly_is_never_selected() {
    let mut session = shop_session();
    let config = HotfixConfig::default().with_directive("type Hotfix.HotfixCaller");
    let set = select(&mut session, &config);
    assert!(set.iter().all(|(assembly, _, _)| assembly != "HotfixRuntime"));
    assert_eq!(set.len(), 1);
}
