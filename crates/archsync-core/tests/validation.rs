use archsync_core::prelude::*;
use archsync_core::rules::{rule_by_name, strict_rules};
use archsync_core::validate;

#[test]
fn every_violation_is_reported() {
    let mut arch = Architecture::new("shop", "Shop", "");
    arch.define_node("api", NodeType::Service, "API", "")
        .with_owner("platform");
    arch.define_node("db", NodeType::Database, "DB", "")
        .with_meta("backup-schedule", json!("daily"));

    let errors = arch.validate();
    let found: Vec<(&str, &str)> = errors
        .iter()
        .map(|e| (e.rule.as_str(), e.node_id.as_str()))
        .collect();
    assert_eq!(
        found,
        vec![
            ("AllNodesHaveOwner", "db"),
            ("AllServicesHaveHealthEndpoint", "api"),
        ]
    );
}

#[test]
fn validation_never_mutates_or_short_circuits() {
    let mut arch = Architecture::new("shop", "Shop", "");
    arch.define_node("a", NodeType::Service, "A", "");
    arch.define_node("b", NodeType::Service, "B", "");
    arch.connect("a-ghost", "", "a", "ghost");
    let before = arch.clone();

    let errors = validate(&arch, &strict_rules());
    assert_eq!(arch, before);
    // two owners, two health endpoints, one dangling end, one unused node
    assert_eq!(errors.len(), 6, "{:#?}", errors);
    assert!(errors.iter().any(|e| e.rule == "NoUnusedNodes" && e.node_id == "b"));
}

#[test]
fn rules_resolve_by_name() {
    let rule = rule_by_name("UniqueIdentifiers").unwrap();
    let mut arch = Architecture::new("shop", "Shop", "");
    arch.define_node("x", NodeType::Queue, "X", "");
    arch.define_node("x", NodeType::Queue, "X again", "");
    assert_eq!(rule.validate(&arch).len(), 1);
    assert!(rule_by_name("NoSuchRule").is_none());
}
