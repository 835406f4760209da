use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use ticket_rules::config::fingerprint;
use ticket_rules::{ReloadCoordinator, RoleSet, RuleEngine, RuleKey, StaticSource, TicketSnapshot};

// Both documents register the same keys; every rule in A requires Admin and
// every rule in B is unconditional, so a torn registry would show a mix.
const DOC_A: &str = r#"{"domains": {"it": {
    "workflow": {"Open": ["InProgress", "Closed"], "InProgress": ["Closed"]},
    "transitions": [
        {"from": "Open", "to": "InProgress", "conditions": [{"role": "Admin"}]},
        {"from": "Open", "to": "Closed", "conditions": [{"role": "Admin"}]},
        {"from": "InProgress", "to": "Closed", "conditions": [{"role": "Admin"}]}
    ]
}}}"#;

const DOC_B: &str = r#"{"domains": {"it": {
    "workflow": {"Open": ["InProgress", "Closed"], "InProgress": ["Closed"]},
    "transitions": [
        {"from": "Open", "to": "InProgress", "conditions": []},
        {"from": "Open", "to": "Closed", "conditions": []},
        {"from": "InProgress", "to": "Closed", "conditions": []}
    ]
}}}"#;

fn keys() -> [RuleKey; 3] {
    [
        RuleKey::transition("it", "Open", "InProgress"),
        RuleKey::transition("it", "Open", "Closed"),
        RuleKey::transition("it", "InProgress", "Closed"),
    ]
}

#[test]
fn concurrent_reloads_never_expose_a_mixed_registry() {
    let coord = Arc::new(ReloadCoordinator::empty());
    coord.reload_bytes(DOC_A.as_bytes()).unwrap();
    let fp_a = fingerprint(DOC_A.as_bytes());
    let fp_b = fingerprint(DOC_B.as_bytes());
    let stop = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let coord = Arc::clone(&coord);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let ticket = TicketSnapshot::new("it", "Open");
                let anyone = RoleSet::anonymous();
                let mut reads = 0u64;
                while !stop.load(Ordering::Relaxed) {
                    let reg = coord.current();
                    let fp = reg.fingerprint();
                    assert!(fp == fp_a || fp == fp_b, "unexpected fingerprint");
                    let expected = fp == fp_b;
                    for key in keys() {
                        assert_eq!(reg.lookup(&key).evaluate(&ticket, &anyone), expected, "torn read at {key}");
                    }
                    reads += 1;
                }
                reads
            })
        })
        .collect();

    let writers: Vec<_> = (0..2)
        .map(|w| {
            let coord = Arc::clone(&coord);
            thread::spawn(move || {
                for i in 0..200 {
                    let doc = if (i + w) % 2 == 0 { DOC_B } else { DOC_A };
                    coord.reload_bytes(doc.as_bytes()).unwrap();
                }
            })
        })
        .collect();

    for w in writers {
        w.join().unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    let total: u64 = readers.into_iter().map(|r| r.join().unwrap()).sum();
    assert!(total > 0);
    assert!(coord.generation() > 1);
}

#[test]
fn reloading_identical_content_is_idempotent() {
    let engine = RuleEngine::new(Arc::new(StaticSource::new(DOC_A))).unwrap();
    let ticket = TicketSnapshot::new("it", "Open");
    let admin = RoleSet::new(["Admin"]);
    let before = engine.valid_next_states(&ticket, &admin);
    let fp = engine.registry().fingerprint();

    let outcome = engine.reload_configuration().unwrap();
    assert!(outcome.is_installed());
    assert_eq!(outcome.fingerprint(), fp);
    assert_eq!(engine.valid_next_states(&ticket, &admin), before);

    let skipped = engine.reload_if_changed().unwrap();
    assert!(!skipped.is_installed());
}

#[test]
fn failed_reload_keeps_serving_previous_rules() {
    let source = Arc::new(StaticSource::new(DOC_A));
    let engine = RuleEngine::new(source.clone()).unwrap();
    let ticket = TicketSnapshot::new("it", "Open");
    let anyone = RoleSet::anonymous();
    let generation = engine.registry().generation();

    for bad in ["{ truncated", r#"{"domains": {"it": {"transitions": [{"from": "", "to": "Closed"}]}}}"#] {
        source.replace(bad);
        let err = engine.reload_configuration().unwrap_err();
        assert!(err.is_config());
        assert_eq!(engine.registry().generation(), generation);
        assert!(!engine.can_transition(&ticket, "Closed", &anyone));
    }

    source.replace(DOC_B);
    engine.reload_configuration().unwrap();
    assert!(engine.registry().generation() > generation);
    assert!(engine.can_transition(&ticket, "Closed", &anyone));
}

#[test]
fn snapshot_held_by_caller_outlives_reload() {
    let source = Arc::new(StaticSource::new(DOC_A));
    let engine = RuleEngine::new(source.clone()).unwrap();
    let held = engine.registry();

    source.replace(DOC_B);
    engine.reload_configuration().unwrap();

    let ticket = TicketSnapshot::new("it", "Open");
    let key = RuleKey::transition("it", "Open", "Closed");
    assert!(!held.lookup(&key).evaluate(&ticket, &RoleSet::anonymous()));
    assert!(engine.registry().lookup(&key).evaluate(&ticket, &RoleSet::anonymous()));
    assert!(held.generation() < engine.registry().generation());
}
