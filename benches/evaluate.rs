use std::sync::Arc;

use chrono::{Duration, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use ticket_rules::{
    compile, ConditionDescriptor, ReloadCoordinator, RoleSet, RuleEngine, RuleKey, StaticSource, TicketSnapshot,
};

const CONFIG: &str = r#"{
    "domains": {
        "it": {
            "workflow": { "Open": ["InProgress", "Escalated", "Resolved", "Closed"] },
            "transitions": [
                { "from": "Open", "to": "Escalated",
                  "conditions": [ { "field": "days_until_breach", "operator": "<=", "value": 1 } ] },
                { "from": "Open", "to": "Resolved",
                  "conditions": [ { "field": "resolution", "operator": "is_not_empty" } ] },
                { "from": "Open", "to": "Closed",
                  "conditions": [ { "role": "Admin" }, { "field": "priority_score", "operator": "<", "value": 50 } ] }
            ],
            "rule_groups": {
                "priority_multipliers": [
                    { "multiplier": 1.5, "conditions": [ { "field": "vip", "value": true } ] },
                    { "multiplier": 2.0, "conditions": [ { "field": "age_days", "operator": ">", "value": 7 } ] }
                ]
            }
        }
    }
}"#;

fn sample_ticket() -> TicketSnapshot {
    TicketSnapshot::new("it", "Open")
        .with_custom_fields(r#"{"priority_score": 15, "vip": true, "resolution": "patched", "team": "ops"}"#)
        .with_completion_target(Utc::now() + Duration::hours(6))
}

fn bench_predicate_evaluate(c: &mut Criterion) {
    let pred = compile(&[
        ConditionDescriptor::role("Agent"),
        ConditionDescriptor::field("priority_score", ">", 10),
        ConditionDescriptor::field("team", "==", "OPS"),
        ConditionDescriptor::field("days_until_breach", "<=", 1),
    ]);
    let ticket = sample_ticket();
    let principal = RoleSet::new(["Agent", "Viewer"]);

    let mut group = c.benchmark_group("predicate");
    group.throughput(Throughput::Elements(1));
    group.bench_function("evaluate_four_conditions", |b| {
        b.iter(|| black_box(pred.evaluate(black_box(&ticket), &principal)));
    });
    group.finish();
}

fn bench_registry_lookup(c: &mut Criterion) {
    let coord = ReloadCoordinator::empty();
    coord.reload_bytes(CONFIG.as_bytes()).unwrap();
    let hit = RuleKey::transition("it", "Open", "Closed");
    let miss = RuleKey::transition("it", "Open", "InProgress");

    let mut group = c.benchmark_group("registry");
    group.bench_function("lookup_hit", |b| {
        b.iter(|| black_box(coord.current().lookup(black_box(&hit)).constant()));
    });
    group.bench_function("lookup_miss", |b| {
        b.iter(|| black_box(coord.current().lookup(black_box(&miss)).constant()));
    });
    group.finish();
}

fn bench_engine(c: &mut Criterion) {
    let engine = RuleEngine::new(Arc::new(StaticSource::new(CONFIG))).unwrap();
    let ticket = sample_ticket();
    let admin = RoleSet::new(["Admin"]);

    let mut group = c.benchmark_group("engine");
    group.bench_function("valid_next_states", |b| {
        b.iter(|| black_box(engine.valid_next_states(black_box(&ticket), &admin)));
    });
    group.bench_function("combined_multiplier", |b| {
        b.iter(|| black_box(engine.combined_multiplier(black_box(&ticket), &admin, "priority_multipliers")));
    });
    group.bench_function("reload_configuration", |b| {
        b.iter(|| black_box(engine.reload_configuration().is_ok()));
    });
    group.finish();
}

criterion_group!(benches, bench_predicate_evaluate, bench_registry_lookup, bench_engine);
criterion_main!(benches);
