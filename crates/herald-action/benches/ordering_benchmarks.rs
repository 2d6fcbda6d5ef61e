//! Benchmarks for batch planning.
//!
//! Planning (parse, classify, bucket, dependency sort) runs on every
//! confirmation before the first action is attempted, so it should stay
//! negligible next to the platform round-trips that follow.

use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use herald_action::classifier::PhasePlan;
use herald_action::ordering::order_constructive;
use herald_action::types::Action;

/// A mixed instruction line. The kind cycles so every phase is populated.
fn generate_line(index: usize) -> String {
    match index % 8 {
        0 => format!(r#"create_channel "room-{}" in "Zone {}""#, index, index % 4),
        1 => format!(r#"create_category "Zone {}""#, index % 4),
        2 => format!("assign_role Helper to user{}", index),
        3 => format!(r#"set_topic "room-{}" "Welcome, batch {}""#, index, index),
        4 => format!("unban_member user{}", index),
        5 => format!("ban_member spammer{}", index),
        6 => format!("create_role Team{}", index),
        _ => format!("frobnicate thing{}", index),
    }
}

fn generate_actions(count: usize) -> Vec<Action> {
    (0..count)
        .map(|i| Action::parse(i, generate_line(i)))
        .collect()
}

fn bench_plan_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("phase_plan");
    group.measurement_time(Duration::from_secs(5));

    for size in [10usize, 100, 1000] {
        let actions = generate_actions(size);
        group.bench_with_input(BenchmarkId::new("build", size), &actions, |b, actions| {
            b.iter(|| PhasePlan::build(actions));
        });
    }

    group.finish();
}

fn bench_parse(c: &mut Criterion) {
    let lines: Vec<String> = (0..1000).map(generate_line).collect();

    c.bench_function("parse_line", |b| {
        let mut idx = 0usize;
        b.iter(|| {
            let action = Action::parse(idx, lines[idx % lines.len()].as_str());
            idx += 1;
            action
        });
    });
}

fn bench_order_constructive(c: &mut Criterion) {
    // Worst case for the sort: ranks arrive in descending order.
    let actions: Vec<Action> = (0..1000)
        .map(|i| match i % 3 {
            0 => Action::parse(i, format!("send_message room{} hi", i)),
            1 => Action::parse(i, format!("create_channel room{}", i)),
            _ => Action::parse(i, format!("create_category zone{}", i)),
        })
        .collect();

    c.bench_function("order_constructive_1000", |b| {
        b.iter(|| order_constructive(actions.clone()));
    });
}

criterion_group!(benches, bench_plan_build, bench_parse, bench_order_constructive);
criterion_main!(benches);
