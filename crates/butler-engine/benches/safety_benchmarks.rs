//! Benchmarks for the per-step gating path.
//!
//! Every proposed action passes the validator, and every physical or batch
//! actuation passes the safety policy, so both sit on the hot path of a
//! plan. The safety decision should stay well under 50us per actuator even
//! for whole-home batch operations.

use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};
use serde_json::{json, Value};

use butler_engine::{
    ActuatorInfo, ActuatorMetadata, ActuatorOverride, OverrideLookup, SafetyPolicy, Validator,
};

/// A realistic spread of actuator ids, including keyword near-misses.
fn generate_actuators(count: usize) -> Vec<(ActuatorInfo, ActuatorMetadata)> {
    (0..count)
        .map(|i| {
            let (id, class) = match i % 6 {
                0 => (format!("cover.living_room_blind_{}", i), "blind"),
                1 => (format!("cover.garage_door_{}", i), "garage"),
                2 => (format!("cover.doorway_shade_{}", i), "shade"),
                3 => (format!("cover.front_gate_{}", i), "gate"),
                4 => (format!("cover.gateway_awning_{}", i), "awning"),
                _ => (format!("cover.bedroom_shutter_{}", i), "shutter"),
            };
            let override_lookup = if i % 10 == 0 {
                OverrideLookup::Found(ActuatorOverride {
                    actuator_type: class.to_string(),
                    enabled: i % 20 != 0,
                })
            } else {
                OverrideLookup::Absent
            };
            (
                ActuatorInfo {
                    id: id.clone(),
                    name: id,
                    device_class: Some(class.to_string()),
                },
                ActuatorMetadata {
                    device_class: Some(class.to_string()),
                    override_lookup,
                },
            )
        })
        .collect()
}

fn proposed_calls() -> Vec<(&'static str, Value)> {
    vec![
        ("turn_light", json!({"room": "kitchen", "state": "on"})),
        ("set_brightness", json!({"room": "den", "brightness": 40, "previous_brightness": 70})),
        ("set_temperature", json!({"room": "den", "temperature": 30})),
        ("set_cover", json!({"entity_id": "cover.den", "position": 40})),
        ("unlock_door", json!({"entity_id": "lock.front"})),
        ("set_volume", json!({"entity_id": "media.tv", "volume": 120})),
        ("launch_rockets", json!({})),
    ]
}

fn bench_safety_policy(c: &mut Criterion) {
    let policy = SafetyPolicy::default();
    let actuators = generate_actuators(1000);

    let mut group = c.benchmark_group("safety_policy");
    group.sample_size(200);
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("evaluate_single", |b| {
        let mut idx = 0usize;
        b.iter(|| {
            let (info, metadata) = &actuators[idx % actuators.len()];
            idx += 1;
            policy.evaluate(&info.id, metadata)
        });
    });

    group.bench_function("select_batch_100", |b| {
        b.iter(|| policy.select(actuators[..100].to_vec()));
    });

    group.finish();

    let target = Duration::from_micros(50);
    let mut times = Vec::with_capacity(actuators.len());
    for (info, metadata) in &actuators {
        let start = std::time::Instant::now();
        let _verdict = policy.evaluate(&info.id, metadata);
        times.push(start.elapsed());
    }
    times.sort();
    let p95 = times[times.len() * 95 / 100];

    eprintln!("\n=== Safety decision latency ({} actuators) ===", actuators.len());
    eprintln!("Median:  {:?}", times[times.len() / 2]);
    eprintln!("p95:     {:?} (target: {:?})", p95, target);

    assert!(
        p95 < target,
        "Safety decision p95 {:?} exceeds target {:?}",
        p95,
        target
    );
}

fn bench_validator(c: &mut Criterion) {
    let validator = Validator;
    let calls = proposed_calls();

    let mut group = c.benchmark_group("validator");
    group.sample_size(200);

    group.bench_function("validate_mixed", |b| {
        let mut idx = 0usize;
        b.iter(|| {
            let (function, args) = &calls[idx % calls.len()];
            idx += 1;
            validator.validate(function, args)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_safety_policy, bench_validator);
criterion_main!(benches);
