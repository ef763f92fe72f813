//! Benchmarks for detect-conflict.

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use detect_conflict::config::ConfFile;
use detect_conflict::{Config, ConflictDetector, Event, ShellInvoker};
use std::sync::Arc;

fn benchmark_event_path(c: &mut Criterion) {
    let detector = ConflictDetector::new(
        Arc::new(Config::default()),
        Arc::new(ShellInvoker::new()),
        None,
    );
    let other_status = Event::new("23502", "null value").with_constraint("yamanote_t_name_key");
    let other_constraint = Event::new("23505", "duplicate key").with_constraint("orders_pkey");

    c.bench_function("on_event_status_mismatch", |b| {
        b.iter(|| black_box(detector.on_event(black_box(&other_status))));
    });

    c.bench_function("on_event_constraint_mismatch", |b| {
        b.iter(|| black_box(detector.on_event(black_box(&other_constraint))));
    });
}

fn benchmark_event_decoding(c: &mut Criterion) {
    let line = r#"{"sqlstate":"23505","constraint":"yamanote_t_name_key","message":"duplicate key value violates unique constraint","severity":"ERROR","schema":"public","table":"yamanote_t"}"#;

    c.bench_function("event_from_json", |b| {
        b.iter(|| Event::from_json(black_box(line)).expect("decode event"));
    });
}

fn benchmark_config_parsing(c: &mut Criterion) {
    let toml_content = r#"
[predicate]
constraint_name = "orders_pkey"

[action]
command = "/usr/local/bin/on-conflict.sh"
mode = "queued"
"#;
    let settings = r"
shared_preload_libraries = 'detect_conflict'
detect_conflict.constraint_name = 'orders_pkey'   # unique key to watch
detect_conflict.action_script = '/usr/local/bin/on-conflict.sh --table ''orders'''
";

    c.bench_function("config_parsing", |b| {
        b.iter(|| Config::from_toml_str(black_box(toml_content)).expect("parse config"));
    });

    c.bench_function("settings_parsing", |b| {
        b.iter(|| ConfFile::parse(black_box(settings)).expect("parse settings"));
    });
}

criterion_group!(
    benches,
    benchmark_event_path,
    benchmark_event_decoding,
    benchmark_config_parsing
);
criterion_main!(benches);
