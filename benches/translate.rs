//! Translator benchmarks.
//!
//! Measures the cost a statement pays per call when it is not prepared.

#![allow(missing_docs)]

use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use trustdb::{PostgresDialect, SqlRewriter};

const STATEMENTS: &[(&str, &str)] = &[
    ("simple_select", "SELECT * FROM users WHERE id = ?"),
    ("insert_or_ignore", "INSERT OR IGNORE INTO users (id, email) VALUES (?, ?)"),
    (
        "dashboard",
        "SELECT DATE(timestamp) AS day, COUNT(*) AS n, GROUP_CONCAT(action, '|') AS actions \
         FROM audit_log WHERE timestamp > datetime('now', '-30 days') AND IFNULL(entity_type, '') != ? \
         GROUP BY DATE(timestamp) ORDER BY day",
    ),
    ("schema", "CREATE TABLE IF NOT EXISTS t (id TEXT PRIMARY KEY)"),
];

fn bench_translate(c: &mut Criterion) {
    let dialect = PostgresDialect::new().with_conflict_target("system_settings", ["category", "setting_key"]);
    let mut group = c.benchmark_group("translate");
    for (name, sql) in STATEMENTS {
        group.bench_function(*name, |b| b.iter(|| dialect.rewrite(black_box(sql))));
    }
    group.finish();
}

criterion_group!(benches, bench_translate);
criterion_main!(benches);
