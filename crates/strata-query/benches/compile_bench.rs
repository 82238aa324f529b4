//! Benchmarks for query compilation and execution.
//!
//! Run with: `cargo bench -p strata-query`

#![allow(missing_docs)]

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use strata_core::{Attribute, EntityType, HostType, ModelCatalog, Navigation, Value};
use strata_query::exec::{row, MemoryDataSource};
use strata_query::parser::CapturedQuery;
use strata_query::{CompilerConfig, Dialect, Executor, Query, QueryCompiler, TranslationCache};

fn model() -> ModelCatalog {
    ModelCatalog::new("main")
        .with_entity(
            EntityType::new("User", "users")
                .with_key("id")
                .with_attribute(Attribute::primitive("id", "id", HostType::Int))
                .with_attribute(Attribute::primitive("name", "name", HostType::String))
                .with_attribute(Attribute::primitive("age", "age", HostType::Int))
                .with_navigation(Navigation::reference("team", "Team", "team_id", "id").optional()),
        )
        .with_entity(
            EntityType::new("Team", "teams")
                .with_key("id")
                .with_attribute(Attribute::primitive("id", "id", HostType::Int))
                .with_attribute(Attribute::primitive("name", "name", HostType::String)),
        )
}

/// A chain of `depth` filters followed by a page and a projection.
fn chained(model: &ModelCatalog, depth: usize) -> Query {
    (0..depth)
        .fold(CapturedQuery::new("User"), |q, i| q.call("where", vec![format!("u => u.age > {i} OR u.team.name = 't{i}'").as_str().into()]))
        .call("order_by", vec!["u => u.id".into()])
        .call("skip", vec![10.into()])
        .call("take", vec![20.into()])
        .call("select", vec!["u => u.name".into()])
        .parse(model)
        .expect("parse")
}

fn users(count: i64) -> MemoryDataSource {
    MemoryDataSource::new()
        .with_table(
            "users",
            (0..count).map(|id| {
                row([
                    ("id", Value::Int(id)),
                    ("name", Value::from(format!("u{id}"))),
                    ("age", Value::Int(id % 90)),
                    ("team_id", Value::Int(id % 4)),
                ])
            }),
        )
        .with_table("teams", (0..4).map(|id| row([("id", Value::Int(id)), ("name", Value::from(format!("t{id}")))])))
}

/// Benchmark compilation as the chain grows.
fn bench_compile_depth(c: &mut Criterion) {
    let model = model();
    let compiler = QueryCompiler::new(&model, CompilerConfig::new());
    let mut group = c.benchmark_group("compile_depth");

    for depth in [1, 4, 16] {
        let query = chained(&model, depth);
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |bench, _| {
            bench.iter(|| compiler.compile(black_box(&query)));
        });
    }

    group.finish();
}

/// Benchmark pagination rendering per dialect.
fn bench_dialects(c: &mut Criterion) {
    let model = model();
    let query = chained(&model, 2);
    let mut group = c.benchmark_group("compile_dialect");

    for dialect in [Dialect::PostgreSql, Dialect::SqlServer] {
        let compiler = QueryCompiler::new(&model, CompilerConfig::new().dialect(dialect));
        group.bench_function(dialect.name(), |bench| {
            bench.iter(|| compiler.compile(black_box(&query)).map(|compiled| compiled.statement.to_string()));
        });
    }

    group.finish();
}

/// Benchmark the effect of a shared translation cache.
fn bench_translation_cache(c: &mut Criterion) {
    let model = model();
    let query = chained(&model, 8);
    let mut group = c.benchmark_group("translation_cache");

    let cold = QueryCompiler::new(&model, CompilerConfig::new());
    group.bench_function("without", |bench| bench.iter(|| cold.compile(black_box(&query))));

    let warm = QueryCompiler::new(&model, CompilerConfig::new().translation_cache(Arc::new(TranslationCache::new())));
    group.bench_function("with", |bench| bench.iter(|| warm.compile(black_box(&query))));

    group.finish();
}

/// Benchmark end-to-end execution against in-memory tables.
fn bench_execute(c: &mut Criterion) {
    let model = model();
    let query = chained(&model, 2);
    let mut group = c.benchmark_group("execute");

    for count in [100, 1_000, 10_000] {
        let executor = Executor::new(&model, CompilerConfig::new()).with_source("main", Arc::new(users(count)));
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |bench, _| {
            bench.iter(|| executor.execute(black_box(&query)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_compile_depth, bench_dialects, bench_translation_cache, bench_execute);

criterion_main!(benches);
