//! Benchmarks for clip-kernel core operations.
//!
//! Run with: cargo bench
//!
//! Results include 95% confidence intervals via Criterion.

use clip_kernel::core::binder::{bind, ParamShape};
use clip_kernel::core::config::KernelConfig;
use clip_kernel::core::entry::Entry;
use clip_kernel::core::parser::parse_pipeline;
use clip_kernel::core::registry::Registry;
use clip_kernel::core::resolver::merged_parameters;
use clip_kernel::core::types::Params;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use std::rc::Rc;

fn pipeline_tokens(steps: usize) -> Vec<String> {
    let mut tokens = Vec::new();
    for i in 0..steps {
        if i > 0 {
            tokens.push(",".to_string());
        }
        tokens.push(format!("s{i}:"));
        tokens.push("show".to_string());
        tokens.push(format!("--n={i}"));
        tokens.push("--tags,=a,b,c".to_string());
        tokens.push(format!("--prev=:s{}", i.saturating_sub(1)));
    }
    tokens
}

fn bench_parse_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_pipeline");
    for steps in [1, 10, 50] {
        let tokens = pipeline_tokens(steps);
        group.bench_with_input(BenchmarkId::from_parameter(steps), &tokens, |b, tokens| {
            b.iter(|| {
                let parsed = parse_pipeline(black_box(tokens)).unwrap();
                black_box(parsed);
            });
        });
    }
    group.finish();
}

fn bench_bind(c: &mut Criterion) {
    let shape = ParamShape::new()
        .required("alpha")
        .required("beta")
        .optional("gamma", json!(10))
        .extra_named();
    let mut named = Params::new();
    named.insert("beta".into(), json!("b"));
    named.insert("delta".into(), json!(420));
    let positional = vec![json!("a")];

    c.bench_function("bind_mixed", |b| {
        b.iter(|| {
            let bound = bind("op", &shape, black_box(&positional), black_box(&named)).unwrap();
            black_box(bound);
        });
    });
}

fn bench_merge_chain(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let reg = Registry::from_config(&KernelConfig::default(), dir.path());

    let mut group = c.benchmark_group("merged_parameters");
    for depth in [1, 8, 32] {
        let mut leaf: Option<Rc<Entry>> = None;
        for level in 0..depth {
            let mut params = Params::new();
            params.insert(format!("k{level}"), json!(level));
            params.insert("shared".into(), json!(level));
            let entry = Entry::at(dir.path().join(format!("e{level}")))
                .with_parameters(params)
                .with_parent(leaf.take());
            leaf = Some(Rc::new(entry));
        }
        let Some(leaf) = leaf else { continue };
        group.bench_with_input(BenchmarkId::from_parameter(depth), &leaf, |b, leaf| {
            b.iter(|| {
                let merged = merged_parameters(black_box(leaf), &reg).unwrap();
                black_box(merged);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_parse_pipeline, bench_bind, bench_merge_chain);
criterion_main!(benches);
