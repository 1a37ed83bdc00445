use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, SamplingMode, Throughput};
use serde_json::{json, Map, Value};

use hfy_gate::allowlist::email_digest;
use hfy_gate::client::FeatureRules;
use hfy_gate::gateway::mint_session;
use hfy_gate::search::SearchIndex;

fn build_index(n: usize) -> SearchIndex {
    let first = ["alice", "albert", "bob", "carol", "edith", "frank", "grace", "henry"];
    let last = ["harrison", "smith", "jones", "walker"];
    let mut people = Vec::with_capacity(n);
    let mut docs = Vec::with_capacity(n);
    for i in 0..n {
        let name = format!("{} {}", first[i % first.len()], last[(i / first.len()) % last.len()]);
        let id = format!("I{:05}", i);
        people.push(json!({"grampsId": id, "displayName": name, "lifespanSummary": "1900-1980"}));
        docs.push(json!({"grampsId": id, "searchText": format!("{} {}", name, 1900 + (i % 100))}));
    }
    SearchIndex::from_parts(&Value::Array(people), &json!({"documents": docs}), "/person/?id=")
        .unwrap_or_default()
}

fn bench_gateway(c: &mut Criterion) {
    let mut group = c.benchmark_group("gateway");
    group.sample_size(50);

    // One digest per request
    group.bench_function("email_digest", |b| {
        b.iter(|| criterion::black_box(email_digest("bench-secret", " Alice@Example.com ").ok()));
    });

    // Token generation and timestamps
    group.bench_function("mint_session", |b| {
        b.iter(|| criterion::black_box(mint_session(900).ok()));
    });
    group.finish();
}

fn bench_visibility(c: &mut Criterion) {
    let rules = FeatureRules::site_defaults();
    let states: Vec<Map<String, Value>> = [
        json!({"loggedIn": true, "hasRecord": true, "personRecordId": "I0111"}),
        json!({"loggedIn": false, "hasRecord": false}),
        json!({}),
    ]
    .into_iter()
    .filter_map(|v| match v { Value::Object(m) => Some(m), _ => None })
    .collect();
    let features: Vec<String> = rules.keys().cloned().collect();

    c.bench_function("visibility_all_features", |b| {
        b.iter(|| {
            let mut shown = 0usize;
            for s in &states {
                for f in &features {
                    if rules.should_show(f, s) { shown += 1; }
                }
            }
            criterion::black_box(shown);
        });
    });
}

fn bench_search(c: &mut Criterion) {
    let ns = [1_000usize, 10_000usize];
    let mut group = c.benchmark_group("person_search");
    group.sampling_mode(SamplingMode::Flat);
    group.sample_size(20);

    for &n in &ns {
        let index = build_index(n);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("autocomplete", n.to_string()), &n, |b, _| {
            b.iter(|| criterion::black_box(index.autocomplete("al harrison")));
        });
        group.bench_with_input(BenchmarkId::new("full_results", n.to_string()), &n, |b, _| {
            b.iter(|| criterion::black_box(index.search("grace", None)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_gateway, bench_visibility, bench_search);
criterion_main!(benches);
