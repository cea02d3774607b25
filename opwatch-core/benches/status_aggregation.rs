use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use opwatch_core::{
    reason_summary, worst, Cache, CachePoller, FetchError, MonitorStatus, NodePollState,
    PollNode, PollingService, StatusContribution,
};

struct BenchNode {
    key: String,
    caches: Vec<Cache<MonitorStatus>>,
    state: NodePollState,
}

impl BenchNode {
    fn new(key: String, cache_count: usize) -> Self {
        let caches = (0..cache_count)
            .map(|i| {
                let status = if i % 7 == 0 {
                    MonitorStatus::Warning
                } else {
                    MonitorStatus::Good
                };
                Cache::builder(format!("cache-{}", i))
                    .owner("Bench", key.clone())
                    .interpret(|s: &MonitorStatus| {
                        StatusContribution::with_reason(*s, "threshold crossed")
                    })
                    .build(move || async move { Ok::<_, FetchError>(status) })
            })
            .collect();
        Self {
            key,
            caches,
            state: NodePollState::default(),
        }
    }
}

impl PollNode for BenchNode {
    fn node_type(&self) -> &str {
        "Bench"
    }

    fn unique_key(&self) -> &str {
        &self.key
    }

    fn data_pollers(&self) -> Vec<&dyn CachePoller> {
        self.caches.iter().map(|c| c as &dyn CachePoller).collect()
    }

    fn poll_state(&self) -> &NodePollState {
        &self.state
    }
}

/// Benchmark worst() and reason_summary() over plain contributions
fn bench_worst_and_reasons(c: &mut Criterion) {
    let mut group = c.benchmark_group("worst_and_reasons");

    for count in [10, 100, 1000].iter() {
        let parts: Vec<StatusContribution> = (0..*count)
            .map(|i| match i % 5 {
                0 => StatusContribution::with_reason(MonitorStatus::Warning, format!("lag {}", i % 3)),
                1 => StatusContribution::new(MonitorStatus::Unknown),
                _ => StatusContribution::good(),
            })
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, _| {
            b.iter(|| {
                black_box(worst(parts.iter().map(|p| p.status)));
                black_box(reason_summary(&parts));
            });
        });
    }
    group.finish();
}

/// Benchmark node_status() on a polled node with varying cache counts
fn bench_node_status(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("node_status");

    for cache_count in [1, 10, 50].iter() {
        let node = BenchNode::new("bench-01".to_string(), *cache_count);
        runtime.block_on(node.poll_all(true));

        group.bench_with_input(
            BenchmarkId::from_parameter(cache_count),
            cache_count,
            |b, _| {
                b.iter(|| {
                    black_box(node.node_status());
                });
            },
        );
    }
    group.finish();
}

/// Benchmark snapshot() across a registry of polled nodes
fn bench_snapshot(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("registry_snapshot");

    for node_count in [10, 100].iter() {
        let service = PollingService::new();
        for i in 0..*node_count {
            let node = Arc::new(BenchNode::new(format!("node-{}", i), 5));
            runtime.block_on(node.poll_all(true));
            service.try_register(node);
        }

        group.bench_with_input(
            BenchmarkId::from_parameter(node_count),
            node_count,
            |b, _| {
                b.iter(|| {
                    black_box(service.snapshot());
                });
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_worst_and_reasons,
    bench_node_status,
    bench_snapshot
);
criterion_main!(benches);
