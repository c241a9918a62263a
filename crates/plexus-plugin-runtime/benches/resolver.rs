// Performance benchmarks for dependency resolution and batch startup
//
// Run with: cargo bench -p plexus-plugin-runtime --bench resolver

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use plexus_plugin_api::testing::MockPlugin;
use plexus_plugin_runtime::{resolve_order, PluginDescriptor, PluginManager};
use std::sync::Arc;
use tokio::runtime::Runtime;

// Layered graph: every plugin depends on up to three plugins of the layer below
fn layered_graph(size: usize) -> Vec<PluginDescriptor> {
    let width = 16;
    (0..size)
        .map(|i| {
            let layer_start = (i / width) * width;
            let deps: Vec<String> = if layer_start == 0 {
                Vec::new()
            } else {
                (0..3)
                    .map(|k| format!("p{}", layer_start - width + (i + k) % width))
                    .collect()
            };
            PluginDescriptor::new(format!("p{i}"), "1.0.0")
                .depends_on(&deps)
                .unwrap()
        })
        .rev()
        .collect()
}

fn benchmark_resolve_order(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_order");

    for size in [64, 512, 4096].iter() {
        let graph = layered_graph(*size);
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &graph, |b, graph| {
            b.iter(|| resolve_order(black_box(graph)).unwrap());
        });
    }

    group.finish();
}

fn benchmark_start_stop_all(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let graph = layered_graph(256);

    let mut group = c.benchmark_group("lifecycle");
    group.throughput(Throughput::Elements(graph.len() as u64));

    group.bench_function("start_stop_all_256", |b| {
        b.to_async(&rt).iter(|| async {
            let manager = PluginManager::default();
            for descriptor in &graph {
                manager
                    .register(descriptor.clone(), Arc::new(MockPlugin::new()))
                    .unwrap();
            }
            manager.start_all().await.unwrap();
            manager.stop_all().await.unwrap();
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_resolve_order, benchmark_start_stop_all);
criterion_main!(benches);
