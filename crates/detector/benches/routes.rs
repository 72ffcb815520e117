use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

use backrun_core::{DexLabel, Market, MintId};
use backrun_detector::MarketGraph;

/// Hub-and-spoke graph: every token trades against both USDC and SOL on
/// `venues` markets each
fn hub_graph(tokens: usize, venues: usize) -> MarketGraph {
    let mut graph = MarketGraph::new();
    for t in 0..tokens {
        let token = MintId::new(format!("T{}", t));
        for v in 0..venues {
            for hub in ["USDC", "SOL"] {
                graph.add_market(Arc::new(Market::new(
                    format!("{}-{}-{}", hub, t, v),
                    MintId::from(hub),
                    token.clone(),
                    DexLabel::Orca,
                )));
            }
        }
    }
    graph
}

fn bench_2hop_routes(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_2hop_routes");
    let (usdc, sol) = (MintId::from("USDC"), MintId::from("SOL"));

    for tokens in [10, 100, 1_000] {
        let graph = hub_graph(tokens, 3);

        group.bench_with_input(BenchmarkId::new("cold", tokens), &graph, |b, graph| {
            b.iter(|| {
                graph.clear_route_cache();
                black_box(graph.get_2hop_routes(&usdc, &sol))
            })
        });

        group.bench_with_input(BenchmarkId::new("cached", tokens), &graph, |b, graph| {
            b.iter(|| black_box(graph.get_2hop_routes(&usdc, &sol)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_2hop_routes);
criterion_main!(benches);
