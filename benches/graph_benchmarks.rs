use criterion::{black_box, criterion_group, criterion_main, Criterion};

use kanal::{AudioGraph, NodeKind, Output, Sine};

pub fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("AudioGraph.render()", |b| {
        let mut graph = AudioGraph::new(48_000, 256);
        let output = graph.add_node(NodeKind::Output(Output::new(2)));
        graph.set_output(output).unwrap();
        let sine = graph.add_node(NodeKind::Sine(Sine::new(480.0)));
        graph.connect(sine, 0, output, 0).unwrap();

        b.iter(|| graph.render(black_box(256)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
