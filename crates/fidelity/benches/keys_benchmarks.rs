//! Key discovery benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fidelity::KeyDiscoverer;

/// Rows where no single field is unique but fields 1 and 3 together are.
fn generate_sample(rows: usize, cols: usize) -> Vec<Vec<String>> {
    (0..rows)
        .map(|row| {
            (0..cols)
                .map(|col| match col {
                    0 => "CONST".to_string(),
                    1 => format!("{}", row / 10),
                    3 => format!("{}", row % 10),
                    _ => format!("v{}", (row + col) % 7),
                })
                .collect()
        })
        .collect()
}

fn bench_discover(c: &mut Criterion) {
    let mut group = c.benchmark_group("discover_keys");

    for rows in [100, 1_000, 10_000].iter() {
        let sample = generate_sample(*rows, 12);
        group.bench_with_input(BenchmarkId::new("rows", rows), &sample, |b, sample| {
            let discoverer = KeyDiscoverer::new([]);
            b.iter(|| black_box(discoverer.discover(sample).unwrap()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_discover);
criterion_main!(benches);
