use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use avframe_3d::{linalg, Transform};

// reference: apply the transform point by point
fn transform_points_naive(transform: &Transform, src_points: &[[f64; 3]]) -> Vec<[f64; 3]> {
    src_points.iter().map(|p| transform.apply(p)).collect()
}

fn bench_transforms(c: &mut Criterion) {
    let mut group = c.benchmark_group("transform_points");

    let transform = Transform::from_axis_angle(&[0.3, -0.2, 1.0], 0.8, [1.0, -2.0, 0.5])
        .expect("valid rotation");

    for num_points in [1_000, 10_000, 100_000].iter() {
        group.throughput(criterion::Throughput::Elements(*num_points as u64));
        let parameter_string = format!("{}", num_points);

        let src_points = (0..*num_points)
            .map(|i| {
                let x = i as f64;
                [x.sin() * 20.0, x.cos() * 20.0, (x * 0.01) % 3.0]
            })
            .collect::<Vec<_>>();
        let mut dst_points = vec![[0.0; 3]; src_points.len()];

        group.bench_with_input(
            BenchmarkId::new("naive", &parameter_string),
            &src_points,
            |b, src| b.iter(|| black_box(transform_points_naive(&transform, src))),
        );

        group.bench_with_input(
            BenchmarkId::new("faer_matmul", &parameter_string),
            &src_points,
            |b, src| {
                b.iter(|| {
                    linalg::transform_points(
                        black_box(src),
                        transform.rotation(),
                        transform.translation(),
                        &mut dst_points,
                    )
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_transforms);
criterion_main!(benches);
