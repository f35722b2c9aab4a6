//! Build and query throughput for [`lumencore::bvh::IndexBvh`] against a
//! synthetic point cloud, standing in for the direct-lighting sampling
//! cache's entry index at a representative scene scale.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::Vec3;
use lumencore::bvh::{Bounded, IndexBvh, SpatialEntry};
use lumencore::math::Bounds3;

struct Entry(Vec3, Vec3, bool);

impl Bounded for Entry {
    fn bounds(&self) -> Bounds3 {
        Bounds3::point(self.0)
    }
}

impl SpatialEntry for Entry {
    fn point(&self) -> Vec3 {
        self.0
    }
    fn normal(&self) -> Vec3 {
        self.1
    }
    fn is_volume(&self) -> bool {
        self.2
    }
}

fn scattered_entries(n: usize) -> Vec<Entry> {
    (0..n)
        .map(|i| {
            let x = (i as f32 * 0.37).sin() * 100.0;
            let y = (i as f32 * 1.7).cos() * 100.0;
            let z = (i as f32 * 0.11).sin() * 100.0;
            Entry(Vec3::new(x, y, z), Vec3::Y, i % 5 == 0)
        })
        .collect()
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("bvh_build");
    for &n in &[256usize, 4096, 65536] {
        let entries = scattered_entries(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &entries, |b, entries| {
            b.iter(|| IndexBvh::build(entries));
        });
    }
    group.finish();
}

fn bench_nearest(c: &mut Criterion) {
    let mut group = c.benchmark_group("bvh_nearest");
    for &n in &[256usize, 4096, 65536] {
        let entries = scattered_entries(n);
        let bvh = IndexBvh::build(&entries);
        group.bench_with_input(BenchmarkId::from_parameter(n), &(bvh, entries), |b, (bvh, entries)| {
            b.iter(|| bvh.nearest(entries, Vec3::new(5.0, 5.0, 5.0), Vec3::Y, false, std::f32::consts::FRAC_PI_2));
        });
    }
    group.finish();
}

fn bench_within_radius(c: &mut Criterion) {
    let mut group = c.benchmark_group("bvh_within_radius");
    for &n in &[256usize, 4096, 65536] {
        let entries = scattered_entries(n);
        let bvh = IndexBvh::build(&entries);
        group.bench_with_input(BenchmarkId::from_parameter(n), &(bvh, entries), |b, (bvh, entries)| {
            b.iter(|| bvh.within_radius(entries, Vec3::ZERO, Vec3::Y, false, 20.0, std::f32::consts::PI));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_build, bench_nearest, bench_within_radius);
criterion_main!(benches);
