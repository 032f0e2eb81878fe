use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use maglith::{
    forward::SphereSource,
    invert::{
        euler::{EulerSettingsBuilder, StructuralIndex, euler_deconvolution},
        mesh::MeshSpecBuilder,
        tikhonov::{IdentityOperator, InversionSettings, invert_susceptibility},
    },
    survey::FieldDirection,
};
use std::hint::black_box;

const GRID: usize = 50;

fn benchmark_euler(c: &mut Criterion) {
    let source = SphereSource::new(0.0, 0.0, 100.0, 50.0, 0.05);
    let direction = FieldDirection::new(45.0, 0.0);
    let series =
        source.synthetic_survey(&direction, (-500.0, 500.0), (-500.0, 500.0), (GRID, GRID));

    let settings = EulerSettingsBuilder::default()
        .structural_index(StructuralIndex::Sphere)
        .window(5)
        .build()
        .unwrap();

    let mut group = c.benchmark_group("euler_bench");

    group.throughput(Throughput::Elements((GRID * GRID) as u64));
    group.bench_function("euler_windows_f64", |b| {
        b.iter(|| black_box(euler_deconvolution(&series, &settings).unwrap()))
    });

    group.finish();
}

fn benchmark_kernel_assembly(c: &mut Criterion) {
    let source = SphereSource::new(0.0, 0.0, 150.0, 40.0, 0.03);
    let direction = FieldDirection::new(45.0, 0.0);
    let series =
        source.synthetic_survey(&direction, (-500.0, 500.0), (-500.0, 500.0), (20, 20));

    let spec = MeshSpecBuilder::default()
        .nx(10_usize)
        .ny(10_usize)
        .nz(5_usize)
        .alpha(1.0)
        .build()
        .unwrap();

    let mut group = c.benchmark_group("kernel_bench");

    group.throughput(Throughput::Elements((400 * 500) as u64));
    group.bench_function("sensitivity_inversion_f64", |b| {
        b.iter(|| {
            black_box(
                invert_susceptibility(
                    &series,
                    &direction,
                    &spec,
                    &IdentityOperator,
                    &InversionSettings::default(),
                )
                .unwrap(),
            )
        })
    });

    group.finish();
}

criterion_group!(benches, benchmark_euler, benchmark_kernel_assembly);
criterion_main!(benches);
