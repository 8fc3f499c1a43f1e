//! Criterion micro-benchmarks for decoding one subdomain file.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use varcube_bench::reference_profile;
use varcube_core::Precision;
use varcube_record::{read_block_file, BlockSpec};
use varcube_test_utils::SyntheticRun;

fn spec(run: &SyntheticRun) -> BlockSpec {
    let d = run.proc_dims(0, 0, 0);
    BlockSpec {
        precision: run.precision,
        mx: d.mx,
        my: d.my,
        mz: d.mz,
        cells: run.layout().cells(&d),
        total_vars: run.total_vars(),
        shear: false,
        read_persist: false,
    }
}

/// Benchmark: decode a 22³ × 8 double-precision block.
fn bench_decode_double(c: &mut Criterion) {
    let run = reference_profile(Precision::Double);
    let dir = tempfile::tempdir().unwrap();
    run.write(dir.path()).unwrap();
    let path = dir.path().join("proc0").join("var.dat");
    let spec = spec(&run);

    c.bench_function("record_decode_double_f64", |b| {
        b.iter(|| {
            let block = read_block_file::<f64>(&path, &spec).unwrap();
            black_box(&block);
        });
    });
}

/// Benchmark: decode a single-precision block, widening to f64 and
/// keeping f32.
fn bench_decode_single(c: &mut Criterion) {
    let run = reference_profile(Precision::Single);
    let dir = tempfile::tempdir().unwrap();
    run.write(dir.path()).unwrap();
    let path = dir.path().join("proc0").join("var.dat");
    let spec = spec(&run);

    c.bench_function("record_decode_single_f64", |b| {
        b.iter(|| black_box(read_block_file::<f64>(&path, &spec).unwrap()));
    });
    c.bench_function("record_decode_single_f32", |b| {
        b.iter(|| black_box(read_block_file::<f32>(&path, &spec).unwrap()));
    });
}

criterion_group!(benches, bench_decode_double, bench_decode_single);
criterion_main!(benches);
