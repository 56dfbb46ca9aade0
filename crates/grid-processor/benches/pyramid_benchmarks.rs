//! Benchmarks for reprojection and pyramid building.
//!
//! Run with: cargo bench --package grid-processor --bench pyramid_benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use grid_processor::{
    combine_children, DownsampleMethod, NativeWarper, PyramidBuilder, Resampling, WarpRequest,
    Warper,
};
use projection::{resolution, SAFE_BOUNDS_4326};
use tile_common::{CrsCode, GeoTransform, RgbaRaster};

/// Global geographic raster with a smooth color gradient.
fn gradient_raster(width: usize, height: usize) -> RgbaRaster {
    let b = SAFE_BOUNDS_4326;
    let gt = GeoTransform::north_up(
        b.min_x,
        b.max_y,
        b.width() / width as f64,
        -b.height() / height as f64,
    );
    let mut raster = RgbaRaster::transparent(width, height, gt, Some(CrsCode::Epsg4326));
    for row in 0..height {
        for col in 0..width {
            let r = (col * 255 / width) as u8;
            let g = (row * 255 / height) as u8;
            raster.set_pixel(col, row, [r, g, 128, 255]);
        }
    }
    raster
}

// =============================================================================
// REPROJECTION BENCHMARKS
// =============================================================================

fn bench_reproject(c: &mut Criterion) {
    let mut group = c.benchmark_group("reproject");
    group.sample_size(20);

    for &(z, resampling) in &[
        (2u32, Resampling::Nearest),
        (3, Resampling::Nearest),
        (3, Resampling::Bilinear),
    ] {
        let source = gradient_raster(720, 340);
        let request = WarpRequest::to_mercator()
            .with_resolution(resolution(z, 256))
            .with_resampling(resampling);
        let label = format!("z{}_{}", z, resampling);

        group.bench_with_input(BenchmarkId::from_parameter(label), &request, |b, req| {
            b.iter(|| black_box(NativeWarper.reproject(source.clone(), req).unwrap()));
        });
    }

    group.finish();
}

// =============================================================================
// PYRAMID BENCHMARKS
// =============================================================================

fn bench_pyramid_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("pyramid_build");
    group.sample_size(10);

    for z_max in [2u32, 3, 4] {
        let request = WarpRequest::to_mercator().with_resolution(resolution(z_max, 256));
        let mercator = NativeWarper
            .reproject(gradient_raster(720, 340), &request)
            .unwrap();
        let builder = PyramidBuilder::default();

        group.throughput(Throughput::Elements(mercator.opaque_count() as u64));
        group.bench_with_input(BenchmarkId::new("z0_to", z_max), &mercator, |b, m| {
            b.iter(|| black_box(builder.build(m, 0, z_max as i32).unwrap()));
        });
    }

    group.finish();
}

fn bench_combine_children(c: &mut Criterion) {
    let mut group = c.benchmark_group("combine_children");

    let child: Vec<u8> = (0..256 * 256)
        .flat_map(|i| [(i % 251) as u8, (i % 13) as u8, 77, if i % 5 == 0 { 0 } else { 255 }])
        .collect();

    let child = child.as_slice();

    for method in [DownsampleMethod::Average, DownsampleMethod::Nearest] {
        group.bench_function(method.to_string(), |b| {
            b.iter(|| {
                black_box(combine_children(
                    [Some(child); 4],
                    256,
                    method,
                ))
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_reproject,
    bench_pyramid_build,
    bench_combine_children
);
criterion_main!(benches);
