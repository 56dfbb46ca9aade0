//! End-to-end rendering tests: normalize, colorize and mask a source raster.

use renderer::{colorize, normalize, ColorRamp, ScaleParams, ValidityMask};
use test_utils::{
    bbox, create_grid_with_markers, create_pressure_grid, geographic_raster, global_raster,
    PRESSURE_CLAMP, SAMPLE_COLORMAP, TWO_STOP_COLORMAP,
};
use tile_common::{Raster, RgbaRaster};

fn render(raster: &Raster, ramp: &ColorRamp, params: &ScaleParams) -> RgbaRaster {
    let normalized = normalize(raster, 0, params).unwrap();
    let colored = colorize(normalized, &ramp.lut());
    ValidityMask::from_raster(raster).apply(colored).unwrap()
}

#[test]
fn test_nodata_cells_render_transparent() {
    let data = create_grid_with_markers(4, 4, 50.0, -9999.0, &[(0, 0), (3, 2)]);
    let raster = geographic_raster(data, 4, 4, bbox::SMALL_NE, Some(-9999.0));
    let ramp = ColorRamp::parse(TWO_STOP_COLORMAP).unwrap();

    let rgba = render(&raster, &ramp, &ScaleParams::new(0.0, 100.0));

    assert_eq!(rgba.pixel(0, 0), [0, 0, 0, 0]);
    assert_eq!(rgba.pixel(3, 2), [0, 0, 0, 0]);
    assert_eq!(rgba.opaque_count(), 14);
    assert_eq!(rgba.pixel(1, 0)[3], 255);
}

#[test]
fn test_values_above_clamp_render_as_clamp_max() {
    let raster = global_raster(vec![100.0, 200.0, 1000.0, 100.0], 2, 2);
    let ramp = ColorRamp::parse(SAMPLE_COLORMAP).unwrap();

    let rgba = render(&raster, &ramp, &ScaleParams::new(0.0, 100.0));

    assert_eq!(rgba.pixel(0, 0), rgba.pixel(1, 0));
    assert_eq!(rgba.pixel(0, 0), rgba.pixel(0, 1));
    assert_eq!(rgba.pixel(0, 0), [215, 48, 39, 255]);
}

#[test]
fn test_nan_cell_masked_even_with_opaque_ramp() {
    let data = create_grid_with_markers(3, 3, 1024.0, f32::NAN, &[(1, 1)]);
    let raster = global_raster(data, 3, 3);
    // nv line would give the sentinel an opaque color if it were honored
    let ramp = ColorRamp::parse("nv 255 255 255 255\n1 0 0 255\n255 255 0 0\n").unwrap();
    let (vmin, vmax) = PRESSURE_CLAMP;

    let rgba = render(&raster, &ramp, &ScaleParams::new(vmin, vmax));

    assert_eq!(rgba.pixel(1, 1), [0, 0, 0, 0]);
    assert_eq!(rgba.opaque_count(), 8);
}

#[test]
fn test_georeferencing_carried_through() {
    let raster = geographic_raster(create_pressure_grid(8, 4), 8, 4, bbox::EUROPE, None);
    let ramp = ColorRamp::parse(SAMPLE_COLORMAP).unwrap();
    let (vmin, vmax) = PRESSURE_CLAMP;

    let rgba = render(&raster, &ramp, &ScaleParams::new(vmin, vmax));

    assert_eq!(rgba.transform, *raster.transform());
    assert_eq!(rgba.crs, raster.crs());
    assert_eq!(rgba.opaque_count(), 32);
}

#[test]
fn test_pressure_gradient_uses_ramp_ends() {
    let raster = global_raster(create_pressure_grid(64, 64), 64, 64);
    let ramp = ColorRamp::parse(SAMPLE_COLORMAP).unwrap();
    let (vmin, vmax) = PRESSURE_CLAMP;

    let rgba = render(&raster, &ramp, &ScaleParams::new(vmin, vmax));

    // Top-left is below the clamp range, bottom-right above it
    assert_eq!(rgba.pixel(0, 0), [49, 54, 149, 255]);
    assert_eq!(rgba.pixel(63, 63), [215, 48, 39, 255]);
}
