//! Safe-bounds clipping and reprojection of RGBA rasters to web mercator.
//!
//! The geometric backend sits behind the [`Warper`] trait. [`NativeWarper`]
//! is the pure-Rust implementation: it inverse-projects every output pixel
//! centre and samples the source there.

use projection::{
    meters_to_lonlat, project_bounds, MAX_LATITUDE, ORIGIN_SHIFT, SAFE_BOUNDS_4326,
    WORLD_BOUNDS_3857,
};
use rayon::prelude::*;
use tile_common::{BoundingBox, CrsCode, GeoTransform, RgbaRaster, TilerError, TilerResult};
use tracing::debug;

use super::interpolation::sample;
use crate::types::Resampling;

/// Upper bound on output pixels of a single warp.
const MAX_OUTPUT_PIXELS: usize = 1 << 30;

/// Parameters of a clip + reprojection.
#[derive(Debug, Clone, PartialEq)]
pub struct WarpRequest {
    pub target_crs: CrsCode,
    /// Clip window in EPSG:4326 degrees. `None` means the mercator-safe band.
    pub bounds: Option<BoundingBox>,
    pub resampling: Resampling,
    /// Output pixel size in meters, snapped to the global mercator pixel grid.
    /// `None` keeps the source width and derives square pixels.
    pub resolution: Option<f64>,
}

impl WarpRequest {
    /// Clip to the mercator-safe band and warp to EPSG:3857 with nearest
    /// neighbour sampling.
    pub fn to_mercator() -> Self {
        Self {
            target_crs: CrsCode::Epsg3857,
            bounds: None,
            resampling: Resampling::Nearest,
            resolution: None,
        }
    }

    pub fn with_resolution(mut self, resolution: f64) -> Self {
        self.resolution = Some(resolution);
        self
    }

    pub fn with_resampling(mut self, resampling: Resampling) -> Self {
        self.resampling = resampling;
        self
    }

    pub fn with_bounds(mut self, bounds: BoundingBox) -> Self {
        self.bounds = Some(bounds);
        self
    }

    fn clip_bounds_4326(&self) -> BoundingBox {
        self.bounds.unwrap_or(SAFE_BOUNDS_4326)
    }
}

/// Geometric warp backend.
pub trait Warper: Send + Sync {
    /// Clip `raster` to the request bounds and resample it into the target CRS.
    fn reproject(&self, raster: RgbaRaster, request: &WarpRequest) -> TilerResult<RgbaRaster>;

    /// Short name for logging.
    fn name(&self) -> &'static str;
}

/// Keep the pixels whose centres lie inside `bounds` (edges inclusive).
///
/// This is a nearest-neighbour window copy: pixel values are untouched and
/// the transform is shifted to the window origin. The raster must be north-up
/// and `bounds` expressed in the raster's own CRS.
pub fn clip_to_bounds(raster: RgbaRaster, bounds: &BoundingBox) -> TilerResult<RgbaRaster> {
    let gt = raster.transform;
    if !gt.is_north_up() {
        return Err(TilerError::Reprojection(
            "source transform is rotated or not north-up".to_string(),
        ));
    }

    let cols: Vec<usize> = (0..raster.width)
        .filter(|&c| {
            let (x, _) = gt.pixel_center(c, 0);
            x >= bounds.min_x && x <= bounds.max_x
        })
        .collect();
    let rows: Vec<usize> = (0..raster.height)
        .filter(|&r| {
            let (_, y) = gt.pixel_center(0, r);
            y >= bounds.min_y && y <= bounds.max_y
        })
        .collect();

    let (col0, col1) = match (cols.first(), cols.last()) {
        (Some(&a), Some(&b)) => (a, b),
        _ => return Err(empty_extent(&raster, bounds)),
    };
    let (row0, row1) = match (rows.first(), rows.last()) {
        (Some(&a), Some(&b)) => (a, b),
        _ => return Err(empty_extent(&raster, bounds)),
    };

    let width = col1 - col0 + 1;
    let height = row1 - row0 + 1;
    if width == raster.width && height == raster.height {
        return Ok(raster);
    }

    let mut pixels = Vec::with_capacity(width * height * 4);
    for row in row0..=row1 {
        let start = (row * raster.width + col0) * 4;
        pixels.extend_from_slice(&raster.pixels[start..start + width * 4]);
    }

    debug!(
        src_width = raster.width,
        src_height = raster.height,
        col_off = col0,
        row_off = row0,
        width,
        height,
        "Clipped raster to bounds"
    );

    RgbaRaster::new(width, height, pixels, gt.shifted(col0, row0), raster.crs)
}

fn empty_extent(raster: &RgbaRaster, bounds: &BoundingBox) -> TilerError {
    let extent = raster.bounds();
    TilerError::Reprojection(format!(
        "raster extent ({:.6}, {:.6}, {:.6}, {:.6}) has no pixel centres inside ({:.6}, {:.6}, {:.6}, {:.6})",
        extent.min_x,
        extent.min_y,
        extent.max_x,
        extent.max_y,
        bounds.min_x,
        bounds.min_y,
        bounds.max_x,
        bounds.max_y
    ))
}

/// Pure-Rust spherical mercator warper.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeWarper;

impl NativeWarper {
    pub fn new() -> Self {
        Self
    }
}

impl Warper for NativeWarper {
    fn reproject(&self, raster: RgbaRaster, request: &WarpRequest) -> TilerResult<RgbaRaster> {
        let source_crs = raster.crs.ok_or_else(|| {
            TilerError::Reprojection("source raster has no coordinate reference system".into())
        })?;
        if request.target_crs != CrsCode::Epsg3857 {
            return Err(TilerError::Reprojection(format!(
                "unsupported target CRS {}",
                request.target_crs
            )));
        }
        if !raster.transform.is_north_up() {
            return Err(TilerError::Reprojection(
                "source transform is rotated or not north-up".to_string(),
            ));
        }
        if let Some(res) = request.resolution {
            if !res.is_finite() || res <= 0.0 {
                return Err(TilerError::Reprojection(format!(
                    "target resolution {} is not a positive number",
                    res
                )));
            }
        }

        let clip_4326 = request.clip_bounds_4326();
        let clipped = match source_crs {
            CrsCode::Epsg4326 => clip_to_bounds(raster, &clip_4326)?,
            CrsCode::Epsg3857 => {
                let clip_3857 = project_bounds(&clip_4326).unwrap_or(WORLD_BOUNDS_3857);
                clip_to_bounds(raster, &clip_3857)?
            }
        };

        // Already on the requested mercator grid: the clip is all there is to do
        if source_crs == CrsCode::Epsg3857 {
            let gt = clipped.transform;
            let square = gt.pixel_width == -gt.pixel_height;
            let same_res = request.resolution.map_or(true, |r| r == gt.pixel_width);
            if square && same_res {
                return Ok(clipped);
            }
        }

        let extent = mercator_extent(&clipped, source_crs)?;
        let target = target_grid(&extent, clipped.width, request.resolution)?;

        debug!(
            warper = self.name(),
            source_crs = %source_crs,
            src_width = clipped.width,
            src_height = clipped.height,
            dst_width = target.width,
            dst_height = target.height,
            resolution = target.transform.pixel_width,
            resampling = %request.resampling,
            "Warping raster to EPSG:3857"
        );

        Ok(warp(&clipped, source_crs, &target, request.resampling))
    }

    fn name(&self) -> &'static str {
        "native"
    }
}

/// Output grid description.
struct TargetGrid {
    width: usize,
    height: usize,
    transform: GeoTransform,
}

/// Extent of the clipped raster in mercator meters, limited to the world square.
fn mercator_extent(raster: &RgbaRaster, crs: CrsCode) -> TilerResult<BoundingBox> {
    let bounds = raster.bounds();
    let projected = match crs {
        CrsCode::Epsg3857 => bounds.intersection(&WORLD_BOUNDS_3857),
        CrsCode::Epsg4326 => {
            // Edge pixels may reach past the latitude limit by half a pixel
            let geo = BoundingBox::new(
                bounds.min_x.max(-180.0),
                bounds.min_y.max(-MAX_LATITUDE),
                bounds.max_x.min(180.0),
                bounds.max_y.min(MAX_LATITUDE),
            );
            if geo.is_valid() {
                project_bounds(&geo)
            } else {
                None
            }
        }
    };

    projected.filter(BoundingBox::is_valid).ok_or_else(|| {
        TilerError::Reprojection(format!(
            "clipped extent ({:.6}, {:.6}, {:.6}, {:.6}) is empty in EPSG:3857",
            bounds.min_x, bounds.min_y, bounds.max_x, bounds.max_y
        ))
    })
}

fn target_grid(
    extent: &BoundingBox,
    src_width: usize,
    resolution: Option<f64>,
) -> TilerResult<TargetGrid> {
    // Tolerance for extents that sit exactly on a grid line
    const EPS: f64 = 1e-9;

    let (width, height, origin_x, origin_y, res) = match resolution {
        Some(res) => {
            let world_px = (2.0 * ORIGIN_SHIFT / res - EPS).ceil();
            let col0 = ((extent.min_x + ORIGIN_SHIFT) / res + EPS).floor().max(0.0);
            let col1 = ((extent.max_x + ORIGIN_SHIFT) / res - EPS).ceil().min(world_px);
            let row0 = ((ORIGIN_SHIFT - extent.max_y) / res + EPS).floor().max(0.0);
            let row1 = ((ORIGIN_SHIFT - extent.min_y) / res - EPS).ceil().min(world_px);
            (
                (col1 - col0).max(0.0),
                (row1 - row0).max(0.0),
                -ORIGIN_SHIFT + col0 * res,
                ORIGIN_SHIFT - row0 * res,
                res,
            )
        }
        None => {
            let res = extent.width() / src_width as f64;
            (
                src_width as f64,
                (extent.height() / res - EPS).ceil().max(1.0),
                extent.min_x,
                extent.max_y,
                res,
            )
        }
    };

    let pixels = width * height;
    if !pixels.is_finite() || width < 1.0 || height < 1.0 || !res.is_finite() {
        return Err(TilerError::Reprojection(format!(
            "degenerate target grid {}x{} at {} m/pixel",
            width, height, res
        )));
    }
    if pixels > MAX_OUTPUT_PIXELS as f64 {
        return Err(TilerError::Reprojection(format!(
            "target grid {}x{} exceeds {} pixels",
            width, height, MAX_OUTPUT_PIXELS
        )));
    }

    Ok(TargetGrid {
        width: width as usize,
        height: height as usize,
        transform: GeoTransform::north_up(origin_x, origin_y, res, -res),
    })
}

fn warp(
    source: &RgbaRaster,
    source_crs: CrsCode,
    target: &TargetGrid,
    resampling: Resampling,
) -> RgbaRaster {
    let src_gt = source.transform;
    let dst_gt = target.transform;
    let mut pixels = vec![0u8; target.width * target.height * 4];

    pixels
        .par_chunks_mut(target.width * 4)
        .enumerate()
        .for_each(|(row, out_row)| {
            for (col, out) in out_row.chunks_exact_mut(4).enumerate() {
                let (x, y) = dst_gt.pixel_center(col, row);
                let (sx, sy) = match source_crs {
                    CrsCode::Epsg4326 => meters_to_lonlat(x, y),
                    CrsCode::Epsg3857 => (x, y),
                };
                let sampled = src_gt
                    .world_to_pixel(sx, sy)
                    .and_then(|(c, r)| sample(source, c, r, resampling));
                if let Some(px) = sampled {
                    out.copy_from_slice(&px);
                }
            }
        });

    RgbaRaster {
        width: target.width,
        height: target.height,
        pixels,
        transform: dst_gt,
        crs: Some(CrsCode::Epsg3857),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use projection::resolution;

    fn geo_raster(width: usize, height: usize, bounds: BoundingBox) -> RgbaRaster {
        let gt = GeoTransform::north_up(
            bounds.min_x,
            bounds.max_y,
            bounds.width() / width as f64,
            -bounds.height() / height as f64,
        );
        let mut raster = RgbaRaster::transparent(width, height, gt, Some(CrsCode::Epsg4326));
        for row in 0..height {
            for col in 0..width {
                raster.set_pixel(col, row, [col as u8, row as u8, 7, 255]);
            }
        }
        raster
    }

    #[test]
    fn test_clip_keeps_centres_on_limit() {
        // Pixel centres at 85.05112878 and 86.05112878 on the top two rows
        let top = MAX_LATITUDE + 1.5;
        let gt = GeoTransform::north_up(-180.0, top, 1.0, -1.0);
        let raster = RgbaRaster::transparent(360, 4, gt, Some(CrsCode::Epsg4326));

        let clipped = clip_to_bounds(raster, &SAFE_BOUNDS_4326).unwrap();
        assert_eq!(clipped.height, 3);
        assert_eq!(clipped.width, 360);
        let (_, y) = clipped.transform.pixel_center(0, 0);
        assert!((y - MAX_LATITUDE).abs() < 1e-9);
    }

    #[test]
    fn test_clip_is_window_copy() {
        let raster = geo_raster(4, 180, BoundingBox::new(-180.0, -90.0, 180.0, 90.0));
        let clipped = clip_to_bounds(raster.clone(), &SAFE_BOUNDS_4326).unwrap();

        // One-degree rows: centres 89.5 .. 85.5 are dropped at each pole
        assert_eq!(clipped.height, 170);
        assert_eq!(clipped.pixel(2, 0), raster.pixel(2, 5));
        assert_eq!(clipped.transform.origin_y, 85.0);
    }

    #[test]
    fn test_clip_does_not_pad() {
        let raster = geo_raster(10, 10, BoundingBox::new(0.0, 0.0, 10.0, 10.0));
        let clipped = clip_to_bounds(raster, &SAFE_BOUNDS_4326).unwrap();
        assert_eq!((clipped.width, clipped.height), (10, 10));
    }

    #[test]
    fn test_clip_entirely_outside() {
        let raster = geo_raster(4, 4, BoundingBox::new(-180.0, 86.0, 180.0, 90.0));
        let err = clip_to_bounds(raster, &SAFE_BOUNDS_4326).unwrap_err();
        assert!(matches!(err, TilerError::Reprojection(_)));
    }

    #[test]
    fn test_missing_crs_rejected() {
        let mut raster = geo_raster(4, 4, BoundingBox::new(0.0, 0.0, 4.0, 4.0));
        raster.crs = None;
        let err = NativeWarper.reproject(raster, &WarpRequest::to_mercator()).unwrap_err();
        assert!(matches!(err, TilerError::Reprojection(_)));
    }

    #[test]
    fn test_rotated_transform_rejected() {
        let mut raster = geo_raster(4, 4, BoundingBox::new(0.0, 0.0, 4.0, 4.0));
        raster.transform.rotation_x = 0.1;
        assert!(NativeWarper.reproject(raster, &WarpRequest::to_mercator()).is_err());
    }

    #[test]
    fn test_bad_resolution_rejected() {
        let raster = geo_raster(4, 4, BoundingBox::new(0.0, 0.0, 4.0, 4.0));
        let request = WarpRequest::to_mercator().with_resolution(0.0);
        assert!(NativeWarper.reproject(raster, &request).is_err());
    }

    #[test]
    fn test_warp_snaps_to_mercator_grid() {
        let raster = geo_raster(20, 20, BoundingBox::new(10.0, 10.0, 30.0, 30.0));
        let res = resolution(4, 256);
        let request = WarpRequest::to_mercator().with_resolution(res);

        let warped = NativeWarper.reproject(raster, &request).unwrap();
        assert_eq!(warped.crs, Some(CrsCode::Epsg3857));

        let gt = warped.transform;
        let col_off = (gt.origin_x + ORIGIN_SHIFT) / res;
        let row_off = (ORIGIN_SHIFT - gt.origin_y) / res;
        assert!((col_off - col_off.round()).abs() < 1e-6);
        assert!((row_off - row_off.round()).abs() < 1e-6);
        assert_eq!(gt.pixel_width, res);
        assert_eq!(gt.pixel_height, -res);
    }

    #[test]
    fn test_warp_preserves_colors_and_alpha() {
        let raster = geo_raster(20, 20, BoundingBox::new(10.0, 10.0, 30.0, 30.0));
        let warped = NativeWarper
            .reproject(raster, &WarpRequest::to_mercator().with_resolution(resolution(5, 256)))
            .unwrap();

        // Nearest sampling never invents colors
        for px in warped.pixels.chunks_exact(4) {
            assert!(px[3] == 0 || px[3] == 255);
            if px[3] == 255 {
                assert_eq!(px[2], 7);
                assert!(px[0] < 20 && px[1] < 20);
            }
        }
        assert!(warped.opaque_count() > 0);
    }

    #[test]
    fn test_mercator_source_only_clipped() {
        let res = resolution(2, 256);
        let gt = GeoTransform::north_up(-ORIGIN_SHIFT, ORIGIN_SHIFT, res, -res);
        let raster = RgbaRaster::transparent(1024, 1024, gt, Some(CrsCode::Epsg3857));

        let out = NativeWarper
            .reproject(raster.clone(), &WarpRequest::to_mercator().with_resolution(res))
            .unwrap();
        assert_eq!(out, raster);
    }

    #[test]
    fn test_warp_without_resolution_keeps_width() {
        let raster = geo_raster(36, 17, BoundingBox::new(-180.0, -85.0, 180.0, 85.0));
        let warped = NativeWarper.reproject(raster, &WarpRequest::to_mercator()).unwrap();
        assert_eq!(warped.width, 36);
        assert!(warped.height >= 30);
        assert_eq!(warped.transform.pixel_width, -warped.transform.pixel_height);
    }
}
