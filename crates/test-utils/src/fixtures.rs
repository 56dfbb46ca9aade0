//! Common test fixtures: colormaps, bounding boxes and clamp ranges.

/// Clamp range of the sea-level-pressure product (hPa).
pub const PRESSURE_CLAMP: (f64, f64) = (1021.5, 1027.5);

/// Diverging blue-to-red ramp over the normalized 1..=255 range.
pub const SAMPLE_COLORMAP: &str = "\
# pressure anomaly ramp
1    49  54  149
37   69  117 180
73   116 173 209
109  224 243 248
146  254 224 144
182  253 174 97
218  244 109 67
255  215 48  39
nv   0   0   0   0
";

/// Two-stop ramp: low values blue, high values red.
pub const TWO_STOP_COLORMAP: &str = "1 0 0 255\n255 255 0 0\n";

/// Common bounding box definitions (EPSG:4326 degrees).
pub mod bbox {
    use tile_common::BoundingBox;

    /// Whole globe, including the polar caps mercator can not show.
    pub const GLOBAL: BoundingBox = BoundingBox {
        min_x: -180.0,
        min_y: -90.0,
        max_x: 180.0,
        max_y: 90.0,
    };

    /// Europe
    pub const EUROPE: BoundingBox = BoundingBox {
        min_x: -15.0,
        min_y: 35.0,
        max_x: 45.0,
        max_y: 72.0,
    };

    /// Small patch north-east of the origin, inside a single z1 tile.
    pub const SMALL_NE: BoundingBox = BoundingBox {
        min_x: 10.0,
        min_y: 10.0,
        max_x: 30.0,
        max_y: 30.0,
    };

    /// Arctic cap entirely north of the mercator limit.
    pub const ARCTIC_CAP: BoundingBox = BoundingBox {
        min_x: -180.0,
        min_y: 86.0,
        max_x: 180.0,
        max_y: 90.0,
    };
}
