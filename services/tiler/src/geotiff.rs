//! GeoTIFF input and output.
//!
//! Reads chunky (pixel-interleaved) GeoTIFFs of any integer or float cell
//! type into a [`Raster`], and writes RGBA rasters back out as georeferenced
//! 8-bit GeoTIFFs.

use num_traits::ToPrimitive;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::{self, Gray32Float, Gray64Float, RGBA8};
use tiff::encoder::{TiffEncoder, TiffValue};
use tiff::tags::Tag;
use tiff::ColorType;
use tracing::{debug, warn};

use tile_common::{Band, CellType, CrsCode, GeoTransform, Raster, RgbaRaster};
use tile_common::{TilerError, TilerResult};

const PLANAR_CONFIGURATION: u16 = 284;
const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const MODEL_TRANSFORMATION: u16 = 34264;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

const GT_MODEL_TYPE_KEY: u16 = 1024;
const GT_RASTER_TYPE_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;

const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;
const RASTER_PIXEL_IS_POINT: u16 = 2;

fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

fn input_error(context: &str) -> impl Fn(tiff::TiffError) -> TilerError + '_ {
    move |e| TilerError::Input(format!("{}: {}", context, e))
}

fn output_error(context: &str) -> impl Fn(tiff::TiffError) -> TilerError + '_ {
    move |e| TilerError::Output(format!("{}: {}", context, e))
}

/// Read a GeoTIFF file into a multi-band raster.
pub fn read_geotiff(path: &Path) -> TilerResult<Raster> {
    let file = File::open(path)
        .map_err(|e| TilerError::Input(format!("cannot open {}: {}", path.display(), e)))?;

    decode_geotiff(BufReader::new(file)).map_err(|e| match e {
        TilerError::Input(msg) => TilerError::Input(format!("{}: {}", path.display(), msg)),
        other => other,
    })
}

/// Decode a GeoTIFF from any seekable source.
pub fn decode_geotiff<R: Read + Seek>(reader: R) -> TilerResult<Raster> {
    let mut decoder = Decoder::new(reader).map_err(input_error("not a TIFF file"))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(input_error("cannot read dimensions"))?;
    let (width, height) = (width as usize, height as usize);

    let samples = match decoder.colortype().map_err(input_error("cannot read color type"))? {
        ColorType::Gray(_) => 1,
        ColorType::GrayA(_) => 2,
        ColorType::RGB(_) => 3,
        ColorType::RGBA(_) | ColorType::CMYK(_) => 4,
        ColorType::CMYKA(_) => 5,
        ColorType::Multiband { num_samples, .. } => num_samples as usize,
        other => {
            return Err(TilerError::Input(format!(
                "unsupported TIFF color type {:?}",
                other
            )))
        }
    };

    if samples > 1 && decoder.get_tag_u32(tag(PLANAR_CONFIGURATION)).ok() == Some(2) {
        return Err(TilerError::Input(
            "planar (band-separate) TIFF layout is not supported".to_string(),
        ));
    }

    let transform = read_transform(&mut decoder)?;
    let geokeys = read_geokeys(&mut decoder);
    let transform = match geokeys.get(&GT_RASTER_TYPE_KEY) {
        // Tie points name pixel centres, shift to the pixel corner
        Some(&RASTER_PIXEL_IS_POINT) => GeoTransform {
            origin_x: transform.origin_x - 0.5 * (transform.pixel_width + transform.rotation_x),
            origin_y: transform.origin_y - 0.5 * (transform.rotation_y + transform.pixel_height),
            ..transform
        },
        _ => transform,
    };
    let crs = crs_from_geokeys(&geokeys);
    let nodata = read_nodata(&mut decoder)?;

    let (cells, cell_type) = match decoder
        .read_image()
        .map_err(input_error("cannot read image data"))?
    {
        DecodingResult::U8(buf) => (to_f64(&buf), CellType::UInt8),
        DecodingResult::I8(buf) => (to_f64(&buf), CellType::Int8),
        DecodingResult::U16(buf) => (to_f64(&buf), CellType::UInt16),
        DecodingResult::I16(buf) => (to_f64(&buf), CellType::Int16),
        DecodingResult::U32(buf) => (to_f64(&buf), CellType::UInt32),
        DecodingResult::I32(buf) => (to_f64(&buf), CellType::Int32),
        DecodingResult::F32(buf) => (to_f64(&buf), CellType::Float32),
        DecodingResult::F64(buf) => (buf, CellType::Float64),
        _ => {
            return Err(TilerError::Input(
                "unsupported TIFF sample format (64-bit integer or 16-bit float)".to_string(),
            ))
        }
    };

    if cells.len() != width * height * samples {
        return Err(TilerError::Input(format!(
            "image holds {} samples, expected {}x{}x{}",
            cells.len(),
            width,
            height,
            samples
        )));
    }

    let bands: Vec<Band> = (0..samples)
        .map(|b| {
            let data = cells.iter().skip(b).step_by(samples).copied().collect();
            Band::new(data, cell_type, nodata)
        })
        .collect();

    debug!(
        width,
        height,
        bands = samples,
        cell_type = ?cell_type,
        nodata = ?nodata,
        crs = ?crs,
        "Decoded GeoTIFF"
    );

    Raster::new(width, height, bands, transform, crs)
}

fn to_f64<T: ToPrimitive>(buf: &[T]) -> Vec<f64> {
    buf.iter().map(|v| v.to_f64().unwrap_or(f64::NAN)).collect()
}

/// Affine transform from ModelTransformation, or from PixelScale + Tiepoint.
fn read_transform<R: Read + Seek>(decoder: &mut Decoder<R>) -> TilerResult<GeoTransform> {
    if let Ok(m) = decoder.get_tag_f64_vec(tag(MODEL_TRANSFORMATION)) {
        if m.len() >= 8 {
            return Ok(GeoTransform::from_gdal([m[3], m[0], m[1], m[7], m[4], m[5]]));
        }
    }

    let scale = decoder.get_tag_f64_vec(tag(MODEL_PIXEL_SCALE)).ok();
    let tiepoint = decoder.get_tag_f64_vec(tag(MODEL_TIEPOINT)).ok();

    match (scale, tiepoint) {
        (Some(scale), Some(tiepoint)) if scale.len() >= 2 && tiepoint.len() >= 6 => {
            // tiepoint: [I, J, K, X, Y, Z]
            let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
            let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
            Ok(GeoTransform::north_up(origin_x, origin_y, scale[0], -scale[1]))
        }
        _ => Err(TilerError::Input(
            "missing georeferencing (ModelTransformation or PixelScale/Tiepoint tags)"
                .to_string(),
        )),
    }
}

/// Inline-valued entries of the GeoKey directory.
fn read_geokeys<R: Read + Seek>(decoder: &mut Decoder<R>) -> HashMap<u16, u16> {
    let Ok(dir) = decoder.get_tag_u16_vec(tag(GEO_KEY_DIRECTORY)) else {
        return HashMap::new();
    };

    dir.chunks_exact(4)
        .skip(1)
        .filter(|entry| entry[1] == 0 && entry[2] == 1)
        .map(|entry| (entry[0], entry[3]))
        .collect()
}

fn crs_from_geokeys(keys: &HashMap<u16, u16>) -> Option<CrsCode> {
    if let Some(&code) = keys.get(&PROJECTED_CS_TYPE_KEY) {
        let crs = CrsCode::from_epsg(code as u32);
        if crs.is_none() {
            warn!(epsg = code, "Unsupported projected CRS in GeoTIFF");
        }
        return crs;
    }
    if let Some(&code) = keys.get(&GEOGRAPHIC_TYPE_KEY) {
        let crs = CrsCode::from_epsg(code as u32);
        if crs.is_none() {
            warn!(epsg = code, "Unsupported geographic CRS in GeoTIFF");
        }
        return crs;
    }
    match keys.get(&GT_MODEL_TYPE_KEY) {
        Some(&MODEL_TYPE_GEOGRAPHIC) => Some(CrsCode::Epsg4326),
        _ => None,
    }
}

/// `GDAL_NODATA` ASCII tag, if present.
fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> TilerResult<Option<f64>> {
    let Ok(text) = decoder.get_tag_ascii_string(tag(GDAL_NODATA)) else {
        return Ok(None);
    };
    let trimmed = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<f64>()
        .map(Some)
        .map_err(|_| TilerError::Input(format!("invalid GDAL_NODATA value '{}'", trimmed)))
}

fn geokeys_for(crs: Option<CrsCode>) -> Vec<u16> {
    let mut entries = vec![[GT_RASTER_TYPE_KEY, 0, 1, RASTER_PIXEL_IS_AREA]];
    match crs {
        Some(CrsCode::Epsg3857) => {
            entries.push([GT_MODEL_TYPE_KEY, 0, 1, MODEL_TYPE_PROJECTED]);
            entries.push([PROJECTED_CS_TYPE_KEY, 0, 1, 3857]);
        }
        Some(CrsCode::Epsg4326) => {
            entries.push([GT_MODEL_TYPE_KEY, 0, 1, MODEL_TYPE_GEOGRAPHIC]);
            entries.push([GEOGRAPHIC_TYPE_KEY, 0, 1, 4326]);
        }
        None => {}
    }
    // Keys must be sorted by id
    entries.sort_by_key(|e| e[0]);

    let mut keys = vec![1, 1, 0, entries.len() as u16];
    keys.extend(entries.into_iter().flatten());
    keys
}

#[rustfmt::skip]
fn model_transformation(gt: &GeoTransform) -> [f64; 16] {
    [
        gt.pixel_width, gt.rotation_x, 0.0, gt.origin_x,
        gt.rotation_y, gt.pixel_height, 0.0, gt.origin_y,
        0.0, 0.0, 0.0, 0.0,
        0.0, 0.0, 0.0, 1.0,
    ]
}

macro_rules! write_geo_tags {
    ($image:expr, $transform:expr, $crs:expr) => {{
        let gt: &GeoTransform = $transform;
        if gt.is_north_up() {
            let scale = [gt.pixel_width, -gt.pixel_height, 0.0];
            let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
            $image
                .encoder()
                .write_tag(tag(MODEL_PIXEL_SCALE), &scale[..])
                .map_err(output_error("cannot write pixel scale tag"))?;
            $image
                .encoder()
                .write_tag(tag(MODEL_TIEPOINT), &tiepoint[..])
                .map_err(output_error("cannot write tiepoint tag"))?;
        } else {
            let matrix = model_transformation(gt);
            $image
                .encoder()
                .write_tag(tag(MODEL_TRANSFORMATION), &matrix[..])
                .map_err(output_error("cannot write transformation tag"))?;
        }
        let geokeys = geokeys_for($crs);
        $image
            .encoder()
            .write_tag(tag(GEO_KEY_DIRECTORY), geokeys.as_slice())
            .map_err(output_error("cannot write geokey tag"))?;
    }};
}

/// Write an RGBA raster as an 8-bit, 4-sample GeoTIFF.
pub fn write_rgba_geotiff(path: &Path, raster: &RgbaRaster) -> TilerResult<()> {
    let file = File::create(path).map_err(|e| {
        TilerError::Output(format!("cannot create {}: {}", path.display(), e))
    })?;
    let mut writer = BufWriter::new(file);
    encode_rgba_geotiff(&mut writer, raster)?;
    writer
        .flush()
        .map_err(|e| TilerError::Output(format!("cannot write {}: {}", path.display(), e)))
}

pub fn encode_rgba_geotiff<W: Write + Seek>(writer: W, raster: &RgbaRaster) -> TilerResult<()> {
    let mut encoder = TiffEncoder::new(writer).map_err(output_error("TIFF encoder error"))?;
    let mut image = encoder
        .new_image::<RGBA8>(raster.width as u32, raster.height as u32)
        .map_err(output_error("cannot create TIFF image"))?;

    write_geo_tags!(image, &raster.transform, raster.crs);

    image
        .write_data(&raster.pixels)
        .map_err(output_error("cannot write image data"))
}

/// Write the first band of a raster as a float GeoTIFF, carrying its no-data
/// value in the `GDAL_NODATA` tag.
///
/// Float64 bands are written as 64-bit floats, every other cell type as
/// 32-bit floats.
pub fn encode_float_geotiff<W: Write + Seek>(writer: W, raster: &Raster) -> TilerResult<()> {
    let band = raster
        .band(0)
        .ok_or_else(|| TilerError::Output("raster has no bands".to_string()))?;

    match band.cell_type {
        CellType::Float64 => encode_gray::<W, Gray64Float>(writer, raster, band, &band.data),
        _ => {
            let cells: Vec<f32> = band.data.iter().map(|&v| v as f32).collect();
            encode_gray::<W, Gray32Float>(writer, raster, band, &cells)
        }
    }
}

fn encode_gray<W, C>(writer: W, raster: &Raster, band: &Band, cells: &[C::Inner]) -> TilerResult<()>
where
    W: Write + Seek,
    C: colortype::ColorType,
    [C::Inner]: TiffValue,
{
    let mut encoder = TiffEncoder::new(writer).map_err(output_error("TIFF encoder error"))?;
    let mut image = encoder
        .new_image::<C>(raster.width() as u32, raster.height() as u32)
        .map_err(output_error("cannot create TIFF image"))?;

    write_geo_tags!(image, raster.transform(), raster.crs());

    if let Some(nodata) = band.nodata {
        image
            .encoder()
            .write_tag(tag(GDAL_NODATA), nodata.to_string().as_str())
            .map_err(output_error("cannot write nodata tag"))?;
    }

    image
        .write_data(cells)
        .map_err(output_error("cannot write image data"))
}
