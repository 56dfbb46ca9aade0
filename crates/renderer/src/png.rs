//! PNG encoding for RGBA tiles.
//!
//! Two output modes:
//! - **Indexed (color type 3)** when the image has at most 256 distinct RGBA
//!   colors. Ramp-colored tiles almost always qualify.
//! - **Truecolor with alpha (color type 6)** otherwise.
//!
//! Scanlines are written unfiltered and deflated with flate2; chunk CRCs come
//! from crc32fast.

use std::collections::HashMap;
use std::io::Write;
use tile_common::{TilerError, TilerResult};

const PNG_SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

/// Maximum colors for indexed PNG (PNG8)
const MAX_PALETTE_SIZE: usize = 256;

const COLOR_TYPE_INDEXED: u8 = 3;
const COLOR_TYPE_RGBA: u8 = 6;

/// Encoding chosen for an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PngMode {
    Indexed,
    Rgba,
}

/// Distinct colors of an image in first-seen order plus one index per pixel.
#[derive(Debug, Clone)]
pub struct Palette {
    pub colors: Vec<[u8; 4]>,
    pub indices: Vec<u8>,
}

impl Palette {
    /// Returns `None` when the image has more than 256 distinct colors.
    pub fn extract(pixels: &[u8]) -> Option<Palette> {
        let mut lookup: HashMap<u32, u8> = HashMap::with_capacity(MAX_PALETTE_SIZE);
        let mut colors: Vec<[u8; 4]> = Vec::with_capacity(MAX_PALETTE_SIZE);
        let mut indices = Vec::with_capacity(pixels.len() / 4);

        for px in pixels.chunks_exact(4) {
            let key = u32::from_le_bytes([px[0], px[1], px[2], px[3]]);
            let index = match lookup.get(&key) {
                Some(&idx) => idx,
                None => {
                    if colors.len() == MAX_PALETTE_SIZE {
                        return None;
                    }
                    let idx = colors.len() as u8;
                    colors.push([px[0], px[1], px[2], px[3]]);
                    lookup.insert(key, idx);
                    idx
                }
            };
            indices.push(index);
        }

        Some(Palette { colors, indices })
    }
}

/// Encode RGBA pixels, picking indexed mode whenever the colors fit.
pub fn encode(pixels: &[u8], width: usize, height: usize) -> TilerResult<Vec<u8>> {
    check_buffer(pixels, width, height)?;
    match Palette::extract(pixels) {
        Some(palette) => encode_indexed(&palette, width, height),
        None => encode_rgba(pixels, width, height),
    }
}

/// Encode as a truecolor + alpha PNG.
pub fn encode_rgba(pixels: &[u8], width: usize, height: usize) -> TilerResult<Vec<u8>> {
    check_buffer(pixels, width, height)?;

    let mut png = Vec::with_capacity(pixels.len() / 2);
    png.extend_from_slice(&PNG_SIGNATURE);
    write_chunk(&mut png, b"IHDR", &ihdr(width, height, COLOR_TYPE_RGBA));

    let idat = deflate_scanlines(pixels, width * 4, height)?;
    write_chunk(&mut png, b"IDAT", &idat);
    write_chunk(&mut png, b"IEND", &[]);

    Ok(png)
}

/// Encode a palette image (color type 3). A tRNS chunk is added when any
/// palette entry is not fully opaque.
pub fn encode_indexed(palette: &Palette, width: usize, height: usize) -> TilerResult<Vec<u8>> {
    if palette.indices.len() != width * height {
        return Err(TilerError::Output(format!(
            "palette image has {} indices, expected {}x{}",
            palette.indices.len(),
            width,
            height
        )));
    }
    if palette.colors.is_empty() || palette.colors.len() > MAX_PALETTE_SIZE {
        return Err(TilerError::Output(format!(
            "palette must hold 1-{} colors, got {}",
            MAX_PALETTE_SIZE,
            palette.colors.len()
        )));
    }

    let mut png = Vec::new();
    png.extend_from_slice(&PNG_SIGNATURE);
    write_chunk(&mut png, b"IHDR", &ihdr(width, height, COLOR_TYPE_INDEXED));

    let plte: Vec<u8> = palette.colors.iter().flat_map(|c| [c[0], c[1], c[2]]).collect();
    write_chunk(&mut png, b"PLTE", &plte);

    if palette.colors.iter().any(|c| c[3] < 255) {
        let trns: Vec<u8> = palette.colors.iter().map(|c| c[3]).collect();
        write_chunk(&mut png, b"tRNS", &trns);
    }

    let idat = deflate_scanlines(&palette.indices, width, height)?;
    write_chunk(&mut png, b"IDAT", &idat);
    write_chunk(&mut png, b"IEND", &[]);

    Ok(png)
}

/// Color type recorded in an encoded PNG's header.
pub fn mode_of(png: &[u8]) -> Option<PngMode> {
    // signature (8) + length (4) + "IHDR" (4) + width (4) + height (4) + depth (1)
    match png.get(25)? {
        &COLOR_TYPE_INDEXED => Some(PngMode::Indexed),
        &COLOR_TYPE_RGBA => Some(PngMode::Rgba),
        _ => None,
    }
}

fn check_buffer(pixels: &[u8], width: usize, height: usize) -> TilerResult<()> {
    if width == 0 || height == 0 || pixels.len() != width * height * 4 {
        return Err(TilerError::Output(format!(
            "cannot encode {} bytes as a {}x{} RGBA image",
            pixels.len(),
            width,
            height
        )));
    }
    Ok(())
}

fn ihdr(width: usize, height: usize, color_type: u8) -> Vec<u8> {
    let mut data = Vec::with_capacity(13);
    data.extend_from_slice(&(width as u32).to_be_bytes());
    data.extend_from_slice(&(height as u32).to_be_bytes());
    data.push(8); // bit depth
    data.push(color_type);
    data.push(0); // compression method
    data.push(0); // filter method
    data.push(0); // interlace method
    data
}

/// Prefix every row with filter type 0 and zlib-compress the result.
fn deflate_scanlines(data: &[u8], row_bytes: usize, height: usize) -> TilerResult<Vec<u8>> {
    let mut raw = Vec::with_capacity(height * (row_bytes + 1));
    for row in data.chunks_exact(row_bytes).take(height) {
        raw.push(0);
        raw.extend_from_slice(row);
    }

    let compress = |raw: &[u8]| -> std::io::Result<Vec<u8>> {
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(raw)?;
        encoder.finish()
    };
    compress(&raw).map_err(|e| TilerError::Output(format!("IDAT compression failed: {}", e)))
}

fn write_chunk(png: &mut Vec<u8>, chunk_type: &[u8; 4], data: &[u8]) {
    png.extend_from_slice(&(data.len() as u32).to_be_bytes());

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(chunk_type);
    hasher.update(data);

    png.extend_from_slice(chunk_type);
    png.extend_from_slice(data);
    png.extend_from_slice(&hasher.finalize().to_be_bytes());
}
