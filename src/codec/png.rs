use super::crc32::Crc32;
use std::fs::{create_dir_all, File};
use std::io::{self, Write};
use std::path::Path;

const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
// Largest payload of a stored (uncompressed) deflate block
const STORED_BLOCK_MAX: usize = 65_535;
const ADLER_MOD: u32 = 65_521;

/// Encode 0xAARRGGBB pixels as an 8-bit RGBA PNG.
///
/// `pitch` is the row stride in pixels (>= width). The image data is written
/// as stored deflate blocks, so the output is larger than a compressed PNG but
/// any conforming decoder reproduces every pixel, alpha included.
pub fn encode_rgba(pixels: &[u32], width: u32, height: u32, pitch: u32) -> Result<Vec<u8>, String> {
    if width == 0 || height == 0 {
        return Err(format!("Cannot encode empty image {}x{}", width, height));
    }
    if pitch < width {
        return Err(format!("Pitch {} is smaller than width {}", pitch, width));
    }
    let needed = (height as usize - 1) * pitch as usize + width as usize;
    if pixels.len() < needed {
        return Err(format!(
            "Pixel buffer too small: {} < {} for {}x{} pitch {}",
            pixels.len(),
            needed,
            width,
            height,
            pitch
        ));
    }

    let raw = filtered_scanlines(pixels, width as usize, height as usize, pitch as usize);
    let zlib = zlib_stored(&raw);

    let mut out = Vec::with_capacity(8 + 25 + 12 + zlib.len() + 12);
    out.extend_from_slice(&SIGNATURE);

    let mut ihdr = [0u8; 13];
    ihdr[0..4].copy_from_slice(&width.to_be_bytes());
    ihdr[4..8].copy_from_slice(&height.to_be_bytes());
    ihdr[8] = 8; // bit depth
    ihdr[9] = 6; // color type RGBA
    // compression, filter, interlace all 0
    write_chunk(&mut out, b"IHDR", &ihdr);
    write_chunk(&mut out, b"IDAT", &zlib);
    write_chunk(&mut out, b"IEND", &[]);
    Ok(out)
}

/// Encode and write to `path`, creating parent directories.
pub fn write_png(path: &Path, pixels: &[u32], width: u32, height: u32, pitch: u32) -> io::Result<()> {
    let bytes = encode_rgba(pixels, width, height, pitch)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    Ok(())
}

// Each row: filter byte 0 followed by RGBA bytes
fn filtered_scanlines(pixels: &[u32], width: usize, height: usize, pitch: usize) -> Vec<u8> {
    let mut raw = Vec::with_capacity(height * (1 + width * 4));
    for y in 0..height {
        raw.push(0);
        for &argb in &pixels[y * pitch..y * pitch + width] {
            let [a, r, g, b] = argb.to_be_bytes();
            raw.extend_from_slice(&[r, g, b, a]);
        }
    }
    raw
}

fn zlib_stored(data: &[u8]) -> Vec<u8> {
    let blocks = data.len().div_ceil(STORED_BLOCK_MAX).max(1);
    let mut z = Vec::with_capacity(2 + data.len() + blocks * 5 + 4);
    // CMF=0x78 (deflate, 32K window), FLG=0x01 (FCHECK so CMF*256+FLG % 31 == 0)
    z.push(0x78);
    z.push(0x01);

    if data.is_empty() {
        z.extend_from_slice(&[0x01, 0x00, 0x00, 0xFF, 0xFF]);
    }
    let mut chunks = data.chunks(STORED_BLOCK_MAX).peekable();
    while let Some(chunk) = chunks.next() {
        let last = chunks.peek().is_none();
        let len = chunk.len() as u16;
        z.push(if last { 0x01 } else { 0x00 });
        z.extend_from_slice(&len.to_le_bytes());
        z.extend_from_slice(&(!len).to_le_bytes());
        z.extend_from_slice(chunk);
    }

    z.extend_from_slice(&adler32(data).to_be_bytes());
    z
}

pub(super) fn adler32(data: &[u8]) -> u32 {
    let mut a: u32 = 1;
    let mut b: u32 = 0;
    // 5552 is the largest run that cannot overflow u32 before the modulo
    for chunk in data.chunks(5552) {
        for &byte in chunk {
            a += byte as u32;
            b += a;
        }
        a %= ADLER_MOD;
        b %= ADLER_MOD;
    }
    (b << 16) | a
}

fn write_chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(data);
    let mut crc = Crc32::new();
    crc.update(kind);
    crc.update(data);
    out.extend_from_slice(&crc.finish().to_be_bytes());
}
