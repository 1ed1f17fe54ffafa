pub mod art;
pub mod crc32;
pub mod png;

pub use art::{ArtStore, FsArtStore, NoArt};
pub use crc32::{crc32, Crc32};
pub use png::{encode_rgba, write_png};

/// Expand a BGR555 color (red in bits 0-4) to 0xFFRRGGBB.
#[inline]
pub fn color15_to_argb(color: u16) -> u32 {
    let r5 = (color & 0x1F) as u32;
    let g5 = ((color >> 5) & 0x1F) as u32;
    let b5 = ((color >> 10) & 0x1F) as u32;

    let r = (r5 << 3) | (r5 >> 2);
    let g = (g5 << 3) | (g5 >> 2);
    let b = (b5 << 3) | (b5 >> 2);

    0xFF00_0000 | (r << 16) | (g << 8) | b
}

/// Truncate 8-bit channels to BGR555.
#[inline]
pub fn rgb_to_color15(r: u8, g: u8, b: u8) -> u16 {
    ((r as u16) >> 3) | (((g as u16) >> 3) << 5) | (((b as u16) >> 3) << 10)
}

#[cfg(test)]
mod tests;
