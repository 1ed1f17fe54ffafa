use super::{BitDepth, TileFlags};
use crate::codec::color15_to_argb;

const VRAM_WORD_MASK: usize = 0x7FFF;

/// Resolves a CGRAM index to a BGR555 color.
pub trait PaletteLookup {
    fn color15(&self, index: u16) -> u16;
}

impl PaletteLookup for [u16] {
    fn color15(&self, index: u16) -> u16 {
        self.get(index as usize).copied().unwrap_or(0)
    }
}

impl PaletteLookup for Vec<u16> {
    fn color15(&self, index: u16) -> u16 {
        self.as_slice().color15(index)
    }
}

/// Direct color: an 8bpp index read as BBGGGRRR, with the tilemap palette
/// group supplying the low bit of each component.
pub fn direct_color(index: u8, group: u8) -> u16 {
    let index = index as u16;
    let group = (group & 7) as u16;
    let r = ((index & 0x07) << 2) | ((group & 1) << 1);
    let g = ((index & 0x38) << 4) | ((group & 2) << 5);
    let b = ((index & 0xC0) << 7) | ((group & 4) << 10);
    r | g | b
}

/// Lookup for BG1 tiles drawn with direct color (modes 3, 4 and 7). CGRAM
/// is bypassed; the palette base of such tiles is always 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectColor {
    pub group: u8,
}

impl PaletteLookup for DirectColor {
    fn color15(&self, index: u16) -> u16 {
        direct_color(index as u8, self.group)
    }
}

/// One fully resolved 8x8 tile in on-screen orientation, row-major ARGB.
/// Transparent pixels are 0x00000000.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilePixels(pub [u32; 64]);

impl Default for TilePixels {
    fn default() -> Self {
        TilePixels([0; 64])
    }
}

impl TilePixels {
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u32 {
        self.0[(y & 7) * 8 + (x & 7)]
    }

    pub fn row(&self, y: usize) -> &[u32] {
        let y = y & 7;
        &self.0[y * 8..y * 8 + 8]
    }

    pub fn is_fully_transparent(&self) -> bool {
        self.0.iter().all(|&p| p >> 24 == 0)
    }
}

/// Color indices of one character, in VRAM (unmirrored) orientation.
pub fn decode_indices(vram: &[u16], address: u16, depth: BitDepth) -> [u8; 64] {
    let mut out = [0u8; 64];
    if vram.is_empty() {
        return out;
    }
    let pairs = depth.bits() as usize / 2;
    let word = |offset: usize| -> u16 {
        let addr = (address as usize + offset) & VRAM_WORD_MASK;
        vram.get(addr).copied().unwrap_or(0)
    };
    for y in 0..8 {
        for pair in 0..pairs {
            let w = word(y + 8 * pair);
            let lo = (w & 0xFF) as u8;
            let hi = (w >> 8) as u8;
            for x in 0..8 {
                let bit = 7 - x;
                let v = ((lo >> bit) & 1) | (((hi >> bit) & 1) << 1);
                out[y * 8 + x] |= v << (pair * 2);
            }
        }
    }
    out
}

/// Decode a planar character and resolve its colors.
///
/// `address` is the VRAM word address of the character; `palette_base` is
/// added to every non-zero color index before the palette lookup. Mirror
/// flags are applied so the result matches what appears on screen.
pub fn decode_planar<P: PaletteLookup + ?Sized>(
    vram: &[u16],
    address: u16,
    depth: BitDepth,
    flags: TileFlags,
    palette_base: u16,
    palette: &P,
) -> TilePixels {
    let indices = decode_indices(vram, address, depth);
    let mut pixels = TilePixels::default();
    for y in 0..8 {
        let sy = if flags.vmirror() { 7 - y } else { y };
        for x in 0..8 {
            let sx = if flags.hmirror() { 7 - x } else { x };
            let index = indices[sy * 8 + sx];
            if index == 0 {
                continue;
            }
            let color = palette.color15(palette_base.wrapping_add(index as u16));
            pixels.0[y * 8 + x] = color15_to_argb(color);
        }
    }
    pixels
}
