use crate::codec::color15_to_argb;
use crate::tile::PaletteLookup;

/// Side length of the Mode 7 plane in pixels (128 x 128 tiles).
pub const MODE7_SIZE: u32 = 1024;
pub const MODE7_LAYER: &str = "MODE7_BG1";

/// A full-layer image queued for the next flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerCapture {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u32>,
}

/// Color index of plane pixel (x, y). The tilemap lives in the low bytes of
/// VRAM words 0..0x4000 and character data in the high bytes.
pub fn mode7_index(vram: &[u16], x: u32, y: u32) -> u8 {
    let tx = (x >> 3) & 0x7F;
    let ty = (y >> 3) & 0x7F;
    let map_word = ((ty << 7) | tx) as usize;
    let tile = vram.get(map_word).map_or(0, |w| w & 0xFF) as usize;
    let chr_word = (tile << 6) | (((y & 7) << 3) | (x & 7)) as usize;
    vram.get(chr_word).map_or(0, |w| w >> 8) as u8
}

/// Rebuilds the Mode 7 plane a slice of rows per frame.
#[derive(Debug, Clone)]
pub struct Mode7Capture {
    rows_per_frame: u32,
    next_row: u32,
    pixels: Vec<u32>,
}

impl Mode7Capture {
    pub fn new(rows_per_frame: u32) -> Self {
        Self {
            rows_per_frame: rows_per_frame.max(1),
            next_row: 0,
            pixels: vec![0; (MODE7_SIZE * MODE7_SIZE) as usize],
        }
    }

    /// Render the next band of rows. Returns true once every row is done.
    pub fn advance<P: PaletteLookup + ?Sized>(&mut self, vram: &[u16], palette: &P) -> bool {
        let end = (self.next_row + self.rows_per_frame).min(MODE7_SIZE);
        for y in self.next_row..end {
            let row = (y * MODE7_SIZE) as usize;
            for x in 0..MODE7_SIZE {
                let index = mode7_index(vram, x, y);
                self.pixels[row + x as usize] = if index == 0 {
                    0
                } else {
                    color15_to_argb(palette.color15(index as u16))
                };
            }
        }
        self.next_row = end;
        self.is_complete()
    }

    pub fn is_complete(&self) -> bool {
        self.next_row >= MODE7_SIZE
    }

    pub fn rows_done(&self) -> u32 {
        self.next_row
    }

    pub fn finish(self) -> LayerCapture {
        LayerCapture {
            name: MODE7_LAYER.to_string(),
            width: MODE7_SIZE,
            height: MODE7_SIZE,
            pixels: self.pixels,
        }
    }
}
