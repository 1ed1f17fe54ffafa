use crate::codec::rgb_to_color15;
use crate::manifest::CellRect;
use image::RgbaImage;

/// Source coordinate for native cell `cell` (0..8) of a region `extent`
/// pixels wide starting at `offset`: the pixel nearest the cell center.
#[inline]
pub fn nearest_center(offset: u32, extent: u32, cell: u32) -> u32 {
    offset + (extent * (2 * cell + 1)) / 16
}

/// Authored art downsampled to the native 8x8 grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleTable {
    pub color: [u16; 64],
    pub alpha: [u8; 64],
}

impl SampleTable {
    pub fn from_region(img: &RgbaImage, rect: CellRect) -> Self {
        let mut table = SampleTable {
            color: [0; 64],
            alpha: [0; 64],
        };
        let (w, h) = img.dimensions();
        for row in 0..8u32 {
            let sy = nearest_center(rect.y, rect.h, row).min(h.saturating_sub(1));
            for col in 0..8u32 {
                let sx = nearest_center(rect.x, rect.w, col).min(w.saturating_sub(1));
                let [r, g, b, a] = img.get_pixel(sx, sy).0;
                let i = (row * 8 + col) as usize;
                table.color[i] = rgb_to_color15(r, g, b);
                table.alpha[i] = a;
            }
        }
        table
    }

    /// 15-bit color at (row, col), or `None` where the art is transparent.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Option<u16> {
        let i = (row & 7) * 8 + (col & 7);
        if self.alpha[i] == 0 {
            None
        } else {
            Some(self.color[i])
        }
    }

    pub fn opaque_count(&self) -> usize {
        self.alpha.iter().filter(|&&a| a != 0).count()
    }
}

/// One native row pulled out of a sample table.
#[derive(Debug, Clone, Copy)]
pub(super) struct RowCache {
    pub key: u64,
    pub row: u8,
    pub flags: u8,
    pub color: [u16; 8],
    pub alpha: [u8; 8],
}

impl RowCache {
    pub fn matches(&self, key: u64, row: u8, flags: u8) -> bool {
        self.key == key && self.row == row && self.flags == flags
    }

    pub fn fill(key: u64, row: u8, flags: u8, table: &SampleTable) -> Self {
        let base = (row as usize & 7) * 8;
        let mut color = [0u16; 8];
        let mut alpha = [0u8; 8];
        color.copy_from_slice(&table.color[base..base + 8]);
        alpha.copy_from_slice(&table.alpha[base..base + 8]);
        Self {
            key,
            row,
            flags,
            color,
            alpha,
        }
    }

    #[inline]
    pub fn get(&self, col: usize) -> Option<u16> {
        let col = col & 7;
        if self.alpha[col] == 0 {
            None
        } else {
            Some(self.color[col])
        }
    }
}
