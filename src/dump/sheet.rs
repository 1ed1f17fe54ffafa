use crate::tile::TilePixels;
use std::fs;
use std::path::Path;

pub const TILE_PX: u32 = 8;

pub fn sheet_file_name(group: &str, index: u32) -> String {
    format!("{}_sheet_{:03}.png", group, index)
}

/// Grid cell of the `slot`-th tile on a sheet `tiles_per_edge` wide.
pub fn cell_of(slot: usize, tiles_per_edge: u32) -> (u32, u32) {
    let edge = tiles_per_edge.max(1) as usize;
    ((slot % edge) as u32, (slot / edge) as u32)
}

/// Lay tiles out row-major on a transparent square sheet.
///
/// Returns ARGB pixels with a pitch of `tiles_per_edge * 8`.
pub fn compose_sheet<'a, I>(tiles: I, tiles_per_edge: u32) -> Vec<u32>
where
    I: IntoIterator<Item = &'a TilePixels>,
{
    let edge = tiles_per_edge.max(1);
    let side = (edge * TILE_PX) as usize;
    let mut out = vec![0u32; side * side];
    for (slot, tile) in tiles.into_iter().take((edge * edge) as usize).enumerate() {
        let (col, row) = cell_of(slot, edge);
        let ox = (col * TILE_PX) as usize;
        let oy = (row * TILE_PX) as usize;
        for y in 0..8 {
            let dst = (oy + y) * side + ox;
            out[dst..dst + 8].copy_from_slice(tile.row(y));
        }
    }
    out
}

/// Next free sheet number for `group` in `dir`, so a new session never
/// overwrites sheets written earlier.
pub fn next_free_index(dir: &Path, group: &str) -> u32 {
    let prefix = format!("{}_sheet_", group);
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let name = e.file_name().into_string().ok()?;
            let digits = name.strip_prefix(&prefix)?.strip_suffix(".png")?;
            digits.parse::<u32>().ok()
        })
        .max()
        .map_or(0, |n| n + 1)
}
