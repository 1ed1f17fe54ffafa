//! Reference host: redraws the background layers of a `PpuSnapshot` and
//! drives the engine the way an emulator's tile fetch would.

use crate::codec::color15_to_argb;
use crate::dump::layer::mode7_index;
use crate::engine::{HdEngine, TileStatus};
use crate::snapshot::{BgLayerState, PpuSnapshot};
use crate::tile::{
    bg_palette_base, decode_planar, uses_direct_color, BitDepth, DirectColor, PaletteLookup, TileFlags, TileIdentity,
};
use log::trace;

pub const SCREEN_WIDTH: usize = 256;
pub const SCREEN_HEIGHT: usize = 224;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Tile fetches reported to the engine.
    pub tiles: u32,
    pub replaced: u32,
    pub pending: u32,
    /// Screen pixels drawn from replacement art.
    pub hd_pixels: u32,
}

#[derive(Debug, Clone)]
pub struct Frame {
    /// 256x224 ARGB, row-major.
    pub pixels: Vec<u32>,
    pub stats: FrameStats,
}

/// Render one frame. Starts a new engine frame, so budgets refill once per
/// call.
pub fn render_frame(snap: &PpuSnapshot, engine: &mut HdEngine) -> Frame {
    engine.begin_frame();
    let mut pixels = vec![0u32; SCREEN_WIDTH * SCREEN_HEIGHT];
    let mut stats = FrameStats::default();

    if snap.bg_mode & 7 == 7 {
        let direct = DirectColor { group: 0 };
        let lookup: &dyn PaletteLookup = if snap.direct_color { &direct } else { &snap.cgram };
        engine.capture_mode7(&snap.vram, lookup);
        if snap.bg[0].enabled {
            draw_mode7(snap, lookup, &mut pixels);
        }
    } else {
        // BG1 is drawn first and wins; later layers only fill what is still clear
        for (bg, layer) in snap.bg.iter().enumerate() {
            if !layer.enabled {
                continue;
            }
            let Some(depth) = BitDepth::for_background(snap.bg_mode, bg as u8) else {
                continue;
            };
            draw_layer(snap, engine, bg as u8, layer, depth, &mut pixels, &mut stats);
        }
    }

    let backdrop = color15_to_argb(snap.cgram.color15(0));
    for px in pixels.iter_mut().filter(|p| **p == 0) {
        *px = backdrop;
    }
    Frame { pixels, stats }
}

fn draw_layer(
    snap: &PpuSnapshot,
    engine: &mut HdEngine,
    bg: u8,
    layer: &BgLayerState,
    depth: BitDepth,
    out: &mut [u32],
    stats: &mut FrameStats,
) {
    let wrap_x = layer.width_tiles() * 8;
    let wrap_y = layer.height_tiles() * 8;
    let scroll_x = layer.hscroll % wrap_x;
    let scroll_y = layer.vscroll % wrap_y;
    let (fine_x, fine_y) = ((scroll_x % 8) as i32, (scroll_y % 8) as i32);
    let direct_layer = snap.direct_color && uses_direct_color(snap.bg_mode, bg);

    for ty in 0..=(SCREEN_HEIGHT / 8) as u16 {
        for tx in 0..=(SCREEN_WIDTH / 8) as u16 {
            let entry = layer.map_entry(&snap.vram, scroll_x / 8 + tx, scroll_y / 8 + ty);
            let character = entry & 0x03FF;
            let group = ((entry >> 10) & 0x07) as u8;
            let flags = TileFlags::from_mirror(entry & 0x4000 != 0, entry & 0x8000 != 0);
            let palette = bg_palette_base(snap.bg_mode, bg, group, depth);
            let identity = TileIdentity::background(bg, character, palette, group, depth, flags);

            let address = layer
                .tile_base
                .wrapping_add(character.wrapping_mul(depth.words_per_tile()))
                & 0x7FFF;
            let direct = DirectColor { group };
            let lookup: &dyn PaletteLookup = if direct_layer { &direct } else { &snap.cgram };
            let native = decode_planar(&snap.vram, address, depth, flags, palette, lookup);

            stats.tiles += 1;
            let status = engine.on_tile_resolved(&identity, || native);
            match status {
                TileStatus::Replaced => stats.replaced += 1,
                TileStatus::Pending => stats.pending += 1,
                TileStatus::Native => {}
            }

            let origin_x = tx as i32 * 8 - fine_x;
            let origin_y = ty as i32 * 8 - fine_y;
            for row in 0..8u8 {
                let y = origin_y + row as i32;
                if y < 0 || y >= SCREEN_HEIGHT as i32 {
                    continue;
                }
                for col in 0..8u8 {
                    let x = origin_x + col as i32;
                    if x < 0 || x >= SCREEN_WIDTH as i32 {
                        continue;
                    }
                    let slot = &mut out[y as usize * SCREEN_WIDTH + x as usize];
                    if *slot != 0 {
                        continue;
                    }
                    let hd = if status == TileStatus::Replaced {
                        engine.request_color(&identity, row, col)
                    } else {
                        None
                    };
                    match hd {
                        Some(color) => {
                            *slot = color15_to_argb(color);
                            stats.hd_pixels += 1;
                        }
                        None => *slot = native.get(col as usize, row as usize),
                    }
                }
            }
        }
    }
    trace!("host: BG{} drawn, {} tiles so far", bg + 1, stats.tiles);
}

// Untransformed Mode 7 view: the plane scrolled by BG1's offsets.
fn draw_mode7(snap: &PpuSnapshot, palette: &dyn PaletteLookup, out: &mut [u32]) {
    let layer = &snap.bg[0];
    for y in 0..SCREEN_HEIGHT {
        for x in 0..SCREEN_WIDTH {
            let px = x as u32 + layer.hscroll as u32;
            let py = y as u32 + layer.vscroll as u32;
            let index = mode7_index(&snap.vram, px, py);
            if index != 0 {
                out[y * SCREEN_WIDTH + x] = color15_to_argb(palette.color15(index as u16));
            }
        }
    }
}

/// Store an 8x8 character of color indices in planar form at `address`.
pub fn plant_character(vram: &mut [u16], address: u16, depth: BitDepth, indices: &[u8; 64]) {
    let pairs = depth.bits() as usize / 2;
    for y in 0..8usize {
        for pair in 0..pairs {
            let mut lo = 0u16;
            let mut hi = 0u16;
            for x in 0..8usize {
                let index = indices[y * 8 + x];
                let bit = 0x80 >> x;
                if index & (1 << (pair * 2)) != 0 {
                    lo |= bit;
                }
                if index & (1 << (pair * 2 + 1)) != 0 {
                    hi |= bit;
                }
            }
            let word = (address as usize + y + 8 * pair) & 0x7FFF;
            if let Some(slot) = vram.get_mut(word) {
                *slot = lo | (hi << 8);
            }
        }
    }
}

/// A small Mode 1 scene: four patterned 4bpp characters on BG1 over a
/// 2bpp checker on BG3.
pub fn demo_snapshot() -> PpuSnapshot {
    let mut snap = PpuSnapshot::new(1);

    for (i, color) in snap.cgram.iter_mut().enumerate() {
        let i = i as u16;
        let r = (i * 3) & 0x1F;
        let g = (i * 5 + 7) & 0x1F;
        let b = (31 - (i & 0x1F)) & 0x1F;
        *color = r | (g << 5) | (b << 10);
    }
    snap.cgram[0] = 0x2108;

    let bg1 = BgLayerState {
        tilemap_base: 0x0000,
        tile_base: 0x1000,
        screen_size: 0,
        hscroll: 4,
        vscroll: 0,
        enabled: true,
    };
    let bg3 = BgLayerState {
        tilemap_base: 0x0800,
        tile_base: 0x3000,
        screen_size: 0,
        hscroll: 0,
        vscroll: 0,
        enabled: true,
    };

    let patterns: [fn(usize, usize) -> u8; 4] = [
        |_, _| 0,
        |x, y| ((x + y) % 15 + 1) as u8,
        |x, y| if (x / 2 + y / 2) % 2 == 0 { 3 } else { 0 },
        |x, _| (x * 2 + 1) as u8,
    ];
    for (c, pattern) in patterns.iter().enumerate() {
        let mut indices = [0u8; 64];
        for (i, slot) in indices.iter_mut().enumerate() {
            *slot = pattern(i % 8, i / 8);
        }
        let address = bg1.tile_base + c as u16 * BitDepth::Bpp4.words_per_tile();
        plant_character(&mut snap.vram, address, BitDepth::Bpp4, &indices);
    }
    let mut checker = [0u8; 64];
    for (i, slot) in checker.iter_mut().enumerate() {
        *slot = if (i % 8 < 4) == (i / 8 < 4) { 1 } else { 2 };
    }
    plant_character(&mut snap.vram, bg3.tile_base, BitDepth::Bpp2, &checker);

    for ty in 0..32u16 {
        for tx in 0..32u16 {
            let character = (tx + ty) % 4;
            let group = ty % 2 + 1;
            let hflip = if tx % 3 == 0 { 0x4000 } else { 0 };
            snap.vram[(bg1.tilemap_base + ty * 32 + tx) as usize] = character | (group << 10) | hflip;
        }
    }

    snap.bg[0] = bg1;
    snap.bg[2] = bg3;
    snap
}
