use serde::{Deserialize, Serialize};
use std::path::Path;

pub const SNAPSHOT_VERSION: u32 = 2;
pub const VRAM_WORDS: usize = 0x8000;
pub const CGRAM_WORDS: usize = 256;

/// Register state of one background layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BgLayerState {
    /// Tilemap base, VRAM word address.
    pub tilemap_base: u16,
    /// Character base, VRAM word address.
    pub tile_base: u16,
    /// 0: 32x32, 1: 64x32, 2: 32x64, 3: 64x64 tiles.
    pub screen_size: u8,
    pub hscroll: u16,
    pub vscroll: u16,
    pub enabled: bool,
}

impl BgLayerState {
    pub fn width_tiles(&self) -> u16 {
        if self.screen_size == 1 || self.screen_size == 3 {
            64
        } else {
            32
        }
    }

    pub fn height_tiles(&self) -> u16 {
        if self.screen_size == 2 || self.screen_size == 3 {
            64
        } else {
            32
        }
    }

    /// Tilemap entry for map tile (tx, ty), wrapped to the layer size.
    pub fn map_entry(&self, vram: &[u16], tx: u16, ty: u16) -> u16 {
        let tx = tx % self.width_tiles();
        let ty = ty % self.height_tiles();
        let scx = (tx / 32) as u32;
        let scy = (ty / 32) as u32;
        let width_screens = if self.screen_size == 1 || self.screen_size == 3 { 2 } else { 1 };
        let quadrant = scx + scy * width_screens;
        let word = (self.tilemap_base as u32)
            .wrapping_add(quadrant * 0x400)
            .wrapping_add((ty % 32) as u32 * 32 + (tx % 32) as u32)
            & 0x7FFF;
        vram.get(word as usize).copied().unwrap_or(0)
    }
}

/// The PPU memory and registers needed to redraw a frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PpuSnapshot {
    pub version: u32,
    pub bg_mode: u8,
    /// CGWSEL direct color bit.
    pub direct_color: bool,
    pub bg: [BgLayerState; 4],
    pub vram: Vec<u16>,
    pub cgram: Vec<u16>,
}

impl PpuSnapshot {
    pub fn new(bg_mode: u8) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            bg_mode: bg_mode & 7,
            direct_color: false,
            bg: [BgLayerState::default(); 4],
            vram: vec![0; VRAM_WORDS],
            cgram: vec![0; CGRAM_WORDS],
        }
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let data = bincode::serialize(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, data)?;
        log::info!("snapshot: written to {}", path.display());
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<PpuSnapshot, Box<dyn std::error::Error>> {
        let data = std::fs::read(path)?;
        let snapshot: PpuSnapshot = bincode::deserialize(&data)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(format!(
                "Unsupported snapshot version {} in {} (expected {})",
                snapshot.version,
                path.display(),
                SNAPSHOT_VERSION
            )
            .into());
        }
        if snapshot.vram.len() != VRAM_WORDS || snapshot.cgram.len() != CGRAM_WORDS {
            return Err(format!(
                "Snapshot {} has {} VRAM / {} CGRAM words",
                path.display(),
                snapshot.vram.len(),
                snapshot.cgram.len()
            )
            .into());
        }
        log::info!("snapshot: loaded from {}", path.display());
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(tag: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("hdpack-snapshot-{}-{}.bin", tag, std::process::id()))
    }

    #[test]
    fn test_save_and_load() {
        let path = temp_file("roundtrip");
        let mut snap = PpuSnapshot::new(1);
        snap.bg[0] = BgLayerState {
            tilemap_base: 0x0400,
            tile_base: 0x1000,
            screen_size: 3,
            hscroll: 12,
            vscroll: 300,
            enabled: true,
        };
        snap.direct_color = true;
        snap.vram[0x1234] = 0xBEEF;
        snap.cgram[17] = 0x7C1F;
        snap.save_to_file(&path).unwrap();
        let loaded = PpuSnapshot::load_from_file(&path).unwrap();
        assert_eq!(loaded, snap);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_rejects_other_versions() {
        let path = temp_file("version");
        let mut snap = PpuSnapshot::new(0);
        snap.version = SNAPSHOT_VERSION + 1;
        snap.save_to_file(&path).unwrap();
        let err = PpuSnapshot::load_from_file(&path).unwrap_err();
        assert!(err.to_string().contains("version"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_rejects_truncated_memory() {
        let path = temp_file("short");
        let mut snap = PpuSnapshot::new(0);
        snap.vram.truncate(16);
        snap.save_to_file(&path).unwrap();
        assert!(PpuSnapshot::load_from_file(&path).is_err());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_map_entry_quadrants() {
        let mut snap = PpuSnapshot::new(1);
        let layer = BgLayerState {
            tilemap_base: 0x2000,
            screen_size: 3,
            ..BgLayerState::default()
        };
        snap.vram[0x2000 + 5] = 1;
        snap.vram[0x2000 + 0x400 + 2 * 32 + 1] = 2;
        snap.vram[0x2000 + 0x800 + 3 * 32] = 3;
        snap.vram[0x2000 + 0xC00] = 4;
        assert_eq!(layer.map_entry(&snap.vram, 5, 0), 1);
        assert_eq!(layer.map_entry(&snap.vram, 33, 2), 2);
        assert_eq!(layer.map_entry(&snap.vram, 0, 35), 3);
        assert_eq!(layer.map_entry(&snap.vram, 32, 32), 4);
        // wraps at 64 tiles
        assert_eq!(layer.map_entry(&snap.vram, 69, 64), 1);
    }
}
