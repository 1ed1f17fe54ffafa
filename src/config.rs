use serde::{Deserialize, Serialize};
use std::path::Path;

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON"))
}

fn env_u32(key: &str) -> Option<u32> {
    std::env::var(key).ok().and_then(|v| {
        let v = v.trim();
        if let Some(hex) = v.strip_prefix("0x") {
            u32::from_str_radix(hex, 16).ok()
        } else {
            v.parse::<u32>().ok()
        }
    })
}

/// Longest fade window the recorder keeps per tile.
pub const MAX_FADE_WINDOW: u8 = 16;

/// Runtime knobs for the HD pack engine.
///
/// Budgets are per frame. The fade window is the number of consecutive frames
/// a tile's luminance must stay within `fade_tolerance` before the tile is
/// admitted to the dump buffer; a window of 1 admits on first sight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HdConfig {
    pub dump_tiles: bool,
    pub use_hd_pack: bool,

    pub dump_budget: u32,
    pub sprite_dump_budget: u32,
    pub presence_budget: u32,
    pub load_budget: u32,
    pub row_budget: u32,
    pub hash_budget: u32,

    pub fade_window: u8,
    pub fade_tolerance: u8,

    // Tiles per sheet edge (16 => 128x128 px sheets)
    pub sheet_tiles: u32,
    pub mode7_rows_per_frame: u32,
    pub write_dump_manifest: bool,
}

impl Default for HdConfig {
    fn default() -> Self {
        Self {
            dump_tiles: false,
            use_hd_pack: false,
            dump_budget: 64,
            sprite_dump_budget: 64,
            presence_budget: 16,
            load_budget: 1,
            row_budget: 256,
            hash_budget: 64,
            fade_window: 4,
            fade_tolerance: 2,
            sheet_tiles: 16,
            mode7_rows_per_frame: 64,
            write_dump_manifest: true,
        }
    }
}

impl HdConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env();
        cfg
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config {}: {}", path.display(), e))?;
        let cfg: HdConfig = serde_json::from_str(&text)
            .map_err(|e| format!("Invalid config {}: {}", path.display(), e))?;
        Ok(cfg.sanitized())
    }

    pub fn apply_env(&mut self) {
        if let Some(v) = env_flag("HD_DUMP") {
            self.dump_tiles = v;
        }
        if let Some(v) = env_flag("HD_PACK") {
            self.use_hd_pack = v;
        }
        let knobs: [(&str, &mut u32); 8] = [
            ("HD_DUMP_BUDGET", &mut self.dump_budget),
            ("HD_SPRITE_DUMP_BUDGET", &mut self.sprite_dump_budget),
            ("HD_PRESENCE_BUDGET", &mut self.presence_budget),
            ("HD_LOAD_BUDGET", &mut self.load_budget),
            ("HD_ROW_BUDGET", &mut self.row_budget),
            ("HD_HASH_BUDGET", &mut self.hash_budget),
            ("HD_SHEET_TILES", &mut self.sheet_tiles),
            ("HD_MODE7_ROWS", &mut self.mode7_rows_per_frame),
        ];
        for (key, slot) in knobs {
            if let Some(v) = env_u32(key) {
                *slot = v;
            }
        }
        if let Some(v) = env_u32("HD_FADE_WINDOW") {
            self.fade_window = v.min(u8::MAX as u32) as u8;
        }
        if let Some(v) = env_u32("HD_FADE_TOLERANCE") {
            self.fade_tolerance = v.min(u8::MAX as u32) as u8;
        }
        if let Some(v) = env_flag("HD_DUMP_MANIFEST") {
            self.write_dump_manifest = v;
        }
        *self = self.clone().sanitized();
    }

    /// Clamp values that would otherwise make the engine misbehave.
    pub fn sanitized(mut self) -> Self {
        self.sheet_tiles = self.sheet_tiles.max(1);
        self.fade_window = self.fade_window.clamp(1, MAX_FADE_WINDOW);
        self.mode7_rows_per_frame = self.mode7_rows_per_frame.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(label: &str) -> std::path::PathBuf {
        let pid = std::process::id();
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!("hdpack-config-{label}-{pid}-{nanos}.json"))
    }

    #[test]
    fn test_defaults_match_runtime_budgets() {
        let cfg = HdConfig::default();
        assert_eq!(cfg.dump_budget, 64);
        assert_eq!(cfg.presence_budget, 16);
        assert_eq!(cfg.load_budget, 1);
        assert_eq!(cfg.row_budget, 256);
        assert_eq!(cfg.sheet_tiles, 16);
        assert_eq!(cfg.fade_window, 4);
        assert_eq!(cfg.fade_tolerance, 2);
        assert!(!cfg.dump_tiles);
        assert!(!cfg.use_hd_pack);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let path = temp_path("partial");
        std::fs::write(&path, r#"{ "dump_tiles": true, "fade_window": 6 }"#).unwrap();
        let cfg = HdConfig::load_from_file(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert!(cfg.dump_tiles);
        assert_eq!(cfg.fade_window, 6);
        assert_eq!(cfg.hash_budget, 64);
    }

    #[test]
    fn test_sanitized_clamps_degenerate_values() {
        let cfg = HdConfig {
            sheet_tiles: 0,
            fade_window: 0,
            mode7_rows_per_frame: 0,
            ..HdConfig::default()
        }
        .sanitized();
        assert_eq!(cfg.sheet_tiles, 1);
        assert_eq!(cfg.fade_window, 1);
        assert_eq!(cfg.mode7_rows_per_frame, 1);

        let wide = HdConfig {
            fade_window: 200,
            ..HdConfig::default()
        }
        .sanitized();
        assert_eq!(wide.fade_window, MAX_FADE_WINDOW);
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("HD_DUMP", "1");
        std::env::set_var("HD_ROW_BUDGET", "0x40");
        std::env::set_var("HD_SHEET_TILES", "0");
        let cfg = HdConfig::from_env();
        std::env::remove_var("HD_DUMP");
        std::env::remove_var("HD_ROW_BUDGET");
        std::env::remove_var("HD_SHEET_TILES");

        assert!(cfg.dump_tiles);
        assert_eq!(cfg.row_budget, 0x40);
        assert_eq!(cfg.sheet_tiles, 1);
    }

    #[test]
    fn test_missing_config_file_is_error() {
        let path = temp_path("missing");
        assert!(HdConfig::load_from_file(&path).is_err());
    }
}
