pub mod parser;

use log::{debug, info, warn};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

pub use parser::{parse_line, CellRect, ManifestLine, Mapping, SheetHeader, DEFAULT_GRID, SUPPORTED_VERSION};

pub const MANIFEST_FILE: &str = "manifest.txt";

/// A backing image declared by a `#` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sheet {
    pub file: String,
    pub cols: u32,
    pub rows: u32,
}

/// One hash -> art mapping, bound to its sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub hash: u32,
    pub tile_index: Option<u16>,
    pub sheet: usize,
    pub cols: u32,
    pub rows: u32,
    pub cell: Option<(u32, u32)>,
    pub rect: Option<CellRect>,
    pub plane: Option<String>,
    pub palette: Option<u16>,
    pub scale: Option<u32>,
    pub group: Option<u32>,
    pub version: u32,
    pub note: Option<String>,
    /// 1-based line number in the manifest text.
    pub line: usize,
}

impl ManifestEntry {
    /// Source region for this entry within a sheet of the given size.
    ///
    /// An explicit rect wins; then `scale` (cells of 8*scale px); then the
    /// header grid. `None` when the region is empty or leaves the image.
    pub fn region(&self, sheet_w: u32, sheet_h: u32) -> Option<CellRect> {
        let rect = if let Some(rect) = self.rect {
            rect
        } else {
            let (col, row) = self.cell?;
            match self.scale {
                Some(scale) => {
                    let size = scale.checked_mul(8)?;
                    CellRect {
                        x: col.checked_mul(size)?,
                        y: row.checked_mul(size)?,
                        w: size,
                        h: size,
                    }
                }
                None => {
                    let w = sheet_w / self.cols.max(1);
                    let h = sheet_h / self.rows.max(1);
                    CellRect {
                        x: col.checked_mul(w)?,
                        y: row.checked_mul(h)?,
                        w,
                        h,
                    }
                }
            }
        };
        if rect.w == 0 || rect.h == 0 {
            return None;
        }
        if rect.x.checked_add(rect.w)? > sheet_w || rect.y.checked_add(rect.h)? > sheet_h {
            return None;
        }
        Some(rect)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// Number of usable mappings.
    Available(usize),
    NotAvailable,
    AlreadyLoaded,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManifestStats {
    pub mappings: usize,
    pub sheets: usize,
    pub malformed: usize,
    pub unsupported: usize,
    pub duplicates: usize,
    pub unknown_tokens: usize,
}

/// Hash-indexed view of one manifest, immutable between loads.
#[derive(Debug, Default)]
pub struct ManifestStore {
    loaded: bool,
    sheets: Vec<Sheet>,
    entries: HashMap<u32, ManifestEntry>,
    stats: ManifestStats,
}

impl ManifestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse manifest text. A second call before `unload` does nothing.
    pub fn load(&mut self, text: &str) -> LoadStatus {
        if self.loaded {
            return LoadStatus::AlreadyLoaded;
        }
        self.loaded = true;

        let mut current: Option<usize> = None;
        for (n, raw) in text.split('\n').enumerate() {
            let line_no = n + 1;
            match parse_line(raw) {
                ManifestLine::Blank | ManifestLine::Comment => {}
                ManifestLine::Header(h) => {
                    debug!("manifest: sheet {} ({}x{})", h.file, h.cols, h.rows);
                    self.sheets.push(Sheet {
                        file: h.file,
                        cols: h.cols,
                        rows: h.rows,
                    });
                    current = Some(self.sheets.len() - 1);
                }
                ManifestLine::Mapping(m) => {
                    let Some(sheet) = current else {
                        warn!("manifest line {}: {:08X} has no sheet header, skipped", line_no, m.hash);
                        self.stats.malformed += 1;
                        continue;
                    };
                    if m.unknown_tokens > 0 {
                        debug!("manifest line {}: skipped {} unknown token(s)", line_no, m.unknown_tokens);
                        self.stats.unknown_tokens += m.unknown_tokens;
                    }
                    self.insert(sheet, m, line_no);
                }
                ManifestLine::Unsupported { hash, version } => {
                    debug!(
                        "manifest line {}: {:08X} needs version {} (supported {}), skipped",
                        line_no, hash, version, SUPPORTED_VERSION
                    );
                    self.stats.unsupported += 1;
                }
                ManifestLine::Malformed(reason) => {
                    warn!("manifest line {}: {}, skipped", line_no, reason);
                    self.stats.malformed += 1;
                }
            }
        }

        self.stats.sheets = self.sheets.len();
        self.stats.mappings = self.entries.len();
        if self.entries.is_empty() {
            LoadStatus::NotAvailable
        } else {
            info!(
                "manifest: {} mapping(s) over {} sheet(s)",
                self.entries.len(),
                self.sheets.len()
            );
            LoadStatus::Available(self.entries.len())
        }
    }

    /// Load `<dir>/manifest.txt`. A missing file is `NotAvailable`.
    pub fn load_from_dir(&mut self, dir: &Path) -> Result<LoadStatus, String> {
        if self.loaded {
            return Ok(LoadStatus::AlreadyLoaded);
        }
        let path = dir.join(MANIFEST_FILE);
        match fs::read(&path) {
            Ok(bytes) => Ok(self.load(&String::from_utf8_lossy(&bytes))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.loaded = true;
                Ok(LoadStatus::NotAvailable)
            }
            Err(e) => {
                self.loaded = true;
                Err(format!("Failed to read {}: {}", path.display(), e))
            }
        }
    }

    fn insert(&mut self, sheet: usize, m: Mapping, line: usize) {
        let (cols, rows) = (self.sheets[sheet].cols, self.sheets[sheet].rows);
        let entry = ManifestEntry {
            hash: m.hash,
            tile_index: m.tile_index,
            sheet,
            cols,
            rows,
            cell: m.cell(),
            rect: m.rect,
            plane: m.plane,
            palette: m.palette,
            scale: m.scale,
            group: m.group,
            version: m.version,
            note: m.note,
            line,
        };
        if let Some(prev) = self.entries.insert(entry.hash, entry) {
            warn!(
                "manifest line {}: hash {:08X} already mapped on line {}, later entry wins",
                line, prev.hash, prev.line
            );
            self.stats.duplicates += 1;
        }
    }

    pub fn lookup(&self, hash: u32) -> Option<&ManifestEntry> {
        self.entries.get(&hash)
    }

    pub fn sheet(&self, index: usize) -> Option<&Sheet> {
        self.sheets.get(index)
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    /// Entries of one metatile group, in manifest order.
    pub fn group_members(&self, group: u32) -> Vec<&ManifestEntry> {
        let mut members: Vec<&ManifestEntry> = self
            .entries
            .values()
            .filter(|e| e.group == Some(group))
            .collect();
        members.sort_by_key(|e| e.line);
        members
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_available(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> ManifestStats {
        self.stats
    }

    pub fn unload(&mut self) {
        *self = Self::default();
    }
}
