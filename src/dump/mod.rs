pub mod fade;
pub mod layer;
pub mod sheet;

use crate::budget::FrameBudget;
use crate::codec::write_png;
use crate::config::HdConfig;
use crate::tile::{content_hash, ContextKey, PaletteLookup, TileIdentity, TileKind, TilePixels};
use fade::{luminance, FadeTracker};
use layer::{LayerCapture, Mode7Capture};
use log::{debug, info, trace, warn};
use std::collections::{HashMap, HashSet};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const DUMP_MANIFEST_FILE: &str = "dump_manifest.txt";

/// A tile admitted to the dump buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpCandidate {
    pub name: String,
    pub identity: TileIdentity,
    pub kind: TileKind,
    pub key: ContextKey,
    pub pixels: TilePixels,
    pub hash: u32,
    pub sequence: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Admitted,
    /// Already admitted earlier in the session.
    Duplicate,
    /// Out of budget this frame; offered again later.
    Deferred,
    /// Not yet stable (mid fade); offered again later.
    Withheld,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub tiles: usize,
    pub sheets: Vec<PathBuf>,
    pub layers: Vec<PathBuf>,
}

impl FlushReport {
    pub fn is_empty(&self) -> bool {
        self.tiles == 0 && self.layers.is_empty()
    }
}

/// Collects first-seen tiles and writes them out as sheets.
///
/// Dedup is by context key for the whole session; admission is limited per
/// frame with separate quotas for background and sprite tiles.
#[derive(Debug)]
pub struct DumpRecorder {
    seen: HashSet<ContextKey>,
    pending: HashSet<ContextKey>,
    candidates: Vec<DumpCandidate>,
    bg_budget: FrameBudget,
    sprite_budget: FrameBudget,
    fade: FadeTracker,
    frame: u64,
    sequence: u64,
    sheet_tiles: u32,
    write_manifest: bool,
    next_sheet: HashMap<&'static str, u32>,
    layers: Vec<LayerCapture>,
    layers_seen: HashSet<String>,
    mode7: Option<Mode7Capture>,
    mode7_rows: u32,
}

impl DumpRecorder {
    pub fn new(config: &HdConfig) -> Self {
        Self {
            seen: HashSet::new(),
            pending: HashSet::new(),
            candidates: Vec::new(),
            bg_budget: FrameBudget::new(config.dump_budget),
            sprite_budget: FrameBudget::new(config.sprite_dump_budget),
            fade: FadeTracker::new(config.fade_window, config.fade_tolerance),
            frame: 0,
            sequence: 0,
            sheet_tiles: config.sheet_tiles.max(1),
            write_manifest: config.write_dump_manifest,
            next_sheet: HashMap::new(),
            layers: Vec::new(),
            layers_seen: HashSet::new(),
            mode7: None,
            mode7_rows: config.mode7_rows_per_frame,
        }
    }

    pub fn begin_frame(&mut self) {
        self.frame = self.frame.wrapping_add(1);
        self.bg_budget.refill();
        self.sprite_budget.refill();
    }

    fn budget_for(&mut self, kind: TileKind) -> &mut FrameBudget {
        match kind {
            TileKind::Sprite { .. } => &mut self.sprite_budget,
            TileKind::Background { .. } | TileKind::Mode7 => &mut self.bg_budget,
        }
    }

    /// Offer a tile. `reconstruct` runs only when the tile may be admitted
    /// or needs a fade sample this frame.
    pub fn record_with<F>(&mut self, identity: &TileIdentity, reconstruct: F) -> RecordOutcome
    where
        F: FnOnce() -> TilePixels,
    {
        let key = identity.context_key();
        if self.seen.contains(&key) {
            return RecordOutcome::Duplicate;
        }
        if !self.budget_for(identity.kind).has_remaining() {
            if self.pending.insert(key) {
                debug!("dump: {} deferred, budget exhausted", identity.stem());
            }
            return RecordOutcome::Deferred;
        }
        if self.fade.sampled_in(key, self.frame) {
            return RecordOutcome::Withheld;
        }

        let pixels = reconstruct();
        if !self.fade.observe(key, self.frame, luminance(&pixels)) {
            self.pending.insert(key);
            trace!("dump: {} withheld, luminance unsettled", identity.stem());
            return RecordOutcome::Withheld;
        }
        // checked above; nothing between could have consumed it
        if !self.budget_for(identity.kind).try_take() {
            self.pending.insert(key);
            return RecordOutcome::Deferred;
        }

        self.seen.insert(key);
        self.pending.remove(&key);
        self.fade.forget(key);
        let candidate = DumpCandidate {
            name: identity.stem(),
            identity: *identity,
            kind: identity.kind,
            key,
            hash: content_hash(&pixels),
            pixels,
            sequence: self.sequence,
        };
        self.sequence += 1;
        trace!("dump: admitted {} as #{}", candidate.name, candidate.sequence);
        self.candidates.push(candidate);
        RecordOutcome::Admitted
    }

    pub fn record_candidate(&mut self, identity: &TileIdentity, pixels: &TilePixels) -> RecordOutcome {
        self.record_with(identity, || *pixels)
    }

    /// Advance the Mode 7 plane capture by one frame's worth of rows. The
    /// finished plane is queued once per session.
    pub fn capture_mode7<P: PaletteLookup + ?Sized>(&mut self, vram: &[u16], palette: &P) {
        if self.layers_seen.contains(layer::MODE7_LAYER) {
            return;
        }
        let rows = self.mode7_rows;
        let capture = self.mode7.get_or_insert_with(|| Mode7Capture::new(rows));
        if capture.advance(vram, palette) {
            if let Some(done) = self.mode7.take() {
                debug!("dump: Mode 7 plane captured");
                self.layers_seen.insert(layer::MODE7_LAYER.to_string());
                self.layers.push(done.finish());
            }
        }
    }

    pub fn candidates(&self) -> &[DumpCandidate] {
        &self.candidates
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, key: ContextKey) -> bool {
        self.pending.contains(&key)
    }

    pub fn is_seen(&self, key: ContextKey) -> bool {
        self.seen.contains(&key)
    }

    pub fn queued_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Drop buffered candidates and layers without writing them. Returns the
    /// number of tiles dropped.
    pub fn discard(&mut self) -> usize {
        let dropped = self.candidates.len();
        self.candidates.clear();
        self.layers.clear();
        dropped
    }

    /// Write every buffered candidate and layer under `dir`.
    ///
    /// The buffer is emptied whether or not the writes succeed; the seen set
    /// is kept so flushed tiles are not dumped again this session.
    pub fn flush(&mut self, dir: &Path) -> Result<FlushReport, String> {
        let candidates = std::mem::take(&mut self.candidates);
        let layers = std::mem::take(&mut self.layers);
        if candidates.is_empty() && layers.is_empty() {
            return Ok(FlushReport::default());
        }

        let result = self.write_all(dir, &candidates, &layers);
        match &result {
            Ok(report) => info!(
                "dump: wrote {} tile(s) in {} sheet(s) and {} layer(s) to {}",
                report.tiles,
                report.sheets.len(),
                report.layers.len(),
                dir.display()
            ),
            Err(e) => warn!("dump: flush failed, {} tile(s) discarded: {}", candidates.len(), e),
        }
        result
    }

    fn write_all(
        &mut self,
        dir: &Path,
        candidates: &[DumpCandidate],
        layers: &[LayerCapture],
    ) -> Result<FlushReport, String> {
        let mut report = FlushReport::default();
        let mut manifest = String::new();
        let edge = self.sheet_tiles;
        let per_sheet = (edge * edge) as usize;

        // groups in first-seen order
        let mut groups: Vec<(&'static str, Vec<&DumpCandidate>)> = Vec::new();
        for c in candidates {
            let group = c.identity.sheet_group();
            match groups.iter_mut().find(|(g, _)| *g == group) {
                Some((_, members)) => members.push(c),
                None => groups.push((group, vec![c])),
            }
        }

        for (group, members) in groups {
            for chunk in members.chunks(per_sheet) {
                let index = *self
                    .next_sheet
                    .entry(group)
                    .or_insert_with(|| sheet::next_free_index(dir, group));
                self.next_sheet.insert(group, index + 1);

                let file = sheet::sheet_file_name(group, index);
                let path = dir.join(&file);
                let pixels = sheet::compose_sheet(chunk.iter().map(|c| &c.pixels), edge);
                let side = edge * sheet::TILE_PX;
                write_png(&path, &pixels, side, side, side)
                    .map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;

                manifest.push_str(&format!("# {} cols={} rows={}\n", file, edge, edge));
                for (slot, c) in chunk.iter().enumerate() {
                    let (col, row) = sheet::cell_of(slot, edge);
                    manifest.push_str(&format!(
                        "{:08X} col={} row={} plane={} palette={:03} tile={:04} ; {}\n",
                        c.hash, col, row, group, c.identity.palette, c.identity.character, c.name
                    ));
                }
                report.tiles += chunk.len();
                report.sheets.push(path);
            }
        }

        for layer in layers {
            let path = dir.join(format!("{}.png", layer.name));
            write_png(&path, &layer.pixels, layer.width, layer.height, layer.width)
                .map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;
            report.layers.push(path);
        }

        if self.write_manifest && !manifest.is_empty() {
            let path = dir.join(DUMP_MANIFEST_FILE);
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|e| format!("Failed to open {}: {}", path.display(), e))?;
            file.write_all(manifest.as_bytes())
                .map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;
        }
        Ok(report)
    }

    pub fn apply_config(&mut self, config: &HdConfig) {
        self.bg_budget.set_max(config.dump_budget);
        self.sprite_budget.set_max(config.sprite_dump_budget);
        self.sheet_tiles = config.sheet_tiles.max(1);
        self.write_manifest = config.write_dump_manifest;
        self.mode7_rows = config.mode7_rows_per_frame;
        let window = config.fade_window.clamp(1, crate::config::MAX_FADE_WINDOW) as usize;
        if self.fade.window() != window || self.fade.tolerance() != config.fade_tolerance {
            self.fade = FadeTracker::new(config.fade_window, config.fade_tolerance);
        }
    }

    /// Drop all session state, including sheet numbering.
    pub fn reset(&mut self) {
        self.seen.clear();
        self.pending.clear();
        self.candidates.clear();
        self.fade.clear();
        self.bg_budget.drain();
        self.sprite_budget.drain();
        self.sequence = 0;
        self.next_sheet.clear();
        self.layers.clear();
        self.layers_seen.clear();
        self.mode7 = None;
    }
}
