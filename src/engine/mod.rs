use crate::codec::{ArtStore, FsArtStore, NoArt};
use crate::config::HdConfig;
use crate::dump::{DumpRecorder, FlushReport, RecordOutcome};
use crate::manifest::{LoadStatus, ManifestStore};
use crate::replace::{EntryState, ReplacementCache};
use crate::tile::{content_hash, HashMemo, PaletteLookup, TileIdentity, TilePixels};
use bitflags::bitflags;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

bitflags! {
    /// Engine features the host can toggle at any time.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HdFeatures: u8 {
        const DUMP = 0x01;
        const REPLACE = 0x02;
    }
}

bitflags! {
    // Messages already logged this session.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    struct Notices: u8 {
        const NO_MANIFEST = 0x01;
        const NO_DUMP_DIR = 0x02;
        const HASH_DEFERRED = 0x04;
        const DUMP_DEFERRED = 0x08;
        const MANIFEST_ERROR = 0x10;
    }
}

/// Directory name used when a ROM path yields no usable game name.
pub const UNKNOWN_GAME: &str = "Unknown";

/// Where one title's HD pack is read from and its dumps are written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentPaths {
    pub pack_dir: PathBuf,
    pub dump_dir: PathBuf,
}

impl ContentPaths {
    pub fn new<P: Into<PathBuf>, D: Into<PathBuf>>(pack_dir: P, dump_dir: D) -> Self {
        Self {
            pack_dir: pack_dir.into(),
            dump_dir: dump_dir.into(),
        }
    }

    /// `<root>/hdpack/<game>/` for both pack and dumps.
    pub fn for_rom(root: &Path, rom: &Path) -> Self {
        let dir = root.join("hdpack").join(game_name(rom));
        Self::new(dir.clone(), dir)
    }
}

/// Game name from a ROM file (its stem) or a ROM folder (its name).
pub fn game_name(rom: &Path) -> String {
    let name = if rom.is_dir() {
        rom.file_name()
    } else {
        rom.file_stem()
    };
    let name = name.map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let name = name.trim();
    if name.is_empty() {
        UNKNOWN_GAME.to_string()
    } else {
        name.to_string()
    }
}

/// What the host should do with a tile it just resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileStatus {
    /// Render natively.
    Native,
    /// Render natively for now; replacement state is still being resolved.
    Pending,
    /// Replacement art exists; ask `request_color` per pixel.
    Replaced,
}

/// Host-facing entry point: one instance per loaded title.
pub struct HdEngine {
    config: HdConfig,
    features: HdFeatures,
    paths: Option<ContentPaths>,
    manifest: ManifestStore,
    art: Box<dyn ArtStore>,
    recorder: DumpRecorder,
    cache: ReplacementCache,
    hashes: HashMemo,
    notices: Notices,
}

impl HdEngine {
    pub fn new(config: HdConfig) -> Self {
        let config = config.sanitized();
        let mut features = HdFeatures::empty();
        features.set(HdFeatures::DUMP, config.dump_tiles);
        features.set(HdFeatures::REPLACE, config.use_hd_pack);
        Self {
            recorder: DumpRecorder::new(&config),
            cache: ReplacementCache::new(&config),
            hashes: HashMemo::new(config.hash_budget),
            features,
            paths: None,
            manifest: ManifestStore::new(),
            art: Box::new(NoArt),
            notices: Notices::empty(),
            config,
        }
    }

    pub fn config(&self) -> &HdConfig {
        &self.config
    }

    /// Swap in new tunables; session state is kept.
    pub fn apply_config(&mut self, config: HdConfig) {
        let config = config.sanitized();
        self.recorder.apply_config(&config);
        self.cache.apply_config(&config);
        self.hashes.set_budget(config.hash_budget);
        self.features.set(HdFeatures::DUMP, config.dump_tiles);
        self.features.set(HdFeatures::REPLACE, config.use_hd_pack);
        self.config = config;
    }

    /// Bind the engine to a title's pack and dump directories.
    pub fn load_content(&mut self, paths: ContentPaths) -> LoadStatus {
        let art = Box::new(FsArtStore::new(paths.pack_dir.clone()));
        let status = match self.manifest.load_from_dir(&paths.pack_dir) {
            Ok(status) => status,
            Err(e) => {
                self.notice(Notices::MANIFEST_ERROR, || warn!("hd: {}", e));
                LoadStatus::NotAvailable
            }
        };
        self.finish_load(paths, art, status)
    }

    /// Like `load_content`, with the manifest text and art supplied directly.
    pub fn load_content_with(&mut self, paths: ContentPaths, manifest_text: &str, art: Box<dyn ArtStore>) -> LoadStatus {
        let status = self.manifest.load(manifest_text);
        self.finish_load(paths, art, status)
    }

    fn finish_load(&mut self, paths: ContentPaths, art: Box<dyn ArtStore>, status: LoadStatus) -> LoadStatus {
        if status == LoadStatus::AlreadyLoaded {
            debug!("hd: content already loaded, ignoring reload");
            return status;
        }
        match status {
            LoadStatus::Available(n) => info!("hd: pack {} ({} mappings)", paths.pack_dir.display(), n),
            _ => self.notice(Notices::NO_MANIFEST, || {
                info!("hd: no manifest in {}, using per-tile art only", paths.pack_dir.display())
            }),
        }
        self.art = art;
        self.paths = Some(paths);
        status
    }

    pub fn paths(&self) -> Option<&ContentPaths> {
        self.paths.as_ref()
    }

    pub fn manifest(&self) -> &ManifestStore {
        &self.manifest
    }

    pub fn recorder(&self) -> &DumpRecorder {
        &self.recorder
    }

    pub fn cache(&self) -> &ReplacementCache {
        &self.cache
    }

    pub fn dump_enabled(&self) -> bool {
        self.features.contains(HdFeatures::DUMP)
    }

    pub fn replacement_enabled(&self) -> bool {
        self.features.contains(HdFeatures::REPLACE)
    }

    pub fn set_dump_enabled(&mut self, on: bool) {
        self.features.set(HdFeatures::DUMP, on);
    }

    pub fn set_replacement_enabled(&mut self, on: bool) {
        self.features.set(HdFeatures::REPLACE, on);
    }

    /// Per-frame tick; refills every budget.
    pub fn begin_frame(&mut self) {
        self.recorder.begin_frame();
        self.cache.begin_frame();
        self.hashes.begin_frame();
    }

    /// Called once per tile the host fetches. `reconstruct` produces the
    /// tile's resolved pixels and runs at most once per call, only when the
    /// dump or the content hash needs them.
    pub fn on_tile_resolved<F>(&mut self, identity: &TileIdentity, mut reconstruct: F) -> TileStatus
    where
        F: FnMut() -> TilePixels,
    {
        let mut resolved: Option<TilePixels> = None;
        let mut pixels = || *resolved.get_or_insert_with(&mut reconstruct);

        if self.dump_enabled() {
            let outcome = self.recorder.record_with(identity, || pixels());
            if outcome == RecordOutcome::Deferred {
                self.notice(Notices::DUMP_DEFERRED, || debug!("hd: dump budget exhausted, tiles deferred to later frames"));
            }
        }

        if !self.replacement_enabled() || self.paths.is_none() {
            return TileStatus::Native;
        }

        let key = identity.context_key();
        let hash = if self.manifest.is_available() {
            let hash = self.hashes.get_or_compute(key, || content_hash(&pixels()));
            if hash.is_none() {
                self.notice(Notices::HASH_DEFERRED, || debug!("hd: hash budget exhausted, tiles deferred to later frames"));
            }
            hash
        } else {
            None
        };

        if self.cache.has_replacement(identity, hash, &self.manifest, self.art.as_ref()) {
            TileStatus::Replaced
        } else if self.cache.state(key) == EntryState::Unchecked {
            TileStatus::Pending
        } else {
            TileStatus::Native
        }
    }

    /// Replacement color for one pixel of a tile, `None` to draw natively.
    pub fn request_color(&mut self, identity: &TileIdentity, row: u8, col: u8) -> Option<u16> {
        if !self.replacement_enabled() || self.paths.is_none() {
            return None;
        }
        self.cache
            .sample_color(identity, row, col, &self.manifest, self.art.as_ref())
    }

    /// Advance the Mode 7 plane dump while dumping is on.
    pub fn capture_mode7<P: PaletteLookup + ?Sized>(&mut self, vram: &[u16], palette: &P) {
        if self.dump_enabled() {
            self.recorder.capture_mode7(vram, palette);
        }
    }

    /// Write buffered dumps to the content's dump directory.
    pub fn flush(&mut self) -> Result<FlushReport, String> {
        let Some(dir) = self.paths.as_ref().map(|p| p.dump_dir.clone()) else {
            if self.recorder.candidates().is_empty() && self.recorder.queued_layers() == 0 {
                return Ok(FlushReport::default());
            }
            self.notice(Notices::NO_DUMP_DIR, || warn!("hd: no content loaded, dumped tiles have nowhere to go"));
            let dropped = self.recorder.discard();
            return Err(format!("No dump directory, {} tile(s) discarded", dropped));
        };
        self.recorder.flush(&dir)
    }

    /// Power-on: forget every cache and budget for the current title.
    pub fn reset(&mut self) {
        self.recorder.reset();
        self.cache.reset();
        self.hashes.clear();
        self.notices = Notices::empty();
    }

    /// Flush, then drop all per-title state.
    pub fn unload(&mut self) -> Result<FlushReport, String> {
        let result = self.flush();
        self.reset();
        self.manifest.unload();
        self.art = Box::new(NoArt);
        self.paths = None;
        result
    }

    fn notice<F: FnOnce()>(&mut self, which: Notices, log: F) {
        if !self.notices.contains(which) {
            self.notices.insert(which);
            log();
        }
    }
}
