pub mod sample;

use crate::budget::FrameBudget;
use crate::codec::ArtStore;
use crate::config::HdConfig;
use crate::manifest::{CellRect, ManifestStore};
use crate::tile::{ContextKey, TileIdentity};
use image::RgbaImage;
use log::{debug, trace, warn};
use sample::RowCache;
use std::collections::HashMap;

pub use sample::{nearest_center, SampleTable};

const TABLE_ROWS: u32 = 8;

/// Lifecycle of one replacement entry. `Absent` is terminal until reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EntryState {
    #[default]
    Unchecked,
    Absent,
    Present,
    Decoded,
    Sampled,
}

impl EntryState {
    pub fn is_present(self) -> bool {
        matches!(self, EntryState::Present | EntryState::Decoded | EntryState::Sampled)
    }
}

// Where an entry's art comes from. Manifest entries share one decode per
// sheet and one sample table per hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Source {
    Sheet { sheet: usize, hash: u32 },
    File { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Resource {
    Sheet(usize),
    File(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum TableId {
    Hash(u32),
    File(String),
}

impl Source {
    fn resource(&self) -> Resource {
        match self {
            Source::Sheet { sheet, .. } => Resource::Sheet(*sheet),
            Source::File { name } => Resource::File(name.clone()),
        }
    }

    fn table_id(&self) -> TableId {
        match self {
            Source::Sheet { hash, .. } => TableId::Hash(*hash),
            Source::File { name } => TableId::File(name.clone()),
        }
    }
}

#[derive(Debug)]
enum Art {
    Missing,
    Present,
    Decoded(RgbaImage),
    Failed,
    /// Sampled and no longer needed in memory.
    Released,
}

#[derive(Debug, Default)]
struct CacheEntry {
    state: EntryState,
    source: Option<Source>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub probes: u64,
    pub decodes: u64,
    pub decode_failures: u64,
    pub tables: u64,
    pub rows: u64,
}

/// Lazily filled, budgeted store of replacement pixels for one loaded title.
#[derive(Debug)]
pub struct ReplacementCache {
    entries: HashMap<ContextKey, CacheEntry>,
    art: HashMap<Resource, Art>,
    tables: HashMap<TableId, SampleTable>,
    row_cache: Option<RowCache>,
    presence_budget: FrameBudget,
    load_budget: FrameBudget,
    row_budget: FrameBudget,
    stats: CacheStats,
}

impl ReplacementCache {
    pub fn new(config: &HdConfig) -> Self {
        Self {
            entries: HashMap::new(),
            art: HashMap::new(),
            tables: HashMap::new(),
            row_cache: None,
            presence_budget: FrameBudget::new(config.presence_budget),
            load_budget: FrameBudget::new(config.load_budget),
            row_budget: FrameBudget::new(config.row_budget),
            stats: CacheStats::default(),
        }
    }

    pub fn begin_frame(&mut self) {
        self.presence_budget.refill();
        self.load_budget.refill();
        self.row_budget.refill();
    }

    pub fn apply_config(&mut self, config: &HdConfig) {
        self.presence_budget.set_max(config.presence_budget);
        self.load_budget.set_max(config.load_budget);
        self.row_budget.set_max(config.row_budget);
    }

    pub fn state(&self, key: ContextKey) -> EntryState {
        self.entries.get(&key).map_or(EntryState::Unchecked, |e| e.state)
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Whether replacement art exists for this tile.
    ///
    /// `hash` is `None` while the content hash is still waiting for budget.
    /// A `false` may turn into `true` on a later call once the probe gets
    /// budget; a `true` is provisional until the art actually decodes.
    pub fn has_replacement<A: ArtStore + ?Sized>(
        &mut self,
        identity: &TileIdentity,
        hash: Option<u32>,
        manifest: &ManifestStore,
        art: &A,
    ) -> bool {
        let key = identity.context_key();
        let state = self.state(key);
        if state != EntryState::Unchecked {
            return state.is_present();
        }

        let source = if manifest.is_available() {
            let Some(hash) = hash else {
                return false;
            };
            manifest.lookup(hash).map(|e| Source::Sheet { sheet: e.sheet, hash })
        } else {
            None
        };
        let source = match source {
            Some(s) => s,
            None => match self.probe_files(identity, art) {
                Some(Some(name)) => Source::File { name },
                Some(None) => {
                    self.set_state(key, EntryState::Absent, None);
                    return false;
                }
                None => return false,
            },
        };

        match self.probe_resource(&source, manifest, art) {
            Some(true) => {
                trace!("replace: {} present", identity.stem());
                self.set_state(key, EntryState::Present, Some(source));
                true
            }
            Some(false) => {
                self.set_state(key, EntryState::Absent, None);
                false
            }
            None => false,
        }
    }

    /// Replacement color at on-screen (row, col) of the tile, or `None` for
    /// native rendering (no art, transparent art pixel or out of budget).
    pub fn sample_color<A: ArtStore + ?Sized>(
        &mut self,
        identity: &TileIdentity,
        row: u8,
        col: u8,
        manifest: &ManifestStore,
        art: &A,
    ) -> Option<u16> {
        let key = identity.context_key();
        let flags = identity.flags.bits();
        if let Some(cache) = &self.row_cache {
            if cache.matches(key.0, row, flags) {
                return cache.get(col as usize);
            }
        }

        let table_id = self.advance(key, manifest, art)?;
        let table = self.tables.get(&table_id)?;
        let cache = RowCache::fill(key.0, row, flags, table);
        self.stats.rows += 1;
        let color = cache.get(col as usize);
        self.row_cache = Some(cache);
        color
    }

    /// The finished sample table for a tile, if it has one yet.
    pub fn table(&self, identity: &TileIdentity) -> Option<&SampleTable> {
        let entry = self.entries.get(&identity.context_key())?;
        if entry.state != EntryState::Sampled {
            return None;
        }
        self.tables.get(&entry.source.as_ref()?.table_id())
    }

    // Returns Some(Some(name)) when a per-identity file exists, Some(None)
    // when neither exists, None when out of presence budget.
    fn probe_files<A: ArtStore + ?Sized>(&mut self, identity: &TileIdentity, art: &A) -> Option<Option<String>> {
        let stem = identity.stem();
        let candidates = [format!("{}.png", stem), format!("{}.bmp", stem)];
        for name in &candidates {
            match self.art.get(&Resource::File(name.clone())) {
                Some(Art::Missing) => continue,
                Some(_) => return Some(Some(name.clone())),
                None => {}
            }
            if !self.presence_budget.try_take() {
                return None;
            }
            self.stats.probes += 1;
            if art.exists(name) {
                self.art.insert(Resource::File(name.clone()), Art::Present);
                return Some(Some(name.clone()));
            }
            self.art.insert(Resource::File(name.clone()), Art::Missing);
        }
        Some(None)
    }

    // Some(present) once known, None when out of presence budget.
    fn probe_resource<A: ArtStore + ?Sized>(&mut self, source: &Source, manifest: &ManifestStore, art: &A) -> Option<bool> {
        let resource = source.resource();
        if let Some(known) = self.art.get(&resource) {
            return Some(!matches!(known, Art::Missing | Art::Failed));
        }
        let Resource::Sheet(index) = resource else {
            // file probes are recorded by probe_files
            return Some(false);
        };
        let sheet = manifest.sheet(index)?;
        if !self.presence_budget.try_take() {
            return None;
        }
        self.stats.probes += 1;
        let present = art.exists(&sheet.file);
        if !present {
            debug!("replace: sheet {} not found", sheet.file);
        }
        self.art
            .insert(resource, if present { Art::Present } else { Art::Missing });
        Some(present)
    }

    // Push an entry towards Sampled as far as the load budget allows.
    fn advance<A: ArtStore + ?Sized>(&mut self, key: ContextKey, manifest: &ManifestStore, art: &A) -> Option<TableId> {
        loop {
            let (state, source) = {
                let entry = self.entries.get(&key)?;
                (entry.state, entry.source.clone())
            };
            let source = source?;
            match state {
                EntryState::Unchecked | EntryState::Absent => return None,
                EntryState::Sampled => return Some(source.table_id()),
                EntryState::Present => {
                    let resource = source.resource();
                    let loaded = matches!(self.art.get(&resource), Some(Art::Decoded(_)) | Some(Art::Released));
                    let loadable = matches!(self.art.get(&resource), Some(Art::Present));
                    if !loaded {
                        if !loadable {
                            self.set_state(key, EntryState::Absent, None);
                            return None;
                        }
                        if !self.load_budget.try_take() {
                            return None;
                        }
                        let name = match &resource {
                            Resource::Sheet(i) => manifest.sheet(*i)?.file.clone(),
                            Resource::File(name) => name.clone(),
                        };
                        self.stats.decodes += 1;
                        match art.load(&name) {
                            Ok(img) => {
                                debug!("replace: decoded {} ({}x{})", name, img.width(), img.height());
                                self.art.insert(resource, Art::Decoded(img));
                            }
                            Err(e) => {
                                warn!("replace: {}; native tiles stay in use", e);
                                self.stats.decode_failures += 1;
                                self.art.insert(resource, Art::Failed);
                                self.set_state(key, EntryState::Absent, None);
                                return None;
                            }
                        }
                    }
                    self.set_state(key, EntryState::Decoded, Some(source));
                }
                EntryState::Decoded => {
                    let table_id = source.table_id();
                    if !self.tables.contains_key(&table_id) {
                        // a resample costs one load plus its eight rows
                        if self.row_budget.remaining() < TABLE_ROWS || !self.load_budget.try_take() {
                            return None;
                        }
                        self.row_budget.try_take_n(TABLE_ROWS);
                        match self.build_table(&source, manifest) {
                            Some(table) => {
                                self.stats.tables += 1;
                                self.tables.insert(table_id, table);
                            }
                            None => {
                                self.set_state(key, EntryState::Absent, None);
                                return None;
                            }
                        }
                    }
                    if let Source::File { name } = &source {
                        self.art.insert(Resource::File(name.clone()), Art::Released);
                    }
                    self.set_state(key, EntryState::Sampled, Some(source));
                }
            }
        }
    }

    fn build_table(&self, source: &Source, manifest: &ManifestStore) -> Option<SampleTable> {
        let Some(Art::Decoded(img)) = self.art.get(&source.resource()) else {
            return None;
        };
        let (w, h) = img.dimensions();
        let rect = match source {
            Source::Sheet { hash, .. } => {
                let entry = manifest.lookup(*hash)?;
                match entry.region(w, h) {
                    Some(rect) => rect,
                    None => {
                        warn!("replace: {:08X} cell lies outside its {}x{} sheet", hash, w, h);
                        return None;
                    }
                }
            }
            Source::File { .. } => CellRect { x: 0, y: 0, w, h },
        };
        if rect.w < 1 || rect.h < 1 {
            return None;
        }
        Some(SampleTable::from_region(img, rect))
    }

    fn set_state(&mut self, key: ContextKey, state: EntryState, source: Option<Source>) {
        let entry = self.entries.entry(key).or_default();
        entry.state = state;
        entry.source = source;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget every entry, image and table; budgets start empty again.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.art.clear();
        self.tables.clear();
        self.row_cache = None;
        self.presence_budget.drain();
        self.load_budget.drain();
        self.row_budget.drain();
        self.stats = CacheStats::default();
    }
}

#[cfg(test)]
mod tests;
