use super::*;
use crate::codec::rgb_to_color15;
use crate::tile::{BitDepth, TileFlags};
use image::Rgba;
use std::cell::Cell;
use std::collections::HashMap;

#[derive(Default)]
struct MemArt {
    images: HashMap<String, RgbaImage>,
    broken: Vec<String>,
    probes: Cell<u32>,
    loads: Cell<u32>,
}

impl MemArt {
    fn with(mut self, name: &str, img: RgbaImage) -> Self {
        self.images.insert(name.to_string(), img);
        self
    }
}

impl ArtStore for MemArt {
    fn exists(&self, name: &str) -> bool {
        self.probes.set(self.probes.get() + 1);
        self.images.contains_key(name) || self.broken.iter().any(|b| b == name)
    }

    fn load(&self, name: &str) -> Result<RgbaImage, String> {
        self.loads.set(self.loads.get() + 1);
        self.images
            .get(name)
            .cloned()
            .ok_or_else(|| format!("Failed to decode {}", name))
    }
}

// 32x32 art: every 4x4 block a distinct color, blocks on one diagonal band
// transparent.
fn art_32() -> RgbaImage {
    RgbaImage::from_fn(32, 32, |x, y| {
        let (bx, by) = (x / 4, y / 4);
        let a = if (bx + by) % 5 == 0 { 0 } else { 255 };
        Rgba([(bx * 32) as u8, (by * 32) as u8, 0x80, a])
    })
}

fn tile(character: u16) -> TileIdentity {
    TileIdentity::background(0, character, 0, 0, BitDepth::Bpp4, TileFlags::empty())
}

fn loaded(text: &str) -> ManifestStore {
    let mut m = ManifestStore::new();
    m.load(text);
    m
}

// Run frames until the tile's table is sampled.
fn settle<A: ArtStore>(cache: &mut ReplacementCache, id: &TileIdentity, manifest: &ManifestStore, art: &A) {
    for _ in 0..8 {
        cache.begin_frame();
        if cache.sample_color(id, 0, 0, manifest, art).is_some() || cache.state(id.context_key()) == EntryState::Sampled {
            return;
        }
    }
}

#[test]
fn test_nearest_center() {
    assert_eq!(nearest_center(0, 8, 0), 0);
    assert_eq!(nearest_center(0, 8, 7), 7);
    assert_eq!(nearest_center(0, 32, 0), 2);
    assert_eq!(nearest_center(0, 32, 7), 30);
    assert_eq!(nearest_center(64, 16, 3), 64 + 7);
}

#[test]
fn test_scale4_manifest_art_yields_all_opaque_samples() {
    let manifest = loaded("# hd.png\nAABBCCDD col=0 row=0 scale=4\n");
    let art = MemArt::default().with("hd.png", art_32());
    let mut cache = ReplacementCache::new(&HdConfig::default());
    let id = tile(3);

    cache.begin_frame();
    assert!(cache.has_replacement(&id, Some(0xAABB_CCDD), &manifest, &art));
    settle(&mut cache, &id, &manifest, &art);
    assert_eq!(cache.state(id.context_key()), EntryState::Sampled);

    let src = art_32();
    let mut opaque = 0;
    cache.begin_frame();
    for row in 0..8u8 {
        for col in 0..8u8 {
            let p = src.get_pixel(col as u32 * 4 + 2, row as u32 * 4 + 2).0;
            let got = cache.sample_color(&id, row, col, &manifest, &art);
            if p[3] != 0 {
                opaque += 1;
                assert_eq!(got, Some(rgb_to_color15(p[0], p[1], p[2])), "({}, {})", row, col);
            } else {
                assert_eq!(got, None, "transparent art pixel ({}, {})", row, col);
            }
        }
    }
    assert_eq!(opaque, cache.table(&id).unwrap().opaque_count());
    assert!(opaque > 0 && opaque < 64);
}

#[test]
fn test_load_budget_spreads_decode_and_resample() {
    let manifest = loaded("# hd.png\nAABBCCDD col=0 row=0 scale=4\n");
    let art = MemArt::default().with("hd.png", art_32());
    let mut cache = ReplacementCache::new(&HdConfig::default());
    let id = tile(3);

    cache.begin_frame();
    assert!(cache.has_replacement(&id, Some(0xAABB_CCDD), &manifest, &art));
    assert_eq!(cache.sample_color(&id, 0, 1, &manifest, &art), None);
    assert_eq!(cache.state(id.context_key()), EntryState::Decoded);
    cache.begin_frame();
    assert!(cache.sample_color(&id, 0, 1, &manifest, &art).is_some());
    assert_eq!(cache.state(id.context_key()), EntryState::Sampled);
}

#[test]
fn test_unknown_hash_stays_unchecked() {
    let manifest = loaded("# hd.png\nAABBCCDD col=0 row=0\n");
    let art = MemArt::default().with("hd.png", art_32());
    let mut cache = ReplacementCache::new(&HdConfig::default());
    cache.begin_frame();
    let id = tile(1);
    assert!(!cache.has_replacement(&id, None, &manifest, &art));
    assert_eq!(cache.state(id.context_key()), EntryState::Unchecked);
    assert_eq!(art.probes.get(), 0);
}

#[test]
fn test_falls_back_to_per_identity_files() {
    let manifest = ManifestStore::new();
    let id = tile(7);
    let name = format!("{}.bmp", id.stem());
    let art = MemArt::default().with(&name, RgbaImage::from_pixel(8, 8, Rgba([255, 0, 0, 255])));
    let mut cache = ReplacementCache::new(&HdConfig::default());

    cache.begin_frame();
    assert!(cache.has_replacement(&id, Some(0x1234), &manifest, &art));
    settle(&mut cache, &id, &manifest, &art);
    cache.begin_frame();
    assert_eq!(cache.sample_color(&id, 4, 4, &manifest, &art), Some(0x001F));

    let missing = tile(8);
    assert!(!cache.has_replacement(&missing, Some(0x5678), &manifest, &art));
    assert_eq!(cache.state(missing.context_key()), EntryState::Absent);
}

#[test]
fn test_presence_budget_limits_probes_per_frame() {
    let config = HdConfig {
        presence_budget: 2,
        ..HdConfig::default()
    };
    let manifest = ManifestStore::new();
    let art = MemArt::default();
    let mut cache = ReplacementCache::new(&config);

    cache.begin_frame();
    for c in 0..4 {
        assert!(!cache.has_replacement(&tile(c), None, &manifest, &art));
    }
    // each missing tile costs a .png and a .bmp probe
    assert_eq!(art.probes.get(), 2);
    assert_eq!(cache.state(tile(0).context_key()), EntryState::Absent);
    assert_eq!(cache.state(tile(1).context_key()), EntryState::Unchecked);

    cache.begin_frame();
    for c in 0..4 {
        cache.has_replacement(&tile(c), None, &manifest, &art);
    }
    assert_eq!(art.probes.get(), 4);
    assert_eq!(cache.state(tile(1).context_key()), EntryState::Absent);
}

#[test]
fn test_decode_failure_is_terminal() {
    let manifest = loaded("# broken.png\n00000001 col=0 row=0\n00000002 col=1 row=0\n");
    let art = MemArt {
        broken: vec!["broken.png".to_string()],
        ..MemArt::default()
    };
    let mut cache = ReplacementCache::new(&HdConfig::default());
    let (a, b) = (tile(1), tile(2));

    cache.begin_frame();
    assert!(cache.has_replacement(&a, Some(1), &manifest, &art));
    assert_eq!(cache.sample_color(&a, 0, 0, &manifest, &art), None);
    assert_eq!(cache.state(a.context_key()), EntryState::Absent);
    assert!(!cache.has_replacement(&a, Some(1), &manifest, &art));

    // the other entry on the same sheet does not retry the decode
    for _ in 0..3 {
        cache.begin_frame();
        assert!(!cache.has_replacement(&b, Some(2), &manifest, &art));
        assert_eq!(cache.sample_color(&b, 0, 0, &manifest, &art), None);
    }
    assert_eq!(art.loads.get(), 1);
    assert_eq!(cache.stats().decode_failures, 1);
}

#[test]
fn test_sheet_decoded_once_for_many_entries() {
    let manifest = loaded("# hd.png cols=4 rows=4\n00000001 col=0 row=0\n00000002 col=3 row=3\n");
    let art = MemArt::default().with("hd.png", art_32());
    let mut cache = ReplacementCache::new(&HdConfig::default());
    let (a, b) = (tile(1), tile(2));

    cache.begin_frame();
    assert!(cache.has_replacement(&a, Some(1), &manifest, &art));
    assert!(cache.has_replacement(&b, Some(2), &manifest, &art));
    settle(&mut cache, &a, &manifest, &art);
    settle(&mut cache, &b, &manifest, &art);
    assert_eq!(art.loads.get(), 1);
    assert_eq!(art.probes.get(), 1);
    assert_eq!(cache.stats().tables, 2);
}

#[test]
fn test_same_hash_shares_sample_table() {
    let manifest = loaded("# hd.png\nAABBCCDD col=0 row=0 scale=4\n");
    let art = MemArt::default().with("hd.png", art_32());
    let mut cache = ReplacementCache::new(&HdConfig::default());
    let (a, b) = (tile(1), tile(2));

    cache.begin_frame();
    cache.has_replacement(&a, Some(0xAABB_CCDD), &manifest, &art);
    cache.has_replacement(&b, Some(0xAABB_CCDD), &manifest, &art);
    settle(&mut cache, &a, &manifest, &art);
    cache.begin_frame();
    // decoded and sampled already; b needs no load budget
    assert!(cache.sample_color(&b, 0, 1, &manifest, &art).is_some());
    assert_eq!(cache.stats().tables, 1);
}

#[test]
fn test_row_budget_meters_resampling() {
    let config = HdConfig {
        row_budget: 12,
        load_budget: 4,
        ..HdConfig::default()
    };
    let manifest = loaded("# hd.png cols=4 rows=4\n00000001 col=0 row=0\n00000002 col=1 row=0\n");
    let art = MemArt::default().with("hd.png", RgbaImage::from_pixel(32, 32, Rgba([8, 16, 24, 255])));
    let mut cache = ReplacementCache::new(&config);
    let (a, b) = (tile(1), tile(2));

    cache.begin_frame();
    cache.has_replacement(&a, Some(1), &manifest, &art);
    cache.has_replacement(&b, Some(2), &manifest, &art);
    for col in 0..8 {
        assert_eq!(cache.sample_color(&a, 2, col, &manifest, &art), Some(1 | 2 << 5 | 3 << 10));
    }
    // the second table needs eight rows of budget and only four are left
    assert_eq!(cache.sample_color(&b, 0, 0, &manifest, &art), None);
    assert_eq!(cache.state(b.context_key()), EntryState::Decoded);
    cache.begin_frame();
    assert!(cache.sample_color(&b, 0, 0, &manifest, &art).is_some());
    assert_eq!(cache.stats().tables, 2);
}

#[test]
fn test_sampled_rows_do_not_drain_budget() {
    let config = HdConfig {
        row_budget: 8,
        ..HdConfig::default()
    };
    let manifest = loaded("# hd.png\nAABBCCDD col=0 row=0 scale=4\n");
    let art = MemArt::default().with("hd.png", RgbaImage::from_pixel(32, 32, Rgba([8, 16, 24, 255])));
    let mut cache = ReplacementCache::new(&config);
    let ids: Vec<TileIdentity> = (0..64).map(tile).collect();

    cache.begin_frame();
    for id in &ids {
        cache.has_replacement(id, Some(0xAABB_CCDD), &manifest, &art);
    }
    settle(&mut cache, &ids[0], &manifest, &art);

    // a full scan of many tiles, every row a cache miss, in a single frame
    cache.begin_frame();
    let mut served = 0;
    for row in 0..8u8 {
        for id in &ids {
            for col in 0..8u8 {
                if cache.sample_color(id, row, col, &manifest, &art).is_some() {
                    served += 1;
                }
            }
        }
    }
    assert_eq!(served, 64 * 64);
    assert_eq!(cache.stats().tables, 1);
}

#[test]
fn test_reset_discards_everything() {
    let manifest = loaded("# hd.png\nAABBCCDD col=0 row=0 scale=4\n");
    let art = MemArt::default().with("hd.png", art_32());
    let mut cache = ReplacementCache::new(&HdConfig::default());
    let id = tile(3);
    cache.begin_frame();
    cache.has_replacement(&id, Some(0xAABB_CCDD), &manifest, &art);
    settle(&mut cache, &id, &manifest, &art);

    cache.reset();
    assert!(cache.is_empty());
    assert_eq!(cache.state(id.context_key()), EntryState::Unchecked);
    // budgets are empty until the next frame
    assert!(!cache.has_replacement(&id, Some(0xAABB_CCDD), &manifest, &art));
    cache.begin_frame();
    assert!(cache.has_replacement(&id, Some(0xAABB_CCDD), &manifest, &art));
}
