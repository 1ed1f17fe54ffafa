use super::decode::{decode_planar, PaletteLookup, TilePixels};
use super::{BitDepth, ContextKey, TileFlags};
use crate::budget::FrameBudget;
use crate::codec::Crc32;
use std::collections::HashMap;

/// CRC-32 over the resolved pixels.
///
/// Row-major; every pixel feeds its A, R, G, B bytes. A transparent pixel
/// feeds four zero bytes whatever its color bits, so tiles that differ only
/// under transparency hash the same.
pub fn content_hash(pixels: &TilePixels) -> u32 {
    let mut crc = Crc32::new();
    for &argb in pixels.0.iter() {
        if argb >> 24 == 0 {
            crc.update(&[0, 0, 0, 0]);
        } else {
            crc.update(&argb.to_be_bytes());
        }
    }
    crc.finish()
}

pub fn content_hash_raw<P: PaletteLookup + ?Sized>(
    vram: &[u16],
    address: u16,
    depth: BitDepth,
    flags: TileFlags,
    palette_base: u16,
    palette: &P,
) -> u32 {
    content_hash(&decode_planar(vram, address, depth, flags, palette_base, palette))
}

/// Context key -> content hash, filled at most once per key.
///
/// New hashes draw from a per-frame budget. When it runs dry `get_or_compute`
/// returns `None` and the caller renders natively for now.
#[derive(Debug)]
pub struct HashMemo {
    hashes: HashMap<ContextKey, u32>,
    budget: FrameBudget,
    computed: u64,
}

impl HashMemo {
    pub fn new(budget: u32) -> Self {
        Self {
            hashes: HashMap::new(),
            budget: FrameBudget::new(budget),
            computed: 0,
        }
    }

    pub fn begin_frame(&mut self) {
        self.budget.refill();
    }

    pub fn get(&self, key: ContextKey) -> Option<u32> {
        self.hashes.get(&key).copied()
    }

    pub fn get_or_compute<F>(&mut self, key: ContextKey, compute: F) -> Option<u32>
    where
        F: FnOnce() -> u32,
    {
        if let Some(&hash) = self.hashes.get(&key) {
            return Some(hash);
        }
        if !self.budget.try_take() {
            return None;
        }
        let hash = compute();
        self.hashes.insert(key, hash);
        self.computed += 1;
        Some(hash)
    }

    /// Record a hash computed elsewhere. An existing entry wins.
    pub fn insert(&mut self, key: ContextKey, hash: u32) -> u32 {
        *self.hashes.entry(key).or_insert(hash)
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn computed(&self) -> u64 {
        self.computed
    }

    pub fn set_budget(&mut self, max: u32) {
        self.budget.set_max(max);
    }

    pub fn clear(&mut self) {
        self.hashes.clear();
        self.budget.drain();
        self.computed = 0;
    }
}
