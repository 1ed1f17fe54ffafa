use crate::config::MAX_FADE_WINDOW;
use crate::tile::{ContextKey, TilePixels};
use std::collections::HashMap;

/// Alpha-weighted mean luma (BT.601 weights) of a tile, 0..=255.
pub fn luminance(pixels: &TilePixels) -> u8 {
    let mut weighted: u64 = 0;
    let mut alpha_sum: u64 = 0;
    for &argb in pixels.0.iter() {
        let a = (argb >> 24) as u64;
        if a == 0 {
            continue;
        }
        let r = ((argb >> 16) & 0xFF) as u64;
        let g = ((argb >> 8) & 0xFF) as u64;
        let b = (argb & 0xFF) as u64;
        let y = (77 * r + 150 * g + 29 * b) >> 8;
        weighted += y * a;
        alpha_sum += a;
    }
    if alpha_sum == 0 {
        return 0;
    }
    (weighted / alpha_sum) as u8
}

#[derive(Debug, Clone)]
struct Window {
    samples: [u8; MAX_FADE_WINDOW as usize],
    len: usize,
    head: usize,
    last_frame: u64,
}

impl Window {
    fn new() -> Self {
        Self {
            samples: [0; MAX_FADE_WINDOW as usize],
            len: 0,
            head: 0,
            last_frame: u64::MAX,
        }
    }

    fn push(&mut self, value: u8, capacity: usize) {
        self.samples[self.head] = value;
        self.head = (self.head + 1) % capacity;
        if self.len < capacity {
            self.len += 1;
        }
    }

    fn spread(&self) -> u8 {
        let live = &self.samples[..self.len];
        let max = live.iter().copied().max().unwrap_or(0);
        let min = live.iter().copied().min().unwrap_or(0);
        max - min
    }
}

/// Per-tile luminance history used to hold back tiles caught mid-fade.
///
/// A tile is stable once it was sampled on each of the last `window`
/// consecutive frames and those samples lie within `tolerance` of each other.
/// With a window of 1 every tile is stable on first sight.
#[derive(Debug)]
pub struct FadeTracker {
    window: usize,
    tolerance: u8,
    windows: HashMap<ContextKey, Window>,
}

impl FadeTracker {
    pub fn new(window: u8, tolerance: u8) -> Self {
        Self {
            window: window.clamp(1, MAX_FADE_WINDOW) as usize,
            tolerance,
            windows: HashMap::new(),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn tolerance(&self) -> u8 {
        self.tolerance
    }

    /// True when `key` already contributed its sample for `frame`.
    pub fn sampled_in(&self, key: ContextKey, frame: u64) -> bool {
        self.windows.get(&key).is_some_and(|w| w.last_frame == frame)
    }

    /// Add this frame's sample and report stability. A second sample in the
    /// same frame is ignored.
    pub fn observe(&mut self, key: ContextKey, frame: u64, luma: u8) -> bool {
        if self.window <= 1 {
            return true;
        }
        let capacity = self.window;
        let w = self.windows.entry(key).or_insert_with(Window::new);
        if w.last_frame != frame {
            if w.last_frame.wrapping_add(1) != frame {
                // a skipped frame breaks the run
                w.len = 0;
                w.head = 0;
            }
            w.last_frame = frame;
            w.push(luma, capacity);
        }
        w.len == capacity && w.spread() <= self.tolerance
    }

    pub fn forget(&mut self, key: ContextKey) {
        self.windows.remove(&key);
    }

    pub fn tracked(&self) -> usize {
        self.windows.len()
    }

    pub fn clear(&mut self) {
        self.windows.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(argb: u32) -> TilePixels {
        TilePixels([argb; 64])
    }

    #[test]
    fn test_luminance_weights_alpha() {
        assert_eq!(luminance(&TilePixels::default()), 0);
        assert_eq!(luminance(&solid(0xFFFF_FFFF)), 255);
        assert_eq!(luminance(&solid(0xFF00_0000)), 0);

        let mut half = solid(0xFFFF_FFFF);
        for p in half.0.iter_mut().skip(32) {
            *p = 0; // transparent pixels do not drag the mean down
        }
        assert_eq!(luminance(&half), 255);
    }

    #[test]
    fn test_window_of_one_is_always_stable() {
        let mut fade = FadeTracker::new(1, 0);
        assert!(fade.observe(ContextKey(1), 0, 10));
        assert!(fade.observe(ContextKey(1), 1, 200));
        assert_eq!(fade.tracked(), 0);
    }

    #[test]
    fn test_monotonic_fade_is_never_stable() {
        let n = 4u8;
        let mut fade = FadeTracker::new(n, 2);
        let key = ContextKey(7);
        for frame in 0..20u64 {
            assert!(!fade.observe(key, frame, (frame * 10) as u8), "frame {}", frame);
        }
    }

    #[test]
    fn test_needs_full_window_of_stable_frames() {
        let n = 4u8;
        let mut fade = FadeTracker::new(n, 2);
        let key = ContextKey(7);
        // N unstable frames
        for frame in 0..n as u64 {
            assert!(!fade.observe(key, frame, (frame * 40) as u8));
        }
        // one stable-looking frame does not admit: the window still holds the ramp
        assert!(!fade.observe(key, 4, 160));
        assert!(!fade.observe(key, 5, 161));
        assert!(!fade.observe(key, 6, 160));
        // fourth consecutive similar sample fills the window
        assert!(fade.observe(key, 7, 159));
    }

    #[test]
    fn test_gap_between_frames_restarts_window() {
        let mut fade = FadeTracker::new(4, 2);
        let key = ContextKey(11);
        for frame in [1u64, 5, 9, 13, 17] {
            assert!(!fade.observe(key, frame, 100), "frame {}", frame);
        }
        assert!(!fade.observe(key, 18, 100));
        assert!(!fade.observe(key, 19, 100));
        assert!(fade.observe(key, 20, 100));
    }

    #[test]
    fn test_same_frame_sample_counts_once() {
        let mut fade = FadeTracker::new(2, 0);
        let key = ContextKey(3);
        assert!(!fade.observe(key, 0, 50));
        assert!(fade.sampled_in(key, 0));
        assert!(!fade.observe(key, 0, 50));
        assert!(fade.observe(key, 1, 50));
    }

    #[test]
    fn test_window_is_clamped() {
        assert_eq!(FadeTracker::new(0, 0).window(), 1);
        assert_eq!(FadeTracker::new(200, 0).window(), MAX_FADE_WINDOW as usize);
    }
}
