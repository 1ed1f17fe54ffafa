/// Per-frame work quota.
///
/// Every component that touches the filesystem, decodes images or hashes tiles
/// draws from one of these. `refill` runs once per frame from the engine's
/// `begin_frame`; a component that finds its budget empty returns "not ready"
/// and the same request is retried on a later call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameBudget {
    max: u32,
    remaining: u32,
}

impl FrameBudget {
    /// A budget that starts empty until the first `refill`, matching a
    /// power-on state where no frame has begun yet.
    pub fn new(max: u32) -> Self {
        Self { max, remaining: 0 }
    }

    /// A budget that is usable immediately.
    pub fn full(max: u32) -> Self {
        Self {
            max,
            remaining: max,
        }
    }

    pub fn refill(&mut self) {
        self.remaining = self.max;
    }

    pub fn drain(&mut self) {
        self.remaining = 0;
    }

    /// Consume one unit. Returns false (and consumes nothing) when exhausted.
    pub fn try_take(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }

    /// Consume `n` units at once, or nothing when fewer remain.
    pub fn try_take_n(&mut self, n: u32) -> bool {
        if self.remaining < n {
            return false;
        }
        self.remaining -= n;
        true
    }

    pub fn has_remaining(&self) -> bool {
        self.remaining > 0
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn set_max(&mut self, max: u32) {
        self.max = max;
        self.remaining = self.remaining.min(max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_budget_starts_empty() {
        let mut b = FrameBudget::new(3);
        assert!(!b.try_take());
        b.refill();
        assert_eq!(b.remaining(), 3);
    }

    #[test]
    fn test_take_until_exhausted() {
        let mut b = FrameBudget::full(2);
        assert!(b.try_take());
        assert!(b.try_take());
        assert!(!b.try_take());
        assert_eq!(b.remaining(), 0);

        b.refill();
        assert!(b.has_remaining());
    }

    #[test]
    fn test_zero_budget_never_grants() {
        let mut b = FrameBudget::full(0);
        assert!(!b.try_take());
        b.refill();
        assert!(!b.try_take());
    }

    #[test]
    fn test_take_n_is_all_or_nothing() {
        let mut b = FrameBudget::full(10);
        assert!(b.try_take_n(8));
        assert!(!b.try_take_n(8));
        assert_eq!(b.remaining(), 2);
        assert!(b.try_take_n(2));
        assert!(b.try_take_n(0));
    }

    #[test]
    fn test_set_max_clamps_remaining() {
        let mut b = FrameBudget::full(10);
        b.set_max(4);
        assert_eq!(b.remaining(), 4);
        assert_eq!(b.max(), 4);
    }
}
