//! Size/age histogram used to turn a byte budget into a cutoff tick.
//!
//! The range `[lo, hi]` is split into at most `capacity` equal-width
//! buckets (fewer when the range holds fewer ticks, so short ranges get
//! exact per-tick buckets). Bucket `i` covers ticks
//! `[start(i), start(i + 1))` with `start(i) = lo + ceil(i * span / n)`.

/// Fixed-bucket histogram of resident bytes by last-access tick.
#[derive(Debug, Clone)]
pub struct TsSize {
    capacity: usize,
    lo: i32,
    hi: i32,
    buckets: Vec<u64>,
    total: u64,
}

impl TsSize {
    pub fn new(capacity: usize) -> Self {
        let mut h = Self {
            capacity: capacity.max(1),
            lo: 0,
            hi: 0,
            buckets: Vec::new(),
            total: 0,
        };
        h.init(0, 0);
        h
    }

    /// Clears every bucket and spans `[lo, hi]`. An inverted range collapses
    /// to the single tick `lo`.
    pub fn init(&mut self, lo: i32, hi: i32) {
        let hi = hi.max(lo);
        self.lo = lo;
        self.hi = hi;
        let n = (self.span() as u64).min(self.capacity as u64) as usize;
        self.buckets.clear();
        self.buckets.resize(n, 0);
        self.total = 0;
    }

    fn span(&self) -> i64 {
        self.hi as i64 - self.lo as i64 + 1
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn range(&self) -> (i32, i32) {
        (self.lo, self.hi)
    }

    fn bucket_of(&self, tick: i32) -> usize {
        let t = tick.clamp(self.lo, self.hi) as i128 - self.lo as i128;
        let idx = t * self.buckets.len() as i128 / self.span() as i128;
        (idx as usize).min(self.buckets.len() - 1)
    }

    /// First tick of bucket `i`; `i == bucket_count()` yields `hi + 1`.
    pub fn bucket_start(&self, i: usize) -> i64 {
        let n = self.buckets.len() as i128;
        let num = i as i128 * self.span() as i128;
        self.lo as i64 + ((num + n - 1) / n) as i64
    }

    /// Accounts `bytes` to `tick`. Ticks outside the range land in the
    /// nearest edge bucket.
    pub fn add(&mut self, tick: i32, bytes: u64) {
        let idx = self.bucket_of(tick);
        self.buckets[idx] = self.buckets[idx].saturating_add(bytes);
        self.total = self.total.saturating_add(bytes);
    }

    /// Total bytes accounted since the last `init`.
    pub fn size(&self) -> u64 {
        self.total
    }

    /// Smallest tick such that everything at or after it fits in `budget`.
    ///
    /// Walks buckets from newest to oldest; the bucket that pushes the sum
    /// over budget and everything older is below the returned tick. Returns
    /// `lo` when the whole histogram fits.
    pub fn cut_ts(&self, budget: u64) -> i32 {
        let mut acc = 0u64;
        for i in (0..self.buckets.len()).rev() {
            acc = acc.saturating_add(self.buckets[i]);
            if acc > budget {
                return self.bucket_start(i + 1).min(self.hi as i64) as i32;
            }
        }
        self.lo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_range_gets_one_bucket_per_tick() {
        let mut h = TsSize::new(10_000);
        h.init(100, 149);
        assert_eq!(h.bucket_count(), 50);
        for t in 100..150 {
            h.add(t, 10);
        }
        assert_eq!(h.size(), 500);
        // newest 20 ticks fit in 200 bytes
        assert_eq!(h.cut_ts(200), 130);
    }

    #[test]
    fn whole_range_fits() {
        let mut h = TsSize::new(16);
        h.init(-5, 5);
        h.add(0, 100);
        assert_eq!(h.cut_ts(100), -5);
        assert_eq!(h.cut_ts(1_000), -5);
    }

    #[test]
    fn out_of_range_ticks_clamp_to_edges() {
        let mut h = TsSize::new(4);
        h.init(0, 99);
        h.add(-1_000, 1);
        h.add(1_000, 2);
        assert_eq!(h.size(), 3);
        // newest bucket alone is over a 1-byte budget: cut lands on hi
        assert_eq!(h.cut_ts(1), 99);
        assert_eq!(h.cut_ts(2), 25);
    }

    #[test]
    fn wide_range_uses_capacity_buckets() {
        let mut h = TsSize::new(10);
        h.init(i32::MIN, i32::MAX);
        assert_eq!(h.bucket_count(), 10);
        assert_eq!(h.bucket_start(0), i32::MIN as i64);
        assert_eq!(h.bucket_start(10), i32::MAX as i64 + 1);
        h.add(i32::MAX, 5);
        h.add(i32::MIN, 5);
        assert_eq!(h.cut_ts(5), h.bucket_start(1) as i32);
    }

    #[test]
    fn budget_convergence_is_tight() {
        // buckets summing to twice the budget
        let budget = 1_000u64;
        let mut h = TsSize::new(100);
        h.init(0, 99);
        for t in 0..100 {
            h.add(t, 20);
        }
        assert_eq!(h.size(), 2 * budget);
        let cut = h.cut_ts(budget);
        let newer: u64 = (cut..100).map(|_| 20u64).sum();
        assert!(newer <= budget);
        // one more tick would overflow the budget
        assert!(newer + 20 > budget);
        assert_eq!(cut, 50);
    }

    #[test]
    fn inverted_range_collapses() {
        let mut h = TsSize::new(8);
        h.init(10, 3);
        assert_eq!(h.range(), (10, 10));
        assert_eq!(h.bucket_count(), 1);
        h.add(10, 7);
        assert_eq!(h.cut_ts(6), 10);
    }
}
