#![forbid(unsafe_code)]

//! Fixed-capacity sample window with a write cursor.
//!
//! # Invariants
//!
//! 1. `len() <= capacity()` and `capacity() >= 1`.
//! 2. Once full, each `push` overwrites the oldest sample.
//! 3. `mean()` covers exactly the samples currently held, so a partial
//!    window averages what it has.

/// Ring buffer of `f64` samples.
#[derive(Debug, Clone, PartialEq)]
pub struct RingWindow {
    slots: Box<[f64]>,
    len: usize,
    /// Next slot to write.
    cursor: usize,
}

impl RingWindow {
    /// A window of `capacity` slots (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![0.0; capacity.max(1)].into_boxed_slice(),
            len: 0,
            cursor: 0,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    pub fn push(&mut self, sample: f64) {
        self.slots[self.cursor] = sample;
        self.cursor = (self.cursor + 1) % self.slots.len();
        self.len = (self.len + 1).min(self.slots.len());
    }

    /// Mean of the held samples, `None` when empty.
    #[must_use]
    pub fn mean(&self) -> Option<f64> {
        if self.len == 0 {
            return None;
        }
        Some(self.iter().sum::<f64>() / self.len as f64)
    }

    /// Held samples, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        let cap = self.slots.len();
        let start = (self.cursor + cap - self.len) % cap;
        (0..self.len).map(move |i| self.slots[(start + i) % cap])
    }

    /// A window of `capacity` slots holding the newest samples of `self`
    /// that fit.
    #[must_use]
    pub fn resized(&self, capacity: usize) -> Self {
        let mut next = Self::new(capacity);
        let skip = self.len.saturating_sub(next.capacity());
        for sample in self.iter().skip(skip) {
            next.push(sample);
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_window_averages_what_it_has() {
        let mut w = RingWindow::new(4);
        assert_eq!(w.mean(), None);
        w.push(2.0);
        w.push(4.0);
        assert_eq!(w.len(), 2);
        assert_eq!(w.mean(), Some(3.0));
        assert!(!w.is_full());
    }

    #[test]
    fn full_window_overwrites_oldest() {
        let mut w = RingWindow::new(3);
        for v in [1.0, 2.0, 3.0, 4.0] {
            w.push(v);
        }
        assert!(w.is_full());
        assert_eq!(w.iter().collect::<Vec<_>>(), vec![2.0, 3.0, 4.0]);
        assert_eq!(w.mean(), Some(3.0));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut w = RingWindow::new(0);
        assert_eq!(w.capacity(), 1);
        w.push(5.0);
        w.push(6.0);
        assert_eq!(w.mean(), Some(6.0));
    }

    #[test]
    fn shrinking_keeps_newest() {
        let mut w = RingWindow::new(5);
        for v in 1..=7 {
            w.push(f64::from(v));
        }
        let small = w.resized(2);
        assert_eq!(small.iter().collect::<Vec<_>>(), vec![6.0, 7.0]);

        let big = small.resized(4);
        assert_eq!(big.len(), 2);
        assert_eq!(big.capacity(), 4);
        assert_eq!(big.mean(), Some(6.5));
    }
}
