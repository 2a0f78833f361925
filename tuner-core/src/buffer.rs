//! # Circular Audio Buffer
//!
//! Fixed-capacity ring holding the most recent `capacity` samples of a
//! stream. Reading `capacity` samples starting at the write cursor (and
//! wrapping) always yields the newest window, oldest sample first.

use std::borrow::Cow;

#[derive(Debug, Clone)]
pub struct CircularBuffer {
    ring: Vec<f32>,
    /// Next write position, always in `0..capacity`.
    idx: usize,
    /// Samples written since creation, saturating at `capacity`.
    filled: usize,
}

impl CircularBuffer {
    /// Creates a zeroed ring. `capacity` must be non-zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "CircularBuffer capacity must be non-zero");
        Self {
            ring: vec![0.0; capacity],
            idx: 0,
            filled: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.ring.len()
    }

    /// Write cursor position.
    pub fn position(&self) -> usize {
        self.idx
    }

    /// True once at least `capacity` samples have been written.
    pub fn is_full(&self) -> bool {
        self.filled == self.ring.len()
    }

    /// Appends `samples`, overwriting the oldest data.
    ///
    /// Uses at most two contiguous copies. When `samples` is longer than the
    /// ring only its final `capacity` samples are kept.
    pub fn write(&mut self, samples: &[f32]) {
        let cap = self.ring.len();
        if samples.is_empty() {
            return;
        }

        // Only the tail that can still be read back matters.
        let kept = &samples[samples.len().saturating_sub(cap)..];
        let start = (self.idx + (samples.len() - kept.len())) % cap;

        let first = kept.len().min(cap - start);
        self.ring[start..start + first].copy_from_slice(&kept[..first]);
        let rest = kept.len() - first;
        self.ring[..rest].copy_from_slice(&kept[first..]);

        self.idx = (start + kept.len()) % cap;
        self.filled = (self.filled + kept.len()).min(cap);
    }

    /// The most recent `capacity` samples in chronological order.
    ///
    /// Borrows the ring directly when the cursor sits at 0; otherwise joins
    /// the tail after the cursor with the head before it.
    pub fn snapshot(&self) -> Cow<'_, [f32]> {
        if self.idx == 0 {
            return Cow::Borrowed(&self.ring);
        }
        let mut window = Vec::with_capacity(self.ring.len());
        window.extend_from_slice(&self.ring[self.idx..]);
        window.extend_from_slice(&self.ring[..self.idx]);
        Cow::Owned(window)
    }

    /// Zeroes the ring and rewinds the cursor.
    pub fn clear(&mut self) {
        self.ring.fill(0.0);
        self.idx = 0;
        self.filled = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(start: usize, len: usize) -> Vec<f32> {
        (start..start + len).map(|i| i as f32).collect()
    }

    #[test]
    fn exact_fill_in_one_write_borrows_ring() {
        let mut buf = CircularBuffer::new(8);
        buf.write(&ramp(0, 8));
        assert!(buf.is_full());
        assert_eq!(buf.position(), 0);
        let snap = buf.snapshot();
        assert!(matches!(snap, Cow::Borrowed(_)));
        assert_eq!(&*snap, ramp(0, 8).as_slice());
    }

    #[test]
    fn snapshot_is_independent_of_chunking() {
        let data = ramp(0, 16);
        for chunk in [1, 3, 5, 7, 16] {
            let mut buf = CircularBuffer::new(16);
            for part in data.chunks(chunk) {
                buf.write(part);
            }
            assert_eq!(&*buf.snapshot(), data.as_slice(), "chunk size {chunk}");
        }
    }

    #[test]
    fn overflow_keeps_only_newest_samples() {
        let mut buf = CircularBuffer::new(8);
        for part in ramp(0, 21).chunks(4) {
            buf.write(part);
        }
        assert_eq!(buf.position(), 21 % 8);
        assert_eq!(&*buf.snapshot(), ramp(13, 8).as_slice());
    }

    #[test]
    fn write_longer_than_capacity_keeps_final_samples() {
        let mut buf = CircularBuffer::new(8);
        buf.write(&ramp(0, 3));
        buf.write(&ramp(3, 19));
        assert!(buf.is_full());
        assert_eq!(buf.position(), 22 % 8);
        assert_eq!(&*buf.snapshot(), ramp(14, 8).as_slice());
    }

    #[test]
    fn empty_write_is_a_no_op() {
        let mut buf = CircularBuffer::new(4);
        buf.write(&[1.0, 2.0]);
        buf.write(&[]);
        assert_eq!(buf.position(), 2);
        assert!(!buf.is_full());
        assert_eq!(&*buf.snapshot(), &[0.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn partially_filled_buffer_reports_not_full() {
        let mut buf = CircularBuffer::new(4);
        buf.write(&[1.0, 2.0, 3.0]);
        assert!(!buf.is_full());
        buf.write(&[4.0]);
        assert!(buf.is_full());
    }

    #[test]
    fn clear_resets_state() {
        let mut buf = CircularBuffer::new(4);
        buf.write(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        buf.clear();
        assert_eq!(buf.position(), 0);
        assert!(!buf.is_full());
        assert_eq!(&*buf.snapshot(), &[0.0; 4]);
    }
}
