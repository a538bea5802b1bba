// Wand Inference - Ring Window
//
// The inference window: `slices` equal regions written round-robin, one per
// drained slab. Reads are relative to the oldest slice so the classifier always
// sees the window in time order.

use crate::error::BufferError;

#[derive(Debug, Clone)]
pub struct RingWindow {
    data: Vec<f32>,
    slice_len: usize,
    slices: usize,
    /// Next slice to overwrite; once warm, also the oldest slice.
    cursor: usize,
}

impl RingWindow {
    /// Zero-filled window of `slices * slice_len` scalars.
    pub fn new(slices: usize, slice_len: usize) -> Self {
        Self {
            data: vec![0.0; slices * slice_len],
            slice_len,
            slices,
            cursor: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn slice_len(&self) -> usize {
        self.slice_len
    }

    pub fn slices(&self) -> usize {
        self.slices
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Overwrite slice `index` in place. Does not move the cursor.
    ///
    /// Bounds-checked entry point for callers that hold a finished slice,
    /// such as a model harness seeding a window. The inference task writes
    /// through [`RingWindow::fill_next`] instead, straight from the slab.
    pub fn write_slice(&mut self, index: usize, data: &[f32]) -> Result<(), BufferError> {
        if index >= self.slices {
            return Err(BufferError::SliceIndex {
                index,
                slices: self.slices,
            });
        }
        if data.len() != self.slice_len {
            return Err(BufferError::SliceLength {
                expected: self.slice_len,
                actual: data.len(),
            });
        }
        let start = index * self.slice_len;
        self.data[start..start + self.slice_len].copy_from_slice(data);
        Ok(())
    }

    /// Let `fill` write the slice under the cursor, then advance and wrap.
    /// Returns the slice index that was written.
    pub fn fill_next<F>(&mut self, fill: F) -> usize
    where
        F: FnOnce(&mut [f32]),
    {
        let index = self.cursor;
        let start = index * self.slice_len;
        fill(&mut self.data[start..start + self.slice_len]);
        self.cursor = (self.cursor + 1) % self.slices;
        index
    }

    /// Copy `length` scalars starting `offset` past the oldest slice into
    /// `out`, wrapping to the start of storage at the end.
    pub fn read_range(&self, offset: usize, out: &mut [f32]) -> Result<(), BufferError> {
        let capacity = self.capacity();
        let length = out.len();
        if offset.checked_add(length).map_or(true, |end| end > capacity) {
            return Err(BufferError::OutOfBounds {
                offset,
                length,
                capacity,
            });
        }
        if length == 0 {
            return Ok(());
        }

        let start = (self.cursor * self.slice_len + offset) % capacity;
        let first = length.min(capacity - start);
        out[..first].copy_from_slice(&self.data[start..start + first]);
        out[first..].copy_from_slice(&self.data[..length - first]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slab(tag: f32, len: usize) -> Vec<f32> {
        (0..len).map(|i| tag + i as f32 / 100.0).collect()
    }

    #[test]
    fn starts_zeroed() {
        let ring = RingWindow::new(3, 4);
        let mut out = vec![1.0; 12];
        ring.read_range(0, &mut out).unwrap();
        assert!(out.iter().all(|&v| v == 0.0));
        assert_eq!(ring.cursor(), 0);
    }

    #[test]
    fn cursor_wraps() {
        let mut ring = RingWindow::new(3, 2);
        let written: Vec<usize> = (0..7).map(|_| ring.fill_next(|dst| dst.fill(1.0))).collect();
        assert_eq!(written, vec![0, 1, 2, 0, 1, 2, 0]);
        assert_eq!(ring.cursor(), 1);
    }

    #[test]
    fn full_read_is_oldest_to_newest() {
        let slices = 4;
        let len = 6;
        let mut ring = RingWindow::new(slices, len);
        let drained: Vec<Vec<f32>> = (1..=10).map(|t| slab(t as f32, len)).collect();

        for (n, data) in drained.iter().enumerate() {
            ring.fill_next(|dst| dst.copy_from_slice(data));
            if n + 1 >= slices {
                let mut out = vec![0.0; slices * len];
                ring.read_range(0, &mut out).unwrap();
                let expected: Vec<f32> = drained[n + 1 - slices..=n].concat();
                assert_eq!(out, expected);
            }
        }
    }

    #[test]
    fn partial_read_wraps_mid_buffer() {
        let mut ring = RingWindow::new(3, 2);
        for tag in [1.0, 2.0, 3.0, 4.0] {
            ring.fill_next(|dst| dst.fill(tag));
        }
        // Storage is [4,4,2,2,3,3]; oldest slice is index 1.
        let mut out = [0.0; 3];
        ring.read_range(3, &mut out).unwrap();
        assert_eq!(out, [3.0, 4.0, 4.0]);
    }

    #[test]
    fn warmup_pads_with_zeros() {
        let mut ring = RingWindow::new(3, 2);
        ring.fill_next(|dst| dst.fill(5.0));
        let mut out = [9.0; 6];
        ring.read_range(0, &mut out).unwrap();
        // Cursor sits on an untouched slice, so the real data comes last.
        assert_eq!(out, [0.0, 0.0, 0.0, 0.0, 5.0, 5.0]);
    }

    #[test]
    fn rejects_bad_ranges_and_slices() {
        let mut ring = RingWindow::new(2, 3);
        let mut out = [0.0; 4];
        assert!(matches!(
            ring.read_range(3, &mut out),
            Err(BufferError::OutOfBounds { offset: 3, length: 4, capacity: 6 })
        ));
        assert!(ring.read_range(usize::MAX, &mut out).is_err());
        assert_eq!(
            ring.write_slice(2, &[0.0; 3]),
            Err(BufferError::SliceIndex { index: 2, slices: 2 })
        );
        assert_eq!(
            ring.write_slice(0, &[0.0; 2]),
            Err(BufferError::SliceLength { expected: 3, actual: 2 })
        );
        ring.write_slice(1, &[7.0; 3]).unwrap();
        let mut all = [0.0; 6];
        ring.read_range(0, &mut all).unwrap();
        assert_eq!(all, [0.0, 0.0, 0.0, 7.0, 7.0, 7.0]);
    }
}
