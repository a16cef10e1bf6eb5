//! Per-forwarder scratch space for batched access.
//!
//! Sized for the full line count at construction and reused under the
//! forwarder lock, so batched calls do not allocate.

use std::sync::Arc;

use dio_core::{DioResult, LineHandle, LineMask};

pub(crate) struct Scratch {
    /// Compacted values; bit `j` belongs to `lines[j]`.
    pub(crate) values: LineMask,
    pub(crate) lines: Vec<Arc<dyn LineHandle>>,
}

impl Scratch {
    pub(crate) fn new(line_count: usize) -> Self {
        Self {
            values: LineMask::new(line_count),
            lines: Vec::with_capacity(line_count),
        }
    }

    /// Collect the handles selected by `mask`, in ascending position order.
    ///
    /// `handle` resolves one position; its first error aborts the fill.
    pub(crate) fn fill<'a, F>(&mut self, mask: &LineMask, handle: F) -> DioResult<()>
    where
        F: Fn(u32) -> DioResult<&'a Arc<dyn LineHandle>>,
    {
        self.lines.clear();
        for position in mask.iter_ones() {
            let line = handle(position as u32)?;
            self.lines.push(line.clone());
        }
        Ok(())
    }

    /// Copy the bits selected by `mask` into the compacted value bitmap.
    pub(crate) fn compact_values(&mut self, mask: &LineMask, bits: &LineMask) {
        self.values.clear();
        for (j, position) in mask.iter_ones().enumerate() {
            self.values.assign(j, bits.test(position));
        }
    }

    /// Scatter compacted values back to the positions selected by `mask`.
    pub(crate) fn expand_values(&self, mask: &LineMask, bits: &mut LineMask) {
        for (j, position) in mask.iter_ones().enumerate() {
            bits.assign(position, self.values.test(j));
        }
    }

    /// Drop handle references held from the last batch.
    pub(crate) fn release(&mut self) {
        self.lines.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_and_expand() {
        let mut scratch = Scratch::new(8);
        let mask = LineMask::from_positions(8, [1, 4, 6]);
        let bits = LineMask::from_positions(8, [4, 5]);

        scratch.compact_values(&mask, &bits);
        assert_eq!(scratch.values.to_bools()[..3], [false, true, false]);

        let mut out = LineMask::full(8);
        scratch.expand_values(&mask, &mut out);
        // Unselected positions are left alone.
        assert_eq!(
            out.to_bools(),
            vec![true, false, true, true, true, true, false, true]
        );
    }

    #[test]
    fn test_compact_clears_previous_values() {
        let mut scratch = Scratch::new(4);
        scratch.values = LineMask::full(4);
        let mask = LineMask::from_positions(4, [0]);
        scratch.compact_values(&mask, &LineMask::new(4));
        assert_eq!(scratch.values.count_ones(), 0);
    }
}
