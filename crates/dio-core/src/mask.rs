//! Fixed-length bitset over line positions.

use std::fmt;

const WORD_BITS: usize = u64::BITS as usize;

/// A fixed-length set of bits, one per line position.
///
/// Used both as a selection mask and as a value bitmap. The length is fixed at
/// construction; bits beyond it are always zero.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct LineMask {
    len: usize,
    words: Vec<u64>,
}

impl LineMask {
    /// All-zero mask of `len` bits.
    pub fn new(len: usize) -> Self {
        Self {
            len,
            words: vec![0; words_for(len)],
        }
    }

    /// All-one mask of `len` bits.
    pub fn full(len: usize) -> Self {
        let mut mask = Self::new(len);
        for word in mask.words.iter_mut() {
            *word = u64::MAX;
        }
        mask.trim();
        mask
    }

    /// Mask of `len` bits with the given positions set.
    ///
    /// Positions at or beyond `len` are ignored.
    pub fn from_positions(len: usize, positions: impl IntoIterator<Item = usize>) -> Self {
        let mut mask = Self::new(len);
        for position in positions {
            if position < len {
                mask.set(position);
            }
        }
        mask
    }

    /// Mask whose bit `i` is `values[i]`.
    pub fn from_bools(values: &[bool]) -> Self {
        let mut mask = Self::new(values.len());
        for (i, &value) in values.iter().enumerate() {
            mask.assign(i, value);
        }
        mask
    }

    /// Number of bits.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the mask has zero bits.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Test bit `i`. Out-of-range bits read as zero.
    pub fn test(&self, i: usize) -> bool {
        if i >= self.len {
            return false;
        }
        self.words[i / WORD_BITS] & (1 << (i % WORD_BITS)) != 0
    }

    /// Set bit `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= len()`.
    pub fn set(&mut self, i: usize) {
        self.assign(i, true);
    }

    /// Clear bit `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= len()`.
    pub fn reset(&mut self, i: usize) {
        self.assign(i, false);
    }

    /// Set bit `i` to `value`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= len()`.
    pub fn assign(&mut self, i: usize, value: bool) {
        assert!(i < self.len, "bit {} out of range for mask of {}", i, self.len);
        let bit = 1u64 << (i % WORD_BITS);
        let word = &mut self.words[i / WORD_BITS];
        if value {
            *word |= bit;
        } else {
            *word &= !bit;
        }
    }

    /// Clear every bit.
    pub fn clear(&mut self) {
        for word in self.words.iter_mut() {
            *word = 0;
        }
    }

    /// Number of set bits.
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Iterate over set positions in ascending order.
    pub fn iter_ones(&self) -> IterOnes<'_> {
        IterOnes {
            words: &self.words,
            index: 0,
            current: self.words.first().copied().unwrap_or(0),
        }
    }

    /// Index of the highest set bit, if any.
    pub fn last_one(&self) -> Option<usize> {
        self.words
            .iter()
            .enumerate()
            .rev()
            .find(|(_, w)| **w != 0)
            .map(|(i, w)| i * WORD_BITS + (WORD_BITS - 1 - w.leading_zeros() as usize))
    }

    /// Values as booleans, one per bit.
    pub fn to_bools(&self) -> Vec<bool> {
        (0..self.len).map(|i| self.test(i)).collect()
    }

    fn trim(&mut self) {
        let tail = self.len % WORD_BITS;
        if tail != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u64 << tail) - 1;
            }
        }
    }
}

impl fmt::Debug for LineMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LineMask[{}](", self.len)?;
        for i in 0..self.len {
            write!(f, "{}", if self.test(i) { '1' } else { '0' })?;
        }
        write!(f, ")")
    }
}

/// Iterator over the set positions of a [`LineMask`].
pub struct IterOnes<'a> {
    words: &'a [u64],
    index: usize,
    current: u64,
}

impl Iterator for IterOnes<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        loop {
            if self.current != 0 {
                let bit = self.current.trailing_zeros() as usize;
                self.current &= self.current - 1;
                return Some(self.index * WORD_BITS + bit);
            }
            self.index += 1;
            self.current = *self.words.get(self.index)?;
        }
    }
}

fn words_for(len: usize) -> usize {
    len.div_ceil(WORD_BITS)
}
