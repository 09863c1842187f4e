//! Fixed-length packed bit vectors.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const WORD_BITS: usize = 64;

/// Bit sequence packed into `u64` words, bit `j` in word `j / 64`.
/// Bits past `len` are always zero.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BitVector {
    words: Vec<u64>,
    len: usize,
}

fn words_for(len: usize) -> usize {
    len.div_ceil(WORD_BITS)
}

impl BitVector {
    pub fn zeros(len: usize) -> Self {
        Self {
            words: vec![0; words_for(len)],
            len,
        }
    }

    pub fn ones(len: usize) -> Self {
        let mut bv = Self {
            words: vec![u64::MAX; words_for(len)],
            len,
        };
        bv.clear_tail();
        bv
    }

    pub fn from_bools<I: IntoIterator<Item = bool>>(bits: I) -> Self {
        let mut words = Vec::new();
        let mut len = 0;
        for bit in bits {
            if len % WORD_BITS == 0 {
                words.push(0);
            }
            if bit {
                words[len / WORD_BITS] |= 1u64 << (len % WORD_BITS);
            }
            len += 1;
        }
        Self { words, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }

    pub fn get(&self, index: usize) -> bool {
        index < self.len && self.words[index / WORD_BITS] >> (index % WORD_BITS) & 1 == 1
    }

    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn and(&self, other: &BitVector) -> Result<BitVector> {
        self.zip_with(other, |a, b| a & b)
    }

    /// `self AND NOT other`.
    pub fn and_not(&self, other: &BitVector) -> Result<BitVector> {
        self.zip_with(other, |a, b| a & !b)
    }

    pub fn not(&self) -> BitVector {
        let mut out = Self {
            words: self.words.iter().map(|w| !w).collect(),
            len: self.len,
        };
        out.clear_tail();
        out
    }

    /// Appends `other`'s bits after this vector's last bit.
    pub fn append(&mut self, other: &BitVector) {
        let shift = self.len % WORD_BITS;
        if shift == 0 {
            self.words.extend_from_slice(&other.words);
        } else {
            for &w in &other.words {
                if let Some(last) = self.words.last_mut() {
                    *last |= w << shift;
                }
                self.words.push(w >> (WORD_BITS - shift));
            }
        }
        self.len += other.len;
        self.words.truncate(words_for(self.len));
    }

    fn zip_with(&self, other: &BitVector, op: impl Fn(u64, u64) -> u64) -> Result<BitVector> {
        if self.len != other.len {
            return Err(Error::LengthMismatch {
                left: self.len,
                right: other.len,
            });
        }
        let mut out = Self {
            words: self
                .words
                .iter()
                .zip(&other.words)
                .map(|(&a, &b)| op(a, b))
                .collect(),
            len: self.len,
        };
        out.clear_tail();
        Ok(out)
    }

    fn clear_tail(&mut self) {
        let rem = self.len % WORD_BITS;
        if rem != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u64 << rem) - 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(len: usize, every: usize) -> Vec<bool> {
        (0..len).map(|i| i % every == 0).collect()
    }

    #[test]
    fn from_bools_sets_matching_positions() {
        let bv = BitVector::from_bools([true, false, true, true]);
        assert_eq!(bv.len(), 4);
        assert!(bv.get(0) && !bv.get(1) && bv.get(2) && bv.get(3));
        assert!(!bv.get(4));
        assert_eq!(bv.count_ones(), 3);
    }

    #[test]
    fn not_keeps_padding_clear() {
        let bv = BitVector::from_bools(pattern(70, 3));
        let inverted = bv.not();
        assert_eq!(inverted.count_ones(), 70 - bv.count_ones());
        assert_eq!(BitVector::ones(70).count_ones(), 70);
        assert_eq!(BitVector::zeros(70).not(), BitVector::ones(70));
    }

    #[test]
    fn and_not_counts() {
        let a = BitVector::from_bools([true, true, true, false]);
        let b = BitVector::from_bools([false, true, false, false]);
        assert_eq!(a.and_not(&b).unwrap().count_ones(), 2);
        assert_eq!(a.and(&b).unwrap().count_ones(), 1);
    }

    #[test]
    fn length_mismatch_is_an_error() {
        let a = BitVector::zeros(3);
        let b = BitVector::zeros(4);
        assert!(matches!(a.and(&b), Err(Error::LengthMismatch { left: 3, right: 4 })));
    }

    #[test]
    fn append_across_word_boundaries_matches_direct_build() {
        for (left, right) in [(0, 5), (5, 0), (63, 2), (64, 64), (10, 130), (100, 29)] {
            let a_bits = pattern(left, 2);
            let b_bits = pattern(right, 5);
            let mut joined = BitVector::from_bools(a_bits.iter().copied());
            joined.append(&BitVector::from_bools(b_bits.iter().copied()));
            let direct = BitVector::from_bools(a_bits.into_iter().chain(b_bits));
            assert_eq!(joined, direct, "left={left} right={right}");
        }
    }

    #[test]
    fn empty_vectors_are_legal() {
        let empty = BitVector::from_bools(std::iter::empty());
        assert!(empty.is_empty());
        assert_eq!(empty.count_ones(), 0);
        assert_eq!(empty.not().count_ones(), 0);
    }
}
