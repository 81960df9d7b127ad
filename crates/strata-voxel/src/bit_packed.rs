//! Fixed-width index storage packed into `u64` words.
//!
//! Widths are powers of two (0, 1, 2, 4, 8 or 16 bits), so an entry never
//! straddles a word boundary.

use serde::{Deserialize, Serialize};

/// Palette indices packed at a uniform bit width.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedIndices {
    words: Vec<u64>,
    bits: u8,
    len: usize,
}

impl PackedIndices {
    /// Creates `len` zeroed entries at the given width.
    pub fn new(bits: u8, len: usize) -> Self {
        debug_assert!(
            matches!(bits, 0 | 1 | 2 | 4 | 8 | 16),
            "unsupported index width {bits}"
        );
        let words = if bits == 0 {
            0
        } else {
            (len * bits as usize).div_ceil(64)
        };
        Self {
            words: vec![0; words],
            bits,
            len,
        }
    }

    /// Smallest supported width able to address `distinct` palette entries.
    pub fn width_for(distinct: usize) -> u8 {
        match distinct {
            0 | 1 => 0,
            2 => 1,
            3..=4 => 2,
            5..=16 => 4,
            17..=256 => 8,
            _ => 16,
        }
    }

    pub fn get(&self, index: usize) -> u16 {
        debug_assert!(index < self.len);
        if self.bits == 0 {
            return 0;
        }
        let (word, shift) = self.locate(index);
        ((self.words[word] >> shift) & self.mask()) as u16
    }

    pub fn set(&mut self, index: usize, value: u16) {
        debug_assert!(index < self.len);
        if self.bits == 0 {
            debug_assert_eq!(value, 0, "zero-width storage only holds index 0");
            return;
        }
        debug_assert!(u64::from(value) <= self.mask(), "index {value} overflows width");
        let (word, shift) = self.locate(index);
        let mask = self.mask();
        self.words[word] = (self.words[word] & !(mask << shift)) | (u64::from(value) << shift);
    }

    /// Copies every entry into storage of a new width, remapping through `map`.
    pub fn repacked(&self, bits: u8, map: impl Fn(u16) -> u16) -> Self {
        let mut out = Self::new(bits, self.len);
        if bits > 0 {
            for i in 0..self.len {
                out.set(i, map(self.get(i)));
            }
        }
        out
    }

    pub fn bits(&self) -> u8 {
        self.bits
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Heap bytes used by the packed words.
    pub fn storage_bytes(&self) -> usize {
        self.words.len() * std::mem::size_of::<u64>()
    }

    fn locate(&self, index: usize) -> (usize, u32) {
        let per_word = 64 / self.bits as usize;
        let word = index / per_word;
        let shift = ((index % per_word) * self.bits as usize) as u32;
        (word, shift)
    }

    fn mask(&self) -> u64 {
        (1u64 << self.bits) - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_width_reads_zero() {
        let p = PackedIndices::new(0, 4096);
        assert_eq!(p.get(0), 0);
        assert_eq!(p.get(4095), 0);
        assert_eq!(p.storage_bytes(), 0);
    }

    #[test]
    fn test_each_width_holds_its_max_value() {
        for bits in [1u8, 2, 4, 8, 16] {
            let max = if bits == 16 { u16::MAX } else { (1u16 << bits) - 1 };
            let mut p = PackedIndices::new(bits, 300);
            for i in 0..300 {
                p.set(i, if i % 2 == 0 { max } else { 0 });
            }
            for i in 0..300 {
                let expected = if i % 2 == 0 { max } else { 0 };
                assert_eq!(p.get(i), expected, "width {bits}, index {i}");
            }
        }
    }

    #[test]
    fn test_set_does_not_disturb_neighbours() {
        let mut p = PackedIndices::new(4, 32);
        p.set(15, 0xF);
        p.set(16, 0x3);
        p.set(15, 0x1);
        assert_eq!(p.get(14), 0);
        assert_eq!(p.get(15), 0x1);
        assert_eq!(p.get(16), 0x3);
    }

    #[test]
    fn test_width_thresholds() {
        assert_eq!(PackedIndices::width_for(1), 0);
        assert_eq!(PackedIndices::width_for(2), 1);
        assert_eq!(PackedIndices::width_for(4), 2);
        assert_eq!(PackedIndices::width_for(5), 4);
        assert_eq!(PackedIndices::width_for(17), 8);
        assert_eq!(PackedIndices::width_for(257), 16);
    }

    #[test]
    fn test_repack_preserves_values() {
        let mut p = PackedIndices::new(2, 100);
        for i in 0..100 {
            p.set(i, (i % 4) as u16);
        }
        let wide = p.repacked(8, |v| v + 10);
        for i in 0..100 {
            assert_eq!(wide.get(i), (i % 4) as u16 + 10);
        }
        // 4096 entries at 4 bits = 2048 bytes
        assert_eq!(PackedIndices::new(4, 4096).storage_bytes(), 2048);
    }
}
