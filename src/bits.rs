//! Bit-packed integer I/O.
//!
//! A [`BitBuffer`] is a growable array of 64-bit words written most
//! significant bit first: bit 0 of the stream is the top bit of word 0. The
//! same buffer carries fixed-width integers, Elias-Delta codes and
//! Golomb-Rice codes, so the whole description of a hash function is a
//! single stream that can be read at any bit position.
//!
//! Reads do not check the written extent on the hot path. Callers know the
//! extents from the description header.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitBuffer {
    words: Vec<u64>,
    len: u64,
}

impl BitBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-sizes the buffer for roughly `bits` bits.
    pub fn with_capacity(bits: u64) -> Self {
        Self {
            words: Vec::with_capacity(bits.div_ceil(64) as usize),
            len: 0,
        }
    }

    /// Number of bits written.
    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Makes room for `bits` more bits.
    pub fn reserve(&mut self, bits: u64) {
        let words = (self.len + bits).div_ceil(64) as usize;
        self.words.reserve(words.saturating_sub(self.words.len()));
    }

    /// Appends the low `width` bits of `value`, most significant first.
    #[inline]
    pub fn write_bits(&mut self, value: u64, width: u32) {
        debug_assert!(width <= 64);
        if width == 0 {
            return;
        }
        debug_assert!(width == 64 || value >> width == 0, "{value} does not fit in {width} bits");
        let offset = (self.len % 64) as u32;
        if offset == 0 {
            self.words.push(0);
        }
        let last = self.words.len() - 1;
        let free = 64 - offset;
        if width <= free {
            self.words[last] |= value << (free - width);
        } else {
            let spill = width - free;
            self.words[last] |= value >> spill;
            self.words.push(value << (64 - spill));
        }
        self.len += width as u64;
    }

    /// Reads `width` bits starting at bit `pos`.
    #[inline]
    pub fn read_bits(&self, pos: u64, width: u32) -> u64 {
        debug_assert!(width <= 64);
        if width == 0 {
            return 0;
        }
        let index = (pos / 64) as usize;
        let offset = (pos % 64) as u32;
        let mut window = self.words[index] << offset;
        if offset + width > 64 {
            window |= self.words[index + 1] >> (64 - offset);
        }
        window >> (64 - width)
    }

    /// 64-bit window starting at `pos`, zero-padded past the last word.
    #[inline]
    fn peek(&self, pos: u64) -> u64 {
        let index = (pos / 64) as usize;
        let offset = (pos % 64) as u32;
        let high = self.words.get(index).map_or(0, |w| w << offset);
        if offset == 0 {
            return high;
        }
        high | self.words.get(index + 1).map_or(0, |w| w >> (64 - offset))
    }

    /// Counts one-bits up to the terminating zero and moves past it.
    #[inline]
    fn read_unary(&self, pos: &mut u64) -> u64 {
        let mut count = 0;
        loop {
            let ones = self.peek(*pos).leading_ones() as u64;
            if ones < 64 {
                *pos += ones + 1;
                return count + ones;
            }
            count += 64;
            *pos += 64;
        }
    }

    /// Writes a positive integer as an Elias-Delta code.
    ///
    /// # Panics
    ///
    /// Panics if `value` is zero; the code has no codeword for it.
    pub fn write_elias_delta(&mut self, value: u64) {
        assert!(value > 0, "Elias-Delta codes positive integers only");
        let n = 64 - value.leading_zeros();
        let l = 32 - n.leading_zeros();
        self.write_bits(0, l - 1);
        self.write_bits(n as u64, l);
        self.write_bits(low_bits(value, n - 1), n - 1);
    }

    pub fn read_elias_delta(&self, pos: &mut u64) -> u64 {
        let zeros = self.peek(*pos).leading_zeros();
        *pos += zeros as u64;
        let n = self.read_bits(*pos, zeros + 1) as u32;
        *pos += (zeros + 1) as u64;
        let rest = self.read_bits(*pos, n - 1);
        *pos += (n - 1) as u64;
        (1u64 << (n - 1)) | rest
    }

    pub fn elias_delta_size(value: u64) -> u64 {
        debug_assert!(value > 0);
        let n = 64 - value.leading_zeros();
        let l = 32 - n.leading_zeros();
        (2 * l - 2 + n) as u64
    }

    /// Golomb-Rice code with parameter `shift`: `value >> shift` in unary
    /// (one-bits closed by a zero) followed by the low `shift` bits.
    pub fn write_golomb_rice(&mut self, shift: u32, value: u64) {
        debug_assert!(shift < 64);
        self.reserve(Self::golomb_rice_size(shift, value));
        let mut quotient = value >> shift;
        while quotient >= 64 {
            self.write_bits(u64::MAX, 64);
            quotient -= 64;
        }
        self.write_bits(((1u64 << quotient) - 1) << 1, quotient as u32 + 1);
        self.write_bits(low_bits(value, shift), shift);
    }

    #[inline]
    pub fn read_golomb_rice(&self, pos: &mut u64, shift: u32) -> u64 {
        let quotient = self.read_unary(pos);
        let remainder = self.read_bits(*pos, shift);
        *pos += shift as u64;
        (quotient << shift) | remainder
    }

    /// Position just past the Golomb-Rice codeword starting at `pos`.
    #[inline]
    pub fn skip_golomb_rice(&self, mut pos: u64, shift: u32) -> u64 {
        self.read_unary(&mut pos);
        pos + shift as u64
    }

    /// Codeword length, used to reserve room before writing.
    #[inline]
    pub fn golomb_rice_size(shift: u32, value: u64) -> u64 {
        (value >> shift) + 1 + shift as u64
    }

    /// Appends all bits of `other`.
    pub fn append(&mut self, other: &BitBuffer) {
        self.append_range(other, 0, other.len);
    }

    /// Appends bits `from..to` of `other`.
    pub fn append_range(&mut self, other: &BitBuffer, from: u64, to: u64) {
        debug_assert!(from <= to && to <= other.len);
        if self.len % 64 == 0 && from % 64 == 0 {
            let first = (from / 64) as usize;
            let last = to.div_ceil(64) as usize;
            self.words.extend_from_slice(&other.words[first..last]);
            self.len += to - from;
            let tail = (self.len % 64) as u32;
            if tail != 0 {
                if let Some(w) = self.words.last_mut() {
                    *w &= !(u64::MAX >> tail);
                }
            }
            return;
        }
        let mut pos = from;
        while pos < to {
            let width = (to - pos).min(64) as u32;
            self.write_bits(other.read_bits(pos, width), width);
            pos += width as u64;
        }
    }

    /// Big-endian packing, rounded up to whole bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let size = self.len.div_ceil(8) as usize;
        let mut out = Vec::with_capacity(self.words.len() * 8);
        for w in &self.words {
            out.extend_from_slice(&w.to_be_bytes());
        }
        out.truncate(size);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let words = bytes
            .chunks(8)
            .map(|chunk| {
                let mut word = [0u8; 8];
                word[..chunk.len()].copy_from_slice(chunk);
                u64::from_be_bytes(word)
            })
            .collect();
        Self {
            words,
            len: bytes.len() as u64 * 8,
        }
    }
}

#[inline]
fn low_bits(value: u64, width: u32) -> u64 {
    if width >= 64 {
        value
    } else {
        value & ((1u64 << width) - 1)
    }
}

/// Zig-zag mapping of signed integers onto unsigned ones: 0, -1, 1, -2, ...
#[inline]
pub fn fold_signed(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

#[inline]
pub fn unfold_signed(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Number of bits needed to represent `value` (0 for 0).
#[inline]
pub fn bit_width(value: u64) -> u32 {
    64 - value.leading_zeros()
}
