//! The serialized minimal perfect hash function.
//!
//! ```text
//! EliasDelta(N + 1)
//! MonotoneList   B + 1 bucket bit offsets, relative to the stream start
//! MonotoneList   B + 1 cumulative regular key counts
//! bucket streams
//! fallback       EliasDelta(F + 1) ...
//! ```

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::bdz::BdzReader;
use crate::bits::BitBuffer;
use crate::evaluator::Evaluator;
use crate::monotone::MonotoneList;
use crate::settings::Settings;

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Description {
    buffer: BitBuffer,
}

/// Parsed view of the description header.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Header<'a> {
    pub keys: u64,
    pub bucket_bits: MonotoneList<'a>,
    pub bucket_keys: MonotoneList<'a>,
    pub streams_pos: u64,
    pub fallback: BdzReader<'a>,
}

impl Description {
    pub(crate) fn from_buffer(buffer: BitBuffer) -> Self {
        Self { buffer }
    }

    pub(crate) fn buffer(&self) -> &BitBuffer {
        &self.buffer
    }

    pub(crate) fn header(&self) -> Header<'_> {
        let mut pos = 0;
        let keys = self.buffer.read_elias_delta(&mut pos) - 1;
        let bucket_bits = MonotoneList::load(&self.buffer, pos);
        let bucket_keys = MonotoneList::load(&self.buffer, bucket_bits.end());
        let streams_pos = bucket_keys.end();
        let streams_len = if bucket_bits.is_empty() {
            0
        } else {
            bucket_bits.get(bucket_bits.len() - 1)
        };
        let fallback = BdzReader::load(&self.buffer, streams_pos + streams_len);
        Header {
            keys,
            bucket_bits,
            bucket_keys,
            streams_pos,
            fallback,
        }
    }

    /// Number of keys the function was built over.
    pub fn key_count(&self) -> u64 {
        let mut pos = 0;
        self.buffer.read_elias_delta(&mut pos) - 1
    }

    pub fn bit_len(&self) -> u64 {
        self.buffer.len()
    }

    /// Size in bits per key; the plain size for an empty key set.
    pub fn bits_per_key(&self) -> f64 {
        self.bit_len() as f64 / self.key_count().max(1) as f64
    }

    /// Number of keys stored in the fallback.
    pub fn fallback_keys(&self) -> u64 {
        self.header().fallback.len()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.buffer.to_bytes()
    }

    /// Accepts the output of [`Description::to_bytes`]. Trailing padding bits
    /// are never read.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::from_buffer(BitBuffer::from_bytes(bytes))
    }

    /// A cursor over this description. `settings` must be the parameters the
    /// description was built with.
    pub fn evaluator<'a, H>(&'a self, hash: H, settings: &'a Settings) -> Evaluator<'a, H> {
        Evaluator::new(self, hash, settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bdz::{self, BdzConfig};
    use crate::hash::Mix64Hash;

    fn empty_description() -> Description {
        let mut buf = BitBuffer::new();
        buf.write_elias_delta(1);
        MonotoneList::write(&mut buf, &[0]);
        MonotoneList::write(&mut buf, &[0]);
        let none: [&u64; 0] = [];
        bdz::generate(&Mix64Hash, &none, &BdzConfig::default(), &mut buf).unwrap();
        Description::from_buffer(buf)
    }

    #[test]
    fn header_of_empty_set() {
        let d = empty_description();
        let header = d.header();
        assert_eq!(header.keys, 0);
        assert_eq!(header.bucket_bits.len(), 1);
        assert_eq!(header.bucket_keys.len(), 1);
        assert!(header.fallback.is_empty());
        assert_eq!(d.key_count(), 0);
        assert_eq!(d.fallback_keys(), 0);
        assert_eq!(d.bits_per_key(), d.bit_len() as f64);
    }

    #[test]
    fn bytes_keep_the_header_readable() {
        let d = empty_description();
        let back = Description::from_bytes(&d.to_bytes());
        assert!(back.bit_len() >= d.bit_len());
        assert_eq!(back.bit_len() % 8, 0);
        assert_eq!(back.key_count(), 0);
        assert_eq!(back.header().streams_pos, d.header().streams_pos);
    }
}
