//! Query side: walks one bucket's recursion tree for a single key.

use crate::description::{Description, Header};
use crate::hash::{UniversalHash, scale, supplemental_hash};
use crate::settings::{SUPPLEMENTAL_HASH_SHIFT, Settings, SplitPlan};

/// Read-only cursor over a [`Description`]. Cheap to create, `Sync` whenever
/// the hash is, and never mutated by queries.
#[derive(Debug, Clone)]
pub struct Evaluator<'a, H> {
    description: &'a Description,
    header: Header<'a>,
    settings: &'a Settings,
    hash: H,
}

impl<'a, H> Evaluator<'a, H> {
    pub fn new(description: &'a Description, hash: H, settings: &'a Settings) -> Self {
        Self {
            description,
            header: description.header(),
            settings,
            hash,
        }
    }

    pub fn key_count(&self) -> u64 {
        self.header.keys
    }

    /// Index of `key` in `[0, N)`. Keys outside the build set get an
    /// arbitrary index in the same range.
    pub fn evaluate<K>(&self, key: &K) -> u64
    where
        K: ?Sized,
        H: UniversalHash<K>,
    {
        let n = self.header.keys;
        if n == 0 {
            return 0;
        }
        let buckets = self.header.bucket_bits.len() - 1;
        let (bucket, root_hash) = if buckets == 1 {
            (0, None)
        } else {
            let h = self.hash.universal_hash(key, 0);
            (scale(h, buckets), Some(h))
        };
        let (bit_start, bit_end) = self.header.bucket_bits.get_pair(bucket);
        let (key_start, key_end) = self.header.bucket_keys.get_pair(bucket);
        match key_end - key_start {
            0 if bit_end > bit_start => {
                let regular = n - self.header.fallback.len();
                regular + self.header.fallback.evaluate(&self.hash, key)
            }
            0 => key_start.min(n - 1),
            1 => key_start,
            size => {
                let h = root_hash.unwrap_or_else(|| self.hash.universal_hash(key, 0));
                key_start + self.walk(key, h, self.header.streams_pos + bit_start, size as usize)
            }
        }
    }

    /// Offset of the key within its bucket.
    fn walk<K>(&self, key: &K, mut hash: u64, mut pos: u64, mut size: usize) -> u64
    where
        K: ?Sized,
        H: UniversalHash<K>,
    {
        let buf = self.description.buffer();
        let mut start = 0u64;
        let mut epoch = 0u64;
        let mut add = 0u64;
        loop {
            let plan = self.settings.split_of(size);
            let offset = buf.read_golomb_rice(&mut pos, self.settings.golomb_shift(size));
            let seed = start + offset + 1;
            let seed_epoch = seed >> SUPPLEMENTAL_HASH_SHIFT;
            if seed_epoch != epoch {
                hash = self.hash.universal_hash(key, seed_epoch);
                epoch = seed_epoch;
            }
            let slot = scale(supplemental_hash(hash, seed), size as u64);
            if plan == SplitPlan::Leaf {
                return add + slot;
            }
            let child = plan.child_of(slot);
            for sibling in 0..child {
                pos = self.skip(pos, plan.child_size(size, sibling));
            }
            add += plan.child_start(child) as u64;
            size = plan.child_size(size, child);
            start = seed;
            if size < 2 {
                return add;
            }
        }
    }

    /// Position just past the subtree of a subset of `size` keys at `pos`.
    fn skip(&self, pos: u64, size: usize) -> u64 {
        if size < 2 {
            return pos;
        }
        let mut pos = self
            .description
            .buffer()
            .skip_golomb_rice(pos, self.settings.golomb_shift(size));
        let plan = self.settings.split_of(size);
        for child in 0..plan.fanout() {
            pos = self.skip(pos, plan.child_size(size, child));
        }
        pos
    }
}
