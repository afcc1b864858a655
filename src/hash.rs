//! Universal hashing capability and the integer mixers shared by the encoder
//! and the evaluator.

use xxhash_rust::xxh3::xxh3_64_with_seed;

/// A seed-indexed family of hash functions over keys of type `K`.
///
/// For a fixed key set, different indices must behave like independent
/// uniform hash functions. The same key and index must always give the same
/// value, on every machine that evaluates the description.
pub trait UniversalHash<K: ?Sized> {
    fn universal_hash(&self, key: &K, index: u64) -> u64;
}

impl<K: ?Sized, H: UniversalHash<K> + ?Sized> UniversalHash<K> for &H {
    #[inline]
    fn universal_hash(&self, key: &K, index: u64) -> u64 {
        (**self).universal_hash(key, index)
    }
}

/// XXH3 over the key bytes, seeded with the index.
#[derive(Debug, Clone, Copy, Default)]
pub struct Xxh3Hash;

impl<K: AsRef<[u8]> + ?Sized> UniversalHash<K> for Xxh3Hash {
    #[inline]
    fn universal_hash(&self, key: &K, index: u64) -> u64 {
        xxh3_64_with_seed(key.as_ref(), index)
    }
}

/// wyhash over the key bytes. The index goes through splitmix64 first so
/// that neighbouring indices give unrelated seeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct WyHash;

impl<K: AsRef<[u8]> + ?Sized> UniversalHash<K> for WyHash {
    #[inline]
    fn universal_hash(&self, key: &K, index: u64) -> u64 {
        wyhash::wyhash(key.as_ref(), splitmix64(index))
    }
}

/// Hash for integer keys: one splitmix64 round over the key offset by a
/// mixed index. Bijective in the key for every index.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mix64Hash;

impl UniversalHash<u64> for Mix64Hash {
    #[inline]
    fn universal_hash(&self, key: &u64, index: u64) -> u64 {
        splitmix64(key.wrapping_add(splitmix64(index ^ 0x853C_49E6_0A6C_9D39)))
    }
}

/// Maps `hash` to `[0, n)` by fixed-point multiplication.
#[inline]
pub fn scale(hash: u64, n: u64) -> u64 {
    ((hash as u128 * n as u128) >> 64) as u64
}

/// Derives the per-trial hash of a key from its epoch hash and the trial
/// seed.
#[inline]
pub fn supplemental_hash(hash: u64, seed: u64) -> u64 {
    splitmix64(hash ^ seed.wrapping_mul(0xA24B_1F6F_DA39_2B31))
}

#[inline]
pub fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Deterministically tweak a base salt by round (FNV-like).
#[inline]
pub fn mix_salt(base: u64, round: u32) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;
    let mut h = FNV_OFFSET ^ base;
    h ^= round as u64;
    h = h.wrapping_mul(FNV_PRIME);
    h ^ (h >> 33)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_stays_in_range() {
        for n in [1u64, 2, 7, 1000, u32::MAX as u64] {
            assert_eq!(scale(0, n), 0);
            assert_eq!(scale(u64::MAX, n), n - 1);
            assert!(scale(0x8000_0000_0000_0000, n) <= n / 2);
        }
    }

    #[test]
    fn byte_hashes_agree_across_key_types() {
        let owned = String::from("recsplit");
        assert_eq!(
            Xxh3Hash.universal_hash(&owned, 3),
            Xxh3Hash.universal_hash("recsplit", 3)
        );
        assert_eq!(
            WyHash.universal_hash(owned.as_bytes(), 9),
            WyHash.universal_hash(&owned, 9)
        );
        assert_ne!(
            Xxh3Hash.universal_hash("recsplit", 0),
            Xxh3Hash.universal_hash("recsplit", 1)
        );
    }

    #[test]
    fn mix64_separates_indices() {
        let a = Mix64Hash.universal_hash(&42u64, 0);
        let b = Mix64Hash.universal_hash(&42u64, 1);
        assert_ne!(a, b);
        assert_ne!(Mix64Hash.universal_hash(&41u64, 0), a);
    }

    #[test]
    fn supplemental_hash_depends_on_seed() {
        let h = 0xDEAD_BEEF;
        let positions: Vec<u64> = (1..=64).map(|s| scale(supplemental_hash(h, s), 8)).collect();
        assert!(positions.iter().any(|&p| p != positions[0]));
    }

    #[test]
    fn salts_differ_per_round() {
        assert_ne!(mix_salt(7, 0), mix_salt(7, 1));
    }
}
