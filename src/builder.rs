use crate::MphError;
use crate::bdz::{self, BdzConfig};
use crate::bits::BitBuffer;
use crate::description::Description;
use crate::encoder::{Encoder, Entry};
use crate::hash::{UniversalHash, scale};
use crate::monotone::MonotoneList;
use crate::processor::{Processor, SerialProcessor};
use crate::settings::Settings;

/// Longest prefix of a bucket stream that may be shared with the suffix of
/// the previous one.
pub const COMPACTION_WINDOW: u64 = 64;

/// Build parameters.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Largest subset solved by a direct bijection search, in `1..=25`.
    /// Larger → smaller output, slower build.
    pub leaf_size: usize,
    /// Average number of keys per bucket, in `8..=65536`.
    pub load_factor: usize,
    /// Encode buckets on a thread pool. Ignored without the `parallel`
    /// feature; the output is the same either way.
    pub parallel: bool,
    /// Pool size; `None` uses every available core.
    pub threads: Option<usize>,
    /// Buckets larger than `load_factor * fill_limit_factor` keys go to the
    /// fallback.
    pub fill_limit_factor: usize,
    /// Buckets whose stream exceeds this many bits per key go to the fallback.
    pub max_bits_per_key: u64,
    /// Vertex ratio of the fallback hypergraph.
    pub fallback_gamma: f64,
    /// How many hash indices the fallback tries before giving up.
    pub fallback_rehash_limit: u32,
    /// Base salt of the fallback hash indices.
    pub fallback_salt: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        let fallback = BdzConfig::default();
        Self {
            leaf_size: 8,
            load_factor: 100,
            parallel: cfg!(feature = "parallel"),
            threads: None,
            fill_limit_factor: 16,
            max_bits_per_key: 16,
            fallback_gamma: fallback.gamma,
            fallback_rehash_limit: fallback.rehash_limit,
            fallback_salt: fallback.salt,
        }
    }
}

impl BuildConfig {
    /// Checks every parameter and derives the split settings.
    pub fn settings(&self) -> Result<Settings, MphError> {
        let settings = Settings::new(self.leaf_size, self.load_factor)?;
        if self.fill_limit_factor == 0 {
            return Err(MphError::InvalidBudget("fill_limit_factor must be at least 1"));
        }
        if self.max_bits_per_key == 0 {
            return Err(MphError::InvalidBudget("max_bits_per_key must be at least 1"));
        }
        if !(self.fallback_gamma.is_finite() && self.fallback_gamma >= 1.0) {
            return Err(MphError::InvalidBudget("fallback_gamma must be a finite value >= 1.0"));
        }
        if self.threads == Some(0) {
            return Err(MphError::InvalidBudget("threads must be positive"));
        }
        Ok(settings)
    }

    fn fallback(&self) -> BdzConfig {
        BdzConfig {
            gamma: self.fallback_gamma,
            rehash_limit: self.fallback_rehash_limit,
            salt: self.fallback_salt,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Builder {
    cfg: BuildConfig,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, cfg: BuildConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Builds the function over `keys`, which must be pairwise distinct.
    ///
    /// Evaluate the result with the [`Settings`] returned by
    /// [`BuildConfig::settings`] for the same configuration.
    pub fn build<K, H>(&self, keys: &[K], hash: &H) -> Result<Description, MphError>
    where
        K: Eq + Sync,
        H: UniversalHash<K> + Sync,
    {
        let settings = self.cfg.settings()?;

        #[cfg(feature = "parallel")]
        if self.cfg.parallel {
            let processor = crate::processor::ParallelProcessor::new(self.cfg.threads)?;
            let description = build_with(&settings, &self.cfg, keys, hash, &processor);
            processor.dispose();
            return description;
        }

        #[cfg(not(feature = "parallel"))]
        if self.cfg.parallel {
            tracing::debug!(
                "parallel build requested without the `parallel` feature, running serially"
            );
        }

        build_with(&settings, &self.cfg, keys, hash, &SerialProcessor)
    }
}

/// Builds with the default budgets and the given split parameters.
pub fn build<K, H>(
    keys: &[K],
    hash: &H,
    leaf_size: usize,
    load_factor: usize,
    parallel: bool,
) -> Result<Description, MphError>
where
    K: Eq + Sync,
    H: UniversalHash<K> + Sync,
{
    Builder::new()
        .with_config(BuildConfig {
            leaf_size,
            load_factor,
            parallel,
            ..Default::default()
        })
        .build(keys, hash)
}

/// Result of encoding one bucket.
enum Bucket<'k, K> {
    Regular { size: usize, bits: BitBuffer },
    Overflow(Vec<&'k K>),
}

fn build_with<K, H, P>(
    settings: &Settings,
    cfg: &BuildConfig,
    keys: &[K],
    hash: &H,
    processor: &P,
) -> Result<Description, MphError>
where
    K: Eq + Sync,
    H: UniversalHash<K> + Sync,
    P: Processor,
{
    let n = keys.len() as u64;
    let buckets = settings.bucket_count(n) as usize;

    // 1) Hash once and counting-sort the keys into one arena by bucket.
    let hashes: Vec<u64> = keys.iter().map(|k| hash.universal_hash(k, 0)).collect();
    let bucket_of = |h: u64| {
        if buckets == 1 {
            0
        } else {
            scale(h, buckets as u64) as usize
        }
    };
    let mut offsets = vec![0usize; buckets + 1];
    for &h in &hashes {
        offsets[bucket_of(h) + 1] += 1;
    }
    for b in 0..buckets {
        offsets[b + 1] += offsets[b];
    }
    let mut next = offsets.clone();
    let mut order = vec![0usize; keys.len()];
    for (i, &h) in hashes.iter().enumerate() {
        let slot = &mut next[bucket_of(h)];
        order[*slot] = i;
        *slot += 1;
    }
    let mut arena: Vec<Entry<'_, K>> = order
        .iter()
        .map(|&i| Entry {
            hash: hashes[i],
            key: &keys[i],
        })
        .collect();
    drop(hashes);

    // 2) One disjoint slice per bucket.
    let mut jobs = Vec::with_capacity(buckets);
    let mut rest = arena.as_mut_slice();
    for b in 0..buckets {
        let (head, tail) = std::mem::take(&mut rest).split_at_mut(offsets[b + 1] - offsets[b]);
        jobs.push(head);
        rest = tail;
    }

    // 3) Encode buckets independently.
    let encoder = Encoder::new(settings, hash, processor);
    let max_bucket = settings.load_factor().saturating_mul(cfg.fill_limit_factor);
    let max_bits_per_key = cfg.max_bits_per_key;
    let results = processor.encode_buckets(jobs, |entries| {
        encode_bucket(&encoder, entries, max_bucket, max_bits_per_key)
    });

    // 4) Concatenate the streams in bucket order.
    let mut streams = BitBuffer::with_capacity(settings.estimated_bits() * n / 1000 + 64);
    let mut bucket_bits = Vec::with_capacity(buckets + 1);
    let mut bucket_keys = Vec::with_capacity(buckets + 1);
    let mut fallback: Vec<&K> = Vec::new();
    let mut regular = 0u64;
    let mut previous: Option<u64> = None;
    for (b, result) in results.into_iter().enumerate() {
        match result? {
            Bucket::Regular { size, bits } => {
                let shared = match previous {
                    Some(prev_len) if size >= 2 => overlap(&streams, prev_len, &bits),
                    _ => 0,
                };
                bucket_bits.push(streams.len() - shared);
                bucket_keys.push(regular);
                streams.append_range(&bits, shared, bits.len());
                regular += size as u64;
                previous = (size >= 2).then_some(bits.len());
            }
            Bucket::Overflow(overflow) => {
                tracing::trace!(bucket = b, keys = overflow.len(), "bucket diverted to fallback");
                bucket_bits.push(streams.len());
                bucket_keys.push(regular);
                streams.write_bits(1, 1);
                fallback.extend(overflow);
                previous = None;
            }
        }
    }
    bucket_bits.push(streams.len());
    bucket_keys.push(regular);
    assert_eq!(regular + fallback.len() as u64, n, "every key lands in exactly one place");

    // 5) Header, streams, fallback.
    let mut buffer = BitBuffer::with_capacity(streams.len() + 128 * (buckets as u64 + 1));
    buffer.write_elias_delta(n + 1);
    MonotoneList::write(&mut buffer, &bucket_bits);
    MonotoneList::write(&mut buffer, &bucket_keys);
    buffer.append(&streams);
    bdz::generate(hash, &fallback, &cfg.fallback(), &mut buffer)?;

    let description = Description::from_buffer(buffer);
    tracing::debug!(
        keys = n,
        buckets,
        fallback_keys = fallback.len(),
        bits = description.bit_len(),
        bits_per_key = description.bits_per_key(),
        "minimal perfect hash built"
    );
    Ok(description)
}

fn encode_bucket<'k, K, H, P>(
    encoder: &Encoder<'_, H, P>,
    entries: &mut [Entry<'k, K>],
    max_bucket: usize,
    max_bits_per_key: u64,
) -> Result<Bucket<'k, K>, MphError>
where
    K: Eq + Sync,
    H: UniversalHash<K> + Sync,
    P: Processor,
{
    entries.sort_unstable_by_key(|e| e.hash);
    reject_duplicates(entries)?;
    let size = entries.len();
    if size > max_bucket {
        return Ok(Bucket::Overflow(entries.iter().map(|e| e.key).collect()));
    }
    let mut bits = BitBuffer::new();
    encoder.encode_bucket(entries, &mut bits);
    if bits.len() > size as u64 * max_bits_per_key {
        return Ok(Bucket::Overflow(entries.iter().map(|e| e.key).collect()));
    }
    Ok(Bucket::Regular { size, bits })
}

/// Entries must be sorted by hash: only keys with equal hashes are compared.
fn reject_duplicates<K: Eq>(entries: &[Entry<'_, K>]) -> Result<(), MphError> {
    for run in entries.chunk_by(|a, b| a.hash == b.hash) {
        for (i, a) in run.iter().enumerate() {
            if run[i + 1..].iter().any(|b| a.key == b.key) {
                return Err(MphError::DuplicateKey);
            }
        }
    }
    Ok(())
}

/// Longest `t` such that the last `t` bits of `streams` equal the first `t`
/// bits of `next`, with `t` bounded by the window and both stream lengths.
fn overlap(streams: &BitBuffer, prev_len: u64, next: &BitBuffer) -> u64 {
    let end = streams.len();
    let max = COMPACTION_WINDOW.min(prev_len).min(next.len());
    (1..=max)
        .rev()
        .find(|&t| streams.read_bits(end - t, t as u32) == next.read_bits(0, t as u32))
        .unwrap_or(0)
}
