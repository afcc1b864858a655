use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use recsplit::{
    BuildConfig, Builder, Description, Mix64Hash, MphError, Settings, UniversalHash, WyHash,
    Xxh3Hash, build,
};
use std::collections::HashSet;

fn random_keys(n: usize, seed: u64) -> Vec<u64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut seen = HashSet::with_capacity(n);
    let mut keys = Vec::with_capacity(n);
    while keys.len() < n {
        let k = rng.next_u64();
        if seen.insert(k) {
            keys.push(k);
        }
    }
    keys
}

fn string_keys(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("key-{i:08}")).collect()
}

fn config(leaf_size: usize, load_factor: usize) -> BuildConfig {
    BuildConfig {
        leaf_size,
        load_factor,
        ..Default::default()
    }
}

fn build_with<K, H>(keys: &[K], hash: &H, cfg: &BuildConfig) -> (Description, Settings)
where
    K: Eq + Sync,
    H: UniversalHash<K> + Sync,
{
    let settings = cfg.settings().unwrap();
    let description = Builder::new().with_config(cfg.clone()).build(keys, hash).unwrap();
    (description, settings)
}

/// Every key maps to a distinct index in `[0, n)`.
fn assert_bijection<K, H>(keys: &[K], hash: H, description: &Description, settings: &Settings)
where
    H: UniversalHash<K>,
{
    let evaluator = description.evaluator(hash, settings);
    let n = keys.len();
    assert_eq!(evaluator.key_count(), n as u64);
    let mut seen = vec![false; n];
    for key in keys {
        let v = evaluator.evaluate(key) as usize;
        assert!(v < n, "{v} out of range for {n} keys");
        assert!(!seen[v], "index {v} assigned twice");
        seen[v] = true;
    }
}

#[test]
fn five_strings_form_a_permutation() {
    let keys = ["a", "b", "c", "d", "e"];
    let (d, settings) = build_with(&keys, &Xxh3Hash, &config(5, 256));
    assert_bijection(&keys, Xxh3Hash, &d, &settings);
    let evaluator = d.evaluator(Xxh3Hash, &settings);
    assert!(evaluator.evaluate("zzz") < 5);
}

#[test]
fn ten_thousand_integers_stay_under_three_bits_per_key() {
    let keys = random_keys(10_000, 42);
    let (d, settings) = build_with(&keys, &Mix64Hash, &config(8, 64));
    assert_bijection(&keys, Mix64Hash, &d, &settings);
    assert!(d.bits_per_key() <= 3.0, "{} bits/key", d.bits_per_key());
}

#[test]
fn empty_set() {
    let keys: Vec<u64> = Vec::new();
    let (d, settings) = build_with(&keys, &Mix64Hash, &BuildConfig::default());
    assert_eq!(d.key_count(), 0);
    assert_eq!(d.evaluator(Mix64Hash, &settings).evaluate(&123u64), 0);
}

#[test]
fn single_key() {
    let keys = [99u64];
    let (d, settings) = build_with(&keys, &Mix64Hash, &BuildConfig::default());
    let evaluator = d.evaluator(Mix64Hash, &settings);
    assert_eq!(evaluator.evaluate(&99u64), 0);
    assert_eq!(evaluator.evaluate(&100u64), 0);
}

#[test]
fn leaf_sizes_across_the_range() {
    let keys = random_keys(2000, 3);
    for leaf in [1, 2, 3, 5, 10] {
        let (d, settings) = build_with(&keys, &Mix64Hash, &config(leaf, 100));
        assert_bijection(&keys, Mix64Hash, &d, &settings);
    }
}

#[test]
fn large_leaves_run_past_the_first_epoch() {
    // 16! / 16^16 is about 1e-6, so leaf seeds regularly pass 1 << 18.
    let keys = random_keys(48, 17);
    let (d, settings) = build_with(&keys, &Mix64Hash, &config(16, 64));
    assert_bijection(&keys, Mix64Hash, &d, &settings);
}

#[test]
fn string_keys_with_both_byte_hashes() {
    let keys = string_keys(5000);
    let (d, settings) = build_with(&keys, &Xxh3Hash, &BuildConfig::default());
    assert_bijection(&keys, Xxh3Hash, &d, &settings);
    let (d, settings) = build_with(&keys, &WyHash, &config(6, 500));
    assert_bijection(&keys, WyHash, &d, &settings);
}

#[test]
fn same_input_same_bits() {
    let keys = random_keys(20_000, 8);
    let (a, _) = build_with(&keys, &Mix64Hash, &BuildConfig::default());
    let (b, _) = build_with(&keys, &Mix64Hash, &BuildConfig::default());
    assert_eq!(a, b);
}

#[test]
fn serial_and_parallel_builds_are_identical() {
    // Buckets of about 6700 keys take the forking path.
    let keys = random_keys(20_000, 9);
    let serial = BuildConfig {
        parallel: false,
        ..config(8, 8192)
    };
    let parallel = BuildConfig {
        parallel: true,
        threads: Some(4),
        ..config(8, 8192)
    };
    let (a, settings) = build_with(&keys, &Mix64Hash, &serial);
    let (b, _) = build_with(&keys, &Mix64Hash, &parallel);
    assert_eq!(a, b);
    assert_bijection(&keys, Mix64Hash, &b, &settings);
}

#[test]
fn space_stays_near_the_estimate() {
    let cfg = BuildConfig::default();
    let settings = cfg.settings().unwrap();
    let estimate = settings.estimated_bits() as f64 / 1000.0;

    // Ten keys pay for the stream headers alone.
    let (tiny, _) = build_with(&random_keys(10, 1), &Mix64Hash, &cfg);
    assert!(tiny.bits_per_key() <= 5.0 * estimate, "{} vs {estimate}", tiny.bits_per_key());

    let (small, _) = build_with(&random_keys(1000, 2), &Mix64Hash, &cfg);
    assert!(small.bits_per_key() <= 2.0 * estimate, "{} vs {estimate}", small.bits_per_key());

    let keys = random_keys(100_000, 3);
    let (large, _) = build_with(&keys, &Mix64Hash, &cfg);
    assert!(large.bits_per_key() <= 1.25 * estimate, "{} vs {estimate}", large.bits_per_key());
    assert_bijection(&keys, Mix64Hash, &large, &settings);
}

#[test]
#[ignore = "builds a million keys"]
fn space_stays_near_the_estimate_for_a_million_keys() {
    let cfg = BuildConfig::default();
    let keys = random_keys(1_000_000, 3);
    let (d, settings) = build_with(&keys, &Mix64Hash, &cfg);
    let estimate = settings.estimated_bits() as f64 / 1000.0;
    assert!(d.bits_per_key() <= 3.0 * estimate, "{} vs {estimate}", d.bits_per_key());
    assert_bijection(&keys, Mix64Hash, &d, &settings);
}

#[test]
fn oversized_buckets_go_to_the_fallback() {
    let keys = random_keys(2000, 4);
    let cfg = BuildConfig {
        fill_limit_factor: 1,
        ..config(8, 8)
    };
    let (d, settings) = build_with(&keys, &Mix64Hash, &cfg);
    assert!(d.fallback_keys() > 0);
    assert_bijection(&keys, Mix64Hash, &d, &settings);
}

#[test]
fn bit_budget_diverts_buckets() {
    let keys = string_keys(3000);
    let cfg = BuildConfig {
        max_bits_per_key: 1,
        ..BuildConfig::default()
    };
    let (d, settings) = build_with(&keys, &Xxh3Hash, &cfg);
    assert!(d.fallback_keys() > 1000, "{} fallback keys", d.fallback_keys());
    assert_bijection(&keys, Xxh3Hash, &d, &settings);
}

#[test]
fn two_and_three_key_fallbacks() {
    // A one bit per key budget sends about a quarter of these sets
    // entirely to the fallback.
    let cfg = BuildConfig {
        max_bits_per_key: 1,
        ..config(8, 8)
    };
    let mut diverted = 0;
    for n in [2, 3] {
        for set in 0..200 {
            let keys = random_keys(n, 1000 * n as u64 + set);
            let (d, settings) = build_with(&keys, &Mix64Hash, &cfg);
            assert_bijection(&keys, Mix64Hash, &d, &settings);
            if d.fallback_keys() == n as u64 {
                diverted += 1;
            }
        }
    }
    assert!(diverted > 0);
}

#[test]
fn absent_keys_stay_in_range() {
    let keys = random_keys(3000, 5);
    let cfg = BuildConfig {
        fill_limit_factor: 1,
        ..config(5, 8)
    };
    let (d, settings) = build_with(&keys, &Mix64Hash, &cfg);
    let evaluator = d.evaluator(Mix64Hash, &settings);
    let members: HashSet<u64> = keys.iter().copied().collect();
    for k in random_keys(3000, 6).into_iter().filter(|k| !members.contains(k)) {
        assert!(evaluator.evaluate(&k) < 3000);
    }
}

#[test]
fn duplicate_keys_are_rejected() {
    let mut keys = random_keys(500, 7);
    keys.push(keys[123]);
    let err = build(&keys, &Mix64Hash, 8, 100, false).unwrap_err();
    assert!(matches!(err, MphError::DuplicateKey));

    let words = ["x", "y", "x"];
    let err = build(&words, &Xxh3Hash, 8, 100, false).unwrap_err();
    assert!(matches!(err, MphError::DuplicateKey));
}

#[test]
fn parameters_out_of_range_are_rejected() {
    let keys = [1u64, 2, 3];
    for leaf in [0, 26] {
        let err = build(&keys, &Mix64Hash, leaf, 100, false).unwrap_err();
        assert!(matches!(err, MphError::InvalidLeafSize(l) if l == leaf));
    }
    for load in [7, 65537] {
        let err = build(&keys, &Mix64Hash, 8, load, false).unwrap_err();
        assert!(matches!(err, MphError::InvalidLoadFactor(l) if l == load));
    }
}

#[test]
fn description_survives_bytes() {
    let keys = random_keys(5000, 10);
    let cfg = BuildConfig {
        fill_limit_factor: 2,
        ..config(8, 16)
    };
    let (d, settings) = build_with(&keys, &Mix64Hash, &cfg);
    let back = Description::from_bytes(&d.to_bytes());
    assert_eq!(back.key_count(), d.key_count());
    let a = d.evaluator(Mix64Hash, &settings);
    let b = back.evaluator(Mix64Hash, &settings);
    for k in &keys {
        assert_eq!(a.evaluate(k), b.evaluate(k));
    }
}

#[cfg(feature = "serde")]
#[test]
fn description_survives_serde() {
    let keys = string_keys(2000);
    let (d, settings) = build_with(&keys, &Xxh3Hash, &BuildConfig::default());
    let bytes = bincode::serialize(&d).unwrap();
    let back: Description = bincode::deserialize(&bytes).unwrap();
    assert_eq!(back, d);
    assert_bijection(&keys, Xxh3Hash, &back, &settings);
}

#[test]
fn evaluators_are_shared_across_threads() {
    let keys = random_keys(40_000, 11);
    let (d, settings) = build_with(&keys, &Mix64Hash, &BuildConfig::default());
    let evaluator = d.evaluator(Mix64Hash, &settings);
    let expected: Vec<u64> = keys.iter().map(|k| evaluator.evaluate(k)).collect();
    std::thread::scope(|s| {
        for (chunk, want) in keys.chunks(10_000).zip(expected.chunks(10_000)) {
            let evaluator = &evaluator;
            s.spawn(move || {
                for (k, &v) in chunk.iter().zip(want) {
                    assert_eq!(evaluator.evaluate(k), v);
                }
            });
        }
    });
}
