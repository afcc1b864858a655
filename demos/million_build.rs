use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use recsplit::{BuildConfig, Builder, MphError, Xxh3Hash};
use std::collections::HashSet;
use std::time::Instant;

const N_KEYS: usize = 1_000_000;
const GEN_SEED: u64 = 42;

fn main() -> Result<(), MphError> {
    println!("--- recsplit test ---");
    println!("n = {N_KEYS}");

    // 1) Generate unique keys
    let t0 = Instant::now();
    let keys = gen_unique_keys(N_KEYS, GEN_SEED);
    let gen_s = t0.elapsed().as_secs_f64();
    println!(
        "gen:    {:>8.3} s   ({:.1} M keys/s)",
        gen_s,
        N_KEYS as f64 / gen_s / 1e6
    );

    // 2) Build, serial and parallel; the bits must match.
    let cfg = BuildConfig {
        leaf_size: 8,
        load_factor: 100,
        ..Default::default()
    };
    let settings = cfg.settings()?;
    println!(
        "params: leaf {} / load {}   (estimate {:.3} bits/key)",
        cfg.leaf_size,
        cfg.load_factor,
        settings.estimated_bits() as f64 / 1000.0
    );

    let t1 = Instant::now();
    let serial = Builder::new()
        .with_config(BuildConfig {
            parallel: false,
            ..cfg.clone()
        })
        .build(&keys, &Xxh3Hash)?;
    let serial_s = t1.elapsed().as_secs_f64();
    println!(
        "serial: {:>8.3} s   ({:.1} M keys/s)",
        serial_s,
        N_KEYS as f64 / serial_s / 1e6
    );

    let t2 = Instant::now();
    let mph = Builder::new().with_config(cfg).build(&keys, &Xxh3Hash)?;
    let build_s = t2.elapsed().as_secs_f64();
    println!(
        "build:  {:>8.3} s   ({:.1} M keys/s)   identical={}",
        build_s,
        N_KEYS as f64 / build_s / 1e6,
        serial == mph
    );
    println!(
        "size:   {} bits   ({:.3} bits/key, {} fallback keys)",
        mph.bit_len(),
        mph.bits_per_key(),
        mph.fallback_keys()
    );

    // 3) Lookup all keys
    let evaluator = mph.evaluator(Xxh3Hash, &settings);
    let t3 = Instant::now();
    let mut acc: u64 = 0;
    for chunk in keys.chunks(32_768) {
        for k in chunk {
            acc ^= evaluator.evaluate(k);
        }
    }
    let lookup_s = t3.elapsed().as_secs_f64();
    println!(
        "lookup: {:>8.3} s   ({:.1} M lookups/s)   (acc={acc})",
        lookup_s,
        N_KEYS as f64 / lookup_s / 1e6
    );

    println!("----------------------------------------------");
    println!(
        "Total (gen + serial + build + lookup): {:.3} s",
        gen_s + serial_s + build_s + lookup_s
    );

    Ok(())
}

/// Random 16-byte keys, unique.
fn gen_unique_keys(n: usize, seed: u64) -> Vec<[u8; 16]> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut seen = HashSet::with_capacity(n);
    let mut keys = Vec::with_capacity(n);
    while keys.len() < n {
        let mut key = [0u8; 16];
        rng.fill_bytes(&mut key);
        if seen.insert(key) {
            keys.push(key);
        }
    }
    keys
}
