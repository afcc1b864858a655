//! Split strategy and Golomb-Rice parameters per subset size.
//!
//! Both the encoder and the evaluator derive the shape of every recursion
//! tree from the subset size alone, so every function here is a pure
//! function of `(leaf_size, load_factor, size)`. The first sizes are cached
//! at construction using the very same functions.

use crate::MphError;

pub const MIN_LEAF_SIZE: usize = 1;
pub const MAX_LEAF_SIZE: usize = 25;
pub const MIN_LOAD_FACTOR: usize = 8;
pub const MAX_LOAD_FACTOR: usize = 65536;

/// A key's epoch hash is recomputed every `1 << SUPPLEMENTAL_HASH_SHIFT`
/// trial seeds.
pub const SUPPLEMENTAL_HASH_SHIFT: u32 = 18;

/// Upper bound of the even fanout over all leaf sizes.
pub(crate) const MAX_FANOUT: usize = 10;

const CACHED_SIZES: usize = 256;

/// ln(φ - 1), used by the optimal Rice parameter formula.
const LN_GOLDEN_CONJUGATE: f64 = -0.481_211_825_059_603_4;

/// How a subset of a given size is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitPlan {
    /// Bijection search over `[0, size)`.
    Leaf,
    /// `fanout` children of `part` keys each.
    Even { fanout: usize, part: usize },
    /// Two children of `first` and `size - first` keys.
    Uneven { first: usize },
}

impl SplitPlan {
    #[inline]
    pub fn fanout(self) -> usize {
        match self {
            SplitPlan::Leaf => 0,
            SplitPlan::Even { fanout, .. } => fanout,
            SplitPlan::Uneven { .. } => 2,
        }
    }

    /// Child receiving a key whose scaled trial hash is `slot`.
    #[inline]
    pub fn child_of(self, slot: u64) -> usize {
        match self {
            SplitPlan::Leaf => 0,
            SplitPlan::Even { part, .. } => (slot / part as u64) as usize,
            SplitPlan::Uneven { first } => (slot >= first as u64) as usize,
        }
    }

    #[inline]
    pub fn child_size(self, size: usize, child: usize) -> usize {
        match self {
            SplitPlan::Leaf => size,
            SplitPlan::Even { part, .. } => part,
            SplitPlan::Uneven { first } if child == 0 => first,
            SplitPlan::Uneven { first } => size - first,
        }
    }

    /// Offset of the first key of `child` within its parent.
    #[inline]
    pub fn child_start(self, child: usize) -> usize {
        match self {
            SplitPlan::Leaf => 0,
            SplitPlan::Even { part, .. } => child * part,
            SplitPlan::Uneven { first } => {
                if child == 0 {
                    0
                } else {
                    first
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    leaf_size: usize,
    load_factor: usize,
    lower_fanout: usize,
    upper_fanout: usize,
    plans: Vec<SplitPlan>,
    shifts: Vec<u32>,
}

impl Settings {
    /// Validates the parameters and fills the per-size cache.
    pub fn new(leaf_size: usize, load_factor: usize) -> Result<Self, MphError> {
        if !(MIN_LEAF_SIZE..=MAX_LEAF_SIZE).contains(&leaf_size) {
            return Err(MphError::InvalidLeafSize(leaf_size));
        }
        if !(MIN_LOAD_FACTOR..=MAX_LOAD_FACTOR).contains(&load_factor) {
            return Err(MphError::InvalidLoadFactor(load_factor));
        }
        let lf = leaf_size as f64;
        let mut settings = Self {
            leaf_size,
            load_factor,
            lower_fanout: ((0.35 * lf + 0.5).ceil() as usize).max(2),
            upper_fanout: ((0.21 * lf + 0.9).ceil() as usize).max(2),
            plans: Vec::with_capacity(CACHED_SIZES),
            shifts: Vec::with_capacity(CACHED_SIZES),
        };
        for size in 0..CACHED_SIZES {
            settings.plans.push(settings.compute_split(size));
        }
        for size in 0..CACHED_SIZES {
            let shift = settings.compute_shift(size);
            settings.shifts.push(shift);
        }
        Ok(settings)
    }

    #[inline]
    pub fn leaf_size(&self) -> usize {
        self.leaf_size
    }

    #[inline]
    pub fn load_factor(&self) -> usize {
        self.load_factor
    }

    /// Number of top-level buckets for `n` keys.
    #[inline]
    pub fn bucket_count(&self, n: u64) -> u64 {
        n.div_ceil(self.load_factor as u64)
    }

    #[inline]
    pub fn split_of(&self, size: usize) -> SplitPlan {
        match self.plans.get(size) {
            Some(&plan) => plan,
            None => self.compute_split(size),
        }
    }

    #[inline]
    pub fn golomb_shift(&self, size: usize) -> u32 {
        match self.shifts.get(size) {
            Some(&shift) => shift,
            None => self.compute_shift(size),
        }
    }

    /// Expected bits per 1000 keys for buckets of `load_factor` keys,
    /// boundary tables included.
    pub fn estimated_bits(&self) -> u64 {
        let lf = self.load_factor as f64;
        let tree = self.expected_tree_bits(self.load_factor);
        let boundaries = 10.0 + lf.log2();
        ((tree + boundaries) * 1000.0 / lf).round() as u64
    }

    fn fanout_at(&self, level: usize) -> usize {
        match level {
            0 => self.lower_fanout,
            1 => self.upper_fanout,
            _ => 2,
        }
    }

    fn compute_split(&self, size: usize) -> SplitPlan {
        let leaf = self.leaf_size;
        if size <= leaf {
            return SplitPlan::Leaf;
        }
        if size <= 2 * leaf {
            return SplitPlan::Uneven { first: size / 2 };
        }
        let mut unit = leaf;
        let mut level = 0;
        loop {
            let fanout = self.fanout_at(level);
            let next = unit * fanout;
            if next == size {
                return SplitPlan::Even { fanout, part: unit };
            }
            if next > size {
                return SplitPlan::Uneven { first: unit };
            }
            unit = next;
            level += 1;
        }
    }

    fn compute_shift(&self, size: usize) -> u32 {
        if size < 2 {
            return 0;
        }
        rice_parameter(ln_success(size, self.compute_split(size)))
    }

    fn expected_tree_bits(&self, size: usize) -> f64 {
        if size < 2 {
            return 0.0;
        }
        let plan = self.split_of(size);
        let mut bits = expected_code_bits(self.golomb_shift(size), ln_success(size, plan));
        match plan {
            SplitPlan::Leaf => {}
            SplitPlan::Even { fanout, part } => {
                bits += fanout as f64 * self.expected_tree_bits(part);
            }
            SplitPlan::Uneven { first } => {
                bits += self.expected_tree_bits(first) + self.expected_tree_bits(size - first);
            }
        }
        bits
    }
}

/// Natural log of the probability that one trial seed succeeds at a node.
fn ln_success(size: usize, plan: SplitPlan) -> f64 {
    let s = size as f64;
    match plan {
        SplitPlan::Leaf => ln_factorial(size) - s * s.ln(),
        SplitPlan::Even { fanout, part } => {
            let k = fanout as f64;
            ln_factorial(size) - k * ln_factorial(part) - s * k.ln()
        }
        SplitPlan::Uneven { first } => {
            let (a, b) = (first as f64, (size - first) as f64);
            ln_factorial(size) - ln_factorial(first) - ln_factorial(size - first)
                + a * (a / s).ln()
                + b * (b / s).ln()
        }
    }
}

/// Rice parameter minimizing the expected length of a geometric trial count.
fn rice_parameter(ln_p: f64) -> u32 {
    let ln_fail = (-ln_p.exp()).ln_1p();
    let k = 1.0 + (LN_GOLDEN_CONJUGATE / ln_fail).log2().floor();
    k.clamp(0.0, 62.0) as u32
}

/// Exact expected Golomb-Rice codeword length for a geometric trial count.
fn expected_code_bits(shift: u32, ln_p: f64) -> f64 {
    let tail = ((1u64 << shift) as f64 * (-ln_p.exp()).ln_1p()).exp();
    shift as f64 + 1.0 + tail / (1.0 - tail)
}

/// ln(n!): direct summation for small n, Stirling series above.
fn ln_factorial(n: usize) -> f64 {
    if n < 16 {
        return (2..=n).map(|i| (i as f64).ln()).sum();
    }
    let x = n as f64;
    let x2 = x * x;
    x * x.ln() - x + 0.5 * (2.0 * std::f64::consts::PI * x).ln() + 1.0 / (12.0 * x)
        - 1.0 / (360.0 * x * x2)
        + 1.0 / (1260.0 * x * x2 * x2)
}
