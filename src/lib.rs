//! recsplit: minimal perfect hashing by recursive splitting.
//!
//! - Build once on a set of **unique** keys of any type with a
//!   [`UniversalHash`] implementation.
//! - Keys go to buckets of `load_factor` keys on average; every bucket is
//!   split recursively until subsets of at most `leaf_size` keys are mapped
//!   bijectively. Only the seed offsets of the tree are stored, about
//!   2 bits per key for the default parameters.
//! - Queries return a unique index in `[0, n)` and never allocate.
//! - Buckets that blow their size or bit budget are stored in a BDZ
//!   fallback, keeping the space linear for any input.
//!
//! ```
//! use recsplit::{BuildConfig, Builder, Xxh3Hash};
//!
//! let keys = ["alpha", "beta", "gamma", "delta"];
//! let cfg = BuildConfig::default();
//! let settings = cfg.settings().unwrap();
//! let description = Builder::new().with_config(cfg).build(&keys, &Xxh3Hash).unwrap();
//! let evaluator = description.evaluator(Xxh3Hash, &settings);
//!
//! let mut seen: Vec<u64> = keys.iter().map(|k| evaluator.evaluate(k)).collect();
//! seen.sort_unstable();
//! assert_eq!(seen, vec![0, 1, 2, 3]);
//! ```

pub mod bdz;
pub mod bits;
mod builder;
mod description;
mod encoder;
mod error;
mod evaluator;
pub mod hash;
pub mod monotone;
pub mod processor;
pub mod settings;

pub use bdz::{BdzConfig, BdzReader};
pub use bits::BitBuffer;
pub use builder::{BuildConfig, Builder, COMPACTION_WINDOW, build};
pub use description::Description;
pub use error::MphError;
pub use evaluator::Evaluator;
pub use hash::{Mix64Hash, UniversalHash, WyHash, Xxh3Hash};
pub use monotone::MonotoneList;
pub use processor::{Processor, SerialProcessor};
#[cfg(feature = "parallel")]
pub use processor::ParallelProcessor;
pub use settings::{Settings, SplitPlan};
