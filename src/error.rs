use thiserror::Error;

#[derive(Debug, Error)]
pub enum MphError {
    #[error("leaf size {0} is outside the supported range 1..=25")]
    InvalidLeafSize(usize),
    #[error("load factor {0} is outside the supported range 8..=65536")]
    InvalidLoadFactor(usize),
    #[error("invalid bucket budget: {0}")]
    InvalidBudget(&'static str),
    #[error("duplicate key detected during build")]
    DuplicateKey,
    #[error("fallback hypergraph was not peelable after rehash attempts")]
    Unresolvable,
    #[cfg(feature = "parallel")]
    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
