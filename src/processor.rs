//! Execution strategies for the encoder.
//!
//! Both implementations run the same encoding logic and produce the same
//! bits; they only differ in where the work runs.

/// Subsets smaller than this never fork their children.
pub const FORK_MIN_SUBSET: usize = 4096;

pub trait Processor: Sync {
    /// Runs `task` over every bucket job, keeping the output in job order.
    fn encode_buckets<T, R, F>(&self, jobs: Vec<T>, task: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Sync + Send;

    /// Whether children of a subset of `size` keys should be encoded as
    /// separate tasks.
    fn should_fork(&self, size: usize) -> bool;

    /// Runs both closures, possibly in parallel, and returns both results.
    fn split<A, B, RA, RB>(&self, a: A, b: B) -> (RA, RB)
    where
        A: FnOnce() -> RA + Send,
        B: FnOnce() -> RB + Send,
        RA: Send,
        RB: Send;

    /// Releases the resources held by the processor.
    fn dispose(self)
    where
        Self: Sized,
    {
    }
}

/// Runs everything on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialProcessor;

impl Processor for SerialProcessor {
    fn encode_buckets<T, R, F>(&self, jobs: Vec<T>, task: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Sync + Send,
    {
        jobs.into_iter().map(task).collect()
    }

    #[inline]
    fn should_fork(&self, _size: usize) -> bool {
        false
    }

    fn split<A, B, RA, RB>(&self, a: A, b: B) -> (RA, RB)
    where
        A: FnOnce() -> RA + Send,
        B: FnOnce() -> RB + Send,
        RA: Send,
        RB: Send,
    {
        (a(), b())
    }
}

/// Runs buckets, and the children of large subsets, on a rayon pool owned by
/// the build that created it.
#[cfg(feature = "parallel")]
pub struct ParallelProcessor {
    pool: rayon::ThreadPool,
}

#[cfg(feature = "parallel")]
impl ParallelProcessor {
    /// `threads == None` uses one thread per available core.
    pub fn new(threads: Option<usize>) -> Result<Self, crate::MphError> {
        let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("recsplit-{i}"));
        if let Some(n) = threads {
            builder = builder.num_threads(n);
        }
        Ok(Self {
            pool: builder.build()?,
        })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

#[cfg(feature = "parallel")]
impl Processor for ParallelProcessor {
    fn encode_buckets<T, R, F>(&self, jobs: Vec<T>, task: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Sync + Send,
    {
        use rayon::prelude::*;
        self.pool.install(|| jobs.into_par_iter().map(task).collect())
    }

    #[inline]
    fn should_fork(&self, size: usize) -> bool {
        size >= FORK_MIN_SUBSET
    }

    fn split<A, B, RA, RB>(&self, a: A, b: B) -> (RA, RB)
    where
        A: FnOnce() -> RA + Send,
        B: FnOnce() -> RB + Send,
        RA: Send,
        RB: Send,
    {
        self.pool.join(a, b)
    }

    fn dispose(self) {
        tracing::trace!(threads = self.threads(), "releasing build thread pool");
        drop(self.pool);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise<P: Processor>(p: P) {
        let out = p.encode_buckets((0..100u64).collect(), |x| x * x);
        assert_eq!(out, (0..100u64).map(|x| x * x).collect::<Vec<_>>());
        let (a, b) = p.split(|| 1 + 1, || "two");
        assert_eq!((a, b), (2, "two"));
        p.dispose();
    }

    #[test]
    fn serial_keeps_order() {
        assert!(!SerialProcessor.should_fork(usize::MAX));
        exercise(SerialProcessor);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn parallel_keeps_order() {
        let p = ParallelProcessor::new(Some(3)).unwrap();
        assert_eq!(p.threads(), 3);
        assert!(p.should_fork(FORK_MIN_SUBSET));
        assert!(!p.should_fork(FORK_MIN_SUBSET - 1));
        exercise(p);
    }
}
