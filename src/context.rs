//! Execution context: the allocation-fallible construction policy and the
//! optional worker pool shared by every component that may parallelize.

use std::sync::Arc;

/// Threshold, in elements, above which parallel operations switch from a
/// sequential fast path to chunked `rayon` work. Below this size the
/// per-task scheduling overhead is not worth paying.
///
/// Chosen to match the scale at which similar merge/join implementations in
/// this corpus switch over to `par_chunks`.
pub const PARALLEL_THRESHOLD: usize = 1024;

/// A handle shared by every `Relation`, `Variable`, and `Iteration` built
/// from it.
///
/// A `Context` carries no allocator handle of its own (stable safe Rust has
/// no `allocator_api`); instead every buffer-growing path in this crate
/// goes through a fallible `try_reserve`, so "the allocation policy" is
/// simply: never abort, always surface `Error::AllocationFailed`. The only
/// resource a `Context` actually owns is the optional worker pool.
#[derive(Clone)]
pub struct Context {
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl Default for Context {
    fn default() -> Self {
        Self::sequential()
    }
}

impl Context {
    /// A context with no worker pool; every operation runs on the calling thread.
    pub fn sequential() -> Self {
        Context { pool: None }
    }

    /// A context backed by a `rayon` thread pool of `worker_count` threads.
    ///
    /// `worker_count == 0` is treated the same as `sequential()`.
    pub fn with_workers(worker_count: usize) -> Self {
        if worker_count == 0 {
            return Self::sequential();
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(worker_count)
            .build()
            .expect("failed to build worker pool");
        Context { pool: Some(Arc::new(pool)) }
    }

    /// Whether this context has a worker pool attached.
    pub fn is_parallel(&self) -> bool {
        self.pool.is_some()
    }

    /// Runs `f` on the worker pool if one is attached, otherwise runs it
    /// directly on the calling thread. Either way, `install` blocks until
    /// `f` returns: there are no suspension points in this crate's API.
    pub(crate) fn install<R: Send>(&self, f: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(f),
            None => f(),
        }
    }

    /// Applies `f` to each item in `items` independently and concatenates
    /// the per-item result vectors, in item order. Runs `items.par_iter()`
    /// over the worker pool when one is attached and there is more than
    /// one item to spread across it; otherwise runs sequentially.
    ///
    /// This is the shape `join_into` needs: one task per `stable` batch.
    pub(crate) fn map_items<T: Sync, Out: Send>(
        &self,
        items: &[T],
        f: impl Fn(&T) -> Vec<Out> + Sync,
    ) -> Vec<Out> {
        if self.is_parallel() && items.len() > 1 {
            use rayon::prelude::*;
            self.install(|| items.par_iter().map(|item| f(item)).flatten().collect())
        } else {
            items.iter().flat_map(|item| f(item)).collect()
        }
    }

    /// Splits `items` into `chunk_size`-sized chunks, applies `f` to each
    /// chunk independently, and concatenates the results in chunk order.
    /// Runs on the worker pool when one is attached and `items` is larger
    /// than `chunk_size`; otherwise runs `f` once over the whole slice.
    ///
    /// This is the shape `join_anti` and `extend_into` need: chunk a
    /// single `recent` relation across workers.
    pub(crate) fn map_chunks<T: Sync, Out: Send>(
        &self,
        items: &[T],
        chunk_size: usize,
        f: impl Fn(&[T]) -> Vec<Out> + Sync,
    ) -> Vec<Out> {
        if self.is_parallel() && items.len() > chunk_size {
            use rayon::prelude::*;
            self.install(|| items.par_chunks(chunk_size).map(|chunk| f(chunk)).flatten().collect())
        } else {
            f(items)
        }
    }
}
