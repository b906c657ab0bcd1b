//! The leaper protocol (`count` / `propose` / `intersect`) and the
//! leapfrog trie join driver, `extend_into`.
//!
//! A leaper is a small, possibly-stateful view onto a sorted `(K, V)`
//! relation, queried once per prefix tuple during a leapfrog join. Storing
//! heterogeneous leaper kinds side by side in one array needs dynamic
//! dispatch: the one place in this crate that reaches for `dyn Trait`
//! instead of generics.

use crate::context::{Context, PARALLEL_THRESHOLD};
use crate::error::Result;
use crate::gallop::gallop;
use crate::relation::Relation;
use crate::variable::Variable;

/// Sentinel `count()` result meaning "I cannot enumerate values for this
/// prefix; use me only to filter, never to propose."
pub const UNBOUNDED: usize = usize::MAX;

/// A leaper: one relation's contribution to a leapfrog trie join over a
/// common prefix type `P` and value type `V`.
///
/// `count` and `intersect` are called on every leaper for a given prefix;
/// `propose` is called on exactly one, the leaper whose `count` was
/// smallest (and non-zero, and not [`UNBOUNDED`]). Implementations that
/// never propose (`FilterAnti`, `ExtendAnti`) report `UNBOUNDED` from
/// `count` so the driver's selection logic can never pick them.
pub trait Leaper<P, V> {
    /// An upper bound on the number of values this leaper could propose
    /// for `prefix`, or [`UNBOUNDED`] if it cannot propose at all.
    fn count(&mut self, prefix: &P) -> usize;

    /// Appends the values this leaper contributes for `prefix`, clearing
    /// `values` first. Only ever called on the minimum-count leaper.
    fn propose(&mut self, prefix: &P, values: &mut Vec<V>);

    /// Restricts `values` in place to those this leaper also admits for
    /// `prefix`.
    fn intersect(&mut self, prefix: &P, values: &mut Vec<V>);

    /// Produces an independent clone with its own internal cache, for use
    /// by a single worker thread. Declared fallible to match this crate's
    /// allocation-fallible construction policy; on stable safe Rust a
    /// `Box::new` allocation cannot itself be intercepted, so in practice
    /// this always succeeds. The `Result` is here so a future caller with
    /// a real fallible allocator has somewhere to report failure.
    fn clone_boxed(&self) -> Result<Box<dyn Leaper<P, V> + Send>>;
}

/// Extends a prefix `P` with every value `v` such that `(keyfn(P), v)` is
/// in `relation`.
///
/// `count` performs a `lower_bound`/`upper_bound` pair of gallops to find
/// the key's value-block and caches its bounds; `propose` and `intersect`
/// reuse that cache rather than searching again, so the two calls that
/// typically follow `count` for the same prefix are O(block length) with
/// no further binary search.
pub struct ExtendWith<'r, K, V, F> {
    relation: &'r Relation<(K, V)>,
    key: F,
    cached: Option<(usize, usize)>,
}

impl<'r, K, V, F> ExtendWith<'r, K, V, F> {
    /// Builds a leaper that extends by `relation`, extracting the join key
    /// from a prefix with `key`.
    pub fn new(relation: &'r Relation<(K, V)>, key: F) -> Self {
        ExtendWith { relation, key, cached: None }
    }

    fn block_range(&self, k: &K) -> (usize, usize)
    where
        K: Ord,
    {
        let elements = &self.relation.elements[..];
        let from_start = gallop(elements, |x: &(K, V)| &x.0 < k);
        let start = elements.len() - from_start.len();
        let from_end = gallop(from_start, |x: &(K, V)| &x.0 <= k);
        let end = elements.len() - from_end.len();
        (start, end)
    }
}

impl<'r, P, K, V, F> Leaper<P, V> for ExtendWith<'r, K, V, F>
where
    K: Ord + Clone + Send + Sync + 'r,
    V: Ord + Clone + Send + Sync + 'r,
    F: Fn(&P) -> K + Clone + Send + Sync + 'r,
{
    fn count(&mut self, prefix: &P) -> usize {
        let key = (self.key)(prefix);
        let range = self.block_range(&key);
        self.cached = Some(range);
        range.1 - range.0
    }

    fn propose(&mut self, _prefix: &P, values: &mut Vec<V>) {
        let (start, end) = self.cached.expect("count must be called before propose");
        values.clear();
        values.extend(self.relation.elements[start..end].iter().map(|(_, v)| v.clone()));
    }

    fn intersect(&mut self, prefix: &P, values: &mut Vec<V>) {
        let key = (self.key)(prefix);
        let (start, end) = self.block_range(&key);
        let block = &self.relation.elements[start..end];
        let mut slice = block;
        values.retain(|v| {
            slice = gallop(slice, |(_, bv): &(K, V)| bv < v);
            slice.first().map(|(_, bv)| bv) == Some(v)
        });
    }

    fn clone_boxed(&self) -> Result<Box<dyn Leaper<P, V> + Send>> {
        Ok(Box::new(ExtendWith {
            relation: self.relation,
            key: self.key.clone(),
            cached: None,
        }))
    }
}

/// Filters a prefix `P` out entirely when `kvfn(P)` appears in `relation`.
///
/// Used for `FilterAnti` in a rule like `p(x) :- q(x), !blocked(key(x))`:
/// the whole prefix is dropped before any value is ever proposed, rather
/// than filtering proposed values after the fact.
pub struct FilterAnti<'r, K, F> {
    relation: &'r Relation<K>,
    key: F,
}

impl<'r, K, F> FilterAnti<'r, K, F> {
    /// Builds a leaper that drops any prefix whose `key(P)` is present in
    /// `relation`.
    pub fn new(relation: &'r Relation<K>, key: F) -> Self {
        FilterAnti { relation, key }
    }
}

impl<'r, P, K, V, F> Leaper<P, V> for FilterAnti<'r, K, F>
where
    K: Ord + Clone + Send + Sync + 'r,
    F: Fn(&P) -> K + Clone + Send + Sync + 'r,
{
    fn count(&mut self, prefix: &P) -> usize {
        let key = (self.key)(prefix);
        if self.relation.elements.binary_search(&key).is_ok() {
            0
        } else {
            UNBOUNDED
        }
    }

    fn propose(&mut self, _prefix: &P, _values: &mut Vec<V>) {
        unreachable!("FilterAnti.count() never returns a value low enough to be selected as proposer")
    }

    fn intersect(&mut self, _prefix: &P, _values: &mut Vec<V>) {}

    fn clone_boxed(&self) -> Result<Box<dyn Leaper<P, V> + Send>> {
        Ok(Box::new(FilterAnti { relation: self.relation, key: self.key.clone() }))
    }
}

/// Restricts proposed values to those *absent* from `relation`'s value
/// block for the prefix's key: the leapfrog counterpart of
/// [`crate::join::join_anti`], usable inside a multi-way extend.
pub struct ExtendAnti<'r, K, V, F> {
    relation: &'r Relation<(K, V)>,
    key: F,
}

impl<'r, K, V, F> ExtendAnti<'r, K, V, F> {
    /// Builds a leaper that removes any value present in `relation`'s
    /// block for `key(P)`.
    pub fn new(relation: &'r Relation<(K, V)>, key: F) -> Self {
        ExtendAnti { relation, key }
    }

    fn block<'a>(&'a self, k: &K) -> &'a [(K, V)]
    where
        K: Ord,
    {
        let elements = &self.relation.elements[..];
        let from_start = gallop(elements, |x: &(K, V)| &x.0 < k);
        let start = elements.len() - from_start.len();
        let from_end = gallop(from_start, |x: &(K, V)| &x.0 <= k);
        let end = elements.len() - from_end.len();
        &elements[start..end]
    }
}

impl<'r, P, K, V, F> Leaper<P, V> for ExtendAnti<'r, K, V, F>
where
    K: Ord + Clone + Send + Sync + 'r,
    V: Ord + Clone + Send + Sync + 'r,
    F: Fn(&P) -> K + Clone + Send + Sync + 'r,
{
    fn count(&mut self, _prefix: &P) -> usize {
        UNBOUNDED
    }

    fn propose(&mut self, _prefix: &P, _values: &mut Vec<V>) {
        unreachable!("ExtendAnti.count() is always UNBOUNDED and can never be selected as proposer")
    }

    fn intersect(&mut self, prefix: &P, values: &mut Vec<V>) {
        let key = (self.key)(prefix);
        let block = self.block(&key);
        let mut slice = block;
        values.retain(|v| {
            slice = gallop(slice, |(_, bv): &(K, V)| bv < v);
            slice.first().map(|(_, bv)| bv) != Some(v)
        });
    }

    fn clone_boxed(&self) -> Result<Box<dyn Leaper<P, V> + Send>> {
        Ok(Box::new(ExtendAnti { relation: self.relation, key: self.key.clone() }))
    }
}

fn clone_all<P, V>(leapers: &[Box<dyn Leaper<P, V> + Send>]) -> Result<Vec<Box<dyn Leaper<P, V> + Send>>> {
    let mut cloned = Vec::with_capacity(leapers.len());
    for leaper in leapers {
        cloned.push(leaper.clone_boxed()?);
    }
    Ok(cloned)
}

fn extend_chunk<P, V, Out>(
    chunk: &[P],
    leapers: &mut [Box<dyn Leaper<P, V> + Send>],
    logic: &(impl Fn(&P, &V) -> Out + Sync),
) -> Vec<Out> {
    let mut values = Vec::new();
    let mut results = Vec::new();

    for prefix in chunk {
        let mut min_index = None;
        let mut min_count = UNBOUNDED;
        for (i, leaper) in leapers.iter_mut().enumerate() {
            let count = leaper.count(prefix);
            if count < min_count {
                min_count = count;
                min_index = Some(i);
            }
        }

        let Some(min_index) = min_index else { continue };
        if min_count == 0 || min_count == UNBOUNDED {
            continue;
        }

        leapers[min_index].propose(prefix, &mut values);
        for (i, leaper) in leapers.iter_mut().enumerate() {
            if i != min_index {
                leaper.intersect(prefix, &mut values);
            }
        }

        results.extend(values.iter().map(|v| logic(prefix, v)));
    }

    results
}

/// Drives a leapfrog trie join: for each tuple in `source.recent`, selects
/// the most selective leaper to propose values, intersects the rest, and
/// writes `logic(prefix, value)` for each survivor into `out`.
///
/// See [`Leaper`] for the per-leaper protocol. When `ctx` has a worker
/// pool and `source.recent` is large enough, the prefixes are chunked and
/// each chunk gets its own clone of `leapers` (so the per-leaper caches in
/// `ExtendWith` are never shared across threads).
pub fn extend_into<P, V, Out>(
    ctx: &Context,
    source: &Variable<P>,
    leapers: &mut [Box<dyn Leaper<P, V> + Send>],
    out: &Variable<Out>,
    logic: impl Fn(&P, &V) -> Out + Sync,
) -> Result<()>
where
    P: Ord + Clone + Send + Sync + 'static,
    V: Ord + Clone + Send + Sync + 'static,
    Out: Ord + Clone + Send + Sync + 'static,
{
    let recent = source.recent();

    if recent.is_empty() || leapers.is_empty() {
        return out.insert_relation(Relation::empty(ctx));
    }

    let results = if ctx.is_parallel() && recent.len() > PARALLEL_THRESHOLD {
        let chunks: Vec<&[P]> = recent.elements.chunks(PARALLEL_THRESHOLD).collect();
        log::trace!(
            "extend_into: chunking {} prefixes into {} chunks across the worker pool",
            recent.len(),
            chunks.len()
        );
        let mut per_chunk_leapers: Vec<Vec<Box<dyn Leaper<P, V> + Send>>> = Vec::with_capacity(chunks.len());
        for _ in 0..chunks.len() {
            per_chunk_leapers.push(clone_all(leapers)?);
        }

        ctx.install(|| {
            use rayon::prelude::*;
            chunks
                .into_par_iter()
                .zip(per_chunk_leapers.par_iter_mut())
                .map(|(chunk, my_leapers)| extend_chunk(chunk, my_leapers, &logic))
                .flatten()
                .collect()
        })
    } else {
        extend_chunk(&recent.elements, leapers, &logic)
    };

    out.insert_relation(Relation::from_sequence(ctx, results)?)
}
