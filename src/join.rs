//! Merge-join over two sorted `(Key, Value)` relations, and the anti-join
//! used for stratified negation.

use std::sync::{Arc, RwLock};

use crate::context::{Context, PARALLEL_THRESHOLD};
use crate::error::Result;
use crate::gallop::gallop;
use crate::relation::Relation;
use crate::variable::Variable;

/// An input that can be used with [`join_into`] and [`join_anti`]: either a
/// [`Variable`] or a plain [`Relation`].
///
/// A `Relation`'s `recent` is always empty and its `stable` is itself as a
/// single batch, which is exactly what lets a fixed `Relation` stand in for
/// a `Variable` in the three-way `join_helper` enumeration without a
/// separate code path. Handles are reference-counted (`Variable`'s
/// compartments already live behind `Arc<RwLock<..>>`), so joining against
/// a `Variable` never copies its tuples; only the `Relation` impl pays a
/// one-time clone to materialize its single stable batch. `RwLock` (not
/// `Mutex`) matters here: a rule may join a variable against itself, which
/// obtains two handles to the same lock and reads through both at once.
pub trait JoinInput<'me, Tuple: Ord> {
    /// A shared handle to the tuples produced in the previous round.
    fn recent_handle(self) -> Arc<RwLock<Relation<Tuple>>>;
    /// A shared handle to the list of stable batches.
    fn stable_handle(self) -> Arc<RwLock<Vec<Relation<Tuple>>>>;
}

impl<'me, Tuple: Ord + Clone + Send + Sync + 'static> JoinInput<'me, Tuple> for &'me Variable<Tuple> {
    fn recent_handle(self) -> Arc<RwLock<Relation<Tuple>>> {
        Variable::recent_handle(self)
    }
    fn stable_handle(self) -> Arc<RwLock<Vec<Relation<Tuple>>>> {
        Variable::stable_handle(self)
    }
}

impl<'me, Tuple: Ord + Clone> JoinInput<'me, Tuple> for &'me Relation<Tuple> {
    fn recent_handle(self) -> Arc<RwLock<Relation<Tuple>>> {
        Arc::new(RwLock::new(Relation { elements: Vec::new() }))
    }
    fn stable_handle(self) -> Arc<RwLock<Vec<Relation<Tuple>>>> {
        Arc::new(RwLock::new(vec![self.clone()]))
    }
}

/// Scans two key-sorted slices of `(K, V1)` and `(K, V2)`, invoking
/// `result` once per pair sharing a key, in `(K, V1, V2)` order.
///
/// Cursors always sit at the head of an equal-key run. The smaller side's
/// cursor is galloped forward to the other's key; on a match, the full
/// cross product of the two equal-key runs is emitted and both cursors
/// advance past their runs.
fn join_helper<K: Ord, V1, V2>(
    mut slice1: &[(K, V1)],
    mut slice2: &[(K, V2)],
    result: &mut impl FnMut(&K, &V1, &V2),
) {
    while !slice1.is_empty() && !slice2.is_empty() {
        use std::cmp::Ordering;
        match slice1[0].0.cmp(&slice2[0].0) {
            Ordering::Less => {
                slice1 = gallop(slice1, |x| x.0 < slice2[0].0);
            }
            Ordering::Greater => {
                slice2 = gallop(slice2, |x| x.0 < slice1[0].0);
            }
            Ordering::Equal => {
                let key = &slice1[0].0;
                let count1 = slice1.iter().take_while(|x| &x.0 == key).count();
                let count2 = slice2.iter().take_while(|x| &x.0 == key).count();
                for (k1, v1) in &slice1[..count1] {
                    for (_, v2) in &slice2[..count2] {
                        result(k1, v1, v2);
                    }
                }
                slice1 = &slice1[count1..];
                slice2 = &slice2[count2..];
            }
        }
    }
}

/// Writes `A.recent x B_stable`, `A_stable x B.recent`, and `A.recent x
/// B.recent` through `join_helper`, mapping each match through `logic` and
/// inserting the results into `out` as one `Relation`.
///
/// This is the semi-naive join identity `Δ(A ⋈ B) = Δ(A) ⋈ B_stable ∪
/// A_stable ⋈ Δ(B) ∪ Δ(A) ⋈ Δ(B)`. An empty `A.recent` and empty
/// `B.recent` always produce no output regardless of `stable` contents,
/// which is what keeps semi-naive evaluation from re-deriving old facts.
///
/// When `ctx` has a worker pool, the stable-batch pairings are farmed out
/// one task per batch; the per-task buffers are concatenated (in batch
/// order, so the result is deterministic) before the final `Relation` is
/// built.
pub fn join_into<'me, K, V1, V2, Out>(
    ctx: &Context,
    a: impl JoinInput<'me, (K, V1)>,
    b: impl JoinInput<'me, (K, V2)>,
    out: &Variable<Out>,
    logic: impl Fn(&K, &V1, &V2) -> Out + Sync,
) -> Result<()>
where
    K: Ord + Clone + Send + Sync + 'static,
    V1: Ord + Clone + Send + Sync + 'static,
    V2: Ord + Clone + Send + Sync + 'static,
    Out: Ord + Clone + Send + Sync + 'static,
{
    let recent_a_handle = a.recent_handle();
    let recent_b_handle = b.recent_handle();
    let stable_a_handle = a.stable_handle();
    let stable_b_handle = b.stable_handle();

    let recent_a = recent_a_handle.read().expect("variable lock poisoned");
    let recent_b = recent_b_handle.read().expect("variable lock poisoned");
    let stable_a = stable_a_handle.read().expect("variable lock poisoned");
    let stable_b = stable_b_handle.read().expect("variable lock poisoned");

    let mut results = Vec::new();

    if !recent_a.is_empty() {
        if ctx.is_parallel() && stable_b.len() > 1 {
            log::trace!(
                "join_into: fanning recent_a ({} tuples) across {} stable_b batches",
                recent_a.len(),
                stable_b.len()
            );
        }
        results.extend(ctx.map_items(stable_b.as_slice(), |batch2| {
            let mut out = Vec::new();
            join_helper(&recent_a.elements, &batch2.elements, &mut |k, v1, v2| {
                out.push(logic(k, v1, v2))
            });
            out
        }));
    }

    if !recent_b.is_empty() {
        if ctx.is_parallel() && stable_a.len() > 1 {
            log::trace!(
                "join_into: fanning recent_b ({} tuples) across {} stable_a batches",
                recent_b.len(),
                stable_a.len()
            );
        }
        results.extend(ctx.map_items(stable_a.as_slice(), |batch1| {
            let mut out = Vec::new();
            join_helper(&batch1.elements, &recent_b.elements, &mut |k, v1, v2| {
                out.push(logic(k, v1, v2))
            });
            out
        }));
    }

    join_helper(&recent_a.elements, &recent_b.elements, &mut |k, v1, v2| {
        results.push(logic(k, v1, v2))
    });

    out.insert_relation(Relation::from_sequence(ctx, results)?)
}

/// Writes every tuple of `input.recent` whose key does not appear anywhere
/// in `filter` (its `recent` or any `stable` batch) through `logic`, and
/// inserts the results into `out` as one `Relation`.
///
/// Each probe gallops into the `filter` batches one at a time (`recent`
/// first, then `stable` oldest-to-newest as kept) and stops as soon as a
/// match is found: the common case of a selective filter does not pay for
/// every batch.
///
/// When `ctx` has a worker pool and `input.recent` is large enough,
/// `input.recent` is chunked and probed concurrently.
pub fn join_anti<'me, K, V, F, Out>(
    ctx: &Context,
    input: &'me Variable<(K, V)>,
    filter: &'me Variable<(K, F)>,
    out: &Variable<Out>,
    logic: impl Fn(&K, &V) -> Out + Sync,
) -> Result<()>
where
    K: Ord + Clone + Send + Sync + 'static,
    V: Ord + Clone + Send + Sync + 'static,
    F: Ord + Clone + Send + Sync + 'static,
    Out: Ord + Clone + Send + Sync + 'static,
{
    let recent = input.recent();
    let filter_recent = filter.recent();
    let filter_stable = filter.stable();

    let key_absent = |key: &K| -> bool {
        let mut slice = &filter_recent.elements[..];
        slice = gallop(slice, |x: &(K, F)| &x.0 < key);
        if slice.first().map(|x| &x.0) == Some(key) {
            return false;
        }
        for batch in filter_stable.iter() {
            let mut slice = &batch.elements[..];
            slice = gallop(slice, |x: &(K, F)| &x.0 < key);
            if slice.first().map(|x| &x.0) == Some(key) {
                return false;
            }
        }
        true
    };

    if ctx.is_parallel() && recent.len() > PARALLEL_THRESHOLD {
        log::trace!(
            "join_anti: chunking {} recent tuples across the worker pool",
            recent.len()
        );
    }

    let results = ctx.map_chunks(&recent.elements, PARALLEL_THRESHOLD, |chunk| {
        chunk
            .iter()
            .filter(|(k, _)| key_absent(k))
            .map(|(k, v)| logic(k, v))
            .collect::<Vec<_>>()
    });

    out.insert_relation(Relation::from_sequence(ctx, results)?)
}
