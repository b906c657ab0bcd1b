//! Group-by aggregation over a `Relation`'s key prefix.

use crate::context::{Context, PARALLEL_THRESHOLD};
use crate::error::Result;
use crate::relation::Relation;

/// Groups `input` by the key `keyfn` extracts from each tuple, folds each
/// group's values through `fold`, and returns one `(key, accumulator)` pair
/// per distinct key, sorted by key.
///
/// `fold` receives the running accumulator (starting from `init()`) and one
/// element of the group at a time, in the group's sorted order. Elements
/// are cloned rather than consumed by reference, trading a clone per
/// element for a fold signature that does not have to thread lifetimes
/// through `Context::map_chunks`.
///
/// Grouping is a plain sort over `(K, Tuple)` pairs; the thresholded
/// parallel chunking only applies to the initial keyfn-mapping pass, since
/// the fold itself is inherently sequential within a group.
pub fn aggregate<Tuple, K, Acc>(
    ctx: &Context,
    input: &Relation<Tuple>,
    keyfn: impl Fn(&Tuple) -> K + Sync,
    init: impl Fn() -> Acc,
    fold: impl Fn(Acc, &Tuple) -> Acc,
) -> Result<Relation<(K, Acc)>>
where
    Tuple: Ord + Clone + Send + Sync,
    K: Ord + Clone + Send + Sync,
    Acc: Send,
{
    if ctx.is_parallel() && input.len() > PARALLEL_THRESHOLD {
        log::trace!(
            "aggregate: chunking {} tuples into the keyfn pass across the worker pool",
            input.len()
        );
    }
    let mut keyed: Vec<(K, Tuple)> = ctx.map_chunks(&input.elements, PARALLEL_THRESHOLD, |chunk| {
        chunk.iter().map(|t| (keyfn(t), t.clone())).collect()
    });
    keyed.sort_by(|a, b| a.0.cmp(&b.0));

    let mut groups = Vec::new();
    let mut iter = keyed.into_iter().peekable();
    while let Some((key, first)) = iter.next() {
        let mut acc = fold(init(), &first);
        while let Some((next_key, _)) = iter.peek() {
            if *next_key != key {
                break;
            }
            let (_, tuple) = iter.next().expect("peeked Some");
            acc = fold(acc, &tuple);
        }
        groups.push((key, acc));
    }

    log::trace!("aggregate: folded {} tuples into {} groups", input.len(), groups.len());
    Relation::from_sequence(ctx, groups)
}
