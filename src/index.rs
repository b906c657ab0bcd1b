//! `Index<K, T, F>`: a secondary ordered index over a growing collection of
//! relations, for point and range lookups that a sorted `Relation` alone
//! cannot serve efficiently once it is keyed on something other than its
//! natural sort order.

use std::collections::BTreeMap;

use crate::context::Context;
use crate::error::Result;
use crate::relation::Relation;

/// An ordered secondary index mapping keys (extracted by a fixed
/// `F: Fn(&T) -> K`) to the `Relation` of tuples sharing that key.
///
/// Backed by a `BTreeMap` rather than a hash map so that [`Index::get_range`]
/// can serve range queries directly from the map's own ordering, without a
/// separate sorted copy of the keys. The key-extractor is fixed at
/// construction (mirroring `Relation`'s own fixed sort order) rather than
/// passed per call, so every tuple inserted through one `Index` is
/// guaranteed to land under a key consistent with every other.
pub struct Index<K, T, F> {
    ctx: Context,
    keyfn: F,
    buckets: BTreeMap<K, Relation<T>>,
}

impl<K, T, F> Index<K, T, F>
where
    K: Ord + Clone,
    T: Ord + Clone,
    F: Fn(&T) -> K,
{
    /// An empty index keyed by `keyfn`.
    pub fn new(ctx: &Context, keyfn: F) -> Self {
        Index { ctx: ctx.clone(), keyfn, buckets: BTreeMap::new() }
    }

    /// The number of distinct keys currently indexed.
    pub fn key_count(&self) -> usize {
        self.buckets.len()
    }

    /// Inserts a single tuple, bucketing it under `keyfn(&tuple)`.
    ///
    /// Merges (as a set union, like [`Relation::merge`]) into that key's
    /// existing bucket if one is already present; otherwise creates a
    /// fresh singleton bucket.
    pub fn insert(&mut self, tuple: T) -> Result<()> {
        let key = (self.keyfn)(&tuple);
        let incoming = Relation::from_sequence(&self.ctx, std::iter::once(tuple))?;
        self.merge_bucket(key, incoming)
    }

    /// Merges every tuple of `relation` into the index, bucketing each one
    /// under `keyfn(tuple)`.
    ///
    /// Tuples that share a key are merged (as a set union, like
    /// [`Relation::merge`]) into that key's existing bucket; new keys get a
    /// fresh singleton bucket. Shares its grouping and merge logic with
    /// [`Index::insert`], just grouping more than one tuple per call.
    pub fn insert_relation(&mut self, relation: Relation<T>) -> Result<()> {
        let mut grouped: BTreeMap<K, Vec<T>> = BTreeMap::new();
        for tuple in relation.elements {
            let key = (self.keyfn)(&tuple);
            grouped.entry(key).or_default().push(tuple);
        }

        for (key, tuples) in grouped {
            let incoming = Relation::from_sequence(&self.ctx, tuples)?;
            self.merge_bucket(key, incoming)?;
        }
        Ok(())
    }

    fn merge_bucket(&mut self, key: K, incoming: Relation<T>) -> Result<()> {
        match self.buckets.remove(&key) {
            Some(existing) => {
                self.buckets.insert(key, existing.merge(incoming)?);
            }
            None => {
                self.buckets.insert(key, incoming);
            }
        }
        Ok(())
    }

    /// The bucket for exactly `key`, if any tuple has been indexed under it.
    pub fn get(&self, key: &K) -> Option<&Relation<T>> {
        self.buckets.get(key)
    }

    /// All tuples whose key falls in `[low, high]` inclusive, merged into
    /// one `Relation` in key order.
    pub fn get_range(&self, low: &K, high: &K) -> Result<Relation<T>> {
        let mut result = Relation::empty(&self.ctx);
        for bucket in self.buckets.range(low.clone()..=high.clone()).map(|(_, v)| v) {
            result = result.merge(bucket.clone())?;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_lookup_finds_inserted_tuples() {
        let ctx = Context::sequential();
        let mut index: Index<u32, (u32, u32), _> = Index::new(&ctx, |(k, _)| *k);
        index
            .insert_relation(Relation::from_sequence(&ctx, vec![(1u32, 10u32), (1, 11), (2, 20)]).unwrap())
            .unwrap();

        assert_eq!(index.get(&1).unwrap().elements, vec![(1, 10), (1, 11)]);
        assert_eq!(index.get(&2).unwrap().elements, vec![(2, 20)]);
        assert!(index.get(&3).is_none());
    }

    #[test]
    fn single_tuple_insert_matches_batch_insert() {
        let ctx = Context::sequential();
        let mut index: Index<u32, (u32, u32), _> = Index::new(&ctx, |(k, _)| *k);
        index.insert((1u32, 10u32)).unwrap();
        index.insert((1u32, 11u32)).unwrap();
        index.insert((2u32, 20u32)).unwrap();

        assert_eq!(index.get(&1).unwrap().elements, vec![(1, 10), (1, 11)]);
        assert_eq!(index.get(&2).unwrap().elements, vec![(2, 20)]);
        assert_eq!(index.key_count(), 2);
    }

    #[test]
    fn repeated_insert_merges_into_existing_bucket() {
        let ctx = Context::sequential();
        let mut index: Index<u32, (u32, u32), _> = Index::new(&ctx, |(k, _)| *k);
        index.insert_relation(Relation::from_sequence(&ctx, vec![(1u32, 10u32)]).unwrap()).unwrap();
        index.insert_relation(Relation::from_sequence(&ctx, vec![(1u32, 10u32), (1, 20)]).unwrap()).unwrap();

        assert_eq!(index.get(&1).unwrap().elements, vec![(1, 10), (1, 20)]);
        assert_eq!(index.key_count(), 1);
    }

    #[test]
    fn range_lookup_agrees_with_point_lookups() {
        let ctx = Context::sequential();
        let mut index: Index<u32, (u32, u32), _> = Index::new(&ctx, |(k, _)| *k);
        index
            .insert_relation(
                Relation::from_sequence(
                    &ctx,
                    vec![(1u32, 10u32), (2, 20), (3, 30), (4, 40), (5, 50)],
                )
                .unwrap(),
            )
            .unwrap();

        let ranged = index.get_range(&2, &4).unwrap();
        let mut expected = Vec::new();
        for key in [2u32, 3, 4] {
            expected.extend(index.get(&key).unwrap().elements.iter().cloned());
        }
        expected.sort();
        assert_eq!(ranged.elements, expected);
    }

    #[test]
    fn empty_range_is_empty() {
        let ctx = Context::sequential();
        let index: Index<u32, (u32, u32), _> = Index::new(&ctx, |(k, _)| *k);
        let ranged = index.get_range(&0, &100).unwrap();
        assert!(ranged.is_empty());
    }
}
