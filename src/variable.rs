//! `Variable<T>`: a monotonically growing, incrementally maintained
//! collection with the `stable` / `recent` / `to_add` compartments that
//! make semi-naive evaluation correct and efficient.

use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::context::Context;
use crate::error::{try_push, Result};
use crate::gallop::gallop;
use crate::relation::Relation;

/// A type that can report on whether it has changed, used so `Iteration`
/// can hold a heterogeneous collection of `Variable<T>`s for different
/// tuple types `T` behind one `Vec<Box<dyn VariableTrait>>`.
pub trait VariableTrait: Send {
    /// Advances this variable's state by one semi-naive round; see
    /// [`Variable::changed`].
    fn changed(&mut self) -> Result<bool>;
}

/// An monotonically increasing set of `Tuple`s, incrementally maintained
/// across rounds of a fixed-point computation.
///
/// Internally, state lives behind reference-counted locks rather than a
/// bare `Vec`/`Relation` so that a `Variable` handle can be cheaply cloned
/// (one clone lives with the host program, another is registered with the
/// owning `Iteration` so it can drive `changed()`), and so that
/// `Iteration::changed` can advance independent `Variable`s concurrently
/// on a worker pool. `recent` and `stable` use `RwLock`, not `Mutex`,
/// because a rule is allowed to join a variable against itself (the
/// common self-join idiom, e.g. `join_into(&ctx, &v, &v, &out, ..)`):
/// that call takes two handles to the identical lock and reads through
/// both. `RwLock` permits multiple concurrent readers, so two reads
/// through the same lock never block each other, the same way
/// `RefCell::borrow()` permits multiple live shared borrows. `to_add` has
/// no such requirement (only `insert_*` and `changed()` ever touch it),
/// so it stays a plain `Mutex`.
pub struct Variable<Tuple: Ord> {
    ctx: Context,
    /// A useful name for the variable, surfaced in trace-level diagnostics.
    pub name: String,
    stable: Arc<RwLock<Vec<Relation<Tuple>>>>,
    recent: Arc<RwLock<Relation<Tuple>>>,
    to_add: Arc<Mutex<Vec<Relation<Tuple>>>>,
}

impl<Tuple: Ord> Clone for Variable<Tuple> {
    fn clone(&self) -> Self {
        Variable {
            ctx: self.ctx.clone(),
            name: self.name.clone(),
            stable: self.stable.clone(),
            recent: self.recent.clone(),
            to_add: self.to_add.clone(),
        }
    }
}

impl<Tuple: Ord + Clone> Variable<Tuple> {
    /// Creates a new variable bound to `ctx`, with no tuples in any
    /// compartment.
    pub fn new(ctx: &Context, name: &str) -> Self {
        Variable {
            ctx: ctx.clone(),
            name: name.to_string(),
            stable: Arc::new(RwLock::new(Vec::new())),
            recent: Arc::new(RwLock::new(Relation::empty(ctx))),
            to_add: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn read_stable(&self) -> RwLockReadGuard<'_, Vec<Relation<Tuple>>> {
        self.stable.read().expect("variable lock poisoned")
    }
    fn write_stable(&self) -> RwLockWriteGuard<'_, Vec<Relation<Tuple>>> {
        self.stable.write().expect("variable lock poisoned")
    }
    fn read_recent(&self) -> RwLockReadGuard<'_, Relation<Tuple>> {
        self.recent.read().expect("variable lock poisoned")
    }
    fn write_recent(&self) -> RwLockWriteGuard<'_, Relation<Tuple>> {
        self.recent.write().expect("variable lock poisoned")
    }
    fn lock_to_add(&self) -> MutexGuard<'_, Vec<Relation<Tuple>>> {
        self.to_add.lock().expect("variable mutex poisoned")
    }

    /// Appends `relation` to `to_add`. Most commonly used to load initial
    /// (base) facts into a variable before the first round.
    pub fn insert_relation(&self, relation: Relation<Tuple>) -> Result<()> {
        try_push(&mut self.lock_to_add(), relation)
    }

    /// Builds a `Relation` from `xs` (sorting and deduplicating it) and
    /// appends it to `to_add`.
    ///
    /// An empty `xs` still appends an empty `Relation` rather than being
    /// skipped: a deliberate no-op that keeps `to_add`'s batch-count
    /// accounting predictable under test.
    pub fn insert_sequence(&self, xs: impl IntoIterator<Item = Tuple>) -> Result<()> {
        let relation = Relation::from_sequence(&self.ctx, xs)?;
        self.insert_relation(relation)
    }

    /// The sum of sizes across `stable`, `recent`, and `to_add`.
    ///
    /// This is an upper bound on the variable's true set size, not an
    /// exact count: `to_add` may still contain tuples already present in
    /// `stable` that have not yet been filtered out by `changed`. It
    /// becomes exact once the variable has stabilized (no more rounds
    /// produce new tuples).
    pub fn total_len(&self) -> usize {
        let stable: usize = self.read_stable().iter().map(Relation::len).sum();
        let recent = self.read_recent().len();
        let to_add: usize = self.lock_to_add().iter().map(Relation::len).sum();
        stable + recent + to_add
    }

    /// A read-only view of the recently produced tuples: those from the
    /// previous round, which rule bodies should join against this round.
    pub fn recent(&self) -> RwLockReadGuard<'_, Relation<Tuple>> {
        self.read_recent()
    }

    /// A read-only view of the stable batches: tuples from rounds before
    /// last.
    pub fn stable(&self) -> RwLockReadGuard<'_, Vec<Relation<Tuple>>> {
        self.read_stable()
    }

    /// A cheap (reference-counted) handle to the `recent` compartment,
    /// shared rather than cloned. Used by [`crate::join::JoinInput`] so
    /// that joining against a `Variable` never copies its tuples, and so
    /// that a rule can join a `Variable` against itself without deadlock:
    /// two handles cloned from the same `Arc` and read concurrently share
    /// the underlying `RwLock`'s reader slot rather than contending for it.
    pub(crate) fn recent_handle(&self) -> Arc<RwLock<Relation<Tuple>>> {
        self.recent.clone()
    }

    /// A cheap (reference-counted) handle to the `stable` compartment.
    pub(crate) fn stable_handle(&self) -> Arc<RwLock<Vec<Relation<Tuple>>>> {
        self.stable.clone()
    }

    /// Drains `recent` and `to_add` into `stable`, then fold-merges all of
    /// `stable` into one `Relation`, leaving the variable's compartments
    /// empty. The returned relation is the computation's fixed-point
    /// value once no further rounds will touch this variable.
    pub fn complete(&self) -> Result<Relation<Tuple>> {
        {
            let mut recent = self.write_recent();
            if !recent.is_empty() {
                let taken = std::mem::replace(&mut *recent, Relation::empty(&self.ctx));
                self.write_stable().push(taken);
            }
        }
        {
            let mut to_add = self.lock_to_add();
            let mut stable = self.write_stable();
            for batch in to_add.drain(..) {
                stable.push(batch);
            }
        }

        let mut stable = self.write_stable();
        let mut result = Relation::empty(&self.ctx);
        while let Some(batch) = stable.pop() {
            result = result.merge(batch)?;
        }
        Ok(result)
    }
}

impl<Tuple: Ord + Clone + Send + Sync + 'static> VariableTrait for Variable<Tuple> {
    fn changed(&mut self) -> Result<bool> {
        // Phase 1: promote `recent` into `stable`, keeping batches
        // geometrically sized by folding in trailing stable batches no
        // more than twice `recent`'s (growing) size.
        let mut recent = {
            let mut guard = self.write_recent();
            std::mem::replace(&mut *guard, Relation::empty(&self.ctx))
        };
        if !recent.is_empty() {
            loop {
                let should_merge = {
                    let stable = self.read_stable();
                    matches!(stable.last(), Some(last) if last.len() <= 2 * recent.len())
                };
                if !should_merge {
                    break;
                }
                let last = self.write_stable().pop().expect("checked non-empty above");
                recent = recent.merge(last)?;
            }
            self.write_stable().push(recent);
        }

        // Phase 2: fold-merge `to_add` into one candidate batch, then
        // filter out tuples already present in any `stable` batch.
        let to_add_batches: Vec<_> = self.lock_to_add().drain(..).collect();
        let mut candidate = Relation::empty(&self.ctx);
        for batch in to_add_batches {
            candidate = candidate.merge(batch)?;
        }

        if !candidate.is_empty() {
            for batch in self.read_stable().iter() {
                let mut slice = &batch.elements[..];
                candidate.elements.retain(|x| {
                    slice = gallop(slice, |y| y < x);
                    slice.first() != Some(x)
                });
            }
        }

        let is_changed = !candidate.is_empty();
        log::trace!(
            "variable {} changed: stable_batches={} recent={}",
            self.name,
            self.read_stable().len(),
            candidate.len()
        );
        *self.write_recent() = candidate;
        Ok(is_changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iteration::Iteration;

    #[test]
    fn total_len_reflects_pending_insertions_before_first_changed() {
        let ctx = Context::sequential();
        let mut it = Iteration::new(&ctx);
        let v: Variable<u32> = it.variable("v");
        v.insert_sequence(vec![1, 2, 3]).unwrap();
        assert_eq!(v.total_len(), 3);
    }

    #[test]
    fn changed_false_once_stable_and_no_new_tuples() {
        let ctx = Context::sequential();
        let mut it = Iteration::new(&ctx);
        let v: Variable<u32> = it.variable("v");
        v.insert_sequence(vec![1, 2, 3]).unwrap();
        assert!(it.changed().unwrap());
        assert!(!it.changed().unwrap());
        assert!(v.recent().is_empty());
    }

    #[test]
    fn recent_disjoint_from_stable_across_rounds() {
        let ctx = Context::sequential();
        let mut it = Iteration::new(&ctx);
        let v: Variable<u32> = it.variable("v");
        v.insert_sequence(vec![1, 2, 3]).unwrap();
        it.changed().unwrap();
        v.insert_sequence(vec![2, 3, 4]).unwrap();
        it.changed().unwrap();
        let recent = v.recent();
        for batch in v.stable().iter() {
            for x in recent.elements.iter() {
                assert!(!batch.elements.contains(x));
            }
        }
        assert_eq!(recent.elements, vec![4]);
    }

    #[test]
    fn soundness_and_completeness_over_rounds() {
        let ctx = Context::sequential();
        let mut it = Iteration::new(&ctx);
        let v: Variable<u32> = it.variable("v");
        v.insert_sequence(vec![1, 2, 3]).unwrap();
        it.changed().unwrap();
        v.insert_sequence(vec![3, 4, 5]).unwrap();
        while it.changed().unwrap() {}
        let result = v.complete().unwrap();
        assert_eq!(result.elements, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn total_len_is_upper_bound_and_exact_when_stable() {
        let ctx = Context::sequential();
        let mut it = Iteration::new(&ctx);
        let v: Variable<u32> = it.variable("v");
        v.insert_sequence(vec![1, 2, 2, 3]).unwrap();
        while it.changed().unwrap() {}
        let complete_len = v.total_len();
        assert_eq!(complete_len, 3);
    }
}
