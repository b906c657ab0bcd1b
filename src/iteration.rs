//! `Iteration`: the fixed-point driver that advances a group of
//! `Variable`s in lock-step.

use crate::context::Context;
use crate::error::{Error, Result};
use crate::variable::{Variable, VariableTrait};

/// An iterative context for semi-naive fixed-point evaluation.
///
/// `Iteration` owns a collection of `Variable`s created through it (so
/// they share its `Context`), advances them together each round via
/// `changed()`, and enforces an optional cap on the number of rounds.
pub struct Iteration {
    ctx: Context,
    variables: Vec<Box<dyn VariableTrait>>,
    current_round: usize,
    max_rounds: Option<usize>,
}

impl Iteration {
    /// An iteration with no bound on the number of rounds.
    pub fn new(ctx: &Context) -> Self {
        Iteration {
            ctx: ctx.clone(),
            variables: Vec::new(),
            current_round: 0,
            max_rounds: None,
        }
    }

    /// An iteration that fails with `Error::MaxRoundsExceeded` once
    /// `changed()` has been called more than `max_rounds` times.
    pub fn with_max_rounds(ctx: &Context, max_rounds: usize) -> Self {
        Iteration {
            ctx: ctx.clone(),
            variables: Vec::new(),
            current_round: 0,
            max_rounds: Some(max_rounds),
        }
    }

    /// The number of completed `changed()` calls since construction or
    /// the last `reset()`.
    pub fn current_round(&self) -> usize {
        self.current_round
    }

    /// Creates a new variable bound to this iteration's context, and
    /// registers it so `changed()` advances it alongside the others.
    pub fn variable<Tuple: Ord + Clone + Send + Sync + 'static>(
        &mut self,
        name: &str,
    ) -> Variable<Tuple> {
        let variable = Variable::new(&self.ctx, name);
        self.variables.push(Box::new(variable.clone()));
        variable
    }

    /// Advances every member variable by one semi-naive round.
    ///
    /// Increments the round counter first, failing with
    /// `max_rounds_exceeded` if a cap was configured and has been
    /// exceeded. Returns the logical OR of each variable's own
    /// `changed()` result: a caller typically loops `while
    /// iteration.changed()? { ... }` until every variable stops
    /// producing new tuples.
    ///
    /// When the context has a worker pool and there is more than one
    /// variable, the per-variable advances run concurrently on that pool;
    /// the call still blocks until all of them finish.
    pub fn changed(&mut self) -> Result<bool> {
        self.current_round += 1;
        if let Some(max) = self.max_rounds {
            if self.current_round > max {
                return Err(Error::MaxRoundsExceeded);
            }
        }
        log::trace!(
            "iteration round {} begins with {} variables",
            self.current_round,
            self.variables.len()
        );

        let any = if self.ctx.is_parallel() && self.variables.len() > 1 {
            log::trace!(
                "iteration round {}: advancing {} variables on the worker pool",
                self.current_round,
                self.variables.len()
            );
            let ctx = self.ctx.clone();
            let variables = &mut self.variables;
            let results: Vec<Result<bool>> = ctx.install(move || {
                use rayon::prelude::*;
                variables.par_iter_mut().map(|v| v.changed()).collect()
            });
            let mut any = false;
            for r in results {
                any |= r?;
            }
            any
        } else {
            let mut any = false;
            for variable in self.variables.iter_mut() {
                any |= variable.changed()?;
            }
            any
        };

        log::debug!(
            "iteration round {} ends, changed={}",
            self.current_round,
            any
        );
        Ok(any)
    }

    /// Zeroes the round counter without touching any variable.
    ///
    /// The hook for incremental maintenance: after a fixed point
    /// converges, insert additional base tuples into the still-live
    /// variables and call `reset()` before re-driving `changed()` to
    /// extend the result without recomputing it from scratch.
    pub fn reset(&mut self) {
        self.current_round = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_rounds_is_enforced() {
        let ctx = Context::sequential();
        let mut it = Iteration::with_max_rounds(&ctx, 2);
        let v: Variable<u32> = it.variable("v");
        v.insert_sequence(vec![1]).unwrap();
        assert!(it.changed().unwrap());
        // Second call promotes recent with nothing new to add; still within budget.
        assert!(!it.changed().unwrap());
        let err = it.changed().unwrap_err();
        assert!(matches!(err, Error::MaxRoundsExceeded));
    }

    #[test]
    fn reset_allows_continued_use_after_cap() {
        let ctx = Context::sequential();
        let mut it = Iteration::with_max_rounds(&ctx, 1);
        let v: Variable<u32> = it.variable("v");
        v.insert_sequence(vec![1]).unwrap();
        it.changed().unwrap();
        assert!(it.changed().is_err());
        it.reset();
        assert_eq!(it.current_round(), 0);
        assert!(it.changed().is_ok());
    }

    #[test]
    fn parallel_context_advances_multiple_variables() {
        let ctx = Context::with_workers(2);
        let mut it = Iteration::new(&ctx);
        let a: Variable<u32> = it.variable("a");
        let b: Variable<u32> = it.variable("b");
        a.insert_sequence(vec![1, 2, 3]).unwrap();
        b.insert_sequence(vec![4, 5]).unwrap();
        while it.changed().unwrap() {}
        assert_eq!(a.complete().unwrap().elements, vec![1, 2, 3]);
        assert_eq!(b.complete().unwrap().elements, vec![4, 5]);
    }
}
