//! A small, embeddable engine for semi-naive Datalog evaluation.
//!
//! The moving parts are:
//!
//! - [`Relation`]: an immutable, sorted, deduplicated set of tuples.
//! - [`Variable`], driven by an [`Iteration`]: the `stable`/`recent`/`to_add`
//!   bookkeeping that makes repeated rule application converge to a fixed
//!   point without re-deriving facts it already has.
//! - [`join_into`] and [`join_anti`]: binary merge-join and anti-join over
//!   two variables (or a variable and a plain relation).
//! - [`Leaper`] and [`extend_into`]: leapfrog trie join, for intersecting a
//!   prefix relation against several others at once.
//! - [`aggregate`]: group-by folding over a relation's key prefix.
//! - [`Index`]: a secondary ordered index for point/range lookups outside a
//!   relation's own sort order.
//!
//! Construction throughout is allocation-fallible: buffer growth goes
//! through `try_reserve`, and anything that can fail returns
//! [`Result`]/[`Error`] rather than panicking or aborting.

#![forbid(missing_docs)]

mod aggregate;
mod codec;
mod context;
mod error;
mod gallop;
mod index;
mod iteration;
mod join;
mod leaper;
mod relation;
mod variable;

pub use aggregate::aggregate;
pub use codec::TupleCodec;
pub use context::Context;
pub use error::{Error, Result};
pub use gallop::{gallop, lower_bound};
pub use index::Index;
pub use iteration::Iteration;
pub use join::{join_anti, join_into, JoinInput};
pub use leaper::{extend_into, ExtendAnti, ExtendWith, FilterAnti, Leaper, UNBOUNDED};
pub use relation::Relation;
pub use variable::{Variable, VariableTrait};
