//! The single error type returned by every fallible operation in this crate.

use std::io;

/// Failure modes raised by relation construction, persistence, and the
/// fixed-point driver.
///
/// Every public function that can fail returns `Result<_, Error>`; none of
/// the operators in this crate panic on well-formed input.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A buffer allocation, append, or leaper clone could not be satisfied.
    ///
    /// The operation that raised this leaves its inputs unchanged.
    #[error("allocation failed")]
    AllocationFailed,

    /// An `Iteration` exceeded its configured `max_rounds`.
    ///
    /// The `Iteration` remains usable after a call to `reset()`.
    #[error("iteration exceeded its maximum round count")]
    MaxRoundsExceeded,

    /// `Relation::load` saw a magic number other than `"ZODDREL"`.
    #[error("invalid relation file format")]
    InvalidFormat,

    /// `Relation::load` saw a version byte other than the one this crate writes.
    #[error("unsupported relation file version")]
    UnsupportedVersion,

    /// `Relation::load_with_limit` saw a declared length exceeding the caller's limit.
    #[error("relation length {len} exceeds limit {limit}")]
    TooLarge {
        /// The length declared in the file header.
        len: u64,
        /// The limit the caller supplied to `load_with_limit`.
        limit: u64,
    },

    /// The tuple type cannot be persisted (its schema contains a pointer-like field).
    #[error("tuple type does not support persistence")]
    UnsupportedType,

    /// Propagated verbatim from the caller-supplied reader or writer.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Grows `vec` by `additional` elements without risking an abort on
/// allocation failure, surfacing `Error::AllocationFailed` instead.
pub(crate) fn try_reserve<T>(vec: &mut Vec<T>, additional: usize) -> Result<()> {
    vec.try_reserve(additional).map_err(|_| Error::AllocationFailed)
}

/// Pushes `item` onto `vec`, reserving capacity fallibly first so the push
/// itself can never abort the process on allocation failure.
pub(crate) fn try_push<T>(vec: &mut Vec<T>, item: T) -> Result<()> {
    if vec.len() == vec.capacity() {
        try_reserve(vec, 1)?;
    }
    vec.push(item);
    Ok(())
}
