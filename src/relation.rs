//! `Relation<T>`: an immutable, sorted, deduplicated set of tuples.

use std::io::{Read, Write};
use std::ops::Deref;

use crate::codec::TupleCodec;
use crate::context::Context;
use crate::error::{try_reserve, Error, Result};

const MAGIC: &[u8; 7] = b"ZODDREL";
const VERSION: u8 = 1;

/// A static, ordered list of key-value (or arbitrary) tuples.
///
/// A `Relation` represents a fixed *set* of tuples. Its storage is a single
/// `Vec<Tuple>`, always sorted ascending and free of duplicates once
/// construction completes. Many places in a Datalog computation want to be
/// sure that a relation cannot vary underneath them (anti-joins, in
/// particular): a `Relation` never changes after it is built; only
/// `merge` produces a new one, consuming both operands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation<Tuple: Ord> {
    /// Wrapped elements in the relation.
    ///
    /// Always sorted and deduplicated when `Relation` was built through
    /// this crate's constructors. Manual construction (e.g. `From` on a
    /// pre-sorted iterator) must preserve that invariant.
    pub elements: Vec<Tuple>,
}

impl<Tuple: Ord> Relation<Tuple> {
    /// A relation with no elements. Does not allocate.
    pub fn empty(_ctx: &Context) -> Self {
        Relation { elements: Vec::new() }
    }

    /// Copies `xs` into a fresh buffer, sorts it, and removes duplicates.
    ///
    /// The input ordering is never trusted: even if the caller claims `xs`
    /// is already sorted, this always re-sorts. That is what makes
    /// `Relation::load` safe against an adversarial or merely buggy writer.
    pub fn from_sequence(_ctx: &Context, xs: impl IntoIterator<Item = Tuple>) -> Result<Self> {
        let iter = xs.into_iter();
        let (lower, _) = iter.size_hint();
        let mut elements = Vec::new();
        try_reserve(&mut elements, lower)?;
        for x in iter {
            if elements.len() == elements.capacity() {
                try_reserve(&mut elements, 1)?;
            }
            elements.push(x);
        }
        elements.sort_unstable();
        elements.dedup();
        elements.shrink_to_fit();
        Ok(Relation { elements })
    }

    /// The number of elements in the relation.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the relation has no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Merges two relations into their set union, consuming both.
    ///
    /// A plain linear merge: two cursors walk both inputs, the smaller
    /// element is emitted, and equal elements are emitted once while both
    /// cursors advance. Either empty operand is handed back unchanged
    /// (a zero-length fast path).
    pub fn merge(self, other: Self) -> Result<Self> {
        if self.elements.is_empty() {
            return Ok(other);
        }
        if other.elements.is_empty() {
            return Ok(self);
        }

        let mut out = Vec::new();
        try_reserve(&mut out, self.elements.len() + other.elements.len())?;

        let mut a = self.elements.into_iter().peekable();
        let mut b = other.elements.into_iter().peekable();
        loop {
            match (a.peek(), b.peek()) {
                (Some(x), Some(y)) => match x.cmp(y) {
                    std::cmp::Ordering::Less => out.push(a.next().unwrap()),
                    std::cmp::Ordering::Greater => out.push(b.next().unwrap()),
                    std::cmp::Ordering::Equal => {
                        out.push(a.next().unwrap());
                        b.next();
                    }
                },
                (Some(_), None) => out.push(a.next().unwrap()),
                (None, Some(_)) => out.push(b.next().unwrap()),
                (None, None) => break,
            }
        }

        Ok(Relation { elements: out })
    }
}

impl<Tuple: Ord> Deref for Relation<Tuple> {
    type Target = [Tuple];
    fn deref(&self) -> &Self::Target {
        &self.elements[..]
    }
}

impl<Tuple: Ord> Default for Relation<Tuple> {
    fn default() -> Self {
        Relation { elements: Vec::new() }
    }
}

impl<Tuple: Ord + TupleCodec> Relation<Tuple> {
    /// Writes the persisted byte layout: a 7-byte magic, a version byte,
    /// an 8-byte little-endian length, then each tuple in order.
    ///
    /// Only callable when `Tuple: TupleCodec`, which is this crate's
    /// static stand-in for "the schema contains no pointer fields":
    /// there is no pointer-bearing type for which `TupleCodec` is
    /// implemented, so attempting to persist one is a compile error
    /// rather than a run-time `unsupported_type`.
    pub fn save<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(MAGIC)?;
        w.write_all(&[VERSION])?;
        w.write_all(&(self.elements.len() as u64).to_le_bytes())?;
        for tuple in &self.elements {
            tuple.write_le(w)?;
        }
        Ok(())
    }

    /// Loads a relation with no bound on the declared length.
    pub fn load<R: Read>(ctx: &Context, r: &mut R) -> Result<Self> {
        Self::load_with_limit(ctx, r, u64::MAX)
    }

    /// Loads a relation, rejecting a declared length greater than `max_len`.
    ///
    /// Validation order: magic, then version, then length-vs-limit. After
    /// reading all records the data is re-sorted and re-deduplicated;
    /// the producer's claimed ordering is never trusted.
    pub fn load_with_limit<R: Read>(ctx: &Context, r: &mut R, max_len: u64) -> Result<Self> {
        let mut magic = [0u8; 7];
        r.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(Error::InvalidFormat);
        }

        let mut version = [0u8; 1];
        r.read_exact(&mut version)?;
        if version[0] != VERSION {
            return Err(Error::UnsupportedVersion);
        }

        let mut len_bytes = [0u8; 8];
        r.read_exact(&mut len_bytes)?;
        let len = u64::from_le_bytes(len_bytes);
        if len > max_len {
            return Err(Error::TooLarge { len, limit: max_len });
        }
        let len_usize = usize::try_from(len).map_err(|_| Error::InvalidFormat)?;

        let mut elements = Vec::new();
        try_reserve(&mut elements, len_usize)?;
        for _ in 0..len_usize {
            elements.push(Tuple::read_le(r)?);
        }

        Self::from_sequence(ctx, elements)
    }
}
