//! `TupleCodec`: the small type-traits helper that enumerates a tuple
//! type's fields for the on-disk persistence format.
//!
//! Implemented for scalars, fixed-size arrays, and tuples up to arity 8.
//! Deliberately *not* implemented for references, raw pointers, `Box`, or
//! other pointer-bearing types: a tuple type containing one simply fails
//! to satisfy `Relation::save`'s `T: TupleCodec` bound at compile time,
//! which is the static counterpart of the runtime `unsupported_type` error.

use std::io::{self, Read, Write};

/// A tuple type whose fields can be written to and read from the
/// little-endian byte layout described in the persisted relation format.
pub trait TupleCodec: Sized {
    /// Writes `self`, field by field in declaration order, little-endian.
    fn write_le<W: Write>(&self, w: &mut W) -> io::Result<()>;
    /// Reads a value back using the same field order `write_le` wrote.
    fn read_le<R: Read>(r: &mut R) -> io::Result<Self>;
}

macro_rules! impl_codec_int {
    ($($t:ty),* $(,)?) => {
        $(
            impl TupleCodec for $t {
                fn write_le<W: Write>(&self, w: &mut W) -> io::Result<()> {
                    w.write_all(&self.to_le_bytes())
                }
                fn read_le<R: Read>(r: &mut R) -> io::Result<Self> {
                    let mut buf = [0u8; std::mem::size_of::<$t>()];
                    r.read_exact(&mut buf)?;
                    Ok(<$t>::from_le_bytes(buf))
                }
            }
        )*
    };
}

impl_codec_int!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize);

impl TupleCodec for f32 {
    fn write_le<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.to_bits().to_le_bytes())
    }
    fn read_le<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut buf = [0u8; 4];
        r.read_exact(&mut buf)?;
        Ok(f32::from_bits(u32::from_le_bytes(buf)))
    }
}

impl TupleCodec for f64 {
    fn write_le<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.to_bits().to_le_bytes())
    }
    fn read_le<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut buf = [0u8; 8];
        r.read_exact(&mut buf)?;
        Ok(f64::from_bits(u64::from_le_bytes(buf)))
    }
}

impl TupleCodec for bool {
    fn write_le<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&[if *self { 1 } else { 0 }])
    }
    fn read_le<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut buf = [0u8; 1];
        r.read_exact(&mut buf)?;
        match buf[0] {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid bool tag {}", other),
            )),
        }
    }
}

impl<T: TupleCodec, const N: usize> TupleCodec for [T; N] {
    fn write_le<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for item in self.iter() {
            item.write_le(w)?;
        }
        Ok(())
    }
    fn read_le<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut values = Vec::with_capacity(N);
        for _ in 0..N {
            values.push(T::read_le(r)?);
        }
        match values.try_into() {
            Ok(arr) => Ok(arr),
            Err(_) => unreachable!("Vec of exactly N elements always converts to [T; N]"),
        }
    }
}

macro_rules! impl_codec_tuple {
    ($($name:ident)+) => {
        impl<$($name: TupleCodec),+> TupleCodec for ($($name,)+) {
            #[allow(non_snake_case)]
            fn write_le<W: Write>(&self, w: &mut W) -> io::Result<()> {
                let ($(ref $name,)+) = *self;
                $($name.write_le(w)?;)+
                Ok(())
            }
            fn read_le<R: Read>(r: &mut R) -> io::Result<Self> {
                Ok(($($name::read_le(r)?,)+))
            }
        }
    };
}

impl_codec_tuple!(A);
impl_codec_tuple!(A B);
impl_codec_tuple!(A B C);
impl_codec_tuple!(A B C D);
impl_codec_tuple!(A B C D E);
impl_codec_tuple!(A B C D E F);
impl_codec_tuple!(A B C D E F G);
impl_codec_tuple!(A B C D E F G H);

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: TupleCodec + PartialEq + std::fmt::Debug>(value: T) {
        let mut buf = Vec::new();
        value.write_le(&mut buf).unwrap();
        let mut cursor = &buf[..];
        let back = T::read_le(&mut cursor).unwrap();
        assert_eq!(value, back);
        assert!(cursor.is_empty());
    }

    #[test]
    fn scalars_roundtrip() {
        roundtrip(42u64);
        roundtrip(-7i32);
        roundtrip(true);
        roundtrip(false);
        roundtrip(3.5f64);
        roundtrip([1u32, 2, 3]);
    }

    #[test]
    fn tuples_roundtrip() {
        roundtrip((1u32, 2u64));
        roundtrip((1u8, 2u16, 3u32, 4u64));
    }

    #[test]
    fn bool_rejects_bad_tag() {
        let mut cursor: &[u8] = &[7u8];
        let err = bool::read_le(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
