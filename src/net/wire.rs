//! Declarative fixed-size wire schemas
//!
//! A replicated struct lists its fields once as `(name, WireType)` and
//! exposes its values in that order; the generic [`encode`] and [`decode`]
//! routines do the rest. Quantized fields clamp to the 16-bit signed range.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::util::math::{dequantize_i16, quantize_i16};

/// On-the-wire representation of one field
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WireType {
    F64,
    F32,
    /// `value * scale`, rounded and clamped into an i16
    I16 { scale: f32 },
    U32,
    U8,
}

impl WireType {
    pub const fn size(&self) -> usize {
        match self {
            WireType::F64 => 8,
            WireType::F32 => 4,
            WireType::I16 { .. } => 2,
            WireType::U32 => 4,
            WireType::U8 => 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WireField {
    pub name: &'static str,
    pub ty: WireType,
}

impl WireField {
    pub const fn new(name: &'static str, ty: WireType) -> Self {
        Self { name, ty }
    }
}

/// A struct with a fixed wire layout
pub trait WireSchema: Sized {
    const FIELDS: &'static [WireField];

    /// Push field values in `FIELDS` order
    fn write_values(&self, out: &mut Vec<f64>);

    /// Rebuild from values in `FIELDS` order
    fn read_values(values: &[f64]) -> Self;
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum WireError {
    #[error("expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("schema declares {declared} fields but {written} values were written")]
    SchemaMismatch { declared: usize, written: usize },

    #[error("unknown frame tag {0}")]
    UnknownTag(u8),
}

/// Encoded size of `T` in bytes
pub fn wire_size<T: WireSchema>() -> usize {
    T::FIELDS.iter().map(|field| field.ty.size()).sum()
}

/// Append the encoding of `value` to `buf`
pub fn encode_into<T: WireSchema>(value: &T, buf: &mut BytesMut) -> Result<(), WireError> {
    let mut values = Vec::with_capacity(T::FIELDS.len());
    value.write_values(&mut values);
    if values.len() != T::FIELDS.len() {
        return Err(WireError::SchemaMismatch {
            declared: T::FIELDS.len(),
            written: values.len(),
        });
    }

    buf.reserve(wire_size::<T>());
    for (field, value) in T::FIELDS.iter().zip(values) {
        match field.ty {
            WireType::F64 => buf.put_f64(value),
            WireType::F32 => buf.put_f32(value as f32),
            WireType::I16 { scale } => buf.put_i16(quantize_i16(value as f32, scale)),
            WireType::U32 => buf.put_u32(value.clamp(0.0, u32::MAX as f64) as u32),
            WireType::U8 => buf.put_u8(value.clamp(0.0, u8::MAX as f64) as u8),
        }
    }
    Ok(())
}

pub fn encode<T: WireSchema>(value: &T) -> Result<Bytes, WireError> {
    let mut buf = BytesMut::with_capacity(wire_size::<T>());
    encode_into(value, &mut buf)?;
    Ok(buf.freeze())
}

/// Decode exactly one `T` from `buf`; trailing or missing bytes are errors
pub fn decode<T: WireSchema>(mut buf: &[u8]) -> Result<T, WireError> {
    let expected = wire_size::<T>();
    if buf.len() != expected {
        return Err(WireError::Length {
            expected,
            actual: buf.len(),
        });
    }

    let values: Vec<f64> = T::FIELDS
        .iter()
        .map(|field| match field.ty {
            WireType::F64 => buf.get_f64(),
            WireType::F32 => buf.get_f32() as f64,
            WireType::I16 { scale } => dequantize_i16(buf.get_i16(), scale) as f64,
            WireType::U32 => buf.get_u32() as f64,
            WireType::U8 => buf.get_u8() as f64,
        })
        .collect();

    Ok(T::read_values(&values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[derive(Debug, PartialEq)]
    struct Sample {
        id: u32,
        level: f32,
        rate: f32,
    }

    impl WireSchema for Sample {
        const FIELDS: &'static [WireField] = &[
            WireField::new("id", WireType::U32),
            WireField::new("level", WireType::F32),
            WireField::new("rate", WireType::I16 { scale: 10.0 }),
        ];

        fn write_values(&self, out: &mut Vec<f64>) {
            out.extend([self.id as f64, self.level as f64, self.rate as f64]);
        }

        fn read_values(values: &[f64]) -> Self {
            Self {
                id: values[0] as u32,
                level: values[1] as f32,
                rate: values[2] as f32,
            }
        }
    }

    struct Lying;

    impl WireSchema for Lying {
        const FIELDS: &'static [WireField] = &[WireField::new("a", WireType::U8)];

        fn write_values(&self, out: &mut Vec<f64>) {
            out.extend([1.0, 2.0]);
        }

        fn read_values(_: &[f64]) -> Self {
            Lying
        }
    }

    #[test]
    fn size_is_sum_of_fields() {
        assert_eq!(wire_size::<Sample>(), 4 + 4 + 2);
        assert_eq!(encode(&Sample { id: 1, level: 2.0, rate: 3.0 }).unwrap().len(), 10);
    }

    #[test]
    fn quantized_field_loses_only_precision() {
        let sample = Sample {
            id: 42,
            level: 1.5,
            rate: 12.34,
        };
        let decoded: Sample = decode(&encode(&sample).unwrap()).unwrap();
        assert_eq!(decoded.id, 42);
        assert_eq!(decoded.level, 1.5);
        assert_approx_eq!(decoded.rate, 12.3, 1e-4);
    }

    #[test]
    fn quantized_field_saturates() {
        let sample = Sample {
            id: 0,
            level: 0.0,
            rate: 1.0e9,
        };
        let decoded: Sample = decode(&encode(&sample).unwrap()).unwrap();
        assert_approx_eq!(decoded.rate, i16::MAX as f32 / 10.0, 1e-3);
    }

    #[test]
    fn wrong_length_is_rejected() {
        let err = decode::<Sample>(&[0u8; 3]).unwrap_err();
        assert_eq!(
            err,
            WireError::Length {
                expected: 10,
                actual: 3
            }
        );
    }

    #[test]
    fn schema_mismatch_is_rejected() {
        assert!(matches!(
            encode(&Lying),
            Err(WireError::SchemaMismatch {
                declared: 1,
                written: 2
            })
        ));
    }
}
