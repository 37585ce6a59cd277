// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
//! Typed views over join key arrays.
//!
//! A view exposes the per-row operations the join tables need: fixed-width
//! little-endian packing, raw byte access for string-shaped keys, tagged
//! serialization for the fallback method, and integral/floating extraction
//! for the asof index.

use arrow::array::{
    Array, ArrayRef, BooleanArray, Date32Array, Date64Array, Decimal128Array, Decimal256Array,
    FixedSizeBinaryArray, Float32Array, Float64Array, Int16Array, Int32Array, Int64Array,
    Int8Array, StringArray, TimestampMicrosecondArray, TimestampMillisecondArray,
    TimestampNanosecondArray, TimestampSecondArray, UInt16Array, UInt32Array, UInt64Array,
    UInt8Array,
};
use arrow::datatypes::{DataType, TimeUnit};

/// Join keys treat every NaN as one value; collapse payloads to the
/// canonical pattern before the bits are packed, compared or hashed.
fn f64_key_bits(value: f64) -> u64 {
    if value.is_nan() {
        return f64::NAN.to_bits();
    }
    value.to_bits()
}

fn f32_key_bits(value: f32) -> u32 {
    if value.is_nan() {
        return f32::NAN.to_bits();
    }
    value.to_bits()
}

pub(crate) enum KeyColumnView<'a> {
    Boolean(&'a BooleanArray),
    Int8(&'a Int8Array),
    Int16(&'a Int16Array),
    Int32(&'a Int32Array),
    Int64(&'a Int64Array),
    UInt8(&'a UInt8Array),
    UInt16(&'a UInt16Array),
    UInt32(&'a UInt32Array),
    UInt64(&'a UInt64Array),
    Float32(&'a Float32Array),
    Float64(&'a Float64Array),
    Date32(&'a Date32Array),
    Date64(&'a Date64Array),
    TimestampSecond(&'a TimestampSecondArray),
    TimestampMillisecond(&'a TimestampMillisecondArray),
    TimestampMicrosecond(&'a TimestampMicrosecondArray),
    TimestampNanosecond(&'a TimestampNanosecondArray),
    Decimal128(&'a Decimal128Array),
    Decimal256(&'a Decimal256Array),
    Utf8(&'a StringArray),
    FixedSizeBinary(&'a FixedSizeBinaryArray),
}

macro_rules! downcast_view {
    ($array:expr, $array_ty:ty, $name:literal) => {
        $array
            .as_any()
            .downcast_ref::<$array_ty>()
            .ok_or_else(|| format!("failed to downcast to {}", $name))?
    };
}

pub(crate) fn build_key_views<'a>(
    arrays: &'a [ArrayRef],
) -> Result<Vec<KeyColumnView<'a>>, String> {
    let mut views = Vec::with_capacity(arrays.len());
    for array in arrays {
        let view = match array.data_type() {
            DataType::Boolean => {
                KeyColumnView::Boolean(downcast_view!(array, BooleanArray, "BooleanArray"))
            }
            DataType::Int8 => KeyColumnView::Int8(downcast_view!(array, Int8Array, "Int8Array")),
            DataType::Int16 => {
                KeyColumnView::Int16(downcast_view!(array, Int16Array, "Int16Array"))
            }
            DataType::Int32 => {
                KeyColumnView::Int32(downcast_view!(array, Int32Array, "Int32Array"))
            }
            DataType::Int64 => {
                KeyColumnView::Int64(downcast_view!(array, Int64Array, "Int64Array"))
            }
            DataType::UInt8 => {
                KeyColumnView::UInt8(downcast_view!(array, UInt8Array, "UInt8Array"))
            }
            DataType::UInt16 => {
                KeyColumnView::UInt16(downcast_view!(array, UInt16Array, "UInt16Array"))
            }
            DataType::UInt32 => {
                KeyColumnView::UInt32(downcast_view!(array, UInt32Array, "UInt32Array"))
            }
            DataType::UInt64 => {
                KeyColumnView::UInt64(downcast_view!(array, UInt64Array, "UInt64Array"))
            }
            DataType::Float32 => {
                KeyColumnView::Float32(downcast_view!(array, Float32Array, "Float32Array"))
            }
            DataType::Float64 => {
                KeyColumnView::Float64(downcast_view!(array, Float64Array, "Float64Array"))
            }
            DataType::Date32 => {
                KeyColumnView::Date32(downcast_view!(array, Date32Array, "Date32Array"))
            }
            DataType::Date64 => {
                KeyColumnView::Date64(downcast_view!(array, Date64Array, "Date64Array"))
            }
            DataType::Timestamp(unit, _tz) => match unit {
                TimeUnit::Second => KeyColumnView::TimestampSecond(downcast_view!(
                    array,
                    TimestampSecondArray,
                    "TimestampSecondArray"
                )),
                TimeUnit::Millisecond => KeyColumnView::TimestampMillisecond(downcast_view!(
                    array,
                    TimestampMillisecondArray,
                    "TimestampMillisecondArray"
                )),
                TimeUnit::Microsecond => KeyColumnView::TimestampMicrosecond(downcast_view!(
                    array,
                    TimestampMicrosecondArray,
                    "TimestampMicrosecondArray"
                )),
                TimeUnit::Nanosecond => KeyColumnView::TimestampNanosecond(downcast_view!(
                    array,
                    TimestampNanosecondArray,
                    "TimestampNanosecondArray"
                )),
            },
            DataType::Decimal128(_precision, _scale) => KeyColumnView::Decimal128(downcast_view!(
                array,
                Decimal128Array,
                "Decimal128Array"
            )),
            DataType::Decimal256(_precision, _scale) => KeyColumnView::Decimal256(downcast_view!(
                array,
                Decimal256Array,
                "Decimal256Array"
            )),
            DataType::Utf8 => KeyColumnView::Utf8(downcast_view!(array, StringArray, "StringArray")),
            DataType::FixedSizeBinary(_width) => KeyColumnView::FixedSizeBinary(downcast_view!(
                array,
                FixedSizeBinaryArray,
                "FixedSizeBinaryArray"
            )),
            other => {
                return Err(format!("unsupported join key type: {other}"));
            }
        };
        views.push(view);
    }
    Ok(views)
}

impl<'a> KeyColumnView<'a> {
    pub(crate) fn fixed_width(&self) -> Option<usize> {
        match self {
            Self::Boolean(_) | Self::Int8(_) | Self::UInt8(_) => Some(1),
            Self::Int16(_) | Self::UInt16(_) => Some(2),
            Self::Int32(_) | Self::UInt32(_) | Self::Float32(_) | Self::Date32(_) => Some(4),
            Self::Int64(_)
            | Self::UInt64(_)
            | Self::Float64(_)
            | Self::Date64(_)
            | Self::TimestampSecond(_)
            | Self::TimestampMillisecond(_)
            | Self::TimestampMicrosecond(_)
            | Self::TimestampNanosecond(_) => Some(8),
            Self::Decimal128(_) => Some(16),
            Self::Decimal256(_) => Some(32),
            Self::FixedSizeBinary(arr) => Some(arr.value_length() as usize),
            Self::Utf8(_) => None,
        }
    }

    pub(crate) fn is_null(&self, row: usize) -> bool {
        match self {
            Self::Boolean(arr) => arr.is_null(row),
            Self::Int8(arr) => arr.is_null(row),
            Self::Int16(arr) => arr.is_null(row),
            Self::Int32(arr) => arr.is_null(row),
            Self::Int64(arr) => arr.is_null(row),
            Self::UInt8(arr) => arr.is_null(row),
            Self::UInt16(arr) => arr.is_null(row),
            Self::UInt32(arr) => arr.is_null(row),
            Self::UInt64(arr) => arr.is_null(row),
            Self::Float32(arr) => arr.is_null(row),
            Self::Float64(arr) => arr.is_null(row),
            Self::Date32(arr) => arr.is_null(row),
            Self::Date64(arr) => arr.is_null(row),
            Self::TimestampSecond(arr) => arr.is_null(row),
            Self::TimestampMillisecond(arr) => arr.is_null(row),
            Self::TimestampMicrosecond(arr) => arr.is_null(row),
            Self::TimestampNanosecond(arr) => arr.is_null(row),
            Self::Decimal128(arr) => arr.is_null(row),
            Self::Decimal256(arr) => arr.is_null(row),
            Self::Utf8(arr) => arr.is_null(row),
            Self::FixedSizeBinary(arr) => arr.is_null(row),
        }
    }

    pub(crate) fn has_nulls(&self) -> bool {
        match self {
            Self::Boolean(arr) => arr.null_count() > 0,
            Self::Int8(arr) => arr.null_count() > 0,
            Self::Int16(arr) => arr.null_count() > 0,
            Self::Int32(arr) => arr.null_count() > 0,
            Self::Int64(arr) => arr.null_count() > 0,
            Self::UInt8(arr) => arr.null_count() > 0,
            Self::UInt16(arr) => arr.null_count() > 0,
            Self::UInt32(arr) => arr.null_count() > 0,
            Self::UInt64(arr) => arr.null_count() > 0,
            Self::Float32(arr) => arr.null_count() > 0,
            Self::Float64(arr) => arr.null_count() > 0,
            Self::Date32(arr) => arr.null_count() > 0,
            Self::Date64(arr) => arr.null_count() > 0,
            Self::TimestampSecond(arr) => arr.null_count() > 0,
            Self::TimestampMillisecond(arr) => arr.null_count() > 0,
            Self::TimestampMicrosecond(arr) => arr.null_count() > 0,
            Self::TimestampNanosecond(arr) => arr.null_count() > 0,
            Self::Decimal128(arr) => arr.null_count() > 0,
            Self::Decimal256(arr) => arr.null_count() > 0,
            Self::Utf8(arr) => arr.null_count() > 0,
            Self::FixedSizeBinary(arr) => arr.null_count() > 0,
        }
    }

    /// Raw value bits of a fixed-width value no wider than 8 bytes,
    /// zero-extended to u64. Callers guarantee the row is not null.
    pub(crate) fn bits_u64(&self, row: usize) -> Result<u64, String> {
        let bits = match self {
            Self::Boolean(arr) => arr.value(row) as u64,
            Self::Int8(arr) => arr.value(row) as u8 as u64,
            Self::Int16(arr) => arr.value(row) as u16 as u64,
            Self::Int32(arr) => arr.value(row) as u32 as u64,
            Self::Int64(arr) => arr.value(row) as u64,
            Self::UInt8(arr) => arr.value(row) as u64,
            Self::UInt16(arr) => arr.value(row) as u64,
            Self::UInt32(arr) => arr.value(row) as u64,
            Self::UInt64(arr) => arr.value(row),
            Self::Float32(arr) => f32_key_bits(arr.value(row)) as u64,
            Self::Float64(arr) => f64_key_bits(arr.value(row)),
            Self::Date32(arr) => arr.value(row) as u32 as u64,
            Self::Date64(arr) => arr.value(row) as u64,
            Self::TimestampSecond(arr) => arr.value(row) as u64,
            Self::TimestampMillisecond(arr) => arr.value(row) as u64,
            Self::TimestampMicrosecond(arr) => arr.value(row) as u64,
            Self::TimestampNanosecond(arr) => arr.value(row) as u64,
            other => {
                return Err(format!(
                    "key column of width {:?} cannot be packed into 64 bits",
                    other.fixed_width()
                ));
            }
        };
        Ok(bits)
    }

    /// Append exactly `fixed_width()` little-endian bytes of the row value.
    /// Callers guarantee the row is not null.
    pub(crate) fn write_fixed_le(&self, row: usize, out: &mut Vec<u8>) -> Result<(), String> {
        match self {
            Self::Boolean(arr) => out.push(arr.value(row) as u8),
            Self::Int8(arr) => out.extend_from_slice(&arr.value(row).to_le_bytes()),
            Self::Int16(arr) => out.extend_from_slice(&arr.value(row).to_le_bytes()),
            Self::Int32(arr) => out.extend_from_slice(&arr.value(row).to_le_bytes()),
            Self::Int64(arr) => out.extend_from_slice(&arr.value(row).to_le_bytes()),
            Self::UInt8(arr) => out.push(arr.value(row)),
            Self::UInt16(arr) => out.extend_from_slice(&arr.value(row).to_le_bytes()),
            Self::UInt32(arr) => out.extend_from_slice(&arr.value(row).to_le_bytes()),
            Self::UInt64(arr) => out.extend_from_slice(&arr.value(row).to_le_bytes()),
            Self::Float32(arr) => {
                out.extend_from_slice(&f32_key_bits(arr.value(row)).to_le_bytes())
            }
            Self::Float64(arr) => {
                out.extend_from_slice(&f64_key_bits(arr.value(row)).to_le_bytes())
            }
            Self::Date32(arr) => out.extend_from_slice(&arr.value(row).to_le_bytes()),
            Self::Date64(arr) => out.extend_from_slice(&arr.value(row).to_le_bytes()),
            Self::TimestampSecond(arr) => out.extend_from_slice(&arr.value(row).to_le_bytes()),
            Self::TimestampMillisecond(arr) => {
                out.extend_from_slice(&arr.value(row).to_le_bytes())
            }
            Self::TimestampMicrosecond(arr) => {
                out.extend_from_slice(&arr.value(row).to_le_bytes())
            }
            Self::TimestampNanosecond(arr) => out.extend_from_slice(&arr.value(row).to_le_bytes()),
            Self::Decimal128(arr) => out.extend_from_slice(&arr.value(row).to_le_bytes()),
            Self::Decimal256(arr) => out.extend_from_slice(&arr.value(row).to_le_bytes()),
            Self::FixedSizeBinary(arr) => out.extend_from_slice(arr.value(row)),
            Self::Utf8(_) => {
                return Err("string key column has no fixed-width encoding".to_string());
            }
        }
        Ok(())
    }

    /// Borrow the raw bytes of a string-shaped key value. The returned slice
    /// points into the array's data buffer.
    pub(crate) fn bytes(&self, row: usize) -> Result<&'a [u8], String> {
        match self {
            Self::Utf8(arr) => Ok(arr.value(row).as_bytes()),
            Self::FixedSizeBinary(arr) => Ok(arr.value(row)),
            _ => Err("key column does not expose raw bytes".to_string()),
        }
    }

    /// Append a tagged encoding of the row value for the serialized fallback
    /// method. Callers guarantee the row is not null.
    pub(crate) fn serialize_value(&self, row: usize, out: &mut Vec<u8>) -> Result<(), String> {
        match self {
            Self::Boolean(arr) => {
                out.push(1);
                out.push(arr.value(row) as u8);
            }
            Self::Int8(arr) => {
                out.push(2);
                out.extend_from_slice(&arr.value(row).to_le_bytes());
            }
            Self::Int16(arr) => {
                out.push(3);
                out.extend_from_slice(&arr.value(row).to_le_bytes());
            }
            Self::Int32(arr) => {
                out.push(4);
                out.extend_from_slice(&arr.value(row).to_le_bytes());
            }
            Self::Int64(arr) => {
                out.push(5);
                out.extend_from_slice(&arr.value(row).to_le_bytes());
            }
            Self::UInt8(arr) => {
                out.push(6);
                out.push(arr.value(row));
            }
            Self::UInt16(arr) => {
                out.push(7);
                out.extend_from_slice(&arr.value(row).to_le_bytes());
            }
            Self::UInt32(arr) => {
                out.push(8);
                out.extend_from_slice(&arr.value(row).to_le_bytes());
            }
            Self::UInt64(arr) => {
                out.push(9);
                out.extend_from_slice(&arr.value(row).to_le_bytes());
            }
            Self::Float32(arr) => {
                out.push(10);
                out.extend_from_slice(&f32_key_bits(arr.value(row)).to_le_bytes());
            }
            Self::Float64(arr) => {
                out.push(11);
                out.extend_from_slice(&f64_key_bits(arr.value(row)).to_le_bytes());
            }
            Self::Date32(arr) => {
                out.push(12);
                out.extend_from_slice(&arr.value(row).to_le_bytes());
            }
            Self::Date64(arr) => {
                out.push(13);
                out.extend_from_slice(&arr.value(row).to_le_bytes());
            }
            Self::TimestampSecond(arr) => {
                out.push(14);
                out.extend_from_slice(&arr.value(row).to_le_bytes());
            }
            Self::TimestampMillisecond(arr) => {
                out.push(15);
                out.extend_from_slice(&arr.value(row).to_le_bytes());
            }
            Self::TimestampMicrosecond(arr) => {
                out.push(16);
                out.extend_from_slice(&arr.value(row).to_le_bytes());
            }
            Self::TimestampNanosecond(arr) => {
                out.push(17);
                out.extend_from_slice(&arr.value(row).to_le_bytes());
            }
            Self::Decimal128(arr) => {
                out.push(18);
                out.extend_from_slice(&arr.value(row).to_le_bytes());
            }
            Self::Decimal256(arr) => {
                out.push(19);
                out.extend_from_slice(&arr.value(row).to_le_bytes());
            }
            Self::Utf8(arr) => {
                let value = arr.value(row).as_bytes();
                let len = u32::try_from(value.len())
                    .map_err(|_| "serialized key value length overflow".to_string())?;
                out.push(20);
                out.extend_from_slice(&len.to_le_bytes());
                out.extend_from_slice(value);
            }
            Self::FixedSizeBinary(arr) => {
                let value = arr.value(row);
                let len = u32::try_from(value.len())
                    .map_err(|_| "serialized key value length overflow".to_string())?;
                out.push(21);
                out.extend_from_slice(&len.to_le_bytes());
                out.extend_from_slice(value);
            }
        }
        Ok(())
    }

    /// Integral value widened to i64 for ordered lookups. None for
    /// non-integral views or rows wider than 63 bits of magnitude.
    pub(crate) fn int_value(&self, row: usize) -> Option<i64> {
        match self {
            Self::Int8(arr) => Some(arr.value(row) as i64),
            Self::Int16(arr) => Some(arr.value(row) as i64),
            Self::Int32(arr) => Some(arr.value(row) as i64),
            Self::Int64(arr) => Some(arr.value(row)),
            Self::UInt8(arr) => Some(arr.value(row) as i64),
            Self::UInt16(arr) => Some(arr.value(row) as i64),
            Self::UInt32(arr) => Some(arr.value(row) as i64),
            Self::Date32(arr) => Some(arr.value(row) as i64),
            Self::Date64(arr) => Some(arr.value(row)),
            Self::TimestampSecond(arr) => Some(arr.value(row)),
            Self::TimestampMillisecond(arr) => Some(arr.value(row)),
            Self::TimestampMicrosecond(arr) => Some(arr.value(row)),
            Self::TimestampNanosecond(arr) => Some(arr.value(row)),
            _ => None,
        }
    }

    pub(crate) fn float_value(&self, row: usize) -> Option<f64> {
        match self {
            Self::Float32(arr) => Some(arr.value(row) as f64),
            Self::Float64(arr) => Some(arr.value(row)),
            _ => None,
        }
    }
}

/// Combined "any key component is null" mask; None when no key has nulls.
pub(crate) fn key_null_mask(views: &[KeyColumnView<'_>], rows: usize) -> Option<Vec<bool>> {
    if !views.iter().any(|view| view.has_nulls()) {
        return None;
    }
    let mut mask = vec![false; rows];
    for view in views {
        if !view.has_nulls() {
            continue;
        }
        for (row, slot) in mask.iter_mut().enumerate() {
            if view.is_null(row) {
                *slot = true;
            }
        }
    }
    Some(mask)
}

pub(crate) fn fixed_width_of(data_type: &DataType) -> Option<usize> {
    let width = match data_type {
        DataType::Boolean | DataType::Int8 | DataType::UInt8 => 1,
        DataType::Int16 | DataType::UInt16 => 2,
        DataType::Int32 | DataType::UInt32 | DataType::Float32 | DataType::Date32 => 4,
        DataType::Int64
        | DataType::UInt64
        | DataType::Float64
        | DataType::Date64
        | DataType::Timestamp(_, _) => 8,
        DataType::Decimal128(_, _) => 16,
        DataType::Decimal256(_, _) => 32,
        DataType::FixedSizeBinary(width) => usize::try_from(*width).ok()?,
        _ => return None,
    };
    Some(width)
}

/// Fixed-width value types; excludes the string-shaped ones.
pub(crate) fn is_numeric_key_type(data_type: &DataType) -> bool {
    !matches!(data_type, DataType::FixedSizeBinary(_)) && fixed_width_of(data_type).is_some()
}

pub(crate) fn strip_dictionary(data_type: &DataType) -> &DataType {
    match data_type {
        DataType::Dictionary(_key, value) => value.as_ref(),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn null_mask_combines_all_key_columns() {
        let a: ArrayRef = Arc::new(Int32Array::from(vec![Some(1), None, Some(3)]));
        let b: ArrayRef = Arc::new(Int64Array::from(vec![Some(1), Some(2), None]));
        let cols = [a, b];
        let views = build_key_views(&cols).expect("views");
        let mask = key_null_mask(&views, 3).expect("mask");
        assert_eq!(mask, vec![false, true, true]);
    }

    #[test]
    fn null_mask_absent_without_nulls() {
        let a: ArrayRef = Arc::new(Int32Array::from(vec![1, 2, 3]));
        let cols = [a];
        let views = build_key_views(&cols).expect("views");
        assert!(key_null_mask(&views, 3).is_none());
    }

    #[test]
    fn fixed_widths_follow_byte_sizes() {
        assert_eq!(fixed_width_of(&DataType::Int8), Some(1));
        assert_eq!(fixed_width_of(&DataType::Date32), Some(4));
        assert_eq!(fixed_width_of(&DataType::Decimal256(76, 0)), Some(32));
        assert_eq!(fixed_width_of(&DataType::FixedSizeBinary(10)), Some(10));
        assert_eq!(fixed_width_of(&DataType::Utf8), None);
        assert!(is_numeric_key_type(&DataType::Float64));
        assert!(!is_numeric_key_type(&DataType::FixedSizeBinary(4)));
    }

    #[test]
    fn bits_are_stable_for_negative_and_float_values() {
        let ints: ArrayRef = Arc::new(Int8Array::from(vec![-1i8]));
        let floats: ArrayRef = Arc::new(Float64Array::from(vec![f64::NAN]));
        let cols = [ints, floats];
        let views = build_key_views(&cols).expect("views");
        assert_eq!(views[0].bits_u64(0).expect("bits"), 0xff);
        assert_eq!(
            views[1].bits_u64(0).expect("bits"),
            f64::NAN.to_bits(),
            "NaN bits must be canonical"
        );
    }
}
