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
//! Per-key ordered index over the asof column.
//!
//! The hash table maps equi-join keys to one [`AsofIndex`] per key; a lookup
//! returns at most one build row, the nearest neighbor of the probe value
//! under the configured inequality. The value type is resolved once at build
//! setup and erased behind [`AsofType`], so table shapes stay independent of
//! the asof column width.

use std::collections::BTreeMap;
use std::ops::Bound;

use arrow::datatypes::DataType;

use crate::exec::hash_table::key_view::KeyColumnView;
use crate::exec::join::row_refs::RowRef;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AsofInequality {
    Less,
    Greater,
    LessOrEquals,
    GreaterOrEquals,
}

impl AsofInequality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Less => "<",
            Self::Greater => ">",
            Self::LessOrEquals => "<=",
            Self::GreaterOrEquals => ">=",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum AsofType {
    Int,
    Float,
}

/// Resolve the asof column semantic type and its byte width. None means the
/// type is not supported as an asof key.
pub(crate) fn asof_type_of(data_type: &DataType) -> Option<(AsofType, usize)> {
    let resolved = match data_type {
        DataType::Int8 | DataType::UInt8 => (AsofType::Int, 1),
        DataType::Int16 | DataType::UInt16 => (AsofType::Int, 2),
        DataType::Int32 | DataType::UInt32 | DataType::Date32 => (AsofType::Int, 4),
        DataType::Int64 | DataType::Date64 | DataType::Timestamp(_, _) => (AsofType::Int, 8),
        DataType::Float32 => (AsofType::Float, 4),
        DataType::Float64 => (AsofType::Float, 8),
        // UInt64 cannot be widened into the ordered i64 index.
        _ => return None,
    };
    Some(resolved)
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum AsofValue {
    Int(i64),
    Float(f64),
}

pub(crate) fn asof_value(
    view: &KeyColumnView<'_>,
    asof_type: AsofType,
    row: usize,
) -> Result<AsofValue, String> {
    match asof_type {
        AsofType::Int => view
            .int_value(row)
            .map(AsofValue::Int)
            .ok_or_else(|| "asof column is not integral".to_string()),
        AsofType::Float => view
            .float_value(row)
            .map(AsofValue::Float)
            .ok_or_else(|| "asof column is not floating".to_string()),
    }
}

/// Map f64 to bits whose unsigned order matches the numeric order (NaN sorts
/// above all numbers).
fn ordered_f64_bits(value: f64) -> u64 {
    let bits = value.to_bits();
    if bits >> 63 == 1 {
        !bits
    } else {
        bits | 0x8000_0000_0000_0000
    }
}

/// Ordered multimap from asof value to build row. Duplicate asof values keep
/// the first inserted row.
pub(crate) enum AsofIndex {
    Int(BTreeMap<i64, RowRef>),
    Float(BTreeMap<u64, RowRef>),
}

impl AsofIndex {
    pub(crate) fn new(asof_type: AsofType) -> Self {
        match asof_type {
            AsofType::Int => Self::Int(BTreeMap::new()),
            AsofType::Float => Self::Float(BTreeMap::new()),
        }
    }

    pub(crate) fn insert(&mut self, value: AsofValue, row: RowRef) -> Result<(), String> {
        match (self, value) {
            (Self::Int(map), AsofValue::Int(v)) => {
                map.entry(v).or_insert(row);
            }
            (Self::Float(map), AsofValue::Float(v)) => {
                map.entry(ordered_f64_bits(v)).or_insert(row);
            }
            _ => return Err("asof value type mismatch".to_string()),
        }
        Ok(())
    }

    pub(crate) fn find(&self, inequality: AsofInequality, value: AsofValue) -> Option<RowRef> {
        match (self, value) {
            (Self::Int(map), AsofValue::Int(v)) => lookup(map, inequality, v),
            (Self::Float(map), AsofValue::Float(v)) => {
                lookup(map, inequality, ordered_f64_bits(v))
            }
            _ => None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Self::Int(map) => map.len(),
            Self::Float(map) => map.len(),
        }
    }
}

fn lookup<K: Ord + Copy>(
    map: &BTreeMap<K, RowRef>,
    inequality: AsofInequality,
    value: K,
) -> Option<RowRef> {
    let found = match inequality {
        // Greatest stored value strictly less than the probe value.
        AsofInequality::Less => map.range(..value).next_back(),
        AsofInequality::LessOrEquals => map.range(..=value).next_back(),
        // Least stored value strictly greater than the probe value.
        AsofInequality::Greater => map
            .range((Bound::Excluded(value), Bound::Unbounded))
            .next(),
        AsofInequality::GreaterOrEquals => map.range(value..).next(),
    };
    found.map(|(_k, row)| *row)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(row: u32) -> RowRef {
        RowRef { block: 0, row }
    }

    fn index_of(values: &[i64]) -> AsofIndex {
        let mut index = AsofIndex::new(AsofType::Int);
        for (i, v) in values.iter().enumerate() {
            index
                .insert(AsofValue::Int(*v), r(i as u32))
                .expect("insert");
        }
        index
    }

    #[test]
    fn boundary_semantics_per_inequality() {
        let index = index_of(&[10, 20, 30]);
        let find = |ineq, v| index.find(ineq, AsofValue::Int(v)).map(|row| row.row);

        assert_eq!(find(AsofInequality::LessOrEquals, 25), Some(1));
        assert_eq!(find(AsofInequality::LessOrEquals, 20), Some(1));
        assert_eq!(find(AsofInequality::LessOrEquals, 9), None);

        assert_eq!(find(AsofInequality::Less, 20), Some(0));
        assert_eq!(find(AsofInequality::Less, 10), None);

        assert_eq!(find(AsofInequality::GreaterOrEquals, 20), Some(1));
        assert_eq!(find(AsofInequality::GreaterOrEquals, 31), None);

        assert_eq!(find(AsofInequality::Greater, 20), Some(2));
        assert_eq!(find(AsofInequality::Greater, 30), None);
    }

    #[test]
    fn duplicate_values_keep_first_row() {
        let index = index_of(&[10, 10, 10]);
        assert_eq!(index.len(), 1);
        let row = index
            .find(AsofInequality::LessOrEquals, AsofValue::Int(15))
            .expect("found");
        assert_eq!(row.row, 0);
    }

    #[test]
    fn float_order_covers_negative_values() {
        let mut index = AsofIndex::new(AsofType::Float);
        for (i, v) in [-2.5f64, 0.0, 3.5].iter().enumerate() {
            index
                .insert(AsofValue::Float(*v), r(i as u32))
                .expect("insert");
        }
        let find = |ineq, v| index.find(ineq, AsofValue::Float(v)).map(|row| row.row);
        assert_eq!(find(AsofInequality::LessOrEquals, -1.0), Some(0));
        assert_eq!(find(AsofInequality::Greater, 0.0), Some(2));
        assert_eq!(find(AsofInequality::Less, -2.5), None);
        assert_eq!(find(AsofInequality::GreaterOrEquals, 4.0), None);
    }

    #[test]
    fn unsupported_asof_types_are_rejected() {
        assert!(asof_type_of(&DataType::Utf8).is_none());
        assert!(asof_type_of(&DataType::UInt64).is_none());
        assert_eq!(
            asof_type_of(&DataType::Int32),
            Some((AsofType::Int, 4))
        );
    }
}
