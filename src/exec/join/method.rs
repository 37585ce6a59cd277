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
use arrow::datatypes::DataType;

use crate::exec::hash_table::key_view::{fixed_width_of, is_numeric_key_type};
use crate::exec::join::error::{JoinError, JoinResult};

/// Hash-table variant chosen from the key column profile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinMethod {
    Empty,
    Cross,
    Key8,
    Key16,
    Key32,
    Key64,
    Keys128,
    Keys256,
    KeyString,
    KeyFixedString,
    Hashed,
    Dict,
}

impl JoinMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Cross => "cross",
            Self::Key8 => "key8",
            Self::Key16 => "key16",
            Self::Key32 => "key32",
            Self::Key64 => "key64",
            Self::Keys128 => "keys128",
            Self::Keys256 => "keys256",
            Self::KeyString => "key_string",
            Self::KeyFixedString => "key_fixed_string",
            Self::Hashed => "hashed",
            Self::Dict => "dict",
        }
    }
}

/// Choose the table variant for the given key column types, top-down:
/// no keys, single numeric bucketed by width, bit-packable fixed key sets,
/// single string / fixed-string, serialized fallback.
pub(crate) fn choose_method(key_types: &[DataType]) -> JoinResult<(JoinMethod, Vec<usize>)> {
    if key_types.is_empty() {
        return Ok((JoinMethod::Cross, Vec::new()));
    }

    let mut all_fixed = true;
    let mut keys_bytes = 0usize;
    let mut key_sizes = vec![0usize; key_types.len()];
    for (index, data_type) in key_types.iter().enumerate() {
        match fixed_width_of(data_type) {
            Some(width) => {
                key_sizes[index] = width;
                keys_bytes += width;
            }
            None => {
                all_fixed = false;
                break;
            }
        }
    }

    if key_types.len() == 1 && is_numeric_key_type(&key_types[0]) {
        let method = match key_sizes[0] {
            1 => JoinMethod::Key8,
            2 => JoinMethod::Key16,
            4 => JoinMethod::Key32,
            8 => JoinMethod::Key64,
            16 => JoinMethod::Keys128,
            32 => JoinMethod::Keys256,
            other => {
                return Err(JoinError::logic(format!(
                    "numeric key column has fixed size {other}, not in 1, 2, 4, 8, 16, 32"
                )));
            }
        };
        return Ok((method, key_sizes));
    }

    if all_fixed && keys_bytes <= 16 {
        return Ok((JoinMethod::Keys128, key_sizes));
    }
    if all_fixed && keys_bytes <= 32 {
        return Ok((JoinMethod::Keys256, key_sizes));
    }

    if key_types.len() == 1 && matches!(key_types[0], DataType::Utf8) {
        return Ok((JoinMethod::KeyString, key_sizes));
    }
    if key_types.len() == 1 && matches!(key_types[0], DataType::FixedSizeBinary(_)) {
        return Ok((JoinMethod::KeyFixedString, key_sizes));
    }

    Ok((JoinMethod::Hashed, key_sizes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method_of(types: &[DataType]) -> JoinMethod {
        choose_method(types).expect("method").0
    }

    #[test]
    fn zero_keys_is_cross() {
        assert_eq!(method_of(&[]), JoinMethod::Cross);
    }

    #[test]
    fn single_numeric_buckets_by_width() {
        assert_eq!(method_of(&[DataType::Int8]), JoinMethod::Key8);
        assert_eq!(method_of(&[DataType::UInt16]), JoinMethod::Key16);
        assert_eq!(method_of(&[DataType::Date32]), JoinMethod::Key32);
        assert_eq!(method_of(&[DataType::Float64]), JoinMethod::Key64);
        assert_eq!(method_of(&[DataType::Decimal128(38, 0)]), JoinMethod::Keys128);
        assert_eq!(method_of(&[DataType::Decimal256(76, 0)]), JoinMethod::Keys256);
    }

    #[test]
    fn fixed_key_sets_pack_into_128_or_256_bits() {
        assert_eq!(
            method_of(&[DataType::Int32, DataType::Int64]),
            JoinMethod::Keys128
        );
        assert_eq!(
            method_of(&[DataType::Int64, DataType::Int64, DataType::Int64]),
            JoinMethod::Keys256
        );
        // A single short fixed-string packs too.
        assert_eq!(
            method_of(&[DataType::FixedSizeBinary(8)]),
            JoinMethod::Keys128
        );
    }

    #[test]
    fn string_keys() {
        assert_eq!(method_of(&[DataType::Utf8]), JoinMethod::KeyString);
        assert_eq!(
            method_of(&[DataType::FixedSizeBinary(40)]),
            JoinMethod::KeyFixedString
        );
    }

    #[test]
    fn mixed_or_wide_keys_fall_back_to_serialization() {
        assert_eq!(
            method_of(&[DataType::Utf8, DataType::Int32]),
            JoinMethod::Hashed
        );
        assert_eq!(
            method_of(&[
                DataType::Decimal256(76, 0),
                DataType::Decimal256(76, 0)
            ]),
            JoinMethod::Hashed
        );
    }
}
