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
//! Common chunk builders and extractors for join integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Int64Array, RecordBatch, StringArray, UInt8Array};
use arrow::datatypes::{Field, Schema};

use chunkjoin::{Chunk, HashJoin, JoinDescriptor, JoinKind, JoinStrictness};

/// Build a chunk from named arrays. Fields are nullable only when the array
/// actually carries nulls, so the first build chunk doubles as the right
/// sample.
pub fn chunk_of(columns: Vec<(&str, ArrayRef)>) -> Chunk {
    let fields: Vec<Field> = columns
        .iter()
        .map(|(name, array)| {
            Field::new(*name, array.data_type().clone(), array.null_count() > 0)
        })
        .collect();
    let arrays: Vec<ArrayRef> = columns.into_iter().map(|(_name, array)| array).collect();
    let batch =
        RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).expect("test chunk");
    Chunk::new(batch)
}

pub fn int64(values: &[i64]) -> ArrayRef {
    Arc::new(Int64Array::from(values.to_vec()))
}

pub fn int64_opt(values: &[Option<i64>]) -> ArrayRef {
    Arc::new(Int64Array::from(values.to_vec()))
}

pub fn utf8(values: &[&str]) -> ArrayRef {
    Arc::new(StringArray::from(values.to_vec()))
}

pub fn utf8_opt(values: &[Option<&str>]) -> ArrayRef {
    Arc::new(StringArray::from(values.to_vec()))
}

pub fn mask_u8(values: &[u8]) -> ArrayRef {
    Arc::new(UInt8Array::from(values.to_vec()))
}

pub fn int64_values_at(chunk: &Chunk, index: usize) -> Vec<Option<i64>> {
    let array = chunk.columns()[index]
        .as_any()
        .downcast_ref::<Int64Array>()
        .expect("Int64 column");
    (0..array.len())
        .map(|row| (!array.is_null(row)).then(|| array.value(row)))
        .collect()
}

pub fn int64_values(chunk: &Chunk, name: &str) -> Vec<Option<i64>> {
    let index = chunk.index_of(name).expect("column present");
    int64_values_at(chunk, index)
}

pub fn utf8_values_at(chunk: &Chunk, index: usize) -> Vec<Option<String>> {
    let array = chunk.columns()[index]
        .as_any()
        .downcast_ref::<StringArray>()
        .expect("Utf8 column");
    (0..array.len())
        .map(|row| (!array.is_null(row)).then(|| array.value(row).to_string()))
        .collect()
}

pub fn utf8_values(chunk: &Chunk, name: &str) -> Vec<Option<String>> {
    let index = chunk.index_of(name).expect("column present");
    utf8_values_at(chunk, index)
}

pub fn descriptor(
    kind: JoinKind,
    strictness: JoinStrictness,
    left_keys: &[&str],
    right_keys: &[&str],
) -> JoinDescriptor {
    JoinDescriptor::new(
        kind,
        strictness,
        left_keys.iter().map(|name| name.to_string()).collect(),
        right_keys.iter().map(|name| name.to_string()).collect(),
    )
}

pub fn build_join(descriptor: JoinDescriptor, right_chunks: &[Chunk]) -> HashJoin {
    build_join_with(descriptor, right_chunks, false)
}

pub fn build_join_with(
    descriptor: JoinDescriptor,
    right_chunks: &[Chunk],
    any_take_last_row: bool,
) -> HashJoin {
    let sample = right_chunks.first().expect("right sample");
    let mut join =
        HashJoin::try_new(Arc::new(descriptor), sample, any_take_last_row).expect("join engine");
    for chunk in right_chunks {
        assert!(join.add_block(chunk, true).expect("add_block"));
    }
    join
}

/// Probe one chunk and assert the join completed without a continuation.
pub fn probe(join: &HashJoin, probe_chunk: &Chunk) -> Chunk {
    let mut block = probe_chunk.clone();
    let mut not_processed = None;
    join.join_block(&mut block, &mut not_processed).expect("join_block");
    assert!(not_processed.is_none(), "unexpected cross continuation");
    block
}
