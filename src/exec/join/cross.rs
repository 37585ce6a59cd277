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
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, RecordBatch, UInt32Array};
use arrow::compute::{interleave, take};
use arrow::datatypes::{FieldRef, Schema};

use crate::exec::chunk::Chunk;
use crate::exec::join::engine::HashJoin;
use crate::exec::join::error::{JoinError, JoinResult};

/// Resumable state of an overflowing cross join: the left rows up to
/// `left_position` are fully emitted, and `left_position` itself is emitted
/// for right blocks before `right_block`. The caller re-enters `join_block`
/// with this continuation to produce the rest.
pub struct CrossJoinContinuation {
    pub(crate) left_position: usize,
    pub(crate) right_block: usize,
    pub(crate) block: Chunk,
}

/// Cartesian product of the probe block with every stored chunk, in
/// left-row-major, right-block-major, right-row-major order. Output beyond
/// `max_joined_block_rows` is deferred through the continuation.
pub(crate) fn join_block_cross(
    join: &HashJoin,
    block: &mut Chunk,
    not_processed: &mut Option<CrossJoinContinuation>,
) -> JoinResult<()> {
    let max_joined_block_rows = join.descriptor.max_joined_block_rows.max(1);

    let mut start_left_row = 0usize;
    let mut start_right_block = 0usize;
    if let Some(continuation) = not_processed.take() {
        start_left_row = continuation.left_position;
        start_right_block = continuation.right_block;
        *block = continuation.block;
    }

    let blocks = &join.data.blocks;
    let rows_left = block.len();

    let mut left_indices: Vec<u32> = Vec::new();
    let mut right_pairs: Vec<(usize, usize)> = Vec::new();
    let mut rows_added = 0usize;
    let mut overflow = None;

    for left_row in start_left_row..rows_left {
        let left_index = u32::try_from(left_row)
            .map_err(|_| JoinError::not_implemented("too many rows in cross join block"))?;
        let mut block_number = 0usize;
        for (block_index, right) in blocks.iter().enumerate() {
            block_number += 1;
            if block_number < start_right_block {
                continue;
            }
            let rows_right = right.len();
            rows_added += rows_right;
            for right_row in 0..rows_right {
                left_indices.push(left_index);
                right_pairs.push((block_index, right_row));
            }
        }
        start_right_block = 0;

        if rows_added > max_joined_block_rows {
            overflow = Some(CrossJoinContinuation {
                left_position: left_row,
                right_block: block_number + 1,
                block: block.clone(),
            });
            break;
        }
    }

    let output = assemble_cross_output(join, block, &left_indices, &right_pairs)?;
    *block = output;
    *not_processed = overflow;
    Ok(())
}

fn assemble_cross_output(
    join: &HashJoin,
    block: &Chunk,
    left_indices: &[u32],
    right_pairs: &[(usize, usize)],
) -> JoinResult<Chunk> {
    let blocks = &join.data.blocks;
    let left_schema = block.schema();

    let indices: ArrayRef = Arc::new(UInt32Array::from(left_indices.to_vec()));
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(
        left_schema.fields().len() + join.sample_with_columns_to_add.fields().len(),
    );
    for column in block.columns() {
        let taken =
            take(column.as_ref(), &indices, None).map_err(|e| JoinError::logic(e.to_string()))?;
        columns.push(taken);
    }

    // Right pairs reference (block, row); stored chunks follow the saved
    // layout, which for cross joins is exactly the columns-to-add sample.
    for source_index in 0..join.sample_with_columns_to_add.fields().len() {
        let right_columns: Vec<ArrayRef> = blocks
            .iter()
            .map(|right| {
                right
                    .columns()
                    .get(source_index)
                    .cloned()
                    .ok_or_else(|| JoinError::logic("stored chunk misses a saved column"))
            })
            .collect::<JoinResult<_>>()?;
        let gathered = if right_columns.is_empty() {
            arrow::array::new_empty_array(
                join.sample_with_columns_to_add
                    .field(source_index)
                    .data_type(),
            )
        } else {
            let arrays: Vec<&dyn Array> =
                right_columns.iter().map(|column| column.as_ref()).collect();
            interleave(&arrays, right_pairs).map_err(|e| JoinError::logic(e.to_string()))?
        };
        columns.push(gathered);
    }

    let mut fields: Vec<FieldRef> = left_schema.fields().to_vec();
    fields.extend(join.sample_with_columns_to_add.fields().iter().cloned());
    let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
        .map_err(|e| JoinError::logic(e.to_string()))?;
    Ok(Chunk::new(batch))
}
