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
//! Post-probe scan emitting right rows no prober consumed, for RIGHT/FULL
//! output. Walks every table slot whose used flag is still clear, then the
//! stashed null-key and condition-masked rows.

use std::sync::Arc;

use arrow::array::{new_null_array, Array, ArrayRef, RecordBatch};
use arrow::compute::interleave;
use arrow::datatypes::{Schema, SchemaRef};

use crate::exec::chunk::Chunk;
use crate::exec::join::engine::HashJoin;
use crate::exec::join::error::{JoinError, JoinResult};
use crate::exec::join::row_refs::RowRef;
use crate::exec::join::table::Payloads;

/// Sequential single-consumer reader over the non-joined right rows.
/// Scanner state is the table slot cursor and the stash entry cursor.
pub struct NotJoinedReader<'a> {
    join: &'a HashJoin,
    result_schema: SchemaRef,
    max_block_size: usize,
    position: usize,
    nulls_position: usize,
}

impl<'a> NotJoinedReader<'a> {
    pub(crate) fn new(join: &'a HashJoin, result_schema: SchemaRef, max_block_size: usize) -> Self {
        Self {
            join,
            result_schema,
            max_block_size: max_block_size.max(1),
            position: 0,
            nulls_position: 0,
        }
    }

    /// Next chunk of unmatched right rows, or None when the scan is done.
    /// Chunks are shaped to the result sample; columns absent from the saved
    /// right layout (the left side) are NULL-filled.
    pub fn read(&mut self) -> JoinResult<Option<Chunk>> {
        let mut refs: Vec<RowRef> = Vec::new();
        self.fill_from_table(&mut refs)?;
        self.fill_from_stash(&mut refs)?;
        if refs.is_empty() {
            return Ok(None);
        }
        self.assemble(&refs).map(Some)
    }

    fn fill_from_table(&mut self, refs: &mut Vec<RowRef>) -> JoinResult<()> {
        let table = &self.join.data.table;
        let cells = table.buffer_size_in_cells();
        while self.position < cells && refs.len() < self.max_block_size {
            let slot = self.position;
            self.position += 1;
            if self.join.used_flags.get_used_safe(slot) {
                continue;
            }
            match table.payloads() {
                Payloads::One(rows) => {
                    let row = rows
                        .get(slot)
                        .ok_or_else(|| JoinError::logic("payload slot out of bounds"))?;
                    refs.push(*row);
                }
                Payloads::All(lists) => {
                    let list = lists
                        .get(slot)
                        .ok_or_else(|| JoinError::logic("payload slot out of bounds"))?;
                    refs.extend(list.iter(table.arena()));
                }
                // Asof strictness never reaches the non-joined scan.
                Payloads::Asof(_) => {}
            }
        }
        Ok(())
    }

    fn fill_from_stash(&mut self, refs: &mut Vec<RowRef>) -> JoinResult<()> {
        let stash = &self.join.data.nullmap_stash;
        while self.nulls_position < stash.len() && refs.len() < self.max_block_size {
            let (block_index, mask) = &stash[self.nulls_position];
            self.nulls_position += 1;
            for row in 0..mask.len() {
                if !mask.is_null(row) && mask.value(row) {
                    let row = u32::try_from(row)
                        .map_err(|_| JoinError::logic("stashed row index overflow"))?;
                    refs.push(RowRef {
                        block: *block_index,
                        row,
                    });
                }
            }
        }
        Ok(())
    }

    fn assemble(&self, refs: &[RowRef]) -> JoinResult<Chunk> {
        let blocks = &self.join.data.blocks;
        let indices: Vec<(usize, usize)> = refs
            .iter()
            .map(|row| (row.block as usize, row.row as usize))
            .collect();

        let mut fields = Vec::with_capacity(self.result_schema.fields().len());
        let mut columns = Vec::with_capacity(self.result_schema.fields().len());
        for field in self.result_schema.fields() {
            let column = match self.join.saved_sample.index_of(field.name()) {
                Ok(source_index) => {
                    let sources: Vec<ArrayRef> = blocks
                        .iter()
                        .map(|block| {
                            block
                                .columns()
                                .get(source_index)
                                .cloned()
                                .ok_or_else(|| {
                                    JoinError::logic("stored chunk misses a saved column")
                                })
                        })
                        .collect::<JoinResult<_>>()?;
                    let arrays: Vec<&dyn Array> =
                        sources.iter().map(|column| column.as_ref()).collect();
                    interleave(&arrays, &indices).map_err(|e| JoinError::logic(e.to_string()))?
                }
                // Left-side column: pad with NULL defaults.
                Err(_) => new_null_array(field.data_type(), refs.len()),
            };
            fields.push(Arc::new(
                field.as_ref().clone().with_nullable(true),
            ));
            columns.push(column);
        }

        let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
            .map_err(|e| JoinError::logic(e.to_string()))?;
        Ok(Chunk::new(batch))
    }
}
