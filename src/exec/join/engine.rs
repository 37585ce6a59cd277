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
//! In-memory hash-join engine: build-side ingestion and the shared state
//! probed by `join_block`.
//!
//! Responsibilities:
//! - Chooses the table variant from the key profile and builds it
//!   incrementally from right-side chunks.
//! - Diverts null-key and condition-masked rows to the nullmap stash for the
//!   non-joined scan.
//! - Exposes probing, point lookup (`join_get`), storage reuse and size
//!   accounting.
//!
//! Key exported interfaces:
//! - Types: `HashJoin`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray, RecordBatch, RecordBatchOptions};
use arrow::datatypes::{DataType, Field, FieldRef, Schema, SchemaRef};

use crate::common::logging::debug;
use crate::exec::chunk::{self, Chunk};
use crate::exec::hash_table::key_view::{
    build_key_views, key_null_mask, strip_dictionary, KeyColumnView,
};
use crate::exec::join::asof::{asof_value, AsofType};
use crate::exec::join::cross::{self, CrossJoinContinuation};
use crate::exec::join::descriptor::{
    maps_kind, needs_used_flags, JoinDescriptor, JoinKind, JoinStrictness,
};
use crate::exec::join::error::{JoinError, JoinResult};
use crate::exec::join::method::{choose_method, JoinMethod};
use crate::exec::join::not_joined::NotJoinedReader;
use crate::exec::join::probe;
use crate::exec::join::row_refs::RowRef;
use crate::exec::join::table::{pack_key, JoinHashTable, MapsKind};
use crate::exec::join::used_flags::UsedFlags;
use crate::runtime::mem_tracker::MemTracker;

/// Right-side state shared between the engine, its probers and any engine
/// reusing the data for a storage join. Immutable once probing starts.
pub(crate) struct JoinedData {
    pub(crate) blocks: Vec<Chunk>,
    pub(crate) table: JoinHashTable,
    /// Rows excluded from the table (null key or failed ON mask) that must
    /// still surface in RIGHT/FULL output: per stored chunk, a bit per row.
    pub(crate) nullmap_stash: Vec<(u32, BooleanArray)>,
    pub(crate) empty: bool,
}

pub struct HashJoin {
    pub(crate) descriptor: Arc<JoinDescriptor>,
    pub(crate) kind: JoinKind,
    pub(crate) strictness: JoinStrictness,
    pub(crate) any_take_last_row: bool,
    pub(crate) nullable_left_side: bool,
    pub(crate) nullable_right_side: bool,
    pub(crate) asof_type: Option<AsofType>,
    pub(crate) method: JoinMethod,
    pub(crate) key_sizes: Vec<usize>,
    /// Right key fields in key order, dictionary-stripped.
    pub(crate) right_table_keys: SchemaRef,
    /// Non-key right fields appended to probe output.
    pub(crate) sample_with_columns_to_add: SchemaRef,
    /// Layout of the stored right chunks.
    pub(crate) saved_sample: SchemaRef,
    /// (right key name, left source column name) pairs to echo in output.
    pub(crate) required_right_keys: Vec<(String, String)>,
    pub(crate) data: Arc<JoinedData>,
    pub(crate) used_flags: UsedFlags,
    pub(crate) from_storage_join: bool,
    probe_locked: AtomicBool,
    logged_first_input: bool,
    mem_tracker: Arc<MemTracker>,
}

impl std::fmt::Debug for HashJoin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashJoin").finish_non_exhaustive()
    }
}

impl HashJoin {
    pub fn try_new(
        descriptor: Arc<JoinDescriptor>,
        right_sample: &Chunk,
        any_take_last_row: bool,
    ) -> JoinResult<Self> {
        let kind = descriptor.kind;
        let strictness = descriptor.strictness;
        // Rejects unsupported kind × strictness combinations up front,
        // including the undefined ANY FULL case.
        let maps = maps_kind(kind, strictness)?;

        let right_schema = right_sample.schema();
        let mut key_fields: Vec<FieldRef> = Vec::with_capacity(descriptor.key_names_right.len());
        for name in &descriptor.key_names_right {
            let field = right_schema
                .field_with_name(name)
                .map_err(|e| JoinError::no_such_column(e.to_string()))?;
            key_fields.push(Arc::new(Field::new(
                name,
                strip_dictionary(field.data_type()).clone(),
                field.is_nullable(),
            )));
        }
        let right_table_keys: SchemaRef = Arc::new(Schema::new(key_fields));

        let nullable_right_side = descriptor.force_nullable_right;
        let nullable_left_side = descriptor.force_nullable_left;
        let mut add_fields: Vec<FieldRef> = Vec::new();
        for field in right_schema.fields() {
            if descriptor.key_names_right.contains(field.name()) {
                continue;
            }
            let nullable = field.is_nullable() || nullable_right_side;
            add_fields.push(Arc::new(Field::new(
                field.name(),
                strip_dictionary(field.data_type()).clone(),
                nullable,
            )));
        }
        let sample_with_columns_to_add: SchemaRef = Arc::new(Schema::new(add_fields));

        let mut required_right_keys = Vec::with_capacity(descriptor.required_right_keys.len());
        for right_name in &descriptor.required_right_keys {
            let left_name = descriptor
                .left_name_for_right_key(right_name)
                .ok_or_else(|| {
                    JoinError::no_such_column(format!(
                        "required right key {right_name} is not a join key"
                    ))
                })?;
            required_right_keys.push((right_name.clone(), left_name.to_string()));
        }

        let key_types: Vec<DataType> = right_table_keys
            .fields()
            .iter()
            .map(|field| field.data_type().clone())
            .collect();

        let mut asof_type = None;
        let (method, key_sizes) = if descriptor.dictionary_reader.is_some() {
            // The dictionary path needs key_sizes only; the table shape is a
            // stub that rejects inserts.
            let (_method, key_sizes) = choose_method(&key_types)?;
            (JoinMethod::Dict, key_sizes)
        } else if strictness == JoinStrictness::Asof {
            if !matches!(kind, JoinKind::Left | JoinKind::Inner) {
                return Err(JoinError::not_implemented(
                    "wrong ASOF JOIN type: only ASOF and LEFT ASOF joins are supported",
                ));
            }
            if key_types.len() <= 1 {
                return Err(JoinError::syntax(
                    "ASOF join needs at least one equi-join column",
                ));
            }
            let asof_field = right_table_keys.field(right_table_keys.fields().len() - 1);
            if asof_field.is_nullable() {
                return Err(JoinError::not_implemented(
                    "ASOF join over right table Nullable column is not implemented",
                ));
            }
            let (resolved, asof_size) =
                crate::exec::join::asof::asof_type_of(asof_field.data_type()).ok_or_else(
                    || {
                        JoinError::not_implemented(format!(
                            "ASOF join over column type {} is not implemented",
                            asof_field.data_type()
                        ))
                    },
                )?;
            asof_type = Some(resolved);
            // The table shape depends on the equi-join keys only; the asof
            // key feeds the ordered secondary index.
            let equi_types = &key_types[..key_types.len() - 1];
            let (method, mut key_sizes) = choose_method(equi_types)?;
            key_sizes.push(asof_size);
            (method, key_sizes)
        } else if kind == JoinKind::Cross {
            (JoinMethod::Cross, Vec::new())
        } else {
            choose_method(&key_types)?
        };

        let save_keys = kind.is_right_or_full() || descriptor.storage_join;
        let mut saved_fields: Vec<FieldRef> = Vec::new();
        if save_keys {
            for field in right_table_keys.fields() {
                let nullable = field.is_nullable()
                    || (nullable_right_side && kind == JoinKind::Full);
                saved_fields.push(Arc::new(Field::new(
                    field.name(),
                    field.data_type().clone(),
                    nullable,
                )));
            }
        } else if strictness == JoinStrictness::Asof {
            let asof_field = right_table_keys.field(right_table_keys.fields().len() - 1);
            saved_fields.push(Arc::new(asof_field.clone()));
        }
        saved_fields.extend(sample_with_columns_to_add.fields().iter().cloned());
        let saved_sample: SchemaRef = Arc::new(Schema::new(saved_fields));

        let table_maps = if descriptor.dictionary_reader.is_some() {
            MapsKind::One
        } else {
            maps
        };
        let table = JoinHashTable::new(method, table_maps, asof_type, !save_keys);

        debug!(
            "hash join created: kind={} strictness={} method={} right_keys={:?} required_right_keys={} asof={} save_keys={}",
            kind.as_str(),
            strictness.as_str(),
            method.as_str(),
            descriptor.key_names_right,
            required_right_keys.len(),
            asof_type.is_some(),
            save_keys
        );

        Ok(Self {
            descriptor,
            kind,
            strictness,
            any_take_last_row,
            nullable_left_side,
            nullable_right_side,
            asof_type,
            method,
            key_sizes,
            right_table_keys,
            sample_with_columns_to_add,
            saved_sample,
            required_right_keys,
            data: Arc::new(JoinedData {
                blocks: Vec::new(),
                table,
                nullmap_stash: Vec::new(),
                empty: true,
            }),
            used_flags: UsedFlags::new(),
            from_storage_join: false,
            probe_locked: AtomicBool::new(false),
            logged_first_input: false,
            mem_tracker: MemTracker::new_root("HashJoin"),
        })
    }

    pub fn kind(&self) -> JoinKind {
        self.kind
    }

    pub fn strictness(&self) -> JoinStrictness {
        self.strictness
    }

    pub fn method(&self) -> JoinMethod {
        self.method
    }

    pub fn key_sizes(&self) -> &[usize] {
        &self.key_sizes
    }

    pub fn over_dictionary(&self) -> bool {
        self.method == JoinMethod::Dict
    }

    /// True until the first non-empty build chunk arrives.
    pub fn empty(&self) -> bool {
        self.data.empty
    }

    pub fn always_returns_empty_set(&self) -> bool {
        self.kind.is_inner_or_right() && self.data.empty && !self.over_dictionary()
    }

    /// Forbid further `add_block` calls; probing may start.
    pub fn set_probe_lock(&self) {
        self.probe_locked.store(true, Ordering::Release);
    }

    pub fn get_total_row_count(&self) -> u64 {
        if self.method == JoinMethod::Cross {
            self.data
                .blocks
                .iter()
                .map(|block| block.len() as u64)
                .sum()
        } else if self.method == JoinMethod::Dict {
            0
        } else {
            self.data.table.total_rows() as u64
        }
    }

    pub fn get_total_byte_count(&self) -> u64 {
        let blocks: u64 = self
            .data
            .blocks
            .iter()
            .map(|block| block.logical_bytes() as u64)
            .sum();
        if self.method == JoinMethod::Cross || self.method == JoinMethod::Dict {
            blocks
        } else {
            blocks + self.data.table.allocated_bytes() as u64
        }
    }

    pub fn mem_tracker(&self) -> &Arc<MemTracker> {
        &self.mem_tracker
    }

    /// Restructure an incoming right chunk to the saved layout: saved columns
    /// picked by name, dictionary encoding flattened.
    fn structure_right_block(&self, block: &Chunk) -> JoinResult<Chunk> {
        let mut columns: Vec<ArrayRef> = Vec::with_capacity(self.saved_sample.fields().len());
        for field in self.saved_sample.fields() {
            let column = block
                .column_by_name(field.name())
                .map_err(JoinError::no_such_column)?;
            let column = chunk::materialize_array(&column).map_err(JoinError::logic)?;
            if column.data_type() != field.data_type() {
                return Err(JoinError::type_mismatch(format!(
                    "right column {} has type {}, expected {}",
                    field.name(),
                    column.data_type(),
                    field.data_type()
                )));
            }
            columns.push(column);
        }
        // The saved layout can be empty (e.g. the right side is only the
        // key); carry the row count explicitly.
        let options = RecordBatchOptions::new().with_row_count(Some(block.len()));
        let batch =
            RecordBatch::try_new_with_options(Arc::clone(&self.saved_sample), columns, &options)
                .map_err(|e| JoinError::logic(e.to_string()))?;
        Ok(Chunk::new(batch))
    }

    /// Ingest one right-side chunk. Returns false when a Break-mode size
    /// limit was exceeded; Throw-mode limits surface as errors.
    pub fn add_block(&mut self, source: &Chunk, check_limits: bool) -> JoinResult<bool> {
        if self.over_dictionary() {
            return Err(JoinError::logic(
                "insert into the hash table of a join over dictionary",
            ));
        }
        if self.probe_locked.load(Ordering::Acquire) {
            return Err(JoinError::logic(
                "add_block called when join is locked to prevent updates",
            ));
        }
        let rows = source.len();
        // RowRef row indices are 32-bit for cell memory efficiency.
        if rows > u32::MAX as usize {
            return Err(JoinError::not_implemented(format!(
                "too many rows in right table block for join: {rows}"
            )));
        }
        if !self.logged_first_input {
            self.logged_first_input = true;
            debug!(
                "hash join received first build input: kind={} method={} rows={}",
                self.kind.as_str(),
                self.method.as_str(),
                rows
            );
        }

        // There's no optimization for right side dictionary columns; flatten.
        let block = chunk::materialize_chunk(source).map_err(JoinError::logic)?;

        let mut key_arrays: Vec<ArrayRef> =
            Vec::with_capacity(self.descriptor.key_names_right.len());
        for name in &self.descriptor.key_names_right {
            let column = block
                .column_by_name(name)
                .map_err(JoinError::no_such_column)?;
            key_arrays.push(chunk::materialize_array(&column).map_err(JoinError::logic)?);
        }
        let key_views = build_key_views(&key_arrays).map_err(JoinError::logic)?;
        let null_mask = key_null_mask(&key_views, rows);

        // Rows with NULL keys are saved for the non-joined scan of
        // RIGHT/FULL joins.
        let save_nullmap = self.kind.is_right_or_full()
            && null_mask
                .as_ref()
                .map_or(false, |mask| mask.iter().any(|is_null| *is_null));

        let join_mask =
            chunk::column_as_mask(&block, self.descriptor.condition_column_right.as_deref())
                .map_err(JoinError::logic)?;

        // Rows failing the ON condition are stashed too, unless the null map
        // already covers them.
        let not_joined_mask = if self.kind.is_right_or_full() {
            join_mask.as_ref().map(|mask| {
                mask.iter()
                    .enumerate()
                    .map(|(row, holds)| {
                        if *holds {
                            return false;
                        }
                        if save_nullmap
                            && null_mask.as_ref().map_or(false, |nulls| nulls[row])
                        {
                            return false;
                        }
                        true
                    })
                    .collect::<Vec<bool>>()
            })
        } else {
            None
        };

        let structured = self.structure_right_block(&block)?;
        let structured_bytes = structured.logical_bytes();

        let kind = self.kind;
        let strictness = self.strictness;
        let method = self.method;
        let asof_type = self.asof_type;
        let any_take_last_row = self.any_take_last_row;

        let data = Arc::get_mut(&mut self.data).ok_or_else(|| {
            JoinError::logic("join data is shared by a storage join; cannot add blocks")
        })?;
        let block_index = u32::try_from(data.blocks.len())
            .map_err(|_| JoinError::not_implemented("too many blocks in join build side"))?;
        data.blocks.push(structured);
        if rows > 0 {
            data.empty = false;
        }

        if kind != JoinKind::Cross {
            let is_asof = strictness == JoinStrictness::Asof;
            let equi_count = if is_asof {
                key_views.len() - 1
            } else {
                key_views.len()
            };
            let equi_views: &[KeyColumnView<'_>] = &key_views[..equi_count];
            let asof_view = is_asof.then(|| &key_views[equi_count]);

            let seed = data.table.hash_seed();
            let mut scratch = Vec::new();
            for row in 0..rows {
                if null_mask.as_ref().map_or(false, |mask| mask[row]) {
                    continue;
                }
                if join_mask.as_ref().map_or(false, |mask| !mask[row]) {
                    continue;
                }
                let key = pack_key(method, equi_views, row, &mut scratch)?;
                let hash = key.hash(seed);
                let asof = match (asof_view, asof_type) {
                    (Some(view), Some(asof_type)) => {
                        Some(asof_value(view, asof_type, row).map_err(JoinError::logic)?)
                    }
                    _ => None,
                };
                data.table.insert_row(
                    &key,
                    hash,
                    RowRef {
                        block: block_index,
                        row: row as u32,
                    },
                    asof,
                    any_take_last_row,
                )?;
            }
        }

        if save_nullmap {
            if let Some(mask) = null_mask {
                data.nullmap_stash
                    .push((block_index, BooleanArray::from(mask)));
            }
        }
        if let Some(mask) = not_joined_mask {
            if mask.iter().any(|stashed| *stashed) {
                data.nullmap_stash
                    .push((block_index, BooleanArray::from(mask)));
            }
        }

        let cells = data.table.buffer_size_in_cells();
        self.used_flags
            .reinit(needs_used_flags(kind, strictness), cells);
        self.mem_tracker
            .consume(i64::try_from(structured_bytes).unwrap_or(i64::MAX));

        if !check_limits {
            return Ok(true);
        }
        let total_rows = self.get_total_row_count();
        let total_bytes = self.get_total_byte_count();
        self.descriptor
            .size_limits
            .check(total_rows, total_bytes, "JOIN")
    }

    /// Probe key types must match the build keys after dictionary removal.
    fn check_types_of_keys(&self, block: &Chunk) -> JoinResult<()> {
        for (index, name) in self.descriptor.key_names_left.iter().enumerate() {
            let column = block
                .column_by_name(name)
                .map_err(JoinError::no_such_column)?;
            let left_type = strip_dictionary(column.data_type()).clone();
            let right_type = self.right_table_keys.field(index).data_type();
            if &left_type != right_type {
                return Err(JoinError::type_mismatch(format!(
                    "type mismatch of join key {name}: found {left_type}, right side is {right_type}"
                )));
            }
        }
        Ok(())
    }

    /// Join one probe chunk in place. `not_processed` carries the cross-join
    /// continuation when the output exceeds `max_joined_block_rows`.
    pub fn join_block(
        &self,
        block: &mut Chunk,
        not_processed: &mut Option<CrossJoinContinuation>,
    ) -> JoinResult<()> {
        if self.kind == JoinKind::Cross {
            return cross::join_block_cross(self, block, not_processed);
        }
        self.check_types_of_keys(block)?;
        if self.over_dictionary() {
            return probe::join_block_dictionary(self, block);
        }
        probe::join_block_keyed(self, block)
    }

    /// Reader over build rows never marked used, plus the stashed null-key
    /// and condition-masked rows. None for combinations without non-joined
    /// output.
    pub fn get_non_joined_blocks(
        &self,
        result_sample: &SchemaRef,
        max_block_size: usize,
    ) -> Option<NotJoinedReader<'_>> {
        if matches!(
            self.strictness,
            JoinStrictness::Asof | JoinStrictness::Semi
        ) || !self.kind.is_right_or_full()
        {
            return None;
        }
        Some(NotJoinedReader::new(
            self,
            Arc::clone(result_sample),
            max_block_size,
        ))
    }

    /// Result type of `join_get` for the given key types; checks arity,
    /// key types and column existence.
    pub fn join_get_return_type(
        &self,
        key_types: &[DataType],
        column_name: &str,
        or_null: bool,
    ) -> JoinResult<(DataType, bool)> {
        let num_keys = self.right_table_keys.fields().len();
        if key_types.len() != num_keys {
            return Err(JoinError::arguments_mismatch(format!(
                "number of join_get keys doesn't match: passed {}, should be {}",
                key_types.len(),
                num_keys
            )));
        }
        for (index, left_type) in key_types.iter().enumerate() {
            let left_type = strip_dictionary(left_type);
            let right_type = strip_dictionary(self.right_table_keys.field(index).data_type());
            if left_type != right_type {
                return Err(JoinError::type_mismatch(format!(
                    "type mismatch in join_get key {index}: found {left_type}, right side is {right_type}"
                )));
            }
        }
        let field = self
            .sample_with_columns_to_add
            .field_with_name(column_name)
            .map_err(|_| {
                JoinError::no_such_column(format!(
                    "join storage doesn't contain column {column_name}"
                ))
            })?;
        Ok((field.data_type().clone(), or_null || field.is_nullable()))
    }

    /// Point lookup: one value of `column_name` per key row, NULL where the
    /// key is absent. Restricted to LEFT ANY-shaped storage joins.
    pub fn join_get(
        &self,
        keys: &Chunk,
        column_name: &str,
        or_null: bool,
    ) -> JoinResult<ArrayRef> {
        let is_valid = matches!(
            self.strictness,
            JoinStrictness::Any | JoinStrictness::RightAny
        ) && self.kind == JoinKind::Left;
        if !is_valid {
            return Err(JoinError::incompatible(
                "join_get only supports joins of type LEFT ANY",
            ));
        }
        let key_types: Vec<DataType> = keys
            .columns()
            .iter()
            .map(|column| column.data_type().clone())
            .collect();
        self.join_get_return_type(&key_types, column_name, or_null)?;
        probe::join_get_column(self, keys, column_name)
    }

    /// Share another engine's built right-side data (storage join). The
    /// used-flags vector is re-sized for this engine's combination.
    pub fn reuse_joined_data(&mut self, other: &HashJoin) {
        self.data = Arc::clone(&other.data);
        self.from_storage_join = true;
        self.used_flags.reinit(
            needs_used_flags(self.kind, self.strictness),
            self.data.table.buffer_size_in_cells(),
        );
    }
}
