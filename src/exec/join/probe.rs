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
//! Probe engine for hash-join output assembly.
//!
//! Responsibilities:
//! - Batch key lookup dispatched on the table method, followed by a per-row
//!   emission phase implementing the kind × strictness semantics.
//! - Output shaping: row filter, replication offsets, NULL-padded defaults
//!   and required right key echoing.
//!
//! Key exported interfaces:
//! - Functions: `join_block_keyed`, `join_block_dictionary`, `join_get_column`.

use std::sync::Arc;

use arrow::array::{new_null_array, Array, ArrayRef, BooleanArray, RecordBatch};
use arrow::compute::kernels::boolean::not;
use arrow::compute::kernels::nullif::nullif;
use arrow::compute::{filter, interleave, take};
use arrow::datatypes::{Field, FieldRef, Schema};

use crate::exec::chunk::{self, Chunk};
use crate::exec::hash_table::key_view::{build_key_views, key_null_mask, KeyColumnView};
use crate::exec::join::asof::{asof_value, AsofInequality, AsofType};
use crate::exec::join::descriptor::{JoinKind, JoinStrictness};
use crate::exec::join::engine::HashJoin;
use crate::exec::join::error::{JoinError, JoinResult};
use crate::exec::join::method::JoinMethod;
use crate::exec::join::row_refs::RowRef;
use crate::exec::join::table::{pack_key, JoinHashTable};
use crate::exec::join::used_flags::UsedFlags;

#[derive(Clone, Copy)]
pub(crate) enum RowSource {
    /// NULL-padded default row.
    Default,
    Ref(RowRef),
}

#[derive(Clone, Copy)]
pub(crate) struct ProbeFlags {
    pub(crate) add_missing: bool,
    pub(crate) need_replication: bool,
    pub(crate) need_filter: bool,
}

pub(crate) fn probe_flags(kind: JoinKind, strictness: JoinStrictness) -> ProbeFlags {
    let left = kind == JoinKind::Left;
    let right = kind == JoinKind::Right;
    let full = kind == JoinKind::Full;
    let inner = kind == JoinKind::Inner;
    let is_all = strictness == JoinStrictness::All;
    let is_any = strictness == JoinStrictness::Any;
    let is_semi = strictness == JoinStrictness::Semi;
    let is_anti = strictness == JoinStrictness::Anti;

    let add_missing = (left || full) && !is_semi;
    let need_replication = is_all || (is_any && right) || (is_semi && right);
    let need_filter =
        !need_replication && (inner || right || (is_semi && left) || (is_anti && left));
    ProbeFlags {
        add_missing,
        need_replication,
        need_filter,
    }
}

/// Where matched rows are read from: the built table, or a per-probe
/// dictionary lookup (slot == probe row index there).
pub(crate) enum ProbeSource<'a> {
    Table(&'a JoinHashTable),
    Dict(&'a [RowRef]),
}

impl<'a> ProbeSource<'a> {
    fn one_ref(&self, slot: usize) -> JoinResult<RowRef> {
        match self {
            Self::Table(table) => table.one_ref(slot),
            Self::Dict(rows) => rows
                .get(slot)
                .copied()
                .ok_or_else(|| JoinError::logic("dictionary probe slot out of bounds")),
        }
    }

    fn extend_all(&self, slot: usize, sources: &mut Vec<RowSource>) -> JoinResult<u64> {
        match self {
            Self::Table(table) => {
                let mut added = 0u64;
                for row in table.list_rows(slot)? {
                    sources.push(RowSource::Ref(row));
                    added += 1;
                }
                Ok(added)
            }
            Self::Dict(_) => {
                sources.push(RowSource::Ref(self.one_ref(slot)?));
                Ok(1)
            }
        }
    }
}

pub(crate) struct AsofProbe<'a> {
    pub(crate) view: KeyColumnView<'a>,
    pub(crate) asof_type: AsofType,
    pub(crate) inequality: AsofInequality,
}

pub(crate) struct EmitContext<'a> {
    pub(crate) source: ProbeSource<'a>,
    pub(crate) flags: &'a UsedFlags,
    pub(crate) kind: JoinKind,
    pub(crate) strictness: JoinStrictness,
    pub(crate) probe: ProbeFlags,
    pub(crate) build_filter: bool,
    pub(crate) asof: Option<AsofProbe<'a>>,
}

pub(crate) struct Emission {
    pub(crate) sources: Vec<RowSource>,
    pub(crate) filter: Option<Vec<bool>>,
    pub(crate) offsets: Option<Vec<u64>>,
}

/// Batch key lookup. None marks rows that are unacceptable (null key
/// component or left condition mask false) as well as genuine misses; the
/// emission phase treats both as not-found.
pub(crate) fn lookup_slots(
    table: &JoinHashTable,
    method: JoinMethod,
    views: &[KeyColumnView<'_>],
    rows: usize,
    null_mask: Option<&[bool]>,
    accept_mask: Option<&[bool]>,
) -> JoinResult<Vec<Option<usize>>> {
    let seed = table.hash_seed();
    let mut scratch = Vec::new();
    let mut slots = Vec::with_capacity(rows);
    for row in 0..rows {
        let unacceptable = null_mask.map_or(false, |mask| mask[row])
            || accept_mask.map_or(false, |mask| !mask[row]);
        if unacceptable {
            slots.push(None);
            continue;
        }
        let key = pack_key(method, views, row, &mut scratch)?;
        let hash = key.hash(seed);
        slots.push(table.find_slot(&key, hash)?);
    }
    Ok(slots)
}

/// Per-row emission implementing the kind × strictness matrix. Produces the
/// right-row sources to gather, the row filter and the replication offsets.
pub(crate) fn emit_rows(ctx: &EmitContext<'_>, slots: &[Option<usize>]) -> JoinResult<Emission> {
    let rows = slots.len();
    let mut sources = Vec::with_capacity(rows);
    let mut filter = ctx.build_filter.then(|| vec![false; rows]);
    let mut offsets = ctx.probe.need_replication.then(|| vec![0u64; rows]);
    let mut current_offset = 0u64;

    for (i, slot_opt) in slots.iter().enumerate() {
        let mut set_filter = |filter: &mut Option<Vec<bool>>| {
            if let Some(filter) = filter.as_mut() {
                filter[i] = true;
            }
        };
        let mut not_found =
            |sources: &mut Vec<RowSource>, current_offset: &mut u64| {
                if ctx.probe.add_missing {
                    sources.push(RowSource::Default);
                    if ctx.probe.need_replication {
                        *current_offset += 1;
                    }
                }
            };

        match slot_opt {
            Some(slot) => {
                let slot = *slot;
                match ctx.strictness {
                    JoinStrictness::Asof => {
                        let asof = ctx
                            .asof
                            .as_ref()
                            .ok_or_else(|| JoinError::logic("asof probe context missing"))?;
                        let value = asof_value(&asof.view, asof.asof_type, i)
                            .map_err(JoinError::logic)?;
                        let found = match &ctx.source {
                            ProbeSource::Table(table) => {
                                table.asof_find(slot, asof.inequality, value)?
                            }
                            ProbeSource::Dict(_) => {
                                return Err(JoinError::logic(
                                    "asof join over dictionary is not supported",
                                ));
                            }
                        };
                        match found {
                            Some(row) => {
                                set_filter(&mut filter);
                                ctx.flags.set_used(slot);
                                sources.push(RowSource::Ref(row));
                            }
                            None => not_found(&mut sources, &mut current_offset),
                        }
                    }
                    JoinStrictness::All => {
                        set_filter(&mut filter);
                        ctx.flags.set_used(slot);
                        current_offset += ctx.source.extend_all(slot, &mut sources)?;
                    }
                    JoinStrictness::Any | JoinStrictness::Semi
                        if ctx.kind == JoinKind::Right =>
                    {
                        // First probe thread to claim the entry emits it,
                        // with left columns replicated over the chain.
                        if ctx.flags.set_used_once(slot) {
                            set_filter(&mut filter);
                            current_offset += ctx.source.extend_all(slot, &mut sources)?;
                        }
                    }
                    JoinStrictness::Any if ctx.kind == JoinKind::Inner => {
                        // First appeared left key only, globally.
                        if ctx.flags.set_used_once(slot) {
                            set_filter(&mut filter);
                            sources.push(RowSource::Ref(ctx.source.one_ref(slot)?));
                        }
                    }
                    JoinStrictness::Anti => {
                        if ctx.kind == JoinKind::Right {
                            ctx.flags.set_used(slot);
                        }
                    }
                    // ANY LEFT, SEMI LEFT and legacy RIGHT_ANY.
                    JoinStrictness::Any | JoinStrictness::Semi | JoinStrictness::RightAny => {
                        set_filter(&mut filter);
                        ctx.flags.set_used(slot);
                        sources.push(RowSource::Ref(ctx.source.one_ref(slot)?));
                    }
                }
            }
            None => {
                if ctx.strictness == JoinStrictness::Anti && ctx.kind == JoinKind::Left {
                    set_filter(&mut filter);
                }
                not_found(&mut sources, &mut current_offset);
            }
        }

        if let Some(offsets) = offsets.as_mut() {
            offsets[i] = current_offset;
        }
    }

    Ok(Emission {
        sources,
        filter,
        offsets,
    })
}

/// Right-side columns to append to the probe block: position of each in the
/// stored chunk layout plus the output field.
pub(crate) struct AddedColumns {
    fields: Vec<FieldRef>,
    source_indexes: Vec<usize>,
}

pub(crate) fn added_columns_for_block(
    join: &HashJoin,
    block: &Chunk,
    is_asof: bool,
    add_missing: bool,
) -> JoinResult<AddedColumns> {
    let mut fields = Vec::new();
    let mut source_indexes = Vec::new();
    let mut push = |field: &Field, saved_pos: usize| {
        let nullable = field.is_nullable() || add_missing || join.nullable_right_side;
        fields.push(Arc::new(Field::new(
            field.name(),
            field.data_type().clone(),
            nullable,
        )));
        source_indexes.push(saved_pos);
    };

    for field in join.sample_with_columns_to_add.fields() {
        // Don't insert a column already present in the left block.
        if block.index_of(field.name()).is_some() {
            continue;
        }
        let saved_pos = join
            .saved_sample
            .index_of(field.name())
            .map_err(|e| JoinError::logic(e.to_string()))?;
        push(field.as_ref(), saved_pos);
    }

    if is_asof {
        let asof_name = join
            .descriptor
            .key_names_right
            .last()
            .ok_or_else(|| JoinError::logic("asof join without key columns"))?;
        let field = join
            .right_table_keys
            .field_with_name(asof_name)
            .map_err(|e| JoinError::logic(e.to_string()))?;
        let saved_pos = join
            .saved_sample
            .index_of(asof_name)
            .map_err(|e| JoinError::logic(e.to_string()))?;
        push(field, saved_pos);
    }

    Ok(AddedColumns {
        fields,
        source_indexes,
    })
}

/// Gather added right columns row-by-row from the stored chunks, padding
/// `Default` sources with NULL.
pub(crate) fn gather_added_arrays(
    blocks: &[Chunk],
    added: &AddedColumns,
    sources: &[RowSource],
) -> JoinResult<Vec<ArrayRef>> {
    let indices: Vec<(usize, usize)> = sources
        .iter()
        .map(|source| match source {
            RowSource::Default => (0, 0),
            RowSource::Ref(row) => (row.block as usize + 1, row.row as usize),
        })
        .collect();

    let mut out = Vec::with_capacity(added.fields.len());
    for (field, source_index) in added.fields.iter().zip(&added.source_indexes) {
        let defaults = new_null_array(field.data_type(), 1);
        let columns: Vec<ArrayRef> = blocks
            .iter()
            .map(|block| {
                block
                    .columns()
                    .get(*source_index)
                    .cloned()
                    .ok_or_else(|| JoinError::logic("stored chunk misses a saved column"))
            })
            .collect::<JoinResult<_>>()?;
        let mut arrays: Vec<&dyn Array> = Vec::with_capacity(columns.len() + 1);
        arrays.push(defaults.as_ref());
        for column in &columns {
            arrays.push(column.as_ref());
        }
        let gathered =
            interleave(&arrays, &indices).map_err(|e| JoinError::logic(e.to_string()))?;
        out.push(gathered);
    }
    Ok(out)
}

fn chunk_with_nullable_fields(block: &Chunk) -> JoinResult<Chunk> {
    let schema = block.schema();
    let fields: Vec<FieldRef> = schema
        .fields()
        .iter()
        .map(|field| Arc::new(field.as_ref().clone().with_nullable(true)))
        .collect();
    let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), block.columns().to_vec())
        .map_err(|e| JoinError::logic(e.to_string()))?;
    Ok(Chunk::new(batch))
}

/// Assemble the joined block in place: filtered or replicated left columns,
/// gathered right columns, echoed required right keys.
fn assemble_output(
    join: &HashJoin,
    block: &mut Chunk,
    probe: ProbeFlags,
    emission: Emission,
    added: AddedColumns,
    added_arrays: Vec<ArrayRef>,
    is_asof: bool,
) -> JoinResult<()> {
    let left_schema = block.schema();
    let mut left_columns: Vec<ArrayRef> = block.columns().to_vec();
    let has_required = !join.required_right_keys.is_empty();
    let filter_array = emission
        .filter
        .as_ref()
        .map(|mask| BooleanArray::from(mask.clone()));

    let asof_key_name = join.descriptor.key_names_right.last().cloned();
    let mut required_columns: Vec<(FieldRef, ArrayRef)> = Vec::new();

    if probe.need_filter {
        let mask = filter_array
            .as_ref()
            .ok_or_else(|| JoinError::logic("row filter missing"))?;
        for column in &mut left_columns {
            *column = filter(column.as_ref(), mask).map_err(|e| JoinError::logic(e.to_string()))?;
        }
        for (right_name, left_name) in &join.required_right_keys {
            // The asof key column is already among the added columns.
            if is_asof && Some(right_name) == asof_key_name.as_ref() {
                continue;
            }
            let index = left_schema
                .index_of(left_name)
                .map_err(|e| JoinError::no_such_column(e.to_string()))?;
            let column = Arc::clone(&left_columns[index]);
            let right_field = join
                .right_table_keys
                .field_with_name(right_name)
                .map_err(|e| JoinError::logic(e.to_string()))?;
            let nullable = join.nullable_right_side || right_field.is_nullable();
            required_columns.push((
                Arc::new(Field::new(right_name, column.data_type().clone(), nullable)),
                column,
            ));
        }
    } else if has_required {
        let mask = filter_array
            .as_ref()
            .ok_or_else(|| JoinError::logic("row filter missing"))?;
        let blanks = not(mask).map_err(|e| JoinError::logic(e.to_string()))?;
        for (right_name, left_name) in &join.required_right_keys {
            if is_asof && Some(right_name) == asof_key_name.as_ref() {
                continue;
            }
            let index = left_schema
                .index_of(left_name)
                .map_err(|e| JoinError::no_such_column(e.to_string()))?;
            let column = &left_columns[index];
            // Blank out rows the filter rejected.
            let masked =
                nullif(column.as_ref(), &blanks).map_err(|e| JoinError::logic(e.to_string()))?;
            required_columns.push((
                Arc::new(Field::new(right_name, masked.data_type().clone(), true)),
                masked,
            ));
        }
    }

    if probe.need_replication {
        let offsets = emission
            .offsets
            .as_ref()
            .ok_or_else(|| JoinError::logic("replication offsets missing"))?;
        let indices = chunk::replication_indices(offsets).map_err(JoinError::logic)?;
        let indices: ArrayRef = Arc::new(indices);
        for column in &mut left_columns {
            *column =
                take(column.as_ref(), &indices, None).map_err(|e| JoinError::logic(e.to_string()))?;
        }
        for (_field, column) in &mut required_columns {
            *column =
                take(column.as_ref(), &indices, None).map_err(|e| JoinError::logic(e.to_string()))?;
        }
    }

    let mut fields: Vec<FieldRef> = left_schema.fields().to_vec();
    let mut columns = left_columns;
    fields.extend(added.fields);
    columns.extend(added_arrays);
    for (field, column) in required_columns {
        fields.push(field);
        columns.push(column);
    }

    let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
        .map_err(|e| JoinError::logic(e.to_string()))?;
    *block = Chunk::new(batch);
    Ok(())
}

/// Probe one left block against the built table and rewrite it to the join
/// result.
pub(crate) fn join_block_keyed(join: &HashJoin, block: &mut Chunk) -> JoinResult<()> {
    let kind = join.kind;
    let strictness = join.strictness;
    let is_asof = strictness == JoinStrictness::Asof;

    // Left columns must be materialized for RIGHT/FULL: non-joined output
    // pads them with NULL, which constants and dictionaries cannot carry.
    if kind.is_right_or_full() {
        *block = chunk::materialize_chunk(block).map_err(JoinError::logic)?;
        if join.nullable_left_side {
            *block = chunk_with_nullable_fields(block)?;
        }
    }

    let rows = block.len();
    let mut key_arrays = Vec::with_capacity(join.descriptor.key_names_left.len());
    for name in &join.descriptor.key_names_left {
        let column = block
            .column_by_name(name)
            .map_err(JoinError::no_such_column)?;
        key_arrays.push(chunk::materialize_array(&column).map_err(JoinError::logic)?);
    }

    let all_views = build_key_views(&key_arrays).map_err(JoinError::logic)?;
    let null_mask = key_null_mask(&all_views, rows);
    let left_mask = chunk::column_as_mask(block, join.descriptor.condition_column_left.as_deref())
        .map_err(JoinError::logic)?;

    let (equi_count, asof_probe) = if is_asof {
        let asof_type = join
            .asof_type
            .ok_or_else(|| JoinError::logic("asof type not resolved"))?;
        let asof_views = build_key_views(std::slice::from_ref(
            key_arrays
                .last()
                .ok_or_else(|| JoinError::logic("asof key column missing"))?,
        ))
        .map_err(JoinError::logic)?;
        let view = asof_views
            .into_iter()
            .next()
            .ok_or_else(|| JoinError::logic("asof key view missing"))?;
        (
            key_arrays.len() - 1,
            Some(AsofProbe {
                view,
                asof_type,
                inequality: join.descriptor.asof_inequality,
            }),
        )
    } else {
        (key_arrays.len(), None)
    };

    let table = &join.data.table;
    let slots = lookup_slots(
        table,
        join.method,
        &all_views[..equi_count],
        rows,
        null_mask.as_deref(),
        left_mask.as_deref(),
    )?;

    let probe = probe_flags(kind, strictness);
    let has_required = !join.required_right_keys.is_empty();
    let context = EmitContext {
        source: ProbeSource::Table(table),
        flags: &join.used_flags,
        kind,
        strictness,
        probe,
        build_filter: probe.need_filter || has_required,
        asof: asof_probe,
    };
    let emission = emit_rows(&context, &slots)?;

    let added = added_columns_for_block(join, block, is_asof, probe.add_missing)?;
    let added_arrays = gather_added_arrays(&join.data.blocks, &added, &emission.sources)?;
    assemble_output(join, block, probe, emission, added, added_arrays, is_asof)
}

/// Probe through the external dictionary instead of the built table. Only
/// LEFT-side combinations are wired; ALL degrades to the original's
/// equivalents.
pub(crate) fn join_block_dictionary(join: &HashJoin, block: &mut Chunk) -> JoinResult<()> {
    use JoinKind::{Inner, Left};
    use JoinStrictness::{All, Any, Anti, Semi};

    let (kind, strictness) = match (join.kind, join.strictness) {
        (Left, Any) | (Left, All) => (Left, Any),
        (Left, Semi) => (Left, Semi),
        (Left, Anti) => (Left, Anti),
        (Inner, All) => (Left, Semi),
        (other_kind, other_strictness) => {
            return Err(JoinError::logic(format!(
                "wrong JOIN combination over dictionary: {} {}",
                other_kind.as_str(),
                other_strictness.as_str()
            )));
        }
    };

    let reader = join
        .descriptor
        .dictionary_reader
        .as_ref()
        .ok_or_else(|| JoinError::logic("dictionary join without a reader"))?;
    if join.descriptor.key_names_left.len() != 1 {
        return Err(JoinError::logic(
            "dictionary join requires exactly one key column",
        ));
    }
    let key_name = &join.descriptor.key_names_left[0];
    let key_array = chunk::materialize_array(
        &block
            .column_by_name(key_name)
            .map_err(JoinError::no_such_column)?,
    )
    .map_err(JoinError::logic)?;

    let rows = block.len();
    let lookup = reader.read_keys(&key_array)?;
    if lookup.found.len() != rows || lookup.positions.len() != rows {
        return Err(JoinError::logic(format!(
            "dictionary lookup size mismatch: rows={} found={} positions={}",
            rows,
            lookup.found.len(),
            lookup.positions.len()
        )));
    }

    let views = build_key_views(std::slice::from_ref(&key_array)).map_err(JoinError::logic)?;
    let null_mask = key_null_mask(&views, rows);
    let left_mask = chunk::column_as_mask(block, join.descriptor.condition_column_left.as_deref())
        .map_err(JoinError::logic)?;

    let mut dict_rows = vec![RowRef { block: 0, row: 0 }; rows];
    let mut slots = Vec::with_capacity(rows);
    for row in 0..rows {
        let unacceptable = null_mask.as_ref().map_or(false, |mask| mask[row])
            || left_mask.as_ref().map_or(false, |mask| !mask[row]);
        if !unacceptable && lookup.found[row] {
            dict_rows[row] = RowRef {
                block: 0,
                row: lookup.positions[row],
            };
            slots.push(Some(row));
        } else {
            slots.push(None);
        }
    }

    let probe = probe_flags(kind, strictness);
    let has_required = !join.required_right_keys.is_empty();
    let context = EmitContext {
        source: ProbeSource::Dict(&dict_rows),
        flags: &join.used_flags,
        kind,
        strictness,
        probe,
        build_filter: probe.need_filter || has_required,
        asof: None,
    };
    let emission = emit_rows(&context, &slots)?;

    let added = added_columns_for_block(join, block, false, probe.add_missing)?;
    let added_arrays =
        gather_added_arrays(std::slice::from_ref(&lookup.chunk), &added, &emission.sources)?;
    assemble_output(join, block, probe, emission, added, added_arrays, false)
}

/// Point lookup: one output value per key row, NULL where the key is absent.
pub(crate) fn join_get_column(
    join: &HashJoin,
    keys: &Chunk,
    column_name: &str,
) -> JoinResult<ArrayRef> {
    let rows = keys.len();
    let mut key_arrays = Vec::with_capacity(keys.columns().len());
    for column in keys.columns() {
        key_arrays.push(chunk::materialize_array(column).map_err(JoinError::logic)?);
    }
    let views = build_key_views(&key_arrays).map_err(JoinError::logic)?;
    let null_mask = key_null_mask(&views, rows);

    let table = &join.data.table;
    let slots = lookup_slots(table, join.method, &views, rows, null_mask.as_deref(), None)?;

    let mut sources = Vec::with_capacity(rows);
    for slot in &slots {
        match slot {
            Some(slot) => sources.push(RowSource::Ref(table.one_ref(*slot)?)),
            None => sources.push(RowSource::Default),
        }
    }

    let saved_pos = join
        .saved_sample
        .index_of(column_name)
        .map_err(|e| JoinError::no_such_column(e.to_string()))?;
    let field = join.saved_sample.field(saved_pos);
    let added = AddedColumns {
        fields: vec![Arc::new(Field::new(
            field.name(),
            field.data_type().clone(),
            true,
        ))],
        source_indexes: vec![saved_pos],
    };
    let mut arrays = gather_added_arrays(&join.data.blocks, &added, &sources)?;
    arrays
        .pop()
        .ok_or_else(|| JoinError::logic("join_get produced no column"))
}
