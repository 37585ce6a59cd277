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
use std::collections::HashSet;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, RecordBatch, UInt32Array, UInt8Array};
use arrow::buffer::Buffer;
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};

/// A chunk of data, consisting of multiple rows. Wrapper around an Arrow
/// RecordBatch; columns are addressed by name.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub batch: RecordBatch,
}

impl Chunk {
    pub fn new(batch: RecordBatch) -> Self {
        Self { batch }
    }

    pub fn empty(schema: SchemaRef) -> Self {
        Self {
            batch: RecordBatch::new_empty(schema),
        }
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    pub fn len(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.num_rows() == 0
    }

    pub fn columns(&self) -> &[ArrayRef] {
        self.batch.columns()
    }

    pub fn column_by_name(&self, name: &str) -> Result<ArrayRef, String> {
        self.batch
            .column_by_name(name)
            .cloned()
            .ok_or_else(|| format!("column {name} not found in chunk"))
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.batch.schema().index_of(name).ok()
    }

    pub fn logical_bytes(&self) -> usize {
        record_batch_bytes(&self.batch)
    }
}

impl Default for Chunk {
    fn default() -> Self {
        Self {
            batch: RecordBatch::new_empty(Arc::new(Schema::empty())),
        }
    }
}

/// Flatten dictionary (low-cardinality) encoding to the plain value type.
pub fn materialize_array(array: &ArrayRef) -> Result<ArrayRef, String> {
    match array.data_type() {
        DataType::Dictionary(_key, value) => {
            let value = value.as_ref().clone();
            cast(array, &value).map_err(|e| format!("failed to materialize dictionary: {e}"))
        }
        _ => Ok(Arc::clone(array)),
    }
}

/// Materialize every column of a chunk, rewriting dictionary fields to their
/// value types.
pub fn materialize_chunk(chunk: &Chunk) -> Result<Chunk, String> {
    let schema = chunk.schema();
    if !schema
        .fields()
        .iter()
        .any(|f| matches!(f.data_type(), DataType::Dictionary(_, _)))
    {
        return Ok(chunk.clone());
    }
    let mut fields = Vec::with_capacity(schema.fields().len());
    let mut columns = Vec::with_capacity(schema.fields().len());
    for (field, column) in schema.fields().iter().zip(chunk.columns()) {
        let materialized = materialize_array(column)?;
        fields.push(Arc::new(Field::new(
            field.name(),
            materialized.data_type().clone(),
            field.is_nullable(),
        )));
        columns.push(materialized);
    }
    let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
        .map_err(|e| e.to_string())?;
    Ok(Chunk::new(batch))
}

/// Read a named Boolean or UInt8 column as a row mask. Null entries count as
/// false. Returns None when no column name is given.
pub fn column_as_mask(chunk: &Chunk, name: Option<&str>) -> Result<Option<Vec<bool>>, String> {
    let Some(name) = name else {
        return Ok(None);
    };
    let column = materialize_array(&chunk.column_by_name(name)?)?;
    let mask = match column.data_type() {
        DataType::Boolean => {
            let arr = column
                .as_any()
                .downcast_ref::<BooleanArray>()
                .ok_or_else(|| "failed to downcast mask to BooleanArray".to_string())?;
            (0..arr.len())
                .map(|row| !arr.is_null(row) && arr.value(row))
                .collect()
        }
        DataType::UInt8 => {
            let arr = column
                .as_any()
                .downcast_ref::<UInt8Array>()
                .ok_or_else(|| "failed to downcast mask to UInt8Array".to_string())?;
            (0..arr.len())
                .map(|row| !arr.is_null(row) && arr.value(row) != 0)
                .collect()
        }
        other => {
            return Err(format!(
                "join condition column {name} must be Boolean or UInt8, got {other}"
            ));
        }
    };
    Ok(Some(mask))
}

/// Expand a per-row offset prefix-sum into take indices replicating row `i`
/// `offsets[i] - offsets[i-1]` times.
pub fn replication_indices(offsets: &[u64]) -> Result<UInt32Array, String> {
    let total = offsets.last().copied().unwrap_or(0);
    let total = usize::try_from(total).map_err(|_| "replication offsets overflow".to_string())?;
    let mut indices = Vec::with_capacity(total);
    let mut prev = 0u64;
    for (row, offset) in offsets.iter().enumerate() {
        if *offset < prev {
            return Err(format!(
                "replication offsets must not decrease: row={row} offset={offset} prev={prev}"
            ));
        }
        let row = u32::try_from(row).map_err(|_| "replication row overflow".to_string())?;
        for _ in prev..*offset {
            indices.push(row);
        }
        prev = *offset;
    }
    Ok(UInt32Array::from(indices))
}

/// Estimate chunk size by summing unique buffers inside the batch. Buffers
/// shared across batches (slices, dictionaries) are still double-counted.
pub fn record_batch_bytes(batch: &RecordBatch) -> usize {
    let mut seen = HashSet::new();
    let mut total = 0usize;
    for column in batch.columns() {
        total = total.saturating_add(array_data_bytes(&column.to_data(), &mut seen));
    }
    total
}

fn array_data_bytes(data: &arrow::array::ArrayData, seen: &mut HashSet<usize>) -> usize {
    let mut total = 0usize;
    for buffer in data.buffers() {
        total = total.saturating_add(buffer_bytes(buffer, seen));
    }
    if let Some(nulls) = data.nulls() {
        total = total.saturating_add(buffer_bytes(nulls.buffer(), seen));
    }
    for child in data.child_data() {
        total = total.saturating_add(array_data_bytes(child, seen));
    }
    total
}

fn buffer_bytes(buffer: &Buffer, seen: &mut HashSet<usize>) -> usize {
    let ptr = buffer.data_ptr().as_ptr() as usize;
    if !seen.insert(ptr) {
        return 0;
    }
    buffer.capacity().max(buffer.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{DictionaryArray, Int32Array, StringArray};
    use arrow::datatypes::Int32Type;

    fn chunk_of(name: &str, array: ArrayRef) -> Chunk {
        let field = Field::new(name, array.data_type().clone(), true);
        let batch =
            RecordBatch::try_new(Arc::new(Schema::new(vec![field])), vec![array]).expect("batch");
        Chunk::new(batch)
    }

    #[test]
    fn mask_reads_boolean_and_u8_columns() {
        let chunk = chunk_of(
            "m",
            Arc::new(BooleanArray::from(vec![Some(true), Some(false), None])),
        );
        let mask = column_as_mask(&chunk, Some("m")).expect("mask").expect("some");
        assert_eq!(mask, vec![true, false, false]);

        let chunk = chunk_of("m", Arc::new(UInt8Array::from(vec![0u8, 1, 2])));
        let mask = column_as_mask(&chunk, Some("m")).expect("mask").expect("some");
        assert_eq!(mask, vec![false, true, true]);

        assert!(column_as_mask(&chunk, None).expect("no mask").is_none());
    }

    #[test]
    fn mask_rejects_other_types() {
        let chunk = chunk_of("m", Arc::new(Int32Array::from(vec![1])));
        let err = column_as_mask(&chunk, Some("m")).expect_err("must fail");
        assert!(err.contains("Boolean or UInt8"), "err={err}");
    }

    #[test]
    fn replication_indices_expand_prefix_sums() {
        let indices = replication_indices(&[2, 2, 5]).expect("indices");
        let values: Vec<u32> = (0..indices.len()).map(|i| indices.value(i)).collect();
        assert_eq!(values, vec![0, 0, 2, 2, 2]);

        let err = replication_indices(&[2, 1]).expect_err("must fail");
        assert!(err.contains("must not decrease"), "err={err}");
    }

    #[test]
    fn materialize_flattens_dictionary_columns() {
        let dict: DictionaryArray<Int32Type> =
            vec!["a", "b", "a"].into_iter().collect::<DictionaryArray<_>>();
        let chunk = chunk_of("k", Arc::new(dict));
        let out = materialize_chunk(&chunk).expect("materialized");
        assert_eq!(out.schema().field(0).data_type(), &DataType::Utf8);
        let arr = out.columns()[0]
            .as_any()
            .downcast_ref::<StringArray>()
            .expect("utf8");
        assert_eq!(arr.value(0), "a");
        assert_eq!(arr.value(2), "a");
    }
}
