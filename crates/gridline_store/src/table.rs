use arrow::array::RecordBatch;
use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;

use crate::errors::{Result, StoreError};

/// An in-memory table: one schema, any number of record batches.
///
/// Ownership of the table moves linearly through the pipeline; no stage
/// mutates a table another stage still holds.
#[derive(Debug, Clone)]
pub struct UnifiedTable {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl UnifiedTable {
    /// Build a table from batches sharing a schema.
    pub fn try_new(schema: SchemaRef, batches: Vec<RecordBatch>) -> Result<Self> {
        for batch in &batches {
            if batch.schema().as_ref() != schema.as_ref() {
                return Err(StoreError::SchemaMismatch);
            }
        }
        Ok(UnifiedTable { schema, batches })
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }

    /// Collapse into a single record batch.
    pub fn to_single_batch(&self) -> Result<RecordBatch> {
        Ok(concat_batches(&self.schema, &self.batches)?)
    }
}
