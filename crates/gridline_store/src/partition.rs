//! Hive-style partition writer.
//!
//! Rows are grouped by the distinct tuple of partition-key values and each
//! group lands in its own `key1=value1/key2=value2/part-0.arrow` leaf file.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use arrow::array::{
    ArrayRef, BooleanArray, Int64Array, RecordBatch, StringArray, UInt64Array, UInt64Builder,
};
use arrow::compute::take;
use arrow::datatypes::DataType;
use arrow::ipc::writer::FileWriter;
use tracing::info;

use crate::dataset::{PartitionLeaf, PartitionedDataset};
use crate::errors::{Result, StoreError};
use crate::materialize::MaterializedFile;
use crate::query::Value;
use crate::schema::{self, ColumnType};

/// Name of the single data file written per leaf directory.
///
/// Deterministic on purpose: each leaf has exactly one writer in this
/// synchronous pipeline, so there is no need for randomized file names.
pub const LEAF_FILE_NAME: &str = "part-0.arrow";

/// Rewrite a materialized table as a partitioned dataset rooted at
/// `dest_root`.
///
/// Key columns are validated against the schema before any I/O. An existing
/// dataset at `dest_root` is removed first; partitioning always overwrites,
/// which makes re-runs idempotent by construction.
pub fn write_partitioned(
    src: &MaterializedFile,
    partition_keys: &[String],
    dest_root: impl AsRef<Path>,
) -> Result<PartitionedDataset> {
    let dest_root = dest_root.as_ref();
    let schema_ref = src.schema().clone();

    if partition_keys.is_empty() {
        return Err(StoreError::EmptyPartitionKeys);
    }

    let mut key_columns = Vec::with_capacity(partition_keys.len());
    for key in partition_keys {
        let idx = schema::column_index(&schema_ref, key, "partition key")?;
        let ctype = ColumnType::from_arrow(key, schema_ref.field(idx).data_type(), "partition key")?;
        if ctype == ColumnType::Float64 {
            return Err(StoreError::UnsupportedType {
                column: key.clone(),
                datatype: DataType::Float64,
                context: "partition key",
            });
        }
        key_columns.push((idx, ctype));
    }

    let table = src.read_all()?;

    // A null has no directory to live in; reject before writing anything.
    for (idx, _) in &key_columns {
        for batch in table.batches() {
            if batch.column(*idx).null_count() > 0 {
                return Err(StoreError::NullPartitionKey(
                    schema_ref.field(*idx).name().clone(),
                ));
            }
        }
    }

    if dest_root.exists() {
        fs::remove_dir_all(dest_root)?;
    }
    fs::create_dir_all(dest_root)?;

    let mut writers: BTreeMap<Vec<String>, (FileWriter<File>, PathBuf)> = BTreeMap::new();
    let mut total_rows = 0usize;

    for batch in table.batches() {
        let key_values = partition_key_strings(batch, &key_columns)?;
        let take_map = compute_take_arrays(batch.num_rows(), &key_values);

        for (key, mut builder) in take_map {
            let indices = builder.finish();
            let parted = take_batch(batch, &indices)?;
            total_rows += parted.num_rows();

            if let Some((writer, _)) = writers.get_mut(&key) {
                writer.write(&parted)?;
            } else {
                let dir = leaf_dir(dest_root, partition_keys, &key);
                fs::create_dir_all(&dir)?;
                let path = dir.join(LEAF_FILE_NAME);
                let file = File::create(&path)?;
                let mut writer = FileWriter::try_new(file, &schema_ref)?;
                writer.write(&parted)?;
                writers.insert(key, (writer, path));
            }
        }
    }

    let key_types: Vec<ColumnType> = key_columns.iter().map(|(_, t)| *t).collect();
    let mut leaves = Vec::with_capacity(writers.len());
    for (key, (mut writer, path)) in writers {
        writer.finish()?;
        let values = key
            .iter()
            .zip(&key_types)
            .map(|(raw, ctype)| Value::parse(raw, *ctype))
            .collect::<Result<Vec<_>>>()?;
        leaves.push(PartitionLeaf { path, keys: values });
    }

    info!(
        root = %dest_root.display(),
        rows = total_rows,
        partitions = leaves.len(),
        "wrote partitioned dataset"
    );

    Ok(PartitionedDataset::from_parts(
        dest_root.to_path_buf(),
        partition_keys.to_vec(),
        key_types,
        schema_ref,
        leaves,
    ))
}

/// String-encode each row's partition-key values, one vector per key column.
fn partition_key_strings(
    batch: &RecordBatch,
    key_columns: &[(usize, ColumnType)],
) -> Result<Vec<Vec<String>>> {
    let mut all = Vec::with_capacity(key_columns.len());
    for (idx, ctype) in key_columns {
        let array = batch.column(*idx);
        let mut values = Vec::with_capacity(batch.num_rows());
        match ctype {
            ColumnType::Utf8 => {
                let array = array
                    .as_any()
                    .downcast_ref::<StringArray>()
                    .ok_or(StoreError::SchemaMismatch)?;
                for i in 0..batch.num_rows() {
                    values.push(array.value(i).to_string());
                }
            }
            ColumnType::Int64 => {
                let array = array
                    .as_any()
                    .downcast_ref::<Int64Array>()
                    .ok_or(StoreError::SchemaMismatch)?;
                for i in 0..batch.num_rows() {
                    values.push(array.value(i).to_string());
                }
            }
            ColumnType::Boolean => {
                let array = array
                    .as_any()
                    .downcast_ref::<BooleanArray>()
                    .ok_or(StoreError::SchemaMismatch)?;
                for i in 0..batch.num_rows() {
                    values.push(array.value(i).to_string());
                }
            }
            ColumnType::Float64 => {
                return Err(StoreError::UnsupportedType {
                    column: format!("column {idx}"),
                    datatype: DataType::Float64,
                    context: "partition key",
                });
            }
        }
        all.push(values);
    }
    Ok(all)
}

/// Map each distinct key tuple to the row indices belonging to it.
fn compute_take_arrays(
    num_rows: usize,
    key_values: &[Vec<String>],
) -> BTreeMap<Vec<String>, UInt64Builder> {
    let mut take_map = BTreeMap::new();
    for row in 0..num_rows {
        let key: Vec<String> = key_values.iter().map(|vals| vals[row].clone()).collect();
        let builder = take_map.entry(key).or_insert_with(UInt64Builder::new);
        builder.append_value(row as u64);
    }
    take_map
}

fn take_batch(batch: &RecordBatch, indices: &UInt64Array) -> Result<RecordBatch> {
    let columns = batch
        .columns()
        .iter()
        .map(|c| take(c, indices, None))
        .collect::<std::result::Result<Vec<ArrayRef>, _>>()?;
    Ok(RecordBatch::try_new(batch.schema(), columns)?)
}

fn leaf_dir(root: &Path, keys: &[String], values: &[String]) -> PathBuf {
    let mut dir = root.to_path_buf();
    for (key, value) in keys.iter().zip(values) {
        dir.push(format!("{}={}", key, escape_value(value)));
    }
    dir
}

/// Escape characters that would break `key=value` path segments.
pub(crate) fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '%' => out.push_str("%25"),
            '/' => out.push_str("%2F"),
            '=' => out.push_str("%3D"),
            _ => out.push(c),
        }
    }
    out
}

pub(crate) fn unescape_value(value: &str) -> String {
    value
        .replace("%3D", "=")
        .replace("%2F", "/")
        .replace("%25", "%")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::Float64Array;
    use arrow::datatypes::{Field, Schema};

    use super::*;
    use crate::materialize::materialize;
    use crate::table::UnifiedTable;

    fn write_sample(dir: &Path, posteams: Vec<Option<&str>>) -> MaterializedFile {
        let schema = Arc::new(Schema::new(vec![
            Field::new("season", DataType::Int64, false),
            Field::new("posteam", DataType::Utf8, true),
            Field::new("epa", DataType::Float64, true),
        ]));
        let len = posteams.len();
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(
                    (0..len).map(|i| 2018 + (i % 2) as i64).collect::<Vec<_>>(),
                )),
                Arc::new(StringArray::from(posteams)),
                Arc::new(Float64Array::from(vec![Some(0.1); len])),
            ],
        )
        .unwrap();
        let table = UnifiedTable::try_new(schema, vec![batch]).unwrap();
        materialize(&table, dir.join("unified.arrow")).unwrap()
    }

    #[test]
    fn escape_round_trip() {
        for raw in ["pass", "a/b", "x=y", "100%", "%2F"] {
            assert_eq!(unescape_value(&escape_value(raw)), raw);
        }
    }

    #[test]
    fn missing_key_fails_before_io() {
        let dir = tempfile::tempdir().unwrap();
        let src = write_sample(dir.path(), vec![Some("KC"), Some("NE")]);

        let dest = dir.path().join("dataset");
        let err =
            write_partitioned(&src, &["down".to_string()], &dest).unwrap_err();
        assert!(matches!(err, StoreError::MissingColumn { .. }));
        assert!(!dest.exists());
    }

    #[test]
    fn null_key_fails_before_io() {
        let dir = tempfile::tempdir().unwrap();
        let src = write_sample(dir.path(), vec![Some("KC"), None]);

        let dest = dir.path().join("dataset");
        let err =
            write_partitioned(&src, &["posteam".to_string()], &dest).unwrap_err();
        assert!(matches!(err, StoreError::NullPartitionKey(_)));
        assert!(!dest.exists());
    }

    #[test]
    fn float_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let src = write_sample(dir.path(), vec![Some("KC")]);

        let err = write_partitioned(&src, &["epa".to_string()], dir.path().join("d")).unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedType { .. }));
    }

    #[test]
    fn one_leaf_per_distinct_key() {
        let dir = tempfile::tempdir().unwrap();
        let src = write_sample(dir.path(), vec![Some("KC"), Some("NE"), Some("KC")]);

        let dest = dir.path().join("dataset");
        let dataset = write_partitioned(&src, &["posteam".to_string()], &dest).unwrap();
        assert_eq!(dataset.leaves().len(), 2);
        assert!(dest.join("posteam=KC").join(LEAF_FILE_NAME).is_file());
        assert!(dest.join("posteam=NE").join(LEAF_FILE_NAME).is_file());
    }
}
