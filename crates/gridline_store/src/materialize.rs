//! Materialization of in-memory tables as uncompressed Arrow IPC files.
//!
//! Compression is deliberately left off: the materialized file is written
//! once and re-read many times, and decompression cost dominates read time
//! for that access pattern.

use std::fs::File;
use std::path::{Path, PathBuf};

use arrow::datatypes::SchemaRef;
use arrow::ipc::reader::FileReader;
use arrow::ipc::writer::FileWriter;
use tracing::debug;

use crate::errors::{Result, StoreError};
use crate::schema;
use crate::table::UnifiedTable;

/// Handle to a table materialized on disk.
///
/// Immutable within a pipeline run; re-running the pipeline overwrites it.
#[derive(Debug, Clone)]
pub struct MaterializedFile {
    path: PathBuf,
    schema: SchemaRef,
}

impl MaterializedFile {
    /// Open an existing materialized file, reading only the footer schema.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = File::open(&path)?;
        let reader = FileReader::try_new(file, None)?;
        let schema = reader.schema();
        schema::check_supported(&schema, "materialized open")?;
        Ok(MaterializedFile { path, schema })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Read the whole file back into memory.
    pub fn read_all(&self) -> Result<UnifiedTable> {
        self.read(None)
    }

    /// Read a subset of columns by name, skipping the rest on disk.
    pub fn read_columns(&self, columns: &[&str]) -> Result<UnifiedTable> {
        let projection = columns
            .iter()
            .map(|c| schema::column_index(&self.schema, c, "materialized read"))
            .collect::<Result<Vec<_>>>()?;
        self.read(Some(projection))
    }

    fn read(&self, projection: Option<Vec<usize>>) -> Result<UnifiedTable> {
        let file = File::open(&self.path)?;
        let reader = FileReader::try_new(file, projection)?;
        let schema = reader.schema();
        let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
        UnifiedTable::try_new(schema, batches)
    }
}

/// Write a table to `dest` as an uncompressed Arrow IPC file.
///
/// The bytes go to a temporary file in the destination's directory first and
/// are renamed into place, so a failed write never leaves a readable partial
/// file at `dest`.
pub fn materialize(table: &UnifiedTable, dest: impl AsRef<Path>) -> Result<MaterializedFile> {
    let dest = dest.as_ref();
    schema::check_supported(table.schema(), "materialize")?;

    let dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let tmp = tempfile::NamedTempFile::new_in(dir)?;

    let mut writer = FileWriter::try_new(tmp.as_file(), table.schema())?;
    for batch in table.batches() {
        writer.write(batch)?;
    }
    writer.finish()?;
    drop(writer);

    tmp.persist(dest).map_err(|e| StoreError::Io(e.error))?;
    debug!(path = %dest.display(), rows = table.num_rows(), "materialized table");

    Ok(MaterializedFile {
        path: dest.to_path_buf(),
        schema: table.schema().clone(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Float64Array, Int64Array, RecordBatch, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};

    use super::*;

    fn sample_table() -> UnifiedTable {
        let schema = Arc::new(Schema::new(vec![
            Field::new("season", DataType::Int64, false),
            Field::new("posteam", DataType::Utf8, true),
            Field::new("epa", DataType::Float64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(vec![2018, 2018, 2019])),
                Arc::new(StringArray::from(vec![Some("KC"), Some("NE"), None])),
                Arc::new(Float64Array::from(vec![Some(0.5), None, Some(-0.2)])),
            ],
        )
        .unwrap();
        UnifiedTable::try_new(schema, vec![batch]).unwrap()
    }

    #[test]
    fn write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("unified.arrow");

        let table = sample_table();
        let file = materialize(&table, &dest).unwrap();
        assert_eq!(file.schema().as_ref(), table.schema().as_ref());

        let opened = MaterializedFile::open(&dest).unwrap();
        let read = opened.read_all().unwrap();
        assert_eq!(read.num_rows(), 3);
        assert_eq!(read.schema().as_ref(), table.schema().as_ref());
    }

    #[test]
    fn column_pruned_read() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("unified.arrow");
        materialize(&sample_table(), &dest).unwrap();

        let opened = MaterializedFile::open(&dest).unwrap();
        let read = opened.read_columns(&["epa"]).unwrap();
        assert_eq!(read.schema().fields().len(), 1);
        assert_eq!(read.schema().field(0).name(), "epa");
        assert_eq!(read.num_rows(), 3);
    }

    #[test]
    fn missing_parent_dir_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("no-such-dir").join("unified.arrow");
        let err = materialize(&sample_table(), &dest).unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
        assert!(!dest.exists());
    }
}
