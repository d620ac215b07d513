//! Partitioned dataset handle: open, validate, and prune.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use arrow::datatypes::SchemaRef;
use arrow::ipc::reader::FileReader;
use tracing::debug;

use crate::errors::{Result, StoreError};
use crate::partition::unescape_value;
use crate::query::{Predicate, Value};
use crate::schema::{self, ColumnType};

/// One leaf of a partitioned dataset: a data file plus the typed key values
/// derived from its directory path.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionLeaf {
    pub path: PathBuf,
    pub keys: Vec<Value>,
}

/// A directory tree of `key=value` partitions, opened with the layout and
/// leaf schema fully validated so queries never hit schema problems
/// mid-read.
#[derive(Debug)]
pub struct PartitionedDataset {
    root: PathBuf,
    keys: Vec<String>,
    key_types: Vec<ColumnType>,
    schema: SchemaRef,
    leaves: Vec<PartitionLeaf>,
}

impl PartitionedDataset {
    /// Open a dataset rooted at `root`, partitioned by `keys` in order.
    pub fn open(root: impl AsRef<Path>, keys: &[String]) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if keys.is_empty() {
            return Err(StoreError::EmptyPartitionKeys);
        }
        if !root.is_dir() {
            return Err(StoreError::InvalidLayout {
                path: root,
                reason: "dataset root is not a directory".to_string(),
            });
        }

        let mut raw_leaves = Vec::new();
        collect_leaves(&root, keys, 0, &mut Vec::new(), &mut raw_leaves)?;
        if raw_leaves.is_empty() {
            return Err(StoreError::InvalidLayout {
                path: root,
                reason: "dataset contains no data files".to_string(),
            });
        }
        raw_leaves.sort_by(|a, b| a.1.cmp(&b.1));

        let file = File::open(&raw_leaves[0].0)?;
        let reader = FileReader::try_new(file, None)?;
        let schema = reader.schema();
        schema::check_supported(&schema, "dataset open")?;

        let mut key_types = Vec::with_capacity(keys.len());
        for key in keys {
            let idx = schema::column_index(&schema, key, "dataset open")?;
            let ctype =
                ColumnType::from_arrow(key, schema.field(idx).data_type(), "dataset open")?;
            if ctype == ColumnType::Float64 {
                return Err(StoreError::UnsupportedType {
                    column: key.clone(),
                    datatype: schema.field(idx).data_type().clone(),
                    context: "partition key",
                });
            }
            key_types.push(ctype);
        }

        let leaves = raw_leaves
            .into_iter()
            .map(|(path, raw)| {
                let values = raw
                    .iter()
                    .zip(&key_types)
                    .map(|(v, ctype)| Value::parse(v, *ctype))
                    .collect::<Result<Vec<_>>>()?;
                Ok(PartitionLeaf { path, keys: values })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(root = %root.display(), partitions = leaves.len(), "opened dataset");

        Ok(PartitionedDataset {
            root,
            keys: keys.to_vec(),
            key_types,
            schema,
            leaves,
        })
    }

    pub(crate) fn from_parts(
        root: PathBuf,
        keys: Vec<String>,
        key_types: Vec<ColumnType>,
        schema: SchemaRef,
        leaves: Vec<PartitionLeaf>,
    ) -> Self {
        PartitionedDataset {
            root,
            keys,
            key_types,
            schema,
            leaves,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn key_types(&self) -> &[ColumnType] {
        &self.key_types
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn leaves(&self) -> &[PartitionLeaf] {
        &self.leaves
    }

    /// Select the leaves that could satisfy every predicate, judging each
    /// leaf by its directory-derived key values alone. Leaves ruled out here
    /// are never opened.
    pub fn prune<'a>(&'a self, predicates: &[Predicate]) -> Vec<&'a PartitionLeaf> {
        self.leaves
            .iter()
            .filter(|leaf| {
                predicates.iter().all(|pred| {
                    match self.keys.iter().position(|k| k == &pred.column) {
                        Some(pos) => pred.op.matches(&leaf.keys[pos], &pred.value),
                        // Not a key column; the leaf might still match.
                        None => true,
                    }
                })
            })
            .collect()
    }
}

/// Derive the partition key column names from the directory layout by
/// following the first directory chain down to a leaf.
pub fn discover_keys(root: impl AsRef<Path>) -> Result<Vec<String>> {
    let root = root.as_ref();
    let mut keys = Vec::new();
    let mut dir = root.to_path_buf();
    loop {
        let mut next = None;
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                next = Some(path);
                break;
            }
        }
        let Some(path) = next else { break };
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let Some((key, _)) = name.split_once('=') else {
            return Err(StoreError::InvalidLayout {
                path,
                reason: "directory name is not 'key=value'".to_string(),
            });
        };
        keys.push(key.to_string());
        dir = path;
    }
    if keys.is_empty() {
        return Err(StoreError::InvalidLayout {
            path: root.to_path_buf(),
            reason: "no 'key=value' directories found".to_string(),
        });
    }
    Ok(keys)
}

fn collect_leaves(
    dir: &Path,
    keys: &[String],
    depth: usize,
    current: &mut Vec<String>,
    leaves: &mut Vec<(PathBuf, Vec<String>)>,
) -> Result<()> {
    if depth == keys.len() {
        let mut found = false;
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|e| e == "arrow") {
                leaves.push((path, current.clone()));
                found = true;
            }
        }
        if !found {
            return Err(StoreError::InvalidLayout {
                path: dir.to_path_buf(),
                reason: "partition directory holds no data files".to_string(),
            });
        }
        return Ok(());
    }

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            return Err(StoreError::InvalidLayout {
                path,
                reason: format!("expected 'key=value' directories for key '{}'", keys[depth]),
            });
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some((key, value)) = name.split_once('=') else {
            return Err(StoreError::InvalidLayout {
                path,
                reason: "directory name is not 'key=value'".to_string(),
            });
        };
        if key != keys[depth] {
            return Err(StoreError::InvalidLayout {
                path,
                reason: format!(
                    "expected partition key '{}', found '{}'",
                    keys[depth], key
                ),
            });
        }
        current.push(unescape_value(value));
        collect_leaves(&path, keys, depth + 1, current, leaves)?;
        current.pop();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Int64Array, RecordBatch, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};

    use super::*;
    use crate::materialize::materialize;
    use crate::partition::write_partitioned;
    use crate::query::CmpOp;
    use crate::table::UnifiedTable;

    fn sample_dataset(dir: &Path) -> PartitionedDataset {
        let schema = Arc::new(Schema::new(vec![
            Field::new("season", DataType::Int64, false),
            Field::new("play_type", DataType::Utf8, false),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(vec![2018, 2018, 2019, 2019])),
                Arc::new(StringArray::from(vec!["pass", "run", "pass", "run"])),
            ],
        )
        .unwrap();
        let table = UnifiedTable::try_new(schema, vec![batch]).unwrap();
        let src = materialize(&table, dir.join("unified.arrow")).unwrap();
        write_partitioned(
            &src,
            &["season".to_string(), "play_type".to_string()],
            dir.join("dataset"),
        )
        .unwrap()
    }

    #[test]
    fn open_matches_written_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let written = sample_dataset(dir.path());

        let opened = PartitionedDataset::open(
            written.root(),
            &["season".to_string(), "play_type".to_string()],
        )
        .unwrap();
        assert_eq!(opened.leaves(), written.leaves());
        assert_eq!(opened.key_types(), written.key_types());
    }

    #[test]
    fn discover_keys_from_layout() {
        let dir = tempfile::tempdir().unwrap();
        let written = sample_dataset(dir.path());
        let keys = discover_keys(written.root()).unwrap();
        assert_eq!(keys, vec!["season".to_string(), "play_type".to_string()]);
    }

    #[test]
    fn open_rejects_wrong_key_name() {
        let dir = tempfile::tempdir().unwrap();
        let written = sample_dataset(dir.path());
        let err = PartitionedDataset::open(
            written.root(),
            &["play_type".to_string(), "season".to_string()],
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::InvalidLayout { .. }));
    }

    #[test]
    fn open_rejects_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let err = PartitionedDataset::open(dir.path().join("nope"), &["a".to_string()])
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidLayout { .. }));
    }

    #[test]
    fn prune_skips_non_matching_leaves() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = sample_dataset(dir.path());
        assert_eq!(dataset.leaves().len(), 4);

        let selected = dataset.prune(&[
            Predicate {
                column: "season".to_string(),
                op: CmpOp::Eq,
                value: Value::Int64(2019),
            },
            Predicate {
                column: "play_type".to_string(),
                op: CmpOp::Eq,
                value: Value::Utf8("pass".to_string()),
            },
        ]);
        assert_eq!(selected.len(), 1);
        assert_eq!(
            selected[0].keys,
            vec![Value::Int64(2019), Value::Utf8("pass".to_string())]
        );
    }

    #[test]
    fn range_pruning_on_int_keys() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = sample_dataset(dir.path());

        let selected = dataset.prune(&[Predicate {
            column: "season".to_string(),
            op: CmpOp::Gt,
            value: Value::Int64(2018),
        }]);
        assert_eq!(selected.len(), 2);
        assert!(selected.iter().all(|l| l.keys[0] == Value::Int64(2019)));
    }
}
