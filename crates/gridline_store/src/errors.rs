use std::path::PathBuf;

use arrow::datatypes::DataType;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Column '{column}' not found in schema ({context})")]
    MissingColumn {
        column: String,
        context: &'static str,
    },

    #[error("Column '{column}' has unsupported type '{datatype}' ({context})")]
    UnsupportedType {
        column: String,
        datatype: DataType,
        context: &'static str,
    },

    #[error("Partition key column '{0}' contains null values")]
    NullPartitionKey(String),

    #[error("At least one partition key column is required")]
    EmptyPartitionKeys,

    #[error("Record batch schema does not match table schema")]
    SchemaMismatch,

    #[error("Invalid dataset layout at '{path}': {reason}")]
    InvalidLayout { path: PathBuf, reason: String },

    #[error("Unknown reducer '{0}'")]
    UnknownReducer(String),

    #[error("Cannot parse '{value}' as {expected}")]
    InvalidValue {
        value: String,
        expected: &'static str,
    },

    #[error("Filter on column '{column}' of type '{datatype}' got incompatible value '{value}'")]
    PredicateType {
        column: String,
        datatype: DataType,
        value: String,
    },

    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
