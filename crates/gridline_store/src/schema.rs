//! Typed column model checked before any I/O happens.

use arrow::datatypes::{DataType, Schema};

use crate::errors::{Result, StoreError};

/// Column types the pipeline understands.
///
/// Anything outside this set is rejected when a table is materialized or a
/// dataset is opened, so type problems surface before a query runs rather
/// than halfway through a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int64,
    Float64,
    Utf8,
    Boolean,
}

impl ColumnType {
    pub fn from_arrow(column: &str, datatype: &DataType, context: &'static str) -> Result<Self> {
        match datatype {
            DataType::Int64 => Ok(ColumnType::Int64),
            DataType::Float64 => Ok(ColumnType::Float64),
            DataType::Utf8 => Ok(ColumnType::Utf8),
            DataType::Boolean => Ok(ColumnType::Boolean),
            other => Err(StoreError::UnsupportedType {
                column: column.to_string(),
                datatype: other.clone(),
                context,
            }),
        }
    }
}

/// Find a column index by name, with an error naming the caller's context.
pub fn column_index(schema: &Schema, column: &str, context: &'static str) -> Result<usize> {
    schema.index_of(column).map_err(|_| StoreError::MissingColumn {
        column: column.to_string(),
        context,
    })
}

/// Check that every column in the schema has a supported type.
pub fn check_supported(schema: &Schema, context: &'static str) -> Result<()> {
    for field in schema.fields() {
        ColumnType::from_arrow(field.name(), field.data_type(), context)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use arrow::datatypes::Field;

    use super::*;

    #[test]
    fn supported_types() {
        for (dt, expected) in [
            (DataType::Int64, ColumnType::Int64),
            (DataType::Float64, ColumnType::Float64),
            (DataType::Utf8, ColumnType::Utf8),
            (DataType::Boolean, ColumnType::Boolean),
        ] {
            assert_eq!(ColumnType::from_arrow("c", &dt, "test").unwrap(), expected);
        }
    }

    #[test]
    fn unsupported_type() {
        let err = ColumnType::from_arrow("ts", &DataType::Date32, "test").unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedType { .. }));
    }

    #[test]
    fn missing_column() {
        let schema = Schema::new(vec![Field::new("a", DataType::Int64, true)]);
        let err = column_index(&schema, "b", "test").unwrap_err();
        assert!(matches!(err, StoreError::MissingColumn { .. }));
        assert_eq!(column_index(&schema, "a", "test").unwrap(), 0);
    }
}
