//! Filter, group, and aggregate over partitioned datasets.
//!
//! Predicates on partition-key columns are consumed by partition pruning;
//! everything else is evaluated per batch with arrow compute kernels.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Array, Int64Array, RecordBatch, Scalar, StringArray,
};
use arrow::compute::kernels::cmp;
use arrow::compute::{and, cast, filter_record_batch};
use arrow::datatypes::{DataType, Schema};
use arrow::ipc::reader::FileReader;
use tracing::debug;

use crate::dataset::PartitionedDataset;
use crate::errors::{Result, StoreError};
use crate::schema::{self, ColumnType};
use crate::table::UnifiedTable;

/// A scalar constant in a filter predicate or a partition key.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int64(i64),
    Float64(f64),
    Utf8(String),
    Boolean(bool),
}

impl Value {
    /// Parse a string into a typed value for the given column type.
    pub fn parse(raw: &str, ctype: ColumnType) -> Result<Self> {
        match ctype {
            ColumnType::Int64 => raw.parse().map(Value::Int64).map_err(|_| {
                StoreError::InvalidValue {
                    value: raw.to_string(),
                    expected: "an Int64",
                }
            }),
            ColumnType::Float64 => raw.parse().map(Value::Float64).map_err(|_| {
                StoreError::InvalidValue {
                    value: raw.to_string(),
                    expected: "a Float64",
                }
            }),
            ColumnType::Boolean => match raw {
                "true" => Ok(Value::Boolean(true)),
                "false" => Ok(Value::Boolean(false)),
                _ => Err(StoreError::InvalidValue {
                    value: raw.to_string(),
                    expected: "a Boolean ('true' or 'false')",
                }),
            },
            ColumnType::Utf8 => Ok(Value::Utf8(raw.to_string())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int64(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::Utf8(v) => write!(f, "{v}"),
            Value::Boolean(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CmpOp {
    /// Whether `left op right` holds. Incomparable values never match.
    pub(crate) fn matches(&self, left: &Value, right: &Value) -> bool {
        let ord = match (left, right) {
            (Value::Int64(a), Value::Int64(b)) => a.partial_cmp(b),
            (Value::Float64(a), Value::Float64(b)) => a.partial_cmp(b),
            (Value::Int64(a), Value::Float64(b)) => (*a as f64).partial_cmp(b),
            (Value::Float64(a), Value::Int64(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Utf8(a), Value::Utf8(b)) => Some(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            _ => None,
        };
        let Some(ord) = ord else { return false };
        match self {
            CmpOp::Eq => ord == Ordering::Equal,
            CmpOp::NotEq => ord != Ordering::Equal,
            CmpOp::Lt => ord == Ordering::Less,
            CmpOp::LtEq => ord != Ordering::Greater,
            CmpOp::Gt => ord == Ordering::Greater,
            CmpOp::GtEq => ord != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: String,
    pub op: CmpOp,
    pub value: Value,
}

/// Reduction applied per group. Every reducer skips nulls; a group with
/// zero non-null inputs yields "no data" rather than a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    MeanSkipMissing,
    Sum,
    Count,
    Min,
    Max,
}

impl Reducer {
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "mean-skip-missing" | "mean" => Ok(Reducer::MeanSkipMissing),
            "sum" => Ok(Reducer::Sum),
            "count" => Ok(Reducer::Count),
            "min" => Ok(Reducer::Min),
            "max" => Ok(Reducer::Max),
            other => Err(StoreError::UnknownReducer(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Reducer::MeanSkipMissing => "mean-skip-missing",
            Reducer::Sum => "sum",
            Reducer::Count => "count",
            Reducer::Min => "min",
            Reducer::Max => "max",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AggregateSpec {
    pub column: String,
    pub reducer: Reducer,
}

#[derive(Debug, Clone)]
pub struct QuerySpec {
    pub filters: Vec<Predicate>,
    pub group_by: String,
    pub aggregate: AggregateSpec,
    /// Sort result rows ascending by group key. Off by default; callers that
    /// do not care about order skip the sort.
    pub ordered: bool,
}

/// A distinct value of the group-by column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GroupKey {
    Int64(i64),
    Utf8(String),
    Boolean(bool),
    Null,
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::Int64(v) => write!(f, "{v}"),
            GroupKey::Utf8(v) => write!(f, "{v}"),
            GroupKey::Boolean(v) => write!(f, "{v}"),
            GroupKey::Null => write!(f, "NULL"),
        }
    }
}

/// One row per distinct group value present after filtering. The aggregate
/// is `None` for groups whose inputs were all missing.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub group_column: String,
    pub rows: Vec<(GroupKey, Option<f64>)>,
}

/// Execute a query over a partitioned dataset.
///
/// Partitions whose directory keys cannot satisfy the filters are skipped
/// without being opened, and only the columns the query touches are read
/// from the surviving leaves.
pub fn execute(dataset: &PartitionedDataset, spec: &QuerySpec) -> Result<QueryResult> {
    validate_spec(spec, dataset.schema())?;

    let leaves = dataset.prune(&spec.filters);
    debug!(
        total = dataset.leaves().len(),
        selected = leaves.len(),
        "pruned partitions"
    );

    // Predicates on key columns are fully consumed by pruning: within a
    // selected leaf every row has the leaf's key values.
    let residual: Vec<&Predicate> = spec
        .filters
        .iter()
        .filter(|p| !dataset.keys().contains(&p.column))
        .collect();

    let projection = projection_for(dataset.schema(), spec, &residual)?;

    let mut groups: HashMap<GroupKey, Accum> = HashMap::new();
    for leaf in leaves {
        let file = File::open(&leaf.path)?;
        let reader = FileReader::try_new(file, Some(projection.clone()))?;
        for batch in reader {
            accumulate_batch(&batch?, spec, &residual, &mut groups)?;
        }
    }

    Ok(finish(spec, groups))
}

/// Execute the same plan over an in-memory table. This is the
/// no-partitioning benchmark variant and the oracle that pruning
/// correctness is checked against.
pub fn execute_table(table: &UnifiedTable, spec: &QuerySpec) -> Result<QueryResult> {
    validate_spec(spec, table.schema())?;

    let residual: Vec<&Predicate> = spec.filters.iter().collect();
    let mut groups: HashMap<GroupKey, Accum> = HashMap::new();
    for batch in table.batches() {
        accumulate_batch(batch, spec, &residual, &mut groups)?;
    }

    Ok(finish(spec, groups))
}

fn validate_spec(spec: &QuerySpec, schema: &Schema) -> Result<()> {
    let gidx = schema::column_index(schema, &spec.group_by, "group by")?;
    let gtype = ColumnType::from_arrow(&spec.group_by, schema.field(gidx).data_type(), "group by")?;
    if gtype == ColumnType::Float64 {
        return Err(StoreError::UnsupportedType {
            column: spec.group_by.clone(),
            datatype: DataType::Float64,
            context: "group by",
        });
    }

    let aidx = schema::column_index(schema, &spec.aggregate.column, "aggregate")?;
    let atype = ColumnType::from_arrow(
        &spec.aggregate.column,
        schema.field(aidx).data_type(),
        "aggregate",
    )?;
    if !matches!(atype, ColumnType::Int64 | ColumnType::Float64) {
        return Err(StoreError::UnsupportedType {
            column: spec.aggregate.column.clone(),
            datatype: schema.field(aidx).data_type().clone(),
            context: "aggregate",
        });
    }

    for pred in &spec.filters {
        let idx = schema::column_index(schema, &pred.column, "filter")?;
        let ctype = ColumnType::from_arrow(&pred.column, schema.field(idx).data_type(), "filter")?;
        let compatible = matches!(
            (ctype, &pred.value),
            (ColumnType::Int64, Value::Int64(_))
                | (ColumnType::Float64, Value::Float64(_))
                | (ColumnType::Utf8, Value::Utf8(_))
                | (ColumnType::Boolean, Value::Boolean(_))
        );
        if !compatible {
            return Err(StoreError::PredicateType {
                column: pred.column.clone(),
                datatype: schema.field(idx).data_type().clone(),
                value: pred.value.to_string(),
            });
        }
    }

    Ok(())
}

/// Indices of the columns the query actually touches, ascending.
fn projection_for(
    schema: &Schema,
    spec: &QuerySpec,
    residual: &[&Predicate],
) -> Result<Vec<usize>> {
    let mut indices = vec![
        schema::column_index(schema, &spec.group_by, "group by")?,
        schema::column_index(schema, &spec.aggregate.column, "aggregate")?,
    ];
    for pred in residual {
        indices.push(schema::column_index(schema, &pred.column, "filter")?);
    }
    indices.sort_unstable();
    indices.dedup();
    Ok(indices)
}

fn accumulate_batch(
    batch: &RecordBatch,
    spec: &QuerySpec,
    residual: &[&Predicate],
    groups: &mut HashMap<GroupKey, Accum>,
) -> Result<()> {
    let batch = apply_filters(batch, residual)?;
    if batch.num_rows() == 0 {
        return Ok(());
    }

    let group = batch
        .column_by_name(&spec.group_by)
        .ok_or_else(|| StoreError::MissingColumn {
            column: spec.group_by.clone(),
            context: "group by",
        })?
        .clone();
    let group = GroupColumn::try_from_array(&group)?;

    let agg = batch
        .column_by_name(&spec.aggregate.column)
        .ok_or_else(|| StoreError::MissingColumn {
            column: spec.aggregate.column.clone(),
            context: "aggregate",
        })?;
    let agg = cast(agg, &DataType::Float64)?;
    let agg = agg
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or(StoreError::SchemaMismatch)?;

    for row in 0..batch.num_rows() {
        let key = group.key_at(row);
        // The group must show up even when every aggregate input is null,
        // so the entry is created before the null check.
        let acc = groups.entry(key).or_default();
        if !agg.is_null(row) {
            acc.update(agg.value(row));
        }
    }

    Ok(())
}

fn apply_filters(batch: &RecordBatch, predicates: &[&Predicate]) -> Result<RecordBatch> {
    if predicates.is_empty() {
        return Ok(batch.clone());
    }
    let mut mask: Option<BooleanArray> = None;
    for pred in predicates {
        let m = predicate_mask(batch, pred)?;
        mask = Some(match mask {
            Some(prev) => and(&prev, &m)?,
            None => m,
        });
    }
    match mask {
        Some(mask) => Ok(filter_record_batch(batch, &mask)?),
        None => Ok(batch.clone()),
    }
}

fn predicate_mask(batch: &RecordBatch, pred: &Predicate) -> Result<BooleanArray> {
    let column = batch
        .column_by_name(&pred.column)
        .ok_or_else(|| StoreError::MissingColumn {
            column: pred.column.clone(),
            context: "filter",
        })?;

    let scalar: ArrayRef = match &pred.value {
        Value::Int64(v) => Arc::new(Int64Array::from(vec![*v])),
        Value::Float64(v) => Arc::new(Float64Array::from(vec![*v])),
        Value::Utf8(v) => Arc::new(StringArray::from(vec![v.clone()])),
        Value::Boolean(v) => Arc::new(BooleanArray::from(vec![*v])),
    };
    let scalar = Scalar::new(scalar);

    let mask = match pred.op {
        CmpOp::Eq => cmp::eq(column, &scalar)?,
        CmpOp::NotEq => cmp::neq(column, &scalar)?,
        CmpOp::Lt => cmp::lt(column, &scalar)?,
        CmpOp::LtEq => cmp::lt_eq(column, &scalar)?,
        CmpOp::Gt => cmp::gt(column, &scalar)?,
        CmpOp::GtEq => cmp::gt_eq(column, &scalar)?,
    };
    Ok(mask)
}

enum GroupColumn<'a> {
    Int64(&'a Int64Array),
    Utf8(&'a StringArray),
    Boolean(&'a BooleanArray),
}

impl<'a> GroupColumn<'a> {
    fn try_from_array(array: &'a ArrayRef) -> Result<Self> {
        match array.data_type() {
            DataType::Int64 => Ok(GroupColumn::Int64(
                array
                    .as_any()
                    .downcast_ref()
                    .ok_or(StoreError::SchemaMismatch)?,
            )),
            DataType::Utf8 => Ok(GroupColumn::Utf8(
                array
                    .as_any()
                    .downcast_ref()
                    .ok_or(StoreError::SchemaMismatch)?,
            )),
            DataType::Boolean => Ok(GroupColumn::Boolean(
                array
                    .as_any()
                    .downcast_ref()
                    .ok_or(StoreError::SchemaMismatch)?,
            )),
            other => Err(StoreError::UnsupportedType {
                column: "group".to_string(),
                datatype: other.clone(),
                context: "group by",
            }),
        }
    }

    fn key_at(&self, row: usize) -> GroupKey {
        match self {
            GroupColumn::Int64(a) if a.is_null(row) => GroupKey::Null,
            GroupColumn::Utf8(a) if a.is_null(row) => GroupKey::Null,
            GroupColumn::Boolean(a) if a.is_null(row) => GroupKey::Null,
            GroupColumn::Int64(a) => GroupKey::Int64(a.value(row)),
            GroupColumn::Utf8(a) => GroupKey::Utf8(a.value(row).to_string()),
            GroupColumn::Boolean(a) => GroupKey::Boolean(a.value(row)),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Accum {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
}

impl Accum {
    fn update(&mut self, v: f64) {
        if self.count == 0 {
            self.min = v;
            self.max = v;
        } else {
            if v < self.min {
                self.min = v;
            }
            if v > self.max {
                self.max = v;
            }
        }
        self.count += 1;
        self.sum += v;
    }

    fn finish(&self, reducer: Reducer) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        Some(match reducer {
            Reducer::MeanSkipMissing => self.sum / self.count as f64,
            Reducer::Sum => self.sum,
            Reducer::Count => self.count as f64,
            Reducer::Min => self.min,
            Reducer::Max => self.max,
        })
    }
}

fn finish(spec: &QuerySpec, groups: HashMap<GroupKey, Accum>) -> QueryResult {
    let mut rows: Vec<(GroupKey, Option<f64>)> = groups
        .into_iter()
        .map(|(key, acc)| (key, acc.finish(spec.aggregate.reducer)))
        .collect();
    if spec.ordered {
        rows.sort_by(|a, b| a.0.cmp(&b.0));
    }
    QueryResult {
        group_column: spec.group_by.clone(),
        rows,
    }
}
