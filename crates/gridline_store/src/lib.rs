//! Columnar storage for seasonal tabular data.
//!
//! Tables are materialized as uncompressed Arrow IPC files, rewritten into
//! hive-style partitioned datasets (`key=value` directory trees), and
//! queried with filter/group/aggregate plans that prune partitions from the
//! directory keys alone.

pub mod dataset;
pub mod errors;
pub mod materialize;
pub mod partition;
pub mod query;
pub mod schema;
pub mod table;
