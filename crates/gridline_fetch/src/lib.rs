//! Remote fetching of per-season tabular resources.
//!
//! One delimited-text (optionally gzip-compressed) file per season, fetched
//! over HTTP and concatenated into a single in-memory table. Any single
//! season failing fails the whole fetch; there is no partial-result mode.

pub mod errors;
pub mod fetch;
pub mod source;

pub use fetch::Fetcher;
pub use source::{RemoteSource, ResourceExt, Season};
