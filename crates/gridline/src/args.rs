use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use gridline_fetch::ResourceExt;
use url::Url;

#[derive(Debug, Parser)]
#[command(
    name = "gridline",
    about = "Fetch, materialize, partition, and benchmark seasonal tabular datasets"
)]
pub struct Args {
    /// Enable debug logging.
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Download per-season resources and materialize them into one IPC file.
    Fetch(FetchArgs),
    /// Rewrite a materialized file into a hive-partitioned dataset.
    Partition(PartitionArgs),
    /// Run a grouped aggregate over a partitioned dataset.
    Query(QueryArgs),
    /// Benchmark the full-scan strategy against partition-pruned reads.
    Bench(BenchArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExtArg {
    Csv,
    CsvGz,
}

impl From<ExtArg> for ResourceExt {
    fn from(ext: ExtArg) -> ResourceExt {
        match ext {
            ExtArg::Csv => ResourceExt::Csv,
            ExtArg::CsvGz => ResourceExt::CsvGz,
        }
    }
}

#[derive(Debug, clap::Args)]
pub struct FetchArgs {
    /// Base URL the per-season files are published under.
    #[arg(long)]
    pub base_url: Url,

    /// Resource name; files are expected as `<resource>_<season>.<ext>`.
    #[arg(long, default_value = "play_by_play")]
    pub resource: String,

    #[arg(long, value_enum, default_value_t = ExtArg::CsvGz)]
    pub ext: ExtArg,

    /// Seasons to fetch, e.g. `--seasons 2018,2019`.
    #[arg(long, required = true, value_delimiter = ',')]
    pub seasons: Vec<u16>,

    /// Per-request timeout in seconds. No timeout when omitted.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Destination IPC file.
    #[arg(long)]
    pub output: PathBuf,
}

#[derive(Debug, clap::Args)]
pub struct PartitionArgs {
    /// Materialized IPC file to partition.
    #[arg(long)]
    pub input: PathBuf,

    /// Partition key columns, outermost first.
    #[arg(long, required = true, value_delimiter = ',')]
    pub keys: Vec<String>,

    /// Dataset root directory. Overwritten if it already exists.
    #[arg(long)]
    pub output: PathBuf,
}

#[derive(Debug, clap::Args)]
pub struct QueryArgs {
    /// Partitioned dataset root.
    #[arg(long)]
    pub dataset: PathBuf,

    /// Partition key columns. Discovered from the layout when omitted.
    #[arg(long, value_delimiter = ',')]
    pub keys: Option<Vec<String>>,

    /// Filters like `season=2019` or `epa>0.5`. Repeatable.
    #[arg(long = "filter")]
    pub filters: Vec<String>,

    /// Column whose distinct values form the result groups.
    #[arg(long)]
    pub group_by: String,

    /// Aggregate as `reducer:column`, e.g. `mean-skip-missing:epa`.
    #[arg(long)]
    pub agg: String,

    /// Sort result rows ascending by group key.
    #[arg(long)]
    pub ordered: bool,
}

#[derive(Debug, clap::Args)]
pub struct BenchArgs {
    /// Partitioned dataset root for the pruned variant.
    #[arg(long)]
    pub dataset: PathBuf,

    /// Partition key columns. Discovered from the layout when omitted.
    #[arg(long, value_delimiter = ',')]
    pub keys: Option<Vec<String>>,

    /// Materialized IPC file for the full-scan variant.
    #[arg(long)]
    pub input: PathBuf,

    /// Number of timed repetitions per variant.
    #[arg(long, default_value_t = 5)]
    pub reps: usize,

    /// Filters like `season=2019` or `epa>0.5`. Repeatable.
    #[arg(long = "filter")]
    pub filters: Vec<String>,

    #[arg(long)]
    pub group_by: String,

    /// Aggregate as `reducer:column`, e.g. `mean-skip-missing:epa`.
    #[arg(long)]
    pub agg: String,

    /// Append raw per-repetition samples to a TSV file.
    #[arg(long)]
    pub save: Option<PathBuf>,
}
