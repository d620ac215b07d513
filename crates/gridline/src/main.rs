mod args;

use std::time::Duration;

use arrow::datatypes::Schema;
use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets};
use gridline_bench::report::{Report, TsvWriter};
use gridline_bench::Runner;
use gridline_fetch::errors::FetchError;
use gridline_fetch::{Fetcher, RemoteSource};
use gridline_store::dataset::{self, PartitionedDataset};
use gridline_store::errors::StoreError;
use gridline_store::materialize::{MaterializedFile, materialize};
use gridline_store::partition::write_partitioned;
use gridline_store::query::{
    AggregateSpec, CmpOp, Predicate, QueryResult, QuerySpec, Reducer, Value, execute,
    execute_table,
};
use gridline_store::schema::ColumnType;
use tracing::info;

use crate::args::{Args, BenchArgs, Command, FetchArgs, PartitionArgs, QueryArgs};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Invalid(String),
}

type Result<T, E = CliError> = std::result::Result<T, E>;

fn main() {
    let args = Args::parse();
    logutil::init(args.verbose);

    if let Err(err) = run(args) {
        eprintln!("ERROR: {err}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    match args.command {
        Command::Fetch(args) => fetch(args),
        Command::Partition(args) => partition(args),
        Command::Query(args) => query(args),
        Command::Bench(args) => bench(args),
    }
}

fn fetch(args: FetchArgs) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let source = RemoteSource::new(args.base_url, args.resource, args.ext.into());
    let fetcher = Fetcher::with_timeout(args.timeout_secs.map(Duration::from_secs))?;

    let table = runtime.block_on(fetcher.fetch_seasons(&source, &args.seasons))?;
    info!(rows = table.num_rows(), "fetched seasons");

    let file = materialize(&table, &args.output)?;
    println!(
        "materialized {} rows to '{}'",
        table.num_rows(),
        file.path().display()
    );
    Ok(())
}

fn partition(args: PartitionArgs) -> Result<()> {
    let src = MaterializedFile::open(&args.input)?;
    let dataset = write_partitioned(&src, &args.keys, &args.output)?;
    println!(
        "wrote {} partitions under '{}'",
        dataset.leaves().len(),
        dataset.root().display()
    );
    Ok(())
}

fn query(args: QueryArgs) -> Result<()> {
    let dataset = open_dataset(&args.dataset, args.keys.as_deref())?;
    let spec = build_spec(
        &dataset,
        &args.filters,
        args.group_by,
        &args.agg,
        args.ordered,
    )?;

    let result = execute(&dataset, &spec)?;
    print_result(&result, &spec);
    Ok(())
}

fn bench(args: BenchArgs) -> Result<()> {
    let dataset = open_dataset(&args.dataset, args.keys.as_deref())?;
    let unified = MaterializedFile::open(&args.input)?;
    let spec = build_spec(&dataset, &args.filters, args.group_by, &args.agg, false)?;

    let runner = Runner { reps: args.reps };
    let mut report = Report::new();

    // Read the whole file each repetition; the read cost is the point.
    let full = runner.run("full-scan", || {
        let table = unified.read_all()?;
        execute_table(&table, &spec)
    })?;
    report.push(full);

    let pruned = runner.run("partition-pruned", || execute(&dataset, &spec))?;
    report.push(pruned);

    let mut writer = TsvWriter::try_new(args.save)?;
    writer.write_header()?;
    for times in report.variants() {
        writer.write(times)?;
    }
    writer.flush()?;

    println!("{report}");
    Ok(())
}

fn open_dataset(
    root: &std::path::Path,
    keys: Option<&[String]>,
) -> Result<PartitionedDataset> {
    let keys = match keys {
        Some(keys) => keys.to_vec(),
        None => dataset::discover_keys(root)?,
    };
    Ok(PartitionedDataset::open(root, &keys)?)
}

fn build_spec(
    dataset: &PartitionedDataset,
    filters: &[String],
    group_by: String,
    agg: &str,
    ordered: bool,
) -> Result<QuerySpec> {
    let schema = dataset.schema();

    let filters = filters
        .iter()
        .map(|raw| parse_predicate(schema, raw))
        .collect::<Result<Vec<_>>>()?;

    let (reducer, column) = agg.split_once(':').ok_or_else(|| {
        CliError::Invalid(format!(
            "cannot parse aggregate '{agg}', expected 'reducer:column'"
        ))
    })?;

    Ok(QuerySpec {
        filters,
        group_by,
        aggregate: AggregateSpec {
            column: column.to_string(),
            reducer: Reducer::from_name(reducer)?,
        },
        ordered,
    })
}

fn parse_predicate(schema: &Schema, raw: &str) -> Result<Predicate> {
    const OPS: [(&str, CmpOp); 6] = [
        (">=", CmpOp::GtEq),
        ("<=", CmpOp::LtEq),
        ("!=", CmpOp::NotEq),
        ("=", CmpOp::Eq),
        (">", CmpOp::Gt),
        ("<", CmpOp::Lt),
    ];

    for (token, op) in OPS {
        if let Some((column, value)) = raw.split_once(token) {
            let column = column.trim();
            let idx = gridline_store::schema::column_index(schema, column, "filter")?;
            let ctype = ColumnType::from_arrow(column, schema.field(idx).data_type(), "filter")?;
            let value = Value::parse(value.trim(), ctype)?;
            return Ok(Predicate {
                column: column.to_string(),
                op,
                value,
            });
        }
    }

    Err(CliError::Invalid(format!(
        "cannot parse filter '{raw}', expected '<column><op><value>'"
    )))
}

fn print_result(result: &QueryResult, spec: &QuerySpec) {
    let mut table = Table::new();
    table.load_preset(presets::ASCII_MARKDOWN);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        result.group_column.clone(),
        format!("{}({})", spec.aggregate.reducer.name(), spec.aggregate.column),
    ]);

    for (key, value) in &result.rows {
        let value = match value {
            Some(v) => format!("{v:.4}"),
            None => "no data".to_string(),
        };
        table.add_row(vec![key.to_string(), value]);
    }

    println!("{table}");
}
