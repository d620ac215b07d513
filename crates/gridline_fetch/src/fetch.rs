use std::io::{Cursor, Read};
use std::sync::Arc;
use std::time::Duration;

use arrow::array::RecordBatch;
use arrow::csv::ReaderBuilder;
use arrow::csv::reader::Format;
use arrow::datatypes::{Schema, SchemaRef};
use flate2::read::GzDecoder;
use gridline_store::table::UnifiedTable;
use tracing::info;
use url::Url;

use crate::errors::{FetchError, Result};
use crate::source::{RemoteSource, Season};

/// Fetches per-season resources and concatenates them into one table.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    /// A fetcher with no request timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(None)
    }

    /// The fetch is the only pipeline operation with unbounded external
    /// latency, so the timeout lives here; it applies per request.
    pub fn with_timeout(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(FetchError::Client)?;
        Ok(Fetcher { client })
    }

    /// Fetch every season in order and return the row-wise union.
    ///
    /// All seasons are validated before the first request goes out. The
    /// schema is inferred per season; any season disagreeing with the first
    /// fails the fetch rather than being coerced.
    pub async fn fetch_seasons(
        &self,
        source: &RemoteSource,
        years: &[u16],
    ) -> Result<UnifiedTable> {
        let mut seasons = Vec::with_capacity(years.len());
        for year in years {
            seasons.push(source.season(*year)?);
        }

        let mut schema: Option<SchemaRef> = None;
        let mut first_year = 0u16;
        let mut batches = Vec::new();

        for season in seasons {
            let url = source.url_for(season)?;
            info!(%url, season = season.year(), "fetching season");

            let body = self.get(season, url).await?;
            let raw = maybe_decompress(source, season, &body)?;
            let (season_schema, mut season_batches) = parse_csv(season, &raw)?;

            match &schema {
                None => {
                    schema = Some(season_schema);
                    first_year = season.year();
                }
                Some(expected) => {
                    if season_schema.as_ref() != expected.as_ref() {
                        return Err(FetchError::SchemaMismatch {
                            season: season.year(),
                            first: first_year,
                        });
                    }
                }
            }
            batches.append(&mut season_batches);
        }

        let schema = schema.unwrap_or_else(|| Arc::new(Schema::empty()));
        Ok(UnifiedTable::try_new(schema, batches)?)
    }

    async fn get(&self, season: Season, url: Url) -> Result<Vec<u8>> {
        let res = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| FetchError::Http {
                season: season.year(),
                source,
            })?;

        if !res.status().is_success() {
            return Err(FetchError::Status {
                season: season.year(),
                url: url.to_string(),
                status: res.status(),
            });
        }

        let body = res.bytes().await.map_err(|source| FetchError::Http {
            season: season.year(),
            source,
        })?;
        Ok(body.to_vec())
    }
}

fn maybe_decompress(source: &RemoteSource, season: Season, body: &[u8]) -> Result<Vec<u8>> {
    if !source.extension.is_gzip() {
        return Ok(body.to_vec());
    }
    let mut out = Vec::new();
    GzDecoder::new(body)
        .read_to_end(&mut out)
        .map_err(|err| FetchError::Decompress {
            season: season.year(),
            source: err,
        })?;
    Ok(out)
}

/// Parse one season's CSV bytes with header and inferred schema.
fn parse_csv(season: Season, data: &[u8]) -> Result<(SchemaRef, Vec<RecordBatch>)> {
    let format = Format::default().with_header(true);
    let (schema, _) = format
        .infer_schema(Cursor::new(data), None)
        .map_err(|source| FetchError::Csv {
            season: season.year(),
            source,
        })?;
    let schema = Arc::new(schema);

    let reader = ReaderBuilder::new(schema.clone())
        .with_header(true)
        .build(Cursor::new(data))
        .map_err(|source| FetchError::Csv {
            season: season.year(),
            source,
        })?;
    let batches = reader
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|source| FetchError::Csv {
            season: season.year(),
            source,
        })?;

    Ok((schema, batches))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use arrow::datatypes::DataType;
    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::*;
    use crate::source::{DEFAULT_SEASON_RANGE, ResourceExt};

    const CSV: &str = "season,play_type,posteam,epa\n\
                       2019,pass,KC,0.5\n\
                       2019,run,NE,\n\
                       2019,pass,SEA,-0.2\n";

    fn season(year: u16) -> Season {
        Season::new(year, &DEFAULT_SEASON_RANGE).unwrap()
    }

    #[test]
    fn parses_csv_with_inferred_schema() {
        let (schema, batches) = parse_csv(season(2019), CSV.as_bytes()).unwrap();
        assert_eq!(schema.field(0).name(), "season");
        assert_eq!(schema.field(0).data_type(), &DataType::Int64);
        assert_eq!(schema.field(3).name(), "epa");
        assert_eq!(schema.field(3).data_type(), &DataType::Float64);

        let rows: usize = batches.iter().map(|b| b.num_rows()).sum();
        assert_eq!(rows, 3);
        // The empty epa cell comes through as a null, not a zero.
        assert_eq!(batches[0].column(3).null_count(), 1);
    }

    #[test]
    fn gzip_bodies_are_decompressed() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(CSV.as_bytes()).unwrap();
        let gz = encoder.finish().unwrap();

        let source = RemoteSource::new(
            Url::parse("https://example.com/data/").unwrap(),
            "play_by_play",
            ResourceExt::CsvGz,
        );
        let raw = maybe_decompress(&source, season(2019), &gz).unwrap();
        assert_eq!(raw, CSV.as_bytes());
    }

    #[test]
    fn corrupt_gzip_is_a_decompress_error() {
        let source = RemoteSource::new(
            Url::parse("https://example.com/data/").unwrap(),
            "play_by_play",
            ResourceExt::CsvGz,
        );
        let err = maybe_decompress(&source, season(2019), b"not gzip").unwrap_err();
        assert!(matches!(err, FetchError::Decompress { season: 2019, .. }));
    }

    #[test]
    fn plain_csv_passes_through() {
        let source = RemoteSource::new(
            Url::parse("https://example.com/data/").unwrap(),
            "play_by_play",
            ResourceExt::Csv,
        );
        let raw = maybe_decompress(&source, season(2019), CSV.as_bytes()).unwrap();
        assert_eq!(raw, CSV.as_bytes());
    }
}
