#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Season {0} is outside the published range {1}..={2}")]
    InvalidSeason(u16, u16, u16),

    #[error("Unknown resource extension '{0}', expected 'csv' or 'csv.gz'")]
    UnknownExtension(String),

    #[error("Failed to build http client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Request for season {season} failed: {source}")]
    Http {
        season: u16,
        #[source]
        source: reqwest::Error,
    },

    #[error("Server returned {status} for '{url}' (season {season})")]
    Status {
        season: u16,
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("Failed to decompress resource for season {season}: {source}")]
    Decompress {
        season: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse CSV for season {season}: {source}")]
    Csv {
        season: u16,
        #[source]
        source: arrow::error::ArrowError,
    },

    #[error("Schema for season {season} does not match season {first}")]
    SchemaMismatch { season: u16, first: u16 },

    #[error(transparent)]
    Store(#[from] gridline_store::errors::StoreError),

    #[error(transparent)]
    Url(#[from] url::ParseError),
}

pub type Result<T, E = FetchError> = std::result::Result<T, E>;
