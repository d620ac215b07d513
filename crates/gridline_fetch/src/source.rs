//! Where per-season resources live and how their URLs are built.

use std::ops::RangeInclusive;
use std::str::FromStr;

use url::Url;

use crate::errors::{FetchError, Result};

/// Seasons accepted when the publisher's range is not given explicitly.
pub const DEFAULT_SEASON_RANGE: RangeInclusive<u16> = 1999..=2030;

/// A year validated against the dataset's published range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Season(u16);

impl Season {
    pub fn new(year: u16, published: &RangeInclusive<u16>) -> Result<Self> {
        if published.contains(&year) {
            Ok(Season(year))
        } else {
            Err(FetchError::InvalidSeason(
                year,
                *published.start(),
                *published.end(),
            ))
        }
    }

    pub fn year(&self) -> u16 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceExt {
    Csv,
    CsvGz,
}

impl ResourceExt {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceExt::Csv => "csv",
            ResourceExt::CsvGz => "csv.gz",
        }
    }

    pub fn is_gzip(&self) -> bool {
        matches!(self, ResourceExt::CsvGz)
    }
}

impl FromStr for ResourceExt {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "csv" => Ok(ResourceExt::Csv),
            "csv.gz" => Ok(ResourceExt::CsvGz),
            other => Err(FetchError::UnknownExtension(other.to_string())),
        }
    }
}

/// A remote dataset published one file per season as
/// `<base>/<resource>_<season>.<ext>`.
#[derive(Debug, Clone)]
pub struct RemoteSource {
    pub base_url: Url,
    pub resource_name: String,
    pub extension: ResourceExt,
    pub published: RangeInclusive<u16>,
}

impl RemoteSource {
    pub fn new(base_url: Url, resource_name: impl Into<String>, extension: ResourceExt) -> Self {
        RemoteSource {
            base_url,
            resource_name: resource_name.into(),
            extension,
            published: DEFAULT_SEASON_RANGE,
        }
    }

    pub fn with_published_range(mut self, published: RangeInclusive<u16>) -> Self {
        self.published = published;
        self
    }

    pub fn season(&self, year: u16) -> Result<Season> {
        Season::new(year, &self.published)
    }

    pub fn url_for(&self, season: Season) -> Result<Url> {
        let file = format!(
            "{}_{}.{}",
            self.resource_name,
            season.year(),
            self.extension.as_str()
        );
        // `Url::join` replaces the last path segment unless the base ends
        // with a slash.
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(base.join(&file)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> RemoteSource {
        RemoteSource::new(
            Url::parse("https://example.com/data/releases").unwrap(),
            "play_by_play",
            ResourceExt::CsvGz,
        )
    }

    #[test]
    fn builds_season_urls() {
        let src = source();
        let url = src.url_for(src.season(2019).unwrap()).unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.com/data/releases/play_by_play_2019.csv.gz"
        );
    }

    #[test]
    fn trailing_slash_base_is_equivalent() {
        let mut src = source();
        src.base_url = Url::parse("https://example.com/data/releases/").unwrap();
        let url = src.url_for(src.season(2019).unwrap()).unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.com/data/releases/play_by_play_2019.csv.gz"
        );
    }

    #[test]
    fn season_outside_published_range() {
        let src = source().with_published_range(2001..=2020);
        assert!(src.season(2001).is_ok());
        let err = src.season(2021).unwrap_err();
        assert!(matches!(err, FetchError::InvalidSeason(2021, 2001, 2020)));
    }

    #[test]
    fn extension_parsing() {
        assert_eq!("csv".parse::<ResourceExt>().unwrap(), ResourceExt::Csv);
        assert_eq!("csv.gz".parse::<ResourceExt>().unwrap(), ResourceExt::CsvGz);
        assert!("parquet".parse::<ResourceExt>().is_err());
    }
}
