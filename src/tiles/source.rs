//! Raster tile sources and the fetchers that read them.
//!
//! A [`TileFetcher`] returns raw bytes for one tile or a [`TileFetchError`]
//! saying why it could not. The mosaic treats every error as a missing tile,
//! but keeps the cause for logging.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error as ThisError;

/// A slippy-map tile address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileSource {
    pub key: String,
    pub label: String,
    /// URL with `{z}`, `{x}` and `{y}` placeholders.
    pub url_template: String,
    pub max_zoom: u8,
}

impl TileSource {
    pub fn new(key: &str, label: &str, url_template: &str, max_zoom: u8) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            url_template: url_template.to_string(),
            max_zoom,
        }
    }

    pub fn url(&self, tile: TileCoord) -> String {
        self.url_template
            .replace("{z}", &tile.z.to_string())
            .replace("{x}", &tile.x.to_string())
            .replace("{y}", &tile.y.to_string())
    }
}

static TILE_SOURCES: Lazy<BTreeMap<&'static str, TileSource>> = Lazy::new(|| {
    BTreeMap::from([
        (
            "osm",
            TileSource::new(
                "osm",
                "OpenStreetMap",
                "https://tile.openstreetmap.org/{z}/{x}/{y}.png",
                19,
            ),
        ),
        (
            "esri_satellite",
            TileSource::new(
                "esri_satellite",
                "Esri Satellite",
                "https://server.arcgisonline.com/ArcGIS/rest/services/World_Imagery/MapServer/tile/{z}/{y}/{x}",
                18,
            ),
        ),
    ])
});

/// Looks up a built-in tile source by key.
pub fn tile_source(key: &str) -> Result<&'static TileSource> {
    TILE_SOURCES
        .get(key)
        .ok_or_else(|| Error::UnknownTileSource(key.to_string()))
}

pub fn tile_source_keys() -> impl Iterator<Item = &'static str> {
    TILE_SOURCES.keys().copied()
}

/// Why a single tile could not be used.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum TileFetchError {
    #[error("timed out")]
    Timeout,
    #[error("http status {status}")]
    Http { status: u16 },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("undecodable tile image: {0}")]
    Decode(String),
}

pub trait TileFetcher {
    fn fetch(&self, source: &TileSource, tile: TileCoord) -> Result<Vec<u8>, TileFetchError>;
}

impl<F> TileFetcher for F
where
    F: Fn(&TileSource, TileCoord) -> Result<Vec<u8>, TileFetchError>,
{
    fn fetch(&self, source: &TileSource, tile: TileCoord) -> Result<Vec<u8>, TileFetchError> {
        self(source, tile)
    }
}

#[cfg(feature = "http")]
pub use http::HttpTileFetcher;

#[cfg(feature = "http")]
mod http {
    use super::{TileCoord, TileFetchError, TileFetcher, TileSource};
    use crate::config::TileConfig;
    use crate::error::{Error, Result};
    use reqwest::blocking::Client;
    use std::time::Duration;

    /// Blocking HTTP fetcher; every request is bounded by the configured
    /// timeout.
    #[derive(Debug, Clone)]
    pub struct HttpTileFetcher {
        client: Client,
    }

    impl HttpTileFetcher {
        pub fn from_config(config: &TileConfig) -> Result<Self> {
            let client = Client::builder()
                .timeout(Duration::from_secs(config.fetch_timeout_secs))
                .user_agent(config.user_agent.clone())
                .build()
                .map_err(|e| Error::HttpClient(e.to_string()))?;
            Ok(Self { client })
        }
    }

    impl TileFetcher for HttpTileFetcher {
        fn fetch(&self, source: &TileSource, tile: TileCoord) -> Result<Vec<u8>, TileFetchError> {
            let url = source.url(tile);
            let response = self.client.get(&url).send().map_err(classify)?;
            let status = response.status();
            if !status.is_success() {
                return Err(TileFetchError::Http {
                    status: status.as_u16(),
                });
            }
            let bytes = response.bytes().map_err(classify)?;
            Ok(bytes.to_vec())
        }
    }

    fn classify(err: reqwest::Error) -> TileFetchError {
        if err.is_timeout() {
            TileFetchError::Timeout
        } else {
            TileFetchError::Transport(err.to_string())
        }
    }
}
