use crate::ir::Layer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

pub const DEFAULT_MAX_TILES: usize = 100;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_USER_AGENT: &str = "VMAP/1.0 (vicinity map generator)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Feet,
    Meters,
}

/// Which CAD text entity labels are written as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum TextMode {
    #[default]
    Text,
    Mtext,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileConfig {
    /// Upper bound on the number of tiles stitched into one mosaic.
    pub max_tiles: usize,
    pub fetch_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for TileConfig {
    fn default() -> Self {
        Self {
            max_tiles: DEFAULT_MAX_TILES,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub units: Units,
    pub uppercase: bool,
    pub text_mode: TextMode,
    pub layers: BTreeSet<Layer>,
    /// Tile source key for the imagery backdrop, if any.
    pub imagery: Option<String>,
    pub tiles: TileConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            units: Units::Feet,
            uppercase: true,
            text_mode: TextMode::Text,
            layers: BTreeSet::from([Layer::Roads]),
            imagery: None,
            tiles: TileConfig::default(),
        }
    }
}

impl Config {
    pub fn label_text(&self, name: &str) -> String {
        if self.uppercase {
            name.to_uppercase()
        } else {
            name.to_string()
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct TileConfigFile {
    max_tiles: Option<usize>,
    fetch_timeout_secs: Option<u64>,
    user_agent: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    units: Option<Units>,
    uppercase: Option<bool>,
    text_mode: Option<TextMode>,
    layers: Option<Vec<String>>,
    imagery: Option<String>,
    tiles: Option<TileConfigFile>,
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config = Config::default();
    let Some(path) = path else {
        return Ok(config);
    };

    let contents = std::fs::read_to_string(path)?;
    parse_config(config, &contents)
}

fn parse_config(mut config: Config, contents: &str) -> anyhow::Result<Config> {
    let parsed: ConfigFile = serde_json::from_str(contents)?;

    if let Some(v) = parsed.units {
        config.units = v;
    }
    if let Some(v) = parsed.uppercase {
        config.uppercase = v;
    }
    if let Some(v) = parsed.text_mode {
        config.text_mode = v;
    }
    if let Some(layers) = parsed.layers {
        if layers.is_empty() {
            anyhow::bail!("layers must be a non-empty list");
        }
        config.layers = layers
            .iter()
            .map(|name| name.parse::<Layer>())
            .collect::<Result<_, _>>()?;
    }
    if let Some(v) = parsed.imagery {
        // "none" mirrors the request form's explicit opt-out.
        config.imagery = (v != "none").then_some(v);
    }

    if let Some(tiles) = parsed.tiles {
        if let Some(v) = tiles.max_tiles {
            config.tiles.max_tiles = v.max(1);
        }
        if let Some(v) = tiles.fetch_timeout_secs {
            config.tiles.fetch_timeout_secs = v;
        }
        if let Some(v) = tiles.user_agent {
            config.tiles.user_agent = v;
        }
    }

    Ok(config)
}
