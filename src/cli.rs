use crate::config::{Config, TextMode, Units, load_config};
use crate::drawing_dump::{drawing_dump_json, write_drawing_dump};
use crate::features::load_features;
use crate::ir::{Bbox, FeatureSet, Layer};
use crate::layout::{Backdrop, compute_drawing};
use crate::render::{render_dxf, write_output};
use crate::tiles::source::tile_source;
use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Largest area drawn without `--no-area-limit`.
pub const MAX_AREA_KM2: f64 = 25.0;

#[derive(Parser, Debug)]
#[command(
    name = "vmap",
    version,
    about = "Vicinity map generator: map features to a scaled CAD drawing"
)]
pub struct Args {
    #[arg(long, allow_hyphen_values = true)]
    pub south: f64,

    #[arg(long, allow_hyphen_values = true)]
    pub west: f64,

    #[arg(long, allow_hyphen_values = true)]
    pub north: f64,

    #[arg(long, allow_hyphen_values = true)]
    pub east: f64,

    /// Feature document (JSON, keyed by layer)
    #[arg(short = 'f', long = "features")]
    pub features: Option<PathBuf>,

    /// Config JSON file
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub units: Option<Units>,

    #[arg(long = "text-mode", value_enum)]
    pub text_mode: Option<TextMode>,

    /// Keep label text in its original case
    #[arg(long = "no-uppercase")]
    pub no_uppercase: bool,

    /// Comma-separated layers to draw (e.g. roads,water)
    #[arg(long, value_delimiter = ',')]
    pub layers: Vec<String>,

    /// Tile source for an imagery backdrop, or 'none'
    #[arg(long)]
    pub imagery: Option<String>,

    /// Output file. Defaults to stdout when omitted.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short = 'e', long = "format", value_enum, default_value = "dxf")]
    pub format: OutputFormat,

    /// Allow areas above the size limit
    #[arg(long = "no-area-limit")]
    pub no_area_limit: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Dxf,
    Json,
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    let config = resolve_config(&args, load_config(args.config.as_deref())?)?;
    let bbox = Bbox::new(args.south, args.west, args.north, args.east);
    bbox.validate()?;
    check_area(&bbox, args.no_area_limit)?;

    let features = match &args.features {
        Some(path) => load_features(path)?,
        None => FeatureSet::new(),
    };
    if features.total() == 0 && config.imagery.is_none() {
        return Err(anyhow::anyhow!("No features to draw and no imagery requested"));
    }

    let backdrop = match &config.imagery {
        Some(key) => {
            let output = ensure_output(&args.output, "imagery")?;
            Some(fetch_backdrop(key, &bbox, &config, &output)?)
        }
        None => None,
    };

    let drawing = compute_drawing(&features, &bbox, &config, backdrop.as_ref());
    match args.format {
        OutputFormat::Dxf => write_output(&render_dxf(&drawing), args.output.as_deref())?,
        OutputFormat::Json => match args.output.as_deref() {
            Some(path) => write_drawing_dump(path, &drawing)?,
            None => println!("{}", drawing_dump_json(&drawing)?),
        },
    }
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("vicinity_map=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Applies command-line overrides on top of the file config.
fn resolve_config(args: &Args, mut config: Config) -> Result<Config> {
    if let Some(units) = args.units {
        config.units = units;
    }
    if let Some(text_mode) = args.text_mode {
        config.text_mode = text_mode;
    }
    if args.no_uppercase {
        config.uppercase = false;
    }
    if !args.layers.is_empty() {
        config.layers = args
            .layers
            .iter()
            .map(|key| key.trim().parse::<Layer>())
            .collect::<Result<BTreeSet<_>, _>>()?;
    }
    if let Some(imagery) = &args.imagery {
        config.imagery = (imagery != "none").then(|| imagery.clone());
    }
    if config.layers.is_empty() {
        return Err(anyhow::anyhow!("At least one layer must be requested"));
    }
    if let Some(key) = &config.imagery {
        tile_source(key)?;
    }
    Ok(config)
}

fn check_area(bbox: &Bbox, no_limit: bool) -> Result<()> {
    let area = bbox.area_km2();
    if !no_limit && area > MAX_AREA_KM2 {
        return Err(anyhow::anyhow!(
            "Selected area ~{:.1} km² exceeds {} km² limit",
            area,
            MAX_AREA_KM2
        ));
    }
    Ok(())
}

fn ensure_output(output: &Option<PathBuf>, what: &str) -> Result<PathBuf> {
    if let Some(path) = output {
        return Ok(path.clone());
    }
    Err(anyhow::anyhow!("Output path required for {} output", what))
}

/// `<stem>_bg.png` next to the drawing.
fn backdrop_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("vicinity");
    let parent = output.parent().unwrap_or_else(|| Path::new("."));
    parent.join(format!("{stem}_bg.png"))
}

#[cfg(feature = "http")]
fn fetch_backdrop(key: &str, bbox: &Bbox, config: &Config, output: &Path) -> Result<Backdrop> {
    use crate::tiles::build_mosaic;
    use crate::tiles::source::HttpTileFetcher;

    let source = tile_source(key)?;
    let fetcher = HttpTileFetcher::from_config(&config.tiles)?;
    let mosaic = build_mosaic(bbox, source, &fetcher, config.tiles.max_tiles)?;
    if mosaic.missing_tiles > 0 {
        tracing::warn!(missing = mosaic.missing_tiles, "backdrop has missing tiles");
    }

    let path = backdrop_path(output);
    std::fs::write(&path, mosaic.encode_png()?)?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    tracing::info!(path = %path.display(), "backdrop written");
    Ok(mosaic.backdrop(&file_name))
}

#[cfg(not(feature = "http"))]
fn fetch_backdrop(_key: &str, _bbox: &Bbox, _config: &Config, _output: &Path) -> Result<Backdrop> {
    Err(anyhow::anyhow!("Imagery requires the `http` feature"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec![
            "vmap", "--south", "37.80", "--west", "-122.49", "--north", "37.82", "--east",
            "-122.47",
        ];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn parses_negative_coordinates() {
        let args = args(&[]);
        assert_eq!(args.west, -122.49);
        assert_eq!(args.format, OutputFormat::Dxf);
    }

    #[test]
    fn overrides_apply_on_top_of_defaults() {
        let args = args(&[
            "--units", "meters", "--text-mode", "mtext", "--no-uppercase", "--layers",
            "roads,water", "--imagery", "osm",
        ]);
        let config = resolve_config(&args, Config::default()).unwrap();
        assert_eq!(config.units, Units::Meters);
        assert_eq!(config.text_mode, TextMode::Mtext);
        assert!(!config.uppercase);
        assert_eq!(config.layers, BTreeSet::from([Layer::Roads, Layer::Water]));
        assert_eq!(config.imagery.as_deref(), Some("osm"));
    }

    #[test]
    fn rejects_unknown_layers_and_sources() {
        assert!(resolve_config(&args(&["--layers", "roads,highways"]), Config::default()).is_err());
        assert!(resolve_config(&args(&["--imagery", "bing"]), Config::default()).is_err());
        let config = resolve_config(&args(&["--imagery", "none"]), Config::default()).unwrap();
        assert!(config.imagery.is_none());
    }

    #[test]
    fn area_limit() {
        let small = Bbox::new(37.80, -122.49, 37.82, -122.47);
        assert!(check_area(&small, false).is_ok());
        let large = Bbox::new(37.0, -123.0, 38.0, -122.0);
        assert!(check_area(&large, false).is_err());
        assert!(check_area(&large, true).is_ok());
    }

    #[test]
    fn backdrop_sits_next_to_output() {
        assert_eq!(
            backdrop_path(Path::new("out/site.dxf")),
            PathBuf::from("out/site_bg.png")
        );
        assert_eq!(backdrop_path(Path::new("site.dxf")), PathBuf::from("site_bg.png"));
    }
}
