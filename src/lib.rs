#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod drawing_dump;
pub mod error;
pub mod features;
pub mod ir;
pub mod layout;
pub mod projection;
pub mod render;
pub mod style;
pub mod tiles;

#[cfg(feature = "cli")]
pub use cli::run;
pub use config::{Config, TextMode, Units, load_config};
pub use error::{Error, Result};
pub use ir::{Bbox, FeatureKind, FeatureSet, GeoFeature, Layer};
pub use layout::{Backdrop, Drawing, compute_drawing};
pub use projection::Projector;
pub use render::render_dxf;
pub use tiles::{Mosaic, build_mosaic};
