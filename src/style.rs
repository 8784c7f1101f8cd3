use crate::ir::Layer;
use serde::{Deserialize, Serialize};

pub const BORDER_LAYER: &str = "VICINITY-BORDER";
pub const IMAGE_LAYER: &str = "VICINITY-IMAGE";

pub const BORDER_STYLE: Style = Style::new(50, 7);

/// Stroke weight in hundredths of a millimetre plus an AutoCAD Color Index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Style {
    pub stroke_weight: u16,
    pub color: u8,
}

impl Style {
    pub const fn new(stroke_weight: u16, color: u8) -> Self {
        Self {
            stroke_weight,
            color,
        }
    }
}

/// Keyed by highway class; weight drops with road class.
const ROAD_STYLES: [(&str, Style); 12] = [
    ("motorway", Style::new(80, 1)),
    ("motorway_link", Style::new(70, 1)),
    ("trunk", Style::new(80, 1)),
    ("trunk_link", Style::new(70, 1)),
    ("primary", Style::new(60, 3)),
    ("primary_link", Style::new(50, 3)),
    ("secondary", Style::new(45, 5)),
    ("secondary_link", Style::new(40, 5)),
    ("tertiary", Style::new(35, 4)),
    ("tertiary_link", Style::new(30, 4)),
    ("residential", Style::new(20, 7)),
    ("unclassified", Style::new(15, 8)),
];

pub const DEFAULT_ROAD_STYLE: Style = Style::new(15, 8);

pub fn road_style(category: &str) -> Style {
    ROAD_STYLES
        .iter()
        .find(|(name, _)| *name == category)
        .map(|(_, style)| *style)
        .unwrap_or(DEFAULT_ROAD_STYLE)
}

/// Uniform style for a non-road layer. Roads go through [`road_style`].
pub fn layer_style(layer: Layer) -> Style {
    match layer {
        Layer::Roads => DEFAULT_ROAD_STYLE,
        Layer::Buildings => Style::new(13, 8),
        Layer::Water => Style::new(25, 5),
        Layer::Railways => Style::new(30, 1),
        Layer::Paths => Style::new(10, 3),
        Layer::PowerLines => Style::new(15, 6),
        Layer::Landuse => Style::new(10, 4),
        Layer::Parking => Style::new(10, 252),
        Layer::Boundaries => Style::new(18, 2),
    }
}

/// Style for a feature of `category` drawn on `layer`.
pub fn feature_style(layer: Layer, category: &str) -> Style {
    match layer {
        Layer::Roads => road_style(category),
        other => layer_style(other),
    }
}

pub fn is_labelable(layer: Layer) -> bool {
    matches!(
        layer,
        Layer::Roads | Layer::Water | Layer::Railways | Layer::Landuse
    )
}

/// CAD layer name for a feature layer.
pub fn layer_name(layer: Layer) -> &'static str {
    match layer {
        Layer::Roads => "VICINITY-ROADS",
        Layer::Buildings => "VICINITY-BUILDINGS",
        Layer::Water => "VICINITY-WATER",
        Layer::Railways => "VICINITY-RAILWAYS",
        Layer::Paths => "VICINITY-PATHS",
        Layer::PowerLines => "VICINITY-POWER",
        Layer::Landuse => "VICINITY-LANDUSE",
        Layer::Parking => "VICINITY-PARKING",
        Layer::Boundaries => "VICINITY-BOUNDARIES",
    }
}
