use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

const KM_PER_DEGREE: f64 = 111.32;

/// Feature layers a render can request, in the order the feature source
/// lists them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Roads,
    Buildings,
    Water,
    Railways,
    Paths,
    PowerLines,
    Landuse,
    Parking,
    Boundaries,
}

impl Layer {
    pub const ALL: [Layer; 9] = [
        Layer::Roads,
        Layer::Buildings,
        Layer::Water,
        Layer::Railways,
        Layer::Paths,
        Layer::PowerLines,
        Layer::Landuse,
        Layer::Parking,
        Layer::Boundaries,
    ];

    /// Every layer except roads, in drawing order. Roads are drawn first
    /// so their labels claim anchor cells before anything else.
    pub const SECONDARY: [Layer; 8] = [
        Layer::Buildings,
        Layer::Water,
        Layer::Railways,
        Layer::Paths,
        Layer::PowerLines,
        Layer::Landuse,
        Layer::Parking,
        Layer::Boundaries,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Layer::Roads => "roads",
            Layer::Buildings => "buildings",
            Layer::Water => "water",
            Layer::Railways => "railways",
            Layer::Paths => "paths",
            Layer::PowerLines => "power_lines",
            Layer::Landuse => "landuse",
            Layer::Parking => "parking",
            Layer::Boundaries => "boundaries",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Layer {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Layer::ALL
            .iter()
            .copied()
            .find(|layer| layer.key() == s)
            .ok_or_else(|| Error::UnknownLayer(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    /// Open path.
    Line,
    /// Closed ring; the last coordinate repeats the first, or is implied to.
    Area,
}

impl FeatureKind {
    pub fn from_is_area(is_area: bool) -> Self {
        if is_area { Self::Area } else { Self::Line }
    }
}

/// A classified feature as delivered by the feature source. Coordinates are
/// `(lat, lon)` in WGS84 degrees.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoFeature {
    pub name: Option<String>,
    pub category: String,
    pub kind: FeatureKind,
    pub coords: Vec<(f64, f64)>,
}

impl GeoFeature {
    pub fn line(name: Option<&str>, category: &str, coords: Vec<(f64, f64)>) -> Self {
        Self {
            name: name.map(str::to_string),
            category: category.to_string(),
            kind: FeatureKind::Line,
            coords,
        }
    }

    pub fn area(name: Option<&str>, category: &str, coords: Vec<(f64, f64)>) -> Self {
        Self {
            name: name.map(str::to_string),
            category: category.to_string(),
            kind: FeatureKind::Area,
            coords,
        }
    }

    /// Name usable as a label. Blank names count as unnamed.
    pub fn label_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|name| !name.trim().is_empty())
    }
}

/// Features grouped per layer, in source order.
#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    pub layers: BTreeMap<Layer, Vec<GeoFeature>>,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, layer: Layer, feature: GeoFeature) {
        self.layers.entry(layer).or_default().push(feature);
    }

    pub fn get(&self, layer: Layer) -> &[GeoFeature] {
        self.layers.get(&layer).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn total(&self) -> usize {
        self.layers.values().map(Vec::len).sum()
    }
}

/// Geographic rectangle as `(south, west, north, east)` in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bbox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl Bbox {
    pub fn new(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self {
            south,
            west,
            north,
            east,
        }
    }

    /// Checks ordering and WGS84 ranges.
    pub fn validate(&self) -> Result<()> {
        let finite = [self.south, self.west, self.north, self.east]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(Error::InvalidBbox("coordinates must be finite".to_string()));
        }
        if self.south < -90.0 || self.north > 90.0 {
            return Err(Error::InvalidBbox(format!(
                "latitude out of range: {} .. {}",
                self.south, self.north
            )));
        }
        if self.west < -180.0 || self.east > 180.0 {
            return Err(Error::InvalidBbox(format!(
                "longitude out of range: {} .. {}",
                self.west, self.east
            )));
        }
        if self.south >= self.north {
            return Err(Error::InvalidBbox("south must be less than north".to_string()));
        }
        if self.west >= self.east {
            return Err(Error::InvalidBbox("west must be less than east".to_string()));
        }
        Ok(())
    }

    /// Rough area in square kilometres, flat-earth scaled by the mid latitude.
    pub fn area_km2(&self) -> f64 {
        let lat_mid = ((self.south + self.north) / 2.0).to_radians();
        let height_km = (self.north - self.south) * KM_PER_DEGREE;
        let width_km = (self.east - self.west) * KM_PER_DEGREE * lat_mid.cos();
        (height_km * width_km).abs()
    }
}
