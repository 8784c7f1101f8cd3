use crate::config::{TextMode, Units};
use crate::ir::Bbox;
use crate::projection::PlanarPoint;
use serde::Serialize;

use super::clip::ClipRect;

#[derive(Debug, Clone, Serialize)]
pub struct PolylineEntity {
    pub layer: String,
    pub color: u8,
    /// Hundredths of a millimetre.
    pub weight: u16,
    pub points: Vec<PlanarPoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextEntity {
    pub layer: String,
    pub content: String,
    /// Middle-centre insertion point.
    pub position: PlanarPoint,
    /// Degrees counter-clockwise from +X.
    pub angle: f64,
    pub height: f64,
    pub color: u8,
    pub mode: TextMode,
}

/// Raster backdrop referenced by file name, anchored at its bottom-left
/// corner.
#[derive(Debug, Clone, Serialize)]
pub struct ImageEntity {
    pub layer: String,
    pub file_name: String,
    pub insert: PlanarPoint,
    pub width: f64,
    pub height: f64,
    pub pixel_width: u32,
    pub pixel_height: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DrawingEntity {
    Polyline(PolylineEntity),
    Text(TextEntity),
    Image(ImageEntity),
}

impl DrawingEntity {
    pub fn layer(&self) -> &str {
        match self {
            DrawingEntity::Polyline(e) => &e.layer,
            DrawingEntity::Text(e) => &e.layer,
            DrawingEntity::Image(e) => &e.layer,
        }
    }
}

/// Georeferenced raster to place underneath the vector content.
#[derive(Debug, Clone)]
pub struct Backdrop {
    pub file_name: String,
    pub bounds: Bbox,
    pub pixel_width: u32,
    pub pixel_height: u32,
}

/// Format-agnostic output of one render. Entities are in draw order.
#[derive(Debug, Clone, Serialize)]
pub struct Drawing {
    pub units: Units,
    pub layers: Vec<String>,
    pub clip: ClipRect,
    pub label_height: f64,
    pub entities: Vec<DrawingEntity>,
}

impl Drawing {
    pub fn polylines(&self) -> impl Iterator<Item = &PolylineEntity> {
        self.entities.iter().filter_map(|entity| match entity {
            DrawingEntity::Polyline(e) => Some(e),
            _ => None,
        })
    }

    pub fn texts(&self) -> impl Iterator<Item = &TextEntity> {
        self.entities.iter().filter_map(|entity| match entity {
            DrawingEntity::Text(e) => Some(e),
            _ => None,
        })
    }

    pub fn images(&self) -> impl Iterator<Item = &ImageEntity> {
        self.entities.iter().filter_map(|entity| match entity {
            DrawingEntity::Image(e) => Some(e),
            _ => None,
        })
    }

    pub fn entities_on<'a>(&'a self, layer: &'a str) -> impl Iterator<Item = &'a DrawingEntity> {
        self.entities.iter().filter(move |entity| entity.layer() == layer)
    }
}
