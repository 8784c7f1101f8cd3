//! Label anchoring and de-duplication for named features.
//! Pure geometry over clipped pieces; entity emission lives in the assembler.

use super::clip::Piece;
use crate::ir::FeatureKind;
use crate::projection::PlanarPoint;
use std::collections::HashSet;

/// Label height is the shorter view side divided by this.
const LABEL_HEIGHT_DIVISOR: f64 = 80.0;
/// Dedup grid cell edge, in label heights.
const DEDUP_CELL_LABEL_HEIGHTS: f64 = 8.0;
/// Perpendicular displacement of line labels, in label heights.
const LINE_OFFSET_LABEL_HEIGHTS: f64 = 1.0;

/// Identifies a label already placed near a location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LabelKey {
    pub name: String,
    pub cell_x: i64,
    pub cell_y: i64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelPlacement {
    /// Point on the geometry the label belongs to.
    pub anchor: PlanarPoint,
    /// Insertion point of the text, after any offset.
    pub position: PlanarPoint,
    /// Rotation in degrees, within (-90, 90].
    pub angle: f64,
}

/// Places at most one label per [`LabelKey`] for the lifetime of a render.
#[derive(Debug, Clone)]
pub struct LabelPlacer {
    label_height: f64,
    grid_size: f64,
    placed: HashSet<LabelKey>,
}

impl LabelPlacer {
    pub fn new(label_height: f64) -> Self {
        Self {
            label_height,
            grid_size: label_height * DEDUP_CELL_LABEL_HEIGHTS,
            placed: HashSet::new(),
        }
    }

    /// Placer sized for a view of the given extent in drawing units.
    pub fn for_view(view_width: f64, view_height: f64) -> Self {
        Self::new(view_width.abs().min(view_height.abs()) / LABEL_HEIGHT_DIVISOR)
    }

    pub fn label_height(&self) -> f64 {
        self.label_height
    }

    pub fn grid_size(&self) -> f64 {
        self.grid_size
    }

    pub fn placed_count(&self) -> usize {
        self.placed.len()
    }

    /// Picks an anchor for `name` over the clipped `pieces`. Returns `None`
    /// when there is nothing to anchor to or a label with the same name
    /// already sits in the anchor's grid cell.
    pub fn place(
        &mut self,
        name: &str,
        kind: FeatureKind,
        pieces: &[Piece],
    ) -> Option<LabelPlacement> {
        let (anchor, angle) = anchor_for(kind, pieces)?;
        let key = self.key_for(name, anchor);
        if !self.placed.insert(key) {
            tracing::debug!(name, x = anchor.0, y = anchor.1, "duplicate label suppressed");
            return None;
        }
        let position = match kind {
            FeatureKind::Line => offset_perpendicular(
                anchor,
                angle,
                self.label_height * LINE_OFFSET_LABEL_HEIGHTS,
            ),
            FeatureKind::Area => anchor,
        };
        Some(LabelPlacement {
            anchor,
            position,
            angle,
        })
    }

    pub fn key_for(&self, name: &str, anchor: PlanarPoint) -> LabelKey {
        let cell = |v: f64| {
            if self.grid_size > 0.0 {
                (v / self.grid_size).floor() as i64
            } else {
                0
            }
        };
        LabelKey {
            name: name.to_string(),
            cell_x: cell(anchor.0),
            cell_y: cell(anchor.1),
        }
    }
}

/// Anchor point and rotation for a feature's pieces. Lines anchor at the
/// middle of their longest piece; areas at the vertex mean of their first
/// ring, unrotated.
pub fn anchor_for(kind: FeatureKind, pieces: &[Piece]) -> Option<(PlanarPoint, f64)> {
    match kind {
        FeatureKind::Line => {
            let piece = longest_piece(pieces)?;
            midpoint_and_angle(piece)
        }
        FeatureKind::Area => {
            let ring = pieces.first()?;
            vertex_mean(ring).map(|center| (center, 0.0))
        }
    }
}

pub fn path_length(points: &[PlanarPoint]) -> f64 {
    points
        .windows(2)
        .map(|pair| segment_length(pair[0], pair[1]))
        .sum()
}

/// Longest piece by path length; the first one wins ties.
pub fn longest_piece(pieces: &[Piece]) -> Option<&Piece> {
    let mut best: Option<(&Piece, f64)> = None;
    for piece in pieces {
        let len = path_length(piece);
        match best {
            Some((_, best_len)) if len <= best_len => {}
            _ => best = Some((piece, len)),
        }
    }
    best.map(|(piece, _)| piece)
}

/// Point halfway along the path plus the angle of the segment it falls on.
/// Paths without length fall back to the chord from first to last point.
pub fn midpoint_and_angle(points: &[PlanarPoint]) -> Option<(PlanarPoint, f64)> {
    let first = *points.first()?;
    let last = *points.last()?;
    let half = path_length(points) / 2.0;

    let mut accum = 0.0;
    for pair in points.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let seg = segment_length(a, b);
        if seg > 0.0 && accum + seg >= half {
            let t = (half - accum) / seg;
            let point = (a.0 + t * (b.0 - a.0), a.1 + t * (b.1 - a.1));
            return Some((point, readable_angle(a, b)));
        }
        accum += seg;
    }

    let point = ((first.0 + last.0) / 2.0, (first.1 + last.1) / 2.0);
    Some((point, readable_angle(first, last)))
}

/// Arithmetic mean of the ring's vertices. Biased toward vertex-dense
/// stretches; not an area centroid.
pub fn vertex_mean(points: &[PlanarPoint]) -> Option<PlanarPoint> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.0, sy + p.1));
    Some((sx / n, sy / n))
}

/// Direction of `a -> b` in degrees, folded into (-90, 90] so text never
/// reads upside down.
fn readable_angle(a: PlanarPoint, b: PlanarPoint) -> f64 {
    normalize_angle((b.1 - a.1).atan2(b.0 - a.0).to_degrees())
}

fn normalize_angle(mut degrees: f64) -> f64 {
    while degrees > 90.0 {
        degrees -= 180.0;
    }
    while degrees <= -90.0 {
        degrees += 180.0;
    }
    degrees
}

fn offset_perpendicular(point: PlanarPoint, angle: f64, distance: f64) -> PlanarPoint {
    let perp = (angle + 90.0).to_radians();
    (
        point.0 + distance * perp.cos(),
        point.1 + distance * perp.sin(),
    )
}

fn segment_length(a: PlanarPoint, b: PlanarPoint) -> f64 {
    (b.0 - a.0).hypot(b.1 - a.1)
}
