//! Clipping of projected feature geometry to the drawing window.
//!
//! Open paths are clipped segment by segment against the rectangle, so every
//! vertex that lies inside the window survives untouched and a path that
//! leaves and re-enters the window splits into separate pieces. Closed rings
//! go through a polygon intersection, after self-intersecting rings have
//! been repaired by a self-union.

use crate::ir::FeatureKind;
use crate::projection::PlanarPoint;
use geo::line_intersection::{LineIntersection, line_intersection};
use geo::{Area, BooleanOps, Coord, Line, LineString, MultiPolygon, Polygon, Rect};
use serde::Serialize;

const SNAP_EPSILON: f64 = 1e-9;

/// One contiguous fragment of a clipped feature.
pub type Piece = Vec<PlanarPoint>;

/// Axis-aligned clip window in drawing units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClipRect {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl ClipRect {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x: min_x.min(max_x),
            min_y: min_y.min(max_y),
            max_x: min_x.max(max_x),
            max_y: min_y.max(max_y),
        }
    }

    /// Window spanned by the projected bottom-left, bottom-right, top-right
    /// and top-left corners of the view.
    pub fn from_corners(
        bl: PlanarPoint,
        br: PlanarPoint,
        tr: PlanarPoint,
        tl: PlanarPoint,
    ) -> Self {
        Self::new(
            bl.0.min(tl.0),
            bl.1.min(br.1),
            br.0.max(tr.0),
            tl.1.max(tr.1),
        )
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn contains(&self, point: PlanarPoint) -> bool {
        point.0 >= self.min_x
            && point.0 <= self.max_x
            && point.1 >= self.min_y
            && point.1 <= self.max_y
    }

    /// Clamps into the window and pulls coordinates within rounding noise of
    /// an edge onto that edge.
    fn snap(&self, point: PlanarPoint) -> PlanarPoint {
        let eps = SNAP_EPSILON * self.width().max(self.height()).max(1.0);
        let snap_axis = |v: f64, lo: f64, hi: f64| {
            if (v - lo).abs() <= eps {
                lo
            } else if (v - hi).abs() <= eps {
                hi
            } else {
                v.clamp(lo, hi)
            }
        };
        (
            snap_axis(point.0, self.min_x, self.max_x),
            snap_axis(point.1, self.min_y, self.max_y),
        )
    }

    fn overlaps_extent(&self, points: &[PlanarPoint]) -> bool {
        let (mut lo_x, mut lo_y) = (f64::INFINITY, f64::INFINITY);
        let (mut hi_x, mut hi_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for &(x, y) in points {
            lo_x = lo_x.min(x);
            lo_y = lo_y.min(y);
            hi_x = hi_x.max(x);
            hi_y = hi_y.max(y);
        }
        hi_x >= self.min_x && lo_x <= self.max_x && hi_y >= self.min_y && lo_y <= self.max_y
    }

    fn to_multi_polygon(self) -> MultiPolygon<f64> {
        let rect = Rect::new(
            Coord {
                x: self.min_x,
                y: self.min_y,
            },
            Coord {
                x: self.max_x,
                y: self.max_y,
            },
        );
        MultiPolygon::new(vec![rect.to_polygon()])
    }
}

/// Clips a projected coordinate chain according to its feature kind.
pub fn clip_feature(points: &[PlanarPoint], kind: FeatureKind, rect: &ClipRect) -> Vec<Piece> {
    match kind {
        FeatureKind::Line => clip_line(points, rect),
        FeatureKind::Area => clip_polygon(points, rect),
    }
}

/// Clips an open path. Pieces have at least two points; single-point
/// touches of the window are dropped.
pub fn clip_line(points: &[PlanarPoint], rect: &ClipRect) -> Vec<Piece> {
    if points.len() < 2 || !rect.overlaps_extent(points) {
        return Vec::new();
    }
    if points.iter().all(|p| rect.contains(*p)) {
        return vec![points.to_vec()];
    }

    let mut pieces = Vec::new();
    let mut current: Piece = Vec::new();

    for seg in points.windows(2) {
        let (a, b) = (seg[0], seg[1]);
        let Some((t0, t1)) = clip_segment(a, b, rect) else {
            flush_piece(&mut pieces, &mut current);
            continue;
        };
        let start = if t0 <= 0.0 { a } else { rect.snap(lerp(a, b, t0)) };
        let end = if t1 >= 1.0 { b } else { rect.snap(lerp(a, b, t1)) };

        if t0 > 0.0 || current.is_empty() {
            flush_piece(&mut pieces, &mut current);
            if start == end {
                continue;
            }
            current.push(start);
        }
        if t1 < 1.0 && current.last() == Some(&end) {
            flush_piece(&mut pieces, &mut current);
            continue;
        }
        current.push(end);
        if t1 < 1.0 {
            flush_piece(&mut pieces, &mut current);
        }
    }
    flush_piece(&mut pieces, &mut current);
    pieces
}

/// Clips a closed ring. The ring is closed first if needed; each resulting
/// ring is closed, has at least three distinct vertices and encloses area.
/// Rings that enclose nothing yield no pieces.
pub fn clip_polygon(points: &[PlanarPoint], rect: &ClipRect) -> Vec<Piece> {
    let ring = close_ring(points);
    if is_degenerate_ring(&ring) || !rect.overlaps_extent(&ring) {
        return Vec::new();
    }

    let self_intersecting = ring_self_intersects(&ring);
    if !self_intersecting && ring.iter().all(|p| rect.contains(*p)) {
        return vec![ring];
    }

    let exterior: LineString<f64> = ring.iter().map(|&(x, y)| Coord { x, y }).collect();
    let mut subject = MultiPolygon::new(vec![Polygon::new(exterior, vec![])]);
    if self_intersecting {
        tracing::trace!(vertices = ring.len(), "repairing self-intersecting ring");
        subject = subject.union(&MultiPolygon::<f64>::new(Vec::new()));
    }

    // Boolean ops only ever yield polygons, so edge-exact overlaps cannot
    // leak line fragments into the result.
    subject
        .intersection(&rect.to_multi_polygon())
        .0
        .into_iter()
        .filter_map(|polygon| {
            let coords: Piece = polygon
                .exterior()
                .coords()
                .map(|c| rect.snap((c.x, c.y)))
                .collect();
            (!is_degenerate_ring(&coords)).then_some(coords)
        })
        .collect()
}

/// Appends the first point when the chain does not already end on it.
pub fn close_ring(points: &[PlanarPoint]) -> Vec<PlanarPoint> {
    let mut ring = points.to_vec();
    if let (Some(first), Some(last)) = (ring.first().copied(), ring.last().copied()) {
        if first != last {
            ring.push(first);
        }
    }
    ring
}

/// True for a closed ring with fewer than four coordinates or with no
/// enclosed area, such as a path that doubles back or collinear points.
fn is_degenerate_ring(ring: &[PlanarPoint]) -> bool {
    if ring.len() < 4 {
        return true;
    }
    let (mut lo_x, mut lo_y) = (f64::INFINITY, f64::INFINITY);
    let (mut hi_x, mut hi_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for &(x, y) in ring {
        lo_x = lo_x.min(x);
        lo_y = lo_y.min(y);
        hi_x = hi_x.max(x);
        hi_y = hi_y.max(y);
    }
    let extent = (hi_x - lo_x).hypot(hi_y - lo_y);
    let exterior: LineString<f64> = ring.iter().map(|&(x, y)| Coord { x, y }).collect();
    let area = Polygon::new(exterior, vec![]).unsigned_area();
    area <= SNAP_EPSILON * extent * extent
}

/// Liang-Barsky parameter range of segment `a -> b` inside `rect`, with the
/// boundary counted as inside.
fn clip_segment(a: PlanarPoint, b: PlanarPoint, rect: &ClipRect) -> Option<(f64, f64)> {
    let dx = b.0 - a.0;
    let dy = b.1 - a.1;
    let mut t0 = 0.0f64;
    let mut t1 = 1.0f64;
    let checks = [
        (-dx, a.0 - rect.min_x),
        (dx, rect.max_x - a.0),
        (-dy, a.1 - rect.min_y),
        (dy, rect.max_y - a.1),
    ];
    for (p, q) in checks {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }
    Some((t0, t1))
}

fn lerp(a: PlanarPoint, b: PlanarPoint, t: f64) -> PlanarPoint {
    (a.0 + (b.0 - a.0) * t, a.1 + (b.1 - a.1) * t)
}

fn flush_piece(pieces: &mut Vec<Piece>, current: &mut Piece) {
    let piece = std::mem::take(current);
    if piece.len() >= 2 && piece.iter().any(|p| *p != piece[0]) {
        pieces.push(piece);
    }
}

/// Tests non-adjacent edges of a closed ring for crossings or collinear
/// overlaps.
fn ring_self_intersects(ring: &[PlanarPoint]) -> bool {
    let n = ring.len();
    if n < 4 {
        return false;
    }
    let edges: Vec<Line<f64>> = ring
        .windows(2)
        .map(|w| Line::new(Coord::from(w[0]), Coord::from(w[1])))
        .collect();
    let count = edges.len();

    for i in 0..count {
        for j in (i + 2)..count {
            if i == 0 && j == count - 1 {
                continue;
            }
            let (edge_i, edge_j) = (edges[i], edges[j]);
            match line_intersection(edge_i, edge_j) {
                Some(LineIntersection::SinglePoint { intersection, .. }) => {
                    let at_i = intersection == edge_i.start || intersection == edge_i.end;
                    let at_j = intersection == edge_j.start || intersection == edge_j.end;
                    if !(at_i && at_j) {
                        return true;
                    }
                }
                Some(LineIntersection::Collinear { .. }) => return true,
                None => {}
            }
        }
    }
    false
}
