pub mod clip;
pub mod label_placement;
pub(crate) mod types;
pub use types::*;

use clip::{ClipRect, Piece, clip_feature};
use label_placement::LabelPlacer;

use crate::config::Config;
use crate::ir::{Bbox, FeatureKind, FeatureSet, GeoFeature, Layer};
use crate::projection::{PlanarPoint, Projector};
use crate::style::{
    BORDER_LAYER, BORDER_STYLE, IMAGE_LAYER, Style, feature_style, is_labelable, layer_name,
};

/// Builds the drawing for `features` inside `bbox`.
///
/// Roads are processed ahead of every other layer so their labels get first
/// claim on anchor cells; the de-duplication set is shared by all layers and
/// lives only for this call. Layers not listed in `config.layers` are
/// ignored even when the feature set carries them.
pub fn compute_drawing(
    features: &FeatureSet,
    bbox: &Bbox,
    config: &Config,
    backdrop: Option<&Backdrop>,
) -> Drawing {
    let projector = Projector::new(bbox, config.units);
    let bl = projector.project(bbox.south, bbox.west);
    let br = projector.project(bbox.south, bbox.east);
    let tr = projector.project(bbox.north, bbox.east);
    let tl = projector.project(bbox.north, bbox.west);
    let clip = ClipRect::from_corners(bl, br, tr, tl);

    let mut layers = vec![BORDER_LAYER.to_string()];
    layers.extend(config.layers.iter().map(|layer| layer_name(*layer).to_string()));

    let mut builder = DrawingBuilder {
        projector,
        clip,
        config,
        placer: LabelPlacer::for_view((tr.0 - bl.0).abs(), (tr.1 - bl.1).abs()),
        entities: Vec::new(),
        dropped: 0,
    };

    if let Some(backdrop) = backdrop {
        layers.push(IMAGE_LAYER.to_string());
        builder.add_backdrop(backdrop);
    }

    builder.add_polyline(BORDER_LAYER, BORDER_STYLE, vec![bl, br, tr, tl, bl]);

    let order = std::iter::once(Layer::Roads).chain(Layer::SECONDARY);
    for layer in order.filter(|layer| config.layers.contains(layer)) {
        for feature in features.get(layer) {
            builder.add_feature(layer, feature);
        }
    }

    tracing::info!(
        entities = builder.entities.len(),
        labels = builder.placer.placed_count(),
        dropped = builder.dropped,
        "drawing assembled"
    );

    Drawing {
        units: config.units,
        layers,
        clip,
        label_height: builder.placer.label_height(),
        entities: builder.entities,
    }
}

struct DrawingBuilder<'a> {
    projector: Projector,
    clip: ClipRect,
    config: &'a Config,
    placer: LabelPlacer,
    entities: Vec<DrawingEntity>,
    dropped: usize,
}

impl DrawingBuilder<'_> {
    fn add_backdrop(&mut self, backdrop: &Backdrop) {
        let bounds = &backdrop.bounds;
        let insert = self.projector.project(bounds.south, bounds.west);
        let top_right = self.projector.project(bounds.north, bounds.east);
        let width = (top_right.0 - insert.0).abs();
        let height = (top_right.1 - insert.1).abs();
        if width <= 0.0 || height <= 0.0 {
            tracing::warn!(file = %backdrop.file_name, "backdrop has no extent, skipping");
            return;
        }
        self.entities.push(DrawingEntity::Image(ImageEntity {
            layer: IMAGE_LAYER.to_string(),
            file_name: backdrop.file_name.clone(),
            insert,
            width,
            height,
            pixel_width: backdrop.pixel_width,
            pixel_height: backdrop.pixel_height,
        }));
    }

    fn add_polyline(&mut self, layer: &str, style: Style, points: Vec<PlanarPoint>) {
        self.entities.push(DrawingEntity::Polyline(PolylineEntity {
            layer: layer.to_string(),
            color: style.color,
            weight: style.stroke_weight,
            points,
        }));
    }

    fn add_feature(&mut self, layer: Layer, feature: &GeoFeature) {
        let points = self.projector.project_all(&feature.coords);
        let min_points = match feature.kind {
            FeatureKind::Line => 2,
            FeatureKind::Area => 3,
        };
        if points.len() < min_points {
            self.dropped += 1;
            return;
        }

        let pieces = clip_feature(&points, feature.kind, &self.clip);
        if pieces.is_empty() {
            self.dropped += 1;
            return;
        }

        let style = feature_style(layer, &feature.category);
        let cad_layer = layer_name(layer);
        for piece in &pieces {
            self.add_polyline(cad_layer, style, piece.clone());
        }

        if is_labelable(layer) {
            if let Some(name) = feature.label_name() {
                self.add_label(cad_layer, style, name, feature.kind, &pieces);
            }
        }
    }

    fn add_label(
        &mut self,
        layer: &str,
        style: Style,
        name: &str,
        kind: FeatureKind,
        pieces: &[Piece],
    ) {
        let Some(label) = self.placer.place(name, kind, pieces) else {
            return;
        };
        self.entities.push(DrawingEntity::Text(TextEntity {
            layer: layer.to_string(),
            content: self.config.label_text(name),
            position: label.position,
            angle: label.angle,
            height: self.placer.label_height(),
            color: style.color,
            mode: self.config.text_mode,
        }));
    }
}
