//! Feature documents: the JSON shape a feature source hands to the renderer.
//!
//! ```json
//! { "roads": [ { "name": "Main St", "category": "primary", "is_area": false,
//!                "coords": [[37.80, -122.49], [37.82, -122.47]] } ] }
//! ```

use crate::error::Result;
use crate::ir::{FeatureKind, FeatureSet, GeoFeature, Layer};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct FeatureRecord {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, alias = "feature_type")]
    category: String,
    #[serde(default)]
    is_area: bool,
    /// `[lat, lon]` pairs.
    coords: Vec<[f64; 2]>,
}

pub fn load_features(path: &Path) -> Result<FeatureSet> {
    let contents = std::fs::read_to_string(path)?;
    parse_features(&contents)
}

/// Parses a feature document. Unknown layer keys are an error; features with
/// fewer than two coordinates are skipped.
pub fn parse_features(contents: &str) -> Result<FeatureSet> {
    let document: BTreeMap<String, Vec<FeatureRecord>> = serde_json::from_str(contents)?;
    let mut set = FeatureSet::new();
    for (key, records) in document {
        let layer: Layer = key.parse()?;
        let mut skipped = 0usize;
        for record in records {
            if record.coords.len() < 2 {
                skipped += 1;
                continue;
            }
            set.push(
                layer,
                GeoFeature {
                    name: record.name,
                    category: record.category,
                    kind: FeatureKind::from_is_area(record.is_area),
                    coords: record.coords.into_iter().map(|[lat, lon]| (lat, lon)).collect(),
                },
            );
        }
        if skipped > 0 {
            tracing::debug!(layer = %layer, skipped, "features without enough coordinates");
        }
    }
    tracing::debug!(total = set.total(), "feature document loaded");
    Ok(set)
}
