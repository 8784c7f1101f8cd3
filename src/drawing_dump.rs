use crate::config::Units;
use crate::layout::{Drawing, DrawingEntity};
use crate::render::insunits;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

#[derive(Debug, Serialize)]
pub struct DrawingDump {
    pub units: Units,
    pub insunits: u8,
    pub extent: [f64; 4],
    pub label_height: f64,
    pub layers: Vec<LayerDump>,
    pub polylines: Vec<PolylineDump>,
    pub labels: Vec<LabelDump>,
    pub images: Vec<ImageDump>,
}

#[derive(Debug, Serialize)]
pub struct LayerDump {
    pub name: String,
    pub entities: usize,
}

#[derive(Debug, Serialize)]
pub struct PolylineDump {
    pub layer: String,
    pub color: u8,
    pub weight: u16,
    pub points: Vec<[f64; 2]>,
}

#[derive(Debug, Serialize)]
pub struct LabelDump {
    pub layer: String,
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub angle: f64,
    pub height: f64,
    pub mtext: bool,
}

#[derive(Debug, Serialize)]
pub struct ImageDump {
    pub file_name: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub pixels: [u32; 2],
}

impl DrawingDump {
    pub fn from_drawing(drawing: &Drawing) -> Self {
        let mut per_layer: BTreeMap<&str, usize> = BTreeMap::new();
        let mut polylines = Vec::new();
        let mut labels = Vec::new();
        let mut images = Vec::new();

        for entity in &drawing.entities {
            *per_layer.entry(entity.layer()).or_default() += 1;
            match entity {
                DrawingEntity::Polyline(polyline) => polylines.push(PolylineDump {
                    layer: polyline.layer.clone(),
                    color: polyline.color,
                    weight: polyline.weight,
                    points: polyline.points.iter().map(|(x, y)| [*x, *y]).collect(),
                }),
                DrawingEntity::Text(text) => labels.push(LabelDump {
                    layer: text.layer.clone(),
                    text: text.content.clone(),
                    x: text.position.0,
                    y: text.position.1,
                    angle: text.angle,
                    height: text.height,
                    mtext: matches!(text.mode, crate::config::TextMode::Mtext),
                }),
                DrawingEntity::Image(image) => images.push(ImageDump {
                    file_name: image.file_name.clone(),
                    x: image.insert.0,
                    y: image.insert.1,
                    width: image.width,
                    height: image.height,
                    pixels: [image.pixel_width, image.pixel_height],
                }),
            }
        }

        let layers = drawing
            .layers
            .iter()
            .map(|name| LayerDump {
                name: name.clone(),
                entities: per_layer.get(name.as_str()).copied().unwrap_or(0),
            })
            .collect();

        let clip = &drawing.clip;
        DrawingDump {
            units: drawing.units,
            insunits: insunits(drawing.units),
            extent: [clip.min_x, clip.min_y, clip.max_x, clip.max_y],
            label_height: drawing.label_height,
            layers,
            polylines,
            labels,
            images,
        }
    }
}

pub fn drawing_dump_json(drawing: &Drawing) -> anyhow::Result<String> {
    let dump = DrawingDump::from_drawing(drawing);
    Ok(serde_json::to_string_pretty(&dump)?)
}

pub fn write_drawing_dump(path: &Path, drawing: &Drawing) -> anyhow::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let dump = DrawingDump::from_drawing(drawing);
    serde_json::to_writer_pretty(&mut writer, &dump)?;
    writer.flush()?;
    Ok(())
}
