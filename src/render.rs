use crate::config::{TextMode, Units};
use crate::layout::{Drawing, DrawingEntity, ImageEntity, PolylineEntity, TextEntity};
use anyhow::Result;
use std::fmt::Display;
use std::path::Path;

/// AutoCAD 2000. The oldest release with lineweights and raster images.
pub const DXF_VERSION: &str = "AC1015";

const MODEL_SPACE: &str = "*Model_Space";
const PAPER_SPACE: &str = "*Paper_Space";

/// `$INSUNITS` value for the drawing's unit system.
pub fn insunits(units: Units) -> u8 {
    match units {
        Units::Feet => 2,
        Units::Meters => 6,
    }
}

/// Serializes a drawing as ASCII DXF. Entities are written in draw order.
pub fn render_dxf(drawing: &Drawing) -> String {
    let mut body = DxfWriter::default();
    let images: Vec<&ImageEntity> = drawing.images().collect();

    let root_dict = body.handle();
    let image_dict = (!images.is_empty()).then(|| body.handle());

    if !images.is_empty() {
        body.classes();
    }
    let block_records = body.tables(drawing);
    body.blocks(&block_records);
    let image_defs = body.entities(drawing, &block_records.model_space);
    body.objects(&root_dict, image_dict.as_deref(), &image_defs);

    let mut dxf = String::new();
    section(&mut dxf, "HEADER");
    group(&mut dxf, 9, "$ACADVER");
    group(&mut dxf, 1, DXF_VERSION);
    group(&mut dxf, 9, "$HANDSEED");
    group(&mut dxf, 5, format!("{:X}", body.next_handle));
    group(&mut dxf, 9, "$INSUNITS");
    group(&mut dxf, 70, insunits(drawing.units));
    group(&mut dxf, 9, "$EXTMIN");
    point(&mut dxf, 10, (drawing.clip.min_x, drawing.clip.min_y));
    group(&mut dxf, 9, "$EXTMAX");
    point(&mut dxf, 10, (drawing.clip.max_x, drawing.clip.max_y));
    end_section(&mut dxf);

    dxf.push_str(&body.out);
    group(&mut dxf, 0, "EOF");
    dxf
}

struct BlockRecords {
    model_space: String,
    paper_space: String,
}

/// Body sections plus the handle counter. Handle 0 means "no owner".
struct DxfWriter {
    out: String,
    next_handle: u32,
}

impl Default for DxfWriter {
    fn default() -> Self {
        Self {
            out: String::new(),
            next_handle: 1,
        }
    }
}

impl DxfWriter {
    fn handle(&mut self) -> String {
        let handle = format!("{:X}", self.next_handle);
        self.next_handle += 1;
        handle
    }

    fn classes(&mut self) {
        let out = &mut self.out;
        section(out, "CLASSES");
        for (name, class, proxy_flags, is_entity) in [
            ("IMAGEDEF", "AcDbRasterImageDef", 0, 0),
            ("IMAGE", "AcDbRasterImage", 127, 1),
        ] {
            group(out, 0, "CLASS");
            group(out, 1, name);
            group(out, 2, class);
            group(out, 3, "ISM");
            group(out, 90, proxy_flags);
            group(out, 280, 0);
            group(out, 281, is_entity);
        }
        end_section(out);
    }

    fn tables(&mut self, drawing: &Drawing) -> BlockRecords {
        section(&mut self.out, "TABLES");

        let ltype_table = self.table("LTYPE", 1);
        let handle = self.handle();
        let out = &mut self.out;
        record(out, "LTYPE", &handle, &ltype_table, "AcDbLinetypeTableRecord");
        group(out, 2, "CONTINUOUS");
        group(out, 70, 0);
        group(out, 3, "Solid line");
        group(out, 72, 65);
        group(out, 73, 0);
        group(out, 40, num(0.0));
        group(out, 0, "ENDTAB");

        let names: Vec<&str> = std::iter::once("0")
            .chain(drawing.layers.iter().map(String::as_str))
            .collect();
        let layer_table = self.table("LAYER", names.len());
        for name in names {
            let handle = self.handle();
            let out = &mut self.out;
            record(out, "LAYER", &handle, &layer_table, "AcDbLayerTableRecord");
            group(out, 2, name);
            group(out, 70, 0);
            group(out, 62, 7);
            group(out, 6, "CONTINUOUS");
            group(out, 370, -3);
        }
        group(&mut self.out, 0, "ENDTAB");

        let record_table = self.table("BLOCK_RECORD", 2);
        let block_record = |writer: &mut Self, name: &str| {
            let handle = writer.handle();
            let out = &mut writer.out;
            record(out, "BLOCK_RECORD", &handle, &record_table, "AcDbBlockTableRecord");
            group(out, 2, name);
            handle
        };
        let model_space = block_record(self, MODEL_SPACE);
        let paper_space = block_record(self, PAPER_SPACE);
        group(&mut self.out, 0, "ENDTAB");

        end_section(&mut self.out);
        BlockRecords {
            model_space,
            paper_space,
        }
    }

    fn table(&mut self, name: &str, entries: usize) -> String {
        let handle = self.handle();
        let out = &mut self.out;
        group(out, 0, "TABLE");
        group(out, 2, name);
        group(out, 5, &handle);
        group(out, 330, 0);
        group(out, 100, "AcDbSymbolTable");
        group(out, 70, entries);
        handle
    }

    fn blocks(&mut self, records: &BlockRecords) {
        section(&mut self.out, "BLOCKS");
        for (name, owner, paper) in [
            (MODEL_SPACE, &records.model_space, false),
            (PAPER_SPACE, &records.paper_space, true),
        ] {
            let begin = self.handle();
            let end = self.handle();
            let out = &mut self.out;
            group(out, 0, "BLOCK");
            group(out, 5, &begin);
            group(out, 330, owner);
            group(out, 100, "AcDbEntity");
            if paper {
                group(out, 67, 1);
            }
            group(out, 8, "0");
            group(out, 100, "AcDbBlockBegin");
            group(out, 2, name);
            group(out, 70, 0);
            point(out, 10, (0.0, 0.0));
            group(out, 3, name);
            group(out, 1, "");
            group(out, 0, "ENDBLK");
            group(out, 5, &end);
            group(out, 330, owner);
            group(out, 100, "AcDbEntity");
            if paper {
                group(out, 67, 1);
            }
            group(out, 8, "0");
            group(out, 100, "AcDbBlockEnd");
        }
        end_section(&mut self.out);
    }

    /// Writes the entity section and returns `(handle, image)` for every
    /// image definition the entities reference.
    fn entities<'a>(
        &mut self,
        drawing: &'a Drawing,
        owner: &str,
    ) -> Vec<(String, &'a ImageEntity)> {
        let mut image_defs = Vec::new();
        section(&mut self.out, "ENTITIES");
        for entity in &drawing.entities {
            let handle = self.handle();
            match entity {
                DrawingEntity::Polyline(polyline) => {
                    polyline_dxf(&mut self.out, polyline, &handle, owner)
                }
                DrawingEntity::Text(text) => text_dxf(&mut self.out, text, &handle, owner),
                DrawingEntity::Image(image) => {
                    let def_handle = self.handle();
                    image_dxf(&mut self.out, image, &handle, owner, &def_handle);
                    image_defs.push((def_handle, image));
                }
            }
        }
        end_section(&mut self.out);
        image_defs
    }

    fn objects(
        &mut self,
        root_dict: &str,
        image_dict: Option<&str>,
        image_defs: &[(String, &ImageEntity)],
    ) {
        let out = &mut self.out;
        section(out, "OBJECTS");
        group(out, 0, "DICTIONARY");
        group(out, 5, root_dict);
        group(out, 330, 0);
        group(out, 100, "AcDbDictionary");
        group(out, 281, 1);
        if let Some(image_dict) = image_dict {
            group(out, 3, "ACAD_IMAGE_DICT");
            group(out, 350, image_dict);

            group(out, 0, "DICTIONARY");
            group(out, 5, image_dict);
            group(out, 330, root_dict);
            group(out, 100, "AcDbDictionary");
            group(out, 281, 1);
            for (index, (handle, _)) in image_defs.iter().enumerate() {
                group(out, 3, format!("BACKDROP{index}"));
                group(out, 350, handle);
            }
            for (handle, image) in image_defs {
                group(out, 0, "IMAGEDEF");
                group(out, 5, handle);
                group(out, 330, image_dict);
                group(out, 100, "AcDbRasterImageDef");
                group(out, 90, 0);
                group(out, 1, &image.file_name);
                group(out, 10, num(image.pixel_width.max(1) as f64));
                group(out, 20, num(image.pixel_height.max(1) as f64));
                group(out, 11, num(1.0));
                group(out, 21, num(1.0));
                group(out, 280, 1);
                group(out, 281, 0);
            }
        }
        end_section(out);
    }
}

fn record(out: &mut String, kind: &str, handle: &str, table: &str, subclass: &str) {
    group(out, 0, kind);
    group(out, 5, handle);
    group(out, 330, table);
    group(out, 100, "AcDbSymbolTableRecord");
    group(out, 100, subclass);
}

fn entity_head(out: &mut String, kind: &str, handle: &str, owner: &str, layer: &str) {
    group(out, 0, kind);
    group(out, 5, handle);
    group(out, 330, owner);
    group(out, 100, "AcDbEntity");
    group(out, 8, layer);
}

fn polyline_dxf(out: &mut String, polyline: &PolylineEntity, handle: &str, owner: &str) {
    entity_head(out, "LWPOLYLINE", handle, owner, &polyline.layer);
    group(out, 62, polyline.color);
    group(out, 370, polyline.weight);
    group(out, 100, "AcDbPolyline");
    group(out, 90, polyline.points.len());
    group(out, 70, 0);
    for &(x, y) in &polyline.points {
        group(out, 10, num(x));
        group(out, 20, num(y));
    }
}

fn text_dxf(out: &mut String, text: &TextEntity, handle: &str, owner: &str) {
    let content = single_line(&text.content);
    match text.mode {
        TextMode::Text => {
            entity_head(out, "TEXT", handle, owner, &text.layer);
            group(out, 62, text.color);
            group(out, 100, "AcDbText");
            point(out, 10, text.position);
            group(out, 40, num(text.height));
            group(out, 1, content);
            group(out, 50, num(text.angle));
            // middle-center: the alignment point carries the position
            group(out, 72, 1);
            point(out, 11, text.position);
            group(out, 100, "AcDbText");
            group(out, 73, 2);
        }
        TextMode::Mtext => {
            entity_head(out, "MTEXT", handle, owner, &text.layer);
            group(out, 62, text.color);
            group(out, 100, "AcDbMText");
            point(out, 10, text.position);
            group(out, 40, num(text.height));
            group(out, 71, 5);
            group(out, 1, content);
            group(out, 50, num(text.angle));
        }
    }
}

fn image_dxf(out: &mut String, image: &ImageEntity, handle: &str, owner: &str, def_handle: &str) {
    let pixel_width = image.pixel_width.max(1);
    let pixel_height = image.pixel_height.max(1);
    entity_head(out, "IMAGE", handle, owner, &image.layer);
    group(out, 100, "AcDbRasterImage");
    group(out, 90, 0);
    point(out, 10, image.insert);
    // U and V vectors span one pixel each
    point(out, 11, (image.width / pixel_width as f64, 0.0));
    point(out, 12, (0.0, image.height / pixel_height as f64));
    group(out, 13, pixel_width);
    group(out, 23, pixel_height);
    group(out, 340, def_handle);
    group(out, 70, 1);
    group(out, 280, 0);
}

fn section(out: &mut String, name: &str) {
    group(out, 0, "SECTION");
    group(out, 2, name);
}

fn end_section(out: &mut String) {
    group(out, 0, "ENDSEC");
}

fn group(out: &mut String, code: u16, value: impl Display) {
    out.push_str(&format!("{code:>3}\n{value}\n"));
}

fn point(out: &mut String, code: u16, (x, y): (f64, f64)) {
    group(out, code, num(x));
    group(out, code + 10, num(y));
    group(out, code + 20, num(0.0));
}

fn num(value: f64) -> String {
    let value = if value == 0.0 { 0.0 } else { value };
    format!("{value:.6}")
}

fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

pub fn write_output(contents: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, contents)?;
        }
        None => {
            print!("{}", contents);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::ir::{Bbox, FeatureSet, GeoFeature, Layer};
    use crate::layout::{Backdrop, compute_drawing};
    use std::collections::HashSet;

    fn pairs(dxf: &str) -> Vec<(u16, String)> {
        let lines: Vec<&str> = dxf.lines().collect();
        lines
            .chunks(2)
            .map(|pair| (pair[0].trim().parse().unwrap(), pair[1].to_string()))
            .collect()
    }

    fn count(dxf: &str, code: u16, value: &str) -> usize {
        pairs(dxf)
            .iter()
            .filter(|(c, v)| *c == code && v == value)
            .count()
    }

    fn header_value(dxf: &str, name: &str) -> String {
        let pairs = pairs(dxf);
        let at = pairs
            .iter()
            .position(|(c, v)| *c == 9 && v == name)
            .unwrap();
        pairs[at + 1].1.clone()
    }

    fn sample_drawing(config: &Config, backdrop: Option<&Backdrop>) -> Drawing {
        let bbox = Bbox::new(37.80, -122.49, 37.82, -122.47);
        let mut features = FeatureSet::new();
        features.push(
            Layer::Roads,
            GeoFeature::line(
                Some("Main St"),
                "primary",
                vec![(37.80, -122.49), (37.82, -122.47)],
            ),
        );
        compute_drawing(&features, &bbox, config, backdrop)
    }

    fn sample_backdrop() -> Backdrop {
        Backdrop {
            file_name: "site_bg.png".to_string(),
            bounds: Bbox::new(37.80, -122.49, 37.82, -122.47),
            pixel_width: 400,
            pixel_height: 300,
        }
    }

    #[test]
    fn dxf_is_well_formed_pairs() {
        let dxf = render_dxf(&sample_drawing(&Config::default(), None));
        assert_eq!(dxf.lines().count() % 2, 0);
        let pairs = pairs(&dxf);
        assert_eq!(pairs.last().unwrap(), &(0, "EOF".to_string()));
        assert_eq!(count(&dxf, 0, "SECTION"), count(&dxf, 0, "ENDSEC"));
        assert_eq!(count(&dxf, 0, "TABLE"), count(&dxf, 0, "ENDTAB"));
        assert_eq!(count(&dxf, 0, "BLOCK"), count(&dxf, 0, "ENDBLK"));
    }

    #[test]
    fn version_supports_lineweights_and_images() {
        let dxf = render_dxf(&sample_drawing(&Config::default(), Some(&sample_backdrop())));
        assert_eq!(header_value(&dxf, "$ACADVER"), DXF_VERSION);
        // lineweights (370) and raster images need AutoCAD 2000 or later
        let release: u32 = DXF_VERSION.trim_start_matches("AC").parse().unwrap();
        assert!(release >= 1015);
        assert!(count(&dxf, 0, "IMAGE") == 1 && count(&dxf, 370, "60") == 1);
        assert_eq!(count(&dxf, 2, "CLASSES"), 1);
    }

    #[test]
    fn handles_are_unique_and_references_resolve() {
        let dxf = render_dxf(&sample_drawing(&Config::default(), Some(&sample_backdrop())));
        let pairs = pairs(&dxf);
        let body_start = pairs.iter().position(|(c, v)| *c == 0 && v == "ENDSEC").unwrap();
        let body = &pairs[body_start..];

        let handles: Vec<u32> = body
            .iter()
            .filter(|(c, _)| *c == 5)
            .map(|(_, v)| u32::from_str_radix(v, 16).unwrap())
            .collect();
        let unique: HashSet<u32> = handles.iter().copied().collect();
        assert_eq!(unique.len(), handles.len());

        let seed = u32::from_str_radix(&header_value(&dxf, "$HANDSEED"), 16).unwrap();
        assert!(handles.iter().all(|&h| h > 0 && h < seed));

        for (code, value) in body {
            if matches!(code, 330 | 340 | 350) && value != "0" {
                let target = u32::from_str_radix(value, 16).unwrap();
                assert!(unique.contains(&target), "dangling {code} -> {value}");
            }
        }
    }

    #[test]
    fn dxf_carries_layers_units_and_styles() {
        let dxf = render_dxf(&sample_drawing(&Config::default(), None));
        assert_eq!(header_value(&dxf, "$INSUNITS"), "2");
        assert_eq!(count(&dxf, 2, "VICINITY-BORDER"), 1);
        assert_eq!(count(&dxf, 2, "VICINITY-ROADS"), 1);
        assert_eq!(count(&dxf, 0, "LWPOLYLINE"), 2);
        assert_eq!(count(&dxf, 370, "50"), 1);
        assert_eq!(count(&dxf, 370, "60"), 1);
        assert_eq!(count(&dxf, 0, "TEXT"), 1);
        assert_eq!(count(&dxf, 1, "MAIN ST"), 1);
        assert_eq!(count(&dxf, 73, "2"), 1);
        assert_eq!(count(&dxf, 0, "IMAGE"), 0);
        assert_eq!(count(&dxf, 2, "CLASSES"), 0);
    }

    #[test]
    fn border_vertices_are_listed() {
        let drawing = sample_drawing(&Config::default(), None);
        let dxf = render_dxf(&drawing);
        let border = drawing.polylines().next().unwrap();
        let pairs = pairs(&dxf);
        let at = pairs
            .iter()
            .position(|(c, v)| *c == 0 && v == "LWPOLYLINE")
            .unwrap();
        let count_at = at + pairs[at..].iter().position(|(c, _)| *c == 90).unwrap();
        assert_eq!(pairs[count_at].1, "5");
        let xs: Vec<&str> = pairs[count_at..]
            .iter()
            .take_while(|(c, v)| !(*c == 0 && v == "LWPOLYLINE"))
            .filter(|(c, _)| *c == 10)
            .map(|(_, v)| v.as_str())
            .collect();
        let expected: Vec<String> = border.points.iter().map(|p| num(p.0)).collect();
        assert_eq!(xs, expected);
    }

    #[test]
    fn mtext_mode_and_meters() {
        let config = Config {
            units: Units::Meters,
            text_mode: TextMode::Mtext,
            ..Config::default()
        };
        let dxf = render_dxf(&sample_drawing(&config, None));
        assert_eq!(header_value(&dxf, "$INSUNITS"), "6");
        assert_eq!(count(&dxf, 0, "MTEXT"), 1);
        assert_eq!(count(&dxf, 0, "TEXT"), 0);
        assert_eq!(count(&dxf, 71, "5"), 1);
    }

    #[test]
    fn image_references_its_definition() {
        let dxf = render_dxf(&sample_drawing(&Config::default(), Some(&sample_backdrop())));
        assert_eq!(count(&dxf, 2, "VICINITY-IMAGE"), 1);
        assert_eq!(count(&dxf, 0, "IMAGE"), 1);
        assert_eq!(count(&dxf, 0, "IMAGEDEF"), 1);
        assert_eq!(count(&dxf, 1, "site_bg.png"), 1);
        assert_eq!(count(&dxf, 3, "ACAD_IMAGE_DICT"), 1);

        let pairs = pairs(&dxf);
        let reference = pairs.iter().find(|(c, _)| *c == 340).unwrap();
        let def_at = pairs
            .iter()
            .position(|(c, v)| *c == 0 && v == "IMAGEDEF")
            .unwrap();
        assert_eq!(pairs[def_at + 1], (5, reference.1.clone()));
        assert_eq!(count(&dxf, 13, "400"), 1);
        assert_eq!(count(&dxf, 23, "300"), 1);
    }

    #[test]
    fn multiline_labels_are_flattened() {
        assert_eq!(single_line("A\r\nB"), "A  B");
        assert_eq!(num(-0.0), "0.000000");
    }
}
