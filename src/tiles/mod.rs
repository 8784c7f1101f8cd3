//! Georeferenced raster backdrops stitched from slippy-map tiles.

pub mod source;

use crate::error::Result;
use crate::ir::Bbox;
use crate::layout::Backdrop;
use image::{ImageFormat, RgbImage, imageops};
use source::{TileCoord, TileFetchError, TileFetcher, TileSource};
use std::io::Cursor;

pub const TILE_SIZE: u32 = 256;

/// Tile holding `(lat, lon)` at `zoom`, clamped into the valid index range.
pub fn lat_lon_to_tile(lat: f64, lon: f64, zoom: u8) -> (u32, u32) {
    let max_index = (1u32 << zoom) - 1;
    let (x, y) = slippy_map_tilenames::lonlat2tile(lon, lat, zoom);
    (x.min(max_index), y.min(max_index))
}

/// North-west corner of tile `(x, y)` as `(lat, lon)`.
pub fn tile_to_lat_lon(x: u32, y: u32, zoom: u8) -> (f64, f64) {
    let (lon, lat) = slippy_map_tilenames::tile2lonlat(x, y, zoom);
    (lat, lon)
}

/// Inclusive range of tiles covering a bbox at one zoom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    pub zoom: u8,
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl TileGrid {
    pub fn covering(bbox: &Bbox, zoom: u8) -> Self {
        let (x0, y0) = lat_lon_to_tile(bbox.north, bbox.west, zoom);
        let (x1, y1) = lat_lon_to_tile(bbox.south, bbox.east, zoom);
        Self {
            zoom,
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn columns(&self) -> u32 {
        self.x1 - self.x0 + 1
    }

    pub fn rows(&self) -> u32 {
        self.y1 - self.y0 + 1
    }

    pub fn tile_count(&self) -> usize {
        self.columns() as usize * self.rows() as usize
    }

    pub fn pixel_size(&self) -> (u32, u32) {
        (self.columns() * TILE_SIZE, self.rows() * TILE_SIZE)
    }

    /// Geographic extent of the whole grid, edge to edge.
    pub fn bounds(&self) -> Bbox {
        let (north, west) = tile_to_lat_lon(self.x0, self.y0, self.zoom);
        let (south, east) = tile_to_lat_lon(self.x1 + 1, self.y1 + 1, self.zoom);
        Bbox::new(south, west, north, east)
    }

    /// Tiles in row-major order.
    pub fn tiles(&self) -> impl Iterator<Item = TileCoord> + '_ {
        (self.y0..=self.y1)
            .flat_map(move |y| (self.x0..=self.x1).map(move |x| TileCoord { z: self.zoom, x, y }))
    }
}

/// Highest zoom not above `max_zoom` whose covering grid fits in
/// `max_tiles`. Falls back to zoom 1.
pub fn pick_zoom(bbox: &Bbox, max_zoom: u8, max_tiles: usize) -> u8 {
    (1..=max_zoom)
        .rev()
        .find(|&zoom| TileGrid::covering(bbox, zoom).tile_count() <= max_tiles)
        .unwrap_or(1)
}

/// Pixel rectangle inside a canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropWindow {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

/// Maps `requested` into pixels of a `canvas_width` x `canvas_height` canvas
/// spanning `native`, using a linear pixels-per-degree scale on each axis.
/// Returns `None` when the clamped window is empty.
pub fn crop_window(
    canvas_width: u32,
    canvas_height: u32,
    native: &Bbox,
    requested: &Bbox,
) -> Option<CropWindow> {
    let full_w = canvas_width as f64;
    let full_h = canvas_height as f64;
    let span_x = native.east - native.west;
    let span_y = native.north - native.south;
    if span_x <= 0.0 || span_y <= 0.0 {
        return None;
    }
    let ppd_x = full_w / span_x;
    let ppd_y = full_h / span_y;

    let left = (((requested.west - native.west) * ppd_x) as i64).max(0);
    let right = (((requested.east - native.west) * ppd_x) as i64).min(canvas_width as i64);
    let top = (((native.north - requested.north) * ppd_y) as i64).max(0);
    let bottom = (((native.north - requested.south) * ppd_y) as i64).min(canvas_height as i64);

    if right <= left || bottom <= top {
        return None;
    }
    Some(CropWindow {
        left: left as u32,
        top: top as u32,
        width: (right - left) as u32,
        height: (bottom - top) as u32,
    })
}

#[derive(Debug, Clone)]
pub struct Mosaic {
    pub image: RgbImage,
    /// Exact extent of `image`.
    pub bounds: Bbox,
    pub zoom: u8,
    /// False when the crop was degenerate and the tile-aligned canvas was kept.
    pub cropped: bool,
    pub missing_tiles: usize,
}

impl Mosaic {
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let mut buf = Cursor::new(Vec::new());
        self.image.write_to(&mut buf, ImageFormat::Png)?;
        Ok(buf.into_inner())
    }

    pub fn backdrop(&self, file_name: &str) -> Backdrop {
        Backdrop {
            file_name: file_name.to_string(),
            bounds: self.bounds,
            pixel_width: self.image.width(),
            pixel_height: self.image.height(),
        }
    }
}

/// Fetches, stitches and crops the tiles covering `bbox`. Tiles that fail
/// are left black; only an invalid bbox is an error.
pub fn build_mosaic(
    bbox: &Bbox,
    source: &TileSource,
    fetcher: &dyn TileFetcher,
    max_tiles: usize,
) -> Result<Mosaic> {
    bbox.validate()?;
    let zoom = pick_zoom(bbox, source.max_zoom, max_tiles);
    let grid = TileGrid::covering(bbox, zoom);
    tracing::info!(
        source = %source.key,
        zoom,
        columns = grid.columns(),
        rows = grid.rows(),
        "building tile mosaic"
    );

    let (canvas, missing_tiles) = stitch(&grid, source, fetcher);
    let native = grid.bounds();

    let mosaic = match crop_window(canvas.width(), canvas.height(), &native, bbox) {
        Some(window) => Mosaic {
            image: imageops::crop_imm(&canvas, window.left, window.top, window.width, window.height)
                .to_image(),
            bounds: *bbox,
            zoom,
            cropped: true,
            missing_tiles,
        },
        None => {
            tracing::warn!("degenerate crop window, keeping tile-aligned canvas");
            Mosaic {
                image: canvas,
                bounds: native,
                zoom,
                cropped: false,
                missing_tiles,
            }
        }
    };
    Ok(mosaic)
}

fn stitch(grid: &TileGrid, source: &TileSource, fetcher: &dyn TileFetcher) -> (RgbImage, usize) {
    let (width, height) = grid.pixel_size();
    let mut canvas = RgbImage::new(width, height);
    let mut missing = 0;
    for tile in grid.tiles() {
        match fetch_tile(source, fetcher, tile) {
            Ok(image) => {
                let px = ((tile.x - grid.x0) * TILE_SIZE) as i64;
                let py = ((tile.y - grid.y0) * TILE_SIZE) as i64;
                imageops::replace(&mut canvas, &image, px, py);
            }
            Err(err) => {
                missing += 1;
                tracing::warn!(%tile, error = %err, "tile unavailable");
            }
        }
    }
    (canvas, missing)
}

fn fetch_tile(
    source: &TileSource,
    fetcher: &dyn TileFetcher,
    tile: TileCoord,
) -> Result<RgbImage, TileFetchError> {
    let bytes = fetcher.fetch(source, tile)?;
    let image =
        image::load_from_memory(&bytes).map_err(|e| TileFetchError::Decode(e.to_string()))?;
    Ok(image.to_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use image::Rgb;

    fn png_tile(color: [u8; 3]) -> Vec<u8> {
        let tile = RgbImage::from_pixel(TILE_SIZE, TILE_SIZE, Rgb(color));
        let mut buf = Cursor::new(Vec::new());
        tile.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn presidio() -> Bbox {
        Bbox::new(37.80, -122.49, 37.82, -122.47)
    }

    #[test]
    fn tile_indices_follow_web_mercator() {
        assert_eq!(lat_lon_to_tile(0.0, 0.0, 1), (1, 1));
        assert_eq!(lat_lon_to_tile(37.81, -122.48, 12), (654, 1582));
        // east edge and the mercator pole limit clamp into range
        assert_eq!(lat_lon_to_tile(-89.9, 180.0, 3), (7, 7));
    }

    #[test]
    fn grid_bounds_are_tile_edges() {
        let grid = TileGrid::covering(&presidio(), 12);
        assert_eq!(grid.tile_count(), 1);
        let bounds = grid.bounds();
        assert_approx_eq!(bounds.west, -122.51953125);
        assert_approx_eq!(bounds.east, -122.431640625);
        assert!(bounds.north > 37.82 && bounds.south < 37.80);
    }

    #[test]
    fn chosen_zoom_respects_tile_budget() {
        let boxes = [
            presidio(),
            Bbox::new(-85.0, -180.0, 85.0, 180.0),
            Bbox::new(40.70, -74.02, 40.72, -74.00),
            Bbox::new(51.0, -0.5, 51.9, 0.5),
        ];
        for bbox in boxes {
            let zoom = pick_zoom(&bbox, 19, 100);
            assert!(TileGrid::covering(&bbox, zoom).tile_count() <= 100, "{bbox:?} at {zoom}");
        }
        assert_eq!(pick_zoom(&Bbox::new(-85.0, -180.0, 85.0, 180.0), 19, 100), 3);
    }

    #[test]
    fn smaller_boxes_never_lower_the_zoom() {
        let (lat, lon) = (37.81, -122.48);
        let mut previous = 0;
        for half in [0.5, 0.2, 0.05, 0.01, 0.002, 0.0005] {
            let bbox = Bbox::new(lat - half, lon - half, lat + half, lon + half);
            let zoom = pick_zoom(&bbox, 19, 100);
            assert!(zoom >= previous, "{half}: {zoom} < {previous}");
            previous = zoom;
        }
    }

    #[test]
    fn crop_window_clamps_and_detects_degenerate() {
        let native = Bbox::new(0.0, 0.0, 10.0, 10.0);
        let window = crop_window(100, 100, &native, &Bbox::new(2.0, 1.0, 8.0, 4.0)).unwrap();
        assert_eq!(window, CropWindow { left: 10, top: 20, width: 30, height: 60 });

        let overhang = crop_window(100, 100, &native, &Bbox::new(-5.0, -5.0, 15.0, 15.0)).unwrap();
        assert_eq!(overhang, CropWindow { left: 0, top: 0, width: 100, height: 100 });

        assert!(crop_window(100, 100, &native, &Bbox::new(2.0, 20.0, 8.0, 30.0)).is_none());
        assert!(crop_window(100, 100, &native, &Bbox::new(2.0, 1.0, 2.001, 4.0)).is_none());
    }

    #[test]
    fn mosaic_reports_requested_bounds() {
        let source = TileSource::new("test", "Test", "mem://{z}/{x}/{y}", 12);
        let tile = png_tile([200, 10, 10]);
        let fetcher = move |_: &TileSource, _: TileCoord| -> Result<Vec<u8>, TileFetchError> {
            Ok(tile.clone())
        };

        let bbox = presidio();
        let mosaic = build_mosaic(&bbox, &source, &fetcher, 100).unwrap();
        assert!(mosaic.cropped);
        assert_eq!(mosaic.zoom, 12);
        assert_eq!(mosaic.missing_tiles, 0);
        assert_approx_eq!(mosaic.bounds.south, 37.80);
        assert_approx_eq!(mosaic.bounds.west, -122.49);
        assert_approx_eq!(mosaic.bounds.north, 37.82);
        assert_approx_eq!(mosaic.bounds.east, -122.47);
        assert!(mosaic.image.width() < TILE_SIZE && mosaic.image.width() > 0);
        assert_eq!(mosaic.image.get_pixel(0, 0), &Rgb([200, 10, 10]));

        let backdrop = mosaic.backdrop("site_bg.png");
        assert_eq!(backdrop.pixel_width, mosaic.image.width());
        assert_eq!(backdrop.bounds, bbox);
    }

    #[test]
    fn failed_tiles_leave_black_holes() {
        let source = TileSource::new("test", "Test", "mem://{z}/{x}/{y}", 16);
        let good = png_tile([255, 255, 255]);
        let fetcher = move |_: &TileSource, tile: TileCoord| -> Result<Vec<u8>, TileFetchError> {
            match tile.x % 3 {
                0 => Err(TileFetchError::Timeout),
                1 => Ok(b"not a png".to_vec()),
                _ => Ok(good.clone()),
            }
        };

        let bbox = presidio();
        let zoom = pick_zoom(&bbox, 16, 100);
        let grid = TileGrid::covering(&bbox, zoom);
        let (canvas, missing) = stitch(&grid, &source, &fetcher);
        let expected_missing = grid.tiles().filter(|t| t.x % 3 != 2).count();
        assert_eq!(missing, expected_missing);

        for tile in grid.tiles() {
            let px = (tile.x - grid.x0) * TILE_SIZE + 5;
            let py = (tile.y - grid.y0) * TILE_SIZE + 5;
            let expected = if tile.x % 3 == 2 { Rgb([255, 255, 255]) } else { Rgb([0, 0, 0]) };
            assert_eq!(canvas.get_pixel(px, py), &expected, "{tile}");
        }

        let mosaic = build_mosaic(&bbox, &source, &fetcher, 100).unwrap();
        assert_eq!(mosaic.missing_tiles, expected_missing);
        assert_eq!(mosaic.bounds, bbox);
    }

    #[test]
    fn degenerate_crop_keeps_tile_aligned_canvas() {
        let source = TileSource::new("test", "Test", "mem://{z}/{x}/{y}", 19);
        let tile = png_tile([10, 200, 30]);
        let fetcher = |_: &TileSource, _: TileCoord| -> Result<Vec<u8>, TileFetchError> {
            Ok(tile.clone())
        };
        // narrower than one pixel at zoom 19
        let bbox = Bbox::new(37.81, -122.48, 37.8100001, -122.4799999);
        let mosaic = build_mosaic(&bbox, &source, &fetcher, 100).unwrap();

        assert_eq!(mosaic.zoom, 19);
        assert!(!mosaic.cropped);
        assert_eq!((mosaic.image.width(), mosaic.image.height()), (256, 256));
        assert_eq!(mosaic.bounds, TileGrid::covering(&bbox, 19).bounds());
        assert_eq!(mosaic.missing_tiles, 0);
        assert_eq!(mosaic.backdrop("x_bg.png").pixel_width, 256);
    }

    #[test]
    fn png_encoding_round_trips_dimensions() {
        let mosaic = Mosaic {
            image: RgbImage::new(12, 7),
            bounds: presidio(),
            zoom: 1,
            cropped: false,
            missing_tiles: 0,
        };
        let bytes = mosaic.encode_png().unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (12, 7));
    }

    #[test]
    fn invalid_bbox_is_rejected() {
        let source = TileSource::new("test", "Test", "mem://{z}/{x}/{y}", 12);
        let fetcher = |_: &TileSource, _: TileCoord| -> Result<Vec<u8>, TileFetchError> {
            Err(TileFetchError::Timeout)
        };
        let inverted = Bbox::new(37.82, -122.49, 37.80, -122.47);
        assert!(build_mosaic(&inverted, &source, &fetcher, 100).is_err());
    }
}
