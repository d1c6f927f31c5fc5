//! Drawing layers onto an RGBA canvas

use crate::tileset::TileSource;
use crate::tmx::{Layer, LayerInfo, Map, ObjectGroup, TileLayer};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use mapwatch_core::RenderError;

/// Accumulated offset and opacity of the enclosing layers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub offset_x: f32,
    pub offset_y: f32,
    pub opacity: f32,
}

impl Placement {
    pub const ROOT: Placement = Placement {
        offset_x: 0.0,
        offset_y: 0.0,
        opacity: 1.0,
    };

    /// Placement for the contents of `layer`
    pub fn nested(self, layer: &LayerInfo) -> Self {
        Self {
            offset_x: self.offset_x + layer.offset_x,
            offset_y: self.offset_y + layer.offset_y,
            opacity: self.opacity * layer.opacity.clamp(0.0, 1.0),
        }
    }
}

/// Which rows of a tile object to draw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stratum {
    Whole,
    /// Everything above the bottom map-tile-height rows
    Upper,
    /// The bottom map-tile-height rows
    Lower,
}

pub struct Canvas {
    image: RgbaImage,
    tile_width: u32,
    tile_height: u32,
}

impl Canvas {
    /// Transparent canvas covering the whole map
    pub fn for_map(map: &Map) -> Self {
        Self {
            image: RgbaImage::new(map.pixel_width(), map.pixel_height()),
            tile_width: map.tile_width,
            tile_height: map.tile_height,
        }
    }

    pub fn fill(&mut self, rgba: [u8; 4]) {
        for px in self.image.pixels_mut() {
            *px = Rgba(rgba);
        }
    }

    /// Draw visible `layers` in document order, recursing into groups
    pub fn draw_layers(
        &mut self,
        layers: &[Layer],
        at: Placement,
        tiles: &mut TileSource<'_>,
    ) -> Result<(), RenderError> {
        for layer in layers {
            self.draw_layer(layer, at, tiles)?;
        }
        Ok(())
    }

    pub fn draw_layer(
        &mut self,
        layer: &Layer,
        at: Placement,
        tiles: &mut TileSource<'_>,
    ) -> Result<(), RenderError> {
        if !layer.info().visible {
            return Ok(());
        }
        match layer {
            Layer::Tiles(l) => self.draw_tiles(l, at, tiles),
            Layer::Objects(g) => self.draw_objects(g, at, Stratum::Whole, tiles),
            Layer::Group(g) => self.draw_layers(&g.layers, at.nested(&g.info), tiles),
        }
    }

    /// Draw a tile layer; tiles taller than the grid extend upwards
    pub fn draw_tiles(
        &mut self,
        layer: &TileLayer,
        at: Placement,
        tiles: &mut TileSource<'_>,
    ) -> Result<(), RenderError> {
        let at = at.nested(&layer.info);
        for (col, row, tile) in layer.cells() {
            let Some(pixels) = tiles.tile_image(tile)? else {
                continue;
            };
            let (x, bottom) = cell_anchor(col, row, self.tile_width, self.tile_height);
            let x = x.saturating_add(at.offset_x.round() as i64);
            let bottom = bottom.saturating_add(at.offset_y.round() as i64);
            let top = bottom.saturating_sub(i64::from(pixels.height()));
            self.blit(pixels, x, top, at.opacity);
        }
        Ok(())
    }

    /// Draw the tile objects of `group`, anchored at their bottom-left corner
    pub fn draw_objects(
        &mut self,
        group: &ObjectGroup,
        at: Placement,
        stratum: Stratum,
        tiles: &mut TileSource<'_>,
    ) -> Result<(), RenderError> {
        let at = at.nested(&group.info);
        for object in group.objects.iter().filter(|o| o.visible) {
            let Some(tile) = object.tile else {
                continue;
            };
            let Some(mut pixels) = tiles.tile_image(tile)? else {
                continue;
            };

            let width = size_or(object.width, pixels.width());
            let height = size_or(object.height, pixels.height());
            if width == 0 || height == 0 {
                continue;
            }
            if pixels.dimensions() != (width, height) {
                pixels = imageops::resize(&pixels, width, height, FilterType::Nearest);
            }

            let x = (object.x + at.offset_x).round() as i64;
            let bottom = (object.y + at.offset_y).round() as i64;
            let lower_rows = self.tile_height.min(height);

            let (part, top) = match stratum {
                Stratum::Whole => (pixels, bottom - i64::from(height)),
                Stratum::Lower => (
                    imageops::crop_imm(&pixels, 0, height - lower_rows, width, lower_rows)
                        .to_image(),
                    bottom - i64::from(lower_rows),
                ),
                Stratum::Upper => {
                    let upper_rows = height - lower_rows;
                    if upper_rows == 0 {
                        continue;
                    }
                    (
                        imageops::crop_imm(&pixels, 0, 0, width, upper_rows).to_image(),
                        bottom - i64::from(height),
                    )
                }
            };
            self.blit(part, x, top, at.opacity);
        }
        Ok(())
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Alpha-blend `pixels` with its top-left corner at `(x, y)`
    fn blit(&mut self, mut pixels: RgbaImage, x: i64, y: i64, opacity: f32) {
        if opacity <= 0.0 {
            return;
        }
        if opacity < 1.0 {
            for px in pixels.pixels_mut() {
                px.0[3] = (f32::from(px.0[3]) * opacity).round() as u8;
            }
        }
        imageops::overlay(&mut self.image, &pixels, x, y);
    }
}

/// Left edge and bottom edge of grid cell (`col`, `row`)
fn cell_anchor(col: u32, row: u32, tile_width: u32, tile_height: u32) -> (i64, i64) {
    (
        i64::from(col).saturating_mul(i64::from(tile_width)),
        (i64::from(row) + 1).saturating_mul(i64::from(tile_height)),
    )
}

fn size_or(declared: f32, natural: u32) -> u32 {
    if declared > 0.0 {
        declared.round() as u32
    } else {
        natural
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);
    const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);

    /// 2x3 map of 4px tiles; gid 1 is red, gid 2 is green
    fn load(dir: &Path, body: &str) -> Map {
        let mut sheet = RgbaImage::from_pixel(8, 4, RED);
        for y in 0..4 {
            for x in 4..8 {
                sheet.put_pixel(x, y, GREEN);
            }
        }
        sheet.save(dir.join("sheet.png")).unwrap();

        let text = format!(
            r#"<map orientation="orthogonal" width="2" height="3" tilewidth="4" tileheight="4">
                 <tileset firstgid="1" name="sheet" tilewidth="4" tileheight="4" columns="2">
                   <image source="sheet.png" width="8" height="4"/>
                 </tileset>
                 {body}
               </map>"#
        );
        let path = dir.join("test.tmx");
        fs::write(&path, text).unwrap();
        Map::load(&path).unwrap()
    }

    fn render(map: &Map) -> RgbaImage {
        let mut tiles = TileSource::new(map);
        let mut canvas = Canvas::for_map(map);
        canvas.draw_layers(&map.layers, Placement::ROOT, &mut tiles).unwrap();
        canvas.into_image()
    }

    const TOWER: &str = r#"<objectgroup name="props">
        <object id="1" gid="1" x="0" y="12" width="4" height="12"/>
        <object id="2" x="4" y="4" width="4" height="4"/>
      </objectgroup>"#;

    #[test]
    fn test_tile_layer_cells() {
        let temp_dir = TempDir::new().unwrap();
        let map = load(
            temp_dir.path(),
            r#"<layer name="ground" width="2" height="3"><data encoding="csv">1,0,0,0,0,2</data></layer>"#,
        );
        let image = render(&map);

        assert_eq!(image.dimensions(), (8, 12));
        assert_eq!(*image.get_pixel(0, 0), RED);
        assert_eq!(*image.get_pixel(3, 3), RED);
        assert_eq!(*image.get_pixel(4, 0), CLEAR);
        assert_eq!(*image.get_pixel(7, 11), GREEN);
        assert_eq!(*image.get_pixel(0, 11), CLEAR);
    }

    #[test]
    fn test_invisible_layers_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let map = load(
            temp_dir.path(),
            r#"<layer name="hidden" width="2" height="3" visible="0"><data encoding="csv">1,1,1,1,1,1</data></layer>
               <group name="g" visible="0">
                 <layer name="inner" width="2" height="3"><data encoding="csv">2,2,2,2,2,2</data></layer>
               </group>"#,
        );
        let image = render(&map);
        assert!(image.pixels().all(|p| *p == CLEAR));
    }

    #[test]
    fn test_group_offset_and_opacity_accumulate() {
        let temp_dir = TempDir::new().unwrap();
        let map = load(
            temp_dir.path(),
            r#"<group name="g" offsetx="4" opacity="0.5">
                 <layer name="inner" width="2" height="3"><data encoding="csv">1,0,0,0,0,0</data></layer>
               </group>"#,
        );
        let image = render(&map);

        assert_eq!(*image.get_pixel(0, 0), CLEAR);
        let shifted = image.get_pixel(4, 0);
        assert_eq!(shifted.0[0], 255);
        assert!((120..=135).contains(&shifted.0[3]), "alpha {}", shifted.0[3]);
    }

    #[test]
    fn test_tile_object_is_scaled_and_bottom_anchored() {
        let temp_dir = TempDir::new().unwrap();
        let map = load(temp_dir.path(), TOWER);
        let image = render(&map);

        // 4x4 tile stretched to 4x12, bottom edge at y=12
        for y in 0..12 {
            assert_eq!(*image.get_pixel(0, y), RED);
        }
        // The shape object draws nothing
        assert_eq!(*image.get_pixel(5, 2), CLEAR);
    }

    #[test]
    fn test_height_split_strata() {
        let temp_dir = TempDir::new().unwrap();
        let map = load(temp_dir.path(), TOWER);
        let Layer::Objects(props) = &map.layers[0] else {
            panic!("expected object group");
        };

        let mut tiles = TileSource::new(&map);
        let mut upper = Canvas::for_map(&map);
        upper
            .draw_objects(props, Placement::ROOT, Stratum::Upper, &mut tiles)
            .unwrap();
        let mut lower = Canvas::for_map(&map);
        lower
            .draw_objects(props, Placement::ROOT, Stratum::Lower, &mut tiles)
            .unwrap();

        let (upper, lower) = (upper.into_image(), lower.into_image());
        for y in 0..8 {
            assert_eq!(*upper.get_pixel(0, y), RED);
            assert_eq!(*lower.get_pixel(0, y), CLEAR);
        }
        for y in 8..12 {
            assert_eq!(*upper.get_pixel(0, y), CLEAR);
            assert_eq!(*lower.get_pixel(0, y), RED);
        }
    }

    #[test]
    fn test_single_tile_object_has_no_upper_part() {
        let temp_dir = TempDir::new().unwrap();
        let map = load(
            temp_dir.path(),
            r#"<objectgroup name="props"><object id="1" gid="2" x="0" y="4"/></objectgroup>"#,
        );
        let Layer::Objects(props) = &map.layers[0] else {
            panic!("expected object group");
        };

        let mut tiles = TileSource::new(&map);
        let mut upper = Canvas::for_map(&map);
        upper
            .draw_objects(props, Placement::ROOT, Stratum::Upper, &mut tiles)
            .unwrap();
        assert!(upper.image().pixels().all(|p| *p == CLEAR));
    }

    #[test]
    fn test_fill() {
        let temp_dir = TempDir::new().unwrap();
        let map = load(temp_dir.path(), "");
        let mut canvas = Canvas::for_map(&map);
        canvas.fill([1, 2, 3, 4]);
        assert!(canvas.image().pixels().all(|p| p.0 == [1, 2, 3, 4]));
    }

    #[test]
    fn test_cell_anchor_does_not_wrap() {
        assert_eq!(cell_anchor(0, 0, 4, 4), (0, 4));
        assert_eq!(cell_anchor(2, 1, 4, 8), (8, 16));
        assert_eq!(
            cell_anchor(u32::MAX, u32::MAX, 16_384, 16_384),
            (
                i64::from(u32::MAX) * 16_384,
                (i64::from(u32::MAX) + 1) * 16_384,
            )
        );
        assert_eq!(
            cell_anchor(u32::MAX, u32::MAX, u32::MAX, u32::MAX),
            (i64::MAX, i64::MAX)
        );
    }
}
