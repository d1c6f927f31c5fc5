//! Tile pixel lookup
//!
//! Resolves a placed tile to its pixels: finds the owning tileset, cuts the
//! tile out of the sheet (or takes the collection image) and applies the
//! flip flags. Tileset images are decoded once per generation.

use crate::tmx::{Map, TileRef, TilesetImage};
use ahash::AHashMap;
use image::{imageops, RgbaImage};
use mapwatch_core::RenderError;
use std::path::PathBuf;
use tracing::warn;

pub struct TileSource<'m> {
    map: &'m Map,
    images: AHashMap<PathBuf, RgbaImage>,
}

impl<'m> TileSource<'m> {
    pub fn new(map: &'m Map) -> Self {
        Self {
            map,
            images: AHashMap::new(),
        }
    }

    pub fn map(&self) -> &'m Map {
        self.map
    }

    /// Pixels for `tile` with flips applied
    ///
    /// `None` when the gid does not resolve to a tile; that is logged and
    /// the cell is left empty.
    pub fn tile_image(&mut self, tile: TileRef) -> Result<Option<RgbaImage>, RenderError> {
        let map = self.map;
        let Some(entry) = map.tileset_for(tile.gid) else {
            warn!("gid {} has no tileset in {}", tile.gid, map.path.display());
            return Ok(None);
        };
        let tileset = &entry.tileset;
        let local = tile.gid - entry.first_gid;

        let pixels = if let Some(sheet_ref) = &tileset.image {
            let (tw, th) = (tileset.tile_width, tileset.tile_height);
            if tw == 0 || th == 0 {
                return Err(RenderError::Malformed {
                    path: map.path.clone(),
                    message: format!("tileset '{}' has a zero tile size", tileset.name),
                });
            }
            let (margin, spacing) = (tileset.margin, tileset.spacing);
            let sheet = self.load(sheet_ref)?;
            let columns = if tileset.columns > 0 {
                tileset.columns
            } else {
                let usable = sheet
                    .width()
                    .saturating_sub(margin.saturating_mul(2))
                    .saturating_add(spacing);
                (usable / tw.saturating_add(spacing)).max(1)
            };

            // Left/top edge of the cell at `index` along one axis
            let origin = |index: u32, size: u32| {
                index
                    .checked_mul(size.checked_add(spacing)?)?
                    .checked_add(margin)
            };
            let fits = |start: u32, size: u32, limit: u32| {
                start.checked_add(size).map_or(false, |end| end <= limit)
            };
            let cell = origin(local % columns, tw).zip(origin(local / columns, th));
            let Some((x, y)) = cell.filter(|&(x, y)| {
                fits(x, tw, sheet.width()) && fits(y, th, sheet.height())
            }) else {
                warn!(
                    "gid {} lies outside the image of tileset '{}'",
                    tile.gid, tileset.name
                );
                return Ok(None);
            };
            imageops::crop_imm(sheet, x, y, tw, th).to_image()
        } else if let Some(image) = tileset.tiles.get(&local) {
            self.load(image)?.clone()
        } else {
            warn!("gid {} has no image in tileset '{}'", tile.gid, tileset.name);
            return Ok(None);
        };

        Ok(Some(apply_flips(pixels, tile)))
    }

    fn load(&mut self, image: &TilesetImage) -> Result<&RgbaImage, RenderError> {
        if !self.images.contains_key(&image.source) {
            let mut pixels = image::open(&image.source)
                .map_err(|e| RenderError::Image {
                    path: image.source.clone(),
                    message: e.to_string(),
                })?
                .to_rgba8();
            if let Some([r, g, b]) = image.trans {
                for px in pixels.pixels_mut() {
                    if px.0[0] == r && px.0[1] == g && px.0[2] == b {
                        px.0[3] = 0;
                    }
                }
            }
            self.images.insert(image.source.clone(), pixels);
        }
        Ok(&self.images[&image.source])
    }

    /// Number of distinct images decoded so far
    pub fn cached_images(&self) -> usize {
        self.images.len()
    }
}

/// Diagonal flip (transpose) first, then horizontal, then vertical
pub fn apply_flips(mut pixels: RgbaImage, tile: TileRef) -> RgbaImage {
    if tile.flip_d {
        pixels = imageops::flip_horizontal(&imageops::rotate90(&pixels));
    }
    if tile.flip_h {
        imageops::flip_horizontal_in_place(&mut pixels);
    }
    if tile.flip_v {
        imageops::flip_vertical_in_place(&mut pixels);
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);
    const MAGENTA: Rgba<u8> = Rgba([255, 0, 255, 255]);

    /// 2x1 tiles of 2x2 px with 1px margin and spacing; tile 0 red, tile 1
    /// green with a magenta corner
    fn write_sheet(dir: &Path) {
        let mut sheet = RgbaImage::from_pixel(7, 4, Rgba([0, 0, 0, 255]));
        for (x, y) in [(1, 1), (2, 1), (1, 2), (2, 2)] {
            sheet.put_pixel(x, y, RED);
        }
        for (x, y) in [(4, 1), (5, 1), (4, 2), (5, 2)] {
            sheet.put_pixel(x, y, GREEN);
        }
        sheet.put_pixel(4, 1, MAGENTA);
        sheet.save(dir.join("sheet.png")).unwrap();
    }

    fn map(dir: &Path, tileset_attrs: &str, image_attrs: &str) -> Map {
        let text = format!(
            r#"<map orientation="orthogonal" width="1" height="1" tilewidth="2" tileheight="2">
                 <tileset firstgid="1" name="sheet" tilewidth="2" tileheight="2" {tileset_attrs}>
                   <image source="sheet.png" {image_attrs}/>
                 </tileset>
               </map>"#
        );
        let path = dir.join("test.tmx");
        fs::write(&path, &text).unwrap();
        Map::load(&path).unwrap()
    }

    #[test]
    fn test_cuts_tiles_with_margin_and_spacing() {
        let temp_dir = TempDir::new().unwrap();
        write_sheet(temp_dir.path());
        let map = map(temp_dir.path(), r#"margin="1" spacing="1" columns="2""#, "");
        let mut source = TileSource::new(&map);

        let red = source.tile_image(TileRef::from_raw(1).unwrap()).unwrap().unwrap();
        assert_eq!(red.dimensions(), (2, 2));
        assert!(red.pixels().all(|p| *p == RED));

        let green = source.tile_image(TileRef::from_raw(2).unwrap()).unwrap().unwrap();
        assert_eq!(*green.get_pixel(0, 0), MAGENTA);
        assert_eq!(*green.get_pixel(1, 1), GREEN);

        // One decode serves every tile of the sheet
        assert_eq!(source.cached_images(), 1);
    }

    #[test]
    fn test_columns_derived_from_image_width() {
        let temp_dir = TempDir::new().unwrap();
        write_sheet(temp_dir.path());
        let map = map(temp_dir.path(), r#"margin="1" spacing="1""#, "");
        let mut source = TileSource::new(&map);

        let green = source.tile_image(TileRef::from_raw(2).unwrap()).unwrap().unwrap();
        assert_eq!(*green.get_pixel(1, 1), GREEN);

        // Past the last tile
        assert!(source.tile_image(TileRef::from_raw(3).unwrap()).unwrap().is_none());
    }

    #[test]
    fn test_extreme_spacing_and_margin_leave_cell_empty() {
        let temp_dir = TempDir::new().unwrap();
        write_sheet(temp_dir.path());

        let map = map(temp_dir.path(), r#"margin="1" spacing="4294967295""#, "");
        let mut source = TileSource::new(&map);
        assert!(source.tile_image(TileRef::from_raw(2).unwrap()).unwrap().is_none());

        let map = self::map(temp_dir.path(), r#"margin="4294967295" columns="2""#, "");
        let mut source = TileSource::new(&map);
        assert!(source.tile_image(TileRef::from_raw(1).unwrap()).unwrap().is_none());
        assert!(source.tile_image(TileRef::from_raw(2).unwrap()).unwrap().is_none());
    }

    #[test]
    fn test_trans_color_becomes_transparent() {
        let temp_dir = TempDir::new().unwrap();
        write_sheet(temp_dir.path());
        let map = map(temp_dir.path(), r#"margin="1" spacing="1" columns="2""#, r#"trans="ff00ff""#);
        let mut source = TileSource::new(&map);

        let green = source.tile_image(TileRef::from_raw(2).unwrap()).unwrap().unwrap();
        assert_eq!(green.get_pixel(0, 0).0[3], 0);
        assert_eq!(*green.get_pixel(1, 0), GREEN);
    }

    #[test]
    fn test_missing_image_is_image_error() {
        let temp_dir = TempDir::new().unwrap();
        let map = map(temp_dir.path(), r#"columns="1""#, "");
        let mut source = TileSource::new(&map);

        let err = source.tile_image(TileRef::from_raw(1).unwrap()).unwrap_err();
        assert!(matches!(err, RenderError::Image { .. }));
    }

    #[test]
    fn test_flips() {
        // Marker at (1, 0) of a 2x2 tile
        let mut tile = RgbaImage::from_pixel(2, 2, GREEN);
        tile.put_pixel(1, 0, RED);
        let flags = |raw| TileRef::from_raw(1 | raw).unwrap();

        let h = apply_flips(tile.clone(), flags(crate::tmx::FLIPPED_HORIZONTALLY));
        assert_eq!(*h.get_pixel(0, 0), RED);

        let v = apply_flips(tile.clone(), flags(crate::tmx::FLIPPED_VERTICALLY));
        assert_eq!(*v.get_pixel(1, 1), RED);

        let d = apply_flips(tile.clone(), flags(crate::tmx::FLIPPED_DIAGONALLY));
        assert_eq!(*d.get_pixel(0, 1), RED);

        let none = apply_flips(tile, flags(0));
        assert_eq!(*none.get_pixel(1, 0), RED);
    }
}
