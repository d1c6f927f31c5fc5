//! Tiled map model and TMX/TSX loading
//!
//! Only what rendering needs is kept: orthogonal geometry, tilesets, tile
//! layers, tile objects, groups, visibility, opacity, offsets and custom
//! properties.

use crate::data::decode_tile_data;
use crate::xml::{parse_document, Element};
use ahash::AHashMap;
use mapwatch_core::RenderError;
use smallvec::SmallVec;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

pub const FLIPPED_HORIZONTALLY: u32 = 0x8000_0000;
pub const FLIPPED_VERTICALLY: u32 = 0x4000_0000;
pub const FLIPPED_DIAGONALLY: u32 = 0x2000_0000;
/// Hexagonal-only flag; masked off for orthogonal maps
pub const ROTATED_HEXAGONAL_120: u32 = 0x1000_0000;

/// Largest rendered image side, in pixels
pub const MAX_PIXEL_SIDE: u32 = 16_384;

/// Largest number of cells in a map or tile layer
pub const MAX_LAYER_CELLS: u32 = 1 << 24;

const FLAG_MASK: u32 =
    FLIPPED_HORIZONTALLY | FLIPPED_VERTICALLY | FLIPPED_DIAGONALLY | ROTATED_HEXAGONAL_120;

/// A placed tile: global id plus flip flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRef {
    pub gid: u32,
    pub flip_h: bool,
    pub flip_v: bool,
    pub flip_d: bool,
}

impl TileRef {
    /// Split a raw gid into id and flags; `None` for the empty tile
    pub fn from_raw(raw: u32) -> Option<Self> {
        let gid = raw & !FLAG_MASK;
        if gid == 0 {
            return None;
        }
        Some(Self {
            gid,
            flip_h: raw & FLIPPED_HORIZONTALLY != 0,
            flip_v: raw & FLIPPED_VERTICALLY != 0,
            flip_d: raw & FLIPPED_DIAGONALLY != 0,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Strings and every other Tiled type (color, file, object, class)
    String(String),
}

/// Custom properties in document order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties(SmallVec<[(String, PropertyValue); 4]>);

impl Properties {
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// `true` only for a bool property set to true
    pub fn get_bool(&self, name: &str) -> bool {
        matches!(self.get(name), Some(PropertyValue::Bool(true)))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Attributes shared by every layer kind
#[derive(Debug, Clone, PartialEq)]
pub struct LayerInfo {
    pub name: String,
    pub visible: bool,
    pub opacity: f32,
    pub offset_x: f32,
    pub offset_y: f32,
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TileLayer {
    pub info: LayerInfo,
    pub width: u32,
    pub height: u32,
    /// Raw gids, row-major
    pub tiles: Vec<u32>,
}

impl TileLayer {
    /// Non-empty cells as `(column, row, tile)`
    pub fn cells(&self) -> impl Iterator<Item = (u32, u32, TileRef)> + '_ {
        let width = self.width.max(1);
        self.tiles.iter().enumerate().filter_map(move |(i, raw)| {
            let tile = TileRef::from_raw(*raw)?;
            let i = i as u32;
            Some((i % width, i / width, tile))
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapObject {
    pub id: u32,
    pub name: String,
    /// Set for tile objects; shapes have no tile and are not drawn
    pub tile: Option<TileRef>,
    /// Bottom-left corner for tile objects
    pub x: f32,
    pub y: f32,
    /// Zero when the TMX omits it; the tile's own size applies then
    pub width: f32,
    pub height: f32,
    pub visible: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectGroup {
    pub info: LayerInfo,
    pub objects: Vec<MapObject>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupLayer {
    pub info: LayerInfo,
    pub layers: Vec<Layer>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Layer {
    Tiles(TileLayer),
    Objects(ObjectGroup),
    Group(GroupLayer),
}

impl Layer {
    pub fn info(&self) -> &LayerInfo {
        match self {
            Layer::Tiles(l) => &l.info,
            Layer::Objects(l) => &l.info,
            Layer::Group(l) => &l.info,
        }
    }
}

/// An image file referenced by a tileset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilesetImage {
    /// Resolved against the directory of the file that referenced it
    pub source: PathBuf,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Color key rendered transparent
    pub trans: Option<[u8; 3]>,
}

#[derive(Debug, Clone)]
pub struct Tileset {
    pub name: String,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tile_count: u32,
    /// 0 when the TMX omits it; derived from the image width then
    pub columns: u32,
    pub spacing: u32,
    pub margin: u32,
    /// Sheet image; `None` for image-collection tilesets
    pub image: Option<TilesetImage>,
    /// Per-tile images of an image-collection tileset, by local id
    pub tiles: AHashMap<u32, TilesetImage>,
}

#[derive(Debug, Clone)]
pub struct MapTileset {
    pub first_gid: u32,
    pub tileset: Tileset,
}

#[derive(Debug, Clone)]
pub struct Map {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    /// RGBA
    pub background: Option<[u8; 4]>,
    pub properties: Properties,
    /// Ordered by `first_gid`
    pub tilesets: Vec<MapTileset>,
    pub layers: Vec<Layer>,
}

impl Map {
    /// Read and parse the TMX file at `path`
    pub fn load(path: &Path) -> Result<Self, RenderError> {
        let text = fs::read_to_string(path).map_err(|source| RenderError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    /// Parse TMX text; `path` locates external tilesets and images
    pub fn parse(text: &str, path: &Path) -> Result<Self, RenderError> {
        let root = parse_document(text).map_err(|e| malformed(path, e))?;
        if root.name != "map" {
            return Err(malformed(path, format!("root element is <{}>, not <map>", root.name)));
        }

        let orientation = root.attr("orientation").unwrap_or("orthogonal");
        if orientation != "orthogonal" {
            return Err(unsupported(path, format!("{} orientation", orientation)));
        }
        if root.attr("infinite") == Some("1") {
            return Err(unsupported(path, "infinite maps"));
        }

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let width = required(&root, "width", path)?;
        let height = required(&root, "height", path)?;
        let tile_width = required(&root, "tilewidth", path)?;
        let tile_height = required(&root, "tileheight", path)?;
        pixel_extent(width, tile_width, "width", path)?;
        pixel_extent(height, tile_height, "height", path)?;
        cell_count(width, height, path)?;
        let background = match root.attr("backgroundcolor") {
            Some(value) => Some(
                parse_color(value)
                    .ok_or_else(|| malformed(path, format!("bad backgroundcolor '{}'", value)))?,
            ),
            None => None,
        };

        let mut tilesets = Vec::new();
        for el in root.children_named("tileset") {
            let first_gid = required(el, "firstgid", path)?;
            let tileset = match el.attr("source") {
                Some(source) => load_external_tileset(&base_dir.join(source))?,
                None => parse_tileset(el, base_dir, path)?,
            };
            tilesets.push(MapTileset { first_gid, tileset });
        }
        tilesets.sort_by_key(|t| t.first_gid);

        let layers = parse_layers(&root, path)?;

        Ok(Self {
            path: path.to_path_buf(),
            width,
            height,
            tile_width,
            tile_height,
            background,
            properties: parse_properties(&root, path)?,
            tilesets,
            layers,
        })
    }

    pub fn pixel_width(&self) -> u32 {
        self.width.saturating_mul(self.tile_width)
    }

    pub fn pixel_height(&self) -> u32 {
        self.height.saturating_mul(self.tile_height)
    }

    /// Tileset owning `gid`: the one with the largest `first_gid <= gid`
    pub fn tileset_for(&self, gid: u32) -> Option<&MapTileset> {
        self.tilesets.iter().rev().find(|t| t.first_gid <= gid)
    }

    /// Groups directly under `<map>`, in document order
    pub fn top_level_groups(&self) -> impl Iterator<Item = &GroupLayer> {
        self.layers.iter().filter_map(|layer| match layer {
            Layer::Group(group) => Some(group),
            _ => None,
        })
    }
}

fn load_external_tileset(path: &Path) -> Result<Tileset, RenderError> {
    let text = fs::read_to_string(path).map_err(|source| RenderError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let root = parse_document(&text).map_err(|e| malformed(path, e))?;
    if root.name != "tileset" {
        return Err(malformed(path, format!("root element is <{}>, not <tileset>", root.name)));
    }
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    parse_tileset(&root, base_dir, path)
}

fn parse_tileset(el: &Element, base_dir: &Path, path: &Path) -> Result<Tileset, RenderError> {
    let image = match el.child("image") {
        Some(image) => Some(parse_image(image, base_dir, path)?),
        None => None,
    };

    let mut tiles = AHashMap::new();
    for tile in el.children_named("tile") {
        if let Some(image) = tile.child("image") {
            let id = required(tile, "id", path)?;
            tiles.insert(id, parse_image(image, base_dir, path)?);
        }
    }

    Ok(Tileset {
        name: el.attr("name").unwrap_or_default().to_string(),
        tile_width: required(el, "tilewidth", path)?,
        tile_height: required(el, "tileheight", path)?,
        tile_count: optional(el, "tilecount", 0, path)?,
        columns: optional(el, "columns", 0, path)?,
        spacing: optional(el, "spacing", 0, path)?,
        margin: optional(el, "margin", 0, path)?,
        image,
        tiles,
    })
}

fn parse_image(el: &Element, base_dir: &Path, path: &Path) -> Result<TilesetImage, RenderError> {
    let source = el
        .attr("source")
        .ok_or_else(|| malformed(path, "<image> without source"))?;
    let trans = match el.attr("trans") {
        Some(value) => {
            let [r, g, b, _] = parse_color(value)
                .ok_or_else(|| malformed(path, format!("bad image trans color '{}'", value)))?;
            Some([r, g, b])
        }
        None => None,
    };
    Ok(TilesetImage {
        source: base_dir.join(source),
        width: el.attr("width").and_then(|v| v.parse().ok()),
        height: el.attr("height").and_then(|v| v.parse().ok()),
        trans,
    })
}

fn parse_layers(parent: &Element, path: &Path) -> Result<Vec<Layer>, RenderError> {
    let mut layers = Vec::new();
    for el in &parent.children {
        let layer = match el.name.as_str() {
            "layer" => Layer::Tiles(parse_tile_layer(el, path)?),
            "objectgroup" => Layer::Objects(parse_object_group(el, path)?),
            "group" => Layer::Group(GroupLayer {
                info: parse_layer_info(el, path)?,
                layers: parse_layers(el, path)?,
            }),
            "imagelayer" => {
                debug!("Skipping image layer '{}' in {}", el.attr("name").unwrap_or_default(), path.display());
                continue;
            }
            _ => continue,
        };
        layers.push(layer);
    }
    Ok(layers)
}

fn parse_layer_info(el: &Element, path: &Path) -> Result<LayerInfo, RenderError> {
    Ok(LayerInfo {
        name: el.attr("name").unwrap_or_default().to_string(),
        visible: el.attr("visible") != Some("0"),
        opacity: optional(el, "opacity", 1.0, path)?,
        offset_x: optional(el, "offsetx", 0.0, path)?,
        offset_y: optional(el, "offsety", 0.0, path)?,
        properties: parse_properties(el, path)?,
    })
}

fn parse_tile_layer(el: &Element, path: &Path) -> Result<TileLayer, RenderError> {
    let info = parse_layer_info(el, path)?;
    let width: u32 = required(el, "width", path)?;
    let height: u32 = required(el, "height", path)?;
    let data = el
        .child("data")
        .ok_or_else(|| malformed(path, format!("layer '{}' has no <data>", info.name)))?;
    let tiles = decode_tile_data(data, cell_count(width, height, path)?)
        .map_err(|e| malformed(path, format!("layer '{}': {}", info.name, e)))?;

    Ok(TileLayer {
        info,
        width,
        height,
        tiles,
    })
}

fn parse_object_group(el: &Element, path: &Path) -> Result<ObjectGroup, RenderError> {
    let info = parse_layer_info(el, path)?;
    let mut objects = Vec::new();
    for obj in el.children_named("object") {
        let tile = match obj.attr("gid") {
            Some(raw) => {
                let raw: u32 = raw
                    .parse()
                    .map_err(|_| malformed(path, format!("bad object gid '{}'", raw)))?;
                TileRef::from_raw(raw)
            }
            None => None,
        };
        let width: f32 = optional(obj, "width", 0.0, path)?;
        let height: f32 = optional(obj, "height", 0.0, path)?;
        let fits = |side: f32| (0.0..=MAX_PIXEL_SIDE as f32).contains(&side);
        if !fits(width) || !fits(height) {
            return Err(unsupported(
                path,
                format!("object of {} x {}px (limit {}px)", width, height, MAX_PIXEL_SIDE),
            ));
        }
        objects.push(MapObject {
            id: optional(obj, "id", 0, path)?,
            name: obj.attr("name").unwrap_or_default().to_string(),
            tile,
            x: optional(obj, "x", 0.0, path)?,
            y: optional(obj, "y", 0.0, path)?,
            width,
            height,
            visible: obj.attr("visible") != Some("0"),
        });
    }
    Ok(ObjectGroup { info, objects })
}

fn parse_properties(el: &Element, path: &Path) -> Result<Properties, RenderError> {
    let mut props = SmallVec::new();
    let Some(list) = el.child("properties") else {
        return Ok(Properties(props));
    };

    for prop in list.children_named("property") {
        let name = prop
            .attr("name")
            .ok_or_else(|| malformed(path, "<property> without name"))?
            .to_string();
        // Multi-line strings live in the element text
        let raw = prop.attr("value").unwrap_or(prop.text.as_str());
        let bad = || malformed(path, format!("property '{}' has bad value '{}'", name, raw));
        let value = match prop.attr("type").unwrap_or("string") {
            "bool" => PropertyValue::Bool(match raw {
                "true" => true,
                "false" => false,
                _ => return Err(bad()),
            }),
            "int" => PropertyValue::Int(raw.parse().map_err(|_| bad())?),
            "float" => PropertyValue::Float(raw.parse().map_err(|_| bad())?),
            _ => PropertyValue::String(raw.to_string()),
        };
        props.push((name, value));
    }
    Ok(Properties(props))
}

/// `#RRGGBB` or `#AARRGGBB` (leading `#` optional) as RGBA
pub fn parse_color(value: &str) -> Option<[u8; 4]> {
    let hex = value.strip_prefix('#').unwrap_or(value);
    let byte = |i: usize| hex.get(i..i + 2).and_then(|s| u8::from_str_radix(s, 16).ok());
    match hex.len() {
        6 => Some([byte(0)?, byte(2)?, byte(4)?, 255]),
        8 => Some([byte(2)?, byte(4)?, byte(6)?, byte(0)?]),
        _ => None,
    }
}

fn required<T: FromStr>(el: &Element, name: &str, path: &Path) -> Result<T, RenderError> {
    let raw = el
        .attr(name)
        .ok_or_else(|| malformed(path, format!("<{}> is missing '{}'", el.name, name)))?;
    raw.parse()
        .map_err(|_| malformed(path, format!("<{}> has bad '{}' value '{}'", el.name, name, raw)))
}

fn optional<T: FromStr>(el: &Element, name: &str, default: T, path: &Path) -> Result<T, RenderError> {
    match el.attr(name) {
        Some(_) => required(el, name, path),
        None => Ok(default),
    }
}

/// `cells * cell_size`, refused past [`MAX_PIXEL_SIDE`]
fn pixel_extent(cells: u32, cell_size: u32, axis: &str, path: &Path) -> Result<u32, RenderError> {
    cells
        .checked_mul(cell_size)
        .filter(|pixels| *pixels <= MAX_PIXEL_SIDE)
        .ok_or_else(|| {
            unsupported(
                path,
                format!(
                    "map {} of {} tiles x {}px (limit {}px)",
                    axis, cells, cell_size, MAX_PIXEL_SIDE
                ),
            )
        })
}

fn cell_count(width: u32, height: u32, path: &Path) -> Result<usize, RenderError> {
    width
        .checked_mul(height)
        .filter(|cells| *cells <= MAX_LAYER_CELLS)
        .map(|cells| cells as usize)
        .ok_or_else(|| {
            unsupported(
                path,
                format!("{} x {} tiles (limit {} cells)", width, height, MAX_LAYER_CELLS),
            )
        })
}

fn malformed(path: &Path, message: impl Display) -> RenderError {
    RenderError::Malformed {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

fn unsupported(path: &Path, feature: impl Display) -> RenderError {
    RenderError::Unsupported {
        path: path.to_path_buf(),
        feature: feature.to_string(),
    }
}
