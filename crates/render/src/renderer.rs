//! Render adapter for Tiled maps

use crate::canvas::{Canvas, Placement, Stratum};
use crate::output::{sanitize_component, ArtifactSink};
use crate::tileset::TileSource;
use crate::tmx::{GroupLayer, Layer, Map};
use mapwatch_core::{GenerationReport, OutputMode, RenderAdapter, RenderError, SourceKey};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Group property that splits a group into layer/upper/lower images
pub const SPLIT_HEIGHT_PROPERTY: &str = "splitHeight";

/// Renders a TMX file to PNG files in `dest_dir`
#[derive(Debug, Clone)]
pub struct TiledRenderer {
    dest_dir: PathBuf,
    mode: OutputMode,
}

impl TiledRenderer {
    pub fn new(dest_dir: impl Into<PathBuf>, mode: OutputMode) -> Self {
        Self {
            dest_dir: dest_dir.into(),
            mode,
        }
    }

    pub fn dest_dir(&self) -> &Path {
        &self.dest_dir
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    fn render_merged(&self, map: &Map, sink: &mut ArtifactSink) -> Result<(), RenderError> {
        let mut tiles = TileSource::new(map);
        let mut canvas = Canvas::for_map(map);
        if let Some(background) = map.background {
            canvas.fill(background);
        }
        canvas.draw_layers(&map.layers, Placement::ROOT, &mut tiles)?;
        sink.save("", canvas.image());
        Ok(())
    }

    fn render_groups(&self, map: &Map, sink: &mut ArtifactSink) -> Result<(), RenderError> {
        let mut tiles = TileSource::new(map);
        let mut groups = 0;

        for group in map.top_level_groups() {
            if !group.info.visible {
                debug!("Skipping hidden group '{}'", group.info.name);
                continue;
            }
            groups += 1;
            if group.info.properties.get_bool(SPLIT_HEIGHT_PROPERTY) {
                self.render_split_group(map, group, sink, &mut tiles)?;
            } else {
                let mut canvas = Canvas::for_map(map);
                canvas.draw_layers(&group.layers, Placement::ROOT.nested(&group.info), &mut tiles)?;
                let name = sanitize_component(&group.info.name);
                sink.save(&format!("_{}", name), canvas.image());
            }
        }

        if groups == 0 {
            info!("{} has no visible top-level groups, nothing to write", map.path.display());
        }
        Ok(())
    }

    /// Tile layers of the group into one image, and each object group into
    /// an upper and a lower image
    fn render_split_group(
        &self,
        map: &Map,
        group: &GroupLayer,
        sink: &mut ArtifactSink,
        tiles: &mut TileSource<'_>,
    ) -> Result<(), RenderError> {
        let at = Placement::ROOT.nested(&group.info);
        let name = sanitize_component(&group.info.name);

        let mut canvas = Canvas::for_map(map);
        let mut drew_tiles = false;
        for layer in &group.layers {
            if let Layer::Tiles(tile_layer) = layer {
                if tile_layer.info.visible {
                    canvas.draw_tiles(tile_layer, at, tiles)?;
                    drew_tiles = true;
                }
            }
        }
        if drew_tiles {
            sink.save(&format!("_{}_layer", name), canvas.image());
        }

        for layer in &group.layers {
            let Layer::Objects(objects) = layer else {
                continue;
            };
            if !objects.info.visible {
                continue;
            }
            let object_name = sanitize_component(&objects.info.name);
            for (stratum, suffix) in [(Stratum::Upper, "upper"), (Stratum::Lower, "lower")] {
                let mut canvas = Canvas::for_map(map);
                canvas.draw_objects(objects, at, stratum, tiles)?;
                sink.save(&format!("_{}_{}_{}", name, object_name, suffix), canvas.image());
            }
        }
        Ok(())
    }
}

impl RenderAdapter for TiledRenderer {
    fn generate(&self, key: &SourceKey) -> Result<GenerationReport, RenderError> {
        let stem = key.file_stem().ok_or_else(|| RenderError::Malformed {
            path: key.as_path().to_path_buf(),
            message: "source path has no file name".to_string(),
        })?;
        let map = Map::load(key.as_path())?;

        let mut sink = ArtifactSink::new(&self.dest_dir, stem);
        match self.mode {
            OutputMode::Merged => self.render_merged(&map, &mut sink)?,
            OutputMode::SeparateGroups => self.render_groups(&map, &mut sink)?,
        }
        sink.finish()
    }
}
