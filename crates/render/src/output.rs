//! Artifact naming and persistence
//!
//! Every artifact of a source is `<dest>/<stem><suffix>.png`. Files are
//! written to a temporary file in the destination directory and renamed
//! into place, so readers never observe a half-written PNG.

use image::{ImageFormat, RgbaImage};
use mapwatch_core::{ArtifactFailure, GenerationReport, RenderError};
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PNG encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("rename into place failed: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Path of the artifact with `suffix` for source stem `stem`
pub fn artifact_path(dest_dir: &Path, stem: &str, suffix: &str) -> PathBuf {
    dest_dir.join(format!("{}{}.png", stem, suffix))
}

/// Make a layer name usable inside a file name
pub fn sanitize_component(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c => c,
        })
        .collect()
}

/// Encode `image` as PNG and atomically replace `path` with it
pub fn write_png(path: &Path, image: &RgbaImage) -> Result<(), OutputError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut encoded = Cursor::new(Vec::new());
    image.write_to(&mut encoded, ImageFormat::Png)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(encoded.get_ref())?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o644))?;
    }
    tmp.persist(path)?;
    Ok(())
}

/// Collects the outcome of each artifact of one generation
///
/// A failed artifact does not stop the others from being written.
pub struct ArtifactSink {
    dest_dir: PathBuf,
    stem: String,
    written: Vec<PathBuf>,
    failures: Vec<ArtifactFailure>,
}

impl ArtifactSink {
    pub fn new(dest_dir: &Path, stem: &str) -> Self {
        Self {
            dest_dir: dest_dir.to_path_buf(),
            stem: stem.to_string(),
            written: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn save(&mut self, suffix: &str, image: &RgbaImage) {
        let path = artifact_path(&self.dest_dir, &self.stem, suffix);
        match write_png(&path, image) {
            Ok(()) => {
                debug!("Wrote {}", path.display());
                self.written.push(path);
            }
            Err(e) => {
                warn!("Failed to write {}: {}", path.display(), e);
                self.failures.push(ArtifactFailure {
                    path,
                    message: e.to_string(),
                });
            }
        }
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    pub fn finish(self) -> Result<GenerationReport, RenderError> {
        if self.failures.is_empty() {
            Ok(GenerationReport::new(self.written))
        } else {
            Err(RenderError::Persist {
                written: self.written,
                failures: self.failures,
            })
        }
    }
}
