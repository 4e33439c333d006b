//! Local image directory source.
//!
//! `enumerate_images` walks an input directory recursively and returns every
//! file with a recognized image extension, ordered by relative path string.
//! Directory iteration order is platform dependent, so the sort is what makes
//! runs reproducible.

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::WalkDir;

use crate::error::PipelineError;

/// Recognized image extensions, compared case-insensitively.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "png"];

/// One input image: where to read it and how to name it in artifacts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageRef {
    path: PathBuf,
    relative: String,
}

impl ImageRef {
    /// Build a reference for `path`, which must live under `root`.
    pub fn new(root: &Path, path: PathBuf) -> Result<Self> {
        let relative = path
            .strip_prefix(root)
            .with_context(|| {
                format!(
                    "image {} is not under {}",
                    path.display(),
                    root.display()
                )
            })
            .map(to_posix)?;
        Ok(Self { path, relative })
    }

    /// Path used to open the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Relative POSIX path used as the image identity in every artifact.
    pub fn relative(&self) -> &str {
        &self.relative
    }
}

/// True when the file extension is in `IMAGE_EXTENSIONS`.
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Recursively enumerate images under `root`, sorted by relative path.
///
/// Symlinked directories are not descended into. Symlinked files are listed
/// when they resolve to a regular file; dangling links are skipped.
pub fn enumerate_images(root: &Path) -> Result<Vec<ImageRef>> {
    if !root.is_dir() {
        return Err(PipelineError::configuration(
            "images_dir",
            format!("path \"{}\" not found", root.display()),
        )
        .into());
    }

    let mut images = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| walk_error(root, e))?;
        let path = entry.path();
        if entry.file_type().is_dir() || !is_image_file(path) {
            continue;
        }
        if entry.path_is_symlink() {
            match std::fs::metadata(path) {
                Ok(meta) if meta.is_file() => {}
                Ok(_) => continue,
                Err(e) => {
                    log::warn!("skipping dangling link {}: {}", path.display(), e);
                    continue;
                }
            }
        } else if !entry.file_type().is_file() {
            continue;
        }
        images.push(ImageRef::new(root, path.to_path_buf())?);
    }

    images.sort_by(|a, b| a.relative.cmp(&b.relative));
    log::debug!("enumerated {} images under {}", images.len(), root.display());
    Ok(images)
}

fn walk_error(root: &Path, err: walkdir::Error) -> anyhow::Error {
    let path = err.path().unwrap_or(root).to_path_buf();
    PipelineError::io(&path, &std::io::Error::from(err)).into()
}

fn to_posix(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
