//! Input enumeration.
//!
//! Every way of supplying images produces the same thing: an ordered
//! `Vec<PendingItem>`. The pipeline never needs to know which variant it got.
//! Files on disk are only listed here; their bytes are read when the pipeline
//! gets to them.
//!
//! | Variant | Origin | `relative_path` |
//! |---|---|---|
//! | [`InputSource::Directory`] | filesystem tree | parent dir relative to root |
//! | [`InputSource::Files`] | explicit file paths | empty |
//! | [`InputSource::UploadList`] | caller-supplied buffers | empty |
//! | [`InputSource::Archive`] | zip file bytes | member's parent dir |
//!
//! ## Filtering
//!
//! - Only `png`, `jpg`, `jpeg`, `webp` and `bmp` (case-insensitive) are kept.
//! - With `ignore_hidden`, names starting with `.` are skipped, and so is
//!   everything under a hidden directory.
//! - The output subfolder (`<root>/<subfolder>`) is never read as input, so
//!   re-running a conversion does not pick up its own results.
//!
//! ## Ordering
//!
//! Directory entries are yielded in file-name order within each directory;
//! archive members in archive order. The pipeline does not reorder.

use crate::config::SourceOptions;
use crate::imaging::supported_input_extensions;
use crate::types::{InputItem, ItemData, PendingItem};
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Not a directory: {0}")]
    InvalidRoot(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Unreadable archive: {0}")]
    Archive(#[from] zip::result::ZipError),
}

/// Where the images for a run come from.
#[derive(Debug, Clone)]
pub enum InputSource {
    /// Walk a directory on disk.
    Directory(PathBuf),
    /// Individual files, in the given order.
    Files(Vec<PathBuf>),
    /// Buffers handed over directly, e.g. from an upload form or a file list.
    UploadList(Vec<InputItem>),
    /// Zip archive bytes.
    Archive(Vec<u8>),
}

impl InputSource {
    /// Produce the eligible items, in order.
    pub fn collect(self, options: &SourceOptions) -> Result<Vec<PendingItem>, SourceError> {
        match self {
            InputSource::Directory(root) => collect_directory(&root, options),
            InputSource::Files(paths) => Ok(collect_files(paths, options)),
            InputSource::UploadList(items) => Ok(items
                .into_iter()
                .filter(|item| is_eligible_name(&item.name, options.ignore_hidden))
                .map(PendingItem::from)
                .collect()),
            InputSource::Archive(bytes) => collect_archive(bytes, options),
        }
    }
}

/// Whether `name` has an accepted image extension (case-insensitive).
pub fn has_supported_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            supported_input_extensions()
                .iter()
                .any(|s| s.eq_ignore_ascii_case(ext))
        })
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

fn is_eligible_name(name: &str, ignore_hidden: bool) -> bool {
    !(ignore_hidden && is_hidden(name)) && has_supported_extension(name)
}

fn collect_directory(
    root: &Path,
    options: &SourceOptions,
) -> Result<Vec<PendingItem>, SourceError> {
    if !root.is_dir() {
        return Err(SourceError::InvalidRoot(root.to_path_buf()));
    }
    let output_dir = options.output_subfolder.as_ref().map(|s| root.join(s));
    let max_depth = if options.recursive { usize::MAX } else { 1 };

    let walker = WalkDir::new(root)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            if output_dir.as_deref() == Some(entry.path()) {
                return false;
            }
            let name = entry.file_name().to_string_lossy();
            !(options.ignore_hidden && is_hidden(&name))
        });

    let mut items = Vec::new();
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !has_supported_extension(&name) {
            continue;
        }
        let relative_path = entry
            .path()
            .parent()
            .and_then(|p| p.strip_prefix(root).ok())
            .map(Path::to_path_buf)
            .unwrap_or_default();
        debug!(path = %entry.path().display(), "found input");
        items.push(
            PendingItem::on_disk(name, entry.into_path()).with_relative_path(relative_path),
        );
    }
    Ok(items)
}

// Missing or unreadable paths are kept; they fail individually when loaded.
fn collect_files(paths: Vec<PathBuf>, options: &SourceOptions) -> Vec<PendingItem> {
    paths
        .into_iter()
        .filter_map(|path| {
            let name = path.file_name()?.to_string_lossy().into_owned();
            is_eligible_name(&name, options.ignore_hidden).then(|| PendingItem::on_disk(name, path))
        })
        .collect()
}

fn collect_archive(
    bytes: Vec<u8>,
    options: &SourceOptions,
) -> Result<Vec<PendingItem>, SourceError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut items = Vec::new();

    for index in 0..archive.len() {
        let mut member = archive.by_index(index)?;
        if member.is_dir() {
            continue;
        }
        // Members whose path escapes the archive root are never extracted
        let Some(path) = member.enclosed_name() else {
            debug!(member = member.name(), "skipping unsafe archive path");
            continue;
        };
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        let relative_path = path.parent().map(Path::to_path_buf).unwrap_or_default();

        if !options.recursive && relative_path.components().next().is_some() {
            continue;
        }
        if options.ignore_hidden && has_hidden_component(&relative_path) {
            continue;
        }
        if !is_eligible_name(&name, options.ignore_hidden) {
            continue;
        }

        // The declared size is untrusted; let the buffer grow with what is read
        let mut data = Vec::new();
        member.read_to_end(&mut data)?;
        items.push(PendingItem {
            name,
            relative_path,
            data: ItemData::Loaded(data),
        });
    }
    Ok(items)
}

fn has_hidden_component(path: &Path) -> bool {
    path.components().any(|c| match c {
        Component::Normal(s) => is_hidden(&s.to_string_lossy()),
        _ => false,
    })
}
