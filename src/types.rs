//! Shared types passed between the source, converter, pipeline and sinks.

use crate::imaging::Quality;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// A named image buffer awaiting conversion.
///
/// Produced by an [`InputSource`](crate::source::InputSource) and owned by the
/// pipeline while it is converted.
#[derive(Clone, PartialEq, Eq)]
pub struct InputItem {
    /// File name including extension, without directories.
    pub name: String,
    /// Raw encoded bytes (PNG, JPEG, ...).
    pub bytes: Vec<u8>,
    /// Directory of the item relative to the input root; empty for top-level items.
    pub relative_path: PathBuf,
}

impl InputItem {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
            relative_path: PathBuf::new(),
        }
    }

    pub fn with_relative_path(mut self, relative_path: impl Into<PathBuf>) -> Self {
        self.relative_path = relative_path.into();
        self
    }

    /// `relative_path/name`, used for log messages and archive members.
    pub fn display_path(&self) -> String {
        join_display(&self.relative_path, &self.name)
    }
}

// Bytes are elided so failing test output stays readable.
impl fmt::Debug for InputItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputItem")
            .field("name", &self.name)
            .field("bytes", &self.bytes.len())
            .field("relative_path", &self.relative_path)
            .finish()
    }
}

/// Where the encoded bytes of a [`PendingItem`] are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemData {
    /// Already in memory (uploads, archive members).
    Loaded(Vec<u8>),
    /// A file that is read when the item's conversion starts.
    OnDisk(PathBuf),
}

/// An enumerated input whose bytes may not have been read yet.
///
/// Sources yield these so a large directory is never held in memory at once;
/// the pipeline calls [`PendingItem::load`] right before converting each one.
#[derive(Clone, PartialEq, Eq)]
pub struct PendingItem {
    pub name: String,
    pub relative_path: PathBuf,
    pub data: ItemData,
}

impl PendingItem {
    pub fn on_disk(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            relative_path: PathBuf::new(),
            data: ItemData::OnDisk(path.into()),
        }
    }

    pub fn with_relative_path(mut self, relative_path: impl Into<PathBuf>) -> Self {
        self.relative_path = relative_path.into();
        self
    }

    pub fn display_path(&self) -> String {
        join_display(&self.relative_path, &self.name)
    }

    /// Read the bytes if they are still on disk.
    pub fn load(self) -> io::Result<InputItem> {
        let bytes = match self.data {
            ItemData::Loaded(bytes) => bytes,
            ItemData::OnDisk(path) => fs::read(path)?,
        };
        Ok(InputItem {
            name: self.name,
            bytes,
            relative_path: self.relative_path,
        })
    }
}

impl From<InputItem> for PendingItem {
    fn from(item: InputItem) -> Self {
        Self {
            name: item.name,
            relative_path: item.relative_path,
            data: ItemData::Loaded(item.bytes),
        }
    }
}

impl fmt::Debug for PendingItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("PendingItem");
        dbg.field("name", &self.name)
            .field("relative_path", &self.relative_path);
        match &self.data {
            ItemData::Loaded(bytes) => dbg.field("bytes", &bytes.len()),
            ItemData::OnDisk(path) => dbg.field("path", path),
        };
        dbg.finish()
    }
}

/// A successfully encoded image, ready for a [`ResultSink`](crate::sink::ResultSink).
#[derive(Clone, PartialEq)]
pub struct ConvertedItem {
    /// Output file name (always with the codec extension).
    pub name: String,
    /// Same relative directory as the input item.
    pub relative_path: PathBuf,
    pub data: Vec<u8>,
    pub original_size: u64,
    pub converted_size: u64,
    pub quality: Quality,
    /// Encode attempts the search spent on this item.
    pub iterations: u32,
    /// Whether the search ended inside the tolerance band.
    pub in_tolerance: bool,
}

impl ConvertedItem {
    pub fn compression_ratio_percent(&self) -> f64 {
        compression_ratio_percent(self.original_size, self.converted_size)
    }

    /// `relative_path/name`, used for log messages and archive members.
    pub fn display_path(&self) -> String {
        join_display(&self.relative_path, &self.name)
    }
}

impl fmt::Debug for ConvertedItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConvertedItem")
            .field("name", &self.name)
            .field("relative_path", &self.relative_path)
            .field("data", &self.data.len())
            .field("original_size", &self.original_size)
            .field("converted_size", &self.converted_size)
            .field("quality", &self.quality)
            .field("iterations", &self.iterations)
            .field("in_tolerance", &self.in_tolerance)
            .finish()
    }
}

/// `(1 - converted/original) * 100`, or `0` when the original is empty.
pub fn compression_ratio_percent(original: u64, converted: u64) -> f64 {
    if original == 0 {
        return 0.0;
    }
    (1.0 - converted as f64 / original as f64) * 100.0
}

/// Forward-slash join so names look the same on every platform.
fn join_display(dir: &Path, name: &str) -> String {
    let mut parts: Vec<String> = dir
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    parts.push(name.to_string());
    parts.join("/")
}
