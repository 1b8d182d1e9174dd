//! Where converted images go.
//!
//! The pipeline hands every [`ConvertedItem`] to a [`ResultSink`] and calls
//! [`ResultSink::finalize`] once at the end of the run. Two strategies exist:
//!
//! - [`FilesystemSink`] writes each item under an output root, mirroring the
//!   input's relative directory structure. Re-running overwrites. Two items of
//!   one run landing on the same path are reported through
//!   [`Placement::replaced`].
//! - [`MemorySink`] keeps items in memory and packages them at the end: a
//!   single item is returned as-is, several are bundled into a zip archive.
//!   Member names are unique; a clash gets a `-1`, `-2`, ... suffix.

use crate::types::ConvertedItem;
use std::collections::HashSet;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

/// Packaged output of a [`MemorySink`].
#[derive(Debug, Clone, PartialEq)]
pub enum Package {
    /// Exactly one item was converted; deliver it directly.
    Single(ConvertedItem),
    /// Several items, zipped. Member names are `relative_path/name`.
    Archive { bytes: Vec<u8>, members: usize },
}

impl Package {
    /// Write the package into `dir`, returning the path written.
    ///
    /// A single item keeps its own name; an archive is written as `archive_name`.
    pub fn write_to(&self, dir: &Path, archive_name: &str) -> Result<PathBuf, SinkError> {
        fs::create_dir_all(dir)?;
        let (path, bytes) = match self {
            Package::Single(item) => (dir.join(&item.name), &item.data),
            Package::Archive { bytes, .. } => (dir.join(archive_name), bytes),
        };
        fs::write(&path, bytes)?;
        Ok(path)
    }
}

/// Where a sink stored an accepted item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    /// `relative_path/name` under the sink root, or the archive member name.
    pub location: String,
    /// An earlier item accepted by this sink had already been stored at `location`.
    pub replaced: bool,
}

/// Destination for converted items.
pub trait ResultSink {
    /// Take ownership of one converted item.
    fn accept(&mut self, item: ConvertedItem) -> Result<Placement, SinkError>;

    /// Called once after the last item. Returns packaged output, if the
    /// strategy produces any.
    fn finalize(&mut self) -> Result<Option<Package>, SinkError>;
}

/// Writes each item to `output_root/relative_path/name`.
#[derive(Debug, Clone)]
pub struct FilesystemSink {
    output_root: PathBuf,
    written: HashSet<PathBuf>,
}

impl FilesystemSink {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            written: HashSet::new(),
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Path an item will be written to.
    pub fn target_path(&self, item: &ConvertedItem) -> PathBuf {
        self.output_root.join(&item.relative_path).join(&item.name)
    }
}

impl ResultSink for FilesystemSink {
    fn accept(&mut self, item: ConvertedItem) -> Result<Placement, SinkError> {
        let path = self.target_path(&item);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, &item.data)?;
        debug!(path = %path.display(), size = item.data.len(), "wrote output");
        let replaced = !self.written.insert(path);
        Ok(Placement {
            location: item.display_path(),
            replaced,
        })
    }

    fn finalize(&mut self) -> Result<Option<Package>, SinkError> {
        Ok(None)
    }
}

/// Collects items for later download or archiving.
#[derive(Debug, Default)]
pub struct MemorySink {
    items: Vec<ConvertedItem>,
    members: HashSet<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[ConvertedItem] {
        &self.items
    }
}

impl ResultSink for MemorySink {
    fn accept(&mut self, mut item: ConvertedItem) -> Result<Placement, SinkError> {
        let requested = item.name.clone();
        let (stem, ext) = match requested.rfind('.') {
            Some(dot) if dot > 0 => requested.split_at(dot),
            _ => (requested.as_str(), ""),
        };
        let mut suffix = 0u32;
        while self.members.contains(&item.display_path()) {
            suffix += 1;
            item.name = format!("{stem}-{suffix}{ext}");
        }
        if suffix > 0 {
            debug!(requested = %requested, renamed = %item.name, "member name already taken");
        }

        let location = item.display_path();
        self.members.insert(location.clone());
        self.items.push(item);
        Ok(Placement {
            location,
            replaced: false,
        })
    }

    fn finalize(&mut self) -> Result<Option<Package>, SinkError> {
        self.members.clear();
        match self.items.len() {
            0 => Ok(None),
            1 => Ok(self.items.pop().map(Package::Single)),
            members => {
                let bytes = build_archive(&self.items)?;
                self.items.clear();
                Ok(Some(Package::Archive { bytes, members }))
            }
        }
    }
}

fn build_archive(items: &[ConvertedItem]) -> Result<Vec<u8>, SinkError> {
    let mut cursor = Cursor::new(Vec::new());
    let mut zip = ZipWriter::new(&mut cursor);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for item in items {
        zip.start_file(item.display_path(), options)?;
        zip.write_all(&item.data)?;
    }
    zip.finish()?;

    Ok(cursor.into_inner())
}
