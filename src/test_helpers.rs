//! Shared test utilities for the avifit test suite.
//!
//! Builds image and archive fixtures in memory, so tests never depend on
//! files checked into the repository.
//!
//! # Usage
//!
//! ```text
//! use crate::test_helpers::*;
//!
//! let flat = png_bytes(8, 8);                   // tiny, compresses to almost nothing
//! let busy = noise_png(256, 256, 7);            // incompressible-ish, realistic sizes
//! let zip = zip_bytes(&[("a.png", &flat), ("sub/b.png", &busy)]);
//! let items = png_items(&["a.png", "b.png"]);   // ready for the pipeline
//! ```

use crate::types::InputItem;
use image::{ImageFormat, Rgb, RgbImage};
use std::io::{Cursor, Write};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

// =========================================================================
// Images
// =========================================================================

/// Encode a small gradient as PNG.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 16 % 256) as u8, (y * 16 % 256) as u8, 128])
    });
    encode_png(img)
}

/// Encode deterministic pseudo-random pixels as PNG.
///
/// Same `seed` gives the same bytes. Noise does not compress well, which
/// makes encoded size respond smoothly to quality.
pub fn noise_png(width: u32, height: u32, seed: u64) -> Vec<u8> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
    let img = RgbImage::from_fn(width, height, |_, _| {
        let mut channel = || {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (state >> 56) as u8
        };
        Rgb([channel(), channel(), channel()])
    });
    encode_png(img)
}

fn encode_png(img: RgbImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

/// One small valid PNG item per name, with an empty relative path.
pub fn png_items(names: &[&str]) -> Vec<InputItem> {
    names
        .iter()
        .map(|name| InputItem::new(*name, png_bytes(8, 8)))
        .collect()
}

// =========================================================================
// Archives
// =========================================================================

/// Build a zip archive from `(member name, contents)` pairs, in order.
///
/// Names ending in `/` become directory entries.
pub fn zip_bytes(members: &[(&str, &[u8])]) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    let mut zip = ZipWriter::new(&mut cursor);
    let options = SimpleFileOptions::default();
    for (name, data) in members {
        if name.ends_with('/') {
            zip.add_directory(*name, options).unwrap();
        } else {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
    }
    zip.finish().unwrap();
    cursor.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noise_is_deterministic_per_seed() {
        assert_eq!(noise_png(16, 16, 3), noise_png(16, 16, 3));
        assert_ne!(noise_png(16, 16, 3), noise_png(16, 16, 4));
    }

    #[test]
    fn fixtures_decode() {
        assert!(image::load_from_memory(&png_bytes(4, 4)).is_ok());
        assert!(image::load_from_memory(&noise_png(4, 4, 1)).is_ok());
    }
}
