//! Single-item conversion: decode, search, final encode.
//!
//! Each step has its own failure kind so the pipeline can report exactly why
//! an item failed while the rest of the batch carries on.

use crate::config::ConversionConfig;
use crate::imaging::{AvifCodec, CodecError, EncodeParams, ImageCodec};
use crate::naming::output_name;
use crate::search::{SearchParams, SearchResult, search};
use crate::types::{ConvertedItem, InputItem, PendingItem};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("cannot read input: {0}")]
    Read(#[source] std::io::Error),
    #[error("cannot decode image: {0}")]
    Decode(#[source] CodecError),
    #[error("no quality level encoded successfully after {iterations} attempts")]
    QualityNotFound { iterations: u32 },
    #[error("final encode failed: {0}")]
    Encode(#[source] CodecError),
}

impl ConversionConfig {
    pub fn search_params(&self) -> SearchParams {
        SearchParams {
            target_bytes: self.target_bytes(),
            tolerance_bytes: self.tolerance_bytes(),
            max_iterations: self.max_iterations(),
            mode: self.quality_mode(),
        }
    }
}

/// Convert one item with the production AVIF codec.
pub fn convert(item: &InputItem, config: &ConversionConfig) -> Result<ConvertedItem, ConvertError> {
    convert_with_codec(&AvifCodec::new(), item, config)
}

/// Load a pending item's bytes, then convert it.
pub fn load_and_convert(
    codec: &impl ImageCodec,
    item: PendingItem,
    config: &ConversionConfig,
) -> Result<ConvertedItem, ConvertError> {
    let item = item.load().map_err(ConvertError::Read)?;
    convert_with_codec(codec, &item, config)
}

/// Convert one item using a specific codec (allows testing with mock).
pub fn convert_with_codec(
    codec: &impl ImageCodec,
    item: &InputItem,
    config: &ConversionConfig,
) -> Result<ConvertedItem, ConvertError> {
    let image = codec.decode(&item.bytes).map_err(ConvertError::Decode)?;

    let SearchResult {
        best,
        iterations,
        in_tolerance,
        ..
    } = search(codec, &image, &config.search_params());
    let best = best.ok_or(ConvertError::QualityNotFound { iterations })?;

    let data = codec
        .encode(
            &image,
            &EncodeParams {
                quality: best.quality,
                mode: config.quality_mode(),
            },
        )
        .map_err(ConvertError::Encode)?;

    debug!(
        item = %item.display_path(),
        quality = best.quality.value(),
        iterations,
        in_tolerance,
        "converted"
    );

    let original_size = item.bytes.len() as u64;
    let converted_size = data.len() as u64;
    Ok(ConvertedItem {
        name: output_name(&item.name, config.keep_original_name(), codec.extension()),
        relative_path: item.relative_path.clone(),
        data,
        original_size,
        converted_size,
        quality: best.quality,
        iterations,
        in_tolerance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::codec::tests::MockCodec;
    use crate::imaging::{Quality, QualityMode};
    use crate::test_helpers::png_bytes;

    fn config(target: u64, tolerance: u64) -> ConversionConfig {
        ConversionConfig::new(target, tolerance, 10, QualityMode::Mse, false).unwrap()
    }

    #[test]
    fn converts_png_to_target_size() {
        let codec = MockCodec::linear(100);
        let item = InputItem::new("photo.png", png_bytes(8, 8)).with_relative_path("album");

        let out = convert_with_codec(&codec, &item, &config(4000, 0)).unwrap();

        assert_eq!(out.name, "photo.avif");
        assert_eq!(out.relative_path, std::path::PathBuf::from("album"));
        assert_eq!(out.quality, Quality::new(40));
        assert_eq!(out.converted_size, 4000);
        assert_eq!(out.data.len(), 4000);
        assert_eq!(out.original_size, item.bytes.len() as u64);
        assert!(out.in_tolerance);
    }

    #[test]
    fn final_encode_reuses_found_quality() {
        let codec = MockCodec::linear(100);
        let item = InputItem::new("photo.png", png_bytes(8, 8));

        convert_with_codec(&codec, &item, &config(5000, 0)).unwrap();

        // search tries 50 (on target), then the final encode at 50
        assert_eq!(codec.recorded_qualities(), vec![50, 50]);
    }

    #[test]
    fn corrupt_input_is_decode_error() {
        let codec = MockCodec::linear(100);
        let item = InputItem::new("broken.png", b"not a png".to_vec());

        let err = convert_with_codec(&codec, &item, &config(4000, 0)).unwrap_err();
        assert!(matches!(err, ConvertError::Decode(_)));
        assert!(codec.recorded_qualities().is_empty());
    }

    #[test]
    fn unreadable_file_is_read_error() {
        let codec = MockCodec::linear(100);
        let tmp = tempfile::TempDir::new().unwrap();
        let item = PendingItem::on_disk("gone.png", tmp.path().join("gone.png"));

        let err = load_and_convert(&codec, item, &config(4000, 0)).unwrap_err();
        assert!(matches!(err, ConvertError::Read(_)));
        assert!(err.to_string().starts_with("cannot read input"));
        assert!(codec.recorded_qualities().is_empty());
    }

    #[test]
    fn file_is_read_when_converted() {
        let codec = MockCodec::linear(100);
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("photo.png");
        std::fs::write(&path, png_bytes(8, 8)).unwrap();

        let item = PendingItem::on_disk("photo.png", &path);
        let out = load_and_convert(&codec, item, &config(4000, 0)).unwrap();
        assert_eq!(out.name, "photo.avif");
        assert_eq!(out.original_size, png_bytes(8, 8).len() as u64);
    }

    #[test]
    fn all_encodes_failing_is_quality_not_found() {
        let codec = MockCodec::linear(100).failing_at(1..=100);
        let item = InputItem::new("photo.png", png_bytes(8, 8));

        let err = convert_with_codec(&codec, &item, &config(4000, 0)).unwrap_err();
        assert!(matches!(err, ConvertError::QualityNotFound { iterations: 6 }));
    }

    #[test]
    fn final_encode_failure_is_encode_error() {
        let codec = MockCodec::linear(100).failing_final_at(50);
        let item = InputItem::new("photo.png", png_bytes(8, 8));

        let err = convert_with_codec(&codec, &item, &config(5000, 0)).unwrap_err();
        assert!(matches!(err, ConvertError::Encode(_)));
    }

    #[test]
    fn keep_original_name_is_honoured() {
        let codec = MockCodec::linear(100);
        let item = InputItem::new("Photo.AVIF", png_bytes(4, 4));
        let cfg = ConversionConfig::new(5000, 0, 10, QualityMode::Mse, true).unwrap();

        let out = convert_with_codec(&codec, &item, &cfg).unwrap();
        assert_eq!(out.name, "Photo.AVIF");
    }

    #[test]
    fn out_of_tolerance_result_still_converts() {
        let codec = MockCodec::linear(1000);
        let item = InputItem::new("photo.png", png_bytes(4, 4));

        let out = convert_with_codec(&codec, &item, &config(3500, 0)).unwrap();
        assert!(!out.in_tolerance);
        assert_eq!(out.quality, Quality::new(3));
    }

    #[test]
    fn compression_ratio_reflects_sizes() {
        let codec = MockCodec::with_size_fn(|_| 400);
        let item = InputItem::new("photo.png", png_bytes(4, 4));
        let original = item.bytes.len() as f64;

        let out = convert_with_codec(&codec, &item, &config(400, 0)).unwrap();
        let expected = (1.0 - 400.0 / original) * 100.0;
        assert!((out.compression_ratio_percent() - expected).abs() < 1e-9);
    }
}
