//! Codec trait and shared error type.
//!
//! The [`ImageCodec`] trait defines the operations every codec must support:
//! decode an input buffer, encode an image at given parameters, and name the
//! output file extension.
//!
//! The production implementation is [`AvifCodec`](super::avif::AvifCodec).
//! Tests use [`MockCodec`](tests::MockCodec), whose output size is a pure
//! function of the requested quality.

use super::params::EncodeParams;
use image::DynamicImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Encode failed at quality {quality}: {reason}")]
    Encode { quality: u32, reason: String },
}

/// Trait for target codecs.
///
/// `Sync` so a single codec can be shared by parallel conversion tasks.
pub trait ImageCodec: Sync {
    /// Decode an input buffer (PNG, JPEG, WebP, BMP) into pixels.
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, CodecError>;

    /// Encode `image` into an in-memory buffer.
    ///
    /// Must be deterministic: the same image and params give the same bytes.
    fn encode(&self, image: &DynamicImage, params: &EncodeParams) -> Result<Vec<u8>, CodecError>;

    /// File extension of encoded output, without the dot.
    fn extension(&self) -> &'static str;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::imaging::params::{Quality, QualityMode};
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    /// Mock codec that sizes its output by quality and records every attempt.
    ///
    /// Decoding goes through the real `image` decoders so corrupt inputs fail
    /// exactly as they do in production. Uses Mutex (not RefCell) so it is Sync.
    pub struct MockCodec {
        size_fn: Box<dyn Fn(u32) -> usize + Send + Sync>,
        failing: BTreeSet<u32>,
        fail_final_at: Option<u32>,
        pub encodes: Mutex<Vec<RecordedEncode>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct RecordedEncode {
        pub quality: u32,
        pub mode: QualityMode,
    }

    impl MockCodec {
        /// Output size = `bytes_per_quality * quality`.
        pub fn linear(bytes_per_quality: usize) -> Self {
            Self::with_size_fn(move |q| q as usize * bytes_per_quality)
        }

        pub fn with_size_fn(f: impl Fn(u32) -> usize + Send + Sync + 'static) -> Self {
            Self {
                size_fn: Box::new(f),
                failing: BTreeSet::new(),
                fail_final_at: None,
                encodes: Mutex::new(Vec::new()),
            }
        }

        /// Make these quality levels raise an encode error.
        pub fn failing_at(mut self, qualities: impl IntoIterator<Item = u32>) -> Self {
            self.failing.extend(qualities);
            self
        }

        /// Fail only the second encode at `quality` (the final re-encode).
        pub fn failing_final_at(mut self, quality: u32) -> Self {
            self.fail_final_at = Some(quality);
            self
        }

        pub fn recorded_qualities(&self) -> Vec<u32> {
            self.encodes
                .lock()
                .unwrap()
                .iter()
                .map(|e| e.quality)
                .collect()
        }
    }

    impl ImageCodec for MockCodec {
        fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, CodecError> {
            image::load_from_memory(bytes).map_err(|e| CodecError::Decode(e.to_string()))
        }

        fn encode(
            &self,
            _image: &DynamicImage,
            params: &EncodeParams,
        ) -> Result<Vec<u8>, CodecError> {
            let q = params.quality.value();
            let mut encodes = self.encodes.lock().unwrap();
            let seen_before = encodes.iter().any(|e| e.quality == q);
            encodes.push(RecordedEncode {
                quality: q,
                mode: params.mode,
            });
            drop(encodes);

            if self.failing.contains(&q) || (self.fail_final_at == Some(q) && seen_before) {
                return Err(CodecError::Encode {
                    quality: q,
                    reason: "mock failure".into(),
                });
            }
            Ok(vec![0u8; (self.size_fn)(q)])
        }

        fn extension(&self) -> &'static str {
            "avif"
        }
    }

    fn tiny_image() -> DynamicImage {
        DynamicImage::ImageRgb8(image::RgbImage::new(2, 2))
    }

    #[test]
    fn mock_sizes_output_by_quality() {
        let codec = MockCodec::linear(10);
        let params = EncodeParams {
            quality: Quality::new(42),
            mode: QualityMode::Ssim,
        };

        let bytes = codec.encode(&tiny_image(), &params).unwrap();
        assert_eq!(bytes.len(), 420);

        let encodes = codec.encodes.lock().unwrap();
        assert_eq!(
            *encodes,
            vec![RecordedEncode {
                quality: 42,
                mode: QualityMode::Ssim
            }]
        );
    }

    #[test]
    fn mock_fails_configured_qualities() {
        let codec = MockCodec::linear(10).failing_at([50]);
        let params = EncodeParams {
            quality: Quality::new(50),
            mode: QualityMode::Mse,
        };

        let err = codec.encode(&tiny_image(), &params).unwrap_err();
        assert!(matches!(err, CodecError::Encode { quality: 50, .. }));
    }

    #[test]
    fn mock_rejects_non_image_bytes() {
        let codec = MockCodec::linear(1);
        assert!(matches!(
            codec.decode(b"definitely not an image"),
            Err(CodecError::Decode(_))
        ));
    }
}
