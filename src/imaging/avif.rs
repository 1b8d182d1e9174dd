//! AVIF codec built on the `image` crate ecosystem.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (PNG, JPEG, WebP, BMP) | `image::ImageReader` with format sniffing |
//! | Encode → AVIF | `image::codecs::avif::AvifEncoder` (rav1e) |
//!
//! ## Quality modes
//!
//! The `image` crate's AVIF encoder exposes only speed and quality. The two
//! quality modes map onto encoder speed: MSE runs at speed 6 (throughput
//! default), SSIM at speed 4, which spends more rate-distortion search per
//! frame.

use super::codec::{CodecError, ImageCodec};
use super::params::{EncodeParams, QualityMode};
use image::codecs::avif::AvifEncoder;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::borrow::Cow;
use std::io::Cursor;
use std::sync::LazyLock;

/// Extensions accepted as conversion input, paired with the decoder they need.
const INPUT_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("png", ImageFormat::Png),
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("webp", ImageFormat::WebP),
    ("bmp", ImageFormat::Bmp),
];

static SUPPORTED_EXTENSIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    INPUT_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect()
});

/// Returns the input file extensions that have working decoders compiled in.
pub fn supported_input_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

const SPEED_MSE: u8 = 6;
const SPEED_SSIM: u8 = 4;

/// AVIF codec backed by rav1e through the `image` crate.
///
/// See the [module docs](self) for the crate-to-operation mapping.
#[derive(Debug, Default, Clone, Copy)]
pub struct AvifCodec;

impl AvifCodec {
    pub fn new() -> Self {
        Self
    }

    fn speed(mode: QualityMode) -> u8 {
        match mode {
            QualityMode::Mse => SPEED_MSE,
            QualityMode::Ssim => SPEED_SSIM,
        }
    }
}

/// The AVIF encoder accepts 8-bit RGB/RGBA; convert anything else.
fn encodable(image: &DynamicImage) -> Cow<'_, DynamicImage> {
    match image {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => Cow::Borrowed(image),
        other if other.color().has_alpha() => {
            Cow::Owned(DynamicImage::ImageRgba8(other.to_rgba8()))
        }
        other => Cow::Owned(DynamicImage::ImageRgb8(other.to_rgb8())),
    }
}

impl ImageCodec for AvifCodec {
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, CodecError> {
        ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| CodecError::Decode(e.to_string()))?
            .decode()
            .map_err(|e| CodecError::Decode(e.to_string()))
    }

    fn encode(&self, image: &DynamicImage, params: &EncodeParams) -> Result<Vec<u8>, CodecError> {
        let quality = params.quality.value();
        let mut buffer = Vec::new();
        let encoder =
            AvifEncoder::new_with_speed_quality(&mut buffer, Self::speed(params.mode), quality as u8);
        encodable(image)
            .write_with_encoder(encoder)
            .map_err(|e| CodecError::Encode {
                quality,
                reason: e.to_string(),
            })?;
        Ok(buffer)
    }

    fn extension(&self) -> &'static str {
        "avif"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::params::Quality;
    use crate::test_helpers::{noise_png, png_bytes};

    #[test]
    fn supported_extensions_cover_accepted_inputs() {
        let exts = supported_input_extensions();
        for ext in ["png", "jpg", "jpeg", "webp", "bmp"] {
            assert!(exts.contains(&ext), "missing {ext}");
        }
        assert!(!exts.contains(&"avif"));
    }

    #[test]
    fn ssim_mode_uses_slower_speed() {
        assert!(AvifCodec::speed(QualityMode::Ssim) < AvifCodec::speed(QualityMode::Mse));
    }

    #[test]
    fn decode_png_keeps_dimensions() {
        let codec = AvifCodec::new();
        let img = codec.decode(&png_bytes(12, 7)).unwrap();
        assert_eq!((img.width(), img.height()), (12, 7));
    }

    #[test]
    fn decode_rejects_garbage() {
        let codec = AvifCodec::new();
        assert!(matches!(
            codec.decode(b"\x00\x01 not an image"),
            Err(CodecError::Decode(_))
        ));
    }

    #[test]
    fn encodable_converts_16_bit_to_8_bit() {
        let img = DynamicImage::ImageRgb16(image::ImageBuffer::new(4, 4));
        assert!(matches!(*encodable(&img), DynamicImage::ImageRgb8(_)));

        let img = DynamicImage::ImageLumaA8(image::ImageBuffer::new(4, 4));
        assert!(matches!(*encodable(&img), DynamicImage::ImageRgba8(_)));
    }

    #[test]
    fn encode_produces_avif_container() {
        let codec = AvifCodec::new();
        let img = codec.decode(&noise_png(32, 32, 7)).unwrap();
        let params = EncodeParams {
            quality: Quality::new(50),
            mode: QualityMode::Mse,
        };

        let bytes = codec.encode(&img, &params).unwrap();
        // ISO-BMFF `ftyp` box with the `avif` brand
        assert_eq!(&bytes[4..8], b"ftyp");
        assert_eq!(&bytes[8..12], b"avif");
    }

    #[test]
    fn encode_is_deterministic() {
        let codec = AvifCodec::new();
        let img = codec.decode(&noise_png(24, 24, 3)).unwrap();
        let params = EncodeParams {
            quality: Quality::new(60),
            mode: QualityMode::Mse,
        };

        let a = codec.encode(&img, &params).unwrap();
        let b = codec.encode(&img, &params).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn higher_quality_is_larger_on_noise() {
        let codec = AvifCodec::new();
        let img = codec.decode(&noise_png(48, 48, 11)).unwrap();
        let at = |q| {
            codec
                .encode(
                    &img,
                    &EncodeParams {
                        quality: Quality::new(q),
                        mode: QualityMode::Mse,
                    },
                )
                .unwrap()
                .len()
        };
        assert!(at(10) < at(90));
    }
}
