//! Image codec layer, pure Rust with no system libraries.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::ImageReader` (PNG, JPEG, WebP, BMP) |
//! | **Encode → AVIF** | `image::codecs::avif::AvifEncoder` (rav1e) |
//!
//! The module is split into:
//! - **Parameters**: [`Quality`], [`QualityMode`], [`EncodeParams`]
//! - **Codec**: [`ImageCodec`] trait + [`CodecError`]
//! - **AVIF**: [`AvifCodec`], the production codec

pub mod avif;
pub mod codec;
mod params;

pub use avif::{AvifCodec, supported_input_extensions};
pub use codec::{CodecError, ImageCodec};
pub use params::{EncodeParams, MAX_QUALITY, MIN_QUALITY, Quality, QualityMode};
