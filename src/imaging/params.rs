//! Parameter types for codec operations.
//!
//! These structs describe *what* to encode, not *how*. The quality search
//! builds them and the [`codec`](super::codec) consumes them.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100). Clamped on construction.
//! - [`QualityMode`]: Encoder-side error metric: MSE or SSIM.
//! - [`EncodeParams`]: everything one encode attempt needs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowest quality the search will try.
pub const MIN_QUALITY: u32 = 1;
/// Highest quality the search will try.
pub const MAX_QUALITY: u32 = 100;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quality(u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(MIN_QUALITY, MAX_QUALITY))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error metric the encoder optimises for.
///
/// - `Mse`: mean-squared-error tuning, minimises pixel-level differences.
/// - `Ssim`: structural-similarity tuning, minimises structural differences.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityMode {
    #[default]
    Mse,
    Ssim,
}

impl fmt::Display for QualityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityMode::Mse => f.write_str("MSE"),
            QualityMode::Ssim => f.write_str("SSIM"),
        }
    }
}

/// Parameters for a single encode attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeParams {
    pub quality: Quality,
    pub mode: QualityMode,
}
