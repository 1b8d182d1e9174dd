//! Size-targeted quality search.
//!
//! Binary search over encoder quality `1..=100` for the level whose output
//! size is closest to a byte target. The search relies on the general trend
//! that higher quality means a larger file; it does not require strict
//! monotonicity, but a non-monotonic codec may settle on a local optimum.
//!
//! ```text
//! low=1 high=100
//! loop while low <= high and iterations < max_iterations:
//!     mid = (low + high) / 2, encode at mid -> size s
//!     encode error      -> high = mid - 1          (treated as "too large")
//!     |s - target| <= tol -> return mid            (early exit, in tolerance)
//!     s > target        -> high = mid - 1
//!     otherwise         -> low  = mid + 1
//! ```
//!
//! The closest candidate seen so far is tracked with a strict `<`, so the
//! first of two equally distant candidates wins.

use crate::imaging::{
    CodecError, EncodeParams, ImageCodec, MAX_QUALITY, MIN_QUALITY, Quality, QualityMode,
};
use image::DynamicImage;
use tracing::{debug, warn};

/// What the search is aiming for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchParams {
    pub target_bytes: u64,
    pub tolerance_bytes: u64,
    pub max_iterations: u32,
    pub mode: QualityMode,
}

/// A quality level that encoded successfully, with its output size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub quality: Quality,
    pub size: u64,
}

/// Outcome of a single encode attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Encoded { size: u64 },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub quality: Quality,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    /// Closest candidate seen; `None` if every attempt failed to encode.
    pub best: Option<Candidate>,
    /// Encode attempts made, including failed ones.
    pub iterations: u32,
    pub in_tolerance: bool,
    /// Every attempt in the order it was made.
    pub attempts: Vec<Attempt>,
}

impl SearchResult {
    pub fn quality(&self) -> Option<Quality> {
        self.best.map(|c| c.quality)
    }

    pub fn size(&self) -> Option<u64> {
        self.best.map(|c| c.size)
    }
}

/// Find the quality whose encoded size is closest to `params.target_bytes`.
pub fn search(
    codec: &impl ImageCodec,
    image: &DynamicImage,
    params: &SearchParams,
) -> SearchResult {
    let mut low = MIN_QUALITY;
    let mut high = MAX_QUALITY;
    let mut best: Option<Candidate> = None;
    let mut iterations = 0;
    let mut attempts = Vec::new();

    while low <= high && iterations < params.max_iterations {
        let mid = (low + high) / 2;
        let quality = Quality::new(mid);
        iterations += 1;

        let encode_params = EncodeParams {
            quality,
            mode: params.mode,
        };
        let size = match codec.encode(image, &encode_params) {
            Ok(bytes) => bytes.len() as u64,
            Err(e) => {
                warn!(quality = mid, error = %e, "encode attempt failed, lowering quality");
                attempts.push(Attempt {
                    quality,
                    outcome: AttemptOutcome::Failed {
                        reason: failure_reason(e),
                    },
                });
                high = mid - 1;
                continue;
            }
        };
        attempts.push(Attempt {
            quality,
            outcome: AttemptOutcome::Encoded { size },
        });

        let distance = size.abs_diff(params.target_bytes);
        debug!(quality = mid, size, distance, "search attempt");

        if best.is_none_or(|b| distance < b.size.abs_diff(params.target_bytes)) {
            best = Some(Candidate { quality, size });
        }

        if distance <= params.tolerance_bytes {
            return SearchResult {
                best: Some(Candidate { quality, size }),
                iterations,
                in_tolerance: true,
                attempts,
            };
        }

        if size > params.target_bytes {
            high = mid - 1;
        } else {
            low = mid + 1;
        }
    }

    let in_tolerance =
        best.is_some_and(|b| b.size.abs_diff(params.target_bytes) <= params.tolerance_bytes);
    SearchResult {
        best,
        iterations,
        in_tolerance,
        attempts,
    }
}

fn failure_reason(e: CodecError) -> String {
    match e {
        CodecError::Encode { reason, .. } => reason,
        other => other.to_string(),
    }
}
