//! # avifit
//!
//! Batch-convert raster images to AVIF, hitting a per-image file-size budget.
//! For every image, the encoder quality is searched until the output lands as
//! close as possible to the target size, within a tolerance.
//!
//! # Architecture
//!
//! ```text
//! InputSource ─► Vec<PendingItem> ─► pipeline ─┬─► convert ─► search ─► ImageCodec
//!   (dir / files / zip)                        ├─► ResultSink (files on disk, or zip)
//!                                              ├─► RunLog     (truncated per run)
//!                                              └─► RunEvent   (progress channel)
//! ```
//!
//! The pipeline never sorts, never aborts on a bad item, and keeps
//! `converted + failed == total`. Only an invalid or empty input source stops
//! a run before it starts.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`search`] | Bounded binary search over encoder quality for a target size |
//! | [`convert`] | One item: decode, search, final encode, per-item metrics |
//! | [`pipeline`] | Batch driver: stats, progress events, summary, sequential or rayon fan-out |
//! | [`source`] | Directory walk, upload list, and zip archive enumeration |
//! | [`sink`] | Filesystem output tree, or in-memory collection packaged as a zip |
//! | [`log`] | Per-run log with `timestamp - LEVEL - message` lines |
//! | [`config`] | `avifit.toml` loading, merging over stock defaults, validation |
//! | [`imaging`] | `ImageCodec` seam and the production AVIF codec |
//! | [`naming`] | Output file name derivation |
//! | [`types`] | Input and converted item types shared across stages |
//! | [`output`] | CLI output formatting for progress and summaries |
//!
//! # Design Decisions
//!
//! ## Size Targeting Over Fixed Quality
//!
//! A fixed quality produces wildly different sizes depending on image content.
//! When the constraint is a byte budget (upload limits, page weight), searching
//! quality per image is the only way to respect it. The search is bounded by
//! `max_iterations`, so worst-case cost per image is known up front.
//!
//! ## Codec Behind a Trait
//!
//! The search and the pipeline only see [`imaging::ImageCodec`]. Tests run the
//! whole batch logic against a deterministic mock whose output size is a
//! function of quality, and the real AVIF encoder is exercised separately in
//! `tests/`.
//!
//! ## Pure-Rust Imaging
//!
//! Decoding and AVIF encoding use the `image` crate (with `rav1e` underneath).
//! No system libraries are needed; the binary is self-contained.

pub mod config;
pub mod convert;
pub mod imaging;
pub mod log;
pub mod naming;
pub mod output;
pub mod pipeline;
pub mod search;
pub mod sink;
pub mod source;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
