//! CLI output formatting for conversion runs.
//!
//! # Output Format
//!
//! ## Progress
//!
//! Each finished item leads with its progress position and input path, with
//! the outcome shown as indented context:
//!
//! ```text
//! Converting 3 images
//! 001/003 trips/rome.png → trips/rome.avif
//!     Quality: 41 (7 iterations)
//!     Size: 2.41 MB → 99.8 KB (95.9% smaller)
//! 002/003 broken.png
//!     Failed (decode): cannot decode image: ...
//! 003/003 tiny.png → tiny.avif
//!     Quality: 100 (7 iterations, outside tolerance)
//!     Size: 3.2 KB → 1.1 KB (65.6% smaller)
//! ```
//!
//! ## Summary
//!
//! ```text
//! Converted 2 of 3 images in 4.2s
//!     Failed: 1
//!     Original: 2.42 MB
//!     Converted: 100.9 KB
//!     Compression: 95.9%
//! ```
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `Vec<String>`) for testability
//! and a `print_*` wrapper that writes to stdout. Format functions are pure.

use crate::pipeline::{FailureKind, ItemOutcome, ItemResult, RunEvent, RunSummary};
use crate::types::compression_ratio_percent;

const KB: f64 = 1024.0;
const MB: f64 = 1024.0 * 1024.0;

/// Human-readable byte count: `512 B`, `99.8 KB`, `2.41 MB`.
pub fn format_size(bytes: u64) -> String {
    let b = bytes as f64;
    if b < KB {
        format!("{bytes} B")
    } else if b < MB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{:.2} MB", b / MB)
    }
}

/// Format a 1-based position against a total, zero-padded to at least 3 digits.
fn format_progress(pos: usize, total: usize) -> String {
    let width = total.to_string().len().max(3);
    format!("{pos:0>width$}/{total:0>width$}")
}

fn failure_label(kind: FailureKind) -> &'static str {
    match kind {
        FailureKind::Read => "read",
        FailureKind::Decode => "decode",
        FailureKind::QualityNotFound => "no quality found",
        FailureKind::Encode => "encode",
        FailureKind::SinkWrite => "write",
    }
}

fn outcome_lines(position: &str, outcome: &ItemOutcome) -> Vec<String> {
    match &outcome.result {
        ItemResult::Converted {
            output,
            quality,
            iterations,
            in_tolerance,
            original_size,
            converted_size,
        } => {
            let tolerance = if *in_tolerance {
                ""
            } else {
                ", outside tolerance"
            };
            vec![
                format!("{position} {} → {output}", outcome.name),
                format!("    Quality: {quality} ({iterations} iterations{tolerance})"),
                format!(
                    "    Size: {} → {} ({:.1}% smaller)",
                    format_size(*original_size),
                    format_size(*converted_size),
                    compression_ratio_percent(*original_size, *converted_size)
                ),
            ]
        }
        ItemResult::Failed { kind, message } => vec![
            format!("{position} {}", outcome.name),
            format!("    Failed ({}): {message}", failure_label(*kind)),
        ],
    }
}

/// Format a single progress event as display lines.
pub fn format_event(event: &RunEvent) -> Vec<String> {
    match event {
        RunEvent::Started { total } => {
            let noun = if *total == 1 { "image" } else { "images" };
            vec![format!("Converting {total} {noun}")]
        }
        RunEvent::ItemFinished {
            completed,
            total,
            outcome,
        } => outcome_lines(&format_progress(*completed, *total), outcome),
    }
}

/// Format the end-of-run summary.
pub fn format_summary(summary: &RunSummary) -> Vec<String> {
    let mut lines = vec![format!(
        "Converted {} of {} images in {:.1}s",
        summary.converted_count,
        summary.total,
        summary.elapsed_seconds()
    )];
    if summary.failed_count > 0 {
        lines.push(format!("    Failed: {}", summary.failed_count));
    }
    if let Some(ratio) = summary.compression_ratio_percent() {
        lines.push(format!(
            "    Original: {}",
            format_size(summary.original_size_total)
        ));
        lines.push(format!(
            "    Converted: {}",
            format_size(summary.converted_size_total)
        ));
        lines.push(format!("    Compression: {ratio:.1}%"));
    }
    lines
}

/// Format every outcome of a finished run, in input order.
///
/// Used when progress was not streamed while the run was in flight.
pub fn format_outcomes(summary: &RunSummary) -> Vec<String> {
    summary
        .outcomes
        .iter()
        .flat_map(|o| outcome_lines(&format_progress(o.index, summary.total), o))
        .collect()
}

pub fn print_summary(summary: &RunSummary) {
    for line in format_summary(summary) {
        println!("{line}");
    }
}
