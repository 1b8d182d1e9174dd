//! Batch conversion pipeline.
//!
//! Drives the [single-item converter](crate::convert) across every input item,
//! keeps running totals, reports progress, and produces a [`RunSummary`].
//!
//! ## Failure semantics
//!
//! Only pre-flight problems abort a run: an invalid input source, or a source
//! with no eligible images. Everything that goes wrong with an individual item
//! (unreadable file, undecodable input, no quality level that encodes, final
//! encode failure, sink write failure) is logged, counted as failed, and the
//! batch moves on. At the end `converted + failed == total`.
//!
//! Files are read one at a time, right before they are converted.
//!
//! ## Logging
//!
//! The [`RunLog`] is cleared when a run starts. A run then logs one start
//! entry, exactly one outcome entry per item, and one summary entry. An empty
//! input logs a single warning and nothing else. An output that replaces an
//! earlier output of the same run adds a warning after the item's entry.
//!
//! ## Concurrency
//!
//! By default items are converted one after another, in the order the source
//! produced them. [`Runner::threads`] enables fan-out/fan-in: conversions run
//! on a rayon pool while a single coordinator (the calling thread) owns the
//! stats, the sink and the log, and applies each outcome as it arrives. A
//! failing item never cancels its siblings.
//!
//! ```text
//! items ──┬─► convert ─┐
//!         ├─► convert ─┼─► coordinator ─► stats / sink / log / events
//!         └─► convert ─┘
//! ```

use crate::config::{ConversionConfig, SourceOptions};
use crate::convert::{ConvertError, load_and_convert};
use crate::imaging::{AvifCodec, ImageCodec};
use crate::log::RunLog;
use crate::output::format_size;
use crate::sink::ResultSink;
use crate::source::{InputSource, SourceError};
use crate::types::{ConvertedItem, InputItem, PendingItem, compression_ratio_percent};
use serde::{Serialize, Serializer};
use std::sync::mpsc::{self, Sender};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunError {
    #[error("Invalid input source: {0}")]
    InvalidInputSource(#[from] SourceError),
    #[error("No eligible images found")]
    EmptyInput,
    #[error("Cannot open run log: {0}")]
    Log(#[source] std::io::Error),
    #[error("Cannot start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Why an item failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Read,
    Decode,
    QualityNotFound,
    Encode,
    SinkWrite,
}

impl From<&ConvertError> for FailureKind {
    fn from(e: &ConvertError) -> Self {
        match e {
            ConvertError::Read(_) => FailureKind::Read,
            ConvertError::Decode(_) => FailureKind::Decode,
            ConvertError::QualityNotFound { .. } => FailureKind::QualityNotFound,
            ConvertError::Encode(_) => FailureKind::Encode,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemResult {
    Converted {
        output: String,
        quality: u32,
        iterations: u32,
        in_tolerance: bool,
        original_size: u64,
        converted_size: u64,
    },
    Failed {
        kind: FailureKind,
        message: String,
    },
}

/// What happened to one input item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemOutcome {
    /// 1-based position of the item in the input order.
    pub index: usize,
    /// Input path relative to the source root.
    pub name: String,
    #[serde(flatten)]
    pub result: ItemResult,
}

impl ItemOutcome {
    pub fn is_converted(&self) -> bool {
        matches!(self.result, ItemResult::Converted { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self.result {
            ItemResult::Failed { kind, .. } => Some(kind),
            ItemResult::Converted { .. } => None,
        }
    }
}

/// Progress notifications, sent while a run is in flight.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Started {
        total: usize,
    },
    ItemFinished {
        /// Items finished so far, including this one.
        completed: usize,
        total: usize,
        outcome: ItemOutcome,
    },
}

/// Running totals for one run.
#[derive(Debug, Clone)]
pub struct RunStats {
    pub converted_count: usize,
    pub failed_count: usize,
    pub original_size_total: u64,
    pub converted_size_total: u64,
    pub started_at: Instant,
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            converted_count: 0,
            failed_count: 0,
            original_size_total: 0,
            converted_size_total: 0,
            started_at: Instant::now(),
        }
    }

    fn record_converted(&mut self, original_size: u64, converted_size: u64) {
        self.converted_count += 1;
        self.original_size_total += original_size;
        self.converted_size_total += converted_size;
    }

    fn record_failed(&mut self) {
        self.failed_count += 1;
    }
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Final report of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub converted_count: usize,
    pub failed_count: usize,
    pub total: usize,
    /// Sum of input sizes of converted items.
    pub original_size_total: u64,
    pub converted_size_total: u64,
    #[serde(rename = "elapsed_seconds", serialize_with = "as_seconds")]
    pub elapsed: Duration,
    /// Per-item outcomes, in input order.
    pub outcomes: Vec<ItemOutcome>,
}

impl RunSummary {
    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    /// Overall `(1 - converted/original) * 100`; `None` when nothing was converted.
    pub fn compression_ratio_percent(&self) -> Option<f64> {
        (self.original_size_total > 0).then(|| {
            compression_ratio_percent(self.original_size_total, self.converted_size_total)
        })
    }
}

fn as_seconds<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Convert `items` with the production AVIF codec, sequentially.
pub fn run(
    items: Vec<InputItem>,
    config: &ConversionConfig,
    sink: &mut dyn ResultSink,
    log: &mut RunLog,
) -> Result<RunSummary, RunError> {
    Runner::new(&AvifCodec::new(), config).run(items, sink, log)
}

fn runner<'a, C: ImageCodec>(
    codec: &'a C,
    config: &'a ConversionConfig,
    events: Option<Sender<RunEvent>>,
) -> Runner<'a, C> {
    let runner = Runner::new(codec, config);
    match events {
        Some(tx) => runner.events(tx),
        None => runner,
    }
}

/// Sequential run over a specific codec (allows testing with mock).
pub fn run_with_codec(
    codec: &impl ImageCodec,
    items: Vec<InputItem>,
    config: &ConversionConfig,
    sink: &mut dyn ResultSink,
    log: &mut RunLog,
    events: Option<Sender<RunEvent>>,
) -> Result<RunSummary, RunError> {
    runner(codec, config, events).run(items, sink, log)
}

/// Collect `source`, then run sequentially.
pub fn run_source_with_codec(
    codec: &impl ImageCodec,
    source: InputSource,
    options: &SourceOptions,
    config: &ConversionConfig,
    sink: &mut dyn ResultSink,
    log: &mut RunLog,
    events: Option<Sender<RunEvent>>,
) -> Result<RunSummary, RunError> {
    runner(codec, config, events).run_source(source, options, sink, log)
}

/// Fan-out/fan-in run on `threads` workers; `threads <= 1` runs sequentially.
pub fn run_parallel_with_codec(
    codec: &impl ImageCodec,
    items: Vec<InputItem>,
    config: &ConversionConfig,
    sink: &mut dyn ResultSink,
    log: &mut RunLog,
    events: Option<Sender<RunEvent>>,
    threads: usize,
) -> Result<RunSummary, RunError> {
    runner(codec, config, events)
        .threads(threads)
        .run(items, sink, log)
}

/// Configured batch run over a specific codec.
pub struct Runner<'a, C: ImageCodec> {
    codec: &'a C,
    config: &'a ConversionConfig,
    threads: usize,
    events: Option<Sender<RunEvent>>,
}

impl<'a, C: ImageCodec> Runner<'a, C> {
    pub fn new(codec: &'a C, config: &'a ConversionConfig) -> Self {
        Self {
            codec,
            config,
            threads: 1,
            events: None,
        }
    }

    /// Number of conversion workers; 1 (the default) converts sequentially.
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Send progress events to `tx` while running.
    pub fn events(mut self, tx: Sender<RunEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Enumerate `source`, then convert everything it yields.
    pub fn run_source(
        &self,
        source: InputSource,
        options: &SourceOptions,
        sink: &mut dyn ResultSink,
        log: &mut RunLog,
    ) -> Result<RunSummary, RunError> {
        log.begin().map_err(RunError::Log)?;
        let items = match source.collect(options) {
            Ok(items) => items,
            Err(e) => {
                log.error(format!("Invalid input source: {e}"));
                return Err(e.into());
            }
        };
        self.execute(items, sink, log)
    }

    /// Convert `items` in the given order.
    pub fn run(
        &self,
        items: Vec<InputItem>,
        sink: &mut dyn ResultSink,
        log: &mut RunLog,
    ) -> Result<RunSummary, RunError> {
        self.run_pending(items.into_iter().map(PendingItem::from).collect(), sink, log)
    }

    /// Convert `items` in the given order, reading each from disk when its turn comes.
    pub fn run_pending(
        &self,
        items: Vec<PendingItem>,
        sink: &mut dyn ResultSink,
        log: &mut RunLog,
    ) -> Result<RunSummary, RunError> {
        log.begin().map_err(RunError::Log)?;
        self.execute(items, sink, log)
    }

    fn execute(
        &self,
        items: Vec<PendingItem>,
        sink: &mut dyn ResultSink,
        log: &mut RunLog,
    ) -> Result<RunSummary, RunError> {
        if items.is_empty() {
            log.warn("No eligible images found");
            return Err(RunError::EmptyInput);
        }

        let total = items.len();
        log.info(format!(
            "Run started: {total} images [target={}, tolerance={}, mode={}, max_iterations={}]",
            format_size(self.config.target_bytes()),
            format_size(self.config.tolerance_bytes()),
            self.config.quality_mode(),
            self.config.max_iterations(),
        ));

        let mut coordinator = Coordinator {
            stats: RunStats::new(),
            total,
            sink,
            log,
            events: self.events.clone(),
            outcomes: Vec::with_capacity(total),
        };
        coordinator.emit(RunEvent::Started { total });

        if self.threads > 1 && total > 1 {
            self.convert_parallel(items, &mut coordinator)?;
        } else {
            for (i, item) in items.into_iter().enumerate() {
                let name = item.display_path();
                let result = load_and_convert(self.codec, item, self.config);
                coordinator.record(i + 1, name, result);
            }
        }

        Ok(coordinator.finish())
    }

    fn convert_parallel(
        &self,
        items: Vec<PendingItem>,
        coordinator: &mut Coordinator<'_>,
    ) -> Result<(), RunError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()?;
        let (tx, rx) = mpsc::channel();
        let codec = self.codec;
        let config = self.config;

        pool.in_place_scope(|scope| {
            for (i, item) in items.into_iter().enumerate() {
                let tx = tx.clone();
                scope.spawn(move |_| {
                    let name = item.display_path();
                    let result = load_and_convert(codec, item, config);
                    // Receiver outlives every task in this scope
                    let _ = tx.send((i + 1, name, result));
                });
            }
            drop(tx);
            for (index, name, result) in rx {
                coordinator.record(index, name, result);
            }
        });
        Ok(())
    }
}

/// Sole owner of everything mutable during a run.
struct Coordinator<'a> {
    stats: RunStats,
    total: usize,
    sink: &'a mut dyn ResultSink,
    log: &'a mut RunLog,
    events: Option<Sender<RunEvent>>,
    outcomes: Vec<ItemOutcome>,
}

impl Coordinator<'_> {
    fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.events {
            // A dropped receiver only means nobody is watching progress
            let _ = tx.send(event);
        }
    }

    fn record(&mut self, index: usize, name: String, result: Result<ConvertedItem, ConvertError>) {
        let outcome = match result {
            Ok(converted) => self.deliver(index, name, converted),
            Err(e) => {
                self.stats.record_failed();
                self.log.error(format!("Failed {name}: {e}"));
                ItemOutcome {
                    index,
                    name,
                    result: ItemResult::Failed {
                        kind: FailureKind::from(&e),
                        message: e.to_string(),
                    },
                }
            }
        };

        self.outcomes.push(outcome.clone());
        self.emit(RunEvent::ItemFinished {
            completed: self.outcomes.len(),
            total: self.total,
            outcome,
        });
    }

    fn deliver(&mut self, index: usize, name: String, converted: ConvertedItem) -> ItemOutcome {
        let requested = converted.display_path();
        let ratio = converted.compression_ratio_percent();
        let (original_size, converted_size) = (converted.original_size, converted.converted_size);
        let (quality, iterations, in_tolerance) =
            (converted.quality, converted.iterations, converted.in_tolerance);

        let placement = match self.sink.accept(converted) {
            Ok(placement) => placement,
            Err(e) => {
                self.stats.record_failed();
                self.log.error(format!("Failed {name}: cannot write {requested}: {e}"));
                return ItemOutcome {
                    index,
                    name,
                    result: ItemResult::Failed {
                        kind: FailureKind::SinkWrite,
                        message: e.to_string(),
                    },
                };
            }
        };

        let output = placement.location;
        self.stats.record_converted(original_size, converted_size);
        self.log.info(format!(
            "Converted {name} -> {output} (quality={quality}, size: {} -> {}, compression: {ratio:.1}%, iterations: {iterations}{})",
            format_size(original_size),
            format_size(converted_size),
            if in_tolerance { "" } else { ", outside tolerance" },
        ));
        if placement.replaced {
            self.log.warn(format!(
                "{output} was already written in this run and has been overwritten by {name}"
            ));
        }
        ItemOutcome {
            index,
            name,
            result: ItemResult::Converted {
                output,
                quality: quality.value(),
                iterations,
                in_tolerance,
                original_size,
                converted_size,
            },
        }
    }

    fn finish(mut self) -> RunSummary {
        self.outcomes.sort_by_key(|o| o.index);
        let stats = self.stats;
        let summary = RunSummary {
            converted_count: stats.converted_count,
            failed_count: stats.failed_count,
            total: self.total,
            original_size_total: stats.original_size_total,
            converted_size_total: stats.converted_size_total,
            elapsed: stats.started_at.elapsed(),
            outcomes: self.outcomes,
        };

        let ratio = summary
            .compression_ratio_percent()
            .map(|r| format!("{r:.1}%"))
            .unwrap_or_else(|| "n/a".to_string());
        self.log.info(format!(
            "Finished: {}/{} converted, {} failed in {:.1}s. Original total: {}, converted total: {}, overall compression: {ratio}",
            summary.converted_count,
            summary.total,
            summary.failed_count,
            summary.elapsed_seconds(),
            format_size(summary.original_size_total),
            format_size(summary.converted_size_total),
        ));
        summary
    }
}
