//! Settings loading and the immutable per-run configuration.
//!
//! User settings live in an optional `avifit.toml`. Stock defaults are
//! overridden by the file, and command-line flags override both. The merged
//! [`Settings`] are then frozen into a [`ConversionConfig`] (what the search
//! and converter need) and [`SourceOptions`] (what input enumeration needs),
//! which are passed explicitly through every component.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [target]
//! size_kb = 100             # Target output size per image (KB, >= 1)
//! tolerance_kb = 5          # Accepted distance from the target (KB)
//! max_iterations = 10       # Binary-search attempts per image (5-15)
//! quality_mode = "mse"      # "mse" or "ssim"
//!
//! [input]
//! recursive = true          # Descend into subdirectories
//! ignore_hidden = true      # Skip names starting with '.'
//!
//! [output]
//! keep_original_name = false
//! subfolder = "avif"        # Output folder created inside the input directory
//!
//! [log]
//! file = "conversion.log"   # Truncated at the start of every run
//!
//! [processing]
//! max_processes = 4         # Parallel workers (omit for sequential)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::QualityMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Bytes per KB in all size settings.
pub const KB: u64 = 1024;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Settings loaded from `avifit.toml`.
///
/// All fields have defaults. User files need only specify the values they
/// want to override.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Size budget and search behaviour.
    pub target: TargetSettings,
    /// Input enumeration.
    pub input: InputSettings,
    /// Output naming and placement.
    pub output: OutputSettings,
    /// Run log location.
    pub log: LogSettings,
    /// Parallel processing.
    pub processing: ProcessingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TargetSettings {
    /// Target size of each converted image, in KB.
    pub size_kb: u64,
    /// Maximum distance from the target that ends the search early, in KB.
    pub tolerance_kb: u64,
    /// Upper bound on encode attempts per image.
    pub max_iterations: u32,
    /// Encoder error metric.
    pub quality_mode: QualityMode,
}

impl Default for TargetSettings {
    fn default() -> Self {
        Self {
            size_kb: 100,
            tolerance_kb: 5,
            max_iterations: 10,
            quality_mode: QualityMode::Mse,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputSettings {
    pub recursive: bool,
    pub ignore_hidden: bool,
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            recursive: true,
            ignore_hidden: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputSettings {
    pub keep_original_name: bool,
    /// Folder created inside the input directory for converted files.
    pub subfolder: String,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            keep_original_name: false,
            subfolder: "avif".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSettings {
    pub file: PathBuf,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            file: PathBuf::from("conversion.log"),
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel conversion workers.
    /// When absent, items are converted sequentially.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective worker count from config.
///
/// - `None` → 1 (sequential)
/// - `Some(n)` → `min(n, cores)`, at least 1 (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.clamp(1, cores)).unwrap_or(1)
}

impl Settings {
    /// Validate values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target.size_kb == 0 {
            return Err(ConfigError::Validation(
                "target.size_kb must be at least 1".into(),
            ));
        }
        kb_to_bytes(self.target.size_kb, "target.size_kb")?;
        kb_to_bytes(self.target.tolerance_kb, "target.tolerance_kb")?;
        if !(5..=15).contains(&self.target.max_iterations) {
            return Err(ConfigError::Validation(
                "target.max_iterations must be 5-15".into(),
            ));
        }
        if self.output.subfolder.trim().is_empty() {
            return Err(ConfigError::Validation(
                "output.subfolder must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Freeze the conversion-relevant settings for one run.
    pub fn conversion_config(&self) -> Result<ConversionConfig, ConfigError> {
        ConversionConfig::new(
            kb_to_bytes(self.target.size_kb, "target.size_kb")?,
            kb_to_bytes(self.target.tolerance_kb, "target.tolerance_kb")?,
            self.target.max_iterations,
            self.target.quality_mode,
            self.output.keep_original_name,
        )
    }

    /// Input enumeration options for one run.
    pub fn source_options(&self) -> SourceOptions {
        SourceOptions {
            recursive: self.input.recursive,
            ignore_hidden: self.input.ignore_hidden,
            output_subfolder: Some(self.output.subfolder.clone()),
        }
    }
}

fn kb_to_bytes(kb: u64, key: &str) -> Result<u64, ConfigError> {
    kb.checked_mul(KB)
        .ok_or_else(|| ConfigError::Validation(format!("{key} is too large")))
}

/// Immutable per-run conversion settings.
///
/// Constructed once (usually from [`Settings::conversion_config`]) and passed by
/// reference to the search, the converter and the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionConfig {
    target_bytes: u64,
    tolerance_bytes: u64,
    max_iterations: u32,
    quality_mode: QualityMode,
    keep_original_name: bool,
}

impl ConversionConfig {
    /// Build a config, rejecting a zero target or a zero iteration bound.
    pub fn new(
        target_bytes: u64,
        tolerance_bytes: u64,
        max_iterations: u32,
        quality_mode: QualityMode,
        keep_original_name: bool,
    ) -> Result<Self, ConfigError> {
        if target_bytes == 0 {
            return Err(ConfigError::Validation(
                "target size must be greater than zero".into(),
            ));
        }
        if max_iterations == 0 {
            return Err(ConfigError::Validation(
                "max_iterations must be at least 1".into(),
            ));
        }
        Ok(Self {
            target_bytes,
            tolerance_bytes,
            max_iterations,
            quality_mode,
            keep_original_name,
        })
    }

    pub fn target_bytes(&self) -> u64 {
        self.target_bytes
    }

    pub fn tolerance_bytes(&self) -> u64 {
        self.tolerance_bytes
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn quality_mode(&self) -> QualityMode {
        self.quality_mode
    }

    pub fn keep_original_name(&self) -> bool {
        self.keep_original_name
    }
}

impl Default for ConversionConfig {
    fn default() -> Self {
        let target = TargetSettings::default();
        Self {
            target_bytes: target.size_kb * KB,
            tolerance_bytes: target.tolerance_kb * KB,
            max_iterations: target.max_iterations,
            quality_mode: target.quality_mode,
            keep_original_name: false,
        }
    }
}

/// Options for turning an input source into items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOptions {
    pub recursive: bool,
    pub ignore_hidden: bool,
    /// Directory under the input root that holds output; never read as input.
    pub output_subfolder: Option<String>,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Settings::default().source_options()
    }
}

// =============================================================================
// Settings loading, merging, and validation
// =============================================================================

/// Returns the stock default settings as a `toml::Value::Table`.
///
/// This is the base layer user overrides are merged on top of.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(Settings::default()).expect("default settings must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a settings file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_settings(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto the stock defaults, then deserialize and validate.
pub fn resolve_settings(overlay: Option<toml::Value>) -> Result<Settings, ConfigError> {
    let base = stock_defaults_value();
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let settings: Settings = merged.try_into()?;
    settings.validate()?;
    Ok(settings)
}

/// Load settings from `path`, falling back to stock defaults when absent.
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    resolve_settings(load_raw_settings(path)?)
}

/// Returns a fully-commented stock `avifit.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# avifit configuration
# ====================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Command-line flags override this file.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Size target
# ---------------------------------------------------------------------------
[target]
# Target size of every converted image, in KB (1 KB = 1024 bytes).
size_kb = 100

# The search stops as soon as an encode lands within this many KB of the target.
tolerance_kb = 5

# Maximum binary-search encode attempts per image (5-15).
max_iterations = 10

# Encoder error metric: "mse" (pixel differences) or "ssim" (structure).
quality_mode = "mse"

# ---------------------------------------------------------------------------
# Input
# ---------------------------------------------------------------------------
[input]
# Process subdirectories too.
recursive = true

# Skip files and directories whose name starts with '.'.
ignore_hidden = true

# ---------------------------------------------------------------------------
# Output
# ---------------------------------------------------------------------------
[output]
# Keep the original base name (the extension still becomes .avif).
keep_original_name = false

# Folder created inside the input directory for converted images.
subfolder = "avif"

# ---------------------------------------------------------------------------
# Run log
# ---------------------------------------------------------------------------
[log]
# Cleared at the start of every run.
file = "conversion.log"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel conversion workers.
# Omit or comment out to convert one image at a time.
# max_processes = 4
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_settings_match_documented_values() {
        let s = Settings::default();
        assert_eq!(s.target.size_kb, 100);
        assert_eq!(s.target.tolerance_kb, 5);
        assert_eq!(s.target.max_iterations, 10);
        assert_eq!(s.target.quality_mode, QualityMode::Mse);
        assert!(!s.output.keep_original_name);
        assert!(s.input.recursive);
        assert!(s.input.ignore_hidden);
        assert_eq!(s.output.subfolder, "avif");
        assert_eq!(s.log.file, PathBuf::from("conversion.log"));
        assert_eq!(s.processing.max_processes, None);
    }

    #[test]
    fn parse_partial_settings() {
        let toml = r#"
[target]
size_kb = 250
quality_mode = "ssim"
"#;
        let s: Settings = toml::from_str(toml).unwrap();
        assert_eq!(s.target.size_kb, 250);
        assert_eq!(s.target.quality_mode, QualityMode::Ssim);
        // Unspecified defaults preserved
        assert_eq!(s.target.tolerance_kb, 5);
        assert!(s.input.recursive);
    }

    #[test]
    fn unknown_keys_rejected() {
        let toml = r#"
[target]
size_kbs = 250
"#;
        let result: Result<Settings, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn conversion_config_converts_kb_to_bytes() {
        let mut s = Settings::default();
        s.target.size_kb = 100;
        s.target.tolerance_kb = 5;
        s.output.keep_original_name = true;

        let c = s.conversion_config().unwrap();
        assert_eq!(c.target_bytes(), 102_400);
        assert_eq!(c.tolerance_bytes(), 5_120);
        assert_eq!(c.max_iterations(), 10);
        assert!(c.keep_original_name());
    }

    #[test]
    fn conversion_config_rejects_zero_target() {
        let result = ConversionConfig::new(0, 0, 10, QualityMode::Mse, false);
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn conversion_config_rejects_zero_iterations() {
        let result = ConversionConfig::new(1000, 0, 0, QualityMode::Mse, false);
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn conversion_config_allows_zero_tolerance() {
        let c = ConversionConfig::new(1000, 0, 1, QualityMode::Ssim, false).unwrap();
        assert_eq!(c.tolerance_bytes(), 0);
        assert_eq!(c.quality_mode(), QualityMode::Ssim);
    }

    #[test]
    fn validate_rejects_iterations_out_of_range() {
        let mut s = Settings::default();
        s.target.max_iterations = 4;
        assert!(s.validate().is_err());
        s.target.max_iterations = 16;
        assert!(s.validate().is_err());
        s.target.max_iterations = 15;
        assert!(s.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_target() {
        let mut s = Settings::default();
        s.target.size_kb = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn conversion_config_rejects_sizes_that_overflow_bytes() {
        let mut s = Settings::default();
        s.target.size_kb = 18_014_398_509_481_985;
        let err = s.conversion_config().unwrap_err();
        assert!(matches!(&err, ConfigError::Validation(m) if m.contains("target.size_kb")));

        let mut s = Settings::default();
        s.target.tolerance_kb = u64::MAX;
        let err = s.conversion_config().unwrap_err();
        assert!(matches!(&err, ConfigError::Validation(m) if m.contains("target.tolerance_kb")));
    }

    #[test]
    fn resolve_settings_rejects_overflowing_target() {
        let overlay: toml::Value = toml::from_str("[target]\nsize_kb = 18014398509481985").unwrap();
        let result = resolve_settings(Some(overlay));
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn validate_rejects_blank_subfolder() {
        let mut s = Settings::default();
        s.output.subfolder = "  ".into();
        assert!(s.validate().is_err());
    }

    #[test]
    fn source_options_carry_output_subfolder() {
        let mut s = Settings::default();
        s.output.subfolder = "converted".into();
        s.input.recursive = false;

        let o = s.source_options();
        assert!(!o.recursive);
        assert!(o.ignore_hidden);
        assert_eq!(o.output_subfolder.as_deref(), Some("converted"));
    }

    #[test]
    fn effective_threads_defaults_to_sequential() {
        assert_eq!(effective_threads(&ProcessingConfig::default()), 1);
    }

    #[test]
    fn effective_threads_never_zero_and_capped_by_cores() {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let zero = ProcessingConfig {
            max_processes: Some(0),
        };
        assert_eq!(effective_threads(&zero), 1);
        let many = ProcessingConfig {
            max_processes: Some(10_000),
        };
        assert_eq!(effective_threads(&many), cores);
    }

    // =========================================================================
    // merge_toml / load_settings
    // =========================================================================

    #[test]
    fn merge_toml_overlays_nested_keys() {
        let base: toml::Value = toml::from_str("[a]\nx = 1\ny = 2").unwrap();
        let overlay: toml::Value = toml::from_str("[a]\ny = 3").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged["a"]["x"].as_integer(), Some(1));
        assert_eq!(merged["a"]["y"].as_integer(), Some(3));
    }

    #[test]
    fn load_settings_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let s = load_settings(&tmp.path().join("avifit.toml")).unwrap();
        assert_eq!(s, Settings::default());
    }

    #[test]
    fn load_settings_merges_file_over_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("avifit.toml");
        fs::write(&path, "[output]\nsubfolder = \"out\"\n").unwrap();

        let s = load_settings(&path).unwrap();
        assert_eq!(s.output.subfolder, "out");
        assert_eq!(s.target.size_kb, 100);
    }

    #[test]
    fn load_settings_validates_values() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("avifit.toml");
        fs::write(&path, "[target]\nmax_iterations = 40\n").unwrap();

        assert!(matches!(
            load_settings(&path),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn load_settings_reports_bad_toml() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("avifit.toml");
        fs::write(&path, "[target\nsize_kb = ").unwrap();

        assert!(matches!(load_settings(&path), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn stock_config_parses_to_defaults() {
        let s: Settings = toml::from_str(stock_config_toml()).unwrap();
        assert_eq!(s, Settings::default());
    }
}
