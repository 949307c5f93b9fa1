use crate::logging::LoggingConfig;
use crate::utils::ordering::{DatePattern, SortOrder};
use anyhow::{bail, Context};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const EYE_DISTANCE_PERCENT_RANGE: (f64, f64) = (15.0, 45.0);
pub const TILT_THRESHOLD_RANGE: (f64, f64) = (1.0, 30.0);
pub const OUTPUT_SIDE_RANGE: (u32, u32) = (16, 10000);

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub estimator: EstimatorConfig,
    pub warp: WarpConfig,
    pub output: OutputConfig,
    pub ordering: OrderingConfig,
    pub logging: LoggingConfig,
}

/// Runtime-mutable alignment settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub output_size: (u32, u32),
    pub eye_distance_percent: f64,
    pub tilt_threshold_degrees: f64,
    pub filter_tilted: bool,
    pub preserve_background: bool,
    pub force_reference_size: bool,
    pub debug_mode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Residual at the secondary point (px) above which translation is nudged
    pub alignment_tolerance: f64,
    /// Fraction of the secondary-point residual applied as a nudge
    pub correction_factor: f64,
    pub max_rotation_degrees: f64,
    pub min_scale: f64,
    pub max_scale: f64,
    /// Advisory only, never gates output
    pub quality_threshold: f64,
    pub min_error_px: f64,
    pub error_diagonal_fraction: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    Bilinear,
    Bicubic,
}

/// How pixels outside the source image are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BorderMode {
    Replicate,
    Reflect,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarpConfig {
    pub interpolation: Interpolation,
    pub border: BorderMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Png,
    Jpeg,
    /// Keep the extension of the source file name
    Keep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateFormat {
    #[serde(rename = "YYYY-MM-DD")]
    YearMonthDay,
    #[serde(rename = "MM-DD-YYYY")]
    MonthDayYear,
    #[serde(rename = "DD-MM-YYYY")]
    DayMonthYear,
}

impl DateFormat {
    pub fn format(&self, date: NaiveDate) -> String {
        let fmt = match self {
            DateFormat::YearMonthDay => "%Y-%m-%d",
            DateFormat::MonthDayYear => "%m-%d-%Y",
            DateFormat::DayMonthYear => "%d-%m-%Y",
        };
        date.format(fmt).to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum DateNaming {
    Disabled,
    FromFilename {
        pattern: DatePattern,
        format: DateFormat,
    },
    FromStartDate {
        start: NaiveDate,
        interval_days: i64,
        format: DateFormat,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub prefix: String,
    pub format: OutputFormat,
    pub date_naming: DateNaming,
    pub write_report: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OrderingConfig {
    /// Sort inputs by a date parsed from their file names
    pub sort_by_date: Option<DatePattern>,
    pub order: SortOrder,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            output_size: (512, 512),
            eye_distance_percent: 30.0,
            tilt_threshold_degrees: 5.0,
            filter_tilted: true,
            preserve_background: true,
            force_reference_size: true,
            debug_mode: false,
        }
    }
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            alignment_tolerance: 2.0,
            correction_factor: 0.3,
            max_rotation_degrees: 8.0,
            min_scale: 0.5,
            max_scale: 2.0,
            quality_threshold: 0.95,
            min_error_px: 15.0,
            error_diagonal_fraction: 0.01,
        }
    }
}

impl Default for WarpConfig {
    fn default() -> Self {
        Self {
            interpolation: Interpolation::Bicubic,
            border: BorderMode::Replicate,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("aligned"),
            prefix: "aligned_".to_string(),
            format: OutputFormat::Keep,
            date_naming: DateNaming::Disabled,
            write_report: true,
        }
    }
}

pub fn check_eye_distance_percent(percent: f64) -> Result<(), String> {
    let (min, max) = EYE_DISTANCE_PERCENT_RANGE;
    if !(min..=max).contains(&percent) {
        return Err(format!(
            "eye_distance_percent must be within [{}, {}], got {}",
            min, max, percent
        ));
    }
    Ok(())
}

pub fn check_tilt_threshold(degrees: f64) -> Result<(), String> {
    let (min, max) = TILT_THRESHOLD_RANGE;
    if !(min..=max).contains(&degrees) {
        return Err(format!(
            "tilt_threshold_degrees must be within [{}, {}], got {}",
            min, max, degrees
        ));
    }
    Ok(())
}

pub fn check_output_size(size: (u32, u32)) -> Result<(), String> {
    let (min, max) = OUTPUT_SIDE_RANGE;
    if size.0 < min || size.1 < min || size.0 > max || size.1 > max {
        return Err(format!(
            "output_size sides must be within [{}, {}], got {}x{}",
            min, max, size.0, size.1
        ));
    }
    Ok(())
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let errors: Vec<String> = [
            check_eye_distance_percent(self.eye_distance_percent),
            check_tilt_threshold(self.tilt_threshold_degrees),
            check_output_size(self.output_size),
        ]
        .into_iter()
        .filter_map(Result::err)
        .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl EstimatorConfig {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.alignment_tolerance <= 0.0 {
            errors.push("alignment_tolerance must be positive".to_string());
        }

        if !(0.0..=1.0).contains(&self.correction_factor) {
            errors.push("correction_factor must be within [0, 1]".to_string());
        }

        if self.max_rotation_degrees <= 0.0 || self.max_rotation_degrees > 180.0 {
            errors.push("max_rotation_degrees must be within (0, 180]".to_string());
        }

        if self.min_scale <= 0.0 || self.min_scale >= self.max_scale {
            errors.push("scale bounds must satisfy 0 < min_scale < max_scale".to_string());
        }

        if self.min_error_px <= 0.0 {
            errors.push("min_error_px must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;

        if content.trim_start().starts_with('{') {
            Ok(serde_json::from_str(&content)?)
        } else {
            Ok(toml::from_str(&content)?)
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P, format: ConfigFormat) -> anyhow::Result<()> {
        let content = match format {
            ConfigFormat::Json => serde_json::to_string_pretty(self)?,
            ConfigFormat::Toml => toml::to_string_pretty(self)?,
        };

        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if let Err(e) = self.engine.validate() {
            errors.extend(e);
        }

        if let Err(e) = self.estimator.validate() {
            errors.extend(e);
        }

        if self.output.prefix.contains(['/', '\\']) {
            errors.push("output prefix must not contain path separators".to_string());
        }

        if let Err(e) = self.logging.validate() {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone)]
pub enum ConfigFormat {
    Json,
    Toml,
}

/// Defaults when no path is given; otherwise the file, which must load and
/// pass validation.
pub fn load_config(config_path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = config_path else {
        return Ok(Config::default());
    };

    let config = Config::load_from_file(path)
        .with_context(|| format!("Failed to load config {}", path.display()))?;
    if let Err(errors) = config.validate() {
        bail!(
            "Invalid configuration in {}:\n  {}",
            path.display(),
            errors.join("\n  ")
        );
    }
    Ok(config)
}
