//! Writing aligned images and the batch report to disk

use crate::config::{DateNaming, OutputConfig, OutputFormat};
use crate::pipeline::{AlignedImage, BatchReport};
use crate::utils::ordering::parse_date_from_filename;
use anyhow::{Context, Result};
use chrono::{NaiveDate, TimeDelta};
use image::RgbImage;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const REPORT_FILE: &str = "report.json";
const DEBUG_PREFIX: &str = "debug_";
const KEEP_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "tif", "tiff"];

#[derive(Debug, Clone, Serialize)]
pub struct WrittenImage {
    pub index: usize,
    pub id: String,
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_path: Option<PathBuf>,
}

#[derive(Serialize)]
struct ReportDocument<'a> {
    summary: String,
    report: &'a BatchReport,
    files: &'a [WrittenImage],
}

pub struct OutputWriter {
    config: OutputConfig,
}

impl OutputWriter {
    pub fn new(config: OutputConfig) -> Self {
        Self { config }
    }

    pub fn directory(&self) -> &Path {
        &self.config.directory
    }

    fn extension_for(&self, source_ext: Option<&str>) -> String {
        match self.config.format {
            OutputFormat::Png => "png".to_string(),
            OutputFormat::Jpeg => "jpg".to_string(),
            OutputFormat::Keep => source_ext
                .map(|e| e.to_ascii_lowercase())
                .filter(|e| KEEP_EXTENSIONS.contains(&e.as_str()))
                .unwrap_or_else(|| "png".to_string()),
        }
    }

    fn output_date(&self, file_name: &str, success_index: usize) -> Option<NaiveDate> {
        match &self.config.date_naming {
            DateNaming::Disabled => None,
            DateNaming::FromFilename { pattern, .. } => parse_date_from_filename(file_name, *pattern),
            DateNaming::FromStartDate {
                start,
                interval_days,
                ..
            } => {
                let offset = interval_days.checked_mul(success_index as i64)?;
                start.checked_add_signed(TimeDelta::try_days(offset)?)
            }
        }
    }

    /// File name for one success. `success_index` counts successes only and
    /// drives start-date naming.
    pub fn output_name(&self, file_name: &str, index: usize, success_index: usize) -> String {
        let path = Path::new(file_name);
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .filter(|s| !s.is_empty());
        let Some(stem) = stem else {
            return format!("unknown_{}.png", index);
        };
        let ext = self.extension_for(path.extension().and_then(|e| e.to_str()));
        let name = format!("{}{}.{}", self.config.prefix, stem, ext);

        let date_format = match &self.config.date_naming {
            DateNaming::Disabled => return name,
            DateNaming::FromFilename { format, .. } | DateNaming::FromStartDate { format, .. } => *format,
        };
        match self.output_date(file_name, success_index) {
            Some(date) => format!("{}_{}", date_format.format(date), name),
            None => name,
        }
    }

    fn save(&self, image: &RgbImage, name: &str) -> Result<PathBuf> {
        let path = self.config.directory.join(name);
        image
            .save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    pub fn write_image(&self, aligned: &AlignedImage, success_index: usize) -> Result<WrittenImage> {
        let name = self.output_name(&aligned.file_name, aligned.index, success_index);
        let path = self.save(&aligned.image, &name)?;
        let debug_path = match &aligned.debug_image {
            Some(debug_image) => Some(self.save(debug_image, &format!("{}{}", DEBUG_PREFIX, name))?),
            None => None,
        };
        debug!(image = %aligned.id, path = %path.display(), "Wrote aligned image");

        Ok(WrittenImage {
            index: aligned.index,
            id: aligned.id.clone(),
            path,
            debug_path,
        })
    }

    /// Write every success of `report`, then `report.json` when enabled.
    pub fn write_batch(&self, report: &BatchReport) -> Result<Vec<WrittenImage>> {
        fs::create_dir_all(&self.config.directory).with_context(|| {
            format!(
                "Failed to create output directory {}",
                self.config.directory.display()
            )
        })?;

        let written = report
            .successes()
            .enumerate()
            .map(|(success_index, aligned)| self.write_image(aligned, success_index))
            .collect::<Result<Vec<_>>>()?;

        if self.config.write_report {
            self.write_report(report, &written)?;
        }

        info!(
            directory = %self.config.directory.display(),
            images = written.len(),
            "Batch output written"
        );
        Ok(written)
    }

    pub fn write_report(&self, report: &BatchReport, written: &[WrittenImage]) -> Result<PathBuf> {
        let path = self.config.directory.join(REPORT_FILE);
        let document = ReportDocument {
            summary: report.summary(),
            report,
            files: written,
        };
        let content = serde_json::to_string_pretty(&document)?;
        fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }
}
