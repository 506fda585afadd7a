mod cli;
mod json;

pub use cli::print_cli_table;
pub use json::print_json;

use crate::model::{MetadataSnapshot, Warning};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Output format for scan reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format
    Table,
    /// JSON format for programmatic use
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}. Use 'table' or 'json'", s)),
        }
    }
}

/// The reconciled metadata of one image, ready for display.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub image: String,
    pub scanned_at: DateTime<Utc>,
    pub metadata: MetadataSnapshot,
    pub warnings: Vec<Warning>,
}

impl ScanReport {
    pub fn new(image: impl Into<String>, metadata: MetadataSnapshot, warnings: Vec<Warning>) -> Self {
        Self {
            image: image.into(),
            scanned_at: Utc::now(),
            metadata,
            warnings,
        }
    }
}

pub fn print_report(report: &ScanReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => print_cli_table(report),
        OutputFormat::Json => print_json(report),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_format_from_str() {
        assert_eq!(OutputFormat::from_str("table").unwrap(), OutputFormat::Table);
        assert_eq!(OutputFormat::from_str("JSON").unwrap(), OutputFormat::Json);
        assert!(OutputFormat::from_str("sarif").is_err());
    }

    #[test]
    fn test_report_serializes_warning_tags() {
        let report = ScanReport::new(
            "oci:./image",
            MetadataSnapshot::default(),
            vec![Warning::Base],
        );
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["image"], "oci:./image");
        assert_eq!(value["warnings"][0], "base");
        assert!(value["metadata"]["dependencies"].as_array().unwrap().is_empty());
    }
}
