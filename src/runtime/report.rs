use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::operators::Row;

/// Returned after a dataset upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetadata {
    pub filename: String,
    pub total_rows: usize,
    pub total_size_bytes: usize,
    pub num_partitions: usize,
    pub columns: Vec<String>,
    pub upload_time_ms: f64,
    #[serde(default)]
    pub already_exists: bool,
}

/// Returned by an outlier query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlierResult {
    pub filename: String,
    pub outliers: Vec<Row>,
    pub download_time_ms: f64,
    pub processing_time_ms: f64,
    pub total_time_ms: f64,
    pub success: bool,
    pub message: String,
}

/// Coarse latency band of a query. Reporting only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedRating {
    Under20Ms,
    Under100Ms,
    TooSlow,
}

impl SpeedRating {
    pub fn from_total_ms(total_time_ms: f64) -> Self {
        if total_time_ms < 20.0 {
            SpeedRating::Under20Ms
        } else if total_time_ms < 100.0 {
            SpeedRating::Under100Ms
        } else {
            SpeedRating::TooSlow
        }
    }

    pub fn is_success(self) -> bool {
        self != SpeedRating::TooSlow
    }

    pub fn message(self) -> &'static str {
        match self {
            SpeedRating::Under20Ms => "Amazing! Under 20ms!",
            SpeedRating::Under100Ms => "Not bad! Under 100ms",
            SpeedRating::TooSlow => "Too slow, needs optimization",
        }
    }
}

/// Milliseconds rounded to two decimals.
pub fn round_ms(ms: f64) -> f64 {
    (ms * 100.0).round() / 100.0
}

pub fn write_json_to_file<T: Serialize, P: AsRef<Path>>(value: &T, path: P) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path.as_ref(), json)?;
    Ok(())
}
