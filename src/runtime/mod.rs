use bytes::Bytes;
use std::time::Instant;

use crate::engine::OutlierEngine;
use crate::error::Result;
use crate::io::read_upload;
use crate::operators::batch_to_rows;
use crate::partition::{IngestOutcome, Partitioner};

mod report;
pub use report::{round_ms, write_json_to_file, FileMetadata, OutlierResult, SpeedRating};

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Ingest boundary: validate an uploaded file, then partition it.
///
/// The filename doubles as the dataset id.
pub fn ingest_upload(partitioner: &Partitioner, filename: &str, contents: Bytes) -> Result<FileMetadata> {
    let start = Instant::now();
    let total_size_bytes = contents.len();

    let table = read_upload(filename, contents)?;
    let outcome = partitioner.ingest(filename, &table)?;

    let columns = table
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();

    Ok(FileMetadata {
        filename: filename.to_string(),
        total_rows: table.num_rows(),
        total_size_bytes,
        num_partitions: partitioner.options().num_partitions,
        columns,
        upload_time_ms: round_ms(elapsed_ms(start)),
        already_exists: outcome == IngestOutcome::AlreadyExists,
    })
}

/// Query boundary: top outliers of a dataset plus a timing breakdown.
pub fn detect_outliers(engine: &OutlierEngine, dataset_id: &str) -> Result<OutlierResult> {
    let total_start = Instant::now();

    let download_start = Instant::now();
    let partition = engine.fetch_first_partition(dataset_id)?;
    let download_time_ms = elapsed_ms(download_start);

    let processing_start = Instant::now();
    let outliers = engine.detect(partition)?;
    let processing_time_ms = elapsed_ms(processing_start);

    let total_time_ms = elapsed_ms(total_start);
    let rows = batch_to_rows(&outliers)?;

    let rating = SpeedRating::from_total_ms(total_time_ms);
    log::debug!(
        "{}: {} outliers, download {:.2}ms, processing {:.2}ms",
        dataset_id,
        rows.len(),
        download_time_ms,
        processing_time_ms
    );

    Ok(OutlierResult {
        filename: dataset_id.to_string(),
        outliers: rows,
        download_time_ms: round_ms(download_time_ms),
        processing_time_ms: round_ms(processing_time_ms),
        total_time_ms: round_ms(total_time_ms),
        success: rating.is_success(),
        message: rating.message().to_string(),
    })
}
