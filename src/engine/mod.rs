//! Query-time outlier detection.
//!
//! Only partition 0 of a dataset is fetched. Because datasets are partitioned
//! in descending distance order, that partition already holds the rows the
//! ranking would surface first.

use arrow::record_batch::RecordBatch;
use std::sync::Arc;

use crate::error::Result;
use crate::io::read_parquet_bytes;
use crate::operators::{apply_all, outlier_pipeline, Operator, ValidityRules, DEFAULT_TOP_K};
use crate::storage::{partition_key, StorageGateway};

pub struct OutlierEngine {
    storage: Arc<dyn StorageGateway>,
    pipeline: Vec<Box<dyn Operator>>,
}

impl OutlierEngine {
    pub fn new(storage: Arc<dyn StorageGateway>) -> Self {
        Self {
            storage,
            pipeline: outlier_pipeline(ValidityRules::default(), DEFAULT_TOP_K),
        }
    }

    /// Download and decode partition 0, the top slice by distance.
    pub fn fetch_first_partition(&self, dataset_id: &str) -> Result<RecordBatch> {
        let key = partition_key(dataset_id, 0);
        let bytes = self.storage.get(&key)?;
        log::debug!("fetched {} ({} bytes)", key, bytes.len());
        read_parquet_bytes(bytes)
    }

    /// Classify and rank an already fetched partition.
    ///
    /// Output keeps every input column under its canonical name, appends
    /// `trip_duration_hours` and `avg_speed_mph`, and holds at most ten rows
    /// sorted by `trip_distance` descending.
    pub fn detect(&self, partition: RecordBatch) -> Result<RecordBatch> {
        apply_all(&self.pipeline, partition)
    }

    /// Fetch partition 0 of `dataset_id` and return its top outliers.
    pub fn detect_dataset(&self, dataset_id: &str) -> Result<RecordBatch> {
        let partition = self.fetch_first_partition(dataset_id)?;
        self.detect(partition)
    }
}

/// Pipeline over a single table, without storage.
pub fn detect_outliers_in_partition(partition: RecordBatch) -> Result<RecordBatch> {
    apply_all(
        &outlier_pipeline(ValidityRules::default(), DEFAULT_TOP_K),
        partition,
    )
}
