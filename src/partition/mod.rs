//! Ingest-time partitioning.
//!
//! A dataset arrives sorted by trip distance, descending. It is cut into `N`
//! contiguous slices of `rows / N` rows each, the last slice taking the
//! remainder, so partition 0 holds the largest distances. Each slice is stored
//! as its own Parquet blob under `{dataset_id}/part{i}`.
//!
//! Sortedness is a precondition. It is only checked when
//! [`PartitionOptions::verify_sorted`] is set; no sort is ever performed here.

use arrow::record_batch::RecordBatch;
use indicatif::ProgressBar;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::Arc;

use crate::error::{OutlierError, Result};
use crate::io::{write_parquet_bytes, PartitionCompression};
use crate::operators::columns::resolve_columns;
use crate::operators::derived::distance_f64;
use crate::storage::{partition_key, StorageGateway};

pub const DEFAULT_NUM_PARTITIONS: usize = 10;

/// What to do when a dataset id has already been partitioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Leave existing partitions alone when partition 0 is present.
    #[default]
    SkipIfExists,
    /// Always rewrite every partition.
    Overwrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionOptions {
    pub num_partitions: usize,
    pub mode: WriteMode,
    pub compression: PartitionCompression,
    pub verify_sorted: bool,
}

impl Default for PartitionOptions {
    fn default() -> Self {
        Self {
            num_partitions: DEFAULT_NUM_PARTITIONS,
            mode: WriteMode::default(),
            compression: PartitionCompression::default(),
            verify_sorted: false,
        }
    }
}

/// Outcome of one ingest call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Written { partitions: usize },
    AlreadyExists,
}

/// Row ranges of each partition. The last range absorbs the remainder.
pub fn partition_bounds(total_rows: usize, num_partitions: usize) -> Vec<Range<usize>> {
    if num_partitions == 0 {
        return Vec::new();
    }

    let rows_per_partition = total_rows / num_partitions;
    (0..num_partitions)
        .map(|i| {
            let start = i * rows_per_partition;
            let end = if i + 1 < num_partitions {
                start + rows_per_partition
            } else {
                total_rows
            };
            start..end
        })
        .collect()
}

/// First row index where distance increases, if any. Nulls are ignored.
fn first_unsorted_row(table: &RecordBatch) -> Result<Option<usize>> {
    let columns = resolve_columns(&table.schema())?;
    let distance_col = table
        .column_by_name(&columns.distance)
        .ok_or_else(|| OutlierError::MalformedInput(format!("{} not found", columns.distance)))?;
    let distance = distance_f64(distance_col)?;

    let mut previous: Option<f64> = None;
    for (idx, value) in distance.iter().enumerate() {
        if let Some(value) = value {
            if previous.is_some_and(|prev| value > prev) {
                return Ok(Some(idx));
            }
            previous = Some(value);
        }
    }
    Ok(None)
}

pub struct Partitioner {
    storage: Arc<dyn StorageGateway>,
    options: PartitionOptions,
    progress: ProgressBar,
}

impl Partitioner {
    pub fn new(storage: Arc<dyn StorageGateway>, options: PartitionOptions) -> Self {
        Self {
            storage,
            options,
            progress: ProgressBar::hidden(),
        }
    }

    /// Report each stored partition on `progress`.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn options(&self) -> &PartitionOptions {
        &self.options
    }

    /// Partition 0 present means the dataset is treated as uploaded. A failed
    /// check counts as absent so a flaky metadata call never blocks ingest.
    fn already_uploaded(&self, dataset_id: &str) -> bool {
        let key = partition_key(dataset_id, 0);
        match self.storage.exists(&key) {
            Ok(exists) => exists,
            Err(e) => {
                log::warn!("exists check for {} failed, assuming absent: {}", key, e);
                false
            }
        }
    }

    fn store_partition(
        &self,
        dataset_id: &str,
        index: usize,
        table: &RecordBatch,
        range: &Range<usize>,
    ) -> Result<()> {
        let slice = table.slice(range.start, range.len());
        let blob = write_parquet_bytes(table.schema(), &slice, self.options.compression)?;
        let key = partition_key(dataset_id, index);
        log::debug!("{}: {} rows, {} bytes", key, slice.num_rows(), blob.len());
        self.storage.put(&key, blob)?;
        self.progress.inc(1);
        Ok(())
    }

    /// Split `table` into partitions and store them.
    ///
    /// `table` must already be sorted by distance, descending. Either every
    /// partition is stored or an error is returned. On a failed first upload
    /// partition 0 is never written, so the dataset is neither reported as
    /// existing nor queryable.
    pub fn ingest(&self, dataset_id: &str, table: &RecordBatch) -> Result<IngestOutcome> {
        let num_partitions = self.options.num_partitions;
        if num_partitions == 0 {
            return Err(OutlierError::InvalidConfig(
                "num_partitions must be at least 1".to_string(),
            ));
        }

        if self.options.mode == WriteMode::SkipIfExists && self.already_uploaded(dataset_id) {
            log::info!("Skipped upload for {} (already exists)", dataset_id);
            self.progress.finish_and_clear();
            return Ok(IngestOutcome::AlreadyExists);
        }

        if self.options.verify_sorted {
            if let Some(row) = first_unsorted_row(table)? {
                return Err(OutlierError::MalformedInput(format!(
                    "{} is not sorted by distance descending (row {} increases)",
                    dataset_id, row
                )));
            }
        }

        let bounds = partition_bounds(table.num_rows(), num_partitions);
        self.progress.set_length(bounds.len() as u64);

        // Partition 0 is the upload marker and the only blob queries read, so
        // it goes in last, once every other partition is stored.
        bounds[1..]
            .par_iter()
            .enumerate()
            .map(|(offset, range)| self.store_partition(dataset_id, offset + 1, table, range))
            .collect::<Result<Vec<()>>>()?;
        self.store_partition(dataset_id, 0, table, &bounds[0])?;

        self.progress.finish();
        log::info!("Uploaded {} partitions for {}", num_partitions, dataset_id);
        Ok(IngestOutcome::Written {
            partitions: num_partitions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::OutlierEngine;
    use crate::error::StorageError;
    use crate::storage::{MemoryStorage, StorageResult};
    use arrow::array::{Float64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use bytes::Bytes;

    /// Memory gateway that can fail writes to one key or every existence check.
    struct FlakyStorage {
        inner: MemoryStorage,
        fail_put_key: Option<String>,
        fail_exists: bool,
    }

    impl FlakyStorage {
        fn new(fail_put_key: Option<&str>, fail_exists: bool) -> Self {
            Self {
                inner: MemoryStorage::new(),
                fail_put_key: fail_put_key.map(str::to_string),
                fail_exists,
            }
        }

        fn unavailable(key: &str) -> StorageError {
            StorageError::Io {
                key: key.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "unavailable"),
            }
        }
    }

    impl StorageGateway for FlakyStorage {
        fn put(&self, key: &str, bytes: Bytes) -> StorageResult<()> {
            if self.fail_put_key.as_deref() == Some(key) {
                return Err(Self::unavailable(key));
            }
            self.inner.put(key, bytes)
        }

        fn get(&self, key: &str) -> StorageResult<Bytes> {
            self.inner.get(key)
        }

        fn exists(&self, key: &str) -> StorageResult<bool> {
            if self.fail_exists {
                return Err(Self::unavailable(key));
            }
            self.inner.exists(key)
        }
    }

    fn trips(n: usize) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("trip_distance", DataType::Float64, true),
            Field::new("tpep_pickup_datetime", DataType::Utf8, true),
            Field::new("tpep_dropoff_datetime", DataType::Utf8, true),
        ]));
        let distances: Vec<f64> = (1..=n).rev().map(|d| d as f64).collect();
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Float64Array::from(distances)),
                Arc::new(StringArray::from(vec!["2020-01-01 10:00:00"; n])),
                Arc::new(StringArray::from(vec!["2020-01-01 11:00:00"; n])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn failed_ingest_never_commits_partition_zero() {
        let storage = Arc::new(FlakyStorage::new(Some("d.parquet/part7"), false));
        let partitioner = Partitioner::new(storage.clone(), PartitionOptions::default());

        let err = partitioner.ingest("d.parquet", &trips(100)).unwrap_err();
        assert!(matches!(err, OutlierError::Storage(_)));
        assert!(!storage.inner.exists("d.parquet/part0").unwrap());

        // A retry is not mistaken for a finished upload
        let err = partitioner.ingest("d.parquet", &trips(100)).unwrap_err();
        assert!(matches!(err, OutlierError::Storage(_)));

        let engine = OutlierEngine::new(storage.clone());
        let err = engine.detect_dataset("d.parquet").unwrap_err();
        match err {
            OutlierError::Storage(e) => assert!(e.is_not_found()),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn failed_exists_check_counts_as_absent() {
        let storage = Arc::new(FlakyStorage::new(None, true));
        storage.inner.put("d.parquet/part0", Bytes::from_static(b"old")).unwrap();
        let writes_before = storage.inner.put_count();

        let partitioner = Partitioner::new(storage.clone(), PartitionOptions::default());
        let outcome = partitioner.ingest("d.parquet", &trips(100)).unwrap();

        assert_eq!(outcome, IngestOutcome::Written { partitions: 10 });
        assert_eq!(storage.inner.put_count() - writes_before, 10);
        assert_ne!(storage.inner.get("d.parquet/part0").unwrap().as_ref(), b"old");
    }

    #[test]
    fn sizes_sum_and_last_absorbs_remainder() {
        for total in [0usize, 1, 9, 10, 11, 99, 100, 101, 1_234] {
            for n in 1..=12usize {
                let bounds = partition_bounds(total, n);
                assert_eq!(bounds.len(), n);

                let sizes: Vec<usize> = bounds.iter().map(|r| r.len()).collect();
                assert_eq!(sizes.iter().sum::<usize>(), total);

                let base = total / n;
                assert!(sizes[..n - 1].iter().all(|&s| s == base));
                assert_eq!(sizes[n - 1], base + total % n);

                // Contiguous and disjoint
                for pair in bounds.windows(2) {
                    assert_eq!(pair[0].end, pair[1].start);
                }
                assert_eq!(bounds[0].start, 0);
                assert_eq!(bounds[n - 1].end, total);
            }
        }
    }

    #[test]
    fn fewer_rows_than_partitions_land_in_last() {
        let bounds = partition_bounds(3, 10);
        assert!(bounds[..9].iter().all(|r| r.is_empty()));
        assert_eq!(bounds[9], 0..3);
    }

    #[test]
    fn zero_partitions_yield_nothing() {
        assert!(partition_bounds(100, 0).is_empty());
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: PartitionOptions = serde_yaml::from_str("mode: overwrite").unwrap();
        assert_eq!(options.mode, WriteMode::Overwrite);
        assert_eq!(options.num_partitions, DEFAULT_NUM_PARTITIONS);
        assert_eq!(options.compression, PartitionCompression::Snappy);
        assert!(!options.verify_sorted);
    }
}
