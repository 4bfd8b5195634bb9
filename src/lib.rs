//! Taxi trip outlier detection over distance-sorted Parquet partitions.
//!
//! Ingest splits a dataset, already sorted by trip distance descending, into
//! equal row slices stored as Parquet blobs. A query fetches only the first
//! slice, checks every trip against fixed physical bounds and returns the ten
//! longest implausible trips.

pub mod config;
pub mod engine;
pub mod error;
pub mod io;
pub mod logging;
pub mod operators;
pub mod partition;
pub mod runtime;
pub mod storage;

pub use engine::{detect_outliers_in_partition, OutlierEngine};
pub use error::{OutlierError, Result, StorageError};
pub use partition::{partition_bounds, IngestOutcome, PartitionOptions, Partitioner, WriteMode};
pub use runtime::{detect_outliers, ingest_upload, FileMetadata, OutlierResult, SpeedRating};
pub use storage::{partition_key, LocalStorage, MemoryStorage, StorageGateway};
