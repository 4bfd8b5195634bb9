use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use serde::{Deserialize, Serialize};

use crate::error::{OutlierError, Result};

/// Codec used for partition blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionCompression {
    #[default]
    Snappy,
    Zstd,
    Uncompressed,
}

impl PartitionCompression {
    fn codec(self) -> Compression {
        match self {
            PartitionCompression::Snappy => Compression::SNAPPY,
            PartitionCompression::Zstd => Compression::ZSTD(ZstdLevel::default()),
            PartitionCompression::Uncompressed => Compression::UNCOMPRESSED,
        }
    }
}

/// Decode a Parquet blob into a single batch carrying the file's schema.
pub fn read_parquet_bytes(bytes: Bytes) -> Result<RecordBatch> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(bytes)?;
    let schema = builder.schema().clone();
    let reader = builder.build()?;

    let mut batches = Vec::new();
    for batch in reader {
        batches.push(batch?);
    }

    Ok(concat_batches(&schema, &batches)?)
}

/// Encode one table slice as a self-contained Parquet blob (schema included).
pub fn write_parquet_bytes(
    schema: SchemaRef,
    batch: &RecordBatch,
    compression: PartitionCompression,
) -> Result<Bytes> {
    let props = WriterProperties::builder()
        .set_compression(compression.codec())
        .build();

    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, schema, Some(props))?;
    // Empty slices still produce a valid file holding only the schema
    if batch.num_rows() > 0 {
        writer.write(batch)?;
    }
    writer.close()?;

    Ok(Bytes::from(buffer))
}

/// Validate and decode an uploaded dataset file.
///
/// The filename must carry a `.parquet` extension and the bytes must decode as
/// Parquet; anything else is [`OutlierError::MalformedInput`].
pub fn read_upload(filename: &str, contents: Bytes) -> Result<RecordBatch> {
    if !filename.ends_with(".parquet") {
        return Err(OutlierError::MalformedInput(format!(
            "File must be a .parquet file: {}",
            filename
        )));
    }

    read_parquet_bytes(contents).map_err(|e| {
        OutlierError::MalformedInput(format!("{} is not a readable parquet file: {}", filename, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Float64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn sample_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("trip_distance", DataType::Float64, true),
            Field::new("vendor", DataType::Utf8, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Float64Array::from(vec![Some(12.5), None, Some(3.0)])),
                Arc::new(StringArray::from(vec!["CMT", "VTS", "DDS"])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn blob_keeps_schema_and_nulls() {
        let batch = sample_batch();
        let bytes =
            write_parquet_bytes(batch.schema(), &batch, PartitionCompression::Snappy).unwrap();

        let decoded = read_parquet_bytes(bytes).unwrap();
        assert_eq!(decoded.schema().fields().len(), 2);
        assert_eq!(decoded.num_rows(), 3);
        assert!(decoded.column(0).is_null(1));
    }

    #[test]
    fn empty_slice_encodes_schema_only() {
        let batch = sample_batch().slice(0, 0);
        let bytes =
            write_parquet_bytes(batch.schema(), &batch, PartitionCompression::Zstd).unwrap();

        let decoded = read_parquet_bytes(bytes).unwrap();
        assert_eq!(decoded.num_rows(), 0);
        assert_eq!(decoded.schema().field(1).name(), "vendor");
    }

    #[test]
    fn upload_requires_parquet_extension() {
        let err = read_upload("trips.csv", Bytes::from_static(b"a,b\n1,2\n")).unwrap_err();
        assert!(matches!(err, OutlierError::MalformedInput(_)));
    }

    #[test]
    fn upload_rejects_garbage_bytes() {
        let err = read_upload("trips.parquet", Bytes::from_static(b"not parquet")).unwrap_err();
        assert!(matches!(err, OutlierError::MalformedInput(_)));
    }
}
