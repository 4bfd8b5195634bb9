use arrow::array::{
    Array, ArrayRef, Float64Array, LargeStringArray, StringArray, TimestampMicrosecondArray,
};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDateTime;
use std::sync::Arc;

use crate::error::{OutlierError, Result};
use crate::operators::columns::ColumnRole;

pub const DURATION_COLUMN: &str = "trip_duration_hours";
pub const SPEED_COLUMN: &str = "avg_speed_mph";

/// Text layout of timestamps in older vintages.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const MICROS_PER_HOUR: f64 = 3_600.0 * 1_000_000.0;

/// Appends `trip_duration_hours` and `avg_speed_mph` to a canonicalized batch.
pub struct DerivedMetricsAnnotator;

/// Pickup/dropoff as microsecond timestamps, whatever their stored type.
pub fn timestamp_micros(column: &ArrayRef, name: &str) -> Result<TimestampMicrosecondArray> {
    match column.data_type() {
        DataType::Utf8 => {
            let strings = column
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| OutlierError::MalformedInput(format!("{} is not Utf8", name)))?;
            parse_timestamps(strings.iter(), name)
        }
        DataType::LargeUtf8 => {
            let strings = column
                .as_any()
                .downcast_ref::<LargeStringArray>()
                .ok_or_else(|| OutlierError::MalformedInput(format!("{} is not LargeUtf8", name)))?;
            parse_timestamps(strings.iter(), name)
        }
        DataType::Timestamp(_, tz) => {
            let micros = cast(column, &DataType::Timestamp(TimeUnit::Microsecond, tz.clone()))?;
            micros
                .as_any()
                .downcast_ref::<TimestampMicrosecondArray>()
                .cloned()
                .ok_or_else(|| {
                    OutlierError::MalformedInput(format!("{} did not cast to microseconds", name))
                })
        }
        other => Err(OutlierError::MalformedInput(format!(
            "{} has type {:?}, expected a timestamp or text",
            name, other
        ))),
    }
}

fn parse_timestamps<'a>(
    values: impl Iterator<Item = Option<&'a str>>,
    name: &str,
) -> Result<TimestampMicrosecondArray> {
    let parsed = values
        .map(|value| match value {
            Some(text) => NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
                .map(|ts| Some(ts.and_utc().timestamp_micros()))
                .map_err(|e| {
                    OutlierError::MalformedInput(format!(
                        "{} value '{}' does not match {}: {}",
                        name, text, TIMESTAMP_FORMAT, e
                    ))
                }),
            None => Ok(None),
        })
        .collect::<Result<Vec<Option<i64>>>>()?;

    Ok(TimestampMicrosecondArray::from(parsed))
}

/// Hours between pickup and dropoff. Null if either side is null.
pub fn duration_hours(
    pickup: &TimestampMicrosecondArray,
    dropoff: &TimestampMicrosecondArray,
) -> Float64Array {
    pickup
        .iter()
        .zip(dropoff.iter())
        .map(|(start, end)| match (start, end) {
            (Some(start), Some(end)) => Some(end.wrapping_sub(start) as f64 / MICROS_PER_HOUR),
            _ => None,
        })
        .collect()
}

/// Distance over duration. Zero or negative durations yield ±inf/NaN, never a trap.
pub fn average_speed(distance: &Float64Array, hours: &Float64Array) -> Float64Array {
    distance
        .iter()
        .zip(hours.iter())
        .map(|(miles, hours)| match (miles, hours) {
            (Some(miles), Some(hours)) => Some(miles / hours),
            _ => None,
        })
        .collect()
}

/// Distance column as Float64 regardless of its stored numeric type.
pub fn distance_f64(column: &ArrayRef) -> Result<Float64Array> {
    let as_f64 = cast(column, &DataType::Float64)?;
    as_f64
        .as_any()
        .downcast_ref::<Float64Array>()
        .cloned()
        .ok_or_else(|| OutlierError::MalformedInput("distance is not numeric".to_string()))
}

fn column_by_name<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef> {
    batch.column_by_name(name).ok_or_else(|| {
        OutlierError::MalformedInput(format!("Column {} not found after canonicalization", name))
    })
}

fn is_derived_name(name: &str) -> bool {
    name == DURATION_COLUMN || name == SPEED_COLUMN
}

impl_operator! {
    DerivedMetricsAnnotator,
    name: "derived-metrics",
    kind: "annotator",
    apply: |self, batch| {
        let distance_name = ColumnRole::Distance.canonical_name();
        let pickup_name = ColumnRole::Pickup.canonical_name();
        let dropoff_name = ColumnRole::Dropoff.canonical_name();

        let distance = distance_f64(column_by_name(&batch, distance_name)?)?;
        let pickup = timestamp_micros(column_by_name(&batch, pickup_name)?, pickup_name)?;
        let dropoff = timestamp_micros(column_by_name(&batch, dropoff_name)?, dropoff_name)?;

        let hours = duration_hours(&pickup, &dropoff);
        let speed = average_speed(&distance, &hours);

        // Computed metrics replace any source columns sharing their names
        let schema = batch.schema();
        let (mut fields, mut columns): (Vec<_>, Vec<_>) = schema
            .fields()
            .iter()
            .zip(batch.columns())
            .filter(|(field, _)| {
                let derived = is_derived_name(field.name());
                if derived {
                    log::debug!("derived-metrics: replacing source column {}", field.name());
                }
                !derived
            })
            .map(|(field, column)| (field.clone(), column.clone()))
            .unzip();

        fields.push(Arc::new(Field::new(DURATION_COLUMN, DataType::Float64, true)));
        fields.push(Arc::new(Field::new(SPEED_COLUMN, DataType::Float64, true)));
        columns.push(Arc::new(hours));
        columns.push(Arc::new(speed));

        let annotated = Schema::new_with_metadata(fields, schema.metadata().clone());
        Ok(RecordBatch::try_new(Arc::new(annotated), columns)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::Operator;
    use arrow::array::{Int64Array, TimestampSecondArray};

    fn text_batch(pickup: Vec<Option<&str>>, dropoff: Vec<Option<&str>>, miles: Vec<f64>) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("trip_distance", DataType::Float64, true),
            Field::new("tpep_pickup_datetime", DataType::Utf8, true),
            Field::new("tpep_dropoff_datetime", DataType::Utf8, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Float64Array::from(miles)),
                Arc::new(StringArray::from(pickup)),
                Arc::new(StringArray::from(dropoff)),
            ],
        )
        .unwrap()
    }

    fn f64_column(batch: &RecordBatch, name: &str) -> Float64Array {
        batch
            .column_by_name(name)
            .unwrap()
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap()
            .clone()
    }

    #[test]
    fn text_timestamps_are_parsed() {
        let batch = text_batch(
            vec![Some("2009-01-04 02:52:00"), Some("2009-01-04 03:31:00")],
            vec![Some("2009-01-04 03:22:00"), Some("2009-01-04 05:31:00")],
            vec![15.0, 30.0],
        );

        let out = DerivedMetricsAnnotator.apply(batch).unwrap();
        assert_eq!(out.num_columns(), 5);

        let hours = f64_column(&out, DURATION_COLUMN);
        let speed = f64_column(&out, SPEED_COLUMN);
        assert!((hours.value(0) - 0.5).abs() < 1e-12);
        assert!((hours.value(1) - 2.0).abs() < 1e-12);
        assert!((speed.value(0) - 30.0).abs() < 1e-9);
        assert!((speed.value(1) - 15.0).abs() < 1e-9);

        // Source columns stay text
        assert_eq!(out.column(1).data_type(), &DataType::Utf8);
    }

    #[test]
    fn zero_duration_does_not_trap() {
        let batch = text_batch(
            vec![Some("2020-01-01 10:00:00"), Some("2020-01-01 10:00:00")],
            vec![Some("2020-01-01 10:00:00"), Some("2020-01-01 09:00:00")],
            vec![5.0, 5.0],
        );

        let out = DerivedMetricsAnnotator.apply(batch).unwrap();
        let hours = f64_column(&out, DURATION_COLUMN);
        let speed = f64_column(&out, SPEED_COLUMN);
        assert_eq!(hours.value(0), 0.0);
        assert!(speed.value(0).is_infinite());
        assert_eq!(hours.value(1), -1.0);
        assert_eq!(speed.value(1), -5.0);
    }

    #[test]
    fn null_timestamps_give_null_metrics() {
        let batch = text_batch(
            vec![None, Some("2020-01-01 10:00:00")],
            vec![Some("2020-01-01 11:00:00"), Some("2020-01-01 11:00:00")],
            vec![5.0, 5.0],
        );

        let out = DerivedMetricsAnnotator.apply(batch).unwrap();
        let hours = f64_column(&out, DURATION_COLUMN);
        assert!(hours.is_null(0));
        assert!(f64_column(&out, SPEED_COLUMN).is_null(0));
        assert_eq!(hours.value(1), 1.0);
    }

    #[test]
    fn unparseable_text_is_malformed() {
        let batch = text_batch(
            vec![Some("04/01/2009 02:52")],
            vec![Some("2009-01-04 03:22:00")],
            vec![1.0],
        );

        let err = DerivedMetricsAnnotator.apply(batch).unwrap_err();
        assert!(matches!(err, OutlierError::MalformedInput(_)));
    }

    #[test]
    fn source_columns_named_like_metrics_are_replaced() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("trip_distance", DataType::Float64, true),
            Field::new("avg_speed_mph", DataType::Float64, true),
            Field::new("tpep_pickup_datetime", DataType::Utf8, true),
            Field::new("trip_duration_hours", DataType::Utf8, true),
            Field::new("tpep_dropoff_datetime", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Float64Array::from(vec![500.0])),
                Arc::new(Float64Array::from(vec![30.0])),
                Arc::new(StringArray::from(vec!["2020-01-01 10:00:00"])),
                Arc::new(StringArray::from(vec!["stale"])),
                Arc::new(StringArray::from(vec!["2020-01-01 11:00:00"])),
            ],
        )
        .unwrap();

        let out = DerivedMetricsAnnotator.apply(batch).unwrap();
        let names: Vec<String> = out.schema().fields().iter().map(|f| f.name().clone()).collect();
        assert_eq!(
            names,
            vec![
                "trip_distance",
                "tpep_pickup_datetime",
                "tpep_dropoff_datetime",
                "trip_duration_hours",
                "avg_speed_mph"
            ]
        );
        assert_eq!(f64_column(&out, DURATION_COLUMN).value(0), 1.0);
        assert_eq!(f64_column(&out, SPEED_COLUMN).value(0), 500.0);
    }

    #[test]
    fn native_timestamps_and_integer_distance() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("trip_distance", DataType::Int64, true),
            Field::new(
                "tpep_pickup_datetime",
                DataType::Timestamp(TimeUnit::Second, None),
                true,
            ),
            Field::new(
                "tpep_dropoff_datetime",
                DataType::Timestamp(TimeUnit::Second, None),
                true,
            ),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![20])),
                Arc::new(TimestampSecondArray::from(vec![0])),
                Arc::new(TimestampSecondArray::from(vec![1_800])),
            ],
        )
        .unwrap();

        let out = DerivedMetricsAnnotator.apply(batch).unwrap();
        assert_eq!(f64_column(&out, DURATION_COLUMN).value(0), 0.5);
        assert_eq!(f64_column(&out, SPEED_COLUMN).value(0), 40.0);
    }
}
