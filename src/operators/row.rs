use arrow::array::timezone::Tz;
use arrow::array::*;
use arrow::datatypes::*;
use arrow::record_batch::RecordBatch;
use arrow::util::display::array_value_to_string;
use chrono::{NaiveDateTime, Timelike};
use serde_json::{Map, Number, Value};

use crate::error::Result;

/// One rendered row: column name to scalar, in schema order.
pub type Row = Map<String, Value>;

/// Convert a RecordBatch to JSON rows. Timestamps are rendered as text.
pub fn batch_to_rows(batch: &RecordBatch) -> Result<Vec<Row>> {
    let schema = batch.schema();
    let mut rows = Vec::with_capacity(batch.num_rows());

    for row_idx in 0..batch.num_rows() {
        let mut values = Map::new();
        for (field, column) in schema.fields().iter().zip(batch.columns()) {
            values.insert(field.name().clone(), extract_value(column, row_idx)?);
        }
        rows.push(values);
    }

    Ok(rows)
}

fn float(v: f64) -> Value {
    // NaN and infinities have no JSON number form
    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}

fn naive_text(ts: &NaiveDateTime) -> String {
    if ts.nanosecond() == 0 {
        ts.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
    }
}

/// Wall-clock text, with a `+HH:MM` suffix when the column carries a zone.
fn timestamp_text<T: ArrowTimestampType>(
    array: &ArrayRef,
    row_idx: usize,
    tz: Option<&str>,
) -> Result<Value> {
    let array = array.as_primitive::<T>();
    let text = match tz {
        None => array.value_as_datetime(row_idx).map(|ts| naive_text(&ts)),
        Some(tz) => {
            let tz: Tz = tz.parse()?;
            array
                .value_as_datetime_with_tz(row_idx, tz)
                .map(|ts| format!("{}{}", naive_text(&ts.naive_local()), ts.format("%:z")))
        }
    };
    Ok(text.map(Value::String).unwrap_or(Value::Null))
}

/// Extract a scalar from an Arrow array at a specific row index
fn extract_value(array: &ArrayRef, row_idx: usize) -> Result<Value> {
    if !array.is_valid(row_idx) {
        return Ok(Value::Null);
    }

    let value = match array.data_type() {
        DataType::Boolean => Value::Bool(array.as_boolean().value(row_idx)),
        DataType::Int8 => Value::from(array.as_primitive::<Int8Type>().value(row_idx)),
        DataType::Int16 => Value::from(array.as_primitive::<Int16Type>().value(row_idx)),
        DataType::Int32 => Value::from(array.as_primitive::<Int32Type>().value(row_idx)),
        DataType::Int64 => Value::from(array.as_primitive::<Int64Type>().value(row_idx)),
        DataType::UInt8 => Value::from(array.as_primitive::<UInt8Type>().value(row_idx)),
        DataType::UInt16 => Value::from(array.as_primitive::<UInt16Type>().value(row_idx)),
        DataType::UInt32 => Value::from(array.as_primitive::<UInt32Type>().value(row_idx)),
        DataType::UInt64 => Value::from(array.as_primitive::<UInt64Type>().value(row_idx)),
        DataType::Float32 => float(array.as_primitive::<Float32Type>().value(row_idx) as f64),
        DataType::Float64 => float(array.as_primitive::<Float64Type>().value(row_idx)),
        DataType::Utf8 => Value::String(array.as_string::<i32>().value(row_idx).to_string()),
        DataType::LargeUtf8 => Value::String(array.as_string::<i64>().value(row_idx).to_string()),
        DataType::Timestamp(unit, tz) => {
            let tz = tz.as_deref();
            match unit {
                TimeUnit::Second => timestamp_text::<TimestampSecondType>(array, row_idx, tz)?,
                TimeUnit::Millisecond => {
                    timestamp_text::<TimestampMillisecondType>(array, row_idx, tz)?
                }
                TimeUnit::Microsecond => {
                    timestamp_text::<TimestampMicrosecondType>(array, row_idx, tz)?
                }
                TimeUnit::Nanosecond => {
                    timestamp_text::<TimestampNanosecondType>(array, row_idx, tz)?
                }
            }
        }
        // Dates, decimals, dictionaries and the rest use Arrow's own formatting
        _ => Value::String(array_value_to_string(array.as_ref(), row_idx)?),
    };

    Ok(value)
}
