use arrow::array::{Array, BooleanArray, Float64Array};
use arrow::compute::filter_record_batch;
use arrow::record_batch::RecordBatch;

use crate::error::{OutlierError, Result};
use crate::operators::columns::ColumnRole;
use crate::operators::derived::{distance_f64, DURATION_COLUMN, SPEED_COLUMN};

/// Physical plausibility bounds for a single trip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidityRules {
    pub max_duration_hours: f64,
    pub min_speed_mph: f64,
    pub max_speed_mph: f64,
    pub min_distance_miles: f64,
    pub max_distance_miles: f64,
}

impl Default for ValidityRules {
    fn default() -> Self {
        Self {
            max_duration_hours: 10.0,
            min_speed_mph: 2.5,
            max_speed_mph: 80.0,
            min_distance_miles: 0.1,
            max_distance_miles: 800.0,
        }
    }
}

impl ValidityRules {
    /// True iff every clause holds. NaN fails every comparison.
    pub fn is_valid(&self, duration_hours: f64, speed_mph: f64, distance_miles: f64) -> bool {
        let duration_ok = duration_hours > 0.0 && duration_hours <= self.max_duration_hours;
        let speed_ok = speed_mph >= self.min_speed_mph && speed_mph <= self.max_speed_mph;
        let distance_ok =
            distance_miles >= self.min_distance_miles && distance_miles <= self.max_distance_miles;
        duration_ok && speed_ok && distance_ok
    }

    /// Row-wise validity. A null input makes the row's entry null.
    pub fn validity_mask(
        &self,
        duration_hours: &Float64Array,
        speed_mph: &Float64Array,
        distance_miles: &Float64Array,
    ) -> BooleanArray {
        duration_hours
            .iter()
            .zip(speed_mph.iter())
            .zip(distance_miles.iter())
            .map(|((hours, speed), miles)| match (hours, speed, miles) {
                (Some(hours), Some(speed), Some(miles)) => Some(self.is_valid(hours, speed, miles)),
                _ => None,
            })
            .collect()
    }

    /// Negation of the whole validity predicate; nulls stay null.
    pub fn outlier_mask(
        &self,
        duration_hours: &Float64Array,
        speed_mph: &Float64Array,
        distance_miles: &Float64Array,
    ) -> BooleanArray {
        self.validity_mask(duration_hours, speed_mph, distance_miles)
            .iter()
            .map(|valid| valid.map(|v| !v))
            .collect()
    }
}

/// Keeps only rows that fail the validity predicate.
pub struct OutlierFilter {
    rules: ValidityRules,
}

impl OutlierFilter {
    pub fn new(rules: ValidityRules) -> Self {
        Self { rules }
    }
}

impl Default for OutlierFilter {
    fn default() -> Self {
        Self::new(ValidityRules::default())
    }
}

fn float_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Float64Array> {
    batch
        .column_by_name(name)
        .and_then(|col| col.as_any().downcast_ref::<Float64Array>())
        .ok_or_else(|| OutlierError::MalformedInput(format!("Float64 column {} not found", name)))
}

impl_operator! {
    OutlierFilter,
    name: "outlier-filter",
    kind: "filter",
    apply: |self, batch| {
        let hours = float_column(&batch, DURATION_COLUMN)?;
        let speed = float_column(&batch, SPEED_COLUMN)?;
        let distance_col = batch
            .column_by_name(ColumnRole::Distance.canonical_name())
            .ok_or_else(|| OutlierError::MalformedInput("trip_distance not found".to_string()))?;
        let distance = distance_f64(distance_col)?;

        let mask = self.rules.outlier_mask(hours, speed, &distance);
        log::debug!(
            "outlier-filter: {} of {} rows flagged",
            mask.true_count(),
            batch.num_rows()
        );
        Ok(filter_record_batch(&batch, &mask)?)
    }
}
