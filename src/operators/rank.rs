use arrow::array::{Array, Float64Array, UInt32Array};
use arrow::compute::take;
use arrow::record_batch::RecordBatch;
use std::cmp::Ordering;

use crate::error::{OutlierError, Result};
use crate::operators::columns::ColumnRole;
use crate::operators::derived::distance_f64;

pub const DEFAULT_TOP_K: usize = 10;

/// Orders rows by `trip_distance` descending and keeps the first `k`.
pub struct TopKRanker {
    k: usize,
}

impl TopKRanker {
    pub fn new(k: usize) -> Self {
        Self { k }
    }
}

impl Default for TopKRanker {
    fn default() -> Self {
        Self::new(DEFAULT_TOP_K)
    }
}

/// Descending order; NaN and null sort after every number. Ties keep input order.
fn descending(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => match (a.is_nan(), b.is_nan()) {
            (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (true, true) => Ordering::Equal,
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Row indices of the `k` largest distances.
pub fn top_k_indices(distance: &Float64Array, k: usize) -> Vec<u32> {
    let mut indices: Vec<u32> = (0..distance.len() as u32).collect();
    let value = |i: u32| {
        let i = i as usize;
        if distance.is_null(i) {
            None
        } else {
            Some(distance.value(i))
        }
    };
    indices.sort_by(|&a, &b| descending(value(a), value(b)));
    indices.truncate(k);
    indices
}

impl_operator! {
    TopKRanker,
    name: "top-k",
    kind: "ranker",
    apply: |self, batch| {
        let distance_col = batch
            .column_by_name(ColumnRole::Distance.canonical_name())
            .ok_or_else(|| OutlierError::MalformedInput("trip_distance not found".to_string()))?;
        let distance = distance_f64(distance_col)?;

        let indices = UInt32Array::from(top_k_indices(&distance, self.k));
        let columns = batch
            .columns()
            .iter()
            .map(|col| take(col.as_ref(), &indices, None))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(RecordBatch::try_new(batch.schema(), columns)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_descending_and_truncates() {
        let distance = Float64Array::from(vec![3.0, 50.0, 7.0, 900.0, 0.0]);
        assert_eq!(top_k_indices(&distance, 3), vec![3, 1, 2]);
        assert_eq!(top_k_indices(&distance, 10), vec![3, 1, 2, 0, 4]);
    }

    #[test]
    fn nan_and_null_rank_last() {
        let distance = Float64Array::from(vec![Some(f64::NAN), None, Some(1.0), Some(2.0)]);
        assert_eq!(top_k_indices(&distance, 4), vec![3, 2, 0, 1]);
    }

    #[test]
    fn ties_keep_input_order() {
        let distance = Float64Array::from(vec![5.0, 9.0, 5.0, 5.0]);
        assert_eq!(top_k_indices(&distance, 4), vec![1, 0, 2, 3]);
    }

    #[test]
    fn empty_input_is_empty() {
        let distance = Float64Array::from(Vec::<f64>::new());
        assert!(top_k_indices(&distance, 10).is_empty());
    }
}
