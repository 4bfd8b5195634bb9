use arrow::record_batch::RecordBatch;

use crate::error::Result;

#[macro_use]
mod macros;

pub mod columns;
pub mod derived;
pub mod rank;
pub mod row;
pub mod validity;

pub use columns::{resolve_columns, ColumnMap, ColumnResolver, ColumnRole};
pub use derived::{DerivedMetricsAnnotator, DURATION_COLUMN, SPEED_COLUMN};
pub use rank::{TopKRanker, DEFAULT_TOP_K};
pub use row::{batch_to_rows, Row};
pub use validity::{OutlierFilter, ValidityRules};

/// One columnar step of the outlier pipeline.
pub trait Operator: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> &str;
    fn apply(&self, batch: RecordBatch) -> Result<RecordBatch>;
}

/// Steps in application order: canonicalize, annotate, filter, rank.
pub fn outlier_pipeline(rules: ValidityRules, top_k: usize) -> Vec<Box<dyn Operator>> {
    vec![
        Box::new(ColumnResolver),
        Box::new(DerivedMetricsAnnotator),
        Box::new(OutlierFilter::new(rules)),
        Box::new(TopKRanker::new(top_k)),
    ]
}

/// Apply operators sequentially to one batch.
pub fn apply_all(operators: &[Box<dyn Operator>], batch: RecordBatch) -> Result<RecordBatch> {
    let mut batch = batch;
    for operator in operators {
        let input_rows = batch.num_rows();
        batch = operator.apply(batch)?;
        log::debug!(
            "{} ({}): {} -> {} rows",
            operator.name(),
            operator.kind(),
            input_rows,
            batch.num_rows()
        );
    }
    Ok(batch)
}
