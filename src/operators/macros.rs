/// Macro to implement the Operator trait for a pipeline step
///
/// Usage:
/// ```ignore
/// impl_operator! {
///     OutlierFilter,
///     name: "outlier-filter",
///     kind: "filter",
///     apply: |self, batch| {
///         filter_outliers(batch, &self.rules)
///     }
/// }
/// ```
#[macro_export]
macro_rules! impl_operator {
    (
        $struct_name:ty,
        name: $name:expr,
        kind: $kind:expr,
        apply: |$self:ident, $batch:ident| $apply_body:block
    ) => {
        impl $crate::operators::Operator for $struct_name {
            fn name(&self) -> &str {
                $name
            }

            fn kind(&self) -> &str {
                $kind
            }

            fn apply(
                &$self,
                $batch: arrow::record_batch::RecordBatch,
            ) -> $crate::error::Result<arrow::record_batch::RecordBatch> {
                $apply_body
            }
        }
    };
}
