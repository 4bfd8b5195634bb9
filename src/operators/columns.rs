//! Column name resolution across dataset vintages.
//!
//! Older trip files spell the required columns differently
//! (`Trip_Pickup_DateTime` vs `tpep_pickup_datetime`). Every role has a
//! priority-ordered alias list; matching is case-insensitive and the first
//! alias present in the schema wins.

use arrow::datatypes::Schema;
use arrow::record_batch::RecordBatch;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{OutlierError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    Distance,
    Pickup,
    Dropoff,
}

impl ColumnRole {
    pub const ALL: [ColumnRole; 3] = [ColumnRole::Distance, ColumnRole::Pickup, ColumnRole::Dropoff];

    /// Name the role's column carries after canonicalization.
    pub fn canonical_name(self) -> &'static str {
        match self {
            ColumnRole::Distance => "trip_distance",
            ColumnRole::Pickup => "tpep_pickup_datetime",
            ColumnRole::Dropoff => "tpep_dropoff_datetime",
        }
    }

    /// Accepted spellings, highest priority first.
    pub fn aliases(self) -> &'static [&'static str] {
        COLUMN_ALIASES
            .iter()
            .find(|(role, _)| *role == self)
            .map(|(_, aliases)| *aliases)
            .unwrap_or(&[])
    }
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnRole::Distance => "distance",
            ColumnRole::Pickup => "pickup",
            ColumnRole::Dropoff => "dropoff",
        };
        f.write_str(name)
    }
}

pub const COLUMN_ALIASES: &[(ColumnRole, &[&str])] = &[
    (ColumnRole::Distance, &["trip_distance", "Trip_Distance"]),
    (
        ColumnRole::Pickup,
        &["tpep_pickup_datetime", "Trip_Pickup_DateTime", "pickup_datetime"],
    ),
    (
        ColumnRole::Dropoff,
        &["tpep_dropoff_datetime", "Trip_Dropoff_DateTime", "dropoff_datetime"],
    ),
];

/// Actual schema column chosen for each role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    pub distance: String,
    pub pickup: String,
    pub dropoff: String,
}

impl ColumnMap {
    pub fn get(&self, role: ColumnRole) -> &str {
        match role {
            ColumnRole::Distance => &self.distance,
            ColumnRole::Pickup => &self.pickup,
            ColumnRole::Dropoff => &self.dropoff,
        }
    }
}

/// Resolve the three roles against a schema's column names.
pub fn resolve_columns(schema: &Schema) -> Result<ColumnMap> {
    let names: Vec<String> = schema.fields().iter().map(|f| f.name().clone()).collect();
    resolve_column_names(&names)
}

pub fn resolve_column_names(names: &[String]) -> Result<ColumnMap> {
    // On a case-insensitive collision the later column wins
    let by_lower: HashMap<String, &String> =
        names.iter().map(|name| (name.to_lowercase(), name)).collect();

    let mut resolved: HashMap<ColumnRole, String> = HashMap::new();
    let mut missing = Vec::new();

    for (role, aliases) in COLUMN_ALIASES {
        let found = aliases
            .iter()
            .find_map(|alias| by_lower.get(&alias.to_lowercase()));
        match found {
            Some(name) => {
                resolved.insert(*role, (*name).clone());
            }
            None => missing.push(*role),
        }
    }

    if !missing.is_empty() {
        return Err(OutlierError::SchemaResolution {
            missing,
            available: names.to_vec(),
        });
    }

    let mut take = |role: ColumnRole| resolved.remove(&role).unwrap_or_default();
    Ok(ColumnMap {
        distance: take(ColumnRole::Distance),
        pickup: take(ColumnRole::Pickup),
        dropoff: take(ColumnRole::Dropoff),
    })
}

/// Canonicalization step: rename the resolved columns, keep everything else.
pub struct ColumnResolver;

impl ColumnResolver {
    pub fn rename(batch: &RecordBatch, map: &ColumnMap) -> Result<RecordBatch> {
        let renames: HashMap<&str, &str> = ColumnRole::ALL
            .iter()
            .map(|role| (map.get(*role), role.canonical_name()))
            .collect();

        let schema = batch.schema();
        let fields: Vec<_> = schema
            .fields()
            .iter()
            .map(|field| match renames.get(field.name().as_str()) {
                Some(canonical) => Arc::new(field.as_ref().clone().with_name(*canonical)),
                None => field.clone(),
            })
            .collect();

        let renamed = Schema::new_with_metadata(fields, schema.metadata().clone());
        Ok(RecordBatch::try_new(Arc::new(renamed), batch.columns().to_vec())?)
    }
}

impl_operator! {
    ColumnResolver,
    name: "column-resolver",
    kind: "transformer",
    apply: |self, batch| {
        let map = resolve_columns(&batch.schema())?;
        ColumnResolver::rename(&batch, &map)
    }
}
