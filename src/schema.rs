//! Schema Introspector
//!
//! Finds the first table after `FROM` and asks the warehouse for its columns.
//! The result only enriches the prompt, so every failure degrades to an empty
//! list instead of an error.

use crate::warehouse::{self, ConnectionProfile, WarehouseConnector};
use lazy_static::lazy_static;
use regex::Regex;
use std::time::Duration;
use tracing::{debug, warn};

lazy_static! {
    static ref FROM_TABLE: Regex = Regex::new(r"(?i)\bfrom\s+([A-Za-z0-9_.]+)").unwrap();
}

/// First table reference following a `FROM` keyword
pub fn table_reference(query: &str) -> Option<String> {
    FROM_TABLE
        .captures(query)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim_matches('.').to_string())
        .filter(|name| !name.is_empty())
}

/// Fully qualify `table` as `database.schema.table` using the profile's defaults.
/// Names that already have three parts are returned unchanged; `schema.table`
/// only gains the database.
pub fn qualify(table: &str, profile: &ConnectionProfile) -> String {
    match table.matches('.').count() {
        0 => format!("{}.{}.{}", profile.database, profile.schema, table),
        1 => format!("{}.{}", profile.database, table),
        _ => table.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct SchemaIntrospector {
    timeout: Duration,
}

impl SchemaIntrospector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Column names of the table `query` reads from; empty when unknown
    pub async fn columns_for(&self, query: &str, connector: &dyn WarehouseConnector) -> Vec<String> {
        let Some(table) = table_reference(query) else {
            debug!("No FROM table found, skipping schema hint");
            return Vec::new();
        };

        let target = qualify(&table, connector.profile());
        match warehouse::describe_table(connector, &target, self.timeout).await {
            Ok(columns) => {
                debug!("Found {} columns for {}", columns.len(), target);
                columns
            }
            Err(e) => {
                warn!("Error during DESC TABLE {}: {}", target, e);
                Vec::new()
            }
        }
    }
}
