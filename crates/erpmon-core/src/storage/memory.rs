//! In-process storage backend.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::{CountFilter, Row, ServerMetricSample, Storage, StorageError, Table};
use crate::retention::{RetentionConfig, RetentionSettings};

/// Rows of one table in insertion (id) order.
#[derive(Debug, Default)]
struct MemTable {
    rows: Vec<Row>,
}

/// Keeps every table in memory; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tables: HashMap<Table, MemTable>,
    next_id: i64,
    config: Option<RetentionConfig>,
    config_inserts: usize,
    params: HashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of configuration instances ever inserted.
    pub fn config_count(&self) -> usize {
        self.config_inserts
    }

    fn table_mut(&mut self, table: Table) -> &mut MemTable {
        self.tables.entry(table).or_default()
    }

    fn rows(&self, table: Table) -> &[Row] {
        self.tables
            .get(&table)
            .map(|t| t.rows.as_slice())
            .unwrap_or(&[])
    }

    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Natural ordering of a table, newest (or worst) first.
fn natural_order(a: &Row, b: &Row) -> Ordering {
    let primary = match (a, b) {
        (Row::SlowQuery(x), Row::SlowQuery(y)) => y
            .duration_seconds
            .partial_cmp(&x.duration_seconds)
            .unwrap_or(Ordering::Equal),
        _ => b.captured_at().cmp(&a.captured_at()),
    };
    primary.then_with(|| b.id().cmp(&a.id()))
}

impl Storage for MemoryStorage {
    fn insert(&mut self, mut row: Row) -> Result<Row, StorageError> {
        let id = self.allocate_id();
        row.set_id(id);
        let table = row.table();
        self.table_mut(table).rows.push(row.clone());
        Ok(row)
    }

    fn trim_by_offset(&mut self, table: Table, keep: usize) -> Result<u64, StorageError> {
        let rows = &mut self.table_mut(table).rows;
        if rows.len() <= keep {
            return Ok(0);
        }
        let excess = rows.len() - keep;
        rows.drain(..excess);
        Ok(excess as u64)
    }

    fn trim_by_age(&mut self, table: Table, cutoff: DateTime<Utc>) -> Result<u64, StorageError> {
        let rows = &mut self.table_mut(table).rows;
        let before = rows.len();
        rows.retain(|r| r.captured_at() >= cutoff);
        Ok((before - rows.len()) as u64)
    }

    fn delete_all(&mut self, table: Table) -> Result<u64, StorageError> {
        let rows = &mut self.table_mut(table).rows;
        let deleted = rows.len() as u64;
        rows.clear();
        Ok(deleted)
    }

    fn count(&mut self, table: Table, filter: &CountFilter) -> Result<u64, StorageError> {
        Ok(self
            .rows(table)
            .iter()
            .filter(|r| filter.matches(r))
            .count() as u64)
    }

    fn list(&mut self, table: Table, limit: usize) -> Result<Vec<Row>, StorageError> {
        let mut rows = self.rows(table).to_vec();
        rows.sort_by(natural_order);
        rows.truncate(limit);
        Ok(rows)
    }

    fn latest_server_metrics(&mut self) -> Result<Option<ServerMetricSample>, StorageError> {
        Ok(self
            .rows(Table::ServerMetrics)
            .iter()
            .filter_map(|r| match r {
                Row::ServerMetrics(m) => Some(m),
                _ => None,
            })
            .max_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)))
            .cloned())
    }

    fn find_config(&mut self) -> Result<Option<RetentionConfig>, StorageError> {
        Ok(self.config.clone())
    }

    fn insert_config(
        &mut self,
        settings: &RetentionSettings,
    ) -> Result<RetentionConfig, StorageError> {
        if let Some(existing) = &self.config {
            return Ok(existing.clone());
        }
        let config = RetentionConfig {
            id: self.allocate_id(),
            settings: settings.clone(),
            last_cleanup: None,
        };
        self.config = Some(config.clone());
        self.config_inserts += 1;
        Ok(config)
    }

    fn update_config(&mut self, config: &RetentionConfig) -> Result<(), StorageError> {
        match &mut self.config {
            Some(current) if current.id == config.id => {
                *current = config.clone();
                Ok(())
            }
            _ => Err(StorageError::Database(format!(
                "retention config {} does not exist",
                config.id
            ))),
        }
    }

    fn update_config_with_params(
        &mut self,
        config: &RetentionConfig,
        params: &[(&str, String)],
    ) -> Result<(), StorageError> {
        self.update_config(config)?;
        for (key, value) in params {
            self.params.insert(key.to_string(), value.clone());
        }
        Ok(())
    }

    fn get_param(&mut self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.params.get(key).cloned())
    }

    fn set_param(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.params.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
