//! Typed view over one history table.

use std::marker::PhantomData;

use chrono::{DateTime, Utc};

use super::{CountFilter, HistoryRecord, Storage, StorageError};

/// Bounded, append-only history of one record type.
///
/// Rows are never updated; the history is kept bounded by
/// [`History::trim_by_offset`] after each batch and by age-based trims from
/// the cleanup sweeper.
pub struct History<'a, R: HistoryRecord> {
    storage: &'a mut dyn Storage,
    _record: PhantomData<R>,
}

impl<'a, R: HistoryRecord> History<'a, R> {
    pub fn new(storage: &'a mut dyn Storage) -> Self {
        Self {
            storage,
            _record: PhantomData,
        }
    }

    /// Appends a record and returns it with its assigned id.
    pub fn append(&mut self, record: R) -> Result<R, StorageError> {
        let row = self.storage.insert(record.into_row())?;
        R::from_row(row).ok_or(StorageError::Corrupt {
            table: R::TABLE.name(),
            message: "backend returned a row of another table".to_string(),
        })
    }

    pub fn append_all(&mut self, records: Vec<R>) -> Result<usize, StorageError> {
        let count = records.len();
        for record in records {
            self.storage.insert(record.into_row())?;
        }
        Ok(count)
    }

    /// Keeps only the `keep` most recent records.
    pub fn trim_by_offset(&mut self, keep: usize) -> Result<u64, StorageError> {
        self.storage.trim_by_offset(R::TABLE, keep)
    }

    /// Deletes records captured strictly before `cutoff`.
    pub fn trim_by_age(&mut self, cutoff: DateTime<Utc>) -> Result<u64, StorageError> {
        self.storage.trim_by_age(R::TABLE, cutoff)
    }

    /// Replaces the whole history with `records`.
    pub fn replace_all(&mut self, records: Vec<R>) -> Result<u64, StorageError> {
        let rows = records.into_iter().map(HistoryRecord::into_row).collect();
        self.storage.replace_all(R::TABLE, rows)
    }

    /// Up to `limit` records in natural order.
    pub fn recent(&mut self, limit: usize) -> Result<Vec<R>, StorageError> {
        Ok(self
            .storage
            .list(R::TABLE, limit)?
            .into_iter()
            .filter_map(R::from_row)
            .collect())
    }

    pub fn count(&mut self, filter: &CountFilter) -> Result<u64, StorageError> {
        self.storage.count(R::TABLE, filter)
    }
}
