//! Distinct values of the category columns, collected during a run.

use csv_async::StringRecord;
use std::collections::{BTreeMap, BTreeSet};

use crate::schema::Field;

/// Sorted distinct values per category column, as persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryLists {
    lists: BTreeMap<Field, Vec<String>>,
}

impl CategoryLists {
    pub fn get(&self, field: Field) -> &[String] {
        self.lists.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Replace one column's list, sorting and deduplicating it.
    pub fn insert(&mut self, field: Field, values: impl IntoIterator<Item = String>) {
        let sorted: BTreeSet<String> = values.into_iter().collect();
        self.lists.insert(field, sorted.into_iter().collect());
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &[String])> {
        self.lists.iter().map(|(f, v)| (*f, v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.lists.values().all(Vec::is_empty)
    }
}

/// Per-run accumulator of category values.
#[derive(Debug, Default)]
pub struct CategoryIndex {
    seen: BTreeMap<Field, BTreeSet<String>>,
}

impl CategoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the trimmed, non-empty category values of a raw row.
    pub fn observe(&mut self, row: &StringRecord) {
        for field in Field::CATEGORIES {
            let Some(value) = row.get(field.position()).map(str::trim) else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            let set = self.seen.entry(field).or_default();
            if !set.contains(value) {
                set.insert(value.to_string());
            }
        }
    }

    pub fn reset(&mut self) {
        self.seen.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.seen.values().all(BTreeSet::is_empty)
    }

    /// Union the collected values with the persisted lists and drain this index.
    ///
    /// Persisted values are never dropped; the result holds an entry for every
    /// category column.
    pub fn flush(&mut self, persisted: Option<&CategoryLists>) -> CategoryLists {
        let mut seen = std::mem::take(&mut self.seen);
        let mut merged = CategoryLists::default();
        for field in Field::CATEGORIES {
            let mut values = seen.remove(&field).unwrap_or_default();
            if let Some(persisted) = persisted {
                values.extend(persisted.get(field).iter().cloned());
            }
            merged.lists.insert(field, values.into_iter().collect());
        }
        merged
    }
}
