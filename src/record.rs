//! Typed voter records and the raw-row transformation.

use chrono::NaiveDate;
use csv_async::StringRecord;
use thiserror::Error;

use crate::date::{parse_date, DateFormatError};
use crate::schema::{Field, FieldKind, FIELD_COUNT};
use crate::version::BatchKey;

/// Reasons a raw row cannot become an [`ArchiveRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    #[error("row has no voter identifier")]
    MissingIdentifier,
    #[error("column {field}: {source}")]
    Date {
        field: Field,
        #[source]
        source: DateFormatError,
    },
}

/// A typed column value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Integer(i64),
    Date(NaiveDate),
}

/// Data columns of one voter, indexed by [`Field`].
///
/// A `None` slot means the value was absent or could not be derived; text
/// columns are always present (possibly empty). The identifier lives on the
/// owning record, so its slot is never populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoterFields {
    slots: Vec<Option<Value>>,
}

impl Default for VoterFields {
    fn default() -> Self {
        Self {
            slots: vec![None; FIELD_COUNT],
        }
    }
}

impl VoterFields {
    pub fn get(&self, field: Field) -> Option<&Value> {
        self.slots[field.position()].as_ref()
    }

    pub fn set(&mut self, field: Field, value: Value) {
        if field.kind() != FieldKind::Identifier {
            self.slots[field.position()] = Some(value);
        }
    }

    pub fn text(&self, field: Field) -> Option<&str> {
        match self.get(field) {
            Some(Value::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn integer(&self, field: Field) -> Option<i64> {
        match self.get(field) {
            Some(Value::Integer(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn date(&self, field: Field) -> Option<NaiveDate> {
        match self.get(field) {
            Some(Value::Date(d)) => Some(*d),
            _ => None,
        }
    }
}

/// One voter as submitted in one batch. Never mutated once stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRecord {
    pub id: String,
    pub batch: BatchKey,
    pub fields: VoterFields,
}

/// Current merged view of one voter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestRecord {
    pub id: String,
    /// Batch the stored values were taken from.
    pub batch: BatchKey,
    pub fields: VoterFields,
    pub has_discrepancy: bool,
}

/// Turn one raw extract row into an [`ArchiveRecord`] for `batch`.
pub fn transform(row: &StringRecord, batch: BatchKey) -> Result<ArchiveRecord, TransformError> {
    let id = row
        .get(Field::VoterId.position())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(TransformError::MissingIdentifier)?
        .to_string();

    let mut fields = VoterFields::default();
    for field in Field::data_fields() {
        let raw = row.get(field.position());
        let value = match field.kind() {
            FieldKind::Identifier => None,
            FieldKind::Integer => raw
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .and_then(|s| s.parse::<i64>().ok())
                .map(Value::Integer),
            FieldKind::Date => match raw.map(str::trim).filter(|s| !s.is_empty()) {
                Some(text) => Some(Value::Date(
                    parse_date(text).map_err(|source| TransformError::Date { field, source })?,
                )),
                None => None,
            },
            FieldKind::Text => Some(Value::Text(raw.map(str::trim).unwrap_or("").to_string())),
        };
        if let Some(value) = value {
            fields.set(field, value);
        }
    }

    Ok(ArchiveRecord { id, batch, fields })
}
