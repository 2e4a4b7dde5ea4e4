//! Persisting one buffered batch of records.

use std::collections::HashMap;
use std::time::Instant;
use tracing::debug;

use crate::record::ArchiveRecord;
use crate::store::{self, VoterStore};
use crate::version::{is_newer, BatchKey};
use crate::IngestResult;

/// Outcome of one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushCounts {
    pub created: u64,
    pub updated: u64,
    /// Records not applied to the latest table because it already held an
    /// equal or newer batch.
    pub stale: u64,
}

/// Records of one flush split by what they do to the latest table.
#[derive(Debug, Default)]
pub struct Partition<'a> {
    pub creates: Vec<&'a ArchiveRecord>,
    pub updates: Vec<&'a ArchiveRecord>,
    pub stale: u64,
}

struct Planned<'a> {
    record: &'a ArchiveRecord,
    exists: bool,
}

/// Decide for each record whether it creates, updates or is stale.
///
/// `stored` maps ids to the batch currently held in the latest table. An id
/// seen twice is compared against the write already planned for it, so each
/// id ends up with at most one write.
pub fn partition<'a>(
    records: &'a [ArchiveRecord],
    stored: &HashMap<String, BatchKey>,
) -> Partition<'a> {
    let mut order: Vec<&'a str> = Vec::new();
    let mut planned: HashMap<&'a str, Planned<'a>> = HashMap::with_capacity(records.len());
    let mut stale = 0;

    for record in records {
        let id = record.id.as_str();
        let current = planned
            .get(id)
            .map(|p| (p.record.batch, p.exists))
            .or_else(|| stored.get(id).map(|batch| (*batch, true)));

        match current {
            None => {
                order.push(id);
                planned.insert(id, Planned { record, exists: false });
            }
            Some((batch, exists)) if is_newer(record.batch, batch) => {
                if !planned.contains_key(id) {
                    order.push(id);
                } else {
                    // the earlier occurrence is superseded within this flush
                    stale += 1;
                }
                planned.insert(id, Planned { record, exists });
            }
            Some(_) => stale += 1,
        }
    }

    let mut split = Partition {
        stale,
        ..Partition::default()
    };
    for id in order {
        let plan = &planned[id];
        if plan.exists {
            split.updates.push(plan.record);
        } else {
            split.creates.push(plan.record);
        }
    }
    split
}

/// Archive `records` and reconcile them against the latest table.
///
/// The archive insert, latest creates and latest updates share one
/// transaction; a failure leaves none of this flush behind.
pub async fn bulk_save(store: &VoterStore, records: &[ArchiveRecord]) -> IngestResult<FlushCounts> {
    if records.is_empty() {
        return Ok(FlushCounts::default());
    }
    let started = Instant::now();
    let mut tx = store.begin().await?;

    store::insert_archive(&mut tx, records).await?;

    let mut ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    let stored = store::latest_batches(&mut tx, &ids).await?;

    let split = partition(records, &stored);
    let created = store::insert_latest(&mut tx, &split.creates).await?;
    let updated = store::update_latest(&mut tx, &split.updates).await?;

    tx.commit().await?;

    debug!(
        records = records.len(),
        created,
        updated,
        stale = split.stale,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "flushed batch"
    );
    Ok(FlushCounts {
        created,
        updated,
        stale: split.stale,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::VoterFields;

    fn rec(id: &str, period: i64, sequence: i64) -> ArchiveRecord {
        ArchiveRecord {
            id: id.to_string(),
            batch: BatchKey::new(period, sequence),
            fields: VoterFields::default(),
        }
    }

    fn ids(records: &[&ArchiveRecord]) -> Vec<String> {
        records.iter().map(|r| format!("{}@{}", r.id, r.batch)).collect()
    }

    #[test]
    fn splits_creates_updates_and_stale() {
        let records = vec![rec("A", 2024, 2), rec("B", 2024, 2), rec("C", 2024, 2)];
        let stored = HashMap::from([
            ("B".to_string(), BatchKey::new(2024, 1)),
            ("C".to_string(), BatchKey::new(2024, 2)),
        ]);

        let split = partition(&records, &stored);
        assert_eq!(ids(&split.creates), ["A@2024/2"]);
        assert_eq!(ids(&split.updates), ["B@2024/2"]);
        assert_eq!(split.stale, 1);
    }

    #[test]
    fn older_batches_never_update() {
        let records = vec![rec("A", 2023, 999)];
        let stored = HashMap::from([("A".to_string(), BatchKey::new(2024, 1))]);
        let split = partition(&records, &stored);
        assert!(split.creates.is_empty());
        assert!(split.updates.is_empty());
        assert_eq!(split.stale, 1);
    }

    #[test]
    fn repeated_id_keeps_first_of_equal_batches() {
        let mut first = rec("A", 2024, 1);
        first.fields.set(
            crate::schema::Field::LastName,
            crate::record::Value::Text("FIRST".into()),
        );
        let records = vec![first, rec("A", 2024, 1)];
        let split = partition(&records, &HashMap::new());
        assert_eq!(split.creates.len(), 1);
        assert_eq!(
            split.creates[0].fields.text(crate::schema::Field::LastName),
            Some("FIRST")
        );
        assert_eq!(split.stale, 1);
    }

    #[test]
    fn repeated_id_with_newer_batch_replaces_planned_write() {
        let records = vec![rec("A", 2024, 1), rec("A", 2024, 3), rec("B", 2024, 3)];
        let stored = HashMap::from([("B".to_string(), BatchKey::new(2024, 2))]);
        let split = partition(&records, &stored);
        assert_eq!(ids(&split.creates), ["A@2024/3"]);
        assert_eq!(ids(&split.updates), ["B@2024/3"]);
        assert_eq!(split.stale, 1);
    }
}
