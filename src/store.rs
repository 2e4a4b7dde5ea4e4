//! SQLite persistence for the archive, latest and category tables.
//!
//! All multi-row writes bind every value as a statement parameter. Statements
//! are chunked so a single statement never exceeds SQLite's bind limit.

use chrono::{NaiveDate, Utc};
use futures::TryStreamExt;
use sqlx::query_builder::Separated;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteRow,
};
use sqlx::{QueryBuilder, Row, Sqlite, Transaction};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::categories::CategoryLists;
use crate::record::{ArchiveRecord, LatestRecord, Value, VoterFields};
use crate::schema::{Field, FieldKind};
use crate::version::BatchKey;
use crate::{IngestError, IngestResult};

/// SQLite's default `SQLITE_MAX_VARIABLE_NUMBER` since 3.32.
const MAX_BIND_PARAMS: usize = 32_766;

/// voter_id, period, sequence
const KEY_COLUMNS: usize = 3;

const ARCHIVE_TABLE: &str = "voter_archive";
const LATEST_TABLE: &str = "voter_latest";
const CATEGORY_TABLE: &str = "category_values";

/// Handle to the voter database. Cheap to clone; clones share the pool.
#[derive(Debug, Clone)]
pub struct VoterStore {
    pool: SqlitePool,
}

/// A persisted category snapshot together with its row id.
#[derive(Debug, Clone)]
pub(crate) struct StoredCategories {
    pub snapshot_id: i64,
    pub lists: CategoryLists,
}

impl VoterStore {
    /// Connect using a `sqlite://` URL, creating the database file if needed.
    pub async fn connect(url: &str, max_connections: u32) -> IngestResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?;
        Self::connect_with(options, max_connections).await
    }

    /// Open (or create) a database file at `path`.
    pub async fn open(path: &Path) -> IngestResult<Self> {
        Self::connect_with(SqliteConnectOptions::new().filename(path), 4).await
    }

    async fn connect_with(options: SqliteConnectOptions, max_connections: u32) -> IngestResult<Self> {
        let options = options
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30));
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub(crate) async fn begin(&self) -> IngestResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    /// Create the archive, latest and category tables if they do not exist.
    pub async fn init_schema(&self) -> IngestResult<()> {
        for statement in schema_statements() {
            sqlx::query(&statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Delete every archive row of `batch`; returns the number of rows removed.
    pub async fn purge_batch(&self, batch: BatchKey) -> IngestResult<u64> {
        let result = sqlx::query(&format!(
            "DELETE FROM {ARCHIVE_TABLE} WHERE period = ? AND sequence = ?"
        ))
        .bind(batch.period)
        .bind(batch.sequence)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn latest(&self, id: &str) -> IngestResult<Option<LatestRecord>> {
        let row = sqlx::query(&format!("SELECT * FROM {LATEST_TABLE} WHERE voter_id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(latest_from_row).transpose().map_err(Into::into)
    }

    pub async fn latest_count(&self) -> IngestResult<i64> {
        let count = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {LATEST_TABLE}"))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn archive_record(
        &self,
        id: &str,
        batch: BatchKey,
    ) -> IngestResult<Option<ArchiveRecord>> {
        let row = sqlx::query(&format!(
            "SELECT * FROM {ARCHIVE_TABLE} WHERE voter_id = ? AND period = ? AND sequence = ?"
        ))
        .bind(id)
        .bind(batch.period)
        .bind(batch.sequence)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(archive_from_row).transpose().map_err(Into::into)
    }

    pub async fn archive_count(&self, batch: BatchKey) -> IngestResult<i64> {
        let count = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {ARCHIVE_TABLE} WHERE period = ? AND sequence = ?"
        ))
        .bind(batch.period)
        .bind(batch.sequence)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// The persisted category lists, if a snapshot exists.
    pub async fn category_snapshot(&self) -> IngestResult<Option<CategoryLists>> {
        let mut conn = self.pool.acquire().await?;
        Ok(load_category_snapshot(&mut conn).await?.map(|s| s.lists))
    }

    /// Overwrite the persisted category lists with `lists`.
    pub async fn replace_category_snapshot(&self, lists: &CategoryLists) -> IngestResult<()> {
        let mut tx = self.begin().await?;
        claim_category_snapshot(&mut tx).await?;
        let existing = load_category_snapshot(&mut tx).await?;
        save_category_snapshot(&mut tx, existing.map(|s| s.snapshot_id), lists).await?;
        tx.commit().await?;
        Ok(())
    }
}

fn sql_type(field: Field) -> &'static str {
    match field.kind() {
        FieldKind::Integer => "INTEGER",
        FieldKind::Identifier | FieldKind::Date | FieldKind::Text => "TEXT",
    }
}

fn schema_statements() -> Vec<String> {
    let data_columns = Field::data_fields()
        .map(|f| format!("{} {}", f.column(), sql_type(f)))
        .collect::<Vec<_>>()
        .join(", ");
    let category_columns = Field::CATEGORIES
        .iter()
        .map(|f| format!("{} TEXT NOT NULL DEFAULT '[]'", f.column()))
        .collect::<Vec<_>>()
        .join(", ");

    vec![
        format!(
            "CREATE TABLE IF NOT EXISTS {ARCHIVE_TABLE} (\
             voter_id TEXT NOT NULL, period INTEGER NOT NULL, sequence INTEGER NOT NULL, \
             {data_columns}, PRIMARY KEY (voter_id, period, sequence))"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {ARCHIVE_TABLE}_batch ON {ARCHIVE_TABLE} (period, sequence)"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {LATEST_TABLE} (\
             voter_id TEXT PRIMARY KEY NOT NULL, period INTEGER NOT NULL, sequence INTEGER NOT NULL, \
             {data_columns}, has_discrepancy INTEGER NOT NULL DEFAULT 0, updated_at TEXT NOT NULL)"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {CATEGORY_TABLE} (\
             snapshot_id INTEGER PRIMARY KEY AUTOINCREMENT, {category_columns}, updated_at TEXT NOT NULL)"
        ),
    ]
}

/// `voter_id, period, sequence, <data columns>`
fn record_columns() -> String {
    ["voter_id", "period", "sequence"]
        .into_iter()
        .chain(Field::data_fields().map(Field::column))
        .collect::<Vec<_>>()
        .join(", ")
}

fn rows_per_statement(params_per_row: usize) -> usize {
    (MAX_BIND_PARAMS / params_per_row).max(1)
}

fn data_field_count() -> usize {
    Field::data_fields().count()
}

fn bind_record<'args>(b: &mut Separated<'_, 'args, Sqlite, &'static str>, record: &'args ArchiveRecord) {
    b.push_bind(record.id.as_str())
        .push_bind(record.batch.period)
        .push_bind(record.batch.sequence);
    for field in Field::data_fields() {
        match field.kind() {
            FieldKind::Integer => b.push_bind(record.fields.integer(field)),
            FieldKind::Date => b.push_bind(record.fields.date(field)),
            FieldKind::Identifier | FieldKind::Text => b.push_bind(record.fields.text(field)),
        };
    }
}

/// Insert `records` into the archive table.
pub(crate) async fn insert_archive(
    conn: &mut SqliteConnection,
    records: &[ArchiveRecord],
) -> Result<u64, sqlx::Error> {
    let per_row = KEY_COLUMNS + data_field_count();
    let mut inserted = 0;
    for chunk in records.chunks(rows_per_statement(per_row)) {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("INSERT INTO {ARCHIVE_TABLE} ({}) ", record_columns()));
        qb.push_values(chunk, |mut b, record| bind_record(&mut b, record));
        inserted += qb.build().execute(&mut *conn).await?.rows_affected();
    }
    Ok(inserted)
}

/// Stored batch of every latest row whose id is in `ids`.
pub(crate) async fn latest_batches(
    conn: &mut SqliteConnection,
    ids: &[&str],
) -> Result<HashMap<String, BatchKey>, sqlx::Error> {
    let mut found = HashMap::with_capacity(ids.len());
    for chunk in ids.chunks(MAX_BIND_PARAMS) {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT voter_id, period, sequence FROM {LATEST_TABLE} WHERE voter_id IN ("
        ));
        let mut list = qb.separated(", ");
        for id in chunk {
            list.push_bind(*id);
        }
        list.push_unseparated(")");

        let mut rows = qb.build().fetch(&mut *conn);
        while let Some(row) = rows.try_next().await? {
            let id: String = row.try_get("voter_id")?;
            let batch = BatchKey::new(row.try_get("period")?, row.try_get("sequence")?);
            found.insert(id, batch);
        }
    }
    Ok(found)
}

/// Insert new latest rows.
pub(crate) async fn insert_latest(
    conn: &mut SqliteConnection,
    records: &[&ArchiveRecord],
) -> Result<u64, sqlx::Error> {
    let now = Utc::now().to_rfc3339();
    let per_row = KEY_COLUMNS + data_field_count() + 1;
    let mut inserted = 0;
    for chunk in records.chunks(rows_per_statement(per_row)) {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "INSERT INTO {LATEST_TABLE} ({}, has_discrepancy, updated_at) ",
            record_columns()
        ));
        qb.push_values(chunk.iter().copied(), |mut b, record| {
            bind_record(&mut b, record);
            b.push("FALSE");
            b.push_bind(now.as_str());
        });
        inserted += qb.build().execute(&mut *conn).await?.rows_affected();
    }
    Ok(inserted)
}

/// Overwrite existing latest rows with `records`, joining on voter id.
///
/// Each chunk is one `UPDATE ... FROM` against a bound `VALUES` table, so the
/// round trips scale with the bind limit rather than the row count. Callers
/// must not pass the same id twice.
pub(crate) async fn update_latest(
    conn: &mut SqliteConnection,
    records: &[&ArchiveRecord],
) -> Result<u64, sqlx::Error> {
    let now = Utc::now().to_rfc3339();
    let per_row = KEY_COLUMNS + data_field_count();
    let assignments = ["period", "sequence"]
        .into_iter()
        .chain(Field::data_fields().map(Field::column))
        .map(|c| format!("{c} = incoming.{c}"))
        .collect::<Vec<_>>()
        .join(", ");

    let mut updated = 0;
    for chunk in records.chunks(rows_per_statement(per_row)) {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("WITH incoming ({}) AS (", record_columns()));
        qb.push_values(chunk.iter().copied(), |mut b, record| bind_record(&mut b, record));
        qb.push(format!(
            ") UPDATE {LATEST_TABLE} SET {assignments}, has_discrepancy = FALSE, updated_at = "
        ));
        qb.push_bind(now.as_str());
        qb.push(format!(
            " FROM incoming WHERE {LATEST_TABLE}.voter_id = incoming.voter_id"
        ));
        updated += qb.build().execute(&mut *conn).await?.rows_affected();
    }
    Ok(updated)
}

/// Make sure a snapshot row exists before it is read.
///
/// Being a write, this also takes the database write lock at the start of
/// the transaction, so concurrent category merges queue on the busy timeout
/// instead of failing when a read lock is upgraded.
pub(crate) async fn claim_category_snapshot(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "INSERT INTO {CATEGORY_TABLE} (updated_at) SELECT ? \
         WHERE NOT EXISTS (SELECT 1 FROM {CATEGORY_TABLE})"
    ))
    .bind(Utc::now().to_rfc3339())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Load the category snapshot; more than one row is a configuration error.
pub(crate) async fn load_category_snapshot(
    conn: &mut SqliteConnection,
) -> IngestResult<Option<StoredCategories>> {
    let rows = sqlx::query(&format!("SELECT * FROM {CATEGORY_TABLE}"))
        .fetch_all(&mut *conn)
        .await?;
    if rows.len() > 1 {
        return Err(IngestError::DuplicateCategorySnapshot { found: rows.len() });
    }
    let Some(row) = rows.first() else {
        return Ok(None);
    };

    let mut lists = CategoryLists::default();
    for field in Field::CATEGORIES {
        let encoded: String = row.try_get(field.column())?;
        let values: Vec<String> = serde_json::from_str(&encoded)?;
        lists.insert(field, values);
    }
    Ok(Some(StoredCategories {
        snapshot_id: row.try_get("snapshot_id")?,
        lists,
    }))
}

/// Write `lists` into the existing snapshot row, or create it.
pub(crate) async fn save_category_snapshot(
    conn: &mut SqliteConnection,
    snapshot_id: Option<i64>,
    lists: &CategoryLists,
) -> IngestResult<()> {
    let encoded = Field::CATEGORIES
        .iter()
        .map(|f| serde_json::to_string(lists.get(*f)))
        .collect::<Result<Vec<_>, _>>()?;
    let now = Utc::now().to_rfc3339();

    let mut qb: QueryBuilder<Sqlite> = match snapshot_id {
        Some(_) => QueryBuilder::new(format!("UPDATE {CATEGORY_TABLE} SET ")),
        None => QueryBuilder::new(format!(
            "INSERT INTO {CATEGORY_TABLE} ({}, updated_at) VALUES (",
            Field::CATEGORIES.map(Field::column).join(", ")
        )),
    };
    let mut list = qb.separated(", ");
    for (field, value) in Field::CATEGORIES.iter().zip(&encoded) {
        if snapshot_id.is_some() {
            list.push(format!("{} = ", field.column()));
            list.push_bind_unseparated(value.as_str());
        } else {
            list.push_bind(value.as_str());
        }
    }
    match snapshot_id {
        Some(id) => {
            list.push("updated_at = ");
            list.push_bind_unseparated(now.as_str());
            qb.push(" WHERE snapshot_id = ");
            qb.push_bind(id);
        }
        None => {
            list.push_bind(now.as_str());
            list.push_unseparated(")");
        }
    }
    qb.build().execute(&mut *conn).await?;
    Ok(())
}

fn fields_from_row(row: &SqliteRow) -> Result<VoterFields, sqlx::Error> {
    let mut fields = VoterFields::default();
    for field in Field::data_fields() {
        let value = match field.kind() {
            FieldKind::Integer => row
                .try_get::<Option<i64>, _>(field.column())?
                .map(Value::Integer),
            FieldKind::Date => row
                .try_get::<Option<NaiveDate>, _>(field.column())?
                .map(Value::Date),
            FieldKind::Identifier | FieldKind::Text => row
                .try_get::<Option<String>, _>(field.column())?
                .map(Value::Text),
        };
        if let Some(value) = value {
            fields.set(field, value);
        }
    }
    Ok(fields)
}

fn batch_from_row(row: &SqliteRow) -> Result<BatchKey, sqlx::Error> {
    Ok(BatchKey::new(row.try_get("period")?, row.try_get("sequence")?))
}

fn latest_from_row(row: &SqliteRow) -> Result<LatestRecord, sqlx::Error> {
    Ok(LatestRecord {
        id: row.try_get("voter_id")?,
        batch: batch_from_row(row)?,
        fields: fields_from_row(row)?,
        has_discrepancy: row.try_get("has_discrepancy")?,
    })
}

fn archive_from_row(row: &SqliteRow) -> Result<ArchiveRecord, sqlx::Error> {
    Ok(ArchiveRecord {
        id: row.try_get("voter_id")?,
        batch: batch_from_row(row)?,
        fields: fields_from_row(row)?,
    })
}
