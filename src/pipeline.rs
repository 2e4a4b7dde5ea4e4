//! The ingest run: purge, stream, transform, buffer, flush, merge categories.

use csv_async::{AsyncReaderBuilder, StringRecord};
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::categories::CategoryIndex;
use crate::config::IngestConfig;
use crate::persist::{bulk_save, FlushCounts};
use crate::record::{transform, ArchiveRecord};
use crate::source::{charset_for_label, open_extract};
use crate::store::{self, VoterStore};
use crate::version::BatchKey;
use crate::{IngestError, IngestResult};

/// Totals for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub rows_processed: u64,
    pub rows_created: u64,
    pub rows_updated: u64,
    /// Rows archived but not applied to the latest table
    pub rows_stale: u64,
    pub flushes: u64,
    pub categories_updated: bool,
}

impl IngestStats {
    fn absorb(&mut self, counts: FlushCounts) {
        self.rows_created += counts.created;
        self.rows_updated += counts.updated;
        self.rows_stale += counts.stale;
        self.flushes += 1;
    }
}

/// A failed run, with whatever was accomplished before the failure.
///
/// Flushes completed before the error stay committed; re-running the batch
/// replaces its archive rows and leaves already applied latest rows as is.
#[derive(Debug, Error)]
#[error("ingest of batch {batch} aborted after {} rows: {source}", .stats.rows_processed)]
pub struct RunError {
    pub batch: BatchKey,
    pub stats: IngestStats,
    #[source]
    pub source: IngestError,
}

/// State owned by a single run; nothing here outlives `Ingestor::run`.
struct RunContext {
    batch: BatchKey,
    buffer: Vec<ArchiveRecord>,
    categories: CategoryIndex,
    stats: IngestStats,
}

impl RunContext {
    fn new(batch: BatchKey, capacity: usize) -> Self {
        Self {
            batch,
            buffer: Vec::with_capacity(capacity),
            categories: CategoryIndex::new(),
            stats: IngestStats::default(),
        }
    }
}

/// Runs extracts into a [`VoterStore`].
///
/// An `Ingestor` holds only the store handle and immutable settings, so
/// several runs for different batches may share one.
#[derive(Debug, Clone)]
pub struct Ingestor {
    store: VoterStore,
    batch_size: usize,
    delimiter: u8,
    charset: &'static encoding_rs::Encoding,
}

impl Ingestor {
    pub fn new(store: VoterStore, config: &IngestConfig) -> IngestResult<Self> {
        let delimiter = u8::try_from(config.delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or(IngestError::InvalidDelimiter(config.delimiter))?;
        Ok(Self {
            store,
            batch_size: config.batch_size.max(1),
            delimiter,
            charset: charset_for_label(&config.charset)?,
        })
    }

    pub fn store(&self) -> &VoterStore {
        &self.store
    }

    /// Open the extract at `path` (decompressing and transcoding as needed)
    /// and ingest it as `batch`.
    pub async fn run_path(
        &self,
        path: &Path,
        batch: BatchKey,
        cancel: &CancellationToken,
    ) -> Result<IngestStats, RunError> {
        let (reader, meta) = open_extract(path, self.charset)
            .await
            .map_err(|source| RunError {
                batch,
                stats: IngestStats::default(),
                source,
            })?;
        debug!(name = %meta.name_hint, content_type = %meta.content_type, "opened extract");
        self.run(reader, batch, cancel).await
    }

    /// Ingest a UTF-8 row stream as `batch`.
    ///
    /// Rows are read one at a time and the next row is not read until a
    /// triggered flush has finished, so memory stays at one buffer.
    pub async fn run<R>(
        &self,
        reader: R,
        batch: BatchKey,
        cancel: &CancellationToken,
    ) -> Result<IngestStats, RunError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let started = Instant::now();
        let mut ctx = RunContext::new(batch, self.batch_size);
        info!(%batch, batch_size = self.batch_size, "starting ingest");

        match self.drive(&mut ctx, reader, cancel).await {
            Ok(()) => {
                let stats = ctx.stats;
                info!(
                    %batch,
                    rows = stats.rows_processed,
                    created = stats.rows_created,
                    updated = stats.rows_updated,
                    stale = stats.rows_stale,
                    categories_updated = stats.categories_updated,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "ingest finished"
                );
                Ok(stats)
            }
            Err(IngestError::Cancelled) => {
                warn!(%batch, rows = ctx.stats.rows_processed, "ingest cancelled; purging batch");
                if let Err(err) = self.store.purge_batch(batch).await {
                    warn!(%batch, error = %err, "failed to purge cancelled batch");
                }
                Err(RunError {
                    batch,
                    stats: ctx.stats,
                    source: IngestError::Cancelled,
                })
            }
            Err(source) => Err(RunError {
                batch,
                stats: ctx.stats,
                source,
            }),
        }
    }

    async fn drive<R>(
        &self,
        ctx: &mut RunContext,
        reader: R,
        cancel: &CancellationToken,
    ) -> IngestResult<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        let purged = self.store.purge_batch(ctx.batch).await?;
        if purged > 0 {
            info!(batch = %ctx.batch, purged, "replacing previously ingested batch");
        }
        ctx.categories.reset();

        let mut rdr = AsyncReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .buffer_capacity(1 << 20)
            .create_reader(reader);
        let mut row = StringRecord::new();

        loop {
            let more = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(IngestError::Cancelled),
                more = rdr.read_record(&mut row) => more?,
            };
            if !more {
                break;
            }

            let record = transform(&row, ctx.batch).map_err(|source| IngestError::Transform {
                row: ctx.stats.rows_processed + 1,
                source,
            })?;
            ctx.categories.observe(&row);
            ctx.buffer.push(record);
            ctx.stats.rows_processed += 1;

            if ctx.buffer.len() >= self.batch_size {
                self.flush(ctx, cancel).await?;
            }
        }

        self.flush(ctx, cancel).await?;
        self.save_categories(ctx).await
    }

    async fn flush(&self, ctx: &mut RunContext, cancel: &CancellationToken) -> IngestResult<()> {
        if ctx.buffer.is_empty() {
            return Ok(());
        }
        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }
        let counts = bulk_save(&self.store, &ctx.buffer).await?;
        ctx.buffer.clear();
        ctx.stats.absorb(counts);
        Ok(())
    }

    /// Merge this run's category values into the stored snapshot.
    async fn save_categories(&self, ctx: &mut RunContext) -> IngestResult<()> {
        let mut tx = self.store.begin().await?;
        store::claim_category_snapshot(&mut tx).await?;
        let stored = store::load_category_snapshot(&mut tx).await?;
        let merged = ctx.categories.flush(stored.as_ref().map(|s| &s.lists));

        // dropping the transaction also discards a freshly claimed empty row
        let unchanged = match &stored {
            Some(s) => s.lists == merged,
            None => merged.is_empty(),
        };
        if unchanged {
            return Ok(());
        }

        store::save_category_snapshot(&mut tx, stored.map(|s| s.snapshot_id), &merged).await?;
        tx.commit().await?;
        ctx.stats.categories_updated = true;
        Ok(())
    }
}
