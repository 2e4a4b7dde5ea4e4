//! Streaming ingest of full-extract voter registration files.
//!
//! Each extract is identified by a [`BatchKey`]. Ingesting it
//! - replaces the batch's rows in the append-only archive table,
//! - creates or updates one latest row per voter, but only when the incoming
//!   batch is newer than the stored one ([`is_newer`]),
//! - merges the distinct values of the category columns into the persisted
//!   category snapshot.
//!
//! Data shape:
//! - input: headerless delimited rows in [`Field`] order, optionally gzip/zstd
//!   compressed and in a non-UTF-8 charset ([`open_extract`])
//! - output: [`IngestStats`], or a [`RunError`] carrying the stats gathered
//!   before the failure
#![cfg_attr(docsrs, feature(doc_cfg))]
//
mod categories;
mod codec;
mod config;
mod date;
mod persist;
mod pipeline;
mod record;
mod schema;
mod source;
mod store;
mod version;

pub use crate::categories::{CategoryIndex, CategoryLists};
pub use crate::config::{Config, IngestConfig, LogFormat, LogLevel, LoggingConfig, StoreConfig};
pub use crate::date::{parse_date, DateFormatError};
pub use crate::persist::{bulk_save, partition, FlushCounts, Partition};
pub use crate::pipeline::{IngestStats, Ingestor, RunError};
pub use crate::record::{transform, ArchiveRecord, LatestRecord, TransformError, Value, VoterFields};
pub use crate::schema::{Field, FieldKind, FIELD_COUNT};
pub use crate::source::{charset_for_label, decode_extract, open_extract, Compression, ExtractReader, SourceMeta};
pub use crate::store::VoterStore;
pub use crate::version::{is_newer, BatchKey};

use thiserror::Error;

/// Error type returned by this crate.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("row {row}: {source}")]
    Transform {
        row: u64,
        #[source]
        source: TransformError,
    },
    #[error("found {found} category snapshots, expected at most one")]
    DuplicateCategorySnapshot { found: usize },
    #[error("unknown character set label: {0}")]
    UnknownCharset(String),
    #[error("delimiter {0:?} is not a single-byte ASCII character")]
    InvalidDelimiter(char),
    #[error("ingest cancelled")]
    Cancelled,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("category snapshot encoding: {0}")]
    CategoryEncoding(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv_async::Error),
}

pub type IngestResult<T> = std::result::Result<T, IngestError>;
