use async_compression::tokio::bufread::{GzipDecoder, ZstdDecoder};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncRead, BufReader};
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;

use crate::codec::Transcoder;
use crate::{IngestError, IngestResult};

/// A decompressed, UTF-8 byte stream ready for the row reader.
pub type ExtractReader = Box<dyn AsyncRead + Unpin + Send>;

/// What is known about an extract before reading it.
#[derive(Debug, Clone)]
pub struct SourceMeta {
    /// e.g. "application/gzip" or "text/csv"
    pub content_type: String,
    /// e.g. "gzip", "zstd", or empty
    pub content_encoding: String,
    /// file or object name, used for extension fallback
    pub name_hint: String,
    /// character set of the extract (county exports are often windows-1252)
    pub charset: &'static encoding_rs::Encoding,
}

impl Default for SourceMeta {
    fn default() -> Self {
        Self {
            content_type: String::new(),
            content_encoding: String::new(),
            name_hint: String::new(),
            charset: encoding_rs::UTF_8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Zstd,
}

impl Compression {
    /// Decide from content-encoding, then content-type, then file extension.
    pub fn detect(meta: &SourceMeta) -> Self {
        let encoding = meta.content_encoding.to_ascii_lowercase();
        let content_type = meta.content_type.to_ascii_lowercase();
        let name = meta.name_hint.to_ascii_lowercase();
        let encoded = |token: &str| encoding.split(',').any(|s| s.trim() == token);

        if encoded("gzip")
            || matches!(content_type.as_str(), "application/gzip" | "application/x-gzip")
            || name.ends_with(".gz")
        {
            Compression::Gzip
        } else if encoded("zstd") || content_type == "application/zstd" || name.ends_with(".zst") {
            Compression::Zstd
        } else {
            Compression::None
        }
    }
}

/// Look up an encoding by WHATWG label (`utf-8`, `latin1`, `windows-1252`, ...).
pub fn charset_for_label(label: &str) -> IngestResult<&'static encoding_rs::Encoding> {
    encoding_rs::Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| IngestError::UnknownCharset(label.to_string()))
}

/// Wrap any reader with the decompression and transcoding `meta` calls for.
pub fn decode_extract<R>(raw: R, meta: &SourceMeta) -> ExtractReader
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buffered = BufReader::with_capacity(1 << 20, raw);
    let decompressed: ExtractReader = match Compression::detect(meta) {
        Compression::Gzip => Box::new(GzipDecoder::new(buffered)),
        Compression::Zstd => Box::new(ZstdDecoder::new(buffered)),
        Compression::None => Box::new(buffered),
    };

    if meta.charset == encoding_rs::UTF_8 {
        decompressed
    } else {
        let framed = FramedRead::new(decompressed, Transcoder::new(meta.charset));
        Box::new(StreamReader::new(framed))
    }
}

/// Open a local extract, inferring compression from its extension.
pub async fn open_extract(
    path: &Path,
    charset: &'static encoding_rs::Encoding,
) -> IngestResult<(ExtractReader, SourceMeta)> {
    let file = File::open(path).await?;
    let name_hint = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();

    let mut meta = SourceMeta {
        name_hint,
        charset,
        ..Default::default()
    };
    match Compression::detect(&meta) {
        Compression::Gzip => {
            meta.content_type = "application/gzip".into();
            meta.content_encoding = "gzip".into();
        }
        Compression::Zstd => {
            meta.content_type = "application/zstd".into();
            meta.content_encoding = "zstd".into();
        }
        Compression::None => meta.content_type = "text/csv".into(),
    }

    Ok((decode_extract(file, &meta), meta))
}
