use bytes::{Buf, Bytes, BytesMut};
use std::io;
use tokio_util::codec::Decoder;
use tracing::warn;

/// Converts a byte stream in some legacy charset into UTF-8 chunks.
///
/// Undecodable bytes become U+FFFD; the first occurrence is logged so a
/// mislabeled extract is visible without failing the run.
pub struct Transcoder {
    decoder: encoding_rs::Decoder,
    reported_malformed: bool,
}

impl Transcoder {
    pub fn new(encoding: &'static encoding_rs::Encoding) -> Self {
        Self {
            decoder: encoding.new_decoder(),
            reported_malformed: false,
        }
    }

    /// Decode all of `src`; returns the UTF-8 output.
    fn transcode(&mut self, src: &[u8], last: bool) -> Bytes {
        let capacity = self
            .decoder
            .max_utf8_buffer_length(src.len())
            .unwrap_or(src.len().saturating_mul(3) + 4);
        let mut out = vec![0u8; capacity];

        // `out` is large enough for the whole input, so everything is consumed
        let (_result, _read, written, replaced) =
            self.decoder.decode_to_utf8(src, &mut out, last);

        if replaced && !self.reported_malformed {
            self.reported_malformed = true;
            warn!(
                encoding = self.decoder.encoding().name(),
                "extract contains bytes invalid for its charset; replaced with U+FFFD"
            );
        }
        out.truncate(written);
        Bytes::from(out)
    }
}

impl Decoder for Transcoder {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        let out = self.transcode(src, false);
        src.advance(src.len());
        // a trailing partial sequence is held inside the decoder
        Ok((!out.is_empty()).then_some(out))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if buf.is_empty() {
            return Ok(None);
        }
        let out = self.transcode(buf, true);
        buf.clear();
        Ok((!out.is_empty()).then_some(out))
    }
}
