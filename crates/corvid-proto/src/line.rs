//! Line-based codec for tokio.
//!
//! Frames the byte stream into CRLF-terminated lines. Inbound bytes that
//! are not valid UTF-8 fall back to a Latin-1 reading (each byte becomes
//! the codepoint of the same value) instead of erroring, since plenty of
//! legacy IRC traffic is still ISO-8859-1. Outbound lines are written as
//! UTF-8 with CRLF appended.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{ProtocolError, Result};

/// Inbound lines above this size abort the connection. Far above the 512
/// bytes the RFC allows, so oversized-but-sane server lines still get
/// through while a stream of garbage cannot buffer unbounded.
pub const MAX_INBOUND_LINE: usize = 8191;

/// Codec that reads and writes `\r\n`-terminated lines.
pub struct LineCodec {
    /// Index of the next byte to check for a newline.
    next_index: usize,
    /// Maximum inbound line length.
    max_len: usize,
}

impl LineCodec {
    /// Create a codec with the default [`MAX_INBOUND_LINE`] limit.
    pub fn new() -> Self {
        Self {
            next_index: 0,
            max_len: MAX_INBOUND_LINE,
        }
    }

    /// Create a codec with a custom inbound limit.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            next_index: 0,
            max_len,
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode bytes as UTF-8, falling back to Latin-1.
fn decode_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        if let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') {
            let line = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;

            if line.len() > self.max_len {
                return Err(ProtocolError::LineTooLong {
                    actual: line.len(),
                    limit: self.max_len,
                });
            }

            let mut end = line.len() - 1;
            if end > 0 && line[end - 1] == b'\r' {
                end -= 1;
            }
            Ok(Some(decode_bytes(&line[..end])))
        } else {
            // No complete line yet; remember where the scan stopped.
            self.next_index = src.len();

            if src.len() > self.max_len {
                return Err(ProtocolError::LineTooLong {
                    actual: src.len(),
                    limit: self.max_len,
                });
            }

            Ok(None)
        }
    }
}

impl Encoder<String> for LineCodec {
    type Error = ProtocolError;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> Result<()> {
        // An embedded newline would smuggle a second command onto the wire.
        let clean = match line.find(['\r', '\n']) {
            Some(idx) => &line[..idx],
            None => &line[..],
        };
        dst.reserve(clean.len() + 2);
        dst.put_slice(clean.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}
