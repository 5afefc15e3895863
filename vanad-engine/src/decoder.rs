// Copyright (c) The vanad-watch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Incremental decoding of the newline-delimited JSON result stream.
//!
//! The child writes one [`TestResult`] object per line on stdout, but the
//! pipe delivers arbitrary byte chunks: a record can be split across reads.
//! The decoder carries the unterminated tail between chunks and emits
//! records in exact stream order, regardless of where chunk boundaries
//! fall.

use crate::{errors::StreamDecodeError, records::TestResult};
use bstr::ByteSlice;
use bytes::BytesMut;

/// Output of feeding one chunk (or the stream tail) through the decoder.
#[derive(Debug, Default)]
pub struct DecodedChunk {
    /// Records decoded from complete lines, in stream order.
    pub results: Vec<TestResult>,
    /// Set when a line failed to decode. The decoder is poisoned from that
    /// point on and reports the error exactly once.
    pub error: Option<StreamDecodeError>,
}

/// Incremental NDJSON decoder for the child's stdout stream.
///
/// The first malformed line poisons the decoder for the rest of the run:
/// a half-written line means the child died mid-write, so the remaining
/// bytes are not trustworthy and are discarded.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buf: BytesMut,
    poisoned: bool,
}

impl StreamDecoder {
    /// Creates a decoder with an empty carry buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk of raw bytes, returning all records whose
    /// terminating newline has now arrived.
    pub fn decode_chunk(&mut self, chunk: &[u8]) -> DecodedChunk {
        let mut out = DecodedChunk::default();
        if self.poisoned {
            return out;
        }
        self.buf.extend_from_slice(chunk);
        while let Some(newline) = self.buf.find_byte(b'\n') {
            let line = self.buf.split_to(newline + 1);
            self.decode_line(&line[..newline], &mut out);
            if self.poisoned {
                break;
            }
        }
        out
    }

    /// Flushes the stream tail: a final unterminated line is decoded as if
    /// it had been newline-terminated.
    pub fn finish(&mut self) -> DecodedChunk {
        let mut out = DecodedChunk::default();
        let tail = self.buf.split();
        if !self.poisoned {
            self.decode_line(&tail, &mut out);
        }
        out
    }

    fn decode_line(&mut self, line: &[u8], out: &mut DecodedChunk) {
        let line = line.trim_ascii();
        if line.is_empty() {
            return;
        }
        match serde_json::from_slice::<TestResult>(line) {
            Ok(result) => out.results.push(result),
            Err(source) => {
                self.poisoned = true;
                self.buf.clear();
                out.error = Some(StreamDecodeError {
                    line: line.to_str_lossy().into_owned(),
                    source,
                });
            }
        }
    }
}
