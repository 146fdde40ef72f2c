//! Newline framing over a fragmented byte stream.
//!
//! Serial reads return whatever the driver has buffered: half a line, three
//! lines, or a line whose last character is split in the middle of its UTF-8
//! encoding. [`LineReader`] decodes in streaming mode and hands out complete
//! lines only.

use crate::types::LINE_DELIMITER;

const REPLACEMENT: char = '\u{FFFD}';

/// Accumulates decoded text and slices it into `\n`-terminated lines.
///
/// Between calls the buffer only ever holds the unterminated tail of the
/// stream. There is no line length limit: a device that never sends a
/// newline grows the buffer without bound.
#[derive(Debug, Default, Clone)]
pub struct LineReader {
    buffer: String,
    /// Bytes of a UTF-8 sequence cut off at the end of the previous chunk.
    partial_utf8: Vec<u8>,
}

impl LineReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `chunk` and return every line it completes, without the newline.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.decode_into_buffer(chunk);
        self.extract_lines()
    }

    /// End of stream: drop the unterminated remainder.
    ///
    /// Returns the number of characters discarded (a dangling incomplete
    /// UTF-8 sequence counts as one).
    pub fn finish(&mut self) -> usize {
        let mut dropped = self.buffer.chars().count();
        if !self.partial_utf8.is_empty() {
            dropped += 1;
        }
        self.buffer.clear();
        self.partial_utf8.clear();
        dropped
    }

    /// Text received since the last newline.
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty() && self.partial_utf8.is_empty()
    }

    fn extract_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(idx) = self.buffer.find(LINE_DELIMITER) {
            lines.push(self.buffer[..idx].to_string());
            self.buffer.drain(..=idx);
        }
        lines
    }

    fn decode_into_buffer(&mut self, chunk: &[u8]) {
        let owned;
        let mut bytes: &[u8] = if self.partial_utf8.is_empty() {
            chunk
        } else {
            self.partial_utf8.extend_from_slice(chunk);
            owned = std::mem::take(&mut self.partial_utf8);
            &owned
        };

        loop {
            match std::str::from_utf8(bytes) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    return;
                }
                Err(e) => {
                    let (valid, rest) = bytes.split_at(e.valid_up_to());
                    if let Ok(text) = std::str::from_utf8(valid) {
                        self.buffer.push_str(text);
                    }
                    match e.error_len() {
                        Some(len) => {
                            self.buffer.push(REPLACEMENT);
                            bytes = &rest[len..];
                        }
                        None => {
                            // Incomplete sequence at the end; wait for the next chunk.
                            self.partial_utf8.extend_from_slice(rest);
                            return;
                        }
                    }
                }
            }
        }
    }
}
