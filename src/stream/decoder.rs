//! Incremental byte → line decoder for the status stream
//!
//! Transport chunks may end anywhere: inside a line, inside a `\r\n` pair, or inside a
//! multi-byte UTF-8 sequence. The decoder keeps both an undecoded byte tail and an
//! unterminated text remainder between calls, so the lines it yields are independent of
//! how the input was chunked.

use std::borrow::Cow;

/// Splits arbitrarily chunked bytes into complete text lines
///
/// Lines are terminated by `\n`; a `\r` directly before the terminator is removed.
/// Invalid UTF-8 is replaced with U+FFFD rather than dropped.
///
/// # Example
///
/// ```
/// use bookgen_client::stream::FrameDecoder;
///
/// let mut decoder = FrameDecoder::new();
/// assert!(decoder.feed(b"data: {\"sta").is_empty());
/// assert_eq!(decoder.feed(b"tus\":1}\r\n\r\n"), vec!["data: {\"status\":1}", ""]);
/// ```
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Bytes of a UTF-8 sequence still waiting for its continuation bytes
    pending: Vec<u8>,
    /// Decoded text not yet terminated by `\n`
    text: String,
}

impl FrameDecoder {
    /// Create an empty decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one chunk and return every line it completes, in order
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.decode(chunk);
        self.drain_lines()
    }

    /// Return the unterminated remainder as a final line, if there is one
    ///
    /// An incomplete UTF-8 tail is decoded lossily. The decoder is empty afterwards.
    pub fn flush(&mut self) -> Option<String> {
        if !self.pending.is_empty() {
            let tail = std::mem::take(&mut self.pending);
            self.text.push_str(&String::from_utf8_lossy(&tail));
        }

        let mut rest = std::mem::take(&mut self.text);
        if rest.ends_with('\r') {
            rest.pop();
        }
        if rest.is_empty() { None } else { Some(rest) }
    }

    /// Whether any bytes are buffered
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.text.is_empty()
    }

    fn decode(&mut self, chunk: &[u8]) {
        let input: Cow<'_, [u8]> = if self.pending.is_empty() {
            Cow::Borrowed(chunk)
        } else {
            let mut joined = std::mem::take(&mut self.pending);
            joined.extend_from_slice(chunk);
            Cow::Owned(joined)
        };

        let mut rest: &[u8] = &input;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    self.text.push_str(valid);
                    return;
                }
                Err(err) => {
                    let valid_up_to = err.valid_up_to();
                    self.text
                        .push_str(&String::from_utf8_lossy(&rest[..valid_up_to]));
                    match err.error_len() {
                        Some(bad_len) => {
                            self.text.push(char::REPLACEMENT_CHARACTER);
                            rest = &rest[valid_up_to + bad_len..];
                        }
                        None => {
                            // sequence cut by the chunk boundary
                            self.pending = rest[valid_up_to..].to_vec();
                            return;
                        }
                    }
                }
            }
        }
    }

    fn drain_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.text[start..].find('\n') {
            let end = start + offset;
            let line = &self.text[start..end];
            lines.push(line.strip_suffix('\r').unwrap_or(line).to_string());
            start = end + 1;
        }
        self.text.drain(..start);
        lines
    }
}
