//! UTF-8 safe incremental decoding of transport chunks.

use bytes::{Buf, BytesMut};

/// Stateful decoder that turns a sequence of byte chunks into text.
///
/// A multi-byte character split across two chunks is held back until the
/// chunk carrying its remaining bytes arrives, so a legitimately split
/// sequence never decodes to U+FFFD.
#[derive(Debug, Default)]
pub struct IncrementalDecoder {
    pending: BytesMut,
}

impl IncrementalDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a chunk, returning all text that is complete so far.
    ///
    /// Bytes that can never form valid UTF-8 are replaced with U+FFFD, the
    /// same way a lossy conversion would; only an incomplete trailing
    /// sequence is carried over to the next call.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::with_capacity(self.pending.len());

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));

                    match err.error_len() {
                        Some(invalid) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.advance(valid + invalid);
                        }
                        None => {
                            // Truncated sequence at the end, wait for more bytes
                            self.pending.advance(valid);
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    /// Number of bytes held back waiting for the rest of a character
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// End of input: discard any incomplete trailing sequence.
    ///
    /// Returns the number of bytes discarded.
    pub fn finish(&mut self) -> usize {
        let discarded = self.pending.len();
        if discarded > 0 {
            tracing::debug!(bytes = discarded, "Discarding incomplete UTF-8 sequence at end of stream");
        }
        self.pending.clear();
        discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_passthrough() {
        let mut decoder = IncrementalDecoder::new();
        assert_eq!(decoder.decode(b"event: ping\n\n"), "event: ping\n\n");
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn test_split_multibyte_character() {
        // "é" is 0xC3 0xA9, "🦀" is four bytes
        let text = "é🦀";
        let bytes = text.as_bytes();
        let mut decoder = IncrementalDecoder::new();

        assert_eq!(decoder.decode(&bytes[..1]), "");
        assert_eq!(decoder.pending_len(), 1);
        assert_eq!(decoder.decode(&bytes[1..3]), "é");
        assert_eq!(decoder.decode(&bytes[3..5]), "");
        assert_eq!(decoder.decode(&bytes[5..]), "🦀");
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn test_byte_at_a_time() {
        let text = "data: {\"t\":\"héllo wörld ✓\"}";
        let mut decoder = IncrementalDecoder::new();
        let mut out = String::new();
        for byte in text.as_bytes() {
            out.push_str(&decoder.decode(std::slice::from_ref(byte)));
        }
        assert_eq!(out, text);
        assert!(!out.contains(char::REPLACEMENT_CHARACTER));
    }

    #[test]
    fn test_invalid_byte_is_replaced() {
        let mut decoder = IncrementalDecoder::new();
        assert_eq!(decoder.decode(b"a\xFFb"), "a\u{FFFD}b");
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn test_finish_discards_truncated_tail() {
        let mut decoder = IncrementalDecoder::new();
        let crab = "🦀".as_bytes();
        assert_eq!(decoder.decode(&crab[..2]), "");
        assert_eq!(decoder.finish(), 2);
        assert_eq!(decoder.pending_len(), 0);
        assert_eq!(decoder.decode(b"ok"), "ok");
    }
}
