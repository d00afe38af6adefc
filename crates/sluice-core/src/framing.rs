//! Frame splitting for Sluice event streams.
//!
//! Frame format: zero or more text lines terminated by a blank line (`\n\n`).

/// Maximum size of a buffered, not yet terminated frame (4MB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

const DELIMITER: &str = "\n\n";

/// Decoder configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Upper bound on text retained while waiting for a frame delimiter
    pub max_frame_size: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl DecoderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum buffered frame size
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }
}

/// Accumulates decoded text and slices it into raw frames
#[derive(Debug)]
pub struct FrameSplitter {
    buffer: String,
    // Where the next delimiter search starts; everything before it is known
    // not to contain the start of a delimiter.
    search_from: usize,
    max_frame_size: usize,
}

impl FrameSplitter {
    pub fn new() -> Self {
        Self::with_config(DecoderConfig::default())
    }

    pub fn with_config(config: DecoderConfig) -> Self {
        Self {
            buffer: String::new(),
            search_from: 0,
            max_frame_size: config.max_frame_size,
        }
    }

    /// Append text and return every frame it completes, in order.
    ///
    /// Returned frames are trimmed; whitespace-only frames are skipped.
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.buffer.push_str(text);

        let mut frames = Vec::new();
        let mut start = 0;
        let mut from = self.search_from;

        while let Some(pos) = self.buffer[from..].find(DELIMITER) {
            let end = from + pos;
            let raw = self.buffer[start..end].trim();
            if !raw.is_empty() {
                frames.push(raw.to_string());
            }
            start = end + DELIMITER.len();
            from = start;
        }

        if start > 0 {
            self.buffer.drain(..start);
        }

        // A trailing '\n' may be the first half of a delimiter
        self.search_from = if self.buffer.ends_with('\n') {
            self.buffer.len() - 1
        } else {
            self.buffer.len()
        };

        frames
    }

    /// Bytes currently buffered for an unterminated frame
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Fail if the unterminated remainder has grown past the configured limit
    pub fn check_limit(&self) -> Result<(), FrameError> {
        if self.buffer.len() > self.max_frame_size {
            return Err(FrameError::FrameTooLarge(self.buffer.len()));
        }
        Ok(())
    }

    /// End of input: discard any text that never saw a delimiter.
    ///
    /// Returns the number of bytes discarded.
    pub fn finish(&mut self) -> usize {
        let discarded = self.buffer.len();
        if !self.buffer.trim().is_empty() {
            tracing::debug!(bytes = discarded, "Discarding unterminated frame at end of stream");
        }
        self.buffer.clear();
        self.search_from = 0;
        discarded
    }
}

impl Default for FrameSplitter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("Frame too large: {0} bytes buffered without a delimiter")]
    FrameTooLarge(usize),
}
