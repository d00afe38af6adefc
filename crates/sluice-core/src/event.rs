//! Frame classification and the decode pipeline.

use serde_json::Value;

use crate::decoder::IncrementalDecoder;
use crate::framing::{DecoderConfig, FrameError, FrameSplitter};

/// A classified frame
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedEvent {
    /// Keep-alive: a comment line or a `ping` event
    Heartbeat,
    /// Stream metadata, e.g. the model answering the request
    Meta(Value),
    /// One increment of streamed output
    Data(Value),
    /// Logical end of the stream
    Done,
    /// Unknown event type, missing payload, or a payload that is not JSON
    Dropped,
}

impl ParsedEvent {
    /// Short name used in logs and CLI output
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Heartbeat => "heartbeat",
            Self::Meta(_) => "meta",
            Self::Data(_) => "data",
            Self::Done => "done",
            Self::Dropped => "dropped",
        }
    }
}

/// Decode a `meta`/`data` payload.
///
/// A failure here drops the frame; it never ends the stream.
pub fn decode_payload(payload: &str) -> Result<Value, serde_json::Error> {
    serde_json::from_str(payload)
}

/// Fields picked out of a raw frame before classification
#[derive(Debug, Default, PartialEq)]
struct FrameFields<'a> {
    comment: bool,
    event: Option<&'a str>,
    data: Option<&'a str>,
}

impl<'a> FrameFields<'a> {
    fn scan(frame: &'a str) -> Self {
        let mut fields = Self::default();

        for line in frame.lines() {
            let line = line.trim_end_matches('\r');
            if line.starts_with(':') {
                fields.comment = true;
            } else if let Some(value) = line.strip_prefix("event:") {
                fields.event = Some(value.trim());
            } else if let Some(value) = line.strip_prefix("data:") {
                // Last data line wins, multi-line payloads are not joined
                fields.data = Some(value.trim());
            }
        }

        fields
    }
}

/// Classifies raw frames into [`ParsedEvent`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameParser;

impl FrameParser {
    /// Classify one raw frame.
    ///
    /// Heartbeat detection runs first, so a comment-marked frame is never
    /// treated as data even if it also carries a payload.
    pub fn parse(frame: &str) -> ParsedEvent {
        let fields = FrameFields::scan(frame);

        if fields.comment || fields.event == Some("ping") {
            return ParsedEvent::Heartbeat;
        }

        match (fields.event, fields.data) {
            (Some("meta"), Some(payload)) => match decode_payload(payload) {
                Ok(value) => ParsedEvent::Meta(value),
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping meta frame with malformed payload");
                    ParsedEvent::Dropped
                }
            },
            (Some("data"), Some(payload)) => match decode_payload(payload) {
                Ok(value) => ParsedEvent::Data(value),
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping data frame with malformed payload");
                    ParsedEvent::Dropped
                }
            },
            (Some("done"), _) => ParsedEvent::Done,
            (event, _) => {
                tracing::debug!(event = event.unwrap_or(""), "Dropping unrecognized frame");
                ParsedEvent::Dropped
            }
        }
    }
}

/// Decoder → splitter → parser pipeline for one stream.
///
/// Usable pull-style: feed each chunk as it arrives and handle the returned
/// events in order before feeding the next one.
#[derive(Debug)]
pub struct EventDecoder {
    decoder: IncrementalDecoder,
    splitter: FrameSplitter,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::with_config(DecoderConfig::default())
    }

    pub fn with_config(config: DecoderConfig) -> Self {
        Self {
            decoder: IncrementalDecoder::new(),
            splitter: FrameSplitter::with_config(config),
        }
    }

    /// Feed one chunk and return the events for every frame it completes
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ParsedEvent> {
        let text = self.decoder.decode(chunk);
        self.splitter
            .push(&text)
            .iter()
            .map(|frame| FrameParser::parse(frame))
            .collect()
    }

    /// Fail if an unterminated frame has outgrown the configured limit
    pub fn check_limit(&self) -> Result<(), FrameError> {
        self.splitter.check_limit()
    }

    /// End of input. Incomplete characters and frames are discarded.
    pub fn finish(&mut self) {
        self.decoder.finish();
        self.splitter.finish();
    }
}

impl Default for EventDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_comment_is_heartbeat() {
        assert_eq!(FrameParser::parse(":hb"), ParsedEvent::Heartbeat);
    }

    #[test]
    fn test_ping_without_data_is_heartbeat() {
        assert_eq!(FrameParser::parse("event: ping"), ParsedEvent::Heartbeat);
    }

    #[test]
    fn test_heartbeat_preempts_data() {
        let frame = ": keep-alive\nevent: data\ndata: {\"t\":\"x\"}";
        assert_eq!(FrameParser::parse(frame), ParsedEvent::Heartbeat);
        assert_eq!(
            FrameParser::parse("event: ping\ndata: {\"t\":\"x\"}"),
            ParsedEvent::Heartbeat
        );
    }

    #[test]
    fn test_meta() {
        let event = FrameParser::parse("event: meta\ndata: {\"model\":\"x\"}");
        assert_eq!(event, ParsedEvent::Meta(json!({"model": "x"})));
    }

    #[test]
    fn test_data() {
        let event = FrameParser::parse("event: data\ndata: {\"t\":\"hi\"}");
        assert_eq!(event, ParsedEvent::Data(json!({"t": "hi"})));
    }

    #[test]
    fn test_malformed_payload_dropped() {
        assert_eq!(
            FrameParser::parse("event: data\ndata: {not valid json"),
            ParsedEvent::Dropped
        );
        assert_eq!(FrameParser::parse("event: meta\ndata: nope"), ParsedEvent::Dropped);
    }

    #[test]
    fn test_data_without_payload_dropped() {
        assert_eq!(FrameParser::parse("event: data"), ParsedEvent::Dropped);
        assert_eq!(FrameParser::parse("event: meta"), ParsedEvent::Dropped);
    }

    #[test]
    fn test_done_ignores_payload() {
        assert_eq!(FrameParser::parse("event: done"), ParsedEvent::Done);
        assert_eq!(FrameParser::parse("event: done\ndata: [DONE]"), ParsedEvent::Done);
    }

    #[test]
    fn test_unknown_event_dropped() {
        assert_eq!(FrameParser::parse("event: usage\ndata: {}"), ParsedEvent::Dropped);
        assert_eq!(FrameParser::parse("data: {\"t\":\"x\"}"), ParsedEvent::Dropped);
        assert_eq!(FrameParser::parse("retry: 1000"), ParsedEvent::Dropped);
    }

    #[test]
    fn test_last_data_line_wins() {
        let event = FrameParser::parse("event: data\ndata: {\"t\":\"a\"}\ndata: {\"t\":\"b\"}");
        assert_eq!(event, ParsedEvent::Data(json!({"t": "b"})));
    }

    #[test]
    fn test_crlf_lines() {
        let event = FrameParser::parse("event: data\r\ndata: {\"t\":\"hi\"}\r");
        assert_eq!(event, ParsedEvent::Data(json!({"t": "hi"})));
    }

    #[test]
    fn test_event_decoder_pipeline() {
        let input = "event: meta\ndata: {\"model\":\"x\"}\n\n:hb\n\nevent: data\ndata: {\"t\":\"hi\"}\n\nevent: done\n\n";
        let mut decoder = EventDecoder::new();
        let mut events = Vec::new();
        for chunk in input.as_bytes().chunks(7) {
            events.extend(decoder.feed(chunk));
        }
        decoder.finish();

        assert_eq!(
            events,
            vec![
                ParsedEvent::Meta(json!({"model": "x"})),
                ParsedEvent::Heartbeat,
                ParsedEvent::Data(json!({"t": "hi"})),
                ParsedEvent::Done,
            ]
        );
    }

    #[test]
    fn test_event_decoder_check_limit() {
        let mut decoder = EventDecoder::with_config(DecoderConfig::new().max_frame_size(4));
        assert!(decoder.feed(b":hb\n\n").len() == 1);
        assert!(decoder.check_limit().is_ok());
        decoder.feed(b"event: data");
        assert!(decoder.check_limit().is_err());
    }
}
