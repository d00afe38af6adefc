//! Core types and utilities for Sluice event streams.
//!
//! This crate holds the transport-free half of the protocol:
//! - UTF-8 safe incremental decoding of byte chunks
//! - Blank-line frame splitting
//! - Frame classification into heartbeat/meta/data/done events
//! - The error taxonomy shared by the client crate

pub mod decoder;
pub mod error;
pub mod event;
pub mod framing;

pub use decoder::IncrementalDecoder;
pub use error::SluiceError;
pub use event::{decode_payload, EventDecoder, FrameParser, ParsedEvent};
pub use framing::{DecoderConfig, FrameError, FrameSplitter, DEFAULT_MAX_FRAME_SIZE};
