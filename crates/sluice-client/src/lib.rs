//! Client-side consumption of Sluice event streams and backend health.
//!
//! This crate provides:
//! - `StreamDispatcher`: drives a streaming response through the frame
//!   decoder and dispatches classified events to caller hooks
//! - `AdaptivePoller`: a self-healing status polling loop with backoff
//! - `SluiceClient`: an HTTP client for opening streams and polling status

pub mod backoff;
pub mod client;
pub mod dispatcher;
pub mod poller;
pub mod status;

pub use backoff::BackoffPolicy;
pub use client::{ClientBuilder, ClientConfig, HttpStatusSource, SluiceClient};
pub use dispatcher::{consume, DispatchHooks, StreamDispatcher, StreamOutcome};
pub use poller::{AdaptivePoller, PollState, PollerConfig, PollerHandle, StatusSource};
pub use status::{PollPhase, Provider, Summary};

pub use sluice_core::{ParsedEvent, SluiceError};
pub use tokio_util::sync::CancellationToken;
