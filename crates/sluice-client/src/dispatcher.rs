//! Streaming response dispatch

use std::fmt;

use bytes::Bytes;
use http::Response;
use http_body::Body;
use http_body_util::BodyExt;
use serde_json::Value;
use sluice_core::{DecoderConfig, EventDecoder, ParsedEvent, SluiceError};
use tokio_util::sync::CancellationToken;

type ValueHook<'a> = Box<dyn FnMut(Value) + Send + 'a>;
type UnitHook<'a> = Box<dyn FnMut() + Send + 'a>;
type ErrorHook<'a> = Box<dyn FnMut(SluiceError) + Send + 'a>;

/// Caller-supplied callbacks, one per event kind.
///
/// Every slot is optional. At most one hook fires per frame, in arrival order.
#[derive(Default)]
pub struct DispatchHooks<'a> {
    on_meta: Option<ValueHook<'a>>,
    on_data: Option<ValueHook<'a>>,
    on_done: Option<UnitHook<'a>>,
    on_heartbeat: Option<UnitHook<'a>>,
    on_error: Option<ErrorHook<'a>>,
}

impl<'a> DispatchHooks<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_meta(mut self, hook: impl FnMut(Value) + Send + 'a) -> Self {
        self.on_meta = Some(Box::new(hook));
        self
    }

    pub fn on_data(mut self, hook: impl FnMut(Value) + Send + 'a) -> Self {
        self.on_data = Some(Box::new(hook));
        self
    }

    pub fn on_done(mut self, hook: impl FnMut() + Send + 'a) -> Self {
        self.on_done = Some(Box::new(hook));
        self
    }

    pub fn on_heartbeat(mut self, hook: impl FnMut() + Send + 'a) -> Self {
        self.on_heartbeat = Some(Box::new(hook));
        self
    }

    pub fn on_error(mut self, hook: impl FnMut(SluiceError) + Send + 'a) -> Self {
        self.on_error = Some(Box::new(hook));
        self
    }

    /// Invoke the hook matching `event`, if one is registered
    pub fn dispatch(&mut self, event: ParsedEvent) {
        match event {
            ParsedEvent::Heartbeat => {
                if let Some(hook) = self.on_heartbeat.as_mut() {
                    hook();
                }
            }
            ParsedEvent::Meta(value) => {
                if let Some(hook) = self.on_meta.as_mut() {
                    hook(value);
                }
            }
            ParsedEvent::Data(value) => {
                if let Some(hook) = self.on_data.as_mut() {
                    hook(value);
                }
            }
            ParsedEvent::Done => {
                if let Some(hook) = self.on_done.as_mut() {
                    hook();
                }
            }
            ParsedEvent::Dropped => {}
        }
    }

    /// Report a terminal error
    pub fn report_error(&mut self, error: SluiceError) {
        match self.on_error.as_mut() {
            Some(hook) => hook(error),
            None => tracing::warn!(error = %error, "Stream failed with no error hook registered"),
        }
    }
}

impl fmt::Debug for DispatchHooks<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchHooks")
            .field("on_meta", &self.on_meta.is_some())
            .field("on_data", &self.on_data.is_some())
            .field("on_done", &self.on_done.is_some())
            .field("on_heartbeat", &self.on_heartbeat.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// How a `consume` call ended. Exactly one per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// A `done` frame was dispatched and the transport then ended
    Completed,
    /// The transport ended without a `done` frame; treat output as incomplete
    Ended,
    /// The cancellation token fired; undelivered frames were discarded
    Cancelled,
    /// `on_error` was called once
    Failed,
}

impl StreamOutcome {
    /// Whether the stream reached its logical end
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Drives a response body through the event decoder
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamDispatcher {
    config: DecoderConfig,
}

impl StreamDispatcher {
    pub fn new(config: DecoderConfig) -> Self {
        Self { config }
    }

    /// Consume a streaming response, dispatching every event to `hooks`.
    ///
    /// The body is only polled again once every event decoded from the
    /// previous chunk has been dispatched. Cancelling `cancel` releases the
    /// body and discards frames that were decoded but not yet delivered.
    pub async fn consume<B>(
        &self,
        response: Response<B>,
        mut hooks: DispatchHooks<'_>,
        cancel: &CancellationToken,
    ) -> StreamOutcome
    where
        B: Body<Data = Bytes>,
        B::Error: fmt::Display,
    {
        let status = response.status();
        if !status.is_success() {
            hooks.report_error(SluiceError::Status(status.as_u16()));
            return StreamOutcome::Failed;
        }

        let body = response.into_body();
        let mut body = std::pin::pin!(body);
        let mut decoder = EventDecoder::with_config(self.config);
        let mut completed = false;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!("Stream cancelled");
                    return StreamOutcome::Cancelled;
                }
                next = body.frame() => next,
            };

            let frame = match next {
                None => {
                    decoder.finish();
                    if !completed {
                        tracing::debug!("Stream ended without a done frame");
                        return StreamOutcome::Ended;
                    }
                    return StreamOutcome::Completed;
                }
                Some(Err(e)) => {
                    hooks.report_error(SluiceError::Transport(e.to_string()));
                    return StreamOutcome::Failed;
                }
                Some(Ok(frame)) => frame,
            };

            // Trailers carry no events
            let Ok(chunk) = frame.into_data() else {
                continue;
            };

            for event in decoder.feed(&chunk) {
                if cancel.is_cancelled() {
                    tracing::debug!("Stream cancelled with frames pending");
                    return StreamOutcome::Cancelled;
                }
                tracing::trace!(kind = event.kind(), "Dispatching event");
                completed |= event == ParsedEvent::Done;
                hooks.dispatch(event);
            }

            if let Err(e) = decoder.check_limit() {
                hooks.report_error(e.into());
                return StreamOutcome::Failed;
            }
        }
    }
}

/// Consume a streaming response with the default decoder configuration
pub async fn consume<B>(
    response: Response<B>,
    hooks: DispatchHooks<'_>,
    cancel: &CancellationToken,
) -> StreamOutcome
where
    B: Body<Data = Bytes>,
    B::Error: fmt::Display,
{
    StreamDispatcher::default().consume(response, hooks, cancel).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Full;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn test_dispatch_routes_to_single_hook() {
        let calls = Mutex::new(Vec::new());
        let mut hooks = DispatchHooks::new()
            .on_meta(|v| calls.lock().unwrap().push(format!("meta:{v}")))
            .on_data(|v| calls.lock().unwrap().push(format!("data:{v}")))
            .on_heartbeat(|| calls.lock().unwrap().push("heartbeat".to_string()))
            .on_done(|| calls.lock().unwrap().push("done".to_string()));

        hooks.dispatch(ParsedEvent::Meta(json!({"model": "x"})));
        hooks.dispatch(ParsedEvent::Dropped);
        hooks.dispatch(ParsedEvent::Heartbeat);
        hooks.dispatch(ParsedEvent::Data(json!({"t": "hi"})));
        hooks.dispatch(ParsedEvent::Done);
        drop(hooks);

        assert_eq!(
            calls.into_inner().unwrap(),
            vec![
                "meta:{\"model\":\"x\"}",
                "heartbeat",
                "data:{\"t\":\"hi\"}",
                "done"
            ]
        );
    }

    #[test]
    fn test_missing_hooks_are_skipped() {
        let mut hooks = DispatchHooks::new();
        hooks.dispatch(ParsedEvent::Data(json!(1)));
        hooks.dispatch(ParsedEvent::Done);
        hooks.report_error(SluiceError::Status(500));
    }

    #[tokio::test]
    async fn test_non_success_status_fails_immediately() {
        let response = Response::builder()
            .status(503)
            .body(Full::new(Bytes::from("event: done\n\n")))
            .unwrap();

        let errors = Mutex::new(Vec::new());
        let done = Mutex::new(0);
        let hooks = DispatchHooks::new()
            .on_done(|| *done.lock().unwrap() += 1)
            .on_error(|e| errors.lock().unwrap().push(e.to_string()));

        let outcome = consume(response, hooks, &CancellationToken::new()).await;

        assert_eq!(outcome, StreamOutcome::Failed);
        assert_eq!(*done.lock().unwrap(), 0);
        assert_eq!(errors.into_inner().unwrap(), vec!["Server returned status 503"]);
    }

    #[tokio::test]
    async fn test_full_body_completes() {
        let response = Response::new(Full::new(Bytes::from(
            "event: data\ndata: {\"t\":\"hi\"}\n\nevent: done\n\n",
        )));

        let data = Mutex::new(Vec::new());
        let hooks = DispatchHooks::new().on_data(|v| data.lock().unwrap().push(v));

        let outcome = consume(response, hooks, &CancellationToken::new()).await;

        assert_eq!(outcome, StreamOutcome::Completed);
        assert_eq!(data.into_inner().unwrap(), vec![json!({"t": "hi"})]);
    }

    #[tokio::test]
    async fn test_end_without_done_is_ended() {
        let response = Response::new(Full::new(Bytes::from(
            "event: data\ndata: {\"t\":\"hi\"}\n\nevent: data\ndata: {\"t\":\"cut",
        )));

        let outcome = consume(response, DispatchHooks::new(), &CancellationToken::new()).await;
        assert_eq!(outcome, StreamOutcome::Ended);
        assert!(!outcome.is_complete());
    }

    #[tokio::test]
    async fn test_already_cancelled() {
        let response = Response::new(Full::new(Bytes::from(":hb\n\n")));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let beats = Mutex::new(0);
        let hooks = DispatchHooks::new().on_heartbeat(|| *beats.lock().unwrap() += 1);

        assert_eq!(consume(response, hooks, &cancel).await, StreamOutcome::Cancelled);
        assert_eq!(*beats.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_oversized_frame_fails() {
        let response = Response::new(Full::new(Bytes::from(":hb\n\nevent: data\ndata: 0123456789")));
        let dispatcher = StreamDispatcher::new(DecoderConfig::new().max_frame_size(8));

        let beats = Mutex::new(0);
        let errors = Mutex::new(0);
        let hooks = DispatchHooks::new()
            .on_heartbeat(|| *beats.lock().unwrap() += 1)
            .on_error(|_| *errors.lock().unwrap() += 1);

        let outcome = dispatcher.consume(response, hooks, &CancellationToken::new()).await;

        assert_eq!(outcome, StreamOutcome::Failed);
        assert_eq!(*beats.lock().unwrap(), 1);
        assert_eq!(*errors.lock().unwrap(), 1);
    }
}
