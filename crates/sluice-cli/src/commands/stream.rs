//! Stream command: POST a request and print the dispatched events

use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::Args;
use serde_json::Value;
use sluice_client::{DispatchHooks, SluiceClient, StreamOutcome};
use sluice_core::SluiceError;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use super::cancel_on_ctrl_c;

#[derive(Args, Debug)]
pub struct StreamArgs {
    /// Base URL of the backend
    #[arg(long, default_value = "http://127.0.0.1:8000")]
    pub base_url: String,

    /// Path of the streaming endpoint
    #[arg(long, default_value = "/api/chat")]
    pub path: String,

    /// Request JSON string or @file path (stdin when omitted)
    #[arg(short, long)]
    pub input: Option<String>,

    /// Give up after this many seconds (0 = no limit)
    #[arg(long, default_value = "0")]
    pub timeout: u64,

    /// Print only the text of data events, concatenated
    #[arg(long)]
    pub text: bool,

    /// Largest frame to buffer before failing, in bytes
    #[arg(long)]
    pub max_frame_size: Option<usize>,
}

async fn read_input(input: Option<&str>) -> Result<String> {
    match input {
        Some(path) if path.starts_with('@') => {
            let file_path = path.trim_start_matches('@');
            tokio::fs::read_to_string(file_path)
                .await
                .context(format!("Failed to read input file: {}", file_path))
        }
        Some(inline) => Ok(inline.to_string()),
        None => {
            let mut buffer = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buffer)
                .await
                .context("Failed to read from stdin")?;
            Ok(buffer)
        }
    }
}

/// Text carried by a data payload, if it has one
fn payload_text(payload: &Value) -> Option<&str> {
    match payload {
        Value::String(text) => Some(text.as_str()),
        _ => ["t", "token", "text", "delta", "content"]
            .iter()
            .find_map(|key| payload.get(key).and_then(Value::as_str)),
    }
}

fn print_event(kind: &str, payload: &Value) {
    println!("{}", serde_json::json!({ "event": kind, "payload": payload }));
}

pub async fn run(args: StreamArgs) -> Result<()> {
    let input = read_input(args.input.as_deref()).await?;
    let request: Value = serde_json::from_str(&input).context("Invalid input: request must be JSON")?;

    let mut builder = SluiceClient::builder().base_url(&args.base_url);
    if let Some(size) = args.max_frame_size {
        builder = builder.max_frame_size(size);
    }
    let client = builder.build().context("Failed to build client")?;

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(&cancel);
    if args.timeout > 0 {
        let deadline = cancel.clone();
        let timeout = Duration::from_secs(args.timeout);
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            tracing::warn!(?timeout, "Stream deadline reached");
            deadline.cancel();
        });
    }

    tracing::info!(url = %client.endpoint(&args.path), "Opening stream");

    let failure: Mutex<Option<SluiceError>> = Mutex::new(None);
    let text_mode = args.text;

    let hooks = DispatchHooks::new()
        .on_meta(|payload| {
            if text_mode {
                tracing::info!(meta = %payload, "Stream metadata");
            } else {
                print_event("meta", &payload);
            }
        })
        .on_data(move |payload| match payload_text(&payload) {
            Some(text) if text_mode => {
                print!("{}", text);
                let _ = std::io::stdout().flush();
            }
            _ => print_event("data", &payload),
        })
        .on_heartbeat(|| tracing::debug!("Heartbeat"))
        .on_done(move || {
            if text_mode {
                println!();
            } else {
                println!("{}", serde_json::json!({ "event": "done" }));
            }
        })
        .on_error(|e| {
            if let Ok(mut slot) = failure.lock() {
                *slot = Some(e);
            }
        });

    let body = Bytes::from(serde_json::to_vec(&request)?);
    let outcome = client.stream(&args.path, body, hooks, &cancel).await;

    match outcome {
        StreamOutcome::Completed => Ok(()),
        StreamOutcome::Ended => {
            anyhow::bail!("Stream ended without a done frame; output may be incomplete")
        }
        StreamOutcome::Cancelled => {
            eprintln!("Stream cancelled");
            Ok(())
        }
        StreamOutcome::Failed => {
            let error = failure
                .into_inner()
                .ok()
                .flatten()
                .unwrap_or_else(|| SluiceError::Transport("unknown failure".to_string()));
            Err(error).context("Stream failed")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_text() {
        assert_eq!(payload_text(&json!({"t": "hi"})), Some("hi"));
        assert_eq!(payload_text(&json!({"delta": "lo"})), Some("lo"));
        assert_eq!(payload_text(&json!("raw")), Some("raw"));
        assert_eq!(payload_text(&json!({"usage": 3})), None);
    }

    #[tokio::test]
    async fn test_read_inline_input() {
        let input = read_input(Some("{\"prompt\":\"hi\"}")).await.unwrap();
        assert_eq!(input, "{\"prompt\":\"hi\"}");
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let err = read_input(Some("@/nonexistent/sluice-input.json")).await.unwrap_err();
        assert!(err.to_string().contains("Failed to read input file"));
    }
}
