//! Status command: run the adaptive poller and print every summary

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use sluice_client::{AdaptivePoller, BackoffPolicy, PollerConfig, SluiceClient, Summary};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::cancel_on_ctrl_c;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Base URL of the backend
    #[arg(long, default_value = "http://127.0.0.1:8000")]
    pub base_url: String,

    /// Path of the status endpoint
    #[arg(long, default_value = "/api/status")]
    pub path: String,

    /// Seconds between polls while the backend is ready
    #[arg(long, default_value = "30")]
    pub ready_interval: u64,

    /// Seconds between polls while warming, on fallback, or starting
    #[arg(long, default_value = "5")]
    pub degraded_interval: u64,

    /// Upper bound on the backoff interval, in seconds
    #[arg(long, default_value = "60")]
    pub max_interval: u64,

    /// Per-request timeout in seconds
    #[arg(long, default_value = "4")]
    pub timeout: u64,

    /// Exit after the first summary
    #[arg(long)]
    pub once: bool,
}

impl StatusArgs {
    fn poller_config(&self) -> PollerConfig {
        PollerConfig::new()
            .ready_interval(Duration::from_secs(self.ready_interval))
            .degraded_interval(Duration::from_secs(self.degraded_interval))
            .request_timeout(Duration::from_secs(self.timeout.max(1)))
            .backoff(BackoffPolicy::new().ceiling(Duration::from_secs(self.max_interval.max(1))))
            // The band must hold every configured interval
            .max_interval(Duration::from_secs(
                self.max_interval.max(self.ready_interval).max(300),
            ))
    }
}

pub async fn run(args: StatusArgs) -> Result<()> {
    let client = SluiceClient::builder()
        .base_url(&args.base_url)
        .request_timeout(Duration::from_secs(args.timeout.max(1)))
        .build()
        .context("Failed to build client")?;
    let source = client.status_source(&args.path);
    tracing::info!(url = source.url(), "Polling status");

    let poller = AdaptivePoller::with_config(source, args.poller_config());
    let (tx, mut rx) = mpsc::unbounded_channel::<Summary>();
    let handle = poller.start(move |summary| {
        let _ = tx.send(summary);
    });

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(&cancel);

    loop {
        let summary = tokio::select! {
            _ = cancel.cancelled() => break,
            summary = rx.recv() => match summary {
                Some(summary) => summary,
                None => break,
            },
        };

        println!("{}", serde_json::to_string(&summary)?);
        if args.once {
            break;
        }
    }

    handle.shutdown().await;
    Ok(())
}
