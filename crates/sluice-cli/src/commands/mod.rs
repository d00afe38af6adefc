pub mod status;
pub mod stream;

use tokio_util::sync::CancellationToken;

/// Cancel `token` on Ctrl-C
pub fn cancel_on_ctrl_c(token: &CancellationToken) {
    let token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, shutting down");
            token.cancel();
        }
    });
}
