use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Cancel `token` on the first Ctrl+C. The run loop notices at its next
/// iteration boundary, flushes, and exits cleanly.
pub fn install(token: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupt received, saving progress...");
                token.cancel();
            }
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    });
}
