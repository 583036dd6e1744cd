use tokio::select;
use tracing::{error, info};

use super::control::TrackerHandle;

/// Turns Ctrl-C into a stop request. Returns once the tracker was stopped, by a signal or some
/// other way.
pub async fn detect_shutdown(handle: TrackerHandle) {
    select! {
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => {
                info!("Received Ctrl-C");
                handle.request_stop();
            }
            Err(e) => {
                error!("Failed to listen for Ctrl-C {e:?}");
                handle.shutdown_token().cancelled().await;
            }
        },
        _ = handle.shutdown_token().cancelled() => (),
    };
}
