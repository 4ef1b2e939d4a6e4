//! Process-wide cancellation signal shared by every background task.

use tokio::sync::watch;

/// Creates the shutdown channel. Sending `true` asks every holder of a receiver to stop.
pub fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Resolves when shutdown is signalled or the sender is dropped.
pub async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
