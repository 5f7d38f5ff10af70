//! Shutdown signalling shared by the ingress tasks and the delivery server

use tokio::sync::watch;

/// Resolves once the shutdown flag is set or its sender is gone
///
/// Cancel safe, so it can sit in a `tokio::select!` loop.
pub(crate) async fn shutdown_signalled(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}
