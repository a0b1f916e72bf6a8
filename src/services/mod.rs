use tokio::sync::watch;

pub mod chat;
pub mod connection;
pub mod inbox;

pub use chat::{ChatSession, SessionCommand, SessionEvent, SessionHandle, SessionReport};
pub use connection::{ConnectionManager, Connector, StompConnector};
pub use inbox::{InboxHandle, InboxList, InboxWatcher};

/// Resolves once `shutdown` reads `true`, or once its sender is gone.
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|&stop| stop).await;
}
