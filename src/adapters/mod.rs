pub mod http;
pub mod transport;

pub use http::{HttpWorkspaceApi, WorkspaceApi};
pub use transport::{Headers, InMemoryTransport, StompClient, Subscription, Transport};
