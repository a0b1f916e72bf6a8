pub mod composer;
pub mod paginator;
pub mod scroll;
pub mod session;
pub mod subscription;
pub mod timeline;

pub use composer::Composer;
pub use paginator::{HistoryPaginator, PageOutcome};
pub use scroll::{ScrollAnchor, Viewport};
pub use session::{ChatSession, ConnectionWatch, SessionCommand, SessionEvent, SessionHandle, SessionReport};
pub use subscription::{LiveSubscription, Push};
pub use timeline::{Side, Timeline, TimelineEntry};
