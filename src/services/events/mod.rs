pub mod channel;
pub mod consumer;
pub mod event;
pub mod handlers;

pub use channel::{Envelope, EventChannel, EventError, Subscription};
pub use consumer::{EventConsumer, EventHandler};
pub use event::{FileEvent, FileEventKind};
pub use handlers::{OrphanHandler, ReferenceCountHandler};
