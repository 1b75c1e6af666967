//! Deferred dispatch of buffered events.
//!
//! Rows in the event buffer carry an event and an expiry timestamp. Once a
//! row expires, the [`EventBufferWatcher`] hands it to the [`EventRouter`],
//! which runs it through the owning aggregate's load, apply and save cycle.
//! The row is deleted only after that succeeds.
//!
//! Delivery is at-least-once: a crash between save and delete, or two
//! watchers polling the same buffer, applies an event twice. Every event
//! routed here must therefore be safe to apply more than once.

pub mod applier;
pub mod error;
pub mod router;
pub mod watcher;

pub use applier::{AggregateApplier, EventApplier};
pub use error::{DispatchError, Result};
pub use router::EventRouter;
pub use watcher::{EventBufferWatcher, TickReport, WatcherConfig};
