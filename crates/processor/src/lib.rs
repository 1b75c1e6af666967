//! Event processing service for the CRM core.
//!
//! Wires the command services and the event buffer watcher over one pair of
//! backends (event log and event buffer), either PostgreSQL or in-memory.

pub mod config;

use std::sync::Arc;

use domain::{Contact, ContactService, Location, LocationService};
use event_buffer::{AggregateApplier, DispatchError, EventBufferWatcher, EventRouter};
use event_store::{EventBufferStore, EventStore};

pub use config::{Config, ConfigError, LogFormat};

/// Builds the router for every aggregate type the service owns.
pub fn build_router<S>(events: S, config: &Config) -> Result<EventRouter, DispatchError>
where
    S: EventStore + Clone + 'static,
{
    EventRouter::new()
        .with(AggregateApplier::<_, Location>::with_policy(
            events.clone(),
            config.retry_policy(),
        ))?
        .with(AggregateApplier::<_, Contact>::with_policy(
            events,
            config.retry_policy(),
        ))
}

/// Command services and the buffer watcher sharing one set of backends.
pub struct Processor<S: EventStore, B> {
    pub locations: LocationService<S>,
    pub contacts: ContactService<S>,
    pub watcher: Arc<EventBufferWatcher<B>>,
}

impl<S, B> Processor<S, B>
where
    S: EventStore + Clone + 'static,
    B: EventBufferStore + 'static,
{
    pub fn new(events: S, buffer: B, config: &Config) -> Result<Self, DispatchError> {
        let router = build_router(events.clone(), config)?;
        Ok(Self {
            locations: LocationService::with_policy(events.clone(), config.retry_policy()),
            contacts: ContactService::with_policy(events, config.retry_policy()),
            watcher: Arc::new(EventBufferWatcher::new(
                buffer,
                Arc::new(router),
                config.watcher_config(),
            )),
        })
    }

    /// Runs the watcher until `shutdown` resolves, then waits for the tick in
    /// progress to finish.
    ///
    /// Returns early, logging why, if the watcher task exits on its own.
    pub async fn run_until(&self, shutdown: impl Future<Output = ()>) {
        let mut handle = self.watcher.start();
        tokio::select! {
            () = shutdown => {}
            result = &mut handle => {
                match result {
                    Ok(()) => tracing::error!("event buffer watcher exited before shutdown"),
                    Err(e) => tracing::error!(error = %e, "event buffer watcher task failed"),
                }
                return;
            }
        }

        self.watcher.stop();
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "event buffer watcher task failed");
        }
    }
}
