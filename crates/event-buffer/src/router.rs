//! Routing of buffered events to the aggregate that owns their type.

use std::collections::HashMap;
use std::sync::Arc;

use event_store::{BufferedEvent, Version};

use crate::applier::EventApplier;
use crate::{DispatchError, Result};

/// Registry mapping each event type to exactly one [`EventApplier`].
///
/// Registration happens once at startup and fails on any overlap, so a
/// router that was built successfully routes every registered type
/// unambiguously.
#[derive(Default)]
pub struct EventRouter {
    routes: HashMap<&'static str, Arc<dyn EventApplier>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes every event type the applier accepts to it.
    ///
    /// Nothing is registered if any of its types is already routed.
    pub fn register(&mut self, applier: impl EventApplier + 'static) -> Result<()> {
        let applier: Arc<dyn EventApplier> = Arc::new(applier);

        if let Some((event_type, existing)) = applier
            .event_types()
            .iter()
            .find_map(|t| self.routes.get(t).map(|existing| (*t, existing)))
        {
            return Err(DispatchError::DuplicateRoute {
                event_type: event_type.to_string(),
                aggregate_type: existing.aggregate_type(),
            });
        }

        for event_type in applier.event_types() {
            self.routes.insert(*event_type, Arc::clone(&applier));
        }
        tracing::debug!(
            aggregate_type = applier.aggregate_type(),
            event_types = applier.event_types().len(),
            "applier registered"
        );
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, applier: impl EventApplier + 'static) -> Result<Self> {
        self.register(applier)?;
        Ok(self)
    }

    pub fn is_routed(&self, event_type: &str) -> bool {
        self.routes.contains_key(event_type)
    }

    /// All routed event types, sorted.
    pub fn event_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.routes.keys().copied().collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Hands a row to the applier for its event type.
    pub async fn dispatch(&self, event: &BufferedEvent) -> Result<Version> {
        let applier = self
            .routes
            .get(event.event_type.as_str())
            .ok_or_else(|| DispatchError::Unroutable {
                event_type: event.event_type.clone(),
            })?;
        applier.apply(event).await
    }
}
