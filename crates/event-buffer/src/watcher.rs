//! Poller that delivers expired buffer rows.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use event_store::{BufferedEvent, EventBufferStore, EventId};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::{DispatchError, EventRouter, Result};

/// Polling behaviour of an [`EventBufferWatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherConfig {
    /// Time between the starts of two ticks.
    pub poll_interval: Duration,

    /// Consecutive failed ticks after which a row is parked. `None` keeps
    /// retrying a failing row forever.
    pub max_attempts: Option<u32>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            max_attempts: None,
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Rows that were due.
    pub expired: usize,

    /// Rows applied and deleted.
    pub dispatched: usize,

    /// Rows that failed and were left in place (or parked).
    pub failed: usize,

    /// Rows moved to the dead-letter area this tick.
    pub parked: usize,
}

/// Periodically applies expired buffer rows through an [`EventRouter`].
///
/// Rows are processed one at a time, oldest expiry first. A row is deleted
/// only after its event was saved; a row whose dispatch fails stays in the
/// buffer and is retried on the next tick.
///
/// Several watchers may poll the same buffer. That is correct only because
/// every routed event is idempotent: two watchers picking up the same row
/// both apply it, and the second delete simply finds nothing.
pub struct EventBufferWatcher<B> {
    buffer: B,
    router: Arc<EventRouter>,
    config: WatcherConfig,
    failures: Mutex<HashMap<EventId, u32>>,
    shutdown: Notify,
}

impl<B: EventBufferStore + 'static> EventBufferWatcher<B> {
    pub fn new(buffer: B, router: Arc<EventRouter>, config: WatcherConfig) -> Self {
        Self {
            buffer,
            router,
            config,
            failures: Mutex::new(HashMap::new()),
            shutdown: Notify::new(),
        }
    }

    pub fn buffer(&self) -> &B {
        &self.buffer
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    /// Runs one pass over the rows due at `now`.
    ///
    /// Only failing to read the buffer is an error; per-row failures are
    /// logged and counted in the report.
    #[tracing::instrument(skip(self))]
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickReport> {
        let started = Instant::now();
        let rows = self.buffer.get_expired(now).await?;
        let mut report = TickReport {
            expired: rows.len(),
            ..TickReport::default()
        };

        for row in &rows {
            match self.router.dispatch(row).await {
                Ok(version) => {
                    self.failures.lock().await.remove(&row.event_id);
                    if let Err(e) = self.buffer.delete(row.event_id).await {
                        // Applied but still buffered; the next tick applies it again.
                        tracing::error!(event_id = %row.event_id, error = %e, "failed to delete delivered row");
                        report.failed += 1;
                        continue;
                    }
                    tracing::debug!(
                        event_id = %row.event_id,
                        event_type = %row.event_type,
                        version = %version,
                        "buffered event delivered"
                    );
                    metrics::counter!("event_buffer_dispatched_total").increment(1);
                    report.dispatched += 1;
                }
                Err(e) => {
                    tracing::error!(
                        event_id = %row.event_id,
                        event_type = %row.event_type,
                        stream = %row.aggregate_id,
                        error = %e,
                        "buffered event dispatch failed"
                    );
                    metrics::counter!("event_buffer_dispatch_failures_total").increment(1);
                    report.failed += 1;

                    if self.record_failure(row, &e).await {
                        report.parked += 1;
                    }
                }
            }
        }

        // Rows gone from the buffer were delivered or parked elsewhere
        self.failures
            .lock()
            .await
            .retain(|event_id, _| rows.iter().any(|row| row.event_id == *event_id));

        metrics::histogram!("event_buffer_tick_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        if report.expired > 0 {
            tracing::info!(
                expired = report.expired,
                dispatched = report.dispatched,
                failed = report.failed,
                parked = report.parked,
                "event buffer tick"
            );
        }
        Ok(report)
    }

    /// Counts a failure and parks the row once it reaches `max_attempts`.
    /// Returns true if the row was parked.
    async fn record_failure(&self, row: &BufferedEvent, error: &DispatchError) -> bool {
        let Some(max_attempts) = self.config.max_attempts else {
            return false;
        };

        let mut failures = self.failures.lock().await;
        let count = failures.entry(row.event_id).or_insert(0);
        *count += 1;
        if *count < max_attempts {
            return false;
        }

        let attempts = *count;
        failures.remove(&row.event_id);
        drop(failures);

        let reason = format!("failed {attempts} times: {error}");
        match self.buffer.park(row.event_id, &reason).await {
            Ok(()) => {
                tracing::warn!(event_id = %row.event_id, attempts, "buffered event parked");
                metrics::counter!("event_buffer_rows_parked_total").increment(1);
                true
            }
            Err(e) => {
                tracing::error!(event_id = %row.event_id, error = %e, "failed to park row");
                false
            }
        }
    }

    /// Starts polling on a background task.
    ///
    /// The first tick runs immediately. A tick that overruns the interval
    /// skips the ticks it missed rather than bursting to catch up.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let watcher = Arc::clone(self);
        tokio::spawn(async move { watcher.run().await })
    }

    async fn run(&self) {
        if self.config.poll_interval.is_zero() {
            tracing::error!("event buffer poll interval is zero, watcher not started");
            return;
        }

        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            routes = self.router.len(),
            "event buffer watcher started"
        );

        loop {
            tokio::select! {
                () = self.shutdown.notified() => break,
                _ = interval.tick() => {
                    // Shutdown is only observed between ticks
                    if let Err(e) = self.tick(Utc::now()).await {
                        tracing::error!(error = %e, "event buffer tick failed");
                    }
                }
            }
        }

        tracing::info!("event buffer watcher stopped");
    }

    /// Asks the polling task to exit after the tick in progress, if any.
    ///
    /// Await the handle returned by [`start`](Self::start) to wait for it.
    pub fn stop(&self) {
        self.shutdown.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AggregateApplier;
    use chrono::Duration as ChronoDuration;
    use common::{AggregateId, AggregateKey};
    use domain::{DomainEvent, Location, LocationEvent};
    use event_store::{EventEnvelope, InMemoryEventBuffer, InMemoryEventStore, Version};

    fn row(object_id: &str, expiry: DateTime<Utc>) -> BufferedEvent {
        let event = LocationEvent::skipped_validation("t1", "Main St", "Missing country");
        let envelope = EventEnvelope::builder()
            .aggregate_id(AggregateId::new("location", AggregateKey::new("t1", object_id)))
            .event_type(event.event_type())
            .version(Version::first())
            .data_raw(event.encode().unwrap())
            .build()
            .unwrap();
        BufferedEvent::schedule(envelope, expiry)
    }

    fn watcher(
        buffer: InMemoryEventBuffer,
        max_attempts: Option<u32>,
    ) -> EventBufferWatcher<InMemoryEventBuffer> {
        let router = EventRouter::new()
            .with(AggregateApplier::<_, Location>::new(InMemoryEventStore::new()))
            .unwrap();
        EventBufferWatcher::new(
            buffer,
            Arc::new(router),
            WatcherConfig {
                poll_interval: Duration::from_millis(10),
                max_attempts,
            },
        )
    }

    #[tokio::test]
    async fn only_expired_rows_are_delivered() {
        let buffer = InMemoryEventBuffer::new();
        let now = Utc::now();
        buffer.upsert(row("due", now)).await.unwrap();
        buffer
            .upsert(row("later", now + ChronoDuration::minutes(5)))
            .await
            .unwrap();

        let report = watcher(buffer.clone(), None).tick(now).await.unwrap();

        assert_eq!(report.expired, 1);
        assert_eq!(report.dispatched, 1);
        assert_eq!(buffer.len().await, 1);
    }

    #[tokio::test]
    async fn failing_rows_stay_until_parked() {
        let buffer = InMemoryEventBuffer::new();
        let now = Utc::now();
        let mut bad = row("bad", now);
        bad.event_type = "V1_UNKNOWN".to_string();
        buffer.upsert(bad.clone()).await.unwrap();

        let watcher = watcher(buffer.clone(), Some(2));

        let first = watcher.tick(now).await.unwrap();
        assert_eq!((first.failed, first.parked), (1, 0));
        assert!(buffer.get(bad.event_id).await.is_some());

        let second = watcher.tick(now).await.unwrap();
        assert_eq!((second.failed, second.parked), (1, 1));
        assert!(buffer.is_empty().await);

        let parked = buffer.parked().await.unwrap();
        assert_eq!(parked.len(), 1);
        assert!(parked[0].reason.contains("V1_UNKNOWN"));
    }

    #[tokio::test]
    async fn without_max_attempts_rows_are_retried_forever() {
        let buffer = InMemoryEventBuffer::new();
        let now = Utc::now();
        let mut bad = row("bad", now);
        bad.event_type = "V1_UNKNOWN".to_string();
        buffer.upsert(bad).await.unwrap();

        let watcher = watcher(buffer.clone(), None);
        for _ in 0..5 {
            watcher.tick(now).await.unwrap();
        }

        assert_eq!(buffer.len().await, 1);
        assert!(buffer.parked().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failure_counts_reset_when_row_leaves_the_buffer() {
        let buffer = InMemoryEventBuffer::new();
        let now = Utc::now();
        let mut bad = row("bad", now);
        bad.event_type = "V1_UNKNOWN".to_string();
        buffer.upsert(bad.clone()).await.unwrap();

        let watcher = watcher(buffer.clone(), Some(3));
        watcher.tick(now).await.unwrap();
        watcher.tick(now).await.unwrap();

        // Another instance takes the row away between ticks
        buffer.delete(bad.event_id).await.unwrap();
        watcher.tick(now).await.unwrap();

        buffer.upsert(bad.clone()).await.unwrap();
        let report = watcher.tick(now).await.unwrap();

        assert_eq!((report.failed, report.parked), (1, 0));
        assert!(buffer.get(bad.event_id).await.is_some());
        assert!(buffer.parked().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn zero_poll_interval_exits_without_panicking() {
        let router = EventRouter::new();
        let watcher = Arc::new(EventBufferWatcher::new(
            InMemoryEventBuffer::new(),
            Arc::new(router),
            WatcherConfig {
                poll_interval: Duration::ZERO,
                max_attempts: None,
            },
        ));

        assert!(watcher.start().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn start_polls_until_stopped() {
        let buffer = InMemoryEventBuffer::new();
        let watcher = Arc::new(watcher(buffer.clone(), None));
        let handle = watcher.start();

        tokio::time::sleep(Duration::from_millis(25)).await;
        buffer.upsert(row("late", Utc::now())).await.unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(buffer.is_empty().await);

        watcher.stop();
        handle.await.unwrap();
    }
}
