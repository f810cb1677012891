//! Outbox Relay
//!
//! Periodic sweep that drains the outbox onto the saga responses subject.
//! Delivery is at-least-once: an event is marked processed only after the bus
//! accepted it, so a crash between publish and mark republishes it.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::bus::EventBus;

use super::{OutboxError, OutboxEvent, OutboxRepository};

/// How many failed publishes an event may accumulate before it is parked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    /// `None` retries on every sweep forever
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn unbounded() -> Self {
        Self { max_attempts: None }
    }

    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts.max(1)),
        }
    }

    /// Whether the failure that brings the count to `previous_attempts + 1`
    /// exhausts the policy
    fn exhausted_after(&self, previous_attempts: i32) -> bool {
        match self.max_attempts {
            Some(max) => i64::from(previous_attempts) + 1 >= i64::from(max),
            None => false,
        }
    }
}

/// Configuration for the relay
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Subject outcomes are published to
    pub subject: String,
    /// Fixed interval between sweeps (default: 2 seconds)
    pub poll_interval: Duration,
    pub retry_policy: RetryPolicy,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            subject: "saga_responses".to_string(),
            poll_interval: Duration::from_millis(2000),
            retry_policy: RetryPolicy::unbounded(),
        }
    }
}

/// Result of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub fetched: usize,
    pub published: usize,
    pub failed: usize,
    /// Skipped because an earlier event of the same order failed this sweep
    pub deferred: usize,
    pub dead_lettered: usize,
}

impl SweepReport {
    pub fn is_idle(&self) -> bool {
        self.fetched == 0
    }
}

/// Outbox Relay - republishes staged events on the bus
pub struct OutboxRelay {
    repository: Arc<dyn OutboxRepository>,
    bus: Arc<dyn EventBus>,
    config: RelayConfig,
}

impl OutboxRelay {
    pub fn new(repository: Arc<dyn OutboxRepository>, bus: Arc<dyn EventBus>) -> Self {
        Self::with_config(repository, bus, RelayConfig::default())
    }

    pub fn with_config(
        repository: Arc<dyn OutboxRepository>,
        bus: Arc<dyn EventBus>,
        config: RelayConfig,
    ) -> Self {
        Self {
            repository,
            bus,
            config,
        }
    }

    /// Start the relay in the background.
    ///
    /// Flipping `shutdown` to `true` (or dropping its sender) stops the loop
    /// after the in-flight sweep finishes; no new sweep starts afterwards.
    pub fn start(self, shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run(shutdown).await;
        })
    }

    async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            subject = %self.config.subject,
            interval_ms = self.config.poll_interval.as_millis() as u64,
            max_attempts = ?self.config.retry_policy.max_attempts,
            "Outbox relay started"
        );

        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match self.sweep().await {
                        Ok(report) if !report.is_idle() => {
                            tracing::debug!(
                                fetched = report.fetched,
                                published = report.published,
                                failed = report.failed,
                                deferred = report.deferred,
                                dead_lettered = report.dead_lettered,
                                "Outbox sweep completed"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::error!(error = %e, "Outbox sweep failed");
                        }
                    }
                }
            }
        }

        tracing::info!("Outbox relay stopped");
    }

    /// Run one sweep over every unprocessed event.
    ///
    /// Each event is its own failure boundary. Once an event of an order fails,
    /// the rest of that order's events wait for the next sweep so they are never
    /// published ahead of it. Other orders proceed.
    pub async fn sweep(&self) -> Result<SweepReport, OutboxError> {
        let events = self.repository.fetch_unprocessed().await?;
        let mut report = SweepReport {
            fetched: events.len(),
            ..SweepReport::default()
        };
        let mut blocked_orders: HashSet<i64> = HashSet::new();

        for event in &events {
            if blocked_orders.contains(&event.aggregate_id) {
                report.deferred += 1;
                continue;
            }

            if let Err(e) = self.publish(event).await {
                blocked_orders.insert(event.aggregate_id);
                report.failed += 1;
                if self.handle_publish_failure(event, &e).await {
                    report.dead_lettered += 1;
                }
                continue;
            }

            match self.repository.mark_processed(event.id).await {
                Ok(()) => {
                    report.published += 1;
                    tracing::info!(
                        event_id = %event.event_id,
                        event_type = %event.event_type,
                        order_id = event.aggregate_id,
                        "Event published"
                    );
                }
                Err(e) => {
                    // Already on the bus; it goes out again next sweep
                    blocked_orders.insert(event.aggregate_id);
                    report.failed += 1;
                    tracing::warn!(
                        event_id = %event.event_id,
                        order_id = event.aggregate_id,
                        error = %e,
                        "Event published but not marked processed; it will be republished"
                    );
                }
            }
        }

        Ok(report)
    }

    async fn publish(&self, event: &OutboxEvent) -> Result<(), OutboxError> {
        let payload = serde_json::to_vec(&event.to_saga_event())?;
        self.bus.publish(&self.config.subject, payload).await?;
        Ok(())
    }

    /// Record the failure. Returns whether the event was dead-lettered.
    async fn handle_publish_failure(&self, event: &OutboxEvent, error: &OutboxError) -> bool {
        let dead_letter = self.config.retry_policy.exhausted_after(event.attempts);
        let message = error.to_string();

        if dead_letter {
            tracing::error!(
                event_id = %event.event_id,
                order_id = event.aggregate_id,
                attempts = event.attempts + 1,
                error = %message,
                "Event dead-lettered after exhausting publish attempts"
            );
        } else {
            tracing::warn!(
                event_id = %event.event_id,
                order_id = event.aggregate_id,
                attempts = event.attempts + 1,
                error = %message,
                "Failed to publish event; will retry next sweep"
            );
        }

        if let Err(e) = self
            .repository
            .record_failure(event.id, &message, dead_letter)
            .await
        {
            tracing::error!(
                event_id = %event.event_id,
                error = %e,
                "Failed to record publish failure"
            );
            return false;
        }

        dead_letter
    }
}
