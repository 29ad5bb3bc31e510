//! Response-time measurements. Informational only; nothing gates on them.

use std::time::Duration;

use tokio::time::Instant;

/// Latency of the last turn.
#[derive(Debug, Clone, Default)]
pub struct PerformanceMetrics {
    /// Time the webhook took to accept the last message.
    pub webhook_latency: Option<Duration>,
    /// Time from the last dispatch to its first accepted reply.
    pub total_response_time: Option<Duration>,
    processing_started: Option<Instant>,
}

impl PerformanceMetrics {
    /// Start the response clock for a new dispatch.
    pub fn start_clock(&mut self, now: Instant) {
        self.processing_started = Some(now);
    }

    pub fn record_webhook(&mut self, latency: Duration) {
        self.webhook_latency = Some(latency);
    }

    /// Stop the response clock. Returns the measured time if a clock was running.
    pub fn record_reply(&mut self, now: Instant) -> Option<Duration> {
        let started = self.processing_started.take()?;
        let total = now.saturating_duration_since(started);
        self.total_response_time = Some(total);
        Some(total)
    }

    /// Drop a running clock without recording anything.
    pub fn cancel_clock(&mut self) {
        self.processing_started = None;
    }

    /// When the running clock was started.
    pub fn started_at(&self) -> Option<Instant> {
        self.processing_started
    }

    pub fn is_timing(&self) -> bool {
        self.processing_started.is_some()
    }
}
