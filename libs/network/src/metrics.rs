//! Server Metrics
//!
//! Running counters fed by the event loop once per received message.
//!
//! The "interval" statistics are gaps between consecutive message arrivals
//! as seen by the server. They are a jitter/throughput proxy, not round-trip
//! or send-to-receive latency, even though the end-of-run report labels the
//! mean "Average Latency".

use std::time::{Duration, Instant};

/// Mutable aggregator state
///
/// Never reset; lives as long as the server that owns it.
#[derive(Debug, Clone)]
pub struct ServerMetrics {
    start_time: Instant,
    total_clients: u64,
    total_messages: u64,
    total_bytes: u64,
    last_message: Option<Instant>,
    interval_sum_ms: f64,
    interval_min_ms: f64,
    interval_max_ms: f64,
    interval_count: u64,
}

impl ServerMetrics {
    pub fn new(start_time: Instant) -> Self {
        Self {
            start_time,
            total_clients: 0,
            total_messages: 0,
            total_bytes: 0,
            last_message: None,
            interval_sum_ms: 0.0,
            interval_min_ms: f64::INFINITY,
            interval_max_ms: 0.0,
            interval_count: 0,
        }
    }

    /// Count an accepted connection
    pub fn record_client(&mut self) {
        self.total_clients += 1;
    }

    /// Fold one received message into the counters
    pub fn record_message(&mut self, payload_bytes: usize, at: Instant) {
        self.total_messages += 1;
        self.total_bytes += payload_bytes as u64;

        if let Some(previous) = self.last_message {
            let gap_ms = at.saturating_duration_since(previous).as_secs_f64() * 1000.0;
            self.interval_sum_ms += gap_ms;
            self.interval_min_ms = self.interval_min_ms.min(gap_ms);
            self.interval_max_ms = self.interval_max_ms.max(gap_ms);
            self.interval_count += 1;
        }
        self.last_message = Some(at);
    }

    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    /// Derive a point-in-time view without mutating state
    pub fn snapshot(&self, now: Instant) -> MetricsSnapshot {
        let uptime = now.saturating_duration_since(self.start_time);
        let secs = uptime.as_secs_f64();
        let throughput_mbps = if secs > 0.0 {
            self.total_bytes as f64 / 1_048_576.0 / secs
        } else {
            0.0
        };

        let (avg, min, max) = if self.interval_count > 0 {
            (
                self.interval_sum_ms / self.interval_count as f64,
                self.interval_min_ms,
                self.interval_max_ms,
            )
        } else {
            (0.0, 0.0, 0.0)
        };

        MetricsSnapshot {
            total_clients: self.total_clients,
            total_messages: self.total_messages,
            total_bytes: self.total_bytes,
            uptime,
            throughput_mbps,
            avg_interval_ms: avg,
            min_interval_ms: min,
            max_interval_ms: max,
        }
    }
}

/// Read-only metrics view
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    /// Connections ever accepted
    pub total_clients: u64,
    pub total_messages: u64,
    /// Payload bytes only; headers are not counted
    pub total_bytes: u64,
    pub uptime: Duration,
    /// Megabytes (2^20) per second over the whole uptime
    pub throughput_mbps: f64,
    /// Mean inter-arrival gap
    pub avg_interval_ms: f64,
    pub min_interval_ms: f64,
    pub max_interval_ms: f64,
}

impl MetricsSnapshot {
    /// Messages per second over the whole uptime
    pub fn message_rate(&self) -> f64 {
        let secs = self.uptime.as_secs_f64();
        if secs > 0.0 {
            self.total_messages as f64 / secs
        } else {
            0.0
        }
    }
}
