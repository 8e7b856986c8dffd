// Metrics collection and tracking

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tts_core::RelaySummary;

static START_TIME: OnceLock<Instant> = OnceLock::new();

/// Counters for the chat endpoint and the speech relays it starts.
#[derive(Debug, Clone)]
pub struct RelayMetrics {
    pub chat_requests: Arc<AtomicU64>,
    pub upstream_failures: Arc<AtomicU64>,
    pub total_latency_ms: Arc<AtomicU64>,
    pub latency_samples: Arc<AtomicU64>,
    pub min_latency_ms: Arc<AtomicU64>,
    pub max_latency_ms: Arc<AtomicU64>,
    pub relays_started: Arc<AtomicU64>,
    pub relays_completed: Arc<AtomicU64>,
    pub relays_cancelled: Arc<AtomicU64>,
    pub units_spoken: Arc<AtomicU64>,
    pub synthesis_failures: Arc<AtomicU64>,
    pub playback_failures: Arc<AtomicU64>,
}

impl RelayMetrics {
    pub fn new() -> Self {
        START_TIME.get_or_init(Instant::now);
        Self {
            chat_requests: Arc::new(AtomicU64::new(0)),
            upstream_failures: Arc::new(AtomicU64::new(0)),
            total_latency_ms: Arc::new(AtomicU64::new(0)),
            latency_samples: Arc::new(AtomicU64::new(0)),
            min_latency_ms: Arc::new(AtomicU64::new(u64::MAX)),
            max_latency_ms: Arc::new(AtomicU64::new(0)),
            relays_started: Arc::new(AtomicU64::new(0)),
            relays_completed: Arc::new(AtomicU64::new(0)),
            relays_cancelled: Arc::new(AtomicU64::new(0)),
            units_spoken: Arc::new(AtomicU64::new(0)),
            synthesis_failures: Arc::new(AtomicU64::new(0)),
            playback_failures: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn record_chat_request(&self) {
        self.chat_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upstream_failure(&self) {
        self.upstream_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Time until the upstream stream was open.
    pub fn record_latency(&self, latency_ms: u64) {
        self.latency_samples.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.min_latency_ms.fetch_min(latency_ms, Ordering::Relaxed);
        self.max_latency_ms.fetch_max(latency_ms, Ordering::Relaxed);
    }

    pub fn record_relay_started(&self) {
        self.relays_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_relay(&self, summary: &RelaySummary) {
        self.relays_completed.fetch_add(1, Ordering::Relaxed);
        self.units_spoken
            .fetch_add(summary.units_spoken, Ordering::Relaxed);
        self.synthesis_failures
            .fetch_add(summary.synthesis_failures, Ordering::Relaxed);
        if summary.playback_failed {
            self.playback_failures.fetch_add(1, Ordering::Relaxed);
        }
        if summary.cancelled {
            self.relays_cancelled.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn avg_latency_ms(&self) -> f64 {
        let count = self.latency_samples.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        let total = self.total_latency_ms.load(Ordering::Relaxed);
        total as f64 / count as f64
    }

    pub fn snapshot(&self) -> MetricsResponse {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        let min = load(&self.min_latency_ms);
        MetricsResponse {
            timestamp: Utc::now(),
            uptime_seconds: START_TIME
                .get()
                .map(|start| start.elapsed().as_secs())
                .unwrap_or(0),
            chat: ChatStats {
                request_count: load(&self.chat_requests),
                upstream_failures: load(&self.upstream_failures),
                avg_latency_ms: self.avg_latency_ms(),
                min_latency_ms: if min == u64::MAX { 0 } else { min },
                max_latency_ms: load(&self.max_latency_ms),
            },
            relay: RelayStats {
                started: load(&self.relays_started),
                completed: load(&self.relays_completed),
                cancelled: load(&self.relays_cancelled),
                units_spoken: load(&self.units_spoken),
                synthesis_failures: load(&self.synthesis_failures),
                playback_failures: load(&self.playback_failures),
            },
        }
    }
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub chat: ChatStats,
    pub relay: RelayStats,
}

#[derive(Debug, Serialize)]
pub struct ChatStats {
    pub request_count: u64,
    pub upstream_failures: u64,
    pub avg_latency_ms: f64,
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct RelayStats {
    pub started: u64,
    pub completed: u64,
    pub cancelled: u64,
    pub units_spoken: u64,
    pub synthesis_failures: u64,
    pub playback_failures: u64,
}
