//! Observability and Metrics
//!
//! Per-connection counters for packet traffic and decode health.
//!
//! Uses atomic counters so the reader and consumer tasks can record
//! without coordination.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Metrics collector for one connection
#[derive(Debug)]
pub struct Metrics {
    /// Frames decoded off the socket
    pub packets_received: AtomicU64,
    /// Frames written to the socket
    pub packets_sent: AtomicU64,
    /// Frame bytes received, before decompression
    pub bytes_received: AtomicU64,
    /// Frame bytes sent, after compression
    pub bytes_sent: AtomicU64,
    /// Inbound frames that carried a zlib body
    pub compressed_frames: AtomicU64,
    /// Packets whose interpreter failed
    pub decode_failures: AtomicU64,
    /// Inbound packets with no interpreter for their type
    pub ignored_packets: AtomicU64,
    /// Signed chat messages delivered as unverified
    pub unverified_messages: AtomicU64,
    /// Largest queue depth observed by the consumer
    pub queue_high_water: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            packets_received: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            compressed_frames: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            ignored_packets: AtomicU64::new(0),
            unverified_messages: AtomicU64::new(0),
            queue_high_water: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record an inbound frame
    pub fn packet_received(&self, byte_count: u64, compressed: bool) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
        if compressed {
            self.compressed_frames.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record an outbound frame
    pub fn packet_sent(&self, byte_count: u64) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn packet_ignored(&self) {
        self.ignored_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn unverified_message(&self) {
        self.unverified_messages.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a queue depth report
    pub fn queue_depth(&self, depth: usize) {
        self.queue_high_water.fetch_max(depth as u64, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            compressed_frames: self.compressed_frames.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            ignored_packets: self.ignored_packets.load(Ordering::Relaxed),
            unverified_messages: self.unverified_messages.load(Ordering::Relaxed),
            queue_high_water: self.queue_high_water.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            packets_received = snapshot.packets_received,
            packets_sent = snapshot.packets_sent,
            bytes_received = snapshot.bytes_received,
            bytes_sent = snapshot.bytes_sent,
            compressed_frames = snapshot.compressed_frames,
            decode_failures = snapshot.decode_failures,
            ignored_packets = snapshot.ignored_packets,
            unverified_messages = snapshot.unverified_messages,
            queue_high_water = snapshot.queue_high_water,
            uptime_seconds = snapshot.uptime_seconds,
            "Connection metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub packets_received: u64,
    pub packets_sent: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub compressed_frames: u64,
    pub decode_failures: u64,
    pub ignored_packets: u64,
    pub unverified_messages: u64,
    pub queue_high_water: u64,
    pub uptime_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = Metrics::new();
        metrics.packet_received(100, true);
        metrics.packet_received(20, false);
        metrics.packet_sent(5);
        metrics.queue_depth(3);
        metrics.queue_depth(1);

        let snap = metrics.snapshot();
        assert_eq!(snap.packets_received, 2);
        assert_eq!(snap.bytes_received, 120);
        assert_eq!(snap.compressed_frames, 1);
        assert_eq!(snap.packets_sent, 1);
        assert_eq!(snap.queue_high_water, 3);
    }
}
