//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Lock-free metrics for the Broadsock hub
//!
//! Counters are kept locally as atomics for snapshots and mirrored to the
//! `metrics` facade so an installed recorder can export them.

use metrics::{counter, gauge, histogram};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Lock-free server metrics
///
/// All metrics are stored as atomics and can be accessed concurrently
/// without locks. Use the `snapshot()` method to get a consistent view
/// of all metrics at a point in time.
#[derive(Debug)]
pub struct ServerMetrics {
    // Client counts
    total_clients: AtomicU64,
    active_clients: AtomicU64,
    rejected_clients: AtomicU64,

    // Throughput
    messages_received: AtomicU64,
    messages_sent: AtomicU64,
    bytes_sent: AtomicU64,
    frames_discarded: AtomicU64,

    // Errors
    send_failures: AtomicU64,
    protocol_errors: AtomicU64,
    accept_errors: AtomicU64,

    // Timing (stored as nanoseconds)
    total_client_duration_ns: AtomicU64,

    started_at: Instant,
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerMetrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self {
            total_clients: AtomicU64::new(0),
            active_clients: AtomicU64::new(0),
            rejected_clients: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            frames_discarded: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            accept_errors: AtomicU64::new(0),
            total_client_duration_ns: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    // Client tracking

    /// Record a client being registered
    pub fn client_connected(&self) {
        self.total_clients.fetch_add(1, Ordering::Relaxed);
        self.active_clients.fetch_add(1, Ordering::Relaxed);
        counter!("broadsock.clients.total").increment(1);
        gauge!("broadsock.clients.active").increment(1.0);
    }

    /// Record a client being evicted
    pub fn client_disconnected(&self, duration: Duration) {
        self.active_clients.fetch_sub(1, Ordering::Relaxed);
        self.total_client_duration_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
        gauge!("broadsock.clients.active").decrement(1.0);
        histogram!("broadsock.client.duration").record(duration.as_secs_f64());
    }

    /// Record a connection refused because the hub was full
    pub fn client_rejected(&self) {
        self.rejected_clients.fetch_add(1, Ordering::Relaxed);
        counter!("broadsock.clients.rejected").increment(1);
    }

    /// Get the current number of live clients
    pub fn active_clients(&self) -> u64 {
        self.active_clients.load(Ordering::Relaxed)
    }

    /// Get the total number of clients since server start
    pub fn total_clients(&self) -> u64 {
        self.total_clients.load(Ordering::Relaxed)
    }

    /// Get the number of rejected connections
    pub fn rejected_clients(&self) -> u64 {
        self.rejected_clients.load(Ordering::Relaxed)
    }

    // Throughput tracking

    /// Record a frame received from a client
    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        counter!("broadsock.messages.received").increment(1);
    }

    /// Record a frame written to a client
    pub fn message_sent(&self, bytes: usize) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        counter!("broadsock.messages.sent").increment(1);
    }

    /// Record an oversized frame that was drained and dropped
    pub fn frame_discarded(&self) {
        self.frames_discarded.fetch_add(1, Ordering::Relaxed);
        counter!("broadsock.frames.discarded").increment(1);
    }

    // Error tracking

    /// Record a failed or timed out write
    pub fn send_failed(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
        counter!("broadsock.errors.send").increment(1);
    }

    /// Record a malformed frame from a peer
    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
        counter!("broadsock.errors.protocol").increment(1);
    }

    /// Record a failed accept call
    pub fn accept_error(&self) {
        self.accept_errors.fetch_add(1, Ordering::Relaxed);
        counter!("broadsock.errors.accept").increment(1);
    }

    // Snapshot

    /// Get a snapshot of all metrics
    ///
    /// The snapshot may not be perfectly consistent if metrics are being
    /// updated concurrently, but it is close enough for monitoring.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_clients: self.total_clients.load(Ordering::Relaxed),
            active_clients: self.active_clients.load(Ordering::Relaxed),
            rejected_clients: self.rejected_clients.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            frames_discarded: self.frames_discarded.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            accept_errors: self.accept_errors.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
            avg_client_duration: self.average_client_duration(),
        }
    }

    fn average_client_duration(&self) -> Duration {
        let total = self.total_clients.load(Ordering::Relaxed);
        if total == 0 {
            return Duration::ZERO;
        }
        let total_ns = self.total_client_duration_ns.load(Ordering::Relaxed);
        Duration::from_nanos(total_ns / total)
    }
}

/// A snapshot of server metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Total clients since server start
    pub total_clients: u64,
    /// Current live clients
    pub active_clients: u64,
    /// Connections rejected at capacity
    pub rejected_clients: u64,
    /// Frames received from clients
    pub messages_received: u64,
    /// Frames written to clients
    pub messages_sent: u64,
    /// Bytes written to clients, headers included
    pub bytes_sent: u64,
    /// Oversized frames drained and dropped
    pub frames_discarded: u64,
    /// Failed or timed out writes
    pub send_failures: u64,
    /// Malformed frames
    pub protocol_errors: u64,
    /// Failed accept calls
    pub accept_errors: u64,
    /// Server uptime
    pub uptime: Duration,
    /// Average client lifetime
    pub avg_client_duration: Duration,
}

impl MetricsSnapshot {
    /// Calculate total error count
    pub fn total_errors(&self) -> u64 {
        self.send_failures + self.protocol_errors + self.accept_errors
    }

    /// Calculate messages per second (sent)
    pub fn messages_sent_per_sec(&self) -> f64 {
        if self.uptime.is_zero() {
            return 0.0;
        }
        self.messages_sent as f64 / self.uptime.as_secs_f64()
    }
}
