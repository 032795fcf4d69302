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

//! Lock-free metrics for the bridge server
//!
//! Every update is also reported to the `metrics` facade under the `tnbridge.` prefix, so an
//! installed recorder sees the same numbers as [`ServerMetrics::snapshot`].

use metrics::{counter, gauge, histogram};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Lock-free server metrics
#[derive(Debug)]
pub struct ServerMetrics {
    // Session counts
    total_sessions: AtomicU64,
    active_sessions: AtomicU64,
    rejected_sessions: AtomicU64,

    // Throughput
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,

    // Errors and endings
    spawn_failures: AtomicU64,
    connection_errors: AtomicU64,
    protocol_errors: AtomicU64,
    idle_timeouts: AtomicU64,
    process_crashes: AtomicU64,

    // Timing (stored as nanoseconds)
    total_session_duration_ns: AtomicU64,
    closed_sessions: AtomicU64,

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
            total_sessions: AtomicU64::new(0),
            active_sessions: AtomicU64::new(0),
            rejected_sessions: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            spawn_failures: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            idle_timeouts: AtomicU64::new(0),
            process_crashes: AtomicU64::new(0),
            total_session_duration_ns: AtomicU64::new(0),
            closed_sessions: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    // Session tracking

    /// Record a session being admitted
    pub fn session_opened(&self) {
        self.total_sessions.fetch_add(1, Ordering::Relaxed);
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
        counter!("tnbridge.sessions.total").increment(1);
        gauge!("tnbridge.sessions.active").increment(1.0);
    }

    /// Record a session being closed
    pub fn session_closed(&self, duration: Duration) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
        self.closed_sessions.fetch_add(1, Ordering::Relaxed);
        self.total_session_duration_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
        gauge!("tnbridge.sessions.active").decrement(1.0);
        histogram!("tnbridge.session.duration").record(duration.as_secs_f64());
    }

    /// Record a connection turned away at capacity
    pub fn session_rejected(&self) {
        self.rejected_sessions.fetch_add(1, Ordering::Relaxed);
        counter!("tnbridge.sessions.rejected").increment(1);
    }

    /// Get the current number of active sessions
    pub fn active_sessions(&self) -> u64 {
        self.active_sessions.load(Ordering::Relaxed)
    }

    /// Get the total number of sessions since server start
    pub fn total_sessions(&self) -> u64 {
        self.total_sessions.load(Ordering::Relaxed)
    }

    /// Get the number of rejected connections
    pub fn rejected_sessions(&self) -> u64 {
        self.rejected_sessions.load(Ordering::Relaxed)
    }

    // Throughput tracking

    /// Record bytes written to a client
    pub fn bytes_sent(&self, count: u64) {
        self.bytes_sent.fetch_add(count, Ordering::Relaxed);
        counter!("tnbridge.bytes.sent").increment(count);
    }

    /// Record application bytes received from a client
    pub fn bytes_received(&self, count: u64) {
        self.bytes_received.fetch_add(count, Ordering::Relaxed);
        counter!("tnbridge.bytes.received").increment(count);
    }

    // Error tracking

    /// Record a program that failed to start
    pub fn spawn_failure(&self) {
        self.spawn_failures.fetch_add(1, Ordering::Relaxed);
        counter!("tnbridge.errors.spawn").increment(1);
    }

    /// Record a client connection error
    pub fn connection_error(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
        counter!("tnbridge.errors.connection").increment(1);
    }

    /// Record malformed telnet sequences tolerated by a session
    pub fn protocol_errors(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.protocol_errors.fetch_add(count, Ordering::Relaxed);
        counter!("tnbridge.errors.protocol").increment(count);
    }

    /// Record a session closed for inactivity
    pub fn idle_timeout(&self) {
        self.idle_timeouts.fetch_add(1, Ordering::Relaxed);
        counter!("tnbridge.sessions.idle_timeout").increment(1);
    }

    /// Record a program that exited unsuccessfully
    pub fn process_crash(&self) {
        self.process_crashes.fetch_add(1, Ordering::Relaxed);
        counter!("tnbridge.errors.process_crash").increment(1);
    }

    // Snapshot

    /// Get a point-in-time view of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_sessions: self.total_sessions.load(Ordering::Relaxed),
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
            rejected_sessions: self.rejected_sessions.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            spawn_failures: self.spawn_failures.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            idle_timeouts: self.idle_timeouts.load(Ordering::Relaxed),
            process_crashes: self.process_crashes.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
            avg_session_duration: self.average_session_duration(),
        }
    }

    fn average_session_duration(&self) -> Duration {
        let closed = self.closed_sessions.load(Ordering::Relaxed);
        if closed == 0 {
            return Duration::ZERO;
        }
        let total_ns = self.total_session_duration_ns.load(Ordering::Relaxed);
        Duration::from_nanos(total_ns / closed)
    }
}

/// A snapshot of server metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Total sessions since server start
    pub total_sessions: u64,
    /// Current active sessions
    pub active_sessions: u64,
    /// Connections rejected at capacity
    pub rejected_sessions: u64,
    /// Total bytes written to clients
    pub bytes_sent: u64,
    /// Total application bytes received from clients
    pub bytes_received: u64,
    /// Programs that failed to start
    pub spawn_failures: u64,
    /// Client connection errors
    pub connection_errors: u64,
    /// Malformed telnet sequences tolerated
    pub protocol_errors: u64,
    /// Sessions closed for inactivity
    pub idle_timeouts: u64,
    /// Programs that exited unsuccessfully
    pub process_crashes: u64,
    /// Server uptime
    pub uptime: Duration,
    /// Average duration of closed sessions
    pub avg_session_duration: Duration,
}

impl MetricsSnapshot {
    /// Calculate bytes per second (sent)
    pub fn bytes_sent_per_sec(&self) -> f64 {
        if self.uptime.is_zero() {
            return 0.0;
        }
        self.bytes_sent as f64 / self.uptime.as_secs_f64()
    }

    /// Calculate bytes per second (received)
    pub fn bytes_received_per_sec(&self) -> f64 {
        if self.uptime.is_zero() {
            return 0.0;
        }
        self.bytes_received as f64 / self.uptime.as_secs_f64()
    }

    /// Calculate total error count
    pub fn total_errors(&self) -> u64 {
        self.spawn_failures + self.connection_errors + self.protocol_errors
    }
}
