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

//! Core types for the bridge server

use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tnbridge_telnetcodec::WindowSize;

/// Unique identifier for a session (monotonically increasing, never reused)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Create a new session ID
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the underlying u64 value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Session state (stored as atomic u8 for lock-free reads)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// Negotiating and spawning
    Starting = 0,
    /// Bytes are flowing in both directions
    Active = 1,
    /// One side has closed; the other is being wound down
    Draining = 2,
    /// Socket, process and admission slot released
    Closed = 3,
}

impl SessionState {
    /// Convert from u8 (for atomic operations)
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Starting,
            1 => Self::Active,
            2 => Self::Draining,
            _ => Self::Closed,
        }
    }

    /// Convert to u8 (for atomic operations)
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Check if the session is winding down or gone
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Draining | Self::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Active => write!(f, "active"),
            Self::Draining => write!(f, "draining"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// How a program ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    /// Exit code, absent when the program was killed by a signal
    pub code: Option<i32>,
    /// Whether the program reported success
    pub success: bool,
}

impl ExitStatus {
    /// Status for a program that exited with `code`
    pub fn from_code(code: i32) -> Self {
        Self {
            code: Some(code),
            success: code == 0,
        }
    }

    /// Status for a program terminated by a signal
    pub fn killed() -> Self {
        Self {
            code: None,
            success: false,
        }
    }

    /// Whether the program reported success
    pub fn success(&self) -> bool {
        self.success
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {code}"),
            None => write!(f, "terminated by signal"),
        }
    }
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The client closed the connection
    ClientClosed,
    /// The program exited; a non-success status is a crash
    ProcessExited(ExitStatus),
    /// Nothing moved in either direction for the idle timeout
    IdleTimeout,
    /// The server shut down
    Shutdown,
    /// The program could not be started
    SpawnFailed(String),
    /// The client connection failed
    ConnectionFailed(String),
}

impl SessionOutcome {
    /// Check whether the program crashed
    pub fn is_crash(&self) -> bool {
        matches!(self, SessionOutcome::ProcessExited(status) if !status.success())
    }
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionOutcome::ClientClosed => write!(f, "client closed"),
            SessionOutcome::ProcessExited(status) => write!(f, "process exited ({status})"),
            SessionOutcome::IdleTimeout => write!(f, "idle timeout"),
            SessionOutcome::Shutdown => write!(f, "server shutdown"),
            SessionOutcome::SpawnFailed(reason) => write!(f, "spawn failed: {reason}"),
            SessionOutcome::ConnectionFailed(reason) => write!(f, "connection failed: {reason}"),
        }
    }
}

/// Session information snapshot (for non-blocking queries)
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Session ID
    pub id: SessionId,
    /// Current state
    pub state: SessionState,
    /// Peer address
    pub peer_addr: SocketAddr,
    /// When the session was accepted
    pub created_at: Instant,
    /// Last byte moved in either direction
    pub last_activity: Instant,
    /// Terminal size currently applied to the program
    pub window_size: WindowSize,
    /// Program process id, once spawned
    pub pid: Option<u32>,
    /// Bytes written to the client
    pub bytes_sent: u64,
    /// Application bytes received from the client
    pub bytes_received: u64,
}

impl SessionInfo {
    /// Get the session duration
    pub fn duration(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Get the idle duration
    pub fn idle_duration(&self) -> Duration {
        self.last_activity.elapsed()
    }
}

/// Server snapshot for non-blocking debug information
#[derive(Debug, Clone)]
pub struct ServerSnapshot {
    /// Number of active sessions
    pub active_sessions: usize,
    /// Total sessions since server start
    pub total_sessions: u64,
    /// Connections rejected at capacity
    pub rejected_sessions: u64,
    /// Server bind address
    pub bind_address: SocketAddr,
    /// Server uptime
    pub uptime: Duration,
    /// Server start time
    pub started_at: Instant,
}

impl fmt::Display for ServerSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BridgeServer {{ active: {}, total: {}, rejected: {}, addr: {}, uptime: {:?} }}",
            self.active_sessions,
            self.total_sessions,
            self.rejected_sessions,
            self.bind_address,
            self.uptime
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id() {
        let id1 = SessionId::new(1);
        let id2 = SessionId::new(2);

        assert_eq!(id1.as_u64(), 1);
        assert_ne!(id1, id2);
        assert!(id1 < id2);
        assert_eq!(id2.to_string(), "session-2");
    }

    #[test]
    fn test_session_state_conversion() {
        for state in [
            SessionState::Starting,
            SessionState::Active,
            SessionState::Draining,
            SessionState::Closed,
        ] {
            assert_eq!(SessionState::from_u8(state.as_u8()), state);
        }
        assert_eq!(SessionState::from_u8(200), SessionState::Closed);
    }

    #[test]
    fn test_session_state_terminal() {
        assert!(!SessionState::Starting.is_terminal());
        assert!(!SessionState::Active.is_terminal());
        assert!(SessionState::Draining.is_terminal());
        assert!(SessionState::Closed.is_terminal());
    }

    #[test]
    fn test_outcome_crash() {
        assert!(!SessionOutcome::ProcessExited(ExitStatus::from_code(0)).is_crash());
        assert!(SessionOutcome::ProcessExited(ExitStatus::from_code(3)).is_crash());
        assert!(SessionOutcome::ProcessExited(ExitStatus::killed()).is_crash());
        assert!(!SessionOutcome::IdleTimeout.is_crash());
        assert_eq!(
            SessionOutcome::ProcessExited(ExitStatus::from_code(3)).to_string(),
            "process exited (exit code 3)"
        );
    }
}
