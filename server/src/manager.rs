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

//! Session manager implementation
//!
//! The SessionManager is responsible for:
//! - Admission control (a hard cap on concurrent sessions)
//! - Spawning and tracking session tasks
//! - Graceful shutdown coordination

use crate::session::{Session, SessionShared};
use crate::{ServerConfig, ServerMetrics, SessionId, SessionInfo, SessionObserver};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A reserved session slot, returned to the pool when dropped
#[derive(Debug)]
pub struct AdmissionPermit {
    admitted: Arc<AtomicUsize>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.admitted.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Managed session entry
struct ManagedSession {
    shared: Arc<SessionShared>,
    abort: Option<AbortHandle>,
}

/// Releases everything a session holds, even when its task is aborted
struct SessionGuard {
    id: SessionId,
    sessions: Arc<DashMap<SessionId, ManagedSession>>,
    metrics: Arc<ServerMetrics>,
    drained: Arc<Notify>,
    started: Instant,
    _permit: AdmissionPermit,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.sessions.remove(&self.id);
        self.metrics.session_closed(self.started.elapsed());
        self.drained.notify_waiters();
    }
}

/// Session manager
pub struct SessionManager {
    /// Active sessions (lock-free concurrent map)
    sessions: Arc<DashMap<SessionId, ManagedSession>>,
    /// Next session ID (monotonically increasing)
    next_id: AtomicU64,
    /// Reserved slots, including sessions still starting
    admitted: Arc<AtomicUsize>,
    max_sessions: usize,
    config: Arc<ServerConfig>,
    metrics: Arc<ServerMetrics>,
    cancel: CancellationToken,
    drained: Arc<Notify>,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new(config: Arc<ServerConfig>, metrics: Arc<ServerMetrics>) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            admitted: Arc::new(AtomicUsize::new(0)),
            max_sessions: config.max_sessions,
            config,
            metrics,
            cancel: CancellationToken::new(),
            drained: Arc::new(Notify::new()),
        }
    }

    /// Reserve a session slot, or `None` at capacity
    ///
    /// This is the only admission decision; it never waits.
    pub fn try_admit(&self) -> Option<AdmissionPermit> {
        let mut current = self.admitted.load(Ordering::Acquire);
        loop {
            if current >= self.max_sessions {
                return None;
            }
            match self.admitted.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Some(AdmissionPermit {
                        admitted: self.admitted.clone(),
                    });
                }
                Err(actual) => current = actual,
            }
        }
    }

    fn next_session_id(&self) -> SessionId {
        SessionId::new(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Start a session for an admitted connection
    pub fn start_session(
        &self,
        socket: TcpStream,
        peer_addr: SocketAddr,
        permit: AdmissionPermit,
        observer: Arc<dyn SessionObserver>,
    ) -> SessionId {
        let id = self.next_session_id();
        let shared = Arc::new(SessionShared::new(id, peer_addr));
        self.sessions.insert(
            id,
            ManagedSession {
                shared: shared.clone(),
                abort: None,
            },
        );
        self.metrics.session_opened();

        let guard = SessionGuard {
            id,
            sessions: self.sessions.clone(),
            metrics: self.metrics.clone(),
            drained: self.drained.clone(),
            started: Instant::now(),
            _permit: permit,
        };
        let session = Session::new(
            shared,
            socket,
            self.config.clone(),
            self.metrics.clone(),
            observer.clone(),
            self.cancel.child_token(),
        );
        let handle = tokio::spawn(async move {
            let outcome = session.run().await;
            drop(guard);
            info!(session = %id, %outcome, "session closed");
            observer.on_session_ended(id, &outcome).await;
        });

        if let Some(mut entry) = self.sessions.get_mut(&id) {
            entry.abort = Some(handle.abort_handle());
        }
        id
    }

    /// Get the number of active sessions
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Get the number of reserved slots
    pub fn admitted_count(&self) -> usize {
        self.admitted.load(Ordering::Acquire)
    }

    /// Maximum number of concurrent sessions
    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// Get session info
    pub fn session_info(&self, id: SessionId) -> Option<SessionInfo> {
        self.sessions.get(&id).map(|entry| entry.shared.info())
    }

    /// Get all session IDs
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }

    /// Get all session infos
    pub fn session_infos(&self) -> Vec<SessionInfo> {
        self.sessions
            .iter()
            .map(|entry| entry.value().shared.info())
            .collect()
    }

    /// Token cancelled when the manager shuts down
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait until no session is left, up to `deadline`. Returns `true` when drained.
    async fn wait_drained(&self, deadline: tokio::time::Instant) -> bool {
        loop {
            let notified = self.drained.notified();
            if self.sessions.is_empty() {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.sessions.is_empty();
            }
        }
    }

    /// Shutdown all sessions
    ///
    /// Cancels every session and waits up to `timeout` for them to release their programs,
    /// then aborts whatever is left. Safe to call more than once.
    pub async fn shutdown(&self, timeout: Duration) {
        self.cancel.cancel();
        let count = self.sessions.len();
        if count > 0 {
            info!(sessions = count, "closing sessions");
        }

        let deadline = tokio::time::Instant::now() + timeout;
        if self.wait_drained(deadline).await {
            return;
        }

        warn!(sessions = self.sessions.len(), "aborting sessions that did not close in time");
        for entry in self.sessions.iter() {
            if let Some(handle) = &entry.abort {
                handle.abort();
            }
        }
        let grace = tokio::time::Instant::now() + Duration::from_secs(1);
        if !self.wait_drained(grace).await {
            debug!(remaining = self.sessions.len(), "sessions still draining after abort");
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("session_count", &self.session_count())
            .field("admitted", &self.admitted_count())
            .field("max_sessions", &self.max_sessions)
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish()
    }
}
