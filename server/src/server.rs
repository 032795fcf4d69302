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

//! Bridge server implementation
//!
//! The BridgeServer owns the TCP listener, accepts connections, and hands
//! admitted ones to the SessionManager.

use crate::{
    BridgeError, BridgeResult, ServerConfig, ServerMetrics, ServerSnapshot, SessionId,
    SessionInfo, SessionManager, SessionObserver,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Time allowed for writing the reject message before the socket is dropped
const REJECT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Telnet to process bridge server
///
/// # Example
///
/// ```no_run
/// use tnbridge_server::{BridgeServer, LaunchConfig, NoopObserver, ServerConfig};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ServerConfig::new("0.0.0.0:2323".parse()?, LaunchConfig::new("/bin/login"));
///     let server = BridgeServer::bind(config).await?;
///     server.start(Arc::new(NoopObserver)).await?;
///
///     tokio::signal::ctrl_c().await?;
///     server.shutdown().await?;
///     Ok(())
/// }
/// ```
pub struct BridgeServer {
    /// Server configuration
    config: Arc<ServerConfig>,
    /// Session manager
    manager: Arc<SessionManager>,
    /// Server metrics
    metrics: Arc<ServerMetrics>,
    /// Listener, moved into the accept loop on start
    listener: Mutex<Option<TcpListener>>,
    /// Actual bind address
    bind_address: SocketAddr,
    /// Server start time
    started_at: Instant,
    /// Running flag
    running: AtomicBool,
    /// Stops the accept loop
    accept_cancel: CancellationToken,
    /// Accept loop task handle
    accept_handle: Mutex<Option<JoinHandle<()>>>,
    /// Set once shutdown completed
    shut_down: Mutex<bool>,
}

impl BridgeServer {
    /// Validate the configuration and bind the listener
    ///
    /// Does not accept connections until `start()` is called.
    pub async fn bind(config: ServerConfig) -> BridgeResult<Self> {
        config.validate().map_err(BridgeError::InvalidConfig)?;

        let address = config.bind_address;
        let listener = TcpListener::bind(address)
            .await
            .map_err(|source| BridgeError::Bind { address, source })?;
        let bind_address = listener
            .local_addr()
            .map_err(|source| BridgeError::Bind { address, source })?;

        let config = Arc::new(config);
        let metrics = Arc::new(ServerMetrics::new());
        let manager = Arc::new(SessionManager::new(config.clone(), metrics.clone()));

        info!(address = %bind_address, program = %config.launch.display_name(), "bridge bound");

        Ok(Self {
            config,
            manager,
            metrics,
            listener: Mutex::new(Some(listener)),
            bind_address,
            started_at: Instant::now(),
            running: AtomicBool::new(false),
            accept_cancel: CancellationToken::new(),
            accept_handle: Mutex::new(None),
            shut_down: Mutex::new(false),
        })
    }

    /// Start accepting connections
    pub async fn start(&self, observer: Arc<dyn SessionObserver>) -> BridgeResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(BridgeError::AlreadyRunning);
        }
        let Some(listener) = self.listener.lock().await.take() else {
            self.running.store(false, Ordering::SeqCst);
            return Err(BridgeError::NotRunning);
        };

        info!(address = %self.bind_address, max_sessions = self.config.max_sessions, "accepting connections");
        let handle = tokio::spawn(accept_loop(
            listener,
            self.manager.clone(),
            self.metrics.clone(),
            self.config.clone(),
            observer,
            self.accept_cancel.clone(),
        ));
        *self.accept_handle.lock().await = Some(handle);
        Ok(())
    }

    /// Shutdown the server
    ///
    /// Stops accepting and unbinds the port, then closes every session, force killing
    /// programs that outlive `shutdown_timeout`. Calling it again is a no-op.
    pub async fn shutdown(&self) -> BridgeResult<()> {
        let mut shut_down = self.shut_down.lock().await;
        if *shut_down {
            debug!("shutdown already complete");
            return Ok(());
        }

        info!("shutting down bridge");
        self.running.store(false, Ordering::SeqCst);
        self.accept_cancel.cancel();
        if let Some(handle) = self.accept_handle.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "accept loop ended abnormally");
            }
        }
        // Never started: release the port here.
        drop(self.listener.lock().await.take());

        self.manager.shutdown(self.config.shutdown_timeout).await;
        *shut_down = true;

        info!(
            total_sessions = self.metrics.total_sessions(),
            rejected = self.metrics.rejected_sessions(),
            "bridge shutdown complete"
        );
        Ok(())
    }

    /// Check if the server is accepting connections
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.bind_address
    }

    /// Get the number of active sessions
    pub fn active_sessions(&self) -> usize {
        self.manager.session_count()
    }

    /// Get information about one session
    pub fn session_info(&self, id: SessionId) -> Option<SessionInfo> {
        self.manager.session_info(id)
    }

    /// Get a snapshot of the server state
    pub fn snapshot(&self) -> ServerSnapshot {
        ServerSnapshot {
            active_sessions: self.manager.session_count(),
            total_sessions: self.metrics.total_sessions(),
            rejected_sessions: self.metrics.rejected_sessions(),
            bind_address: self.bind_address,
            uptime: self.started_at.elapsed(),
            started_at: self.started_at,
        }
    }

    /// Get the server metrics
    pub fn metrics(&self) -> Arc<ServerMetrics> {
        self.metrics.clone()
    }

    /// Get the session manager
    pub fn manager(&self) -> Arc<SessionManager> {
        self.manager.clone()
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

impl Drop for BridgeServer {
    fn drop(&mut self) {
        self.accept_cancel.cancel();
        self.manager.cancellation_token().cancel();
    }
}

impl std::fmt::Debug for BridgeServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeServer")
            .field("bind_address", &self.bind_address)
            .field("running", &self.is_running())
            .field("active_sessions", &self.active_sessions())
            .field("uptime", &self.started_at.elapsed())
            .finish()
    }
}

async fn accept_loop(
    listener: TcpListener,
    manager: Arc<SessionManager>,
    metrics: Arc<ServerMetrics>,
    config: Arc<ServerConfig>,
    observer: Arc<dyn SessionObserver>,
    cancel: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            result = listener.accept() => result,
            _ = cancel.cancelled() => break,
        };

        match accepted {
            Ok((socket, peer_addr)) => match manager.try_admit() {
                Some(permit) => {
                    let id = manager.start_session(socket, peer_addr, permit, observer.clone());
                    debug!(session = %id, peer = %peer_addr, "connection admitted");
                }
                None => {
                    let error = BridgeError::AdmissionRejected(manager.max_sessions());
                    warn!(peer = %peer_addr, %error, "rejecting connection");
                    metrics.session_rejected();
                    tokio::spawn(reject(
                        socket,
                        peer_addr,
                        config.reject_message.clone(),
                        observer.clone(),
                    ));
                }
            },
            Err(e) => {
                error!(error = %e, "failed to accept connection");
                metrics.connection_error();
                // Back off on errors to avoid a tight loop
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
    info!("accept loop terminated");
}

async fn reject(
    mut socket: TcpStream,
    peer_addr: SocketAddr,
    message: Option<String>,
    observer: Arc<dyn SessionObserver>,
) {
    if let Some(message) = message {
        let write = async {
            socket.write_all(message.as_bytes()).await?;
            socket.shutdown().await
        };
        match tokio::time::timeout(REJECT_WRITE_TIMEOUT, write).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(peer = %peer_addr, error = %e, "reject message not delivered"),
            Err(_) => debug!(peer = %peer_addr, "reject message timed out"),
        }
    }
    drop(socket);
    observer.on_rejected(peer_addr).await;
}
