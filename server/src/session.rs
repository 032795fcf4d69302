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

//! Session implementation
//!
//! A session binds one client connection to one program instance:
//!
//! ```text
//!            ClientReader ──(data, resize)──▶ ProcessInstance input
//! client ◀── ClientWriter ◀──(output, telnet replies)── ProcessInstance output
//! ```
//!
//! Each direction runs in its own task. The session task supervises both together with the
//! program's exit, the idle timer and the server's cancellation token, and is the only place
//! resources are released.

use crate::connection::{ClientReader, ClientWriter, TelnetConnection};
use crate::launcher::{self, ProcessInstance, Resizer};
use crate::{
    BridgeError, BridgeResult, ServerConfig, ServerMetrics, SessionId, SessionInfo,
    SessionObserver, SessionOutcome, SessionState,
};
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tnbridge_telnetcodec::WindowSize;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Lock-free state of a session, shared with the session manager
#[derive(Debug)]
pub struct SessionShared {
    id: SessionId,
    peer_addr: SocketAddr,
    created_at: Instant,
    state: AtomicU8,
    /// Milliseconds after `created_at` of the last byte moved
    last_activity_ms: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    /// Zero until the program is running
    pid: AtomicU32,
    /// Columns in the high half, rows in the low half
    window: AtomicU32,
}

impl SessionShared {
    /// Create the shared state of a freshly admitted session
    pub fn new(id: SessionId, peer_addr: SocketAddr) -> Self {
        Self {
            id,
            peer_addr,
            created_at: Instant::now(),
            state: AtomicU8::new(SessionState::Starting.as_u8()),
            last_activity_ms: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            pid: AtomicU32::new(0),
            window: AtomicU32::new(pack(WindowSize::default())),
        }
    }

    /// Get the session ID
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Get the current state
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: SessionState) {
        let previous = SessionState::from_u8(self.state.swap(state.as_u8(), Ordering::AcqRel));
        if previous != state {
            debug!(session = %self.id, from = %previous, to = %state, "session state changed");
        }
    }

    fn touch(&self) {
        let elapsed = self.created_at.elapsed().as_millis() as u64;
        self.last_activity_ms.fetch_max(elapsed, Ordering::Relaxed);
    }

    fn last_activity(&self) -> Instant {
        self.created_at + Duration::from_millis(self.last_activity_ms.load(Ordering::Relaxed))
    }

    fn set_window(&self, size: WindowSize) {
        self.window.store(pack(size), Ordering::Relaxed);
    }

    /// Get a snapshot of the session
    pub fn info(&self) -> SessionInfo {
        let window = self.window.load(Ordering::Relaxed);
        let pid = self.pid.load(Ordering::Relaxed);
        SessionInfo {
            id: self.id,
            state: self.state(),
            peer_addr: self.peer_addr,
            created_at: self.created_at,
            last_activity: self.last_activity(),
            window_size: WindowSize::new((window >> 16) as u16, (window & 0xFFFF) as u16),
            pid: (pid != 0).then_some(pid),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
        }
    }
}

fn pack(size: WindowSize) -> u32 {
    (u32::from(size.cols) << 16) | u32::from(size.rows)
}

/// Why the supervisor stopped waiting
enum Ending {
    ClientClosed,
    ClientFailed(String),
    ProcessExited(crate::ExitStatus),
    Idle,
    Shutdown,
}

/// One client bridged to one program
pub struct Session {
    shared: Arc<SessionShared>,
    socket: TcpStream,
    config: Arc<ServerConfig>,
    metrics: Arc<ServerMetrics>,
    observer: Arc<dyn SessionObserver>,
    cancel: CancellationToken,
}

impl Session {
    /// Create a session for an accepted socket
    pub fn new(
        shared: Arc<SessionShared>,
        socket: TcpStream,
        config: Arc<ServerConfig>,
        metrics: Arc<ServerMetrics>,
        observer: Arc<dyn SessionObserver>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            shared,
            socket,
            config,
            metrics,
            observer,
            cancel,
        }
    }

    /// Run the session to completion
    ///
    /// Every path out of this function has released the socket and the program.
    #[instrument(skip(self), fields(session = %self.shared.id, peer = %self.shared.peer_addr))]
    pub async fn run(self) -> SessionOutcome {
        let Session {
            shared,
            socket,
            config,
            metrics,
            observer,
            cancel,
        } = self;

        let mut connection = match TelnetConnection::wrap(socket, shared.id) {
            Ok(connection) => connection,
            Err(error) => {
                metrics.connection_error();
                shared.set_state(SessionState::Closed);
                return SessionOutcome::ConnectionFailed(error.to_string());
            }
        };

        let handshake = tokio::select! {
            result = connection.negotiate(config.negotiation_timeout, config.query_window_size) => result,
            _ = cancel.cancelled() => {
                shared.set_state(SessionState::Closed);
                return SessionOutcome::Shutdown;
            }
        };
        let handshake = match handshake {
            Ok(handshake) => handshake,
            Err(error) => {
                shared.set_state(SessionState::Closed);
                return client_error_outcome(&metrics, error);
            }
        };

        if handshake.client_closed {
            debug!(early = handshake.early_input.len(), "client closed during negotiation");
        }
        let size = handshake.window_size.unwrap_or(config.default_window_size);
        shared.set_window(size);
        let mut process = match launcher::spawn(&config.launch, size) {
            Ok(process) => process,
            Err(error) => {
                warn!(%error, "program failed to start");
                metrics.spawn_failure();
                shared.set_state(SessionState::Draining);
                let reason = spawn_reason(&error);
                let line = format!("tnbridge: {error}\r\n");
                match timeout(config.grace_period, connection.write_line(&line)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(error)) => debug!(%error, "diagnostic not delivered"),
                    Err(_) => debug!("diagnostic timed out"),
                }
                connection.close().await;
                shared.set_state(SessionState::Closed);
                return SessionOutcome::SpawnFailed(reason);
            }
        };

        if let Some(pid) = process.pid() {
            shared.pid.store(pid, Ordering::Relaxed);
        }
        info!(pid = ?process.pid(), %size, program = %config.launch.display_name(), "session active");
        shared.set_state(SessionState::Active);
        shared.touch();
        observer
            .on_session_started(shared.id, shared.peer_addr, process.pid())
            .await;

        let (reader, writer) = connection.into_split();
        let (replies_tx, replies_rx) = mpsc::channel(16);
        let mut input_task = tokio::spawn(client_to_process(
            reader,
            process.input(),
            handshake.early_input.freeze(),
            process.resizer(),
            replies_tx,
            shared.clone(),
            metrics.clone(),
        ));
        let mut output_task = process.take_output().map(|output| {
            tokio::spawn(process_to_client(
                writer,
                output,
                replies_rx,
                shared.clone(),
                metrics.clone(),
            ))
        });

        let mut drained = None;
        let ending = supervise(
            &mut process,
            &mut input_task,
            &mut output_task,
            &mut drained,
            &shared,
            &config,
            &cancel,
        )
        .await;
        shared.set_state(SessionState::Draining);

        let outcome = match ending {
            Ending::ClientClosed => {
                // Half-close: the program sees end of input and gets a grace period.
                process.close_input();
                if timeout(config.grace_period, process.wait()).await.is_err() {
                    debug!("program ignored end of input, killing it");
                    process.kill();
                }
                let writer = drain_output(&mut output_task, drained.take(), config.grace_period).await;
                if let Some(mut writer) = writer {
                    writer.close().await;
                }
                SessionOutcome::ClientClosed
            }
            Ending::ClientFailed(reason) => {
                metrics.connection_error();
                process.kill();
                SessionOutcome::ConnectionFailed(reason)
            }
            Ending::ProcessExited(status) => {
                let writer = drain_output(&mut output_task, drained.take(), config.grace_period).await;
                if let Some(mut writer) = writer {
                    if let Some(farewell) = &config.farewell {
                        let _ = timeout(config.grace_period, writer.write_output(farewell.as_bytes()))
                            .await;
                    }
                    writer.close().await;
                }
                if status.success() {
                    info!(%status, "program exited");
                } else {
                    metrics.process_crash();
                    warn!(%status, "program exited unsuccessfully");
                }
                SessionOutcome::ProcessExited(status)
            }
            Ending::Idle => {
                metrics.idle_timeout();
                info!(idle_timeout = ?config.idle_timeout, "session idle, closing");
                process.kill();
                SessionOutcome::IdleTimeout
            }
            Ending::Shutdown => {
                process.kill();
                SessionOutcome::Shutdown
            }
        };

        input_task.abort();
        if let Some(task) = output_task {
            task.abort();
        }
        if process.try_status().is_none() {
            process.kill();
            let _ = timeout(config.grace_period, process.wait()).await;
        }
        drop(process);
        shared.set_state(SessionState::Closed);
        outcome
    }
}

type OutputTask = JoinHandle<(ClientWriter, BridgeResult<()>)>;

/// Waits for the first reason to end the session
async fn supervise(
    process: &mut ProcessInstance,
    input_task: &mut JoinHandle<BridgeResult<()>>,
    output_task: &mut Option<OutputTask>,
    drained: &mut Option<ClientWriter>,
    shared: &SessionShared,
    config: &ServerConfig,
    cancel: &CancellationToken,
) -> Ending {
    let period = (config.idle_timeout / 4).clamp(Duration::from_millis(10), Duration::from_secs(1));
    let mut idle_check = interval(period);
    idle_check.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            status = process.wait() => return Ending::ProcessExited(status),
            joined = &mut *input_task => {
                return match joined {
                    Ok(Ok(())) => Ending::ClientClosed,
                    Ok(Err(error)) => client_ending(error),
                    Err(error) => Ending::ClientFailed(error.to_string()),
                };
            }
            joined = join_output(output_task), if output_task.is_some() => {
                *output_task = None;
                match joined {
                    // Output closed while the program still runs; keep the writer for later.
                    Ok((writer, Ok(()))) => *drained = Some(writer),
                    Ok((_, Err(error))) => return client_ending(error),
                    Err(error) => return Ending::ClientFailed(error.to_string()),
                }
            }
            _ = idle_check.tick() => {
                if shared.last_activity().elapsed() >= config.idle_timeout {
                    return Ending::Idle;
                }
            }
            _ = cancel.cancelled() => return Ending::Shutdown,
        }
    }
}

/// Lets the output pump forward what the program left behind, then hands back the writer
async fn drain_output(
    output_task: &mut Option<OutputTask>,
    drained: Option<ClientWriter>,
    grace: Duration,
) -> Option<ClientWriter> {
    let Some(mut task) = output_task.take() else {
        return drained;
    };
    let writer = match timeout(grace, &mut task).await {
        Ok(Ok((writer, Ok(())))) => Some(writer),
        Ok(Ok((_, Err(error)))) => {
            debug!(%error, "client went away during drain");
            None
        }
        Ok(Err(error)) => {
            warn!(%error, "output pump failed");
            None
        }
        Err(_) => {
            debug!("program output still open after exit");
            None
        }
    };
    task.abort();
    writer
}

async fn join_output(
    task: &mut Option<OutputTask>,
) -> Result<(ClientWriter, BridgeResult<()>), tokio::task::JoinError> {
    match task {
        Some(task) => task.await,
        None => std::future::pending().await,
    }
}

fn client_ending(error: BridgeError) -> Ending {
    match &error {
        BridgeError::Connection(io) if is_disconnect(io) => Ending::ClientClosed,
        _ => Ending::ClientFailed(error.to_string()),
    }
}

fn is_disconnect(error: &std::io::Error) -> bool {
    matches!(
        error.kind(),
        std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe
    )
}

fn client_error_outcome(metrics: &ServerMetrics, error: BridgeError) -> SessionOutcome {
    match &error {
        BridgeError::Connection(io) if is_disconnect(io) => SessionOutcome::ClientClosed,
        _ => {
            metrics.connection_error();
            SessionOutcome::ConnectionFailed(error.to_string())
        }
    }
}

fn spawn_reason(error: &BridgeError) -> String {
    match error {
        BridgeError::Spawn { reason, .. } => reason.clone(),
        other => other.to_string(),
    }
}

/// Client to program: forwards application bytes and window size changes
async fn client_to_process(
    mut reader: ClientReader,
    input: Option<mpsc::Sender<Bytes>>,
    early_input: Bytes,
    resizer: Resizer,
    replies: mpsc::Sender<Bytes>,
    shared: Arc<SessionShared>,
    metrics: Arc<ServerMetrics>,
) -> BridgeResult<()> {
    let Some(input) = input else {
        return Ok(());
    };
    if !early_input.is_empty() {
        metrics.bytes_received(early_input.len() as u64);
        shared
            .bytes_received
            .fetch_add(early_input.len() as u64, Ordering::Relaxed);
        if input.send(early_input).await.is_err() {
            return Ok(());
        }
    }

    while let Some(chunk) = reader.read().await? {
        shared.touch();
        metrics.protocol_errors(reader.take_protocol_errors());
        if let Some(size) = chunk.window_size {
            debug!(session = %shared.id, %size, "client resized window");
            shared.set_window(size);
            resizer.resize(size);
        }
        if !chunk.replies.is_empty() && replies.send(chunk.replies.freeze()).await.is_err() {
            debug!(session = %shared.id, "client writer gone, reply dropped");
        }
        if !chunk.data.is_empty() {
            let len = chunk.data.len() as u64;
            if input.send(chunk.data.freeze()).await.is_err() {
                // The program closed its input; keep reading so resizes and replies still work.
                debug!(session = %shared.id, "program input closed");
                continue;
            }
            metrics.bytes_received(len);
            shared.bytes_received.fetch_add(len, Ordering::Relaxed);
        }
    }
    Ok(())
}

/// Program to client: escapes output and interleaves telnet replies
async fn process_to_client(
    mut writer: ClientWriter,
    mut output: mpsc::Receiver<Bytes>,
    mut replies: mpsc::Receiver<Bytes>,
    shared: Arc<SessionShared>,
    metrics: Arc<ServerMetrics>,
) -> (ClientWriter, BridgeResult<()>) {
    let result = async {
        loop {
            tokio::select! {
                biased;
                Some(reply) = replies.recv() => {
                    writer.write_raw(&reply).await?;
                }
                chunk = output.recv() => {
                    let Some(chunk) = chunk else { break };
                    let written = writer.write_output(&chunk).await? as u64;
                    shared.touch();
                    metrics.bytes_sent(written);
                    shared.bytes_sent.fetch_add(written, Ordering::Relaxed);
                }
            }
        }
        Ok(())
    }
    .await;
    (writer, result)
}
