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

//! Process launcher
//!
//! Starts the bridged program either on a pseudo-terminal (`portable-pty`) or on plain pipes
//! (`tokio::process`) and exposes both behind the same channel based [`ProcessInstance`].
//!
//! Pty I/O is blocking, so each pty gets a reader thread, a writer thread and a wait thread.
//! They talk to the async side through tokio channels and never block the runtime.

use crate::{BridgeError, BridgeResult, ExitStatus, LaunchConfig, LaunchMode};
use bytes::Bytes;
use portable_pty::{Child, ChildKiller, CommandBuilder, MasterPty, PtySize, native_pty_system};
use std::io::{Read, Write};
use std::process::Stdio;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tnbridge_telnetcodec::{WindowSize, consts};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, trace, warn};

/// Chunks buffered in each direction before the producer waits
const CHANNEL_CAPACITY: usize = 64;

/// Size of a single read from the program
const READ_CHUNK: usize = 8192;

/// How often a pty wait thread checks for exit or a kill request
const WAIT_POLL: Duration = Duration::from_millis(20);

/// Environment variable carrying `<cols>x<rows>` to the program
pub const TERM_SIZE_ENV: &str = "TN_TERM_SIZE";

/// Cloneable handle that publishes terminal size changes to a program
#[derive(Debug, Clone)]
pub struct Resizer(Arc<watch::Sender<WindowSize>>);

impl Resizer {
    /// Publish a new terminal size and return immediately
    ///
    /// In pty mode a resize worker applies it and the kernel raises `SIGWINCH` in the
    /// program. In pipe mode the size is only recorded.
    pub fn resize(&self, size: WindowSize) {
        self.0.send_if_modified(|current| {
            if *current == size {
                false
            } else {
                *current = size;
                true
            }
        });
    }

    /// Terminal size last published
    pub fn size(&self) -> WindowSize {
        *self.0.borrow()
    }
}

/// A running instance of the bridged program
///
/// Output arrives on [`ProcessInstance::take_output`] in the order the program wrote it and
/// ends when the program closes its output. Dropping a running instance kills the program.
pub struct ProcessInstance {
    pid: Option<u32>,
    mode: LaunchMode,
    input: Option<mpsc::Sender<Bytes>>,
    output: Option<mpsc::Receiver<Bytes>>,
    size: Resizer,
    exit: Option<oneshot::Receiver<ExitStatus>>,
    status: Option<ExitStatus>,
    kill: Option<oneshot::Sender<()>>,
}

impl ProcessInstance {
    /// Operating system process id, when known
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// How the program's streams are attached
    pub fn mode(&self) -> LaunchMode {
        self.mode
    }

    /// Terminal size last applied to the program
    pub fn size(&self) -> WindowSize {
        self.size.size()
    }

    /// Handle for resizing from another task
    pub fn resizer(&self) -> Resizer {
        self.size.clone()
    }

    /// Sender for bytes destined to the program's input, `None` once input is closed
    pub fn input(&self) -> Option<mpsc::Sender<Bytes>> {
        self.input.clone()
    }

    /// Take the program's output stream. Only the first call returns it.
    pub fn take_output(&mut self) -> Option<mpsc::Receiver<Bytes>> {
        self.output.take()
    }

    /// Publish a new terminal size, see [`Resizer::resize`]
    pub fn resize(&self, size: WindowSize) {
        self.size.resize(size);
    }

    /// Close the program's input
    ///
    /// A pty first receives EOT so a program reading in canonical mode sees end of input.
    /// Input is really closed once every sender returned by [`ProcessInstance::input`] has
    /// also been dropped.
    pub fn close_input(&mut self) {
        if let Some(input) = self.input.take() {
            if self.mode == LaunchMode::Pty {
                let _ = input.try_send(Bytes::from_static(&[consts::EOT]));
            }
        }
    }

    /// Exit status if the program already ended
    pub fn try_status(&mut self) -> Option<ExitStatus> {
        if self.status.is_none() {
            if let Some(exit) = self.exit.as_mut() {
                match exit.try_recv() {
                    Ok(status) => self.status = Some(status),
                    Err(oneshot::error::TryRecvError::Empty) => {}
                    Err(oneshot::error::TryRecvError::Closed) => {
                        self.status = Some(ExitStatus::killed());
                    }
                }
            }
        }
        self.status
    }

    /// Wait for the program to end
    ///
    /// Cancel safe: the status is kept once observed, so calling again returns it at once.
    pub async fn wait(&mut self) -> ExitStatus {
        if let Some(status) = self.status {
            return status;
        }
        let status = match self.exit.as_mut() {
            Some(exit) => exit.await.unwrap_or_else(|_| ExitStatus::killed()),
            None => ExitStatus::killed(),
        };
        self.exit = None;
        self.status = Some(status);
        status
    }

    /// Terminate the program
    ///
    /// A pty program gets `SIGHUP` and shortly after `SIGKILL` if it is still running, a pipe
    /// program gets `SIGKILL`.
    pub fn kill(&mut self) {
        if self.try_status().is_none() {
            if let Some(kill) = self.kill.take() {
                debug!(pid = ?self.pid, "killing process");
                let _ = kill.send(());
            }
        }
    }
}

impl std::fmt::Debug for ProcessInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessInstance")
            .field("pid", &self.pid)
            .field("mode", &self.mode)
            .field("size", &self.size())
            .field("status", &self.status)
            .finish()
    }
}

impl Drop for ProcessInstance {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Start the configured program with the given initial terminal size
///
/// Must be called within a tokio runtime.
pub fn spawn(config: &LaunchConfig, size: WindowSize) -> BridgeResult<ProcessInstance> {
    match config.mode {
        LaunchMode::Pty => spawn_pty(config, size),
        LaunchMode::Pipe => spawn_pipe(config, size),
    }
}

fn program_env(config: &LaunchConfig, size: WindowSize) -> Vec<(String, String)> {
    let mut env = vec![
        ("TERM".to_string(), config.terminal_type.clone()),
        ("COLUMNS".to_string(), size.cols.to_string()),
        ("LINES".to_string(), size.rows.to_string()),
        (TERM_SIZE_ENV.to_string(), size.to_string()),
    ];
    env.extend(config.env.iter().cloned());
    env
}

fn pty_size(size: WindowSize) -> PtySize {
    PtySize {
        rows: size.rows,
        cols: size.cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

fn spawn_pty(config: &LaunchConfig, size: WindowSize) -> BridgeResult<ProcessInstance> {
    let program = config.display_name();
    let failed = |error: &dyn std::fmt::Display| BridgeError::spawn(program.clone(), error);

    let pair = native_pty_system()
        .openpty(pty_size(size))
        .map_err(|e| failed(&e))?;

    let mut cmd = CommandBuilder::new(&config.program);
    cmd.args(&config.args);
    for (key, value) in program_env(config, size) {
        cmd.env(key, value);
    }
    if let Some(cwd) = &config.cwd {
        cmd.cwd(cwd);
    }

    let mut child = pair.slave.spawn_command(cmd).map_err(|e| failed(&e))?;
    // The child owns the slave now; keeping ours open would hide its exit from the reader.
    drop(pair.slave);

    let pid = child.process_id();
    let reader = pair.master.try_clone_reader().map_err(|e| failed(&e))?;
    let writer = pair.master.take_writer().map_err(|e| failed(&e))?;

    let (output_tx, output_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (input_tx, input_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (exit_tx, exit_rx) = oneshot::channel();
    let (kill_tx, kill_rx) = oneshot::channel();
    let (size_tx, size_rx) = watch::channel(size);

    spawn_thread("tnbridge-pty-reader", move || pty_reader(reader, output_tx))
        .map_err(|e| failed(&e))?;
    spawn_thread("tnbridge-pty-writer", move || pty_writer(writer, input_rx))
        .map_err(|e| failed(&e))?;
    spawn_thread("tnbridge-pty-wait", move || {
        let _ = exit_tx.send(pty_waiter(child, kill_rx));
    })
    .map_err(|e| failed(&e))?;
    tokio::spawn(pty_resizer(pair.master, size_rx));

    debug!(?pid, %program, %size, "spawned program on pty");
    Ok(ProcessInstance {
        pid,
        mode: LaunchMode::Pty,
        input: Some(input_tx),
        output: Some(output_rx),
        size: Resizer(Arc::new(size_tx)),
        exit: Some(exit_rx),
        status: None,
        kill: Some(kill_tx),
    })
}

fn spawn_thread<F>(name: &str, body: F) -> std::io::Result<()>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .map(|_| ())
}

fn pty_status(waited: std::io::Result<portable_pty::ExitStatus>) -> ExitStatus {
    match waited {
        Ok(status) => ExitStatus {
            code: i32::try_from(status.exit_code()).ok(),
            success: status.success(),
        },
        Err(error) => {
            warn!(%error, "waiting for pty child failed");
            ExitStatus::killed()
        }
    }
}

/// Waits for a pty child, killing it when asked or when the instance went away
fn pty_waiter(
    mut child: Box<dyn Child + Send + Sync>,
    mut kill: oneshot::Receiver<()>,
) -> ExitStatus {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return pty_status(Ok(status)),
            Ok(None) => {}
            Err(error) => return pty_status(Err(error)),
        }
        match kill.try_recv() {
            Err(oneshot::error::TryRecvError::Empty) => thread::sleep(WAIT_POLL),
            Ok(()) | Err(oneshot::error::TryRecvError::Closed) => {
                if let Err(error) = child.kill() {
                    debug!(%error, "pty kill failed, process already gone");
                }
                return pty_status(child.wait());
            }
        }
    }
}

fn pty_reader(mut reader: Box<dyn Read + Send>, output: mpsc::Sender<Bytes>) {
    let mut buffer = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => {
                if output
                    .blocking_send(Bytes::copy_from_slice(&buffer[..n]))
                    .is_err()
                {
                    break;
                }
            }
            Err(error) if error.kind() == std::io::ErrorKind::Interrupted => {}
            // Linux reports EIO once the last slave handle closes.
            Err(error) => {
                trace!(%error, "pty reader finished");
                break;
            }
        }
    }
}

fn pty_writer(mut writer: Box<dyn Write + Send>, mut input: mpsc::Receiver<Bytes>) {
    while let Some(chunk) = input.blocking_recv() {
        if let Err(error) = writer.write_all(&chunk).and_then(|()| writer.flush()) {
            debug!(%error, "pty writer finished");
            break;
        }
    }
}

async fn pty_resizer(master: Box<dyn MasterPty + Send>, mut size: watch::Receiver<WindowSize>) {
    while size.changed().await.is_ok() {
        let next = *size.borrow_and_update();
        match master.resize(pty_size(next)) {
            Ok(()) => trace!(size = %next, "pty resized"),
            Err(error) => warn!(%error, size = %next, "pty resize failed"),
        }
    }
}

fn spawn_pipe(config: &LaunchConfig, size: WindowSize) -> BridgeResult<ProcessInstance> {
    let program = config.display_name();

    let mut cmd = Command::new(&config.program);
    cmd.args(&config.args)
        .envs(program_env(config, size))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = &config.cwd {
        cmd.current_dir(cwd);
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| BridgeError::spawn(program.clone(), e))?;
    let pid = child.id();

    let (output_tx, output_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (input_tx, mut input_rx) = mpsc::channel::<Bytes>(CHANNEL_CAPACITY);
    let (exit_tx, exit_rx) = oneshot::channel();
    let (kill_tx, kill_rx) = oneshot::channel();
    let (size_tx, _) = watch::channel(size);

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(pipe_reader(stdout, output_tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(pipe_reader(stderr, output_tx));
    }
    if let Some(mut stdin) = child.stdin.take() {
        tokio::spawn(async move {
            while let Some(chunk) = input_rx.recv().await {
                if let Err(error) = stdin.write_all(&chunk).await {
                    debug!(%error, "pipe writer finished");
                    break;
                }
            }
        });
    }
    tokio::spawn(async move {
        let waited = tokio::select! {
            status = child.wait() => status,
            _ = kill_rx => {
                if let Err(error) = child.start_kill() {
                    debug!(%error, "pipe kill failed, process already gone");
                }
                child.wait().await
            }
        };
        let status = match waited {
            Ok(status) => ExitStatus {
                code: status.code(),
                success: status.success(),
            },
            Err(error) => {
                warn!(%error, "waiting for child failed");
                ExitStatus::killed()
            }
        };
        let _ = exit_tx.send(status);
    });

    debug!(?pid, %program, "spawned program on pipes");
    Ok(ProcessInstance {
        pid,
        mode: LaunchMode::Pipe,
        input: Some(input_tx),
        output: Some(output_rx),
        size: Resizer(Arc::new(size_tx)),
        exit: Some(exit_rx),
        status: None,
        kill: Some(kill_tx),
    })
}

async fn pipe_reader<R>(mut source: R, output: mpsc::Sender<Bytes>)
where
    R: AsyncRead + Unpin,
{
    let mut buffer = vec![0u8; READ_CHUNK];
    loop {
        match source.read(&mut buffer).await {
            Ok(0) => break,
            Ok(n) => {
                if output
                    .send(Bytes::copy_from_slice(&buffer[..n]))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Err(error) => {
                debug!(%error, "pipe reader finished");
                break;
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn read_until(
        output: &mut mpsc::Receiver<Bytes>,
        needle: &str,
    ) -> String {
        let mut collected = Vec::new();
        let _ = timeout(Duration::from_secs(5), async {
            while let Some(chunk) = output.recv().await {
                collected.extend_from_slice(&chunk);
                if String::from_utf8_lossy(&collected).contains(needle) {
                    break;
                }
            }
        })
        .await;
        String::from_utf8_lossy(&collected).into_owned()
    }

    fn pipe(program: &str) -> LaunchConfig {
        LaunchConfig::new(program).with_mode(LaunchMode::Pipe)
    }

    #[tokio::test]
    async fn pipe_echo_and_exit() {
        let mut process = spawn(&pipe("cat"), WindowSize::default()).unwrap();
        let mut output = process.take_output().unwrap();
        assert!(process.take_output().is_none());

        process
            .input()
            .unwrap()
            .send(Bytes::from_static(b"hello\n"))
            .await
            .unwrap();
        assert_eq!(read_until(&mut output, "hello\n").await, "hello\n");

        process.close_input();
        let status = timeout(Duration::from_secs(5), process.wait()).await.unwrap();
        assert!(status.success());
        assert_eq!(process.try_status(), Some(status));
    }

    #[tokio::test]
    async fn pipe_environment_carries_size() {
        let config = LaunchConfig::new("sh")
            .with_args(["-c", "echo \"$TERM $COLUMNS $LINES $TN_TERM_SIZE $EXTRA\""])
            .with_env("EXTRA", "x")
            .with_mode(LaunchMode::Pipe)
            .with_terminal_type("vt220");
        let mut process = spawn(&config, WindowSize::new(132, 43)).unwrap();
        let mut output = process.take_output().unwrap();
        let text = read_until(&mut output, "\n").await;
        assert_eq!(text.trim_end(), "vt220 132 43 132x43 x");
    }

    #[tokio::test]
    async fn crash_is_reported_in_status() {
        let config = LaunchConfig::new("sh")
            .with_args(["-c", "exit 3"])
            .with_mode(LaunchMode::Pipe);
        let mut process = spawn(&config, WindowSize::default()).unwrap();
        let status = timeout(Duration::from_secs(5), process.wait()).await.unwrap();
        assert_eq!(status, ExitStatus::from_code(3));
    }

    #[tokio::test]
    async fn kill_ends_running_program() {
        let mut process = spawn(&pipe("cat"), WindowSize::default()).unwrap();
        assert!(process.pid().is_some());
        assert!(process.try_status().is_none());
        process.kill();
        let status = timeout(Duration::from_secs(5), process.wait()).await.unwrap();
        assert!(!status.success());
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        for mode in [LaunchMode::Pipe, LaunchMode::Pty] {
            let config = LaunchConfig::new("/nonexistent/tnbridge-game").with_mode(mode);
            match spawn(&config, WindowSize::default()) {
                Err(BridgeError::Spawn { program, .. }) => {
                    assert_eq!(program, "/nonexistent/tnbridge-game");
                }
                other => panic!("expected spawn error, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn pty_starts_with_initial_size() {
        let config = LaunchConfig::new("stty").with_args(["size"]);
        let mut process = spawn(&config, WindowSize::new(100, 40)).unwrap();
        let mut output = process.take_output().unwrap();
        assert!(read_until(&mut output, "40 100").await.contains("40 100"));
        let status = timeout(Duration::from_secs(5), process.wait()).await.unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    async fn pty_resize_reaches_program() {
        let config = LaunchConfig::new("sh").with_args(["-c", "read line; stty size"]);
        let mut process = spawn(&config, WindowSize::new(80, 24)).unwrap();
        let mut output = process.take_output().unwrap();

        process.resize(WindowSize::new(132, 50));
        assert_eq!(process.size(), WindowSize::new(132, 50));
        tokio::time::sleep(Duration::from_millis(100)).await;

        process
            .input()
            .unwrap()
            .send(Bytes::from_static(b"go\n"))
            .await
            .unwrap();
        assert!(read_until(&mut output, "50 132").await.contains("50 132"));
    }

    #[tokio::test]
    async fn pty_close_input_sends_eot() {
        let mut process = spawn(&LaunchConfig::new("cat"), WindowSize::default()).unwrap();
        process.close_input();
        let status = timeout(Duration::from_secs(5), process.wait()).await.unwrap();
        assert!(status.success());
    }
}
