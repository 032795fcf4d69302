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

//! Shared helpers for the bridge integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tnbridge_server::{BridgeServer, LaunchConfig, LaunchMode, NoopObserver, ServerConfig};
use tnbridge_telnetcodec::consts::{self, option};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;

/// Config for a loopback bridge that starts sessions quickly
pub fn config(program: &str, args: &[&str], mode: LaunchMode) -> ServerConfig {
    ServerConfig::new(
        "127.0.0.1:0".parse().unwrap(),
        LaunchConfig::new(program)
            .with_args(args.iter().copied())
            .with_mode(mode),
    )
    .with_negotiation_timeout(Duration::from_millis(200))
    .with_window_size_query(false)
    .with_grace_period(Duration::from_millis(500))
    .with_shutdown_timeout(Duration::from_secs(2))
}

/// Bind and start a bridge
pub async fn start_server(config: ServerConfig) -> BridgeServer {
    let server = BridgeServer::bind(config).await.unwrap();
    server.start(Arc::new(NoopObserver)).await.unwrap();
    server
}

/// Poll until the server has exactly `expected` active sessions
pub async fn wait_for_sessions(server: &BridgeServer, expected: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while server.active_sessions() != expected {
        assert!(
            Instant::now() < deadline,
            "expected {expected} sessions, still have {}",
            server.active_sessions()
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Minimal telnet client that records both the raw wire and the decoded data
pub struct TestClient {
    stream: TcpStream,
    /// Everything the server sent
    pub raw: Vec<u8>,
    /// Server bytes with telnet commands removed and IAC IAC collapsed
    pub data: Vec<u8>,
    pending: Vec<u8>,
    eof: bool,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        Self {
            stream: TcpStream::connect(addr).await.unwrap(),
            raw: Vec::new(),
            data: Vec::new(),
            pending: Vec::new(),
            eof: false,
        }
    }

    pub async fn send(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    /// Accept binary transmission and suppress go ahead in both directions
    pub async fn agree_binary_and_sga(&mut self) {
        self.send(&[
            consts::IAC,
            consts::DO,
            option::BINARY,
            consts::IAC,
            consts::WILL,
            option::BINARY,
            consts::IAC,
            consts::DO,
            option::SGA,
            consts::IAC,
            consts::WILL,
            option::SGA,
        ])
        .await;
    }

    /// Offer NAWS and report `cols` x `rows`
    pub async fn send_naws(&mut self, cols: u16, rows: u16) {
        self.send(&[consts::IAC, consts::WILL, option::NAWS]).await;
        self.send_naws_update(cols, rows).await;
    }

    /// Report a new size on an already agreed NAWS option
    pub async fn send_naws_update(&mut self, cols: u16, rows: u16) {
        let mut bytes = vec![consts::IAC, consts::SB, option::NAWS];
        bytes.extend_from_slice(&cols.to_be_bytes());
        bytes.extend_from_slice(&rows.to_be_bytes());
        bytes.extend_from_slice(&[consts::IAC, consts::SE]);
        self.send(&bytes).await;
    }

    pub async fn shutdown(&mut self) {
        self.stream.shutdown().await.unwrap();
    }

    /// Read one chunk. Returns `false` on EOF or timeout.
    async fn read_some(&mut self, deadline: Instant) -> bool {
        if self.eof {
            return false;
        }
        let mut buf = [0u8; 4096];
        match tokio::time::timeout_at(deadline, self.stream.read(&mut buf)).await {
            Ok(Ok(0)) | Ok(Err(_)) => {
                self.eof = true;
                false
            }
            Ok(Ok(n)) => {
                self.raw.extend_from_slice(&buf[..n]);
                self.pending.extend_from_slice(&buf[..n]);
                self.strip_commands();
                true
            }
            Err(_) => false,
        }
    }

    /// Read until the decoded data contains `needle`
    pub async fn read_until(&mut self, needle: &[u8], limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        loop {
            if contains(&self.data, needle) {
                return true;
            }
            if !self.read_some(deadline).await {
                return contains(&self.data, needle);
            }
        }
    }

    /// Read until the server closes the connection. Returns `false` on timeout.
    pub async fn read_to_eof(&mut self, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        while self.read_some(deadline).await {}
        self.eof
    }

    /// Read just the first byte the server sends
    pub async fn first_byte(&mut self, limit: Duration) -> Option<u8> {
        let deadline = Instant::now() + limit;
        while self.raw.is_empty() {
            if !self.read_some(deadline).await {
                break;
            }
        }
        self.raw.first().copied()
    }

    fn strip_commands(&mut self) {
        let mut i = 0;
        let bytes = &self.pending;
        while i < bytes.len() {
            if bytes[i] != consts::IAC {
                self.data.push(bytes[i]);
                i += 1;
                continue;
            }
            let Some(&command) = bytes.get(i + 1) else { break };
            match command {
                consts::IAC => {
                    self.data.push(consts::IAC);
                    i += 2;
                }
                consts::WILL | consts::WONT | consts::DO | consts::DONT => {
                    if i + 2 >= bytes.len() {
                        break;
                    }
                    i += 3;
                }
                consts::SB => {
                    let end = bytes[i..]
                        .windows(2)
                        .position(|pair| pair == [consts::IAC, consts::SE]);
                    match end {
                        Some(offset) => i += offset + 2,
                        None => break,
                    }
                }
                _ => i += 2,
            }
        }
        self.pending.drain(..i);
    }
}

pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|window| window == needle)
}

/// Number of open file descriptors in this process
#[cfg(target_os = "linux")]
pub fn open_fds() -> usize {
    std::fs::read_dir("/proc/self/fd").unwrap().count()
}
