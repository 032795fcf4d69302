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

//! Telnet to Process Bridge
//!
//! Every accepted telnet connection gets its own freshly launched program, attached through a
//! pseudo-terminal (or plain pipes), with bytes pumped in both directions until either side
//! goes away.
//!
//! - Hard cap on concurrent sessions, excess connections are turned away immediately
//! - Client window size (NAWS) applied before the program produces output and on every change
//! - Half-close: client EOF closes program input, program exit flushes output then closes
//! - Idle timeout and graceful shutdown with a force-kill deadline
//!
//! # Architecture
//!
//! ```text
//! BridgeServer (accept loop)
//!     ↓
//! SessionManager (admission, active set, shutdown)
//!     ↓
//! Session → TelnetConnection ⇄ ProcessInstance
//! ```
//!
//! # Example
//!
//! ```no_run
//! use tnbridge_server::{BridgeServer, LaunchConfig, LaunchMode, NoopObserver, ServerConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let launch = LaunchConfig::new("/usr/bin/htop").with_mode(LaunchMode::Pty);
//!     let config = ServerConfig::new("127.0.0.1:2323".parse()?, launch).with_max_sessions(8);
//!     let server = BridgeServer::bind(config).await?;
//!     server.start(Arc::new(NoopObserver)).await?;
//!     tokio::signal::ctrl_c().await?;
//!     server.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod config;
mod connection;
mod error;
mod launcher;
mod manager;
mod metrics;
mod observer;
mod server;
mod session;
mod types;

pub use config::{DEFAULT_FAREWELL, LaunchConfig, LaunchMode, ServerConfig};
pub use connection::{Handshake, SIZE_QUERY, TelnetConnection};
pub use error::{BridgeError, BridgeResult};
pub use launcher::{ProcessInstance, Resizer, TERM_SIZE_ENV, spawn};
pub use manager::{AdmissionPermit, SessionManager};
pub use metrics::{MetricsSnapshot, ServerMetrics};
pub use observer::{NoopObserver, SessionObserver};
pub use server::BridgeServer;
pub use types::{ExitStatus, ServerSnapshot, SessionId, SessionInfo, SessionOutcome, SessionState};
