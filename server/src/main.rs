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

//! tnbridge - serve a terminal program over telnet, one process per connection

use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tnbridge_server::{
    BridgeError, BridgeServer, LaunchConfig, LaunchMode, NoopObserver, ServerConfig,
};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Serve a terminal program over telnet, one process per connection
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address to listen on
    #[arg(long, env = "TNBRIDGE_BIND", default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Port to listen on
    #[arg(short, long, env = "TNBRIDGE_PORT", default_value_t = 2323)]
    port: u16,

    /// Maximum number of concurrent sessions
    #[arg(long, env = "TNBRIDGE_MAX_SESSIONS", default_value_t = 64)]
    max_sessions: usize,

    /// Seconds without traffic before a session is closed
    #[arg(long, env = "TNBRIDGE_IDLE_TIMEOUT", default_value_t = 600)]
    idle_timeout: u64,

    /// Seconds a program gets to exit after its client disconnects
    #[arg(long, env = "TNBRIDGE_GRACE_PERIOD", default_value_t = 5)]
    grace_period: u64,

    /// Milliseconds to wait for the client's window size
    #[arg(long, env = "TNBRIDGE_NEGOTIATION_TIMEOUT", default_value_t = 1500)]
    negotiation_timeout: u64,

    /// Seconds to wait for sessions on shutdown before killing them
    #[arg(long, env = "TNBRIDGE_SHUTDOWN_TIMEOUT", default_value_t = 10)]
    shutdown_timeout: u64,

    /// How the program is attached: pty or pipe
    #[arg(long, env = "TNBRIDGE_MODE", default_value = "pty")]
    mode: LaunchMode,

    /// TERM value given to the program
    #[arg(long, env = "TNBRIDGE_TERM", default_value = "xterm-256color")]
    term: String,

    /// Do not fall back to an escape sequence query when the client skips NAWS
    #[arg(long)]
    no_size_query: bool,

    /// Close the connection without a farewell message
    #[arg(long)]
    no_farewell: bool,

    /// Log filter, e.g. `info` or `tnbridge_server=debug`
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    log: String,

    /// Program to launch for every connection
    #[arg(env = "TNBRIDGE_PROGRAM")]
    program: PathBuf,

    /// Arguments passed to the program
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

impl Cli {
    fn server_config(&self) -> ServerConfig {
        let launch = LaunchConfig::new(self.program.clone())
            .with_args(self.args.iter().cloned())
            .with_mode(self.mode)
            .with_terminal_type(self.term.clone());
        let mut config = ServerConfig::new(SocketAddr::new(self.bind, self.port), launch)
            .with_max_sessions(self.max_sessions)
            .with_idle_timeout(Duration::from_secs(self.idle_timeout))
            .with_grace_period(Duration::from_secs(self.grace_period))
            .with_negotiation_timeout(Duration::from_millis(self.negotiation_timeout))
            .with_shutdown_timeout(Duration::from_secs(self.shutdown_timeout))
            .with_window_size_query(!self.no_size_query);
        if self.no_farewell {
            config = config.with_farewell(None);
        }
        config
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&cli.log).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting tnbridge v{}", env!("CARGO_PKG_VERSION"));

    let server = match BridgeServer::bind(cli.server_config()).await {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "cannot start bridge");
            return ExitCode::from(exit_status(&e));
        }
    };
    if let Err(e) = server.start(Arc::new(NoopObserver)).await {
        error!(error = %e, "cannot start bridge");
        return ExitCode::from(exit_status(&e));
    }

    shutdown_signal().await;
    info!("shutdown requested");

    if let Err(e) = server.shutdown().await {
        error!(error = %e, "shutdown failed");
        return ExitCode::FAILURE;
    }
    let snapshot = server.snapshot();
    info!(%snapshot, "bridge stopped");
    ExitCode::SUCCESS
}

/// Process exit status for a startup failure
fn exit_status(error: &BridgeError) -> u8 {
    match error {
        BridgeError::InvalidConfig(_) => 2,
        _ => 1,
    }
}

/// Resolves on SIGINT, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
