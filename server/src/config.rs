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

//! Server and launch configuration

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tnbridge_telnetcodec::WindowSize;

/// Text written to the client after the program exits. The trailing sequence makes the
/// cursor visible again in case the program hid it.
pub const DEFAULT_FAREWELL: &str = "\r\nThanks for visiting <3\r\n\x1b[?25h";

/// How the program's standard streams are attached
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LaunchMode {
    /// Pseudo-terminal sized to the client's window
    #[default]
    Pty,
    /// Plain stdin/stdout/stderr pipes
    Pipe,
}

impl fmt::Display for LaunchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchMode::Pty => write!(f, "pty"),
            LaunchMode::Pipe => write!(f, "pipe"),
        }
    }
}

impl FromStr for LaunchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pty" => Ok(LaunchMode::Pty),
            "pipe" => Ok(LaunchMode::Pipe),
            other => Err(format!("unknown launch mode '{other}', expected 'pty' or 'pipe'")),
        }
    }
}

/// Describes the program started for every session
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    /// Program to execute, resolved through `PATH` when not absolute
    pub program: PathBuf,
    /// Arguments passed to the program
    pub args: Vec<String>,
    /// Additional environment variables
    pub env: Vec<(String, String)>,
    /// Working directory, inherited when `None`
    pub cwd: Option<PathBuf>,
    /// Stream attachment
    pub mode: LaunchMode,
    /// Value of `TERM` given to the program
    pub terminal_type: String,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::new(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
            mode: LaunchMode::Pty,
            terminal_type: String::from("xterm-256color"),
        }
    }
}

impl LaunchConfig {
    /// Create a launch configuration for the given program
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// Set the program arguments
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Add an environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set the working directory
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Set the launch mode
    pub fn with_mode(mut self, mode: LaunchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the terminal type
    pub fn with_terminal_type(mut self, terminal_type: impl Into<String>) -> Self {
        self.terminal_type = terminal_type.into();
        self
    }

    /// Name used in logs and diagnostics
    pub fn display_name(&self) -> String {
        self.program.display().to_string()
    }

    /// Validate the launch configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.program.as_os_str().is_empty() {
            return Err("program must not be empty".to_string());
        }
        if self.terminal_type.is_empty() {
            return Err("terminal_type must not be empty".to_string());
        }
        if let Some((key, _)) = self
            .env
            .iter()
            .find(|(key, _)| key.is_empty() || key.contains('='))
        {
            return Err(format!("invalid environment variable name '{key}'"));
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_address: SocketAddr,
    /// Program started for each session
    pub launch: LaunchConfig,
    /// Maximum number of concurrent sessions
    pub max_sessions: usize,
    /// Session closes after this long without bytes in either direction
    pub idle_timeout: Duration,
    /// Upper bound on option negotiation before the program is spawned
    pub negotiation_timeout: Duration,
    /// Time a program gets to exit after its input closes, before it is killed
    pub grace_period: Duration,
    /// Time sessions get to close on shutdown, before they are aborted
    pub shutdown_timeout: Duration,
    /// Size used when the client reports none
    pub default_window_size: WindowSize,
    /// Ask clients without NAWS for their size with `ESC[18t`
    pub query_window_size: bool,
    /// Text written to the client after the program exits
    pub farewell: Option<String>,
    /// Text written to a client rejected at capacity
    pub reject_message: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 2323)),
            launch: LaunchConfig::default(),
            max_sessions: 64,
            idle_timeout: Duration::from_secs(600),
            negotiation_timeout: Duration::from_millis(1500),
            grace_period: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(10),
            default_window_size: WindowSize::default(),
            query_window_size: true,
            farewell: Some(DEFAULT_FAREWELL.to_string()),
            reject_message: Some("Server full, please try again later.\r\n".to_string()),
        }
    }
}

impl ServerConfig {
    /// Create a new configuration bridging `bind_address` to `launch`
    pub fn new(bind_address: SocketAddr, launch: LaunchConfig) -> Self {
        Self {
            bind_address,
            launch,
            ..Default::default()
        }
    }

    /// Set maximum sessions
    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    /// Set idle timeout
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set negotiation timeout
    pub fn with_negotiation_timeout(mut self, timeout: Duration) -> Self {
        self.negotiation_timeout = timeout;
        self
    }

    /// Set grace period
    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    /// Set shutdown timeout
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the fallback window size
    pub fn with_default_window_size(mut self, size: WindowSize) -> Self {
        self.default_window_size = size;
        self
    }

    /// Enable or disable the `ESC[18t` size query
    pub fn with_window_size_query(mut self, enabled: bool) -> Self {
        self.query_window_size = enabled;
        self
    }

    /// Set or clear the farewell text
    pub fn with_farewell(mut self, farewell: Option<String>) -> Self {
        self.farewell = farewell;
        self
    }

    /// Set or clear the capacity rejection text
    pub fn with_reject_message(mut self, message: Option<String>) -> Self {
        self.reject_message = message;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_sessions == 0 {
            return Err("max_sessions must be greater than 0".to_string());
        }
        if self.idle_timeout.is_zero() {
            return Err("idle_timeout must be greater than 0".to_string());
        }
        if self.negotiation_timeout.is_zero() {
            return Err("negotiation_timeout must be greater than 0".to_string());
        }
        if self.shutdown_timeout.is_zero() {
            return Err("shutdown_timeout must be greater than 0".to_string());
        }
        if self.default_window_size.cols == 0 || self.default_window_size.rows == 0 {
            return Err("default_window_size must be at least 1x1".to_string());
        }
        self.launch.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_address.port(), 2323);
        assert_eq!(config.max_sessions, 64);
        assert_eq!(config.idle_timeout, Duration::from_secs(600));
        assert_eq!(config.negotiation_timeout, Duration::from_millis(1500));
        assert_eq!(config.grace_period, Duration::from_secs(5));
        assert_eq!(config.default_window_size, WindowSize::new(80, 24));
        assert_eq!(config.launch.mode, LaunchMode::Pty);
        assert_eq!(config.farewell.as_deref(), Some(DEFAULT_FAREWELL));
    }

    #[test]
    fn test_builder_pattern() {
        let launch = LaunchConfig::new("/bin/cat")
            .with_args(["-u"])
            .with_env("GAME_SEED", "7")
            .with_mode(LaunchMode::Pipe)
            .with_terminal_type("vt100");
        let config = ServerConfig::new("127.0.0.1:4000".parse().unwrap(), launch)
            .with_max_sessions(3)
            .with_idle_timeout(Duration::from_secs(30))
            .with_grace_period(Duration::from_millis(250))
            .with_window_size_query(false)
            .with_farewell(None);

        assert_eq!(config.bind_address.port(), 4000);
        assert_eq!(config.max_sessions, 3);
        assert_eq!(config.idle_timeout, Duration::from_secs(30));
        assert_eq!(config.grace_period, Duration::from_millis(250));
        assert!(!config.query_window_size);
        assert!(config.farewell.is_none());
        assert_eq!(config.launch.args, vec!["-u".to_string()]);
        assert_eq!(config.launch.env, vec![("GAME_SEED".into(), "7".into())]);
        assert_eq!(config.launch.terminal_type, "vt100");
        assert_eq!(config.launch.display_name(), "/bin/cat");
    }

    #[test]
    fn test_validation() {
        let valid = ServerConfig::new(
            "127.0.0.1:0".parse().unwrap(),
            LaunchConfig::new("/bin/cat"),
        );
        assert!(valid.validate().is_ok());

        assert!(valid.clone().with_max_sessions(0).validate().is_err());
        assert!(valid.clone().with_idle_timeout(Duration::ZERO).validate().is_err());
        assert!(
            valid
                .clone()
                .with_default_window_size(WindowSize::new(0, 24))
                .validate()
                .is_err()
        );

        // Program is required
        assert!(ServerConfig::default().validate().is_err());

        let bad_env = ServerConfig {
            launch: LaunchConfig::new("/bin/cat").with_env("A=B", "c"),
            ..valid
        };
        assert!(bad_env.validate().is_err());
    }

    #[test]
    fn test_launch_mode_parse() {
        assert_eq!("pty".parse::<LaunchMode>(), Ok(LaunchMode::Pty));
        assert_eq!("PIPE".parse::<LaunchMode>(), Ok(LaunchMode::Pipe));
        assert!("socket".parse::<LaunchMode>().is_err());
        assert_eq!(LaunchMode::Pipe.to_string(), "pipe");
    }
}
