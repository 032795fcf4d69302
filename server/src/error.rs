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

//! Error types for the bridge server

use std::net::SocketAddr;
use thiserror::Error;

/// Result type for bridge operations
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

/// Bridge server error types
#[derive(Debug, Error)]
pub enum BridgeError {
    /// I/O error on a client connection
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// Protocol error from the codec layer
    #[error("Protocol error: {0}")]
    Protocol(#[from] tnbridge_telnetcodec::CodecError),

    /// The program could not be started
    #[error("cannot start {program}: {reason}")]
    Spawn {
        /// Program that failed to start
        program: String,
        /// Why it failed
        reason: String,
    },

    /// Connection turned away because every slot was taken
    #[error("Maximum sessions ({0}) reached")]
    AdmissionRejected(usize),

    /// The listening socket could not be bound
    #[error("Failed to bind {address}: {source}")]
    Bind {
        /// Requested address
        address: SocketAddr,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Configuration rejected by `validate()`
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Server is not running
    #[error("Server not running")]
    NotRunning,

    /// Server is already running
    #[error("Server already running")]
    AlreadyRunning,
}

impl BridgeError {
    /// Create a spawn error
    pub fn spawn(program: impl Into<String>, reason: impl ToString) -> Self {
        BridgeError::Spawn {
            program: program.into(),
            reason: reason.to_string(),
        }
    }

    /// Errors that end (or never start) a single session and leave the server running
    pub fn is_session_local(&self) -> bool {
        matches!(
            self,
            BridgeError::Connection(_)
                | BridgeError::Protocol(_)
                | BridgeError::Spawn { .. }
                | BridgeError::AdmissionRejected(_)
        )
    }

    /// Errors that stop the server
    pub fn is_fatal(&self) -> bool {
        matches!(self, BridgeError::Bind { .. } | BridgeError::InvalidConfig(_))
    }
}
