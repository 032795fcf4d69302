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

//! Session lifecycle observer

use crate::{SessionId, SessionOutcome};
use async_trait::async_trait;
use std::net::SocketAddr;

/// Session lifecycle observer trait
///
/// Implement this trait to be told when sessions start and end. All methods have default
/// implementations that do nothing. Callbacks run on the session's task, so they should
/// return quickly.
///
/// # Example
///
/// ```no_run
/// use tnbridge_server::{SessionId, SessionObserver, SessionOutcome};
/// use async_trait::async_trait;
///
/// struct AuditLog;
///
/// #[async_trait]
/// impl SessionObserver for AuditLog {
///     async fn on_session_ended(&self, id: SessionId, outcome: &SessionOutcome) {
///         println!("{id} ended: {outcome}");
///     }
/// }
/// ```
#[async_trait]
pub trait SessionObserver: Send + Sync + 'static {
    /// Called once the program is running and bytes start flowing
    async fn on_session_started(&self, _id: SessionId, _peer: SocketAddr, _pid: Option<u32>) {}

    /// Called after the session released its socket, process and slot
    async fn on_session_ended(&self, _id: SessionId, _outcome: &SessionOutcome) {}

    /// Called when a connection is turned away at capacity
    async fn on_rejected(&self, _peer: SocketAddr) {}
}

/// Observer that ignores every callback
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

#[async_trait]
impl SessionObserver for NoopObserver {}
