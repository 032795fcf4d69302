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

//! Idle timeout and descriptor accounting
//!
//! Kept in its own test binary so no other test opens descriptors while this one counts them.

#![cfg(target_os = "linux")]

mod common;

use common::{TestClient, config, open_fds, start_server, wait_for_sessions};
use std::time::Duration;
use tnbridge_server::LaunchMode;
use tokio::time::Instant;

#[tokio::test]
async fn test_idle_timeout_releases_everything() {
    let server = start_server(
        config("cat", &[], LaunchMode::Pipe).with_idle_timeout(Duration::from_millis(400)),
    )
    .await;

    // Warm up: the first child spawn sets up the runtime's process reaping machinery
    let mut warmup = TestClient::connect(server.local_addr()).await;
    warmup.send(b"warm\n").await;
    assert!(warmup.read_until(b"warm\n", Duration::from_secs(5)).await);
    drop(warmup);
    wait_for_sessions(&server, 0).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    let baseline = open_fds();

    let mut client = TestClient::connect(server.local_addr()).await;
    wait_for_sessions(&server, 1).await;
    let started = Instant::now();
    assert!(client.read_to_eof(Duration::from_secs(5)).await);
    assert!(started.elapsed() >= Duration::from_millis(300));
    wait_for_sessions(&server, 0).await;
    drop(client);

    let deadline = Instant::now() + Duration::from_secs(3);
    while open_fds() > baseline {
        assert!(
            Instant::now() < deadline,
            "descriptors leaked: {} open, baseline {baseline}",
            open_fds()
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(server.metrics().snapshot().idle_timeouts, 1);

    server.shutdown().await.unwrap();
}
