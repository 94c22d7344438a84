/*
 * If not stated otherwise in this file or this component's LICENSE file the
 * following copyright and licenses apply:
 *
 * Copyright 2025 RDK Management
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 * http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
*/

#![deny(warnings)]
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;
use wlanroam::fw::{FirmwareRequest, FirmwareTransport};

/// Opt-in tracing for test runs, driven by RUST_LOG. Safe to call from
/// every test; only the first initialization wins.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Transport double for integration tests: records every request in
/// submission order and optionally rejects sends.
pub struct RecordingTransport {
    requests: Mutex<Vec<FirmwareRequest>>,
    fail_sends: Mutex<bool>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            fail_sends: Mutex::new(false),
        }
    }

    /// Make every subsequent send fail, exercising the local failure
    /// completion path.
    pub fn set_fail_sends(&self, fail: bool) {
        *self.fail_sends.lock().unwrap() = fail;
    }

    pub fn requests(&self) -> Vec<FirmwareRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Request labels in submission order, the usual assertion shape.
    pub fn labels(&self) -> Vec<&'static str> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.label())
            .collect()
    }
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl FirmwareTransport for RecordingTransport {
    fn send_request(&self, request: FirmwareRequest) -> anyhow::Result<()> {
        if *self.fail_sends.lock().unwrap() {
            anyhow::bail!("transport send rejected");
        }
        self.requests.lock().unwrap().push(request);
        Ok(())
    }
}
