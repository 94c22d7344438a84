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
// ───── Base modules ─────
pub mod channel_list;
pub mod command;
pub mod command_id_generator;
pub mod firmware;
pub mod response_correlator;
pub mod roam_state;
pub mod serialization;
pub mod subsystem;

// ───── Submodules: message/result vocabulary grouped under namespaces ─────
pub mod roam {
    pub use crate::roam_state::{
        ConnectionProfile, RoamCompleteEvent, RoamInfo, RoamResult, RoamState, RoamStatus,
        RoamSubstate, SecurityMode, VdevRoamContext,
    };
}

pub mod fw {
    pub use crate::firmware::{
        DisconnectStats, FirmwareRequest, FirmwareResponse, FirmwareStatus, FirmwareTransport,
    };
}

use std::sync::atomic::{AtomicU32, Ordering};
// ───── Reexports: commonly used components ─────
pub use channel_list::{build_channel_list, ChannelEntry, ChannelListPolicy, RegulatoryChannel};
pub use command::{RoamCommand, RoamCommandKind, RoamError};
pub use command_id_generator::CommandIdGenerator;
pub use serialization::SerializationEngine;
pub use subsystem::{RoamConfig, RoamSubsystem};

pub fn next_task_id() -> u32 {
    static TASK_ID: AtomicU32 = AtomicU32::new(0);
    TASK_ID.fetch_add(1, Ordering::Relaxed)
}
