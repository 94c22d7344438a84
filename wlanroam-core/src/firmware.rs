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
use crate::channel_list::ChannelEntry;
use crate::roam_state::ConnectionProfile;
use pnet::datalink::MacAddr;

/// Completion status carried by every firmware response message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareStatus {
    Success,
    /// Explicit rejection, with the firmware failure code.
    Failure(u32),
}

impl FirmwareStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, FirmwareStatus::Success)
    }
}

/// Peer statistics snapshot returned by a disconnect-stats request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisconnectStats {
    pub tx_rate_kbps: u32,
    pub rx_rate_kbps: u32,
    pub rssi_dbm: i8,
}

/// Outbound request messages. Each serialized command maps to exactly one
/// request type; `UpdateChannelListReq` is posted directly and expects no
/// response.
#[derive(Debug, Clone, PartialEq)]
pub enum FirmwareRequest {
    StartBssReq {
        vdev_id: u8,
        profile: ConnectionProfile,
    },
    StopBssReq {
        vdev_id: u8,
    },
    DisassocReq {
        vdev_id: u8,
        peer: MacAddr,
        reason_code: u16,
    },
    DeauthReq {
        vdev_id: u8,
        peer: MacAddr,
        reason_code: u16,
    },
    GetDisconnectStatsReq {
        vdev_id: u8,
        peer: MacAddr,
    },
    SetHwModeReq {
        vdev_id: u8,
        hw_mode_index: u32,
    },
    NssUpdateReq {
        vdev_id: u8,
        new_nss: u8,
    },
    SetAntennaModeReq {
        vdev_id: u8,
        num_tx_chains: u8,
        num_rx_chains: u8,
    },
    UpdateChannelListReq {
        channels: Vec<ChannelEntry>,
    },
}

impl FirmwareRequest {
    pub fn label(&self) -> &'static str {
        match self {
            FirmwareRequest::StartBssReq { .. } => "START_BSS_REQ",
            FirmwareRequest::StopBssReq { .. } => "STOP_BSS_REQ",
            FirmwareRequest::DisassocReq { .. } => "DISASSOC_REQ",
            FirmwareRequest::DeauthReq { .. } => "DEAUTH_REQ",
            FirmwareRequest::GetDisconnectStatsReq { .. } => "GET_DISCONNECT_STATS_REQ",
            FirmwareRequest::SetHwModeReq { .. } => "SET_HW_MODE_REQ",
            FirmwareRequest::NssUpdateReq { .. } => "NSS_UPDATE_REQ",
            FirmwareRequest::SetAntennaModeReq { .. } => "SET_ANTENNA_MODE_REQ",
            FirmwareRequest::UpdateChannelListReq { .. } => "UPDATE_CHAN_LIST_REQ",
        }
    }
}

/// Inbound response and indication messages. Responses correlate with an
/// outstanding command; `DisassocInd`/`DeauthInd` are unsolicited
/// peer-initiated indications.
#[derive(Debug, Clone, PartialEq)]
pub enum FirmwareResponse {
    StartBssRsp {
        vdev_id: u8,
        status: FirmwareStatus,
    },
    StopBssRsp {
        vdev_id: u8,
        status: FirmwareStatus,
    },
    DisassocRsp {
        vdev_id: u8,
        peer: MacAddr,
        status: FirmwareStatus,
    },
    DeauthRsp {
        vdev_id: u8,
        peer: MacAddr,
        status: FirmwareStatus,
    },
    DisconnectStatsRsp {
        vdev_id: u8,
        peer: MacAddr,
        status: FirmwareStatus,
        stats: DisconnectStats,
    },
    SetHwModeRsp {
        vdev_id: u8,
        status: FirmwareStatus,
    },
    NssUpdateRsp {
        vdev_id: u8,
        status: FirmwareStatus,
    },
    SetAntennaModeRsp {
        vdev_id: u8,
        status: FirmwareStatus,
    },
    DisassocInd {
        vdev_id: u8,
        peer: MacAddr,
        reason_code: u16,
    },
    DeauthInd {
        vdev_id: u8,
        peer: MacAddr,
        reason_code: u16,
    },
}

impl FirmwareResponse {
    pub fn vdev_id(&self) -> u8 {
        match *self {
            FirmwareResponse::StartBssRsp { vdev_id, .. }
            | FirmwareResponse::StopBssRsp { vdev_id, .. }
            | FirmwareResponse::DisassocRsp { vdev_id, .. }
            | FirmwareResponse::DeauthRsp { vdev_id, .. }
            | FirmwareResponse::DisconnectStatsRsp { vdev_id, .. }
            | FirmwareResponse::SetHwModeRsp { vdev_id, .. }
            | FirmwareResponse::NssUpdateRsp { vdev_id, .. }
            | FirmwareResponse::SetAntennaModeRsp { vdev_id, .. }
            | FirmwareResponse::DisassocInd { vdev_id, .. }
            | FirmwareResponse::DeauthInd { vdev_id, .. } => vdev_id,
        }
    }

    pub fn status(&self) -> FirmwareStatus {
        match *self {
            FirmwareResponse::StartBssRsp { status, .. }
            | FirmwareResponse::StopBssRsp { status, .. }
            | FirmwareResponse::DisassocRsp { status, .. }
            | FirmwareResponse::DeauthRsp { status, .. }
            | FirmwareResponse::DisconnectStatsRsp { status, .. }
            | FirmwareResponse::SetHwModeRsp { status, .. }
            | FirmwareResponse::NssUpdateRsp { status, .. }
            | FirmwareResponse::SetAntennaModeRsp { status, .. } => status,
            // indications carry no completion status of their own
            FirmwareResponse::DisassocInd { .. } | FirmwareResponse::DeauthInd { .. } => {
                FirmwareStatus::Success
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FirmwareResponse::StartBssRsp { .. } => "START_BSS_RSP",
            FirmwareResponse::StopBssRsp { .. } => "STOP_BSS_RSP",
            FirmwareResponse::DisassocRsp { .. } => "DISASSOC_RSP",
            FirmwareResponse::DeauthRsp { .. } => "DEAUTH_RSP",
            FirmwareResponse::DisconnectStatsRsp { .. } => "GET_DISCONNECT_STATS_RSP",
            FirmwareResponse::SetHwModeRsp { .. } => "SET_HW_MODE_RSP",
            FirmwareResponse::NssUpdateRsp { .. } => "NSS_UPDATE_RSP",
            FirmwareResponse::SetAntennaModeRsp { .. } => "SET_ANTENNA_MODE_RSP",
            FirmwareResponse::DisassocInd { .. } => "DISASSOC_IND",
            FirmwareResponse::DeauthInd { .. } => "DEAUTH_IND",
        }
    }
}

/// Raw "send message to firmware" primitive. Implementations must not
/// block: the subsystem calls this while holding its state lock, so the
/// request has to be handed off to an asynchronous transmit path.
pub trait FirmwareTransport: Send + Sync {
    fn send_request(&self, request: FirmwareRequest) -> anyhow::Result<()>;
}
