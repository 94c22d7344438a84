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
use pnet::datalink::MacAddr;
use thiserror::Error;
use tokio::time::{Duration, Instant};
use tracing::warn;

use crate::roam_state::ConnectionProfile;

/// Synchronous submission failures. Everything else resolves through the
/// roam-complete event channel.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoamError {
    #[error("command pool exhausted")]
    ResourceExhausted,
    #[error("no active session for vdev {0}")]
    InvalidSession(u8),
}

/// Reason a peer-initiated departure indication was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WmStatusChangeKind {
    Disassociated { peer: MacAddr, reason_code: u16 },
    Deauthenticated { peer: MacAddr, reason_code: u16 },
}

/// Tagged command payload. One variant per serialized operation.
#[derive(Debug, Clone, PartialEq)]
pub enum RoamCommandKind {
    StartBss(ConnectionProfile),
    StopBss,
    ForcedDisassocSta { peer: MacAddr, reason_code: u16 },
    ForcedDeauthSta { peer: MacAddr, reason_code: u16 },
    WmStatusChange(WmStatusChangeKind),
    GetDisconnectStats { peer: MacAddr },
    SetHwMode { hw_mode_index: u32 },
    NssUpdate { new_nss: u8 },
    SetAntennaMode { num_tx_chains: u8, num_rx_chains: u8 },
}

impl RoamCommandKind {
    pub fn label(&self) -> &'static str {
        match self {
            RoamCommandKind::StartBss(_) => "StartBss",
            RoamCommandKind::StopBss => "StopBss",
            RoamCommandKind::ForcedDisassocSta { .. } => "ForcedDisassocSta",
            RoamCommandKind::ForcedDeauthSta { .. } => "ForcedDeauthSta",
            RoamCommandKind::WmStatusChange(_) => "WmStatusChange",
            RoamCommandKind::GetDisconnectStats { .. } => "GetDisconnectStats",
            RoamCommandKind::SetHwMode { .. } => "SetHwMode",
            RoamCommandKind::NssUpdate { .. } => "NssUpdate",
            RoamCommandKind::SetAntennaMode { .. } => "SetAntennaMode",
        }
    }

    /// Whether the command occupies the vdev's single exclusive active
    /// slot. Disconnect-stats queries run concurrently with anything.
    pub fn is_blocking(&self) -> bool {
        !matches!(self, RoamCommandKind::GetDisconnectStats { .. })
    }

    /// Peer targeted by a disconnect-class command, if any. Used by the
    /// duplicate disassoc/deauth suppression scan.
    pub fn peer_mac(&self) -> Option<MacAddr> {
        match *self {
            RoamCommandKind::ForcedDisassocSta { peer, .. }
            | RoamCommandKind::ForcedDeauthSta { peer, .. }
            | RoamCommandKind::GetDisconnectStats { peer } => Some(peer),
            RoamCommandKind::WmStatusChange(WmStatusChangeKind::Disassociated {
                peer, ..
            })
            | RoamCommandKind::WmStatusChange(WmStatusChangeKind::Deauthenticated {
                peer, ..
            }) => Some(peer),
            _ => None,
        }
    }

    /// True for the command classes that participate in disassoc/deauth
    /// deduplication: a forced disconnect or a lost-link status change.
    pub fn is_peer_disconnect(&self) -> bool {
        matches!(
            self,
            RoamCommandKind::ForcedDisassocSta { .. }
                | RoamCommandKind::ForcedDeauthSta { .. }
                | RoamCommandKind::WmStatusChange(_)
        )
    }
}

/// A unit of work owned by the serialization engine from submission until
/// completion, cancellation or session teardown.
#[derive(Debug, Clone, PartialEq)]
pub struct RoamCommand {
    pub command_id: u32,
    pub vdev_id: u8,
    pub kind: RoamCommandKind,
    pub high_priority: bool,
    pub timeout_duration: Duration,
    /// Set when the command enters the active list; the timeout budget
    /// runs from this point, not from submission.
    pub activated_at: Option<Instant>,
}

impl RoamCommand {
    pub fn new(
        command_id: u32,
        vdev_id: u8,
        kind: RoamCommandKind,
        high_priority: bool,
        timeout_duration: Duration,
    ) -> Self {
        Self {
            command_id,
            vdev_id,
            kind,
            high_priority,
            timeout_duration,
            activated_at: None,
        }
    }

    /// Duplicate-disconnect match: same vdev already has a forced
    /// disassoc/deauth or lost-link command for this peer in flight.
    pub fn matches_peer_disconnect(&self, vdev_id: u8, peer: MacAddr) -> bool {
        self.vdev_id == vdev_id
            && self.kind.is_peer_disconnect()
            && self.kind.peer_mac() == Some(peer)
    }

    pub fn expired(&self, now: Instant) -> bool {
        match self.activated_at {
            Some(activated_at) => now.duration_since(activated_at) >= self.timeout_duration,
            None => false,
        }
    }
}

/// Bounds the total number of outstanding commands across all vdevs.
#[derive(Debug)]
pub struct CommandPool {
    capacity: usize,
    outstanding: usize,
}

impl CommandPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            outstanding: 0,
        }
    }

    pub fn acquire(&mut self) -> Result<(), RoamError> {
        if self.outstanding >= self.capacity {
            warn!(
                outstanding = self.outstanding,
                capacity = self.capacity,
                "command pool exhausted"
            );
            return Err(RoamError::ResourceExhausted);
        }
        self.outstanding += 1;
        Ok(())
    }

    /// Releasing more commands than were acquired is a logged anomaly,
    /// never a crash.
    pub fn release(&mut self) {
        if self.outstanding == 0 {
            warn!("command pool release with no outstanding commands");
            return;
        }
        self.outstanding -= 1;
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
