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
use tokio::time::Instant;
use tracing::{debug, error, trace, warn};

use crate::command::{RoamCommandKind, WmStatusChangeKind};
use crate::firmware::{FirmwareResponse, FirmwareStatus};
use crate::roam_state::apply_response;
use crate::subsystem::{finish_command, RoamSubsystem};

impl RoamSubsystem {
    /// Entry point for every message arriving from firmware. Solicited
    /// responses are correlated against the vdev's in-flight commands;
    /// unsolicited disassoc/deauth indications spawn lost-link handling.
    /// A response that matches nothing is logged and dropped.
    pub async fn on_firmware_response(&self, response: FirmwareResponse) {
        match response {
            FirmwareResponse::DisassocInd {
                vdev_id,
                peer,
                reason_code,
            } => {
                self.handle_lost_link(
                    vdev_id,
                    WmStatusChangeKind::Disassociated { peer, reason_code },
                )
                .await
            }
            FirmwareResponse::DeauthInd {
                vdev_id,
                peer,
                reason_code,
            } => {
                self.handle_lost_link(
                    vdev_id,
                    WmStatusChangeKind::Deauthenticated { peer, reason_code },
                )
                .await
            }
            _ => self.correlate(response).await,
        }
    }

    /// Peer-initiated departure: queue a lost-link command through the
    /// same admission path as caller submissions, including the duplicate
    /// disassoc/deauth suppression.
    async fn handle_lost_link(&self, vdev_id: u8, change: WmStatusChangeKind) {
        let mut inner = self.inner.lock().await;
        if !inner.contexts.contains_key(&vdev_id) {
            warn!(vdev_id, "lost-link indication for unknown vdev, dropping");
            return;
        }

        let peer = match change {
            WmStatusChangeKind::Disassociated { peer, .. }
            | WmStatusChangeKind::Deauthenticated { peer, .. } => peer,
        };
        if inner.engine.has_peer_disconnect_in_flight(vdev_id, peer) {
            debug!(
                vdev_id,
                peer = %peer,
                "disconnect already in flight for peer, dropping indication"
            );
            return;
        }

        if let Err(e) = self.queue_command(
            &mut inner,
            vdev_id,
            RoamCommandKind::WmStatusChange(change),
            false,
            Instant::now(),
        ) {
            error!(vdev_id, "fail to queue lost-link handling: {e}");
        }
    }

    async fn correlate(&self, response: FirmwareResponse) {
        let vdev_id = response.vdev_id();
        let status = response.status();
        let stats = match &response {
            FirmwareResponse::DisconnectStatsRsp { stats, .. } => Some(*stats),
            _ => None,
        };

        let mut inner = self.inner.lock().await;
        let now = Instant::now();

        let matched = inner
            .engine
            .find_active(vdev_id, |cmd| kind_matches_response(&cmd.kind, &response))
            .cloned();
        let Some(cmd) = matched else {
            // late arrival after a timeout already resolved the command,
            // or firmware sent something we never asked for
            warn!(
                vdev_id,
                response = response.label(),
                "no in-flight command matches response, dropping"
            );
            return;
        };

        trace!(
            vdev_id,
            command_id = format!("{:#010X}", cmd.command_id),
            response = response.label(),
            "firmware response correlated"
        );

        let Some(ctx) = inner.contexts.get_mut(&vdev_id) else {
            warn!(vdev_id, "correlated response for vdev without context");
            return;
        };
        let (roam_status, result, roam_info) = apply_response(ctx, &cmd, status, stats);
        if let FirmwareStatus::Failure(code) = status {
            debug!(
                vdev_id,
                response = response.label(),
                code,
                "firmware reported failure"
            );
        }

        finish_command(
            &mut inner,
            &self.transport,
            &self.events,
            &cmd,
            roam_status,
            result,
            roam_info,
            now,
        );
    }
}

/// Whether a response message is the completion of the given command kind.
/// Peer-addressed responses must also match the command's peer, so
/// concurrent stats queries for different peers resolve independently.
fn kind_matches_response(kind: &RoamCommandKind, response: &FirmwareResponse) -> bool {
    match (kind, response) {
        (RoamCommandKind::StartBss(_), FirmwareResponse::StartBssRsp { .. }) => true,
        (RoamCommandKind::StopBss, FirmwareResponse::StopBssRsp { .. }) => true,
        (
            RoamCommandKind::ForcedDisassocSta { peer, .. },
            FirmwareResponse::DisassocRsp { peer: rsp_peer, .. },
        ) => peer == rsp_peer,
        (
            RoamCommandKind::ForcedDeauthSta { peer, .. },
            FirmwareResponse::DeauthRsp { peer: rsp_peer, .. },
        ) => peer == rsp_peer,
        (
            RoamCommandKind::GetDisconnectStats { peer },
            FirmwareResponse::DisconnectStatsRsp { peer: rsp_peer, .. },
        ) => peer == rsp_peer,
        (RoamCommandKind::SetHwMode { .. }, FirmwareResponse::SetHwModeRsp { .. }) => true,
        (RoamCommandKind::NssUpdate { .. }, FirmwareResponse::NssUpdateRsp { .. }) => true,
        (RoamCommandKind::SetAntennaMode { .. }, FirmwareResponse::SetAntennaModeRsp { .. }) => {
            true
        }
        _ => false,
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::firmware::{DisconnectStats, FirmwareRequest, FirmwareTransport};
    use crate::roam_state::{
        ConnectionProfile, RoamResult, RoamState, RoamStatus, SecurityMode,
    };
    use crate::subsystem::RoamConfig;
    use pnet::datalink::MacAddr;
    use std::sync::{Arc, Mutex};

    // label-only double; the integration suite carries the full
    // request-recording transport
    pub struct LabelTransport {
        sent: Mutex<Vec<&'static str>>,
    }

    impl LabelTransport {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
            })
        }

        pub fn labels(&self) -> Vec<&'static str> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl FirmwareTransport for LabelTransport {
        fn send_request(&self, request: FirmwareRequest) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(request.label());
            Ok(())
        }
    }

    fn profile() -> ConnectionProfile {
        ConnectionProfile {
            ssid: "corpnet".to_string(),
            bssid: None,
            security: SecurityMode::Wpa2Personal,
            channel_freq: 5180,
        }
    }

    // A START_BSS_RSP completes the in-flight connect and drives the vdev
    // to Joined
    #[tokio::test]
    async fn test_start_bss_response_completes_connect() {
        let transport = LabelTransport::new();
        let (subsystem, mut events) =
            RoamSubsystem::new(RoamConfig::default(), transport.clone());
        subsystem.open_vdev(0).await;

        let roam_id = subsystem
            .submit(0, RoamCommandKind::StartBss(profile()), false)
            .await
            .unwrap();
        assert_eq!(transport.labels(), vec!["START_BSS_REQ"]);

        subsystem
            .on_firmware_response(FirmwareResponse::StartBssRsp {
                vdev_id: 0,
                status: FirmwareStatus::Success,
            })
            .await;

        let event = events.try_recv().unwrap();
        assert_eq!(event.roam_id, roam_id);
        assert_eq!(event.status, RoamStatus::Success);
        assert_eq!(event.result, RoamResult::StartBssSuccess);
        assert_eq!(
            subsystem.vdev_state(0).await.unwrap().0,
            RoamState::Joined
        );
        assert_eq!(subsystem.outstanding_commands().await, 0);
    }

    // A response of the wrong type leaves the in-flight command untouched
    #[tokio::test]
    async fn test_mismatched_response_is_dropped() {
        let transport = LabelTransport::new();
        let (subsystem, mut events) =
            RoamSubsystem::new(RoamConfig::default(), transport.clone());
        subsystem.open_vdev(0).await;

        let _ = subsystem
            .submit(0, RoamCommandKind::StartBss(profile()), false)
            .await
            .unwrap();

        subsystem
            .on_firmware_response(FirmwareResponse::StopBssRsp {
                vdev_id: 0,
                status: FirmwareStatus::Success,
            })
            .await;

        assert!(events.try_recv().is_err());
        assert_eq!(subsystem.exclusive_active_count(0).await, 1);
    }

    // Stats responses correlate by peer, so two concurrent queries resolve
    // independently
    #[tokio::test]
    async fn test_stats_responses_correlate_by_peer() {
        let transport = LabelTransport::new();
        let (subsystem, mut events) =
            RoamSubsystem::new(RoamConfig::default(), transport.clone());
        subsystem.open_vdev(0).await;

        let peer_a = MacAddr::new(0xAA, 0, 0, 0, 0, 1);
        let peer_b = MacAddr::new(0xBB, 0, 0, 0, 0, 2);
        let _ = subsystem
            .submit(0, RoamCommandKind::GetDisconnectStats { peer: peer_a }, false)
            .await
            .unwrap();
        let id_b = subsystem
            .submit(0, RoamCommandKind::GetDisconnectStats { peer: peer_b }, false)
            .await
            .unwrap();

        subsystem
            .on_firmware_response(FirmwareResponse::DisconnectStatsRsp {
                vdev_id: 0,
                peer: peer_b,
                status: FirmwareStatus::Success,
                stats: DisconnectStats {
                    tx_rate_kbps: 54000,
                    rx_rate_kbps: 24000,
                    rssi_dbm: -61,
                },
            })
            .await;

        let event = events.try_recv().unwrap();
        assert_eq!(event.roam_id, id_b);
        assert_eq!(event.result, RoamResult::DisconnectStatsReady);
        assert_eq!(event.roam_info.peer, Some(peer_b));
        assert_eq!(
            event.roam_info.disconnect_stats.unwrap().rssi_dbm,
            -61
        );
        // the query for peer_a is still outstanding
        assert_eq!(subsystem.outstanding_commands().await, 1);
    }

    // An unsolicited deauth indication runs lost-link handling locally and
    // emits a LostLink event without any firmware round trip
    #[tokio::test]
    async fn test_deauth_indication_spawns_lost_link() {
        let transport = LabelTransport::new();
        let (subsystem, mut events) =
            RoamSubsystem::new(RoamConfig::default(), transport.clone());
        subsystem.open_vdev(0).await;

        let peer = MacAddr::new(0x00, 0x11, 0x22, 0x33, 0x44, 0x55);
        subsystem
            .on_firmware_response(FirmwareResponse::DeauthInd {
                vdev_id: 0,
                peer,
                reason_code: 7,
            })
            .await;

        let event = events.try_recv().unwrap();
        assert_eq!(event.status, RoamStatus::Success);
        assert_eq!(event.result, RoamResult::LostLink);
        assert_eq!(event.roam_info.peer, Some(peer));
        assert_eq!(event.roam_info.reason_code, Some(7));
        assert!(transport.labels().is_empty());
    }

    // Indications for a vdev without a session are dropped outright
    #[tokio::test]
    async fn test_indication_for_unknown_vdev_is_dropped() {
        let transport = LabelTransport::new();
        let (subsystem, mut events) =
            RoamSubsystem::new(RoamConfig::default(), transport.clone());

        subsystem
            .on_firmware_response(FirmwareResponse::DisassocInd {
                vdev_id: 9,
                peer: MacAddr::new(1, 2, 3, 4, 5, 6),
                reason_code: 1,
            })
            .await;

        assert!(events.try_recv().is_err());
    }
}
