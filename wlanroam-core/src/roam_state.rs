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
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::command::{RoamCommand, RoamCommandKind, WmStatusChangeKind};
use crate::firmware::{DisconnectStats, FirmwareRequest, FirmwareStatus};

/// Coarse per-vdev connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoamState {
    Stop,
    Idle,
    Joining,
    Joined,
}

/// Fine-grained phase within `Joining`, identifying which firmware
/// operation is outstanding for the vdev.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoamSubstate {
    None,
    StartBssReq,
    StopBssReq,
    DisassocReq,
    DeauthReq,
    Config,
    WaitForKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityMode {
    Open,
    Wpa2Personal,
    Wpa2Enterprise,
    Wpa3Personal,
}

/// Snapshot of the connection profile being established or held.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionProfile {
    pub ssid: String,
    pub bssid: Option<MacAddr>,
    pub security: SecurityMode,
    pub channel_freq: u32,
}

/// Overall disposition of a completed roam command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoamStatus {
    Success,
    Failure,
    Timeout,
}

/// Result vocabulary delivered to the roam-complete consumer; stable across
/// underlying firmware message formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoamResult {
    StartBssSuccess,
    StartBssFailure,
    StopBssSuccess,
    StopBssFailure,
    ForcedDisassoc,
    ForcedDeauth,
    LostLink,
    DisconnectStatsReady,
    HwModeChanged,
    NssUpdated,
    AntennaModeSet,
    AlreadyInProgress,
}

/// Context attached to a roam-complete event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RoamInfo {
    pub peer: Option<MacAddr>,
    pub profile: Option<ConnectionProfile>,
    pub reason_code: Option<u16>,
    pub disconnect_stats: Option<DisconnectStats>,
}

/// Terminal completion notification for a submitted command. Exactly one
/// event is delivered per accepted submission, on the subsystem event
/// channel rather than the submitter's call path.
#[derive(Debug, Clone, PartialEq)]
pub struct RoamCompleteEvent {
    pub vdev_id: u8,
    pub roam_id: u32,
    pub status: RoamStatus,
    pub result: RoamResult,
    pub roam_info: RoamInfo,
}

/// Per-vdev roam record. Mutated exclusively under the subsystem state
/// lock; created on vdev open and destroyed on vdev teardown after all of
/// the vdev's commands have been purged.
#[derive(Debug, Clone)]
pub struct VdevRoamContext {
    pub vdev_id: u8,
    pub state: RoamState,
    pub substate: RoamSubstate,
    pub profile: Option<ConnectionProfile>,
    pub pending_commands: usize,
    wait_for_key_deadline: Option<Instant>,
}

impl VdevRoamContext {
    pub fn new(vdev_id: u8) -> Self {
        Self {
            vdev_id,
            state: RoamState::Stop,
            substate: RoamSubstate::None,
            profile: None,
            pending_commands: 0,
            wait_for_key_deadline: None,
        }
    }

    pub fn set_state(&mut self, state: RoamState) {
        if self.state != state {
            info!(
                vdev_id = self.vdev_id,
                "roam state changed: {:?} -> {state:?}", self.state
            );
            self.state = state;
        }
    }

    pub fn set_substate(&mut self, substate: RoamSubstate) {
        if self.substate != substate {
            debug!(
                vdev_id = self.vdev_id,
                "roam substate changed: {:?} -> {substate:?}", self.substate
            );
            self.substate = substate;
        }
    }

    /// Session opened: the vdev is ready to accept connection commands.
    pub fn activate_session(&mut self) {
        self.set_state(RoamState::Idle);
        self.set_substate(RoamSubstate::None);
    }

    /// Entered after successful authentication; until exited, a new
    /// connect attempt on this vdev cannot proceed.
    pub fn start_wait_for_key(&mut self, budget: Duration) {
        self.set_substate(RoamSubstate::WaitForKey);
        self.wait_for_key_deadline = Some(Instant::now() + budget);
    }

    /// Key installation succeeded; the connect gate is lifted.
    pub fn key_installed(&mut self) {
        if self.substate == RoamSubstate::WaitForKey {
            self.set_substate(RoamSubstate::None);
        }
        self.wait_for_key_deadline = None;
    }

    pub fn is_waiting_for_key(&self) -> bool {
        self.substate == RoamSubstate::WaitForKey
    }

    /// Timer-driven exit from `WaitForKey`; returns true when the gate was
    /// released by expiry.
    pub fn expire_wait_for_key(&mut self, now: Instant) -> bool {
        match self.wait_for_key_deadline {
            Some(deadline) if now >= deadline => {
                warn!(vdev_id = self.vdev_id, "wait-for-key budget expired");
                self.set_substate(RoamSubstate::None);
                self.wait_for_key_deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Outcome of promoting a command to active.
pub enum Activation {
    /// The command owns the vdev's outstanding firmware operation.
    Issue(FirmwareRequest),
    /// The command is resolved locally, with no firmware interaction.
    Complete(RoamStatus, RoamResult, RoamInfo),
}

/// Apply the state transition for a command entering the active slot and
/// produce the firmware request it maps to (or an immediate completion for
/// commands handled locally).
pub fn apply_activation(ctx: &mut VdevRoamContext, cmd: &RoamCommand) -> Activation {
    match &cmd.kind {
        RoamCommandKind::StartBss(profile) => {
            if ctx.is_waiting_for_key() {
                // a connect cannot proceed while the previous key exchange
                // is still outstanding
                warn!(
                    vdev_id = ctx.vdev_id,
                    "rejecting connect while waiting for key installation"
                );
                return Activation::Complete(
                    RoamStatus::Failure,
                    RoamResult::StartBssFailure,
                    RoamInfo {
                        profile: Some(profile.clone()),
                        ..Default::default()
                    },
                );
            }
            ctx.set_state(RoamState::Joining);
            ctx.set_substate(RoamSubstate::StartBssReq);
            ctx.profile = Some(profile.clone());
            Activation::Issue(FirmwareRequest::StartBssReq {
                vdev_id: cmd.vdev_id,
                profile: profile.clone(),
            })
        }
        RoamCommandKind::StopBss => {
            ctx.set_state(RoamState::Joining);
            ctx.set_substate(RoamSubstate::StopBssReq);
            Activation::Issue(FirmwareRequest::StopBssReq {
                vdev_id: cmd.vdev_id,
            })
        }
        RoamCommandKind::ForcedDisassocSta { peer, reason_code } => {
            ctx.set_state(RoamState::Joining);
            ctx.set_substate(RoamSubstate::DisassocReq);
            Activation::Issue(FirmwareRequest::DisassocReq {
                vdev_id: cmd.vdev_id,
                peer: *peer,
                reason_code: *reason_code,
            })
        }
        RoamCommandKind::ForcedDeauthSta { peer, reason_code } => {
            ctx.set_state(RoamState::Joining);
            ctx.set_substate(RoamSubstate::DeauthReq);
            Activation::Issue(FirmwareRequest::DeauthReq {
                vdev_id: cmd.vdev_id,
                peer: *peer,
                reason_code: *reason_code,
            })
        }
        RoamCommandKind::WmStatusChange(change) => {
            // peer-initiated departure: run lost-link recovery locally and
            // resolve without any firmware round trip
            let (peer, reason_code) = match *change {
                WmStatusChangeKind::Disassociated { peer, reason_code }
                | WmStatusChangeKind::Deauthenticated { peer, reason_code } => (peer, reason_code),
            };
            info!(
                vdev_id = ctx.vdev_id,
                peer = %peer,
                reason_code,
                "lost link: peer-initiated {:?}",
                change
            );
            let profile = ctx.profile.take();
            ctx.set_state(RoamState::Idle);
            ctx.set_substate(RoamSubstate::None);
            Activation::Complete(
                RoamStatus::Success,
                RoamResult::LostLink,
                RoamInfo {
                    peer: Some(peer),
                    profile,
                    reason_code: Some(reason_code),
                    ..Default::default()
                },
            )
        }
        RoamCommandKind::GetDisconnectStats { peer } => {
            // inherently concurrent, no vdev state transition
            Activation::Issue(FirmwareRequest::GetDisconnectStatsReq {
                vdev_id: cmd.vdev_id,
                peer: *peer,
            })
        }
        RoamCommandKind::SetHwMode { hw_mode_index } => Activation::Issue(
            FirmwareRequest::SetHwModeReq {
                vdev_id: cmd.vdev_id,
                hw_mode_index: *hw_mode_index,
            },
        ),
        RoamCommandKind::NssUpdate { new_nss } => Activation::Issue(FirmwareRequest::NssUpdateReq {
            vdev_id: cmd.vdev_id,
            new_nss: *new_nss,
        }),
        RoamCommandKind::SetAntennaMode {
            num_tx_chains,
            num_rx_chains,
        } => Activation::Issue(FirmwareRequest::SetAntennaModeReq {
            vdev_id: cmd.vdev_id,
            num_tx_chains: *num_tx_chains,
            num_rx_chains: *num_rx_chains,
        }),
    }
}

/// Apply the state transition for a firmware response completing the given
/// active command, and derive the roam-complete disposition.
pub fn apply_response(
    ctx: &mut VdevRoamContext,
    cmd: &RoamCommand,
    status: FirmwareStatus,
    stats: Option<DisconnectStats>,
) -> (RoamStatus, RoamResult, RoamInfo) {
    let ok = status.is_success();
    match &cmd.kind {
        RoamCommandKind::StartBss(profile) => {
            if ok {
                ctx.set_state(RoamState::Joined);
                ctx.set_substate(RoamSubstate::None);
                (
                    RoamStatus::Success,
                    RoamResult::StartBssSuccess,
                    RoamInfo {
                        profile: Some(profile.clone()),
                        ..Default::default()
                    },
                )
            } else {
                ctx.profile = None;
                ctx.set_state(RoamState::Idle);
                ctx.set_substate(RoamSubstate::None);
                (
                    RoamStatus::Failure,
                    RoamResult::StartBssFailure,
                    RoamInfo {
                        profile: Some(profile.clone()),
                        ..Default::default()
                    },
                )
            }
        }
        RoamCommandKind::StopBss => {
            ctx.profile = None;
            ctx.set_state(RoamState::Idle);
            ctx.set_substate(RoamSubstate::None);
            if ok {
                (RoamStatus::Success, RoamResult::StopBssSuccess, RoamInfo::default())
            } else {
                (RoamStatus::Failure, RoamResult::StopBssFailure, RoamInfo::default())
            }
        }
        RoamCommandKind::ForcedDisassocSta { peer, reason_code } => {
            settle_after_peer_disconnect(ctx);
            (
                if ok { RoamStatus::Success } else { RoamStatus::Failure },
                RoamResult::ForcedDisassoc,
                RoamInfo {
                    peer: Some(*peer),
                    reason_code: Some(*reason_code),
                    ..Default::default()
                },
            )
        }
        RoamCommandKind::ForcedDeauthSta { peer, reason_code } => {
            settle_after_peer_disconnect(ctx);
            (
                if ok { RoamStatus::Success } else { RoamStatus::Failure },
                RoamResult::ForcedDeauth,
                RoamInfo {
                    peer: Some(*peer),
                    reason_code: Some(*reason_code),
                    ..Default::default()
                },
            )
        }
        RoamCommandKind::WmStatusChange(_) => {
            // resolved locally at activation; a response should never reach
            // this path
            debug!(vdev_id = ctx.vdev_id, "spurious response for WmStatusChange");
            (RoamStatus::Success, RoamResult::LostLink, RoamInfo::default())
        }
        RoamCommandKind::GetDisconnectStats { peer } => (
            if ok { RoamStatus::Success } else { RoamStatus::Failure },
            RoamResult::DisconnectStatsReady,
            RoamInfo {
                peer: Some(*peer),
                disconnect_stats: stats,
                ..Default::default()
            },
        ),
        RoamCommandKind::SetHwMode { .. } => (
            if ok { RoamStatus::Success } else { RoamStatus::Failure },
            RoamResult::HwModeChanged,
            RoamInfo::default(),
        ),
        RoamCommandKind::NssUpdate { .. } => (
            if ok { RoamStatus::Success } else { RoamStatus::Failure },
            RoamResult::NssUpdated,
            RoamInfo::default(),
        ),
        RoamCommandKind::SetAntennaMode { .. } => (
            if ok { RoamStatus::Success } else { RoamStatus::Failure },
            RoamResult::AntennaModeSet,
            RoamInfo::default(),
        ),
    }
}

/// Force-complete an active command that exhausted its timeout budget.
/// Leaves the vdev in a settled state so the queue can move on.
pub fn apply_timeout(ctx: &mut VdevRoamContext, cmd: &RoamCommand) -> (RoamStatus, RoamResult, RoamInfo) {
    let result = match &cmd.kind {
        RoamCommandKind::StartBss(_) => {
            ctx.profile = None;
            ctx.set_state(RoamState::Idle);
            ctx.set_substate(RoamSubstate::None);
            RoamResult::StartBssFailure
        }
        RoamCommandKind::StopBss => {
            ctx.profile = None;
            ctx.set_state(RoamState::Idle);
            ctx.set_substate(RoamSubstate::None);
            RoamResult::StopBssFailure
        }
        RoamCommandKind::ForcedDisassocSta { .. } => {
            settle_after_peer_disconnect(ctx);
            RoamResult::ForcedDisassoc
        }
        RoamCommandKind::ForcedDeauthSta { .. } => {
            settle_after_peer_disconnect(ctx);
            RoamResult::ForcedDeauth
        }
        RoamCommandKind::WmStatusChange(_) => RoamResult::LostLink,
        RoamCommandKind::GetDisconnectStats { .. } => RoamResult::DisconnectStatsReady,
        RoamCommandKind::SetHwMode { .. } => RoamResult::HwModeChanged,
        RoamCommandKind::NssUpdate { .. } => RoamResult::NssUpdated,
        RoamCommandKind::SetAntennaMode { .. } => RoamResult::AntennaModeSet,
    };
    (
        RoamStatus::Timeout,
        result,
        RoamInfo {
            peer: cmd.kind.peer_mac(),
            ..Default::default()
        },
    )
}

/// After a forced peer disconnect resolves, the vdev either still hosts a
/// BSS (AP case) or has nothing joined anymore.
fn settle_after_peer_disconnect(ctx: &mut VdevRoamContext) {
    let state = if ctx.profile.is_some() {
        RoamState::Joined
    } else {
        RoamState::Idle
    };
    ctx.set_state(state);
    ctx.set_substate(RoamSubstate::None);
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::command::RoamCommand;
    use tokio::time::Duration;

    fn corpnet_profile() -> ConnectionProfile {
        ConnectionProfile {
            ssid: "corpnet".to_string(),
            bssid: None,
            security: SecurityMode::Wpa2Personal,
            channel_freq: 5180,
        }
    }

    fn start_bss_cmd(vdev_id: u8) -> RoamCommand {
        RoamCommand::new(
            0x0D000001,
            vdev_id,
            RoamCommandKind::StartBss(corpnet_profile()),
            false,
            Duration::from_secs(30),
        )
    }

    // Successful connect walks Idle -> Joining(StartBssReq) -> Joined
    #[test]
    fn test_start_bss_success_state_sequence() {
        let mut ctx = VdevRoamContext::new(0);
        ctx.activate_session();
        assert_eq!(ctx.state, RoamState::Idle);

        let cmd = start_bss_cmd(0);
        match apply_activation(&mut ctx, &cmd) {
            Activation::Issue(FirmwareRequest::StartBssReq { vdev_id, .. }) => {
                assert_eq!(vdev_id, 0)
            }
            _ => panic!("expected START_BSS_REQ issuance"),
        }
        assert_eq!(ctx.state, RoamState::Joining);
        assert_eq!(ctx.substate, RoamSubstate::StartBssReq);

        let (status, result, info) =
            apply_response(&mut ctx, &cmd, FirmwareStatus::Success, None);
        assert_eq!(status, RoamStatus::Success);
        assert_eq!(result, RoamResult::StartBssSuccess);
        assert_eq!(info.profile.unwrap().ssid, "corpnet");
        assert_eq!(ctx.state, RoamState::Joined);
        assert_eq!(ctx.substate, RoamSubstate::None);
    }

    // Firmware rejection drops the vdev back to Idle with StartBssFailure
    #[test]
    fn test_start_bss_failure_returns_to_idle() {
        let mut ctx = VdevRoamContext::new(0);
        ctx.activate_session();

        let cmd = start_bss_cmd(0);
        let _ = apply_activation(&mut ctx, &cmd);
        let (status, result, _) =
            apply_response(&mut ctx, &cmd, FirmwareStatus::Failure(1), None);

        assert_eq!(status, RoamStatus::Failure);
        assert_eq!(result, RoamResult::StartBssFailure);
        assert_eq!(ctx.state, RoamState::Idle);
        assert!(ctx.profile.is_none());
    }

    // While waiting for key installation a new connect is rejected locally
    #[test]
    fn test_wait_for_key_gates_connect() {
        let mut ctx = VdevRoamContext::new(1);
        ctx.activate_session();
        ctx.start_wait_for_key(Duration::from_secs(10));

        let cmd = start_bss_cmd(1);
        match apply_activation(&mut ctx, &cmd) {
            Activation::Complete(status, result, _) => {
                assert_eq!(status, RoamStatus::Failure);
                assert_eq!(result, RoamResult::StartBssFailure);
            }
            Activation::Issue(_) => panic!("connect must not proceed during WaitForKey"),
        }
    }

    // Key installation lifts the gate; expiry does the same via the timer
    #[test]
    fn test_wait_for_key_exit_paths() {
        let mut ctx = VdevRoamContext::new(1);
        ctx.activate_session();

        ctx.start_wait_for_key(Duration::from_secs(10));
        assert!(ctx.is_waiting_for_key());
        ctx.key_installed();
        assert!(!ctx.is_waiting_for_key());

        ctx.start_wait_for_key(Duration::from_millis(0));
        assert!(ctx.expire_wait_for_key(Instant::now()));
        assert!(!ctx.is_waiting_for_key());
    }

    // Forced disassoc on an AP vdev holding a BSS settles back to Joined
    #[test]
    fn test_forced_disassoc_keeps_ap_joined() {
        let mut ctx = VdevRoamContext::new(2);
        ctx.activate_session();
        ctx.profile = Some(corpnet_profile());
        ctx.set_state(RoamState::Joined);

        let peer = MacAddr::new(0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF);
        let cmd = RoamCommand::new(
            0x0D000002,
            2,
            RoamCommandKind::ForcedDisassocSta {
                peer,
                reason_code: 1,
            },
            false,
            Duration::from_secs(90),
        );
        let _ = apply_activation(&mut ctx, &cmd);
        assert_eq!(ctx.substate, RoamSubstate::DisassocReq);

        let (status, result, info) =
            apply_response(&mut ctx, &cmd, FirmwareStatus::Success, None);
        assert_eq!(status, RoamStatus::Success);
        assert_eq!(result, RoamResult::ForcedDisassoc);
        assert_eq!(info.peer, Some(peer));
        assert_eq!(ctx.state, RoamState::Joined);
    }

    // Lost-link processing resolves locally without a firmware request
    #[test]
    fn test_wm_status_change_resolves_locally() {
        let mut ctx = VdevRoamContext::new(0);
        ctx.activate_session();
        ctx.profile = Some(corpnet_profile());
        ctx.set_state(RoamState::Joined);

        let peer = MacAddr::new(0x00, 0x11, 0x22, 0x33, 0x44, 0x55);
        let cmd = RoamCommand::new(
            0x0D000003,
            0,
            RoamCommandKind::WmStatusChange(WmStatusChangeKind::Deauthenticated {
                peer,
                reason_code: 7,
            }),
            false,
            Duration::from_secs(90),
        );
        match apply_activation(&mut ctx, &cmd) {
            Activation::Complete(status, result, info) => {
                assert_eq!(status, RoamStatus::Success);
                assert_eq!(result, RoamResult::LostLink);
                assert_eq!(info.peer, Some(peer));
                assert_eq!(info.reason_code, Some(7));
            }
            Activation::Issue(_) => panic!("lost link must not emit a firmware request"),
        }
        assert_eq!(ctx.state, RoamState::Idle);
        assert!(ctx.profile.is_none());
    }
}
