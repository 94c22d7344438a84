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
use indexmap::IndexMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio::time::{interval, Duration, Instant};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::channel_list::{build_channel_list, ChannelListPolicy, RegulatoryChannel};
use crate::command::{CommandPool, RoamCommand, RoamCommandKind, RoamError};
use crate::command_id_generator::CommandIdGenerator;
use crate::firmware::{FirmwareRequest, FirmwareTransport};
use crate::next_task_id;
use crate::roam_state::{
    apply_activation, apply_timeout, Activation, RoamCompleteEvent, RoamInfo, RoamResult,
    RoamState, RoamStatus, RoamSubstate, VdevRoamContext,
};
use crate::serialization::{Enqueued, SerializationEngine};

/// Tunable budgets and capacities. Defaults match the driver's shipped
/// constants; tests shrink them.
#[derive(Debug, Clone)]
pub struct RoamConfig {
    /// Total outstanding commands across all vdevs.
    pub command_pool_size: usize,
    /// Period of the active-list timeout scan.
    pub timeout_tick_interval: Duration,
    /// Baseline budget for commands without a dedicated category.
    pub active_list_timeout: Duration,
    /// Forced disassoc/deauth and lost-link handling.
    pub peer_disconnect_timeout: Duration,
    /// hw-mode / nss-update / antenna-mode commands.
    pub policy_mgr_timeout: Duration,
    /// Disconnect-stats queries.
    pub disconnect_stats_timeout: Duration,
    /// Budget for key installation after authentication.
    pub wait_for_key_timeout: Duration,
}

impl Default for RoamConfig {
    fn default() -> Self {
        Self {
            command_pool_size: 32,
            timeout_tick_interval: Duration::from_secs(1),
            active_list_timeout: Duration::from_secs(30),
            peer_disconnect_timeout: Duration::from_secs(45),
            policy_mgr_timeout: Duration::from_secs(120),
            disconnect_stats_timeout: Duration::from_secs(5),
            wait_for_key_timeout: Duration::from_secs(10),
        }
    }
}

impl RoamConfig {
    pub fn timeout_for(&self, kind: &RoamCommandKind) -> Duration {
        match kind {
            RoamCommandKind::ForcedDisassocSta { .. }
            | RoamCommandKind::ForcedDeauthSta { .. }
            | RoamCommandKind::WmStatusChange(_) => self.peer_disconnect_timeout,
            RoamCommandKind::SetHwMode { .. }
            | RoamCommandKind::NssUpdate { .. }
            | RoamCommandKind::SetAntennaMode { .. } => self.policy_mgr_timeout,
            RoamCommandKind::GetDisconnectStats { .. } => self.disconnect_stats_timeout,
            _ => self.active_list_timeout,
        }
    }
}

pub(crate) struct Inner {
    pub(crate) pool: CommandPool,
    pub(crate) engine: SerializationEngine,
    pub(crate) contexts: IndexMap<u8, VdevRoamContext>,
}

/// One roam-subsystem instance: the single lock over queues and per-vdev
/// contexts, the command pool, the firmware transport seam and the
/// roam-complete event channel. No process-wide state; everything hangs
/// off this handle.
pub struct RoamSubsystem {
    pub(crate) inner: Arc<Mutex<Inner>>,
    pub(crate) command_ids: CommandIdGenerator,
    pub(crate) transport: Arc<dyn FirmwareTransport>,
    pub(crate) events: mpsc::UnboundedSender<RoamCompleteEvent>,
    pub(crate) config: RoamConfig,
    _join_set: JoinSet<()>,
}

impl RoamSubsystem {
    /// Create the subsystem and its roam-complete event stream. Spawns the
    /// timeout worker that scans the active lists on every tick.
    pub fn new(
        config: RoamConfig,
        transport: Arc<dyn FirmwareTransport>,
    ) -> (Self, mpsc::UnboundedReceiver<RoamCompleteEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(Mutex::new(Inner {
            pool: CommandPool::new(config.command_pool_size),
            engine: SerializationEngine::new(),
            contexts: IndexMap::new(),
        }));

        let mut join_set = JoinSet::new();
        join_set.spawn(timeout_worker(
            Arc::clone(&inner),
            Arc::clone(&transport),
            events_tx.clone(),
            config.timeout_tick_interval,
        ));

        info!(
            pool = config.command_pool_size,
            tick = ?config.timeout_tick_interval,
            "roam subsystem initialized"
        );

        (
            Self {
                inner,
                command_ids: CommandIdGenerator::new(),
                transport,
                events: events_tx,
                config,
                _join_set: join_set,
            },
            events_rx,
        )
    }

    /// Open a vdev session. The context starts in `Stop` and is activated
    /// to `Idle` immediately.
    pub async fn open_vdev(&self, vdev_id: u8) {
        let mut inner = self.inner.lock().await;
        if inner.contexts.contains_key(&vdev_id) {
            warn!(vdev_id, "vdev session already open");
            return;
        }
        let mut ctx = VdevRoamContext::new(vdev_id);
        ctx.activate_session();
        inner.contexts.insert(vdev_id, ctx);
        info!(vdev_id, "vdev session opened");
    }

    /// Tear down a vdev session: synchronously purge every command the
    /// vdev owns (no firmware or result path runs for them), then drop the
    /// context. After this returns no trace of the vdev remains.
    pub async fn close_vdev(&self, vdev_id: u8) -> Result<(), RoamError> {
        let mut inner = self.inner.lock().await;
        if !inner.contexts.contains_key(&vdev_id) {
            return Err(RoamError::InvalidSession(vdev_id));
        }

        let purged = inner.engine.cancel_vdev(vdev_id);
        for cmd in &purged {
            trace!(
                vdev_id,
                command_id = format!("{:#010X}", cmd.command_id),
                kind = cmd.kind.label(),
                "command purged on session teardown"
            );
            inner.pool.release();
        }

        if let Some(mut ctx) = inner.contexts.swap_remove(&vdev_id) {
            ctx.set_state(RoamState::Stop);
        }
        info!(vdev_id, purged = purged.len(), "vdev session closed");
        Ok(())
    }

    /// Submit a command. Never blocks on firmware: the call returns as
    /// soon as the command is queued (or resolved locally); completion
    /// arrives later on the event channel as exactly one
    /// `RoamCompleteEvent` carrying the returned roam id.
    pub async fn submit(
        &self,
        vdev_id: u8,
        kind: RoamCommandKind,
        high_priority: bool,
    ) -> Result<u32, RoamError> {
        let mut inner = self.inner.lock().await;
        if !inner.contexts.contains_key(&vdev_id) {
            return Err(RoamError::InvalidSession(vdev_id));
        }
        let now = Instant::now();

        // duplicate forced-disconnect suppression: an in-flight
        // disassoc/deauth for the same peer makes this submission an
        // idempotent no-op success
        if kind.is_peer_disconnect() {
            if let Some(peer) = kind.peer_mac() {
                if inner.engine.has_peer_disconnect_in_flight(vdev_id, peer) {
                    let roam_id = self.command_ids.next_id();
                    debug!(
                        vdev_id,
                        peer = %peer,
                        "deauth/disassoc already in progress, dropping duplicate"
                    );
                    let _ = self.events.send(RoamCompleteEvent {
                        vdev_id,
                        roam_id,
                        status: RoamStatus::Success,
                        result: RoamResult::AlreadyInProgress,
                        roam_info: RoamInfo {
                            peer: Some(peer),
                            ..Default::default()
                        },
                    });
                    return Ok(roam_id);
                }
            }
        }

        // a forced disconnect first snapshots the peer's stats; failure to
        // queue the query never blocks the disconnect itself
        if matches!(
            kind,
            RoamCommandKind::ForcedDisassocSta { .. } | RoamCommandKind::ForcedDeauthSta { .. }
        ) {
            if let Some(peer) = kind.peer_mac() {
                if let Err(e) = self.queue_command(
                    &mut inner,
                    vdev_id,
                    RoamCommandKind::GetDisconnectStats { peer },
                    true,
                    now,
                ) {
                    error!(vdev_id, "fail to queue get disconnect stats: {e}");
                }
            }
        }

        self.queue_command(&mut inner, vdev_id, kind, high_priority, now)
    }

    pub(crate) fn queue_command(
        &self,
        inner: &mut Inner,
        vdev_id: u8,
        kind: RoamCommandKind,
        high_priority: bool,
        now: Instant,
    ) -> Result<u32, RoamError> {
        inner.pool.acquire()?;

        let roam_id = self.command_ids.next_id();
        let timeout = self.config.timeout_for(&kind);
        let cmd = RoamCommand::new(roam_id, vdev_id, kind, high_priority, timeout);

        if let Some(ctx) = inner.contexts.get_mut(&vdev_id) {
            ctx.pending_commands += 1;
        }

        debug!(
            vdev_id,
            roam_id = format!("{roam_id:#010X}"),
            kind = cmd.kind.label(),
            high_priority,
            "command submitted"
        );

        match inner.engine.enqueue(cmd, now) {
            Enqueued::Activated(active) => {
                activate_and_issue(inner, &self.transport, &self.events, active, now);
            }
            Enqueued::Pending => {}
        }
        Ok(roam_id)
    }

    /// Post the ordered scan/roam channel list to firmware. Not a
    /// serialized command: the update is fire-and-forget.
    pub async fn update_channel_list(
        &self,
        base_channels: &[RegulatoryChannel],
        policy: &ChannelListPolicy,
    ) -> anyhow::Result<usize> {
        let channels = build_channel_list(base_channels, policy);
        let count = channels.len();
        info!(count, "posting channel list update to firmware");
        self.transport
            .send_request(FirmwareRequest::UpdateChannelListReq { channels })?;
        Ok(count)
    }

    /// Enter `WaitForKey` after a successful authentication. Until the key
    /// is installed (or the budget expires), connects on this vdev are
    /// gated.
    pub async fn start_wait_for_key(&self, vdev_id: u8) -> Result<(), RoamError> {
        let mut inner = self.inner.lock().await;
        let budget = self.config.wait_for_key_timeout;
        match inner.contexts.get_mut(&vdev_id) {
            Some(ctx) => {
                ctx.start_wait_for_key(budget);
                Ok(())
            }
            None => Err(RoamError::InvalidSession(vdev_id)),
        }
    }

    /// Key installation finished; lift the connect gate.
    pub async fn key_installed(&self, vdev_id: u8) -> Result<(), RoamError> {
        let mut inner = self.inner.lock().await;
        match inner.contexts.get_mut(&vdev_id) {
            Some(ctx) => {
                ctx.key_installed();
                Ok(())
            }
            None => Err(RoamError::InvalidSession(vdev_id)),
        }
    }

    /// Current state/substate of a vdev, if its session is open.
    pub async fn vdev_state(&self, vdev_id: u8) -> Option<(RoamState, RoamSubstate)> {
        let inner = self.inner.lock().await;
        inner
            .contexts
            .get(&vdev_id)
            .map(|ctx| (ctx.state, ctx.substate))
    }

    /// Commands a vdev currently owns, active and pending combined. None
    /// when the session is not open.
    pub async fn vdev_command_count(&self, vdev_id: u8) -> Option<usize> {
        let inner = self.inner.lock().await;
        inner
            .contexts
            .get(&vdev_id)
            .map(|ctx| ctx.pending_commands)
    }

    /// Number of exclusive active commands for a vdev (0 or 1).
    pub async fn exclusive_active_count(&self, vdev_id: u8) -> usize {
        let inner = self.inner.lock().await;
        inner.engine.exclusive_active_count(vdev_id)
    }

    /// Commands currently held by the subsystem, across all vdevs.
    pub async fn outstanding_commands(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.pool.outstanding()
    }
}

/// Promote a command into execution: apply its state transition and hand
/// the mapped request to the firmware transport. Locally resolved commands
/// (and transport failures) complete immediately instead.
pub(crate) fn activate_and_issue(
    inner: &mut Inner,
    transport: &Arc<dyn FirmwareTransport>,
    events: &mpsc::UnboundedSender<RoamCompleteEvent>,
    cmd: RoamCommand,
    now: Instant,
) {
    let Some(ctx) = inner.contexts.get_mut(&cmd.vdev_id) else {
        // context disappeared between queueing and activation; drop the
        // command without a result path
        warn!(
            vdev_id = cmd.vdev_id,
            "activation for vdev without context, releasing command"
        );
        if inner.engine.complete(cmd.vdev_id, cmd.command_id, now).is_some() {
            inner.pool.release();
        }
        return;
    };

    match apply_activation(ctx, &cmd) {
        Activation::Issue(request) => {
            trace!(
                vdev_id = cmd.vdev_id,
                command_id = format!("{:#010X}", cmd.command_id),
                request = request.label(),
                "issuing firmware request"
            );
            if let Err(e) = transport.send_request(request) {
                error!(
                    vdev_id = cmd.vdev_id,
                    "failed to send firmware request: {e:?}"
                );
                // resolve as a failure so the vdev queue cannot wedge
                let (_, result, info) = apply_timeout(ctx, &cmd);
                finish_command(
                    inner,
                    transport,
                    events,
                    &cmd,
                    RoamStatus::Failure,
                    result,
                    info,
                    now,
                );
            }
        }
        Activation::Complete(status, result, info) => {
            finish_command(inner, transport, events, &cmd, status, result, info, now);
        }
    }
}

/// Terminal completion: release the command, deliver exactly one
/// roam-complete event and issue whatever the promotion pulled in.
#[allow(clippy::too_many_arguments)]
pub(crate) fn finish_command(
    inner: &mut Inner,
    transport: &Arc<dyn FirmwareTransport>,
    events: &mpsc::UnboundedSender<RoamCompleteEvent>,
    cmd: &RoamCommand,
    status: RoamStatus,
    result: RoamResult,
    roam_info: RoamInfo,
    now: Instant,
) {
    let Some((removed, promoted)) = inner.engine.complete(cmd.vdev_id, cmd.command_id, now) else {
        // the other racing path got here first
        debug!(
            vdev_id = cmd.vdev_id,
            command_id = format!("{:#010X}", cmd.command_id),
            "command already completed elsewhere"
        );
        return;
    };

    inner.pool.release();
    if let Some(ctx) = inner.contexts.get_mut(&removed.vdev_id) {
        ctx.pending_commands = ctx.pending_commands.saturating_sub(1);
    }

    debug!(
        vdev_id = removed.vdev_id,
        roam_id = format!("{:#010X}", removed.command_id),
        kind = removed.kind.label(),
        status = ?status,
        result = ?result,
        "roam command complete"
    );
    let _ = events.send(RoamCompleteEvent {
        vdev_id: removed.vdev_id,
        roam_id: removed.command_id,
        status,
        result,
        roam_info,
    });

    if let Some(next) = promoted {
        activate_and_issue(inner, transport, events, next, now);
    }
}

/// Periodic scan of the active lists. Whatever exceeded its budget is
/// force-completed with `Timeout`, unblocking the vdev's queue; the
/// wait-for-key gate is aged out here as well.
#[instrument(skip_all, name = "roam_timeout_worker", fields(task = next_task_id()))]
async fn timeout_worker(
    inner: Arc<Mutex<Inner>>,
    transport: Arc<dyn FirmwareTransport>,
    events: mpsc::UnboundedSender<RoamCompleteEvent>,
    tick: Duration,
) {
    let mut ticker = interval(tick);

    loop {
        ticker.tick().await;

        let mut inner = inner.lock().await;
        let now = Instant::now();

        let (expired, promoted) = inner.engine.expire(now);
        for cmd in expired {
            inner.pool.release();
            if let Some(ctx) = inner.contexts.get_mut(&cmd.vdev_id) {
                ctx.pending_commands = ctx.pending_commands.saturating_sub(1);
                let (status, result, roam_info) = apply_timeout(ctx, &cmd);
                let _ = events.send(RoamCompleteEvent {
                    vdev_id: cmd.vdev_id,
                    roam_id: cmd.command_id,
                    status,
                    result,
                    roam_info,
                });
            }
        }
        for cmd in promoted {
            activate_and_issue(&mut inner, &transport, &events, cmd, now);
        }

        for ctx in inner.contexts.values_mut() {
            let _ = ctx.expire_wait_for_key(now);
        }
    }
}
