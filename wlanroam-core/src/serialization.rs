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
use pnet::datalink::MacAddr;
use std::collections::VecDeque;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::command::RoamCommand;

/// Where an admitted command landed.
#[derive(Debug, PartialEq)]
pub enum Enqueued {
    /// Promoted straight to active; the returned copy is what the caller
    /// must issue to firmware.
    Activated(RoamCommand),
    Pending,
}

#[derive(Debug, Default)]
struct VdevQueues {
    /// The single exclusive active command for this vdev.
    active: Option<RoamCommand>,
    /// Concurrently active non-blocking commands (stats queries).
    active_concurrent: Vec<RoamCommand>,
    pending: VecDeque<RoamCommand>,
}

impl VdevQueues {
    fn is_empty(&self) -> bool {
        self.active.is_none() && self.active_concurrent.is_empty() && self.pending.is_empty()
    }
}

/// Per-vdev active/pending command queues. Admission enforces at most one
/// exclusive active command per vdev; distinct vdevs proceed in parallel.
/// Not internally synchronized: the owning subsystem serializes access
/// under its state lock.
#[derive(Debug, Default)]
pub struct SerializationEngine {
    queues: IndexMap<u8, VdevQueues>,
}

impl SerializationEngine {
    pub fn new() -> Self {
        Self {
            queues: IndexMap::new(),
        }
    }

    /// Admit a command. Non-blocking kinds and commands arriving on an
    /// idle vdev activate immediately; everything else queues, at the
    /// front when marked high priority.
    pub fn enqueue(&mut self, mut cmd: RoamCommand, now: Instant) -> Enqueued {
        let queues = self.queues.entry(cmd.vdev_id).or_default();

        if !cmd.kind.is_blocking() {
            cmd.activated_at = Some(now);
            trace!(
                vdev_id = cmd.vdev_id,
                command_id = format!("{:#010X}", cmd.command_id),
                kind = cmd.kind.label(),
                "non-blocking command activated"
            );
            queues.active_concurrent.push(cmd.clone());
            return Enqueued::Activated(cmd);
        }

        if queues.active.is_none() {
            cmd.activated_at = Some(now);
            debug!(
                vdev_id = cmd.vdev_id,
                command_id = format!("{:#010X}", cmd.command_id),
                kind = cmd.kind.label(),
                "command activated"
            );
            queues.active = Some(cmd.clone());
            return Enqueued::Activated(cmd);
        }

        debug!(
            vdev_id = cmd.vdev_id,
            command_id = format!("{:#010X}", cmd.command_id),
            kind = cmd.kind.label(),
            high_priority = cmd.high_priority,
            "command queued as pending"
        );
        if cmd.high_priority {
            queues.pending.push_front(cmd);
        } else {
            queues.pending.push_back(cmd);
        }
        Enqueued::Pending
    }

    /// Remove a completed command from the active lists and promote the
    /// next eligible pending command. Unknown ids are a logged anomaly.
    pub fn complete(
        &mut self,
        vdev_id: u8,
        command_id: u32,
        now: Instant,
    ) -> Option<(RoamCommand, Option<RoamCommand>)> {
        let queues = match self.queues.get_mut(&vdev_id) {
            Some(q) => q,
            None => {
                warn!(vdev_id, "complete for vdev with no queues");
                return None;
            }
        };

        let removed = if queues
            .active
            .as_ref()
            .is_some_and(|c| c.command_id == command_id)
        {
            queues.active.take()
        } else if let Some(pos) = queues
            .active_concurrent
            .iter()
            .position(|c| c.command_id == command_id)
        {
            Some(queues.active_concurrent.remove(pos))
        } else {
            None
        };

        let removed = match removed {
            Some(cmd) => cmd,
            None => {
                // normal when a timeout and a response race on the same
                // command: the loser finds nothing to complete
                warn!(
                    vdev_id,
                    command_id = format!("{command_id:#010X}"),
                    "complete for unknown command id"
                );
                return None;
            }
        };

        let promoted = if removed.kind.is_blocking() {
            queues.pending.pop_front().map(|mut next| {
                next.activated_at = Some(now);
                debug!(
                    vdev_id,
                    command_id = format!("{:#010X}", next.command_id),
                    kind = next.kind.label(),
                    "pending command promoted to active"
                );
                queues.active = Some(next.clone());
                next
            })
        } else {
            None
        };

        if queues.is_empty() {
            self.queues.swap_remove(&vdev_id);
        }

        Some((removed, promoted))
    }

    /// Synchronously purge every command belonging to a vdev. Used for
    /// session teardown: after this returns, no command for the vdev
    /// exists in any queue.
    pub fn cancel_vdev(&mut self, vdev_id: u8) -> Vec<RoamCommand> {
        let Some(queues) = self.queues.swap_remove(&vdev_id) else {
            return Vec::new();
        };

        let mut purged = Vec::new();
        purged.extend(queues.active);
        purged.extend(queues.active_concurrent);
        purged.extend(queues.pending);

        debug!(vdev_id, purged = purged.len(), "vdev command queues purged");
        purged
    }

    /// Force-complete every active command whose timeout budget elapsed.
    /// Promotions triggered by an expiry are returned so the caller can
    /// issue them.
    pub fn expire(&mut self, now: Instant) -> (Vec<RoamCommand>, Vec<RoamCommand>) {
        let mut expired_keys: Vec<(u8, u32)> = Vec::new();
        for (vdev_id, queues) in &self.queues {
            if let Some(cmd) = &queues.active {
                if cmd.expired(now) {
                    expired_keys.push((*vdev_id, cmd.command_id));
                }
            }
            for cmd in &queues.active_concurrent {
                if cmd.expired(now) {
                    expired_keys.push((*vdev_id, cmd.command_id));
                }
            }
        }

        let mut expired = Vec::new();
        let mut promoted = Vec::new();
        for (vdev_id, command_id) in expired_keys {
            warn!(
                vdev_id,
                command_id = format!("{command_id:#010X}"),
                "active command timed out"
            );
            if let Some((cmd, next)) = self.complete(vdev_id, command_id, now) {
                expired.push(cmd);
                promoted.extend(next);
            }
        }
        (expired, promoted)
    }

    /// Dedup scan: is a forced disassoc/deauth or lost-link command for
    /// this `(vdev, peer)` already active or pending?
    pub fn has_peer_disconnect_in_flight(&self, vdev_id: u8, peer: MacAddr) -> bool {
        let Some(queues) = self.queues.get(&vdev_id) else {
            return false;
        };

        queues
            .active
            .iter()
            .chain(queues.active_concurrent.iter())
            .chain(queues.pending.iter())
            .any(|cmd| cmd.matches_peer_disconnect(vdev_id, peer))
    }

    /// The exclusive active command for a vdev, if any.
    pub fn active_command(&self, vdev_id: u8) -> Option<&RoamCommand> {
        self.queues.get(&vdev_id)?.active.as_ref()
    }

    /// Find an active command (exclusive or concurrent) by predicate.
    pub fn find_active(
        &self,
        vdev_id: u8,
        mut pred: impl FnMut(&RoamCommand) -> bool,
    ) -> Option<&RoamCommand> {
        let queues = self.queues.get(&vdev_id)?;
        queues
            .active
            .iter()
            .chain(queues.active_concurrent.iter())
            .find(|cmd| pred(cmd))
    }

    /// Number of exclusive active commands for a vdev (0 or 1 by
    /// construction).
    pub fn exclusive_active_count(&self, vdev_id: u8) -> usize {
        usize::from(
            self.queues
                .get(&vdev_id)
                .is_some_and(|q| q.active.is_some()),
        )
    }

    pub fn pending_count(&self, vdev_id: u8) -> usize {
        self.queues.get(&vdev_id).map_or(0, |q| q.pending.len())
    }

    pub fn total_commands(&self) -> usize {
        self.queues
            .values()
            .map(|q| {
                usize::from(q.active.is_some()) + q.active_concurrent.len() + q.pending.len()
            })
            .sum()
    }
}
