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
use tracing::debug;

/// Upper bound on the channel list handed to firmware.
pub const MAX_CHANNEL_LIST_LEN: usize = 104;

/// Regulatory power caps for 2.4 GHz channels 12/13 under the FCC
/// constraint regime.
const MAX_PWR_FCC_CHAN_12: i8 = 8;
const MAX_PWR_FCC_CHAN_13: i8 = 2;
const FCC_CHAN_12_FREQ: u32 = 2467;
const FCC_CHAN_13_FREQ: u32 = 2472;

/// Empirically evaluated frequency ordering based on enterprise Wi-Fi
/// deployments; the position in this table is the likelihood of finding an
/// AP on that channel. Treated as externally supplied policy data, not
/// derived here.
const FIXED_GREEDY_FREQ_LIST: [u32; 36] = [
    2412, 2437, 2462, 5180, 5240, 5200, 5220, 2457, 2417, 2452, 5745, 5785, 5805, 2422, 2427,
    2447, 5765, 5825, 2442, 2432, 5680, 5700, 5260, 5580, 5280, 5520, 5320, 5300, 5500, 5600,
    2472, 2484, 5560, 5660, 5755, 5775,
];

/// Regulatory availability of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disabled,
    Enabled,
    /// Radar-regulated: usable only after a channel availability check.
    Dfs,
}

/// One channel as provided by the regulatory/channel database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegulatoryChannel {
    pub freq: u32,
    pub max_power_dbm: i8,
    pub state: ChannelState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    Band2G,
    Band5G,
}

/// Channel selection and ordering policy for scan/roam.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelListPolicy {
    pub dfs_allowed: bool,
    pub prefer_5ghz: bool,
    pub early_stop_enabled: bool,
    pub fcc_constraint: bool,
    /// 5 MHz platform mode.
    pub quarter_rate: bool,
    /// 10 MHz platform mode.
    pub half_rate: bool,
    pub skip_unsafe_channels: bool,
    /// Band the local SAP operates on; unsafe channels are only skipped in
    /// this band.
    pub sap_operating_band: Option<Band>,
    pub unsafe_freqs: Vec<u32>,
    /// Frequencies on which NAN operation is not permitted.
    pub nan_disabled_freqs: Vec<u32>,
    pub max_channels: usize,
}

impl Default for ChannelListPolicy {
    fn default() -> Self {
        Self {
            dfs_allowed: true,
            prefer_5ghz: false,
            early_stop_enabled: false,
            fcc_constraint: false,
            quarter_rate: false,
            half_rate: false,
            skip_unsafe_channels: false,
            sap_operating_band: None,
            unsafe_freqs: Vec::new(),
            nan_disabled_freqs: Vec::new(),
            max_channels: MAX_CHANNEL_LIST_LEN,
        }
    }
}

/// One entry of the ordered list handed to firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelEntry {
    pub freq: u32,
    pub power_dbm: i8,
    pub dfs: bool,
    pub quarter_rate: bool,
    pub half_rate: bool,
    pub nan_disabled: bool,
}

pub fn is_24ghz_freq(freq: u32) -> bool {
    (2412..=2484).contains(&freq)
}

pub fn is_5ghz_freq(freq: u32) -> bool {
    (5180..5850).contains(&freq)
}

/// Short-range/DSRC block; never scanned.
pub fn is_dsrc_freq(freq: u32) -> bool {
    (5850..=5925).contains(&freq)
}

pub fn band_of_freq(freq: u32) -> Option<Band> {
    if is_24ghz_freq(freq) {
        Some(Band::Band2G)
    } else if is_5ghz_freq(freq) {
        Some(Band::Band5G)
    } else {
        None
    }
}

/// Build the ordered scan/roam channel list from the regulatory base set
/// and the roaming policy. Pure and deterministic: identical inputs always
/// produce the identical ordered output.
pub fn build_channel_list(
    base_channels: &[RegulatoryChannel],
    policy: &ChannelListPolicy,
) -> Vec<ChannelEntry> {
    let mut entries: Vec<ChannelEntry> = Vec::with_capacity(base_channels.len());

    for chan in base_channels {
        if is_dsrc_freq(chan.freq) {
            debug!(freq = chan.freq, "skipping DSRC channel");
            continue;
        }
        match chan.state {
            ChannelState::Disabled => continue,
            ChannelState::Dfs if !policy.dfs_allowed => {
                debug!(freq = chan.freq, "skipping DFS channel");
                continue;
            }
            _ => {}
        }
        if policy.skip_unsafe_channels && is_unsafe_for_policy(chan.freq, policy) {
            debug!(freq = chan.freq, "ignoring unsafe channel");
            continue;
        }

        let mut power_dbm = chan.max_power_dbm;
        if policy.fcc_constraint {
            if chan.freq == FCC_CHAN_12_FREQ {
                power_dbm = MAX_PWR_FCC_CHAN_12;
            } else if chan.freq == FCC_CHAN_13_FREQ {
                power_dbm = MAX_PWR_FCC_CHAN_13;
            }
        }

        entries.push(ChannelEntry {
            freq: chan.freq,
            power_dbm,
            dfs: chan.state == ChannelState::Dfs,
            quarter_rate: policy.quarter_rate,
            half_rate: policy.half_rate,
            nan_disabled: policy.nan_disabled_freqs.contains(&chan.freq),
        });
    }

    if policy.early_stop_enabled {
        entries = sort_for_early_stop(entries);
    }
    if policy.prefer_5ghz {
        entries = arrange_for_5ghz_preference(entries, policy.dfs_allowed);
    }

    entries.truncate(policy.max_channels);
    entries
}

fn is_unsafe_for_policy(freq: u32, policy: &ChannelListPolicy) -> bool {
    if !policy.unsafe_freqs.contains(&freq) {
        return false;
    }
    // only skip when the channel shares a band with the operating SAP
    match policy.sap_operating_band {
        Some(band) => band_of_freq(freq) == Some(band),
        None => false,
    }
}

/// Put channels with the highest chance of hosting an AP first, so an
/// early-stop scan can terminate after the head of the list. Greedy
/// channels come out in the fixed table's order; everything else trails in
/// input order.
fn sort_for_early_stop(entries: Vec<ChannelEntry>) -> Vec<ChannelEntry> {
    let mut greedy: Vec<ChannelEntry> = Vec::with_capacity(entries.len());
    let mut non_greedy: Vec<ChannelEntry> = Vec::with_capacity(entries.len());

    for freq in FIXED_GREEDY_FREQ_LIST {
        if let Some(entry) = entries.iter().find(|e| e.freq == freq) {
            greedy.push(*entry);
        }
    }
    for entry in &entries {
        if !FIXED_GREEDY_FREQ_LIST.contains(&entry.freq) {
            non_greedy.push(*entry);
        }
    }

    debug!(
        greedy = greedy.len(),
        non_greedy = non_greedy.len(),
        total = entries.len(),
        "early-stop channel ordering applied"
    );

    greedy.extend(non_greedy);
    greedy
}

/// Reorder for 5 GHz preference: non-DFS 5 GHz first, then DFS channels if
/// DFS roaming is allowed (else the 2.4 GHz channels), then whatever
/// remains in its original relative order.
fn arrange_for_5ghz_preference(entries: Vec<ChannelEntry>, dfs_allowed: bool) -> Vec<ChannelEntry> {
    let mut arranged: Vec<ChannelEntry> = Vec::with_capacity(entries.len());
    let mut taken = vec![false; entries.len()];

    for (i, e) in entries.iter().enumerate() {
        if is_5ghz_freq(e.freq) && !e.dfs {
            arranged.push(*e);
            taken[i] = true;
        }
    }
    if dfs_allowed {
        for (i, e) in entries.iter().enumerate() {
            if !taken[i] && is_5ghz_freq(e.freq) {
                arranged.push(*e);
                taken[i] = true;
            }
        }
    } else {
        for (i, e) in entries.iter().enumerate() {
            if !taken[i] && is_24ghz_freq(e.freq) {
                arranged.push(*e);
                taken[i] = true;
            }
        }
    }
    for (i, e) in entries.iter().enumerate() {
        if !taken[i] {
            arranged.push(*e);
        }
    }

    arranged
}

#[cfg(test)]
pub mod tests {
    use super::*;

    fn reg(freq: u32, state: ChannelState) -> RegulatoryChannel {
        RegulatoryChannel {
            freq,
            max_power_dbm: 20,
            state,
        }
    }

    fn freqs(entries: &[ChannelEntry]) -> Vec<u32> {
        entries.iter().map(|e| e.freq).collect()
    }

    // Identical inputs always produce the identical ordered output
    #[test]
    fn test_build_is_deterministic() {
        let base = vec![
            reg(2412, ChannelState::Enabled),
            reg(5180, ChannelState::Enabled),
            reg(5260, ChannelState::Dfs),
            reg(2467, ChannelState::Enabled),
        ];
        let policy = ChannelListPolicy {
            prefer_5ghz: true,
            early_stop_enabled: true,
            fcc_constraint: true,
            ..Default::default()
        };

        let first = build_channel_list(&base, &policy);
        let second = build_channel_list(&base, &policy);
        assert_eq!(first, second);
    }

    // DSRC and regulatory-disabled channels never survive
    #[test]
    fn test_dsrc_and_disabled_channels_dropped() {
        let base = vec![
            reg(2412, ChannelState::Enabled),
            reg(5860, ChannelState::Enabled),
            reg(5220, ChannelState::Disabled),
        ];
        let out = build_channel_list(&base, &ChannelListPolicy::default());
        assert_eq!(freqs(&out), vec![2412]);
    }

    // dfs_allowed=false filters radar channels entirely
    #[test]
    fn test_dfs_channels_dropped_when_not_allowed() {
        let base = vec![
            reg(5180, ChannelState::Enabled),
            reg(5260, ChannelState::Dfs),
        ];
        let policy = ChannelListPolicy {
            dfs_allowed: false,
            ..Default::default()
        };
        let out = build_channel_list(&base, &policy);
        assert_eq!(freqs(&out), vec![5180]);
    }

    // FCC constraint caps tx power on channels 12 and 13 only
    #[test]
    fn test_fcc_constraint_power_overrides() {
        let base = vec![
            reg(2462, ChannelState::Enabled),
            reg(2467, ChannelState::Enabled),
            reg(2472, ChannelState::Enabled),
        ];
        let policy = ChannelListPolicy {
            fcc_constraint: true,
            ..Default::default()
        };
        let out = build_channel_list(&base, &policy);
        assert_eq!(out[0].power_dbm, 20);
        assert_eq!(out[1].power_dbm, MAX_PWR_FCC_CHAN_12);
        assert_eq!(out[2].power_dbm, MAX_PWR_FCC_CHAN_13);
    }

    // prefer_5ghz puts 5 GHz non-DFS channels ahead of 2.4 GHz
    #[test]
    fn test_prefer_5ghz_places_5180_before_2412() {
        let base = vec![
            reg(2412, ChannelState::Enabled),
            reg(5180, ChannelState::Enabled),
        ];
        let policy = ChannelListPolicy {
            prefer_5ghz: true,
            dfs_allowed: false,
            ..Default::default()
        };
        let out = build_channel_list(&base, &policy);
        assert_eq!(freqs(&out), vec![5180, 2412]);
    }

    // With DFS allowed, DFS channels slot between non-DFS 5 GHz and the rest
    #[test]
    fn test_prefer_5ghz_dfs_ordering() {
        let base = vec![
            reg(2412, ChannelState::Enabled),
            reg(5260, ChannelState::Dfs),
            reg(5180, ChannelState::Enabled),
        ];
        let policy = ChannelListPolicy {
            prefer_5ghz: true,
            dfs_allowed: true,
            ..Default::default()
        };
        let out = build_channel_list(&base, &policy);
        assert_eq!(freqs(&out), vec![5180, 5260, 2412]);
    }

    // prefer_5ghz=false leaves the order untouched
    #[test]
    fn test_no_5ghz_preference_is_identity() {
        let base = vec![
            reg(2412, ChannelState::Enabled),
            reg(5180, ChannelState::Enabled),
            reg(2437, ChannelState::Enabled),
        ];
        let out = build_channel_list(&base, &ChannelListPolicy::default());
        assert_eq!(freqs(&out), vec![2412, 5180, 2437]);
    }

    // Greedy-table channels lead, in table order; the rest trail in input
    // order and are never dropped
    #[test]
    fn test_early_stop_greedy_partition() {
        // 5560 and 2437 are in the greedy table (2437 earlier); 5845 is not
        let base = vec![
            reg(5560, ChannelState::Enabled),
            reg(5845, ChannelState::Enabled),
            reg(2437, ChannelState::Enabled),
        ];
        let policy = ChannelListPolicy {
            early_stop_enabled: true,
            ..Default::default()
        };
        let out = build_channel_list(&base, &policy);
        assert_eq!(freqs(&out), vec![2437, 5560, 5845]);
    }

    // Unsafe channels are skipped only in the SAP operating band
    #[test]
    fn test_unsafe_channel_skip_is_band_scoped() {
        let base = vec![
            reg(2412, ChannelState::Enabled),
            reg(5180, ChannelState::Enabled),
        ];
        let policy = ChannelListPolicy {
            skip_unsafe_channels: true,
            sap_operating_band: Some(Band::Band2G),
            unsafe_freqs: vec![2412, 5180],
            ..Default::default()
        };
        let out = build_channel_list(&base, &policy);
        // 5180 is unsafe but out of the SAP band, so it stays
        assert_eq!(freqs(&out), vec![5180]);
    }

    // Output is truncated to the platform maximum
    #[test]
    fn test_truncation_to_max_channels() {
        let base: Vec<RegulatoryChannel> = (0..10)
            .map(|i| reg(2412 + i * 5, ChannelState::Enabled))
            .collect();
        let policy = ChannelListPolicy {
            max_channels: 4,
            ..Default::default()
        };
        let out = build_channel_list(&base, &policy);
        assert_eq!(out.len(), 4);
    }

    // Rate flags and NAN disablement tagging survive the reordering steps
    #[test]
    fn test_entry_tagging() {
        let base = vec![reg(5180, ChannelState::Enabled)];
        let policy = ChannelListPolicy {
            quarter_rate: true,
            nan_disabled_freqs: vec![5180],
            ..Default::default()
        };
        let out = build_channel_list(&base, &policy);
        assert!(out[0].quarter_rate);
        assert!(!out[0].half_rate);
        assert!(out[0].nan_disabled);
    }
}
