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
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, info};

/// Command ids carry a fixed prefix in the top byte so they are
/// distinguishable from scan ids in logs; the low 24 bits are a
/// monotonically increasing counter.
pub const COMMAND_ID_PREFIX: u32 = 0x0D00_0000;
const COMMAND_ID_MASK: u32 = 0x00FF_FFFF;

/// A per-subsystem command id generator.
pub struct CommandIdGenerator {
    counter: AtomicU32,
}

impl CommandIdGenerator {
    /// Initialize the generator with the starting value.
    pub fn new() -> Self {
        info!("Initializing CommandIdGenerator with prefix {COMMAND_ID_PREFIX:#010X}");
        Self {
            counter: AtomicU32::new(0),
        }
    }

    /// Get the next command id: low 24 bits cycle, the prefix is constant.
    pub fn next_id(&self) -> u32 {
        let raw = self.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        let id = (raw & COMMAND_ID_MASK) | COMMAND_ID_PREFIX;

        debug!("Generated command id: {id:#010X}");
        id
    }
}

impl Default for CommandIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    // Check correctness of consecutive command id values and prefixing
    #[test]
    fn test_command_ids_are_prefixed_and_monotonic() {
        let gen = CommandIdGenerator::new();

        assert_eq!(gen.next_id(), COMMAND_ID_PREFIX | 1);
        assert_eq!(gen.next_id(), COMMAND_ID_PREFIX | 2);
        assert_eq!(gen.next_id(), COMMAND_ID_PREFIX | 3);
    }

    // Rewind the counter near the 24-bit boundary and expect the low bits
    // to wrap while the prefix stays intact
    #[test]
    fn test_command_id_counter_wraps_within_prefix() {
        let gen = CommandIdGenerator {
            counter: AtomicU32::new(0x00FF_FFFE),
        };

        assert_eq!(gen.next_id(), COMMAND_ID_PREFIX | 0x00FF_FFFF);
        // the next value wraps the 24-bit counter back to zero
        assert_eq!(gen.next_id(), COMMAND_ID_PREFIX);
        assert_eq!(gen.next_id(), COMMAND_ID_PREFIX | 1);
    }
}
