// Copyright 2024 RisingWave Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::item::CheckpointId;

/// Per-channel bookkeeping.
#[derive(Debug, Clone)]
pub struct ChannelState {
    /// While `true`, the gate suspends delivery from this channel.
    pub blocked: bool,
    /// Highest barrier id observed on this channel; `-1` before any barrier
    /// has arrived.
    pub last_barrier_id: CheckpointId,
    /// `true` once this channel has delivered `EndOfPartition`.
    pub closed: bool,
}

impl ChannelState {
    pub fn new() -> Self {
        Self {
            blocked: false,
            last_barrier_id: -1,
            closed: false,
        }
    }

    /// A barrier (or cancellation) with `id` is late or duplicate on this
    /// channel if we've already observed an id at least as high.
    pub fn is_stale(&self, id: CheckpointId) -> bool {
        id <= self.last_barrier_id
    }
}

impl Default for ChannelState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_channel_is_open_and_unblocked() {
        let c = ChannelState::new();
        assert!(!c.blocked);
        assert!(!c.closed);
        assert_eq!(c.last_barrier_id, -1);
    }

    #[test]
    fn staleness_is_monotonic_by_last_seen_id() {
        let mut c = ChannelState::new();
        assert!(!c.is_stale(0));
        c.last_barrier_id = 3;
        assert!(c.is_stale(3));
        assert!(c.is_stale(2));
        assert!(!c.is_stale(4));
    }
}
