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

use super::channel_set::ChannelSet;
use crate::item::{ChannelIndex, CheckpointId, CheckpointOptions};

/// State for the checkpoint currently aligning. Created
/// lazily on the first barrier of a new id; destroyed by exactly one of
/// complete, subsumed, cancelled, or aborted-by-close.
#[derive(Debug)]
pub struct PendingCheckpoint {
    pub id: CheckpointId,
    /// Wall time (nanoseconds since an arbitrary epoch) when the first
    /// barrier of `id` was observed, for the alignment-duration metric.
    pub start_nanos: i64,
    /// From the first barrier's payload, for the start-delay metric. `<= 0`
    /// means "not provided".
    pub trigger_timestamp_ms: i64,
    /// Channels that have NOT yet delivered a barrier with this id and are
    /// not closed.
    pub awaiting: ChannelSet,
    /// Channels that have already delivered their barrier and are blocked
    /// pending completion.
    pub blocked: ChannelSet,
    /// Options from the barrier that opened this checkpoint, echoed back to
    /// the notifier on trigger.
    pub options: CheckpointOptions,
    /// When `AlignerConfig::enable_tracing_span_aggregation` is set, every
    /// event this checkpoint produces is logged under this span instead of
    /// as an independent event, so a single `tracing` subscriber query can
    /// pull up everything that happened while `id` was aligning.
    pub span: Option<tracing::Span>,
}

impl PendingCheckpoint {
    pub fn new(
        id: CheckpointId,
        start_nanos: i64,
        trigger_timestamp_ms: i64,
        options: CheckpointOptions,
        open_channels: impl IntoIterator<Item = ChannelIndex>,
        first_channel: ChannelIndex,
        enable_span_aggregation: bool,
    ) -> Self {
        let awaiting = open_channels
            .into_iter()
            .filter(|&c| c != first_channel)
            .collect();
        let span = enable_span_aggregation
            .then(|| tracing::debug_span!("checkpoint_alignment", checkpoint_id = id));
        Self {
            id,
            start_nanos,
            trigger_timestamp_ms,
            awaiting,
            blocked: ChannelSet::new(),
            options,
            span,
        }
    }

    /// Records that `channel` delivered its barrier for this checkpoint.
    /// Returns `true` if every awaited channel has now delivered (i.e. the
    /// checkpoint is complete).
    pub fn mark_delivered(&mut self, channel: ChannelIndex) -> bool {
        self.awaiting.remove(channel);
        self.blocked.insert(channel);
        self.awaiting.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{AlignmentMode, CheckpointType};

    fn opts() -> CheckpointOptions {
        CheckpointOptions {
            checkpoint_type: CheckpointType::Checkpoint,
            target_location: None,
            alignment_mode: AlignmentMode::Aligned,
        }
    }

    #[test]
    fn new_awaits_every_open_channel_except_the_first() {
        let p = PendingCheckpoint::new(1, 0, 0, opts(), 0..3, 1, false);
        assert!(p.awaiting.contains(0));
        assert!(!p.awaiting.contains(1));
        assert!(p.awaiting.contains(2));
        assert!(p.blocked.is_empty());
    }

    #[test]
    fn delivering_the_last_awaited_channel_completes() {
        let mut p = PendingCheckpoint::new(1, 0, 0, opts(), 0..3, 0, false);
        assert!(!p.mark_delivered(1));
        assert!(p.mark_delivered(2));
        assert!(p.awaiting.is_empty());
        assert!(p.blocked.contains(1));
        assert!(p.blocked.contains(2));
    }

    #[test]
    fn single_channel_checkpoint_is_immediately_complete() {
        let p = PendingCheckpoint::new(1, 0, 0, opts(), 0..1, 0, false);
        assert!(p.awaiting.is_empty());
    }

    #[test]
    fn span_aggregation_toggle_controls_whether_a_span_is_created() {
        let without = PendingCheckpoint::new(1, 0, 0, opts(), 0..2, 0, false);
        assert!(without.span.is_none());

        let with = PendingCheckpoint::new(1, 0, 0, opts(), 0..2, 0, true);
        assert!(with.span.is_some());
    }
}
