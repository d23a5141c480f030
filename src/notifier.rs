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

pub use crate::item::CheckpointOptions;
use crate::item::CheckpointId;

/// The checkpoint identity handed to the notifier on a successful trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointMetadata {
    pub id: CheckpointId,
    pub timestamp_ms: i64,
}

/// Metrics captured for one completed alignment, handed to the notifier
/// alongside the trigger so it doesn't have to re-derive them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointMetrics {
    pub alignment_duration_nanos: i64,
}

/// Why an in-flight checkpoint will never complete.
///
/// `TaskNotReady` and `Unknown` are never produced by this crate: the former
/// is surfaced only if the notifier itself refuses a trigger, the latter is
/// reserved for callers building on top of this one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointFailureReason {
    DeclinedOnCancellationBarrier,
    DeclinedSubsumed,
    DeclinedOnCloseOfChannel,
    DeclinedTaskNotReady,
    Unknown,
}

/// The downstream sink for checkpoint lifecycle signals. Both callbacks
/// are invoked synchronously on the task thread that drives
/// [`crate::BarrierAligner`]; the aligner never awaits them.
pub trait CheckpointNotifier {
    /// Alignment for `metadata.id` completed: every channel has delivered
    /// its barrier. The task should now take its local snapshot.
    fn trigger_on_barrier(
        &mut self,
        metadata: CheckpointMetadata,
        options: &CheckpointOptions,
        metrics: CheckpointMetrics,
    );

    /// Alignment for `id` will never complete.
    fn abort_on_barrier(&mut self, id: CheckpointId, reason: CheckpointFailureReason);
}
