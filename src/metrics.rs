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

use prometheus::{
    exponential_buckets, histogram_opts, register_histogram_with_registry,
    register_int_counter_vec_with_registry, Histogram, IntCounterVec, Registry,
};

use crate::notifier::CheckpointFailureReason;

/// Alignment metrics for one task's input gate.
#[derive(Debug)]
pub struct AlignerMetrics {
    /// Time from the first barrier of a checkpoint to its completion.
    pub alignment_duration: Histogram,
    /// Time from the coordinator's barrier timestamp to the first barrier
    /// actually being observed on any channel.
    pub checkpoint_start_delay: Histogram,
    /// Completed checkpoints, successful or not, labeled by outcome.
    pub barriers_completed: IntCounterVec,
}

impl AlignerMetrics {
    pub fn new(registry: &Registry) -> Self {
        // 1ms ~ ~16s, matching the duration buckets used for storage-layer
        // histograms elsewhere in this codebase.
        let duration_buckets = exponential_buckets(0.001, 4.0, 8).unwrap();

        let alignment_duration = register_histogram_with_registry!(
            histogram_opts!(
                "barrier_aligner_alignment_duration_seconds",
                "Time from the first barrier of a checkpoint to alignment completion",
                duration_buckets.clone()
            ),
            registry
        )
        .unwrap();

        let checkpoint_start_delay = register_histogram_with_registry!(
            histogram_opts!(
                "barrier_aligner_checkpoint_start_delay_seconds",
                "Time from the coordinator's barrier timestamp to the first observed barrier",
                duration_buckets
            ),
            registry
        )
        .unwrap();

        let barriers_completed = register_int_counter_vec_with_registry!(
            "barrier_aligner_barriers_completed_total",
            "Checkpoints that stopped aligning, labeled by outcome",
            &["outcome"],
            registry
        )
        .unwrap();

        Self {
            alignment_duration,
            checkpoint_start_delay,
            barriers_completed,
        }
    }

    /// A metrics instance with nothing registered, for tests that don't
    /// care about observability — mirrors `StreamingMetrics::unused()`.
    pub fn unused() -> Self {
        Self::new(&Registry::new())
    }

    pub fn observe_trigger(&self) {
        self.barriers_completed.with_label_values(&["triggered"]).inc();
    }

    pub fn observe_abort(&self, reason: CheckpointFailureReason) {
        self.barriers_completed
            .with_label_values(&[Self::reason_label(reason)])
            .inc();
    }

    fn reason_label(reason: CheckpointFailureReason) -> &'static str {
        match reason {
            CheckpointFailureReason::DeclinedOnCancellationBarrier => "cancelled",
            CheckpointFailureReason::DeclinedSubsumed => "subsumed",
            CheckpointFailureReason::DeclinedOnCloseOfChannel => "closed_channel",
            CheckpointFailureReason::DeclinedTaskNotReady => "task_not_ready",
            CheckpointFailureReason::Unknown => "unknown",
        }
    }
}
