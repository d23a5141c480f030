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

//! The polling façade a task actually drives.

use async_trait::async_trait;
use thiserror_ext::AsReport;

use crate::aligner::{BarrierAligner, ProcessOutcome};
use crate::config::AlignerConfig;
use crate::error::AlignerResult;
use crate::item::{ChannelIndex, CheckpointId, InputChannelInfo, Item};
use crate::metrics::AlignerMetrics;
use crate::notifier::CheckpointNotifier;

/// The raw, un-aligned multiplexer over a task's input channels. Swappable
/// for tests (see `MockInputGate` in `tests/scenarios.rs`) and for whatever
/// transport actually feeds a task (network, local exchange, source reader).
///
/// `block_consumption` is this crate's answer to "instruct the gate to stop
/// delivering from a channel", since Rust has no implicit shared side
/// channel a trait method can lean on.
#[async_trait]
pub trait InputGate: Send {
    /// Pulls the next `(channel, item)` pair, or `None` once every channel
    /// has reported `EndOfPartition` and been drained.
    async fn poll_next(&mut self) -> AlignerResult<Option<(ChannelIndex, Item)>>;

    fn number_of_input_channels(&self) -> usize;

    /// Stops delivering from `channel` until a matching `resume_consumption`.
    fn block_consumption(&mut self, channel: ChannelIndex);

    /// Resumes delivery from every channel in `channels`, as one batch.
    fn resume_consumption(&mut self, channels: &[ChannelIndex]);

    fn is_finished(&self) -> bool;

    async fn close(&mut self);
}

/// Wraps an [`InputGate`] with a [`BarrierAligner`], presenting a task with
/// a single ordered stream of items and driving alignment as a side effect
/// of polling it.
pub struct CheckpointedInputGate<G, N> {
    gate: G,
    aligner: BarrierAligner,
    notifier: N,
    metrics: AlignerMetrics,
    closed: bool,
    /// Which gate this façade wraps, for tagging emitted items when a task
    /// has more than one gate (and therefore more than one
    /// `CheckpointedInputGate`). Fixed at construction; defaults to `0` for
    /// the common single-gate case.
    gate_idx: usize,
}

impl<G, N> CheckpointedInputGate<G, N>
where
    G: InputGate,
    N: CheckpointNotifier,
{
    pub fn new(gate: G, notifier: N, metrics: AlignerMetrics) -> Self {
        Self::with_gate_idx(gate, notifier, metrics, 0)
    }

    pub fn with_gate_idx(gate: G, notifier: N, metrics: AlignerMetrics, gate_idx: usize) -> Self {
        let config = AlignerConfig::new(gate.number_of_input_channels());
        Self {
            aligner: BarrierAligner::new(&config),
            gate,
            notifier,
            metrics,
            closed: false,
            gate_idx,
        }
    }

    pub fn with_config(gate: G, notifier: N, metrics: AlignerMetrics, config: &AlignerConfig) -> Self {
        Self {
            aligner: BarrierAligner::new(config),
            gate,
            notifier,
            metrics,
            closed: false,
            gate_idx: 0,
        }
    }

    /// Pulls and aligns the next item, tagged with the channel (and gate) it
    /// originated from. Barriers and cancellation barriers that the aligner
    /// fully absorbs (dropped as stale/duplicate) never reach the caller;
    /// nor does a barrier that merely advances alignment without completing
    /// it — a `Barrier` only reaches the caller on the delivery that
    /// completes its checkpoint, tagged with the channel that delivered it.
    pub async fn poll_next(&mut self) -> AlignerResult<Option<(InputChannelInfo, Item)>> {
        loop {
            if self.closed || self.aligner.is_finished() {
                return Ok(None);
            }
            let Some((channel, item)) = self.gate.poll_next().await? else {
                return Ok(None);
            };

            let ProcessOutcome {
                emit,
                newly_blocked,
                newly_resumed,
            } = self
                .aligner
                .process(channel, item, &mut self.notifier, &self.metrics)
                .inspect_err(|err| {
                    tracing::error!(channel, error = %err.as_report(), "aligner invariant violated");
                })?;

            // Order matters: a subsuming barrier on the same channel that
            // triggered the new checkpoint both resumes (the old pending's
            // block) and re-blocks (the new pending's) that same channel in
            // one outcome. Resuming first then re-blocking leaves the gate
            // matching `BarrierAligner`'s internal `ChannelState::blocked`,
            // which always reflects the block, not the resume.
            if !newly_resumed.is_empty() {
                self.gate.resume_consumption(&newly_resumed);
            }
            if let Some(c) = newly_blocked {
                self.gate.block_consumption(c);
            }
            if self.aligner.is_finished() {
                self.gate.close().await;
            }

            if let Some(item) = emit {
                let info = InputChannelInfo {
                    gate_idx: self.gate_idx,
                    channel_idx: channel,
                };
                return Ok(Some((info, item)));
            }
            // A dropped or not-yet-completing barrier/cancellation produces
            // no output; keep polling.
        }
    }

    pub fn is_finished(&self) -> bool {
        self.aligner.is_finished()
    }

    /// Idempotent: a second call is a no-op.
    pub async fn close(&mut self) {
        if !self.closed {
            self.gate.close().await;
            self.closed = true;
        }
    }

    pub fn alignment_duration_nanos(&self) -> i64 {
        self.aligner.alignment_duration_nanos()
    }

    pub fn checkpoint_start_delay_nanos(&self) -> i64 {
        self.aligner.checkpoint_start_delay_nanos()
    }

    pub fn latest_checkpoint_id(&self) -> CheckpointId {
        self.aligner.latest_checkpoint_id()
    }
}
