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

//! The barrier alignment state machine.

mod channel_set;
pub mod clock;
mod pending;
#[cfg(test)]
mod tests;

use std::sync::Arc;

pub use clock::{Clock, SystemClock, TestClock};
pub use pending::PendingCheckpoint;

use crate::channel::ChannelState;
use crate::config::AlignerConfig;
use crate::error::{AlignerError, AlignerResult};
use crate::item::{BarrierPayload, ChannelIndex, CheckpointId, Item};
use crate::metrics::AlignerMetrics;
use crate::notifier::{CheckpointFailureReason, CheckpointMetadata, CheckpointMetrics, CheckpointNotifier};

/// What the façade must do in response to one processed item: forward
/// something downstream, and/or change which channels the underlying gate
/// should deliver from.
///
/// The `InputGate` interface in this crate adds an explicit
/// `block_consumption` alongside `resume_consumption`, since Rust has no
/// implicit side channel for "stop delivering from this channel" — see
/// `DESIGN.md`.
#[derive(Debug, Default)]
pub struct ProcessOutcome {
    /// The item to emit downstream, if any. `None` happens for a dropped
    /// (late/duplicate/stale) barrier or cancellation barrier, and for a
    /// barrier that merely advanced alignment without completing it — a
    /// `Barrier` is only ever forwarded on the delivery that completes its
    /// checkpoint.
    pub emit: Option<Item>,
    /// A channel that should stop being polled until a future
    /// `newly_resumed` batch includes it.
    pub newly_blocked: Option<ChannelIndex>,
    /// Channels that should resume being polled, in one batch.
    pub newly_resumed: Vec<ChannelIndex>,
}

impl ProcessOutcome {
    fn emit(item: Item) -> Self {
        Self {
            emit: Some(item),
            ..Default::default()
        }
    }

    fn dropped() -> Self {
        Self::default()
    }
}

/// Consumes `(channel, item)` pairs from an input gate and funnels them
/// into a single ordered output, tracking at most one [`PendingCheckpoint`]
/// at a time.
#[derive(Debug)]
pub struct BarrierAligner {
    channels: Vec<ChannelState>,
    current_pending: Option<PendingCheckpoint>,
    /// Highest barrier id for which at least one barrier has arrived,
    /// updated as soon as a barrier is first observed (not only at
    /// completion), so it also answers "has any channel ever seen id".
    latest_observed_id: CheckpointId,
    /// Highest checkpoint id that has been cancelled. Barriers and
    /// cancellation barriers with `id <= last_cancelled_id` are dropped.
    last_cancelled_id: CheckpointId,
    num_open_channels: usize,
    clock: Arc<dyn Clock>,
    enable_span_aggregation: bool,

    // Metrics surfaced by `CheckpointedInputGate`.
    last_alignment_duration_nanos: i64,
    last_checkpoint_start_delay_nanos: i64,
    latest_checkpoint_id: CheckpointId,
}

impl BarrierAligner {
    pub fn new(config: &AlignerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &AlignerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            channels: vec![ChannelState::new(); config.channel_count],
            current_pending: None,
            latest_observed_id: 0,
            last_cancelled_id: i64::MIN,
            num_open_channels: config.channel_count,
            clock,
            enable_span_aggregation: config.enable_tracing_span_aggregation,
            last_alignment_duration_nanos: 0,
            last_checkpoint_start_delay_nanos: 0,
            latest_checkpoint_id: -1,
        }
    }

    pub fn num_open_channels(&self) -> usize {
        self.num_open_channels
    }

    pub fn is_finished(&self) -> bool {
        self.num_open_channels == 0
    }

    pub fn alignment_duration_nanos(&self) -> i64 {
        self.last_alignment_duration_nanos
    }

    pub fn checkpoint_start_delay_nanos(&self) -> i64 {
        self.last_checkpoint_start_delay_nanos
    }

    pub fn latest_checkpoint_id(&self) -> CheckpointId {
        self.latest_checkpoint_id
    }

    /// Processes one `(channel, item)` pair pulled from the gate. Returns
    /// what the façade should forward downstream and which channels to
    /// (un)block.
    pub fn process(
        &mut self,
        channel: ChannelIndex,
        item: Item,
        notifier: &mut dyn CheckpointNotifier,
        metrics: &AlignerMetrics,
    ) -> AlignerResult<ProcessOutcome> {
        if channel >= self.channels.len() {
            return Err(AlignerError::ChannelIndexOutOfRange {
                channel,
                reported: self.channels.len(),
            });
        }
        if self.channels[channel].closed {
            return Err(AlignerError::ItemOnClosedChannel { channel });
        }

        match item {
            Item::Buffer(handle) => self.process_buffer(channel, handle),
            Item::Barrier(payload) => Ok(self.process_barrier(channel, payload, notifier, metrics)),
            Item::CancellationBarrier(id) => {
                Ok(self.process_cancellation_barrier(channel, id, notifier, metrics))
            }
            Item::EndOfPartition => Ok(self.process_end_of_partition(channel, notifier, metrics)),
        }
    }

    fn process_buffer(
        &mut self,
        channel: ChannelIndex,
        handle: crate::item::BufferHandle,
    ) -> AlignerResult<ProcessOutcome> {
        if self.channels[channel].blocked {
            return Err(AlignerError::BufferOnBlockedChannel { channel });
        }
        Ok(ProcessOutcome::emit(Item::Buffer(handle)))
    }

    fn process_barrier(
        &mut self,
        channel: ChannelIndex,
        payload: BarrierPayload,
        notifier: &mut dyn CheckpointNotifier,
        metrics: &AlignerMetrics,
    ) -> ProcessOutcome {
        let id = payload.id;

        // Rule 1: late/duplicate on this specific channel.
        if self.channels[channel].is_stale(id) {
            tracing::debug!(
                target: "events::stream::barrier::aligner::drop",
                channel, id, "dropping late/duplicate barrier"
            );
            return ProcessOutcome::dropped();
        }

        // Cross-rule from the CancellationBarrier section: a checkpoint
        // that has already been cancelled never opens again.
        if id <= self.last_cancelled_id {
            self.channels[channel].last_barrier_id = id;
            tracing::debug!(
                target: "events::stream::barrier::aligner::drop",
                channel, id, "dropping barrier for an already-cancelled checkpoint"
            );
            return ProcessOutcome::dropped();
        }

        let mut outcome = ProcessOutcome::default();

        if let Some(pending) = &self.current_pending {
            if id < pending.id {
                // Rule 2: a cancellation or subsumption already retired this id.
                tracing::debug!(
                    target: "events::stream::barrier::aligner::drop",
                    channel, id, current = pending.id, "dropping barrier lower than the current pending checkpoint"
                );
                return ProcessOutcome::dropped();
            }
            if id > pending.id {
                // Rule 3: subsumption.
                outcome.newly_resumed = self.abort_pending(
                    CheckpointFailureReason::DeclinedSubsumed,
                    notifier,
                    metrics,
                );
            }
        }

        if self.current_pending.is_none() {
            // Rule 4: open (or re-open after subsumption).
            self.open_pending(id, channel, payload.options.clone(), payload.timestamp_ms, metrics);
        }

        // Rule 5: record delivery on this channel.
        self.channels[channel].last_barrier_id = id;
        self.latest_observed_id = self.latest_observed_id.max(id);

        let complete = self
            .current_pending
            .as_mut()
            .expect("pending checkpoint must exist by rule 4")
            .mark_delivered(channel);

        if complete {
            self.complete_pending(notifier, metrics, &mut outcome.newly_resumed);
            // Re-emit the barrier downstream exactly once, on the delivery
            // that completed alignment — not on every channel it touched.
            outcome.emit = Some(Item::Barrier(payload));
        } else {
            self.channels[channel].blocked = true;
            outcome.newly_blocked = Some(channel);
            let pending = self.current_pending.as_ref().expect("just checked above");
            let _enter = pending.span.as_ref().map(|s| s.enter());
            tracing::debug!(
                target: "events::stream::barrier::aligner::block",
                channel, id, "blocking channel pending alignment"
            );
            // Swallowed: this barrier only advanced alignment, it didn't
            // complete it, so it isn't forwarded (mirrors how
            // `executor_v2::barrier_align` only passes through the barrier
            // that completes the merge).
        }

        outcome
    }

    fn process_cancellation_barrier(
        &mut self,
        channel: ChannelIndex,
        id: CheckpointId,
        notifier: &mut dyn CheckpointNotifier,
        metrics: &AlignerMetrics,
    ) -> ProcessOutcome {
        let mut outcome = ProcessOutcome::default();

        if let Some(pending) = &self.current_pending {
            if id == pending.id {
                outcome.newly_resumed = self.abort_pending(
                    CheckpointFailureReason::DeclinedOnCancellationBarrier,
                    notifier,
                    metrics,
                );
                self.channels[channel].last_barrier_id = id;
                self.last_cancelled_id = self.last_cancelled_id.max(id);
                self.latest_observed_id = self.latest_observed_id.max(id);
                outcome.emit = Some(Item::CancellationBarrier(id));
            } else if id > pending.id {
                outcome.newly_resumed = self.abort_pending(
                    CheckpointFailureReason::DeclinedSubsumed,
                    notifier,
                    metrics,
                );
                self.last_cancelled_id = self.last_cancelled_id.max(id);
                self.latest_observed_id = self.latest_observed_id.max(id);
                outcome.emit = Some(Item::CancellationBarrier(id));
            } else {
                tracing::debug!(
                    target: "events::stream::barrier::aligner::drop",
                    channel, id, current = pending.id, "dropping cancellation lower than the current pending checkpoint"
                );
            }
        } else if id <= self.last_cancelled_id {
            tracing::debug!(
                target: "events::stream::barrier::aligner::drop",
                channel, id, "dropping duplicate cancellation"
            );
        } else {
            self.last_cancelled_id = id;
            self.latest_observed_id = self.latest_observed_id.max(id);
            // No pending was ever open for `id`, so nothing to trigger: this
            // crate always reports the abort and never triggers afterward.
            notifier.abort_on_barrier(id, CheckpointFailureReason::DeclinedOnCancellationBarrier);
            metrics.observe_abort(CheckpointFailureReason::DeclinedOnCancellationBarrier);
            outcome.emit = Some(Item::CancellationBarrier(id));
        }

        outcome
    }

    fn process_end_of_partition(
        &mut self,
        channel: ChannelIndex,
        notifier: &mut dyn CheckpointNotifier,
        metrics: &AlignerMetrics,
    ) -> ProcessOutcome {
        let mut outcome = ProcessOutcome::default();

        let affects_pending = self
            .current_pending
            .as_ref()
            .is_some_and(|p| p.awaiting.contains(channel) || p.blocked.contains(channel));

        if affects_pending {
            outcome.newly_resumed = self.abort_pending(
                CheckpointFailureReason::DeclinedOnCloseOfChannel,
                notifier,
                metrics,
            );
        }

        self.channels[channel].closed = true;
        self.channels[channel].blocked = false;
        self.num_open_channels -= 1;

        tracing::debug!(
            target: "events::stream::barrier::aligner::close",
            channel, remaining = self.num_open_channels, "channel closed"
        );

        outcome.emit = Some(Item::EndOfPartition);
        outcome
    }

    fn open_pending(
        &mut self,
        id: CheckpointId,
        first_channel: ChannelIndex,
        options: crate::item::CheckpointOptions,
        trigger_timestamp_ms: i64,
        metrics: &AlignerMetrics,
    ) {
        let open_channels: Vec<ChannelIndex> = (0..self.channels.len())
            .filter(|&c| !self.channels[c].closed)
            .collect();
        let start_nanos = self.clock.now_nanos();
        // Always set for the checkpoint being opened, even when the
        // barrier carries no timestamp — otherwise the getter would keep
        // reporting the *previous* checkpoint's delay instead of "unknown"
        // for this one.
        self.last_checkpoint_start_delay_nanos = if trigger_timestamp_ms > 0 {
            let delay_nanos = self.clock.now_millis().saturating_sub(trigger_timestamp_ms) * 1_000_000;
            metrics
                .checkpoint_start_delay
                .observe(delay_nanos.max(0) as f64 / 1e9);
            delay_nanos
        } else {
            0
        };
        self.latest_checkpoint_id = id;
        self.latest_observed_id = self.latest_observed_id.max(id);
        self.current_pending = Some(PendingCheckpoint::new(
            id,
            start_nanos,
            trigger_timestamp_ms,
            options,
            open_channels,
            first_channel,
            self.enable_span_aggregation,
        ));
    }

    /// Completes the current pending checkpoint: fires `trigger_on_barrier`
    /// before unblocking any channel, then appends the unblocked set to
    /// `resumed`.
    fn complete_pending(
        &mut self,
        notifier: &mut dyn CheckpointNotifier,
        metrics: &AlignerMetrics,
        resumed: &mut Vec<ChannelIndex>,
    ) {
        let pending = self.current_pending.take().expect("pending must exist to complete");
        let alignment_nanos = self.clock.now_nanos() - pending.start_nanos;
        self.last_alignment_duration_nanos = alignment_nanos;
        self.latest_observed_id = self.latest_observed_id.max(pending.id);

        notifier.trigger_on_barrier(
            CheckpointMetadata {
                id: pending.id,
                timestamp_ms: pending.trigger_timestamp_ms,
            },
            &pending.options,
            CheckpointMetrics {
                alignment_duration_nanos: alignment_nanos,
            },
        );
        metrics.observe_trigger();
        metrics.alignment_duration.observe(alignment_nanos.max(0) as f64 / 1e9);

        {
            let _enter = pending.span.as_ref().map(|s| s.enter());
            tracing::debug!(
                target: "events::stream::barrier::aligner::trigger",
                id = pending.id, alignment_nanos, "checkpoint aligned"
            );
        }

        for c in pending.blocked.iter() {
            self.channels[c].blocked = false;
            resumed.push(c);
        }
    }

    /// Aborts the current pending checkpoint (subsumption, cancellation, or
    /// channel close), unblocking every channel it had blocked, and returns
    /// that set so the caller can fold it into a single `resume_consumption`
    /// batch.
    fn abort_pending(
        &mut self,
        reason: CheckpointFailureReason,
        notifier: &mut dyn CheckpointNotifier,
        metrics: &AlignerMetrics,
    ) -> Vec<ChannelIndex> {
        let pending = self
            .current_pending
            .take()
            .expect("abort_pending called with no pending checkpoint");

        notifier.abort_on_barrier(pending.id, reason);
        metrics.observe_abort(reason);

        {
            let _enter = pending.span.as_ref().map(|s| s.enter());
            tracing::debug!(
                target: "events::stream::barrier::aligner::abort",
                id = pending.id, ?reason, "checkpoint aborted"
            );
        }

        let mut resumed = Vec::with_capacity(pending.blocked.len());
        for c in pending.blocked.iter() {
            self.channels[c].blocked = false;
            resumed.push(c);
        }
        resumed
    }
}
