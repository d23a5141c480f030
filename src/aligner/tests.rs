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

use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;

use super::*;
use crate::item::{AlignmentMode, CheckpointOptions, CheckpointType};
use crate::notifier::{CheckpointFailureReason, CheckpointMetadata, CheckpointMetrics, CheckpointNotifier};

#[derive(Debug, Default, Clone)]
struct RecordingNotifier(Arc<Mutex<Vec<Event>>>);

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Triggered(CheckpointId),
    Aborted(CheckpointId, CheckpointFailureReason),
}

impl RecordingNotifier {
    fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }
}

impl CheckpointNotifier for RecordingNotifier {
    fn trigger_on_barrier(
        &mut self,
        metadata: CheckpointMetadata,
        _options: &CheckpointOptions,
        _metrics: CheckpointMetrics,
    ) {
        self.0.lock().unwrap().push(Event::Triggered(metadata.id));
    }

    fn abort_on_barrier(&mut self, id: CheckpointId, reason: CheckpointFailureReason) {
        self.0.lock().unwrap().push(Event::Aborted(id, reason));
    }
}

fn opts() -> CheckpointOptions {
    CheckpointOptions {
        checkpoint_type: CheckpointType::Checkpoint,
        target_location: None,
        alignment_mode: AlignmentMode::Aligned,
    }
}

fn barrier(id: CheckpointId) -> Item {
    Item::Barrier(BarrierPayload {
        id,
        timestamp_ms: 0,
        options: opts(),
    })
}

fn buffer() -> Item {
    struct NoopBuffer;
    impl crate::item::RecyclableBuffer for NoopBuffer {
        fn recycle(self: Box<Self>) {}
    }
    Item::Buffer(crate::item::BufferHandle::new(Box::new(NoopBuffer)))
}

fn aligner(channels: usize) -> BarrierAligner {
    let config = AlignerConfig::new(channels);
    BarrierAligner::with_clock(&config, Arc::new(TestClock::new(0)))
}

// P1: a checkpoint completes only once every open channel has delivered.
#[test]
fn completes_only_after_every_channel_delivers() {
    let mut a = aligner(3);
    let mut n = RecordingNotifier::default();
    let m = AlignerMetrics::unused();

    let o0 = a.process(0, barrier(1), &mut n, &m).unwrap();
    assert_eq!(o0.newly_blocked, Some(0));
    assert!(n.events().is_empty());

    let o1 = a.process(1, barrier(1), &mut n, &m).unwrap();
    assert_eq!(o1.newly_blocked, Some(1));
    assert!(n.events().is_empty());

    let o2 = a.process(2, barrier(1), &mut n, &m).unwrap();
    assert!(o2.newly_blocked.is_none());
    let mut resumed = o2.newly_resumed.clone();
    resumed.sort_unstable();
    assert_eq!(resumed, vec![0, 1]);
    assert_eq!(n.events(), vec![Event::Triggered(1)]);
}

// P2: buffers on an unblocked channel pass straight through.
#[test]
fn buffers_on_open_channels_pass_through() {
    let mut a = aligner(2);
    let mut n = RecordingNotifier::default();
    let m = AlignerMetrics::unused();

    let outcome = a.process(0, buffer(), &mut n, &m).unwrap();
    assert!(outcome.emit.unwrap().is_buffer());
}

// Invariant: a buffer on a blocked channel is a fatal invariant violation.
#[test]
fn buffer_on_blocked_channel_is_an_error() {
    let mut a = aligner(2);
    let mut n = RecordingNotifier::default();
    let m = AlignerMetrics::unused();

    a.process(0, barrier(1), &mut n, &m).unwrap();
    let err = a.process(0, buffer(), &mut n, &m).unwrap_err();
    assert_matches!(err, AlignerError::BufferOnBlockedChannel { channel: 0 });
}

// P3: a later barrier subsumes the pending one.
#[test]
fn higher_barrier_subsumes_the_pending_checkpoint() {
    let mut a = aligner(2);
    let mut n = RecordingNotifier::default();
    let m = AlignerMetrics::unused();

    a.process(0, barrier(1), &mut n, &m).unwrap();
    let outcome = a.process(0, barrier(2), &mut n, &m).unwrap();
    assert_eq!(outcome.newly_resumed, vec![0]);
    assert_eq!(n.events(), vec![Event::Aborted(1, CheckpointFailureReason::DeclinedSubsumed)]);

    let complete = a.process(1, barrier(2), &mut n, &m).unwrap();
    assert_eq!(n.events().len(), 2);
    assert_eq!(n.events()[1], Event::Triggered(2));
    assert!(complete.newly_resumed.contains(&0));
}

// P4: late/duplicate barriers on an individual channel are dropped silently.
#[tracing_test::traced_test]
#[test]
fn stale_barrier_on_a_channel_is_dropped() {
    let mut a = aligner(2);
    let mut n = RecordingNotifier::default();
    let m = AlignerMetrics::unused();

    a.process(0, barrier(1), &mut n, &m).unwrap();
    a.process(1, barrier(1), &mut n, &m).unwrap();
    assert_eq!(n.events(), vec![Event::Triggered(1)]);

    let outcome = a.process(0, barrier(1), &mut n, &m).unwrap();
    assert!(outcome.emit.is_none());
    assert!(outcome.newly_blocked.is_none());
    assert!(outcome.newly_resumed.is_empty());
    assert!(tracing_test::logs_contain("dropping late/duplicate barrier"));
}

// P5: a cancellation barrier for the pending id aborts it.
#[test]
fn cancellation_barrier_for_the_pending_id_aborts_it() {
    let mut a = aligner(2);
    let mut n = RecordingNotifier::default();
    let m = AlignerMetrics::unused();

    a.process(0, barrier(1), &mut n, &m).unwrap();
    let outcome = a.process(1, Item::CancellationBarrier(1), &mut n, &m).unwrap();
    assert_eq!(outcome.newly_resumed, vec![0]);
    assert_eq!(
        n.events(),
        vec![Event::Aborted(1, CheckpointFailureReason::DeclinedOnCancellationBarrier)]
    );

    // The same barrier, arriving late on the channel that triggered the
    // cancellation, must not resurrect a trigger.
    let outcome = a.process(0, barrier(1), &mut n, &m).unwrap();
    assert!(outcome.emit.is_none());
    assert_eq!(n.events().len(), 1);
}

// A standalone cancellation with no live pending always emits an abort and
// never permits a later trigger for that id (spec's permitted simplification).
#[test]
fn standalone_cancellation_always_aborts_and_blocks_future_triggers() {
    let mut a = aligner(2);
    let mut n = RecordingNotifier::default();
    let m = AlignerMetrics::unused();

    let outcome = a.process(0, Item::CancellationBarrier(5), &mut n, &m).unwrap();
    assert!(outcome.emit.is_some());
    assert_eq!(
        n.events(),
        vec![Event::Aborted(5, CheckpointFailureReason::DeclinedOnCancellationBarrier)]
    );

    a.process(0, barrier(5), &mut n, &m).unwrap();
    a.process(1, barrier(5), &mut n, &m).unwrap();
    assert_eq!(n.events().len(), 1, "a cancelled id must never trigger afterward");
}

// P6: a channel closing while its barrier is outstanding aborts the pending
// checkpoint and unblocks whatever it had blocked so far.
#[test]
fn end_of_partition_on_an_awaited_channel_aborts_the_pending_checkpoint() {
    let mut a = aligner(3);
    let mut n = RecordingNotifier::default();
    let m = AlignerMetrics::unused();

    a.process(0, barrier(1), &mut n, &m).unwrap();
    let outcome = a.process(1, Item::EndOfPartition, &mut n, &m).unwrap();
    assert_eq!(outcome.newly_resumed, vec![0]);
    assert_eq!(
        n.events(),
        vec![Event::Aborted(1, CheckpointFailureReason::DeclinedOnCloseOfChannel)]
    );
    assert_eq!(a.num_open_channels(), 2);

    // The remaining channel can still complete a later checkpoint alone.
    let outcome = a.process(0, barrier(2), &mut n, &m).unwrap();
    assert!(outcome.newly_blocked.is_some());
    let outcome = a.process(2, barrier(2), &mut n, &m).unwrap();
    assert!(outcome.newly_blocked.is_none());
    assert_eq!(n.events()[1], Event::Triggered(2));
}

// A single-channel aligner never blocks: the triggering channel is excluded
// from `awaiting` at construction time, so there is nothing left to await.
#[test]
fn single_channel_aligner_never_blocks() {
    let mut a = aligner(1);
    let mut n = RecordingNotifier::default();
    let m = AlignerMetrics::unused();

    let outcome = a.process(0, barrier(1), &mut n, &m).unwrap();
    assert!(outcome.newly_blocked.is_none());
    assert_eq!(n.events(), vec![Event::Triggered(1)]);
}

#[test]
fn end_of_partition_closes_the_channel_and_counts_down_open_channels() {
    let mut a = aligner(2);
    let mut n = RecordingNotifier::default();
    let m = AlignerMetrics::unused();

    assert_eq!(a.num_open_channels(), 2);
    a.process(0, Item::EndOfPartition, &mut n, &m).unwrap();
    assert_eq!(a.num_open_channels(), 1);
    assert!(!a.is_finished());
    a.process(1, Item::EndOfPartition, &mut n, &m).unwrap();
    assert!(a.is_finished());
}

#[test]
fn item_after_end_of_partition_on_the_same_channel_is_an_error() {
    let mut a = aligner(1);
    let mut n = RecordingNotifier::default();
    let m = AlignerMetrics::unused();

    a.process(0, Item::EndOfPartition, &mut n, &m).unwrap();
    let err = a.process(0, buffer(), &mut n, &m).unwrap_err();
    assert_matches!(err, AlignerError::ItemOnClosedChannel { channel: 0 });
}

#[test]
fn channel_index_out_of_range_is_an_error() {
    let mut a = aligner(1);
    let mut n = RecordingNotifier::default();
    let m = AlignerMetrics::unused();

    let err = a.process(4, buffer(), &mut n, &m).unwrap_err();
    assert_matches!(
        err,
        AlignerError::ChannelIndexOutOfRange {
            channel: 4,
            reported: 1
        }
    );
}

// Literal scenario: two channels closed before any barrier arrives, then a
// checkpoint that aligns normally, one that completes the instant it opens
// (every other channel already closed), and one on the single remaining
// channel.
#[test]
fn closed_channels_at_start_interleave_with_empty_and_single_channel_alignments() {
    let mut a = aligner(4);
    let mut n = RecordingNotifier::default();
    let m = AlignerMetrics::unused();

    a.process(2, Item::EndOfPartition, &mut n, &m).unwrap();
    a.process(1, Item::EndOfPartition, &mut n, &m).unwrap();
    assert_eq!(a.num_open_channels(), 2);

    a.process(0, buffer(), &mut n, &m).unwrap();
    a.process(0, buffer(), &mut n, &m).unwrap();
    a.process(3, buffer(), &mut n, &m).unwrap();

    // Checkpoint 2 opens on channel 3, awaiting only channel 0 (1 and 2 are
    // already closed).
    let o = a.process(3, barrier(2), &mut n, &m).unwrap();
    assert_eq!(o.newly_blocked, Some(3));
    let o = a.process(0, barrier(2), &mut n, &m).unwrap();
    assert!(o.newly_blocked.is_none());
    assert_eq!(n.events(), vec![Event::Triggered(2)]);

    a.process(0, buffer(), &mut n, &m).unwrap();
    a.process(0, buffer(), &mut n, &m).unwrap();
    a.process(3, buffer(), &mut n, &m).unwrap();

    // Checkpoint 3 opens on channel 0, awaiting channel 3; completes as soon
    // as channel 3 delivers, with no intervening data (an empty alignment).
    let o = a.process(0, barrier(3), &mut n, &m).unwrap();
    assert_eq!(o.newly_blocked, Some(0));
    let o = a.process(3, barrier(3), &mut n, &m).unwrap();
    assert!(o.newly_blocked.is_none());
    assert_eq!(n.events(), vec![Event::Triggered(2), Event::Triggered(3)]);

    a.process(0, Item::EndOfPartition, &mut n, &m).unwrap();
    assert_eq!(a.num_open_channels(), 1);

    a.process(3, buffer(), &mut n, &m).unwrap();

    // Checkpoint 4 opens on channel 3, the only channel left open: it
    // completes immediately, with nothing left to await.
    let o = a.process(3, barrier(4), &mut n, &m).unwrap();
    assert!(o.newly_blocked.is_none());
    assert_eq!(
        n.events(),
        vec![Event::Triggered(2), Event::Triggered(3), Event::Triggered(4)]
    );

    a.process(3, buffer(), &mut n, &m).unwrap();
    a.process(3, Item::EndOfPartition, &mut n, &m).unwrap();
    assert!(a.is_finished());
}

#[test]
fn alignment_duration_reflects_the_clock_between_first_and_last_barrier() {
    let config = AlignerConfig::new(2);
    let clock = Arc::new(TestClock::new(1_000));
    let mut a = BarrierAligner::with_clock(&config, clock.clone());
    let mut n = RecordingNotifier::default();
    let m = AlignerMetrics::unused();

    a.process(0, barrier(1), &mut n, &m).unwrap();
    clock.advance_nanos(5_000);
    a.process(1, barrier(1), &mut n, &m).unwrap();
    assert_eq!(a.alignment_duration_nanos(), 5_000);
}
