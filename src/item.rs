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

use std::fmt::Debug;

use enum_as_inner::EnumAsInner;

/// Identifies one of the `N` upstream channels feeding a task, `0..N`.
pub type ChannelIndex = usize;

/// The id of a checkpoint, as assigned by the coordinator. Monotonically
/// increasing across the lifetime of a job, but not necessarily contiguous.
pub type CheckpointId = i64;

/// Where a single channel sits within the larger dataflow graph; preserved
/// on every item the aligner observes so a downstream consumer can still
/// tell which gate and channel an emitted item originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputChannelInfo {
    pub gate_idx: usize,
    pub channel_idx: ChannelIndex,
}

/// A snapshot kind, as requested by the coordinator for a given checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointType {
    Checkpoint,
    Savepoint,
}

/// How strictly the dataflow must align channels before firing the
/// snapshot. The aligner only implements `Aligned` and `AtLeastOnce`
/// (pass-through); `Unaligned` and `ForcedAligned` are carried on the
/// barrier payload but acted on upstream of this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignmentMode {
    AtLeastOnce,
    Aligned,
    Unaligned,
    ForcedAligned,
}

/// Options carried by a barrier, echoed back to the notifier on trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointOptions {
    pub checkpoint_type: CheckpointType,
    pub target_location: Option<String>,
    pub alignment_mode: AlignmentMode,
}

/// The payload of a numbered barrier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarrierPayload {
    pub id: CheckpointId,
    /// Wall-clock time in milliseconds at which the coordinator injected
    /// this barrier, used to compute `checkpoint_start_delay_nanos`. `<= 0`
    /// means "not provided".
    pub timestamp_ms: i64,
    pub options: CheckpointOptions,
}

/// The resource-recycling contract a buffer payload must honor. The
/// aligner never inspects buffer contents; it only ever emits a
/// buffer downstream (transferring ownership) or, on an exit path that
/// drops it, calls [`RecyclableBuffer::recycle`] exactly once.
pub trait RecyclableBuffer: Debug + Send {
    fn recycle(self: Box<Self>);
}

/// Owns a buffer payload until either emitted (via [`BufferHandle::into_inner`],
/// which disarms recycling) or dropped (which recycles it). This is the
/// Rust-native answer to "no buffer may be leaked on any exit path including
/// panic": the recycle call lives in `Drop`, not on a fallible cleanup path.
#[derive(Debug)]
pub struct BufferHandle(Option<Box<dyn RecyclableBuffer>>);

impl BufferHandle {
    pub fn new(buffer: Box<dyn RecyclableBuffer>) -> Self {
        Self(Some(buffer))
    }

    /// Takes ownership of the wrapped buffer without recycling it. Used when
    /// the aligner emits the buffer downstream.
    pub fn into_inner(mut self) -> Box<dyn RecyclableBuffer> {
        self.0.take().expect("buffer handle already consumed")
    }
}

impl Drop for BufferHandle {
    fn drop(&mut self) {
        if let Some(buffer) = self.0.take() {
            buffer.recycle();
        }
    }
}

/// One item delivered by a channel.
#[derive(Debug, EnumAsInner)]
pub enum Item {
    /// An opaque data payload.
    Buffer(BufferHandle),
    /// A numbered snapshot marker.
    Barrier(BarrierPayload),
    /// An in-band marker aborting checkpoint `id` on all downstream tasks.
    CancellationBarrier(CheckpointId),
    /// Terminal marker: the channel will produce no further items.
    EndOfPartition,
}
