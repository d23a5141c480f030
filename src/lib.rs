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

//! Per-task checkpoint barrier alignment.
//!
//! A task consumes records from `N` upstream input channels. The coordinator
//! periodically injects numbered checkpoint barriers into the source
//! streams; this crate detects when a barrier for checkpoint `c` has arrived
//! on every channel and signals the notifier so the task can take its local
//! snapshot, implementing the Chandy-Lamport distributed snapshot protocol
//! at the task boundary.
//!
//! The state machine lives in [`aligner`]; [`gate`] wraps it behind the
//! facade a task actually polls.

pub mod aligner;
mod channel;
pub mod config;
pub mod error;
pub mod gate;
pub mod item;
pub mod metrics;
pub mod notifier;

pub use aligner::{BarrierAligner, ProcessOutcome};
pub use channel::ChannelState;
pub use config::AlignerConfig;
pub use error::{AlignerError, AlignerResult};
pub use gate::{CheckpointedInputGate, InputGate};
pub use item::{ChannelIndex, InputChannelInfo, Item, RecyclableBuffer};
pub use metrics::AlignerMetrics;
pub use notifier::{
    CheckpointFailureReason, CheckpointMetadata, CheckpointMetrics, CheckpointNotifier,
    CheckpointOptions,
};
