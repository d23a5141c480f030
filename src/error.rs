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

use thiserror::Error;

use crate::item::ChannelIndex;

pub type AlignerResult<T> = std::result::Result<T, AlignerError>;

/// Fatal invariant violations: these are bugs in the underlying
/// [`crate::InputGate`], never barrier-protocol conditions, and callers are
/// expected to let them halt the task rather than recover from them.
#[derive(Error, Debug)]
pub enum AlignerError {
    #[error("received a buffer on channel {channel} while it was blocked")]
    BufferOnBlockedChannel { channel: ChannelIndex },

    #[error("received item on channel {channel} after it reported end-of-partition")]
    ItemOnClosedChannel { channel: ChannelIndex },

    #[error("gate reported {reported} input channels, but channel index {channel} was used")]
    ChannelIndexOutOfRange {
        channel: ChannelIndex,
        reported: usize,
    },
}
