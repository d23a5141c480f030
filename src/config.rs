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

/// Construction-time configuration for a [`crate::BarrierAligner`].
#[derive(Debug, Clone)]
pub struct AlignerConfig {
    /// `N`, fixed for the lifetime of the aligner.
    pub channel_count: usize,

    /// If enabled, all tracing events for one checkpoint id are grouped
    /// under a single span instead of being emitted as independent events.
    /// Off by default: significantly increases tracing overhead for a
    /// feature most deployments never enable.
    pub enable_tracing_span_aggregation: bool,
}

impl AlignerConfig {
    pub fn new(channel_count: usize) -> Self {
        Self {
            channel_count,
            enable_tracing_span_aggregation: false,
        }
    }
}
