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

use smallvec::SmallVec;

use crate::item::ChannelIndex;

/// A small, unordered set of channel indices. Fan-in degree is almost always
/// single digits, so a flat vec with linear `contains`/`remove` beats a
/// `HashSet`'s hashing overhead in practice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelSet(SmallVec<[ChannelIndex; 8]>);

impl ChannelSet {
    pub fn new() -> Self {
        Self(SmallVec::new())
    }

    pub fn insert(&mut self, channel: ChannelIndex) -> bool {
        if self.0.contains(&channel) {
            false
        } else {
            self.0.push(channel);
            true
        }
    }

    pub fn remove(&mut self, channel: ChannelIndex) -> bool {
        if let Some(pos) = self.0.iter().position(|&c| c == channel) {
            self.0.swap_remove(pos);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, channel: ChannelIndex) -> bool {
        self.0.contains(&channel)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = ChannelIndex> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<ChannelIndex> for ChannelSet {
    fn from_iter<T: IntoIterator<Item = ChannelIndex>>(iter: T) -> Self {
        let mut set = Self::new();
        for c in iter {
            set.insert(c);
        }
        set
    }
}
