// Copyright 2025 arbor contributors
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

//! Handler configuration.

/// Tunables for an [`InstrumentationHandler`](crate::InstrumentationHandler).
///
/// The defaults suit typical tool counts; capacities only set the initial
/// size of the lock-free collections, which grow by compaction as needed.
#[derive(Debug, Clone)]
pub struct HandlerSettings {
    /// Initial slot count of each binding collection.
    pub binding_capacity: usize,
    /// Initial slot count of the loaded/executed root collections.
    pub root_capacity: usize,
    /// Promote tool-binding listener faults to dispatch errors instead of
    /// isolating them. Intended for test harnesses that want a misbehaving
    /// tool to fail loudly.
    pub propagate_tool_faults: bool,
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self {
            binding_capacity: 8,
            root_capacity: 16,
            propagate_tool_faults: false,
        }
    }
}
