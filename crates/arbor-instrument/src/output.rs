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

//! Fan-out dispatch of the guest's out/err streams to attached consumers.

use std::sync::Arc;

use crate::binding::{BindingData, BindingEntry, BindingList, EventBinding};

/// One of the engine's guest streams. The host writes guest output here;
/// every consumer attached through a live output binding receives it.
pub struct DispatchOutput {
    label: &'static str,
    consumers: BindingList,
}

impl DispatchOutput {
    pub(crate) fn new(label: &'static str, capacity: usize) -> DispatchOutput {
        DispatchOutput {
            label,
            consumers: BindingList::new(capacity),
        }
    }

    pub(crate) fn attach(&self, binding: Arc<EventBinding>) {
        log::trace!("attaching output consumer #{} to {}", binding.id(), self.label);
        self.consumers.add(BindingEntry(binding));
    }

    /// Detaches and flushes every consumer of one instrumenter; part of
    /// bulk instrumenter disposal.
    pub(crate) fn dispose_instrumenter(&self, instrumenter_id: u64) {
        for binding in self.consumers.iter() {
            if binding.instrumenter_id() == instrumenter_id && binding.mark_disposed() {
                if let BindingData::Output { consumer, .. } = binding.data() {
                    consumer.flush();
                }
            }
        }
    }

    /// Fans a chunk out to every live consumer. Consumers of disposed
    /// bindings are skipped from the first write after disposal.
    pub fn write(&self, bytes: &[u8]) {
        for binding in self.consumers.iter() {
            if let BindingData::Output { consumer, .. } = binding.data() {
                consumer.write(bytes);
            }
        }
    }

    /// Flushes every live consumer.
    pub fn flush(&self) {
        for binding in self.consumers.iter() {
            if let BindingData::Output { consumer, .. } = binding.data() {
                consumer.flush();
            }
        }
    }

    /// Whether any live consumer is attached; lets hosts skip capturing
    /// guest output entirely.
    pub fn is_observed(&self) -> bool {
        self.consumers.iter().next().is_some()
    }
}

impl std::fmt::Debug for DispatchOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchOutput")
            .field("label", &self.label)
            .field("observed", &self.is_observed())
            .finish()
    }
}
