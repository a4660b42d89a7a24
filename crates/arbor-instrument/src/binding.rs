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

//! Bindings: live registrations of a filter with a listener payload.
//!
//! A binding is created `Attached` and moves to `Disposed` exactly once;
//! the transition is a lock-free flag flip so that every collection holding
//! the binding starts treating it as absent without synchronized removal.
//! Physical removal happens at the next compaction of each collection.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use arbor_core::Filter;

use crate::collections::{AsyncList, ListEntry};
use crate::error::{InstrumentError, InstrumentResult};
use crate::events::{
    EventNodeFactory, ExecuteSourceListener, ExecutionEventListener, LoadSourceListener,
    LoadSpanListener, OutputConsumer,
};
use crate::handler::InstrumentationHandler;

/// Which engine stream an output binding feeds from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutputTarget {
    Out,
    Err,
}

/// Execution payload: shared listener or per-location node factory.
pub(crate) enum ExecutionPayload {
    Listener(Arc<dyn ExecutionEventListener>),
    Factory(Arc<dyn EventNodeFactory>),
}

/// What a binding observes.
pub(crate) enum BindingData {
    Execution {
        filter: Filter,
        payload: ExecutionPayload,
    },
    SpanLoad {
        filter: Filter,
        listener: Arc<dyn LoadSpanListener>,
    },
    SourceLoad {
        filter: Filter,
        listener: Arc<dyn LoadSourceListener>,
    },
    SourceExecute {
        filter: Filter,
        listener: Arc<dyn ExecuteSourceListener>,
    },
    Output {
        target: OutputTarget,
        consumer: Arc<dyn OutputConsumer>,
    },
}

impl BindingData {
    fn kind_name(&self) -> &'static str {
        match self {
            BindingData::Execution { .. } => "execution",
            BindingData::SpanLoad { .. } => "span-load",
            BindingData::SourceLoad { .. } => "source-load",
            BindingData::SourceExecute { .. } => "source-execute",
            BindingData::Output { .. } => "output",
        }
    }
}

/// A live registration of (filter, payload) with an independent dispose
/// lifecycle. Obtained from the attach methods of
/// [`Instrumenter`](crate::Instrumenter).
pub struct EventBinding {
    id: u64,
    instrumenter_id: u64,
    privileged: bool,
    origin: Arc<str>,
    disposed: AtomicBool,
    handler: Weak<InstrumentationHandler>,
    data: BindingData,
}

impl EventBinding {
    pub(crate) fn new(
        id: u64,
        instrumenter_id: u64,
        privileged: bool,
        origin: Arc<str>,
        handler: Weak<InstrumentationHandler>,
        data: BindingData,
    ) -> Arc<EventBinding> {
        Arc::new(EventBinding {
            id,
            instrumenter_id,
            privileged,
            origin,
            disposed: AtomicBool::new(false),
            handler,
            data,
        })
    }

    /// Attachment-order identity; later bindings have larger ids.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Name of the language or tool that attached this binding.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Whether `dispose` has been called.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// The filter this binding selects locations or sources with, `None`
    /// for output bindings.
    pub fn filter(&self) -> Option<&Filter> {
        match &self.data {
            BindingData::Execution { filter, .. }
            | BindingData::SpanLoad { filter, .. }
            | BindingData::SourceLoad { filter, .. }
            | BindingData::SourceExecute { filter, .. } => Some(filter),
            BindingData::Output { .. } => None,
        }
    }

    /// Detaches the binding. Every collection treats it as absent from this
    /// point on; probes whose chains could contain it are invalidated and
    /// rebuild lazily. Calling this a second time is a configuration error.
    pub fn dispose(self: &Arc<Self>) -> InstrumentResult<()> {
        if !self.mark_disposed() {
            return Err(InstrumentError::AlreadyDisposed);
        }
        log::trace!(
            "disposing {} binding #{} of '{}'",
            self.data.kind_name(),
            self.id,
            self.origin
        );
        if let Some(handler) = self.handler.upgrade() {
            handler.on_binding_disposed(self)?;
        }
        Ok(())
    }

    /// Flips the disposed flag; `true` if this call made the transition.
    /// Bulk disposal uses this directly and performs probe invalidation for
    /// the whole batch at once.
    pub(crate) fn mark_disposed(&self) -> bool {
        self.disposed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn instrumenter_id(&self) -> u64 {
        self.instrumenter_id
    }

    /// Whether faults of this binding's listeners propagate into guest
    /// control flow (language bindings) instead of being isolated.
    pub fn is_privileged(&self) -> bool {
        self.privileged
    }

    pub(crate) fn data(&self) -> &BindingData {
        &self.data
    }
}

impl fmt::Debug for EventBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBinding")
            .field("id", &self.id)
            .field("kind", &self.data.kind_name())
            .field("origin", &self.origin)
            .field("privileged", &self.privileged)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// List entry wrapping a binding; liveness is "not disposed".
#[derive(Clone)]
pub(crate) struct BindingEntry(pub(crate) Arc<EventBinding>);

impl ListEntry for BindingEntry {
    type Item = Arc<EventBinding>;

    fn live(&self) -> Option<Arc<EventBinding>> {
        (!self.0.is_disposed()).then(|| self.0.clone())
    }
}

/// Collection of bindings with disposal-based liveness.
pub(crate) type BindingList = AsyncList<BindingEntry>;
