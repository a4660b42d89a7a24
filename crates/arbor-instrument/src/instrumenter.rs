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

//! The tooling-facing attach surface.
//!
//! An [`Instrumenter`] is a per-client handle onto the handler. Language
//! instrumenters are privileged: their listener faults propagate into guest
//! control flow, and in exchange their filters are verified against the
//! language's declared tags. Tool instrumenters get fault isolation and no
//! tag restrictions.

use std::sync::Arc;

use arbor_core::Filter;

use crate::binding::{BindingData, EventBinding, ExecutionPayload, OutputTarget};
use crate::error::{InstrumentError, InstrumentResult};
use crate::events::{
    EventNodeFactory, ExecuteSourceListener, ExecutionEventListener, LoadSourceListener,
    LoadSpanListener, OutputConsumer,
};
use crate::handler::InstrumentationHandler;
use crate::tree::LanguageInfo;

pub(crate) enum InstrumenterOrigin {
    Language(LanguageInfo),
    Tool(Arc<str>),
}

/// A client's handle for attaching bindings; obtained from
/// [`InstrumentationHandler::instrumenter_for_language`] or
/// [`InstrumentationHandler::instrumenter_for_tool`].
pub struct Instrumenter {
    handler: Arc<InstrumentationHandler>,
    id: u64,
    origin: InstrumenterOrigin,
}

impl Instrumenter {
    pub(crate) fn new(
        handler: Arc<InstrumentationHandler>,
        id: u64,
        origin: InstrumenterOrigin,
    ) -> Instrumenter {
        Instrumenter { handler, id, origin }
    }

    /// Name of the owning language or tool.
    pub fn name(&self) -> &str {
        match &self.origin {
            InstrumenterOrigin::Language(info) => info.name(),
            InstrumenterOrigin::Tool(name) => name,
        }
    }

    /// Whether bindings of this instrumenter are language-privileged.
    pub fn is_privileged(&self) -> bool {
        matches!(self.origin, InstrumenterOrigin::Language(_))
    }

    /// Attaches a shared stateless listener at every location matching
    /// `filter`, retroactively wrapping already-executed trees.
    pub fn attach_listener(
        &self,
        filter: Filter,
        listener: Arc<dyn ExecutionEventListener>,
    ) -> InstrumentResult<Arc<EventBinding>> {
        self.verify_filter(&filter)?;
        let binding = self.new_binding(BindingData::Execution {
            filter,
            payload: ExecutionPayload::Listener(listener),
        });
        self.handler.attach_execution(binding)
    }

    /// Attaches a factory producing one stateful event node per matching
    /// location, retroactively wrapping already-executed trees.
    pub fn attach_factory(
        &self,
        filter: Filter,
        factory: Arc<dyn EventNodeFactory>,
    ) -> InstrumentResult<Arc<EventBinding>> {
        self.verify_filter(&filter)?;
        let binding = self.new_binding(BindingData::Execution {
            filter,
            payload: ExecutionPayload::Factory(factory),
        });
        self.handler.attach_execution(binding)
    }

    /// Attaches a listener fired once per matching location as trees load.
    /// With `notify_existing`, already-loaded trees are replayed to it.
    pub fn attach_load_span(
        &self,
        filter: Filter,
        listener: Arc<dyn LoadSpanListener>,
        notify_existing: bool,
    ) -> InstrumentResult<Arc<EventBinding>> {
        self.verify_filter(&filter)?;
        let binding = self.new_binding(BindingData::SpanLoad { filter, listener });
        self.handler.attach_span_load(binding, notify_existing)
    }

    /// Attaches a listener fired once per distinct source as sources load.
    /// The filter must discriminate on source identity only. With
    /// `notify_existing`, already-known sources are replayed to it.
    pub fn attach_load_source(
        &self,
        filter: Filter,
        listener: Arc<dyn LoadSourceListener>,
        notify_existing: bool,
    ) -> InstrumentResult<Arc<EventBinding>> {
        Self::verify_source_only(&filter)?;
        let binding = self.new_binding(BindingData::SourceLoad { filter, listener });
        self.handler.attach_source_load(binding, notify_existing)
    }

    /// Attaches a listener fired once per distinct source when a root of
    /// that source first executes. Source-only filter; `notify_existing`
    /// replays sources that already executed.
    pub fn attach_execute_source(
        &self,
        filter: Filter,
        listener: Arc<dyn ExecuteSourceListener>,
        notify_existing: bool,
    ) -> InstrumentResult<Arc<EventBinding>> {
        Self::verify_source_only(&filter)?;
        let binding = self.new_binding(BindingData::SourceExecute { filter, listener });
        self.handler.attach_source_execute(binding, notify_existing)
    }

    /// Attaches a consumer to the guest's output stream. Disposing the
    /// returned binding detaches and flushes the consumer immediately.
    pub fn attach_out_consumer(
        &self,
        consumer: Arc<dyn OutputConsumer>,
    ) -> InstrumentResult<Arc<EventBinding>> {
        let binding = self.new_binding(BindingData::Output {
            target: OutputTarget::Out,
            consumer,
        });
        self.handler.attach_output(binding)
    }

    /// Attaches a consumer to the guest's error stream.
    pub fn attach_err_consumer(
        &self,
        consumer: Arc<dyn OutputConsumer>,
    ) -> InstrumentResult<Arc<EventBinding>> {
        let binding = self.new_binding(BindingData::Output {
            target: OutputTarget::Err,
            consumer,
        });
        self.handler.attach_output(binding)
    }

    /// Disposes every remaining binding of this instrumenter in one pass;
    /// used when the owning tool or language is torn down. Probes affected
    /// by its execution bindings are invalidated once for the whole batch.
    pub fn dispose_bindings(&self) -> InstrumentResult<()> {
        self.handler.dispose_instrumenter(self.id)
    }

    fn new_binding(&self, data: BindingData) -> Arc<EventBinding> {
        let origin: Arc<str> = match &self.origin {
            InstrumenterOrigin::Language(info) => Arc::from(info.name()),
            InstrumenterOrigin::Tool(name) => name.clone(),
        };
        EventBinding::new(
            self.handler.next_binding_id(),
            self.id,
            self.is_privileged(),
            origin,
            Arc::downgrade(&self.handler),
            data,
        )
    }

    /// Language instrumenters may only reference tags their language
    /// declares; anything else is a fatal configuration error.
    fn verify_filter(&self, filter: &Filter) -> InstrumentResult<()> {
        if let InstrumenterOrigin::Language(info) = &self.origin {
            let referenced = filter.referenced_tags();
            if !referenced.is_subset_of(info.provided_tags()) {
                return Err(InstrumentError::UndeclaredTags {
                    language: info.name().to_string(),
                    tags: referenced.difference(info.provided_tags()),
                });
            }
        }
        Ok(())
    }

    fn verify_source_only(filter: &Filter) -> InstrumentResult<()> {
        if !filter.is_source_only() {
            return Err(InstrumentError::SourceOnlyFilterRequired);
        }
        Ok(())
    }
}

impl std::fmt::Debug for Instrumenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instrumenter")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("privileged", &self.is_privileged())
            .finish()
    }
}
