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

//! The instrumentation handler: owner of every binding and root collection.
//!
//! The handler reacts to tree lifecycle calls from the host (`on_load`,
//! `on_first_execution`, `on_node_inserted`) and to attach/dispose calls
//! from instrumenters. Tree reactions walk the tree depth-first, skipping
//! whole roots via the filters' cheap root pre-check, and splice wrappers
//! around matching nodes. Attach and dispose never rebuild probe chains
//! eagerly; they only invalidate, and probes pull a fresh chain on their
//! next dispatch.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use arbor_core::{Source, SourceId, SourceSpan};

use crate::binding::{BindingData, BindingEntry, BindingList, EventBinding, ExecutionPayload};
use crate::collections::AsyncList;
use crate::config::HandlerSettings;
use crate::error::{DispatchError, EventPhase, InstrumentError, InstrumentResult, ListenerError};
use crate::events::EventContext;
use crate::instrumenter::{Instrumenter, InstrumenterOrigin};
use crate::output::DispatchOutput;
use crate::probe::{ChainNode, ChainPayload, Probe};
use crate::tree::{LanguageInfo, NodeRef, RootNode};

/// Weak collection of roots; collected trees drop out via liveness.
type RootList = AsyncList<Weak<dyn RootNode>>;

/// Once-per-handler record of distinct sources, kept separately for loaded
/// and executed trees. Inactive (and free) until the first source-level
/// binding attaches; activation harvests the already-registered roots.
struct SourceLog {
    active: AtomicBool,
    inner: Mutex<SourceLogState>,
}

#[derive(Default)]
struct SourceLogState {
    seen: HashSet<SourceId>,
    order: Vec<Source>,
}

impl SourceLog {
    fn new() -> SourceLog {
        SourceLog {
            active: AtomicBool::new(false),
            inner: Mutex::new(SourceLogState::default()),
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn ensure_active(&self, harvest: impl FnOnce() -> Vec<Source>) {
        if self.is_active() {
            return;
        }
        let mut state = self.lock();
        if !self.active.load(Ordering::Acquire) {
            for source in harvest() {
                Self::push(&mut state, source);
            }
            self.active.store(true, Ordering::Release);
        }
    }

    /// Records sources, returning the ones never seen before in first-seen
    /// order.
    fn record(&self, sources: Vec<Source>) -> Vec<Source> {
        let mut state = self.lock();
        sources
            .into_iter()
            .filter(|source| Self::push(&mut state, source.clone()))
            .collect()
    }

    fn snapshot(&self) -> Vec<Source> {
        self.lock().order.clone()
    }

    fn push(state: &mut SourceLogState, source: Source) -> bool {
        if state.seen.insert(source.id()) {
            state.order.push(source);
            true
        } else {
            false
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SourceLogState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Per-root data shared by a whole tree walk.
struct RootContext {
    language: LanguageInfo,
    root_span: Option<SourceSpan>,
}

/// A depth-first tree walk callback.
trait TreeVisitor {
    /// Cheap per-root pre-check; `false` skips the whole tree.
    fn should_visit(&self, ctx: &RootContext) -> bool;

    /// Called for every instrumentable, non-wrapper node.
    fn visit(&self, ctx: &RootContext, node: &NodeRef, span: Option<&SourceSpan>)
        -> InstrumentResult<()>;
}

#[derive(Clone, Copy)]
enum VisitAction {
    /// Splice a wrapper at every node matching one of the bindings.
    InsertWrappers,
    /// Invalidate the probe of every already-wrapped matching node.
    InvalidateProbes,
    /// Fire the span-load listener of every matching binding.
    NotifySpanLoad,
}

/// Visitor applying one action for a set of bindings; attach and dispose
/// use it with a single binding, full-tree reactions with all of them.
struct BindingVisitor<'a> {
    handler: &'a Arc<InstrumentationHandler>,
    bindings: &'a [Arc<EventBinding>],
    action: VisitAction,
}

impl BindingVisitor<'_> {
    /// Disposal invalidation must still consider the just-disposed binding;
    /// every other action ignores disposed bindings.
    fn relevant(&self, binding: &EventBinding) -> bool {
        matches!(self.action, VisitAction::InvalidateProbes) || !binding.is_disposed()
    }
}

impl TreeVisitor for BindingVisitor<'_> {
    fn should_visit(&self, ctx: &RootContext) -> bool {
        self.bindings.iter().any(|binding| {
            self.relevant(binding)
                && binding
                    .filter()
                    .is_some_and(|f| f.matches_root(ctx.language.provided_tags(), ctx.root_span.as_ref()))
        })
    }

    fn visit(
        &self,
        ctx: &RootContext,
        node: &NodeRef,
        span: Option<&SourceSpan>,
    ) -> InstrumentResult<()> {
        let tags = node.resolved_tags().intersection(ctx.language.provided_tags());
        for binding in self.bindings {
            if !self.relevant(binding) {
                continue;
            }
            let Some(filter) = binding.filter() else { continue };
            if !filter.matches_leaf(tags, span) {
                continue;
            }
            match self.action {
                VisitAction::InsertWrappers => {
                    // One wrapper serves every matching binding.
                    self.handler.insert_wrapper(&ctx.language, node, span)?;
                    break;
                }
                VisitAction::InvalidateProbes => {
                    if let Some(parent) = node.parent() {
                        if let Some(wrapper) = parent.as_wrapper() {
                            wrapper.probe().invalidate();
                        }
                    }
                    break;
                }
                VisitAction::NotifySpanLoad => {
                    let BindingData::SpanLoad { listener, .. } = binding.data() else {
                        continue;
                    };
                    let event = EventContext::new(span.cloned(), Arc::downgrade(node));
                    if let Err(fault) = listener.on_load(&event) {
                        self.handler
                            .absorb_notification_fault(binding, EventPhase::Load, fault)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// The coordinator owning all instrumentation state of one engine instance.
///
/// Hosts create one handler per engine, register trees through it, and hand
/// [`Instrumenter`] handles to languages and tools.
pub struct InstrumentationHandler {
    settings: HandlerSettings,
    loaded_roots: RootList,
    executed_roots: RootList,
    execution_bindings: BindingList,
    span_load_bindings: BindingList,
    source_load_bindings: BindingList,
    source_execute_bindings: BindingList,
    loaded_sources: SourceLog,
    executed_sources: SourceLog,
    out: DispatchOutput,
    err: DispatchOutput,
    next_binding_id: AtomicU64,
    next_instrumenter_id: AtomicU64,
}

impl InstrumentationHandler {
    /// Creates a handler with the given settings.
    pub fn new(settings: HandlerSettings) -> Arc<InstrumentationHandler> {
        let bindings = settings.binding_capacity;
        let roots = settings.root_capacity;
        Arc::new(InstrumentationHandler {
            settings,
            loaded_roots: RootList::new(roots),
            executed_roots: RootList::new(roots),
            execution_bindings: BindingList::new(bindings),
            span_load_bindings: BindingList::new(bindings),
            source_load_bindings: BindingList::new(bindings),
            source_execute_bindings: BindingList::new(bindings),
            loaded_sources: SourceLog::new(),
            executed_sources: SourceLog::new(),
            out: DispatchOutput::new("out", bindings),
            err: DispatchOutput::new("err", bindings),
            next_binding_id: AtomicU64::new(0),
            next_instrumenter_id: AtomicU64::new(0),
        })
    }

    /// A privileged instrumenter for a guest language. Its filters are
    /// verified against the language's declared tags and its listener
    /// faults propagate into guest control flow.
    pub fn instrumenter_for_language(
        self: &Arc<Self>,
        language: LanguageInfo,
    ) -> Instrumenter {
        Instrumenter::new(
            self.clone(),
            self.next_instrumenter_id.fetch_add(1, Ordering::AcqRel),
            InstrumenterOrigin::Language(language),
        )
    }

    /// An unprivileged instrumenter for an external tool; its listener
    /// faults are isolated.
    pub fn instrumenter_for_tool(self: &Arc<Self>, name: impl Into<Arc<str>>) -> Instrumenter {
        Instrumenter::new(
            self.clone(),
            self.next_instrumenter_id.fetch_add(1, Ordering::AcqRel),
            InstrumenterOrigin::Tool(name.into()),
        )
    }

    /// The guest's output stream.
    pub fn out(&self) -> &DispatchOutput {
        &self.out
    }

    /// The guest's error stream. Isolated listener faults are reported via
    /// the logging facade, not here; this stream carries guest output only.
    pub fn err(&self) -> &DispatchOutput {
        &self.err
    }

    /// Host callback: `root` became known. Must be called exactly once per
    /// root, before [`on_first_execution`](Self::on_first_execution).
    pub fn on_load(self: &Arc<Self>, root: &Arc<dyn RootNode>) -> InstrumentResult<()> {
        log::trace!("tree loaded ({})", root.language().name());
        self.loaded_roots.add(Arc::downgrade(root));
        if self.loaded_sources.is_active() {
            for source in self.loaded_sources.record(collect_sources(root)) {
                self.notify_source_list(&self.source_load_bindings, &source, EventPhase::Load)?;
            }
        }
        if !self.span_load_bindings.is_empty() {
            let bindings: Vec<_> = self.span_load_bindings.iter().collect();
            self.visit_root(
                root,
                &BindingVisitor {
                    handler: self,
                    bindings: &bindings,
                    action: VisitAction::NotifySpanLoad,
                },
            )?;
        }
        Ok(())
    }

    /// Host callback: `root` is about to run for the first time. Wraps
    /// every node an execution binding matches; a no-op while no execution
    /// bindings exist.
    pub fn on_first_execution(self: &Arc<Self>, root: &Arc<dyn RootNode>) -> InstrumentResult<()> {
        log::trace!("tree first executed ({})", root.language().name());
        self.executed_roots.add(Arc::downgrade(root));
        if self.executed_sources.is_active() {
            for source in self.executed_sources.record(collect_sources(root)) {
                self.notify_source_list(
                    &self.source_execute_bindings,
                    &source,
                    EventPhase::Execute,
                )?;
            }
        }
        if !self.execution_bindings.is_empty() {
            let bindings: Vec<_> = self.execution_bindings.iter().collect();
            self.visit_root(
                root,
                &BindingVisitor {
                    handler: self,
                    bindings: &bindings,
                    action: VisitAction::InsertWrappers,
                },
            )?;
        }
        Ok(())
    }

    /// Host callback: a subtree was materialized under an already-executed
    /// root (lazy parsing, splitting). Applies the current execution
    /// bindings to the new nodes.
    pub fn on_node_inserted(
        self: &Arc<Self>,
        root: &Arc<dyn RootNode>,
        node: &NodeRef,
    ) -> InstrumentResult<()> {
        if self.execution_bindings.is_empty() {
            return Ok(());
        }
        let bindings: Vec<_> = self.execution_bindings.iter().collect();
        let visitor = BindingVisitor {
            handler: self,
            bindings: &bindings,
            action: VisitAction::InsertWrappers,
        };
        let ctx = RootContext {
            language: root.language().clone(),
            root_span: root.span(),
        };
        if visitor.should_visit(&ctx) {
            self.visit_subtree(&ctx, node, &visitor)?;
        }
        Ok(())
    }

    pub(crate) fn next_binding_id(&self) -> u64 {
        self.next_binding_id.fetch_add(1, Ordering::AcqRel)
    }

    pub(crate) fn attach_execution(
        self: &Arc<Self>,
        binding: Arc<EventBinding>,
    ) -> InstrumentResult<Arc<EventBinding>> {
        log::trace!("attaching execution binding #{}", binding.id());
        self.execution_bindings.add(BindingEntry(binding.clone()));
        // Retroactively wrap matching locations of already-executed trees;
        // already-wrapped locations only get their probe invalidated.
        let single = [binding.clone()];
        self.visit_all_roots(
            &self.executed_roots,
            &BindingVisitor {
                handler: self,
                bindings: &single,
                action: VisitAction::InsertWrappers,
            },
        )?;
        Ok(binding)
    }

    pub(crate) fn attach_span_load(
        self: &Arc<Self>,
        binding: Arc<EventBinding>,
        notify_existing: bool,
    ) -> InstrumentResult<Arc<EventBinding>> {
        log::trace!("attaching span-load binding #{}", binding.id());
        self.span_load_bindings.add(BindingEntry(binding.clone()));
        if notify_existing {
            let single = [binding.clone()];
            self.visit_all_roots(
                &self.loaded_roots,
                &BindingVisitor {
                    handler: self,
                    bindings: &single,
                    action: VisitAction::NotifySpanLoad,
                },
            )?;
        }
        Ok(binding)
    }

    pub(crate) fn attach_source_load(
        self: &Arc<Self>,
        binding: Arc<EventBinding>,
        notify_existing: bool,
    ) -> InstrumentResult<Arc<EventBinding>> {
        log::trace!("attaching source-load binding #{}", binding.id());
        self.loaded_sources
            .ensure_active(|| harvest_sources(&self.loaded_roots));
        self.source_load_bindings.add(BindingEntry(binding.clone()));
        if notify_existing {
            for source in self.loaded_sources.snapshot() {
                self.notify_one_source(&binding, &source, EventPhase::Load)?;
            }
        }
        Ok(binding)
    }

    pub(crate) fn attach_source_execute(
        self: &Arc<Self>,
        binding: Arc<EventBinding>,
        notify_existing: bool,
    ) -> InstrumentResult<Arc<EventBinding>> {
        log::trace!("attaching source-execute binding #{}", binding.id());
        self.executed_sources
            .ensure_active(|| harvest_sources(&self.executed_roots));
        self.source_execute_bindings
            .add(BindingEntry(binding.clone()));
        if notify_existing {
            for source in self.executed_sources.snapshot() {
                self.notify_one_source(&binding, &source, EventPhase::Execute)?;
            }
        }
        Ok(binding)
    }

    pub(crate) fn attach_output(
        self: &Arc<Self>,
        binding: Arc<EventBinding>,
    ) -> InstrumentResult<Arc<EventBinding>> {
        let BindingData::Output { target, .. } = binding.data() else {
            return Ok(binding);
        };
        match target {
            crate::binding::OutputTarget::Out => self.out.attach(binding.clone()),
            crate::binding::OutputTarget::Err => self.err.attach(binding.clone()),
        }
        Ok(binding)
    }

    /// Dispose side effects beyond the flag flip. Execution bindings
    /// invalidate every probe whose chain could include them; wrappers of
    /// now-unmatched locations are removed lazily by the next rebuild.
    /// Output bindings detach synchronously (the consumer is flushed and
    /// stops receiving data at once).
    pub(crate) fn on_binding_disposed(
        self: &Arc<Self>,
        binding: &Arc<EventBinding>,
    ) -> InstrumentResult<()> {
        match binding.data() {
            BindingData::Execution { .. } => {
                let single = [binding.clone()];
                self.visit_all_roots(
                    &self.executed_roots,
                    &BindingVisitor {
                        handler: self,
                        bindings: &single,
                        action: VisitAction::InvalidateProbes,
                    },
                )
            }
            BindingData::Output { consumer, .. } => {
                consumer.flush();
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Disposes every remaining binding of one instrumenter; the affected
    /// probes are invalidated in a single pass over the executed roots.
    pub(crate) fn dispose_instrumenter(self: &Arc<Self>, instrumenter_id: u64) -> InstrumentResult<()> {
        let mut disposed_execution = Vec::new();
        for binding in self.execution_bindings.iter() {
            if binding.instrumenter_id() == instrumenter_id && binding.mark_disposed() {
                disposed_execution.push(binding);
            }
        }
        for list in [
            &self.span_load_bindings,
            &self.source_load_bindings,
            &self.source_execute_bindings,
        ] {
            for binding in list.iter() {
                if binding.instrumenter_id() == instrumenter_id {
                    binding.mark_disposed();
                }
            }
        }
        self.out.dispose_instrumenter(instrumenter_id);
        self.err.dispose_instrumenter(instrumenter_id);
        if !disposed_execution.is_empty() {
            log::trace!(
                "bulk-disposed {} execution bindings of instrumenter #{instrumenter_id}",
                disposed_execution.len()
            );
            self.visit_all_roots(
                &self.executed_roots,
                &BindingVisitor {
                    handler: self,
                    bindings: &disposed_execution,
                    action: VisitAction::InvalidateProbes,
                },
            )?;
        }
        Ok(())
    }

    /// Builds the event chain for `probe` from the current execution
    /// bindings, in attachment order. `None` means no binding matches and
    /// the location should be unwrapped.
    pub(crate) fn create_chain(&self, probe: &Probe) -> Result<Option<ChainNode>, DispatchError> {
        let Some(node) = probe.context().node() else {
            return Ok(None);
        };
        let span = probe.context().span();
        let tags = node
            .resolved_tags()
            .intersection(probe.language().provided_tags());

        let mut matched: Vec<(Arc<EventBinding>, ChainPayload)> = Vec::new();
        for binding in self.execution_bindings.iter() {
            let BindingData::Execution { filter, payload } = binding.data() else {
                continue;
            };
            if !filter.matches_leaf(tags, span) {
                continue;
            }
            let chain_payload = match payload {
                ExecutionPayload::Listener(listener) => ChainPayload::Listener(listener.clone()),
                ExecutionPayload::Factory(factory) => match factory.create(probe.context()) {
                    Ok(event_node) => ChainPayload::EventNode(event_node),
                    Err(fault) => {
                        if binding.is_privileged() || self.settings.propagate_tool_faults {
                            return Err(DispatchError {
                                phase: EventPhase::Create,
                                source: fault,
                            });
                        }
                        log::error!(
                            "event node factory of binding #{} ('{}') failed: {fault}; \
                             the location runs without it",
                            binding.id(),
                            binding.origin()
                        );
                        continue;
                    }
                },
            };
            matched.push((binding, chain_payload));
        }

        let mut head: Option<Box<ChainNode>> = None;
        for (binding, payload) in matched.into_iter().rev() {
            head = Some(Box::new(ChainNode::new(
                binding,
                payload,
                self.settings.propagate_tool_faults,
                head,
            )));
        }
        Ok(head.map(|boxed| *boxed))
    }

    /// Replaces a wrapper with its bare delegate again. Requested by probes
    /// that rebuilt to the empty chain; tolerant of the wrapper already
    /// being gone.
    pub(crate) fn remove_wrapper(&self, probe: &Probe) {
        let Some(wrapper) = probe.wrapper() else {
            return;
        };
        let delegate = wrapper.delegate();
        let wrapper_node = wrapper.as_node();
        let Some(parent) = wrapper_node.parent() else {
            return;
        };
        match parent.replace_child(&wrapper_node, delegate) {
            Ok(()) => log::trace!("removed wrapper at {:?}", probe.context().span()),
            Err(error) => log::trace!(
                "wrapper at {:?} was already detached: {error}",
                probe.context().span()
            ),
        }
    }

    /// Splices a wrapper around `node`. Idempotent: a node whose parent is
    /// already a wrapper only gets that wrapper's probe invalidated.
    fn insert_wrapper(
        self: &Arc<Self>,
        language: &LanguageInfo,
        node: &NodeRef,
        span: Option<&SourceSpan>,
    ) -> InstrumentResult<()> {
        let Some(parent) = node.parent() else {
            return Err(InstrumentError::NotAdopted);
        };
        if let Some(existing) = parent.as_wrapper() {
            existing.probe().invalidate();
            return Ok(());
        }
        let probe = Arc::new(Probe::new(
            Arc::downgrade(self),
            EventContext::new(span.cloned(), Arc::downgrade(node)),
            language.clone(),
        ));
        let Some(wrapper) = node.clone().create_wrapper(probe.clone()) else {
            log::trace!("node at {span:?} declined a wrapper; skipping");
            return Ok(());
        };
        let wrapper_node = wrapper.clone().as_node();
        if !parent.is_replacement_safe(node, &wrapper_node) {
            return Err(InstrumentError::UnsafeReplacement);
        }
        probe.attach_wrapper(&wrapper);
        parent.replace_child(node, wrapper_node)?;
        log::trace!("inserted wrapper at {span:?}");
        Ok(())
    }

    fn visit_all_roots(
        self: &Arc<Self>,
        roots: &RootList,
        visitor: &dyn TreeVisitor,
    ) -> InstrumentResult<()> {
        for root in roots.iter() {
            self.visit_root(&root, visitor)?;
        }
        Ok(())
    }

    fn visit_root(
        self: &Arc<Self>,
        root: &Arc<dyn RootNode>,
        visitor: &dyn TreeVisitor,
    ) -> InstrumentResult<()> {
        let ctx = RootContext {
            language: root.language().clone(),
            root_span: root.span(),
        };
        if !visitor.should_visit(&ctx) {
            return Ok(());
        }
        self.visit_subtree(&ctx, &root.body(), visitor)
    }

    fn visit_subtree(
        self: &Arc<Self>,
        ctx: &RootContext,
        node: &NodeRef,
        visitor: &dyn TreeVisitor,
    ) -> InstrumentResult<()> {
        // Wrappers are invisible to walks; their delegates are the real
        // candidates, which keeps rewrapping idempotent.
        if let Some(wrapper) = node.as_wrapper() {
            return self.visit_subtree(ctx, &wrapper.delegate(), visitor);
        }
        if node.is_instrumentable() {
            let span = node.span();
            visitor.visit(ctx, node, span.as_ref())?;
        }
        for child in node.children() {
            self.visit_subtree(ctx, &child, visitor)?;
        }
        Ok(())
    }

    fn notify_source_list(
        &self,
        list: &BindingList,
        source: &Source,
        phase: EventPhase,
    ) -> InstrumentResult<()> {
        for binding in list.iter() {
            self.notify_one_source(&binding, source, phase)?;
        }
        Ok(())
    }

    fn notify_one_source(
        &self,
        binding: &Arc<EventBinding>,
        source: &Source,
        phase: EventPhase,
    ) -> InstrumentResult<()> {
        let result = match binding.data() {
            BindingData::SourceLoad { filter, listener } if filter.matches_source(source) => {
                listener.on_load(source)
            }
            BindingData::SourceExecute { filter, listener } if filter.matches_source(source) => {
                listener.on_execute(source)
            }
            _ => return Ok(()),
        };
        if let Err(fault) = result {
            self.absorb_notification_fault(binding, phase, fault)?;
        }
        Ok(())
    }

    /// Fault policy for load/execute notifications: privileged faults (or
    /// all faults in strict mode) surface to the caller, tool faults are
    /// logged and dropped.
    fn absorb_notification_fault(
        &self,
        binding: &Arc<EventBinding>,
        phase: EventPhase,
        fault: ListenerError,
    ) -> InstrumentResult<()> {
        if binding.is_privileged() || self.settings.propagate_tool_faults {
            return Err(DispatchError { phase, source: fault }.into());
        }
        log::error!(
            "listener of binding #{} ('{}') failed during {phase}: {fault}; continuing",
            binding.id(),
            binding.origin()
        );
        Ok(())
    }
}

impl std::fmt::Debug for InstrumentationHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentationHandler")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Distinct sources referenced by one tree, in discovery order.
fn collect_sources(root: &Arc<dyn RootNode>) -> Vec<Source> {
    let mut seen = HashSet::new();
    let mut sources = Vec::new();
    if let Some(span) = root.span() {
        seen.insert(span.source().id());
        sources.push(span.source().clone());
    }
    collect_node_sources(&root.body(), &mut seen, &mut sources);
    sources
}

fn collect_node_sources(node: &NodeRef, seen: &mut HashSet<SourceId>, sources: &mut Vec<Source>) {
    if let Some(span) = node.span() {
        if seen.insert(span.source().id()) {
            sources.push(span.source().clone());
        }
    }
    for child in node.children() {
        collect_node_sources(&child, seen, sources);
    }
}

fn harvest_sources(roots: &RootList) -> Vec<Source> {
    let mut all = Vec::new();
    for root in roots.iter() {
        all.extend(collect_sources(&root));
    }
    all
}
