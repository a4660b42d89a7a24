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

//! Probes: the per-location extension points spliced into host trees.
//!
//! A probe owns a lazily rebuilt event chain guarded by a one-shot version
//! token. The dispatch fast path reads the published chain snapshot and its
//! token without taking any writer lock; any attach/dispose that could
//! affect the probe flips the token, and the next dispatch rebuilds the
//! chain from the current execution bindings. Rebuilds are serialized per
//! probe but concurrent dispatches over a superseded snapshot simply finish
//! on it.

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock, Weak};

use crate::binding::EventBinding;
use crate::error::{DispatchError, EventPhase, ListenerError};
use crate::events::{
    EventContext, ExecutionEventListener, ExecutionEventNode, Frame, GuestException,
};
use crate::handler::InstrumentationHandler;
use crate::tree::{LanguageInfo, WrapperNode};

/// The runtime extension point at one wrapped location.
///
/// The host's wrapper implementation calls [`on_enter`](Probe::on_enter)
/// before executing its delegate and exactly one of
/// [`on_return_value`](Probe::on_return_value) /
/// [`on_return_exceptional`](Probe::on_return_exceptional) afterwards.
pub struct Probe {
    handler: Weak<InstrumentationHandler>,
    context: EventContext,
    language: LanguageInfo,
    wrapper: OnceLock<Weak<dyn WrapperNode>>,
    published: RwLock<Option<Arc<ChainSnapshot>>>,
    /// Serializes slow-path rebuilds of this probe.
    rebuild: Mutex<()>,
    rebuilds: AtomicUsize,
}

/// A published chain plus the version token that keeps it current. An
/// empty chain is published too (head `None`) so that a later attach can
/// still invalidate the token and trigger a rebuild.
pub(crate) struct ChainSnapshot {
    valid: AtomicBool,
    head: Option<ChainNode>,
}

impl Probe {
    pub(crate) fn new(
        handler: Weak<InstrumentationHandler>,
        context: EventContext,
        language: LanguageInfo,
    ) -> Probe {
        Probe {
            handler,
            context,
            language,
            wrapper: OnceLock::new(),
            published: RwLock::new(None),
            rebuild: Mutex::new(()),
            rebuilds: AtomicUsize::new(0),
        }
    }

    /// The static context of this probe's location.
    pub fn context(&self) -> &EventContext {
        &self.context
    }

    /// How many times the chain has been recomputed. Observable so tests
    /// and tools can verify invalidation behavior.
    pub fn rebuild_count(&self) -> usize {
        self.rebuilds.load(Ordering::Acquire)
    }

    /// Marks the cached chain stale; the next dispatch rebuilds it. Cheap
    /// and idempotent.
    pub fn invalidate(&self) {
        if let Some(snapshot) = self.snapshot() {
            snapshot.valid.store(false, Ordering::Release);
            log::trace!("invalidated probe chain at {:?}", self.context.span());
        }
    }

    /// Dispatches node entry through the chain.
    pub fn on_enter(&self, frame: &mut Frame) -> Result<(), DispatchError> {
        if let Some(snapshot) = self.current_chain(frame)? {
            if let Some(head) = &snapshot.head {
                head.dispatch_enter(&self.context, frame)?;
            }
        }
        Ok(())
    }

    /// Dispatches a normal return through the chain.
    pub fn on_return_value(
        &self,
        frame: &mut Frame,
        value: &(dyn Any + Send),
    ) -> Result<(), DispatchError> {
        if let Some(snapshot) = self.current_chain(frame)? {
            if let Some(head) = &snapshot.head {
                head.dispatch_return_value(&self.context, frame, value)?;
            }
        }
        Ok(())
    }

    /// Dispatches an exceptional return through the chain. Secondary faults
    /// of privileged bindings are attached to `exception` as suppressed
    /// errors; this entry point itself never fails the unwinding program.
    pub fn on_return_exceptional(&self, frame: &mut Frame, exception: &mut GuestException) {
        match self.current_chain(frame) {
            Ok(Some(snapshot)) => {
                if let Some(head) = &snapshot.head {
                    head.dispatch_return_exceptional(&self.context, frame, exception);
                }
            }
            Ok(None) => {}
            Err(error) => exception.add_suppressed(error),
        }
    }

    /// The stateful event node a factory binding created at this location,
    /// if any.
    pub fn lookup_event_node(
        &self,
        binding: &Arc<EventBinding>,
    ) -> Option<Arc<dyn ExecutionEventNode>> {
        let snapshot = self.snapshot()?;
        let mut node = snapshot.head.as_ref();
        while let Some(n) = node {
            if Arc::ptr_eq(&n.binding, binding) {
                if let ChainPayload::EventNode(event_node) = &n.payload {
                    return Some(event_node.clone());
                }
            }
            node = n.next.as_deref();
        }
        None
    }

    pub(crate) fn language(&self) -> &LanguageInfo {
        &self.language
    }

    pub(crate) fn attach_wrapper(&self, wrapper: &Arc<dyn WrapperNode>) {
        let _ = self.wrapper.set(Arc::downgrade(wrapper));
    }

    pub(crate) fn wrapper(&self) -> Option<Arc<dyn WrapperNode>> {
        self.wrapper.get().and_then(Weak::upgrade)
    }

    fn snapshot(&self) -> Option<Arc<ChainSnapshot>> {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Fast path: the published snapshot while its token holds. Slow path:
    /// rebuild from the current binding set.
    fn current_chain(
        &self,
        frame: &mut Frame,
    ) -> Result<Option<Arc<ChainSnapshot>>, DispatchError> {
        if let Some(snapshot) = self.snapshot() {
            if snapshot.valid.load(Ordering::Acquire) {
                return Ok(Some(snapshot));
            }
        }
        self.rebuild_chain(frame)
    }

    fn rebuild_chain(
        &self,
        frame: &mut Frame,
    ) -> Result<Option<Arc<ChainSnapshot>>, DispatchError> {
        let guard = self.rebuild.lock().unwrap_or_else(PoisonError::into_inner);

        // Another thread may have rebuilt while we waited for the lock.
        if let Some(snapshot) = self.snapshot() {
            if snapshot.valid.load(Ordering::Acquire) {
                return Ok(Some(snapshot));
            }
        }

        let Some(handler) = self.handler.upgrade() else {
            *self
                .published
                .write()
                .unwrap_or_else(PoisonError::into_inner) = None;
            return Ok(None);
        };

        let head = handler.create_chain(self)?;
        let rebuilt_empty = head.is_none();
        let fresh = Arc::new(ChainSnapshot {
            valid: AtomicBool::new(true),
            head,
        });

        let old = {
            let mut published = self
                .published
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *published, Some(fresh.clone()))
        };
        self.rebuilds.fetch_add(1, Ordering::AcqRel);
        drop(guard);

        if rebuilt_empty {
            // No binding matches anymore; ask for lazy unwrapping. The
            // superseded chain is unreachable along with its location.
            handler.remove_wrapper(self);
            return Ok(None);
        }

        // Give the superseded chain a chance to clean up per-location state,
        // outside the rebuild lock.
        if let Some(old) = old {
            if let Some(old_head) = &old.head {
                old_head.dispatch_dispose(&self.context, frame)?;
            }
        }
        Ok(Some(fresh))
    }
}

impl std::fmt::Debug for Probe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Probe")
            .field("span", &self.context.span())
            .field("language", &self.language.name())
            .field("rebuilds", &self.rebuild_count())
            .finish_non_exhaustive()
    }
}

/// Listener payload of one chain node.
pub(crate) enum ChainPayload {
    Listener(Arc<dyn ExecutionEventListener>),
    EventNode(Arc<dyn ExecutionEventNode>),
}

/// One node of an event chain, owning the binding's payload for this
/// location and linking to the node of the next matching binding.
pub(crate) struct ChainNode {
    binding: Arc<EventBinding>,
    payload: ChainPayload,
    /// Promote isolated faults to dispatch errors (handler setting).
    strict_faults: bool,
    /// One-shot: first isolated fault of this node has been logged.
    seen_fault: AtomicBool,
    next: Option<Box<ChainNode>>,
}

impl ChainNode {
    pub(crate) fn new(
        binding: Arc<EventBinding>,
        payload: ChainPayload,
        strict_faults: bool,
        next: Option<Box<ChainNode>>,
    ) -> ChainNode {
        ChainNode {
            binding,
            payload,
            strict_faults,
            seen_fault: AtomicBool::new(false),
            next,
        }
    }

    fn dispatch_enter(&self, ctx: &EventContext, frame: &mut Frame) -> Result<(), DispatchError> {
        let mut node = Some(self);
        while let Some(n) = node {
            let result = match &n.payload {
                ChainPayload::Listener(l) => l.on_enter(ctx, frame),
                ChainPayload::EventNode(e) => e.on_enter(frame),
            };
            n.absorb_fault(result, EventPhase::Enter)?;
            node = n.next.as_deref();
        }
        Ok(())
    }

    fn dispatch_return_value(
        &self,
        ctx: &EventContext,
        frame: &mut Frame,
        value: &(dyn Any + Send),
    ) -> Result<(), DispatchError> {
        let mut node = Some(self);
        while let Some(n) = node {
            let result = match &n.payload {
                ChainPayload::Listener(l) => l.on_return_value(ctx, frame, value),
                ChainPayload::EventNode(e) => e.on_return_value(frame, value),
            };
            n.absorb_fault(result, EventPhase::ReturnValue)?;
            node = n.next.as_deref();
        }
        Ok(())
    }

    fn dispatch_return_exceptional(
        &self,
        ctx: &EventContext,
        frame: &mut Frame,
        exception: &mut GuestException,
    ) {
        let mut node = Some(self);
        while let Some(n) = node {
            let result = match &n.payload {
                ChainPayload::Listener(l) => l.on_return_exceptional(ctx, frame, exception),
                ChainPayload::EventNode(e) => e.on_return_exceptional(frame, exception),
            };
            if let Err(fault) = result {
                if n.binding.is_privileged() || n.strict_faults {
                    // The original exception stays primary.
                    exception.add_suppressed(DispatchError {
                        phase: EventPhase::ReturnExceptional,
                        source: fault,
                    });
                } else {
                    n.log_isolated_fault(EventPhase::ReturnExceptional, &fault);
                }
            }
            node = n.next.as_deref();
        }
    }

    fn dispatch_dispose(&self, ctx: &EventContext, frame: &mut Frame) -> Result<(), DispatchError> {
        let mut node = Some(self);
        while let Some(n) = node {
            let result = match &n.payload {
                ChainPayload::Listener(l) => l.on_dispose(ctx, frame),
                ChainPayload::EventNode(e) => e.on_dispose(frame),
            };
            n.absorb_fault(result, EventPhase::Dispose)?;
            node = n.next.as_deref();
        }
        Ok(())
    }

    /// Applies the fault policy: privileged (or strict-mode) faults
    /// propagate; tool faults are logged once per node and swallowed.
    fn absorb_fault(
        &self,
        result: Result<(), ListenerError>,
        phase: EventPhase,
    ) -> Result<(), DispatchError> {
        let Err(fault) = result else { return Ok(()) };
        if self.binding.is_privileged() || self.strict_faults {
            return Err(DispatchError { phase, source: fault });
        }
        self.log_isolated_fault(phase, &fault);
        Ok(())
    }

    fn log_isolated_fault(&self, phase: EventPhase, fault: &ListenerError) {
        if !self.seen_fault.swap(true, Ordering::AcqRel) {
            log::error!(
                "listener of binding #{} ('{}') failed during {phase}: {fault}; \
                 the binding stays attached and dispatch continues",
                self.binding.id(),
                self.binding.origin()
            );
        }
    }
}
