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

//! Listener traits and event payload types.
//!
//! Tools observe execution either through a shared, stateless
//! [`ExecutionEventListener`] or through per-location stateful
//! [`ExecutionEventNode`]s produced by an [`EventNodeFactory`]. Load-time
//! observation uses the span/source listener traits. All callbacks return
//! `Result`; how a returned error is treated depends on the owning binding's
//! privilege (see the probe dispatch rules).

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use arbor_core::{Source, SourceSpan};

use crate::error::{DispatchError, ListenerError};
use crate::tree::{InstrumentableNode, NodeRef};

/// Type-erased execution frame handed through dispatch untouched.
///
/// The engine never inspects frames; hosts and tools agree on the concrete
/// type out of band.
pub type Frame = dyn Any + Send;

/// The static context of one instrumented location.
#[derive(Debug, Clone)]
pub struct EventContext {
    span: Option<SourceSpan>,
    node: Weak<dyn InstrumentableNode>,
}

impl EventContext {
    pub(crate) fn new(span: Option<SourceSpan>, node: Weak<dyn InstrumentableNode>) -> Self {
        EventContext { span, node }
    }

    /// Location of the instrumented node, if it has one.
    pub fn span(&self) -> Option<&SourceSpan> {
        self.span.as_ref()
    }

    /// The instrumented node, unless its tree was dropped.
    pub fn node(&self) -> Option<NodeRef> {
        self.node.upgrade()
    }
}

/// An in-flight guest exception traveling through exceptional returns.
///
/// The payload is opaque to the engine. Faults raised by privileged
/// listeners during `on_return_exceptional` are attached as suppressed
/// errors rather than replacing the original.
pub struct GuestException {
    payload: Box<dyn Any + Send>,
    suppressed: Vec<DispatchError>,
}

impl GuestException {
    /// Wraps a guest-level exception payload.
    pub fn new(payload: Box<dyn Any + Send>) -> Self {
        GuestException {
            payload,
            suppressed: Vec::new(),
        }
    }

    /// The guest exception payload.
    pub fn payload(&self) -> &(dyn Any + Send) {
        &*self.payload
    }

    /// Consumes the exception, yielding its payload.
    pub fn into_payload(self) -> Box<dyn Any + Send> {
        self.payload
    }

    /// Attaches a secondary fault without replacing the original exception.
    pub fn add_suppressed(&mut self, error: DispatchError) {
        self.suppressed.push(error);
    }

    /// Secondary faults collected while this exception unwound.
    pub fn suppressed(&self) -> &[DispatchError] {
        &self.suppressed
    }
}

impl fmt::Debug for GuestException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuestException")
            .field("suppressed", &self.suppressed)
            .finish_non_exhaustive()
    }
}

/// A stateless listener shared across every location its binding matches.
///
/// All methods default to doing nothing so tools implement only the phases
/// they care about.
pub trait ExecutionEventListener: Send + Sync {
    /// A matched node is about to execute.
    fn on_enter(&self, ctx: &EventContext, frame: &mut Frame) -> Result<(), ListenerError> {
        let _ = (ctx, frame);
        Ok(())
    }

    /// A matched node finished normally. `value` is the node's result,
    /// opaque to the engine.
    fn on_return_value(
        &self,
        ctx: &EventContext,
        frame: &mut Frame,
        value: &(dyn Any + Send),
    ) -> Result<(), ListenerError> {
        let _ = (ctx, frame, value);
        Ok(())
    }

    /// A matched node finished by raising `exception`.
    fn on_return_exceptional(
        &self,
        ctx: &EventContext,
        frame: &mut Frame,
        exception: &GuestException,
    ) -> Result<(), ListenerError> {
        let _ = (ctx, frame, exception);
        Ok(())
    }

    /// The event chain containing this listener is being replaced; last
    /// chance to flush per-location state derived from earlier events.
    fn on_dispose(&self, ctx: &EventContext, frame: &mut Frame) -> Result<(), ListenerError> {
        let _ = (ctx, frame);
        Ok(())
    }
}

/// A stateful per-location event node. One instance exists per (binding,
/// probe) pair, created by the binding's factory; it needs no context
/// parameter because it was built for exactly one location.
pub trait ExecutionEventNode: Send + Sync {
    /// See [`ExecutionEventListener::on_enter`].
    fn on_enter(&self, frame: &mut Frame) -> Result<(), ListenerError> {
        let _ = frame;
        Ok(())
    }

    /// See [`ExecutionEventListener::on_return_value`].
    fn on_return_value(
        &self,
        frame: &mut Frame,
        value: &(dyn Any + Send),
    ) -> Result<(), ListenerError> {
        let _ = (frame, value);
        Ok(())
    }

    /// See [`ExecutionEventListener::on_return_exceptional`].
    fn on_return_exceptional(
        &self,
        frame: &mut Frame,
        exception: &GuestException,
    ) -> Result<(), ListenerError> {
        let _ = (frame, exception);
        Ok(())
    }

    /// See [`ExecutionEventListener::on_dispose`].
    fn on_dispose(&self, frame: &mut Frame) -> Result<(), ListenerError> {
        let _ = frame;
        Ok(())
    }
}

/// Produces one [`ExecutionEventNode`] per matched location.
pub trait EventNodeFactory: Send + Sync {
    /// Creates the event node for `ctx`. Called during chain construction;
    /// a returned error is treated like a listener fault of the owning
    /// binding (the location then runs without this binding's node).
    fn create(&self, ctx: &EventContext) -> Result<Arc<dyn ExecutionEventNode>, ListenerError>;
}

/// Observes instrumentable locations as their trees are loaded.
pub trait LoadSpanListener: Send + Sync {
    /// A location matching the binding's filter became known.
    fn on_load(&self, ctx: &EventContext) -> Result<(), ListenerError>;
}

/// Observes distinct sources as they are first loaded.
pub trait LoadSourceListener: Send + Sync {
    /// `source` was seen for the first time.
    fn on_load(&self, source: &Source) -> Result<(), ListenerError>;
}

/// Observes distinct sources as they are first executed.
pub trait ExecuteSourceListener: Send + Sync {
    /// A root of `source` ran for the first time.
    fn on_execute(&self, source: &Source) -> Result<(), ListenerError>;
}

/// A byte sink receiving the engine's guest output or error stream.
pub trait OutputConsumer: Send + Sync {
    /// Receives a chunk of stream data.
    fn write(&self, bytes: &[u8]);

    /// Flushes buffered data; called when the consumer's binding is
    /// disposed.
    fn flush(&self) {}
}
