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

//! Error types of the instrumentation engine.
//!
//! Two families exist. [`InstrumentError`] covers configuration errors:
//! API misuse detected on the control plane (attach/dispose), always fatal to
//! the offending call. [`DispatchError`] covers listener faults that escape
//! isolation, i.e. faults raised by language-privileged bindings which are
//! part of guest semantics and must reach the host.

use std::fmt;

use thiserror::Error;

use arbor_core::{FilterError, TagSet};

/// Boxed error type returned by listener callbacks.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Convenience alias for control-plane results.
pub type InstrumentResult<T> = Result<T, InstrumentError>;

/// The dispatch phase during which a listener fault occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventPhase {
    /// Creation of a per-location event node by a factory.
    Create,
    /// Node entry.
    Enter,
    /// Normal node exit with a value.
    ReturnValue,
    /// Exceptional node exit.
    ReturnExceptional,
    /// Chain teardown after a rebuild.
    Dispose,
    /// Load notification (span or source).
    Load,
    /// First-execution notification of a source.
    Execute,
}

impl fmt::Display for EventPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventPhase::Create => "create",
            EventPhase::Enter => "enter",
            EventPhase::ReturnValue => "return-value",
            EventPhase::ReturnExceptional => "return-exceptional",
            EventPhase::Dispose => "dispose",
            EventPhase::Load => "load",
            EventPhase::Execute => "execute",
        };
        f.write_str(name)
    }
}

/// A listener fault that is allowed to propagate out of dispatch.
///
/// Only faults of language-privileged bindings (or any binding when the
/// handler runs with strict fault promotion) surface this way; tool faults
/// are isolated and logged instead.
#[derive(Debug, Error)]
#[error("instrumentation listener failed during {phase}")]
pub struct DispatchError {
    /// Phase in which the listener failed.
    pub phase: EventPhase,
    /// The listener's own error.
    #[source]
    pub source: ListenerError,
}

/// Configuration errors: programmer misuse of the instrumentation API.
#[derive(Debug, Error)]
pub enum InstrumentError {
    /// `dispose()` was called on a binding that is already disposed.
    #[error("binding was already disposed")]
    AlreadyDisposed,
    /// A language instrumenter used a filter mentioning tags the language
    /// never declared.
    #[error("filter references tags not declared by language '{language}': {tags:?}")]
    UndeclaredTags {
        /// The declaring language.
        language: String,
        /// The undeclared tags the filter mentioned.
        tags: TagSet,
    },
    /// Wrapper insertion was attempted at a node without a parent.
    #[error("node has no parent to splice a wrapper into")]
    NotAdopted,
    /// The host vetoed the node-for-wrapper replacement as unsafe under
    /// concurrent execution.
    #[error("replacing the node with its wrapper is not safe under concurrent execution")]
    UnsafeReplacement,
    /// The host failed to perform a requested node replacement.
    #[error("replacing a node in the host tree failed: {0}")]
    ReplacementFailed(String),
    /// A source-level binding was attached with a filter that also
    /// discriminates on tags or spans.
    #[error("source-level bindings require a filter over source identity only")]
    SourceOnlyFilterRequired,
    /// Malformed filter.
    #[error(transparent)]
    Filter(#[from] FilterError),
    /// A privileged listener fault escalated out of a control-plane
    /// operation (e.g. retroactive notification during attach).
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}
