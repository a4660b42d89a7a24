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

//! Boundary traits the host's tree representation must implement.
//!
//! The engine never owns guest trees; it walks them through
//! [`InstrumentableNode`], splices [`WrapperNode`]s in via the host's own
//! replacement mechanism, and is told about tree lifecycles through root
//! registration on the handler. All node handles are shared (`Arc`) because
//! an arbitrary number of guest threads may execute through a node while the
//! engine holds references to it.

use std::any::Any;
use std::sync::Arc;

use arbor_core::{SourceSpan, TagSet};

use crate::error::InstrumentError;
use crate::probe::Probe;

/// Shared handle to a host tree node.
pub type NodeRef = Arc<dyn InstrumentableNode>;

/// Identity and declared tag universe of a guest language.
#[derive(Debug, Clone)]
pub struct LanguageInfo {
    name: Arc<str>,
    provided_tags: TagSet,
}

impl LanguageInfo {
    /// Describes a language and the tags its nodes may resolve to.
    pub fn new(name: impl Into<Arc<str>>, provided_tags: TagSet) -> LanguageInfo {
        LanguageInfo {
            name: name.into(),
            provided_tags,
        }
    }

    /// The language's name, used in diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The tags this language declares. Filters of language instrumenters
    /// must stay within this set; node tag resolution is masked by it.
    pub fn provided_tags(&self) -> TagSet {
        self.provided_tags
    }
}

/// One node of a host tree, as seen by the engine.
///
/// Implementations must be safe to call from any thread; the engine reads
/// tree structure while guest threads execute through it.
pub trait InstrumentableNode: Send + Sync {
    /// The node's current parent, if adopted into a tree.
    fn parent(&self) -> Option<NodeRef>;

    /// The node's current children.
    fn children(&self) -> Vec<NodeRef>;

    /// The node's location, if it has one.
    fn span(&self) -> Option<SourceSpan>;

    /// The tags this node resolves to. The engine masks the result with the
    /// owning language's declared tags.
    fn resolved_tags(&self) -> TagSet;

    /// Whether this node type opted into instrumentation. Nodes answering
    /// `false` are silently skipped during wrapper insertion.
    fn is_instrumentable(&self) -> bool {
        true
    }

    /// If this node is a wrapper, a view of its wrapper interface.
    fn as_wrapper(&self) -> Option<&dyn WrapperNode> {
        None
    }

    /// Creates a wrapper around this node owning the given probe, or `None`
    /// if the node cannot be wrapped. The tree must not be mutated here;
    /// splicing happens through [`replace_child`](Self::replace_child).
    fn create_wrapper(self: Arc<Self>, probe: Arc<Probe>) -> Option<Arc<dyn WrapperNode>>;

    /// Replaces the child `old` with `new`, re-adopting `new` (and, when
    /// `new` is a wrapper of `old`, re-adopting `old` under that wrapper).
    fn replace_child(&self, old: &NodeRef, new: NodeRef) -> Result<(), InstrumentError>;

    /// Whether atomically replacing `old` with `replacement` is safe while
    /// other threads execute through this node. Hosts with specialized or
    /// inlined child accesses must veto replacements they cannot make
    /// atomically; the engine turns a veto into a fatal configuration error.
    fn is_replacement_safe(&self, old: &NodeRef, replacement: &NodeRef) -> bool {
        let _ = (old, replacement);
        true
    }

    /// Downcast support for hosts recovering their concrete node types
    /// inside [`replace_child`](Self::replace_child).
    fn as_any(&self) -> &dyn Any;
}

/// The splice point physically standing in for an instrumented node.
///
/// Exactly one wrapper exists per wrapped node. The host's execution of a
/// wrapper must call the probe's dispatch entry points around the delegate
/// in a `try/finally` discipline: `on_enter`, then exactly one of
/// `on_return_value` or `on_return_exceptional`.
pub trait WrapperNode: Send + Sync {
    /// The original node this wrapper stands in for.
    fn delegate(&self) -> NodeRef;

    /// The probe owned by this wrapper.
    fn probe(&self) -> Arc<Probe>;

    /// This wrapper viewed as a tree node, for splicing.
    fn as_node(self: Arc<Self>) -> NodeRef;
}

/// The root of a host tree.
pub trait RootNode: Send + Sync {
    /// The language owning this root.
    fn language(&self) -> &LanguageInfo;

    /// The root's overall location, if known. Used for cheap per-root
    /// pre-filtering before a full walk.
    fn span(&self) -> Option<SourceSpan>;

    /// The instrumentable body of the root.
    fn body(&self) -> NodeRef;
}

/// Pointer identity of two node handles, ignoring vtable identity.
/// Hosts typically need this inside [`InstrumentableNode::replace_child`].
pub fn same_node(a: &NodeRef, b: &NodeRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
