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

//! # Arbor Instrument
//!
//! Dynamic instrumentation engine over tree-shaped program representations.
//! Tools declare what to observe through filters over node tags and source
//! spans; the engine transparently splices probes into live trees, fires
//! listener callbacks in binding-attachment order, and rebuilds its dispatch
//! chains lazily while guest threads keep executing.
//!
//! Hosts implement the tree traits of [`tree`], drive lifecycle callbacks on
//! [`InstrumentationHandler`], and call the probe dispatch entry points from
//! their wrapper nodes. Tools attach through [`Instrumenter`] handles.

#![warn(missing_docs)]

pub mod binding;
pub(crate) mod collections;
pub mod config;
pub mod error;
pub mod events;
pub mod handler;
pub mod instrumenter;
pub mod output;
pub mod probe;
pub mod tree;

pub use binding::EventBinding;
pub use config::HandlerSettings;
pub use error::{
    DispatchError, EventPhase, InstrumentError, InstrumentResult, ListenerError,
};
pub use events::{
    EventContext, EventNodeFactory, ExecuteSourceListener, ExecutionEventListener,
    ExecutionEventNode, Frame, GuestException, LoadSourceListener, LoadSpanListener,
    OutputConsumer,
};
pub use handler::InstrumentationHandler;
pub use instrumenter::Instrumenter;
pub use output::DispatchOutput;
pub use probe::Probe;
pub use tree::{same_node, InstrumentableNode, LanguageInfo, NodeRef, RootNode, WrapperNode};
