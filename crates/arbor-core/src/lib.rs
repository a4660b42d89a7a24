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

//! # Arbor Core
//!
//! Foundational crate containing the data model shared by the instrumentation
//! engine and its hosts: node tags and tag sets, source identities and spans,
//! and the declarative filter algebra used to select instrumentation points.

#![warn(missing_docs)]

pub mod filter;
pub mod source;
pub mod tag;

pub use filter::{Filter, FilterBuilder, FilterError};
pub use source::{IndexRange, Source, SourceId, SourceSpan};
pub use tag::{Tag, TagSet};
