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

//! Source identities, spans, and index ranges.
//!
//! A [`Source`] identifies one unit of guest code (a file, an eval chunk); a
//! [`SourceSpan`] is the location of a node inside it. Spans are the
//! "location" half of every filter match and must be cheap to clone, compare,
//! and hash.

use std::fmt;
use std::sync::Arc;

use crate::filter::FilterError;

/// Stable identity of a source, assigned by the host.
///
/// Two [`Source`] values describe the same source if and only if their ids
/// are equal; names and MIME types are informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub u64);

/// One unit of guest code the host has loaded.
#[derive(Debug, Clone)]
pub struct Source {
    id: SourceId,
    name: Arc<str>,
    mime_type: Option<Arc<str>>,
}

impl Source {
    /// Creates a source descriptor.
    pub fn new(id: SourceId, name: impl Into<Arc<str>>, mime_type: Option<&str>) -> Source {
        Source {
            id,
            name: name.into(),
            mime_type: mime_type.map(Arc::from),
        }
    }

    /// The host-assigned identity.
    pub fn id(&self) -> SourceId {
        self.id
    }

    /// Human-readable name (path, eval label, ...).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared MIME type, if the host knows one.
    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }
}

impl PartialEq for Source {
    fn eq(&self, other: &Source) -> bool {
        self.id == other.id
    }
}

impl Eq for Source {}

impl std::hash::Hash for Source {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// A half-open character index range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexRange {
    start: u32,
    end: u32,
}

impl IndexRange {
    /// Builds a range from inclusive start to exclusive end.
    pub fn between(start: u32, end: u32) -> Result<IndexRange, FilterError> {
        if end < start {
            return Err(FilterError::InvalidRange { start, end });
        }
        Ok(IndexRange { start, end })
    }

    /// Builds a range from a start index and a length.
    pub fn by_length(start: u32, length: u32) -> Result<IndexRange, FilterError> {
        IndexRange::between(start, start.saturating_add(length))
    }

    /// Inclusive start index.
    pub fn start(&self) -> u32 {
        self.start
    }

    /// Exclusive end index.
    pub fn end(&self) -> u32 {
        self.end
    }

    /// Whether this range overlaps the closed-start, inclusive-end span
    /// `[other_start, other_end]`.
    pub fn overlaps(&self, other_start: u32, other_end: u32) -> bool {
        self.start <= other_end && other_start < self.end
    }
}

impl fmt::Display for IndexRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// The location of a node: a character and line range inside one source.
///
/// This is the opaque "location" tools filter on. Equality covers the source
/// identity and the character range; line numbers are derived data.
#[derive(Debug, Clone)]
pub struct SourceSpan {
    source: Source,
    char_start: u32,
    char_len: u32,
    line_start: u32,
    line_end: u32,
}

impl SourceSpan {
    /// Creates a span. Lines are 1-based; `line_end` is inclusive.
    pub fn new(
        source: Source,
        char_start: u32,
        char_len: u32,
        line_start: u32,
        line_end: u32,
    ) -> SourceSpan {
        SourceSpan {
            source,
            char_start,
            char_len,
            line_start,
            line_end,
        }
    }

    /// The source this span lies in.
    pub fn source(&self) -> &Source {
        &self.source
    }

    /// First character index covered.
    pub fn char_start(&self) -> u32 {
        self.char_start
    }

    /// Number of characters covered.
    pub fn char_len(&self) -> u32 {
        self.char_len
    }

    /// Last character index covered; equals `char_start` for empty spans.
    pub fn char_end(&self) -> u32 {
        if self.char_len == 0 {
            self.char_start
        } else {
            self.char_start + self.char_len - 1
        }
    }

    /// First line covered (1-based).
    pub fn line_start(&self) -> u32 {
        self.line_start
    }

    /// Last line covered (1-based, inclusive).
    pub fn line_end(&self) -> u32 {
        self.line_end
    }

    /// Whether `other` lies entirely within this span, in the same source.
    pub fn encloses(&self, other: &SourceSpan) -> bool {
        self.source == other.source
            && self.char_start <= other.char_start
            && other.char_end() <= self.char_end()
    }
}

impl PartialEq for SourceSpan {
    fn eq(&self, other: &SourceSpan) -> bool {
        self.source == other.source
            && self.char_start == other.char_start
            && self.char_len == other.char_len
    }
}

impl Eq for SourceSpan {}

impl std::hash::Hash for SourceSpan {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.source.hash(state);
        self.char_start.hash(state);
        self.char_len.hash(state);
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{} (chars {}+{})",
            self.source.name(),
            self.line_start,
            self.line_end,
            self.char_start,
            self.char_len
        )
    }
}
