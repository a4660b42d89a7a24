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

//! Declarative filters over (tag set, span) pairs.
//!
//! A [`Filter`] is an immutable conjunction of expressions built once through
//! [`FilterBuilder`]. Within one expression, multiple values are disjunctive:
//! `tag_is({STATEMENT, CALL})` matches either tag, while chaining
//! `tag_is(..)` and `line_in(..)` requires both to hold.
//!
//! Expressions carry a static order weight and are sorted ascending at
//! `build()`, so cheap source-identity checks short-circuit before tag
//! resolution and span arithmetic. The order is fixed for the lifetime of
//! the filter.

use std::fmt;

use thiserror::Error;

use crate::source::{IndexRange, Source, SourceId, SourceSpan};
use crate::tag::{Tag, TagSet};

/// Errors raised while constructing a [`Filter`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    /// The filter discriminates on tags alone but requests none of the
    /// root/statement/call categories, so it could never select a
    /// meaningful instrumentation point.
    #[error("filter must request at least one of the ROOT, STATEMENT or CALL tags")]
    MissingCategory,
    /// An index range with `end < start`.
    #[error("invalid index range: end {end} lies before start {start}")]
    InvalidRange {
        /// Requested start index.
        start: u32,
        /// Requested end index.
        end: u32,
    },
    /// A line number below 1 (lines are 1-based).
    #[error("invalid line number {line}: lines are 1-based")]
    InvalidLine {
        /// The offending line number.
        line: u32,
    },
}

/// One filter expression. Values within a variant are disjunctive.
#[derive(Debug, Clone, PartialEq)]
enum Expr {
    SourceIs(Vec<SourceId>),
    MimeTypeIs(Vec<String>),
    TagIs(TagSet),
    SpanEquals(Vec<SourceSpan>),
    RootSpanEquals(Vec<SourceSpan>),
    IndexIn(Vec<IndexRange>),
    LineIn(Vec<IndexRange>),
    Not(Box<Expr>),
}

impl Expr {
    /// Static evaluation-order weight; lower evaluates first. Negation keeps
    /// the weight of its operand.
    fn order(&self) -> u8 {
        match self {
            Expr::SourceIs(_) => 1,
            Expr::MimeTypeIs(_) => 2,
            Expr::TagIs(_) => 4,
            Expr::SpanEquals(_) | Expr::RootSpanEquals(_) => 6,
            Expr::IndexIn(_) => 8,
            Expr::LineIn(_) => 10,
            Expr::Not(inner) => inner.order(),
        }
    }

    /// Whether this expression only consults source identity, never node
    /// tags or spans.
    fn is_source_only(&self) -> bool {
        match self {
            Expr::SourceIs(_) | Expr::MimeTypeIs(_) => true,
            Expr::Not(inner) => inner.is_source_only(),
            _ => false,
        }
    }

    /// Whether this expression is a (possibly negated) tag predicate.
    fn is_tag_only(&self) -> bool {
        match self {
            Expr::TagIs(_) => true,
            Expr::Not(inner) => inner.is_tag_only(),
            _ => false,
        }
    }

    fn matches_leaf(&self, tags: TagSet, span: Option<&SourceSpan>) -> bool {
        match self {
            Expr::SourceIs(ids) => span.is_some_and(|s| ids.contains(&s.source().id())),
            Expr::MimeTypeIs(mimes) => span
                .and_then(|s| s.source().mime_type())
                .is_some_and(|mime| mimes.iter().any(|m| m == mime)),
            Expr::TagIs(set) => set.intersects(tags),
            Expr::SpanEquals(spans) => span.is_some_and(|s| spans.contains(s)),
            // Root equality is settled by the root pre-filter; at leaf level
            // every node of an included root matches.
            Expr::RootSpanEquals(_) => true,
            Expr::IndexIn(ranges) => span.is_some_and(|s| {
                ranges
                    .iter()
                    .any(|r| r.overlaps(s.char_start(), s.char_end()))
            }),
            Expr::LineIn(ranges) => span.is_some_and(|s| {
                ranges
                    .iter()
                    .any(|r| r.overlaps(s.line_start(), s.line_end()))
            }),
            Expr::Not(inner) => !inner.matches_leaf(tags, span),
        }
    }

    /// Conservative root-level check: may answer `true` on uncertainty but
    /// never `false` when a leaf inside the root could still match.
    fn matches_root(&self, provided_tags: TagSet, root_span: Option<&SourceSpan>) -> bool {
        match self {
            Expr::SourceIs(ids) => {
                root_span.is_none_or(|rs| ids.contains(&rs.source().id()))
            }
            Expr::MimeTypeIs(mimes) => match root_span.and_then(|rs| rs.source().mime_type()) {
                Some(mime) => mimes.iter().any(|m| m == mime),
                None => true,
            },
            Expr::TagIs(set) => set.intersects(provided_tags),
            Expr::SpanEquals(spans) => {
                root_span.is_none_or(|rs| spans.iter().any(|s| rs.encloses(s)))
            }
            Expr::RootSpanEquals(spans) => root_span.is_some_and(|rs| spans.contains(rs)),
            Expr::IndexIn(ranges) => root_span.is_none_or(|rs| {
                ranges
                    .iter()
                    .any(|r| r.overlaps(rs.char_start(), rs.char_end()))
            }),
            Expr::LineIn(ranges) => root_span.is_none_or(|rs| {
                ranges
                    .iter()
                    .any(|r| r.overlaps(rs.line_start(), rs.line_end()))
            }),
            // A negated expression can exclude individual leaves without
            // excluding the whole root.
            Expr::Not(_) => true,
        }
    }

    fn matches_source(&self, source: &Source) -> bool {
        match self {
            Expr::SourceIs(ids) => ids.contains(&source.id()),
            Expr::MimeTypeIs(mimes) => source
                .mime_type()
                .is_some_and(|mime| mimes.iter().any(|m| m == mime)),
            Expr::Not(inner) => !inner.matches_source(source),
            // Non-source expressions cannot reject a whole source.
            _ => true,
        }
    }

    fn collect_tags(&self, into: &mut TagSet) {
        match self {
            Expr::TagIs(set) => *into = into.union(*set),
            Expr::Not(inner) => inner.collect_tags(into),
            _ => {}
        }
    }
}

/// An immutable predicate selecting instrumentation points by tag and span.
///
/// Built via [`Filter::builder`]; all expressions are conjoined.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    expressions: Box<[Expr]>,
}

impl Filter {
    /// Starts building a filter.
    pub fn builder() -> FilterBuilder {
        FilterBuilder { expressions: Vec::new() }
    }

    /// Cheap per-root pre-check: `false` proves that no node inside a root
    /// with the given declared tags and span can satisfy this filter, so a
    /// tree walk may skip the root entirely. `true` is not a promise that
    /// any leaf matches.
    pub fn matches_root(&self, provided_tags: TagSet, root_span: Option<&SourceSpan>) -> bool {
        self.expressions
            .iter()
            .all(|e| e.matches_root(provided_tags, root_span))
    }

    /// Full per-node check against the node's resolved tags and span.
    pub fn matches_leaf(&self, tags: TagSet, span: Option<&SourceSpan>) -> bool {
        self.expressions.iter().all(|e| e.matches_leaf(tags, span))
    }

    /// Source-level check used by source load/execute bindings.
    pub fn matches_source(&self, source: &Source) -> bool {
        self.expressions.iter().all(|e| e.matches_source(source))
    }

    /// Whether every expression consults source identity only, making the
    /// filter usable for source-level bindings.
    pub fn is_source_only(&self) -> bool {
        self.expressions.iter().all(Expr::is_source_only)
    }

    /// Union of all tags the filter mentions, for declared-tag verification.
    pub fn referenced_tags(&self) -> TagSet {
        let mut tags = TagSet::EMPTY;
        for expr in self.expressions.iter() {
            expr.collect_tags(&mut tags);
        }
        tags
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Filter({} expressions)", self.expressions.len())
    }
}

/// Accumulates filter expressions; see [`Filter`] for the matching contract.
#[derive(Debug, Clone)]
pub struct FilterBuilder {
    expressions: Vec<Expr>,
}

impl FilterBuilder {
    /// Restricts matches to nodes inside one of the given sources.
    #[must_use]
    pub fn source_is<I: IntoIterator<Item = Source>>(mut self, sources: I) -> Self {
        self.expressions
            .push(Expr::SourceIs(sources.into_iter().map(|s| s.id()).collect()));
        self
    }

    /// Restricts matches to sources declaring one of the given MIME types.
    #[must_use]
    pub fn mime_type_is(mut self, mime_types: &[&str]) -> Self {
        self.expressions.push(Expr::MimeTypeIs(
            mime_types.iter().map(|m| (*m).to_string()).collect(),
        ));
        self
    }

    /// Requires the node to carry at least one of the given tags.
    #[must_use]
    pub fn tag_is(mut self, tags: TagSet) -> Self {
        self.expressions.push(Expr::TagIs(tags));
        self
    }

    /// Excludes nodes carrying any of the given tags.
    #[must_use]
    pub fn tag_is_not(mut self, tags: TagSet) -> Self {
        self.expressions.push(Expr::Not(Box::new(Expr::TagIs(tags))));
        self
    }

    /// Requires the node's span to equal one of the given spans exactly.
    #[must_use]
    pub fn span_equals<I: IntoIterator<Item = SourceSpan>>(mut self, spans: I) -> Self {
        self.expressions
            .push(Expr::SpanEquals(spans.into_iter().collect()));
        self
    }

    /// Requires the node's enclosing root to have one of the given spans.
    #[must_use]
    pub fn root_span_equals<I: IntoIterator<Item = SourceSpan>>(mut self, spans: I) -> Self {
        self.expressions
            .push(Expr::RootSpanEquals(spans.into_iter().collect()));
        self
    }

    /// Requires the node's character range to overlap one of the ranges.
    #[must_use]
    pub fn index_in(mut self, ranges: Vec<IndexRange>) -> Self {
        self.expressions.push(Expr::IndexIn(ranges));
        self
    }

    /// Excludes nodes whose character range overlaps any of the ranges.
    #[must_use]
    pub fn index_not_in(mut self, ranges: Vec<IndexRange>) -> Self {
        self.expressions
            .push(Expr::Not(Box::new(Expr::IndexIn(ranges))));
        self
    }

    /// Requires the node's line range to overlap one of the (1-based)
    /// line ranges.
    pub fn line_in(mut self, ranges: Vec<IndexRange>) -> Result<Self, FilterError> {
        for range in &ranges {
            if range.start() < 1 {
                return Err(FilterError::InvalidLine { line: range.start() });
            }
        }
        self.expressions.push(Expr::LineIn(ranges));
        Ok(self)
    }

    /// Requires the node to cover the given 1-based line.
    pub fn line_is(self, line: u32) -> Result<Self, FilterError> {
        if line < 1 {
            return Err(FilterError::InvalidLine { line });
        }
        self.line_in(vec![IndexRange::by_length(line, 1)?])
    }

    /// Validates and freezes the filter, sorting expressions by evaluation
    /// order.
    pub fn build(mut self) -> Result<Filter, FilterError> {
        let only_tags = self.expressions.iter().all(Expr::is_tag_only);
        if only_tags {
            let mut requested = TagSet::EMPTY;
            for expr in &self.expressions {
                if let Expr::TagIs(set) = expr {
                    requested = requested.union(*set);
                }
            }
            let categories = TagSet::of(&[Tag::ROOT, Tag::STATEMENT, Tag::CALL]);
            if !requested.intersects(categories) {
                return Err(FilterError::MissingCategory);
            }
        }
        self.expressions.sort_by_key(Expr::order);
        Ok(Filter {
            expressions: self.expressions.into_boxed_slice(),
        })
    }
}
