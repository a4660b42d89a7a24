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

//! Node category tags and compact tag sets.
//!
//! A [`Tag`] marks a node as belonging to a category a tool can filter on
//! (statements, calls, expressions, ...). Each language declares the tags it
//! provides; a node resolves to a subset of those. Tags are bit indices into
//! a 64-slot universe so that per-node tag queries stay a single mask test.

use std::fmt;

/// Maximum number of distinct tags a process may declare.
pub const MAX_TAGS: u8 = 64;

/// A category marker attached to tree nodes, identified by its bit index.
///
/// The well-known tags cover the categories every language is expected to
/// provide; hosts mint additional tags with [`Tag::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(u8);

impl Tag {
    /// Marks the entry node of a root (function/program body).
    pub const ROOT: Tag = Tag(0);
    /// Marks a node that represents one source statement.
    pub const STATEMENT: Tag = Tag(1);
    /// Marks a node that performs a guest-level call.
    pub const CALL: Tag = Tag(2);
    /// Marks a node that produces a value.
    pub const EXPRESSION: Tag = Tag(3);

    /// Creates a tag for the given bit index, or `None` if the index is
    /// outside the 64-tag universe.
    pub const fn new(bit: u8) -> Option<Tag> {
        if bit < MAX_TAGS {
            Some(Tag(bit))
        } else {
            None
        }
    }

    /// The bit index identifying this tag.
    pub const fn bit(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Tag::ROOT => write!(f, "ROOT"),
            Tag::STATEMENT => write!(f, "STATEMENT"),
            Tag::CALL => write!(f, "CALL"),
            Tag::EXPRESSION => write!(f, "EXPRESSION"),
            Tag(bit) => write!(f, "TAG({bit})"),
        }
    }
}

/// An immutable set of [`Tag`]s backed by a single `u64` mask.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TagSet(u64);

impl TagSet {
    /// The empty tag set.
    pub const EMPTY: TagSet = TagSet(0);

    /// Builds a set from a slice of tags.
    pub fn of(tags: &[Tag]) -> TagSet {
        let mut mask = 0u64;
        for tag in tags {
            mask |= 1u64 << tag.bit();
        }
        TagSet(mask)
    }

    /// Returns this set with `tag` added.
    #[must_use]
    pub const fn with(self, tag: Tag) -> TagSet {
        TagSet(self.0 | 1u64 << tag.bit())
    }

    /// Whether `tag` is a member of this set.
    pub const fn contains(self, tag: Tag) -> bool {
        self.0 & (1u64 << tag.bit()) != 0
    }

    /// Whether this set and `other` share at least one tag.
    pub const fn intersects(self, other: TagSet) -> bool {
        self.0 & other.0 != 0
    }

    /// Whether every tag of this set is also in `other`.
    pub const fn is_subset_of(self, other: TagSet) -> bool {
        self.0 & !other.0 == 0
    }

    /// The tags present in both sets.
    #[must_use]
    pub const fn intersection(self, other: TagSet) -> TagSet {
        TagSet(self.0 & other.0)
    }

    /// The tags present in either set.
    #[must_use]
    pub const fn union(self, other: TagSet) -> TagSet {
        TagSet(self.0 | other.0)
    }

    /// The tags of this set that are absent from `other`.
    #[must_use]
    pub const fn difference(self, other: TagSet) -> TagSet {
        TagSet(self.0 & !other.0)
    }

    /// Whether the set contains no tags.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of tags in the set.
    pub const fn len(self) -> u32 {
        self.0.count_ones()
    }

    /// Iterates the member tags in ascending bit order.
    pub fn iter(self) -> impl Iterator<Item = Tag> {
        (0..MAX_TAGS)
            .filter(move |bit| self.0 & (1u64 << bit) != 0)
            .map(Tag)
    }
}

impl FromIterator<Tag> for TagSet {
    fn from_iter<I: IntoIterator<Item = Tag>>(iter: I) -> TagSet {
        let mut set = TagSet::EMPTY;
        for tag in iter {
            set = set.with(tag);
        }
        set
    }
}

impl From<Tag> for TagSet {
    fn from(tag: Tag) -> TagSet {
        TagSet::EMPTY.with(tag)
    }
}

impl fmt::Debug for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
