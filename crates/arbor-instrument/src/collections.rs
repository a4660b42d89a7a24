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

//! Append-many, read-many-concurrently collections.
//!
//! Every binding and root registry in the engine shares one access pattern:
//! rare synchronized appends on the control plane, frequent lock-free
//! iteration on the dispatch path, and removal expressed as a per-element
//! liveness check instead of physical deletion.
//!
//! [`AsyncList`] implements that pattern with a backing array of write-once
//! cells published behind an `Arc`. Readers clone the `Arc` and then iterate
//! without any lock; a cell that was never written terminates the iteration,
//! so a reader can never observe a partially constructed element. Writers
//! serialize on a mutex holding the next insertion index. When the array is
//! full, the writer copies the live elements into a freshly sized array
//! (`max(2 * live, 8)` slots) and publishes it with a single reference swap;
//! iterators still traversing the old array finish over stale but valid
//! data.

use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError, RwLock, Weak};

/// Minimum capacity after compaction.
const MIN_CAPACITY: usize = 8;

/// An element of an [`AsyncList`]. `live` answers `None` once the element
/// is logically removed; iterators then skip it.
pub(crate) trait ListEntry: Clone + Send + Sync + 'static {
    /// What iteration yields for a live element.
    type Item;

    /// The element's current value, or `None` if logically removed.
    fn live(&self) -> Option<Self::Item>;
}

/// Weak references are list entries whose liveness is collectability.
impl<T: ?Sized + Send + Sync + 'static> ListEntry for Weak<T> {
    type Item = std::sync::Arc<T>;

    fn live(&self) -> Option<Self::Item> {
        self.upgrade()
    }
}

type Slots<E> = std::sync::Arc<[OnceLock<E>]>;

pub(crate) struct AsyncList<E: ListEntry> {
    slots: RwLock<Slots<E>>,
    /// Next insertion index; doubles as the writer's exclusive section.
    writer: Mutex<usize>,
}

impl<E: ListEntry> AsyncList<E> {
    pub(crate) fn new(capacity: usize) -> Self {
        AsyncList {
            slots: RwLock::new(alloc(capacity.max(1))),
            writer: Mutex::new(0),
        }
    }

    /// Appends an element. Control-plane operation; serialized against
    /// other appends and compactions, never against readers.
    pub(crate) fn add(&self, entry: E) {
        let mut next = relock(self.writer.lock());
        let mut slots = self.snapshot();
        if *next >= slots.len() {
            slots = self.compact(&slots, &mut next);
        }
        // The writer lock guarantees this slot was never written.
        let _ = slots[*next].set(entry);
        *next += 1;
    }

    /// Whether no element was ever appended since the last compaction left
    /// the list empty. Cheap; used for dispatch fast paths.
    pub(crate) fn is_empty(&self) -> bool {
        self.snapshot()[0].get().is_none()
    }

    /// Lock-free iteration over the live elements, in insertion order, as
    /// of the moment the iterator was created.
    pub(crate) fn iter(&self) -> AsyncIter<E> {
        AsyncIter {
            slots: self.snapshot(),
            index: 0,
        }
    }

    fn snapshot(&self) -> Slots<E> {
        relock(self.slots.read()).clone()
    }

    /// Copies live elements into a fresh array and publishes it. Caller
    /// holds the writer lock.
    fn compact(&self, old: &Slots<E>, next: &mut MutexGuard<'_, usize>) -> Slots<E> {
        let live: Vec<E> = old
            .iter()
            .map_while(OnceLock::get)
            .filter(|e| e.live().is_some())
            .cloned()
            .collect();
        let fresh = alloc((live.len() * 2).max(MIN_CAPACITY));
        **next = live.len();
        for (slot, entry) in fresh.iter().zip(live) {
            let _ = slot.set(entry);
        }
        *relock(self.slots.write()) = fresh.clone();
        log::trace!(
            "compacted async list: {} live of {} slots, new capacity {}",
            **next,
            old.len(),
            fresh.len()
        );
        fresh
    }
}

fn alloc<E: ListEntry>(capacity: usize) -> Slots<E> {
    (0..capacity).map(|_| OnceLock::new()).collect()
}

/// Recovers a guard from a poisoned lock; list state is always consistent
/// under the guard because writes are single slot assignments.
fn relock<G>(result: Result<G, PoisonError<G>>) -> G {
    result.unwrap_or_else(PoisonError::into_inner)
}

/// Snapshot iterator over an [`AsyncList`]. Holds no lock.
pub(crate) struct AsyncIter<E: ListEntry> {
    slots: Slots<E>,
    index: usize,
}

impl<E: ListEntry> Iterator for AsyncIter<E> {
    type Item = E::Item;

    fn next(&mut self) -> Option<E::Item> {
        while self.index < self.slots.len() {
            // An unwritten cell means the end of the appended prefix.
            let entry = self.slots[self.index].get()?;
            self.index += 1;
            if let Some(item) = entry.live() {
                return Some(item);
            }
        }
        None
    }
}
