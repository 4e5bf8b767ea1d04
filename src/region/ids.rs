//! Flat identifier namespace and the sorted-by-ID collections built on it.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::Id;
use crate::error::{Error, Result};

/// Issues world-unique identifiers.
///
/// The counter holds the last ID handed out, so a fresh allocator issues 1
/// first. Atomic so read-locked paths may allocate too.
#[derive(Debug, Default)]
pub struct IdAllocator {
    last: AtomicU64,
}

impl IdAllocator {
    /// An allocator whose first ID is 1.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    /// An allocator whose first ID is `last + 1`.
    #[must_use]
    pub const fn starting_after(last: Id) -> Self {
        Self {
            last: AtomicU64::new(last),
        }
    }

    /// Take the next identifier.
    pub fn next(&self) -> Id {
        self.last.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// The last identifier handed out (0 if none).
    #[must_use]
    pub fn last(&self) -> Id {
        self.last.load(Ordering::Relaxed)
    }

    /// Move the counter so the next ID is `max + 1`.
    pub fn reset_after(&self, max: Id) {
        self.last.store(max, Ordering::Relaxed);
    }
}

/// Entities stored in sorted-by-ID vectors.
pub trait Identified {
    /// The entity's unique ID.
    fn id(&self) -> Id;
}

pub(crate) fn get<T: Identified>(items: &[T], id: Id) -> Option<&T> {
    items
        .binary_search_by_key(&id, Identified::id)
        .ok()
        .map(|i| &items[i])
}

pub(crate) fn get_mut<T: Identified>(items: &mut [T], id: Id) -> Option<&mut T> {
    match items.binary_search_by_key(&id, Identified::id) {
        Ok(i) => Some(&mut items[i]),
        Err(_) => None,
    }
}

/// Insert keeping the order. A duplicate ID is rejected.
pub(crate) fn insert<T: Identified>(items: &mut Vec<T>, item: T) -> Result<()> {
    match items.binary_search_by_key(&item.id(), Identified::id) {
        Ok(_) => Err(Error::AlreadyExists(format!("id {}", item.id()))),
        Err(pos) => {
            items.insert(pos, item);
            Ok(())
        }
    }
}

pub(crate) fn remove<T: Identified>(items: &mut Vec<T>, id: Id) -> Option<T> {
    items
        .binary_search_by_key(&id, Identified::id)
        .ok()
        .map(|i| items.remove(i))
}

pub(crate) fn sort<T: Identified>(items: &mut [T]) {
    items.sort_unstable_by_key(Identified::id);
}

/// Fail unless IDs are non-zero and strictly increasing.
pub(crate) fn check_sorted<T: Identified>(items: &[T], what: &str) -> Result<()> {
    if items.first().is_some_and(|i| i.id() == 0) {
        return Err(Error::consistency(format!("{what}: zero id")));
    }
    if let Some(w) = items.windows(2).find(|w| w[0].id() >= w[1].id()) {
        return Err(Error::consistency(format!(
            "{what}: not sorted at {} / {}",
            w[0].id(),
            w[1].id()
        )));
    }
    Ok(())
}

/// Same check on a plain ID list.
pub(crate) fn check_sorted_ids(ids: &[Id], what: &str) -> Result<()> {
    if ids.first() == Some(&0) {
        return Err(Error::consistency(format!("{what}: zero id")));
    }
    if let Some(w) = ids.windows(2).find(|w| w[0] >= w[1]) {
        return Err(Error::consistency(format!(
            "{what}: not sorted at {} / {}",
            w[0], w[1]
        )));
    }
    Ok(())
}

/// Insert into a sorted ID list, ignoring duplicates.
pub(crate) fn insert_id(ids: &mut Vec<Id>, id: Id) {
    if let Err(pos) = ids.binary_search(&id) {
        ids.insert(pos, id);
    }
}

/// Remove from a sorted ID list. Returns whether it was present.
pub(crate) fn remove_id(ids: &mut Vec<Id>, id: Id) -> bool {
    match ids.binary_search(&id) {
        Ok(pos) => {
            ids.remove(pos);
            true
        }
        Err(_) => false,
    }
}
