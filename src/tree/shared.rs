//! Shared handles for collections that nest inside other collections.
//!
//! A nested collection is stored by handle in its parent, and the parent is
//! remembered by the child as a [`Weak`] back-reference. Mutating the child
//! through its handle changes its bounds without the parent seeing it, so
//! every mutating method here finishes by calling
//! [`SharedCollection::reindex_parents`], which moves the child's entry in
//! each ancestor to its new start offset.

use std::cell::Ref;
use std::cell::RefCell;
use std::rc::Rc;
use std::rc::Weak;

use rustc_hash::FxHashSet;
use tracing::trace;

use super::TimespanCollection;
use crate::config::CollectionConfig;
use crate::error::Result;
use crate::error::TimespanError;
use crate::timespan::Derive;
use crate::timespan::Spanned;
use crate::timespan::bounds_of;

type Cell<T> = Rc<RefCell<TimespanCollection<T>>>;

/// A reference-counted [`TimespanCollection`] that can be stored inside
/// other collections.
///
/// Clones share the same collection. Compare handles with
/// [`ptr_eq`](SharedCollection::ptr_eq).
pub struct SharedCollection<T>(Cell<T>);

impl<T> SharedCollection<T> {
    pub fn new() -> SharedCollection<T> {
        return SharedCollection::from_collection(TimespanCollection::new());
    }

    pub fn with_config(config: CollectionConfig) -> SharedCollection<T> {
        return SharedCollection::from_collection(TimespanCollection::with_config(config));
    }

    pub fn from_collection(collection: TimespanCollection<T>) -> SharedCollection<T> {
        return SharedCollection(Rc::new(RefCell::new(collection)));
    }

    /// Read access to the collection. Mutate only through the handle so
    /// parents stay indexed.
    pub fn borrow(&self) -> Ref<'_, TimespanCollection<T>> {
        return self.0.borrow();
    }

    pub fn ptr_eq(&self, other: &SharedCollection<T>) -> bool {
        return Rc::ptr_eq(&self.0, &other.0);
    }

    /// Number of live collections holding this one.
    pub fn parent_count(&self) -> usize {
        return self.0.borrow().parents.iter().filter(|parent| parent.strong_count() > 0).count();
    }

    fn key(cell: &Cell<T>) -> usize {
        return Rc::as_ptr(cell) as usize;
    }

    fn live_parents(&self) -> Vec<SharedCollection<T>> {
        return self.0.borrow().parents.iter().filter_map(Weak::upgrade).map(SharedCollection).collect();
    }

    /// True when `other` is this collection or one of its ancestors.
    fn has_ancestor(&self, other: &SharedCollection<T>) -> bool {
        let mut seen = FxHashSet::default();
        let mut pending = vec![self.clone()];
        while let Some(current) = pending.pop() {
            if current.ptr_eq(other) {
                return true;
            }
            if seen.insert(Self::key(&current.0)) {
                pending.extend(current.live_parents());
            }
        }
        return false;
    }

    fn add_parent(&self, parent: &SharedCollection<T>) {
        let mut inner = self.0.borrow_mut();
        inner.parents.retain(|weak| weak.strong_count() > 0);
        if !inner.parents.iter().any(|weak| weak.as_ptr() == Rc::as_ptr(&parent.0)) {
            inner.parents.push(Rc::downgrade(&parent.0));
        }
    }

    fn drop_parent(&self, parent: &SharedCollection<T>) {
        let target = Rc::as_ptr(&parent.0);
        self.0
            .borrow_mut()
            .parents
            .retain(|weak| weak.strong_count() > 0 && weak.as_ptr() != target);
    }

    /// Re-seat this collection's entry in every ancestor after its bounds
    /// moved away from `old_start`.
    ///
    /// An ancestor whose own bounds change in turn notifies its parents.
    /// Each (parent, child) pair is handled at most once.
    pub fn reindex_parents(&self, old_start: Option<f64>)
    where
        T: Spanned,
    {
        let mut visited: FxHashSet<(usize, usize)> = FxHashSet::default();
        let mut pending = vec![(self.clone(), old_start)];
        while let Some((child, old_start)) = pending.pop() {
            for parent in child.live_parents() {
                if !visited.insert((Self::key(&parent.0), Self::key(&child.0))) {
                    continue;
                }
                let before = parent.borrow().bounds();
                let is_child = |item: &T| item.as_collection().is_some_and(|c| c.ptr_eq(&child));
                let moved = parent.0.borrow_mut().reposition(is_child, old_start);
                trace!(?old_start, moved, "reindexed nested collection in parent");
                if moved && parent.borrow().bounds() != before {
                    pending.push((parent, before.0));
                }
            }
        }
    }

    /// Run `mutate` on the collection and notify ancestors if its bounds
    /// changed.
    fn mutate<R>(&self, mutate: impl FnOnce(&mut TimespanCollection<T>) -> R) -> R
    where
        T: Spanned,
    {
        let before = self.borrow().bounds();
        let result = mutate(&mut self.0.borrow_mut());
        if self.borrow().bounds() != before {
            self.reindex_parents(before.0);
        }
        return result;
    }
}

impl<T: Spanned> SharedCollection<T> {
    /// Insert a batch, as [`TimespanCollection::insert`].
    ///
    /// Nested collections in the batch record this one as their parent.
    /// Empty nested collections are kept aside until they gain bounds.
    /// Fails with [`TimespanError::InvalidTimespan`], before inserting
    /// anything, if the batch holds this collection or one of its ancestors.
    pub fn insert(&self, items: impl IntoIterator<Item = T>) -> Result<usize> {
        let items: Vec<T> = items.into_iter().collect();
        for item in items.iter() {
            if let Some(child) = item.as_collection() {
                if self.has_ancestor(child) {
                    return Err(TimespanError::InvalidTimespan(
                        "a collection cannot contain itself or an ancestor".to_string(),
                    ));
                }
            }
        }

        let children: Vec<SharedCollection<T>> =
            items.iter().filter_map(|item| item.as_collection().cloned()).collect();
        let (empty, indexable): (Vec<T>, Vec<T>) =
            items.into_iter().partition(|item| item.as_collection().is_some() && bounds_of(item).is_err());

        let result = self.mutate(|inner| {
            let parked = empty.len();
            inner.detached.extend(empty);
            return inner.insert_members(indexable).map(|inserted| inserted + parked);
        });
        for child in children.iter() {
            if self.borrow().holds_collection(child) {
                child.add_parent(self);
            }
        }
        return result;
    }

    /// Number of values stored, as [`TimespanCollection::len`].
    pub fn len(&self) -> usize {
        return self.borrow().len();
    }

    pub fn is_empty(&self) -> bool {
        return self.borrow().is_empty();
    }

    pub fn clear(&self) {
        let children: Vec<SharedCollection<T>> = {
            let inner = self.borrow();
            inner.iter().chain(inner.detached.iter()).filter_map(|item| item.as_collection().cloned()).collect()
        };
        self.mutate(|inner| inner.clear());
        for child in children.iter() {
            child.drop_parent(self);
        }
    }
}

impl<T: Spanned + PartialEq> SharedCollection<T> {
    fn is_self(&self, item: &T) -> bool {
        return item.as_collection().is_some_and(|c| c.ptr_eq(self));
    }

    /// Remove a batch, as [`TimespanCollection::remove`]. Nested collections
    /// no longer held forget this parent.
    pub fn remove<'i>(&self, items: impl IntoIterator<Item = &'i T>) -> Result<usize>
    where
        T: 'i,
    {
        // A collection never holds itself, and reading its bounds would
        // re-borrow it mid-mutation.
        let items: Vec<&T> = items.into_iter().filter(|item| !self.is_self(item)).collect();
        let result = self.mutate(|inner| inner.remove(items.iter().copied()));
        for child in items.iter().filter_map(|item| item.as_collection()) {
            if !self.borrow().holds_collection(child) {
                child.drop_parent(self);
            }
        }
        return result;
    }

    /// Swap one value for another, as [`TimespanCollection::replace`].
    /// Nested collections are accepted as `new`, under the same cycle check
    /// as [`insert`](SharedCollection::insert).
    pub fn replace(&self, old: &T, new: T) -> Result<()> {
        if self.is_self(old) {
            return Err(TimespanError::NotFound);
        }
        if let Some(child) = new.as_collection() {
            if self.has_ancestor(child) {
                return Err(TimespanError::InvalidTimespan(
                    "a collection cannot contain itself or an ancestor".to_string(),
                ));
            }
        }
        let added = new.as_collection().cloned();
        let result = self.mutate(|inner| inner.replace_member(old, new));
        if let Some(child) = old.as_collection() {
            if !self.borrow().holds_collection(child) {
                child.drop_parent(self);
            }
        }
        if let Some(child) = added {
            if self.borrow().holds_collection(&child) {
                child.add_parent(self);
            }
        }
        return result;
    }
}

impl<T: Spanned + PartialEq + Clone> SharedCollection<T> {
    /// A new shared collection holding the same members and config, nested
    /// collections included. Each nested collection gains the copy as a
    /// parent.
    pub fn copy(&self) -> SharedCollection<T> {
        let copy = SharedCollection::from_collection(self.borrow().copy_members(|_| true));
        let children: Vec<SharedCollection<T>> = {
            let inner = copy.borrow();
            inner.iter().chain(inner.detached.iter()).filter_map(|item| item.as_collection().cloned()).collect()
        };
        for child in children.iter() {
            child.add_parent(&copy);
        }
        return copy;
    }
}

impl<T: Derive + PartialEq + Clone> SharedCollection<T> {
    /// Split at each offset, as [`TimespanCollection::split_at`].
    pub fn split_at(&self, offsets: impl IntoIterator<Item = f64>) -> Result<()> {
        return self.mutate(|inner| inner.split_at(offsets));
    }
}

impl<T> Clone for SharedCollection<T> {
    fn clone(&self) -> SharedCollection<T> {
        return SharedCollection(Rc::clone(&self.0));
    }
}

impl<T> Default for SharedCollection<T> {
    fn default() -> SharedCollection<T> {
        return SharedCollection::new();
    }
}

impl<T> std::fmt::Debug for SharedCollection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return match self.0.try_borrow() {
            Ok(inner) => std::fmt::Debug::fmt(&*inner, f),
            Err(_) => f.write_str("SharedCollection(<borrowed>)"),
        };
    }
}

impl<T> Spanned for SharedCollection<T> {
    fn start_offset(&self) -> Option<f64> {
        return self.borrow().start_offset();
    }

    fn stop_offset(&self) -> Option<f64> {
        return self.borrow().stop_offset();
    }
}
