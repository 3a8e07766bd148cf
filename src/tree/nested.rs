//! Hierarchical members: a collection entry is either a timespan or a whole
//! nested collection.

use std::fmt;

use tracing::debug;

use super::SharedCollection;
use super::TimespanCollection;
use crate::element::ContainerId;
use crate::element::Pitch;
use crate::element::Pitched;
use crate::timespan::SortKey;
use crate::timespan::Spanned;

/// A member of a hierarchical collection.
///
/// A `Group` spans from its collection's lowest start to its highest stop,
/// and has no bounds while empty.
pub enum Nested<T> {
    Leaf(T),
    Group(SharedCollection<Nested<T>>),
}

impl<T> Nested<T> {
    pub fn leaf(&self) -> Option<&T> {
        return match self {
            Nested::Leaf(leaf) => Some(leaf),
            Nested::Group(_) => None,
        };
    }

    pub fn group(&self) -> Option<&SharedCollection<Nested<T>>> {
        return match self {
            Nested::Leaf(_) => None,
            Nested::Group(group) => Some(group),
        };
    }
}

impl<T: Spanned> Spanned for Nested<T> {
    fn start_offset(&self) -> Option<f64> {
        return match self {
            Nested::Leaf(leaf) => leaf.start_offset(),
            Nested::Group(group) => group.borrow().start_offset(),
        };
    }

    fn stop_offset(&self) -> Option<f64> {
        return match self {
            Nested::Leaf(leaf) => leaf.stop_offset(),
            Nested::Group(group) => group.borrow().stop_offset(),
        };
    }

    fn sort_key(&self) -> Option<SortKey> {
        return self.leaf().and_then(Spanned::sort_key);
    }

    fn voice(&self) -> Option<ContainerId> {
        return self.leaf().and_then(Spanned::voice);
    }

    fn as_collection(&self) -> Option<&SharedCollection<Nested<T>>> {
        return self.group();
    }
}

impl<T: Pitched> Pitched for Nested<T> {
    fn pitches(&self) -> &[Pitch] {
        return match self {
            Nested::Leaf(leaf) => leaf.pitches(),
            Nested::Group(_) => &[],
        };
    }
}

/// Leaves compare by value, groups by identity.
impl<T: PartialEq> PartialEq for Nested<T> {
    fn eq(&self, other: &Nested<T>) -> bool {
        return match (self, other) {
            (Nested::Leaf(a), Nested::Leaf(b)) => a == b,
            (Nested::Group(a), Nested::Group(b)) => a.ptr_eq(b),
            _ => false,
        };
    }
}

impl<T: Clone> Clone for Nested<T> {
    fn clone(&self) -> Nested<T> {
        return match self {
            Nested::Leaf(leaf) => Nested::Leaf(leaf.clone()),
            Nested::Group(group) => Nested::Group(group.clone()),
        };
    }
}

impl<T: fmt::Debug> fmt::Debug for Nested<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return match self {
            Nested::Leaf(leaf) => f.debug_tuple("Leaf").field(leaf).finish(),
            Nested::Group(group) => f.debug_tuple("Group").field(group).finish(),
        };
    }
}

impl<T> From<T> for Nested<T> {
    fn from(leaf: T) -> Nested<T> {
        return Nested::Leaf(leaf);
    }
}

impl<T: Spanned + Clone> SharedCollection<Nested<T>> {
    /// Every leaf at any depth, gathered into one flat collection with this
    /// collection's config.
    pub fn flatten(&self) -> TimespanCollection<T> {
        let mut leaves = Vec::new();
        let mut pending = vec![self.clone()];
        while let Some(group) = pending.pop() {
            for member in group.borrow().iter() {
                match member {
                    Nested::Leaf(leaf) => leaves.push(leaf.clone()),
                    Nested::Group(inner) => pending.push(inner.clone()),
                }
            }
        }
        let mut flat = TimespanCollection::with_config(*self.borrow().config());
        if let Err(err) = flat.insert(leaves) {
            debug!(%err, "flattening stopped at a malformed leaf");
        }
        return flat;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timespan::Timespan;

    fn leaf(start: f64, stop: f64) -> Nested<Timespan> {
        return Nested::Leaf(Timespan::new(start, stop));
    }

    #[test]
    fn group_bounds_follow_contents() {
        let inner: SharedCollection<Nested<Timespan>> = SharedCollection::new();
        let group = Nested::Group(inner.clone());
        assert_eq!(group.start_offset(), None);

        inner.insert([leaf(2.0, 3.0), leaf(1.0, 4.0)]).unwrap();
        assert_eq!(group.start_offset(), Some(1.0));
        assert_eq!(group.stop_offset(), Some(4.0));
        assert!(group.as_collection().is_some_and(|c| c.ptr_eq(&inner)));
    }

    #[test]
    fn groups_compare_by_identity() {
        let a: SharedCollection<Nested<Timespan>> = SharedCollection::new();
        let b: SharedCollection<Nested<Timespan>> = SharedCollection::new();
        assert_eq!(Nested::Group(a.clone()), Nested::Group(a.clone()));
        assert_ne!(Nested::Group(a), Nested::Group(b));
        assert_eq!(leaf(0.0, 1.0), leaf(0.0, 1.0));
        assert_ne!(leaf(0.0, 1.0), leaf(0.0, 2.0));
    }

    #[test]
    fn flatten_collects_every_depth() {
        let outer: SharedCollection<Nested<Timespan>> = SharedCollection::new();
        let inner: SharedCollection<Nested<Timespan>> = SharedCollection::new();
        inner.insert([leaf(1.0, 2.0), leaf(3.0, 4.0)]).unwrap();
        outer.insert([leaf(0.0, 1.0), Nested::Group(inner)]).unwrap();

        let flat = outer.flatten();
        let spans: Vec<Timespan> = flat.iter().copied().collect();
        assert_eq!(spans, vec![Timespan::new(0.0, 1.0), Timespan::new(1.0, 2.0), Timespan::new(3.0, 4.0)]);
    }
}
