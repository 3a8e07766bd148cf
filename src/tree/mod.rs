//! Interval-indexed ordered collection of timespans.
//!
//! [`TimespanCollection`] stores values by start offset in an AVL tree whose
//! nodes cache stop-offset extrema and rank ranges. That supports, in
//! logarithmic time plus output size:
//!
//! - point queries: what starts, stops, or is sounding at an offset;
//! - neighbour queries: the next or previous start offset;
//! - positional access by rank, including negative indices and slices.
//!
//! Iteration always yields values ordered by start offset, ties broken by
//! [`SortKey`](crate::timespan::SortKey) and then stop offset.
//!
//! Collections compose: a [`SharedCollection`] can be stored inside another
//! one (see [`Nested`]), and notifies its parents when its bounds move.
//!
//! ```
//! use timespans::timespan::Timespan;
//! use timespans::tree::TimespanCollection;
//!
//! let mut collection = TimespanCollection::new();
//! collection.insert([Timespan::new(0.0, 2.0), Timespan::new(1.0, 3.0)]).unwrap();
//!
//! let verticality = collection.verticality_at(1.0);
//! assert_eq!(verticality.start_timespans(), &[&Timespan::new(1.0, 3.0)]);
//! assert_eq!(verticality.overlap_timespans(), &[&Timespan::new(0.0, 2.0)]);
//! ```

mod nested;
pub(crate) mod node;
mod shared;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;
use std::ops::RangeBounds;
use std::rc::Weak;

use tracing::debug;
use tracing::trace;

pub use nested::Nested;
pub use shared::SharedCollection;

use crate::config::CollectionConfig;
use crate::config::MalformedPolicy;
use crate::element::ContainerId;
use crate::error::Result;
use crate::error::TimespanError;
use crate::horizontality::Horizontality;
use crate::timespan::Derive;
use crate::timespan::Spanned;
use crate::timespan::ordered_bounds_of;
use crate::verticality::Verticality;
use crate::verticality::VerticalityCursor;
use crate::verticality::VerticalitySequence;
use node::Entry;
use node::Link;
use node::NodeIter;

/// An ordered, rank-indexed, interval-queryable collection of timespans.
pub struct TimespanCollection<T> {
    root: Link<T>,
    config: CollectionConfig,
    /// Collections that hold this one as a nested member. Never owning.
    parents: Vec<Weak<RefCell<TimespanCollection<T>>>>,
    /// Nested members whose own collection is empty, kept until they regain
    /// bounds.
    detached: Vec<T>,
}

impl<T> TimespanCollection<T> {
    pub fn new() -> TimespanCollection<T> {
        return TimespanCollection::with_config(CollectionConfig::default());
    }

    pub fn with_config(config: CollectionConfig) -> TimespanCollection<T> {
        return TimespanCollection {
            root: None,
            config,
            parents: Vec::new(),
            detached: Vec::new(),
        };
    }

    pub fn config(&self) -> &CollectionConfig {
        return &self.config;
    }

    /// Number of indexed timespans.
    pub fn len(&self) -> usize {
        return self.root.as_ref().map_or(0, |root| root.subtree_stop_index);
    }

    pub fn is_empty(&self) -> bool {
        return self.root.is_none();
    }

    /// Drop every timespan. Parent links are kept.
    pub fn clear(&mut self) {
        self.root = None;
        self.detached.clear();
    }

    /// Timespans in `(start offset, tie-break)` order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        return self.nodes().flat_map(|node| node.payload.iter().map(|entry| &entry.item));
    }

    fn nodes(&self) -> NodeIter<'_, T> {
        return NodeIter::new(&self.root);
    }

    /// The lowest start offset, or `None` when empty.
    pub fn start_offset(&self) -> Option<f64> {
        return node::first_start_offset(&self.root);
    }

    /// The highest stop offset, or `None` when empty.
    pub fn stop_offset(&self) -> Option<f64> {
        return self.root.as_ref().map(|root| root.stop_offset_high);
    }

    /// Both bounds, for change detection.
    pub(crate) fn bounds(&self) -> (Option<f64>, Option<f64>) {
        return (self.start_offset(), self.stop_offset());
    }

    /// Every distinct start offset, ascending.
    pub fn all_offsets(&self) -> Vec<f64> {
        return self.nodes().map(|node| node.start_offset).collect();
    }

    /// Every distinct start or stop offset, ascending.
    pub fn all_time_points(&self) -> Vec<f64> {
        let mut points: Vec<f64> = Vec::with_capacity(self.len() * 2);
        for node in self.nodes() {
            points.push(node.start_offset);
            points.extend(node.payload.iter().map(|entry| entry.stop_offset));
        }
        points.sort_by(f64::total_cmp);
        points.dedup();
        return points;
    }

    /// The timespan at rank `index`. Negative indices count from the end.
    pub fn get(&self, index: isize) -> Result<&T> {
        let len = self.len();
        let out_of_range = TimespanError::IndexOutOfRange { index, len };
        let resolved = if index < 0 { index + len as isize } else { index };
        if resolved < 0 || resolved as usize >= len {
            return Err(out_of_range);
        }
        return self
            .root
            .as_ref()
            .and_then(|root| root.entry_at(resolved as usize))
            .map(|entry| &entry.item)
            .ok_or(out_of_range);
    }

    /// The timespans with ranks in `range`, in order.
    ///
    /// Negative bounds count from the end, and bounds past either end are
    /// clamped, so this never fails; an empty or inverted range gives an
    /// empty result.
    pub fn slice(&self, range: impl RangeBounds<isize>) -> Vec<&T> {
        let len = self.len() as isize;
        let resolve = |i: isize| if i < 0 { i.saturating_add(len) } else { i };
        let start = match range.start_bound() {
            Bound::Included(&i) => resolve(i),
            Bound::Excluded(&i) => resolve(i).saturating_add(1),
            Bound::Unbounded => 0,
        };
        let stop = match range.end_bound() {
            Bound::Included(&i) => resolve(i).saturating_add(1),
            Bound::Excluded(&i) => resolve(i),
            Bound::Unbounded => len,
        };
        let start = start.clamp(0, len) as usize;
        let stop = stop.clamp(0, len) as usize;

        let mut out = Vec::new();
        if start < stop {
            if let Some(root) = self.root.as_ref() {
                root.collect_range(start, stop, &mut out);
            }
        }
        return out;
    }

    /// Every timespan starting at `offset`, in tie-break order.
    pub fn find_starting_at(&self, offset: f64) -> Vec<&T> {
        return match node::find(&self.root, offset + 0.0) {
            Some(node) => node.payload.iter().map(|entry| &entry.item).collect(),
            None => Vec::new(),
        };
    }

    /// Every timespan stopping at `offset`, ordered by start then stop.
    pub fn find_stopping_at(&self, offset: f64) -> Vec<&T> {
        let mut found = Vec::new();
        if let Some(root) = self.root.as_ref() {
            root.collect_stopping_at(offset, &mut found);
        }
        found.sort_by(|(a_start, a), (b_start, b)| {
            a_start.total_cmp(b_start).then(a.stop_offset.total_cmp(&b.stop_offset))
        });
        return found.into_iter().map(|(_, entry)| &entry.item).collect();
    }

    /// Every timespan sounding across `offset`: started strictly before it
    /// and stopping strictly after it.
    pub fn find_overlapping(&self, offset: f64) -> Vec<&T> {
        let mut found = Vec::new();
        if let Some(root) = self.root.as_ref() {
            root.collect_overlapping(offset, &mut found);
        }
        return found;
    }

    /// The first start offset strictly after `offset`.
    pub fn start_offset_after(&self, offset: f64) -> Option<f64> {
        return node::start_offset_after(&self.root, offset);
    }

    /// The last start offset strictly before `offset`.
    pub fn start_offset_before(&self, offset: f64) -> Option<f64> {
        return node::start_offset_before(&self.root, offset);
    }

    pub(crate) fn last_start_offset(&self) -> Option<f64> {
        return node::last_start_offset(&self.root);
    }

    /// Everything starting, stopping and sounding at `offset`.
    pub fn verticality_at(&self, offset: f64) -> Verticality<'_, T> {
        return Verticality::new(
            self,
            offset,
            self.find_starting_at(offset),
            self.find_stopping_at(offset),
            self.find_overlapping(offset),
        );
    }

    /// Verticalities at each start offset, first to last or last to first.
    ///
    /// The iterator borrows the collection. To mutate between steps, drive a
    /// [`VerticalityCursor`] instead.
    pub fn iter_verticalities(&self, reverse: bool) -> impl Iterator<Item = Verticality<'_, T>> {
        let mut cursor = VerticalityCursor::new(reverse);
        return std::iter::from_fn(move || cursor.advance(self));
    }

    /// Windows of `n` consecutive verticalities, one per anchor, each in
    /// timeline order. Ends once fewer than `n` verticalities remain.
    pub fn iter_verticalities_nwise(
        &self,
        n: usize,
        reverse: bool,
    ) -> Result<impl Iterator<Item = VerticalitySequence<'_, T>>> {
        if n == 0 {
            return Err(TimespanError::InvalidWindow(n));
        }
        let windows = self.iter_verticalities(reverse).map_while(move |anchor| {
            let mut window = vec![anchor];
            while window.len() < n {
                let last = &window[window.len() - 1];
                let next = match reverse {
                    true => last.previous_verticality(),
                    false => last.next_verticality(),
                };
                match next {
                    Some(verticality) => window.push(verticality),
                    None => return None,
                }
            }
            if reverse {
                window.reverse();
            }
            return Some(VerticalitySequence::new(window));
        });
        return Ok(windows);
    }

    /// The most timespans sounding at any start offset.
    pub fn maximum_overlap(&self) -> Option<usize> {
        return self.iter_verticalities(false).map(|v| v.degree_of_overlap()).max();
    }

    /// The fewest timespans sounding at any start offset.
    pub fn minimum_overlap(&self) -> Option<usize> {
        return self.iter_verticalities(false).map(|v| v.degree_of_overlap()).min();
    }

    /// Rederive rank ranges and stop extrema over the whole tree.
    fn refresh(&mut self) {
        if let Some(root) = self.root.as_mut() {
            root.refresh(0);
        }
    }
}

impl<T: Spanned> TimespanCollection<T> {
    /// Insert a batch of timespans.
    ///
    /// Values lacking bounds are skipped, or stop the batch with
    /// [`TimespanError::InvalidTimespan`] under [`MalformedPolicy::Reject`];
    /// anything before the failing value stays inserted. Endpoints reported
    /// out of order are handled by the config's
    /// [`EndpointOrder`](crate::config::EndpointOrder). Returns how many
    /// values were indexed.
    ///
    /// Nested collections must go in through [`SharedCollection::insert`],
    /// which registers the parent link that keeps them indexed. A batch
    /// holding one fails here with [`TimespanError::InvalidTimespan`] before
    /// anything is inserted.
    pub fn insert(&mut self, items: impl IntoIterator<Item = T>) -> Result<usize> {
        let items: Vec<T> = items.into_iter().collect();
        if items.iter().any(|item| item.as_collection().is_some()) {
            return Err(TimespanError::InvalidTimespan(
                "nested collections are inserted through a SharedCollection".to_string(),
            ));
        }
        return self.insert_members(items);
    }

    /// Where `item` is indexed under this collection's endpoint policy.
    fn bounds_of(&self, item: &T) -> Result<(f64, f64)> {
        return ordered_bounds_of(item, self.config.endpoint_order);
    }

    /// [`insert`](TimespanCollection::insert) without the nested-collection
    /// check, for callers that maintain parent links themselves.
    pub(crate) fn insert_members(&mut self, items: impl IntoIterator<Item = T>) -> Result<usize> {
        let mut inserted = 0;
        let mut failure = None;
        for item in items {
            match self.bounds_of(&item) {
                Ok((start, stop)) => {
                    self.insert_entry(start, stop, item);
                    inserted += 1;
                }
                Err(err) => match self.config.malformed {
                    MalformedPolicy::Skip => debug!(%err, "skipping malformed timespan"),
                    MalformedPolicy::Reject => {
                        failure = Some(err);
                        break;
                    }
                },
            }
        }
        self.refresh();
        return match failure {
            Some(err) => Err(err),
            None => Ok(inserted),
        };
    }

    fn insert_entry(&mut self, start: f64, stop: f64, item: T) {
        let entry = Entry {
            stop_offset: stop,
            sort_key: item.sort_key(),
            item,
        };
        self.root = Some(node::insert(self.root.take(), start, entry));
    }

    /// Pull the first entry at `start` matching `is_target` out of the tree,
    /// deleting its node if that empties it. Augmentation is left stale.
    fn remove_entry(&mut self, start: f64, is_target: impl Fn(&T) -> bool) -> Option<T> {
        let node = node::find_mut(&mut self.root, start)?;
        let position = node.payload.iter().position(|entry| is_target(&entry.item))?;
        let entry = node.payload.remove(position);
        if node.payload.is_empty() {
            self.root = node::remove(self.root.take(), start);
        }
        return Some(entry.item);
    }

    /// Start offset of the node holding an entry matching `is_target`.
    fn locate(&self, is_target: impl Fn(&T) -> bool) -> Option<f64> {
        return self
            .nodes()
            .find(|node| node.payload.iter().any(|entry| is_target(&entry.item)))
            .map(|node| node.start_offset);
    }

    /// Move the member matching `is_target`, last indexed at `old_start`, to
    /// wherever its current bounds put it. A member that has lost its bounds
    /// is detached until it regains them. Returns whether a member moved.
    pub(crate) fn reposition(&mut self, is_target: impl Fn(&T) -> bool, old_start: Option<f64>) -> bool {
        let mut item = old_start.and_then(|start| self.remove_entry(start, &is_target));
        if item.is_none() {
            if let Some(start) = self.locate(&is_target) {
                item = self.remove_entry(start, &is_target);
            }
        }
        if item.is_none() {
            if let Some(position) = self.detached.iter().position(&is_target) {
                item = Some(self.detached.remove(position));
            }
        }
        let Some(item) = item else {
            return false;
        };
        match self.bounds_of(&item) {
            Ok((start, stop)) => self.insert_entry(start, stop, item),
            Err(_) => self.detached.push(item),
        }
        self.refresh();
        return true;
    }

    /// True when a member (indexed or detached) stands for `child`.
    pub(crate) fn holds_collection(&self, child: &SharedCollection<T>) -> bool {
        let is_child = |item: &T| item.as_collection().is_some_and(|c| c.ptr_eq(child));
        return self.iter().any(is_child) || self.detached.iter().any(is_child);
    }

    /// Timespans grouped by voice, each voice in timeline order.
    fn voices(&self) -> BTreeMap<ContainerId, Vec<&T>> {
        let mut voices: BTreeMap<ContainerId, Vec<&T>> = BTreeMap::new();
        for item in self.iter() {
            if let Some(voice) = item.voice() {
                voices.entry(voice).or_default().push(item);
            }
        }
        return voices;
    }

    /// Every run of `n` consecutive timespans within one voice, voices in
    /// ascending id order.
    pub fn horizontalities(&self, n: usize) -> Result<Vec<Horizontality<'_, T>>> {
        if n == 0 {
            return Err(TimespanError::InvalidWindow(n));
        }
        let mut out = Vec::new();
        for (_, line) in self.voices() {
            out.extend(line.windows(n).map(|window| Horizontality::new(window.to_vec())));
        }
        return Ok(out);
    }
}

impl<T: Spanned + PartialEq> TimespanCollection<T> {
    /// Remove each listed timespan, matched by equality at its start offset.
    ///
    /// Values that are not stored are ignored. A value lacking bounds stops
    /// the batch with [`TimespanError::InvalidTimespan`]. Returns how many
    /// values were removed.
    pub fn remove<'i>(&mut self, items: impl IntoIterator<Item = &'i T>) -> Result<usize>
    where
        T: 'i,
    {
        let mut removed = 0;
        let mut failure = None;
        for item in items {
            if let Some(position) = self.detached.iter().position(|d| d == item) {
                self.detached.remove(position);
                removed += 1;
                continue;
            }
            let start = match self.bounds_of(item) {
                Ok((start, _)) => start,
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            };
            match self.remove_entry(start, |candidate| candidate == item) {
                Some(_) => removed += 1,
                None => trace!(start, "timespan not stored; nothing removed"),
            }
        }
        self.refresh();
        return match failure {
            Some(err) => Err(err),
            None => Ok(removed),
        };
    }

    pub fn contains(&self, item: &T) -> bool {
        return self.index_of(item).is_ok();
    }

    /// Rank of `item` in iteration order.
    pub fn index_of(&self, item: &T) -> Result<usize> {
        let (start, _) = self.bounds_of(item)?;
        let node = node::find(&self.root, start).ok_or(TimespanError::NotFound)?;
        let position = node
            .payload
            .iter()
            .position(|entry| &entry.item == item)
            .ok_or(TimespanError::NotFound)?;
        return Ok(node.node_start_index + position);
    }

    /// Swap `old` for `new`, failing with [`TimespanError::NotFound`] when
    /// `old` is not stored. As with [`insert`](TimespanCollection::insert),
    /// a nested collection cannot come in this way.
    pub fn replace(&mut self, old: &T, new: T) -> Result<()> {
        if new.as_collection().is_some() {
            return Err(TimespanError::InvalidTimespan(
                "nested collections are inserted through a SharedCollection".to_string(),
            ));
        }
        return self.replace_member(old, new);
    }

    pub(crate) fn replace_member(&mut self, old: &T, new: T) -> Result<()> {
        let (old_start, _) = self.bounds_of(old)?;
        let (start, stop) = self.bounds_of(&new)?;
        if self.remove_entry(old_start, |candidate| candidate == old).is_none() {
            return Err(TimespanError::NotFound);
        }
        self.insert_entry(start, stop, new);
        self.refresh();
        return Ok(());
    }

    /// The next timespan after `item` in the same voice.
    pub fn next_in_voice(&self, item: &T) -> Option<&T> {
        let voice = item.voice()?;
        let index = self.index_of(item).ok()?;
        return self.slice(index as isize + 1..).into_iter().find(|other| other.voice() == Some(voice));
    }

    /// The previous timespan before `item` in the same voice.
    pub fn previous_in_voice(&self, item: &T) -> Option<&T> {
        let voice = item.voice()?;
        let index = self.index_of(item).ok()?;
        return self.slice(..index as isize).into_iter().rev().find(|other| other.voice() == Some(voice));
    }
}

impl<T: Spanned + PartialEq + Clone> TimespanCollection<T> {
    /// A new collection holding the same timespans and config. Nodes are
    /// rebuilt, not cloned, and parent links are not carried over.
    ///
    /// Nested collections are left out, since nothing would keep them
    /// indexed in the copy. [`SharedCollection::copy`] keeps them.
    pub fn copy(&self) -> TimespanCollection<T> {
        return self.copy_members(|item| item.as_collection().is_none());
    }

    pub(crate) fn copy_members(&self, keep: impl Fn(&T) -> bool) -> TimespanCollection<T> {
        let mut copy = TimespanCollection::with_config(self.config);
        for node in self.nodes() {
            for entry in node.payload.iter().filter(|entry| keep(&entry.item)) {
                copy.insert_entry(node.start_offset, entry.stop_offset, entry.item.clone());
            }
        }
        copy.detached = self.detached.iter().filter(|item| keep(item)).cloned().collect();
        copy.refresh();
        return copy;
    }
}

impl<T: Derive + PartialEq + Clone> TimespanCollection<T> {
    /// Cut every timespan sounding across each offset into the part before
    /// and the part after it.
    pub fn split_at(&mut self, offsets: impl IntoIterator<Item = f64>) -> Result<()> {
        for offset in offsets {
            let overlaps: Vec<T> = self.find_overlapping(offset).into_iter().cloned().collect();
            if overlaps.is_empty() {
                continue;
            }
            trace!(offset, count = overlaps.len(), "splitting timespans");
            self.remove(overlaps.iter())?;
            for overlap in overlaps.iter() {
                self.insert_members(overlap.split_at(offset))?;
            }
        }
        return Ok(());
    }
}

impl<T> Default for TimespanCollection<T> {
    fn default() -> TimespanCollection<T> {
        return TimespanCollection::new();
    }
}

impl<T: Spanned> FromIterator<T> for TimespanCollection<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> TimespanCollection<T> {
        let mut collection = TimespanCollection::new();
        collection.extend(iter);
        return collection;
    }
}

impl<T: Spanned> Extend<T> for TimespanCollection<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        if let Err(err) = self.insert(iter) {
            debug!(%err, "extend stopped at a malformed timespan");
        }
    }
}

impl<T> fmt::Debug for TimespanCollection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return f
            .debug_struct("TimespanCollection")
            .field("len", &self.len())
            .field("start_offset", &self.start_offset())
            .field("stop_offset", &self.stop_offset())
            .field("parents", &self.parents.len())
            .finish();
    }
}
