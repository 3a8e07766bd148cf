//! Everything sounding at one instant, and navigation between instants.
//!
//! A [`Verticality`] is a snapshot: it borrows the collection it was taken
//! from and partitions the timespans active at its offset into those
//! starting there, stopping there, and sounding across it. Neighbouring
//! verticalities are found by asking the collection again for the next or
//! previous start offset.
//!
//! To walk verticalities while editing the collection, hold a
//! [`VerticalityCursor`] instead. It remembers only an offset and re-queries
//! the tree on every step, so timespans inserted or removed between steps
//! are seen on the next one.

use std::collections::BTreeSet;
use std::fmt;

use crate::element::Pitch;
use crate::element::Pitched;
use crate::tree::TimespanCollection;

pub struct Verticality<'a, T> {
    collection: &'a TimespanCollection<T>,
    offset: f64,
    start_timespans: Vec<&'a T>,
    stop_timespans: Vec<&'a T>,
    overlap_timespans: Vec<&'a T>,
}

impl<'a, T> Verticality<'a, T> {
    pub(crate) fn new(
        collection: &'a TimespanCollection<T>,
        offset: f64,
        start_timespans: Vec<&'a T>,
        stop_timespans: Vec<&'a T>,
        overlap_timespans: Vec<&'a T>,
    ) -> Verticality<'a, T> {
        return Verticality {
            collection,
            offset,
            start_timespans,
            stop_timespans,
            overlap_timespans,
        };
    }

    pub fn offset(&self) -> f64 {
        return self.offset;
    }

    pub fn collection(&self) -> &'a TimespanCollection<T> {
        return self.collection;
    }

    /// Timespans starting at this offset, in tie-break order.
    pub fn start_timespans(&self) -> &[&'a T] {
        return &self.start_timespans;
    }

    /// Timespans stopping at this offset, ordered by start then stop.
    pub fn stop_timespans(&self) -> &[&'a T] {
        return &self.stop_timespans;
    }

    /// Timespans that started earlier and are still sounding.
    pub fn overlap_timespans(&self) -> &[&'a T] {
        return &self.overlap_timespans;
    }

    /// Everything sounding from this offset onward: the starting timespans
    /// followed by the overlapping ones.
    pub fn start_and_overlap_timespans(&self) -> Vec<&'a T> {
        return self.start_timespans.iter().chain(self.overlap_timespans.iter()).copied().collect();
    }

    pub fn is_empty(&self) -> bool {
        return self.start_timespans.is_empty() && self.stop_timespans.is_empty() && self.overlap_timespans.is_empty();
    }

    /// Number of timespans sounding: starting plus overlapping.
    pub fn degree_of_overlap(&self) -> usize {
        return self.start_timespans.len() + self.overlap_timespans.len();
    }

    pub fn next_start_offset(&self) -> Option<f64> {
        return self.collection.start_offset_after(self.offset);
    }

    pub fn next_verticality(&self) -> Option<Verticality<'a, T>> {
        let offset = self.next_start_offset()?;
        return Some(self.collection.verticality_at(offset));
    }

    pub fn previous_verticality(&self) -> Option<Verticality<'a, T>> {
        let offset = self.collection.start_offset_before(self.offset)?;
        return Some(self.collection.verticality_at(offset));
    }
}

impl<'a, T: Pitched> Verticality<'a, T> {
    /// Distinct pitches sounding at this offset.
    pub fn pitch_set(&self) -> BTreeSet<Pitch> {
        return self
            .start_and_overlap_timespans()
            .into_iter()
            .flat_map(|timespan| timespan.pitches().iter().copied())
            .collect();
    }

    /// The sounding timespan holding the lowest pitch. Ties go to the first
    /// one found, starting timespans before overlapping ones.
    pub fn bass_timespan(&self) -> Option<&'a T> {
        let mut bass: Option<(Pitch, &'a T)> = None;
        for timespan in self.start_and_overlap_timespans() {
            let Some(lowest) = timespan.pitches().iter().min().copied() else {
                continue;
            };
            if bass.is_none_or(|(current, _)| lowest < current) {
                bass = Some((lowest, timespan));
            }
        }
        return bass.map(|(_, timespan)| timespan);
    }
}

impl<T: fmt::Debug> fmt::Debug for Verticality<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return f
            .debug_struct("Verticality")
            .field("offset", &self.offset)
            .field("start", &self.start_timespans)
            .field("stop", &self.stop_timespans)
            .field("overlap", &self.overlap_timespans)
            .finish();
    }
}

/// Equal when taken at the same offset with the same timespans, in the same
/// order, from the same collection.
impl<T: PartialEq> PartialEq for Verticality<'_, T> {
    fn eq(&self, other: &Self) -> bool {
        return std::ptr::eq(self.collection, other.collection)
            && self.offset == other.offset
            && self.start_timespans == other.start_timespans
            && self.stop_timespans == other.stop_timespans
            && self.overlap_timespans == other.overlap_timespans;
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum CursorState {
    Fresh,
    At(f64),
    Done,
}

/// Position in a walk over a collection's start offsets.
///
/// Holds no borrow between steps: pass the collection to each
/// [`advance`](VerticalityCursor::advance).
///
/// ```
/// use timespans::timespan::Timespan;
/// use timespans::tree::TimespanCollection;
/// use timespans::verticality::VerticalityCursor;
///
/// let mut collection: TimespanCollection<Timespan> =
///     [Timespan::new(0.0, 1.0), Timespan::new(1.0, 2.0)].into_iter().collect();
/// let mut cursor = VerticalityCursor::new(false);
///
/// assert_eq!(cursor.advance(&collection).map(|v| v.offset()), Some(0.0));
/// collection.insert([Timespan::new(0.5, 1.0)]).unwrap();
/// assert_eq!(cursor.advance(&collection).map(|v| v.offset()), Some(0.5));
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VerticalityCursor {
    state: CursorState,
    reverse: bool,
}

impl VerticalityCursor {
    pub fn new(reverse: bool) -> VerticalityCursor {
        return VerticalityCursor {
            state: CursorState::Fresh,
            reverse,
        };
    }

    /// Offset of the verticality most recently yielded.
    pub fn offset(&self) -> Option<f64> {
        return match self.state {
            CursorState::At(offset) => Some(offset),
            CursorState::Fresh | CursorState::Done => None,
        };
    }

    pub fn is_done(&self) -> bool {
        return self.state == CursorState::Done;
    }

    /// Step to the next start offset (or previous, in reverse) as the
    /// collection stands now. Once it runs off the end it stays done.
    pub fn advance<'a, T>(&mut self, collection: &'a TimespanCollection<T>) -> Option<Verticality<'a, T>> {
        let next = match (self.state, self.reverse) {
            (CursorState::Fresh, false) => collection.start_offset(),
            (CursorState::Fresh, true) => collection.last_start_offset(),
            (CursorState::At(offset), false) => collection.start_offset_after(offset),
            (CursorState::At(offset), true) => collection.start_offset_before(offset),
            (CursorState::Done, _) => None,
        };
        return match next {
            Some(offset) => {
                self.state = CursorState::At(offset);
                Some(collection.verticality_at(offset))
            }
            None => {
                self.state = CursorState::Done;
                None
            }
        };
    }
}

/// Consecutive verticalities, in timeline order.
pub struct VerticalitySequence<'a, T>(Vec<Verticality<'a, T>>);

impl<'a, T> VerticalitySequence<'a, T> {
    pub(crate) fn new(verticalities: Vec<Verticality<'a, T>>) -> VerticalitySequence<'a, T> {
        return VerticalitySequence(verticalities);
    }

    pub fn len(&self) -> usize {
        return self.0.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.0.is_empty();
    }

    pub fn get(&self, index: usize) -> Option<&Verticality<'a, T>> {
        return self.0.get(index);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Verticality<'a, T>> {
        return self.0.iter();
    }

    pub fn offsets(&self) -> Vec<f64> {
        return self.0.iter().map(Verticality::offset).collect();
    }
}

impl<T: fmt::Debug> fmt::Debug for VerticalitySequence<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return f.debug_list().entries(self.0.iter()).finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ElementTimespan;
    use crate::element::Note;
    use crate::timespan::Timespan;
    use std::rc::Rc;

    fn collection(pairs: &[(f64, f64)]) -> TimespanCollection<Timespan> {
        return pairs.iter().map(|&(a, b)| Timespan::new(a, b)).collect();
    }

    fn note(pitch: f64, start: f64, stop: f64) -> ElementTimespan<Note> {
        return ElementTimespan::anchored(Rc::new(Note::new([pitch]))).offsets(start, stop).build().unwrap();
    }

    #[test]
    fn partitions_by_role() {
        let collection = collection(&[(0.0, 2.0), (1.0, 3.0), (0.0, 1.0), (1.0, 1.0)]);
        let v = collection.verticality_at(1.0);
        assert_eq!(v.start_timespans(), &[&Timespan::new(1.0, 1.0), &Timespan::new(1.0, 3.0)]);
        assert_eq!(v.stop_timespans(), &[&Timespan::new(0.0, 1.0), &Timespan::new(1.0, 1.0)]);
        assert_eq!(v.overlap_timespans(), &[&Timespan::new(0.0, 2.0)]);
        assert_eq!(v.degree_of_overlap(), 3);
        assert!(!v.is_empty());
        assert!(collection.verticality_at(10.0).is_empty());
    }

    #[test]
    fn query_is_repeatable() {
        let collection = collection(&[(0.0, 2.0), (0.5, 1.0), (1.0, 3.0)]);
        assert_eq!(collection.verticality_at(1.0), collection.verticality_at(1.0));
    }

    #[test]
    fn neighbours() {
        let collection = collection(&[(0.0, 2.0), (1.0, 3.0), (4.0, 5.0)]);
        let v = collection.verticality_at(1.0);
        assert_eq!(v.next_start_offset(), Some(4.0));
        assert_eq!(v.next_verticality().map(|n| n.offset()), Some(4.0));
        assert_eq!(v.previous_verticality().map(|p| p.offset()), Some(0.0));
        // Offsets between keys still find their neighbours.
        let between = collection.verticality_at(2.5);
        assert_eq!(between.previous_verticality().map(|p| p.offset()), Some(1.0));
        assert!(collection.verticality_at(4.0).next_verticality().is_none());
    }

    #[test]
    fn pitch_set_and_bass() {
        let collection: TimespanCollection<_> =
            [note(64.0, 0.0, 2.0), note(60.0, 1.0, 2.0), note(67.0, 1.0, 3.0), note(48.0, 2.0, 3.0)]
                .into_iter()
                .collect();
        let v = collection.verticality_at(1.0);
        let pitches: Vec<f64> = v.pitch_set().into_iter().map(Pitch::semitones).collect();
        assert_eq!(pitches, vec![60.0, 64.0, 67.0]);
        assert_eq!(v.bass_timespan().and_then(|t| t.pitches().first().copied()), Some(Pitch(60.0)));
    }

    #[test]
    fn cursor_walks_both_ways() {
        let collection = collection(&[(0.0, 1.0), (1.0, 2.0), (3.0, 4.0)]);
        let mut forward = VerticalityCursor::new(false);
        let mut offsets = Vec::new();
        while let Some(v) = forward.advance(&collection) {
            offsets.push(v.offset());
        }
        assert_eq!(offsets, vec![0.0, 1.0, 3.0]);
        assert!(forward.is_done());
        assert!(forward.advance(&collection).is_none());

        let backward: Vec<f64> = collection.iter_verticalities(true).map(|v| v.offset()).collect();
        assert_eq!(backward, vec![3.0, 1.0, 0.0]);
    }

    #[test]
    fn cursor_sees_removals() {
        let mut collection = collection(&[(0.0, 1.0), (1.0, 2.0), (2.0, 3.0)]);
        let mut cursor = VerticalityCursor::new(false);
        assert_eq!(cursor.advance(&collection).map(|v| v.offset()), Some(0.0));
        collection.remove([&Timespan::new(1.0, 2.0)]).unwrap();
        assert_eq!(cursor.advance(&collection).map(|v| v.offset()), Some(2.0));
        assert_eq!(cursor.offset(), Some(2.0));
    }

    #[test]
    fn nwise_windows() {
        let collection = collection(&[(0.0, 1.0), (1.0, 2.0), (2.0, 3.0), (3.0, 4.0)]);
        let forward: Vec<Vec<f64>> =
            collection.iter_verticalities_nwise(3, false).unwrap().map(|w| w.offsets()).collect();
        assert_eq!(forward, vec![vec![0.0, 1.0, 2.0], vec![1.0, 2.0, 3.0]]);

        let backward: Vec<Vec<f64>> =
            collection.iter_verticalities_nwise(3, true).unwrap().map(|w| w.offsets()).collect();
        assert_eq!(backward, vec![vec![1.0, 2.0, 3.0], vec![0.0, 1.0, 2.0]]);

        assert_eq!(collection.iter_verticalities_nwise(5, false).unwrap().count(), 0);
        assert_eq!(collection.iter_verticalities_nwise(1, false).unwrap().count(), 4);
    }
}
