//! Consecutive timespans within one voice, and the melodic figures they
//! form.

use std::fmt;

use crate::element::Pitch;
use crate::element::Pitched;

/// A run of consecutive timespans from a single voice, in timeline order.
///
/// Produced by [`TimespanCollection::horizontalities`](crate::tree::TimespanCollection::horizontalities).
pub struct Horizontality<'a, T>(Vec<&'a T>);

impl<'a, T> Horizontality<'a, T> {
    pub fn new(timespans: Vec<&'a T>) -> Horizontality<'a, T> {
        return Horizontality(timespans);
    }

    pub fn len(&self) -> usize {
        return self.0.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.0.is_empty();
    }

    pub fn timespans(&self) -> &[&'a T] {
        return &self.0;
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a T> + '_ {
        return self.0.iter().copied();
    }
}

impl<T: Pitched> Horizontality<'_, T> {
    /// First pitch of each of exactly three timespans, or `None` if the run
    /// has another length or holds a rest.
    fn lead_pitches(&self) -> Option<[Pitch; 3]> {
        let [a, b, c] = self.0.as_slice() else {
            return None;
        };
        return Some([*a.pitches().first()?, *b.pitches().first()?, *c.pitches().first()?]);
    }

    /// Three notes moving strictly upward or strictly downward.
    pub fn has_passing_tone(&self) -> bool {
        let Some([a, b, c]) = self.lead_pitches() else {
            return false;
        };
        return (a < b && b < c) || (a > b && b > c);
    }

    /// Three notes leaving a pitch by at most two semitones and returning
    /// to it.
    ///
    /// The middle note must actually move: three equal pitches are
    /// [`has_no_motion`](Horizontality::has_no_motion), not a neighbor tone.
    pub fn has_neighbor_tone(&self) -> bool {
        let Some([a, b, c]) = self.lead_pitches() else {
            return false;
        };
        return a == c && a != b && (b.semitones() - a.semitones()).abs() < 3.0;
    }

    /// Every timespan sounds the same pitches.
    pub fn has_no_motion(&self) -> bool {
        let Some((first, rest)) = self.0.split_first() else {
            return false;
        };
        return rest.iter().all(|timespan| timespan.pitches() == first.pitches());
    }
}

impl<T: fmt::Debug> fmt::Debug for Horizontality<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return f.debug_tuple("Horizontality").field(&self.0).finish();
    }
}
