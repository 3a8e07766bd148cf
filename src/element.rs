//! Timespans anchored to musical events.
//!
//! The musical model itself (notes, chords, parts, measures) lives outside
//! this crate. It is seen here only through [`Event`], and an
//! [`ElementTimespan`] refers to its event by shared reference rather than
//! owning it. Equality of element timespans compares that reference by
//! identity.
//!
//! Element timespans are immutable. Splitting, merging or moving one yields
//! a new value via [`ElementTimespan::derive_with`], which copies every field
//! the caller does not override.

use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::config::EndpointOrder;
use crate::error::Result;
use crate::error::TimespanError;
use crate::timespan::Derive;
use crate::timespan::SortKey;
use crate::timespan::Spanned;
use crate::timespan::bounds_of;
use crate::timespan::contiguous;

/// A position in pitch space, in semitones (middle C is 60).
///
/// Ordered and compared with [`f64::total_cmp`], so pitches can be sorted
/// and deduplicated.
#[derive(Clone, Copy, Debug)]
pub struct Pitch(pub f64);

impl Pitch {
    pub fn semitones(self) -> f64 {
        return self.0;
    }
}

impl PartialEq for Pitch {
    fn eq(&self, other: &Pitch) -> bool {
        return self.0.total_cmp(&other.0).is_eq();
    }
}

impl Eq for Pitch {}

impl PartialOrd for Pitch {
    fn partial_cmp(&self, other: &Pitch) -> Option<std::cmp::Ordering> {
        return Some(self.cmp(other));
    }
}

impl Ord for Pitch {
    fn cmp(&self, other: &Pitch) -> std::cmp::Ordering {
        return self.0.total_cmp(&other.0);
    }
}

/// Values that sound pitches.
pub trait Pitched {
    /// Pitches in the order the event lists them; empty for rests.
    fn pitches(&self) -> &[Pitch];
}

/// Identity of an enclosing container (part, voice, measure, tuplet group).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId(pub u32);

/// What this crate needs to know about an anchored musical event.
pub trait Event {
    fn pitches(&self) -> &[Pitch] {
        return &[];
    }

    /// Canonical document-order key, if the event has one.
    fn sort_key(&self) -> Option<SortKey> {
        return None;
    }

    /// Metrical weight of the event's onset, if known.
    fn beat_strength(&self) -> Option<f64> {
        return None;
    }
}

/// The simplest event: a set of simultaneous pitches. An empty set is a rest.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Note {
    pub pitches: SmallVec<[Pitch; 4]>,
    pub sort_key: Option<SortKey>,
    pub beat_strength: Option<f64>,
}

impl Note {
    pub fn new(pitches: impl IntoIterator<Item = f64>) -> Note {
        return Note {
            pitches: pitches.into_iter().map(Pitch).collect(),
            sort_key: None,
            beat_strength: None,
        };
    }

    pub fn rest() -> Note {
        return Note::default();
    }

    pub fn with_sort_key(mut self, sort_key: SortKey) -> Note {
        self.sort_key = Some(sort_key);
        return self;
    }

    pub fn with_beat_strength(mut self, beat_strength: f64) -> Note {
        self.beat_strength = Some(beat_strength);
        return self;
    }
}

impl Event for Note {
    fn pitches(&self) -> &[Pitch] {
        return &self.pitches;
    }

    fn sort_key(&self) -> Option<SortKey> {
        return self.sort_key;
    }

    fn beat_strength(&self) -> Option<f64> {
        return self.beat_strength;
    }
}

/// Field overrides for [`ElementTimespan::derive_with`]. `None` keeps the
/// original value.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Overrides {
    pub start_offset: Option<f64>,
    pub stop_offset: Option<f64>,
    pub parent_start_offset: Option<f64>,
    pub parent_stop_offset: Option<f64>,
    pub beat_strength: Option<f64>,
    pub endpoint_order: EndpointOrder,
}

/// An interval anchored to one musical event.
///
/// Besides its own bounds it records the chain of enclosing containers
/// (`parentage[0]` is the innermost), the bounds of the innermost container,
/// and optionally a cached beat strength.
pub struct ElementTimespan<E> {
    element: Option<Rc<E>>,
    parentage: SmallVec<[ContainerId; 4]>,
    start_offset: Option<f64>,
    stop_offset: Option<f64>,
    parent_start_offset: Option<f64>,
    parent_stop_offset: Option<f64>,
    beat_strength: Option<f64>,
}

impl<E> ElementTimespan<E> {
    /// Start building a timespan anchored to `element`.
    pub fn anchored(element: Rc<E>) -> ElementTimespanBuilder<E> {
        return ElementTimespanBuilder::new(Some(element));
    }

    /// Start building a timespan with no anchored element.
    pub fn bare() -> ElementTimespanBuilder<E> {
        return ElementTimespanBuilder::new(None);
    }

    pub fn element(&self) -> Option<&Rc<E>> {
        return self.element.as_ref();
    }

    /// Enclosing containers, innermost first.
    pub fn parentage(&self) -> &[ContainerId] {
        return &self.parentage;
    }

    pub fn parent_start_offset(&self) -> Option<f64> {
        return self.parent_start_offset;
    }

    pub fn parent_stop_offset(&self) -> Option<f64> {
        return self.parent_stop_offset;
    }

    /// True when this timespan begins exactly where its innermost container
    /// begins.
    pub fn is_at_parent_start(&self) -> bool {
        return self.start_offset.is_some() && self.start_offset == self.parent_start_offset;
    }

    /// True when this timespan ends exactly where its innermost container
    /// ends.
    pub fn is_at_parent_stop(&self) -> bool {
        return self.stop_offset.is_some() && self.stop_offset == self.parent_stop_offset;
    }

    /// Copy with some fields replaced, validated like a freshly built value.
    pub fn derive_with(&self, overrides: Overrides) -> Result<ElementTimespan<E>> {
        let mut builder = ElementTimespanBuilder {
            inner: self.clone(),
            order: overrides.endpoint_order,
        };
        let inner = &mut builder.inner;
        if overrides.start_offset.is_some() {
            inner.start_offset = overrides.start_offset;
        }
        if overrides.stop_offset.is_some() {
            inner.stop_offset = overrides.stop_offset;
        }
        if overrides.parent_start_offset.is_some() {
            inner.parent_start_offset = overrides.parent_start_offset;
        }
        if overrides.parent_stop_offset.is_some() {
            inner.parent_stop_offset = overrides.parent_stop_offset;
        }
        if overrides.beat_strength.is_some() {
            inner.beat_strength = overrides.beat_strength;
        }
        return builder.build();
    }
}

impl<E: Event> ElementTimespan<E> {
    /// Cached beat strength, falling back to the element's own.
    pub fn beat_strength(&self) -> Option<f64> {
        if self.beat_strength.is_some() {
            return self.beat_strength;
        }
        return self.element.as_ref().and_then(|element| element.beat_strength());
    }

    /// Succeeds when `other` can be merged into `self`: both anchored or
    /// both bare, sharing a boundary, and sounding the same pitches.
    pub fn can_merge(&self, other: &ElementTimespan<E>) -> Result<()> {
        self.merge_order(other)?;
        return Ok(());
    }

    /// Join two contiguous timespans sounding the same pitches.
    ///
    /// The result spans both. It keeps the earlier timespan's element,
    /// parentage, beat strength and parent start, and the later timespan's
    /// parent stop.
    pub fn merge_with(&self, other: &ElementTimespan<E>) -> Result<ElementTimespan<E>> {
        let (first, second) = match self.merge_order(other)? {
            true => (self, other),
            false => (other, self),
        };
        return Ok(ElementTimespan {
            element: first.element.clone(),
            parentage: first.parentage.clone(),
            start_offset: first.start_offset,
            stop_offset: second.stop_offset,
            parent_start_offset: first.parent_start_offset,
            parent_stop_offset: second.parent_stop_offset,
            beat_strength: first.beat_strength,
        });
    }

    /// Validate a merge, returning whether `self` comes first.
    fn merge_order(&self, other: &ElementTimespan<E>) -> Result<bool> {
        if self.element.is_some() != other.element.is_some() {
            return Err(TimespanError::TypeMismatch(
                "cannot merge an anchored timespan with a bare one".to_string(),
            ));
        }
        let left = bounds_of(self)?;
        let right = bounds_of(other)?;
        let self_first = contiguous(left, right)?;
        if Pitched::pitches(self) != Pitched::pitches(other) {
            return Err(TimespanError::PitchMismatch { left, right });
        }
        return Ok(self_first);
    }
}

impl<E> Clone for ElementTimespan<E> {
    fn clone(&self) -> ElementTimespan<E> {
        return ElementTimespan {
            element: self.element.clone(),
            parentage: self.parentage.clone(),
            start_offset: self.start_offset,
            stop_offset: self.stop_offset,
            parent_start_offset: self.parent_start_offset,
            parent_stop_offset: self.parent_stop_offset,
            beat_strength: self.beat_strength,
        };
    }
}

impl<E> PartialEq for ElementTimespan<E> {
    fn eq(&self, other: &ElementTimespan<E>) -> bool {
        let same_element = match (&self.element, &other.element) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        return same_element
            && self.start_offset == other.start_offset
            && self.stop_offset == other.stop_offset
            && self.parentage == other.parentage
            && self.parent_start_offset == other.parent_start_offset
            && self.parent_stop_offset == other.parent_stop_offset
            && self.beat_strength == other.beat_strength;
    }
}

impl<E> fmt::Debug for ElementTimespan<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return f
            .debug_struct("ElementTimespan")
            .field("start_offset", &self.start_offset)
            .field("stop_offset", &self.stop_offset)
            .field("anchored", &self.element.is_some())
            .field("parentage", &self.parentage)
            .finish();
    }
}

impl<E: Event> Spanned for ElementTimespan<E> {
    fn start_offset(&self) -> Option<f64> {
        return self.start_offset;
    }

    fn stop_offset(&self) -> Option<f64> {
        return self.stop_offset;
    }

    fn sort_key(&self) -> Option<SortKey> {
        return self.element.as_ref().and_then(|element| element.sort_key());
    }

    fn voice(&self) -> Option<ContainerId> {
        return self.parentage.first().copied();
    }
}

impl<E: Event> Pitched for ElementTimespan<E> {
    fn pitches(&self) -> &[Pitch] {
        return match &self.element {
            Some(element) => element.pitches(),
            None => &[],
        };
    }
}

impl<E: Event> Derive for ElementTimespan<E> {
    fn derive(&self, start: f64, stop: f64) -> ElementTimespan<E> {
        let mut derived = self.clone();
        derived.start_offset = Some(start.min(stop));
        derived.stop_offset = Some(start.max(stop));
        return derived;
    }
}

/// Builder for [`ElementTimespan`].
pub struct ElementTimespanBuilder<E> {
    inner: ElementTimespan<E>,
    order: EndpointOrder,
}

impl<E> ElementTimespanBuilder<E> {
    fn new(element: Option<Rc<E>>) -> ElementTimespanBuilder<E> {
        return ElementTimespanBuilder {
            inner: ElementTimespan {
                element,
                parentage: SmallVec::new(),
                start_offset: None,
                stop_offset: None,
                parent_start_offset: None,
                parent_stop_offset: None,
                beat_strength: None,
            },
            order: EndpointOrder::default(),
        };
    }

    pub fn offsets(mut self, start: f64, stop: f64) -> ElementTimespanBuilder<E> {
        self.inner.start_offset = Some(start);
        self.inner.stop_offset = Some(stop);
        return self;
    }

    /// Enclosing containers listed outermost first, the way a score is
    /// walked. They are stored innermost first.
    pub fn parentage(mut self, outer_to_inner: impl IntoIterator<Item = ContainerId>) -> ElementTimespanBuilder<E> {
        let mut parentage: SmallVec<[ContainerId; 4]> = outer_to_inner.into_iter().collect();
        parentage.reverse();
        self.inner.parentage = parentage;
        return self;
    }

    /// Bounds of the innermost enclosing container.
    pub fn parent_offsets(mut self, start: f64, stop: f64) -> ElementTimespanBuilder<E> {
        self.inner.parent_start_offset = Some(start);
        self.inner.parent_stop_offset = Some(stop);
        return self;
    }

    pub fn beat_strength(mut self, beat_strength: f64) -> ElementTimespanBuilder<E> {
        self.inner.beat_strength = Some(beat_strength);
        return self;
    }

    pub fn endpoint_order(mut self, order: EndpointOrder) -> ElementTimespanBuilder<E> {
        self.order = order;
        return self;
    }

    pub fn build(self) -> Result<ElementTimespan<E>> {
        let mut inner = self.inner;
        (inner.start_offset, inner.stop_offset) = order_pair(inner.start_offset, inner.stop_offset, self.order)?;
        (inner.parent_start_offset, inner.parent_stop_offset) =
            order_pair(inner.parent_start_offset, inner.parent_stop_offset, self.order)?;
        return Ok(inner);
    }
}

fn order_pair(start: Option<f64>, stop: Option<f64>, order: EndpointOrder) -> Result<(Option<f64>, Option<f64>)> {
    if start.is_some_and(f64::is_nan) || stop.is_some_and(f64::is_nan) {
        return Err(TimespanError::InvalidTimespan("offset is NaN".to_string()));
    }
    return match (start, stop) {
        (Some(start), Some(stop)) => {
            let (start, stop) = order.order(start, stop)?;
            Ok((Some(start), Some(stop)))
        }
        pair => Ok(pair),
    };
}
