//! The timespan contract and the plain interval that implements it.
//!
//! Anything with a numeric start and stop offset can be indexed by a
//! [`TimespanCollection`](crate::tree::TimespanCollection). Values describe
//! themselves through [`Spanned`]; values that can be cut or stretched also
//! implement [`Derive`], which is what
//! [`split_at`](crate::tree::TimespanCollection::split_at) relies on.

use smallvec::SmallVec;
use smallvec::smallvec;

use crate::config::EndpointOrder;
use crate::element::ContainerId;
use crate::error::Result;
use crate::error::TimespanError;
use crate::tree::SharedCollection;

/// Canonical document-order key used to break ties between timespans that
/// start at the same offset.
///
/// Compared field by field: priority first, then class order, then the
/// order in which the element was inserted into its container.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SortKey {
    pub priority: i32,
    pub class_order: i32,
    pub insert_index: u64,
}

/// A value with a position on the timeline.
///
/// Either offset may be missing: an empty nested collection has no bounds,
/// and a detached element may not have been placed yet. `NaN` counts as
/// missing. Such values cannot be indexed.
pub trait Spanned {
    fn start_offset(&self) -> Option<f64>;

    fn stop_offset(&self) -> Option<f64>;

    /// Tie-break key for values sharing a start offset. Values without one
    /// are ordered by stop offset alone.
    fn sort_key(&self) -> Option<SortKey> {
        return None;
    }

    /// The logical voice (innermost enclosing container) this value
    /// belongs to, if it has one.
    fn voice(&self) -> Option<ContainerId> {
        return None;
    }

    /// The nested collection this value stands for, if it is one.
    fn as_collection(&self) -> Option<&SharedCollection<Self>>
    where
        Self: Sized,
    {
        return None;
    }

    /// Length of the span, or `None` if either bound is missing.
    fn duration(&self) -> Option<f64> {
        return Some(self.stop_offset()? - self.start_offset()?);
    }
}

/// A [`Spanned`] value that can produce a modified copy of itself.
pub trait Derive: Spanned + Sized {
    /// Copy of `self` moved to `[start, stop]`, every other field preserved.
    fn derive(&self, start: f64, stop: f64) -> Self;

    /// Cut at `offset`.
    ///
    /// Returns the two halves `[start, offset]` and `[offset, stop]` when the
    /// offset lies strictly inside, otherwise `self` unchanged as the only
    /// element.
    fn split_at(&self, offset: f64) -> SmallVec<[Self; 2]>
    where
        Self: Clone,
    {
        let (Some(start), Some(stop)) = (self.start_offset(), self.stop_offset()) else {
            return smallvec![self.clone()];
        };
        if offset <= start || stop <= offset {
            return smallvec![self.clone()];
        }
        return smallvec![self.derive(start, offset), self.derive(offset, stop)];
    }
}

/// Resolve the indexable bounds of a value.
///
/// Fails when a bound is missing or `NaN`, or when the stored endpoints are
/// out of order. `-0.0` comes back as `0.0` so keys compare consistently.
pub(crate) fn bounds_of<T: Spanned>(item: &T) -> Result<(f64, f64)> {
    return ordered_bounds_of(item, EndpointOrder::Reject);
}

/// As [`bounds_of`], with `order` deciding what happens to endpoints
/// reported out of order.
pub(crate) fn ordered_bounds_of<T: Spanned>(item: &T, order: EndpointOrder) -> Result<(f64, f64)> {
    let (Some(start), Some(stop)) = (item.start_offset(), item.stop_offset()) else {
        return Err(TimespanError::InvalidTimespan("missing start or stop offset".to_string()));
    };
    if start.is_nan() || stop.is_nan() {
        return Err(TimespanError::InvalidTimespan("offset is NaN".to_string()));
    }
    let (start, stop) = order.order(start, stop)?;
    return Ok((start + 0.0, stop + 0.0));
}

/// Work out which of two spans comes first when they share a boundary.
///
/// Returns `true` when `left` ends where `right` begins, `false` for the
/// reverse, and [`TimespanError::NonContiguous`] otherwise.
pub(crate) fn contiguous(left: (f64, f64), right: (f64, f64)) -> Result<bool> {
    if left.1 == right.0 {
        return Ok(true);
    }
    if right.1 == left.0 {
        return Ok(false);
    }
    return Err(TimespanError::NonContiguous { left, right });
}

/// A bare interval `[start, stop]` on the timeline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Timespan {
    start: f64,
    stop: f64,
}

impl Timespan {
    /// Build an interval, swapping the endpoints if they arrive out of order.
    pub fn new(start: f64, stop: f64) -> Timespan {
        if stop < start {
            return Timespan { start: stop, stop: start };
        }
        return Timespan { start, stop };
    }

    /// Build an interval, letting `order` decide what happens to swapped
    /// endpoints.
    pub fn with_order(start: f64, stop: f64, order: EndpointOrder) -> Result<Timespan> {
        if start.is_nan() || stop.is_nan() {
            return Err(TimespanError::InvalidTimespan("offset is NaN".to_string()));
        }
        let (start, stop) = order.order(start, stop)?;
        return Ok(Timespan { start, stop });
    }

    pub fn start(&self) -> f64 {
        return self.start;
    }

    pub fn stop(&self) -> f64 {
        return self.stop;
    }

    /// Succeeds when the two intervals share a boundary.
    pub fn can_merge(&self, other: &Timespan) -> Result<()> {
        contiguous((self.start, self.stop), (other.start, other.stop))?;
        return Ok(());
    }

    /// Join two contiguous intervals into one.
    pub fn merge_with(&self, other: &Timespan) -> Result<Timespan> {
        self.can_merge(other)?;
        return Ok(Timespan {
            start: self.start.min(other.start),
            stop: self.stop.max(other.stop),
        });
    }
}

impl Spanned for Timespan {
    fn start_offset(&self) -> Option<f64> {
        return Some(self.start);
    }

    fn stop_offset(&self) -> Option<f64> {
        return Some(self.stop);
    }
}

impl Derive for Timespan {
    fn derive(&self, start: f64, stop: f64) -> Timespan {
        return Timespan::new(start, stop);
    }
}

impl From<(f64, f64)> for Timespan {
    fn from((start, stop): (f64, f64)) -> Timespan {
        return Timespan::new(start, stop);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_normalizes_swapped_endpoints() {
        let span = Timespan::new(3.0, 1.0);
        assert_eq!(span.start(), 1.0);
        assert_eq!(span.stop(), 3.0);
        assert_eq!(span.duration(), Some(2.0));
    }

    #[test]
    fn with_order_rejects_when_asked() {
        assert!(Timespan::with_order(3.0, 1.0, EndpointOrder::Reject).is_err());
        assert_eq!(
            Timespan::with_order(3.0, 1.0, EndpointOrder::Normalize),
            Ok(Timespan::new(1.0, 3.0))
        );
        assert!(Timespan::with_order(f64::NAN, 1.0, EndpointOrder::Normalize).is_err());
    }

    #[test]
    fn split_inside() {
        let halves = Timespan::new(0.0, 0.5).split_at(0.1);
        assert_eq!(halves.as_slice(), &[Timespan::new(0.0, 0.1), Timespan::new(0.1, 0.5)]);
    }

    #[test]
    fn split_outside_or_on_boundary_is_identity() {
        let span = Timespan::new(1.0, 2.0);
        assert_eq!(span.split_at(0.5).as_slice(), &[span]);
        assert_eq!(span.split_at(1.0).as_slice(), &[span]);
        assert_eq!(span.split_at(2.0).as_slice(), &[span]);
        assert_eq!(span.split_at(3.0).as_slice(), &[span]);
    }

    #[test]
    fn merge_contiguous_either_order() {
        let a = Timespan::new(0.0, 1.0);
        let b = Timespan::new(1.0, 3.0);
        assert_eq!(a.merge_with(&b), Ok(Timespan::new(0.0, 3.0)));
        assert_eq!(b.merge_with(&a), Ok(Timespan::new(0.0, 3.0)));
    }

    #[test]
    fn merge_rejects_gaps() {
        let a = Timespan::new(0.0, 1.0);
        let b = Timespan::new(2.0, 3.0);
        assert_eq!(
            a.merge_with(&b),
            Err(TimespanError::NonContiguous { left: (0.0, 1.0), right: (2.0, 3.0) })
        );
    }

    #[test]
    fn bounds_normalize_negative_zero() {
        let (start, _) = bounds_of(&Timespan::new(-0.0, 1.0)).unwrap();
        assert_eq!(start.to_bits(), 0.0f64.to_bits());
    }

    #[test]
    fn sort_key_orders_fieldwise() {
        let a = SortKey { priority: 0, class_order: 1, insert_index: 9 };
        let b = SortKey { priority: 0, class_order: 2, insert_index: 0 };
        let c = SortKey { priority: 1, class_order: 0, insert_index: 0 };
        assert!(a < b && b < c);
    }
}
