//! Walking verticalities while the collection changes underneath.

use std::rc::Rc;

use timespans::element::ElementTimespan;
use timespans::element::Note;
use timespans::timespan::Spanned;
use timespans::timespan::Timespan;
use timespans::tree::TimespanCollection;
use timespans::verticality::VerticalityCursor;

// =============================================================================
// Test helpers
// =============================================================================

fn collection(pairs: &[(f64, f64)]) -> TimespanCollection<Timespan> {
    return pairs.iter().map(|&(a, b)| Timespan::new(a, b)).collect();
}

// =============================================================================
// Live navigation
// =============================================================================

#[test]
fn insertions_ahead_of_the_cursor_are_visited() {
    let mut collection = collection(&[(0.0, 1.0), (2.0, 3.0)]);
    let mut cursor = VerticalityCursor::new(false);
    let mut seen = Vec::new();

    while let Some(offset) = cursor.advance(&collection).map(|v| v.offset()) {
        seen.push(offset);
        if offset == 0.0 {
            collection.insert([Timespan::new(1.0, 2.0), Timespan::new(4.0, 5.0)]).unwrap();
        }
    }
    assert_eq!(seen, vec![0.0, 1.0, 2.0, 4.0]);
}

#[test]
fn insertions_behind_the_cursor_are_skipped() {
    let mut collection = collection(&[(1.0, 2.0), (3.0, 4.0)]);
    let mut cursor = VerticalityCursor::new(false);
    let mut seen = Vec::new();

    while let Some(offset) = cursor.advance(&collection).map(|v| v.offset()) {
        seen.push(offset);
        if offset == 1.0 {
            collection.insert([Timespan::new(0.0, 1.0)]).unwrap();
        }
    }
    assert_eq!(seen, vec![1.0, 3.0]);
    assert_eq!(collection.all_offsets(), vec![0.0, 1.0, 3.0]);
}

#[test]
fn removing_the_current_verticality_keeps_the_walk_going() {
    let mut collection = collection(&[(0.0, 1.0), (1.0, 2.0), (2.0, 3.0), (3.0, 4.0)]);
    let mut cursor = VerticalityCursor::new(false);
    let mut seen = Vec::new();

    loop {
        let Some(starting) = cursor
            .advance(&collection)
            .map(|v| v.start_timespans().iter().map(|t| **t).collect::<Vec<Timespan>>())
        else {
            break;
        };
        seen.push(starting[0].start());
        // Consume the current offset and the next one.
        collection.remove(starting.iter()).unwrap();
        if let Some(next) = cursor.offset().and_then(|o| collection.start_offset_after(o)) {
            let doomed: Vec<Timespan> = collection.find_starting_at(next).into_iter().copied().collect();
            collection.remove(doomed.iter()).unwrap();
        }
    }
    assert_eq!(seen, vec![0.0, 2.0]);
    assert!(collection.is_empty());
}

#[test]
fn reverse_cursor_sees_mutation_too() {
    let mut collection = collection(&[(0.0, 1.0), (2.0, 3.0), (4.0, 5.0)]);
    let mut cursor = VerticalityCursor::new(true);
    let mut seen = Vec::new();

    while let Some(offset) = cursor.advance(&collection).map(|v| v.offset()) {
        seen.push(offset);
        if offset == 4.0 {
            collection.insert([Timespan::new(3.0, 4.0)]).unwrap();
            collection.remove([&Timespan::new(0.0, 1.0)]).unwrap();
        }
    }
    assert_eq!(seen, vec![4.0, 3.0, 2.0]);
}

// =============================================================================
// Iterators
// =============================================================================

#[test]
fn iterators_cover_every_start() {
    let collection = collection(&[(0.0, 4.0), (1.0, 2.0), (1.0, 3.0), (3.0, 4.0)]);
    let forward: Vec<f64> = collection.iter_verticalities(false).map(|v| v.offset()).collect();
    assert_eq!(forward, vec![0.0, 1.0, 3.0]);

    let degrees: Vec<usize> = collection.iter_verticalities(false).map(|v| v.degree_of_overlap()).collect();
    assert_eq!(degrees, vec![1, 3, 2]);
    assert_eq!(collection.maximum_overlap(), Some(3));
    assert_eq!(collection.minimum_overlap(), Some(1));
}

#[test]
fn nwise_windows_chain_neighbours() {
    let collection = collection(&[(0.0, 1.0), (0.5, 1.0), (1.0, 2.0), (2.0, 3.0)]);
    let windows: Vec<Vec<f64>> = collection
        .iter_verticalities_nwise(2, false)
        .unwrap()
        .map(|window| window.iter().map(|v| v.offset()).collect())
        .collect();
    assert_eq!(windows, vec![vec![0.0, 0.5], vec![0.5, 1.0], vec![1.0, 2.0]]);

    let last = collection.iter_verticalities_nwise(4, true).unwrap().next().unwrap();
    assert_eq!(last.offsets(), vec![0.0, 0.5, 1.0, 2.0]);
    assert_eq!(last.len(), 4);
}

#[test]
fn empty_collection_has_no_verticalities() {
    let collection: TimespanCollection<Timespan> = TimespanCollection::new();
    assert_eq!(collection.iter_verticalities(false).count(), 0);
    assert_eq!(collection.iter_verticalities_nwise(1, true).unwrap().count(), 0);
    let mut cursor = VerticalityCursor::new(false);
    assert!(cursor.advance(&collection).is_none());
    assert!(cursor.is_done());
}

#[test]
fn chord_analysis_along_the_walk() {
    let chord = |pitches: &[f64], start: f64, stop: f64| {
        ElementTimespan::anchored(Rc::new(Note::new(pitches.iter().copied())))
            .offsets(start, stop)
            .build()
            .unwrap()
    };
    let collection: TimespanCollection<_> = [
        chord(&[48.0], 0.0, 2.0),
        chord(&[64.0, 67.0], 0.0, 1.0),
        chord(&[65.0, 69.0], 1.0, 2.0),
        chord(&[], 1.0, 2.0),
    ]
    .into_iter()
    .collect();

    let sizes: Vec<usize> = collection.iter_verticalities(false).map(|v| v.pitch_set().len()).collect();
    assert_eq!(sizes, vec![3, 3]);

    let second = collection.verticality_at(1.0);
    assert_eq!(second.start_and_overlap_timespans().len(), 3);
    assert_eq!(second.stop_timespans().len(), 1);
    let bass = second.bass_timespan().unwrap();
    assert_eq!(bass.start_offset(), Some(0.0));
}
