//! AVL tree nodes keyed by start offset.
//!
//! Each node holds the payload of every stored value starting at its key,
//! plus cached augmentation for its subtree:
//!
//! - `height` and `balance` for AVL rebalancing, maintained along the
//!   insertion or deletion path.
//! - `stop_offset_low` / `stop_offset_high`: extrema of every stop offset in
//!   the subtree, used to prune point queries.
//! - `node_*_index` / `subtree_*_index`: the rank range occupied by the
//!   payload and by the whole subtree, used for positional access.
//!
//! Extrema and rank ranges are rederived for the whole tree by [`Node::refresh`]
//! after each mutating batch. That pass is O(n).
//!
//! Children are exclusively owned (`Box`), and payload entries are moved in
//! and out by value.

use std::cmp::Ordering;

use smallvec::SmallVec;

use crate::timespan::SortKey;

/// A stored value, with the ordering data read from it at insertion time.
pub(crate) struct Entry<T> {
    pub(crate) stop_offset: f64,
    pub(crate) sort_key: Option<SortKey>,
    pub(crate) item: T,
}

impl<T> Entry<T> {
    /// Order within a payload. Entries carrying a sort key come first,
    /// ordered by key then stop offset; the rest follow by stop offset.
    fn tie_break(&self, other: &Entry<T>) -> Ordering {
        let by_stop = self.stop_offset.total_cmp(&other.stop_offset);
        return match (&self.sort_key, &other.sort_key) {
            (Some(a), Some(b)) => a.cmp(b).then(by_stop),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => by_stop,
        };
    }
}

pub(crate) type Link<T> = Option<Box<Node<T>>>;

pub(crate) struct Node<T> {
    pub(crate) start_offset: f64,
    pub(crate) payload: SmallVec<[Entry<T>; 2]>,
    pub(crate) left: Link<T>,
    pub(crate) right: Link<T>,
    /// Leaves have height 0.
    pub(crate) height: i32,
    /// Right subtree height minus left subtree height.
    pub(crate) balance: i32,
    pub(crate) stop_offset_low: f64,
    pub(crate) stop_offset_high: f64,
    pub(crate) node_start_index: usize,
    pub(crate) node_stop_index: usize,
    pub(crate) subtree_start_index: usize,
    pub(crate) subtree_stop_index: usize,
}

impl<T> Node<T> {
    fn new(start_offset: f64) -> Node<T> {
        return Node {
            start_offset,
            payload: SmallVec::new(),
            left: None,
            right: None,
            height: 0,
            balance: 0,
            stop_offset_low: f64::INFINITY,
            stop_offset_high: f64::NEG_INFINITY,
            node_start_index: 0,
            node_stop_index: 0,
            subtree_start_index: 0,
            subtree_stop_index: 0,
        };
    }

    /// Add an entry to the payload, keeping it in tie-break order. Entries
    /// that tie keep their insertion order.
    fn push(&mut self, entry: Entry<T>) {
        self.payload.push(entry);
        self.payload.sort_by(|a, b| a.tie_break(b));
    }

    fn update_height(&mut self) {
        let left = self.left.as_ref().map_or(-1, |node| node.height);
        let right = self.right.as_ref().map_or(-1, |node| node.height);
        self.height = left.max(right) + 1;
        self.balance = right - left;
    }

    /// Rederive rank ranges and stop-offset extrema for this subtree, whose
    /// first entry has rank `start_index`. Returns the subtree's stop index.
    pub(crate) fn refresh(&mut self, start_index: usize) -> usize {
        let mut low = f64::INFINITY;
        let mut high = f64::NEG_INFINITY;

        self.subtree_start_index = start_index;
        self.node_start_index = match self.left.as_mut() {
            Some(left) => {
                let stop = left.refresh(start_index);
                low = low.min(left.stop_offset_low);
                high = high.max(left.stop_offset_high);
                stop
            }
            None => start_index,
        };
        self.node_stop_index = self.node_start_index + self.payload.len();

        for entry in self.payload.iter() {
            low = low.min(entry.stop_offset);
            high = high.max(entry.stop_offset);
        }

        self.subtree_stop_index = match self.right.as_mut() {
            Some(right) => {
                let stop = right.refresh(self.node_stop_index);
                low = low.min(right.stop_offset_low);
                high = high.max(right.stop_offset_high);
                stop
            }
            None => self.node_stop_index,
        };

        self.stop_offset_low = low;
        self.stop_offset_high = high;
        return self.subtree_stop_index;
    }

    /// The entry at rank `index`, steering by cached rank ranges.
    pub(crate) fn entry_at(&self, index: usize) -> Option<&Entry<T>> {
        if self.node_start_index <= index && index < self.node_stop_index {
            return self.payload.get(index - self.node_start_index);
        }
        if index < self.node_start_index {
            return self.left.as_ref()?.entry_at(index);
        }
        return self.right.as_ref()?.entry_at(index);
    }

    /// Append the items with ranks in `start..stop`, in order.
    pub(crate) fn collect_range<'a>(&'a self, start: usize, stop: usize, out: &mut Vec<&'a T>) {
        if start < self.node_start_index {
            if let Some(left) = self.left.as_ref() {
                left.collect_range(start, stop, out);
            }
        }
        if start < self.node_stop_index && self.node_start_index < stop {
            let from = start.saturating_sub(self.node_start_index);
            let to = (stop - self.node_start_index).min(self.payload.len());
            out.extend(self.payload[from..to].iter().map(|entry| &entry.item));
        }
        if self.node_stop_index < stop {
            if let Some(right) = self.right.as_ref() {
                right.collect_range(start, stop, out);
            }
        }
    }

    /// Append every item stopping exactly at `offset`, in tree order, with
    /// its start offset. Subtrees whose stop extrema exclude `offset` are
    /// skipped.
    pub(crate) fn collect_stopping_at<'a>(&'a self, offset: f64, out: &mut Vec<(f64, &'a Entry<T>)>) {
        if offset < self.stop_offset_low || self.stop_offset_high < offset {
            return;
        }
        if let Some(left) = self.left.as_ref() {
            left.collect_stopping_at(offset, out);
        }
        for entry in self.payload.iter() {
            if entry.stop_offset == offset {
                out.push((self.start_offset, entry));
            }
        }
        if let Some(right) = self.right.as_ref() {
            right.collect_stopping_at(offset, out);
        }
    }

    /// Append every item with `start < offset < stop`, in tree order.
    pub(crate) fn collect_overlapping<'a>(&'a self, offset: f64, out: &mut Vec<&'a T>) {
        if self.start_offset < offset && offset < self.stop_offset_high {
            if let Some(left) = self.left.as_ref() {
                left.collect_overlapping(offset, out);
            }
            for entry in self.payload.iter() {
                if offset < entry.stop_offset {
                    out.push(&entry.item);
                }
            }
            if let Some(right) = self.right.as_ref() {
                right.collect_overlapping(offset, out);
            }
        } else if offset <= self.start_offset {
            // Everything at or right of this key starts too late to overlap.
            if let Some(left) = self.left.as_ref() {
                left.collect_overlapping(offset, out);
            }
        }
    }
}

/// The node keyed at `start_offset`, if any.
pub(crate) fn find<T>(link: &Link<T>, start_offset: f64) -> Option<&Node<T>> {
    let mut current = link.as_deref();
    while let Some(node) = current {
        current = match start_offset.total_cmp(&node.start_offset) {
            Ordering::Less => node.left.as_deref(),
            Ordering::Greater => node.right.as_deref(),
            Ordering::Equal => return Some(node),
        };
    }
    return None;
}

pub(crate) fn find_mut<T>(link: &mut Link<T>, start_offset: f64) -> Option<&mut Node<T>> {
    let node = link.as_deref_mut()?;
    return match start_offset.total_cmp(&node.start_offset) {
        Ordering::Less => find_mut(&mut node.left, start_offset),
        Ordering::Greater => find_mut(&mut node.right, start_offset),
        Ordering::Equal => Some(node),
    };
}

/// Smallest key strictly greater than `offset`.
pub(crate) fn start_offset_after<T>(link: &Link<T>, offset: f64) -> Option<f64> {
    let mut best = None;
    let mut current = link.as_deref();
    while let Some(node) = current {
        if offset < node.start_offset {
            best = Some(node.start_offset);
            current = node.left.as_deref();
        } else {
            current = node.right.as_deref();
        }
    }
    return best;
}

/// Largest key strictly less than `offset`.
pub(crate) fn start_offset_before<T>(link: &Link<T>, offset: f64) -> Option<f64> {
    let mut best = None;
    let mut current = link.as_deref();
    while let Some(node) = current {
        if node.start_offset < offset {
            best = Some(node.start_offset);
            current = node.right.as_deref();
        } else {
            current = node.left.as_deref();
        }
    }
    return best;
}

pub(crate) fn first_start_offset<T>(link: &Link<T>) -> Option<f64> {
    let mut node = link.as_deref()?;
    while let Some(left) = node.left.as_deref() {
        node = left;
    }
    return Some(node.start_offset);
}

pub(crate) fn last_start_offset<T>(link: &Link<T>) -> Option<f64> {
    let mut node = link.as_deref()?;
    while let Some(right) = node.right.as_deref() {
        node = right;
    }
    return Some(node.start_offset);
}

/// Add `entry` under key `start_offset`, creating the node if needed, and
/// rebalance on the way back up. Returns the new subtree root.
pub(crate) fn insert<T>(link: Link<T>, start_offset: f64, entry: Entry<T>) -> Box<Node<T>> {
    let mut node = match link {
        Some(node) => node,
        None => {
            let mut node = Box::new(Node::new(start_offset));
            node.push(entry);
            return node;
        }
    };
    match start_offset.total_cmp(&node.start_offset) {
        Ordering::Less => node.left = Some(insert(node.left.take(), start_offset, entry)),
        Ordering::Greater => node.right = Some(insert(node.right.take(), start_offset, entry)),
        Ordering::Equal => {
            node.push(entry);
            return node;
        }
    }
    return rebalance(node);
}

/// Delete the node keyed at `start_offset`, payload and all. A node with two
/// children takes over its in-order successor's key and payload, and the
/// successor is unlinked instead.
pub(crate) fn remove<T>(link: Link<T>, start_offset: f64) -> Link<T> {
    let mut node = link?;
    match start_offset.total_cmp(&node.start_offset) {
        Ordering::Less => node.left = remove(node.left.take(), start_offset),
        Ordering::Greater => node.right = remove(node.right.take(), start_offset),
        Ordering::Equal => match (node.left.take(), node.right.take()) {
            (Some(left), Some(right)) => {
                let (rest, successor) = take_min(right);
                let successor = *successor;
                node.left = Some(left);
                node.right = rest;
                node.start_offset = successor.start_offset;
                node.payload = successor.payload;
            }
            (left, right) => return left.or(right),
        },
    }
    return Some(rebalance(node));
}

/// Unlink the leftmost node of a subtree. Returns what remains of the
/// subtree and the detached node.
fn take_min<T>(mut node: Box<Node<T>>) -> (Link<T>, Box<Node<T>>) {
    return match node.left.take() {
        None => {
            let rest = node.right.take();
            (rest, node)
        }
        Some(left) => {
            let (rest, min) = take_min(left);
            node.left = rest;
            (Some(rebalance(node)), min)
        }
    };
}

fn rebalance<T>(mut node: Box<Node<T>>) -> Box<Node<T>> {
    node.update_height();
    if node.balance > 1 {
        if let Some(right) = node.right.take() {
            // Right-left case: straighten the right child first.
            node.right = Some(if right.balance < 0 { rotate_right(right) } else { right });
        }
        return rotate_left(node);
    }
    if node.balance < -1 {
        if let Some(left) = node.left.take() {
            node.left = Some(if left.balance > 0 { rotate_left(left) } else { left });
        }
        return rotate_right(node);
    }
    return node;
}

fn rotate_left<T>(mut node: Box<Node<T>>) -> Box<Node<T>> {
    let Some(mut pivot) = node.right.take() else {
        return node;
    };
    node.right = pivot.left.take();
    node.update_height();
    pivot.left = Some(node);
    pivot.update_height();
    return pivot;
}

fn rotate_right<T>(mut node: Box<Node<T>>) -> Box<Node<T>> {
    let Some(mut pivot) = node.left.take() else {
        return node;
    };
    node.left = pivot.right.take();
    node.update_height();
    pivot.right = Some(node);
    pivot.update_height();
    return pivot;
}

/// In-order iterator over nodes.
pub(crate) struct NodeIter<'a, T> {
    stack: Vec<&'a Node<T>>,
}

impl<'a, T> NodeIter<'a, T> {
    pub(crate) fn new(link: &'a Link<T>) -> NodeIter<'a, T> {
        let mut iter = NodeIter { stack: Vec::new() };
        iter.descend_left(link.as_deref());
        return iter;
    }

    fn descend_left(&mut self, mut node: Option<&'a Node<T>>) {
        while let Some(current) = node {
            self.stack.push(current);
            node = current.left.as_deref();
        }
    }
}

impl<'a, T> Iterator for NodeIter<'a, T> {
    type Item = &'a Node<T>;

    fn next(&mut self) -> Option<&'a Node<T>> {
        let node = self.stack.pop()?;
        self.descend_left(node.right.as_deref());
        return Some(node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(stop: f64) -> Entry<u32> {
        return Entry { stop_offset: stop, sort_key: None, item: stop as u32 };
    }

    fn build(keys: &[f64]) -> Link<u32> {
        let mut root = None;
        for &key in keys {
            root = Some(insert(root, key, entry(key + 1.0)));
        }
        if let Some(root) = root.as_mut() {
            root.refresh(0);
        }
        return root;
    }

    fn keys(link: &Link<u32>) -> Vec<f64> {
        return NodeIter::new(link).map(|node| node.start_offset).collect();
    }

    #[test]
    fn ascending_inserts_stay_balanced() {
        let root = build(&(0..64).map(f64::from).collect::<Vec<_>>());
        let root = root.unwrap();
        // A perfectly balanced tree of 64 nodes has height 6.
        assert!(root.height <= 7, "height {}", root.height);
        assert!(root.balance.abs() <= 1);
    }

    #[test]
    fn same_key_shares_a_node() {
        let mut root = None;
        root = Some(insert(root, 1.0, entry(3.0)));
        root = Some(insert(root, 1.0, entry(2.0)));
        let root = root.unwrap();
        assert!(root.left.is_none() && root.right.is_none());
        let stops: Vec<_> = root.payload.iter().map(|e| e.stop_offset).collect();
        assert_eq!(stops, vec![2.0, 3.0]);
    }

    #[test]
    fn keyed_entries_sort_before_keyless() {
        let mut root = None;
        root = Some(insert(root, 0.0, Entry { stop_offset: 1.0, sort_key: None, item: 0 }));
        let key = SortKey { priority: 0, class_order: 0, insert_index: 1 };
        root = Some(insert(root, 0.0, Entry { stop_offset: 5.0, sort_key: Some(key), item: 1 }));
        let items: Vec<_> = root.unwrap().payload.iter().map(|e| e.item).collect();
        assert_eq!(items, vec![1, 0]);
    }

    #[test]
    fn remove_two_child_node_uses_successor() {
        let mut root = build(&[4.0, 2.0, 6.0, 1.0, 3.0, 5.0, 7.0]);
        root = remove(root, 4.0);
        assert_eq!(keys(&root), vec![1.0, 2.0, 3.0, 5.0, 6.0, 7.0]);
        root = remove(root, 42.0);
        assert_eq!(keys(&root).len(), 6);
    }

    #[test]
    fn neighbours() {
        let root = build(&[0.0, 1.0, 2.0, 3.0, 5.0, 8.0]);
        assert_eq!(start_offset_after(&root, 3.0), Some(5.0));
        assert_eq!(start_offset_after(&root, 4.0), Some(5.0));
        assert_eq!(start_offset_after(&root, 8.0), None);
        assert_eq!(start_offset_before(&root, 5.0), Some(3.0));
        assert_eq!(start_offset_before(&root, 0.0), None);
        assert_eq!(first_start_offset(&root), Some(0.0));
        assert_eq!(last_start_offset(&root), Some(8.0));
    }

    #[test]
    fn refresh_assigns_ranks() {
        let root = build(&[2.0, 1.0, 3.0]);
        let root = root.unwrap();
        assert_eq!(root.subtree_start_index, 0);
        assert_eq!(root.subtree_stop_index, 3);
        assert_eq!(root.node_start_index, 1);
        assert_eq!(root.entry_at(2).map(|e| e.item), Some(4));
        assert_eq!(root.stop_offset_low, 2.0);
        assert_eq!(root.stop_offset_high, 4.0);
    }
}
