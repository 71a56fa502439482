//! A keyed priority queue which yields the item with the *smallest*
//! priority first.  The simulator uses it to order deferred device
//! callbacks by the tick at which they fall due.
use std::cmp::Ordering;
use std::fmt::{self, Debug, Formatter};
use std::hash::Hash;

use keyed_priority_queue::KeyedPriorityQueue;

#[derive(Debug)]
struct ReverseOrdered<T> {
    inner: T,
}

impl<T> From<T> for ReverseOrdered<T> {
    fn from(inner: T) -> ReverseOrdered<T> {
        ReverseOrdered { inner }
    }
}

impl<T: Ord> PartialOrd for ReverseOrdered<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: Eq> Eq for ReverseOrdered<T> {}

impl<T: Eq> PartialEq for ReverseOrdered<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<T: Ord> Ord for ReverseOrdered<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        other.inner.cmp(&self.inner)
    }
}

pub struct KeyedReversePriorityQueue<K: Hash + Eq + Ord, P: Ord> {
    items: KeyedPriorityQueue<K, ReverseOrdered<P>>,
}

impl<K, P> KeyedReversePriorityQueue<K, P>
where
    K: Hash + Eq + Ord,
    P: Ord,
{
    #[must_use]
    pub fn new() -> KeyedReversePriorityQueue<K, P> {
        KeyedReversePriorityQueue {
            items: KeyedPriorityQueue::<K, ReverseOrdered<P>>::new(),
        }
    }

    /// The item with the smallest priority.
    pub fn peek(&self) -> Option<(&K, &P)> {
        self.items.peek().map(|(k, p)| (k, &p.inner))
    }

    pub fn pop(&mut self) -> Option<(K, P)> {
        self.items.pop().map(|(k, p)| (k, p.inner))
    }

    /// Insert an item, or change the priority of an existing one.
    /// Returns the previous priority of the key, if it was present.
    pub fn push(&mut self, key: K, priority: P) -> Option<P> {
        self.items
            .push(key, ReverseOrdered::from(priority))
            .map(|old| old.inner)
    }

    /// Remove an item, returning its priority if it was present.
    pub fn remove(&mut self, key: &K) -> Option<P> {
        self.items.remove(key).map(|p| p.inner)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.items.get_priority(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<K, P> Default for KeyedReversePriorityQueue<K, P>
where
    K: Hash + Eq + Ord,
    P: Ord,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, P> Debug for KeyedReversePriorityQueue<K, P>
where
    K: Hash + Eq + Ord + Debug,
    P: Ord + Debug,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedReversePriorityQueue")
            .field("items", &self.items)
            .finish()
    }
}

#[test]
fn test_reverse_order() {
    assert_eq!(ReverseOrdered::from(1), ReverseOrdered::from(1));
    assert!(ReverseOrdered::from(1) < ReverseOrdered::from(0));
    assert!(ReverseOrdered::from(9) <= ReverseOrdered::from(3));
}

#[test]
fn test_empty() {
    let mut q: KeyedReversePriorityQueue<usize, u64> = KeyedReversePriorityQueue::default();
    assert!(q.is_empty());
    assert_eq!(0, q.len());
    assert_eq!(q.peek(), None);
    assert_eq!(q.pop(), None);
    assert_eq!(q.remove(&3), None);
}

#[test]
fn test_earliest_first() {
    let mut q: KeyedReversePriorityQueue<&str, u64> = KeyedReversePriorityQueue::new();
    assert_eq!(q.push("drum", 400), None);
    assert_eq!(q.push("tty", 25), None);
    assert_eq!(q.push("clock", 100), None);
    assert_eq!(q.peek(), Some((&"tty", &25)));
    assert_eq!(q.pop(), Some(("tty", 25)));
    assert_eq!(q.pop(), Some(("clock", 100)));
    assert_eq!(q.pop(), Some(("drum", 400)));
    assert!(q.is_empty());
}

#[test]
fn test_repush_replaces_priority() {
    let mut q: KeyedReversePriorityQueue<usize, u64> = KeyedReversePriorityQueue::new();
    assert_eq!(q.push(0, 20), None);
    assert_eq!(q.push(0, 40), Some(20));
    assert_eq!(q.len(), 1);
    assert_eq!(q.push(0, 30), Some(40));
    assert_eq!(q.pop(), Some((0, 30)));
}

#[test]
fn test_remove() {
    let mut q: KeyedReversePriorityQueue<usize, u64> = KeyedReversePriorityQueue::new();
    q.push(1, 10);
    q.push(2, 5);
    assert!(q.contains(&2));
    assert_eq!(q.remove(&2), Some(5));
    assert!(!q.contains(&2));
    assert_eq!(q.pop(), Some((1, 10)));
}
