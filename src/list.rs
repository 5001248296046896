//! An ordered list with constant-time removal by key, used to hold the registrations waiting on
//! a waitable.
//!
//! See the documentation on [`WaitList`] for more information.
//!
//! [`WaitList`]: struct.WaitList.html

use std::fmt;

/// Identifies an entry in a [`WaitList`].
///
/// Keys carry a generation, so a key whose entry was already removed (for example because the
/// waitable drained its whole list) never matches a newer entry that reused the same slot.
///
/// [`WaitList`]: struct.WaitList.html
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ListKey {
    index: usize,
    generation: u64,
}

struct Node<T> {
    value: Option<T>,
    generation: u64,
    prev: Option<usize>,
    next: Option<usize>,
}

/// A doubly-linked list stored in a slab of nodes.
///
/// `WaitList` keeps entries in insertion order and supports:
///
/// * `push_back` in amortized O(1), returning a [`ListKey`];
/// * `remove` by key in O(1);
/// * `pop_front` in O(1);
/// * iteration front to back.
///
/// Freed slots are reused, so a list that sees many short-lived entries does not grow beyond
/// its peak length.
///
/// [`ListKey`]: struct.ListKey.html
///
/// # Example
///
/// ```
/// use waitables::WaitList;
///
/// let mut list = WaitList::new();
/// let a = list.push_back("a");
/// list.push_back("b");
/// list.push_back("c");
///
/// assert_eq!(list.remove(a), Some("a"));
/// assert_eq!(list.remove(a), None);
/// assert_eq!(list.iter().copied().collect::<Vec<_>>(), ["b", "c"]);
/// assert_eq!(list.pop_front(), Some("b"));
/// ```
pub struct WaitList<T> {
    nodes: Vec<Node<T>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl<T> WaitList<T> {
    /// Creates an empty list.
    pub fn new() -> WaitList<T> {
        WaitList {
            nodes: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    /// Returns the number of entries in the list.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns whether the list has no entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Appends `value` to the end of the list and returns its key.
    pub fn push_back(&mut self, value: T) -> ListKey {
        let prev = self.tail;
        let index = match self.free.pop() {
            Some(index) => {
                let node = &mut self.nodes[index];
                node.value = Some(value);
                node.prev = prev;
                node.next = None;
                index
            }
            None => {
                self.nodes.push(Node {
                    value: Some(value),
                    generation: 0,
                    prev,
                    next: None,
                });
                self.nodes.len() - 1
            }
        };

        match prev {
            Some(tail) => self.nodes[tail].next = Some(index),
            None => self.head = Some(index),
        }
        self.tail = Some(index);
        self.len += 1;

        ListKey {
            index,
            generation: self.nodes[index].generation,
        }
    }

    /// Removes the entry identified by `key`, returning its value if it was still in the list.
    pub fn remove(&mut self, key: ListKey) -> Option<T> {
        match self.nodes.get(key.index) {
            Some(node) if node.generation == key.generation && node.value.is_some() => {}
            _ => return None,
        }

        Some(self.unlink(key.index))
    }

    /// Removes and returns the first entry.
    pub fn pop_front(&mut self) -> Option<T> {
        self.head.map(|index| self.unlink(index))
    }

    /// Returns a reference to the first entry.
    pub fn front(&self) -> Option<&T> {
        self.head.and_then(|index| self.nodes[index].value.as_ref())
    }

    /// Iterates over the entries from front to back.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }

    // `index` must name an occupied node.
    fn unlink(&mut self, index: usize) -> T {
        let (prev, next) = {
            let node = &self.nodes[index];
            (node.prev, node.next)
        };

        match prev {
            Some(prev) => self.nodes[prev].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.nodes[next].prev = prev,
            None => self.tail = prev,
        }

        let node = &mut self.nodes[index];
        node.prev = None;
        node.next = None;
        node.generation = node.generation.wrapping_add(1);
        let value = match node.value.take() {
            Some(value) => value,
            None => unreachable!("wait list links point at a vacant node"),
        };

        self.free.push(index);
        self.len -= 1;
        value
    }
}

impl<T> Default for WaitList<T> {
    fn default() -> WaitList<T> {
        WaitList::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for WaitList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Front-to-back iterator over a [`WaitList`], created by [`WaitList::iter`].
///
/// [`WaitList`]: struct.WaitList.html
/// [`WaitList::iter`]: struct.WaitList.html#method.iter
pub struct Iter<'a, T> {
    list: &'a WaitList<T>,
    cursor: Option<usize>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        let list = self.list;
        let node = &list.nodes[self.cursor?];
        self.cursor = node.next;
        node.value.as_ref()
    }
}

impl<'a, T> IntoIterator for &'a WaitList<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}
