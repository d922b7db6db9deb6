//! Persistent (immutable) sorted set based on Red-Black Tree.
//!
//! This module provides [`PersistentTreeSet`], an immutable ordered set
//! that uses structural sharing for efficient operations.
//!
//! # Overview
//!
//! `PersistentTreeSet` is based on a persistent Red-Black Tree, a
//! self-balancing binary search tree ordered by an explicit comparator.
//!
//! - O(log N) contains
//! - O(log N) insert
//! - O(log N) remove
//! - O(log N) first/last
//! - O(1) len and `is_empty`
//!
//! All operations return new sets without modifying the original, and
//! structural sharing ensures memory efficiency.
//!
//! # Ordering
//!
//! Every set carries its comparator in the handle; derived handles inherit
//! it. [`new`](PersistentTreeSet::new) uses the natural `Ord` order,
//! [`with_comparator`](PersistentTreeSet::with_comparator) accepts an
//! arbitrary ordering function, and
//! [`with_sort_key`](PersistentTreeSet::with_sort_key) orders by an
//! extracted key.
//!
//! # Examples
//!
//! ```rust
//! use coppice::PersistentTreeSet;
//!
//! let set = PersistentTreeSet::new()
//!     .insert(3)
//!     .insert(1)
//!     .insert(2);
//!
//! // Elements are always in sorted order
//! let elements: Vec<&i32> = set.iter().collect();
//! assert_eq!(elements, vec![&1, &2, &3]);
//! ```
//!
//! # Internal Structure
//!
//! The Red-Black Tree maintains the following invariants:
//! 1. Every node is either red or black
//! 2. The root is black
//! 3. All leaves (NIL) are black
//! 4. Red nodes have only black children
//! 5. Every path from root to leaf has the same number of black nodes
//!
//! Insertion preserves all five. Deletion preserves ordering and reachability
//! but may weaken invariant 5; lookups and iteration never depend on it.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::FromIterator;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::ReferenceCounter;
use crate::traits::PersistentSet;

/// Ordering function shared by a set and every handle derived from it.
type Comparator<T> = ReferenceCounter<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

/// Borrowed form of the comparator, passed through the recursive helpers.
type Compare<'a, T> = &'a dyn Fn(&T, &T) -> Ordering;

// =============================================================================
// Color Definition
// =============================================================================

/// The color of a Red-Black Tree node.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Color {
    Red,
    Black,
}

// =============================================================================
// Node Definition
// =============================================================================

/// Internal node structure for the Red-Black Tree.
#[derive(Clone)]
struct Node<T> {
    element: T,
    color: Color,
    left: Option<ReferenceCounter<Self>>,
    right: Option<ReferenceCounter<Self>>,
}

impl<T> Node<T> {
    /// Creates a new red node with no children.
    const fn new_red(element: T) -> Self {
        Self {
            element,
            color: Color::Red,
            left: None,
            right: None,
        }
    }

    /// Creates a copy of this node with a new color.
    fn with_color(&self, color: Color) -> Self
    where
        T: Clone,
    {
        Self {
            element: self.element.clone(),
            color,
            left: self.left.clone(),
            right: self.right.clone(),
        }
    }

    /// Creates a copy of this node with new children.
    fn with_children(
        &self,
        left: Option<ReferenceCounter<Self>>,
        right: Option<ReferenceCounter<Self>>,
    ) -> Self
    where
        T: Clone,
    {
        Self {
            element: self.element.clone(),
            color: self.color,
            left,
            right,
        }
    }

    /// Checks if this node is red.
    fn is_red(&self) -> bool {
        self.color == Color::Red
    }
}

/// Helper function to check if an optional node is red.
fn is_red<T>(node: Option<&ReferenceCounter<Node<T>>>) -> bool {
    node.is_some_and(|node| node.is_red())
}

// =============================================================================
// PersistentTreeSet Definition
// =============================================================================

/// A persistent (immutable) sorted set based on Red-Black Tree.
///
/// `PersistentTreeSet` is an immutable data structure that uses structural
/// sharing to efficiently support functional programming patterns. The set
/// maintains elements in comparator order, enabling ordered iteration and
/// O(log N) `first`/`last`.
///
/// # Time Complexity
///
/// | Operation       | Complexity |
/// |-----------------|------------|
/// | `new`           | O(1)       |
/// | `contains`      | O(log N)   |
/// | `insert`        | O(log N)   |
/// | `remove`        | O(log N)   |
/// | `first`/`last`  | O(log N)   |
/// | `len`           | O(1)       |
/// | `is_empty`      | O(1)       |
///
/// # Duplicate Policy
///
/// Inserting an element that compares equal to one already present replaces
/// the stored element (last-write-wins); the length is unchanged.
///
/// # Comparator Consistency
///
/// The `Hash` implementation and the cross-engine equality with
/// [`PersistentHashSet`](crate::PersistentHashSet) assume the comparator is
/// consistent with `Eq`: elements that compare `Ordering::Equal` should also
/// be `==`. A comparator that collapses `Eq`-distinct elements still yields
/// a correct set over its own equivalence, but the `Hash`/`Eq` contract no
/// longer holds for the set as a whole.
///
/// # Examples
///
/// ```rust
/// use coppice::PersistentTreeSet;
///
/// let set = PersistentTreeSet::with_comparator(|a: &i32, b: &i32| b.cmp(a))
///     .insert(1)
///     .insert(3)
///     .insert(2);
///
/// // Descending order
/// let elements: Vec<&i32> = set.iter().collect();
/// assert_eq!(elements, vec![&3, &2, &1]);
/// ```
pub struct PersistentTreeSet<T> {
    /// Root node of the tree
    root: Option<ReferenceCounter<Node<T>>>,
    /// Number of elements
    length: usize,
    /// Ordering function, inherited by derived handles
    comparator: Comparator<T>,
}

impl<T> Clone for PersistentTreeSet<T> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            length: self.length,
            comparator: self.comparator.clone(),
        }
    }
}

impl<T: Clone + Ord> PersistentTreeSet<T> {
    /// Creates a new empty set ordered by the natural `Ord` order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use coppice::PersistentTreeSet;
    ///
    /// let set: PersistentTreeSet<i32> = PersistentTreeSet::new();
    /// assert!(set.is_empty());
    /// ```
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::with_comparator(|a: &T, b: &T| a.cmp(b))
    }

    /// Creates a set containing a single element, natural order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use coppice::PersistentTreeSet;
    ///
    /// let set = PersistentTreeSet::singleton(42);
    /// assert_eq!(set.len(), 1);
    /// assert!(set.contains(&42));
    /// ```
    #[inline]
    #[must_use]
    pub fn singleton(element: T) -> Self {
        Self::new().insert(element)
    }
}

impl<T: Clone> PersistentTreeSet<T> {
    /// Creates a new empty set ordered by an explicit comparator.
    ///
    /// The comparator is stored in the handle and inherited by every
    /// handle derived from it.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use coppice::PersistentTreeSet;
    ///
    /// let descending = PersistentTreeSet::with_comparator(|a: &i32, b: &i32| b.cmp(a));
    /// let set = descending.insert(1).insert(2);
    /// assert_eq!(set.iter().collect::<Vec<_>>(), vec![&2, &1]);
    /// ```
    #[must_use]
    pub fn with_comparator<F>(compare: F) -> Self
    where
        F: Fn(&T, &T) -> Ordering + Send + Sync + 'static,
    {
        Self {
            root: None,
            length: 0,
            comparator: ReferenceCounter::new(compare),
        }
    }

    /// Creates a new empty set ordered by a key extracted from each element.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use coppice::PersistentTreeSet;
    ///
    /// let by_length = PersistentTreeSet::with_sort_key(|s: &String| s.len());
    /// let set = by_length
    ///     .insert("ccc".to_string())
    ///     .insert("a".to_string())
    ///     .insert("bb".to_string());
    ///
    /// let elements: Vec<&String> = set.iter().collect();
    /// assert_eq!(elements[0], "a");
    /// assert_eq!(elements[2], "ccc");
    /// ```
    #[must_use]
    pub fn with_sort_key<K, F>(selector: F) -> Self
    where
        K: Ord,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        Self::with_comparator(move |a: &T, b: &T| selector(a).cmp(&selector(b)))
    }

    /// Returns the number of elements in the set.
    ///
    /// # Complexity
    ///
    /// O(1)
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.length
    }

    /// Returns `true` if the set contains no elements.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Returns `true` if the set contains an element comparing equal to the
    /// argument.
    ///
    /// Lookups take `&T` rather than a borrowed form: the comparator is
    /// defined over `&T` and cannot compare foreign types.
    ///
    /// # Complexity
    ///
    /// O(log N)
    #[must_use]
    pub fn contains(&self, element: &T) -> bool {
        self.get(element).is_some()
    }

    /// Returns a reference to the stored element comparing equal to the
    /// argument.
    ///
    /// # Complexity
    ///
    /// O(log N)
    #[must_use]
    pub fn get(&self, element: &T) -> Option<&T> {
        Self::get_from_node(self.root.as_ref(), element, &*self.comparator)
    }

    /// Recursive helper for get.
    fn get_from_node<'a>(
        node: Option<&'a ReferenceCounter<Node<T>>>,
        element: &T,
        compare: Compare<'_, T>,
    ) -> Option<&'a T> {
        node.and_then(|node_ref| match compare(element, &node_ref.element) {
            Ordering::Less => Self::get_from_node(node_ref.left.as_ref(), element, compare),
            Ordering::Greater => Self::get_from_node(node_ref.right.as_ref(), element, compare),
            Ordering::Equal => Some(&node_ref.element),
        })
    }

    /// Inserts an element into the set.
    ///
    /// If the set already contains a comparator-equal element, the stored
    /// element is replaced by the argument (last-write-wins) and the length
    /// is unchanged.
    ///
    /// # Complexity
    ///
    /// O(log N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use coppice::PersistentTreeSet;
    ///
    /// let set1 = PersistentTreeSet::new().insert(1);
    /// let set2 = set1.insert(2);
    ///
    /// assert_eq!(set1.len(), 1); // Original unchanged
    /// assert_eq!(set2.len(), 2); // New version
    /// ```
    #[must_use]
    pub fn insert(&self, element: T) -> Self {
        let (new_root, added) =
            Self::insert_into_node(self.root.as_ref(), element, &*self.comparator);

        // Make root black
        let black_root = new_root.map(|node_ref| {
            if node_ref.is_red() {
                ReferenceCounter::new(node_ref.with_color(Color::Black))
            } else {
                node_ref
            }
        });

        Self {
            root: black_root,
            length: if added { self.length + 1 } else { self.length },
            comparator: self.comparator.clone(),
        }
    }

    /// Recursive helper for insert.
    /// Returns (`new_node`, `was_added`) where `was_added` is true if the
    /// element was not previously present.
    fn insert_into_node(
        node: Option<&ReferenceCounter<Node<T>>>,
        element: T,
        compare: Compare<'_, T>,
    ) -> (Option<ReferenceCounter<Node<T>>>, bool) {
        match node {
            None => (Some(ReferenceCounter::new(Node::new_red(element))), true),
            Some(node_ref) => match compare(&element, &node_ref.element) {
                Ordering::Less => {
                    let (new_left, added) =
                        Self::insert_into_node(node_ref.left.as_ref(), element, compare);
                    let new_node = node_ref.with_children(new_left, node_ref.right.clone());
                    (Some(ReferenceCounter::new(Self::balance(new_node))), added)
                }
                Ordering::Greater => {
                    let (new_right, added) =
                        Self::insert_into_node(node_ref.right.as_ref(), element, compare);
                    let new_node = node_ref.with_children(node_ref.left.clone(), new_right);
                    (Some(ReferenceCounter::new(Self::balance(new_node))), added)
                }
                Ordering::Equal => {
                    // Comparator-equal element: replace (last-write-wins)
                    let new_node = Node {
                        element,
                        color: node_ref.color,
                        left: node_ref.left.clone(),
                        right: node_ref.right.clone(),
                    };
                    (Some(ReferenceCounter::new(new_node)), false)
                }
            },
        }
    }

    /// Balances the tree after insertion.
    /// Handles the four cases of red-red violation.
    fn balance(node: Node<T>) -> Node<T> {
        // Case 1: Left-Left (left child is red, left-left grandchild is red)
        if is_red(node.left.as_ref())
            && let Some(left) = &node.left
            && is_red(left.left.as_ref())
        {
            return Self::rotate_right_and_recolor(node);
        }

        // Case 2: Left-Right (left child is red, left-right grandchild is red)
        if is_red(node.left.as_ref())
            && let Some(left) = &node.left
            && is_red(left.right.as_ref())
        {
            // First rotate left on the left child, then rotate right on node
            let new_left = Self::rotate_left((**left).clone());
            let new_node =
                node.with_children(Some(ReferenceCounter::new(new_left)), node.right.clone());
            return Self::rotate_right_and_recolor(new_node);
        }

        // Case 3: Right-Right (right child is red, right-right grandchild is red)
        if is_red(node.right.as_ref())
            && let Some(right) = &node.right
            && is_red(right.right.as_ref())
        {
            return Self::rotate_left_and_recolor(node);
        }

        // Case 4: Right-Left (right child is red, right-left grandchild is red)
        if is_red(node.right.as_ref())
            && let Some(right) = &node.right
            && is_red(right.left.as_ref())
        {
            // First rotate right on the right child, then rotate left on node
            let new_right = Self::rotate_right((**right).clone());
            let new_node =
                node.with_children(node.left.clone(), Some(ReferenceCounter::new(new_right)));
            return Self::rotate_left_and_recolor(new_node);
        }

        node
    }

    /// Rotates the tree to the right around the given node.
    fn rotate_right(node: Node<T>) -> Node<T> {
        if let Some(left) = node.left {
            let new_node = Node {
                element: node.element,
                color: node.color,
                left: left.right.clone(),
                right: node.right,
            };
            Node {
                element: left.element.clone(),
                color: left.color,
                left: left.left.clone(),
                right: Some(ReferenceCounter::new(new_node)),
            }
        } else {
            node
        }
    }

    /// Rotates the tree to the left around the given node.
    fn rotate_left(node: Node<T>) -> Node<T> {
        if let Some(right) = node.right {
            let new_node = Node {
                element: node.element,
                color: node.color,
                left: node.left,
                right: right.left.clone(),
            };
            Node {
                element: right.element.clone(),
                color: right.color,
                left: Some(ReferenceCounter::new(new_node)),
                right: right.right.clone(),
            }
        } else {
            node
        }
    }

    /// Rotates right and recolors for balancing.
    fn rotate_right_and_recolor(node: Node<T>) -> Node<T> {
        if let Some(left) = &node.left {
            // New root (the old left child)
            let new_right = Node {
                element: node.element.clone(),
                color: Color::Red,
                left: left.right.clone(),
                right: node.right.clone(),
            };

            // If left has a left child, make it black
            let new_left = left
                .left
                .as_ref()
                .map(|left_left| ReferenceCounter::new(left_left.with_color(Color::Black)));

            Node {
                element: left.element.clone(),
                color: Color::Black,
                left: new_left,
                right: Some(ReferenceCounter::new(new_right)),
            }
        } else {
            node
        }
    }

    /// Rotates left and recolors for balancing.
    fn rotate_left_and_recolor(node: Node<T>) -> Node<T> {
        if let Some(right) = &node.right {
            // New root (the old right child)
            let new_left = Node {
                element: node.element.clone(),
                color: Color::Red,
                left: node.left.clone(),
                right: right.left.clone(),
            };

            // If right has a right child, make it black
            let new_right = right
                .right
                .as_ref()
                .map(|right_right| ReferenceCounter::new(right_right.with_color(Color::Black)));

            Node {
                element: right.element.clone(),
                color: Color::Black,
                left: Some(ReferenceCounter::new(new_left)),
                right: new_right,
            }
        } else {
            node
        }
    }

    /// Removes an element from the set.
    ///
    /// Returns a new set without the element. If no comparator-equal
    /// element exists, returns a clone of the original set.
    ///
    /// # Complexity
    ///
    /// O(log N) for a balanced tree. Deletion does not rebalance, so
    /// heavy removal churn can push the height above log N; collecting
    /// into a fresh set restores a balanced tree.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use coppice::PersistentTreeSet;
    ///
    /// let set = PersistentTreeSet::new().insert(1).insert(2);
    /// let removed = set.remove(&1);
    ///
    /// assert_eq!(set.len(), 2);      // Original unchanged
    /// assert_eq!(removed.len(), 1);  // New version
    /// assert!(!removed.contains(&1));
    /// ```
    #[must_use]
    pub fn remove(&self, element: &T) -> Self {
        if !self.contains(element) {
            return self.clone();
        }

        let new_root = Self::remove_from_node(self.root.as_ref(), element, &*self.comparator);

        // Make root black if it exists
        let black_root = new_root.map(|node| {
            if node.is_red() {
                ReferenceCounter::new(node.with_color(Color::Black))
            } else {
                node
            }
        });

        Self {
            root: black_root,
            length: self.length.saturating_sub(1),
            comparator: self.comparator.clone(),
        }
    }

    /// Recursive helper for remove.
    fn remove_from_node(
        node: Option<&ReferenceCounter<Node<T>>>,
        element: &T,
        compare: Compare<'_, T>,
    ) -> Option<ReferenceCounter<Node<T>>> {
        node.and_then(|node_ref| match compare(element, &node_ref.element) {
            Ordering::Less => {
                let new_left = Self::remove_from_node(node_ref.left.as_ref(), element, compare);
                let new_node = node_ref.with_children(new_left, node_ref.right.clone());
                Some(ReferenceCounter::new(Self::balance_after_delete(new_node)))
            }
            Ordering::Greater => {
                let new_right = Self::remove_from_node(node_ref.right.as_ref(), element, compare);
                let new_node = node_ref.with_children(node_ref.left.clone(), new_right);
                Some(ReferenceCounter::new(Self::balance_after_delete(new_node)))
            }
            Ordering::Equal => {
                // Found the node to remove
                match (&node_ref.left, &node_ref.right) {
                    (None, None) => None,
                    (Some(left), None) => Some(left.clone()),
                    (None, Some(right)) => Some(right.clone()),
                    (Some(_), Some(right)) => {
                        // Promote the minimum of the right subtree
                        let successor = Self::find_min_element(right);
                        let new_right =
                            Self::remove_from_node(node_ref.right.as_ref(), &successor, compare);
                        let new_node = Node {
                            element: successor,
                            color: node_ref.color,
                            left: node_ref.left.clone(),
                            right: new_right,
                        };
                        Some(ReferenceCounter::new(Self::balance_after_delete(new_node)))
                    }
                }
            }
        })
    }

    /// Finds the minimum element in a subtree.
    fn find_min_element(node: &ReferenceCounter<Node<T>>) -> T {
        node.left
            .as_ref()
            .map_or_else(|| node.element.clone(), |left| Self::find_min_element(left))
    }

    /// Balances the tree after deletion (simplified version).
    const fn balance_after_delete(node: Node<T>) -> Node<T> {
        // A full implementation would restore the black-height invariant
        // through the double-black cases. This version relies on the tree
        // staying close to balanced; ordering is unaffected either way.
        // Long delete-heavy workloads can degrade lookups past the usual
        // O(log N) bound until the next bulk rebuild via FromIterator.
        node
    }

    /// Returns the smallest element in comparator order.
    ///
    /// # Complexity
    ///
    /// O(log N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use coppice::PersistentTreeSet;
    ///
    /// let set = PersistentTreeSet::new().insert(3).insert(1).insert(2);
    /// assert_eq!(set.first(), Some(&1));
    /// ```
    #[must_use]
    pub fn first(&self) -> Option<&T> {
        Self::min_from_node(self.root.as_ref())
    }

    /// Recursive helper for first.
    fn min_from_node(node: Option<&ReferenceCounter<Node<T>>>) -> Option<&T> {
        node.and_then(|node_ref| {
            node_ref.left.as_ref().map_or_else(
                || Some(&node_ref.element),
                |left| Self::min_from_node(Some(left)),
            )
        })
    }

    /// Returns the largest element in comparator order.
    ///
    /// # Complexity
    ///
    /// O(log N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use coppice::PersistentTreeSet;
    ///
    /// let set = PersistentTreeSet::new().insert(3).insert(1).insert(2);
    /// assert_eq!(set.last(), Some(&3));
    /// ```
    #[must_use]
    pub fn last(&self) -> Option<&T> {
        Self::max_from_node(self.root.as_ref())
    }

    /// Recursive helper for last.
    fn max_from_node(node: Option<&ReferenceCounter<Node<T>>>) -> Option<&T> {
        node.and_then(|node_ref| {
            node_ref.right.as_ref().map_or_else(
                || Some(&node_ref.element),
                |right| Self::max_from_node(Some(right)),
            )
        })
    }

    /// Inserts every element of an iterator, returning a new set.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use coppice::PersistentTreeSet;
    ///
    /// let set = PersistentTreeSet::singleton(1).insert_all([3, 2]);
    /// assert_eq!(set.iter().collect::<Vec<_>>(), vec![&1, &2, &3]);
    /// ```
    #[must_use]
    pub fn insert_all<I: IntoIterator<Item = T>>(&self, elements: I) -> Self {
        elements
            .into_iter()
            .fold(self.clone(), |set, element| set.insert(element))
    }

    /// Removes every element of an iterator, returning a new set.
    #[must_use]
    pub fn remove_all<I: IntoIterator<Item = T>>(&self, elements: I) -> Self {
        elements
            .into_iter()
            .fold(self.clone(), |set, element| set.remove(&element))
    }

    /// Returns an iterator over elements in ascending comparator order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use coppice::PersistentTreeSet;
    ///
    /// let set = PersistentTreeSet::new().insert(3).insert(1).insert(2);
    /// let elements: Vec<&i32> = set.iter().collect();
    /// assert_eq!(elements, vec![&1, &2, &3]);
    /// ```
    #[must_use]
    pub fn iter(&self) -> PersistentTreeSetIterator<'_, T> {
        let mut elements = Vec::with_capacity(self.length);
        Self::collect_elements_in_order(self.root.as_ref(), &mut elements);
        PersistentTreeSetIterator {
            elements,
            current_index: 0,
        }
    }

    /// Collects all elements in sorted order (in-order traversal).
    fn collect_elements_in_order<'a>(
        node: Option<&'a ReferenceCounter<Node<T>>>,
        elements: &mut Vec<&'a T>,
    ) {
        if let Some(node_ref) = node {
            Self::collect_elements_in_order(node_ref.left.as_ref(), elements);
            elements.push(&node_ref.element);
            Self::collect_elements_in_order(node_ref.right.as_ref(), elements);
        }
    }

    /// Converts this persistent set into a transient set for batch updates.
    ///
    /// O(1): the transient starts from this set's root.
    #[must_use]
    pub fn transient(self) -> TransientTreeSet<T> {
        TransientTreeSet {
            set: self,
            _marker: PhantomData,
        }
    }

    /// Builds a set from elements already sorted by `comparator`.
    ///
    /// Comparator-equal runs must have been collapsed beforehand. The tree
    /// is built balanced in O(n): nodes on the deepest level are red, all
    /// others black, which satisfies every red-black invariant.
    fn from_sorted_elements(comparator: Comparator<T>, elements: &[T]) -> Self {
        let length = elements.len();
        let bottom = if length == 0 {
            0
        } else {
            (usize::BITS - 1 - length.leading_zeros()) as usize
        };
        let root = Self::build_from_sorted_slice(elements, 0, bottom);
        Self {
            root,
            length,
            comparator,
        }
    }

    /// Midpoint-recursion balanced build over a sorted slice.
    fn build_from_sorted_slice(
        elements: &[T],
        depth: usize,
        bottom: usize,
    ) -> Option<ReferenceCounter<Node<T>>> {
        if elements.is_empty() {
            return None;
        }

        let middle = elements.len() / 2;
        let color = if depth == bottom {
            Color::Red
        } else {
            Color::Black
        };

        Some(ReferenceCounter::new(Node {
            element: elements[middle].clone(),
            color,
            left: Self::build_from_sorted_slice(&elements[..middle], depth + 1, bottom),
            right: Self::build_from_sorted_slice(&elements[middle + 1..], depth + 1, bottom),
        }))
    }

    /// Sorts, collapses comparator-equal runs keeping the last occurrence,
    /// and bulk-builds a balanced tree.
    fn from_unsorted_elements<I: IntoIterator<Item = T>>(
        comparator: Comparator<T>,
        elements: I,
    ) -> Self {
        let mut sorted: Vec<T> = elements.into_iter().collect();
        let compare: Compare<'_, T> = &*comparator;

        // Stable sort: within a comparator-equal run, input order survives,
        // so keeping the last entry of each run is last-write-wins.
        sorted.sort_by(|a, b| compare(a, b));

        let mut deduped: Vec<T> = Vec::with_capacity(sorted.len());
        for element in sorted {
            match deduped.last_mut() {
                Some(previous) if compare(previous, &element) == Ordering::Equal => {
                    *previous = element;
                }
                _ => deduped.push(element),
            }
        }

        Self::from_sorted_elements(comparator, &deduped)
    }
}

// =============================================================================
// Iterator Implementation
// =============================================================================

/// An iterator over the elements of a [`PersistentTreeSet`] in ascending
/// comparator order.
pub struct PersistentTreeSetIterator<'a, T> {
    elements: Vec<&'a T>,
    current_index: usize,
}

impl<'a, T> Iterator for PersistentTreeSetIterator<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_index >= self.elements.len() {
            None
        } else {
            let element = self.elements[self.current_index];
            self.current_index += 1;
            Some(element)
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.elements.len().saturating_sub(self.current_index);
        (remaining, Some(remaining))
    }
}

impl<T> ExactSizeIterator for PersistentTreeSetIterator<'_, T> {
    fn len(&self) -> usize {
        self.elements.len().saturating_sub(self.current_index)
    }
}

/// An owning iterator over the elements of a [`PersistentTreeSet`] in
/// ascending comparator order.
pub struct PersistentTreeSetIntoIterator<T> {
    inner: std::vec::IntoIter<T>,
}

impl<T> Iterator for PersistentTreeSetIntoIterator<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> ExactSizeIterator for PersistentTreeSetIntoIterator<T> {
    fn len(&self) -> usize {
        self.inner.len()
    }
}

// =============================================================================
// Standard Trait Implementations
// =============================================================================

impl<T: Clone + Ord> Default for PersistentTreeSet<T> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Ord> FromIterator<T> for PersistentTreeSet<T> {
    /// Bulk-builds a natural-order set: sort, collapse duplicates keeping
    /// the last occurrence, then balanced build from the sorted elements.
    /// O(n log n) total instead of n rebalancing inserts.
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let comparator: Comparator<T> = ReferenceCounter::new(|a: &T, b: &T| a.cmp(b));
        Self::from_unsorted_elements(comparator, iter)
    }
}

impl<T: Clone> IntoIterator for PersistentTreeSet<T> {
    type Item = T;
    type IntoIter = PersistentTreeSetIntoIterator<T>;

    fn into_iter(self) -> Self::IntoIter {
        let elements: Vec<T> = self.iter().cloned().collect();
        PersistentTreeSetIntoIterator {
            inner: elements.into_iter(),
        }
    }
}

impl<'a, T: Clone> IntoIterator for &'a PersistentTreeSet<T> {
    type Item = &'a T;
    type IntoIter = PersistentTreeSetIterator<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: Clone> PartialEq for PersistentTreeSet<T> {
    /// Equal size plus one-directional containment: within a set, elements
    /// are pairwise comparator-unequal, so containment of every element of
    /// `self` in `other` at equal sizes is a bijection.
    fn eq(&self, other: &Self) -> bool {
        self.length == other.length && self.iter().all(|element| other.contains(element))
    }
}

impl<T: Clone> Eq for PersistentTreeSet<T> {}

impl<T: Clone + Hash> Hash for PersistentTreeSet<T> {
    /// Order-independent hash consistent with cross-engine set equality
    /// (assuming the comparator is consistent with `Eq`).
    fn hash<H: Hasher>(&self, state: &mut H) {
        crate::traits::unordered_set_hash(self.iter(), self.len(), state);
    }
}

impl<T: Clone + fmt::Debug> fmt::Debug for PersistentTreeSet<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_set().entries(self.iter()).finish()
    }
}

impl<T: Clone + fmt::Display> fmt::Display for PersistentTreeSet<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{{")?;
        let mut first = true;
        for element in self {
            if first {
                first = false;
            } else {
                write!(formatter, ", ")?;
            }
            write!(formatter, "{element}")?;
        }
        write!(formatter, "}}")
    }
}

impl<T: Clone> PersistentSet<T> for PersistentTreeSet<T> {
    fn len(&self) -> usize {
        self.length
    }

    fn contains(&self, element: &T) -> bool {
        Self::contains(self, element)
    }

    fn insert(&self, element: T) -> Self {
        Self::insert(self, element)
    }

    fn remove(&self, element: &T) -> Self {
        Self::remove(self, element)
    }

    fn insert_all<I: IntoIterator<Item = T>>(&self, elements: I) -> Self {
        Self::insert_all(self, elements)
    }

    fn remove_all<I: IntoIterator<Item = T>>(&self, elements: I) -> Self {
        Self::remove_all(self, elements)
    }
}

// =============================================================================
// TransientTreeSet Definition
// =============================================================================

/// A transient (temporarily mutable) sorted set for batch accumulation.
///
/// Without parent links the red-black rebalance gains nothing from in-place
/// node edits, so this builder is a thin adapter reassigning the working
/// root after each persistent operation; bulk efficiency comes from the
/// balanced build behind [`FromIterator`] instead. The interface matches
/// the other transients: `&mut self` mutators, a consuming
/// [`persistent()`](Self::persistent), `!Send`/`!Sync`.
///
/// # Examples
///
/// ```rust
/// use coppice::TransientTreeSet;
///
/// let mut transient = TransientTreeSet::new();
/// transient.insert(3);
/// transient.insert(1);
/// transient.insert(1); // duplicate: replaced, not re-added
///
/// let set = transient.persistent();
/// assert_eq!(set.len(), 2);
/// assert_eq!(set.first(), Some(&1));
/// ```
pub struct TransientTreeSet<T> {
    set: PersistentTreeSet<T>,
    /// Marker to ensure `!Send` and `!Sync`.
    _marker: PhantomData<Rc<()>>,
}

static_assertions::assert_not_impl_any!(TransientTreeSet<i32>: Send, Sync);
static_assertions::assert_not_impl_any!(TransientTreeSet<String>: Send, Sync);

impl<T: Clone + Ord> TransientTreeSet<T> {
    /// Creates a new empty `TransientTreeSet` with the natural order.
    #[must_use]
    pub fn new() -> Self {
        PersistentTreeSet::new().transient()
    }
}

impl<T: Clone> TransientTreeSet<T> {
    /// Creates a new empty `TransientTreeSet` with an explicit comparator.
    #[must_use]
    pub fn with_comparator<F>(compare: F) -> Self
    where
        F: Fn(&T, &T) -> Ordering + Send + Sync + 'static,
    {
        PersistentTreeSet::with_comparator(compare).transient()
    }

    /// Returns the number of elements accumulated so far.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.set.len()
    }

    /// Returns `true` if the set contains no elements.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Returns `true` if the set contains a comparator-equal element.
    #[must_use]
    pub fn contains(&self, element: &T) -> bool {
        self.set.contains(element)
    }

    /// Inserts an element.
    ///
    /// Returns `true` if the element was newly inserted, `false` if a
    /// comparator-equal element was replaced (last-write-wins).
    pub fn insert(&mut self, element: T) -> bool {
        let previous_length = self.set.len();
        self.set = self.set.insert(element);
        self.set.len() != previous_length
    }

    /// Removes a comparator-equal element.
    ///
    /// Returns `true` if an element was present and removed.
    pub fn remove(&mut self, element: &T) -> bool {
        let previous_length = self.set.len();
        self.set = self.set.remove(element);
        self.set.len() != previous_length
    }

    /// Inserts every element from an iterator.
    pub fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for element in iter {
            self.insert(element);
        }
    }

    /// Finalizes this transient into a persistent set.
    ///
    /// O(1). The transient is consumed.
    #[must_use]
    pub fn persistent(self) -> PersistentTreeSet<T> {
        self.set
    }
}

impl<T: Clone + Ord> Default for TransientTreeSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Ord> FromIterator<T> for TransientTreeSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut transient = Self::new();
        transient.extend(iter);
        transient
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    // =========================================================================
    // Display Tests
    // =========================================================================

    #[rstest]
    fn test_display_empty_set() {
        let set: PersistentTreeSet<i32> = PersistentTreeSet::new();
        assert_eq!(format!("{set}"), "{}");
    }

    #[rstest]
    fn test_display_sorted() {
        let set = PersistentTreeSet::new().insert(2).insert(1);
        assert_eq!(format!("{set}"), "{1, 2}");
    }

    // =========================================================================
    // Basic Operations
    // =========================================================================

    #[rstest]
    fn test_new_creates_empty() {
        let set: PersistentTreeSet<i32> = PersistentTreeSet::new();
        assert!(set.is_empty());
        assert_eq!(set.len(), 0);
        assert_eq!(set.first(), None);
        assert_eq!(set.last(), None);
    }

    #[rstest]
    fn test_insert_and_contains() {
        let set = PersistentTreeSet::new().insert(3).insert(1).insert(2);

        assert_eq!(set.len(), 3);
        assert!(set.contains(&1));
        assert!(set.contains(&2));
        assert!(set.contains(&3));
        assert!(!set.contains(&4));
    }

    #[rstest]
    fn test_insert_duplicate_keeps_length() {
        let set = PersistentTreeSet::new().insert(1).insert(1);
        assert_eq!(set.len(), 1);
    }

    #[rstest]
    fn test_insert_preserves_original() {
        let set1 = PersistentTreeSet::new().insert(1);
        let set2 = set1.insert(2);

        assert_eq!(set1.len(), 1);
        assert_eq!(set2.len(), 2);
        assert!(!set1.contains(&2));
    }

    #[rstest]
    fn test_remove() {
        let set = PersistentTreeSet::new().insert(1).insert(2).insert(3);
        let removed = set.remove(&2);

        assert_eq!(set.len(), 3);
        assert_eq!(removed.len(), 2);
        assert!(!removed.contains(&2));
        assert_eq!(removed.iter().collect::<Vec<_>>(), vec![&1, &3]);
    }

    #[rstest]
    fn test_remove_absent_is_noop() {
        let set = PersistentTreeSet::new().insert(1);
        let removed = set.remove(&99);
        assert_eq!(removed, set);
    }

    #[rstest]
    fn test_first_and_last() {
        let set = PersistentTreeSet::new().insert(5).insert(1).insert(3);
        assert_eq!(set.first(), Some(&1));
        assert_eq!(set.last(), Some(&5));
    }

    // =========================================================================
    // Ordering
    // =========================================================================

    #[rstest]
    fn test_iteration_is_sorted() {
        let set: PersistentTreeSet<i32> = [5, 3, 8, 1, 9, 2].into_iter().collect();
        let elements: Vec<i32> = set.iter().copied().collect();
        assert_eq!(elements, vec![1, 2, 3, 5, 8, 9]);
    }

    #[rstest]
    fn test_custom_comparator_descending() {
        let set = PersistentTreeSet::with_comparator(|a: &i32, b: &i32| b.cmp(a))
            .insert(1)
            .insert(3)
            .insert(2);
        let elements: Vec<i32> = set.iter().copied().collect();
        assert_eq!(elements, vec![3, 2, 1]);
        assert_eq!(set.first(), Some(&3));
        assert_eq!(set.last(), Some(&1));
    }

    #[rstest]
    fn test_sort_key_by_length() {
        let set = PersistentTreeSet::with_sort_key(|s: &&str| s.len())
            .insert("ccc")
            .insert("a")
            .insert("bb");
        let elements: Vec<&str> = set.iter().copied().collect();
        assert_eq!(elements, vec!["a", "bb", "ccc"]);
    }

    #[rstest]
    fn test_comparator_inherited_by_derived_handles() {
        let descending = PersistentTreeSet::with_comparator(|a: &i32, b: &i32| b.cmp(a));
        let derived = descending.insert(1).insert(2).remove(&1).insert(3).insert(0);
        let elements: Vec<i32> = derived.iter().copied().collect();
        assert_eq!(elements, vec![3, 2, 0]);
    }

    #[rstest]
    fn test_last_write_wins_on_comparator_equal() {
        // Orders by the first character only, so "apple" and "apricot"
        // compare equal while being distinct values.
        let set = PersistentTreeSet::with_sort_key(|s: &&str| s.chars().next())
            .insert("apple")
            .insert("apricot");

        assert_eq!(set.len(), 1);
        assert_eq!(set.get(&"anything"), Some(&"apricot"));
    }

    // =========================================================================
    // Bulk Build
    // =========================================================================

    #[rstest]
    fn test_from_iter_matches_folded_inserts() {
        let folded = (0..300)
            .rev()
            .fold(PersistentTreeSet::new(), |set, value| set.insert(value));
        let built: PersistentTreeSet<i32> = (0..300).rev().collect();
        assert_eq!(folded, built);
        assert_eq!(built.iter().count(), 300);
    }

    #[rstest]
    fn test_from_iter_duplicates_collapse_to_last() {
        let set: PersistentTreeSet<i32> = [1, 2, 2, 1, 3].into_iter().collect();
        assert_eq!(set.len(), 3);
    }

    #[rstest]
    fn test_bulk_built_tree_supports_all_operations() {
        let set: PersistentTreeSet<i32> = (0..1000).collect();
        assert!(set.contains(&0));
        assert!(set.contains(&999));
        assert_eq!(set.first(), Some(&0));
        assert_eq!(set.last(), Some(&999));

        let shrunk = set.remove(&500).insert(1000);
        assert!(!shrunk.contains(&500));
        assert_eq!(shrunk.last(), Some(&1000));
    }

    // =========================================================================
    // Transient
    // =========================================================================

    #[rstest]
    fn test_transient_insert_and_persistent() {
        let mut transient = TransientTreeSet::new();
        assert!(transient.insert(2));
        assert!(transient.insert(1));
        assert!(!transient.insert(1));

        let set = transient.persistent();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![&1, &2]);
    }

    #[rstest]
    fn test_transient_remove() {
        let mut transient: TransientTreeSet<i32> = (0..10).collect();
        assert!(transient.remove(&5));
        assert!(!transient.remove(&5));
        assert_eq!(transient.len(), 9);
    }

    #[rstest]
    fn test_transient_does_not_disturb_source() {
        let persistent: PersistentTreeSet<i32> = (0..50).collect();
        let mut transient = persistent.clone().transient();
        transient.remove(&0);
        transient.insert(100);
        let updated = transient.persistent();

        assert!(persistent.contains(&0));
        assert!(!persistent.contains(&100));
        assert!(!updated.contains(&0));
        assert!(updated.contains(&100));
    }

    // =========================================================================
    // Equality
    // =========================================================================

    #[rstest]
    fn test_equality_ignores_build_order() {
        let forward: PersistentTreeSet<i32> = (0..20).collect();
        let backward = (0..20)
            .rev()
            .fold(PersistentTreeSet::new(), |set, value| set.insert(value));
        assert_eq!(forward, backward);
    }

    #[rstest]
    fn test_inequality() {
        let set_a: PersistentTreeSet<i32> = [1, 2, 3].into_iter().collect();
        let set_b: PersistentTreeSet<i32> = [1, 2, 4].into_iter().collect();
        assert_ne!(set_a, set_b);
    }
}
