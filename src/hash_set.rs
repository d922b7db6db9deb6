//! Persistent (immutable) hash set based on HAMT.
//!
//! This module provides [`PersistentHashSet`], an immutable hash set that
//! uses structural sharing for efficient operations.
//!
//! # Overview
//!
//! `PersistentHashSet` is based on Hash Array Mapped Trie (HAMT), a 32-way
//! branching trie navigated by 5-bit fragments of each element's hash.
//!
//! - O(log32 N) contains (effectively O(1) for practical sizes)
//! - O(log32 N) insert
//! - O(log32 N) remove
//! - O(1) len and `is_empty`
//!
//! All operations return new sets without modifying the original, and
//! structural sharing ensures memory efficiency. Elements whose hashes
//! collide but that are unequal coexist in a collision chain and are
//! compared by full equality, never by hash alone.
//!
//! # Examples
//!
//! ```rust
//! use coppice::PersistentHashSet;
//!
//! let set = PersistentHashSet::new()
//!     .insert(1)
//!     .insert(2)
//!     .insert(3);
//!
//! assert!(set.contains(&1));
//! assert!(!set.contains(&4));
//!
//! // Structural sharing: the original set is preserved
//! let updated = set.insert(4);
//! assert_eq!(set.len(), 3);      // Original unchanged
//! assert_eq!(updated.len(), 4);  // New version
//! ```
//!
//! # Iteration Order
//!
//! Iteration follows a deterministic depth-first traversal of the trie.
//! The order is stable for a given set but carries no relationship to
//! insertion order; callers that need ordering should use
//! [`PersistentTreeSet`](crate::PersistentTreeSet) or
//! [`PersistentVector`](crate::PersistentVector).

use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::FromIterator;
use std::marker::PhantomData;
use std::rc::Rc;

use smallvec::{SmallVec, smallvec};

use crate::ReferenceCounter;
use crate::traits::PersistentSet;

// =============================================================================
// Constants
// =============================================================================

/// Branching factor (2^5 = 32)
const BRANCHING_FACTOR: usize = 32;

/// Bits per level in the trie
const BITS_PER_LEVEL: usize = 5;

/// Bit mask for extracting index within a node
const MASK: u64 = (BRANCHING_FACTOR - 1) as u64;

// =============================================================================
// Hash computation
// =============================================================================

#[cfg(feature = "ahash")]
type TrieHasher = ahash::AHasher;

#[cfg(all(feature = "fxhash", not(feature = "ahash")))]
type TrieHasher = rustc_hash::FxHasher;

#[cfg(not(any(feature = "fxhash", feature = "ahash")))]
type TrieHasher = std::collections::hash_map::DefaultHasher;

/// Computes the full 64-bit hash of an element with the configured hasher.
pub(crate) fn compute_hash<Q: Hash + ?Sized>(element: &Q) -> u64 {
    let mut hasher = TrieHasher::default();
    element.hash(&mut hasher);
    hasher.finish()
}

/// Extracts the branch index at a given depth from a hash.
#[inline]
const fn hash_index(hash: u64, depth: usize) -> usize {
    ((hash >> (depth * BITS_PER_LEVEL)) & MASK) as usize
}

// =============================================================================
// Node Definition
// =============================================================================

/// Internal node structure for the HAMT.
#[derive(Clone)]
enum Node<T> {
    /// Empty node (used as sentinel at the root of an empty set)
    Empty,
    /// Single element
    Leaf { hash: u64, element: T },
    /// Bitmap-indexed branch node
    Bitmap {
        /// Bitmap indicating which of the 32 slots are occupied
        bitmap: u32,
        /// Children (elements or subnodes), compressed to occupied slots
        children: Vec<Child<T>>,
    },
    /// Collision chain for elements with equal hashes but unequal values
    Collision {
        hash: u64,
        elements: SmallVec<[T; 2]>,
    },
}

/// A child in a bitmap node.
#[derive(Clone)]
enum Child<T> {
    /// An element stored inline
    Element(T),
    /// A shared sub-node (always a Bitmap or Collision node)
    Node(ReferenceCounter<Node<T>>),
}

impl<T> Node<T> {
    /// Creates an empty node.
    const fn empty() -> Self {
        Self::Empty
    }
}

// =============================================================================
// PersistentHashSet Definition
// =============================================================================

/// A persistent (immutable) hash set based on HAMT.
///
/// `PersistentHashSet` is an immutable data structure that uses structural
/// sharing to efficiently support functional programming patterns. A
/// published handle is never mutated; every mutation-style operation
/// returns a new handle sharing untouched subtrees with its predecessor.
///
/// # Time Complexity
///
/// | Operation              | Complexity        |
/// |------------------------|-------------------|
/// | `new`                  | O(1)              |
/// | `contains`             | O(log32 N)        |
/// | `insert`               | O(log32 N)        |
/// | `remove`               | O(log32 N)        |
/// | `len`                  | O(1)              |
/// | `is_empty`             | O(1)              |
/// | `union`                | O(n + m)          |
/// | `intersection`         | O(min(n,m) * log32(max(n,m))) |
///
/// # Duplicate Policy
///
/// Inserting an element equal to one already present replaces the stored
/// element (last-write-wins); the length is unchanged.
///
/// # Examples
///
/// ```rust
/// use coppice::PersistentHashSet;
///
/// let set = PersistentHashSet::singleton(42);
/// assert!(set.contains(&42));
/// assert!(!set.contains(&0));
/// ```
#[derive(Clone)]
pub struct PersistentHashSet<T> {
    /// Root node of the trie
    root: ReferenceCounter<Node<T>>,
    /// Number of elements
    length: usize,
}

impl<T> PersistentHashSet<T> {
    /// Creates a new empty set.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use coppice::PersistentHashSet;
    ///
    /// let set: PersistentHashSet<i32> = PersistentHashSet::new();
    /// assert!(set.is_empty());
    /// ```
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: ReferenceCounter::new(Node::empty()),
            length: 0,
        }
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
}

impl<T: Clone + Hash + Eq> PersistentHashSet<T> {
    /// Creates a set containing a single element.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use coppice::PersistentHashSet;
    ///
    /// let set = PersistentHashSet::singleton(42);
    /// assert_eq!(set.len(), 1);
    /// assert!(set.contains(&42));
    /// ```
    #[inline]
    #[must_use]
    pub fn singleton(element: T) -> Self {
        Self::new().insert(element)
    }

    /// Returns `true` if the set contains the specified element.
    ///
    /// The element may be any borrowed form of the set's element type,
    /// but `Hash` and `Eq` on the borrowed form must match those for
    /// the element type. Elements are compared by full equality, so
    /// hash collisions never produce false positives.
    ///
    /// # Complexity
    ///
    /// O(log32 N), allocation-free
    ///
    /// # Examples
    ///
    /// ```rust
    /// use coppice::PersistentHashSet;
    ///
    /// let set = PersistentHashSet::new()
    ///     .insert("hello".to_string())
    ///     .insert("world".to_string());
    ///
    /// // Can use &str to look up String elements
    /// assert!(set.contains("hello"));
    /// assert!(!set.contains("other"));
    /// ```
    #[must_use]
    pub fn contains<Q>(&self, element: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = compute_hash(element);
        Self::find_in_node(&self.root, element, hash, 0).is_some()
    }

    /// Recursive helper for contains: pure read walk, no allocation.
    fn find_in_node<'a, Q>(
        node: &'a Node<T>,
        element: &Q,
        hash: u64,
        depth: usize,
    ) -> Option<&'a T>
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match node {
            Node::Empty => None,
            Node::Leaf {
                hash: leaf_hash,
                element: stored,
            } => {
                if *leaf_hash == hash && stored.borrow() == element {
                    Some(stored)
                } else {
                    None
                }
            }
            Node::Bitmap { bitmap, children } => {
                let index = hash_index(hash, depth);
                let bit = 1u32 << index;

                if bitmap & bit == 0 {
                    // Slot is empty
                    None
                } else {
                    // Count bits to find position in the compressed children
                    let position = (bitmap & (bit - 1)).count_ones() as usize;
                    match &children[position] {
                        Child::Element(stored) => {
                            if stored.borrow() == element {
                                Some(stored)
                            } else {
                                None
                            }
                        }
                        Child::Node(subnode) => {
                            Self::find_in_node(subnode, element, hash, depth + 1)
                        }
                    }
                }
            }
            Node::Collision {
                hash: collision_hash,
                elements,
            } => {
                if *collision_hash != hash {
                    return None;
                }
                elements.iter().find(|stored| (*stored).borrow() == element)
            }
        }
    }

    /// Inserts an element into the set.
    ///
    /// If the set already contains an equal element, the stored element is
    /// replaced by the argument (last-write-wins) and the length is
    /// unchanged.
    ///
    /// # Complexity
    ///
    /// O(log32 N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use coppice::PersistentHashSet;
    ///
    /// let set1 = PersistentHashSet::new().insert(1);
    /// let set2 = set1.insert(2);
    ///
    /// assert_eq!(set1.len(), 1); // Original unchanged
    /// assert_eq!(set2.len(), 2); // New version
    /// ```
    #[must_use]
    pub fn insert(&self, element: T) -> Self {
        let hash = compute_hash(&element);
        let (new_root, added) = Self::insert_into_node(&self.root, element, hash, 0);

        Self {
            root: ReferenceCounter::new(new_root),
            length: if added { self.length + 1 } else { self.length },
        }
    }

    /// Recursive helper for insert.
    /// Returns (`new_node`, `was_added`) where `was_added` is true if the
    /// element was not previously present.
    fn insert_into_node(node: &Node<T>, element: T, hash: u64, depth: usize) -> (Node<T>, bool) {
        match node {
            Node::Empty => (Node::Leaf { hash, element }, true),
            Node::Leaf {
                hash: leaf_hash,
                element: stored,
            } => {
                if *leaf_hash == hash && *stored == element {
                    // Equal element: replace (last-write-wins)
                    (Node::Leaf { hash, element }, false)
                } else if *leaf_hash == hash {
                    // Full-hash collision: start a collision chain
                    (
                        Node::Collision {
                            hash,
                            elements: smallvec![stored.clone(), element],
                        },
                        true,
                    )
                } else {
                    (
                        Self::split_leaf(*leaf_hash, stored.clone(), hash, element, depth),
                        true,
                    )
                }
            }
            Node::Bitmap { bitmap, children } => {
                Self::insert_into_bitmap_node(*bitmap, children, element, hash, depth)
            }
            Node::Collision {
                hash: collision_hash,
                elements,
            } => Self::insert_into_collision_node(
                node,
                *collision_hash,
                elements,
                element,
                hash,
                depth,
            ),
        }
    }

    /// Splits a leaf into a bitmap branch distinguishing two elements whose
    /// hashes differ, recursing until their hash fragments diverge.
    ///
    /// The caller must guarantee `existing_hash != hash`; divergence is then
    /// certain before the 64-bit hash is exhausted.
    fn split_leaf(existing_hash: u64, existing: T, hash: u64, element: T, depth: usize) -> Node<T> {
        let existing_index = hash_index(existing_hash, depth);
        let new_index = hash_index(hash, depth);

        if existing_index == new_index {
            // Same fragment at this level: recurse one level deeper
            let subnode = Self::split_leaf(existing_hash, existing, hash, element, depth + 1);
            Node::Bitmap {
                bitmap: 1u32 << existing_index,
                children: vec![Child::Node(ReferenceCounter::new(subnode))],
            }
        } else {
            let bitmap = (1u32 << existing_index) | (1u32 << new_index);
            let children = if existing_index < new_index {
                vec![Child::Element(existing), Child::Element(element)]
            } else {
                vec![Child::Element(element), Child::Element(existing)]
            };
            Node::Bitmap { bitmap, children }
        }
    }

    /// Helper for inserting into a Bitmap node.
    fn insert_into_bitmap_node(
        bitmap: u32,
        children: &[Child<T>],
        element: T,
        hash: u64,
        depth: usize,
    ) -> (Node<T>, bool) {
        let index = hash_index(hash, depth);
        let bit = 1u32 << index;
        let position = (bitmap & (bit - 1)).count_ones() as usize;

        if bitmap & bit == 0 {
            // Slot is empty: add the new element inline
            let mut new_children = children.to_vec();
            new_children.insert(position, Child::Element(element));
            (
                Node::Bitmap {
                    bitmap: bitmap | bit,
                    children: new_children,
                },
                true,
            )
        } else {
            Self::insert_into_occupied_slot(bitmap, children, position, element, hash, depth)
        }
    }

    /// Helper for inserting into an occupied slot in a Bitmap node.
    fn insert_into_occupied_slot(
        bitmap: u32,
        children: &[Child<T>],
        position: usize,
        element: T,
        hash: u64,
        depth: usize,
    ) -> (Node<T>, bool) {
        let mut new_children = children.to_vec();

        let (new_child, added) = match &children[position] {
            Child::Element(stored) => {
                if *stored == element {
                    (Child::Element(element), false)
                } else {
                    let stored_hash = compute_hash(stored);
                    if stored_hash == hash {
                        let collision = Node::Collision {
                            hash,
                            elements: smallvec![stored.clone(), element],
                        };
                        (Child::Node(ReferenceCounter::new(collision)), true)
                    } else {
                        let split =
                            Self::split_leaf(stored_hash, stored.clone(), hash, element, depth + 1);
                        (Child::Node(ReferenceCounter::new(split)), true)
                    }
                }
            }
            Child::Node(subnode) => {
                let (new_subnode, added) = Self::insert_into_node(subnode, element, hash, depth + 1);
                (Child::Node(ReferenceCounter::new(new_subnode)), added)
            }
        };

        new_children[position] = new_child;
        (
            Node::Bitmap {
                bitmap,
                children: new_children,
            },
            added,
        )
    }

    /// Helper for inserting into a Collision node.
    fn insert_into_collision_node(
        node: &Node<T>,
        collision_hash: u64,
        elements: &SmallVec<[T; 2]>,
        element: T,
        hash: u64,
        depth: usize,
    ) -> (Node<T>, bool) {
        if hash == collision_hash {
            // Same hash: replace the equal element or extend the chain
            let mut new_elements = elements.clone();
            let found = new_elements.iter_mut().find(|stored| **stored == element);

            let added = match found {
                Some(stored) => {
                    *stored = element;
                    false
                }
                None => {
                    new_elements.push(element);
                    true
                }
            };

            (
                Node::Collision {
                    hash: collision_hash,
                    elements: new_elements,
                },
                added,
            )
        } else {
            // Different hash: push the chain down behind a bitmap branch
            let collision_index = hash_index(collision_hash, depth);
            let new_index = hash_index(hash, depth);

            if collision_index == new_index {
                let (subnode, added) = Self::insert_into_node(node, element, hash, depth + 1);
                (
                    Node::Bitmap {
                        bitmap: 1u32 << collision_index,
                        children: vec![Child::Node(ReferenceCounter::new(subnode))],
                    },
                    added,
                )
            } else {
                let bitmap = (1u32 << collision_index) | (1u32 << new_index);
                let children = if collision_index < new_index {
                    vec![
                        Child::Node(ReferenceCounter::new(node.clone())),
                        Child::Element(element),
                    ]
                } else {
                    vec![
                        Child::Element(element),
                        Child::Node(ReferenceCounter::new(node.clone())),
                    ]
                };
                (Node::Bitmap { bitmap, children }, true)
            }
        }
    }

    /// Removes an element from the set.
    ///
    /// Returns a new set without the element. If the element is absent,
    /// returns a clone of the original set. Branches left with a single
    /// inline element collapse back into a plain leaf, so the trie never
    /// grows monotonically under add/remove churn.
    ///
    /// # Complexity
    ///
    /// O(log32 N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use coppice::PersistentHashSet;
    ///
    /// let set = PersistentHashSet::new().insert(1).insert(2);
    /// let removed = set.remove(&1);
    ///
    /// assert_eq!(set.len(), 2);      // Original unchanged
    /// assert_eq!(removed.len(), 1);  // New version
    /// assert!(!removed.contains(&1));
    /// ```
    #[must_use]
    pub fn remove<Q>(&self, element: &Q) -> Self
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = compute_hash(element);
        match Self::remove_from_node(&self.root, element, hash, 0) {
            Some((new_root, true)) => Self {
                root: ReferenceCounter::new(new_root),
                length: self.length.saturating_sub(1),
            },
            _ => self.clone(),
        }
    }

    /// Recursive helper for remove.
    /// Returns `Some((new_node, was_removed))` or `None` if no change is needed.
    fn remove_from_node<Q>(
        node: &Node<T>,
        element: &Q,
        hash: u64,
        depth: usize,
    ) -> Option<(Node<T>, bool)>
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match node {
            Node::Empty => None,
            Node::Leaf {
                hash: leaf_hash,
                element: stored,
            } => {
                if *leaf_hash == hash && stored.borrow() == element {
                    Some((Node::Empty, true))
                } else {
                    None
                }
            }
            Node::Bitmap { bitmap, children } => {
                Self::remove_from_bitmap_node(*bitmap, children, element, hash, depth)
            }
            Node::Collision {
                hash: collision_hash,
                elements,
            } => Self::remove_from_collision_node(*collision_hash, elements, element, hash),
        }
    }

    /// Helper for removing from a Bitmap node.
    fn remove_from_bitmap_node<Q>(
        bitmap: u32,
        children: &[Child<T>],
        element: &Q,
        hash: u64,
        depth: usize,
    ) -> Option<(Node<T>, bool)>
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let index = hash_index(hash, depth);
        let bit = 1u32 << index;

        if bitmap & bit == 0 {
            return None;
        }

        let position = (bitmap & (bit - 1)).count_ones() as usize;

        match &children[position] {
            Child::Element(stored) => {
                if stored.borrow() == element {
                    let new_bitmap = bitmap & !bit;
                    if new_bitmap == 0 {
                        return Some((Node::Empty, true));
                    }
                    let mut new_children = children.to_vec();
                    new_children.remove(position);
                    Some(Self::collapse_bitmap_if_possible(new_bitmap, new_children))
                } else {
                    None
                }
            }
            Child::Node(subnode) => Self::remove_from_subnode(
                bitmap, children, position, subnode, element, hash, depth,
            ),
        }
    }

    /// Helper for removing from a subnode within a Bitmap node.
    fn remove_from_subnode<Q>(
        bitmap: u32,
        children: &[Child<T>],
        position: usize,
        subnode: &ReferenceCounter<Node<T>>,
        element: &Q,
        hash: u64,
        depth: usize,
    ) -> Option<(Node<T>, bool)>
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let (new_subnode, removed) = Self::remove_from_node(subnode, element, hash, depth + 1)?;

        if !removed {
            return None;
        }

        let mut new_children = children.to_vec();

        match new_subnode {
            Node::Empty => {
                let new_bitmap = bitmap & !(1u32 << hash_index(hash, depth));
                if new_bitmap == 0 {
                    return Some((Node::Empty, true));
                }
                new_children.remove(position);
                Some(Self::collapse_bitmap_if_possible(new_bitmap, new_children))
            }
            Node::Leaf {
                hash: leaf_hash,
                element: remaining,
            } => {
                // A subnode reduced to one element is pulled back inline
                if new_children.len() == 1 {
                    Some((
                        Node::Leaf {
                            hash: leaf_hash,
                            element: remaining,
                        },
                        true,
                    ))
                } else {
                    new_children[position] = Child::Element(remaining);
                    Some((
                        Node::Bitmap {
                            bitmap,
                            children: new_children,
                        },
                        true,
                    ))
                }
            }
            other => {
                new_children[position] = Child::Node(ReferenceCounter::new(other));
                Some((
                    Node::Bitmap {
                        bitmap,
                        children: new_children,
                    },
                    true,
                ))
            }
        }
    }

    /// Collapses a Bitmap node down to a Leaf if it holds a single inline
    /// element. A single-subnode bitmap cannot collapse: the subnode's
    /// layout depends on deeper hash fragments.
    fn collapse_bitmap_if_possible(bitmap: u32, children: Vec<Child<T>>) -> (Node<T>, bool) {
        if children.len() == 1
            && let Child::Element(stored) = &children[0]
        {
            let leaf_hash = compute_hash(stored);
            (
                Node::Leaf {
                    hash: leaf_hash,
                    element: stored.clone(),
                },
                true,
            )
        } else {
            (Node::Bitmap { bitmap, children }, true)
        }
    }

    /// Helper for removing from a Collision node.
    fn remove_from_collision_node<Q>(
        collision_hash: u64,
        elements: &SmallVec<[T; 2]>,
        element: &Q,
        hash: u64,
    ) -> Option<(Node<T>, bool)>
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if hash != collision_hash {
            return None;
        }

        let found_index = elements
            .iter()
            .position(|stored| stored.borrow() == element)?;

        let mut new_elements = elements.clone();
        new_elements.remove(found_index);

        if new_elements.len() == 1 {
            // A one-element chain is just a leaf again
            let remaining = new_elements.remove(0);
            Some((
                Node::Leaf {
                    hash: collision_hash,
                    element: remaining,
                },
                true,
            ))
        } else {
            Some((
                Node::Collision {
                    hash: collision_hash,
                    elements: new_elements,
                },
                true,
            ))
        }
    }

    /// Inserts every element of an iterator, returning a new set.
    ///
    /// Equivalent to folding [`insert`](Self::insert), but accumulates
    /// through a [`TransientHashSet`] to avoid intermediate handles.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use coppice::PersistentHashSet;
    ///
    /// let set = PersistentHashSet::singleton(1).insert_all([2, 3, 4]);
    /// assert_eq!(set.len(), 4);
    /// ```
    #[must_use]
    pub fn insert_all<I: IntoIterator<Item = T>>(&self, elements: I) -> Self {
        let mut transient = self.clone().transient();
        transient.extend(elements);
        transient.persistent()
    }

    /// Removes every element of an iterator, returning a new set.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use coppice::PersistentHashSet;
    ///
    /// let set: PersistentHashSet<i32> = [1, 2, 3, 4].into_iter().collect();
    /// let pruned = set.remove_all([2, 4, 9]);
    /// assert_eq!(pruned.len(), 2);
    /// ```
    #[must_use]
    pub fn remove_all<I: IntoIterator<Item = T>>(&self, elements: I) -> Self {
        let mut transient = self.clone().transient();
        for element in elements {
            transient.remove(&element);
        }
        transient.persistent()
    }

    /// Returns the union of two sets.
    ///
    /// # Complexity
    ///
    /// O(m log32(n + m)) where m = `other.len()`
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let mut transient = self.clone().transient();
        for element in other {
            transient.insert(element.clone());
        }
        transient.persistent()
    }

    /// Returns the intersection of two sets.
    ///
    /// # Complexity
    ///
    /// O(min(n, m) * log32(max(n, m)))
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        // Iterate over the smaller set
        let (smaller, larger) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };

        let mut transient = TransientHashSet::new();
        for element in smaller {
            if larger.contains(element) {
                transient.insert(element.clone());
            }
        }
        transient.persistent()
    }

    /// Returns the difference of two sets (elements of `self` not in `other`).
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        let mut transient = TransientHashSet::new();
        for element in self {
            if !other.contains(element) {
                transient.insert(element.clone());
            }
        }
        transient.persistent()
    }

    /// Returns the symmetric difference of two sets (elements in exactly
    /// one of the two).
    #[must_use]
    pub fn symmetric_difference(&self, other: &Self) -> Self {
        let a_minus_b = self.difference(other);
        let b_minus_a = other.difference(self);
        a_minus_b.union(&b_minus_a)
    }

    /// Returns `true` if every element of `self` is also in `other`.
    #[must_use]
    pub fn is_subset(&self, other: &Self) -> bool {
        if self.len() > other.len() {
            return false;
        }
        self.iter().all(|element| other.contains(element))
    }

    /// Returns `true` if every element of `other` is also in `self`.
    #[must_use]
    pub fn is_superset(&self, other: &Self) -> bool {
        other.is_subset(self)
    }

    /// Returns `true` if the two sets share no elements.
    #[must_use]
    pub fn is_disjoint(&self, other: &Self) -> bool {
        let (smaller, larger) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        smaller.iter().all(|element| !larger.contains(element))
    }

    /// Returns an iterator over the elements of the set.
    ///
    /// Each call starts a fresh traversal in the trie's deterministic
    /// depth-first order. The iterator has no mutation capability.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use coppice::PersistentHashSet;
    ///
    /// let set = PersistentHashSet::new().insert(1).insert(2).insert(3);
    /// let mut elements: Vec<i32> = set.iter().copied().collect();
    /// elements.sort_unstable();
    /// assert_eq!(elements, vec![1, 2, 3]);
    /// ```
    #[must_use]
    pub fn iter(&self) -> PersistentHashSetIterator<'_, T> {
        PersistentHashSetIterator::new(&self.root, self.length)
    }

    /// Converts this persistent set into a transient set for batch updates.
    ///
    /// O(1): only moves the root reference. Nodes still shared with other
    /// handles are path-copied lazily on first mutation.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use coppice::PersistentHashSet;
    ///
    /// let persistent: PersistentHashSet<i32> = [1, 2, 3].into_iter().collect();
    /// let mut transient = persistent.transient();
    /// transient.insert(4);
    /// transient.remove(&1);
    /// let updated = transient.persistent();
    /// assert_eq!(updated.len(), 3);
    /// ```
    #[must_use]
    pub fn transient(self) -> TransientHashSet<T> {
        TransientHashSet {
            root: self.root,
            length: self.length,
            _marker: PhantomData,
        }
    }
}

// =============================================================================
// Iterator Implementation
// =============================================================================

/// An iterator over the elements of a [`PersistentHashSet`].
///
/// Yields elements in deterministic depth-first trie order.
pub struct PersistentHashSetIterator<'a, T> {
    /// Child iterators of the bitmap nodes on the current path
    frames: Vec<std::slice::Iter<'a, Child<T>>>,
    /// In-progress collision chain, if any
    collision: Option<std::slice::Iter<'a, T>>,
    /// A single pending element (root leaf case)
    pending: Option<&'a T>,
    /// Elements not yet yielded
    remaining: usize,
}

impl<'a, T> PersistentHashSetIterator<'a, T> {
    fn new(root: &'a Node<T>, length: usize) -> Self {
        let mut iterator = Self {
            frames: Vec::new(),
            collision: None,
            pending: None,
            remaining: length,
        };
        iterator.enter(root);
        iterator
    }

    /// Queues a node's contents for traversal.
    fn enter(&mut self, node: &'a Node<T>) {
        match node {
            Node::Empty => {}
            Node::Leaf { element, .. } => self.pending = Some(element),
            Node::Bitmap { children, .. } => self.frames.push(children.iter()),
            Node::Collision { elements, .. } => self.collision = Some(elements.iter()),
        }
    }

    fn next_element(&mut self) -> Option<&'a T> {
        loop {
            if let Some(element) = self.pending.take() {
                return Some(element);
            }

            if let Some(chain) = &mut self.collision {
                if let Some(element) = chain.next() {
                    return Some(element);
                }
                self.collision = None;
            }

            let frame = self.frames.last_mut()?;
            match frame.next() {
                Some(Child::Element(element)) => return Some(element),
                Some(Child::Node(subnode)) => {
                    let subnode: &'a Node<T> = subnode;
                    self.enter(subnode);
                }
                None => {
                    self.frames.pop();
                }
            }
        }
    }
}

impl<'a, T> Iterator for PersistentHashSetIterator<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let element = self.next_element()?;
        self.remaining -= 1;
        Some(element)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for PersistentHashSetIterator<'_, T> {
    fn len(&self) -> usize {
        self.remaining
    }
}

/// An owning iterator over the elements of a [`PersistentHashSet`].
pub struct PersistentHashSetIntoIterator<T> {
    inner: std::vec::IntoIter<T>,
}

impl<T> Iterator for PersistentHashSetIntoIterator<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> ExactSizeIterator for PersistentHashSetIntoIterator<T> {
    fn len(&self) -> usize {
        self.inner.len()
    }
}

// =============================================================================
// Standard Trait Implementations
// =============================================================================

impl<T> Default for PersistentHashSet<T> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Hash + Eq> FromIterator<T> for PersistentHashSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut transient = TransientHashSet::new();
        transient.extend(iter);
        transient.persistent()
    }
}

impl<T: Clone + Hash + Eq> IntoIterator for PersistentHashSet<T> {
    type Item = T;
    type IntoIter = PersistentHashSetIntoIterator<T>;

    fn into_iter(self) -> Self::IntoIter {
        let elements: Vec<T> = self.iter().cloned().collect();
        PersistentHashSetIntoIterator {
            inner: elements.into_iter(),
        }
    }
}

impl<'a, T: Clone + Hash + Eq> IntoIterator for &'a PersistentHashSet<T> {
    type Item = &'a T;
    type IntoIter = PersistentHashSetIterator<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: Clone + Hash + Eq> PartialEq for PersistentHashSet<T> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|element| other.contains(element))
    }
}

impl<T: Clone + Hash + Eq> Eq for PersistentHashSet<T> {}

impl<T: Clone + Hash + Eq> Hash for PersistentHashSet<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        crate::traits::unordered_set_hash(self.iter(), self.len(), state);
    }
}

impl<T: Clone + Hash + Eq + fmt::Debug> fmt::Debug for PersistentHashSet<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_set().entries(self.iter()).finish()
    }
}

impl<T: Clone + Hash + Eq + fmt::Display> fmt::Display for PersistentHashSet<T> {
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

impl<T: Clone + Hash + Eq> PersistentSet<T> for PersistentHashSet<T> {
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
// TransientHashSet Definition
// =============================================================================

/// A transient (temporarily mutable) hash set for efficient batch updates.
///
/// `TransientHashSet` owns a private working trie. Nodes it holds uniquely
/// are edited in place; nodes still shared with published handles are
/// path-copied once on first touch. The accumulated result is finalized
/// with [`persistent()`](Self::persistent), which consumes the transient,
/// so using a builder after finalization is a compile error rather than a
/// runtime one.
///
/// The result is observably identical to folding
/// [`PersistentHashSet::insert`] over an empty set.
///
/// # Design
///
/// - `PhantomData<Rc<()>>` ensures `!Send` and `!Sync`: a transient must
///   be confined to a single owner between creation and finalization.
/// - `Clone`/`Copy` are intentionally not implemented.
///
/// # Examples
///
/// ```rust
/// use coppice::TransientHashSet;
///
/// let mut transient = TransientHashSet::new();
/// transient.insert(1);
/// transient.insert(2);
/// transient.insert(2); // duplicate: no-op
///
/// let persistent = transient.persistent();
/// assert_eq!(persistent.len(), 2);
/// ```
pub struct TransientHashSet<T> {
    root: ReferenceCounter<Node<T>>,
    length: usize,
    /// Marker to ensure `!Send` and `!Sync`.
    _marker: PhantomData<Rc<()>>,
}

static_assertions::assert_not_impl_any!(TransientHashSet<i32>: Send, Sync);
static_assertions::assert_not_impl_any!(TransientHashSet<String>: Send, Sync);

impl<T> TransientHashSet<T> {
    /// Returns the number of elements accumulated so far.
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
}

impl<T: Clone + Hash + Eq> TransientHashSet<T> {
    /// Creates a new empty `TransientHashSet`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: ReferenceCounter::new(Node::empty()),
            length: 0,
            _marker: PhantomData,
        }
    }

    /// Returns `true` if the set contains the specified element.
    #[must_use]
    pub fn contains<Q>(&self, element: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = compute_hash(element);
        PersistentHashSet::find_in_node(&self.root, element, hash, 0).is_some()
    }

    /// Inserts an element, editing the working trie in place.
    ///
    /// Returns `true` if the element was newly inserted, `false` if an
    /// equal element was already present (in which case it is replaced,
    /// last-write-wins).
    pub fn insert(&mut self, element: T) -> bool {
        let hash = compute_hash(&element);
        let added = Self::insert_mut(ReferenceCounter::make_mut(&mut self.root), element, hash, 0);
        if added {
            self.length += 1;
        }
        added
    }

    /// In-place recursive insert. Shared subnodes are path-copied by
    /// `make_mut`; uniquely-owned subnodes are mutated directly.
    fn insert_mut(node: &mut Node<T>, element: T, hash: u64, depth: usize) -> bool {
        match node {
            Node::Empty => {
                *node = Node::Leaf { hash, element };
                true
            }
            Node::Leaf {
                hash: leaf_hash,
                element: stored,
            } => {
                if *leaf_hash == hash && *stored == element {
                    *stored = element;
                    false
                } else if *leaf_hash == hash {
                    let elements = smallvec![stored.clone(), element];
                    *node = Node::Collision { hash, elements };
                    true
                } else {
                    let split = PersistentHashSet::split_leaf(
                        *leaf_hash,
                        stored.clone(),
                        hash,
                        element,
                        depth,
                    );
                    *node = split;
                    true
                }
            }
            Node::Bitmap { bitmap, children } => {
                let index = hash_index(hash, depth);
                let bit = 1u32 << index;
                let position = (*bitmap & (bit - 1)).count_ones() as usize;

                if *bitmap & bit == 0 {
                    children.insert(position, Child::Element(element));
                    *bitmap |= bit;
                    true
                } else {
                    match &mut children[position] {
                        Child::Element(stored) => {
                            if *stored == element {
                                *stored = element;
                                false
                            } else {
                                let stored_hash = compute_hash(stored);
                                let replacement = if stored_hash == hash {
                                    Node::Collision {
                                        hash,
                                        elements: smallvec![stored.clone(), element],
                                    }
                                } else {
                                    PersistentHashSet::split_leaf(
                                        stored_hash,
                                        stored.clone(),
                                        hash,
                                        element,
                                        depth + 1,
                                    )
                                };
                                children[position] =
                                    Child::Node(ReferenceCounter::new(replacement));
                                true
                            }
                        }
                        Child::Node(subnode) => Self::insert_mut(
                            ReferenceCounter::make_mut(subnode),
                            element,
                            hash,
                            depth + 1,
                        ),
                    }
                }
            }
            Node::Collision {
                hash: collision_hash,
                elements,
            } if *collision_hash == hash => {
                match elements.iter_mut().find(|stored| **stored == element) {
                    Some(stored) => {
                        *stored = element;
                        false
                    }
                    None => {
                        elements.push(element);
                        true
                    }
                }
            }
            Node::Collision { .. } => {
                let current = node.clone();
                let (new_node, added) =
                    PersistentHashSet::insert_into_node(&current, element, hash, depth);
                *node = new_node;
                added
            }
        }
    }

    /// Removes an element from the working set.
    ///
    /// Returns `true` if the element was present and removed. Removal
    /// shares the persistent collapse routine; the root is replaced with
    /// the rebuilt path.
    pub fn remove<Q>(&mut self, element: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = compute_hash(element);
        match PersistentHashSet::remove_from_node(&self.root, element, hash, 0) {
            Some((new_root, true)) => {
                self.root = ReferenceCounter::new(new_root);
                self.length = self.length.saturating_sub(1);
                true
            }
            _ => false,
        }
    }

    /// Inserts every element from an iterator.
    pub fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for element in iter {
            self.insert(element);
        }
    }

    /// Finalizes this transient into a persistent set.
    ///
    /// O(1): only moves the root. The transient is consumed; further
    /// accumulation requires a new transient.
    #[must_use]
    pub fn persistent(self) -> PersistentHashSet<T> {
        PersistentHashSet {
            root: self.root,
            length: self.length,
        }
    }
}

impl<T: Clone + Hash + Eq> Default for TransientHashSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Hash + Eq> FromIterator<T> for TransientHashSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut transient = Self::new();
        transient.extend(iter);
        transient
    }
}

// =============================================================================
// Tests
// =============================================================================
