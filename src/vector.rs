//! Persistent (immutable) vector based on Radix Balanced Tree.
//!
//! This module provides [`PersistentVector`], an immutable dynamic array
//! that uses structural sharing for efficient operations.
//!
//! # Overview
//!
//! `PersistentVector` is a 32-way branching trie (Radix Balanced Tree)
//! inspired by Clojure's `PersistentVector` and Scala's Vector. It provides:
//!
//! - O(log32 N) random access (effectively O(1) for practical sizes)
//! - O(log32 N) `push_back` (amortized O(1) with tail optimization)
//! - O(log32 N) update
//! - O(1) len and `is_empty`
//!
//! All operations return new vectors without modifying the original, and
//! structural sharing ensures memory efficiency. Insertion order is
//! preserved exactly; duplicate elements are kept, each occurrence at its
//! own index.
//!
//! # Internal Structure
//!
//! The vector consists of:
//! - A root node (32-way branching trie)
//! - A tail buffer (up to 32 elements) for efficient append
//!
//! # Examples
//!
//! ```rust
//! use coppice::PersistentVector;
//!
//! let vector = PersistentVector::new()
//!     .push_back(1)
//!     .push_back(2)
//!     .push_back(3);
//!
//! assert_eq!(vector.get(0), Some(&1));
//! assert_eq!(vector.get(1), Some(&2));
//! assert_eq!(vector.get(2), Some(&3));
//!
//! // Structural sharing: the original vector is preserved
//! let extended = vector.push_back(4);
//! assert_eq!(vector.len(), 3);     // Original unchanged
//! assert_eq!(extended.len(), 4);   // New vector
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::FromIterator;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::ReferenceCounter;
use crate::traits::PersistentSequence;

// =============================================================================
// Constants
// =============================================================================

/// Branching factor (2^5 = 32)
const BRANCHING_FACTOR: usize = 32;

/// Bits per level in the trie
const BITS_PER_LEVEL: usize = 5;

/// Bit mask for extracting index within a node
const MASK: usize = BRANCHING_FACTOR - 1;

// =============================================================================
// Node Definition
// =============================================================================

/// Internal node structure for the radix balanced tree.
#[derive(Clone)]
enum Node<T> {
    /// Branch node containing child nodes
    Branch(ReferenceCounter<[Option<ReferenceCounter<Self>>; BRANCHING_FACTOR]>),
    /// Leaf node containing actual elements
    Leaf(ReferenceCounter<[T]>),
}

impl<T> Node<T> {
    /// Creates an empty branch node.
    fn empty_branch() -> Self {
        Self::Branch(ReferenceCounter::new(std::array::from_fn(|_| None)))
    }
}

impl<T: Clone> Node<T> {
    /// Creates a leaf node by reusing an existing `ReferenceCounter<[T]>`,
    /// incrementing the reference count instead of copying the elements.
    #[inline]
    const fn leaf_from_reference_counter(elements: ReferenceCounter<[T]>) -> Self {
        Self::Leaf(elements)
    }
}

// =============================================================================
// PersistentVector Definition
// =============================================================================

/// A persistent (immutable) vector based on Radix Balanced Tree.
///
/// `PersistentVector` is an immutable data structure that uses structural
/// sharing to efficiently support functional programming patterns.
///
/// # Time Complexity
///
/// | Operation       | Complexity                      |
/// |-----------------|---------------------------------|
/// | `new`           | O(1)                            |
/// | `get`           | O(log32 N)                      |
/// | `push_back`     | O(log32 N) amortized O(1)       |
/// | `pop_back`      | O(log32 N)                      |
/// | `update`        | O(log32 N)                      |
/// | `index_of`      | O(N)                            |
/// | `len`           | O(1)                            |
/// | `is_empty`      | O(1)                            |
/// | `iter`          | O(1) to create, O(N) to iterate |
///
/// # Examples
///
/// ```rust
/// use coppice::PersistentVector;
///
/// let vector: PersistentVector<i32> = (0..100).collect();
/// assert_eq!(vector.len(), 100);
/// assert_eq!(vector.get(50), Some(&50));
/// ```
#[derive(Clone)]
pub struct PersistentVector<T> {
    /// Total number of elements
    length: usize,
    /// Shift amount for index calculation: (depth - 1) * `BITS_PER_LEVEL`
    shift: usize,
    /// Root node of the trie
    root: ReferenceCounter<Node<T>>,
    /// Tail buffer for efficient append (up to 32 elements)
    tail: ReferenceCounter<[T]>,
}

impl<T> PersistentVector<T> {
    /// Creates a new empty vector.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use coppice::PersistentVector;
    ///
    /// let vector: PersistentVector<i32> = PersistentVector::new();
    /// assert!(vector.is_empty());
    /// ```
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            length: 0,
            shift: BITS_PER_LEVEL,
            root: ReferenceCounter::new(Node::empty_branch()),
            tail: ReferenceCounter::from(Vec::<T>::new()),
        }
    }

    /// Creates a vector containing a single element.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use coppice::PersistentVector;
    ///
    /// let vector = PersistentVector::singleton(42);
    /// assert_eq!(vector.len(), 1);
    /// assert_eq!(vector.get(0), Some(&42));
    /// ```
    #[inline]
    #[must_use]
    pub fn singleton(element: T) -> Self {
        Self {
            length: 1,
            shift: BITS_PER_LEVEL,
            root: ReferenceCounter::new(Node::empty_branch()),
            tail: ReferenceCounter::from(vec![element]),
        }
    }

    /// Returns the number of elements in the vector.
    ///
    /// # Complexity
    ///
    /// O(1)
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.length
    }

    /// Returns `true` if the vector contains no elements.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Returns the starting index of the tail buffer.
    #[inline]
    const fn tail_offset(&self) -> usize {
        if self.length < BRANCHING_FACTOR {
            0
        } else {
            ((self.length - 1) >> BITS_PER_LEVEL) << BITS_PER_LEVEL
        }
    }

    /// Returns a reference to the element at the given index.
    ///
    /// Returns `None` if the index is out of bounds. Out-of-range access is
    /// an ordinary absence, distinct from the "not found" result of
    /// [`index_of`](Self::index_of).
    ///
    /// # Complexity
    ///
    /// O(log32 N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use coppice::PersistentVector;
    ///
    /// let vector: PersistentVector<i32> = (1..=5).collect();
    /// assert_eq!(vector.get(0), Some(&1));
    /// assert_eq!(vector.get(4), Some(&5));
    /// assert_eq!(vector.get(10), None);
    /// ```
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.length {
            return None;
        }

        let tail_offset = self.tail_offset();

        if index >= tail_offset {
            // Element is in the tail
            self.tail.get(index - tail_offset)
        } else {
            // Element is in the root tree
            self.get_from_root(index)
        }
    }

    /// Gets an element from the root tree.
    fn get_from_root(&self, index: usize) -> Option<&T> {
        let mut node = &self.root;
        let mut level = self.shift;

        while level > 0 {
            match node.as_ref() {
                Node::Branch(children) => {
                    let child_index = (index >> level) & MASK;
                    match &children[child_index] {
                        Some(child) => {
                            node = child;
                            level -= BITS_PER_LEVEL;
                        }
                        None => return None,
                    }
                }
                Node::Leaf(_) => break,
            }
        }

        match node.as_ref() {
            Node::Leaf(elements) => elements.get(index & MASK),
            // Indexing below the tail offset always lands on a leaf.
            Node::Branch(_) => None,
        }
    }

    /// Returns a reference to the first element.
    ///
    /// Returns `None` if the vector is empty.
    #[inline]
    #[must_use]
    pub fn first(&self) -> Option<&T> {
        self.get(0)
    }

    /// Returns a reference to the last element.
    ///
    /// Returns `None` if the vector is empty.
    ///
    /// # Complexity
    ///
    /// O(1), the last element is always in the tail
    #[inline]
    #[must_use]
    pub fn last(&self) -> Option<&T> {
        if self.is_empty() { None } else { self.tail.last() }
    }

    /// Returns an iterator over references to the elements in insertion
    /// order.
    ///
    /// The iterator yields elements front to back in O(N) total through a
    /// stack-based tree traversal that visits each node exactly once.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use coppice::PersistentVector;
    ///
    /// let vector: PersistentVector<i32> = (1..=5).collect();
    /// let collected: Vec<&i32> = vector.iter().collect();
    /// assert_eq!(collected, vec![&1, &2, &3, &4, &5]);
    /// ```
    #[must_use]
    pub fn iter(&self) -> PersistentVectorIterator<'_, T> {
        PersistentVectorIterator::new(self)
    }
}

impl<T: PartialEq> PersistentVector<T> {
    /// Returns the index of the first element equal to the argument.
    ///
    /// Absence is `None`; an element at index 0 is `Some(0)`.
    ///
    /// # Complexity
    ///
    /// O(N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use coppice::PersistentVector;
    ///
    /// let vector: PersistentVector<i32> = [1, 2, 2, 1].into_iter().collect();
    /// assert_eq!(vector.index_of(&2), Some(1));
    /// assert_eq!(vector.index_of(&9), None);
    /// ```
    #[must_use]
    pub fn index_of(&self, element: &T) -> Option<usize> {
        self.iter().position(|stored| stored == element)
    }

    /// Returns the index of the last element equal to the argument.
    ///
    /// # Complexity
    ///
    /// O(N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use coppice::PersistentVector;
    ///
    /// let vector: PersistentVector<i32> = [1, 2, 2, 1].into_iter().collect();
    /// assert_eq!(vector.last_index_of(&2), Some(2));
    /// assert_eq!(vector.last_index_of(&1), Some(3));
    /// ```
    #[must_use]
    pub fn last_index_of(&self, element: &T) -> Option<usize> {
        let mut found = None;
        for (index, stored) in self.iter().enumerate() {
            if stored == element {
                found = Some(index);
            }
        }
        found
    }

    /// Returns `true` if the vector contains an element equal to the
    /// argument.
    ///
    /// # Complexity
    ///
    /// O(N)
    #[must_use]
    pub fn contains(&self, element: &T) -> bool {
        self.index_of(element).is_some()
    }
}

impl<T: Clone> PersistentVector<T> {
    /// Appends an element to the back of the vector.
    ///
    /// Returns a new vector with the element at the end.
    ///
    /// # Complexity
    ///
    /// O(log32 N), amortized O(1) due to tail optimization
    ///
    /// # Examples
    ///
    /// ```rust
    /// use coppice::PersistentVector;
    ///
    /// let vector = PersistentVector::new()
    ///     .push_back(1)
    ///     .push_back(2)
    ///     .push_back(3);
    ///
    /// assert_eq!(vector.len(), 3);
    /// assert_eq!(vector.get(2), Some(&3));
    /// ```
    #[must_use]
    pub fn push_back(&self, element: T) -> Self {
        if self.tail.len() < BRANCHING_FACTOR {
            // Tail has space, just add to tail
            let mut new_tail = self.tail.to_vec();
            new_tail.push(element);

            Self {
                length: self.length + 1,
                shift: self.shift,
                root: self.root.clone(),
                tail: ReferenceCounter::from(new_tail.as_slice()),
            }
        } else {
            // Tail is full, push tail to root and create new tail
            self.push_tail_to_root(element)
        }
    }

    /// Appends every element of an iterator to the back of the vector.
    ///
    /// More efficient than repeated [`push_back`](Self::push_back) for
    /// larger additions.
    ///
    /// # Complexity
    ///
    /// O(N + M) for M appended elements on top of N existing ones
    ///
    /// # Examples
    ///
    /// ```rust
    /// use coppice::PersistentVector;
    ///
    /// let vector: PersistentVector<i32> = (1..=3).collect();
    /// let extended = vector.push_back_all(4..=6);
    ///
    /// assert_eq!(extended.len(), 6);
    /// let collected: Vec<i32> = extended.iter().copied().collect();
    /// assert_eq!(collected, vec![1, 2, 3, 4, 5, 6]);
    /// ```
    #[must_use]
    pub fn push_back_all<I>(&self, iter: I) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        let new_elements: Vec<T> = iter.into_iter().collect();

        if new_elements.is_empty() {
            return self.clone();
        }

        // Folding single pushes costs about one tail clone per element,
        // while the rebuild walks both inputs in full. Fold while the
        // addition is small relative to the existing contents.
        let fold_threshold = BRANCHING_FACTOR.max(self.length / BRANCHING_FACTOR);
        if new_elements.len() <= fold_threshold {
            let mut result = self.clone();
            for element in new_elements {
                result = result.push_back(element);
            }
            return result;
        }

        let total_length = self.length + new_elements.len();
        let mut all_elements: Vec<T> = Vec::with_capacity(total_length);

        for element in self {
            all_elements.push(element.clone());
        }
        all_elements.extend(new_elements);

        build_persistent_vector_from_vec(all_elements)
    }

    /// Creates a `PersistentVector` by cloning the elements of a slice.
    ///
    /// # Complexity
    ///
    /// O(N) where N = `slice.len()`
    ///
    /// # Examples
    ///
    /// ```rust
    /// use coppice::PersistentVector;
    ///
    /// let vector = PersistentVector::from_slice(&[1, 2, 3, 4, 5]);
    /// assert_eq!(vector.len(), 5);
    /// assert_eq!(vector.get(0), Some(&1));
    /// ```
    #[must_use]
    pub fn from_slice(slice: &[T]) -> Self {
        if slice.is_empty() {
            return Self::new();
        }

        let elements: Vec<T> = slice.to_vec();
        build_persistent_vector_from_vec(elements)
    }

    /// Pushes the current tail into the root and creates a new tail with
    /// the element.
    fn push_tail_to_root(&self, element: T) -> Self {
        // Reuse the tail allocation; only the reference count moves
        let tail_leaf = Node::leaf_from_reference_counter(self.tail.clone());
        let tail_offset = self.tail_offset();

        // Root overflow: the current depth cannot address the new leaf
        let root_overflow = (tail_offset >> self.shift) >= BRANCHING_FACTOR;

        if root_overflow {
            // Create a new root level
            let mut new_root_children: [Option<ReferenceCounter<Node<T>>>; BRANCHING_FACTOR] =
                std::array::from_fn(|_| None);
            new_root_children[0] = Some(self.root.clone());
            new_root_children[1] =
                Some(ReferenceCounter::new(Self::new_path(self.shift, tail_leaf)));

            Self {
                length: self.length + 1,
                shift: self.shift + BITS_PER_LEVEL,
                root: ReferenceCounter::new(Node::Branch(ReferenceCounter::new(new_root_children))),
                tail: ReferenceCounter::from([element].as_slice()),
            }
        } else {
            // Push tail into existing root
            let new_root =
                Self::push_tail_into_node(&self.root, self.shift, tail_offset, tail_leaf);

            Self {
                length: self.length + 1,
                shift: self.shift,
                root: ReferenceCounter::new(new_root),
                tail: ReferenceCounter::from([element].as_slice()),
            }
        }
    }

    /// Creates a new path from root to the leaf.
    fn new_path(level: usize, node: Node<T>) -> Node<T> {
        if level == 0 {
            node
        } else {
            let mut children: [Option<ReferenceCounter<Node<T>>>; BRANCHING_FACTOR] =
                std::array::from_fn(|_| None);
            children[0] = Some(ReferenceCounter::new(Self::new_path(
                level - BITS_PER_LEVEL,
                node,
            )));
            Node::Branch(ReferenceCounter::new(children))
        }
    }

    /// Pushes a tail leaf into the tree at the given level.
    fn push_tail_into_node(
        node: &ReferenceCounter<Node<T>>,
        level: usize,
        tail_offset: usize,
        tail_node: Node<T>,
    ) -> Node<T> {
        let subindex = (tail_offset >> level) & MASK;

        match node.as_ref() {
            Node::Branch(children) => {
                let mut new_children = children.as_ref().clone();

                if level == BITS_PER_LEVEL {
                    // Bottom branch level: insert the tail leaf
                    new_children[subindex] = Some(ReferenceCounter::new(tail_node));
                } else {
                    // Recurse down
                    let child = match &children[subindex] {
                        Some(existing) => Self::push_tail_into_node(
                            existing,
                            level - BITS_PER_LEVEL,
                            tail_offset,
                            tail_node,
                        ),
                        None => Self::new_path(level - BITS_PER_LEVEL, tail_node),
                    };
                    new_children[subindex] = Some(ReferenceCounter::new(child));
                }

                Node::Branch(ReferenceCounter::new(new_children))
            }
            Node::Leaf(_) => {
                // Unreachable in a well-formed tree
                tail_node
            }
        }
    }

    /// Removes the last element from the vector.
    ///
    /// Returns `None` if the vector is empty, otherwise the new vector and
    /// the removed element.
    ///
    /// # Complexity
    ///
    /// O(log32 N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use coppice::PersistentVector;
    ///
    /// let vector: PersistentVector<i32> = (1..=5).collect();
    /// let (remaining, element) = vector.pop_back().unwrap();
    ///
    /// assert_eq!(element, 5);
    /// assert_eq!(remaining.len(), 4);
    /// ```
    #[must_use]
    pub fn pop_back(&self) -> Option<(Self, T)> {
        if self.is_empty() {
            return None;
        }

        if self.length == 1 {
            return Some((Self::new(), self.tail[0].clone()));
        }

        if self.tail.len() > 1 {
            // Just remove from tail; the tail of a non-empty vector is
            // never empty
            let element = self.tail.last()?.clone();
            let new_tail: Vec<T> = self.tail[..self.tail.len() - 1].to_vec();

            let new_vector = Self {
                length: self.length - 1,
                shift: self.shift,
                root: self.root.clone(),
                tail: ReferenceCounter::from(new_tail.as_slice()),
            };

            Some((new_vector, element))
        } else {
            // Tail has only 1 element, pull the new tail out of the root
            let element = self.tail[0].clone();
            let new_tail_offset = self.length - BRANCHING_FACTOR - 1;

            let new_tail = self.get_leaf_at(new_tail_offset);
            let (new_root, new_shift) = self.pop_tail_from_root();

            let new_vector = Self {
                length: self.length - 1,
                shift: new_shift,
                root: new_root,
                tail: new_tail,
            };

            Some((new_vector, element))
        }
    }

    /// Gets the leaf at the given offset.
    fn get_leaf_at(&self, offset: usize) -> ReferenceCounter<[T]> {
        let mut node = &self.root;
        let mut level = self.shift;

        while level > 0 {
            match node.as_ref() {
                Node::Branch(children) => {
                    let child_index = (offset >> level) & MASK;
                    if let Some(child) = &children[child_index] {
                        node = child;
                        level -= BITS_PER_LEVEL;
                    } else {
                        return ReferenceCounter::from([].as_slice());
                    }
                }
                Node::Leaf(_) => break,
            }
        }

        match node.as_ref() {
            Node::Leaf(elements) => elements.clone(),
            Node::Branch(_) => ReferenceCounter::from([].as_slice()),
        }
    }

    /// Removes the tail from the root.
    fn pop_tail_from_root(&self) -> (ReferenceCounter<Node<T>>, usize) {
        let tail_offset = self.length - 2; // Last valid index after pop
        let (new_root, _) = Self::do_pop_tail(&self.root, self.shift, tail_offset);

        // Reduce tree depth if the root holds a single leftmost child
        match new_root.as_ref() {
            Node::Branch(children) => {
                if self.shift > BITS_PER_LEVEL {
                    let occupied = children.iter().filter(|child| child.is_some()).count();
                    if occupied == 1
                        && let Some(only_child) = &children[0]
                    {
                        return (only_child.clone(), self.shift - BITS_PER_LEVEL);
                    }
                }
                (new_root, self.shift)
            }
            Node::Leaf(_) => (new_root, self.shift),
        }
    }

    /// Recursively pops the tail from the tree.
    fn do_pop_tail(
        node: &ReferenceCounter<Node<T>>,
        level: usize,
        offset: usize,
    ) -> (ReferenceCounter<Node<T>>, bool) {
        let subindex = (offset >> level) & MASK;

        match node.as_ref() {
            Node::Branch(children) => {
                if level == BITS_PER_LEVEL {
                    // At bottom level, remove the child
                    let mut new_children = children.as_ref().clone();
                    new_children[subindex] = None;

                    let all_none = new_children.iter().all(|child| child.is_none());
                    (
                        ReferenceCounter::new(Node::Branch(ReferenceCounter::new(new_children))),
                        all_none,
                    )
                } else if let Some(child) = &children[subindex] {
                    let (new_child, is_empty) =
                        Self::do_pop_tail(child, level - BITS_PER_LEVEL, offset);
                    let mut new_children = children.as_ref().clone();

                    if is_empty {
                        new_children[subindex] = None;
                    } else {
                        new_children[subindex] = Some(new_child);
                    }

                    let all_none = new_children.iter().all(|child| child.is_none());
                    (
                        ReferenceCounter::new(Node::Branch(ReferenceCounter::new(new_children))),
                        all_none,
                    )
                } else {
                    (node.clone(), false)
                }
            }
            Node::Leaf(_) => (node.clone(), true),
        }
    }

    /// Replaces the element at the given index.
    ///
    /// Returns `None` if the index is out of bounds, otherwise a new vector
    /// with the updated element.
    ///
    /// # Complexity
    ///
    /// O(log32 N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use coppice::PersistentVector;
    ///
    /// let vector: PersistentVector<i32> = (1..=5).collect();
    /// let updated = vector.update(2, 100).unwrap();
    ///
    /// assert_eq!(updated.get(2), Some(&100));
    /// assert_eq!(vector.get(2), Some(&3)); // Original unchanged
    /// ```
    #[must_use]
    pub fn update(&self, index: usize, element: T) -> Option<Self> {
        if index >= self.length {
            return None;
        }

        let tail_offset = self.tail_offset();

        if index >= tail_offset {
            // Element is in the tail
            let tail_index = index - tail_offset;
            let mut new_tail = self.tail.to_vec();
            new_tail[tail_index] = element;

            Some(Self {
                length: self.length,
                shift: self.shift,
                root: self.root.clone(),
                tail: ReferenceCounter::from(new_tail.as_slice()),
            })
        } else {
            // Element is in the root
            let new_root = Self::update_in_root(&self.root, self.shift, index, element);

            Some(Self {
                length: self.length,
                shift: self.shift,
                root: ReferenceCounter::new(new_root),
                tail: self.tail.clone(),
            })
        }
    }

    /// Updates an element in the root tree.
    fn update_in_root(
        node: &ReferenceCounter<Node<T>>,
        level: usize,
        index: usize,
        element: T,
    ) -> Node<T> {
        match node.as_ref() {
            Node::Branch(children) => {
                let subindex = (index >> level) & MASK;
                let mut new_children = children.as_ref().clone();

                if let Some(child) = &children[subindex] {
                    new_children[subindex] = Some(ReferenceCounter::new(Self::update_in_root(
                        child,
                        level.saturating_sub(BITS_PER_LEVEL),
                        index,
                        element,
                    )));
                }

                Node::Branch(ReferenceCounter::new(new_children))
            }
            Node::Leaf(elements) => {
                let leaf_index = index & MASK;
                let mut new_elements = elements.to_vec();
                if leaf_index < new_elements.len() {
                    new_elements[leaf_index] = element;
                }
                Node::Leaf(ReferenceCounter::from(new_elements.as_slice()))
            }
        }
    }

    /// Converts this persistent vector into a transient vector for batch
    /// appends.
    ///
    /// O(N): the transient accumulates into a flat buffer seeded with this
    /// vector's elements, then rebuilds the trie once on
    /// [`persistent()`](TransientVector::persistent).
    #[must_use]
    pub fn transient(self) -> TransientVector<T> {
        let mut elements = Vec::with_capacity(self.length);
        for element in &self {
            elements.push(element.clone());
        }
        TransientVector {
            elements,
            _marker: PhantomData,
        }
    }
}

// =============================================================================
// Iterator Implementation
// =============================================================================

/// The processing state of the iterator.
#[derive(Clone, Copy, PartialEq, Eq)]
enum IteratorState {
    /// Currently traversing the tree (root) structure
    TraversingTree,
    /// Currently processing elements in the tail buffer
    ProcessingTail,
    /// All elements have been consumed
    Exhausted,
}

/// A stack entry for tree traversal.
///
/// Holds a reference to a branch node's children array and tracks which
/// child index to process next.
struct TraversalStackEntry<'a, T> {
    /// Reference to the branch node's children array
    children: &'a [Option<ReferenceCounter<Node<T>>>; BRANCHING_FACTOR],
    /// Index of the next child to process
    child_index: usize,
}

/// An iterator over references to elements of a [`PersistentVector`].
///
/// Uses a stack-based tree traversal to achieve O(N) total iteration
/// instead of O(N log32 N), caching the current leaf for sequential access.
pub struct PersistentVectorIterator<'a, T> {
    /// Reference to the original vector (for lifetime and metadata)
    vector: &'a PersistentVector<T>,
    /// Stack for tree traversal (maximum depth is 7 for practical sizes)
    traversal_stack: Vec<TraversalStackEntry<'a, T>>,
    /// Currently cached leaf node elements
    current_leaf: Option<&'a [T]>,
    /// Current position within the cached leaf
    leaf_index: usize,
    /// Current processing state
    state: IteratorState,
    /// Current position within the tail buffer
    tail_index: usize,
    /// Number of elements already returned (for `ExactSizeIterator`)
    elements_returned: usize,
}

impl<'a, T> PersistentVectorIterator<'a, T> {
    /// Creates a new iterator for the given vector.
    fn new(vector: &'a PersistentVector<T>) -> Self {
        if vector.is_empty() {
            return Self {
                vector,
                traversal_stack: Vec::new(),
                current_leaf: None,
                leaf_index: 0,
                state: IteratorState::Exhausted,
                tail_index: 0,
                elements_returned: 0,
            };
        }

        let tail_offset = vector.tail_offset();

        if tail_offset == 0 {
            // All elements are in the tail
            Self {
                vector,
                traversal_stack: Vec::new(),
                current_leaf: None,
                leaf_index: 0,
                state: IteratorState::ProcessingTail,
                tail_index: 0,
                elements_returned: 0,
            }
        } else {
            // Elements exist in the tree, start traversal from root
            let mut iterator = Self {
                vector,
                traversal_stack: Vec::with_capacity(7),
                current_leaf: None,
                leaf_index: 0,
                state: IteratorState::TraversingTree,
                tail_index: 0,
                elements_returned: 0,
            };
            iterator.initialize_from_root();
            iterator
        }
    }

    /// Pushes the root branch onto the stack and descends to the first
    /// leaf.
    fn initialize_from_root(&mut self) {
        match self.vector.root.as_ref() {
            Node::Branch(children) => {
                self.traversal_stack.push(TraversalStackEntry {
                    children: children.as_ref(),
                    child_index: 0,
                });
                self.descend_to_first_leaf();
            }
            Node::Leaf(elements) => {
                self.current_leaf = Some(elements.as_ref());
                self.leaf_index = 0;
            }
        }
    }

    /// Descends from the current stack top to the first leaf node,
    /// skipping empty slots.
    fn descend_to_first_leaf(&mut self) {
        loop {
            let stack_len = self.traversal_stack.len();
            if stack_len == 0 {
                break;
            }

            let entry = &mut self.traversal_stack[stack_len - 1];

            let mut found_branch: Option<
                &'a [Option<ReferenceCounter<Node<T>>>; BRANCHING_FACTOR],
            > = None;
            let mut found_leaf: Option<&'a [T]> = None;

            while entry.child_index < BRANCHING_FACTOR {
                let index = entry.child_index;
                entry.child_index += 1;

                if let Some(child) = &entry.children[index] {
                    match child.as_ref() {
                        Node::Branch(child_children) => {
                            found_branch = Some(child_children.as_ref());
                            break;
                        }
                        Node::Leaf(elements) => {
                            found_leaf = Some(elements.as_ref());
                            break;
                        }
                    }
                }
            }

            if let Some(leaf) = found_leaf {
                self.current_leaf = Some(leaf);
                self.leaf_index = 0;
                return;
            }

            if let Some(branch) = found_branch {
                self.traversal_stack.push(TraversalStackEntry {
                    children: branch,
                    child_index: 0,
                });
                continue;
            }

            // All children processed, pop this entry
            self.traversal_stack.pop();
        }
    }

    /// Advances to the next leaf node, transitioning to the tail when the
    /// tree is exhausted.
    fn advance_to_next_leaf(&mut self) {
        self.current_leaf = None;
        self.leaf_index = 0;

        self.descend_to_first_leaf();

        if self.current_leaf.is_none() {
            self.state = IteratorState::ProcessingTail;
            self.tail_index = 0;
        }
    }
}

impl<'a, T> Iterator for PersistentVectorIterator<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.state {
                IteratorState::TraversingTree => {
                    if let Some(leaf) = self.current_leaf {
                        if self.leaf_index < leaf.len() {
                            let element = &leaf[self.leaf_index];
                            self.leaf_index += 1;
                            self.elements_returned += 1;
                            return Some(element);
                        }
                        // Current leaf is exhausted, move to next leaf
                        self.advance_to_next_leaf();
                    } else {
                        self.state = IteratorState::ProcessingTail;
                        self.tail_index = 0;
                    }
                }
                IteratorState::ProcessingTail => {
                    if self.tail_index < self.vector.tail.len() {
                        let element = &self.vector.tail[self.tail_index];
                        self.tail_index += 1;
                        self.elements_returned += 1;
                        return Some(element);
                    }
                    // Tail is also exhausted
                    self.state = IteratorState::Exhausted;
                    return None;
                }
                IteratorState::Exhausted => {
                    return None;
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.vector.length.saturating_sub(self.elements_returned);
        (remaining, Some(remaining))
    }
}

impl<T> ExactSizeIterator for PersistentVectorIterator<'_, T> {
    fn len(&self) -> usize {
        self.vector.length.saturating_sub(self.elements_returned)
    }
}

/// A stack entry for tree traversal in the owning iterator.
///
/// Holds the node through the reference counter to avoid borrowing from
/// the consumed vector.
struct IntoIteratorStackEntry<T> {
    /// The branch node (held via reference counting)
    node: ReferenceCounter<Node<T>>,
    /// Index of the next child to process
    child_index: usize,
}

/// An owning iterator over elements of a [`PersistentVector`].
///
/// Elements are cloned out of the shared tree as they are returned.
pub struct PersistentVectorIntoIterator<T> {
    /// The original vector (for accessing the tail)
    vector: PersistentVector<T>,
    /// Stack for tree traversal
    traversal_stack: Vec<IntoIteratorStackEntry<T>>,
    /// Currently cached leaf node (held via reference counting)
    current_leaf: Option<ReferenceCounter<[T]>>,
    /// Current position within the cached leaf
    leaf_index: usize,
    /// Current processing state
    state: IteratorState,
    /// Current position within the tail buffer
    tail_index: usize,
    /// Number of elements already returned
    elements_returned: usize,
}

impl<T: Clone> PersistentVectorIntoIterator<T> {
    /// Creates a new owning iterator for the given vector.
    fn new(vector: PersistentVector<T>) -> Self {
        if vector.is_empty() {
            return Self {
                vector,
                traversal_stack: Vec::new(),
                current_leaf: None,
                leaf_index: 0,
                state: IteratorState::Exhausted,
                tail_index: 0,
                elements_returned: 0,
            };
        }

        let tail_offset = vector.tail_offset();

        if tail_offset == 0 {
            // All elements are in the tail
            Self {
                vector,
                traversal_stack: Vec::new(),
                current_leaf: None,
                leaf_index: 0,
                state: IteratorState::ProcessingTail,
                tail_index: 0,
                elements_returned: 0,
            }
        } else {
            // Elements exist in the tree
            let root_clone = vector.root.clone();
            let mut iterator = Self {
                vector,
                traversal_stack: Vec::with_capacity(7),
                current_leaf: None,
                leaf_index: 0,
                state: IteratorState::TraversingTree,
                tail_index: 0,
                elements_returned: 0,
            };
            iterator.initialize_from_root(root_clone);
            iterator
        }
    }

    /// Initializes the iterator from the root node.
    fn initialize_from_root(&mut self, root: ReferenceCounter<Node<T>>) {
        match root.as_ref() {
            Node::Branch(_) => {
                self.traversal_stack.push(IntoIteratorStackEntry {
                    node: root,
                    child_index: 0,
                });
                self.descend_to_first_leaf();
            }
            Node::Leaf(elements) => {
                self.current_leaf = Some(elements.clone());
                self.leaf_index = 0;
            }
        }
    }

    /// Descends from the current stack top to the first leaf node.
    fn descend_to_first_leaf(&mut self) {
        loop {
            let stack_len = self.traversal_stack.len();
            if stack_len == 0 {
                break;
            }

            let entry = &mut self.traversal_stack[stack_len - 1];

            let children = match entry.node.as_ref() {
                Node::Branch(children) => children,
                Node::Leaf(_) => {
                    self.traversal_stack.pop();
                    continue;
                }
            };

            let mut found_branch: Option<ReferenceCounter<Node<T>>> = None;
            let mut found_leaf: Option<ReferenceCounter<[T]>> = None;

            while entry.child_index < BRANCHING_FACTOR {
                let index = entry.child_index;
                entry.child_index += 1;

                if let Some(child) = &children[index] {
                    match child.as_ref() {
                        Node::Branch(_) => {
                            found_branch = Some(child.clone());
                            break;
                        }
                        Node::Leaf(elements) => {
                            found_leaf = Some(elements.clone());
                            break;
                        }
                    }
                }
            }

            if let Some(leaf) = found_leaf {
                self.current_leaf = Some(leaf);
                self.leaf_index = 0;
                return;
            }

            if let Some(branch) = found_branch {
                self.traversal_stack.push(IntoIteratorStackEntry {
                    node: branch,
                    child_index: 0,
                });
                continue;
            }

            // All children processed, pop this entry
            self.traversal_stack.pop();
        }
    }

    /// Advances to the next leaf node.
    fn advance_to_next_leaf(&mut self) {
        self.current_leaf = None;
        self.leaf_index = 0;

        self.descend_to_first_leaf();

        if self.current_leaf.is_none() {
            self.state = IteratorState::ProcessingTail;
            self.tail_index = 0;
        }
    }
}

impl<T: Clone> Iterator for PersistentVectorIntoIterator<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.state {
                IteratorState::TraversingTree => {
                    if let Some(ref leaf) = self.current_leaf {
                        if self.leaf_index < leaf.len() {
                            let element = leaf[self.leaf_index].clone();
                            self.leaf_index += 1;
                            self.elements_returned += 1;
                            return Some(element);
                        }
                        self.advance_to_next_leaf();
                    } else {
                        self.state = IteratorState::ProcessingTail;
                        self.tail_index = 0;
                    }
                }
                IteratorState::ProcessingTail => {
                    if self.tail_index < self.vector.tail.len() {
                        let element = self.vector.tail[self.tail_index].clone();
                        self.tail_index += 1;
                        self.elements_returned += 1;
                        return Some(element);
                    }
                    self.state = IteratorState::Exhausted;
                    return None;
                }
                IteratorState::Exhausted => {
                    return None;
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.vector.length.saturating_sub(self.elements_returned);
        (remaining, Some(remaining))
    }
}

impl<T: Clone> ExactSizeIterator for PersistentVectorIntoIterator<T> {
    fn len(&self) -> usize {
        self.vector.length.saturating_sub(self.elements_returned)
    }
}

// =============================================================================
// Standard Trait Implementations
// =============================================================================

impl<T> Default for PersistentVector<T> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> FromIterator<T> for PersistentVector<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let elements: Vec<T> = iter.into_iter().collect();
        build_persistent_vector_from_vec(elements)
    }
}

impl<T: Clone> IntoIterator for PersistentVector<T> {
    type Item = T;
    type IntoIter = PersistentVectorIntoIterator<T>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        PersistentVectorIntoIterator::new(self)
    }
}

impl<'a, T> IntoIterator for &'a PersistentVector<T> {
    type Item = &'a T;
    type IntoIter = PersistentVectorIterator<'a, T>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: PartialEq> PartialEq for PersistentVector<T> {
    /// Order-dependent, element-wise equality.
    fn eq(&self, other: &Self) -> bool {
        if self.length != other.length {
            return false;
        }
        self.iter().zip(other.iter()).all(|(a, b)| a == b)
    }
}

impl<T: Eq> Eq for PersistentVector<T> {}

/// Computes a hash value for this vector.
///
/// The length is hashed first, then each element in insertion order, so
/// equal vectors hash equal and element order matters (unlike the set
/// engines' order-independent hash).
impl<T: Hash> Hash for PersistentVector<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.length.hash(state);
        for element in self {
            element.hash(state);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for PersistentVector<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_list().entries(self.iter()).finish()
    }
}

impl<T: fmt::Display> fmt::Display for PersistentVector<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "[")?;
        let mut first = true;
        for element in self {
            if first {
                first = false;
            } else {
                write!(formatter, ", ")?;
            }
            write!(formatter, "{element}")?;
        }
        write!(formatter, "]")
    }
}

impl<T: Clone + PartialEq> PersistentSequence<T> for PersistentVector<T> {
    fn len(&self) -> usize {
        self.length
    }

    fn get(&self, index: usize) -> Option<&T> {
        Self::get(self, index)
    }

    fn push_back(&self, element: T) -> Self {
        Self::push_back(self, element)
    }

    fn index_of(&self, element: &T) -> Option<usize> {
        Self::index_of(self, element)
    }

    fn last_index_of(&self, element: &T) -> Option<usize> {
        Self::last_index_of(self, element)
    }
}

// =============================================================================
// Batch Construction
// =============================================================================

/// Builds a `PersistentVector` from a `Vec` in O(N): leaves are chunked
/// directly and branch levels assembled bottom-up, no per-push path copies.
fn build_persistent_vector_from_vec<T>(elements: Vec<T>) -> PersistentVector<T> {
    if elements.is_empty() {
        return PersistentVector::new();
    }

    let length = elements.len();

    // Small vectors live entirely in the tail
    if length <= BRANCHING_FACTOR {
        return PersistentVector {
            length,
            shift: BITS_PER_LEVEL,
            root: ReferenceCounter::new(Node::empty_branch()),
            tail: ReferenceCounter::from(elements),
        };
    }

    // The tail takes the trailing partial chunk, or a full chunk when the
    // length is an exact multiple
    let tail_size = length % BRANCHING_FACTOR;
    let tail_size = if tail_size == 0 {
        BRANCHING_FACTOR
    } else {
        tail_size
    };
    let root_size = length - tail_size;

    let mut elements = elements;
    let tail_elements = elements.split_off(root_size);
    let root_elements = elements;

    let (root, shift) = build_root_from_elements(root_elements);

    PersistentVector {
        length,
        shift,
        root,
        tail: ReferenceCounter::from(tail_elements),
    }
}

/// Builds the root tree from a vector of elements, bottom-up.
fn build_root_from_elements<T>(elements: Vec<T>) -> (ReferenceCounter<Node<T>>, usize) {
    if elements.is_empty() {
        return (ReferenceCounter::new(Node::empty_branch()), BITS_PER_LEVEL);
    }

    // Split into leaf chunks of BRANCHING_FACTOR
    let mut leaves: Vec<ReferenceCounter<Node<T>>> = Vec::new();
    let mut iter = elements.into_iter();

    loop {
        let chunk: Vec<T> = iter.by_ref().take(BRANCHING_FACTOR).collect();
        if chunk.is_empty() {
            break;
        }
        leaves.push(ReferenceCounter::new(Node::Leaf(ReferenceCounter::from(
            chunk,
        ))));
    }

    // A single leaf still needs a branch above it for the radix addressing
    if leaves.len() == 1 {
        let mut children: [Option<ReferenceCounter<Node<T>>>; BRANCHING_FACTOR] =
            std::array::from_fn(|_| None);
        children[0] = Some(leaves.remove(0));
        return (
            ReferenceCounter::new(Node::Branch(ReferenceCounter::new(children))),
            BITS_PER_LEVEL,
        );
    }

    // Build tree bottom-up
    let mut current_level = leaves;
    let mut shift = BITS_PER_LEVEL;

    while current_level.len() > BRANCHING_FACTOR {
        let mut next_level: Vec<ReferenceCounter<Node<T>>> = Vec::new();

        for chunk in current_level.chunks(BRANCHING_FACTOR) {
            let mut children: [Option<ReferenceCounter<Node<T>>>; BRANCHING_FACTOR] =
                std::array::from_fn(|_| None);
            for (index, node) in chunk.iter().enumerate() {
                children[index] = Some(node.clone());
            }
            next_level.push(ReferenceCounter::new(Node::Branch(ReferenceCounter::new(
                children,
            ))));
        }

        current_level = next_level;
        shift += BITS_PER_LEVEL;
    }

    // Wrap the remaining nodes in the root branch
    let mut root_children: [Option<ReferenceCounter<Node<T>>>; BRANCHING_FACTOR] =
        std::array::from_fn(|_| None);
    for (index, node) in current_level.into_iter().enumerate() {
        root_children[index] = Some(node);
    }

    (
        ReferenceCounter::new(Node::Branch(ReferenceCounter::new(root_children))),
        shift,
    )
}

// =============================================================================
// TransientVector Definition
// =============================================================================

/// A transient (temporarily mutable) vector for efficient batch appends.
///
/// `TransientVector` accumulates into a flat buffer and rebuilds the radix
/// tree once in [`persistent()`](Self::persistent) through the O(N) batch
/// constructor, instead of path-copying on every push. The result is
/// observably identical to folding [`PersistentVector::push_back`] over an
/// empty vector.
///
/// Like the other builders it is `!Send`/`!Sync` and consumed by
/// finalization; pushing after `persistent()` is a compile error.
///
/// # Examples
///
/// ```rust
/// use coppice::TransientVector;
///
/// let mut transient = TransientVector::new();
/// for value in 0..100 {
///     transient.push_back(value);
/// }
///
/// let vector = transient.persistent();
/// assert_eq!(vector.len(), 100);
/// assert_eq!(vector.get(99), Some(&99));
/// ```
pub struct TransientVector<T> {
    elements: Vec<T>,
    /// Marker to ensure `!Send` and `!Sync`.
    _marker: PhantomData<Rc<()>>,
}

static_assertions::assert_not_impl_any!(TransientVector<i32>: Send, Sync);
static_assertions::assert_not_impl_any!(TransientVector<String>: Send, Sync);

impl<T> TransientVector<T> {
    /// Creates a new empty `TransientVector`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            elements: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Returns the number of elements accumulated so far.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.elements.len()
    }

    /// Returns `true` if no elements have been accumulated.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Returns a reference to the element at the given index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.elements.get(index)
    }

    /// Appends an element to the back.
    pub fn push_back(&mut self, element: T) {
        self.elements.push(element);
    }

    /// Appends every element from an iterator.
    pub fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.elements.extend(iter);
    }
}

impl<T: Clone> TransientVector<T> {
    /// Finalizes this transient into a persistent vector.
    ///
    /// O(N) batch construction. The transient is consumed.
    #[must_use]
    pub fn persistent(self) -> PersistentVector<T> {
        build_persistent_vector_from_vec(self.elements)
    }
}

impl<T> Default for TransientVector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<T> for TransientVector<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            elements: iter.into_iter().collect(),
            _marker: PhantomData,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
