//! Shared capability surfaces for the persistent collection engines.
//!
//! The engines in this crate are independent types with independent
//! internals. These traits name the operation surface they have in common,
//! so generic code can accept "any persistent set" or "any persistent
//! sequence" without caring which engine backs it.

use std::hash::{Hash, Hasher};

use crate::hash_set::{PersistentHashSet, compute_hash};
use crate::tree_set::PersistentTreeSet;

// =============================================================================
// PersistentSet
// =============================================================================

/// The common operation surface of the persistent set engines.
///
/// Implemented by [`PersistentHashSet`] and [`PersistentTreeSet`]. Every
/// mutating operation returns a new handle; the receiver is never changed.
///
/// # Examples
///
/// ```rust
/// use coppice::{PersistentHashSet, PersistentSet};
///
/// fn frequencies<S: PersistentSet<i32> + Default>(values: &[i32]) -> S {
///     values.iter().fold(S::default(), |set, value| set.insert(*value))
/// }
///
/// let set: PersistentHashSet<i32> = frequencies(&[1, 2, 2, 3]);
/// assert_eq!(set.len(), 3);
/// ```
pub trait PersistentSet<T>: Sized {
    /// Returns the number of elements in the set.
    fn len(&self) -> usize;

    /// Returns `true` if the set contains no elements.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if the set contains an element equal to the argument.
    fn contains(&self, element: &T) -> bool;

    /// Returns a new set with the element added.
    #[must_use]
    fn insert(&self, element: T) -> Self;

    /// Returns a new set with the element removed.
    #[must_use]
    fn remove(&self, element: &T) -> Self;

    /// Returns a new set with every element of the iterator added.
    #[must_use]
    fn insert_all<I: IntoIterator<Item = T>>(&self, elements: I) -> Self;

    /// Returns a new set with every element of the iterator removed.
    #[must_use]
    fn remove_all<I: IntoIterator<Item = T>>(&self, elements: I) -> Self;
}

// =============================================================================
// PersistentSequence
// =============================================================================

/// The common operation surface of persistent sequences.
///
/// Implemented by [`crate::PersistentVector`]. Sequences preserve insertion
/// order and duplicates; every position holds exactly the element that was
/// pushed or updated there.
pub trait PersistentSequence<T>: Sized {
    /// Returns the number of elements in the sequence.
    fn len(&self) -> usize;

    /// Returns `true` if the sequence contains no elements.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a reference to the element at the given index, or `None`
    /// when the index is out of bounds.
    fn get(&self, index: usize) -> Option<&T>;

    /// Returns a new sequence with the element appended.
    #[must_use]
    fn push_back(&self, element: T) -> Self;

    /// Returns the index of the first element equal to the argument.
    fn index_of(&self, element: &T) -> Option<usize>;

    /// Returns the index of the last element equal to the argument.
    fn last_index_of(&self, element: &T) -> Option<usize>;
}

// =============================================================================
// Order-independent set hashing
// =============================================================================

/// Hashes a set's contents independent of iteration order.
///
/// Writes the length, then the wrapping sum of each element's trie hash.
/// Addition commutes, so two sets holding equal elements hash equal no
/// matter which engine produced them or how their internal layout orders
/// iteration. Both set engines route their `Hash` impls through this
/// helper, keeping `Hash` consistent with the cross-engine `PartialEq`
/// below.
pub(crate) fn unordered_set_hash<'a, T, I, H>(elements: I, length: usize, state: &mut H)
where
    T: Hash + 'a,
    I: Iterator<Item = &'a T>,
    H: Hasher,
{
    length.hash(state);

    let mut accumulator: u64 = 0;
    for element in elements {
        accumulator = accumulator.wrapping_add(compute_hash(element));
    }
    accumulator.hash(state);
}

// =============================================================================
// Cross-Engine Equality
// =============================================================================

/// Equality between the hash and tree set engines.
///
/// Two sets are equal when they have the same length and each contains
/// every element of the other. Both directions are checked because the
/// engines may disagree on element equivalence: the hash engine uses `Eq`
/// while the tree engine uses its comparator.
impl<T: Hash + Eq + Clone> PartialEq<PersistentTreeSet<T>> for PersistentHashSet<T> {
    fn eq(&self, other: &PersistentTreeSet<T>) -> bool {
        self.len() == other.len()
            && self.iter().all(|element| other.contains(element))
            && other.iter().all(|element| self.contains(element))
    }
}

impl<T: Hash + Eq + Clone> PartialEq<PersistentHashSet<T>> for PersistentTreeSet<T> {
    fn eq(&self, other: &PersistentHashSet<T>) -> bool {
        other == self
    }
}

// =============================================================================
// Tests
// =============================================================================
