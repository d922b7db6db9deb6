//! Property-based tests for `PersistentTreeSet` laws.
//!
//! Verifies sorted-set semantics against the standard library's `BTreeSet`
//! as a model, plus ordering and persistence invariants.

use std::collections::BTreeSet;

use coppice::PersistentTreeSet;
use proptest::prelude::*;

// =============================================================================
// Insert-Contains Law
// Description: An inserted element is always contained in the result
// =============================================================================

proptest! {
    #[test]
    fn prop_insert_contains_law(
        elements in prop::collection::vec(any::<i32>(), 0..50),
        new_element: i32
    ) {
        let set: PersistentTreeSet<i32> = elements.into_iter().collect();
        let with_element = set.insert(new_element);

        prop_assert!(with_element.contains(&new_element));
    }
}

// =============================================================================
// Remove-Contains Law
// Description: A removed element is never contained in the result
// =============================================================================

proptest! {
    #[test]
    fn prop_remove_contains_law(
        elements in prop::collection::vec(any::<i32>(), 0..50),
        element_to_remove: i32
    ) {
        let set: PersistentTreeSet<i32> = elements.into_iter().collect();
        let without_element = set.remove(&element_to_remove);

        prop_assert!(!without_element.contains(&element_to_remove));
    }
}

// =============================================================================
// Sorted Iteration Law
// Description: Iteration always yields strictly ascending elements
// =============================================================================

proptest! {
    #[test]
    fn prop_sorted_iteration_law(elements in prop::collection::vec(any::<i32>(), 0..100)) {
        let set: PersistentTreeSet<i32> = elements.into_iter().collect();
        let collected: Vec<i32> = set.iter().copied().collect();

        for window in collected.windows(2) {
            prop_assert!(window[0] < window[1]);
        }
    }
}

// =============================================================================
// Model Agreement Law
// Description: Contents, endpoints, and length agree with std BTreeSet
// =============================================================================

proptest! {
    #[test]
    fn prop_model_agreement_law(elements in prop::collection::vec(any::<i16>(), 0..200)) {
        let set: PersistentTreeSet<i16> = elements.iter().copied().collect();
        let model: BTreeSet<i16> = elements.iter().copied().collect();

        prop_assert_eq!(set.len(), model.len());
        prop_assert_eq!(set.first(), model.first());
        prop_assert_eq!(set.last(), model.last());

        let collected: Vec<i16> = set.iter().copied().collect();
        let expected: Vec<i16> = model.iter().copied().collect();
        prop_assert_eq!(collected, expected);
    }
}

// =============================================================================
// Persistence Law
// Description: Deriving new handles never changes an existing handle
// =============================================================================

proptest! {
    #[test]
    fn prop_persistence_law(
        elements in prop::collection::vec(any::<i32>(), 0..50),
        operations in prop::collection::vec(any::<i32>(), 0..50)
    ) {
        let original: PersistentTreeSet<i32> = elements.iter().copied().collect();
        let snapshot: Vec<i32> = original.iter().copied().collect();

        let mut derived = original.clone();
        for operation in operations {
            derived = if operation % 2 == 0 {
                derived.insert(operation)
            } else {
                derived.remove(&operation)
            };
        }

        let after: Vec<i32> = original.iter().copied().collect();
        prop_assert_eq!(snapshot, after);
    }
}

// =============================================================================
// Bulk-Build Equivalence Law
// Description: The balanced bulk build equals folding single inserts
// =============================================================================

proptest! {
    #[test]
    fn prop_bulk_build_equivalence_law(elements in prop::collection::vec(any::<i32>(), 0..150)) {
        let collected: PersistentTreeSet<i32> = elements.iter().copied().collect();
        let folded = elements
            .iter()
            .fold(PersistentTreeSet::new(), |set, element| set.insert(*element));

        prop_assert_eq!(collected, folded);
    }
}

// =============================================================================
// Custom Comparator Law
// Description: A reversed comparator yields exactly reversed iteration
// =============================================================================

proptest! {
    #[test]
    fn prop_reversed_comparator_law(elements in prop::collection::vec(any::<i32>(), 0..80)) {
        let ascending: PersistentTreeSet<i32> = elements.iter().copied().collect();
        let descending = elements.iter().fold(
            PersistentTreeSet::with_comparator(|a: &i32, b: &i32| b.cmp(a)),
            |set, element| set.insert(*element),
        );

        let forward: Vec<i32> = ascending.iter().copied().collect();
        let mut backward: Vec<i32> = descending.iter().copied().collect();
        backward.reverse();

        prop_assert_eq!(forward, backward);
    }
}

// =============================================================================
// Transient Equivalence Law
// Description: Builder output equals folding the persistent operations
// =============================================================================

proptest! {
    #[test]
    fn prop_transient_equivalence_law(elements in prop::collection::vec(any::<i32>(), 0..100)) {
        let folded = elements
            .iter()
            .fold(PersistentTreeSet::new(), |set, element| set.insert(*element));

        let mut transient = PersistentTreeSet::new().transient();
        for element in &elements {
            transient.insert(*element);
        }

        prop_assert_eq!(transient.persistent(), folded);
    }
}
