//! Property-based tests for `PersistentVector` laws.
//!
//! Verifies sequence semantics against `Vec` as a model: exact order and
//! duplicate preservation, index addressing, positional search, and
//! persistence.

use coppice::PersistentVector;
use proptest::prelude::*;

// =============================================================================
// Model Agreement Law
// Description: Contents and order always agree with Vec
// =============================================================================

proptest! {
    #[test]
    fn prop_model_agreement_law(elements in prop::collection::vec(any::<i32>(), 0..300)) {
        let vector: PersistentVector<i32> = elements.iter().copied().collect();

        prop_assert_eq!(vector.len(), elements.len());
        for (index, element) in elements.iter().enumerate() {
            prop_assert_eq!(vector.get(index), Some(element));
        }
        prop_assert_eq!(vector.get(elements.len()), None);

        let collected: Vec<i32> = vector.iter().copied().collect();
        prop_assert_eq!(collected, elements);
    }
}

// =============================================================================
// Positional Search Law
// Description: index_of / last_index_of match the Vec position scans
// =============================================================================

proptest! {
    #[test]
    fn prop_positional_search_law(
        elements in prop::collection::vec(0i32..10, 0..100),
        needle in 0i32..10
    ) {
        let vector: PersistentVector<i32> = elements.iter().copied().collect();

        let expected_first = elements.iter().position(|element| *element == needle);
        let expected_last = elements.iter().rposition(|element| *element == needle);

        prop_assert_eq!(vector.index_of(&needle), expected_first);
        prop_assert_eq!(vector.last_index_of(&needle), expected_last);
    }
}

// =============================================================================
// Push-Pop Inverse Law
// Description: pop_back undoes push_back exactly
// =============================================================================

proptest! {
    #[test]
    fn prop_push_pop_inverse_law(
        elements in prop::collection::vec(any::<i32>(), 0..100),
        extra: i32
    ) {
        let vector: PersistentVector<i32> = elements.into_iter().collect();
        let pushed = vector.push_back(extra);
        let (popped, element) = pushed.pop_back().unwrap();

        prop_assert_eq!(element, extra);
        prop_assert_eq!(popped, vector);
    }
}

// =============================================================================
// Update Law
// Description: update changes exactly one index and preserves the rest
// =============================================================================

proptest! {
    #[test]
    fn prop_update_law(
        elements in prop::collection::vec(any::<i32>(), 1..200),
        index_seed: usize,
        replacement: i32
    ) {
        let index = index_seed % elements.len();
        let vector: PersistentVector<i32> = elements.iter().copied().collect();
        let updated = vector.update(index, replacement).unwrap();

        prop_assert_eq!(updated.get(index), Some(&replacement));
        prop_assert_eq!(updated.len(), vector.len());
        for (position, element) in elements.iter().enumerate() {
            if position != index {
                prop_assert_eq!(updated.get(position), Some(element));
            }
        }
        prop_assert_eq!(vector.get(index), Some(&elements[index]));
    }
}

// =============================================================================
// Persistence Law
// Description: Deriving new handles never changes an existing handle
// =============================================================================

proptest! {
    #[test]
    fn prop_persistence_law(
        elements in prop::collection::vec(any::<i32>(), 0..100),
        additions in prop::collection::vec(any::<i32>(), 0..100)
    ) {
        let original: PersistentVector<i32> = elements.iter().copied().collect();
        let snapshot: Vec<i32> = original.iter().copied().collect();

        let mut derived = original.clone();
        for addition in additions {
            derived = derived.push_back(addition);
        }

        let after: Vec<i32> = original.iter().copied().collect();
        prop_assert_eq!(snapshot, after);
    }
}

// =============================================================================
// Batch-Build Equivalence Law
// Description: The bottom-up builder equals folding single pushes
// =============================================================================

proptest! {
    #[test]
    fn prop_batch_build_equivalence_law(elements in prop::collection::vec(any::<i32>(), 0..300)) {
        let built: PersistentVector<i32> = elements.iter().copied().collect();
        let folded = elements.iter().fold(PersistentVector::new(), |vector, element| {
            vector.push_back(*element)
        });

        prop_assert_eq!(built, folded);
    }
}

// =============================================================================
// Transient Equivalence Law
// Description: Builder output equals folding the persistent operations
// =============================================================================

proptest! {
    #[test]
    fn prop_transient_equivalence_law(elements in prop::collection::vec(any::<i32>(), 0..200)) {
        let folded = elements.iter().fold(PersistentVector::new(), |vector, element| {
            vector.push_back(*element)
        });

        let mut transient = PersistentVector::new().transient();
        for element in &elements {
            transient.push_back(*element);
        }

        prop_assert_eq!(transient.persistent(), folded);
    }
}
