//! Behavioral tests for `PersistentTreeSet`.
//!
//! Exercises the sorted set engine: natural and custom comparator ordering,
//! sorted iteration, range endpoints, persistence, and the transient
//! builder.

use coppice::{PersistentTreeSet, TransientTreeSet};
use rstest::rstest;

// =============================================================================
// Construction and Ordering
// =============================================================================

#[rstest]
fn test_new_creates_empty_set() {
    let set: PersistentTreeSet<i32> = PersistentTreeSet::new();
    assert!(set.is_empty());
    assert_eq!(set.len(), 0);
    assert_eq!(set.first(), None);
    assert_eq!(set.last(), None);
}

#[rstest]
fn test_iteration_is_sorted_regardless_of_insertion_order() {
    let set: PersistentTreeSet<i32> = [5, 1, 4, 2, 3].into_iter().collect();
    let collected: Vec<i32> = set.iter().copied().collect();

    assert_eq!(collected, vec![1, 2, 3, 4, 5]);
}

#[rstest]
fn test_custom_comparator_reverses_order() {
    let set = [1, 2, 3]
        .into_iter()
        .fold(
            PersistentTreeSet::with_comparator(|a: &i32, b: &i32| b.cmp(a)),
            |set, value| set.insert(value),
        );
    let collected: Vec<i32> = set.iter().copied().collect();

    assert_eq!(collected, vec![3, 2, 1]);
}

#[rstest]
fn test_sort_key_orders_by_projection() {
    let set = ["bb", "a", "cccc", "ddd"]
        .into_iter()
        .map(str::to_string)
        .fold(
            PersistentTreeSet::with_sort_key(String::len),
            |set, value| set.insert(value),
        );
    let collected: Vec<String> = set.iter().cloned().collect();

    assert_eq!(collected, vec!["a", "bb", "ddd", "cccc"]);
}

#[rstest]
fn test_derived_handles_inherit_the_comparator() {
    let descending = PersistentTreeSet::with_comparator(|a: &i32, b: &i32| b.cmp(a))
        .insert(1)
        .insert(2);
    let extended = descending.insert(3).remove(&1);
    let collected: Vec<i32> = extended.iter().copied().collect();

    assert_eq!(collected, vec![3, 2]);
}

// =============================================================================
// Membership and Endpoints
// =============================================================================

#[rstest]
fn test_contains_and_get() {
    let set: PersistentTreeSet<i32> = [1, 2, 3].into_iter().collect();

    assert!(set.contains(&2));
    assert!(!set.contains(&4));
    assert_eq!(set.get(&2), Some(&2));
    assert_eq!(set.get(&4), None);
}

#[rstest]
fn test_first_and_last_follow_the_comparator() {
    let ascending: PersistentTreeSet<i32> = [3, 1, 2].into_iter().collect();
    assert_eq!(ascending.first(), Some(&1));
    assert_eq!(ascending.last(), Some(&3));

    let descending = [3, 1, 2].into_iter().fold(
        PersistentTreeSet::with_comparator(|a: &i32, b: &i32| b.cmp(a)),
        |set, value| set.insert(value),
    );
    assert_eq!(descending.first(), Some(&3));
    assert_eq!(descending.last(), Some(&1));
}

// =============================================================================
// Insert and Remove
// =============================================================================

#[rstest]
fn test_insert_duplicate_keeps_length() {
    let set: PersistentTreeSet<i32> = [1, 2].into_iter().collect();
    let again = set.insert(2);

    assert_eq!(again.len(), 2);
}

#[rstest]
fn test_comparator_equal_insert_replaces_stored_element() {
    // Orders by string length, so "aa" and "bb" compare equal
    let set = PersistentTreeSet::with_sort_key(|s: &&str| s.len())
        .insert("aa")
        .insert("bb");

    assert_eq!(set.len(), 1);
    assert_eq!(set.get(&"aa"), Some(&"bb"));
}

#[rstest]
fn test_insert_does_not_modify_original() {
    let set: PersistentTreeSet<i32> = [1, 2].into_iter().collect();
    let extended = set.insert(3);

    assert_eq!(set.len(), 2);
    assert_eq!(extended.len(), 3);
}

#[rstest]
fn test_remove_existing_and_absent() {
    let set: PersistentTreeSet<i32> = [1, 2, 3].into_iter().collect();

    let removed = set.remove(&2);
    assert_eq!(removed.len(), 2);
    assert!(!removed.contains(&2));

    let unchanged = set.remove(&99);
    assert_eq!(unchanged, set);
}

#[rstest]
fn test_remove_down_to_empty_in_mixed_order() {
    let mut set: PersistentTreeSet<i32> = (0..200).collect();
    for value in (0..200).step_by(2).chain((1..200).step_by(2)) {
        set = set.remove(&value);
    }
    assert!(set.is_empty());
}

// =============================================================================
// Bulk Operations
// =============================================================================

#[rstest]
fn test_from_iter_collapses_duplicates() {
    let set: PersistentTreeSet<i32> = [1, 2, 2, 1, 3].into_iter().collect();
    assert_eq!(set.len(), 3);
}

#[rstest]
fn test_from_iter_matches_folded_inserts() {
    let collected: PersistentTreeSet<i32> = (0..500).rev().collect();
    let folded = (0..500).fold(PersistentTreeSet::new(), |set, value| set.insert(value));

    assert_eq!(collected, folded);
}

#[rstest]
fn test_large_bulk_built_set_supports_all_operations() {
    let set: PersistentTreeSet<i32> = (0..2000).rev().collect();

    assert_eq!(set.len(), 2000);
    assert_eq!(set.first(), Some(&0));
    assert_eq!(set.last(), Some(&1999));
    assert!(set.contains(&1234));

    let shrunk = set.remove(&1234).insert(5000);
    assert!(!shrunk.contains(&1234));
    assert_eq!(shrunk.last(), Some(&5000));
}

#[rstest]
fn test_insert_all_and_remove_all() {
    let set: PersistentTreeSet<i32> = (0..10).collect();
    let grown = set.insert_all(10..20);
    let shrunk = grown.remove_all(0..5);

    assert_eq!(grown.len(), 20);
    assert_eq!(shrunk.len(), 15);
    assert_eq!(shrunk.first(), Some(&5));
}

// =============================================================================
// Iteration
// =============================================================================

#[rstest]
fn test_into_iter_yields_sorted_owned_elements() {
    let set: PersistentTreeSet<i32> = [3, 1, 2].into_iter().collect();
    let collected: Vec<i32> = set.into_iter().collect();

    assert_eq!(collected, vec![1, 2, 3]);
}

#[rstest]
fn test_exhausted_iterator_keeps_returning_none() {
    let set: PersistentTreeSet<i32> = [1].into_iter().collect();
    let mut iterator = set.iter();

    assert!(iterator.next().is_some());
    assert!(iterator.next().is_none());
    assert!(iterator.next().is_none());
}

// =============================================================================
// Churn
// =============================================================================

#[rstest]
fn test_interleaved_insert_remove_matches_model() {
    use std::collections::BTreeSet;

    let mut set = PersistentTreeSet::new();
    let mut model = BTreeSet::new();

    for step in 0..4000u32 {
        let value = (step * 37) % 257;
        if step % 3 == 0 {
            set = set.remove(&value);
            model.remove(&value);
        } else {
            set = set.insert(value);
            model.insert(value);
        }
    }

    assert_eq!(set.len(), model.len());
    let collected: Vec<u32> = set.iter().copied().collect();
    let expected: Vec<u32> = model.iter().copied().collect();
    assert_eq!(collected, expected);
}

// =============================================================================
// Transient Builder
// =============================================================================

#[rstest]
fn test_transient_matches_folded_persistent_inserts() {
    let mut transient = TransientTreeSet::new();
    for value in (0..300).rev() {
        transient.insert(value);
    }
    let built = transient.persistent();

    let folded = (0..300).fold(PersistentTreeSet::new(), |set, value| set.insert(value));
    assert_eq!(built, folded);
}

#[rstest]
fn test_transient_with_comparator_keeps_custom_order() {
    let mut transient = TransientTreeSet::with_comparator(|a: &i32, b: &i32| b.cmp(a));
    transient.extend([1, 2, 3]);
    let set = transient.persistent();

    let collected: Vec<i32> = set.iter().copied().collect();
    assert_eq!(collected, vec![3, 2, 1]);
}

#[rstest]
fn test_transient_insert_and_remove_report_membership_change() {
    let mut transient: TransientTreeSet<i32> = TransientTreeSet::new();

    assert!(transient.insert(1));
    assert!(!transient.insert(1));
    assert!(transient.remove(&1));
    assert!(!transient.remove(&1));
}
