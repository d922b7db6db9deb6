//! Behavioral tests for `PersistentHashSet`.
//!
//! Exercises the full public surface of the hash trie engine: construction,
//! membership, persistence under derived handles, set algebra, iteration,
//! and the transient builder.

use coppice::{PersistentHashSet, TransientHashSet};
use rstest::rstest;

// =============================================================================
// Construction
// =============================================================================

#[rstest]
fn test_new_creates_empty_set() {
    let set: PersistentHashSet<i32> = PersistentHashSet::new();
    assert!(set.is_empty());
    assert_eq!(set.len(), 0);
}

#[rstest]
fn test_default_creates_empty_set() {
    let set: PersistentHashSet<i32> = PersistentHashSet::default();
    assert!(set.is_empty());
}

#[rstest]
fn test_singleton_creates_single_element_set() {
    let set = PersistentHashSet::singleton(42);
    assert_eq!(set.len(), 1);
    assert!(set.contains(&42));
}

// =============================================================================
// Insert and Contains
// =============================================================================

#[rstest]
fn test_insert_multiple_elements() {
    let set = PersistentHashSet::new().insert(1).insert(2).insert(3);

    assert_eq!(set.len(), 3);
    assert!(set.contains(&1));
    assert!(set.contains(&2));
    assert!(set.contains(&3));
    assert!(!set.contains(&4));
}

#[rstest]
fn test_insert_duplicate_does_not_increase_length() {
    let set1 = PersistentHashSet::new().insert(42);
    let set2 = set1.insert(42);

    assert_eq!(set1.len(), 1);
    assert_eq!(set2.len(), 1);
}

#[rstest]
fn test_insert_does_not_modify_original() {
    let set1 = PersistentHashSet::new().insert(1);
    let set2 = set1.insert(2);

    assert_eq!(set1.len(), 1);
    assert!(!set1.contains(&2));
    assert_eq!(set2.len(), 2);
    assert!(set2.contains(&1));
    assert!(set2.contains(&2));
}

#[rstest]
fn test_contains_with_borrowed_form() {
    let set = PersistentHashSet::new()
        .insert("hello".to_string())
        .insert("world".to_string());

    // &str looks up String entries
    assert!(set.contains("hello"));
    assert!(set.contains("world"));
    assert!(!set.contains("other"));
}

// =============================================================================
// Remove
// =============================================================================

#[rstest]
fn test_remove_existing_element() {
    let set = PersistentHashSet::new().insert(1).insert(2).insert(3);
    let removed = set.remove(&2);

    assert_eq!(removed.len(), 2);
    assert!(!removed.contains(&2));
    assert!(removed.contains(&1));
    assert!(removed.contains(&3));
}

#[rstest]
fn test_remove_absent_element_returns_equal_set() {
    let set = PersistentHashSet::new().insert(1).insert(2);
    let removed = set.remove(&99);

    assert_eq!(removed, set);
}

#[rstest]
fn test_remove_does_not_modify_original() {
    let set = PersistentHashSet::new().insert(1).insert(2);
    let removed = set.remove(&1);

    assert!(set.contains(&1));
    assert!(!removed.contains(&1));
}

#[rstest]
fn test_remove_down_to_empty() {
    let mut set: PersistentHashSet<i32> = (0..100).collect();
    for value in 0..100 {
        set = set.remove(&value);
    }
    assert!(set.is_empty());
}

// =============================================================================
// Set Algebra
// =============================================================================

#[rstest]
fn test_union_combines_elements() {
    let left: PersistentHashSet<i32> = [1, 2, 3].into_iter().collect();
    let right: PersistentHashSet<i32> = [3, 4, 5].into_iter().collect();

    let union = left.union(&right);
    let expected: PersistentHashSet<i32> = [1, 2, 3, 4, 5].into_iter().collect();
    assert_eq!(union, expected);
}

#[rstest]
fn test_intersection_keeps_common_elements() {
    let left: PersistentHashSet<i32> = [1, 2, 3].into_iter().collect();
    let right: PersistentHashSet<i32> = [2, 3, 4].into_iter().collect();

    let intersection = left.intersection(&right);
    let expected: PersistentHashSet<i32> = [2, 3].into_iter().collect();
    assert_eq!(intersection, expected);
}

#[rstest]
fn test_difference_removes_right_elements() {
    let left: PersistentHashSet<i32> = [1, 2, 3].into_iter().collect();
    let right: PersistentHashSet<i32> = [2, 3, 4].into_iter().collect();

    let difference = left.difference(&right);
    let expected: PersistentHashSet<i32> = [1].into_iter().collect();
    assert_eq!(difference, expected);
}

#[rstest]
fn test_symmetric_difference_keeps_exclusive_elements() {
    let left: PersistentHashSet<i32> = [1, 2, 3].into_iter().collect();
    let right: PersistentHashSet<i32> = [2, 3, 4].into_iter().collect();

    let symmetric = left.symmetric_difference(&right);
    let expected: PersistentHashSet<i32> = [1, 4].into_iter().collect();
    assert_eq!(symmetric, expected);
}

#[rstest]
fn test_subset_superset_disjoint() {
    let small: PersistentHashSet<i32> = [1, 2].into_iter().collect();
    let large: PersistentHashSet<i32> = [1, 2, 3].into_iter().collect();
    let other: PersistentHashSet<i32> = [8, 9].into_iter().collect();

    assert!(small.is_subset(&large));
    assert!(large.is_superset(&small));
    assert!(!large.is_subset(&small));
    assert!(small.is_disjoint(&other));
    assert!(!small.is_disjoint(&large));
}

// =============================================================================
// Bulk Operations
// =============================================================================

#[rstest]
fn test_insert_all_matches_folded_inserts() {
    let base: PersistentHashSet<i32> = [1, 2].into_iter().collect();
    let bulk = base.insert_all(3..10);
    let folded = (3..10).fold(base, |set, value| set.insert(value));

    assert_eq!(bulk, folded);
}

#[rstest]
fn test_remove_all_removes_every_named_element() {
    let set: PersistentHashSet<i32> = (0..20).collect();
    let removed = set.remove_all(0..10);

    assert_eq!(removed.len(), 10);
    assert!(!removed.contains(&5));
    assert!(removed.contains(&15));
}

// =============================================================================
// Iteration
// =============================================================================

#[rstest]
fn test_iter_visits_every_element_once() {
    let set: PersistentHashSet<i32> = (0..500).collect();
    let mut seen: Vec<i32> = set.iter().copied().collect();
    seen.sort_unstable();

    assert_eq!(seen, (0..500).collect::<Vec<_>>());
}

#[rstest]
fn test_iter_order_is_stable_across_runs() {
    let set: PersistentHashSet<i32> = (0..100).collect();
    let first: Vec<i32> = set.iter().copied().collect();
    let second: Vec<i32> = set.iter().copied().collect();

    assert_eq!(first, second);
}

#[rstest]
fn test_into_iter_yields_same_elements_as_iter() {
    let set: PersistentHashSet<i32> = (0..100).collect();
    let mut borrowed: Vec<i32> = set.iter().copied().collect();
    let mut owned: Vec<i32> = set.into_iter().collect();
    borrowed.sort_unstable();
    owned.sort_unstable();

    assert_eq!(borrowed, owned);
}

#[rstest]
fn test_exhausted_iterator_keeps_returning_none() {
    let set: PersistentHashSet<i32> = [1].into_iter().collect();
    let mut iterator = set.iter();

    assert!(iterator.next().is_some());
    assert!(iterator.next().is_none());
    assert!(iterator.next().is_none());
}

// =============================================================================
// Transient Builder
// =============================================================================

#[rstest]
fn test_transient_matches_folded_persistent_inserts() {
    let mut transient = TransientHashSet::new();
    for value in 0..1000 {
        transient.insert(value);
    }
    let built = transient.persistent();

    let folded: PersistentHashSet<i32> =
        (0..1000).fold(PersistentHashSet::new(), |set, value| set.insert(value));

    assert_eq!(built, folded);
}

#[rstest]
fn test_transient_does_not_disturb_source_handle() {
    let source: PersistentHashSet<i32> = (0..100).collect();
    let mut transient = source.clone().transient();
    for value in 100..200 {
        transient.insert(value);
    }
    for value in 0..50 {
        transient.remove(&value);
    }
    let derived = transient.persistent();

    assert_eq!(source.len(), 100);
    assert!(source.contains(&0));
    assert_eq!(derived.len(), 150);
    assert!(!derived.contains(&0));
    assert!(derived.contains(&150));
}

#[rstest]
fn test_transient_insert_and_remove_report_membership_change() {
    let mut transient: TransientHashSet<i32> = TransientHashSet::new();

    assert!(transient.insert(1));
    assert!(!transient.insert(1));
    assert!(transient.remove(&1));
    assert!(!transient.remove(&1));
}
