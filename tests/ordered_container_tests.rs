#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Tests for the always-sorted container
//!
//! # Test Coverage
//!
//! - ascending order after every single insert, under each kind of rule
//! - first-in, first-out placement of ties
//! - batch insert equals a stable sort of existing ++ batch
//! - incomparable elements rejected without mutation
//! - indexed removal and its range check

use minicoap::ordered::{ByKey, ContainerError, OrderedContainer, OrderingRule};
use rand::{Rng, SeedableRng};
use std::cmp::Ordering;

fn assert_sorted<T, R: OrderingRule<T>>(c: &OrderedContainer<T, R>) {
    for (i, pair) in c.as_slice().windows(2).enumerate() {
        assert_ne!(
            c.rule().compare(&pair[0], &pair[1]),
            Some(Ordering::Greater),
            "elements {i} and {} out of order",
            i + 1
        );
    }
}

#[test]
fn test_random_inserts_stay_sorted() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    let mut c = OrderedContainer::natural();
    let mut reference = Vec::new();
    for _ in 0..500 {
        let v: i32 = rng.gen_range(-50..50);
        c.insert(v).unwrap();
        reference.push(v);
        assert_sorted(&c);
    }
    reference.sort();
    assert_eq!(c.to_vec(), reference);
}

#[test]
fn test_ties_keep_insertion_order_across_interleaving() {
    // (deadline, id): equal deadlines must come out in the order they went in
    let mut c = OrderedContainer::new(ByKey(|e: &(u64, u32)| e.0));
    let inserts = [(5, 1), (3, 2), (5, 3), (1, 4), (3, 5), (5, 6)];
    for e in inserts {
        c.insert(e).unwrap();
    }
    assert_eq!(
        c.to_vec(),
        vec![(1, 4), (3, 2), (3, 5), (5, 1), (5, 3), (5, 6)]
    );
}

#[test]
fn test_insert_into_empty_and_at_both_ends() {
    let mut c = OrderedContainer::natural();
    assert!(c.is_empty());
    assert_eq!(c.insert(5).unwrap(), 0);
    assert_eq!(c.insert(9).unwrap(), 1);
    assert_eq!(c.insert(1).unwrap(), 0);
    assert_eq!(c.first(), Some(&1));
    assert_eq!(c.len(), 3);
}

#[test]
fn test_batch_matches_stable_sort_of_concatenation() {
    let key = |e: &(u8, usize)| e.0;
    let mut rng = rand::rngs::StdRng::seed_from_u64(42);
    let existing: Vec<(u8, usize)> = (0..40).map(|i| (rng.gen_range(0..8), i)).collect();
    let batch: Vec<(u8, usize)> = (40..90).map(|i| (rng.gen_range(0..8), i)).collect();

    let mut c = OrderedContainer::new(ByKey(key));
    for e in &existing {
        c.insert(*e).unwrap();
    }
    c.insert_batch(batch.iter().copied()).unwrap();

    let mut expected: Vec<(u8, usize)> = existing.into_iter().chain(batch).collect();
    expected.sort_by_key(|e| e.0);
    assert_eq!(c.to_vec(), expected);
}

#[test]
fn test_from_batch_and_empty_batch() {
    let mut c = OrderedContainer::from_batch(ByKey(|s: &&str| s.len()), ["ccc", "a", "bb", "d"])
        .unwrap();
    assert_eq!(c.to_vec(), vec!["a", "d", "bb", "ccc"]);
    c.insert_batch(Vec::new()).unwrap();
    assert_eq!(c.len(), 4);
}

#[test]
fn test_incomparable_insert_is_rejected() {
    let mut c = OrderedContainer::natural();
    c.insert_batch([0.5_f64, 1.5, 2.5]).unwrap();
    let err = c.insert(f64::NAN).unwrap_err();
    assert!(matches!(err, ContainerError::Incomparable { .. }));
    assert_eq!(c.to_vec(), vec![0.5, 1.5, 2.5]);

    // A NaN cannot be compared with itself, so even an empty container refuses
    // it and stays open for later inserts
    let mut lone = OrderedContainer::natural();
    assert!(matches!(
        lone.insert(f64::NAN),
        Err(ContainerError::Incomparable { index: 0 })
    ));
    assert!(lone.is_empty());
    assert_eq!(lone.insert(1.0).unwrap(), 0);
    assert_eq!(lone.insert(2.0).unwrap(), 1);

    let mut batch = OrderedContainer::natural();
    assert!(batch.insert_batch([f64::NAN]).is_err());
    assert!(batch.is_empty());
    assert!(OrderedContainer::from_batch(minicoap::ordered::Natural, [f64::NAN]).is_err());
}

#[test]
fn test_from_batch_with_incomparable_fails() {
    let result = OrderedContainer::from_batch(minicoap::ordered::Natural, [1.0, f64::NAN, 0.0]);
    assert!(matches!(result, Err(ContainerError::Incomparable { .. })));
}

#[test]
fn test_remove_at_and_position() {
    let mut c = OrderedContainer::natural();
    c.insert_batch([4, 2, 8, 6]).unwrap();
    let idx = c.position(|v| *v == 6).unwrap();
    assert_eq!(c.remove_at(idx).unwrap(), 6);
    assert_eq!(c.to_vec(), vec![2, 4, 8]);

    assert_eq!(
        c.remove_at(3),
        Err(ContainerError::IndexOutOfRange { index: 3, len: 3 })
    );
    assert_eq!(c.get(5), None);
}

#[test]
fn test_iteration_is_ascending() {
    let mut c = OrderedContainer::new(|a: &u32, b: &u32| Some(a.cmp(b)));
    c.insert_batch([30, 10, 20]).unwrap();
    let seen: Vec<u32> = c.iter().copied().collect();
    assert_eq!(seen, vec![10, 20, 30]);
    let by_ref: Vec<&u32> = (&c).into_iter().collect();
    assert_eq!(by_ref, vec![&10, &20, &30]);
    c.clear();
    assert!(c.is_empty());
}
