//! Property-style tests over randomized key multisets, per SPEC_FULL §8:
//! universal invariants 1-6 (round-trip, idempotent replace, delete
//! semantics, structural balance, no page leaks, search totality),
//! checked across many randomly generated sequences rather than one
//! fixed literal sequence. Uses the dependency-free PRNG in
//! `tests/common` rather than pulling in `proptest`/`quickcheck`.

mod common;

use common::{assert_distinct_and_matches, assert_no_leaks_and_balanced, random_key_multiset, Rng, FANOUT_U64};
use dc::index::IndexFile;
use std::collections::HashMap;
use tempfile::NamedTempFile;

fn new_index() -> (NamedTempFile, IndexFile) {
    let file = NamedTempFile::new().unwrap();
    let index = IndexFile::create_file_system_with_capacity(file.path(), 4096, 256).unwrap();
    (file, index)
}

/// Invariants 1, 3, 4, 5, 6: drive a randomized sequence of inserts and
/// removes against a `HashMap` model, checking structural balance and
/// page-leak freedom after every mutation, and the full reachable-key
/// set against the model at the end of each trial.
#[test]
fn property_random_sequences_maintain_all_invariants() {
    for seed in 0..25u64 {
        let mut rng = Rng::new(seed.wrapping_mul(2_654_435_761).wrapping_add(1));
        let (_file, index) = new_index();
        let mut model: HashMap<u64, u64> = HashMap::new();
        let universe = 4 * FANOUT_U64;
        let op_count = rng.below(10 * FANOUT_U64);

        for _ in 0..op_count {
            let key = rng.below(universe);
            if rng.below(2) == 0 {
                let value = rng.next_u64();
                let returned = index.insert(key, value).unwrap();
                let expected = model.insert(key, value);
                assert_eq!(returned, expected, "insert({}, {}) return value mismatch", key, value);
                // invariant 1: round-trip on insert-then-lookup
                assert_eq!(index.lookup(key).unwrap(), Some(value));
            } else {
                let returned = index.remove(key).unwrap();
                let expected = model.remove(&key);
                assert_eq!(returned, expected, "remove({}) return value mismatch", key);
                // invariant 3: delete semantics
                assert_eq!(index.lookup(key).unwrap(), None);
            }
            // invariants 4 (structural) and 5 (no page leaks), after every mutation
            assert_no_leaks_and_balanced(&index);
        }

        // invariant 3 (cont'd): keys never touched, or removed, are absent;
        // invariant 6: every key still in the model is found by search.
        for k in 0..universe {
            assert_eq!(index.lookup(k).unwrap(), model.get(&k).copied());
        }

        // invariant 4: the reachable key set has no duplicates and matches
        // the inserted-minus-deleted multiset exactly.
        let expected_keys: Vec<u64> = model.keys().copied().collect();
        assert_distinct_and_matches(&index, expected_keys);
    }
}

/// Invariant 2: `insert(k, v); insert(k, v)` returns `None` the first
/// time and `Some(v)` the second, with `lookup(k) == Some(v)` after —
/// over randomly chosen `(k, v)` pairs rather than one fixed pair.
#[test]
fn property_idempotent_replace() {
    for seed in 0..30u64 {
        let mut rng = Rng::new(seed.wrapping_mul(97).wrapping_add(13));
        let (_file, index) = new_index();
        let key = rng.below(10 * FANOUT_U64);
        let value = rng.next_u64();

        let first = index.insert(key, value).unwrap();
        assert_eq!(first, None);
        let second = index.insert(key, value).unwrap();
        assert_eq!(second, Some(value));
        assert_eq!(index.lookup(key).unwrap(), Some(value));
        assert_no_leaks_and_balanced(&index);
    }
}

/// Invariant 4 + 5, exercised specifically across tree growth and
/// shrinkage (splits, merges, borrows, and root collapse) by growing a
/// random multiset up to several times `FANOUT` and then deleting it
/// back down in a different random order.
#[test]
fn property_grow_then_shrink_stays_balanced_and_leak_free() {
    for seed in 0..15u64 {
        let mut rng = Rng::new(seed.wrapping_mul(1_000_003).wrapping_add(7));
        let (_file, index) = new_index();

        let universe = 8 * FANOUT_U64;
        let mut keys = random_key_multiset(&mut rng, universe);
        keys.sort_unstable();
        keys.dedup();

        for &k in &keys {
            index.insert(k, k).unwrap();
            assert_no_leaks_and_balanced(&index);
        }
        for i in 0..keys.len() {
            // Fisher-Yates-ish shuffle step, deterministic via the same rng.
            let j = rng.below((keys.len() - i) as u64) as usize + i;
            keys.swap(i, j);
        }
        for &k in &keys {
            assert_eq!(index.remove(k).unwrap(), Some(k));
            assert_no_leaks_and_balanced(&index);
        }

        for k in 0..universe {
            assert_eq!(index.lookup(k).unwrap(), None);
        }
    }
}
