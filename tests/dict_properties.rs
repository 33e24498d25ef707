// Dict behaviour over sequences of dictionary operations.
//
// Each property drives a Dict with NativeOps and checks the ordering and
// counting rules a dict must keep: insertion order, in-place updates,
// end-of-order reinsertion, independent copies and correct contents after
// heavy deletion.
use core::hash::BuildHasher;

use compact_dict::Dict;
use compact_dict::DictError;
use compact_dict::NativeOps;
use proptest::prelude::*;
use siphasher::sip::SipHasher;

#[derive(Clone, Default)]
struct FixedSip;

impl BuildHasher for FixedSip {
    type Hasher = SipHasher;

    fn build_hasher(&self) -> SipHasher {
        SipHasher::new_with_keys(7, 11)
    }
}

type TestDict<K, V> = Dict<K, V, NativeOps<FixedSip>>;

fn distinct(keys: Vec<u32>) -> Vec<u32> {
    let mut seen = Vec::new();
    for k in keys {
        if !seen.contains(&k) {
            seen.push(k);
        }
    }
    seen
}

proptest! {
    #[test]
    fn prop_order_preserved(keys in proptest::collection::vec(any::<u32>(), 0..300)) {
        let keys = distinct(keys);
        let dict: TestDict<u32, u32> = Dict::new();
        for &k in &keys {
            dict.set(k, k.wrapping_mul(3)).unwrap();
        }
        let expected: Vec<(u32, u32)> = keys.iter().map(|&k| (k, k.wrapping_mul(3))).collect();
        prop_assert_eq!(dict.items(), expected);
    }

    #[test]
    fn prop_update_in_place(
        keys in proptest::collection::vec(any::<u32>(), 1..200),
        pick in any::<prop::sample::Index>(),
    ) {
        let keys = distinct(keys);
        let dict: TestDict<u32, i64> = Dict::new();
        for &k in &keys {
            dict.set(k, 0).unwrap();
        }
        let target = keys[pick.index(keys.len())];
        dict.set(target, -1).unwrap();
        prop_assert_eq!(dict.keys(), keys.clone());
        prop_assert_eq!(dict.get(&target), Ok(-1));
    }

    #[test]
    fn prop_reinsert_goes_last(
        keys in proptest::collection::vec(any::<u32>(), 1..200),
        pick in any::<prop::sample::Index>(),
    ) {
        let keys = distinct(keys);
        let dict: TestDict<u32, u32> = Dict::new();
        for &k in &keys {
            dict.set(k, k).unwrap();
        }
        let target = keys[pick.index(keys.len())];
        dict.delete(&target).unwrap();
        dict.set(target, 0).unwrap();
        prop_assert_eq!(dict.keys().last().copied(), Some(target));
        prop_assert_eq!(dict.len(), keys.len());
    }

    #[test]
    fn prop_copy_round_trip(
        keys in proptest::collection::vec(any::<u32>(), 0..200),
        extra in any::<u32>(),
    ) {
        let dict: TestDict<u32, u32> = Dict::new();
        for &k in &keys {
            dict.set(k, k).unwrap();
        }
        let before = dict.items();
        let copy = dict.copy();
        prop_assert_eq!(copy.items(), before.clone());

        copy.set(extra, u32::MAX).unwrap();
        let _ = copy.popitem_first();
        copy.clear();
        prop_assert_eq!(dict.items(), before);
    }

    #[test]
    fn prop_absent_delete_always_fails(
        keys in proptest::collection::vec(0u32..50, 0..100),
        probe in 50u32..100,
    ) {
        let dict: TestDict<u32, u32> = Dict::new();
        for &k in &keys {
            dict.set(k, k).unwrap();
            if k % 3 == 0 {
                dict.delete(&k).unwrap();
            }
        }
        prop_assert_eq!(dict.delete(&probe), Err(DictError::KeyNotFound));
    }

    #[test]
    fn prop_capacity_invariant(keys in proptest::collection::vec(any::<u64>(), 0..2000)) {
        let dict: TestDict<u64, usize> = Dict::new();
        let mut last = std::collections::HashMap::new();
        for (i, &k) in keys.iter().enumerate() {
            dict.set(k, i).unwrap();
            last.insert(k, i);
        }
        prop_assert_eq!(dict.len(), last.len());
        for (k, v) in last {
            prop_assert_eq!(dict.get(&k), Ok(v));
        }
    }
}

#[test]
fn compaction_keeps_contents_exact() {
    const N: u64 = 5000;
    let dict: TestDict<u64, u64> = Dict::new();
    for k in 0..N {
        dict.set(k, k * 2).unwrap();
    }
    for k in (0..N).step_by(2) {
        dict.delete(&k).unwrap();
    }
    for k in N..2 * N {
        dict.set(k, k * 2).unwrap();
    }

    assert_eq!(dict.len() as u64, N / 2 + N);
    let expected: Vec<u64> = (0..N).filter(|k| k % 2 == 1).chain(N..2 * N).collect();
    assert_eq!(dict.keys(), expected);
    for k in 0..2 * N {
        let present = k >= N || k % 2 == 1;
        assert_eq!(dict.contains(&k), Ok(present));
        if present {
            assert_eq!(dict.get(&k), Ok(k * 2));
        }
    }
    let tombstones = dict.with_table(|table| table.ever_used() - table.len());
    assert!(tombstones < N as usize);
}

#[test]
fn popitem_drains_in_reverse() {
    let dict: TestDict<u32, u32> = Dict::new();
    for k in 0..100 {
        dict.set(k, k).unwrap();
    }
    for k in (0..100).step_by(7) {
        dict.delete(&k).unwrap();
    }
    let mut popped = Vec::new();
    while let Ok((k, _)) = dict.popitem() {
        popped.push(k);
    }
    let expected: Vec<u32> = (0..100).rev().filter(|k| k % 7 != 0).collect();
    assert_eq!(popped, expected);
    assert!(dict.is_empty());
}

#[test]
fn precomputed_hashes_match_ops() {
    use compact_dict::KeyOps;

    let dict: TestDict<String, u32> = Dict::new();
    let key = String::from("shared");
    let hash = dict.ops().hash(&key).unwrap();
    dict.set_with_hash(key.clone(), hash, 1).unwrap();
    assert_eq!(dict.get(&key), Ok(1));
    assert_eq!(dict.contains_with_hash(&key, hash), Ok(true));
    assert_eq!(dict.setdefault_with_hash(key.clone(), hash, 9), Ok(1));
    dict.move_to_end_with_hash(&key, hash, false).unwrap();
    assert_eq!(dict.pop_with_hash(&key, hash), Ok(1));
    assert_eq!(dict.delete_with_hash(&key, hash), Err(DictError::KeyNotFound));
}
