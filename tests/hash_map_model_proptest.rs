// HashMap against a naive ordered model.
//
// Model: Vec<(key, value)> in iteration order.
//  - insert overwrites in place or appends.
//  - remove / pop_* delete from the Vec.
//  - move_to_end / move_to_first relocate one pair.
// After every operation the map's iteration order, len, first/last and
// lookups of the touched key must match the model. Runs once with a good
// hasher and once with a hasher that folds everything into 16 buckets, so
// long probe chains, compaction and index rebuilds are all exercised.
use core::hash::BuildHasher;
use core::hash::Hasher;

use compact_dict::HashMap;
use proptest::prelude::*;
use siphasher::sip::SipHasher;

#[derive(Clone, Default, PartialEq)]
struct FixedSip;

impl BuildHasher for FixedSip {
    type Hasher = SipHasher;

    fn build_hasher(&self) -> SipHasher {
        SipHasher::new_with_keys(0x0123_4567, 0x89ab_cdef)
    }
}

/// Keeps only four bits of the key.
#[derive(Clone, Default, PartialEq)]
struct SixteenBuckets;

struct LowBits(u64);

impl Hasher for LowBits {
    fn finish(&self) -> u64 {
        self.0 & 0xF
    }

    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 = self.0.rotate_left(8) ^ u64::from(b);
        }
    }
}

impl BuildHasher for SixteenBuckets {
    type Hasher = LowBits;

    fn build_hasher(&self) -> LowBits {
        LowBits(0)
    }
}

#[derive(Clone, Debug)]
enum Op {
    Insert(u16, u32),
    Remove(u16),
    MoveToEnd(u16),
    MoveToFirst(u16),
    PopLast,
    PopFirst,
    Retain(u16),
    ShrinkToFit,
    Clear,
}

fn op_strategy(keys: u16) -> impl Strategy<Value = Op> {
    prop_oneof![
        8 => (0..keys, any::<u32>()).prop_map(|(k, v)| Op::Insert(k, v)),
        4 => (0..keys).prop_map(Op::Remove),
        2 => (0..keys).prop_map(Op::MoveToEnd),
        2 => (0..keys).prop_map(Op::MoveToFirst),
        1 => Just(Op::PopLast),
        1 => Just(Op::PopFirst),
        1 => (2u16..7).prop_map(Op::Retain),
        1 => Just(Op::ShrinkToFit),
        1 => Just(Op::Clear),
    ]
}

fn position(model: &[(u16, u32)], key: u16) -> Option<usize> {
    model.iter().position(|(k, _)| *k == key)
}

fn run<S: BuildHasher + Default>(ops: Vec<Op>) -> Result<(), TestCaseError> {
    let mut map: HashMap<u16, u32, S> = HashMap::new();
    let mut model: Vec<(u16, u32)> = Vec::new();

    for op in ops {
        let touched = match op {
            Op::Insert(k, v) => {
                let expected = match position(&model, k) {
                    Some(i) => Some(core::mem::replace(&mut model[i].1, v)),
                    None => {
                        model.push((k, v));
                        None
                    }
                };
                prop_assert_eq!(map.insert(k, v), expected);
                Some(k)
            }
            Op::Remove(k) => {
                let expected = position(&model, k).map(|i| model.remove(i).1);
                prop_assert_eq!(map.remove(&k), expected);
                Some(k)
            }
            Op::MoveToEnd(k) => {
                let expected = match position(&model, k) {
                    Some(i) => {
                        let pair = model.remove(i);
                        model.push(pair);
                        true
                    }
                    None => false,
                };
                prop_assert_eq!(map.move_to_end(&k), expected);
                Some(k)
            }
            Op::MoveToFirst(k) => {
                let expected = match position(&model, k) {
                    Some(i) => {
                        let pair = model.remove(i);
                        model.insert(0, pair);
                        true
                    }
                    None => false,
                };
                prop_assert_eq!(map.move_to_first(&k), expected);
                Some(k)
            }
            Op::PopLast => {
                prop_assert_eq!(map.pop_last(), model.pop());
                None
            }
            Op::PopFirst => {
                let expected = if model.is_empty() {
                    None
                } else {
                    Some(model.remove(0))
                };
                prop_assert_eq!(map.pop_first(), expected);
                None
            }
            Op::Retain(m) => {
                model.retain(|(k, _)| k % m != 0);
                map.retain(|k, _| k % m != 0);
                None
            }
            Op::ShrinkToFit => {
                map.shrink_to_fit();
                None
            }
            Op::Clear => {
                model.clear();
                map.clear();
                None
            }
        };

        prop_assert_eq!(map.len(), model.len());
        let actual: Vec<(u16, u32)> = map.iter().map(|(k, v)| (*k, *v)).collect();
        prop_assert_eq!(&actual, &model);
        prop_assert_eq!(map.first().map(|(k, v)| (*k, *v)), model.first().copied());
        prop_assert_eq!(map.last().map(|(k, v)| (*k, *v)), model.last().copied());
        if let Some(k) = touched {
            let expected = position(&model, k).map(|i| model[i].1);
            prop_assert_eq!(map.get(&k).copied(), expected);
        }
    }

    let reversed: Vec<u16> = map.keys().rev().copied().collect();
    let mut expected: Vec<u16> = model.iter().map(|(k, _)| *k).collect();
    expected.reverse();
    prop_assert_eq!(reversed, expected);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_matches_ordered_model(ops in proptest::collection::vec(op_strategy(64), 1..400)) {
        run::<FixedSip>(ops)?;
    }

    #[test]
    fn prop_matches_ordered_model_with_collisions(
        ops in proptest::collection::vec(op_strategy(300), 1..600)
    ) {
        run::<SixteenBuckets>(ops)?;
    }

    #[test]
    fn prop_get_index_follows_order(keys in proptest::collection::vec(any::<u16>(), 0..200)) {
        let mut map: HashMap<u16, usize, FixedSip> = HashMap::new();
        let mut model: Vec<u16> = Vec::new();
        for (i, k) in keys.into_iter().enumerate() {
            if map.insert(k, i).is_none() {
                model.push(k);
            }
        }
        for (n, k) in model.iter().enumerate() {
            prop_assert_eq!(map.get_index(n).map(|(k, _)| *k), Some(*k));
            prop_assert_eq!(map.get_index_of(k), Some(n));
        }
        prop_assert!(map.get_index(model.len()).is_none());
    }
}
