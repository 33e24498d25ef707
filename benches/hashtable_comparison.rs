use core::hash::Hash;
use core::hash::Hasher;
use core::hint::black_box;

use compact_dict::HashTable;
use compact_dict::hash_table::Entry;
use criterion::AxisScale;
use criterion::BatchSize;
use criterion::Criterion;
use criterion::PlotConfiguration;
use criterion::Throughput;
use criterion::criterion_group;
use criterion::criterion_main;
use hashbrown::hash_table::Entry as HashbrownEntry;
use hashbrown::hash_table::HashTable as HashbrownHashTable;
use rand::Rng;
use rand::SeedableRng;
use rand::TryRngCore;
use rand::rngs::OsRng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand_distr::Zipf;
use siphasher::sip::SipHasher;

trait BenchKey: Clone + Eq {
    fn new(key: u64) -> Self;

    fn hash_key(&self) -> u64;
}

#[derive(Clone, PartialEq, Eq)]
struct StringKey(String);

impl BenchKey for StringKey {
    fn new(key: u64) -> Self {
        black_box(Self(format!("key_{:016X}", key)))
    }

    fn hash_key(&self) -> u64 {
        let mut hasher = SipHasher::new();
        self.0.hash(&mut hasher);
        hasher.finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
struct IntKey(u64);

impl BenchKey for IntKey {
    fn new(key: u64) -> Self {
        black_box(Self(key))
    }

    fn hash_key(&self) -> u64 {
        let mut hasher = SipHasher::new();
        self.0.hash(&mut hasher);
        hasher.finish()
    }
}

const SIZES: &[usize] = &[
    (1 << 10),
    (1 << 12),
    (1 << 14),
    (1 << 16),
    (1 << 18),
];

fn random_keys<K: BenchKey>(count: usize) -> Vec<(u64, K)> {
    let mut rng = OsRng;
    (0..count)
        .map(|_| {
            let key = K::new(rng.try_next_u64().unwrap());
            (key.hash_key(), key)
        })
        .collect()
}

fn shuffled<T: Clone>(items: &[T]) -> Vec<T> {
    let mut items = items.to_vec();
    items.shuffle(&mut SmallRng::from_os_rng());
    items
}

fn filled_compact<K: BenchKey>(keys: &[(u64, K)]) -> HashTable<K, u64> {
    let mut table = HashTable::with_capacity(keys.len());
    for (i, (hash, key)) in keys.iter().enumerate() {
        match table.entry(*hash, |k| k == key, |k: &K| k.hash_key()) {
            Entry::Vacant(entry) => {
                entry.insert(key.clone(), i as u64);
            }
            Entry::Occupied(_) => unreachable!(),
        }
    }
    table
}

fn filled_hashbrown<K: BenchKey>(keys: &[(u64, K)]) -> HashbrownHashTable<(K, u64)> {
    let mut table = HashbrownHashTable::with_capacity(keys.len());
    for (i, (hash, key)) in keys.iter().enumerate() {
        match table.entry(*hash, |(k, _): &(K, u64)| k == key, |(k, _): &(K, u64)| k.hash_key()) {
            HashbrownEntry::Vacant(entry) => {
                entry.insert((key.clone(), i as u64));
            }
            HashbrownEntry::Occupied(_) => unreachable!(),
        }
    }
    table
}

fn bench_insert_random<K: BenchKey, const MAX_SIZE: usize>(c: &mut Criterion) {
    let mut group = c.benchmark_group(format!("insert_random_{}", core::any::type_name::<K>()));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    for &size in SIZES[..=MAX_SIZE].iter() {
        let keys = random_keys::<K>(size);
        group.throughput(Throughput::Elements(size as u64));

        group.bench_function("compact_dict", |b| {
            b.iter_batched(
                || shuffled(&keys),
                |keys| {
                    let mut table = HashTable::<K, u64>::new();
                    for (i, (hash, key)) in keys.into_iter().enumerate() {
                        match table.entry(hash, |k| *k == key, |k: &K| k.hash_key()) {
                            Entry::Vacant(entry) => {
                                black_box(entry.insert(key, i as u64));
                            }
                            Entry::Occupied(_) => unreachable!(),
                        }
                    }
                    black_box(table)
                },
                BatchSize::SmallInput,
            )
        });

        group.bench_function("hashbrown", |b| {
            b.iter_batched(
                || shuffled(&keys),
                |keys| {
                    let mut table = HashbrownHashTable::<(K, u64)>::new();
                    for (i, (hash, key)) in keys.into_iter().enumerate() {
                        match table.entry(
                            hash,
                            |(k, _): &(K, u64)| *k == key,
                            |(k, _): &(K, u64)| k.hash_key(),
                        ) {
                            HashbrownEntry::Vacant(entry) => {
                                black_box(entry.insert((key, i as u64)));
                            }
                            HashbrownEntry::Occupied(_) => unreachable!(),
                        }
                    }
                    black_box(table)
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_find_hit_miss<K: BenchKey, const MAX_SIZE: usize>(c: &mut Criterion) {
    let mut group = c.benchmark_group(format!("find_hit_miss_{}", core::any::type_name::<K>()));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    for &size in SIZES[..=MAX_SIZE].iter() {
        let present = (0..size as u64 * 2)
            .step_by(2)
            .map(|key| {
                let key = K::new(key);
                (key.hash_key(), key)
            })
            .collect::<Vec<_>>();
        let probes = (0..size as u64 * 2)
            .map(|key| {
                let key = K::new(key);
                (key.hash_key(), key)
            })
            .collect::<Vec<_>>();

        let compact = filled_compact(&present);
        let hashbrown = filled_hashbrown(&present);
        group.throughput(Throughput::Elements(probes.len() as u64));

        group.bench_function("compact_dict", |b| {
            b.iter_batched(
                || shuffled(&probes),
                |probes| {
                    for (hash, key) in probes.iter() {
                        black_box(compact.find(*hash, |k| k == key));
                    }
                },
                BatchSize::SmallInput,
            )
        });

        group.bench_function("hashbrown", |b| {
            b.iter_batched(
                || shuffled(&probes),
                |probes| {
                    for (hash, key) in probes.iter() {
                        black_box(hashbrown.find(*hash, |(k, _): &(K, u64)| k == key));
                    }
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_remove<K: BenchKey, const MAX_SIZE: usize>(c: &mut Criterion) {
    let mut group = c.benchmark_group(format!("remove_{}", core::any::type_name::<K>()));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    for &size in SIZES[..=MAX_SIZE].iter() {
        let keys = random_keys::<K>(size);
        let compact = filled_compact(&keys);
        let hashbrown = filled_hashbrown(&keys);
        group.throughput(Throughput::Elements(size as u64));

        group.bench_function("compact_dict", |b| {
            b.iter_batched(
                || (compact.clone(), shuffled(&keys)),
                |(mut table, keys)| {
                    for (hash, key) in keys.iter() {
                        black_box(table.remove(*hash, |k| k == key, |k: &K| k.hash_key()));
                    }
                    black_box(table)
                },
                BatchSize::SmallInput,
            )
        });

        group.bench_function("hashbrown", |b| {
            b.iter_batched(
                || (hashbrown.clone(), shuffled(&keys)),
                |(mut table, keys)| {
                    for (hash, key) in keys.iter() {
                        if let Ok(entry) = table.find_entry(*hash, |(k, _): &(K, u64)| k == key) {
                            black_box(entry.remove().0);
                        }
                    }
                    black_box(table)
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_iteration<K: BenchKey, const MAX_SIZE: usize>(c: &mut Criterion) {
    let mut group = c.benchmark_group(format!("iteration_{}", core::any::type_name::<K>()));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    for &size in SIZES[..=MAX_SIZE].iter() {
        let keys = random_keys::<K>(size);
        let mut compact = filled_compact(&keys);
        let mut hashbrown = filled_hashbrown(&keys);
        // Leave holes behind so iteration has tombstones to skip.
        for (hash, key) in keys.iter().step_by(3) {
            compact.remove(*hash, |k| k == key, |k: &K| k.hash_key());
            if let Ok(entry) = hashbrown.find_entry(*hash, |(k, _): &(K, u64)| k == key) {
                entry.remove();
            }
        }
        group.throughput(Throughput::Elements(compact.len() as u64));

        group.bench_function("compact_dict", |b| {
            b.iter(|| {
                let mut sum = 0u64;
                for (_, value) in compact.iter() {
                    sum = sum.wrapping_add(*value);
                }
                black_box(sum)
            })
        });

        group.bench_function("hashbrown", |b| {
            b.iter(|| {
                let mut sum = 0u64;
                for (_, value) in hashbrown.iter() {
                    sum = sum.wrapping_add(*value);
                }
                black_box(sum)
            })
        });
    }

    group.finish();
}

fn bench_churn<K: BenchKey, const MAX_SIZE: usize>(c: &mut Criterion) {
    let mut group = c.benchmark_group(format!("churn_{}", core::any::type_name::<K>()));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    for &size in SIZES[..=MAX_SIZE].iter() {
        // Every key appears twice: the first occurrence inserts, the second
        // removes.
        let keys = random_keys::<K>(size / 2);
        let mut operations = keys.clone();
        operations.extend(keys.iter().cloned());
        group.throughput(Throughput::Elements(operations.len() as u64));

        group.bench_function("compact_dict", |b| {
            b.iter_batched(
                || shuffled(&operations),
                |operations| {
                    let mut table = HashTable::<K, u64>::new();
                    for (hash, key) in operations {
                        match table.entry(hash, |k| *k == key, |k: &K| k.hash_key()) {
                            Entry::Vacant(entry) => {
                                entry.insert(key, hash);
                            }
                            Entry::Occupied(entry) => {
                                black_box(entry.remove());
                            }
                        }
                    }
                    black_box(table)
                },
                BatchSize::SmallInput,
            )
        });

        group.bench_function("hashbrown", |b| {
            b.iter_batched(
                || shuffled(&operations),
                |operations| {
                    let mut table = HashbrownHashTable::<(K, u64)>::new();
                    for (hash, key) in operations {
                        match table.entry(
                            hash,
                            |(k, _): &(K, u64)| *k == key,
                            |(k, _): &(K, u64)| k.hash_key(),
                        ) {
                            HashbrownEntry::Vacant(entry) => {
                                entry.insert((key, hash));
                            }
                            HashbrownEntry::Occupied(entry) => {
                                black_box(entry.remove().0);
                            }
                        }
                    }
                    black_box(table)
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

#[derive(Clone, Copy)]
enum Operation {
    Insert,
    Find,
    Remove,
}

fn bench_mixed_zipf<K: BenchKey, const MAX_SIZE: usize>(c: &mut Criterion) {
    let mut group = c.benchmark_group(format!("mixed_zipf_{}", core::any::type_name::<K>()));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    for &size in SIZES[..=MAX_SIZE].iter() {
        let mut rng = SmallRng::from_os_rng();
        let op_distr = Zipf::new(3.0, 1.0).unwrap();
        let key_distr = Zipf::new(size as f32 * 2.0 - 1.0, 1.0).unwrap();

        let operations = (0..size * 3)
            .map(|_| {
                let op: f64 = rng.sample(op_distr);
                let key = K::new(rng.sample(key_distr) as u64);
                let op = if op <= 1.0 {
                    Operation::Find
                } else if op <= 2.0 {
                    Operation::Insert
                } else {
                    Operation::Remove
                };
                (op, key.hash_key(), key)
            })
            .collect::<Vec<_>>();
        group.throughput(Throughput::Elements(operations.len() as u64));

        group.bench_function("compact_dict", |b| {
            b.iter_batched(
                || shuffled(&operations),
                |operations| {
                    let mut table = HashTable::<K, u64>::new();
                    for (op, hash, key) in operations {
                        match op {
                            Operation::Insert => {
                                match table.entry(hash, |k| *k == key, |k: &K| k.hash_key()) {
                                    Entry::Vacant(entry) => {
                                        entry.insert(key, hash);
                                    }
                                    Entry::Occupied(mut entry) => {
                                        *entry.get_mut() += 1;
                                    }
                                }
                            }
                            Operation::Find => {
                                black_box(table.find(hash, |k| *k == key));
                            }
                            Operation::Remove => {
                                black_box(table.remove(hash, |k| *k == key, |k: &K| k.hash_key()));
                            }
                        }
                    }
                    black_box(table)
                },
                BatchSize::SmallInput,
            )
        });

        group.bench_function("hashbrown", |b| {
            b.iter_batched(
                || shuffled(&operations),
                |operations| {
                    let mut table = HashbrownHashTable::<(K, u64)>::new();
                    for (op, hash, key) in operations {
                        match op {
                            Operation::Insert => {
                                match table.entry(
                                    hash,
                                    |(k, _): &(K, u64)| *k == key,
                                    |(k, _): &(K, u64)| k.hash_key(),
                                ) {
                                    HashbrownEntry::Vacant(entry) => {
                                        entry.insert((key, hash));
                                    }
                                    HashbrownEntry::Occupied(mut entry) => {
                                        entry.get_mut().1 += 1;
                                    }
                                }
                            }
                            Operation::Find => {
                                black_box(table.find(hash, |(k, _): &(K, u64)| *k == key));
                            }
                            Operation::Remove => {
                                let found = table.find_entry(hash, |(k, _): &(K, u64)| *k == key);
                                if let Ok(entry) = found {
                                    black_box(entry.remove().0);
                                }
                            }
                        }
                    }
                    black_box(table)
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

/// Order maintenance has no hashbrown counterpart; tracks `move_to_end` and
/// `pop_first` on their own.
fn bench_reorder<K: BenchKey, const MAX_SIZE: usize>(c: &mut Criterion) {
    let mut group = c.benchmark_group(format!("reorder_{}", core::any::type_name::<K>()));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    for &size in SIZES[..=MAX_SIZE].iter() {
        let keys = random_keys::<K>(size);
        let table = filled_compact(&keys);
        group.throughput(Throughput::Elements(size as u64));

        group.bench_function("move_to_end", |b| {
            b.iter_batched(
                || (table.clone(), shuffled(&keys)),
                |(mut table, keys)| {
                    for (hash, key) in keys.iter() {
                        let moved = table.move_to_end(*hash, |k| k == key, |k: &K| k.hash_key());
                        black_box(moved.unwrap());
                    }
                    black_box(table)
                },
                BatchSize::SmallInput,
            )
        });

        group.bench_function("pop_first", |b| {
            b.iter_batched(
                || table.clone(),
                |mut table| {
                    while let Some(entry) = table.pop_first(|k: &K| k.hash_key()) {
                        black_box(entry);
                    }
                    black_box(table)
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_insert_random::<IntKey, 4>,
    bench_insert_random::<StringKey, 4>,
    bench_find_hit_miss::<IntKey, 4>,
    bench_find_hit_miss::<StringKey, 4>,
    bench_remove::<IntKey, 4>,
    bench_remove::<StringKey, 4>,
    bench_iteration::<IntKey, 4>,
    bench_iteration::<StringKey, 4>,
    bench_churn::<IntKey, 4>,
    bench_churn::<StringKey, 4>,
    bench_mixed_zipf::<IntKey, 4>,
    bench_mixed_zipf::<StringKey, 4>,
    bench_reorder::<IntKey, 3>,
    bench_reorder::<StringKey, 3>,
);

criterion_main!(benches);
