use std::collections::hash_map::DefaultHasher;
use std::hash::Hash;
use std::hash::Hasher;

use clap::Parser;
use compact_dict::HashTable;
use compact_dict::hash_table::Entry;

#[derive(Parser, Debug)]
struct Args {
    #[arg(short = 'c', long = "target_capacity", default_value_t = 1000)]
    target_capacity: usize,

    /// Remove every n-th key after filling, 0 to keep them all.
    #[arg(short = 'r', long = "remove_every", default_value_t = 0)]
    remove_every: u64,
}

fn hash_u64(value: &u64) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

fn main() {
    let args = Args::parse();

    println!(
        "Creating HashTable with target capacity: {}",
        args.target_capacity
    );

    let mut table: HashTable<u64, u64> = HashTable::with_capacity(args.target_capacity);

    println!(
        "Actual capacity: {} entries, {} index slots ({:?})",
        table.capacity(),
        table.index_capacity(),
        table.index_width()
    );
    println!("Filling table with u64 keys...");

    let num_values = table.capacity() as u64;
    for key in 0..num_values {
        match table.entry(hash_u64(&key), |&k| k == key, hash_u64) {
            Entry::Vacant(entry) => {
                if let Err(err) = entry.try_insert(key, key * 2) {
                    println!("Insertion of {key} failed: {err}");
                }
            }
            Entry::Occupied(_) => {
                panic!("Key already exists in table: {}", key);
            }
        }
    }

    if args.remove_every > 0 {
        let mut removed = 0;
        for key in (0..num_values).step_by(args.remove_every as usize) {
            if table.remove(hash_u64(&key), |&k| k == key, hash_u64).is_some() {
                removed += 1;
            }
        }
        println!("Removed {} keys", removed);
    }

    println!("Table holds {} keys", table.len());
    println!(
        "Final load factor: {:.2}% of the entry log",
        (table.len() as f64 / table.capacity().max(1) as f64) * 100.0
    );

    table.print_probe_histogram(hash_u64);
    table.debug_stats().print();
}
