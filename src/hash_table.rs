//! The insertion-ordered hash table engine.
//!
//! Entries live in a dense log in insertion order; deleting an entry leaves a
//! tombstone behind until the log is compacted. A separate sparse index maps
//! hash buckets to log positions and is probed with the perturbed sequence
//! `i = 5 * i + perturb + 1`. The index slots use the narrowest integer type
//! able to address the log, see [`IndexWidth`].
//!
//! Every operation that needs memory obtains it before the table is modified.
//! If an allocation fails midway the index is rebuilt in place from the entry
//! log, so an [`AllocError`] never leaves the table inconsistent.

use alloc::vec;
use alloc::vec::Vec;
use core::alloc::Layout;
use core::convert::Infallible;
use core::fmt::Debug;
use core::mem;

use crate::error::AllocError;
use crate::index::IndexWidth;
use crate::index::Indices;
use crate::index::Probe;
use crate::index::ProbeStep;
use crate::index::with_index_store;

/// Number of slots of a freshly allocated index.
const DICT_INITSIZE: usize = 16;

/// Upper bound on the headroom a growth-triggered resize asks for.
const MAX_RESIZE_EXTRA: usize = 30000;

/// Growth pattern of the entry log: 0, 8, 17, 27, 38, 50, 64, 80, ...
#[inline(always)]
fn overallocate(len: usize) -> Option<usize> {
    len.checked_add(len >> 3)?.checked_add(8)
}

/// Smallest index size that keeps more than `estimate` slots.
fn index_len_above(estimate: usize) -> Result<usize, AllocError> {
    estimate
        .checked_add(1)
        .and_then(usize::checked_next_power_of_two)
        .map(|len| len.max(DICT_INITSIZE))
        .ok_or(AllocError::CapacityOverflow)
}

/// Smallest index size able to take `items` insertions after a rebuild.
///
/// Each insertion charges three units against a budget of twice the index
/// size, so the index must satisfy `2 * len > 3 * items`.
fn index_len_for_items(items: usize) -> Result<usize, AllocError> {
    let needed = items
        .checked_mul(3)
        .ok_or(AllocError::CapacityOverflow)?
        / 2;
    index_len_above(needed)
}

/// Recomputes the hash of a key already stored in a table.
///
/// With the default `cache-hash` feature every entry keeps its hash and this
/// is never called. Without it, the table calls it whenever the index is
/// rebuilt or an entry must be located by position.
///
/// Any `Fn(&K) -> u64` closure implements this trait.
pub trait Rehash<K: ?Sized> {
    /// Returns the hash of `key`. Must agree with the hash the key was
    /// inserted with.
    fn rehash(&self, key: &K) -> u64;
}

impl<K: ?Sized, F> Rehash<K> for F
where
    F: Fn(&K) -> u64,
{
    #[inline(always)]
    fn rehash(&self, key: &K) -> u64 {
        self(key)
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "cache-hash")] {
        #[derive(Clone, Copy)]
        struct StoredHash(u64);

        impl StoredHash {
            #[inline(always)]
            fn new(hash: u64) -> Self {
                Self(hash)
            }

            #[inline(always)]
            fn may_match(self, hash: u64) -> bool {
                self.0 == hash
            }

            #[inline(always)]
            fn get<K, H: Rehash<K>>(self, _key: &K, _hasher: &H) -> u64 {
                self.0
            }
        }
    } else {
        #[derive(Clone, Copy)]
        struct StoredHash;

        impl StoredHash {
            #[inline(always)]
            fn new(_hash: u64) -> Self {
                Self
            }

            #[inline(always)]
            fn may_match(self, _hash: u64) -> bool {
                true
            }

            #[inline(always)]
            fn get<K, H: Rehash<K>>(self, key: &K, hasher: &H) -> u64 {
                hasher.rehash(key)
            }
        }
    }
}

#[derive(Clone)]
struct Bucket<K, V> {
    hash: StoredHash,
    key: K,
    value: V,
}

/// One position of the entry log. Positions past the end of the log are the
/// never-used slots.
#[derive(Clone)]
enum EntrySlot<K, V> {
    Tombstone,
    Occupied(Bucket<K, V>),
}

impl<K, V> EntrySlot<K, V> {
    #[inline(always)]
    fn is_live(&self) -> bool {
        matches!(self, EntrySlot::Occupied(_))
    }

    #[inline(always)]
    fn bucket(&self) -> Option<&Bucket<K, V>> {
        match self {
            EntrySlot::Occupied(bucket) => Some(bucket),
            EntrySlot::Tombstone => None,
        }
    }

    #[inline(always)]
    fn bucket_mut(&mut self) -> Option<&mut Bucket<K, V>> {
        match self {
            EntrySlot::Occupied(bucket) => Some(bucket),
            EntrySlot::Tombstone => None,
        }
    }

    #[inline(always)]
    fn take(&mut self) -> Option<Bucket<K, V>> {
        match mem::replace(self, EntrySlot::Tombstone) {
            EntrySlot::Occupied(bucket) => Some(bucket),
            EntrySlot::Tombstone => None,
        }
    }

    fn into_pair(self) -> Option<(K, V)> {
        match self {
            EntrySlot::Occupied(bucket) => Some((bucket.key, bucket.value)),
            EntrySlot::Tombstone => None,
        }
    }
}

#[cold]
#[inline(never)]
fn out_of_sync() -> ! {
    unreachable!("hash index and entry log are out of sync")
}

/// Where a key was found, or where it would go.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Lookup {
    /// Index slot `slot` points at live entry position `entry`.
    Found { slot: usize, entry: usize },
    /// The key is absent. `slot` is the index slot a new entry would use, or
    /// `None` if no index exists yet.
    Absent { slot: Option<usize> },
}

/// One step of a resumable lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Candidate {
    /// The probe ended without a match; see [`Lookup::Absent`].
    Vacant(Option<usize>),
    /// Entry `entry` has a matching hash and must be compared by key.
    Entry { slot: usize, entry: usize },
}

/// Debug statistics for hash table analysis.
#[cfg(any(test, feature = "stats"))]
#[derive(Debug, Clone)]
pub struct DebugStats {
    /// Number of live entries.
    pub live: usize,
    /// Length of the entry log, tombstones included.
    pub ever_used: usize,
    /// Entries the log can hold before it must grow.
    pub entry_capacity: usize,
    /// Number of index slots.
    pub index_capacity: usize,
    /// Bytes per index slot, 0 when no index is allocated.
    pub index_width_bytes: usize,
    /// Tombstones currently in the entry log.
    pub tombstones: usize,
    /// Remaining insertion budget before the index is rebuilt.
    pub resize_counter: isize,
    /// Live entries per index slot.
    pub load_factor: f64,
    /// Heap bytes held by the entry log and the index.
    pub total_bytes: usize,
}

#[cfg(any(test, feature = "stats"))]
impl DebugStats {
    /// Pretty-print the debug statistics.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        println!("=== Hash Table Debug Statistics ===");
        println!(
            "Entries: {} live / {} used / {} allocated",
            self.live, self.ever_used, self.entry_capacity
        );
        println!("Tombstones: {}", self.tombstones);
        println!(
            "Index: {} slots x {} bytes ({:.2}% load factor)",
            self.index_capacity,
            self.index_width_bytes,
            self.load_factor * 100.0
        );
        println!("Resize counter: {}", self.resize_counter);
        println!("Total Allocated: {} bytes", self.total_bytes);
    }
}

/// An insertion-ordered hash table with a compact entry log.
///
/// `HashTable<K, V>` stores key-value pairs and remembers the order in which
/// keys were first inserted. Like a raw table it does not know how to hash or
/// compare keys: every operation takes the key's hash and an equality
/// predicate, and operations that may rebuild the index take a [`Rehash`]
/// implementation for keys already stored.
///
/// ## Memory
///
/// - One `(hash, key, value)` entry per insertion, kept in a log that is
///   compacted once tombstones make up half of it.
/// - An index of 1, 2, 4 or 8 bytes per slot, at least 1.5 slots per entry.
///
/// ## Example
///
/// ```rust
/// # use core::hash::Hash;
/// # use core::hash::Hasher;
/// #
/// # use compact_dict::hash_table::Entry;
/// # use compact_dict::hash_table::HashTable;
/// # use siphasher::sip::SipHasher;
/// #
/// # fn hash_str(s: &str) -> u64 {
/// #     let mut hasher = SipHasher::new();
/// #     s.hash(&mut hasher);
/// #     hasher.finish()
/// # }
/// let rehash = |k: &String| hash_str(k);
/// let mut table = HashTable::new();
///
/// for name in ["carol", "alice", "bob"] {
///     match table.entry(hash_str(name), |k: &String| k == name, rehash) {
///         Entry::Vacant(entry) => {
///             entry.insert(name.to_string(), name.len());
///         }
///         Entry::Occupied(_) => unreachable!(),
///     }
/// }
///
/// let order: Vec<&str> = table.iter().map(|(k, _)| k.as_str()).collect();
/// assert_eq!(order, ["carol", "alice", "bob"]);
/// ```
pub struct HashTable<K, V> {
    /// The entry log. Its length is the number of ever-used slots.
    entries: Vec<EntrySlot<K, V>>,
    /// Logical size of the entry log; the index width is chosen for it.
    entry_capacity: usize,
    indices: Indices,
    live: usize,
    resize_counter: isize,
    /// Every position below this one holds a tombstone.
    leading_dead: usize,
    /// Bumped by every structural change.
    version: u64,
    /// Bumped whenever existing entries change position.
    layout: u64,
    #[cfg(test)]
    fail_allocs: usize,
}

impl<K, V> Default for HashTable<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone, V: Clone> Clone for HashTable<K, V> {
    fn clone(&self) -> Self {
        let mut entries = Vec::with_capacity(self.entry_capacity);
        entries.extend(self.entries.iter().cloned());
        Self {
            entries,
            entry_capacity: self.entry_capacity,
            indices: self.indices.clone(),
            live: self.live,
            resize_counter: self.resize_counter,
            leading_dead: self.leading_dead,
            version: 0,
            layout: 0,
            #[cfg(test)]
            fail_allocs: 0,
        }
    }
}

impl<K: Debug, V: Debug> Debug for HashTable<K, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HashTable")
            .field("live", &self.live)
            .field("ever_used", &self.entries.len())
            .field("entry_capacity", &self.entry_capacity)
            .field("index_capacity", &self.indices.len())
            .field("index_width", &self.indices.width())
            .field("resize_counter", &self.resize_counter)
            .field("leading_dead", &self.leading_dead)
            .field("entries", &DebugEntries(&self.entries))
            .finish()
    }
}

struct DebugEntries<'a, K, V>(&'a [EntrySlot<K, V>]);

impl<K: Debug, V: Debug> Debug for DebugEntries<'_, K, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut list = f.debug_list();
        for slot in self.0 {
            match slot {
                EntrySlot::Tombstone => list.entry(&format_args!("<deleted>")),
                EntrySlot::Occupied(bucket) => list.entry(&(&bucket.key, &bucket.value)),
            };
        }
        list.finish()
    }
}

impl<K, V> HashTable<K, V> {
    /// Creates an empty table. Nothing is allocated until the first
    /// insertion.
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            entry_capacity: 0,
            indices: Indices::Unallocated,
            live: 0,
            resize_counter: 0,
            leading_dead: 0,
            version: 0,
            layout: 0,
            #[cfg(test)]
            fail_allocs: 0,
        }
    }

    /// Creates a table that holds at least `capacity` entries without
    /// reallocating.
    ///
    /// # Panics
    ///
    /// Panics if the allocation fails or its size overflows.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use compact_dict::hash_table::HashTable;
    ///
    /// let table: HashTable<u64, u64> = HashTable::with_capacity(100);
    /// assert!(table.capacity() >= 100);
    /// assert!(table.is_empty());
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        Self::try_with_capacity(capacity).unwrap_or_else(|err| err.raise())
    }

    /// Fallible version of [`with_capacity`](Self::with_capacity).
    pub fn try_with_capacity(capacity: usize) -> Result<Self, AllocError> {
        let mut table = Self::new();
        if capacity > 0 {
            let index_len = index_len_for_items(capacity)?;
            table.try_reserve_entries(capacity)?;
            table.indices = table.alloc_indices(IndexWidth::for_entries(capacity), index_len)?;
            table.entry_capacity = capacity;
            table.resize_counter = counter_for(index_len, 0);
        }
        Ok(table)
    }

    /// Returns the number of live entries.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Returns `true` if the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Returns the number of entries the table can hold before its next
    /// reallocation.
    pub fn capacity(&self) -> usize {
        let by_index = (self.indices.len() * 2).saturating_sub(1) / 3;
        self.entry_capacity.min(by_index)
    }

    /// Returns the number of slots in the hash index.
    pub fn index_capacity(&self) -> usize {
        self.indices.len()
    }

    /// Returns the width of the index slots, or `None` before the first
    /// allocation.
    pub fn index_width(&self) -> Option<IndexWidth> {
        self.indices.width()
    }

    /// Returns the length of the entry log, including tombstones.
    pub fn ever_used(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub(crate) fn version(&self) -> u64 {
        self.version
    }

    #[inline]
    fn bump_version(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    fn bump_layout(&mut self) {
        self.layout = self.layout.wrapping_add(1);
        self.bump_version();
    }

    /// Starts a resumable lookup for `hash`.
    #[inline]
    pub(crate) fn probe(&self, hash: u64) -> Probe {
        Probe::new(hash, self.version)
    }

    /// Advances `probe` to the next entry whose hash may equal the probed
    /// hash.
    pub(crate) fn next_candidate(&self, probe: &mut Probe) -> Candidate {
        let entries = &self.entries;
        with_index_store!(
            &self.indices,
            |slots| loop {
                match probe.next_in(slots) {
                    ProbeStep::Absent { slot } => break Candidate::Vacant(Some(slot)),
                    ProbeStep::Occupied { slot, entry } => {
                        match entries.get(entry).and_then(EntrySlot::bucket) {
                            Some(bucket) if bucket.hash.may_match(probe.hash) => {
                                break Candidate::Entry { slot, entry };
                            }
                            Some(_) => {}
                            None => out_of_sync(),
                        }
                    }
                }
            },
            Candidate::Vacant(None)
        )
    }

    /// Looks up `hash` with a fallible key predicate.
    fn lookup_with<E>(
        &self,
        hash: u64,
        mut eq: impl FnMut(&K) -> Result<bool, E>,
    ) -> Result<Lookup, E> {
        let mut probe = self.probe(hash);
        loop {
            match self.next_candidate(&mut probe) {
                Candidate::Vacant(slot) => return Ok(Lookup::Absent { slot }),
                Candidate::Entry { slot, entry } => {
                    if eq(self.key_at(entry))? {
                        return Ok(Lookup::Found { slot, entry });
                    }
                }
            }
        }
    }

    #[inline]
    fn lookup(&self, hash: u64, mut eq: impl FnMut(&K) -> bool) -> Lookup {
        match self.lookup_with::<Infallible>(hash, |key| Ok(eq(key))) {
            Ok(lookup) => lookup,
        }
    }

    /// Key of the live entry at `entry`.
    #[inline]
    pub(crate) fn key_at(&self, entry: usize) -> &K {
        match self.entries.get(entry).and_then(EntrySlot::bucket) {
            Some(bucket) => &bucket.key,
            None => out_of_sync(),
        }
    }

    #[inline]
    fn bucket_mut_at(&mut self, entry: usize) -> &mut Bucket<K, V> {
        match self.entries.get_mut(entry).and_then(EntrySlot::bucket_mut) {
            Some(bucket) => bucket,
            None => out_of_sync(),
        }
    }

    /// Returns the key and value stored at log position `position`, or
    /// `None` for a tombstone or a position past the end of the log.
    pub fn get_at(&self, position: usize) -> Option<(&K, &V)> {
        let bucket = self.entries.get(position)?.bucket()?;
        Some((&bucket.key, &bucket.value))
    }

    /// Mutable version of [`get_at`](Self::get_at).
    pub fn get_at_mut(&mut self, position: usize) -> Option<(&K, &mut V)> {
        let bucket = self.entries.get_mut(position)?.bucket_mut()?;
        Some((&bucket.key, &mut bucket.value))
    }

    /// Returns the hash of the entry at `position`.
    pub fn hash_at(&self, position: usize, hasher: impl Rehash<K>) -> Option<u64> {
        let bucket = self.entries.get(position)?.bucket()?;
        Some(bucket.hash.get(&bucket.key, &hasher))
    }

    /// Returns a reference to the key and value matching `hash` and `eq`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use compact_dict::hash_table::HashTable;
    ///
    /// let mut table = HashTable::new();
    /// table.entry(7, |k: &u32| *k == 7, |_: &u32| 7u64).or_insert(7, "seven");
    ///
    /// assert_eq!(table.find(7, |k| *k == 7), Some((&7, &"seven")));
    /// assert_eq!(table.find(8, |k| *k == 8), None);
    /// ```
    pub fn find(&self, hash: u64, eq: impl FnMut(&K) -> bool) -> Option<(&K, &V)> {
        match self.lookup(hash, eq) {
            Lookup::Found { entry, .. } => self.get_at(entry),
            Lookup::Absent { .. } => None,
        }
    }

    /// Returns a mutable reference to the value matching `hash` and `eq`.
    pub fn find_mut(&mut self, hash: u64, eq: impl FnMut(&K) -> bool) -> Option<(&K, &mut V)> {
        match self.lookup(hash, eq) {
            Lookup::Found { entry, .. } => self.get_at_mut(entry),
            Lookup::Absent { .. } => None,
        }
    }

    /// Returns the log position of the entry matching `hash` and `eq`.
    pub fn find_position(&self, hash: u64, eq: impl FnMut(&K) -> bool) -> Option<usize> {
        match self.lookup(hash, eq) {
            Lookup::Found { entry, .. } => Some(entry),
            Lookup::Absent { .. } => None,
        }
    }

    /// Gets the entry for `hash` and `eq` for in-place manipulation.
    ///
    /// `hasher` is used if the insertion rebuilds the index.
    ///
    /// # Panics
    ///
    /// Inserting through the returned entry panics if memory cannot be
    /// obtained; use [`VacantEntry::try_insert`] to handle that case.
    pub fn entry<H: Rehash<K>>(
        &mut self,
        hash: u64,
        eq: impl FnMut(&K) -> bool,
        hasher: H,
    ) -> Entry<'_, K, V, H> {
        match self.lookup(hash, eq) {
            Lookup::Found { slot, entry } => Entry::Occupied(OccupiedEntry {
                table: self,
                slot,
                entry,
                hasher,
            }),
            Lookup::Absent { slot } => Entry::Vacant(VacantEntry {
                table: self,
                hash,
                slot,
                hasher,
            }),
        }
    }

    /// Removes the entry matching `hash` and `eq` and returns it.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use compact_dict::hash_table::HashTable;
    ///
    /// let rehash = |k: &u32| u64::from(*k);
    /// let mut table = HashTable::new();
    /// table.entry(1, |k| *k == 1, rehash).or_insert(1, 'a');
    /// table.entry(2, |k| *k == 2, rehash).or_insert(2, 'b');
    ///
    /// assert_eq!(table.remove(1, |k| *k == 1, rehash), Some((1, 'a')));
    /// assert_eq!(table.remove(1, |k| *k == 1, rehash), None);
    /// assert_eq!(table.len(), 1);
    /// ```
    pub fn remove(
        &mut self,
        hash: u64,
        eq: impl FnMut(&K) -> bool,
        hasher: impl Rehash<K>,
    ) -> Option<(K, V)> {
        match self.lookup(hash, eq) {
            Lookup::Found { slot, entry } => Some(self.remove_found(slot, entry, &hasher)),
            Lookup::Absent { .. } => None,
        }
    }

    /// Moves the entry matching `hash` and `eq` to the end of the order.
    /// Returns `Ok(false)` if no entry matches.
    pub fn move_to_end(
        &mut self,
        hash: u64,
        eq: impl FnMut(&K) -> bool,
        hasher: impl Rehash<K>,
    ) -> Result<bool, AllocError> {
        match self.lookup(hash, eq) {
            Lookup::Found { slot, entry } => {
                self.move_found_to_end(slot, entry, &hasher)?;
                Ok(true)
            }
            Lookup::Absent { .. } => Ok(false),
        }
    }

    /// Moves the entry matching `hash` and `eq` to the front of the order.
    /// Returns `Ok(false)` if no entry matches.
    pub fn move_to_first(
        &mut self,
        hash: u64,
        eq: impl FnMut(&K) -> bool,
        hasher: impl Rehash<K>,
    ) -> Result<bool, AllocError> {
        match self.lookup(hash, eq) {
            Lookup::Found { slot, entry } => {
                self.move_found_to_first(slot, entry, &hasher)?;
                Ok(true)
            }
            Lookup::Absent { .. } => Ok(false),
        }
    }

    /// Removes and returns the most recently placed entry.
    pub fn pop_last(&mut self, hasher: impl Rehash<K>) -> Option<(K, V)> {
        let entry = self.last_position()?;
        let slot = self.slot_of(entry, &hasher);
        Some(self.remove_found(slot, entry, &hasher))
    }

    /// Removes and returns the oldest entry.
    pub fn pop_first(&mut self, hasher: impl Rehash<K>) -> Option<(K, V)> {
        let entry = self.first_position()?;
        self.leading_dead = entry;
        let slot = self.slot_of(entry, &hasher);
        Some(self.remove_found(slot, entry, &hasher))
    }

    /// Returns the oldest entry.
    pub fn first(&self) -> Option<(&K, &V)> {
        self.get_at(self.first_position()?)
    }

    /// Returns the most recently placed entry.
    pub fn last(&self) -> Option<(&K, &V)> {
        self.get_at(self.last_position()?)
    }

    /// Returns the `n`th entry in iteration order.
    pub fn get_index(&self, n: usize) -> Option<(&K, &V)> {
        self.iter().nth(n)
    }

    fn first_position(&self) -> Option<usize> {
        self.next_live(self.leading_dead)
    }

    fn last_position(&self) -> Option<usize> {
        let last = self.entries.len().checked_sub(1)?;
        debug_assert!(self.entries[last].is_live());
        (self.leading_dead..=last)
            .rev()
            .find(|&pos| self.entries[pos].is_live())
    }

    /// First live position at or after `from`.
    pub(crate) fn next_live(&self, from: usize) -> Option<usize> {
        let from = from.max(self.leading_dead);
        self.entries
            .get(from..)?
            .iter()
            .position(EntrySlot::is_live)
            .map(|offset| from + offset)
    }

    /// Index slot that points at live entry `entry`.
    fn slot_of(&self, entry: usize, hasher: &impl Rehash<K>) -> usize {
        let Some(bucket) = self.entries.get(entry).and_then(EntrySlot::bucket) else {
            out_of_sync()
        };
        let hash = bucket.hash.get(&bucket.key, hasher);
        self.indices
            .slot_of_entry(hash, entry)
            .unwrap_or_else(|| out_of_sync())
    }

    /// Removes every entry and releases the memory held by the table.
    pub fn clear(&mut self) {
        drop(self.take_entries());
    }

    /// Resets the table to its unallocated state and hands back the old
    /// entries, so that the caller controls where they are dropped.
    fn take_entries(&mut self) -> Vec<EntrySlot<K, V>> {
        let entries = mem::take(&mut self.entries);
        self.entry_capacity = 0;
        self.indices = Indices::Unallocated;
        self.live = 0;
        self.resize_counter = 0;
        self.leading_dead = 0;
        self.bump_layout();
        debug_event!(dropped = entries.len(), "table cleared");
        entries
    }

    /// Reserves room for at least `additional` more insertions.
    ///
    /// # Panics
    ///
    /// Panics if the allocation fails or its size overflows.
    pub fn reserve(&mut self, additional: usize, hasher: impl Rehash<K>) {
        if let Err(err) = self.try_reserve(additional, hasher) {
            err.raise()
        }
    }

    /// Fallible version of [`reserve`](Self::reserve). On error the table is
    /// unchanged.
    pub fn try_reserve(&mut self, additional: usize, hasher: impl Rehash<K>) -> Result<(), AllocError> {
        if additional == 0 {
            return Ok(());
        }
        let items = self
            .live
            .checked_add(additional)
            .ok_or(AllocError::CapacityOverflow)?;
        let appended = self
            .entries
            .len()
            .checked_add(additional)
            .ok_or(AllocError::CapacityOverflow)?;
        let index_len = index_len_for_items(items)?.max(self.indices.len());

        let new_capacity = self.entry_capacity.max(appended);
        self.try_reserve_entries(new_capacity)?;

        let budget_short = self.resize_counter <= counter_charge(additional);
        let width_short = !self
            .indices
            .width()
            .is_some_and(|width| width.addresses(new_capacity));
        let old_capacity = mem::replace(&mut self.entry_capacity, new_capacity);
        if (budget_short || width_short)
            && let Err(err) = self.reindex(index_len, &hasher)
        {
            self.entry_capacity = old_capacity;
            return Err(err);
        }
        Ok(())
    }

    /// Drops tombstones and shrinks the entry log and the index as much as
    /// possible.
    pub fn shrink_to_fit(&mut self, hasher: impl Rehash<K>) {
        if self.live == 0 {
            self.clear();
            return;
        }
        self.entries.retain(EntrySlot::is_live);
        self.entries.shrink_to_fit();
        self.entry_capacity = self.entries.len();
        self.leading_dead = 0;
        self.bump_layout();

        let rebuilt = index_len_for_items(self.live).and_then(|len| {
            self.alloc_indices(IndexWidth::for_entries(self.entry_capacity), len)
        });
        match rebuilt {
            Ok(indices) => {
                self.indices = indices;
                self.fill_index(&hasher);
            }
            Err(_) => self.rescue(&hasher),
        }
    }

    /// Keeps only the entries for which `f` returns `true`, in order.
    pub fn retain(&mut self, mut f: impl FnMut(&K, &mut V) -> bool, hasher: impl Rehash<K>) {
        let mut position = self.leading_dead;
        let mut removed = false;
        while let Some(entry) = self.next_live(position) {
            position = entry + 1;
            let bucket = self.bucket_mut_at(entry);
            if !f(&bucket.key, &mut bucket.value) {
                let slot = self.slot_of(entry, &hasher);
                drop(self.unlink(slot, entry));
                removed = true;
            }
        }
        if removed {
            self.settle_after_removal(&hasher);
        }
    }

    /// Returns an iterator over the entries in order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            inner: self.entries[self.leading_dead.min(self.entries.len())..].iter(),
            remaining: self.live,
        }
    }

    /// Returns an iterator over the entries in order, with mutable values.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        let start = self.leading_dead.min(self.entries.len());
        IterMut {
            inner: self.entries[start..].iter_mut(),
            remaining: self.live,
        }
    }

    /// Returns an iterator over `(hash, key, value)` in order.
    pub fn iter_with_hash<H: Rehash<K>>(&self, hasher: H) -> IterWithHash<'_, K, V, H> {
        IterWithHash {
            inner: self.iter_slots(),
            remaining: self.live,
            hasher,
        }
    }

    fn iter_slots(&self) -> core::slice::Iter<'_, EntrySlot<K, V>> {
        self.entries[self.leading_dead.min(self.entries.len())..].iter()
    }

    /// Removes every entry and returns them in order.
    pub fn drain(&mut self) -> Drain<K, V> {
        let remaining = self.live;
        Drain {
            inner: self.take_entries().into_iter(),
            remaining,
        }
    }

    /// Returns a cursor positioned before the first entry.
    pub fn cursor(&self) -> Cursor {
        Cursor {
            position: 0,
            layout: self.layout,
            done: false,
        }
    }

    /// Appends an entry for a key that the preceding lookup found absent.
    /// `slot` is the slot reported by that lookup.
    pub(crate) fn insert_absent<H: Rehash<K>>(
        &mut self,
        slot: Option<usize>,
        hash: u64,
        key: K,
        value: V,
        hasher: &H,
    ) -> Result<usize, AllocError> {
        let slot = self.prepare_insert(slot, hasher)?;
        Ok(self.commit_insert(slot, hash, key, value))
    }

    /// Makes room for one new entry. Returns the slot that
    /// [`commit_insert`](Self::commit_insert) must use, or `None` if the
    /// index was rebuilt and the slot has to be searched again.
    pub(crate) fn prepare_insert<H: Rehash<K>>(
        &mut self,
        slot: Option<usize>,
        hasher: &H,
    ) -> Result<Option<usize>, AllocError> {
        let reindexed = self.reserve_append(hasher, None)?;
        Ok(slot.filter(|_| !reindexed))
    }

    /// Appends the entry after a successful
    /// [`prepare_insert`](Self::prepare_insert).
    pub(crate) fn commit_insert(&mut self, slot: Option<usize>, hash: u64, key: K, value: V) -> usize {
        let entry = self.entries.len();
        match slot {
            Some(slot) => self.indices.set_entry(slot, entry),
            None => self.indices.insert_clean(hash, entry),
        }
        self.entries.push(EntrySlot::Occupied(Bucket {
            hash: StoredHash::new(hash),
            key,
            value,
        }));
        self.live += 1;
        self.resize_counter -= 3;
        self.bump_version();
        entry
    }

    /// Replaces the value of live entry `entry`.
    pub(crate) fn replace_value(&mut self, entry: usize, value: V) -> V {
        mem::replace(&mut self.bucket_mut_at(entry).value, value)
    }

    /// Removes live entry `entry`, which index slot `slot` points at.
    pub(crate) fn remove_found<H: Rehash<K>>(&mut self, slot: usize, entry: usize, hasher: &H) -> (K, V) {
        let bucket = self.unlink(slot, entry);
        self.settle_after_removal(hasher);
        (bucket.key, bucket.value)
    }

    /// Turns entry `entry` into a tombstone and frees its index slot.
    fn unlink(&mut self, slot: usize, entry: usize) -> Bucket<K, V> {
        let Some(bucket) = self.entries.get_mut(entry).and_then(EntrySlot::take) else {
            out_of_sync()
        };
        self.indices.set_deleted(slot);
        self.live -= 1;
        self.bump_version();
        bucket
    }

    /// Restores the log invariants after entries were unlinked and shrinks
    /// the table once it is mostly empty.
    fn settle_after_removal<H: Rehash<K>>(&mut self, hasher: &H) {
        if self.live == 0 {
            self.entries.clear();
            self.leading_dead = 0;
            self.indices.clear();
            self.resize_counter = counter_for(self.indices.len(), 0);
        } else {
            self.trim_tail();
            self.leading_dead = self
                .next_live(self.leading_dead)
                .unwrap_or(self.entries.len());
        }

        if self.live + DICT_INITSIZE <= self.entry_capacity / 8
            && let Err(_err) = self.resize(hasher, None)
        {
            debug_event!(err = %_err, live = self.live, "shrink skipped");
        }
    }

    /// Drops trailing tombstones so the last log position is live.
    fn trim_tail(&mut self) {
        while let Some(EntrySlot::Tombstone) = self.entries.last() {
            self.entries.pop();
        }
    }

    pub(crate) fn move_found_to_end<H: Rehash<K>>(
        &mut self,
        slot: usize,
        entry: usize,
        hasher: &H,
    ) -> Result<(), AllocError> {
        if entry + 1 == self.entries.len() {
            return Ok(());
        }
        let mut entry = entry;
        let reindexed = self.reserve_append(hasher, Some(&mut entry))?;
        if entry + 1 == self.entries.len() {
            return Ok(());
        }
        let slot = if reindexed {
            self.slot_of(entry, hasher)
        } else {
            slot
        };

        let Some(bucket) = self.entries[entry].take() else {
            out_of_sync()
        };
        let target = self.entries.len();
        self.entries.push(EntrySlot::Occupied(bucket));
        self.indices.set_entry(slot, target);
        if entry == self.leading_dead {
            self.leading_dead = self.next_live(entry + 1).unwrap_or(target);
        }
        self.bump_layout();
        Ok(())
    }

    pub(crate) fn move_found_to_first<H: Rehash<K>>(
        &mut self,
        slot: usize,
        entry: usize,
        hasher: &H,
    ) -> Result<(), AllocError> {
        let Some(first) = self.first_position() else {
            out_of_sync()
        };
        if first == entry {
            return Ok(());
        }
        self.leading_dead = first;

        let (slot, entry) = if self.leading_dead == 0 {
            let gap = self.open_front(hasher)?;
            let entry = entry + gap;
            (self.slot_of(entry, hasher), entry)
        } else {
            (slot, entry)
        };

        let target = self.leading_dead - 1;
        let Some(bucket) = self.entries[entry].take() else {
            out_of_sync()
        };
        self.entries[target] = EntrySlot::Occupied(bucket);
        self.indices.set_entry(slot, target);
        self.leading_dead = target;
        self.trim_tail();
        self.bump_layout();
        Ok(())
    }

    /// Rebuilds the log with a run of tombstones in front of the first entry
    /// and returns how far the entries moved.
    fn open_front<H: Rehash<K>>(&mut self, hasher: &H) -> Result<usize, AllocError> {
        let used = self.entries.len();
        let new_capacity = overallocate(used).ok_or(AllocError::CapacityOverflow)?;
        let gap = (new_capacity - used) * 3 / 4;

        let wider = if self
            .indices
            .width()
            .is_some_and(|width| width.addresses(new_capacity))
        {
            None
        } else {
            Some(self.alloc_indices(IndexWidth::for_entries(new_capacity), self.indices.len())?)
        };
        let mut log = self.alloc_log(new_capacity)?;

        log.resize_with(gap, || EntrySlot::Tombstone);
        log.append(&mut self.entries);
        self.entries = log;
        self.entry_capacity = new_capacity;
        self.leading_dead = gap;
        if let Some(indices) = wider {
            self.indices = indices;
        } else {
            self.indices.clear();
        }
        self.fill_index(hasher);
        debug_event!(gap = gap, entries = used, "opened room before the first entry");
        Ok(gap)
    }

    /// Makes sure one more entry can be appended to the log. Returns `true`
    /// if the index was rebuilt.
    ///
    /// `pinned` follows an entry position across a compaction.
    fn reserve_append<H: Rehash<K>>(
        &mut self,
        hasher: &H,
        mut pinned: Option<&mut usize>,
    ) -> Result<bool, AllocError> {
        let result = self.try_reserve_append(hasher, pinned.as_deref_mut());
        if result.is_err() {
            self.rescue(hasher);
        }
        result
    }

    fn try_reserve_append<H: Rehash<K>>(
        &mut self,
        hasher: &H,
        mut pinned: Option<&mut usize>,
    ) -> Result<bool, AllocError> {
        let mut reindexed = false;
        if !self.indices.is_allocated() {
            self.reindex(DICT_INITSIZE, hasher)?;
            reindexed = true;
        }
        if self.entries.len() == self.entry_capacity {
            reindexed |= self.grow(hasher, pinned.as_deref_mut())?;
        }
        if self.resize_counter <= 3 {
            self.resize(hasher, pinned)?;
            reindexed = true;
        }
        debug_assert!(self.entries.len() < self.entry_capacity);
        Ok(reindexed)
    }

    /// Called when the entry log is full. Returns `true` if the index was
    /// rebuilt.
    fn grow<H: Rehash<K>>(&mut self, hasher: &H, pinned: Option<&mut usize>) -> Result<bool, AllocError> {
        if self.live < self.entries.len() / 2 {
            self.compact(hasher, pinned);
            return Ok(true);
        }

        let new_capacity = overallocate(self.entry_capacity).ok_or(AllocError::CapacityOverflow)?;
        self.try_reserve_entries(new_capacity)?;
        let old_capacity = mem::replace(&mut self.entry_capacity, new_capacity);
        if self
            .indices
            .width()
            .is_some_and(|width| width.addresses(new_capacity))
        {
            return Ok(false);
        }
        debug_event!(entry_capacity = new_capacity, "widening index");
        if let Err(err) = self.reindex(self.indices.len(), hasher) {
            self.entry_capacity = old_capacity;
            return Err(err);
        }
        Ok(true)
    }

    fn resize<H: Rehash<K>>(&mut self, hasher: &H, pinned: Option<&mut usize>) -> Result<(), AllocError> {
        let extra = (self.live + 1).min(MAX_RESIZE_EXTRA);
        let estimate = self
            .live
            .checked_add(extra)
            .and_then(|n| n.checked_mul(2))
            .ok_or(AllocError::CapacityOverflow)?;
        let new_len = index_len_above(estimate)?;
        if new_len < self.indices.len() {
            self.compact(hasher, pinned);
            Ok(())
        } else {
            self.reindex(new_len, hasher)
        }
    }

    /// Removes every tombstone from the entry log, keeping order, and
    /// rebuilds the index at its current size, narrowing its slots when the
    /// log shrank. Cannot fail.
    fn compact<H: Rehash<K>>(&mut self, hasher: &H, pinned: Option<&mut usize>) {
        if let Some(position) = pinned {
            *position = self.entries[..*position]
                .iter()
                .filter(|slot| slot.is_live())
                .count();
        }

        let mut shrunk = false;
        if self.live < self.entry_capacity / 4
            && let Some(capacity) = overallocate(self.live)
            && let Ok(mut log) = self.alloc_log(capacity)
        {
            log.extend(self.entries.drain(..).filter(EntrySlot::is_live));
            self.entries = log;
            self.entry_capacity = capacity;
            shrunk = true;
        }
        if !shrunk {
            self.entries.retain(EntrySlot::is_live);
        }
        debug_assert_eq!(self.entries.len(), self.live);

        self.leading_dead = 0;
        self.layout = self.layout.wrapping_add(1);
        let width = IndexWidth::for_entries(self.entry_capacity);
        let narrower = shrunk && self.indices.width().is_some_and(|current| current > width);
        let rebuilt = if narrower {
            self.alloc_indices(width, self.indices.len()).ok()
        } else {
            None
        };
        match rebuilt {
            Some(indices) => self.indices = indices,
            None => self.indices.clear(),
        }
        self.fill_index(hasher);
        debug_event!(
            live = self.live,
            entry_capacity = self.entry_capacity,
            "compacted entry log"
        );
    }

    /// Rebuilds the index with `new_len` slots, reusing the current array
    /// when it already has that size and a sufficient width.
    fn reindex<H: Rehash<K>>(&mut self, new_len: usize, hasher: &H) -> Result<(), AllocError> {
        let width = IndexWidth::for_entries(self.entry_capacity);
        let reusable = self.indices.len() == new_len
            && self.indices.width().is_some_and(|current| current >= width);
        if reusable {
            self.indices.clear();
        } else {
            self.indices = self.alloc_indices(width, new_len)?;
        }
        self.fill_index(hasher);
        debug_event!(index_capacity = new_len, ?width, live = self.live, "rebuilt index");
        Ok(())
    }

    /// Inserts every live entry into a cleared index and resets the
    /// insertion budget.
    fn fill_index<H: Rehash<K>>(&mut self, hasher: &H) {
        let Self { entries, indices, .. } = self;
        with_index_store!(
            indices,
            |slots| {
                for (position, slot) in entries.iter().enumerate() {
                    if let EntrySlot::Occupied(bucket) = slot {
                        crate::index::insert_clean(slots, bucket.hash.get(&bucket.key, hasher), position);
                    }
                }
            },
            ()
        );
        self.resize_counter = counter_for(self.indices.len(), self.live);
        self.bump_version();
    }

    /// Rebuilds the index in place from the entry log after a failed growth
    /// attempt.
    fn rescue<H: Rehash<K>>(&mut self, hasher: &H) {
        if self.indices.is_allocated() {
            debug_event!(live = self.live, "rebuilding index in place after allocation failure");
            self.indices.clear();
            self.fill_index(hasher);
        }
    }

    fn try_reserve_entries(&mut self, capacity: usize) -> Result<(), AllocError> {
        #[cfg(test)]
        self.injected_failure()?;
        Layout::array::<EntrySlot<K, V>>(capacity).map_err(|_| AllocError::CapacityOverflow)?;
        let additional = capacity.saturating_sub(self.entries.len());
        self.entries
            .try_reserve_exact(additional)
            .map_err(|_| AllocError::AllocFailed)
    }

    fn alloc_log(&mut self, capacity: usize) -> Result<Vec<EntrySlot<K, V>>, AllocError> {
        #[cfg(test)]
        self.injected_failure()?;
        Layout::array::<EntrySlot<K, V>>(capacity).map_err(|_| AllocError::CapacityOverflow)?;
        let mut log = Vec::new();
        log.try_reserve_exact(capacity)
            .map_err(|_| AllocError::AllocFailed)?;
        Ok(log)
    }

    fn alloc_indices(&mut self, width: IndexWidth, len: usize) -> Result<Indices, AllocError> {
        #[cfg(test)]
        self.injected_failure()?;
        Indices::try_new(width, len)
    }

    #[cfg(test)]
    fn injected_failure(&mut self) -> Result<(), AllocError> {
        if self.fail_allocs > 0 {
            self.fail_allocs -= 1;
            if self.fail_allocs == 0 {
                return Err(AllocError::AllocFailed);
            }
        }
        Ok(())
    }

    /// Makes the `n`th allocation from now fail.
    #[cfg(test)]
    fn fail_nth_alloc(&mut self, n: usize) {
        self.fail_allocs = n;
    }

    /// Computes a histogram of probe lengths for the current table state.
    ///
    /// Bin `n` counts the live entries found after `n` steps past their home
    /// slot.
    #[cfg(any(test, feature = "stats"))]
    pub fn probe_histogram(&self, hasher: impl Rehash<K>) -> Vec<usize> {
        let mut hist = vec![0usize; 1];
        for (position, slot) in self.entries.iter().enumerate() {
            let Some(bucket) = slot.bucket() else {
                continue;
            };
            let mut probe = Probe::new(bucket.hash.get(&bucket.key, &hasher), self.version);
            let mut steps = 0;
            let found = with_index_store!(
                &self.indices,
                |slots| loop {
                    match probe.next_in(slots) {
                        ProbeStep::Occupied { entry, .. } if entry == position => break true,
                        ProbeStep::Occupied { .. } => steps += 1,
                        ProbeStep::Absent { .. } => break false,
                    }
                },
                false
            );
            debug_assert!(found);
            if hist.len() <= steps {
                hist.resize(steps + 1, 0);
            }
            hist[steps] += 1;
        }
        hist
    }

    /// Returns detailed utilization statistics for debugging.
    #[cfg(any(test, feature = "stats"))]
    pub fn debug_stats(&self) -> DebugStats {
        let index_capacity = self.indices.len();
        DebugStats {
            live: self.live,
            ever_used: self.entries.len(),
            entry_capacity: self.entry_capacity,
            index_capacity,
            index_width_bytes: self.indices.width().map_or(0, IndexWidth::bytes),
            tombstones: self.entries.len() - self.live,
            resize_counter: self.resize_counter,
            load_factor: if index_capacity == 0 {
                0.0
            } else {
                self.live as f64 / index_capacity as f64
            },
            total_bytes: self.entries.capacity() * size_of::<EntrySlot<K, V>>()
                + self.indices.heap_bytes(),
        }
    }

    /// Pretty-prints the probe-length histogram horizontally using stdout.
    #[cfg(all(any(test, feature = "stats"), feature = "std"))]
    pub fn print_probe_histogram(&self, hasher: impl Rehash<K>) {
        let hist = self.probe_histogram(hasher);
        let max = hist.iter().copied().max().unwrap_or(0);
        if max == 0 {
            println!("probe histogram: empty");
            return;
        }

        let max_bar = 60usize;
        println!("probe histogram ({} entries):", self.live);
        for (steps, &count) in hist.iter().enumerate() {
            let width = (count * max_bar).div_ceil(max);
            println!("{:>3} | {} ({})", steps, "█".repeat(width), count);
        }
    }
}

#[inline]
fn counter_for(index_len: usize, live: usize) -> isize {
    let budget = isize::try_from(index_len).unwrap_or(isize::MAX).saturating_mul(2);
    budget.saturating_sub(counter_charge(live))
}

#[inline]
fn counter_charge(items: usize) -> isize {
    isize::try_from(items).unwrap_or(isize::MAX).saturating_mul(3)
}

/// A view into a single entry in the table, which may be vacant or occupied.
///
/// This enum is constructed from the [`entry`] method on [`HashTable`].
///
/// [`entry`]: HashTable::entry
pub enum Entry<'a, K, V, H> {
    /// The key is present.
    Occupied(OccupiedEntry<'a, K, V, H>),
    /// The key is absent.
    Vacant(VacantEntry<'a, K, V, H>),
}

impl<'a, K, V, H: Rehash<K>> Entry<'a, K, V, H> {
    /// Inserts `key` and `value` if the entry is vacant and returns a
    /// mutable reference to the value.
    pub fn or_insert(self, key: K, value: V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(key, value),
        }
    }

    /// Like [`or_insert`](Self::or_insert), building the pair lazily.
    pub fn or_insert_with(self, default: impl FnOnce() -> (K, V)) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let (key, value) = default();
                entry.insert(key, value)
            }
        }
    }

    /// Calls `f` on the value if the entry is occupied.
    pub fn and_modify(mut self, f: impl FnOnce(&mut V)) -> Self {
        if let Entry::Occupied(entry) = &mut self {
            f(entry.get_mut());
        }
        self
    }
}

/// A view into a vacant entry of a [`HashTable`].
///
/// Nothing is written to the table until [`insert`](Self::insert) is called.
pub struct VacantEntry<'a, K, V, H> {
    table: &'a mut HashTable<K, V>,
    hash: u64,
    slot: Option<usize>,
    hasher: H,
}

impl<'a, K, V, H: Rehash<K>> VacantEntry<'a, K, V, H> {
    /// Returns the hash this entry was looked up with.
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Inserts the entry at the end of the order.
    ///
    /// # Panics
    ///
    /// Panics if the table cannot grow.
    pub fn insert(self, key: K, value: V) -> &'a mut V {
        match self.try_insert(key, value) {
            Ok(value) => value,
            Err(err) => err.raise(),
        }
    }

    /// Inserts the entry at the end of the order. On error the table is
    /// left unchanged and the pair is dropped.
    pub fn try_insert(self, key: K, value: V) -> Result<&'a mut V, AllocError> {
        let VacantEntry {
            table,
            hash,
            slot,
            hasher,
        } = self;
        let entry = table.insert_absent(slot, hash, key, value, &hasher)?;
        Ok(&mut table.bucket_mut_at(entry).value)
    }
}

/// A view into an occupied entry of a [`HashTable`].
pub struct OccupiedEntry<'a, K, V, H> {
    table: &'a mut HashTable<K, V>,
    slot: usize,
    entry: usize,
    hasher: H,
}

impl<'a, K, V, H: Rehash<K>> OccupiedEntry<'a, K, V, H> {
    /// Returns the stored key.
    pub fn key(&self) -> &K {
        self.table.key_at(self.entry)
    }

    /// Returns the log position of the entry.
    pub fn position(&self) -> usize {
        self.entry
    }

    /// Returns a reference to the value.
    pub fn get(&self) -> &V {
        match self.table.get_at(self.entry) {
            Some((_, value)) => value,
            None => out_of_sync(),
        }
    }

    /// Returns a mutable reference to the value.
    pub fn get_mut(&mut self) -> &mut V {
        &mut self.table.bucket_mut_at(self.entry).value
    }

    /// Converts the entry into a mutable reference to the value.
    pub fn into_mut(self) -> &'a mut V {
        let OccupiedEntry { table, entry, .. } = self;
        &mut table.bucket_mut_at(entry).value
    }

    /// Replaces the value, keeping the entry's position in the order.
    pub fn insert(&mut self, value: V) -> V {
        self.table.replace_value(self.entry, value)
    }

    /// Removes the entry from the table.
    pub fn remove(self) -> (K, V) {
        self.table.remove_found(self.slot, self.entry, &self.hasher)
    }

    /// Moves the entry to the end of the order.
    pub fn move_to_end(self) -> Result<(), AllocError> {
        self.table
            .move_found_to_end(self.slot, self.entry, &self.hasher)
    }

    /// Moves the entry to the front of the order.
    pub fn move_to_first(self) -> Result<(), AllocError> {
        self.table
            .move_found_to_first(self.slot, self.entry, &self.hasher)
    }
}

/// An iteration position that does not borrow the table.
///
/// A cursor can be kept across mutations of its table. Entries inserted
/// after the cursor's position are yielded when it reaches them, and removed
/// entries are skipped. Once the table relocates existing entries (by
/// compacting, clearing or moving an entry) the cursor is exhausted for good,
/// which guarantees that no entry is yielded twice.
#[derive(Clone, Debug)]
pub struct Cursor {
    position: usize,
    layout: u64,
    done: bool,
}

impl Cursor {
    /// Advances to the next live entry and returns its log position.
    pub fn next_position<K, V>(&mut self, table: &HashTable<K, V>) -> Option<usize> {
        if self.done {
            return None;
        }
        if self.layout != table.layout {
            self.done = true;
            return None;
        }
        match table.next_live(self.position) {
            Some(position) => {
                self.position = position + 1;
                Some(position)
            }
            None => {
                self.done = true;
                None
            }
        }
    }

    /// Advances to the next live entry.
    pub fn next<'t, K, V>(&mut self, table: &'t HashTable<K, V>) -> Option<(&'t K, &'t V)> {
        let position = self.next_position(table)?;
        table.get_at(position)
    }

    /// Returns `true` once the cursor can yield nothing more.
    pub fn is_exhausted(&self) -> bool {
        self.done
    }
}

/// An iterator over the entries of a [`HashTable`] in order.
pub struct Iter<'a, K, V> {
    inner: core::slice::Iter<'a, EntrySlot<K, V>>,
    remaining: usize,
}

impl<K, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            remaining: self.remaining,
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let bucket = self.inner.by_ref().find_map(EntrySlot::bucket)?;
        self.remaining -= 1;
        Some((&bucket.key, &bucket.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> DoubleEndedIterator for Iter<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        let bucket = self.inner.by_ref().rev().find_map(EntrySlot::bucket)?;
        self.remaining -= 1;
        Some((&bucket.key, &bucket.value))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

/// A mutable iterator over the entries of a [`HashTable`] in order.
pub struct IterMut<'a, K, V> {
    inner: core::slice::IterMut<'a, EntrySlot<K, V>>,
    remaining: usize,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        let bucket = self.inner.by_ref().find_map(EntrySlot::bucket_mut)?;
        self.remaining -= 1;
        Some((&bucket.key, &mut bucket.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> DoubleEndedIterator for IterMut<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        let bucket = self.inner.by_ref().rev().find_map(EntrySlot::bucket_mut)?;
        self.remaining -= 1;
        Some((&bucket.key, &mut bucket.value))
    }
}

impl<K, V> ExactSizeIterator for IterMut<'_, K, V> {}

/// An iterator over `(hash, key, value)` triples of a [`HashTable`].
pub struct IterWithHash<'a, K, V, H> {
    inner: core::slice::Iter<'a, EntrySlot<K, V>>,
    remaining: usize,
    hasher: H,
}

impl<'a, K, V, H: Rehash<K>> Iterator for IterWithHash<'a, K, V, H> {
    type Item = (u64, &'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let bucket = self.inner.by_ref().find_map(EntrySlot::bucket)?;
        self.remaining -= 1;
        Some((bucket.hash.get(&bucket.key, &self.hasher), &bucket.key, &bucket.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

/// An owning iterator over the entries of a [`HashTable`] in order.
///
/// Created by [`HashTable::drain`] and by `into_iter`.
pub struct Drain<K, V> {
    inner: vec::IntoIter<EntrySlot<K, V>>,
    remaining: usize,
}

/// Owning iterator returned by `HashTable::into_iter`.
pub type IntoIter<K, V> = Drain<K, V>;

impl<K, V> Iterator for Drain<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        let pair = self.inner.by_ref().find_map(EntrySlot::into_pair)?;
        self.remaining -= 1;
        Some(pair)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> DoubleEndedIterator for Drain<K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        let pair = self.inner.by_ref().rev().find_map(EntrySlot::into_pair)?;
        self.remaining -= 1;
        Some(pair)
    }
}

impl<K, V> ExactSizeIterator for Drain<K, V> {}

impl<K, V> IntoIterator for HashTable<K, V> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    fn into_iter(mut self) -> Self::IntoIter {
        self.drain()
    }
}

impl<'a, K, V> IntoIterator for &'a HashTable<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
