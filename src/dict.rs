//! A dictionary with injected key behaviour that tolerates reentrancy.
//!
//! [`Dict`] exposes the classic dictionary operation set (`get`, `set`,
//! `delete`, `setdefault`, `pop`, `popitem`, ...) over a [`HashTable`]. How
//! keys are hashed and compared is supplied by a [`KeyOps`] value, and both
//! callbacks may fail or call back into the same dict.
//!
//! All methods take `&self`. When the ops are *paranoid* (the default), the
//! table is released before every key comparison and the lookup restarts if
//! the comparison changed the table's structure, so a callback that inserts,
//! deletes or clears never leaves a lookup acting on a stale slot. Removed
//! keys and values are dropped only after the table has been released.
//!
//! ```
//! use compact_dict::dict::Dict;
//! use compact_dict::dict::NativeOps;
//! use compact_dict::DefaultHashBuilder;
//!
//! let dict: Dict<&str, i32, NativeOps<DefaultHashBuilder>> = Dict::new();
//! dict.set("a", 1).unwrap();
//! dict.set("b", 2).unwrap();
//! dict.set("a", 3).unwrap();
//! assert_eq!(dict.items(), [("a", 3), ("b", 2)]);
//!
//! dict.delete(&"a").unwrap();
//! dict.set("a", 4).unwrap();
//! assert_eq!(dict.items(), [("b", 2), ("a", 4)]);
//! assert!(dict.delete(&"zzz").unwrap_err().is_key_not_found());
//! ```

use alloc::vec::Vec;
use core::cell::RefCell;
use core::convert::Infallible;
use core::fmt;
use core::hash::BuildHasher;
use core::hash::Hash;

use crate::error::AllocError;
use crate::error::DictError;
use crate::hash_table::Candidate;
use crate::hash_table::Cursor;
use crate::hash_table::HashTable;
use crate::hash_table::Lookup;
use crate::hash_table::Rehash;

/// Key hashing and equality injected into a [`Dict`].
pub trait KeyOps<K> {
    /// Error raised by [`hash`](Self::hash) or [`eq`](Self::eq).
    type Error;

    /// Hashes `key`. Equal keys must produce equal hashes.
    fn hash(&self, key: &K) -> Result<u64, Self::Error>;

    /// Compares a key already in the dict with the key being looked up.
    fn eq(&self, stored: &K, probe: &K) -> Result<bool, Self::Error>;

    /// Whether [`eq`](Self::eq) may re-enter the dict.
    ///
    /// Paranoid lookups clone the stored key, release the table while `eq`
    /// runs and restart if the table changed meanwhile. Non-paranoid ops run
    /// `eq` with the table borrowed; re-entering the dict from there panics.
    fn paranoid(&self) -> bool {
        true
    }
}

/// [`KeyOps`] for keys implementing [`Hash`] and [`Eq`].
#[derive(Clone, Debug, Default)]
pub struct NativeOps<S> {
    hash_builder: S,
}

impl<S> NativeOps<S> {
    /// Hashes keys with `hash_builder`.
    pub fn with_hasher(hash_builder: S) -> Self {
        Self { hash_builder }
    }

    /// Returns the hash builder.
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }
}

impl<K: Hash + Eq, S: BuildHasher> KeyOps<K> for NativeOps<S> {
    type Error = Infallible;

    #[inline]
    fn hash(&self, key: &K) -> Result<u64, Infallible> {
        Ok(self.hash_builder.hash_one(key))
    }

    #[inline]
    fn eq(&self, stored: &K, probe: &K) -> Result<bool, Infallible> {
        Ok(stored == probe)
    }

    fn paranoid(&self) -> bool {
        false
    }
}

/// Rehashes stored keys through the dict's ops. Only needed when hashes are
/// not cached in the entries.
struct OpsHasher<'a, O>(&'a O);

impl<O> Clone for OpsHasher<'_, O> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<O> Copy for OpsHasher<'_, O> {}

impl<K, O: KeyOps<K>> Rehash<K> for OpsHasher<'_, O> {
    fn rehash(&self, key: &K) -> u64 {
        match self.0.hash(key) {
            Ok(hash) => hash,
            Err(_) => panic!("KeyOps::hash failed for a key already stored in the dict"),
        }
    }
}

/// An insertion-ordered dictionary with injected, possibly reentrant key
/// callbacks.
///
/// Values are returned by clone, since no borrow of the table may outlive a
/// call. Key clones are taken for paranoid comparisons, so `K: Clone` should
/// be cheap (an `Rc` or an interned handle).
///
/// The `Clone` impls of keys and values run while the table is borrowed and
/// must not mutate the dict.
pub struct Dict<K, V, O> {
    table: RefCell<HashTable<K, V>>,
    ops: O,
}

impl<K, V, O: Default> Default for Dict<K, V, O> {
    fn default() -> Self {
        Self::with_ops(O::default())
    }
}

impl<K, V, O: Default> Dict<K, V, O> {
    /// Creates an empty dict with default ops.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty dict able to hold `capacity` entries without
    /// growing.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_ops(capacity, O::default())
    }
}

impl<K, V, O> Dict<K, V, O> {
    /// Creates an empty dict using `ops` for hashing and comparing keys.
    pub fn with_ops(ops: O) -> Self {
        Self {
            table: RefCell::new(HashTable::new()),
            ops,
        }
    }

    /// Creates an empty dict able to hold `capacity` entries without growing.
    pub fn with_capacity_and_ops(capacity: usize, ops: O) -> Self {
        Self {
            table: RefCell::new(HashTable::with_capacity(capacity)),
            ops,
        }
    }

    /// Fallible form of [`with_capacity_and_ops`](Self::with_capacity_and_ops).
    pub fn try_with_capacity_and_ops(capacity: usize, ops: O) -> Result<Self, AllocError> {
        Ok(Self {
            table: RefCell::new(HashTable::try_with_capacity(capacity)?),
            ops,
        })
    }

    /// Returns the key ops.
    pub fn ops(&self) -> &O {
        &self.ops
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.table.borrow().len()
    }

    /// Returns `true` if the dict holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every entry and releases the table's memory.
    pub fn clear(&self) {
        let drained = self.table.borrow_mut().drain();
        drop(drained);
    }

    /// Consumes the dict and returns the underlying table.
    pub fn into_table(self) -> HashTable<K, V> {
        self.table.into_inner()
    }

    /// Runs `f` on the underlying table.
    ///
    /// `f` must not call back into the dict.
    pub fn with_table<R>(&self, f: impl FnOnce(&HashTable<K, V>) -> R) -> R {
        f(&self.table.borrow())
    }
}

impl<K, V, O> Dict<K, V, O>
where
    K: Clone,
    O: KeyOps<K>,
{
    fn hash_key(&self, key: &K) -> Result<u64, DictError<O::Error>> {
        self.ops.hash(key).map_err(DictError::Callback)
    }

    fn hasher(&self) -> OpsHasher<'_, O> {
        OpsHasher(&self.ops)
    }

    /// Finds `key` in the table.
    ///
    /// The returned slot and entry stay valid until the next callback into
    /// user code.
    fn lookup(&self, key: &K, hash: u64) -> Result<Lookup, DictError<O::Error>> {
        let paranoid = self.ops.paranoid();
        'restart: loop {
            let mut table = self.table.borrow();
            let mut probe = table.probe(hash);
            loop {
                let (slot, entry) = match table.next_candidate(&mut probe) {
                    Candidate::Vacant(slot) => return Ok(Lookup::Absent { slot }),
                    Candidate::Entry { slot, entry } => (slot, entry),
                };

                if !paranoid {
                    let equal = self
                        .ops
                        .eq(table.key_at(entry), key)
                        .map_err(DictError::Callback)?;
                    if equal {
                        return Ok(Lookup::Found { slot, entry });
                    }
                    continue;
                }

                let stored = table.key_at(entry).clone();
                drop(table);
                let equal = self.ops.eq(&stored, key).map_err(DictError::Callback);
                drop(stored);
                let equal = equal?;

                table = self.table.borrow();
                if table.version() != probe.version {
                    debug_event!(
                        version = probe.version,
                        "dict changed during key comparison, restarting lookup"
                    );
                    continue 'restart;
                }
                if equal {
                    return Ok(Lookup::Found { slot, entry });
                }
            }
        }
    }

    fn found(&self, key: &K, hash: u64) -> Result<(usize, usize), DictError<O::Error>> {
        match self.lookup(key, hash)? {
            Lookup::Found { slot, entry } => Ok((slot, entry)),
            Lookup::Absent { .. } => Err(DictError::KeyNotFound),
        }
    }

    /// Returns a clone of the value stored for `key`.
    ///
    /// Fails with [`DictError::KeyNotFound`] if `key` is absent.
    pub fn get(&self, key: &K) -> Result<V, DictError<O::Error>>
    where
        V: Clone,
    {
        let hash = self.hash_key(key)?;
        self.get_with_hash(key, hash)
    }

    /// [`get`](Self::get) with a precomputed hash.
    pub fn get_with_hash(&self, key: &K, hash: u64) -> Result<V, DictError<O::Error>>
    where
        V: Clone,
    {
        let (_, entry) = self.found(key, hash)?;
        let table = self.table.borrow();
        match table.get_at(entry) {
            Some((_, value)) => Ok(value.clone()),
            None => Err(DictError::KeyNotFound),
        }
    }

    /// Returns a clone of the value stored for `key`, or `default`.
    pub fn get_or(&self, key: &K, default: V) -> Result<V, DictError<O::Error>>
    where
        V: Clone,
    {
        match self.get(key) {
            Err(DictError::KeyNotFound) => Ok(default),
            other => other,
        }
    }

    /// Returns `true` if `key` is present.
    pub fn contains(&self, key: &K) -> Result<bool, DictError<O::Error>> {
        let hash = self.hash_key(key)?;
        self.contains_with_hash(key, hash)
    }

    /// [`contains`](Self::contains) with a precomputed hash.
    pub fn contains_with_hash(&self, key: &K, hash: u64) -> Result<bool, DictError<O::Error>> {
        Ok(matches!(self.lookup(key, hash)?, Lookup::Found { .. }))
    }

    /// Stores `value` for `key`.
    ///
    /// An existing key keeps its position; a new key is appended.
    pub fn set(&self, key: K, value: V) -> Result<(), DictError<O::Error>> {
        let hash = self.hash_key(&key)?;
        self.set_with_hash(key, hash, value)
    }

    /// [`set`](Self::set) with a precomputed hash.
    pub fn set_with_hash(&self, key: K, hash: u64, value: V) -> Result<(), DictError<O::Error>> {
        match self.lookup(&key, hash)? {
            Lookup::Found { entry, .. } => {
                let old = self.table.borrow_mut().replace_value(entry, value);
                drop(old);
                Ok(())
            }
            Lookup::Absent { slot } => self.append(slot, hash, key, value),
        }
    }

    fn append(
        &self,
        slot: Option<usize>,
        hash: u64,
        key: K,
        value: V,
    ) -> Result<(), DictError<O::Error>> {
        let mut table = self.table.borrow_mut();
        match table.prepare_insert(slot, &self.hasher()) {
            Ok(slot) => {
                table.commit_insert(slot, hash, key, value);
                Ok(())
            }
            Err(err) => {
                drop(table);
                drop((key, value));
                Err(err.into())
            }
        }
    }

    /// Removes `key`.
    ///
    /// Fails with [`DictError::KeyNotFound`] if `key` is absent.
    pub fn delete(&self, key: &K) -> Result<(), DictError<O::Error>> {
        let hash = self.hash_key(key)?;
        self.delete_with_hash(key, hash)
    }

    /// [`delete`](Self::delete) with a precomputed hash.
    pub fn delete_with_hash(&self, key: &K, hash: u64) -> Result<(), DictError<O::Error>> {
        let removed = self.remove_with_hash(key, hash)?;
        drop(removed);
        Ok(())
    }

    fn remove_with_hash(&self, key: &K, hash: u64) -> Result<(K, V), DictError<O::Error>> {
        let (slot, entry) = self.found(key, hash)?;
        let removed = self
            .table
            .borrow_mut()
            .remove_found(slot, entry, &self.hasher());
        Ok(removed)
    }

    /// Returns the value for `key`, inserting `default` first if `key` is
    /// absent.
    pub fn setdefault(&self, key: K, default: V) -> Result<V, DictError<O::Error>>
    where
        V: Clone,
    {
        let hash = self.hash_key(&key)?;
        self.setdefault_with_hash(key, hash, default)
    }

    /// [`setdefault`](Self::setdefault) with a precomputed hash.
    pub fn setdefault_with_hash(
        &self,
        key: K,
        hash: u64,
        default: V,
    ) -> Result<V, DictError<O::Error>>
    where
        V: Clone,
    {
        match self.lookup(&key, hash)? {
            Lookup::Found { entry, .. } => {
                let table = self.table.borrow();
                match table.get_at(entry) {
                    Some((_, value)) => Ok(value.clone()),
                    None => Err(DictError::KeyNotFound),
                }
            }
            Lookup::Absent { slot } => {
                let result = default.clone();
                self.append(slot, hash, key, default)?;
                Ok(result)
            }
        }
    }

    /// Removes `key` and returns its value.
    ///
    /// Fails with [`DictError::KeyNotFound`] if `key` is absent.
    pub fn pop(&self, key: &K) -> Result<V, DictError<O::Error>> {
        let hash = self.hash_key(key)?;
        self.pop_with_hash(key, hash)
    }

    /// [`pop`](Self::pop) with a precomputed hash.
    pub fn pop_with_hash(&self, key: &K, hash: u64) -> Result<V, DictError<O::Error>> {
        let (stored, value) = self.remove_with_hash(key, hash)?;
        drop(stored);
        Ok(value)
    }

    /// Removes `key` and returns its value, or returns `default` if `key` is
    /// absent.
    pub fn pop_or(&self, key: &K, default: V) -> Result<V, DictError<O::Error>> {
        match self.pop(key) {
            Err(DictError::KeyNotFound) => Ok(default),
            other => other,
        }
    }

    /// Removes and returns the entry at the end of the order.
    ///
    /// Fails with [`DictError::KeyNotFound`] if the dict is empty.
    pub fn popitem(&self) -> Result<(K, V), DictError<O::Error>> {
        let popped = self.table.borrow_mut().pop_last(self.hasher());
        popped.ok_or(DictError::KeyNotFound)
    }

    /// Removes and returns the entry at the front of the order.
    ///
    /// Fails with [`DictError::KeyNotFound`] if the dict is empty.
    pub fn popitem_first(&self) -> Result<(K, V), DictError<O::Error>> {
        let popped = self.table.borrow_mut().pop_first(self.hasher());
        popped.ok_or(DictError::KeyNotFound)
    }

    /// Moves `key` to the end of the order, or to the front if `last` is
    /// `false`.
    ///
    /// Fails with [`DictError::KeyNotFound`] if `key` is absent.
    pub fn move_to_end(&self, key: &K, last: bool) -> Result<(), DictError<O::Error>> {
        let hash = self.hash_key(key)?;
        self.move_to_end_with_hash(key, hash, last)
    }

    /// [`move_to_end`](Self::move_to_end) with a precomputed hash.
    pub fn move_to_end_with_hash(
        &self,
        key: &K,
        hash: u64,
        last: bool,
    ) -> Result<(), DictError<O::Error>> {
        let (slot, entry) = self.found(key, hash)?;
        let hasher = self.hasher();
        let mut table = self.table.borrow_mut();
        if last {
            table.move_found_to_end(slot, entry, &hasher)?;
        } else {
            table.move_found_to_first(slot, entry, &hasher)?;
        }
        Ok(())
    }

    /// Sets every entry of `other` in this dict, in `other`'s order.
    ///
    /// Keys already present keep their position and take `other`'s value;
    /// new keys are appended. `other` is snapshotted first, so `other` may be
    /// `self`.
    pub fn update(&self, other: &Dict<K, V, O>) -> Result<(), DictError<O::Error>>
    where
        V: Clone,
    {
        for (key, value) in other.items() {
            self.set(key, value)?;
        }
        Ok(())
    }

    /// Sets each `(hash, key, value)` triple without hashing the keys.
    ///
    /// The hashes must come from ops that hash exactly like this dict's, for
    /// example [`iter_items_with_hash`](Self::iter_items_with_hash) of a
    /// [`copy`](Self::copy).
    pub fn extend_with_hash(
        &self,
        items: impl IntoIterator<Item = (u64, K, V)>,
    ) -> Result<(), DictError<O::Error>> {
        for (hash, key, value) in items {
            self.set_with_hash(key, hash, value)?;
        }
        Ok(())
    }

    /// Returns a snapshot of the keys in order.
    pub fn keys(&self) -> Vec<K> {
        self.table.borrow().iter().map(|(k, _)| k.clone()).collect()
    }

    /// Returns a snapshot of the values in order.
    pub fn values(&self) -> Vec<V>
    where
        V: Clone,
    {
        self.table.borrow().iter().map(|(_, v)| v.clone()).collect()
    }

    /// Returns a snapshot of the entries in order.
    pub fn items(&self) -> Vec<(K, V)>
    where
        V: Clone,
    {
        self.table
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Iterates over the keys. See [`DictIter`].
    pub fn iter_keys(&self) -> DictIter<'_, K, V, O, K> {
        self.dict_iter(|table, position, _| table.get_at(position).map(|(k, _)| k.clone()))
    }

    /// Iterates over the values. See [`DictIter`].
    pub fn iter_values(&self) -> DictIter<'_, K, V, O, V>
    where
        V: Clone,
    {
        self.dict_iter(|table, position, _| table.get_at(position).map(|(_, v)| v.clone()))
    }

    /// Iterates over the entries. See [`DictIter`].
    pub fn iter_items(&self) -> DictIter<'_, K, V, O, (K, V)>
    where
        V: Clone,
    {
        self.dict_iter(|table, position, _| {
            table
                .get_at(position)
                .map(|(k, v)| (k.clone(), v.clone()))
        })
    }

    /// Iterates over the keys together with their hashes. See [`DictIter`].
    pub fn iter_keys_with_hash(&self) -> DictIter<'_, K, V, O, (u64, K)> {
        self.dict_iter(|table, position, ops| {
            let hash = table.hash_at(position, OpsHasher(ops))?;
            table.get_at(position).map(|(k, _)| (hash, k.clone()))
        })
    }

    /// Iterates over the entries together with their hashes. See
    /// [`DictIter`].
    pub fn iter_items_with_hash(&self) -> DictIter<'_, K, V, O, (u64, K, V)>
    where
        V: Clone,
    {
        self.dict_iter(|table, position, ops| {
            let hash = table.hash_at(position, OpsHasher(ops))?;
            table
                .get_at(position)
                .map(|(k, v)| (hash, k.clone(), v.clone()))
        })
    }

    fn dict_iter<T>(&self, project: Project<K, V, O, T>) -> DictIter<'_, K, V, O, T> {
        DictIter {
            dict: Some(self),
            cursor: self.table.borrow().cursor(),
            project,
        }
    }

    /// Returns an independent copy with the same entries in the same order.
    pub fn copy(&self) -> Self
    where
        V: Clone,
        O: Clone,
    {
        Self {
            table: RefCell::new(self.table.borrow().clone()),
            ops: self.ops.clone(),
        }
    }
}

impl<K, V, O> Clone for Dict<K, V, O>
where
    K: Clone,
    V: Clone,
    O: KeyOps<K> + Clone,
{
    fn clone(&self) -> Self {
        self.copy()
    }
}

impl<K: fmt::Debug, V: fmt::Debug, O> fmt::Debug for Dict<K, V, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.table.borrow().iter()).finish()
    }
}

type Project<K, V, O, T> = fn(&HashTable<K, V>, usize, &O) -> Option<T>;

/// An iterator over a [`Dict`] that tolerates mutation of the dict between
/// calls to `next`.
///
/// Entries appended after the iterator's position are yielded when it
/// reaches them and removed entries are skipped. Compaction, `clear` and
/// `move_to_end` end the iteration early, so no entry is ever yielded twice.
/// Once the iterator returns `None` it stays exhausted.
pub struct DictIter<'a, K, V, O, T> {
    dict: Option<&'a Dict<K, V, O>>,
    cursor: Cursor,
    project: Project<K, V, O, T>,
}

impl<K, V, O, T> Iterator for DictIter<'_, K, V, O, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let dict = self.dict?;
        let item = {
            let table = dict.table.borrow();
            self.cursor
                .next_position(&table)
                .and_then(|position| (self.project)(&table, position, &dict.ops))
        };
        if item.is_none() {
            self.dict = None;
        }
        item
    }
}

impl<K, V, O, T> fmt::Debug for DictIter<'_, K, V, O, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DictIter")
            .field("exhausted", &self.dict.is_none())
            .finish_non_exhaustive()
    }
}
