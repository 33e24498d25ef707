use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;
use core::ops::Index;

use crate::error::AllocError;
use crate::hash_table::Entry as TableEntry;
use crate::hash_table::HashTable;
use crate::hash_table::Rehash;

pub use crate::hash_table::Drain;
pub use crate::hash_table::IntoIter;
pub use crate::hash_table::Iter;
pub use crate::hash_table::IterMut;

/// An insertion-ordered hash map backed by the compact [`HashTable`].
///
/// `HashMap<K, V, S>` stores key-value pairs where keys implement
/// `Hash + Eq` and uses a configurable hasher builder `S` to hash keys.
/// Iteration visits entries in the order their keys were first inserted.
/// Overwriting a value keeps the entry's position, while removing a key and
/// inserting it again moves it to the end.
///
/// # Memory
///
/// - One `(hash, key, value)` entry per insertion, plus 1 to 8 bytes of index
///   per entry depending on the size of the map.
#[derive(Clone)]
pub struct HashMap<K, V, S> {
    table: HashTable<K, V>,
    hash_builder: S,
}

/// Recomputes key hashes with a map's [`BuildHasher`] when the table has to
/// rebuild its index.
pub struct MapHasher<'a, S>(&'a S);

impl<S> Clone for MapHasher<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for MapHasher<'_, S> {}

impl<K: Hash, S: BuildHasher> Rehash<K> for MapHasher<'_, S> {
    #[inline]
    fn rehash(&self, key: &K) -> u64 {
        self.0.hash_one(key)
    }
}

impl<K, V, S> Debug for HashMap<K, V, S>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map().entries(self.table.iter()).finish()
    }
}

/// Two maps are equal if they hold the same pairs, in any order.
impl<K, V, S> PartialEq for HashMap<K, V, S>
where
    K: Hash + Eq,
    V: PartialEq,
    S: BuildHasher,
{
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl<K, V, S> Eq for HashMap<K, V, S>
where
    K: Hash + Eq,
    V: Eq,
    S: BuildHasher,
{
}

impl<K, V, S> HashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Creates a new hash map with the given hasher builder.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::BuildHasher;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # use compact_dict::HashMap;
    /// #
    /// # struct SimpleHasher;
    /// # impl BuildHasher for SimpleHasher {
    /// #     type Hasher = SipHasher;
    /// #
    /// #     fn build_hasher(&self) -> Self::Hasher {
    /// #         SipHasher::new()
    /// #     }
    /// # }
    /// #
    /// let map: HashMap<i32, String, _> = HashMap::with_hasher(SimpleHasher);
    /// assert!(map.is_empty());
    /// ```
    pub fn with_hasher(hash_builder: S) -> Self {
        Self {
            table: HashTable::new(),
            hash_builder,
        }
    }

    /// Creates a new hash map that holds at least `capacity` entries without
    /// reallocating.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::BuildHasher;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # use compact_dict::HashMap;
    /// #
    /// # struct SimpleHasher;
    /// # impl BuildHasher for SimpleHasher {
    /// #     type Hasher = SipHasher;
    /// #
    /// #     fn build_hasher(&self) -> Self::Hasher {
    /// #         SipHasher::new()
    /// #     }
    /// # }
    /// #
    /// let map: HashMap<i32, String, _> = HashMap::with_capacity_and_hasher(100, SimpleHasher);
    /// assert!(map.capacity() >= 100);
    /// ```
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        Self {
            table: HashTable::with_capacity(capacity),
            hash_builder,
        }
    }

    #[inline]
    fn hasher_ref(&self) -> MapHasher<'_, S> {
        MapHasher(&self.hash_builder)
    }

    /// Returns a reference to the map's hasher builder.
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }

    /// Returns the number of elements in the map.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the map contains no elements.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the number of elements the map can hold before it
    /// reallocates.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Removes all elements from the map and releases its memory.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Drops the space held by removed entries and shrinks the map as much
    /// as possible.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::BuildHasher;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # use compact_dict::HashMap;
    /// #
    /// # struct SimpleHasher;
    /// # impl BuildHasher for SimpleHasher {
    /// #     type Hasher = SipHasher;
    /// #
    /// #     fn build_hasher(&self) -> Self::Hasher {
    /// #         SipHasher::new()
    /// #     }
    /// # }
    /// #
    /// let mut map = HashMap::with_capacity_and_hasher(100, SimpleHasher);
    /// map.insert(1, "one");
    /// map.insert(2, "two");
    /// assert!(map.capacity() >= 100);
    ///
    /// map.shrink_to_fit();
    ///
    /// assert!(map.capacity() >= 2);
    /// assert!(map.capacity() < 100);
    /// assert_eq!(map.len(), 2);
    /// ```
    pub fn shrink_to_fit(&mut self) {
        let hasher = MapHasher(&self.hash_builder);
        self.table.shrink_to_fit(hasher);
    }

    /// Reserves capacity for at least `additional` more elements.
    pub fn reserve(&mut self, additional: usize) {
        let hasher = MapHasher(&self.hash_builder);
        self.table.reserve(additional, hasher);
    }

    /// Fallible version of [`reserve`](Self::reserve).
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), AllocError> {
        let hasher = MapHasher(&self.hash_builder);
        self.table.try_reserve(additional, hasher)
    }

    /// Inserts a key-value pair into the map.
    ///
    /// If the map did not have this key present, the pair goes to the end of
    /// the order and `None` is returned. If the key was present, the value is
    /// updated in place and the old value is returned.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::BuildHasher;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # use compact_dict::HashMap;
    /// #
    /// # struct SimpleHasher;
    /// # impl BuildHasher for SimpleHasher {
    /// #     type Hasher = SipHasher;
    /// #
    /// #     fn build_hasher(&self) -> Self::Hasher {
    /// #         SipHasher::new()
    /// #     }
    /// # }
    /// #
    /// let mut map = HashMap::with_hasher(SimpleHasher);
    /// assert_eq!(map.insert(37, "a"), None);
    /// assert_eq!(map.insert(12, "b"), None);
    /// assert_eq!(map.insert(37, "c"), Some("a"));
    ///
    /// let keys: Vec<i32> = map.keys().copied().collect();
    /// assert_eq!(keys, [37, 12]);
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        match self.try_insert(key, value) {
            Ok(old) => old,
            Err(err) => err.raise(),
        }
    }

    /// Fallible version of [`insert`](Self::insert). On error the map is
    /// unchanged.
    pub fn try_insert(&mut self, key: K, value: V) -> Result<Option<V>, AllocError> {
        match self.entry(key) {
            Entry::Occupied(mut entry) => Ok(Some(entry.insert(value))),
            Entry::Vacant(entry) => {
                entry.try_insert(value)?;
                Ok(None)
            }
        }
    }

    /// Returns a reference to the value corresponding to the key.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.get_key_value(key).map(|(_, v)| v)
    }

    /// Returns the stored key and its value.
    pub fn get_key_value(&self, key: &K) -> Option<(&K, &V)> {
        let hash = self.hash_builder.hash_one(key);
        self.table.find(hash, |k| k == key)
    }

    /// Returns a mutable reference to the value corresponding to the key.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let hash = self.hash_builder.hash_one(key);
        self.table.find_mut(hash, |k| k == key).map(|(_, v)| v)
    }

    /// Returns the position of the key in iteration order. Runs in linear
    /// time.
    pub fn get_index_of(&self, key: &K) -> Option<usize> {
        if !self.contains_key(key) {
            return None;
        }
        self.table.iter().position(|(k, _)| k == key)
    }

    /// Returns `true` if the map contains a value for the key.
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Removes a key from the map, returning its value.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.remove_entry(key).map(|(_, v)| v)
    }

    /// Removes a key from the map, returning the stored key and its value.
    pub fn remove_entry(&mut self, key: &K) -> Option<(K, V)> {
        let hash = self.hash_builder.hash_one(key);
        let hasher = MapHasher(&self.hash_builder);
        self.table.remove(hash, |k| k == key, hasher)
    }

    /// Gets the entry for `key` for in-place manipulation.
    pub fn entry(&mut self, key: K) -> Entry<'_, K, V, S> {
        let hash = self.hash_builder.hash_one(&key);
        let hasher = MapHasher(&self.hash_builder);
        match self.table.entry(hash, |k| k == &key, hasher) {
            TableEntry::Occupied(entry) => Entry::Occupied(OccupiedEntry { entry }),
            TableEntry::Vacant(entry) => Entry::Vacant(VacantEntry { entry, key }),
        }
    }

    /// Moves `key` to the end of the order. Returns `false` if the key is
    /// absent.
    ///
    /// # Panics
    ///
    /// Panics if the map cannot obtain memory for the move.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::BuildHasher;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # use compact_dict::HashMap;
    /// #
    /// # struct SimpleHasher;
    /// # impl BuildHasher for SimpleHasher {
    /// #     type Hasher = SipHasher;
    /// #
    /// #     fn build_hasher(&self) -> Self::Hasher {
    /// #         SipHasher::new()
    /// #     }
    /// # }
    /// #
    /// let mut map = HashMap::with_hasher(SimpleHasher);
    /// for k in ["a", "b", "c"] {
    ///     map.insert(k, ());
    /// }
    /// assert!(map.move_to_end(&"a"));
    /// assert!(map.move_to_first(&"c"));
    ///
    /// let keys: Vec<&str> = map.keys().copied().collect();
    /// assert_eq!(keys, ["c", "b", "a"]);
    /// ```
    pub fn move_to_end(&mut self, key: &K) -> bool {
        self.try_move_to_end(key).unwrap_or_else(|err| err.raise())
    }

    /// Fallible version of [`move_to_end`](Self::move_to_end).
    pub fn try_move_to_end(&mut self, key: &K) -> Result<bool, AllocError> {
        let hash = self.hash_builder.hash_one(key);
        let hasher = MapHasher(&self.hash_builder);
        self.table.move_to_end(hash, |k| k == key, hasher)
    }

    /// Moves `key` to the front of the order. Returns `false` if the key is
    /// absent.
    ///
    /// # Panics
    ///
    /// Panics if the map cannot obtain memory for the move.
    pub fn move_to_first(&mut self, key: &K) -> bool {
        self.try_move_to_first(key).unwrap_or_else(|err| err.raise())
    }

    /// Fallible version of [`move_to_first`](Self::move_to_first).
    pub fn try_move_to_first(&mut self, key: &K) -> Result<bool, AllocError> {
        let hash = self.hash_builder.hash_one(key);
        let hasher = MapHasher(&self.hash_builder);
        self.table.move_to_first(hash, |k| k == key, hasher)
    }

    /// Removes and returns the most recently inserted or moved pair.
    pub fn pop_last(&mut self) -> Option<(K, V)> {
        let hasher = MapHasher(&self.hash_builder);
        self.table.pop_last(hasher)
    }

    /// Removes and returns the oldest pair.
    pub fn pop_first(&mut self) -> Option<(K, V)> {
        let hasher = MapHasher(&self.hash_builder);
        self.table.pop_first(hasher)
    }

    /// Retains only the pairs for which `f` returns `true`.
    pub fn retain(&mut self, f: impl FnMut(&K, &mut V) -> bool) {
        let hasher = MapHasher(&self.hash_builder);
        self.table.retain(f, hasher);
    }

    /// Returns an iterator over `(hash, key, value)` in order, reusing the
    /// hashes computed on insertion.
    pub fn iter_with_hash(&self) -> crate::hash_table::IterWithHash<'_, K, V, MapHasher<'_, S>> {
        self.table.iter_with_hash(self.hasher_ref())
    }

    /// Inserts every pair of `other` that is missing from `self`, in
    /// `other`'s order, and overwrites the values of keys present in both.
    ///
    /// Keys are hashed with this map's hasher builder.
    pub fn update<T>(&mut self, other: &HashMap<K, V, T>)
    where
        K: Clone,
        V: Clone,
        T: BuildHasher,
    {
        self.reserve(other.len());
        for (key, value) in other.iter() {
            self.insert(key.clone(), value.clone());
        }
    }

    /// Inserts each `(hash, key, value)` triple without hashing the keys.
    ///
    /// The hashes must match what this map's hasher builder produces, for
    /// example from [`iter_with_hash`](Self::iter_with_hash) of a clone of
    /// this map.
    pub fn extend_with_hash(&mut self, items: impl IntoIterator<Item = (u64, K, V)>) {
        let items = items.into_iter();
        self.reserve(items.size_hint().0);
        for (hash, key, value) in items {
            let hasher = MapHasher(&self.hash_builder);
            match self.table.entry(hash, |k| k == &key, hasher) {
                TableEntry::Occupied(mut entry) => {
                    entry.insert(value);
                }
                TableEntry::Vacant(entry) => {
                    entry.insert(key, value);
                }
            }
        }
    }
}

impl<K, V, S> HashMap<K, V, S> {
    /// Returns an iterator over the pairs in order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        self.table.iter()
    }

    /// Returns an iterator over the pairs in order, with mutable values.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        self.table.iter_mut()
    }

    /// Returns an iterator over the keys in order.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys {
            inner: self.table.iter(),
        }
    }

    /// Returns an iterator over the values in order.
    pub fn values(&self) -> Values<'_, K, V> {
        Values {
            inner: self.table.iter(),
        }
    }

    /// Returns an iterator over mutable references to the values in order.
    pub fn values_mut(&mut self) -> ValuesMut<'_, K, V> {
        ValuesMut {
            inner: self.table.iter_mut(),
        }
    }

    /// Removes every pair and returns them in order.
    pub fn drain(&mut self) -> Drain<K, V> {
        self.table.drain()
    }

    /// Returns the oldest pair.
    pub fn first(&self) -> Option<(&K, &V)> {
        self.table.first()
    }

    /// Returns the newest pair.
    pub fn last(&self) -> Option<(&K, &V)> {
        self.table.last()
    }

    /// Returns the `n`th pair in iteration order.
    pub fn get_index(&self, n: usize) -> Option<(&K, &V)> {
        self.table.get_index(n)
    }

    /// Returns the underlying table.
    pub fn as_table(&self) -> &HashTable<K, V> {
        &self.table
    }
}

impl<K, V, S> HashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    /// Creates an empty map with a default hasher builder.
    pub fn new() -> Self {
        Self::with_hasher(S::default())
    }

    /// Creates an empty map with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, S::default())
    }
}

impl<K, V, S> Default for HashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> Index<&K> for HashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    type Output = V;

    fn index(&self, key: &K) -> &V {
        match self.get(key) {
            Some(value) => value,
            None => panic!("key not found"),
        }
    }
}

impl<K, V, S> Extend<(K, V)> for HashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        let iter = iter.into_iter();
        self.reserve(iter.size_hint().0);
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<K, V, S> FromIterator<(K, V)> for HashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

impl<K, V, S> IntoIterator for HashMap<K, V, S> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.table.into_iter()
    }
}

impl<'a, K, V, S> IntoIterator for &'a HashMap<K, V, S> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.table.iter()
    }
}

impl<'a, K, V, S> IntoIterator for &'a mut HashMap<K, V, S> {
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.table.iter_mut()
    }
}

/// A view into a single entry in the map, which may either be vacant or
/// occupied.
///
/// This enum is constructed from the [`entry`] method on [`HashMap`].
///
/// [`entry`]: HashMap::entry
pub enum Entry<'a, K, V, S> {
    /// The key is absent.
    Vacant(VacantEntry<'a, K, V, S>),
    /// The key is present.
    Occupied(OccupiedEntry<'a, K, V, S>),
}

impl<'a, K, V, S> Entry<'a, K, V, S>
where
    K: Hash,
    S: BuildHasher,
{
    /// Inserts `default` if the entry is vacant and returns a mutable
    /// reference to the value.
    pub fn or_insert(self, default: V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default),
        }
    }

    /// Like [`or_insert`](Self::or_insert), computing the value lazily.
    pub fn or_insert_with<F>(self, default: F) -> &'a mut V
    where
        F: FnOnce() -> V,
    {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default()),
        }
    }

    /// Calls `f` on the value if the entry is occupied.
    pub fn and_modify<F>(self, f: F) -> Self
    where
        F: FnOnce(&mut V),
    {
        match self {
            Entry::Occupied(mut entry) => {
                f(entry.get_mut());
                Entry::Occupied(entry)
            }
            Entry::Vacant(entry) => Entry::Vacant(entry),
        }
    }

    /// Returns the entry's key.
    pub fn key(&self) -> &K {
        match self {
            Entry::Occupied(entry) => entry.key(),
            Entry::Vacant(entry) => entry.key(),
        }
    }
}

impl<'a, K, V, S> Entry<'a, K, V, S>
where
    K: Hash,
    V: Default,
    S: BuildHasher,
{
    /// Inserts the default value if the entry is vacant.
    pub fn or_default(self) -> &'a mut V {
        self.or_insert_with(Default::default)
    }
}

/// A view into a vacant entry in the map.
pub struct VacantEntry<'a, K, V, S> {
    entry: crate::hash_table::VacantEntry<'a, K, V, MapHasher<'a, S>>,
    key: K,
}

impl<'a, K, V, S> VacantEntry<'a, K, V, S>
where
    K: Hash,
    S: BuildHasher,
{
    /// Returns the key that would be inserted.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Takes back the key.
    pub fn into_key(self) -> K {
        self.key
    }

    /// Inserts the value at the end of the order.
    pub fn insert(self, value: V) -> &'a mut V {
        self.entry.insert(self.key, value)
    }

    /// Fallible version of [`insert`](Self::insert).
    pub fn try_insert(self, value: V) -> Result<&'a mut V, AllocError> {
        self.entry.try_insert(self.key, value)
    }
}

/// A view into an occupied entry in the map.
pub struct OccupiedEntry<'a, K, V, S> {
    entry: crate::hash_table::OccupiedEntry<'a, K, V, MapHasher<'a, S>>,
}

impl<'a, K, V, S> OccupiedEntry<'a, K, V, S>
where
    K: Hash,
    S: BuildHasher,
{
    /// Returns the stored key.
    pub fn key(&self) -> &K {
        self.entry.key()
    }

    /// Returns a reference to the value.
    pub fn get(&self) -> &V {
        self.entry.get()
    }

    /// Returns a mutable reference to the value.
    pub fn get_mut(&mut self) -> &mut V {
        self.entry.get_mut()
    }

    /// Converts the entry into a mutable reference to the value.
    pub fn into_mut(self) -> &'a mut V {
        self.entry.into_mut()
    }

    /// Replaces the value and returns the old one. The entry keeps its
    /// position.
    pub fn insert(&mut self, value: V) -> V {
        self.entry.insert(value)
    }

    /// Removes the entry and returns its value.
    pub fn remove(self) -> V {
        self.entry.remove().1
    }

    /// Removes the entry and returns the stored key and value.
    pub fn remove_entry(self) -> (K, V) {
        self.entry.remove()
    }

    /// Moves the entry to the end of the order.
    pub fn move_to_end(self) -> Result<(), AllocError> {
        self.entry.move_to_end()
    }

    /// Moves the entry to the front of the order.
    pub fn move_to_first(self) -> Result<(), AllocError> {
        self.entry.move_to_first()
    }
}

/// An iterator over the keys of a `HashMap`.
pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> DoubleEndedIterator for Keys<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|(k, _)| k)
    }
}

/// An iterator over the values of a `HashMap`.
pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// A mutable iterator over the values of a `HashMap`.
pub struct ValuesMut<'a, K, V> {
    inner: IterMut<'a, K, V>,
}

impl<'a, K, V> Iterator for ValuesMut<'a, K, V> {
    type Item = &'a mut V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
