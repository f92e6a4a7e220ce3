//! `Map`: the hash-map surface over the flat table engine.
//!
//! Entries are `(K, V)` pairs stored inline in the slot array; hashing and
//! equality look at the key half only. Keys are immutable once placed, so
//! every mutable view hands out `&mut V`, never `&mut K`.

use crate::hash::{FastHash, KeyHash};
use crate::slots::{Heap, SlotAlloc};
use crate::table::{RawIntoIter, RawIter, RawIterMut, RawTable, MAX_LOAD_FACTOR};
use serde::de::{MapAccess, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Deserializer, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Index;

/// Open-addressed hash map with Robin Hood probing.
///
/// The map-shaped sibling of [`Set`](crate::Set): same engine, same
/// probing, same load policy, entries carry a value next to the key.
pub struct Map<K, V, H = FastHash, A: SlotAlloc = Heap> {
    table: RawTable<(K, V), A>,
    hasher: H,
}

impl<K: Eq, V> Map<K, V>
where
    FastHash: KeyHash<K>,
{
    pub fn new() -> Self {
        Self::with_capacity_and_hasher_in(0, FastHash, Heap)
    }

    /// A map that holds `capacity` entries before its first rehash.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher_in(capacity, FastHash, Heap)
    }
}

impl<K: Eq, V, H: KeyHash<K>> Map<K, V, H> {
    pub fn with_hasher(hasher: H) -> Self {
        Self::with_capacity_and_hasher_in(0, hasher, Heap)
    }

    pub fn with_capacity_and_hasher(capacity: usize, hasher: H) -> Self {
        Self::with_capacity_and_hasher_in(capacity, hasher, Heap)
    }
}

impl<K: Eq, V, H: KeyHash<K>, A: SlotAlloc> Map<K, V, H, A> {
    pub fn with_capacity_and_hasher_in(capacity: usize, hasher: H, alloc: A) -> Self {
        Self {
            table: RawTable::with_capacity_in(capacity, alloc),
            hasher,
        }
    }

    // ── queries ──────────────────────────────────────────────────────────

    #[inline]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.table.len() == 0
    }

    /// Entries the map holds before the next rehash: `slot_count / 2`.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Addressable slots, a power of two. One hidden sentinel slot sits
    /// past the end.
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.table.slot_count()
    }

    /// Always [`MAX_LOAD_FACTOR`]; the policy is fixed.
    #[inline]
    pub fn max_load_factor(&self) -> f32 {
        MAX_LOAD_FACTOR
    }

    #[inline]
    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
        H: KeyHash<Q>,
    {
        self.get(key).is_some()
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
        H: KeyHash<Q>,
    {
        let hash = self.hasher.hash(key);
        self.table
            .get(hash, |e| key.eq(e.0.borrow()))
            .map(|(_, v)| v)
    }

    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
        H: KeyHash<Q>,
    {
        let hash = self.hasher.hash(key);
        self.table
            .get_mut(hash, |e| key.eq(e.0.borrow()))
            .map(|(_, v)| v)
    }

    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
        H: KeyHash<Q>,
    {
        let hash = self.hasher.hash(key);
        self.table
            .get(hash, |e| key.eq(e.0.borrow()))
            .map(|(k, v)| (k, v))
    }

    // ── mutation ─────────────────────────────────────────────────────────

    /// Inserts or replaces; returns the previous value when the key was
    /// already present.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let hasher = self.hasher;
        let hash = hasher.hash(&key);
        let (i, rejected) =
            self.table
                .insert(hash, (key, value), |a, b| a.0 == b.0, |e| hasher.hash(&e.0));
        rejected.map(|(_, value)| {
            let slot = unsafe { self.table.get_unchecked_mut(i) };
            std::mem::replace(&mut slot.1, value)
        })
    }

    /// The value under `key`, inserting `default()` first when absent.
    /// The default is not built when the key is present.
    pub fn get_or_insert_with(&mut self, key: K, default: impl FnOnce() -> V) -> &mut V {
        let hasher = self.hasher;
        let hash = hasher.hash(&key);
        let i = match self.table.find(hash, |e| e.0 == key) {
            Some(i) => i,
            None => {
                self.table
                    .insert(hash, (key, default()), |a, b| a.0 == b.0, |e| {
                        hasher.hash(&e.0)
                    })
                    .0
            }
        };
        &mut unsafe { self.table.get_unchecked_mut(i) }.1
    }

    /// The value under `key`, inserting `V::default()` first when absent.
    pub fn get_or_default(&mut self, key: K) -> &mut V
    where
        V: Default,
    {
        self.get_or_insert_with(key, V::default)
    }

    /// Removes `key`; returns its value when it was present.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
        H: KeyHash<Q>,
    {
        self.remove_entry(key).map(|(_, v)| v)
    }

    pub fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
        H: KeyHash<Q>,
    {
        let hash = self.hasher.hash(key);
        self.table.remove(hash, |e| key.eq(e.0.borrow()))
    }

    /// Keeps only entries for which `f` returns true.
    pub fn retain(&mut self, mut f: impl FnMut(&K, &mut V) -> bool) {
        self.table.retain(|e| {
            let (k, v) = e;
            f(k, v)
        });
    }

    /// Drops every entry. Slot count is unchanged.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    // ── capacity management ──────────────────────────────────────────────

    /// Resizes so that `additional` more entries fit without rehashing.
    pub fn reserve(&mut self, additional: usize) {
        let hasher = self.hasher;
        self.table
            .reserve(self.table.len() + additional, |e| hasher.hash(&e.0));
    }

    /// Resizes toward `slot_count` addressable slots. The table never goes
    /// below twice its length or the minimum slot count; equal targets are
    /// a no-op.
    pub fn rehash(&mut self, slot_count: usize) {
        let hasher = self.hasher;
        self.table.rehash(slot_count, |e| hasher.hash(&e.0));
    }

    /// Shrinks the slot array as far as the load ceiling allows.
    pub fn shrink_to_fit(&mut self) {
        self.rehash(0);
    }

    // ── iteration ────────────────────────────────────────────────────────

    /// Iterates entries in slot order. The order is stable until an
    /// operation rehashes.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            raw: self.table.iter(),
        }
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            raw: self.table.iter_mut(),
        }
    }

    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }

    pub fn values_mut(&mut self) -> ValuesMut<'_, K, V> {
        ValuesMut {
            inner: self.iter_mut(),
        }
    }
}

// ── std trait impls ──────────────────────────────────────────────────────

impl<K: Eq, V, H: KeyHash<K>> Default for Map<K, V, H> {
    fn default() -> Self {
        Self::with_hasher(H::default())
    }
}

impl<K, V, H, A> Clone for Map<K, V, H, A>
where
    K: Eq + Clone,
    V: Clone,
    H: KeyHash<K>,
    A: SlotAlloc,
{
    fn clone(&self) -> Self {
        Self {
            table: self.table.clone_in(),
            hasher: self.hasher,
        }
    }
}

impl<K, V, H, A> fmt::Debug for Map<K, V, H, A>
where
    K: Eq + fmt::Debug,
    V: fmt::Debug,
    H: KeyHash<K>,
    A: SlotAlloc,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, H, A> PartialEq for Map<K, V, H, A>
where
    K: Eq,
    V: PartialEq,
    H: KeyHash<K>,
    A: SlotAlloc,
{
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(k, v)| other.get(k).map_or(false, |w| *v == *w))
    }
}

impl<K, V, H, A> Eq for Map<K, V, H, A>
where
    K: Eq,
    V: Eq,
    H: KeyHash<K>,
    A: SlotAlloc,
{
}

/// Panicking lookup, the one operation that treats a missing key as an
/// error. Use [`Map::get`] when absence is an expected outcome.
impl<K, V, Q, H, A> Index<&Q> for Map<K, V, H, A>
where
    K: Eq + Borrow<Q>,
    Q: Eq + ?Sized,
    H: KeyHash<K> + KeyHash<Q>,
    A: SlotAlloc,
{
    type Output = V;

    fn index(&self, key: &Q) -> &V {
        self.get(key).expect("no entry found for key")
    }
}

impl<K: Eq, V, H: KeyHash<K>> FromIterator<(K, V)> for Map<K, V, H> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut map = Map::with_capacity_and_hasher(iter.size_hint().0, H::default());
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

impl<K: Eq, V, H: KeyHash<K>, const N: usize> From<[(K, V); N]> for Map<K, V, H> {
    fn from(entries: [(K, V); N]) -> Self {
        entries.into_iter().collect()
    }
}

impl<K: Eq, V, H: KeyHash<K>, A: SlotAlloc> Extend<(K, V)> for Map<K, V, H, A> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        let iter = iter.into_iter();
        self.reserve(iter.size_hint().0);
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl<'a, K: Eq, V, H: KeyHash<K>, A: SlotAlloc> IntoIterator for &'a Map<K, V, H, A> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}

impl<'a, K: Eq, V, H: KeyHash<K>, A: SlotAlloc> IntoIterator for &'a mut Map<K, V, H, A> {
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V>;

    fn into_iter(self) -> IterMut<'a, K, V> {
        self.iter_mut()
    }
}

impl<K: Eq, V, H: KeyHash<K>, A: SlotAlloc> IntoIterator for Map<K, V, H, A> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V, A>;

    fn into_iter(self) -> IntoIter<K, V, A> {
        IntoIter {
            raw: self.table.into_iter(),
        }
    }
}

// ── iterators ────────────────────────────────────────────────────────────

/// Borrowing iterator over a map's entries.
pub struct Iter<'a, K, V> {
    raw: RawIter<'a, (K, V)>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    #[inline]
    fn next(&mut self) -> Option<(&'a K, &'a V)> {
        self.raw.next().map(|(k, v)| (k, v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.raw.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}
impl<K, V> std::iter::FusedIterator for Iter<'_, K, V> {}

impl<K, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
        }
    }
}

/// Iterator over entries with exclusive access to the values.
pub struct IterMut<'a, K, V> {
    raw: RawIterMut<'a, (K, V)>,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    #[inline]
    fn next(&mut self) -> Option<(&'a K, &'a mut V)> {
        self.raw.next().map(|entry| {
            let (k, v) = entry;
            (&*k, v)
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.raw.size_hint()
    }
}

impl<K, V> ExactSizeIterator for IterMut<'_, K, V> {}
impl<K, V> std::iter::FusedIterator for IterMut<'_, K, V> {}

/// Owning iterator over a map's entries.
pub struct IntoIter<K, V, A: SlotAlloc = Heap> {
    raw: RawIntoIter<(K, V), A>,
}

impl<K, V, A: SlotAlloc> Iterator for IntoIter<K, V, A> {
    type Item = (K, V);

    #[inline]
    fn next(&mut self) -> Option<(K, V)> {
        self.raw.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.raw.size_hint()
    }
}

impl<K, V, A: SlotAlloc> ExactSizeIterator for IntoIter<K, V, A> {}
impl<K, V, A: SlotAlloc> std::iter::FusedIterator for IntoIter<K, V, A> {}

/// Iterator over a map's keys.
pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    #[inline]
    fn next(&mut self) -> Option<&'a K> {
        self.inner.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Keys<'_, K, V> {}

/// Iterator over a map's values.
pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    #[inline]
    fn next(&mut self) -> Option<&'a V> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Values<'_, K, V> {}

/// Iterator over a map's values with exclusive access.
pub struct ValuesMut<'a, K, V> {
    inner: IterMut<'a, K, V>,
}

impl<'a, K, V> Iterator for ValuesMut<'a, K, V> {
    type Item = &'a mut V;

    #[inline]
    fn next(&mut self) -> Option<&'a mut V> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for ValuesMut<'_, K, V> {}

// ── serde ────────────────────────────────────────────────────────────────

impl<K, V, H, A> Serialize for Map<K, V, H, A>
where
    K: Eq + Serialize,
    V: Serialize,
    H: KeyHash<K>,
    A: SlotAlloc,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

impl<'de, K, V, H> Deserialize<'de> for Map<K, V, H>
where
    K: Eq + Deserialize<'de>,
    V: Deserialize<'de>,
    H: KeyHash<K>,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MapVisitor<K, V, H>(PhantomData<(K, V, H)>);

        impl<'de, K, V, H> Visitor<'de> for MapVisitor<K, V, H>
        where
            K: Eq + Deserialize<'de>,
            V: Deserialize<'de>,
            H: KeyHash<K>,
        {
            type Value = Map<K, V, H>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of entries")
            }

            fn visit_map<M: MapAccess<'de>>(self, mut access: M) -> Result<Self::Value, M::Error> {
                let mut map =
                    Map::with_capacity_and_hasher(access.size_hint().unwrap_or(0), H::default());
                while let Some((key, value)) = access.next_entry()? {
                    map.insert(key, value);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(MapVisitor(PhantomData))
    }
}
