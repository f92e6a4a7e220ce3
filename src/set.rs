//! `Set`: the hash-set surface over the flat table engine.

use crate::hash::{FastHash, KeyHash};
use crate::slots::{Heap, SlotAlloc};
use crate::table::{RawIntoIter, RawIter, RawTable, MAX_LOAD_FACTOR};
use serde::de::{SeqAccess, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Deserializer, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::marker::PhantomData;

/// Open-addressed hash set with Robin Hood probing.
///
/// Generic over the key, the [`KeyHash`] functor (default [`FastHash`]) and
/// the [`SlotAlloc`] allocator (default [`Heap`]). Lookups accept any
/// borrowed form of the key the functor can hash, so a `Set<String>`
/// answers `contains("...")` without allocating.
///
/// Not safe for concurrent mutation; wrap it yourself if you must share.
pub struct Set<K, H = FastHash, A: SlotAlloc = Heap> {
    table: RawTable<K, A>,
    hasher: H,
}

impl<K: Eq> Set<K>
where
    FastHash: KeyHash<K>,
{
    pub fn new() -> Self {
        Self::with_capacity_and_hasher_in(0, FastHash, Heap)
    }

    /// A set that holds `capacity` keys before its first rehash.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher_in(capacity, FastHash, Heap)
    }
}

impl<K: Eq, H: KeyHash<K>> Set<K, H> {
    pub fn with_hasher(hasher: H) -> Self {
        Self::with_capacity_and_hasher_in(0, hasher, Heap)
    }

    pub fn with_capacity_and_hasher(capacity: usize, hasher: H) -> Self {
        Self::with_capacity_and_hasher_in(capacity, hasher, Heap)
    }
}

impl<K: Eq, H: KeyHash<K>, A: SlotAlloc> Set<K, H, A> {
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

    /// Keys the set holds before the next rehash: `slot_count / 2`.
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

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
        H: KeyHash<Q>,
    {
        self.get(key).is_some()
    }

    /// The stored key equal to `key`, or `None`.
    pub fn get<Q>(&self, key: &Q) -> Option<&K>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
        H: KeyHash<Q>,
    {
        let hash = self.hasher.hash(key);
        self.table.get(hash, |e| key.eq((*e).borrow()))
    }

    // ── mutation ─────────────────────────────────────────────────────────

    /// Inserts `key`; returns false when an equal key was already present
    /// (the set is unchanged and `key` is dropped).
    pub fn insert(&mut self, key: K) -> bool {
        let hasher = self.hasher;
        let hash = hasher.hash(&key);
        let (_, rejected) = self
            .table
            .insert(hash, key, |a, b| a == b, |e| hasher.hash(e));
        rejected.is_none()
    }

    /// Inserts `key` unless present, then returns a reference to the
    /// stored key.
    pub fn get_or_insert(&mut self, key: K) -> &K {
        let hasher = self.hasher;
        let hash = hasher.hash(&key);
        let (i, _) = self
            .table
            .insert(hash, key, |a, b| a == b, |e| hasher.hash(e));
        unsafe { self.table.get_unchecked(i) }
    }

    /// Removes `key`; returns whether it was present.
    pub fn remove<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
        H: KeyHash<Q>,
    {
        self.take(key).is_some()
    }

    /// Removes and returns the stored key equal to `key`.
    pub fn take<Q>(&mut self, key: &Q) -> Option<K>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
        H: KeyHash<Q>,
    {
        let hash = self.hasher.hash(key);
        self.table.remove(hash, |e| key.eq((*e).borrow()))
    }

    /// Keeps only keys for which `f` returns true.
    pub fn retain(&mut self, mut f: impl FnMut(&K) -> bool) {
        self.table.retain(|e| f(e));
    }

    /// Drops every key. Slot count is unchanged.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    // ── capacity management ──────────────────────────────────────────────

    /// Resizes so that `additional` more keys fit without rehashing.
    pub fn reserve(&mut self, additional: usize) {
        let hasher = self.hasher;
        self.table
            .reserve(self.table.len() + additional, |e| hasher.hash(e));
    }

    /// Resizes toward `slot_count` addressable slots. The table never goes
    /// below twice its length or the minimum slot count; equal targets are
    /// a no-op.
    pub fn rehash(&mut self, slot_count: usize) {
        let hasher = self.hasher;
        self.table.rehash(slot_count, |e| hasher.hash(e));
    }

    /// Shrinks the slot array as far as the load ceiling allows.
    pub fn shrink_to_fit(&mut self) {
        self.rehash(0);
    }

    // ── iteration ────────────────────────────────────────────────────────

    /// Iterates stored keys in slot order. The order is stable until an
    /// operation rehashes.
    pub fn iter(&self) -> Iter<'_, K> {
        Iter {
            raw: self.table.iter(),
        }
    }
}

// ── std trait impls ──────────────────────────────────────────────────────

impl<K: Eq, H: KeyHash<K>> Default for Set<K, H> {
    fn default() -> Self {
        Self::with_hasher(H::default())
    }
}

impl<K, H, A> Clone for Set<K, H, A>
where
    K: Eq + Clone,
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

impl<K, H, A> fmt::Debug for Set<K, H, A>
where
    K: Eq + fmt::Debug,
    H: KeyHash<K>,
    A: SlotAlloc,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<K, H, A> PartialEq for Set<K, H, A>
where
    K: Eq,
    H: KeyHash<K>,
    A: SlotAlloc,
{
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|k| other.contains(k))
    }
}

impl<K, H, A> Eq for Set<K, H, A>
where
    K: Eq,
    H: KeyHash<K>,
    A: SlotAlloc,
{
}

impl<K: Eq, H: KeyHash<K>> FromIterator<K> for Set<K, H> {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut set = Set::with_capacity_and_hasher(iter.size_hint().0, H::default());
        for key in iter {
            set.insert(key);
        }
        set
    }
}

impl<K: Eq, H: KeyHash<K>, const N: usize> From<[K; N]> for Set<K, H> {
    fn from(keys: [K; N]) -> Self {
        keys.into_iter().collect()
    }
}

impl<K: Eq, H: KeyHash<K>, A: SlotAlloc> Extend<K> for Set<K, H, A> {
    fn extend<I: IntoIterator<Item = K>>(&mut self, iter: I) {
        let iter = iter.into_iter();
        self.reserve(iter.size_hint().0);
        for key in iter {
            self.insert(key);
        }
    }
}

impl<'a, K: Eq, H: KeyHash<K>, A: SlotAlloc> IntoIterator for &'a Set<K, H, A> {
    type Item = &'a K;
    type IntoIter = Iter<'a, K>;

    fn into_iter(self) -> Iter<'a, K> {
        self.iter()
    }
}

impl<K: Eq, H: KeyHash<K>, A: SlotAlloc> IntoIterator for Set<K, H, A> {
    type Item = K;
    type IntoIter = IntoIter<K, A>;

    fn into_iter(self) -> IntoIter<K, A> {
        IntoIter {
            raw: self.table.into_iter(),
        }
    }
}

// ── iterators ────────────────────────────────────────────────────────────

/// Borrowing iterator over a set's keys.
pub struct Iter<'a, K> {
    raw: RawIter<'a, K>,
}

impl<'a, K> Iterator for Iter<'a, K> {
    type Item = &'a K;

    #[inline]
    fn next(&mut self) -> Option<&'a K> {
        self.raw.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.raw.size_hint()
    }
}

impl<K> ExactSizeIterator for Iter<'_, K> {}
impl<K> std::iter::FusedIterator for Iter<'_, K> {}

impl<K> Clone for Iter<'_, K> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
        }
    }
}

/// Owning iterator over a set's keys.
pub struct IntoIter<K, A: SlotAlloc = Heap> {
    raw: RawIntoIter<K, A>,
}

impl<K, A: SlotAlloc> Iterator for IntoIter<K, A> {
    type Item = K;

    #[inline]
    fn next(&mut self) -> Option<K> {
        self.raw.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.raw.size_hint()
    }
}

impl<K, A: SlotAlloc> ExactSizeIterator for IntoIter<K, A> {}
impl<K, A: SlotAlloc> std::iter::FusedIterator for IntoIter<K, A> {}

// ── serde ────────────────────────────────────────────────────────────────

impl<K, H, A> Serialize for Set<K, H, A>
where
    K: Eq + Serialize,
    H: KeyHash<K>,
    A: SlotAlloc,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de, K, H> Deserialize<'de> for Set<K, H>
where
    K: Eq + Deserialize<'de>,
    H: KeyHash<K>,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SetVisitor<K, H>(PhantomData<(K, H)>);

        impl<'de, K, H> Visitor<'de> for SetVisitor<K, H>
        where
            K: Eq + Deserialize<'de>,
            H: KeyHash<K>,
        {
            type Value = Set<K, H>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a sequence of keys")
            }

            fn visit_seq<S: SeqAccess<'de>>(self, mut seq: S) -> Result<Self::Value, S::Error> {
                let mut set =
                    Set::with_capacity_and_hasher(seq.size_hint().unwrap_or(0), H::default());
                while let Some(key) = seq.next_element()? {
                    set.insert(key);
                }
                Ok(set)
            }
        }

        deserializer.deserialize_seq(SetVisitor(PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::SeaHash;

    #[test]
    fn test_basic_insert_contains() {
        let mut s = Set::new();
        assert!(s.insert(42u64));
        assert!(s.insert(100));
        assert!(!s.insert(42));

        assert!(s.contains(&42));
        assert!(s.contains(&100));
        assert!(!s.contains(&999));
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn test_get_returns_stored_key() {
        let mut s = Set::new();
        s.insert(String::from("kunci"));
        assert_eq!(s.get("kunci"), Some(&String::from("kunci")));
        assert_eq!(s.get("lain"), None);
    }

    #[test]
    fn test_get_or_insert() {
        let mut s = Set::new();
        assert_eq!(*s.get_or_insert(5u32), 5);
        assert_eq!(*s.get_or_insert(5), 5);
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn test_remove_and_take() {
        let mut s: Set<u64> = (0..10).collect();
        assert!(s.remove(&3));
        assert!(!s.remove(&3));
        assert_eq!(s.take(&4), Some(4));
        assert_eq!(s.take(&4), None);
        assert_eq!(s.len(), 8);
    }

    #[test]
    fn test_borrowed_string_lookups() {
        let mut s = Set::new();
        s.insert(String::from("alpha"));
        s.insert(String::from("beta"));
        assert!(s.contains("alpha"));
        assert!(s.remove("beta"));
        assert!(!s.contains("beta"));
    }

    #[test]
    fn test_retain() {
        let mut s: Set<u64> = (0..100).collect();
        s.retain(|k| k % 3 == 0);
        assert_eq!(s.len(), 34);
        assert!(s.contains(&99));
        assert!(!s.contains(&98));
    }

    #[test]
    fn test_equality_ignores_insertion_order() {
        let a: Set<u64> = (0..64).collect();
        let b: Set<u64> = (0..64).rev().collect();
        assert_eq!(a, b);

        let c: Set<u64> = (0..63).collect();
        assert_ne!(a, c);
    }

    #[test]
    fn test_clone_equals_source() {
        let a: Set<String> = ["a", "b", "c"].into_iter().map(String::from).collect();
        let b = a.clone();
        assert_eq!(a, b);
        assert_eq!(b.slot_count(), a.slot_count());
    }

    #[test]
    fn test_iteration_order_stable_without_rehash() {
        let mut s = Set::with_capacity(100);
        for k in 0..50u64 {
            s.insert(k);
        }
        let before: Vec<u64> = s.iter().copied().collect();
        s.remove(&49);
        s.insert(49);
        let after: Vec<u64> = s.iter().copied().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_alternative_hasher() {
        let mut s: Set<String, SeaHash> = Set::with_hasher(SeaHash);
        s.insert(String::from("seahash"));
        assert!(s.contains("seahash"));
        assert!(!s.contains("fasthash"));
    }

    #[test]
    fn test_layout_invariants_after_churn() {
        let mut s: Set<u64> = Set::new();
        for k in 0..200 {
            s.insert(k);
        }
        for k in (0..200).step_by(2) {
            s.remove(&k);
        }
        for k in 200..260 {
            s.insert(k);
        }
        let hasher = *s.hasher();
        s.table.check_invariants(|e| hasher.hash(e));
    }
}
