//! The flat table engine: Robin Hood probing, backshift erasure, doubling
//! rehash and raw iteration over the slot array.
//!
//! # Probing
//!
//! A key's home is `hash & (slot_count - 1)`; `slot_count` is a power of
//! two so the mask is exact. A probe starts at the home with distance 1 and
//! walks forward one slot at a time, wrapping with the same mask. The
//! standing invariant is the Robin Hood one: a probe at distance `d` that
//! meets a slot whose own distance is below `d` can stop, because an
//! insertion of the probed key would have displaced that slot's occupant.
//!
//! Insertion displaces the shallower occupant and keeps walking with the
//! evicted pair (tail propagation); erasure shifts the rest of the chain
//! back one slot so lookups stay tight. Both operations leave every chain
//! distance-monotone.
//!
//! # Load
//!
//! `capacity = slot_count / 2`. An insert that would push `len` past the
//! capacity doubles the array and restarts from the new home. The load
//! ceiling of 0.5 keeps empty slots frequent, which bounds probe lengths
//! and guarantees the wrap-around walks below terminate.

use crate::slots::{Dist, Slot, SlotAlloc, EMPTY, SENTINEL};
use std::marker::PhantomData;
use std::mem;
use std::ptr::NonNull;

/// Smallest slot count a table ever holds.
pub const MIN_SLOT_COUNT: usize = 32;

/// The fixed load ceiling: a table rehashes rather than fill past half of
/// its addressable slots.
pub const MAX_LOAD_FACTOR: f32 = 0.5;

/// The slot-array engine under [`Set`](crate::Set) and [`Map`](crate::Map).
///
/// Stores bare elements `E`; the facades supply hashing and key equality
/// as closures so one engine serves both `K` sets and `(K, V)` maps.
pub(crate) struct RawTable<E, A: SlotAlloc> {
    slots: NonNull<Slot<E>>,
    slot_count: usize,
    len: usize,
    alloc: A,
}

// The buffer is exclusively owned; sharing a `&RawTable` shares only reads.
unsafe impl<E: Send, A: SlotAlloc + Send> Send for RawTable<E, A> {}
unsafe impl<E: Sync, A: SlotAlloc + Sync> Sync for RawTable<E, A> {}

impl<E, A: SlotAlloc> RawTable<E, A> {
    pub(crate) fn with_capacity_in(capacity: usize, alloc: A) -> Self {
        Self::with_slot_count(Self::target_slot_count(2 * capacity, 0), alloc)
    }

    /// Allocates `slot_count + 1` zeroed records and plants the sentinel.
    fn with_slot_count(slot_count: usize, alloc: A) -> Self {
        debug_assert!(slot_count.is_power_of_two());
        debug_assert!(slot_count >= MIN_SLOT_COUNT);
        let slots = alloc.alloc::<E>(slot_count + 1);
        unsafe { (*slots.as_ptr().add(slot_count)).dist = SENTINEL };
        Self {
            slots,
            slot_count,
            len: 0,
            alloc,
        }
    }

    /// Slot count that holds `requested` slots worth of keys without
    /// breaking the load ceiling for `len` live elements: a power of two,
    /// at least `2 * len`, never below [`MIN_SLOT_COUNT`].
    fn target_slot_count(requested: usize, len: usize) -> usize {
        requested
            .max(2 * len)
            .next_power_of_two()
            .max(MIN_SLOT_COUNT)
    }

    #[inline]
    fn mask(&self) -> usize {
        self.slot_count - 1
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn slot_count(&self) -> usize {
        self.slot_count
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.slot_count / 2
    }

    #[inline]
    unsafe fn slot(&self, i: usize) -> &Slot<E> {
        debug_assert!(i <= self.slot_count);
        &*self.slots.as_ptr().add(i)
    }

    #[inline]
    unsafe fn slot_ptr(&self, i: usize) -> *mut Slot<E> {
        debug_assert!(i <= self.slot_count);
        self.slots.as_ptr().add(i)
    }

    /// # Safety
    /// Slot `i` must be occupied.
    #[inline]
    pub(crate) unsafe fn get_unchecked(&self, i: usize) -> &E {
        self.slot(i).get()
    }

    /// # Safety
    /// Slot `i` must be occupied.
    #[inline]
    pub(crate) unsafe fn get_unchecked_mut(&mut self, i: usize) -> &mut E {
        (*self.slot_ptr(i)).get_mut()
    }

    // ── lookup ───────────────────────────────────────────────────────────

    /// Index of the element matching `eq`, probing from `hash`'s home.
    pub(crate) fn find(&self, hash: usize, mut eq: impl FnMut(&E) -> bool) -> Option<usize> {
        let mask = self.mask();
        let mut i = hash & mask;
        let mut d: Dist = 1;
        loop {
            let slot = unsafe { self.slot(i) };
            if slot.dist < d {
                // Empty, or a shallower chain: the key would have been
                // placed here. Absent.
                return None;
            }
            // Equal keys share a home, hence a distance; only a slot at
            // exactly `d` can hold a match.
            if slot.dist == d && eq(unsafe { slot.get() }) {
                return Some(i);
            }
            i = (i + 1) & mask;
            d += 1;
            debug_assert!(d as usize <= self.slot_count, "runaway probe");
        }
    }

    pub(crate) fn get(&self, hash: usize, eq: impl FnMut(&E) -> bool) -> Option<&E> {
        let i = self.find(hash, eq)?;
        Some(unsafe { self.get_unchecked(i) })
    }

    pub(crate) fn get_mut(&mut self, hash: usize, eq: impl FnMut(&E) -> bool) -> Option<&mut E> {
        let i = self.find(hash, eq)?;
        Some(unsafe { self.get_unchecked_mut(i) })
    }

    // ── insertion ────────────────────────────────────────────────────────

    /// Inserts `elem` unless an element `same` to it is already present.
    ///
    /// Returns the element's slot index, plus `Some(elem)` handed back when
    /// the table already held a match. `same` receives `(existing, new)`;
    /// `hash_of` re-hashes displaced elements when the insert forces a
    /// resize.
    pub(crate) fn insert(
        &mut self,
        hash: usize,
        elem: E,
        mut same: impl FnMut(&E, &E) -> bool,
        mut hash_of: impl FnMut(&E) -> usize,
    ) -> (usize, Option<E>) {
        loop {
            let mask = self.mask();
            let mut i = hash & mask;
            let mut d: Dist = 1;
            loop {
                let slot = unsafe { &mut *self.slot_ptr(i) };
                if slot.dist < d {
                    // Insertion point: an empty slot, or a shallower entry
                    // to displace.
                    if self.len >= self.capacity() {
                        break; // double, then retry from the new home
                    }
                    if slot.dist == EMPTY {
                        slot.fill(d, elem);
                    } else {
                        let evicted_dist = slot.dist;
                        let evicted = mem::replace(unsafe { slot.get_mut() }, elem);
                        slot.dist = d;
                        unsafe { self.propagate((i + 1) & mask, evicted_dist + 1, evicted) };
                    }
                    self.len += 1;
                    return (i, None);
                }
                if slot.dist == d && same(unsafe { slot.get() }, &elem) {
                    return (i, Some(elem));
                }
                i = (i + 1) & mask;
                d += 1;
                if d == SENTINEL {
                    break; // distance metadata exhausted; double and retry
                }
            }
            self.grow(&mut hash_of);
        }
    }

    /// Tail propagation: walk forward from `i`, dropping `(elem, d)` into
    /// the first empty slot and swapping with any shallower entry met on
    /// the way. Shared by displacement and rehash.
    ///
    /// # Safety
    /// The table must hold at least one empty slot.
    unsafe fn propagate(&mut self, mut i: usize, mut d: Dist, mut elem: E) {
        let mask = self.mask();
        loop {
            let slot = &mut *self.slot_ptr(i);
            if slot.dist == EMPTY {
                slot.fill(d, elem);
                return;
            }
            if slot.dist < d {
                mem::swap(&mut elem, slot.get_mut());
                mem::swap(&mut d, &mut slot.dist);
            }
            i = (i + 1) & mask;
            d += 1;
            debug_assert!(d < SENTINEL, "probe distance exhausted while propagating");
        }
    }

    // ── erasure ──────────────────────────────────────────────────────────

    pub(crate) fn remove(&mut self, hash: usize, eq: impl FnMut(&E) -> bool) -> Option<E> {
        let i = self.find(hash, eq)?;
        Some(unsafe { self.remove_at(i) })
    }

    /// Removes the element at slot `i` and backshift-compacts the rest of
    /// the chain: every following slot at distance > 1 moves back one
    /// position. The walk stops at an empty slot or a chain head, both of
    /// which exist before the wrap completes.
    ///
    /// # Safety
    /// Slot `i` must be occupied.
    pub(crate) unsafe fn remove_at(&mut self, mut i: usize) -> E {
        let mask = self.mask();
        let out = (*self.slot_ptr(i)).take();
        loop {
            let next = (i + 1) & mask;
            let next_slot = &mut *self.slot_ptr(next);
            if next_slot.dist <= 1 {
                break; // empty, or already sitting on its home
            }
            let dist = next_slot.dist - 1;
            let elem = next_slot.take();
            (*self.slot_ptr(i)).fill(dist, elem);
            i = next;
        }
        self.len -= 1;
        out
    }

    /// Keeps only elements for which `keep` returns true, erasing the rest
    /// chain by chain.
    pub(crate) fn retain(&mut self, mut keep: impl FnMut(&mut E) -> bool) {
        if self.len == 0 {
            return;
        }
        let mask = self.mask();
        // Scan from an empty slot: chains never cross one, so a backshift
        // can only pull elements out of positions not yet visited.
        let mut start = 0;
        while unsafe { self.slot(start) }.dist != EMPTY {
            start += 1;
        }
        let mut i = start;
        for _ in 0..self.slot_count {
            i = (i + 1) & mask;
            loop {
                let slot = unsafe { &mut *self.slot_ptr(i) };
                if slot.dist == EMPTY {
                    break;
                }
                if keep(unsafe { slot.get_mut() }) {
                    break;
                }
                unsafe { drop(self.remove_at(i)) };
                // The backshift may have pulled the chain's next element
                // into this slot; examine it before moving on.
            }
        }
    }

    /// Drops every element, keeping the array.
    pub(crate) fn clear(&mut self) {
        let mut remaining = self.len;
        let mut i = 0;
        while remaining > 0 {
            let slot = unsafe { &mut *self.slot_ptr(i) };
            if slot.is_occupied() {
                unsafe { drop(slot.take()) };
                remaining -= 1;
            }
            i += 1;
        }
        self.len = 0;
    }

    // ── resizing ─────────────────────────────────────────────────────────

    fn grow(&mut self, hash_of: &mut impl FnMut(&E) -> usize) {
        self.resize_to(self.slot_count * 2, hash_of);
    }

    /// Resizes to `target_slot_count(requested, len)`; no-op when the
    /// target equals the current slot count.
    pub(crate) fn rehash(&mut self, requested: usize, mut hash_of: impl FnMut(&E) -> usize) {
        let target = Self::target_slot_count(requested, self.len);
        if target != self.slot_count {
            self.resize_to(target, &mut hash_of);
        }
    }

    /// Ensures `capacity` keys fit without another resize. Never shrinks;
    /// shrinking is only ever explicit, through [`Self::rehash`].
    pub(crate) fn reserve(&mut self, capacity: usize, hash_of: impl FnMut(&E) -> usize) {
        if capacity > self.capacity() {
            self.rehash(2 * capacity, hash_of);
        }
    }

    /// Moves every element into a fresh array of `new_slot_count + 1`
    /// slots by tail propagation. No key comparisons: a rehash never meets
    /// a duplicate.
    fn resize_to(&mut self, new_slot_count: usize, hash_of: &mut impl FnMut(&E) -> usize) {
        debug_assert!(new_slot_count >= 2 * self.len);
        let mut new = Self::with_slot_count(new_slot_count, self.alloc.clone());
        let new_mask = new.mask();
        let mut remaining = self.len;
        let mut i = 0;
        while remaining > 0 {
            let slot = unsafe { &mut *self.slot_ptr(i) };
            if slot.is_occupied() {
                let elem = unsafe { slot.take() };
                let home = hash_of(&elem) & new_mask;
                unsafe { new.propagate(home, 1, elem) };
                new.len += 1;
                remaining -= 1;
            }
            i += 1;
        }
        self.len = 0;
        // `new` walks away with the drained old array and frees it.
        mem::swap(self, &mut new);
    }

    // ── iteration ────────────────────────────────────────────────────────

    pub(crate) fn iter(&self) -> RawIter<'_, E> {
        RawIter {
            slot: self.slots.as_ptr(),
            remaining: self.len,
            _marker: PhantomData,
        }
    }

    pub(crate) fn iter_mut(&mut self) -> RawIterMut<'_, E> {
        RawIterMut {
            slot: self.slots.as_ptr(),
            remaining: self.len,
            _marker: PhantomData,
        }
    }

    pub(crate) fn into_iter(self) -> RawIntoIter<E, A> {
        RawIntoIter { table: self, i: 0 }
    }
}

impl<E, A: SlotAlloc> RawTable<E, A> {
    /// Fresh array of the same slot count with every element cloned into
    /// the same position. Same hashes, same mask, same layout.
    pub(crate) fn clone_in(&self) -> Self
    where
        E: Clone,
    {
        let mut new = Self::with_slot_count(self.slot_count, self.alloc.clone());
        for i in 0..self.slot_count {
            let src = unsafe { self.slot(i) };
            if src.is_occupied() {
                let dst = unsafe { &mut *new.slot_ptr(i) };
                dst.fill(src.dist, unsafe { src.get() }.clone());
                new.len += 1;
            }
        }
        new
    }
}

impl<E, A: SlotAlloc> Drop for RawTable<E, A> {
    fn drop(&mut self) {
        if mem::needs_drop::<E>() {
            self.clear();
        }
        unsafe { self.alloc.dealloc(self.slots, self.slot_count + 1) };
    }
}

// ── raw iterators ────────────────────────────────────────────────────────

/// Shared iterator over occupied slots, terminated by the sentinel.
pub(crate) struct RawIter<'a, E> {
    slot: *const Slot<E>,
    remaining: usize,
    _marker: PhantomData<&'a Slot<E>>,
}

impl<'a, E> Iterator for RawIter<'a, E> {
    type Item = &'a E;

    fn next(&mut self) -> Option<&'a E> {
        loop {
            let slot = unsafe { &*self.slot };
            if slot.dist == SENTINEL {
                return None;
            }
            self.slot = unsafe { self.slot.add(1) };
            if slot.dist != EMPTY {
                self.remaining -= 1;
                return Some(unsafe { slot.get() });
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<E> ExactSizeIterator for RawIter<'_, E> {}
impl<E> std::iter::FusedIterator for RawIter<'_, E> {}

impl<E> Clone for RawIter<'_, E> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot,
            remaining: self.remaining,
            _marker: PhantomData,
        }
    }
}

/// Exclusive iterator over occupied slots.
pub(crate) struct RawIterMut<'a, E> {
    slot: *mut Slot<E>,
    remaining: usize,
    _marker: PhantomData<&'a mut Slot<E>>,
}

impl<'a, E> Iterator for RawIterMut<'a, E> {
    type Item = &'a mut E;

    fn next(&mut self) -> Option<&'a mut E> {
        loop {
            let slot = unsafe { &mut *self.slot };
            if slot.dist == SENTINEL {
                return None;
            }
            self.slot = unsafe { self.slot.add(1) };
            if slot.dist != EMPTY {
                self.remaining -= 1;
                return Some(unsafe { slot.get_mut() });
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<E> ExactSizeIterator for RawIterMut<'_, E> {}
impl<E> std::iter::FusedIterator for RawIterMut<'_, E> {}

/// Owning iterator: moves payloads out slot by slot. Whatever it does not
/// yield is dropped with the table.
pub(crate) struct RawIntoIter<E, A: SlotAlloc> {
    table: RawTable<E, A>,
    i: usize,
}

impl<E, A: SlotAlloc> Iterator for RawIntoIter<E, A> {
    type Item = E;

    fn next(&mut self) -> Option<E> {
        while self.i < self.table.slot_count {
            let slot = unsafe { &mut *self.table.slot_ptr(self.i) };
            self.i += 1;
            if slot.is_occupied() {
                self.table.len -= 1;
                return Some(unsafe { slot.take() });
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.table.len, Some(self.table.len))
    }
}

impl<E, A: SlotAlloc> ExactSizeIterator for RawIntoIter<E, A> {}
impl<E, A: SlotAlloc> std::iter::FusedIterator for RawIntoIter<E, A> {}

// ── test support ─────────────────────────────────────────────────────────

#[cfg(test)]
impl<E, A: SlotAlloc> RawTable<E, A> {
    pub(crate) fn dist_at(&self, i: usize) -> Dist {
        unsafe { self.slot(i) }.dist
    }

    /// Checks every structural invariant of the slot array.
    pub(crate) fn check_invariants(&self, mut hash_of: impl FnMut(&E) -> usize) {
        let mask = self.mask();
        let mut occupied = 0;
        for i in 0..self.slot_count {
            let slot = unsafe { self.slot(i) };
            if slot.dist == EMPTY {
                continue;
            }
            assert_ne!(slot.dist, SENTINEL, "sentinel value inside the array at {i}");
            occupied += 1;

            let d = slot.dist as usize;
            assert!(d <= self.slot_count, "distance beyond the slot count at {i}");
            let home = hash_of(unsafe { slot.get() }) & mask;
            assert_eq!(
                (i + 1 + self.slot_count - d) & mask,
                home,
                "home mismatch at slot {i}"
            );

            // Distance-monotone chains: after an empty slot a chain starts
            // at 1, and a distance never jumps by more than one.
            let prev = unsafe { self.slot((i + self.slot_count - 1) & mask) };
            if prev.is_occupied() {
                assert!(
                    slot.dist <= prev.dist + 1,
                    "distance gap between slots {} and {i}",
                    (i + self.slot_count - 1) & mask
                );
            } else {
                assert_eq!(slot.dist, 1, "chain at slot {i} does not start on its home");
            }
        }
        assert_eq!(occupied, self.len, "len does not match occupied slots");
        assert!(self.len <= self.capacity(), "load ceiling exceeded");
        assert_eq!(
            unsafe { self.slot(self.slot_count) }.dist,
            SENTINEL,
            "sentinel overwritten"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slots::Heap;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn ident(e: &u64) -> usize {
        *e as usize
    }

    fn table() -> RawTable<u64, Heap> {
        RawTable::with_capacity_in(0, Heap)
    }

    #[test]
    fn test_new_table_shape() {
        let t = table();
        assert_eq!(t.slot_count(), MIN_SLOT_COUNT);
        assert_eq!(t.capacity(), MIN_SLOT_COUNT / 2);
        assert_eq!(t.len(), 0);
        t.check_invariants(ident);
    }

    #[test]
    fn test_insert_find_remove_roundtrip() {
        let mut t = table();
        for k in 0..10u64 {
            let (_, rejected) = t.insert(k as usize, k, |a, b| a == b, ident);
            assert!(rejected.is_none());
        }
        assert_eq!(t.len(), 10);
        for k in 0..10u64 {
            assert_eq!(t.get(k as usize, |e| *e == k), Some(&k));
        }
        assert_eq!(t.get(99, |e| *e == 99), None);
        assert_eq!(t.remove(3, |e| *e == 3), Some(3));
        assert_eq!(t.remove(3, |e| *e == 3), None);
        assert_eq!(t.len(), 9);
        t.check_invariants(ident);
    }

    #[test]
    fn test_duplicate_insert_hands_element_back() {
        let mut t = table();
        let (i, rejected) = t.insert(7, 7, |a, b| a == b, ident);
        assert!(rejected.is_none());
        let (j, rejected) = t.insert(7, 7, |a, b| a == b, ident);
        assert_eq!(rejected, Some(7));
        assert_eq!(i, j);
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn test_collision_chain_distances() {
        // Keys 0, s, 2s, ... all share home 0; Robin Hood packs them at
        // distances 1..=16.
        let mut t = table();
        let s = t.slot_count() as u64;
        for k in 0..16 {
            t.insert((k * s) as usize, k * s, |a, b| a == b, ident);
        }
        assert_eq!(t.slot_count() as u64, s, "chain fits without a resize");
        for i in 0..16 {
            assert_eq!(t.dist_at(i), i as Dist + 1);
        }
        t.check_invariants(ident);

        // Erasing the head backshifts the whole chain.
        assert_eq!(t.remove(0, |e| *e == 0), Some(0));
        for i in 0..15 {
            assert_eq!(t.dist_at(i), i as Dist + 1);
        }
        assert_eq!(t.dist_at(15), EMPTY);
        t.check_invariants(ident);
    }

    #[test]
    fn test_backshift_stops_at_chain_head() {
        let mut t = table();
        let s = t.slot_count() as u64;
        // A two-element chain at home 0, then an unrelated key at its own
        // home 2. Erasing the chain head must not disturb slot 2.
        t.insert(0, 0, |a, b| a == b, ident);
        t.insert(s as usize, s, |a, b| a == b, ident);
        t.insert(2, 2, |a, b| a == b, ident);
        assert_eq!(t.dist_at(2), 1);
        t.remove(0, |e| *e == 0);
        assert_eq!(t.dist_at(0), 1); // s moved home
        assert_eq!(t.dist_at(1), EMPTY);
        assert_eq!(t.dist_at(2), 1);
        t.check_invariants(ident);
    }

    #[test]
    fn test_wraparound_chain() {
        // Keys homing on the last slot wrap to the front of the array.
        let mut t = table();
        let s = t.slot_count() as u64;
        let last = s - 1;
        t.insert(last as usize, last, |a, b| a == b, ident);
        t.insert((last + s) as usize, last + s, |a, b| a == b, ident);
        t.insert((last + 2 * s) as usize, last + 2 * s, |a, b| a == b, ident);
        assert_eq!(t.dist_at(last as usize), 1);
        assert_eq!(t.dist_at(0), 2);
        assert_eq!(t.dist_at(1), 3);
        t.check_invariants(ident);

        assert_eq!(t.get((last + 2 * s) as usize, |e| *e == last + 2 * s), Some(&(last + 2 * s)));
        t.remove(last as usize, |e| *e == last);
        assert_eq!(t.dist_at(last as usize), 1);
        assert_eq!(t.dist_at(0), 2);
        assert_eq!(t.dist_at(1), EMPTY);
        t.check_invariants(ident);
    }

    #[test]
    fn test_grow_preserves_elements() {
        let mut t = table();
        for k in 0..100u64 {
            t.insert(k as usize, k, |a, b| a == b, ident);
        }
        assert_eq!(t.len(), 100);
        assert_eq!(t.slot_count(), 256);
        for k in 0..100u64 {
            assert!(t.get(k as usize, |e| *e == k).is_some());
        }
        t.check_invariants(ident);
    }

    #[test]
    fn test_rehash_floor_and_noop() {
        let mut t = table();
        t.rehash(0, ident);
        assert_eq!(t.slot_count(), MIN_SLOT_COUNT);

        for k in 0..128u64 {
            t.insert(k as usize, k, |a, b| a == b, ident);
        }
        assert_eq!(t.slot_count(), 256);
        // 2 * len == 256 already: a shrink request is a no-op.
        t.rehash(0, ident);
        assert_eq!(t.slot_count(), 256);
        // An explicit larger request is honored.
        t.rehash(1024, ident);
        assert_eq!(t.slot_count(), 1024);
        for k in 0..128u64 {
            assert!(t.get(k as usize, |e| *e == k).is_some());
        }
        t.check_invariants(ident);
    }

    #[test]
    fn test_reserve_prevents_resizes() {
        let mut t = table();
        t.reserve(1000, ident);
        let slots = t.slot_count();
        assert!(slots >= 2048);
        for k in 0..1000u64 {
            t.insert(k as usize, k, |a, b| a == b, ident);
        }
        assert_eq!(t.slot_count(), slots);
    }

    #[test]
    fn test_clear_keeps_array() {
        let mut t = table();
        for k in 0..50u64 {
            t.insert(k as usize, k, |a, b| a == b, ident);
        }
        let slots = t.slot_count();
        t.clear();
        assert_eq!(t.len(), 0);
        assert_eq!(t.slot_count(), slots);
        assert_eq!(t.iter().count(), 0);
        t.check_invariants(ident);
    }

    #[test]
    fn test_retain_chain_safety() {
        let mut t = table();
        let s = t.slot_count() as u64;
        // Mix a long collision chain with scattered singletons.
        for k in 0..8 {
            t.insert((k * s) as usize, k * s, |a, b| a == b, ident);
        }
        for k in [3u64, 9, 17, 25] {
            t.insert(k as usize, k, |a, b| a == b, ident);
        }
        t.retain(|e| *e % (2 * s) == 0 || *e < s);
        for k in 0..8 {
            let key = k * s;
            let expect = key % (2 * s) == 0 || key < s;
            assert_eq!(t.get(key as usize, |e| *e == key).is_some(), expect, "key {key}");
        }
        t.check_invariants(ident);
    }

    #[test]
    fn test_iter_yields_each_once() {
        let mut t = table();
        for k in 0..40u64 {
            t.insert(k as usize, k, |a, b| a == b, ident);
        }
        let mut seen: Vec<u64> = t.iter().copied().collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..40).collect::<Vec<_>>());
        assert_eq!(t.iter().len(), 40);
    }

    #[test]
    fn test_into_iter_moves_everything() {
        let mut t: RawTable<String, Heap> = RawTable::with_capacity_in(0, Heap);
        let h = |e: &String| e.len();
        for word in ["satu", "dua", "tiga", "empat"] {
            t.insert(word.len(), word.to_string(), |a, b| a == b, h);
        }
        let mut words: Vec<String> = t.into_iter().collect();
        words.sort();
        assert_eq!(words, ["dua", "empat", "satu", "tiga"]);
    }

    #[test]
    fn test_clone_reproduces_layout() {
        let mut t = table();
        for k in 0..60u64 {
            t.insert(k as usize, k, |a, b| a == b, ident);
        }
        let c = t.clone_in();
        assert_eq!(c.len(), t.len());
        assert_eq!(c.slot_count(), t.slot_count());
        for i in 0..t.slot_count() {
            assert_eq!(c.dist_at(i), t.dist_at(i));
        }
        c.check_invariants(ident);
    }

    #[test]
    fn test_randomized_against_std() {
        let mut rng = StdRng::seed_from_u64(0x5EED);
        let mut t = table();
        let mut model = std::collections::HashSet::new();
        for _ in 0..4000 {
            let k = rng.gen_range(0..512u64);
            if rng.gen_bool(0.6) {
                let (_, rejected) = t.insert(k as usize, k, |a, b| a == b, ident);
                assert_eq!(rejected.is_none(), model.insert(k));
            } else {
                assert_eq!(t.remove(k as usize, |e| *e == k).is_some(), model.remove(&k));
            }
        }
        assert_eq!(t.len(), model.len());
        for k in 0..512u64 {
            assert_eq!(t.get(k as usize, |e| *e == k).is_some(), model.contains(&k));
        }
        t.check_invariants(ident);
    }
}
