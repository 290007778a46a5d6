//! Fixed-capacity storage for per-step parameter overrides.

use log::{debug, trace, warn};

use crate::button::is_valid_position;
use crate::errors::GridError;
use crate::{INVALID_INDEX, MAX_LOCKS};

/// Lockable parameters. The discriminant is the bit of the kind in [`LockRecord::active_mask`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
pub enum ParamKind {
    Note = 0x01,
    Velocity = 0x02,
    Length = 0x04,
    Probability = 0x08,
    MicroTiming = 0x10,
    CcValue = 0x20,
    Ratchet = 0x40,
    Slide = 0x80,
}

impl ParamKind {
    pub fn bit(self) -> u16 {
        self as u16
    }

    /// Maps the `kind` of an adjustment command (the row of the pressed control button, plus
    /// one) to the parameter it edits
    pub fn from_adjust_kind(kind: u8) -> Option<Self> {
        Some(match kind {
            1 => Self::Note,
            2 => Self::Velocity,
            3 => Self::Length,
            4 => Self::Probability,
            _ => return None,
        })
    }
}

impl std::convert::TryFrom<u8> for ParamKind {
    type Error = GridError;

    fn try_from(kind: u8) -> Result<Self, Self::Error> {
        Self::from_adjust_kind(kind).ok_or(GridError::InvalidParameterKind(kind))
    }
}

pub const NOTE_OFFSET_RANGE: (i8, i8) = (-64, 63);
pub const MAX_VELOCITY: u8 = 127;
pub const MAX_PROBABILITY: u8 = 100;

/// The overrides of one step. Only the fields whose kind is set in `active_mask` apply.
///
/// The owning position and the in-use flag are managed by the [`ParameterLockPool`] and are
/// read-only from outside of it.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LockRecord {
    pub active_mask: u16,
    /// Semitones added to the track's base note
    pub note_offset: i8,
    pub velocity: u8,
    /// Gate length in ticks
    pub length: u8,
    /// Chance in percent that the step fires
    pub probability: u8,
    step_index: u8,
    track_index: u8,
    in_use: bool,
}

impl Default for LockRecord {
    fn default() -> Self {
        Self {
            active_mask: 0,
            note_offset: 0,
            velocity: 100,
            length: 12,
            probability: MAX_PROBABILITY,
            step_index: INVALID_INDEX,
            track_index: INVALID_INDEX,
            in_use: false,
        }
    }
}

impl LockRecord {
    /// Track of the step owning this record, set at allocation
    pub fn track_index(&self) -> u8 {
        self.track_index
    }

    pub fn step_index(&self) -> u8 {
        self.step_index
    }

    pub fn is_in_use(&self) -> bool {
        self.in_use
    }

    pub fn has(&self, kind: ParamKind) -> bool {
        self.active_mask & kind.bit() != 0
    }

    pub fn set(&mut self, kind: ParamKind) {
        self.active_mask |= kind.bit();
    }

    pub fn clear(&mut self, kind: ParamKind) {
        self.active_mask &= !kind.bit();
    }

    /// Nudges the value of `kind` by `delta`, clamped to the field's range, and marks the kind
    /// active. Kinds without a stored value only get their bit set.
    pub fn adjust(&mut self, kind: ParamKind, delta: i8) {
        match kind {
            ParamKind::Note => {
                let (min, max) = NOTE_OFFSET_RANGE;
                self.note_offset = self.note_offset.saturating_add(delta).clamp(min, max);
            }
            ParamKind::Velocity => {
                self.velocity = offset_u8(self.velocity, delta).min(MAX_VELOCITY);
            }
            ParamKind::Length => {
                self.length = offset_u8(self.length, delta);
            }
            ParamKind::Probability => {
                self.probability = offset_u8(self.probability, delta).min(MAX_PROBABILITY);
            }
            _ => {}
        }
        self.set(kind);
    }

    pub fn is_valid(&self) -> bool {
        let (min, max) = NOTE_OFFSET_RANGE;
        self.in_use
            && is_valid_position(self.track_index, self.step_index)
            && (min..=max).contains(&self.note_offset)
            && self.velocity <= MAX_VELOCITY
            && self.probability <= MAX_PROBABILITY
    }
}

fn offset_u8(value: u8, delta: i8) -> u8 {
    if delta < 0 {
        value.saturating_sub(delta.unsigned_abs())
    } else {
        value.saturating_add(delta as u8)
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PoolStats {
    pub total_slots: usize,
    pub used_slots: usize,
    pub free_slots: usize,
    pub utilization: f32,
    pub total_allocations: u32,
    pub total_deallocations: u32,
    pub failed_allocations: u32,
    pub integrity_valid: bool,
}

/// 64 [`LockRecord`] slots with an index free list.
///
/// Free slots are handed out round-robin so that the same few slots aren't reused over and over.
/// A step owns at most one slot: allocating for a position that already has a lock returns the
/// existing index.
#[derive(Debug, Clone)]
pub struct ParameterLockPool {
    slots: [LockRecord; MAX_LOCKS],
    // number of slots in circulation, MAX_LOCKS outside of tests
    capacity: usize,
    free_list: [u8; MAX_LOCKS],
    free_count: usize,
    next_alloc: usize,
    total_allocations: u32,
    total_deallocations: u32,
    failed_allocations: u32,
}

impl Default for ParameterLockPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterLockPool {
    pub fn new() -> Self {
        Self::sized(MAX_LOCKS)
    }

    /// A pool that only hands out the first `capacity` slots, so that exhaustion can be reached
    /// with the 32 positions of the grid
    #[cfg(test)]
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self::sized(capacity)
    }

    fn sized(capacity: usize) -> Self {
        let mut pool = Self {
            slots: [LockRecord::default(); MAX_LOCKS],
            capacity: capacity.clamp(1, MAX_LOCKS),
            free_list: [INVALID_INDEX; MAX_LOCKS],
            free_count: 0,
            next_alloc: 0,
            total_allocations: 0,
            total_deallocations: 0,
            failed_allocations: 0,
        };
        pool.reset_free_list();
        pool
    }

    /// Returns the slot index of the lock for `(track, step)`, allocating one if necessary
    pub fn allocate(&mut self, track: u8, step: u8) -> Result<u8, GridError> {
        if !is_valid_position(track, step) {
            self.failed_allocations += 1;
            return Err(GridError::InvalidPosition { track, step });
        }

        if let Some(existing) = self.find_lock(track, step) {
            trace!("Reusing lock {} for ({}, {})", existing, track, step);
            return Ok(existing);
        }

        let index = match self.pop_free() {
            Some(index) => index,
            None => {
                self.failed_allocations += 1;
                warn!("Lock pool exhausted, cannot lock ({}, {})", track, step);
                return Err(GridError::PoolExhausted);
            }
        };

        self.slots[index as usize] = LockRecord {
            track_index: track,
            step_index: step,
            in_use: true,
            ..LockRecord::default()
        };
        self.total_allocations += 1;
        debug!("Allocated lock {} for ({}, {})", index, track, step);
        Ok(index)
    }

    /// Frees the slot. Unknown or already free indices are ignored.
    pub fn deallocate(&mut self, index: u8) {
        if !self.is_valid_index(index) || self.free_count >= self.capacity {
            return;
        }

        self.slots[index as usize] = LockRecord::default();
        self.free_list[self.free_count] = index;
        self.free_count += 1;
        self.total_deallocations += 1;
        debug!("Freed lock {}", index);
    }

    /// True if `index` refers to an allocated slot
    pub fn is_valid_index(&self, index: u8) -> bool {
        (index as usize) < MAX_LOCKS && self.slots[index as usize].in_use
    }

    pub fn get(&self, index: u8) -> Option<&LockRecord> {
        self.slots.get(index as usize).filter(|record| record.in_use)
    }

    pub fn get_mut(&mut self, index: u8) -> Option<&mut LockRecord> {
        self.slots.get_mut(index as usize).filter(|record| record.in_use)
    }

    pub fn find_lock(&self, track: u8, step: u8) -> Option<u8> {
        if !is_valid_position(track, step) {
            return None;
        }
        self.slots
            .iter()
            .position(|r| r.in_use && r.track_index == track && r.step_index == step)
            .map(|i| i as u8)
    }

    pub fn used_count(&self) -> usize {
        self.capacity - self.free_count
    }

    pub fn free_count(&self) -> usize {
        self.free_count
    }

    /// Fraction of slots in use, from 0.0 to 1.0
    pub fn utilization(&self) -> f32 {
        self.used_count() as f32 / self.capacity as f32
    }

    pub fn is_full(&self) -> bool {
        self.free_count == 0
    }

    pub fn is_empty(&self) -> bool {
        self.free_count == self.capacity
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            total_slots: self.capacity,
            used_slots: self.used_count(),
            free_slots: self.free_count,
            utilization: self.utilization(),
            total_allocations: self.total_allocations,
            total_deallocations: self.total_deallocations,
            failed_allocations: self.failed_allocations,
            integrity_valid: self.validate_integrity(),
        }
    }

    /// Cross-checks the slots against the free list
    pub fn validate_integrity(&self) -> bool {
        let used = self.slots.iter().filter(|r| r.in_use).count();
        if used + self.free_count != self.capacity {
            return false;
        }

        if self.slots.iter().any(|r| r.in_use && !r.is_valid()) {
            return false;
        }

        let mut seen = [false; MAX_LOCKS];
        for &index in &self.free_list[..self.free_count] {
            let index = index as usize;
            if index >= MAX_LOCKS || seen[index] || self.slots[index].in_use {
                return false;
            }
            seen[index] = true;
        }

        true
    }

    /// Frees every slot. The allocation counters are kept.
    pub fn clear_all(&mut self) {
        self.slots = [LockRecord::default(); MAX_LOCKS];
        self.reset_free_list();
        debug!("Cleared all locks");
    }

    /// Allocated slots as `(index, record)`, in slot order
    pub fn iter(&self) -> impl Iterator<Item = (u8, &LockRecord)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, r)| r.in_use)
            .map(|(i, r)| (i as u8, r))
    }

    fn reset_free_list(&mut self) {
        for (i, entry) in self.free_list.iter_mut().enumerate() {
            *entry = if i < self.capacity { i as u8 } else { INVALID_INDEX };
        }
        self.free_count = self.capacity;
        self.next_alloc = 0;
    }

    fn pop_free(&mut self) -> Option<u8> {
        if self.free_count == 0 {
            return None;
        }

        let position = self.next_alloc % self.free_count;
        let index = self.free_list[position];
        let last = self.free_count - 1;
        self.free_list[position] = self.free_list[last];
        self.free_list[last] = INVALID_INDEX;
        self.free_count = last;
        self.next_alloc = (self.next_alloc + 1) % MAX_LOCKS;

        Some(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{STEPS, TRACKS};
    use nanorand::{Rng, WyRand};

    fn fill_grid(pool: &mut ParameterLockPool) {
        for track in 0..TRACKS as u8 {
            for step in 0..STEPS as u8 {
                pool.allocate(track, step).unwrap();
            }
        }
    }

    /// Fills a small pool with locks on the first `capacity` steps of track 0
    fn exhausted_pool(capacity: u8) -> ParameterLockPool {
        let mut pool = ParameterLockPool::with_capacity(capacity as usize);
        for step in 0..capacity {
            pool.allocate(0, step).unwrap();
        }
        pool
    }

    #[test]
    fn allocation_is_idempotent_per_position() {
        let mut pool = ParameterLockPool::new();
        let first = pool.allocate(2, 3).unwrap();
        let second = pool.allocate(2, 3).unwrap();
        assert_eq!(first, second);
        assert_eq!(pool.used_count(), 1);
        assert_eq!(pool.stats().total_allocations, 1);
    }

    #[test]
    fn new_lock_has_defaults_and_back_references() {
        let mut pool = ParameterLockPool::new();
        let index = pool.allocate(3, 7).unwrap();
        let record = pool.get(index).unwrap();
        assert_eq!(record.active_mask, 0);
        assert_eq!(record.velocity, 100);
        assert_eq!(record.length, 12);
        assert_eq!(record.probability, 100);
        assert_eq!((record.track_index, record.step_index), (3, 7));
        assert!(record.is_valid());
    }

    #[test]
    fn out_of_range_position_counts_as_failure() {
        let mut pool = ParameterLockPool::new();
        assert_eq!(
            pool.allocate(4, 0),
            Err(GridError::InvalidPosition { track: 4, step: 0 })
        );
        assert_eq!(pool.allocate(0, 8).unwrap_err(), GridError::InvalidPosition { track: 0, step: 8 });
        assert_eq!(pool.stats().failed_allocations, 2);
        assert!(pool.is_empty());
    }

    #[test]
    fn exhaustion_and_recovery() {
        let mut pool = exhausted_pool(4);
        assert!(pool.is_full());
        assert_eq!(pool.utilization(), 1.0);
        assert_eq!(pool.allocate(2, 2), Err(GridError::PoolExhausted));
        assert_eq!(pool.stats().failed_allocations, 1);
        assert_eq!(pool.find_lock(2, 2), None);

        let freed = pool.find_lock(0, 1).unwrap();
        pool.deallocate(freed);
        assert_eq!(pool.allocate(2, 2), Ok(freed));
        assert!(pool.is_full());
        assert!(pool.validate_integrity());
    }

    #[test]
    fn existing_lock_is_returned_even_when_full() {
        let mut pool = exhausted_pool(3);
        let index = pool.find_lock(0, 2).unwrap();
        assert_eq!(pool.allocate(0, 2), Ok(index));
        assert_eq!(pool.stats().failed_allocations, 0);
    }

    #[test]
    fn edits_keep_back_references() {
        let mut pool = ParameterLockPool::new();
        let index = pool.allocate(1, 1).unwrap();
        {
            let record = pool.get_mut(index).unwrap();
            record.adjust(ParamKind::Note, 5);
            record.velocity = 30;
            assert_eq!((record.track_index(), record.step_index()), (1, 1));
            assert!(record.is_in_use());
        }

        assert_eq!(pool.find_lock(1, 1), Some(index));
        assert_eq!(pool.allocate(1, 1), Ok(index));
        assert_eq!(pool.used_count(), 1);
        assert!(pool.validate_integrity());
    }

    #[test]
    fn deallocate_resets_and_ignores_bad_indices() {
        let mut pool = ParameterLockPool::new();
        let index = pool.allocate(1, 1).unwrap();
        pool.get_mut(index).unwrap().adjust(ParamKind::Velocity, 10);

        pool.deallocate(index);
        assert!(pool.get(index).is_none());
        assert!(!pool.is_valid_index(index));
        assert_eq!(pool.find_lock(1, 1), None);

        pool.deallocate(index);
        pool.deallocate(INVALID_INDEX);
        pool.deallocate(200);
        assert_eq!(pool.stats().total_deallocations, 1);
        assert_eq!(pool.free_count(), MAX_LOCKS);
        assert!(pool.validate_integrity());
    }

    #[test]
    fn adjust_clamps_to_field_ranges() {
        let mut record = LockRecord::default();
        for _ in 0..100 {
            record.adjust(ParamKind::Note, 1);
            record.adjust(ParamKind::Velocity, 1);
            record.adjust(ParamKind::Probability, 1);
        }
        assert_eq!(record.note_offset, 63);
        assert_eq!(record.velocity, 127);
        assert_eq!(record.probability, 100);

        for _ in 0..200 {
            record.adjust(ParamKind::Note, -1);
            record.adjust(ParamKind::Length, -1);
        }
        assert_eq!(record.note_offset, -64);
        assert_eq!(record.length, 0);

        assert!(record.has(ParamKind::Note));
        assert!(record.has(ParamKind::Length));
        assert!(!record.has(ParamKind::Slide));
        record.clear(ParamKind::Note);
        assert!(!record.has(ParamKind::Note));
    }

    #[test]
    fn adjust_kind_mapping() {
        use std::convert::TryFrom;

        assert_eq!(ParamKind::from_adjust_kind(1), Some(ParamKind::Note));
        assert_eq!(ParamKind::from_adjust_kind(4), Some(ParamKind::Probability));
        assert_eq!(ParamKind::from_adjust_kind(0), None);
        assert_eq!(ParamKind::try_from(5), Err(GridError::InvalidParameterKind(5)));
    }

    #[test]
    fn clear_all_keeps_counters() {
        let mut pool = ParameterLockPool::new();
        fill_grid(&mut pool);
        pool.clear_all();
        assert!(pool.is_empty());
        assert_eq!(pool.iter().count(), 0);
        assert_eq!(pool.stats().total_allocations, 32);
        assert!(pool.validate_integrity());
    }

    #[test]
    fn random_churn_keeps_pool_consistent() {
        let mut rng = WyRand::new_seed(0x5EED);
        let mut pool = ParameterLockPool::new();

        for _ in 0..5000 {
            if rng.generate_range(0u8..3) == 0 {
                pool.deallocate(rng.generate_range(0u8..MAX_LOCKS as u8 + 8));
            } else {
                let track = rng.generate_range(0u8..TRACKS as u8 + 1);
                let step = rng.generate_range(0u8..STEPS as u8 + 1);
                let before = pool.find_lock(track, step);
                match pool.allocate(track, step) {
                    Ok(index) => {
                        if let Some(existing) = before {
                            assert_eq!(index, existing);
                        }
                        assert_eq!(pool.find_lock(track, step), Some(index));
                    }
                    Err(err) => assert!(matches!(err, GridError::InvalidPosition { .. })),
                }
            }
            assert_eq!(pool.used_count() + pool.free_count(), MAX_LOCKS);
            assert!(pool.validate_integrity());
        }
    }
}
