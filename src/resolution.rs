//! Precomputed per-step playback parameters.
//!
//! Resolving a step means starting from its track's [`TrackDefaults`] and overlaying the step's
//! [`LockRecord`], if it has one. That work happens ahead of time in
//! [`ResolutionCache::prepare_step`], so reading the result at trigger time is a plain array
//! lookup.

use log::{trace, warn};

use crate::button::is_valid_position;
use crate::clock::Clock;
use crate::lock_pool::{LockRecord, ParamKind, ParameterLockPool, MAX_VELOCITY};
use crate::util::Grid;
use crate::{Config, REAL_TIME_BUDGET_US, STEPS, TRACKS};

pub const MAX_NOTE: u8 = 127;
pub const MAX_CHANNEL: u8 = 15;

/// Per-track base values for every step of that track
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackDefaults {
    pub note: u8,
    pub velocity: u8,
    pub length: u8,
    pub channel: u8,
    pub muted: bool,
    pub volume: u8,
}

impl Default for TrackDefaults {
    fn default() -> Self {
        Self {
            note: 60,
            velocity: 100,
            length: 12,
            channel: 0,
            muted: false,
            volume: 127,
        }
    }
}

/// One cell of a pattern
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StepData {
    pub active: bool,
    /// Slot of this step's lock in the [`ParameterLockPool`]
    pub lock: Option<u8>,
}

pub type Pattern = Grid<StepData>;

/// The final values a step plays with
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResolvedParameters {
    pub note: u8,
    pub velocity: u8,
    pub length: u8,
    pub channel: u8,
    pub valid: bool,
    /// Time of resolution in milliseconds, 0 while invalid
    pub resolved_at: u32,
}

/// Returned for out-of-range lookups
pub const DEFAULT_PARAMETERS: ResolvedParameters = ResolvedParameters {
    note: 60,
    velocity: 100,
    length: 12,
    channel: 0,
    valid: false,
    resolved_at: 0,
};

impl Default for ResolvedParameters {
    fn default() -> Self {
        DEFAULT_PARAMETERS
    }
}

impl ResolvedParameters {
    pub fn from_defaults(defaults: &TrackDefaults) -> Self {
        Self {
            note: defaults.note.min(MAX_NOTE),
            velocity: defaults.velocity.min(MAX_VELOCITY),
            length: defaults.length,
            channel: defaults.channel.min(MAX_CHANNEL),
            ..DEFAULT_PARAMETERS
        }
    }

    /// Overlays the active fields of `lock`
    pub fn apply_lock(mut self, lock: &LockRecord) -> Self {
        if !lock.is_in_use() {
            return self;
        }
        if lock.has(ParamKind::Note) {
            let note = self.note as i16 + lock.note_offset as i16;
            self.note = note.clamp(0, MAX_NOTE as i16) as u8;
        }
        if lock.has(ParamKind::Velocity) {
            self.velocity = lock.velocity.min(MAX_VELOCITY);
        }
        if lock.has(ParamKind::Length) {
            self.length = lock.length;
        }
        self
    }

    fn invalidate(&mut self) {
        self.valid = false;
        self.resolved_at = 0;
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub total_resolutions: u32,
    pub hits: u32,
    pub misses: u32,
    /// `hits / (hits + misses)`, 0 before the first lookup
    pub hit_rate: f32,
    pub max_resolve_us: u32,
    pub avg_resolve_us: u32,
    /// Number of cells invalidated, counting each cell of a bulk invalidation
    pub invalidations: u32,
    /// Set once any resolution exceeded the real time budget; only cleared by `reset_stats`
    pub real_time_violation: bool,
}

#[derive(Debug)]
pub struct ResolutionCache<C: Clock> {
    clock: C,
    cells: Grid<ResolvedParameters>,
    cache_lifetime_ms: u32,
    stats: CacheStats,
}

impl<C: Clock> ResolutionCache<C> {
    pub fn new(clock: C) -> Self {
        Self::with_lifetime(clock, Config::DEFAULT_CACHE_LIFETIME_MS)
    }

    pub fn with_lifetime(clock: C, cache_lifetime_ms: u32) -> Self {
        Self {
            clock,
            cells: Grid::new(),
            cache_lifetime_ms,
            stats: CacheStats::default(),
        }
    }

    pub fn from_config(clock: C, config: &Config) -> Self {
        Self::with_lifetime(clock, config.cache_lifetime_ms)
    }

    pub fn cache_lifetime_ms(&self) -> u32 {
        self.cache_lifetime_ms
    }

    /// 0 disables expiry; entries then stay fresh until invalidated
    pub fn set_cache_lifetime(&mut self, ms: u32) {
        self.cache_lifetime_ms = ms;
    }

    /// Makes sure `(track, step)` holds a fresh resolution. The lock is looked up in `pool` only
    /// when the cell actually has to be recomputed.
    pub fn prepare_step(
        &mut self,
        track: u8,
        step: u8,
        step_data: &StepData,
        defaults: &TrackDefaults,
        pool: &ParameterLockPool,
    ) {
        if !is_valid_position(track, step) {
            return;
        }

        let now = self.clock.now_ms();
        if self.is_fresh(track, step, now) {
            self.stats.hits += 1;
            self.update_hit_rate();
            return;
        }
        self.stats.misses += 1;

        let start_us = self.clock.now_us();
        let lock = step_data.lock.and_then(|index| pool.get(index));
        let mut resolved = ResolvedParameters::from_defaults(defaults);
        if let Some(lock) = lock {
            resolved = resolved.apply_lock(lock);
        }
        resolved.valid = true;
        resolved.resolved_at = now;
        self.cells.set(track, step, resolved);
        let elapsed_us = self.clock.now_us().saturating_sub(start_us);

        trace!("Resolved ({}, {}) -> {:?} in {}us", track, step, resolved, elapsed_us);
        self.record_resolution(elapsed_us);
    }

    /// Prepares `step` on every track, typically one step ahead of the playhead
    pub fn prepare_next_step(
        &mut self,
        step: u8,
        pattern: &Pattern,
        defaults: &[TrackDefaults; TRACKS],
        pool: &ParameterLockPool,
    ) {
        if step as usize >= STEPS {
            return;
        }
        for track in 0..TRACKS as u8 {
            if let Some(step_data) = pattern.get(track, step) {
                let step_data = *step_data;
                self.prepare_step(track, step, &step_data, &defaults[track as usize], pool);
            }
        }
    }

    /// Hot path read. Returns whatever is cached, fresh or not; out-of-range positions yield
    /// [`DEFAULT_PARAMETERS`].
    pub fn get_parameters(&self, track: u8, step: u8) -> &ResolvedParameters {
        self.cells.get(track, step).unwrap_or(&DEFAULT_PARAMETERS)
    }

    /// True if the cell holds a resolution that hasn't expired
    pub fn is_valid(&self, track: u8, step: u8) -> bool {
        is_valid_position(track, step) && self.is_fresh(track, step, self.clock.now_ms())
    }

    pub fn invalidate_step(&mut self, track: u8, step: u8) {
        if let Some(cell) = self.cells.get_mut(track, step) {
            cell.invalidate();
            self.stats.invalidations += 1;
        }
    }

    pub fn invalidate_track(&mut self, track: u8) {
        if let Some(cells) = self.cells.track_mut(track) {
            cells.iter_mut().for_each(ResolvedParameters::invalidate);
            self.stats.invalidations += STEPS as u32;
        }
    }

    pub fn invalidate_all(&mut self) {
        for track in 0..TRACKS as u8 {
            self.invalidate_track(track);
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = CacheStats::default();
    }

    /// Checks every valid cell for out-of-range values
    pub fn validate_cache(&self) -> bool {
        self.cells.iter().all(|(_, _, cell)| {
            !cell.valid
                || (cell.note <= MAX_NOTE
                    && cell.velocity <= MAX_VELOCITY
                    && cell.channel <= MAX_CHANNEL)
        })
    }

    fn is_fresh(&self, track: u8, step: u8, now: u32) -> bool {
        let cell = match self.cells.get(track, step) {
            Some(cell) if cell.valid => cell,
            _ => return false,
        };
        self.cache_lifetime_ms == 0 || now.wrapping_sub(cell.resolved_at) <= self.cache_lifetime_ms
    }

    fn record_resolution(&mut self, elapsed_us: u64) {
        let elapsed_us = elapsed_us.min(u32::MAX as u64) as u32;
        let stats = &mut self.stats;

        stats.total_resolutions += 1;
        stats.max_resolve_us = stats.max_resolve_us.max(elapsed_us);
        let n = stats.total_resolutions as u64;
        stats.avg_resolve_us = ((stats.avg_resolve_us as u64 * (n - 1) + elapsed_us as u64) / n) as u32;

        if elapsed_us as u64 > REAL_TIME_BUDGET_US && !stats.real_time_violation {
            warn!(
                "Parameter resolution took {}us, over the {}us budget",
                elapsed_us, REAL_TIME_BUDGET_US
            );
            stats.real_time_violation = true;
        }

        self.update_hit_rate();
    }

    fn update_hit_rate(&mut self) {
        let total = self.stats.hits + self.stats.misses;
        if total > 0 {
            self.stats.hit_rate = self.stats.hits as f32 / total as f32;
        }
    }
}
