use log::{debug, info, warn};

use crate::button::{is_valid_button, GridPos};
use crate::clock::Clock;
use crate::errors::GridError;
use crate::input::{Command, InputEvent, InputStateEncoder, PackedInputState, StateTransitionTranslator};
use crate::lock_pool::{ParamKind, ParameterLockPool};
use crate::mode::{Mode, ModeStateMachine, TransitionResult};
use crate::resolution::{Pattern, ResolutionCache, ResolvedParameters, TrackDefaults};
use crate::some_or_continue;
use crate::{Config, STEPS, TRACKS};

/// Wires the input pipeline to the sequencer state.
///
/// Every raw event goes through the encoder and the translator, and the resulting commands are
/// applied here: toggles edit the pattern, lock entry and exit drive the mode machine, and
/// adjustments edit the held step's lock record. The controller is the only writer of the lock
/// pool, and it invalidates cached resolutions before the data behind them changes.
pub struct Controller<C: Clock + Clone> {
    clock: C,
    config: Config,
    encoder: InputStateEncoder,
    translator: StateTransitionTranslator,
    modes: ModeStateMachine,
    pool: ParameterLockPool,
    cache: ResolutionCache<C>,
    pattern: Pattern,
    track_defaults: [TrackDefaults; TRACKS],
    input_state: PackedInputState,
}

impl<C: Clock + Clone> Controller<C> {
    pub fn new(clock: C) -> Self {
        Self::with_config(clock, Config::default())
    }

    pub fn with_config(clock: C, config: Config) -> Self {
        Self {
            cache: ResolutionCache::from_config(clock.clone(), &config),
            clock,
            config,
            encoder: InputStateEncoder::from_config(&config),
            translator: StateTransitionTranslator::from_config(&config),
            modes: ModeStateMachine::from_config(&config),
            pool: ParameterLockPool::new(),
            pattern: Pattern::new(),
            track_defaults: [TrackDefaults::default(); TRACKS],
            input_state: PackedInputState::default(),
        }
    }

    /// Feeds one raw event through the pipeline and applies the resulting commands in order.
    ///
    /// Returns the commands that were applied. If applying one fails, the remaining ones are
    /// dropped and the error is returned; sequencing state stays consistent either way.
    pub fn handle_event(&mut self, event: InputEvent) -> Result<Vec<Command>, GridError> {
        if !is_valid_button(event.button()) {
            return Err(GridError::InvalidButton(event.button()));
        }

        let now = self.clock.now_ms();
        let previous = self.input_state;
        self.input_state = self.encoder.encode(event, previous);

        let commands = self.translator.translate(self.input_state, previous, now);
        for &command in &commands {
            self.apply(command, now)?;
        }
        Ok(commands)
    }

    /// Periodic housekeeping. Returns true if a parameter lock session was force-closed.
    pub fn tick(&mut self) -> bool {
        let now = self.clock.now_ms();
        let closed = self.modes.update(now);
        if closed {
            self.input_state = self.encoder.clear_lock(self.input_state);
            info!("Parameter lock session closed at {}ms", now);
        }
        closed
    }

    /// Tracks the shift modifier and moves in and out of [`Mode::ShiftControl`]. The shift flag
    /// of the input state only changes if the mode change is allowed.
    pub fn set_shift(&mut self, pressed: bool) -> Result<(), GridError> {
        let target = if pressed { Mode::ShiftControl } else { Mode::Normal };
        if self.modes.current_mode() != target {
            self.enter_mode(target)?;
        }
        self.input_state = self.encoder.set_shift(self.input_state, pressed);
        Ok(())
    }

    /// Table-checked switch to any mode other than [`Mode::ParameterLock`]. Leaving a parameter
    /// lock session this way closes it like a lock exit.
    pub fn enter_mode(&mut self, mode: Mode) -> Result<(), GridError> {
        let from = self.modes.current_mode();
        match self.modes.transition_to(mode, self.clock.now_ms()) {
            TransitionResult::Success => {
                if from == Mode::ParameterLock {
                    self.input_state = self.encoder.clear_lock(self.input_state);
                }
                Ok(())
            }
            TransitionResult::Blocked => Err(GridError::TransitionBlocked { from, to: mode }),
            TransitionResult::InvalidMode => Err(GridError::InvalidMode),
        }
    }

    /// Resolves `step` on all tracks ahead of playback
    pub fn prepare_step_column(&mut self, step: u8) {
        self.cache
            .prepare_next_step(step, &self.pattern, &self.track_defaults, &self.pool);
    }

    /// Parameters to play `(track, step)` with, or `None` if the step is off, its track is muted
    /// or the position is out of range. A cell that wasn't prepared in time is resolved on the
    /// spot.
    pub fn trigger(&mut self, track: u8, step: u8) -> Option<ResolvedParameters> {
        let step_data = *self.pattern.get(track, step)?;
        let defaults = self.track_defaults[track as usize];
        if !step_data.active || defaults.muted {
            return None;
        }

        if !self.cache.is_valid(track, step) {
            debug!("({}, {}) not prepared before trigger", track, step);
            self.cache
                .prepare_step(track, step, &step_data, &defaults, &self.pool);
        }
        Some(*self.cache.get_parameters(track, step))
    }

    pub fn clear_step_locks(&mut self, track: u8, step: u8) -> Result<(), GridError> {
        let cell = self
            .pattern
            .get_mut(track, step)
            .ok_or(GridError::InvalidPosition { track, step })?;

        let index = cell.lock.take().or_else(|| self.pool.find_lock(track, step));
        if let Some(index) = index {
            self.cache.invalidate_step(track, step);
            self.pool.deallocate(index);
        }
        Ok(())
    }

    pub fn clear_track_locks(&mut self, track: u8) -> Result<(), GridError> {
        if track as usize >= TRACKS {
            return Err(GridError::InvalidPosition { track, step: 0 });
        }
        self.cache.invalidate_track(track);
        for step in 0..STEPS as u8 {
            let cell = some_or_continue!(self.pattern.get_mut(track, step));
            cell.lock = None;
            let index = some_or_continue!(self.pool.find_lock(track, step));
            self.pool.deallocate(index);
        }
        Ok(())
    }

    pub fn clear_all_locks(&mut self) {
        self.cache.invalidate_all();
        self.pool.clear_all();
        for track in 0..TRACKS as u8 {
            for cell in self.pattern.track_mut(track).into_iter().flatten() {
                cell.lock = None;
            }
        }
    }

    /// Gives `to` a copy of the lock of `from`. If `from` has no lock, `to` loses its own.
    pub fn copy_step_locks(&mut self, from: GridPos, to: GridPos) -> Result<(), GridError> {
        if from == to {
            return Ok(());
        }

        let source = match self.pool.find_lock(from.track, from.step) {
            Some(index) => self.pool.get(index).copied(),
            None => None,
        };
        let source = match source {
            Some(source) => source,
            None => return self.clear_step_locks(to.track, to.step),
        };

        self.cache.invalidate_step(to.track, to.step);
        let index = self.pool.allocate(to.track, to.step)?;
        if let Some(record) = self.pool.get_mut(index) {
            record.active_mask = source.active_mask;
            record.note_offset = source.note_offset;
            record.velocity = source.velocity;
            record.length = source.length;
            record.probability = source.probability;
        }
        if let Some(cell) = self.pattern.get_mut(to.track, to.step) {
            cell.lock = Some(index);
        }
        Ok(())
    }

    pub fn set_track_defaults(&mut self, track: u8, defaults: TrackDefaults) -> Result<(), GridError> {
        let slot = self
            .track_defaults
            .get_mut(track as usize)
            .ok_or(GridError::InvalidPosition { track, step: 0 })?;
        *slot = defaults;
        self.cache.invalidate_track(track);
        Ok(())
    }

    pub fn set_step_active(&mut self, track: u8, step: u8, active: bool) -> Result<(), GridError> {
        let cell = self
            .pattern
            .get_mut(track, step)
            .ok_or(GridError::InvalidPosition { track, step })?;
        cell.active = active;
        Ok(())
    }

    pub fn is_in_control_region(&self, button: u8) -> bool {
        self.modes.is_in_control_region(button)
    }

    pub fn mode(&self) -> Mode {
        self.modes.current_mode()
    }

    pub fn modes(&self) -> &ModeStateMachine {
        &self.modes
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn pool(&self) -> &ParameterLockPool {
        &self.pool
    }

    pub fn cache(&self) -> &ResolutionCache<C> {
        &self.cache
    }

    pub fn input_state(&self) -> PackedInputState {
        self.input_state
    }

    pub fn track_defaults(&self, track: u8) -> Option<&TrackDefaults> {
        self.track_defaults.get(track as usize)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn apply(&mut self, command: Command, now: u32) -> Result<(), GridError> {
        match command {
            Command::ToggleStep { track, step } => {
                let cell = self
                    .pattern
                    .get_mut(track, step)
                    .ok_or(GridError::InvalidPosition { track, step })?;
                cell.active = !cell.active;
                debug!("Step ({}, {}) is now {}", track, step, if cell.active { "on" } else { "off" });
            }
            Command::EnterParamLock { track, step } => {
                let from = self.modes.current_mode();
                let result = self.modes.enter_parameter_lock_mode(track, step, now);
                if !result.is_success() {
                    // keep the input state in line with the mode machine
                    self.input_state = self.encoder.clear_lock(self.input_state);
                }
                match result {
                    TransitionResult::Success => info!("Editing step ({}, {})", track, step),
                    TransitionResult::Blocked => {
                        return Err(GridError::TransitionBlocked {
                            from,
                            to: Mode::ParameterLock,
                        })
                    }
                    TransitionResult::InvalidMode => {
                        return Err(GridError::InvalidPosition { track, step })
                    }
                }
            }
            Command::ExitParamLock => {
                if !self.modes.exit_parameter_lock_mode(now).is_success() {
                    warn!("Lock exit while in {} mode", self.modes.current_mode().name());
                }
                self.input_state = self.encoder.clear_lock(self.input_state);
            }
            Command::AdjustParameter { kind, delta } => self.adjust(kind, delta)?,
        }
        Ok(())
    }

    fn adjust(&mut self, kind: u8, delta: i8) -> Result<(), GridError> {
        if !self.modes.is_in_parameter_lock() {
            return Err(GridError::NoActiveLock);
        }
        let param = ParamKind::from_adjust_kind(kind).ok_or(GridError::InvalidParameterKind(kind))?;
        let context = *self.modes.lock_context();
        let (track, step) = (context.held_track, context.held_step);

        let index = self.pool.allocate(track, step)?;
        if let Some(cell) = self.pattern.get_mut(track, step) {
            cell.lock = Some(index);
        }
        self.cache.invalidate_step(track, step);
        if let Some(record) = self.pool.get_mut(index) {
            record.adjust(param, delta);
            debug!("Lock {} of ({}, {}) now {:?}", index, track, step, record);
        }
        Ok(())
    }
}
