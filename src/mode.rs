//! The operating-mode state machine.
//!
//! The sequencer is always in exactly one [`Mode`]. Transitions between modes are checked
//! against a static legality table; the only transition that bypasses the table is the forced
//! return to [`Mode::Normal`] after a parameter lock session timed out or was found corrupt.

use log::{debug, warn};

use crate::button::{is_valid_position, HALF_WIDTH};
use crate::{Config, STEPS, TRACKS};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Mode {
    /// Regular step sequencing
    Normal,
    /// A step is held and its parameters are being edited
    ParameterLock,
    PatternSelect,
    ShiftControl,
    Settings,
}

impl Mode {
    pub const COUNT: usize = 5;

    pub const ALL: [Mode; Mode::COUNT] = [
        Mode::Normal,
        Mode::ParameterLock,
        Mode::PatternSelect,
        Mode::ShiftControl,
        Mode::Settings,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::ParameterLock => "PARAMETER_LOCK",
            Self::PatternSelect => "PATTERN_SELECT",
            Self::ShiftControl => "SHIFT_CONTROL",
            Self::Settings => "SETTINGS",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl Default for Mode {
    fn default() -> Self {
        Self::Normal
    }
}

// Rows are the current mode, columns the target mode, both in `Mode::ALL` order:
//                         NORMAL PLOCK  PATSEL SHIFT  SETTINGS
const TRANSITIONS: [[bool; Mode::COUNT]; Mode::COUNT] = [
    /* NORMAL         */ [true, true, true, true, true],
    /* PARAMETER_LOCK */ [true, false, false, false, false],
    /* PATTERN_SELECT */ [true, false, true, false, false],
    /* SHIFT_CONTROL  */ [true, true, true, true, true],
    /* SETTINGS       */ [true, false, false, false, true],
];

/// Outcome of a requested mode transition
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TransitionResult {
    Success,
    /// The request itself was malformed (bad track/step, or not in the mode to leave)
    InvalidMode,
    /// The legality table forbids the transition from the current mode
    Blocked,
}

impl TransitionResult {
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

/// State of an open parameter lock session. Only meaningful while the machine is in
/// [`Mode::ParameterLock`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct LockContext {
    pub active: bool,
    pub held_track: u8,
    pub held_step: u8,
    /// First column of the control region, either 0 or 4
    pub control_region_start: u8,
    pub opened_at_ms: u32,
    /// 0 disables the timeout
    pub timeout_ms: u32,
    /// Mode to return to when the session is closed normally
    pub previous_mode: Mode,
}

impl Default for LockContext {
    fn default() -> Self {
        Self {
            active: false,
            held_track: 0xFF,
            held_step: 0xFF,
            control_region_start: 0,
            opened_at_ms: 0,
            timeout_ms: Config::DEFAULT_LOCK_TIMEOUT_MS,
            previous_mode: Mode::Normal,
        }
    }
}

impl LockContext {
    pub fn is_valid(&self) -> bool {
        is_valid_position(self.held_track, self.held_step)
            && (self.control_region_start == 0 || self.control_region_start == HALF_WIDTH)
    }

    /// Button id of the held step, or `None` if the context is invalid
    pub fn held_button(&self) -> Option<u8> {
        if !self.is_valid() {
            return None;
        }
        Some(self.held_track * STEPS as u8 + self.held_step)
    }
}

/// The control region always sits on the half of the grid opposite the held step, so the
/// editing hand never covers the held button.
pub fn control_region_start(held_step: u8) -> u8 {
    if held_step < HALF_WIDTH {
        HALF_WIDTH
    } else {
        0
    }
}

#[derive(Debug, Clone)]
pub struct ModeStateMachine {
    current: Mode,
    previous: Mode,
    mode_entered_at_ms: u32,
    lock: LockContext,
}

impl Default for ModeStateMachine {
    fn default() -> Self {
        Self::new(Config::DEFAULT_LOCK_TIMEOUT_MS)
    }
}

impl ModeStateMachine {
    pub fn new(lock_timeout_ms: u32) -> Self {
        Self {
            current: Mode::Normal,
            previous: Mode::Normal,
            mode_entered_at_ms: 0,
            lock: LockContext {
                timeout_ms: lock_timeout_ms,
                ..LockContext::default()
            },
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.lock_timeout_ms)
    }

    pub fn current_mode(&self) -> Mode {
        self.current
    }

    pub fn previous_mode(&self) -> Mode {
        self.previous
    }

    /// Time of the last successful transition, as passed to the transition call
    pub fn mode_entered_at_ms(&self) -> u32 {
        self.mode_entered_at_ms
    }

    pub fn lock_context(&self) -> &LockContext {
        &self.lock
    }

    pub fn set_lock_timeout(&mut self, timeout_ms: u32) {
        self.lock.timeout_ms = timeout_ms;
    }

    pub fn is_in_parameter_lock(&self) -> bool {
        self.current == Mode::ParameterLock && self.lock.active
    }

    pub fn can_transition_to(&self, mode: Mode) -> bool {
        TRANSITIONS[self.current.index()][mode.index()]
    }

    /// Generic table-checked transition. Parameter lock sessions must be opened through
    /// [`Self::enter_parameter_lock_mode`], since they need a held step.
    pub fn transition_to(&mut self, mode: Mode, now: u32) -> TransitionResult {
        if mode == Mode::ParameterLock {
            return TransitionResult::InvalidMode;
        }
        self.checked_transition(mode, now)
    }

    pub fn enter_parameter_lock_mode(&mut self, track: u8, step: u8, now: u32) -> TransitionResult {
        if track as usize >= TRACKS || step as usize >= STEPS {
            warn!("Refusing parameter lock for out-of-range step ({}, {})", track, step);
            return TransitionResult::InvalidMode;
        }

        if !self.can_transition_to(Mode::ParameterLock) {
            warn!(
                "Parameter lock blocked while in {} mode",
                self.current.name()
            );
            return TransitionResult::Blocked;
        }

        self.lock = LockContext {
            active: true,
            held_track: track,
            held_step: step,
            control_region_start: control_region_start(step),
            opened_at_ms: now,
            timeout_ms: self.lock.timeout_ms,
            previous_mode: self.current,
        };

        let result = self.checked_transition(Mode::ParameterLock, now);
        if !result.is_success() {
            self.lock.active = false;
        }
        result
    }

    /// Closes the lock session and returns to the mode it was opened from
    pub fn exit_parameter_lock_mode(&mut self, now: u32) -> TransitionResult {
        if self.current != Mode::ParameterLock {
            return TransitionResult::InvalidMode;
        }

        let target = self.lock.previous_mode;
        self.lock.active = false;
        // the table only lets PARAMETER_LOCK return to NORMAL, but a session opened from
        // SHIFT_CONTROL goes back there
        self.enter(target, now);
        TransitionResult::Success
    }

    /// Unconditionally returns to [`Mode::Normal`], bypassing the legality table
    pub fn force_exit_to_normal(&mut self, now: u32) {
        self.lock.active = false;
        self.enter(Mode::Normal, now);
    }

    pub fn has_timed_out(&self, now: u32) -> bool {
        if self.current != Mode::ParameterLock || self.lock.timeout_ms == 0 {
            return false;
        }
        now.wrapping_sub(self.lock.opened_at_ms) >= self.lock.timeout_ms
    }

    /// Polled once per tick. Returns true if a lock session was force-closed, either because it
    /// timed out or because its context turned out to be invalid.
    pub fn update(&mut self, now: u32) -> bool {
        if self.current != Mode::ParameterLock {
            return false;
        }

        if self.has_timed_out(now) {
            debug!(
                "Parameter lock on ({}, {}) timed out after {}ms",
                self.lock.held_track,
                self.lock.held_step,
                now.wrapping_sub(self.lock.opened_at_ms)
            );
            self.force_exit_to_normal(now);
            return true;
        }

        if !self.lock.active || !self.lock.is_valid() {
            warn!("Invalid parameter lock context {:?}, forcing NORMAL mode", self.lock);
            self.force_exit_to_normal(now);
            return true;
        }

        false
    }

    /// True only in parameter lock mode, for buttons whose column lies in the control region
    pub fn is_in_control_region(&self, button: u8) -> bool {
        if !self.is_in_parameter_lock() || !crate::button::is_valid_button(button) {
            return false;
        }
        let column = crate::button::column(button);
        let start = self.lock.control_region_start;
        column >= start && column < start + HALF_WIDTH
    }

    /// The 16 button ids of the current control region, row by row. Empty outside of a lock
    /// session.
    pub fn control_region_buttons(&self) -> Vec<u8> {
        if !self.is_in_parameter_lock() {
            return Vec::new();
        }
        let start = self.lock.control_region_start;
        (0..TRACKS as u8)
            .flat_map(|row| (start..start + HALF_WIDTH).map(move |col| row * STEPS as u8 + col))
            .collect()
    }

    /// Checks that the lock flag agrees with the current mode
    pub fn validate_state(&self) -> bool {
        match self.current {
            Mode::ParameterLock => self.lock.active && self.lock.is_valid(),
            _ => !self.lock.active,
        }
    }

    fn checked_transition(&mut self, mode: Mode, now: u32) -> TransitionResult {
        if !self.can_transition_to(mode) {
            warn!(
                "Blocked mode transition {} -> {}",
                self.current.name(),
                mode.name()
            );
            return TransitionResult::Blocked;
        }
        self.enter(mode, now);
        TransitionResult::Success
    }

    fn enter(&mut self, mode: Mode, now: u32) {
        if self.current == Mode::ParameterLock && mode != Mode::ParameterLock {
            self.lock.active = false;
        }
        debug!("Mode {} -> {}", self.current.name(), mode.name());
        self.previous = self.current;
        self.current = mode;
        self.mode_entered_at_ms = now;
    }

    #[cfg(test)]
    pub(crate) fn corrupt_lock_context(&mut self, track: u8, step: u8) {
        self.lock.held_track = track;
        self.lock.held_step = step;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_in_normal_mode() {
        let machine = ModeStateMachine::default();
        assert_eq!(machine.current_mode(), Mode::Normal);
        assert!(!machine.lock_context().active);
        assert!(machine.validate_state());
    }

    #[test]
    fn enter_lock_computes_opposite_control_region() {
        let mut machine = ModeStateMachine::default();
        assert_eq!(machine.enter_parameter_lock_mode(1, 2, 0), TransitionResult::Success);
        assert_eq!(machine.current_mode(), Mode::ParameterLock);
        assert_eq!(machine.lock_context().control_region_start, 4);
        assert!(machine.is_in_control_region(4));
        assert!(machine.is_in_control_region(31));
        assert!(!machine.is_in_control_region(10));
        assert!(!machine.is_in_control_region(32));

        machine.exit_parameter_lock_mode(10);
        assert_eq!(machine.enter_parameter_lock_mode(0, 6, 20), TransitionResult::Success);
        assert_eq!(machine.lock_context().control_region_start, 0);
        assert!(machine.is_in_control_region(24));
        assert!(!machine.is_in_control_region(6));
    }

    #[test]
    fn control_region_lists_sixteen_buttons() {
        let mut machine = ModeStateMachine::default();
        assert!(machine.control_region_buttons().is_empty());
        machine.enter_parameter_lock_mode(3, 7, 0);
        let buttons = machine.control_region_buttons();
        assert_eq!(buttons.len(), 16);
        assert_eq!(&buttons[..5], &[0, 1, 2, 3, 8]);
        assert!(buttons.iter().all(|&b| machine.is_in_control_region(b)));
    }

    #[test]
    fn out_of_range_lock_is_rejected_without_state_change() {
        let mut machine = ModeStateMachine::default();
        assert_eq!(machine.enter_parameter_lock_mode(4, 0, 0), TransitionResult::InvalidMode);
        assert_eq!(machine.enter_parameter_lock_mode(0, 8, 0), TransitionResult::InvalidMode);
        assert_eq!(machine.current_mode(), Mode::Normal);
        assert!(!machine.lock_context().active);
    }

    #[test]
    fn lock_is_blocked_from_settings() {
        let mut machine = ModeStateMachine::default();
        assert!(machine.transition_to(Mode::Settings, 0).is_success());
        assert_eq!(machine.enter_parameter_lock_mode(0, 0, 5), TransitionResult::Blocked);
        assert_eq!(machine.current_mode(), Mode::Settings);
        assert!(!machine.lock_context().active);
    }

    #[test]
    fn no_cross_jumps_while_editing() {
        let mut machine = ModeStateMachine::default();
        machine.enter_parameter_lock_mode(0, 0, 0);
        for mode in [Mode::PatternSelect, Mode::ShiftControl, Mode::Settings] {
            assert_eq!(machine.transition_to(mode, 1), TransitionResult::Blocked);
            assert_eq!(machine.current_mode(), Mode::ParameterLock);
        }
        assert_eq!(machine.enter_parameter_lock_mode(1, 1, 1), TransitionResult::Blocked);
        assert_eq!(machine.lock_context().held_track, 0);
    }

    #[test]
    fn transition_table_matches_documented_connectivity() {
        let mut machine = ModeStateMachine::default();
        assert!(Mode::ALL.iter().all(|&m| machine.can_transition_to(m)));

        machine.transition_to(Mode::PatternSelect, 0);
        assert!(machine.can_transition_to(Mode::Normal));
        assert!(machine.can_transition_to(Mode::PatternSelect));
        assert!(!machine.can_transition_to(Mode::Settings));

        machine.transition_to(Mode::Normal, 0);
        machine.transition_to(Mode::ShiftControl, 0);
        assert!(Mode::ALL.iter().all(|&m| machine.can_transition_to(m)));
    }

    #[test]
    fn exit_returns_to_mode_the_lock_was_opened_from() {
        let mut machine = ModeStateMachine::default();
        machine.transition_to(Mode::ShiftControl, 0);
        machine.enter_parameter_lock_mode(2, 3, 100);
        assert_eq!(machine.lock_context().previous_mode, Mode::ShiftControl);

        assert!(machine.exit_parameter_lock_mode(200).is_success());
        assert_eq!(machine.current_mode(), Mode::ShiftControl);
        assert_eq!(machine.previous_mode(), Mode::ParameterLock);
        assert!(!machine.lock_context().active);
        assert!(machine.validate_state());
    }

    #[test]
    fn exit_outside_lock_is_invalid() {
        let mut machine = ModeStateMachine::default();
        assert_eq!(machine.exit_parameter_lock_mode(0), TransitionResult::InvalidMode);
    }

    #[test]
    fn timeout_forces_normal_mode() {
        let mut machine = ModeStateMachine::new(1000);
        machine.transition_to(Mode::ShiftControl, 0);
        machine.enter_parameter_lock_mode(0, 1, 1000);
        assert!(!machine.update(1999));
        assert_eq!(machine.current_mode(), Mode::ParameterLock);
        assert!(machine.update(2100));
        assert_eq!(machine.current_mode(), Mode::Normal);
        assert!(!machine.lock_context().active);
    }

    #[test]
    fn zero_timeout_never_expires() {
        let mut machine = ModeStateMachine::new(0);
        machine.enter_parameter_lock_mode(0, 1, 0);
        assert!(!machine.update(u32::MAX));
        assert!(machine.is_in_parameter_lock());
    }

    #[test]
    fn corrupt_context_is_recovered() {
        let mut machine = ModeStateMachine::default();
        machine.enter_parameter_lock_mode(0, 1, 0);
        machine.corrupt_lock_context(9, 1);
        assert!(!machine.validate_state());
        assert!(machine.update(1));
        assert_eq!(machine.current_mode(), Mode::Normal);
        assert!(machine.validate_state());
    }
}
