use log::{debug, trace, warn};

use super::{timing_bucket, InputEvent, PackedInputState};
use crate::button::is_valid_button;
use crate::Config;

/// Folds raw [`InputEvent`]s into successive [`PackedInputState`]s.
///
/// This is where holds are told apart from taps: releasing a button that was held for at least
/// the hold threshold sets the lock flag and records the button as the lock button. The
/// translator downstream only reacts to the flag.
#[derive(Debug, Clone)]
pub struct InputStateEncoder {
    hold_threshold_ms: u32,
}

impl Default for InputStateEncoder {
    fn default() -> Self {
        Self::new(Config::DEFAULT_HOLD_THRESHOLD_MS)
    }
}

impl InputStateEncoder {
    pub fn new(hold_threshold_ms: u32) -> Self {
        Self { hold_threshold_ms }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.hold_threshold_ms)
    }

    pub fn hold_threshold_ms(&self) -> u32 {
        self.hold_threshold_ms
    }

    pub fn set_hold_threshold_ms(&mut self, ms: u32) {
        self.hold_threshold_ms = ms;
    }

    /// Returns the state that results from applying `event` to `previous`
    pub fn encode(&self, event: InputEvent, previous: PackedInputState) -> PackedInputState {
        let mut state = previous;

        if !is_valid_button(event.button()) {
            warn!("Ignoring event for out-of-range button {}", event.button());
            return state;
        }

        match event {
            InputEvent::Press { button } => {
                state.set_button_state(button, true);
                state.set_timing_bucket(0);
                trace!("Button {} pressed", button);
            }
            InputEvent::Release { button, held_ms } => {
                state.set_button_state(button, false);
                state.set_timing_bucket(timing_bucket(held_ms));

                if self.is_hold(held_ms) && !previous.is_lock_active() {
                    state.set_lock_active(true);
                    state.set_lock_button_id(button);
                    debug!(
                        "Button {} held for {}ms (threshold {}ms), opening parameter lock",
                        button, held_ms, self.hold_threshold_ms
                    );
                } else {
                    trace!("Button {} released after {}ms", button, held_ms);
                }
            }
        }

        state
    }

    /// Clears the lock flag once the lock session has been closed, either by the user or by the
    /// inactivity timeout. The next diff then starts from an unlocked state.
    pub fn clear_lock(&self, state: PackedInputState) -> PackedInputState {
        let mut state = state;
        state.set_lock_active(false);
        state
    }

    pub fn set_shift(&self, state: PackedInputState, shift: bool) -> PackedInputState {
        let mut state = state;
        state.set_shift(shift);
        state
    }

    fn is_hold(&self, held_ms: u32) -> bool {
        held_ms >= self.hold_threshold_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_sets_bit_and_resets_timing() {
        let encoder = InputStateEncoder::default();
        let previous = PackedInputState::new(0, false, 0, 17);
        let state = encoder.encode(InputEvent::Press { button: 9 }, previous);
        assert!(state.is_button_pressed(9));
        assert_eq!(state.timing_bucket(), 0);
        assert!(!state.is_lock_active());
    }

    #[test]
    fn short_release_is_a_tap() {
        let encoder = InputStateEncoder::default();
        let pressed = encoder.encode(InputEvent::Press { button: 2 }, PackedInputState::default());
        let released = encoder.encode(InputEvent::Release { button: 2, held_ms: 120 }, pressed);
        assert!(!released.is_button_pressed(2));
        assert_eq!(released.timing_bucket(), 6);
        assert!(!released.is_lock_active());
    }

    #[test]
    fn long_release_opens_lock() {
        let encoder = InputStateEncoder::default();
        let pressed = encoder.encode(InputEvent::Press { button: 8 }, PackedInputState::default());
        let released = encoder.encode(InputEvent::Release { button: 8, held_ms: 600 }, pressed);
        assert!(released.is_lock_active());
        assert_eq!(released.lock_button_id(), 8);
        assert_eq!(released.timing_bucket(), 30);
    }

    #[test]
    fn hold_while_locked_keeps_original_lock_button() {
        let encoder = InputStateEncoder::default();
        let locked = PackedInputState::new(1 << 20, true, 8, 30);
        let released = encoder.encode(InputEvent::Release { button: 20, held_ms: 900 }, locked);
        assert!(released.is_lock_active());
        assert_eq!(released.lock_button_id(), 8);
    }

    #[test]
    fn threshold_is_inclusive() {
        let encoder = InputStateEncoder::new(300);
        let state = encoder.encode(
            InputEvent::Release { button: 1, held_ms: 300 },
            PackedInputState::new(1 << 1, false, 0, 0),
        );
        assert!(state.is_lock_active());
    }

    #[test]
    fn invalid_button_passes_state_through() {
        let encoder = InputStateEncoder::default();
        let previous = PackedInputState::new(0b101, false, 0, 3);
        assert_eq!(encoder.encode(InputEvent::Press { button: 32 }, previous), previous);
        assert_eq!(
            encoder.encode(InputEvent::Release { button: 99, held_ms: 9999 }, previous),
            previous
        );
    }

    #[test]
    fn clear_lock_keeps_buttons() {
        let encoder = InputStateEncoder::default();
        let state = encoder.clear_lock(PackedInputState::new(0b11, true, 1, 4));
        assert!(!state.is_lock_active());
        assert_eq!(state.buttons(), 0b11);
    }
}
