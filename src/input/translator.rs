use log::{debug, trace};

use super::PackedInputState;
use crate::button::{track_step, HALF_WIDTH};
use crate::{Config, BUTTON_COUNT};

/// A semantic command derived from an input state transition.
///
/// These are the only vocabulary consumers may use to change sequencer state.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Command {
    /// Open a parameter lock session on the given step
    EnterParamLock { track: u8, step: u8 },
    /// Close the current parameter lock session
    ExitParamLock,
    /// Nudge a parameter of the held step. `kind` is 1..=4, `delta` is -1 or +1.
    AdjustParameter { kind: u8, delta: i8 },
    /// Flip a step on or off
    ToggleStep { track: u8, step: u8 },
}

/// Turns `(previous, current)` input state pairs into [`Command`]s.
///
/// Rules are checked in a fixed priority order and only the first matching rule fires:
///
/// 1. lock exit: locked in both states and the lock button goes from pressed to released
/// 2. lock entry: the lock flag goes from clear to set
/// 3. parameter adjustment: locked, and another button goes from released to pressed
/// 4. step toggle: unlocked, and buttons are released after a tap (shorter than the threshold)
///
/// Translation is a pure function of its inputs; the translator only stores the hold threshold.
#[derive(Debug, Clone)]
pub struct StateTransitionTranslator {
    hold_threshold_ms: u32,
}

impl Default for StateTransitionTranslator {
    fn default() -> Self {
        Self::new(Config::DEFAULT_HOLD_THRESHOLD_MS)
    }
}

fn changed_buttons(current: PackedInputState, previous: PackedInputState) -> u32 {
    current.buttons() ^ previous.buttons()
}

fn is_press_edge(button: u8, current: PackedInputState, previous: PackedInputState) -> bool {
    current.is_button_pressed(button) && !previous.is_button_pressed(button)
}

fn is_release_edge(button: u8, current: PackedInputState, previous: PackedInputState) -> bool {
    !current.is_button_pressed(button) && previous.is_button_pressed(button)
}

/// Ids of set bits in `mask`, ascending
fn mask_buttons(mask: u32) -> impl Iterator<Item = u8> {
    (0..BUTTON_COUNT as u8).filter(move |&b| mask & (1 << b) != 0)
}

impl StateTransitionTranslator {
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

    pub fn translate(
        &self,
        current: PackedInputState,
        previous: PackedInputState,
        now: u32,
    ) -> Vec<Command> {
        trace!("[{}] translating {:?} -> {:?}", now, previous, current);

        if self.is_lock_exit(current, previous) {
            debug!("[{}] parameter lock exit", now);
            return vec![Command::ExitParamLock];
        }

        if let Some(command) = self.lock_entry(current, previous) {
            debug!("[{}] parameter lock entry: {:?}", now, command);
            return vec![command];
        }

        if let Some(command) = self.parameter_adjustment(current, previous) {
            debug!("[{}] parameter adjustment: {:?}", now, command);
            return vec![command];
        }

        let toggles = self.step_toggles(current, previous);
        if !toggles.is_empty() {
            debug!("[{}] step toggles: {:?}", now, toggles);
        }
        toggles
    }

    fn is_lock_exit(&self, current: PackedInputState, previous: PackedInputState) -> bool {
        if !current.is_lock_active() || !previous.is_lock_active() {
            return false;
        }
        is_release_edge(current.lock_button_id(), current, previous)
    }

    fn lock_entry(&self, current: PackedInputState, previous: PackedInputState) -> Option<Command> {
        if !current.is_lock_active() || previous.is_lock_active() {
            return None;
        }
        let (track, step) = track_step(current.lock_button_id());
        Some(Command::EnterParamLock { track, step })
    }

    fn parameter_adjustment(
        &self,
        current: PackedInputState,
        previous: PackedInputState,
    ) -> Option<Command> {
        if !current.is_lock_active() {
            return None;
        }

        let lock_button = current.lock_button_id();
        let button = mask_buttons(changed_buttons(current, previous))
            .filter(|&b| b != lock_button)
            .find(|&b| is_press_edge(b, current, previous))?;

        let (track, step) = track_step(button);
        let delta = if step < HALF_WIDTH { -1 } else { 1 };
        Some(Command::AdjustParameter {
            kind: track + 1,
            delta,
        })
    }

    fn step_toggles(&self, current: PackedInputState, previous: PackedInputState) -> Vec<Command> {
        if current.is_lock_active() || current.approx_duration_ms() >= self.hold_threshold_ms {
            return Vec::new();
        }

        mask_buttons(changed_buttons(current, previous))
            .filter(|&b| is_release_edge(b, current, previous))
            .map(|b| {
                let (track, step) = track_step(b);
                Command::ToggleStep { track, step }
            })
            .collect()
    }
}
