//! Button numbering on the 4x8 grid.
//!
//! Buttons are numbered row-major: button `i` sits on track `i / 8`, step `i % 8`. Button 0 is
//! the top-left pad, button 31 the bottom-right one.

use crate::{BUTTON_COUNT, STEPS, TRACKS};

/// Width of one half of the grid. Columns `0..4` form the left half, `4..8` the right half.
pub const HALF_WIDTH: u8 = STEPS as u8 / 2;

/// A grid position, expressed as the track (row) and step (column) it refers to.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GridPos {
    pub track: u8,
    pub step: u8,
}

impl GridPos {
    /// Creates a new position, or `None` if it lies outside the 4x8 grid
    pub fn new(track: u8, step: u8) -> Option<Self> {
        if is_valid_position(track, step) {
            Some(Self { track, step })
        } else {
            None
        }
    }

    /// Converts a button id into its grid position. Ids `>= 32` yield `None`.
    pub fn from_button(button: u8) -> Option<Self> {
        if !is_valid_button(button) {
            return None;
        }
        Some(Self {
            track: button / STEPS as u8,
            step: button % STEPS as u8,
        })
    }

    /// The button id of this position
    pub fn button(&self) -> u8 {
        self.track * STEPS as u8 + self.step
    }
}

/// Returns true if `button` addresses one of the 32 grid buttons
pub fn is_valid_button(button: u8) -> bool {
    (button as usize) < BUTTON_COUNT
}

pub fn is_valid_position(track: u8, step: u8) -> bool {
    (track as usize) < TRACKS && (step as usize) < STEPS
}

/// Splits a button id into `(track, step)` without range checking. Only call this with ids that
/// already passed [`is_valid_button`].
pub(crate) fn track_step(button: u8) -> (u8, u8) {
    (button / STEPS as u8, button % STEPS as u8)
}

/// Returns the column (step index) of a button
pub fn column(button: u8) -> u8 {
    button % STEPS as u8
}
