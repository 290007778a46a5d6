use crate::button::is_valid_button;

/// Width of one timing bucket in milliseconds
pub const BUCKET_MS: u32 = 20;
/// Largest representable timing bucket, roughly 5.1 seconds
pub const MAX_BUCKET: u8 = 255;

const BUTTONS_MASK: u64 = 0xFFFF_FFFF;

const MODIFIERS_SHIFT: u32 = 32;
const LOCK_ACTIVE_BIT: u64 = 1 << (MODIFIERS_SHIFT + 7);
const SHIFT_BIT: u64 = 1 << (MODIFIERS_SHIFT + 6);
const UPPERCASE_BIT: u64 = 1 << (MODIFIERS_SHIFT + 5);

// the lock button id lives in the upper six bits of the context byte
const LOCK_BUTTON_SHIFT: u32 = 40 + 2;
const LOCK_BUTTON_MASK: u64 = 0x3F << LOCK_BUTTON_SHIFT;

const TIMING_SHIFT: u32 = 48;
const TIMING_MASK: u64 = 0xFF << TIMING_SHIFT;

/// Quantizes a press duration into the 8 bit timing bucket: `min(255, ms / 20)`.
///
/// Lossy on purpose. Anything derived from a bucket is only accurate to ±20 ms.
pub fn timing_bucket(duration_ms: u32) -> u8 {
    (duration_ms / BUCKET_MS).min(MAX_BUCKET as u32) as u8
}

/// The approximate duration a bucket stands for
pub fn bucket_to_ms(bucket: u8) -> u32 {
    bucket as u32 * BUCKET_MS
}

/// The complete input state of the grid, packed into a single `u64`.
///
/// ```text
/// bits  0..32  button pressed flags, bit i = button i
/// bits 32..40  modifiers: bit 39 lock active, bit 38 shift, bit 37 uppercase, rest reserved
/// bits 40..48  context: bits 42..48 lock button id, bits 40..42 reserved
/// bits 48..56  timing bucket of the last press/release
/// bits 56..64  reserved
/// ```
///
/// The lock button id is only meaningful while the lock flag is set. Stale ids are kept around
/// when the lock is cleared and must be ignored.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct PackedInputState(u64);

impl PackedInputState {
    pub fn new(buttons: u32, lock_active: bool, lock_button: u8, timing_bucket: u8) -> Self {
        let mut state = Self(buttons as u64);
        state.set_lock_active(lock_active);
        state.set_lock_button_id(lock_button);
        state.set_timing_bucket(timing_bucket);
        state
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }

    /// Bitmap of all pressed buttons
    pub fn buttons(&self) -> u32 {
        (self.0 & BUTTONS_MASK) as u32
    }

    pub fn set_buttons(&mut self, buttons: u32) {
        self.0 = (self.0 & !BUTTONS_MASK) | buttons as u64;
    }

    /// Returns false for ids `>= 32`
    pub fn is_button_pressed(&self, button: u8) -> bool {
        if !is_valid_button(button) {
            return false;
        }
        self.0 & (1 << button) != 0
    }

    /// Ids `>= 32` are ignored
    pub fn set_button_state(&mut self, button: u8, pressed: bool) {
        if !is_valid_button(button) {
            return;
        }
        if pressed {
            self.0 |= 1 << button;
        } else {
            self.0 &= !(1 << button);
        }
    }

    pub fn is_lock_active(&self) -> bool {
        self.0 & LOCK_ACTIVE_BIT != 0
    }

    pub fn set_lock_active(&mut self, active: bool) {
        self.set_flag(LOCK_ACTIVE_BIT, active);
    }

    pub fn has_shift(&self) -> bool {
        self.0 & SHIFT_BIT != 0
    }

    pub fn set_shift(&mut self, shift: bool) {
        self.set_flag(SHIFT_BIT, shift);
    }

    pub fn has_uppercase(&self) -> bool {
        self.0 & UPPERCASE_BIT != 0
    }

    pub fn set_uppercase(&mut self, uppercase: bool) {
        self.set_flag(UPPERCASE_BIT, uppercase);
    }

    /// The button that opened the current lock. Only meaningful while [`Self::is_lock_active`].
    pub fn lock_button_id(&self) -> u8 {
        ((self.0 & LOCK_BUTTON_MASK) >> LOCK_BUTTON_SHIFT) as u8
    }

    /// Ids `>= 32` are ignored
    pub fn set_lock_button_id(&mut self, button: u8) {
        if !is_valid_button(button) {
            return;
        }
        self.0 = (self.0 & !LOCK_BUTTON_MASK) | ((button as u64) << LOCK_BUTTON_SHIFT);
    }

    pub fn timing_bucket(&self) -> u8 {
        ((self.0 & TIMING_MASK) >> TIMING_SHIFT) as u8
    }

    pub fn set_timing_bucket(&mut self, bucket: u8) {
        self.0 = (self.0 & !TIMING_MASK) | ((bucket as u64) << TIMING_SHIFT);
    }

    /// The last press duration as re-derived from the timing bucket
    pub fn approx_duration_ms(&self) -> u32 {
        bucket_to_ms(self.timing_bucket())
    }

    /// Ids of all pressed buttons, ascending
    pub fn pressed_buttons(&self) -> impl Iterator<Item = u8> {
        let buttons = self.buttons();
        (0..32u8).filter(move |&b| buttons & (1 << b) != 0)
    }

    fn set_flag(&mut self, bit: u64, on: bool) {
        if on {
            self.0 |= bit;
        } else {
            self.0 &= !bit;
        }
    }
}

impl std::fmt::Debug for PackedInputState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackedInputState")
            .field("buttons", &format_args!("{:#010x}", self.buttons()))
            .field("lock_active", &self.is_lock_active())
            .field("shift", &self.has_shift())
            .field("lock_button_id", &self.lock_button_id())
            .field("timing_bucket", &self.timing_bucket())
            .finish()
    }
}
