/// A raw grid input event, as produced by a device driver or a scripted test.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InputEvent {
    /// A button was pressed
    Press { button: u8 },
    /// A button was released after being held down for `held_ms` milliseconds
    Release { button: u8, held_ms: u32 },
}

impl InputEvent {
    pub fn button(&self) -> u8 {
        match *self {
            Self::Press { button } => button,
            Self::Release { button, .. } => button,
        }
    }

    pub fn is_press(&self) -> bool {
        matches!(self, Self::Press { .. })
    }

    pub fn is_release(&self) -> bool {
        matches!(self, Self::Release { .. })
    }
}
