/*!
The input and parameter core of a 4x8 grid step sequencer.

Raw button events are folded into a compact [`PackedInputState`], consecutive states are diffed
into semantic [`Command`]s, and the commands drive a mode state machine, a fixed-size pool of
per-step parameter locks and a cache of precomputed playback parameters. Nothing in here talks to
hardware or produces sound; a host feeds events in and reads resolved parameters out.

# Tap, hold, edit

A short press toggles a step. Holding a step for the hold threshold (500ms by default) opens a
parameter lock session on it, after which presses on the opposite half of the grid nudge its
parameters: the row picks the parameter, the left half decrements and the right half increments.
Pressing and releasing the held step again closes the session.

```
use gridseq::{Command, Controller, InputEvent, MockClock};

let clock = MockClock::new(0);
let mut controller = Controller::new(&clock);

controller.handle_event(InputEvent::Press { button: 8 })?;
let commands = controller.handle_event(InputEvent::Release { button: 8, held_ms: 650 })?;
assert_eq!(commands, vec![Command::EnterParamLock { track: 1, step: 0 }]);

// second row, right half: velocity up
controller.handle_event(InputEvent::Press { button: 12 })?;
controller.handle_event(InputEvent::Release { button: 12, held_ms: 40 })?;

let lock = controller.pattern().get(1, 0).and_then(|cell| cell.lock);
assert_eq!(controller.pool().get(lock.unwrap()).unwrap().velocity, 101);
# Ok::<(), gridseq::GridError>(())
```

# Playback

Ahead of each step the host calls [`Controller::prepare_step_column`], then reads the result with
[`Controller::trigger`]. Only the preparation does real work, the read is a table lookup.

```
use gridseq::{Controller, SystemClock};

let mut controller = Controller::new(SystemClock::new());
controller.set_step_active(0, 0, true)?;
controller.prepare_step_column(0);
let params = controller.trigger(0, 0).unwrap();
assert_eq!(params.note, 60);
# Ok::<(), gridseq::GridError>(())
```
*/

pub mod util;

pub mod button;
pub use button::GridPos;

mod clock;
pub use clock::*;

mod config;
pub use config::*;

mod errors;
pub use errors::*;

pub mod input;
pub use input::{Command, InputEvent, InputStateEncoder, PackedInputState, StateTransitionTranslator};

pub mod mode;
pub use mode::{Mode, ModeStateMachine, TransitionResult};

pub mod lock_pool;
pub use lock_pool::{LockRecord, ParamKind, ParameterLockPool};

pub mod resolution;
pub use resolution::{Pattern, ResolutionCache, ResolvedParameters, StepData, TrackDefaults};

mod controller;
pub use controller::*;

pub mod prelude {
    pub use crate::clock::Clock;
    pub use crate::controller::Controller;
    pub use crate::input::{Command, InputEvent};
}

/// Number of tracks (grid rows)
pub const TRACKS: usize = 4;
/// Number of steps per track (grid columns)
pub const STEPS: usize = 8;
pub const BUTTON_COUNT: usize = TRACKS * STEPS;
/// Capacity of the [`ParameterLockPool`]
pub const MAX_LOCKS: usize = 64;
/// Marks an unset slot or position index
pub const INVALID_INDEX: u8 = 0xFF;
/// A single parameter resolution taking longer than this many microseconds is flagged
pub const REAL_TIME_BUDGET_US: u64 = 10;
