//! From raw button events to semantic commands.
//!
//! ```text
//! InputEvent --InputStateEncoder--> PackedInputState --StateTransitionTranslator--> Command
//! ```
//!
//! The encoder keeps the whole grid state in a single [`PackedInputState`]; the translator diffs
//! two consecutive states and classifies the transition.

mod state;
pub use state::*;

mod event;
pub use event::*;

mod encoder;
pub use encoder::*;

mod translator;
pub use translator::*;
