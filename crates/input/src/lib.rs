//! Window input mapped to application actions.
//!
//! The windowing layer translates its native events into [`InputEvent`]
//! and feeds them to an [`InputState`], which tracks the cursor and returns
//! the resulting [`Action`]. Application code consumes actions, never raw
//! events.

pub mod action;

pub use action::{Action, InputEvent, InputState, Key, MouseButton};
