//! Application context shared by the desktop and CLI front ends.
//!
//! [`Game`] owns the scene store and component store and is passed
//! explicitly to the main loop; there is no global state.

pub mod clock;
pub mod config;
mod game;

pub use clock::{FrameClock, FrameTimer};
pub use config::{AppConfig, AssetsConfig, ConfigError, WindowConfig};
pub use game::{Game, SceneAssets};

pub fn crate_info() -> &'static str {
    "ember-app v0.1.0"
}
