//! Two-axis solar tracker controller.
//!
//! The control loop and the request layer share one [`Controller`]. All of
//! its state sits behind a single lock; see [`Controller`] for the rules.

mod controller;
pub mod demo;
pub mod motion;
pub mod night;
pub mod policy;
pub mod servo;
mod settings;
mod state;
pub mod states;

pub use controller::Controller;
pub use motion::Mount;
pub use servo::{Actuators, Axis, PwmServo, ServoPair};
pub use settings::{Settings, VerticalLimits};
pub use state::{Snapshot, TrackerState};
pub use states::Mode;
