mod controller;
mod state;

pub use controller::{Evaluation, ThrottleController};
pub use state::{Limits, Mode, ThrottleState, Transition};
