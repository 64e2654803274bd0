//! User callback wiring

use std::sync::Arc;

pub use cf_flow::{CompleteCb, ProgressCb};

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created or finished, accepting configuration
    Idle,
    Analysis,
    Render,
}

/// Error callback: receives the numeric error code.
pub type ErrorCb = Arc<dyn Fn(i32) + Send + Sync>;

/// State-changed callback: `(previous, current)`.
pub type StateChangedCb = Arc<dyn Fn(SessionState, SessionState) + Send + Sync>;

/// The callbacks a session delivers. Set and cleared only while idle.
#[derive(Default, Clone)]
pub struct Callbacks {
    pub error: Option<ErrorCb>,
    pub progress: Option<ProgressCb>,
    pub state_changed: Option<StateChangedCb>,
}
