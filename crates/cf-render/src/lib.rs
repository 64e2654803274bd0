//! cf-render: turning accumulated verdicts into a rendered output
//!
//! The render task collapses the analysis log into time ranges, assembles
//! the editorial timeline and hands it to a render backend. The built-in
//! backend serializes the timeline to a JSON document.

mod export;
mod task;

pub use export::*;
pub use task::*;
