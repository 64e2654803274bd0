//! cf-flow: the per-frame analysis data flow
//!
//! The worker drives extraction through the A/V synchronizer, consults the
//! logic analyzer for which detector to run next, routes frames through
//! plugins with format conversion and outcome caching, and appends per-frame
//! verdicts to the accumulator. At end of media the accumulated verdicts
//! collapse into time ranges.

mod accumulate;
mod cache;
mod extract;
mod sync;
mod worker;

pub use accumulate::*;
pub use cache::*;
pub use extract::*;
pub use sync::*;
pub use worker::*;
