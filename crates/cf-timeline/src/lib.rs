//! cf-timeline: the editorial document emitted to render backends
//!
//! A timeline is a small object graph: tracks of clips, clips referencing
//! source media, effects attached to clips with per-frame metadata. It is
//! stored as an arena with stable ids so the graph has single ownership and
//! serialization is a straight traversal.

mod arena;
mod json;

pub use arena::*;
pub use json::*;
