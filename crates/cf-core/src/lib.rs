//! cf-core: Shared types for the ClipForge analysis engine
//!
//! This crate provides the foundational types used across all ClipForge
//! crates: the error taxonomy, media/format enums, the owned frame buffer
//! (`FramePack`) and the detection data model.

mod detect;
mod error;
mod frame;
mod media;

pub use detect::*;
pub use error::*;
pub use frame::*;
pub use media::*;
