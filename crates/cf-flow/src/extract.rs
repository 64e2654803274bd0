//! Extractor contract consumed by the synchronizer
//!
//! Demux/decode backends live outside the engine; this is the interface the
//! engine pulls frames through.

use std::path::Path;

use cf_core::{FramePack, MediaType, Result};

/// Presentation timestamp sentinel: no video frame seen yet.
pub const NO_PTS: f64 = -1.0;

/// Per-stream properties the engine needs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamInfo {
    pub framerate: f64,
    pub total_frames: u64,
}

/// Stream layout of an opened media file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaInfo {
    pub video: Option<StreamInfo>,
    pub audio: Option<StreamInfo>,
}

impl MediaInfo {
    pub fn has_video(&self) -> bool {
        self.video.is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    /// Editing is keyed to video when present, audio otherwise.
    pub fn primary(&self) -> Option<(MediaType, StreamInfo)> {
        if let Some(video) = self.video {
            Some((MediaType::Video, video))
        } else {
            self.audio.map(|audio| (MediaType::Audio, audio))
        }
    }
}

/// Frame source for one opened media file.
///
/// `next_video`/`next_audio` return `None` at end of stream and fail on
/// decode errors. Frame ordinals are monotonic per stream.
pub trait Extractor: Send {
    fn media_info(&self) -> &MediaInfo;
    fn next_video(&mut self) -> Result<Option<FramePack>>;
    fn next_audio(&mut self) -> Result<Option<FramePack>>;
}

/// Opens an extractor for a media path. May fail with `NoSuchFile`,
/// `PermissionDenied` or `NotSupportedMedia`.
pub type ExtractorFactory = Box<dyn Fn(&Path) -> Result<Box<dyn Extractor>> + Send + Sync>;
