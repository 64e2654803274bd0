//! Media and raw-format enums

use serde::{Deserialize, Serialize};

/// Media stream kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaType {
    None,
    Audio,
    Video,
}

impl Default for MediaType {
    fn default() -> Self {
        Self::None
    }
}

/// Raw video pixel format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VideoFormat {
    Yuv420p,
    Yuv422p,
    Rgb24,
    Bgr24,
    Nv12,
    Nv21,
    Argb,
    Rgba,
    Abgr,
    Bgra,
    Gray8,
}

impl VideoFormat {
    /// Payload size in bytes for a `width` x `height` frame of this format.
    pub fn frame_size(self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            Self::Yuv420p | Self::Nv12 | Self::Nv21 => pixels * 3 / 2,
            Self::Yuv422p => pixels * 2,
            Self::Rgb24 | Self::Bgr24 => pixels * 3,
            Self::Argb | Self::Rgba | Self::Abgr | Self::Bgra => pixels * 4,
            Self::Gray8 => pixels,
        }
    }
}

/// Raw audio sample format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioFormat {
    U8,
    S16,
    S32,
    Flt,
    Dbl,
    S64,
    U8p,
    S16p,
    S32p,
    Fltp,
    Dblp,
    S64p,
}

impl AudioFormat {
    /// Size of one sample of one channel in bytes.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::U8 | Self::U8p => 1,
            Self::S16 | Self::S16p => 2,
            Self::S32 | Self::S32p | Self::Flt | Self::Fltp => 4,
            Self::Dbl | Self::Dblp | Self::S64 | Self::S64p => 8,
        }
    }

    /// Whether each channel occupies its own plane.
    pub fn is_planar(self) -> bool {
        matches!(
            self,
            Self::U8p | Self::S16p | Self::S32p | Self::Fltp | Self::Dblp | Self::S64p
        )
    }
}

/// A format of either stream kind, as listed in plugin accepted-format sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameFormat {
    Video(VideoFormat),
    Audio(AudioFormat),
}

impl FrameFormat {
    pub fn media_type(self) -> MediaType {
        match self {
            Self::Video(_) => MediaType::Video,
            Self::Audio(_) => MediaType::Audio,
        }
    }
}

impl From<VideoFormat> for FrameFormat {
    fn from(f: VideoFormat) -> Self {
        Self::Video(f)
    }
}

impl From<AudioFormat> for FrameFormat {
    fn from(f: AudioFormat) -> Self {
        Self::Audio(f)
    }
}
