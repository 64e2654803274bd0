//! FramePack: owned frame buffers handed from the extractor to plugins

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::media::{AudioFormat, FrameFormat, MediaType, VideoFormat};

/// Properties of a video frame payload
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoDesc {
    pub width: u32,
    pub height: u32,
    pub format: VideoFormat,
}

/// Properties of an audio frame payload
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioDesc {
    pub channels: u32,
    pub sample_rate: u32,
    pub format: AudioFormat,
    /// Samples per channel in this frame
    pub samples: u32,
    pub channel_layout: u64,
}

/// Stream-specific half of a frame descriptor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FrameDesc {
    Video(VideoDesc),
    Audio(AudioDesc),
}

impl FrameDesc {
    pub fn media_type(&self) -> MediaType {
        match self {
            Self::Video(_) => MediaType::Video,
            Self::Audio(_) => MediaType::Audio,
        }
    }

    pub fn format(&self) -> FrameFormat {
        match self {
            Self::Video(v) => FrameFormat::Video(v.format),
            Self::Audio(a) => FrameFormat::Audio(a.format),
        }
    }

    /// Payload size implied by the descriptor.
    pub fn payload_size(&self) -> usize {
        match self {
            Self::Video(v) => v.format.frame_size(v.width, v.height),
            Self::Audio(a) => {
                a.format.bytes_per_sample() * a.channels as usize * a.samples as usize
            }
        }
    }
}

/// One decoded frame: contiguous payload plus stream metadata.
///
/// Immutable after construction. `frame_num` is 1-based and monotonically
/// increasing per stream; `total_frames` is the frame count of the stream the
/// pack was extracted from.
#[derive(Debug, Clone)]
pub struct FramePack {
    desc: FrameDesc,
    data: Vec<u8>,
    frame_num: u64,
    pts: f64,
    framerate: f64,
    total_frames: u64,
}

impl FramePack {
    /// Build a video frame pack. Fails if the payload does not match the
    /// format-implied size.
    pub fn video(
        desc: VideoDesc,
        data: Vec<u8>,
        frame_num: u64,
        pts: f64,
        framerate: f64,
        total_frames: u64,
    ) -> Result<Self> {
        Self::build(FrameDesc::Video(desc), data, frame_num, pts, framerate, total_frames)
    }

    /// Build an audio frame pack.
    pub fn audio(
        desc: AudioDesc,
        data: Vec<u8>,
        frame_num: u64,
        pts: f64,
        framerate: f64,
        total_frames: u64,
    ) -> Result<Self> {
        Self::build(FrameDesc::Audio(desc), data, frame_num, pts, framerate, total_frames)
    }

    fn build(
        desc: FrameDesc,
        data: Vec<u8>,
        frame_num: u64,
        pts: f64,
        framerate: f64,
        total_frames: u64,
    ) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::InvalidParameter("empty frame payload".into()));
        }
        let expected = desc.payload_size();
        if data.len() != expected {
            return Err(Error::InvalidParameter(format!(
                "payload size {} does not match format-implied size {}",
                data.len(),
                expected
            )));
        }
        Ok(Self {
            desc,
            data,
            frame_num,
            pts,
            framerate,
            total_frames,
        })
    }

    pub fn media_type(&self) -> MediaType {
        self.desc.media_type()
    }

    pub fn desc(&self) -> &FrameDesc {
        &self.desc
    }

    pub fn format(&self) -> FrameFormat {
        self.desc.format()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn frame_num(&self) -> u64 {
        self.frame_num
    }

    pub fn pts(&self) -> f64 {
        self.pts
    }

    pub fn framerate(&self) -> f64 {
        self.framerate
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn video_desc(&self) -> Option<&VideoDesc> {
        match &self.desc {
            FrameDesc::Video(v) => Some(v),
            FrameDesc::Audio(_) => None,
        }
    }

    pub fn audio_desc(&self) -> Option<&AudioDesc> {
        match &self.desc {
            FrameDesc::Audio(a) => Some(a),
            FrameDesc::Video(_) => None,
        }
    }

    /// Return a new pack whose format is the first of `targets` this frame
    /// can satisfy: its own format is satisfied by a copy, anything else goes
    /// through `converter`. Targets of the wrong media type are skipped; an
    /// empty target list accepts the frame as-is.
    pub fn convert(
        &self,
        targets: &[FrameFormat],
        converter: &dyn FormatConverter,
    ) -> Result<FramePack> {
        if targets.is_empty() {
            return Ok(self.clone());
        }
        let own = self.format();
        for &target in targets {
            if target.media_type() != self.media_type() {
                continue;
            }
            if target == own {
                return Ok(self.clone());
            }
            if converter.supports(own, target) {
                return converter.convert(self, target);
            }
        }
        Err(Error::InvalidOperation(format!(
            "no convertible target format for {:?}",
            own
        )))
    }
}

/// Pixel/sample conversion backend.
///
/// Concrete converters live outside the engine; the engine only dispatches
/// through this trait. `IdentityConverter` is the no-backend default.
pub trait FormatConverter: Send + Sync {
    fn supports(&self, from: FrameFormat, to: FrameFormat) -> bool;
    fn convert(&self, frame: &FramePack, to: FrameFormat) -> Result<FramePack>;
}

/// Converter that only satisfies already-matching formats.
#[derive(Debug, Default)]
pub struct IdentityConverter;

impl FormatConverter for IdentityConverter {
    fn supports(&self, from: FrameFormat, to: FrameFormat) -> bool {
        from == to
    }

    fn convert(&self, frame: &FramePack, to: FrameFormat) -> Result<FramePack> {
        if frame.format() == to {
            Ok(frame.clone())
        } else {
            Err(Error::InvalidOperation(format!(
                "no converter backend for {:?} -> {:?}",
                frame.format(),
                to
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_frame(n: u64) -> FramePack {
        let desc = VideoDesc {
            width: 4,
            height: 4,
            format: VideoFormat::Gray8,
        };
        FramePack::video(desc, vec![0u8; 16], n, n as f64 / 30.0, 30.0, 10).unwrap()
    }

    #[test]
    fn test_payload_size_validated() {
        let desc = VideoDesc {
            width: 4,
            height: 4,
            format: VideoFormat::Gray8,
        };
        let err = FramePack::video(desc, vec![0u8; 15], 1, 0.0, 30.0, 10);
        assert!(err.is_err());
    }

    #[test]
    fn test_convert_identity_fast_path() {
        let frame = gray_frame(1);
        let converted = frame
            .convert(
                &[
                    FrameFormat::Video(VideoFormat::Rgb24),
                    FrameFormat::Video(VideoFormat::Gray8),
                ],
                &IdentityConverter,
            )
            .unwrap();
        assert_eq!(converted.format(), FrameFormat::Video(VideoFormat::Gray8));
        assert_eq!(converted.frame_num(), 1);
    }

    #[test]
    fn test_convert_no_target_fails() {
        let frame = gray_frame(1);
        let err = frame.convert(&[FrameFormat::Video(VideoFormat::Nv12)], &IdentityConverter);
        assert!(err.is_err());
    }

    #[test]
    fn test_convert_skips_wrong_media_type() {
        let frame = gray_frame(1);
        let converted = frame.convert(
            &[
                FrameFormat::Audio(AudioFormat::S16),
                FrameFormat::Video(VideoFormat::Gray8),
            ],
            &IdentityConverter,
        );
        assert!(converted.is_ok());
    }
}
