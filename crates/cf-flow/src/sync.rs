//! A/V synchronizer: pairs a video frame with its aligned audio frames

use log::debug;

use cf_core::{FramePack, Result};

use crate::extract::{Extractor, NO_PTS};

/// Pulls frames off the extractor in presentation order, batching the audio
/// frames that belong with each video frame.
pub struct AvSynchronizer {
    extractor: Box<dyn Extractor>,
    video_eof: bool,
    audio_eof: bool,
    has_video: bool,
    /// Pts of the last video frame handed out
    pts: f64,
}

impl AvSynchronizer {
    pub fn new(extractor: Box<dyn Extractor>) -> Self {
        let info = extractor.media_info();
        let has_video = info.has_video();
        let has_audio = info.has_audio();
        Self {
            extractor,
            video_eof: !has_video,
            audio_eof: !has_audio,
            has_video,
            pts: NO_PTS,
        }
    }

    /// Next video frame, or `None` once the stream is done.
    pub fn next_video(&mut self) -> Result<Option<FramePack>> {
        if self.video_eof {
            return Ok(None);
        }

        match self.extractor.next_video()? {
            Some(frame) => {
                debug!("video frame {} pts {}", frame.frame_num(), frame.pts());
                self.pts = frame.pts();
                Ok(Some(frame))
            }
            None => {
                debug!("video EOF");
                self.video_eof = true;
                Ok(None)
            }
        }
    }

    /// Audio frames up to the last video pts. The batch runs until a frame's
    /// pts passes the video frame; that frame closes the batch and is part
    /// of it. Audio-only media yields exactly one frame per batch.
    pub fn next_audio(&mut self) -> Result<Vec<FramePack>> {
        let mut frames = Vec::new();

        if self.audio_eof {
            return Ok(frames);
        }

        // Audio outliving the video track is discarded: the edit is keyed
        // to video frames.
        if self.video_eof && self.has_video {
            return Ok(frames);
        }

        while !self.audio_eof {
            match self.extractor.next_audio()? {
                None => {
                    debug!("audio EOF");
                    self.audio_eof = true;
                    break;
                }
                Some(frame) => {
                    let pts = frame.pts();
                    frames.push(frame);
                    if self.pts == NO_PTS || pts > self.pts {
                        break;
                    }
                }
            }
        }

        Ok(frames)
    }
}
