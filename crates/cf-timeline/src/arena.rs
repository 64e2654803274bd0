//! Timeline arena: tracks, clips, media references and effects

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use cf_core::{DetectionItem, Error, MediaType, Result, TimeRange};

macro_rules! arena_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub usize);
    };
}

arena_id!(TrackId);
arena_id!(ClipId);
arena_id!(MediaRefId);
arena_id!(EffectId);

/// Reference to a piece of source media
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRef {
    pub target_path: String,
    pub framerate: f64,
    /// Available range in frames, starting at 0
    pub duration: f64,
}

/// Effect attached to a clip, carrying per-frame detection metadata.
///
/// `metadata` keys are frame numbers rendered as strings, each mapping to the
/// detection items seen on that frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Effect {
    pub effect_name: String,
    pub attrs: BTreeMap<String, String>,
    pub metadata: BTreeMap<String, Vec<DetectionItem>>,
}

impl Effect {
    pub fn new(effect_name: impl Into<String>) -> Self {
        Self {
            effect_name: effect_name.into(),
            attrs: BTreeMap::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_attrs(mut self, attrs: BTreeMap<String, String>) -> Self {
        self.attrs = attrs;
        self
    }

    /// Record the items detected at `frame_number`.
    pub fn add_frame_metadata(&mut self, frame_number: f64, items: Vec<DetectionItem>) {
        self.metadata.insert(format!("{}", frame_number), items);
    }
}

/// Clip placed on a track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub name: String,
    pub media_ref: MediaRefId,
    pub range: TimeRange,
    pub effects: Vec<EffectId>,
}

/// Child slot of a track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrackItem {
    Clip(ClipId),
    Gap(TimeRange),
}

/// Ordered lane of clips and gaps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub name: String,
    pub kind: MediaType,
    pub children: Vec<TrackItem>,
}

/// The timeline document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub name: String,
    pub global_framerate: f64,
    tracks: Vec<Track>,
    clips: Vec<Clip>,
    media_refs: Vec<MediaRef>,
    effects: Vec<Effect>,
}

impl Timeline {
    pub fn new(name: impl Into<String>, global_framerate: f64) -> Self {
        Self {
            name: name.into(),
            global_framerate,
            tracks: Vec::new(),
            clips: Vec::new(),
            media_refs: Vec::new(),
            effects: Vec::new(),
        }
    }

    /// Add a media reference, reusing an existing one for the same path.
    pub fn add_media_ref(
        &mut self,
        target_path: impl Into<String>,
        framerate: f64,
        duration: f64,
    ) -> MediaRefId {
        let target_path = target_path.into();
        if let Some(id) = self.find_ref(&target_path) {
            return id;
        }
        self.media_refs.push(MediaRef {
            target_path,
            framerate,
            duration,
        });
        MediaRefId(self.media_refs.len() - 1)
    }

    pub fn append_track(&mut self, name: impl Into<String>, kind: MediaType) -> TrackId {
        self.tracks.push(Track {
            name: name.into(),
            kind,
            children: Vec::new(),
        });
        TrackId(self.tracks.len() - 1)
    }

    pub fn add_effect(&mut self, effect: Effect) -> EffectId {
        self.effects.push(effect);
        EffectId(self.effects.len() - 1)
    }

    /// Append a clip spanning `range` of `media_path` to the named track.
    pub fn append_clip(
        &mut self,
        track_name: &str,
        clip_name: impl Into<String>,
        range: TimeRange,
        media_path: &str,
        effects: Vec<EffectId>,
    ) -> Result<ClipId> {
        let media_ref = self
            .find_ref(media_path)
            .ok_or_else(|| Error::InvalidParameter(format!("no media ref: {media_path}")))?;
        let track = self.find_track(track_name)?;

        self.clips.push(Clip {
            name: clip_name.into(),
            media_ref,
            range,
            effects,
        });
        let id = ClipId(self.clips.len() - 1);
        self.tracks[track.0].children.push(TrackItem::Clip(id));
        Ok(id)
    }

    pub fn append_gap(&mut self, track_name: &str, range: TimeRange) -> Result<()> {
        let track = self.find_track(track_name)?;
        self.tracks[track.0].children.push(TrackItem::Gap(range));
        Ok(())
    }

    pub fn find_track(&self, name: &str) -> Result<TrackId> {
        self.tracks
            .iter()
            .position(|t| t.name == name)
            .map(TrackId)
            .ok_or_else(|| Error::InvalidParameter(format!("no track: {name}")))
    }

    pub fn find_ref(&self, path: &str) -> Option<MediaRefId> {
        self.media_refs
            .iter()
            .position(|r| r.target_path == path)
            .map(MediaRefId)
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn clip(&self, id: ClipId) -> &Clip {
        &self.clips[id.0]
    }

    pub fn media_ref(&self, id: MediaRefId) -> &MediaRef {
        &self.media_refs[id.0]
    }

    pub fn effect(&self, id: EffectId) -> &Effect {
        &self.effects[id.0]
    }

    pub fn effect_mut(&mut self, id: EffectId) -> &mut Effect {
        &mut self.effects[id.0]
    }

    /// Total duration of a track's children in frames.
    pub fn track_duration(&self, id: TrackId) -> f64 {
        self.tracks[id.0]
            .children
            .iter()
            .map(|child| match child {
                TrackItem::Clip(c) => self.clips[c.0].range.duration,
                TrackItem::Gap(g) => g.duration,
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: f64, duration: f64) -> TimeRange {
        TimeRange {
            start_frame: start,
            duration,
        }
    }

    #[test]
    fn test_media_ref_dedup() {
        let mut tl = Timeline::new("t", 30.0);
        let a = tl.add_media_ref("/media/a.mp4", 30.0, 100.0);
        let b = tl.add_media_ref("/media/a.mp4", 30.0, 100.0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_append_clip_to_missing_track_fails() {
        let mut tl = Timeline::new("t", 30.0);
        tl.add_media_ref("/media/a.mp4", 30.0, 100.0);
        let err = tl.append_clip("nope", "", range(0.0, 10.0), "/media/a.mp4", vec![]);
        assert!(err.is_err());
    }

    #[test]
    fn test_track_duration_sums_children() {
        let mut tl = Timeline::new("t", 30.0);
        tl.add_media_ref("/media/a.mp4", 30.0, 100.0);
        let track = tl.append_track("Track-001", MediaType::Video);
        tl.append_clip("Track-001", "", range(0.0, 10.0), "/media/a.mp4", vec![])
            .unwrap();
        tl.append_gap("Track-001", range(10.0, 5.0)).unwrap();
        tl.append_clip("Track-001", "", range(15.0, 20.0), "/media/a.mp4", vec![])
            .unwrap();
        assert_eq!(tl.track_duration(track), 35.0);
    }

    #[test]
    fn test_effect_metadata_keys() {
        let mut effect = Effect::new("marker");
        effect.add_frame_metadata(3.0, vec![DetectionItem::Scalar(0.5)]);
        assert!(effect.metadata.contains_key("3"));
    }
}
