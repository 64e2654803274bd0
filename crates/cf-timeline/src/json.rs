//! Straight-traversal JSON lowering of the timeline arena

use serde_json::{json, Map, Value};

use cf_core::{DetectionItem, MediaType, TimeRange};

use crate::arena::{Timeline, TrackItem};

/// Lower one detection item into its metadata dictionary.
fn item_value(item: &DetectionItem) -> Value {
    match item {
        DetectionItem::Rect(r) => json!({
            "x": r.x,
            "y": r.y,
            "width": r.width,
            "height": r.height,
        }),
        DetectionItem::RectTag { rect, tag } => json!({
            "x": rect.x,
            "y": rect.y,
            "width": rect.width,
            "height": rect.height,
            "tag": tag,
        }),
        DetectionItem::Scalar(v) => json!({ "value": v }),
        DetectionItem::Flag(b) => json!({ "value": b }),
    }
}

fn range_value(range: &TimeRange, rate: f64) -> Value {
    json!({
        "start_frame": range.start_frame,
        "duration": range.duration,
        "rate": rate,
    })
}

/// Serialize the whole document. The arena ids are resolved away; every clip
/// carries its media reference and effects inline.
pub fn timeline_to_value(timeline: &Timeline) -> Value {
    let rate = timeline.global_framerate;

    let tracks: Vec<Value> = timeline
        .tracks()
        .iter()
        .map(|track| {
            let children: Vec<Value> = track
                .children
                .iter()
                .map(|child| match child {
                    TrackItem::Clip(id) => {
                        let clip = timeline.clip(*id);
                        let media = timeline.media_ref(clip.media_ref);
                        let effects: Vec<Value> = clip
                            .effects
                            .iter()
                            .map(|eid| {
                                let effect = timeline.effect(*eid);
                                let mut metadata = Map::new();
                                for (frame, items) in &effect.metadata {
                                    metadata.insert(
                                        frame.clone(),
                                        Value::Array(items.iter().map(item_value).collect()),
                                    );
                                }
                                json!({
                                    "effect_name": effect.effect_name,
                                    "attrs": effect.attrs,
                                    "metadata": metadata,
                                })
                            })
                            .collect();

                        json!({
                            "kind": "clip",
                            "name": clip.name,
                            "range": range_value(&clip.range, media.framerate),
                            "media_reference": {
                                "target_path": media.target_path,
                                "available_range": range_value(
                                    &TimeRange { start_frame: 0.0, duration: media.duration },
                                    media.framerate,
                                ),
                            },
                            "effects": effects,
                        })
                    }
                    TrackItem::Gap(gap) => json!({
                        "kind": "gap",
                        "range": range_value(gap, rate),
                    }),
                })
                .collect();

            json!({
                "name": track.name,
                "kind": match track.kind {
                    MediaType::Audio => "audio",
                    _ => "video",
                },
                "children": children,
            })
        })
        .collect();

    json!({
        "name": timeline.name,
        "global_framerate": rate,
        "tracks": tracks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Effect;
    use cf_core::Rect;

    #[test]
    fn test_item_value_shapes() {
        let rect = item_value(&DetectionItem::Rect(Rect::new(1.0, 2.0, 3.0, 4.0)));
        assert_eq!(rect["width"], 3.0);
        let tagged = item_value(&DetectionItem::RectTag {
            rect: Rect::new(0.0, 0.0, 1.0, 1.0),
            tag: "face".into(),
        });
        assert_eq!(tagged["tag"], "face");
        assert_eq!(item_value(&DetectionItem::Scalar(0.25))["value"], 0.25);
        assert_eq!(item_value(&DetectionItem::Flag(true))["value"], true);
    }

    #[test]
    fn test_timeline_traversal() {
        let mut tl = Timeline::new("Timeline", 30.0);
        tl.add_media_ref("/media/a.mp4", 30.0, 100.0);
        tl.append_track("Track-001", MediaType::Video);

        let mut effect = Effect::new("marker");
        effect.add_frame_metadata(2.0, vec![DetectionItem::Scalar(0.9)]);
        let effect_id = tl.add_effect(effect);

        tl.append_clip(
            "Track-001",
            "",
            TimeRange {
                start_frame: 0.0,
                duration: 10.0,
            },
            "/media/a.mp4",
            vec![effect_id],
        )
        .unwrap();

        let value = timeline_to_value(&tl);
        assert_eq!(value["tracks"][0]["kind"], "video");
        let clip = &value["tracks"][0]["children"][0];
        assert_eq!(clip["kind"], "clip");
        assert_eq!(clip["media_reference"]["target_path"], "/media/a.mp4");
        assert_eq!(clip["effects"][0]["effect_name"], "marker");
        assert_eq!(clip["effects"][0]["metadata"]["2"][0]["value"], 0.9);
    }
}
