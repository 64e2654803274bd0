//! Render task: builds the timeline from ranges and drives the backend

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error};

use cf_core::{Error, MediaType, RawData, Result, SortedCollection};
use cf_flow::{CompleteCb, RangeAnalyzer};
use cf_plugin::{AttrMap, PluginBehavior, PluginRegistry};
use cf_timeline::{Effect, EffectId, Timeline};

const TRACK_NAME: &str = "Track-001";

/// Inputs for one render run.
pub struct RenderTaskContext {
    pub media_path: PathBuf,
    pub registry: Arc<PluginRegistry>,
    pub render_uid: String,
    /// Video when the media has a video stream, audio otherwise
    pub primary_type: MediaType,
    pub total_frames: u64,
    pub framerate: f64,
    pub accumulated: Vec<RawData>,
    pub output_path: PathBuf,
    pub complete_cb: CompleteCb,
}

/// Background render stage. The completion callback fires exactly once on
/// the task thread; joining waits for it.
pub struct RenderTask {
    worker: Option<JoinHandle<()>>,
}

impl RenderTask {
    pub fn spawn(context: RenderTaskContext) -> Result<Self> {
        let worker = thread::Builder::new()
            .name("cf-render-task".into())
            .spawn(move || {
                debug!("entering render task");
                let complete_cb = context.complete_cb.clone();
                match run_render(context) {
                    Ok(()) => complete_cb(0),
                    Err(e) => {
                        error!("render failed: {e}");
                        complete_cb(e.code());
                    }
                }
                debug!("render task terminated");
            })
            .map_err(|e| Error::InvalidOperation(format!("render spawn: {e}")))?;

        Ok(Self {
            worker: Some(worker),
        })
    }

    /// Wait for the render to finish.
    pub fn join(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for RenderTask {
    fn drop(&mut self) {
        self.join();
    }
}

fn run_render(context: RenderTaskContext) -> Result<()> {
    let media_path = context.media_path.to_string_lossy().into_owned();

    let ranges = RangeAnalyzer::new(context.framerate).analyze(&context.accumulated);
    debug!("render over {} ranges", ranges.len());

    let mut timeline = Timeline::new("Timeline", context.framerate);
    timeline.append_track(TRACK_NAME, context.primary_type);
    timeline.add_media_ref(&media_path, context.framerate, context.total_frames as f64);

    for tr in &ranges {
        let effects = make_effect_list(&mut timeline, &context.registry, &tr.collection)?;
        timeline.append_clip(TRACK_NAME, "", tr.range, &media_path, effects)?;
    }

    let render = context.registry.find(&context.render_uid)?;
    let mut behavior = render.behavior();
    match &mut *behavior {
        PluginBehavior::Render(backend) => {
            let mut attrs = AttrMap::new();
            attrs.insert(
                "path".into(),
                context.output_path.to_string_lossy().into_owned(),
            );
            backend.set_attrs(&attrs)?;
            backend.render(&timeline)
        }
        _ => Err(Error::InvalidParameter(format!(
            "not a render plugin: {}",
            context.render_uid
        ))),
    }
}

/// Build one timeline effect per plugin uid in the collection, carrying its
/// per-frame detections as metadata.
fn make_effect_list(
    timeline: &mut Timeline,
    registry: &PluginRegistry,
    collection: &SortedCollection,
) -> Result<Vec<EffectId>> {
    let mut effects = Vec::new();

    for (uid, details) in collection {
        let plugin = registry.find(uid)?;
        let info = match &*plugin.behavior() {
            PluginBehavior::Effect(effect) => effect.effect_info(),
            _ => {
                return Err(Error::InvalidOperation(format!(
                    "{uid} has no effect behavior"
                )));
            }
        };

        let mut attrs = info;
        let name = attrs
            .remove("name")
            .ok_or_else(|| Error::InvalidOperation(format!("no effect name on {uid}")))?;

        let mut effect = Effect::new(name).with_attrs(attrs);
        for detected in details {
            effect.add_frame_metadata(detected.frame_number, detected.items.clone());
        }
        effects.push(timeline.add_effect(effect));
    }

    Ok(effects)
}
