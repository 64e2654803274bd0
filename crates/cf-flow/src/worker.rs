//! The analysis worker: one thread driving extraction through evaluation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error};
use parking_lot::Mutex;

use cf_core::{DetectedData, Error, FormatConverter, FramePack, Outcome, Result};
use cf_logic::LogicAnalyzer;
use cf_plugin::{PluginBehavior, PluginHandle, PluginRegistry, PluginType};

use crate::accumulate::Accumulator;
use crate::cache::OutcomeCache;
use crate::sync::AvSynchronizer;

/// Progress callback: `"<frameNum>/<totalFrames>"` per analyzed frame.
pub type ProgressCb = Arc<dyn Fn(&str) + Send + Sync>;

/// Completion callback: fired exactly once with 0 or the error code that
/// ended the stage.
pub type CompleteCb = Arc<dyn Fn(i32) + Send + Sync>;

/// Everything the worker thread owns or borrows for one analysis run.
pub struct DataFlowContext {
    pub synchronizer: AvSynchronizer,
    pub logic: Arc<Mutex<LogicAnalyzer>>,
    pub registry: Arc<PluginRegistry>,
    pub accumulator: Arc<Mutex<Accumulator>>,
    pub converter: Arc<dyn FormatConverter>,
    pub skip_frames: usize,
    pub complete_cb: CompleteCb,
    pub progress_cb: Option<ProgressCb>,
}

/// The per-frame analysis worker.
///
/// `start` spawns the thread; `stop` clears the run flag and joins. The
/// completion callback fires exactly once, on the worker thread.
pub struct DataFlow {
    run: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    context: Option<DataFlowContext>,
}

impl DataFlow {
    pub fn new(context: DataFlowContext) -> Self {
        Self {
            run: Arc::new(AtomicBool::new(false)),
            worker: None,
            context: Some(context),
        }
    }

    pub fn start(&mut self) -> Result<()> {
        let context = self
            .context
            .take()
            .ok_or_else(|| Error::InvalidOperation("data flow already started".into()))?;

        self.run.store(true, Ordering::SeqCst);
        let run = self.run.clone();
        let worker = thread::Builder::new()
            .name("cf-data-flow".into())
            .spawn(move || worker_loop(context, run))
            .map_err(|e| Error::InvalidOperation(format!("worker spawn: {e}")))?;
        self.worker = Some(worker);
        Ok(())
    }

    /// Request a stop and wait for the worker to finish its current
    /// iteration. In-flight extractor/plugin calls complete first.
    pub fn stop(&mut self) {
        self.run.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.run.load(Ordering::SeqCst)
    }
}

impl Drop for DataFlow {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(mut ctx: DataFlowContext, run: Arc<AtomicBool>) {
    debug!("entering analysis worker");
    let mut code = 0i32;
    let mut cache = OutcomeCache::new();

    while run.load(Ordering::SeqCst) {
        // Fetch, consuming skipped predecessors and keeping the last pair.
        let mut v_frame: Option<FramePack> = None;
        let mut a_frames: Vec<FramePack> = Vec::new();
        let mut failure: Option<Error> = None;

        for _ in 0..=ctx.skip_frames {
            match fetch_pair(&mut ctx.synchronizer) {
                Ok((v, a)) => {
                    v_frame = v;
                    a_frames = a;
                    if v_frame.is_none() && a_frames.is_empty() {
                        break;
                    }
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        if let Some(e) = failure {
            error!("extractor failed: {e}");
            code = e.code();
            break;
        }
        if v_frame.is_none() && a_frames.is_empty() {
            break;
        }

        // Evaluate the expression over this frame pair.
        {
            let mut logic = ctx.logic.lock();
            logic.reset();
            cache.clear();

            while run.load(Ordering::SeqCst) {
                let prev = cache.result().detect;
                let Some(uid) = logic.next_plugin(prev) else {
                    // The log always grows by this frame's entries; a
                    // multi-frame result then rewrites the whole column.
                    {
                        let mut accumulator = ctx.accumulator.lock();
                        append_result(
                            &mut accumulator,
                            v_frame.as_ref(),
                            &a_frames,
                            logic.include(),
                            cache.detected(),
                            ctx.skip_frames,
                        );
                        if cache.find_multi_frame() {
                            if let Err(e) = cache
                                .multi_frame_items()
                                .and_then(|items| accumulator.update(items))
                            {
                                failure = Some(e);
                            }
                        }
                    }
                    break;
                };
                debug!("plugin: {uid}");

                if cache.hit(&uid) {
                    cache.set_result_uid(&uid);
                    continue;
                }

                let plugin = match ctx.registry.find(&uid) {
                    Ok(plugin) => plugin,
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                };

                if plugin.plugin_type.is_effect() {
                    // Effects are declarative: record their detections and
                    // move on without invoking anything.
                    cache.set_detected(&uid);
                    continue;
                }

                match process_plugin(&plugin, v_frame.as_ref(), &a_frames, ctx.converter.as_ref())
                {
                    Ok(outcome) => cache.write(&uid, outcome),
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }
        }

        if let Some(e) = failure {
            error!("frame analysis failed: {e}");
            code = e.code();
            break;
        }

        if let Some(cb) = &ctx.progress_cb {
            if let Some(frame) = &v_frame {
                cb(&format!("{}/{}", frame.frame_num(), frame.total_frames()));
            } else if let Some(frame) = a_frames.first() {
                cb(&format!("{}/{}", frame.frame_num(), frame.total_frames()));
            }
        }
    }

    run.store(false, Ordering::SeqCst);
    (ctx.complete_cb)(code);
    debug!("analysis worker terminated");
}

fn fetch_pair(sync: &mut AvSynchronizer) -> Result<(Option<FramePack>, Vec<FramePack>)> {
    let video = sync.next_video()?;
    let audio = sync.next_audio()?;
    Ok((video, audio))
}

/// Append one raw entry per analyzed frame. Stream ordinals are 1-based;
/// the accumulated frame numbers are 0-based, and skipped predecessors share
/// the representative frame's verdict.
fn append_result(
    accumulator: &mut Accumulator,
    v_frame: Option<&FramePack>,
    a_frames: &[FramePack],
    include: bool,
    detected: &DetectedData,
    skip_frames: usize,
) {
    if let Some(frame) = v_frame {
        let base = frame.frame_num() as f64 - 1.0;
        for i in (0..=skip_frames).rev() {
            accumulator.append(base - i as f64, include, detected.clone());
        }
    } else {
        for frame in a_frames {
            accumulator.append(frame.frame_num() as f64 - 1.0, include, detected.clone());
        }
    }
}

/// Run a detector over the frame pair. Video detectors take the (converted)
/// video frame; audio detectors walk the batch and short-circuit on the
/// first hit.
fn process_plugin(
    plugin: &PluginHandle,
    v_frame: Option<&FramePack>,
    a_frames: &[FramePack],
    converter: &dyn FormatConverter,
) -> Result<Outcome> {
    let mut outcome = Outcome::pass();

    match plugin.plugin_type {
        PluginType::VideoDetect => {
            if let Some(frame) = v_frame {
                let converted = frame.convert(&plugin.accepted_formats, converter)?;
                outcome = run_process(plugin, &converted)?;
            }
        }
        PluginType::AudioDetect => {
            for frame in a_frames {
                let converted = frame.convert(&plugin.accepted_formats, converter)?;
                outcome = run_process(plugin, &converted)?;
                if outcome.detect {
                    break;
                }
            }
        }
        other => {
            error!("not a detector plugin type: {other:?}");
        }
    }

    Ok(outcome)
}

fn run_process(plugin: &PluginHandle, frame: &FramePack) -> Result<Outcome> {
    let mut behavior = plugin.behavior();
    match &mut *behavior {
        PluginBehavior::Process(process) => process.process(frame),
        _ => Err(Error::InvalidOperation(format!(
            "{} has no process behavior",
            plugin.uid
        ))),
    }
}
