//! Session: configuration surface, state machine and stage wiring

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, error, info};
use parking_lot::Mutex;

use cf_core::{Error, FormatConverter, IdentityConverter, MediaType, Result};
use cf_flow::{
    Accumulator, AvSynchronizer, CompleteCb, DataFlow, DataFlowContext, ExtractorFactory,
};
use cf_logic::{validate_link, validate_tokens, LogicAnalyzer};
use cf_plugin::{AttrMap, PluginRegistry, PluginSpec, PluginType};
use cf_render::{RenderTask, RenderTaskContext};

use crate::callback::{Callbacks, ErrorCb, ProgressCb, SessionState, StateChangedCb};

/// Everything the render stage needs, prepared at `start` and consumed when
/// the analysis stage completes.
struct RenderInputs {
    media_path: PathBuf,
    registry: Arc<PluginRegistry>,
    render_uid: String,
    primary_type: MediaType,
    total_frames: u64,
    framerate: f64,
    accumulator: Arc<Mutex<Accumulator>>,
    output_path: PathBuf,
}

/// State shared with the worker threads. Completion routing runs here, on
/// whichever stage thread finished.
struct Shared {
    state: Mutex<SessionState>,
    callbacks: Mutex<Callbacks>,
    render_inputs: Mutex<Option<RenderInputs>>,
    render_task: Mutex<Option<RenderTask>>,
}

impl Shared {
    fn state(&self) -> SessionState {
        *self.state.lock()
    }

    fn update_state(&self, next: SessionState) {
        let previous = {
            let mut state = self.state.lock();
            std::mem::replace(&mut *state, next)
        };
        if previous != next {
            debug!("state {previous:?} -> {next:?}");
            let cb = self.callbacks.lock().state_changed.clone();
            if let Some(cb) = cb {
                cb(previous, next);
            }
        }
    }

    fn deliver_error(&self, code: i32) {
        let cb = self.callbacks.lock().error.clone();
        if let Some(cb) = cb {
            cb(code);
        }
    }

    /// Stage completion routing: errors end the run, a finished analysis
    /// launches the render stage, a finished render returns to idle. A
    /// completion arriving in idle is a stopped worker draining out.
    fn on_complete(shared: &Arc<Shared>, code: i32) {
        let current = shared.state();
        info!("stage complete in {current:?}, code {code}");

        if code != 0 {
            shared.deliver_error(code);
            shared.update_state(SessionState::Idle);
            return;
        }

        match current {
            SessionState::Analysis => Shared::launch_render(shared),
            SessionState::Render => shared.update_state(SessionState::Idle),
            SessionState::Idle => {}
        }
    }

    fn launch_render(shared: &Arc<Shared>) {
        let Some(inputs) = shared.render_inputs.lock().take() else {
            shared.update_state(SessionState::Idle);
            return;
        };

        // The worker has finished writing; the completion callback is the
        // happens-before edge that makes this snapshot safe.
        let accumulated = inputs.accumulator.lock().accumulated().to_vec();

        let inner = shared.clone();
        let complete_cb: CompleteCb = Arc::new(move |code| Shared::on_complete(&inner, code));

        // The state must be Render before the task thread exists, or a fast
        // render could complete while the session still reads Analysis.
        shared.update_state(SessionState::Render);

        match RenderTask::spawn(RenderTaskContext {
            media_path: inputs.media_path,
            registry: inputs.registry,
            render_uid: inputs.render_uid,
            primary_type: inputs.primary_type,
            total_frames: inputs.total_frames,
            framerate: inputs.framerate,
            accumulated,
            output_path: inputs.output_path,
            complete_cb,
        }) {
            Ok(task) => {
                *shared.render_task.lock() = Some(task);
            }
            Err(e) => {
                error!("render launch failed: {e}");
                shared.deliver_error(e.code());
                shared.update_state(SessionState::Idle);
            }
        }
    }
}

/// The analysis session.
///
/// Configuration is accepted only while idle; `start` moves to analysis, the
/// worker's completion moves to render, and the render's completion returns
/// to idle. Callbacks fire on the stage threads.
pub struct Session {
    registry: Arc<PluginRegistry>,
    shared: Arc<Shared>,
    extractor_factory: ExtractorFactory,
    converter: Arc<dyn FormatConverter>,
    media_path: Option<PathBuf>,
    render_uid: Option<String>,
    output_path: Option<PathBuf>,
    expression: Vec<String>,
    logic: Option<Arc<Mutex<LogicAnalyzer>>>,
    skip_frames: usize,
    dataflow: Option<DataFlow>,
}

impl Session {
    /// Create a session around the extractor backend.
    pub fn new(extractor_factory: ExtractorFactory) -> Self {
        Self {
            registry: Arc::new(PluginRegistry::new()),
            shared: Arc::new(Shared {
                state: Mutex::new(SessionState::Idle),
                callbacks: Mutex::new(Callbacks::default()),
                render_inputs: Mutex::new(None),
                render_task: Mutex::new(None),
            }),
            extractor_factory,
            converter: Arc::new(IdentityConverter),
            media_path: None,
            render_uid: None,
            output_path: None,
            expression: Vec::new(),
            logic: None,
            skip_frames: 0,
            dataflow: None,
        }
    }

    /// Use a format-conversion backend.
    pub fn with_converter(mut self, converter: Arc<dyn FormatConverter>) -> Self {
        self.converter = converter;
        self
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    fn ensure_idle(&self) -> Result<()> {
        let state = self.shared.state();
        if state != SessionState::Idle {
            return Err(Error::InvalidState(format!("{state:?}")));
        }
        Ok(())
    }

    pub fn set_media_path(&mut self, path: &Path) -> Result<()> {
        self.ensure_idle()?;
        if path.as_os_str().is_empty() {
            return Err(Error::InvalidParameter("empty media path".into()));
        }

        let canonical = std::fs::canonicalize(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NoSuchFile(path.display().to_string()),
            std::io::ErrorKind::PermissionDenied => {
                Error::PermissionDenied(path.display().to_string())
            }
            _ => Error::InvalidParameter(format!("{}: {e}", path.display())),
        })?;
        self.media_path = Some(canonical);
        Ok(())
    }

    /// Register a plugin; hands back its uid. The plugin lives until the
    /// session is destroyed.
    pub fn add_plugin(&mut self, spec: PluginSpec) -> Result<String> {
        self.ensure_idle()?;
        Ok(self.registry.register(spec))
    }

    pub fn set_plugin_attrs(&mut self, uid: &str, attrs: &AttrMap) -> Result<()> {
        self.ensure_idle()?;
        if uid.is_empty() {
            return Err(Error::InvalidParameter("empty uid".into()));
        }
        self.registry.set_attrs(uid, attrs)
    }

    pub fn set_render(&mut self, uid: &str, output_path: &Path) -> Result<()> {
        self.ensure_idle()?;
        if uid.is_empty() {
            return Err(Error::InvalidParameter("empty uid".into()));
        }
        if output_path.as_os_str().is_empty() {
            return Err(Error::InvalidParameter("empty output path".into()));
        }

        let plugin = self.registry.find(uid)?;
        if plugin.plugin_type != PluginType::Render {
            return Err(Error::InvalidParameter(format!("not a render uid: {uid}")));
        }

        self.render_uid = Some(uid.to_string());
        self.output_path = Some(output_path.to_path_buf());
        Ok(())
    }

    /// Validate and compile the plugin-link expression.
    pub fn register_expression(&mut self, tokens: &[String]) -> Result<()> {
        self.ensure_idle()?;
        if tokens.is_empty() {
            return Err(Error::InvalidParameter("empty expression".into()));
        }
        if !validate_tokens(tokens, &self.registry) {
            return Err(Error::InvalidParameter("invalid expression".into()));
        }

        self.expression = tokens.to_vec();
        self.logic = Some(Arc::new(Mutex::new(LogicAnalyzer::compile(tokens))));
        Ok(())
    }

    /// Analyze every n+1-th video frame, sharing its verdict with the
    /// skipped predecessors.
    pub fn set_skip_video_frames(&mut self, frames: usize) -> Result<()> {
        self.ensure_idle()?;
        self.skip_frames = frames;
        Ok(())
    }

    pub fn set_error_cb(&mut self, cb: ErrorCb) -> Result<()> {
        self.ensure_idle()?;
        self.shared.callbacks.lock().error = Some(cb);
        Ok(())
    }

    pub fn unset_error_cb(&mut self) -> Result<()> {
        self.ensure_idle()?;
        self.unset(|cb| cb.error.take().map(|_| ()))
    }

    pub fn set_progress_cb(&mut self, cb: ProgressCb) -> Result<()> {
        self.ensure_idle()?;
        self.shared.callbacks.lock().progress = Some(cb);
        Ok(())
    }

    pub fn unset_progress_cb(&mut self) -> Result<()> {
        self.ensure_idle()?;
        self.unset(|cb| cb.progress.take().map(|_| ()))
    }

    pub fn set_state_changed_cb(&mut self, cb: StateChangedCb) -> Result<()> {
        self.ensure_idle()?;
        self.shared.callbacks.lock().state_changed = Some(cb);
        Ok(())
    }

    pub fn unset_state_changed_cb(&mut self) -> Result<()> {
        self.ensure_idle()?;
        self.unset(|cb| cb.state_changed.take().map(|_| ()))
    }

    fn unset(&self, take: impl FnOnce(&mut Callbacks) -> Option<()>) -> Result<()> {
        take(&mut self.shared.callbacks.lock())
            .ok_or_else(|| Error::InvalidOperation("callback was not set".into()))
    }

    /// Validate the configuration and launch the analysis stage.
    pub fn start(&mut self) -> Result<()> {
        self.ensure_idle()?;

        let logic = self
            .logic
            .clone()
            .ok_or_else(|| Error::InvalidOperation("no expression registered".into()))?;
        let media_path = self
            .media_path
            .clone()
            .ok_or_else(|| Error::InvalidOperation("no media path".into()))?;
        let render_uid = self
            .render_uid
            .clone()
            .ok_or_else(|| Error::InvalidOperation("no render target".into()))?;
        let output_path = self
            .output_path
            .clone()
            .ok_or_else(|| Error::InvalidOperation("no output path".into()))?;

        validate_link(&self.expression, &self.registry, &render_uid)?;

        let extractor = (self.extractor_factory)(&media_path)?;
        let info = extractor.media_info().clone();
        let (primary_type, primary) = info
            .primary()
            .ok_or_else(|| Error::NotSupportedMedia("media has no streams".into()))?;

        self.registry.validate(info.has_video(), info.has_audio())?;
        self.registry.validate_attrs(&render_uid)?;
        self.registry.apply_all_attrs()?;

        let accumulator = Arc::new(Mutex::new(Accumulator::new()));
        let synchronizer = AvSynchronizer::new(extractor);

        *self.shared.render_inputs.lock() = Some(RenderInputs {
            media_path,
            registry: self.registry.clone(),
            render_uid,
            primary_type,
            total_frames: primary.total_frames,
            framerate: primary.framerate,
            accumulator: accumulator.clone(),
            output_path,
        });

        let shared = self.shared.clone();
        let complete_cb: CompleteCb = Arc::new(move |code| Shared::on_complete(&shared, code));
        let progress_cb = self.shared.callbacks.lock().progress.clone();

        let mut dataflow = DataFlow::new(DataFlowContext {
            synchronizer,
            logic,
            registry: self.registry.clone(),
            accumulator,
            converter: self.converter.clone(),
            skip_frames: if info.has_video() { self.skip_frames } else { 0 },
            complete_cb,
            progress_cb,
        });

        // State flips before the worker spawns so the state-changed
        // callback precedes any progress callback.
        self.shared.update_state(SessionState::Analysis);
        if let Err(e) = dataflow.start() {
            self.shared.update_state(SessionState::Idle);
            return Err(e);
        }
        self.dataflow = Some(dataflow);
        Ok(())
    }

    /// Abort the analysis stage. The worker completes its in-flight frame,
    /// then drains out with a clean (code 0) completion.
    pub fn stop(&mut self) -> Result<()> {
        let state = self.shared.state();
        if state != SessionState::Analysis {
            return Err(Error::InvalidState(format!("{state:?}")));
        }
        let Some(dataflow) = self.dataflow.as_mut() else {
            return Err(Error::InvalidOperation("no analysis worker".into()));
        };

        self.shared.update_state(SessionState::Idle);
        dataflow.stop();
        Ok(())
    }

    /// Tear the session down: aborts a running analysis, waits for a running
    /// render, never errors. Safe to call more than once.
    pub fn destroy(&mut self) {
        if self.shared.state() == SessionState::Analysis {
            // A failed stop means the worker finished in the meantime.
            let _ = self.stop();
        }

        if let Some(dataflow) = self.dataflow.as_mut() {
            dataflow.stop();
        }

        let task = self.shared.render_task.lock().take();
        if let Some(mut task) = task {
            task.join();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.destroy();
    }
}
