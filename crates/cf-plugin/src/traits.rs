//! Behavior traits implemented by plugins

use cf_core::{FramePack, Outcome, Result};
use cf_timeline::Timeline;

use crate::types::{AttrMap, MetaForm};

/// Detector behavior: inspects one frame, returns a verdict.
///
/// Detectors may be stateful (a multi-frame detector accumulates evidence
/// and returns its retroactive inclusion column on the last frame), hence
/// `&mut self`.
pub trait ProcessPlugin: Send {
    fn process(&mut self, frame: &FramePack) -> Result<Outcome>;

    fn set_attrs(&mut self, _attrs: &AttrMap) -> Result<()> {
        Ok(())
    }
}

/// Effect behavior: declarative only. Never invoked during analysis; the
/// render backend receives its info through the timeline.
pub trait EffectPlugin: Send {
    /// Effect description forwarded to the timeline. Must contain `name`.
    fn effect_info(&self) -> AttrMap;

    fn set_attrs(&mut self, _attrs: &AttrMap) -> Result<()> {
        Ok(())
    }
}

/// Render backend behavior: consumes the finished timeline.
pub trait RenderPlugin: Send {
    /// Check one effect's attribute map for conformance.
    fn validate_effect_attrs(&self, attrs: &AttrMap) -> Result<()>;

    /// Detection shape the backend expects for the named effect.
    fn effect_meta_form(&self, effect_name: &str) -> MetaForm;

    fn render(&mut self, timeline: &Timeline) -> Result<()>;

    /// Accepts at least the `path` attribute (output file location).
    fn set_attrs(&mut self, _attrs: &AttrMap) -> Result<()> {
        Ok(())
    }
}

/// A plugin's behavior, dispatched by kind.
pub enum PluginBehavior {
    Process(Box<dyn ProcessPlugin>),
    Effect(Box<dyn EffectPlugin>),
    Render(Box<dyn RenderPlugin>),
}

impl PluginBehavior {
    pub fn set_attrs(&mut self, attrs: &AttrMap) -> Result<()> {
        match self {
            Self::Process(p) => p.set_attrs(attrs),
            Self::Effect(e) => e.set_attrs(attrs),
            Self::Render(r) => r.set_attrs(attrs),
        }
    }
}

impl std::fmt::Debug for PluginBehavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::Process(_) => "Process",
            Self::Effect(_) => "Effect",
            Self::Render(_) => "Render",
        };
        f.write_str(kind)
    }
}
