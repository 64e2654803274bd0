//! Plugin registry: uid allocation, lookup and attribute staging

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::debug;
use parking_lot::{Mutex, MutexGuard, RwLock};

use cf_core::{Error, FrameFormat, Result};

use crate::traits::PluginBehavior;
use crate::types::{AttrMap, MetaForm, PluginType};

static UID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Everything needed to register a plugin.
pub struct PluginSpec {
    pub name: String,
    pub plugin_type: PluginType,
    pub accepted_formats: Vec<FrameFormat>,
    pub meta_form: MetaForm,
    pub behavior: PluginBehavior,
}

/// A registered plugin: metadata plus the behavior behind a lock.
///
/// Attributes are staged here while the session is idle and pushed into the
/// behavior by `apply_all_attrs` at start.
pub struct PluginHandle {
    pub uid: String,
    pub plugin_type: PluginType,
    pub accepted_formats: Vec<FrameFormat>,
    pub meta_form: MetaForm,
    attrs: RwLock<AttrMap>,
    behavior: Mutex<PluginBehavior>,
}

impl PluginHandle {
    pub fn attrs(&self) -> AttrMap {
        self.attrs.read().clone()
    }

    pub fn attr(&self, key: &str) -> Option<String> {
        self.attrs.read().get(key).cloned()
    }

    pub fn behavior(&self) -> MutexGuard<'_, PluginBehavior> {
        self.behavior.lock()
    }
}

/// The set of plugins loaded into a session.
///
/// Plugins live from registration until the registry is dropped.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: RwLock<BTreeMap<String, Arc<PluginHandle>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn make_uid(name: &str) -> String {
        format!("{}.{}", name, UID_COUNTER.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Register a plugin and hand back its uid.
    pub fn register(&self, spec: PluginSpec) -> String {
        let uid = Self::make_uid(&spec.name);
        debug!("register plugin {} ({:?})", uid, spec.plugin_type);

        let handle = Arc::new(PluginHandle {
            uid: uid.clone(),
            plugin_type: spec.plugin_type,
            accepted_formats: spec.accepted_formats,
            meta_form: spec.meta_form,
            attrs: RwLock::new(AttrMap::new()),
            behavior: Mutex::new(spec.behavior),
        });
        self.plugins.write().insert(uid.clone(), handle);
        uid
    }

    pub fn exists(&self, uid: &str) -> bool {
        self.plugins.read().contains_key(uid)
    }

    pub fn find(&self, uid: &str) -> Result<Arc<PluginHandle>> {
        self.plugins
            .read()
            .get(uid)
            .cloned()
            .ok_or_else(|| Error::InvalidParameter(format!("no plugin: {uid}")))
    }

    pub fn uids(&self) -> Vec<String> {
        self.plugins.read().keys().cloned().collect()
    }

    /// Merge `attrs` into the staged attribute map of `uid`.
    pub fn set_attrs(&self, uid: &str, attrs: &AttrMap) -> Result<()> {
        let handle = self.find(uid)?;
        let mut staged = handle.attrs.write();
        for (key, value) in attrs {
            staged.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    pub fn get_attr(&self, uid: &str, key: &str) -> Result<String> {
        let handle = self.find(uid)?;
        handle
            .attr(key)
            .ok_or_else(|| Error::InvalidParameter(format!("no attribute {key} on {uid}")))
    }

    /// Reject registered plugins that target a stream the media lacks.
    pub fn validate(&self, has_video: bool, has_audio: bool) -> Result<()> {
        for (uid, handle) in self.plugins.read().iter() {
            match handle.plugin_type {
                PluginType::VideoDetect | PluginType::VideoEffect if !has_video => {
                    return Err(Error::InvalidOperation(format!(
                        "no video stream but {uid} requires video"
                    )));
                }
                PluginType::AudioDetect | PluginType::AudioEffect if !has_audio => {
                    return Err(Error::InvalidOperation(format!(
                        "no audio stream but {uid} requires audio"
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Delegate every effect plugin's attribute map to the render backend
    /// for conformance checking.
    pub fn validate_attrs(&self, render_uid: &str) -> Result<()> {
        let render = self.find(render_uid)?;

        for (uid, handle) in self.plugins.read().iter() {
            if !handle.plugin_type.is_effect() {
                continue;
            }
            let attrs = handle.attrs();
            if attrs.is_empty() {
                return Err(Error::InvalidOperation(format!("no effect info: {uid}")));
            }
            match &*render.behavior() {
                PluginBehavior::Render(backend) => backend.validate_effect_attrs(&attrs)?,
                _ => {
                    return Err(Error::InvalidParameter(format!(
                        "not a render plugin: {render_uid}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Push every staged attribute map into its behavior. Attributes are
    /// frozen from here until the session returns to idle.
    pub fn apply_all_attrs(&self) -> Result<()> {
        for handle in self.plugins.read().values() {
            let attrs = handle.attrs();
            if attrs.is_empty() {
                continue;
            }
            handle.behavior().set_attrs(&attrs)?;
        }
        Ok(())
    }

    /// MetaForm of a plugin: detectors and effects carry their own, render
    /// backends answer per effect name.
    pub fn meta_form(&self, uid: &str, effect_name: &str) -> Result<MetaForm> {
        let handle = self.find(uid)?;
        match handle.plugin_type {
            PluginType::Render => match &*handle.behavior() {
                PluginBehavior::Render(backend) => Ok(backend.effect_meta_form(effect_name)),
                _ => Ok(MetaForm::None),
            },
            _ => Ok(handle.meta_form),
        }
    }
}
