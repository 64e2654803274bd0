//! Built-in declarative effect plugin
//!
//! Effects carry no processing; they exist so detectors can attach timeline
//! metadata over the spans they cover. The marker effect is the stock one:
//! sessions point it at whatever effect name the render backend understands.

use cf_core::Result;

use crate::registry::PluginSpec;
use crate::traits::{EffectPlugin, PluginBehavior};
use crate::types::{AttrMap, MetaForm, PluginType};

/// Declarative marker effect. Its whole contract is the attribute map it
/// reports to the render backend; `name` selects the backend-side effect.
pub struct MarkerEffect {
    attrs: AttrMap,
}

impl MarkerEffect {
    pub fn new() -> Self {
        let mut attrs = AttrMap::new();
        attrs.insert("name".into(), "marker".into());
        Self { attrs }
    }
}

impl Default for MarkerEffect {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectPlugin for MarkerEffect {
    fn effect_info(&self) -> AttrMap {
        self.attrs.clone()
    }

    fn set_attrs(&mut self, attrs: &AttrMap) -> Result<()> {
        for (key, value) in attrs {
            self.attrs.insert(key.clone(), value.clone());
        }
        Ok(())
    }
}

/// Registration spec for a marker effect on the given stream with the given
/// detection shape.
pub fn marker_effect_spec(plugin_type: PluginType, meta_form: MetaForm) -> PluginSpec {
    debug_assert!(plugin_type.is_effect());
    PluginSpec {
        name: "marker".into(),
        plugin_type,
        accepted_formats: Vec::new(),
        meta_form,
        behavior: PluginBehavior::Effect(Box::new(MarkerEffect::new())),
    }
}
