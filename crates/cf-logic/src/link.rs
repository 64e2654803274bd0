//! Detector/effect link validation against the render backend

use log::error;

use cf_core::{Error, Result};
use cf_plugin::PluginRegistry;

use crate::token::{is_logical_operator, OP_AND, OP_COLON, OP_UNCUT};

/// Check every detector/effect pair of the expression against the render
/// backend's expected detection shapes.
///
/// A pair is `detector : effect` or `detector & effect` (an effect AND-ed in
/// annotates the detector on its left). The effect's `name` attribute selects
/// the backend-side form; the forms must match modulo `Any`.
pub fn validate_link(
    expression: &[String],
    registry: &PluginRegistry,
    render_uid: &str,
) -> Result<()> {
    let mut prev = String::new();
    let mut detect = String::new();

    for token in expression {
        if is_logical_operator(token) {
            detect = prev.clone();
            prev = token.clone();
            continue;
        }

        if token == OP_UNCUT {
            prev = token.clone();
            continue;
        }

        let is_effect = registry
            .find(token)
            .map(|p| p.plugin_type.is_effect())
            .unwrap_or(false);

        if prev != OP_COLON && !(prev == OP_AND && is_effect) {
            prev = token.clone();
            continue;
        }

        let effect_name = registry.get_attr(token, "name")?;
        let detect_form = registry.meta_form(&detect, "")?;
        let effect_form = registry.meta_form(render_uid, &effect_name)?;

        if !detect_form.matches(effect_form) {
            error!(
                "[{detect}] produces {detect_form:?} but effect {effect_name} on {render_uid} expects {effect_form:?}"
            );
            return Err(Error::NotSupportedEffect(effect_name));
        }

        prev = token.clone();
    }

    Ok(())
}
