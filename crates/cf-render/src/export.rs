//! Built-in render backend: timeline JSON export
//!
//! Serializes the finished timeline to a JSON document at the `path`
//! attribute. The write is atomic (temp file + rename), so a failed render
//! never leaves a partial timeline behind.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use log::info;

use cf_core::{Error, Result};
use cf_plugin::{
    AttrMap, AttributeSpec, AttributeValidator, MetaForm, PluginBehavior, PluginSpec, PluginType,
    RenderPlugin,
};
use cf_timeline::{timeline_to_value, Timeline};

fn in_range(value: &str, low: f64, high: f64) -> bool {
    value
        .parse::<f64>()
        .map(|v| (low..=high).contains(&v))
        .unwrap_or(false)
}

/// Effect table of the export backend: name, expected detection shape and
/// accepted attributes.
fn effect_specs() -> (
    BTreeMap<String, Vec<AttributeSpec>>,
    BTreeMap<String, MetaForm>,
) {
    let mut specs = BTreeMap::new();
    let mut forms = BTreeMap::new();

    specs.insert(
        "boxblur".to_string(),
        vec![AttributeSpec::new("intensity", false, "Supported range : 0 ~ 19")
            .with_check(|v| in_range(v, 0.0, 19.0))],
    );
    forms.insert("boxblur".to_string(), MetaForm::Rect);

    specs.insert(
        "drawbox".to_string(),
        vec![
            AttributeSpec::new("color", false, ""),
            AttributeSpec::new("thickness", false, ""),
        ],
    );
    forms.insert("drawbox".to_string(), MetaForm::Rect);

    specs.insert(
        "drawtext".to_string(),
        vec![
            AttributeSpec::new("fontcolor", false, ""),
            AttributeSpec::new("fontsize", false, ""),
            AttributeSpec::new("x", false, ""),
            AttributeSpec::new("y", false, ""),
        ],
    );
    forms.insert("drawtext".to_string(), MetaForm::Any);

    specs.insert(
        "volume".to_string(),
        vec![AttributeSpec::new("volume", false, "Supported range : 0.0 ~ 10.0")
            .with_check(|v| in_range(v, 0.0, 10.0))],
    );
    forms.insert("volume".to_string(), MetaForm::Double);

    specs.insert("marker".to_string(), vec![]);
    forms.insert("marker".to_string(), MetaForm::Any);

    (specs, forms)
}

/// Render backend writing the timeline document as JSON.
pub struct TimelineExportRender {
    validator: AttributeValidator,
    forms: BTreeMap<String, MetaForm>,
    output_path: Option<PathBuf>,
}

impl TimelineExportRender {
    pub fn new() -> Self {
        let (specs, forms) = effect_specs();
        Self {
            validator: AttributeValidator::new(specs),
            forms,
            output_path: None,
        }
    }
}

impl Default for TimelineExportRender {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPlugin for TimelineExportRender {
    fn validate_effect_attrs(&self, attrs: &AttrMap) -> Result<()> {
        self.validator.validate(attrs)
    }

    fn effect_meta_form(&self, effect_name: &str) -> MetaForm {
        self.forms
            .get(effect_name)
            .copied()
            .unwrap_or(MetaForm::None)
    }

    fn set_attrs(&mut self, attrs: &AttrMap) -> Result<()> {
        let path = attrs
            .get("path")
            .ok_or_else(|| Error::InvalidParameter("no path attribute".into()))?;
        self.output_path = Some(PathBuf::from(path));
        Ok(())
    }

    fn render(&mut self, timeline: &Timeline) -> Result<()> {
        let path = self
            .output_path
            .as_ref()
            .ok_or_else(|| Error::InvalidParameter("output path is empty".into()))?;

        let document = timeline_to_value(timeline);
        let body = serde_json::to_string_pretty(&document)
            .map_err(|e| Error::InvalidOperation(format!("timeline serialization: {e}")))?;

        // Atomic write: no partial document survives a failure mid-file.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, path)?;

        info!("timeline written to {}", path.display());
        Ok(())
    }
}

/// Registration spec for the export backend.
pub fn timeline_export_spec() -> PluginSpec {
    PluginSpec {
        name: "timeline_export".into(),
        plugin_type: PluginType::Render,
        accepted_formats: Vec::new(),
        meta_form: MetaForm::None,
        behavior: PluginBehavior::Render(Box::new(TimelineExportRender::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cf_core::{MediaType, TimeRange};

    fn attrs(pairs: &[(&str, &str)]) -> AttrMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_effect_attr_validation() {
        let render = TimelineExportRender::new();

        assert!(render
            .validate_effect_attrs(&attrs(&[("name", "boxblur"), ("intensity", "10")]))
            .is_ok());
        assert!(render
            .validate_effect_attrs(&attrs(&[("name", "boxblur"), ("intensity", "30")]))
            .is_err());
        assert!(render
            .validate_effect_attrs(&attrs(&[("name", "sparkle")]))
            .is_err());
        assert!(render
            .validate_effect_attrs(&attrs(&[("name", "marker")]))
            .is_ok());
    }

    #[test]
    fn test_effect_meta_forms() {
        let render = TimelineExportRender::new();
        assert_eq!(render.effect_meta_form("boxblur"), MetaForm::Rect);
        assert_eq!(render.effect_meta_form("volume"), MetaForm::Double);
        assert_eq!(render.effect_meta_form("unknown"), MetaForm::None);
    }

    #[test]
    fn test_render_writes_document() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.json");

        let mut timeline = Timeline::new("Timeline", 30.0);
        timeline.append_track("Track-001", MediaType::Video);
        timeline.add_media_ref("/media/a.mp4", 30.0, 100.0);
        timeline
            .append_clip(
                "Track-001",
                "",
                TimeRange {
                    start_frame: 0.0,
                    duration: 10.0,
                },
                "/media/a.mp4",
                vec![],
            )
            .unwrap();

        let mut render = TimelineExportRender::new();
        render
            .set_attrs(&attrs(&[("path", output.to_str().unwrap())]))
            .unwrap();
        render.render(&timeline).unwrap();

        let body = fs::read_to_string(&output).unwrap();
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["tracks"][0]["children"][0]["kind"], "clip");
        // No temp file left behind.
        assert!(!output.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_render_without_path_fails() {
        let timeline = Timeline::new("Timeline", 30.0);
        let mut render = TimelineExportRender::new();
        assert!(render.render(&timeline).is_err());
    }
}
