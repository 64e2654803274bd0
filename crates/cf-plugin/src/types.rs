//! Plugin classification enums

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use cf_core::MediaType;

/// Plugin attribute map, staged on the handle and pushed into the behavior
/// at session start.
pub type AttrMap = BTreeMap<String, String>;

/// What a plugin is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PluginType {
    VideoDetect,
    VideoEffect,
    AudioDetect,
    AudioEffect,
    Render,
}

impl PluginType {
    pub fn is_effect(self) -> bool {
        matches!(self, Self::VideoEffect | Self::AudioEffect)
    }

    pub fn is_detect(self) -> bool {
        matches!(self, Self::VideoDetect | Self::AudioDetect)
    }

    /// Stream the plugin operates on; `None` for render backends.
    pub fn media_type(self) -> MediaType {
        match self {
            Self::VideoDetect | Self::VideoEffect => MediaType::Video,
            Self::AudioDetect | Self::AudioEffect => MediaType::Audio,
            Self::Render => MediaType::None,
        }
    }
}

/// Shape of the detection items a plugin produces, and the shape a render
/// backend expects for a given effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetaForm {
    None,
    Any,
    Double,
    String,
    Rect,
    RectTag,
}

impl MetaForm {
    /// Equality modulo `Any`: the link validator accepts a detector/effect
    /// pair when the forms are equal or either side is `Any`.
    pub fn matches(self, other: MetaForm) -> bool {
        self == other || self == MetaForm::Any || other == MetaForm::Any
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_form_matches_modulo_any() {
        assert!(MetaForm::Rect.matches(MetaForm::Rect));
        assert!(MetaForm::Rect.matches(MetaForm::Any));
        assert!(MetaForm::Any.matches(MetaForm::Double));
        assert!(!MetaForm::Rect.matches(MetaForm::Double));
    }

    #[test]
    fn test_plugin_type_classification() {
        assert!(PluginType::VideoEffect.is_effect());
        assert!(!PluginType::Render.is_effect());
        assert!(PluginType::AudioDetect.is_detect());
        assert_eq!(PluginType::AudioEffect.media_type(), MediaType::Audio);
        assert_eq!(PluginType::Render.media_type(), MediaType::None);
    }
}
