//! Render-side validation of effect attribute maps

use std::collections::BTreeMap;

use log::error;

use cf_core::{Error, Result};

use crate::types::AttrMap;

/// Value check applied to one attribute.
pub type AttrCheckFn = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// Specification of one attribute a render backend accepts for an effect.
pub struct AttributeSpec {
    pub name: String,
    pub mandatory: bool,
    /// Human-readable constraint, quoted in error messages.
    pub spec: String,
    pub check: Option<AttrCheckFn>,
}

impl AttributeSpec {
    pub fn new(name: impl Into<String>, mandatory: bool, spec: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mandatory,
            spec: spec.into(),
            check: None,
        }
    }

    pub fn with_check(mut self, check: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.check = Some(Box::new(check));
        self
    }
}

/// Validates effect attribute maps against a per-effect-name spec table.
///
/// Render backends own one of these and delegate `validate_effect_attrs`
/// to it.
#[derive(Default)]
pub struct AttributeValidator {
    specs: BTreeMap<String, Vec<AttributeSpec>>,
}

impl AttributeValidator {
    pub fn new(specs: BTreeMap<String, Vec<AttributeSpec>>) -> Self {
        Self { specs }
    }

    /// Names of the effects this validator knows.
    pub fn effect_names(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }

    pub fn knows(&self, effect_name: &str) -> bool {
        self.specs.contains_key(effect_name)
    }

    /// Check one effect's attribute map. Every attribute must be consumed:
    /// the effect name selects the spec list, each spec consumes its
    /// attribute, leftovers are unsupported.
    pub fn validate(&self, attrs: &AttrMap) -> Result<()> {
        let mut remaining = attrs.clone();
        let effect_name = self.parse_effect_name(&mut remaining)?;
        self.validate_effect_attributes(&mut remaining, &effect_name)?;
        self.check_unhandled(&remaining, &effect_name)
    }

    fn parse_effect_name(&self, attrs: &mut AttrMap) -> Result<String> {
        let effect_name = attrs
            .remove("name")
            .ok_or_else(|| Error::InvalidOperation("no effect name".into()))?;

        if !self.specs.contains_key(&effect_name) {
            return Err(Error::NotSupportedEffect(effect_name));
        }
        Ok(effect_name)
    }

    fn validate_effect_attributes(&self, attrs: &mut AttrMap, effect_name: &str) -> Result<()> {
        for spec in &self.specs[effect_name] {
            let Some(value) = attrs.get(&spec.name) else {
                if spec.mandatory {
                    return Err(Error::InvalidOperation(format!(
                        "mandatory attribute is not set: {}",
                        spec.name
                    )));
                }
                continue;
            };

            if let Some(check) = &spec.check {
                if !check(value) {
                    return Err(Error::InvalidEffectAttrValue(format!(
                        "{effect_name}, {}:{value}, {}",
                        spec.name, spec.spec
                    )));
                }
            }
            attrs.remove(&spec.name);
        }
        Ok(())
    }

    fn check_unhandled(&self, attrs: &AttrMap, effect_name: &str) -> Result<()> {
        if attrs.is_empty() {
            return Ok(());
        }
        for (key, value) in attrs {
            error!("unsupported effect attr for {effect_name} [{key}:{value}]");
        }
        Err(Error::NotSupportedEffectAttr(format!(
            "unsupported effect attribute for {effect_name}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> AttributeValidator {
        let mut specs = BTreeMap::new();
        specs.insert(
            "blur".to_string(),
            vec![
                AttributeSpec::new("strength", true, "0.0 .. 1.0").with_check(|v| {
                    v.parse::<f64>()
                        .map(|f| (0.0..=1.0).contains(&f))
                        .unwrap_or(false)
                }),
                AttributeSpec::new("shape", false, "box | gaussian"),
            ],
        );
        AttributeValidator::new(specs)
    }

    fn attrs(pairs: &[(&str, &str)]) -> AttrMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_valid_attrs_pass() {
        let v = validator();
        assert!(v
            .validate(&attrs(&[("name", "blur"), ("strength", "0.7")]))
            .is_ok());
    }

    #[test]
    fn test_missing_name_fails() {
        let v = validator();
        let err = v.validate(&attrs(&[("strength", "0.7")])).unwrap_err();
        assert_eq!(err.code(), -2);
    }

    #[test]
    fn test_unknown_effect_fails() {
        let v = validator();
        let err = v
            .validate(&attrs(&[("name", "sparkle"), ("strength", "0.7")]))
            .unwrap_err();
        assert_eq!(err.code(), -7);
    }

    #[test]
    fn test_missing_mandatory_fails() {
        let v = validator();
        let err = v.validate(&attrs(&[("name", "blur")])).unwrap_err();
        assert_eq!(err.code(), -2);
    }

    #[test]
    fn test_bad_value_fails() {
        let v = validator();
        let err = v
            .validate(&attrs(&[("name", "blur"), ("strength", "2.0")]))
            .unwrap_err();
        assert_eq!(err.code(), -9);
    }

    #[test]
    fn test_leftover_attr_fails() {
        let v = validator();
        let err = v
            .validate(&attrs(&[
                ("name", "blur"),
                ("strength", "0.7"),
                ("speed", "9"),
            ]))
            .unwrap_err();
        assert_eq!(err.code(), -8);
    }
}
