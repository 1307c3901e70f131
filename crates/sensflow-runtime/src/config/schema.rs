#![forbid(unsafe_code)]

//! Declared parameters of a configurable component.

use serde::Serialize;
use serde_json::{Map, Value, json};

use super::ConfigRecord;

/// Type and bounds of one parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ParamKind {
    Float {
        #[serde(skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    Integer {
        #[serde(skip_serializing_if = "Option::is_none")]
        min: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max: Option<i64>,
    },
    Bool,
    Text,
}

/// One named parameter with its default.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub default: Value,
    pub description: String,
}

impl ParamSpec {
    #[must_use]
    pub fn float(name: impl Into<String>, default: f64) -> Self {
        Self::new(name, ParamKind::Float { min: None, max: None }, json!(default))
    }

    #[must_use]
    pub fn float_range(name: impl Into<String>, default: f64, min: f64, max: f64) -> Self {
        Self::new(
            name,
            ParamKind::Float {
                min: Some(min),
                max: Some(max),
            },
            json!(default),
        )
    }

    #[must_use]
    pub fn integer(name: impl Into<String>, default: i64) -> Self {
        Self::new(name, ParamKind::Integer { min: None, max: None }, json!(default))
    }

    #[must_use]
    pub fn integer_range(name: impl Into<String>, default: i64, min: i64, max: i64) -> Self {
        Self::new(
            name,
            ParamKind::Integer {
                min: Some(min),
                max: Some(max),
            },
            json!(default),
        )
    }

    #[must_use]
    pub fn boolean(name: impl Into<String>, default: bool) -> Self {
        Self::new(name, ParamKind::Bool, Value::Bool(default))
    }

    #[must_use]
    pub fn text(name: impl Into<String>, default: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Text, Value::String(default.into()))
    }

    fn new(name: impl Into<String>, kind: ParamKind, default: Value) -> Self {
        Self {
            name: name.into(),
            kind,
            default,
            description: String::new(),
        }
    }

    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Check `value` against the declared type and bounds.
    ///
    /// Returns the value to store, or a human-readable reason.
    pub fn validate(&self, value: &Value) -> Result<Value, String> {
        match &self.kind {
            ParamKind::Float { min, max } => {
                let v = value
                    .as_f64()
                    .ok_or_else(|| format!("expected a number, got {value}"))?;
                if let Some(min) = min.filter(|min| v < *min) {
                    return Err(format!("{v} is below the minimum {min}"));
                }
                if let Some(max) = max.filter(|max| v > *max) {
                    return Err(format!("{v} is above the maximum {max}"));
                }
                Ok(json!(v))
            }
            ParamKind::Integer { min, max } => {
                let v = value
                    .as_i64()
                    .ok_or_else(|| format!("expected an integer, got {value}"))?;
                if let Some(min) = min.filter(|min| v < *min) {
                    return Err(format!("{v} is below the minimum {min}"));
                }
                if let Some(max) = max.filter(|max| v > *max) {
                    return Err(format!("{v} is above the maximum {max}"));
                }
                Ok(json!(v))
            }
            ParamKind::Bool => value
                .as_bool()
                .map(Value::Bool)
                .ok_or_else(|| format!("expected true or false, got {value}")),
            ParamKind::Text => value
                .as_str()
                .map(|s| Value::String(s.to_owned()))
                .ok_or_else(|| format!("expected a string, got {value}")),
        }
    }
}

/// Ordered parameter list of one component.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigSchema {
    params: Vec<ParamSpec>,
}

impl ConfigSchema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.retain(|p| p.name != spec.name);
        self.params.push(spec);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParamSpec> {
        self.params.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Record holding every default.
    #[must_use]
    pub fn defaults(&self) -> ConfigRecord {
        self.params
            .iter()
            .map(|p| (p.name.clone(), p.default.clone()))
            .collect()
    }

    /// JSON-schema style description, as served to a management surface.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.params {
            let mut entry = Map::new();
            let (ty, min, max) = match &param.kind {
                ParamKind::Float { min, max } => ("number", min.map(|v| json!(v)), max.map(|v| json!(v))),
                ParamKind::Integer { min, max } => ("integer", min.map(|v| json!(v)), max.map(|v| json!(v))),
                ParamKind::Bool => ("boolean", None, None),
                ParamKind::Text => ("string", None, None),
            };
            entry.insert("type".into(), json!(ty));
            if let Some(min) = min {
                entry.insert("minimum".into(), min);
            }
            if let Some(max) = max {
                entry.insert("maximum".into(), max);
            }
            entry.insert("default".into(), param.default.clone());
            if !param.description.is_empty() {
                entry.insert("description".into(), json!(param.description));
            }
            properties.insert(param.name.clone(), Value::Object(entry));
        }
        json!({ "type": "object", "properties": properties })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_accepts_integers_and_checks_range() {
        let spec = ParamSpec::float_range("gain", 1.0, 0.0, 10.0);
        assert_eq!(spec.validate(&json!(3)), Ok(json!(3.0)));
        assert_eq!(spec.validate(&json!(2.5)), Ok(json!(2.5)));
        assert!(spec.validate(&json!(-0.1)).unwrap_err().contains("minimum"));
        assert!(spec.validate(&json!(11)).unwrap_err().contains("maximum"));
        assert!(spec.validate(&json!("2")).unwrap_err().contains("number"));
    }

    #[test]
    fn integer_rejects_fractions() {
        let spec = ParamSpec::integer_range("sample_size", 10, 1, 1000);
        assert_eq!(spec.validate(&json!(25)), Ok(json!(25)));
        assert!(spec.validate(&json!(2.5)).is_err());
        assert!(spec.validate(&json!(0)).is_err());
    }

    #[test]
    fn bool_and_text() {
        assert!(ParamSpec::boolean("enabled", true).validate(&json!(false)).is_ok());
        assert!(ParamSpec::boolean("enabled", true).validate(&json!(1)).is_err());
        assert_eq!(
            ParamSpec::text("units", "m").validate(&json!("cm")),
            Ok(json!("cm"))
        );
    }

    #[test]
    fn defaults_and_description() {
        let schema = ConfigSchema::new()
            .param(ParamSpec::float("multiplier", 1.0).describe("Scale factor"))
            .param(ParamSpec::float("offset", 0.0));
        assert_eq!(schema.len(), 2);

        let defaults = schema.defaults();
        assert_eq!(defaults.get("multiplier"), Some(&json!(1.0)));

        let described = schema.to_json();
        assert_eq!(described["properties"]["multiplier"]["type"], "number");
        assert_eq!(described["properties"]["multiplier"]["description"], "Scale factor");
        assert_eq!(described["properties"]["offset"]["default"], 0.0);
    }

    #[test]
    fn redeclaring_a_param_replaces_it() {
        let schema = ConfigSchema::new()
            .param(ParamSpec::float("gain", 1.0))
            .param(ParamSpec::float("gain", 2.0));
        assert_eq!(schema.len(), 1);
        assert_eq!(schema.get("gain").map(|p| p.default.clone()), Some(json!(2.0)));
    }
}
