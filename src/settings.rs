//! The getconfs settings document
//!
//! Settings are sections of scalar key/value pairs. The reserved `DEFAULT`
//! section supplies values for keys a section does not set itself. The
//! rendered document is what `getconfs.py --ini` reads.

use crate::error::ComposeError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_SECTION: &str = "DEFAULT";

/// Section name -> key/value mapping, in input order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings(Map<String, Value>);

impl Settings {
    /// Build settings from a JSON object
    pub fn from_value(value: Value) -> Result<Self, ComposeError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(ComposeError::InvalidSettings(format!(
                "expected a mapping of sections, got {}",
                type_name(&other)
            ))),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn section(&self, name: &str) -> Option<&Map<String, Value>> {
        self.0.get(name).and_then(Value::as_object)
    }

    /// Check that every section is a mapping of scalar values
    pub fn validate(&self) -> Result<(), ComposeError> {
        for (name, section) in &self.0 {
            let Some(entries) = section.as_object() else {
                return Err(ComposeError::InvalidSettings(format!(
                    "section '{name}' must be a mapping, got {}",
                    type_name(section)
                )));
            };
            for (key, value) in entries {
                if matches!(value, Value::Object(_) | Value::Array(_)) {
                    return Err(ComposeError::InvalidSettings(format!(
                        "{name}.{key} must be a string, number or boolean"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Apply `DEFAULT` to every other section without overwriting
    ///
    /// `DEFAULT` comes first in the result; other sections keep their input
    /// order.
    pub fn merged(&self) -> Result<Self, ComposeError> {
        self.validate()?;

        let defaults = self.section(DEFAULT_SECTION).cloned();
        let mut out = Map::new();
        if let Some(defaults) = &defaults {
            out.insert(DEFAULT_SECTION.to_string(), Value::Object(defaults.clone()));
        }

        for (name, section) in &self.0 {
            if name == DEFAULT_SECTION {
                continue;
            }
            let mut entries = section.as_object().cloned().unwrap_or_default();
            if let Some(defaults) = &defaults {
                for (key, value) in defaults {
                    entries
                        .entry(key.clone())
                        .or_insert_with(|| value.clone());
                }
            }
            out.insert(name.clone(), Value::Object(entries));
        }

        Ok(Self(out))
    }

    /// Render the merged document: two-space indented JSON plus a newline
    pub fn render(&self) -> Result<String, ComposeError> {
        let merged = self.merged()?;
        let mut text = serde_json::to_string_pretty(&merged.0)
            .map_err(|e| ComposeError::InvalidSettings(e.to_string()))?;
        text.push('\n');
        Ok(text)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}
