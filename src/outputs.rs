use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{AssertionError, OutputError, OutputMismatch};

/// Named outputs of an applied module, as reported by `terraform output -json`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outputs {
    values: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct OutputEntry {
    #[serde(default)]
    value: Value,
}

impl Outputs {
    /// Parses the `{"name": {"value": ..., "type": ..., "sensitive": ...}}`
    /// document terraform prints.
    pub fn from_json(document: &str) -> Result<Self, OutputError> {
        let document = document.trim();
        if document.is_empty() {
            return Ok(Self::default());
        }

        let entries: BTreeMap<String, OutputEntry> = serde_json::from_str(document)?;
        Ok(Self {
            values: entries
                .into_iter()
                .map(|(name, entry)| (name, entry.value))
                .collect(),
        })
    }

    pub fn from_values<I, K>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            values: values.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn require(&self, name: &str) -> Result<&Value, OutputError> {
        self.values
            .get(name)
            .ok_or_else(|| OutputError::Undefined(name.to_string()))
    }

    /// String form of an output. Strings are returned verbatim, null as the
    /// empty string, everything else as compact JSON.
    pub fn output(&self, name: &str) -> Result<String, OutputError> {
        Ok(render(self.require(name)?))
    }

    pub fn output_list(&self, name: &str) -> Result<Vec<String>, OutputError> {
        match self.require(name)? {
            Value::Array(items) => Ok(items.iter().map(render).collect()),
            _ => Err(OutputError::WrongShape {
                name: name.to_string(),
                expected: "a list",
            }),
        }
    }

    pub fn output_map(&self, name: &str) -> Result<BTreeMap<String, String>, OutputError> {
        match self.require(name)? {
            Value::Object(entries) => Ok(entries
                .iter()
                .map(|(key, value)| (key.clone(), render(value)))
                .collect()),
            _ => Err(OutputError::WrongShape {
                name: name.to_string(),
                expected: "a map",
            }),
        }
    }

    /// Whether the string form of `name` contains `needle`, e.g. a subnet id
    /// containing its virtual network name.
    pub fn output_contains(&self, name: &str, needle: &str) -> Result<bool, OutputError> {
        Ok(self.output(name)?.contains(needle))
    }

    /// Raw JSON text of an output.
    pub fn output_json(&self, name: &str) -> Result<String, OutputError> {
        Ok(serde_json::to_string(self.require(name)?)?)
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Checks every expectation and reports all mismatches together.
///
/// `Some(value)` requires exact equality, `None` requires a non-empty value.
/// Undefined outputs are mismatches as well.
pub fn validate_outputs(
    outputs: &Outputs,
    expected: &[(&str, Option<&str>)],
) -> Result<(), AssertionError> {
    let mut failures = Vec::new();

    for (name, expected_value) in expected {
        let actual = outputs.output(name).ok();
        let passed = match (expected_value, actual.as_deref()) {
            (Some(expected_value), Some(actual)) => *expected_value == actual,
            (None, Some(actual)) => !actual.is_empty(),
            (_, None) => false,
        };

        if passed {
            log::debug!("Output {name} matched expectation");
        } else {
            failures.push(OutputMismatch {
                name: name.to_string(),
                expected: expected_value.map(str::to_string),
                actual,
            });
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        let err = AssertionError { failures };
        log::warn!("{err}");
        Err(err)
    }
}

/// Azure reports locations in their short form: "West Europe" -> "westeurope".
pub fn normalize_location(location: &str) -> String {
    location.replace(' ', "").to_lowercase()
}
