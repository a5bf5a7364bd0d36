use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ParamError;

/// A set of named parameter values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    values: BTreeMap<String, Value>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name).filter(|v| !v.is_null())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Typed lookup. Absent and null values yield `None`.
    pub fn get_opt<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, ParamError> {
        match self.get(name) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| ParamError::InvalidType {
                    name: name.to_string(),
                    reason: e.to_string(),
                }),
        }
    }

    /// Typed lookup falling back to `default` when the parameter is not set.
    pub fn get_or<T: DeserializeOwned>(&self, name: &str, default: T) -> Result<T, ParamError> {
        Ok(self.get_opt(name)?.unwrap_or(default))
    }

    /// Keep only the named parameters
    pub fn select(&self, names: &[&str]) -> Parameters {
        let values = self
            .values
            .iter()
            .filter(|(k, _)| names.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Parameters { values }
    }

    /// Overwrite values with those from `other`
    pub fn merge(&mut self, other: &Parameters) {
        for (k, v) in &other.values {
            self.values.insert(k.clone(), v.clone());
        }
    }

    /// Parse a `name=value` override. The value is read as a YAML scalar,
    /// so `dt=5` yields a number and `benchmark_path=/tmp/out` a string.
    pub fn parse_override(assignment: &str) -> Result<(String, Value), ParamError> {
        let (name, raw) = assignment
            .split_once('=')
            .ok_or_else(|| ParamError::InvalidOverride(assignment.to_string()))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ParamError::InvalidOverride(assignment.to_string()));
        }
        let value = if raw.trim().is_empty() {
            Value::String(String::new())
        } else {
            serde_yaml::from_str::<Value>(raw)?
        };
        Ok((name.to_string(), value))
    }
}

impl FromIterator<(String, Value)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Source of named parameters, possibly remote and not yet reachable
#[async_trait]
pub trait ParameterSource: Send + Sync {
    /// Wait up to `timeout` for the source to become reachable.
    /// Returns whether it is reachable.
    async fn wait_for_service(&self, timeout: Duration) -> bool;

    /// Fetch the named parameters. Names the source does not know are omitted.
    async fn get_parameters(&self, names: &[&str]) -> Result<Parameters, ParamError>;
}
