use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FsError, FsResult};

/// Provider-specific options handed to `create` and `open`.
///
/// Keys are dotted strings (`journal.segment-records`); values are kept as
/// strings and parsed on demand by the provider that reads them. Providers
/// ignore keys they do not recognise.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FsConfig {
    values: BTreeMap<String, String>,
}

impl FsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> FsResult<bool> {
        match self.get(key) {
            None => Ok(default),
            Some("true" | "yes" | "on" | "1") => Ok(true),
            Some("false" | "no" | "off" | "0") => Ok(false),
            Some(other) => Err(FsError::Malformed(format!(
                "config key {key}: expected a boolean, got '{other}'"
            ))),
        }
    }

    pub fn get_u64(&self, key: &str, default: u64) -> FsResult<u64> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => v.parse().map_err(|_| {
                FsError::Malformed(format!("config key {key}: expected an integer, got '{v}'"))
            }),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Parse a TOML document. Nested tables flatten into dotted keys, so
    /// `[journal]` followed by `fsync = true` yields `journal.fsync = "true"`.
    pub fn from_toml_str(s: &str) -> FsResult<Self> {
        let table: toml::Table = s
            .parse()
            .map_err(|e: toml::de::Error| FsError::Malformed(e.to_string()))?;
        let mut config = Self::new();
        flatten("", &table, &mut config)?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> FsResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

fn flatten(prefix: &str, table: &toml::Table, out: &mut FsConfig) -> FsResult<()> {
    for (key, value) in table {
        let full = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            toml::Value::Table(inner) => flatten(&full, inner, out)?,
            toml::Value::String(s) => out.set(full, s.clone()),
            toml::Value::Integer(i) => out.set(full, i.to_string()),
            toml::Value::Float(f) => out.set(full, f.to_string()),
            toml::Value::Boolean(b) => out.set(full, b.to_string()),
            toml::Value::Datetime(d) => out.set(full, d.to_string()),
            toml::Value::Array(_) => {
                return Err(FsError::Malformed(format!(
                    "config key {full}: arrays are not supported"
                )))
            }
        }
    }
    Ok(())
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FsConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut config = Self::new();
        for (k, v) in iter {
            config.set(k, v);
        }
        config
    }
}
