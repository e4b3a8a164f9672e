use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};

/// A single configuration value
///
/// Most settings are plain text, but some services accept live objects
/// (a pre-built channel, a delivery hook) handed over by the embedding
/// application. Objects remember their concrete type name so that a
/// mismatch can be reported without guessing.
#[derive(Clone)]
pub enum PropertyValue {
    Text(String),
    Object {
        value: Arc<dyn Any + Send + Sync>,
        type_name: &'static str,
    },
}

impl PropertyValue {
    pub fn object<T: Any + Send + Sync>(value: T) -> Self {
        Self::Object {
            value: Arc::new(value),
            type_name: type_name::<T>(),
        }
    }

    /// Human readable description of what is stored, used in error messages
    pub fn describe(&self) -> &str {
        match self {
            Self::Text(_) => "text",
            Self::Object { type_name, .. } => type_name,
        }
    }
}

impl fmt::Debug for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Object { type_name, .. } => f.debug_tuple("Object").field(type_name).finish(),
        }
    }
}

/// Key/value configuration source
#[derive(Debug, Clone, Default)]
pub struct Properties {
    entries: HashMap<String, PropertyValue>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document, flattening nested tables into dotted keys
    ///
    /// `[a.b] c = 1` becomes the text property `a.b.c = "1"`.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(source)?;
        let mut properties = Self::new();
        flatten_into(&mut properties, None, &table)?;
        Ok(properties)
    }

    /// Load properties from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.entries
            .insert(key.into(), PropertyValue::Text(value.into()));
        self
    }

    pub fn set_object<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) -> &mut Self {
        self.entries.insert(key.into(), PropertyValue::object(value));
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<PropertyValue> {
        self.entries.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.entries.get(key)
    }

    /// Text value of `key`. Object values are reported as invalid.
    pub fn text(&self, key: &str) -> Result<Option<&str>> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(PropertyValue::Text(text)) => Ok(Some(text.as_str())),
            Some(other) => Err(Error::invalid_property(
                key,
                format!("expected text, found {}", other.describe()),
            )),
        }
    }

    /// Object value of `key`, checked against the requested type
    pub fn object<T: Any + Send + Sync + Clone>(&self, key: &str) -> Result<Option<T>> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(PropertyValue::Object { value, type_name: found }) => value
                .downcast_ref::<T>()
                .cloned()
                .map(Some)
                .ok_or_else(|| {
                    Error::invalid_property(
                        key,
                        format!("expected {}, found {}", type_name::<T>(), found),
                    )
                }),
            Some(other) => Err(Error::invalid_property(
                key,
                format!("expected {}, found {}", type_name::<T>(), other.describe()),
            )),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

fn flatten_into(properties: &mut Properties, prefix: Option<&str>, table: &toml::Table) -> Result<()> {
    for (name, value) in table {
        let key = match prefix {
            Some(prefix) => format!("{prefix}.{name}"),
            None => name.clone(),
        };
        match value {
            toml::Value::Table(nested) => flatten_into(properties, Some(&key), nested)?,
            toml::Value::String(text) => {
                properties.set(key, text.clone());
            }
            toml::Value::Integer(n) => {
                properties.set(key, n.to_string());
            }
            toml::Value::Float(n) => {
                properties.set(key, n.to_string());
            }
            toml::Value::Boolean(b) => {
                properties.set(key, b.to_string());
            }
            toml::Value::Datetime(dt) => {
                properties.set(key, dt.to_string());
            }
            toml::Value::Array(_) => {
                return Err(Error::invalid_property(key, "arrays are not supported"));
            }
        }
    }
    Ok(())
}
