//! # Property Bag
//!
//! The primary configuration surface: a flat `name -> value` mapping with
//! dotted hierarchical keys (`"film.outputs.0.type"`). This is the
//! *in-memory, already-parsed* structure the core consumes — the text-form
//! scene description language that produces one is an external collaborator
//! (see the top-level scope note) and is not implemented here.
//!
//! ```
//! use lumencore::properties::{Properties, PropertyValue};
//!
//! let mut props = Properties::new();
//! props.set("film.width", PropertyValue::Int(512));
//! props.set("film.height", PropertyValue::Int(512));
//! assert_eq!(props.get_int("film.width", 0), 512);
//! assert_eq!(props.get_int("film.missing", -1), -1);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<PropertyValue>),
}

impl PropertyValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(i) => Some(*i),
            PropertyValue::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(f) => Some(*f),
            PropertyValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[PropertyValue]> {
        match self {
            PropertyValue::List(v) => Some(v),
            _ => None,
        }
    }
}

/// A dotted-key property bag. Keys are stored flat (no nested maps) since
/// that is how the wire/text form represents them; `sub_keys` reconstructs
/// hierarchy on demand for callers that need to enumerate e.g.
/// `scene.lights.<name>.*`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Properties {
    values: BTreeMap<String, PropertyValue>,
}

impl Properties {
    pub fn new() -> Self {
        Properties { values: BTreeMap::new() }
    }

    pub fn set(&mut self, key: impl Into<String>, value: PropertyValue) -> &mut Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.values.get(key)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(PropertyValue::as_bool).unwrap_or(default)
    }

    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        self.get(key).and_then(PropertyValue::as_int).unwrap_or(default)
    }

    pub fn get_float(&self, key: &str, default: f64) -> f64 {
        self.get(key).and_then(PropertyValue::as_float).unwrap_or(default)
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.get(key).and_then(PropertyValue::as_str).map(str::to_owned).unwrap_or_else(|| default.to_owned())
    }

    /// Every entry whose key starts with `prefix.`, with the prefix and
    /// trailing dot stripped. Used to enumerate indexed or named groups like
    /// `scene.lights.<name>.*`.
    pub fn sub_keys(&self, prefix: &str) -> impl Iterator<Item = (&str, &PropertyValue)> {
        let pat = format!("{prefix}.");
        let pat2 = pat.clone();
        self.values
            .iter()
            .filter(move |(k, _)| k.starts_with(&pat))
            .map(move |(k, v)| (&k[pat2.len()..], v))
    }

    /// Distinct first-path-segment names under `prefix.`, e.g. the light
    /// names in `scene.lights.<name>.*`.
    pub fn named_groups(&self, prefix: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .sub_keys(prefix)
            .filter_map(|(rest, _)| rest.split('.').next().map(str::to_owned))
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_group_enumeration() {
        let mut p = Properties::new();
        p.set("scene.lights.sun.type", PropertyValue::String("sun".into()));
        p.set("scene.lights.sun.gain", PropertyValue::Float(1.0));
        p.set("scene.lights.bulb.type", PropertyValue::String("point".into()));
        let mut names = p.named_groups("scene.lights");
        names.sort();
        assert_eq!(names, vec!["bulb".to_string(), "sun".to_string()]);
    }

    #[test]
    fn missing_key_returns_default() {
        let p = Properties::new();
        assert_eq!(p.get_int("halt.spp", -1), -1);
    }
}
