//! # Inter-step Payloads
//!
//! Activity inputs and results travel through the orchestration service as
//! opaque text. Inside the crate they are JSON objects wrapped in [`Payload`].
//! The decider accumulates step results into one payload keyed by activity
//! name and hands that whole map to the next step.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Key under which the execution start input is carried forward
pub const EXECUTION_INPUT_KEY: &str = "execution_input";

/// A flat JSON object exchanged between pipeline steps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Map<String, Value>);

impl Payload {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Parse payload text; anything but a JSON object is rejected
    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.0)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// A nested object, typically one activity's result inside the accumulated map
    pub fn section(&self, key: &str) -> Option<Payload> {
        match self.0.get(key) {
            Some(Value::Object(map)) => Some(Payload(map.clone())),
            _ => None,
        }
    }

    /// Store another payload as a nested section
    pub fn insert_section(&mut self, key: impl Into<String>, section: Payload) {
        self.0.insert(key.into(), Value::Object(section.0));
    }

    /// Iterate nested sections in key order
    pub fn sections(&self) -> impl Iterator<Item = (&str, Payload)> + '_ {
        self.0.iter().filter_map(|(key, value)| match value {
            Value::Object(map) => Some((key.as_str(), Payload(map.clone()))),
            _ => None,
        })
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Payload {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.0) {
            Ok(text) => write!(f, "{text}"),
            Err(_) => write!(f, "<unprintable payload>"),
        }
    }
}
