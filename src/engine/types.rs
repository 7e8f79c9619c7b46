// SPDX-License-Identifier: MIT

//! YAML schema types for the trigger file
//!
//! These types mirror the file exactly so a loaded file can be written back
//! without losing rule order, response order or any field.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

pub const DEFAULT_LEGACY_INSTANCE: &str = "{{ instance }}";

/// Top-level trigger file
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TriggerFile {
    /// Cooldown window shared by all special triggers, in seconds
    pub trigger_timeout_s: u64,
    #[serde(default)]
    pub triggers: Vec<TriggerDefinition>,
}

/// One trigger as written in the file
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TriggerDefinition {
    /// Boolean test expression
    pub test: String,
    /// Template naming the topic/thread the reply goes to
    #[serde(default = "default_legacy_instance")]
    pub legacy_instance: String,
    /// Weight (0-100) or `default` to response template
    pub response: ResponseMap,
    #[serde(default, skip_serializing_if = "is_false")]
    pub enforce_special_timeout: bool,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub send_cubes_count: u32,
}

fn default_legacy_instance() -> String {
    DEFAULT_LEGACY_INSTANCE.to_string()
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

/// Response key as written; validated by the loader
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum ResponseKey {
    Weight(i64),
    Name(String),
    /// Any other scalar (float, bool, null), kept as text
    Invalid(String),
}

impl fmt::Display for ResponseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseKey::Weight(n) => write!(f, "{}", n),
            ResponseKey::Name(s) => write!(f, "\"{}\"", s),
            ResponseKey::Invalid(raw) => write!(f, "{}", raw),
        }
    }
}

impl<'de> Deserialize<'de> for ResponseKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ResponseKeyVisitor;

        impl<'de> Visitor<'de> for ResponseKeyVisitor {
            type Value = ResponseKey;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a scalar response key")
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<ResponseKey, E> {
                Ok(ResponseKey::Weight(v))
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<ResponseKey, E> {
                Ok(i64::try_from(v)
                    .map(ResponseKey::Weight)
                    .unwrap_or_else(|_| ResponseKey::Invalid(v.to_string())))
            }

            fn visit_f64<E: serde::de::Error>(self, v: f64) -> Result<ResponseKey, E> {
                Ok(ResponseKey::Invalid(v.to_string()))
            }

            fn visit_bool<E: serde::de::Error>(self, v: bool) -> Result<ResponseKey, E> {
                Ok(ResponseKey::Invalid(v.to_string()))
            }

            fn visit_unit<E: serde::de::Error>(self) -> Result<ResponseKey, E> {
                Ok(ResponseKey::Invalid("null".to_string()))
            }

            fn visit_none<E: serde::de::Error>(self) -> Result<ResponseKey, E> {
                self.visit_unit()
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<ResponseKey, E> {
                Ok(ResponseKey::Name(v.to_string()))
            }

            fn visit_string<E: serde::de::Error>(self, v: String) -> Result<ResponseKey, E> {
                Ok(ResponseKey::Name(v))
            }
        }

        deserializer.deserialize_any(ResponseKeyVisitor)
    }
}

/// Ordered response mapping
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseMap(pub Vec<(ResponseKey, String)>);

impl ResponseMap {
    pub fn iter(&self) -> impl Iterator<Item = &(ResponseKey, String)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for ResponseMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, text) in &self.0 {
            map.serialize_entry(key, text)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ResponseMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ResponseMapVisitor;

        impl<'de> Visitor<'de> for ResponseMapVisitor {
            type Value = ResponseMap;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping from weight or \"default\" to response text")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<ResponseMap, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, text)) = access.next_entry::<ResponseKey, String>()? {
                    entries.push((key, text));
                }
                Ok(ResponseMap(entries))
            }
        }

        deserializer.deserialize_map(ResponseMapVisitor)
    }
}
