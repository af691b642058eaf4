//! JSON encoding with a configurable wire key casing.
//!
//! # Design
//! Rust fields are snake_case. `KeyCasing` names the convention used on the
//! wire. Only struct field names are renamed, and only in one direction:
//! encode maps each field through `KeyCasing::to_wire`, and decode matches
//! wire keys against `to_wire` of the target struct's declared fields. A
//! field therefore always round-trips, even when the casing itself is lossy
//! (`address_line_1` and `address_line1` both become `addressLine1`). Map
//! keys are data and pass through in both directions.

mod de;
mod ser;

use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::ConversionError;

use self::de::WireDeserializer;
use self::ser::WireSerializer;

/// Key naming convention for JSON on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyCasing {
    /// Keys are passed through untouched.
    #[default]
    AsIs,
    /// `display_name`
    SnakeCase,
    /// `displayName`
    CamelCase,
}

impl KeyCasing {
    /// Rename a snake_case field name into this convention.
    pub fn to_wire(&self, key: &str) -> String {
        match self {
            KeyCasing::AsIs => key.to_string(),
            KeyCasing::SnakeCase => to_snake_case(key),
            KeyCasing::CamelCase => to_camel_case(key),
        }
    }
}

impl FromStr for KeyCasing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "as-is" | "asis" | "none" => Ok(KeyCasing::AsIs),
            "snake" | "snake_case" => Ok(KeyCasing::SnakeCase),
            "camel" | "camelcase" => Ok(KeyCasing::CamelCase),
            other => Err(format!("unknown key casing: {other}")),
        }
    }
}

/// serde_json encoder/decoder bound to a wire `KeyCasing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JsonCodec {
    casing: KeyCasing,
}

impl JsonCodec {
    pub fn new(casing: KeyCasing) -> Self {
        Self { casing }
    }

    pub fn casing(&self) -> KeyCasing {
        self.casing
    }

    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, ConversionError> {
        if self.casing == KeyCasing::AsIs {
            return Ok(serde_json::to_vec(value)?);
        }
        let value = value.serialize(WireSerializer::new(self.casing))?;
        Ok(serde_json::to_vec(&value)?)
    }

    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, ConversionError> {
        if self.casing == KeyCasing::AsIs {
            return Ok(serde_json::from_slice(bytes)?);
        }
        let value: Value = serde_json::from_slice(bytes)?;
        Ok(T::deserialize(WireDeserializer::new(value, self.casing))?)
    }
}

fn to_snake_case(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let mut out = String::with_capacity(key.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_ascii_lowercase() || p.is_ascii_digit() => true,
                // "HTTPServer" -> "http_server"
                Some(p) if p.is_ascii_uppercase() => next.is_some_and(|n| n.is_ascii_lowercase()),
                _ => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else if c == '-' {
            out.push('_');
        } else {
            out.push(c);
        }
    }
    out
}

fn to_camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper_next = false;
    for c in key.chars() {
        if c == '_' || c == '-' {
            // keep a leading underscore, it is part of the name
            if out.is_empty() {
                out.push(c);
            } else {
                upper_next = true;
            }
        } else if upper_next {
            out.push(c.to_ascii_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}
