//! Deserializer over a `Value` that maps wire keys back to struct fields.
//!
//! `deserialize_struct` is told the target's field names, so each field's
//! wire name is computed with the same `KeyCasing::to_wire` used on encode
//! and matched exactly. Keys of maps and of objects decoded any other way are
//! left untouched.

use std::collections::HashMap;

use serde::de::value::StringDeserializer;
use serde::de::{self, DeserializeSeed, IntoDeserializer, Visitor};
use serde::forward_to_deserialize_any;
use serde_json::{Map, Value};

use super::KeyCasing;

type Error = serde_json::Error;

pub(super) struct WireDeserializer {
    value: Value,
    casing: KeyCasing,
}

impl WireDeserializer {
    pub(super) fn new(value: Value, casing: KeyCasing) -> Self {
        Self { value, casing }
    }
}

fn key_deserializer(key: String) -> StringDeserializer<Error> {
    key.into_deserializer()
}

/// Rename wire keys of `map` that match a field of the target struct.
fn struct_fields(map: Map<String, Value>, fields: &[&str], casing: KeyCasing) -> Map<String, Value> {
    let by_wire: HashMap<String, &str> = fields.iter().map(|f| (casing.to_wire(f), *f)).collect();
    map.into_iter()
        .map(|(key, value)| match by_wire.get(&key) {
            Some(field) => (field.to_string(), value),
            None => (key, value),
        })
        .collect()
}

impl<'de> de::Deserializer<'de> for WireDeserializer {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        let casing = self.casing;
        match self.value {
            Value::Null => visitor.visit_unit(),
            Value::Bool(b) => visitor.visit_bool(b),
            Value::Number(n) => {
                if let Some(u) = n.as_u64() {
                    visitor.visit_u64(u)
                } else if let Some(i) = n.as_i64() {
                    visitor.visit_i64(i)
                } else if let Some(f) = n.as_f64() {
                    visitor.visit_f64(f)
                } else {
                    Err(de::Error::custom(format!("unrepresentable number {n}")))
                }
            }
            Value::String(s) => visitor.visit_string(s),
            Value::Array(items) => visitor.visit_seq(WireSeq {
                items: items.into_iter(),
                casing,
            }),
            Value::Object(map) => visitor.visit_map(WireMap::new(map, casing)),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        match self.value {
            Value::Null => visitor.visit_none(),
            _ => visitor.visit_some(self),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(self, _name: &'static str, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Error> {
        let casing = self.casing;
        match self.value {
            Value::Object(map) => visitor.visit_map(WireMap::new(struct_fields(map, fields, casing), casing)),
            other => WireDeserializer::new(other, casing).deserialize_any(visitor),
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Error> {
        let casing = self.casing;
        match self.value {
            Value::String(variant) => visitor.visit_enum(key_deserializer(variant)),
            Value::Object(map) => {
                let mut entries = map.into_iter();
                match (entries.next(), entries.next()) {
                    (Some((variant, value)), None) => visitor.visit_enum(WireEnum { variant, value, casing }),
                    _ => Err(de::Error::custom("expected an enum as a single-key object")),
                }
            }
            _ => Err(de::Error::custom("expected an enum as a string or single-key object")),
        }
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_unit()
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct seq tuple tuple_struct map identifier
    }
}

struct WireSeq {
    items: std::vec::IntoIter<Value>,
    casing: KeyCasing,
}

impl<'de> de::SeqAccess<'de> for WireSeq {
    type Error = Error;

    fn next_element_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<Option<T::Value>, Error> {
        self.items
            .next()
            .map(|value| seed.deserialize(WireDeserializer::new(value, self.casing)))
            .transpose()
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.items.len())
    }
}

struct WireMap {
    entries: serde_json::map::IntoIter,
    pending: Option<Value>,
    casing: KeyCasing,
}

impl WireMap {
    fn new(map: Map<String, Value>, casing: KeyCasing) -> Self {
        Self {
            entries: map.into_iter(),
            pending: None,
            casing,
        }
    }
}

impl<'de> de::MapAccess<'de> for WireMap {
    type Error = Error;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>, Error> {
        match self.entries.next() {
            Some((key, value)) => {
                self.pending = Some(value);
                seed.deserialize(key_deserializer(key)).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, Error> {
        let value = self
            .pending
            .take()
            .ok_or_else(|| <Error as de::Error>::custom("map value requested before its key"))?;
        seed.deserialize(WireDeserializer::new(value, self.casing))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.entries.len())
    }
}

struct WireEnum {
    variant: String,
    value: Value,
    casing: KeyCasing,
}

impl<'de> de::EnumAccess<'de> for WireEnum {
    type Error = Error;
    type Variant = WireDeserializer;

    fn variant_seed<V: DeserializeSeed<'de>>(self, seed: V) -> Result<(V::Value, WireDeserializer), Error> {
        let variant = seed.deserialize(key_deserializer(self.variant))?;
        Ok((variant, WireDeserializer::new(self.value, self.casing)))
    }
}

impl<'de> de::VariantAccess<'de> for WireDeserializer {
    type Error = Error;

    fn unit_variant(self) -> Result<(), Error> {
        de::Deserialize::deserialize(self)
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(self, seed: T) -> Result<T::Value, Error> {
        seed.deserialize(self)
    }

    fn tuple_variant<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value, Error> {
        de::Deserializer::deserialize_any(self, visitor)
    }

    fn struct_variant<V: Visitor<'de>>(self, fields: &'static [&'static str], visitor: V) -> Result<V::Value, Error> {
        de::Deserializer::deserialize_struct(self, "", fields, visitor)
    }
}
