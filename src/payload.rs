//! Application payloads.
//!
//! [`Payload`] is what applications hand to [`DataChannel::send`](crate::DataChannel::send)
//! and what arrives in `data` events. It serializes to the natural shape in
//! every format: text as a string, binary as a byte string (MsgPack `bin`,
//! JSON array of numbers), structured values as themselves.

use std::fmt;

use bytes::Bytes;
use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, Serializer};
use serde_json::Value;

use crate::error::Result;

/// A value sent or received over a data channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Plain text.
    Text(String),
    /// Raw bytes.
    Binary(Bytes),
    /// Structured data (numbers, booleans, null, arrays, objects).
    Value(Value),
}

impl Payload {
    /// Build a structured payload from any serializable value.
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Payload::Value(serde_json::to_value(value)?))
    }

    /// Get the text, if this is a text payload.
    #[inline]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Get the bytes, if this is a binary payload.
    #[inline]
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Payload::Binary(data) => Some(data),
            _ => None,
        }
    }

    /// Get the structured value, if this is a value payload.
    #[inline]
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Payload::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Convert into a JSON value. Bytes become an array of numbers.
    pub fn into_value(self) -> Value {
        match self {
            Payload::Text(text) => Value::String(text),
            Payload::Binary(data) => Value::Array(data.iter().map(|b| Value::from(*b)).collect()),
            Payload::Value(value) => value,
        }
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<Bytes> for Payload {
    fn from(data: Bytes) -> Self {
        Payload::Binary(data)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(data: Vec<u8>) -> Self {
        Payload::Binary(Bytes::from(data))
    }
}

impl From<&[u8]> for Payload {
    fn from(data: &[u8]) -> Self {
        Payload::Binary(Bytes::copy_from_slice(data))
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Value(value)
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Payload::Text(text) => serializer.serialize_str(text),
            Payload::Binary(data) => serializer.serialize_bytes(data),
            Payload::Value(value) => value.serialize(serializer),
        }
    }
}

struct PayloadVisitor;

impl<'de> Visitor<'de> for PayloadVisitor {
    type Value = Payload;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any payload")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<Payload, E> {
        Ok(Payload::Value(Value::Bool(v)))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Payload, E> {
        Ok(Payload::Value(Value::from(v)))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Payload, E> {
        Ok(Payload::Value(Value::from(v)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Payload, E> {
        Ok(Payload::Value(Value::from(v)))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Payload, E> {
        Ok(Payload::Text(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<Payload, E> {
        Ok(Payload::Text(v))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> std::result::Result<Payload, E> {
        Ok(Payload::Binary(Bytes::copy_from_slice(v)))
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> std::result::Result<Payload, E> {
        Ok(Payload::Binary(Bytes::from(v)))
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<Payload, E> {
        Ok(Payload::Value(Value::Null))
    }

    fn visit_none<E: de::Error>(self) -> std::result::Result<Payload, E> {
        Ok(Payload::Value(Value::Null))
    }

    fn visit_some<D: Deserializer<'de>>(self, d: D) -> std::result::Result<Payload, D::Error> {
        Payload::deserialize(d)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Payload, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element::<Payload>()? {
            items.push(item.into_value());
        }
        Ok(Payload::Value(Value::Array(items)))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Payload, A::Error> {
        let mut object = serde_json::Map::new();
        while let Some((key, value)) = map.next_entry::<String, Payload>()? {
            object.insert(key, value.into_value());
        }
        Ok(Payload::Value(Value::Object(object)))
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(PayloadVisitor)
    }
}
