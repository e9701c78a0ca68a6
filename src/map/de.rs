//! Typed decoding from [`Value`] trees via serde.
//!
//! [`from_value`] drives a caller-supplied `Deserialize` implementation over
//! a parsed subtree, the way the streaming decoder materializes caller
//! types. XML is stringly typed, so scalar coercion is part of the mapping:
//! a `"42"` leaf satisfies an integer field, integers widen to floats, and
//! `"true"`/`"1"`/`"yes"`/`"on"` satisfy booleans.
//!
//! Key translation follows the on-the-wire tree convention: `@name`
//! attribute keys are exposed to the target type as `name`, `#text` is
//! exposed as `text`, and the remaining `#`-metadata keys are skipped.

use std::fmt;

use serde::de::{
    self, DeserializeOwned, Deserializer, EnumAccess, IntoDeserializer, MapAccess, SeqAccess,
    VariantAccess, Visitor,
};

use crate::error::{Error, Result};
use crate::map::{OrderedMap, Value};

/// Decodes a [`Value`] into any `Deserialize` target type.
///
/// ```
/// use serde::Deserialize;
/// use xmlmap::{from_value, OrderedMap, Value};
///
/// #[derive(Deserialize)]
/// struct Order {
///     id: i64,
///     total: f64,
/// }
///
/// let mut m = OrderedMap::new();
/// m.put("id", "1");
/// m.put("total", "50.5");
/// let order: Order = from_value(&Value::Map(m)).unwrap();
/// assert_eq!(order.id, 1);
/// assert_eq!(order.total, 50.5);
/// ```
///
/// # Errors
///
/// Returns [`Error::Deserialize`] when the value shape cannot satisfy the
/// target type.
pub fn from_value<T: DeserializeOwned>(value: &Value) -> Result<T> {
    T::deserialize(ValueDe { value }).map_err(|e| Error::Deserialize(e.0))
}

/// Internal serde error carrier.
#[derive(Debug)]
pub(crate) struct DeError(String);

impl fmt::Display for DeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for DeError {}

impl de::Error for DeError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        DeError(msg.to_string())
    }
}

fn mismatch(value: &Value, want: &str) -> DeError {
    DeError(format!("expected {want}, found {}", value.type_name()))
}

struct ValueDe<'a> {
    value: &'a Value,
}

impl<'a> ValueDe<'a> {
    fn parse_i64(&self) -> std::result::Result<i64, DeError> {
        match self.value {
            Value::Int(i) => Ok(*i),
            Value::Float(f) if f.fract() == 0.0 => Ok(*f as i64),
            Value::String(s) => s
                .trim()
                .parse()
                .map_err(|_| mismatch(self.value, "integer")),
            _ => Err(mismatch(self.value, "integer")),
        }
    }

    fn parse_f64(&self) -> std::result::Result<f64, DeError> {
        match self.value {
            Value::Float(f) => Ok(*f),
            Value::Int(i) => Ok(*i as f64),
            Value::String(s) => s.trim().parse().map_err(|_| mismatch(self.value, "float")),
            _ => Err(mismatch(self.value, "float")),
        }
    }

    fn parse_bool(&self) -> std::result::Result<bool, DeError> {
        match self.value {
            Value::Bool(b) => Ok(*b),
            Value::Int(0) => Ok(false),
            Value::Int(1) => Ok(true),
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" => Ok(false),
                _ => Err(mismatch(self.value, "boolean")),
            },
            _ => Err(mismatch(self.value, "boolean")),
        }
    }
}

macro_rules! deserialize_int {
    ($method:ident, $visit:ident, $ty:ty) => {
        fn $method<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, DeError> {
            let n = self.parse_i64()?;
            let narrowed =
                <$ty>::try_from(n).map_err(|_| DeError(format!("{n} out of range")))?;
            visitor.$visit(narrowed)
        }
    };
}

impl<'de, 'a> Deserializer<'de> for ValueDe<'a> {
    type Error = DeError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, DeError> {
        match self.value {
            Value::Null => visitor.visit_unit(),
            Value::Bool(b) => visitor.visit_bool(*b),
            Value::Int(i) => visitor.visit_i64(*i),
            Value::Float(f) => visitor.visit_f64(*f),
            Value::String(s) => visitor.visit_str(s),
            Value::DateTime(dt) => visitor.visit_string(dt.to_rfc3339()),
            Value::Map(m) => visitor.visit_map(MapDe::new(m)),
            Value::List(l) => visitor.visit_seq(SeqDe { iter: l.iter() }),
        }
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, DeError> {
        visitor.visit_bool(self.parse_bool()?)
    }

    deserialize_int!(deserialize_i8, visit_i8, i8);
    deserialize_int!(deserialize_i16, visit_i16, i16);
    deserialize_int!(deserialize_i32, visit_i32, i32);
    deserialize_int!(deserialize_u8, visit_u8, u8);
    deserialize_int!(deserialize_u16, visit_u16, u16);
    deserialize_int!(deserialize_u32, visit_u32, u32);
    deserialize_int!(deserialize_u64, visit_u64, u64);

    fn deserialize_i64<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, DeError> {
        visitor.visit_i64(self.parse_i64()?)
    }

    fn deserialize_f32<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, DeError> {
        visitor.visit_f32(self.parse_f64()? as f32)
    }

    fn deserialize_f64<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, DeError> {
        visitor.visit_f64(self.parse_f64()?)
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, DeError> {
        let s = self.value.to_string();
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => visitor.visit_char(c),
            _ => Err(mismatch(self.value, "single character")),
        }
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, DeError> {
        match self.value {
            Value::String(s) => visitor.visit_str(s),
            Value::Map(_) | Value::List(_) => Err(mismatch(self.value, "string")),
            other => visitor.visit_string(other.to_string()),
        }
    }

    fn deserialize_string<V: Visitor<'de>>(
        self,
        visitor: V,
    ) -> std::result::Result<V::Value, DeError> {
        self.deserialize_str(visitor)
    }

    fn deserialize_bytes<V: Visitor<'de>>(
        self,
        visitor: V,
    ) -> std::result::Result<V::Value, DeError> {
        match self.value {
            Value::String(s) => visitor.visit_bytes(s.as_bytes()),
            _ => Err(mismatch(self.value, "bytes")),
        }
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(
        self,
        visitor: V,
    ) -> std::result::Result<V::Value, DeError> {
        self.deserialize_bytes(visitor)
    }

    fn deserialize_option<V: Visitor<'de>>(
        self,
        visitor: V,
    ) -> std::result::Result<V::Value, DeError> {
        match self.value {
            Value::Null => visitor.visit_none(),
            _ => visitor.visit_some(self),
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, DeError> {
        match self.value {
            Value::Null => visitor.visit_unit(),
            _ => Err(mismatch(self.value, "null")),
        }
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> std::result::Result<V::Value, DeError> {
        self.deserialize_unit(visitor)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> std::result::Result<V::Value, DeError> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, DeError> {
        match self.value {
            Value::List(l) => visitor.visit_seq(SeqDe { iter: l.iter() }),
            Value::Null => visitor.visit_seq(SeqDe { iter: [].iter() }),
            // A repeated element that occurred once parses as a single
            // value; sequence targets accept it as a singleton.
            single => visitor.visit_seq(SeqDe {
                iter: std::slice::from_ref(single).iter(),
            }),
        }
    }

    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        _len: usize,
        visitor: V,
    ) -> std::result::Result<V::Value, DeError> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> std::result::Result<V::Value, DeError> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, DeError> {
        match self.value {
            Value::Map(m) => visitor.visit_map(MapDe::new(m)),
            _ => Err(mismatch(self.value, "map")),
        }
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> std::result::Result<V::Value, DeError> {
        self.deserialize_map(visitor)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> std::result::Result<V::Value, DeError> {
        match self.value {
            Value::String(s) => visitor.visit_enum(s.as_str().into_deserializer()),
            Value::Map(m) if m.len() == 1 => {
                let (variant, inner) = match m.iter().next() {
                    Some(pair) => pair,
                    None => return Err(mismatch(self.value, "enum")),
                };
                visitor.visit_enum(EnumDe {
                    variant,
                    value: inner,
                })
            }
            _ => Err(mismatch(self.value, "enum")),
        }
    }

    fn deserialize_identifier<V: Visitor<'de>>(
        self,
        visitor: V,
    ) -> std::result::Result<V::Value, DeError> {
        self.deserialize_str(visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(
        self,
        visitor: V,
    ) -> std::result::Result<V::Value, DeError> {
        visitor.visit_unit()
    }
}

struct SeqDe<'a> {
    iter: std::slice::Iter<'a, Value>,
}

impl<'de, 'a> SeqAccess<'de> for SeqDe<'a> {
    type Error = DeError;

    fn next_element_seed<T: de::DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> std::result::Result<Option<T::Value>, DeError> {
        match self.iter.next() {
            Some(value) => seed.deserialize(ValueDe { value }).map(Some),
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

struct MapDe<'a> {
    entries: Vec<(String, &'a Value)>,
    index: usize,
    pending: Option<&'a Value>,
}

impl<'a> MapDe<'a> {
    fn new(map: &'a OrderedMap) -> Self {
        let mut entries = Vec::with_capacity(map.len());
        for (key, value) in map.iter() {
            // Expose attributes under their bare name and #text as "text";
            // the remaining metadata keys have no field counterpart.
            if let Some(attr) = key.strip_prefix('@') {
                entries.push((attr.to_string(), value));
            } else if key == "#text" {
                entries.push(("text".to_string(), value));
            } else if !key.starts_with('#') {
                entries.push((key.to_string(), value));
            }
        }
        Self {
            entries,
            index: 0,
            pending: None,
        }
    }
}

impl<'de, 'a> MapAccess<'de> for MapDe<'a> {
    type Error = DeError;

    fn next_key_seed<K: de::DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> std::result::Result<Option<K::Value>, DeError> {
        match self.entries.get(self.index) {
            Some((key, value)) => {
                self.index += 1;
                self.pending = Some(value);
                seed.deserialize(key.as_str().into_deserializer()).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V: de::DeserializeSeed<'de>>(
        &mut self,
        seed: V,
    ) -> std::result::Result<V::Value, DeError> {
        match self.pending.take() {
            Some(value) => seed.deserialize(ValueDe { value }),
            None => Err(DeError("value requested before key".to_string())),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.entries.len() - self.index)
    }
}

struct EnumDe<'a> {
    variant: &'a str,
    value: &'a Value,
}

impl<'de, 'a> EnumAccess<'de> for EnumDe<'a> {
    type Error = DeError;
    type Variant = VariantDe<'a>;

    fn variant_seed<V: de::DeserializeSeed<'de>>(
        self,
        seed: V,
    ) -> std::result::Result<(V::Value, Self::Variant), DeError> {
        let variant = seed.deserialize(self.variant.into_deserializer())?;
        Ok((variant, VariantDe { value: self.value }))
    }
}

struct VariantDe<'a> {
    value: &'a Value,
}

impl<'de, 'a> VariantAccess<'de> for VariantDe<'a> {
    type Error = DeError;

    fn unit_variant(self) -> std::result::Result<(), DeError> {
        Ok(())
    }

    fn newtype_variant_seed<T: de::DeserializeSeed<'de>>(
        self,
        seed: T,
    ) -> std::result::Result<T::Value, DeError> {
        seed.deserialize(ValueDe { value: self.value })
    }

    fn tuple_variant<V: Visitor<'de>>(
        self,
        _len: usize,
        visitor: V,
    ) -> std::result::Result<V::Value, DeError> {
        ValueDe { value: self.value }.deserialize_seq(visitor)
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> std::result::Result<V::Value, DeError> {
        ValueDe { value: self.value }.deserialize_map(visitor)
    }
}
