//! Deserializer over parsed wire JSON. Object keys of structs and enum variant names are matched
//! to the target type's own identifiers by wire name, so a type keeps its serde names whatever
//! casing the native side used. Data maps keep their keys verbatim.

use serde::de::{
    self, DeserializeSeed, Deserializer, EnumAccess, IntoDeserializer, MapAccess, SeqAccess,
    Unexpected, VariantAccess, Visitor,
};
use serde::forward_to_deserialize_any;
use serde_json::{Map, Value};

use crate::naming::NamingPolicy;

type Error = serde_json::Error;

pub(crate) struct WireDeserializer {
    value: Value,
    policy: NamingPolicy,
}

impl WireDeserializer {
    pub(crate) fn new(value: Value, policy: NamingPolicy) -> Self {
        Self { value, policy }
    }
}

/// The identifier in `known` whose wire name equals that of `wire`, or `wire` itself.
fn match_ident(policy: NamingPolicy, wire: String, known: &'static [&'static str]) -> String {
    if known.iter().any(|k| *k == wire) {
        return wire;
    }
    let wanted = policy.apply(&wire);
    known
        .iter()
        .find(|k| policy.apply(k) == wanted)
        .map(|k| (*k).to_owned())
        .unwrap_or(wire)
}

fn unexpected(value: &Value) -> Unexpected<'_> {
    match value {
        Value::Null => Unexpected::Unit,
        Value::Bool(b) => Unexpected::Bool(*b),
        Value::Number(_) => Unexpected::Other("number"),
        Value::String(s) => Unexpected::Str(s),
        Value::Array(_) => Unexpected::Seq,
        Value::Object(_) => Unexpected::Map,
    }
}

fn visit_array<'de, V: Visitor<'de>>(
    items: Vec<Value>,
    policy: NamingPolicy,
    visitor: V,
) -> Result<V::Value, Error> {
    let len = items.len();
    let mut seq = WireSeq {
        items: items.into_iter(),
        policy,
    };
    let out = visitor.visit_seq(&mut seq)?;
    if seq.items.len() == 0 {
        Ok(out)
    } else {
        Err(de::Error::invalid_length(len, &"fewer elements in array"))
    }
}

fn visit_object<'de, V: Visitor<'de>>(
    map: Map<String, Value>,
    policy: NamingPolicy,
    fields: Option<&'static [&'static str]>,
    visitor: V,
) -> Result<V::Value, Error> {
    let map: Map<String, Value> = match fields {
        Some(fields) => map
            .into_iter()
            .map(|(k, v)| (match_ident(policy, k, fields), v))
            .collect(),
        None => map,
    };
    let len = map.len();
    let mut access = WireMap {
        entries: map.into_iter(),
        pending: None,
        policy,
    };
    let out = visitor.visit_map(&mut access)?;
    if access.entries.len() == 0 {
        Ok(out)
    } else {
        Err(de::Error::invalid_length(len, &"fewer elements in map"))
    }
}

impl<'de> Deserializer<'de> for WireDeserializer {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        match self.value {
            Value::Array(items) => visit_array(items, self.policy, visitor),
            Value::Object(map) => visit_object(map, self.policy, None, visitor),
            scalar => scalar.deserialize_any(visitor),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        match self.value {
            Value::Null => visitor.visit_none(),
            _ => visitor.visit_some(self),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Error> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Error> {
        match self.value {
            Value::Object(map) => visit_object(map, self.policy, Some(fields), visitor),
            other => WireDeserializer::new(other, self.policy).deserialize_any(visitor),
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Error> {
        let policy = self.policy;
        match self.value {
            Value::String(s) => visitor.visit_enum(WireEnum {
                variant: match_ident(policy, s, variants),
                content: None,
                policy,
            }),
            Value::Object(map) => {
                let mut entries = map.into_iter();
                match (entries.next(), entries.next()) {
                    (Some((k, v)), None) => visitor.visit_enum(WireEnum {
                        variant: match_ident(policy, k, variants),
                        content: Some(v),
                        policy,
                    }),
                    _ => Err(de::Error::invalid_value(
                        Unexpected::Map,
                        &"map with a single key",
                    )),
                }
            }
            other => Err(de::Error::invalid_type(unexpected(&other), &"string or map")),
        }
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct seq tuple tuple_struct map identifier ignored_any
    }
}

struct WireSeq {
    items: std::vec::IntoIter<Value>,
    policy: NamingPolicy,
}

impl<'de> SeqAccess<'de> for WireSeq {
    type Error = Error;

    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>, Error> {
        match self.items.next() {
            Some(v) => seed.deserialize(WireDeserializer::new(v, self.policy)).map(Some),
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.items.len())
    }
}

struct WireMap {
    entries: serde_json::map::IntoIter,
    pending: Option<Value>,
    policy: NamingPolicy,
}

impl<'de> MapAccess<'de> for WireMap {
    type Error = Error;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>, Error> {
        match self.entries.next() {
            Some((key, value)) => {
                self.pending = Some(value);
                seed.deserialize(KeyDeserializer { key }).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, Error> {
        match self.pending.take() {
            Some(value) => seed.deserialize(WireDeserializer::new(value, self.policy)),
            None => Err(de::Error::custom("map value requested before its key")),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.entries.len())
    }
}

struct WireEnum {
    variant: String,
    content: Option<Value>,
    policy: NamingPolicy,
}

impl<'de> EnumAccess<'de> for WireEnum {
    type Error = Error;
    type Variant = WireVariant;

    fn variant_seed<V: DeserializeSeed<'de>>(self, seed: V) -> Result<(V::Value, WireVariant), Error> {
        let variant = seed.deserialize(KeyDeserializer { key: self.variant })?;
        Ok((
            variant,
            WireVariant {
                content: self.content,
                policy: self.policy,
            },
        ))
    }
}

struct WireVariant {
    content: Option<Value>,
    policy: NamingPolicy,
}

impl<'de> VariantAccess<'de> for WireVariant {
    type Error = Error;

    fn unit_variant(self) -> Result<(), Error> {
        match self.content {
            None | Some(Value::Null) => Ok(()),
            Some(other) => Err(de::Error::invalid_type(unexpected(&other), &"unit variant")),
        }
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(self, seed: T) -> Result<T::Value, Error> {
        match self.content {
            Some(value) => seed.deserialize(WireDeserializer::new(value, self.policy)),
            None => Err(de::Error::invalid_type(
                Unexpected::UnitVariant,
                &"newtype variant",
            )),
        }
    }

    fn tuple_variant<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value, Error> {
        match self.content {
            Some(Value::Array(items)) => visit_array(items, self.policy, visitor),
            Some(other) => Err(de::Error::invalid_type(unexpected(&other), &"tuple variant")),
            None => Err(de::Error::invalid_type(
                Unexpected::UnitVariant,
                &"tuple variant",
            )),
        }
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Error> {
        match self.content {
            Some(Value::Object(map)) => visit_object(map, self.policy, Some(fields), visitor),
            Some(other) => Err(de::Error::invalid_type(unexpected(&other), &"struct variant")),
            None => Err(de::Error::invalid_type(
                Unexpected::UnitVariant,
                &"struct variant",
            )),
        }
    }
}

/// Object keys and variant names. Numeric and bool targets parse the key text, the way JSON
/// maps with integer keys are written.
struct KeyDeserializer {
    key: String,
}

macro_rules! parse_key {
    ($($method:ident => $visit:ident: $ty:ty),* $(,)?) => {
        $(fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
            let parsed: $ty = self.key.parse().map_err(<Error as de::Error>::custom)?;
            visitor.$visit(parsed)
        })*
    };
}

impl<'de> Deserializer<'de> for KeyDeserializer {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_string(self.key)
    }

    parse_key! {
        deserialize_bool => visit_bool: bool,
        deserialize_i8 => visit_i8: i8,
        deserialize_i16 => visit_i16: i16,
        deserialize_i32 => visit_i32: i32,
        deserialize_i64 => visit_i64: i64,
        deserialize_u8 => visit_u8: u8,
        deserialize_u16 => visit_u16: u16,
        deserialize_u32 => visit_u32: u32,
        deserialize_u64 => visit_u64: u64,
        deserialize_f32 => visit_f32: f32,
        deserialize_f64 => visit_f64: f64,
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Error> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Error> {
        visitor.visit_enum(IntoDeserializer::<'de, Error>::into_deserializer(self.key))
    }

    forward_to_deserialize_any! {
        i128 u128 char str string bytes byte_buf unit unit_struct seq tuple tuple_struct map
        struct identifier ignored_any
    }
}
