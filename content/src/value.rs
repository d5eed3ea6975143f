//! Document node model.
//!
//! A [`Value`] is one node of a document tree. Besides the usual primitive
//! leaves, lists and maps, two variants carry the structure the content
//! system cares about:
//!
//! - [`Value::Node`]: an object node with optional `$type` / `$id` headers
//! - [`Value::Link`]: one of the reserved reference wrappers
//!   (`{"ReferenceFile": ..}` / `{"ReferenceGuid": ..}`)
//!
//! Decoding classifies every map it meets, so a link can never be confused
//! with an object node. [`Value::as_reference`] folds the three possible
//! reference encodings into the [`RefShape`] sum type.
//!
//! Use [`to_value`] and [`from_value`] to convert plain serde types (math
//! vectors, enums, settings structs) to and from primitive field values.

use std::fmt;

use serde::de::{self, DeserializeSeed, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::FieldError;
use crate::identity::{ContentPath, Identity};

/// Key carrying an object node's type tag.
pub const TYPE_KEY: &str = "$type";
/// Key carrying an object node's identity.
pub const ID_KEY: &str = "$id";
/// Key of the external-path reference wrapper.
pub const REFERENCE_FILE_KEY: &str = "ReferenceFile";
/// Key of the internal-identifier reference wrapper.
pub const REFERENCE_GUID_KEY: &str = "ReferenceGuid";

/// Wire names no field may use.
pub const RESERVED_KEYS: [&str; 4] = [TYPE_KEY, ID_KEY, REFERENCE_FILE_KEY, REFERENCE_GUID_KEY];

/// One node of a document tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    /// A map without object headers or reference keys.
    Map(Vec<(String, Value)>),
    /// An object node carrying a type tag, an identity, or both.
    Node(Box<ObjectNode>),
    Link(Link),
}

/// Type tag stored in an object node header.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeTag {
    /// Long-form, stable type name.
    Name(String),
    /// Short numeric id.
    Id(u32),
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::Name(name) => f.write_str(name),
            TypeTag::Id(id) => write!(f, "#{id}"),
        }
    }
}

/// Object node with headers and fields in emission order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectNode {
    pub type_tag: Option<TypeTag>,
    pub identity: Option<Identity>,
    pub fields: Vec<(String, Value)>,
}

impl ObjectNode {
    pub fn field(&self, name: &str) -> Option<&Value> {
        lookup(&self.fields, name)
    }

    /// Wrap into a [`Value`], collapsing to a plain map when no header is set.
    pub fn into_value(self) -> Value {
        if self.type_tag.is_none() && self.identity.is_none() {
            Value::Map(self.fields)
        } else {
            Value::Node(Box::new(self))
        }
    }
}

/// Reserved reference wrapper.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Link {
    /// `{"ReferenceFile": <path>}`
    File(ContentPath),
    /// `{"ReferenceGuid": <identity>}`
    Guid(Identity),
}

/// The three mutually exclusive encodings of a reference.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RefShape<'a> {
    /// The referenced object is written inline.
    Embedded(NodeView<'a>),
    /// The referenced object lives in its own file.
    ExternalPath(&'a ContentPath),
    /// The referenced object appears elsewhere in the same document.
    InternalIdentifier(Identity),
}

/// Borrowed view over an object node or an untagged map.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeView<'a> {
    pub type_tag: Option<&'a TypeTag>,
    pub identity: Option<Identity>,
    pub fields: &'a [(String, Value)],
}

impl<'a> NodeView<'a> {
    pub fn field(&self, name: &str) -> Option<&'a Value> {
        lookup(self.fields, name)
    }
}

fn lookup<'a>(fields: &'a [(String, Value)], name: &str) -> Option<&'a Value> {
    fields.iter().find(|(key, _)| key == name).map(|(_, v)| v)
}

impl Value {
    /// Short name of the node kind, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::I64(_) | Value::U64(_) => "integer",
            Value::F32(_) | Value::F64(_) => "float",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Node(_) => "object",
            Value::Link(_) => "reference",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// View this value as an object node. Plain maps are untagged nodes.
    pub fn as_node(&self) -> Option<NodeView<'_>> {
        match self {
            Value::Node(node) => Some(NodeView {
                type_tag: node.type_tag.as_ref(),
                identity: node.identity,
                fields: &node.fields,
            }),
            Value::Map(fields) => Some(NodeView {
                type_tag: None,
                identity: None,
                fields,
            }),
            _ => None,
        }
    }

    /// Classify this value as a reference encoding.
    ///
    /// Returns `None` for null and for leaves that cannot encode a reference.
    pub fn as_reference(&self) -> Option<RefShape<'_>> {
        match self {
            Value::Link(Link::File(path)) => Some(RefShape::ExternalPath(path)),
            Value::Link(Link::Guid(id)) => Some(RefShape::InternalIdentifier(*id)),
            other => other.as_node().map(RefShape::Embedded),
        }
    }

    /// Visit this value and every value nested below it, depth-first.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Value)) {
        visit(self);
        match self {
            Value::List(items) => items.iter().for_each(|item| item.walk(visit)),
            Value::Map(fields) => fields.iter().for_each(|(_, v)| v.walk(visit)),
            Value::Node(node) => node.fields.iter().for_each(|(_, v)| v.walk(visit)),
            _ => {}
        }
    }

    /// Lower object nodes and links back to plain maps.
    fn into_plain(self) -> Value {
        match self {
            Value::Node(node) => {
                let ObjectNode {
                    type_tag,
                    identity,
                    fields,
                } = *node;
                let mut entries = Vec::with_capacity(fields.len() + 2);
                if let Some(tag) = type_tag {
                    let tag = match tag {
                        TypeTag::Name(name) => Value::String(name),
                        TypeTag::Id(id) => Value::U64(id as u64),
                    };
                    entries.push((TYPE_KEY.to_owned(), tag));
                }
                if let Some(id) = identity {
                    entries.push((ID_KEY.to_owned(), Value::String(id.to_string())));
                }
                entries.extend(fields);
                Value::Map(entries)
            }
            Value::Link(Link::File(path)) => Value::Map(vec![(
                REFERENCE_FILE_KEY.to_owned(),
                Value::String(path.to_string()),
            )]),
            Value::Link(Link::Guid(id)) => Value::Map(vec![(
                REFERENCE_GUID_KEY.to_owned(),
                Value::String(id.to_string()),
            )]),
            other => other,
        }
    }

    /// Classify a decoded map.
    ///
    /// Malformed link payloads leave the map untouched. A malformed `$type`
    /// or `$id` entry stays among the node's fields while the valid header
    /// parts are kept, so the reader can report it in context.
    fn from_entries(entries: Vec<(String, Value)>) -> Value {
        if let [(key, Value::String(text))] = entries.as_slice() {
            if key == REFERENCE_FILE_KEY
                && let Ok(path) = ContentPath::new(text)
            {
                return Value::Link(Link::File(path));
            }
            if key == REFERENCE_GUID_KEY
                && let Some(id) = Identity::parse(text)
            {
                return Value::Link(Link::Guid(id));
            }
        }

        let mut type_tag = None;
        let mut identity = None;
        let mut fields = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            if key == TYPE_KEY {
                let tag = match &value {
                    Value::String(name) => Some(TypeTag::Name(name.clone())),
                    Value::U64(id) => u32::try_from(*id).ok().map(TypeTag::Id),
                    Value::I64(id) => u32::try_from(*id).ok().map(TypeTag::Id),
                    _ => None,
                };
                if tag.is_some() {
                    type_tag = tag;
                    continue;
                }
            } else if key == ID_KEY {
                let id = match &value {
                    Value::String(text) => Identity::parse(text),
                    _ => None,
                };
                if id.is_some() {
                    identity = id;
                    continue;
                }
            }
            fields.push((key, value));
        }

        ObjectNode {
            type_tag,
            identity,
            fields,
        }
        .into_value()
    }
}

// ---------------------------------------------------------------------------
// Document encoding: Value <-> serde data model
// ---------------------------------------------------------------------------

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::I64(v) => serializer.serialize_i64(*v),
            Value::U64(v) => serializer.serialize_u64(*v),
            Value::F32(v) => serializer.serialize_f32(*v),
            Value::F64(v) => serializer.serialize_f64(*v),
            Value::String(v) => serializer.serialize_str(v),
            Value::Bytes(v) => serializer.serialize_bytes(v),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Value::Node(node) => node.serialize(serializer),
            Value::Link(link) => link.serialize(serializer),
        }
    }
}

impl Serialize for ObjectNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = self.fields.len()
            + usize::from(self.type_tag.is_some())
            + usize::from(self.identity.is_some());
        let mut map = serializer.serialize_map(Some(len))?;
        match &self.type_tag {
            Some(TypeTag::Name(name)) => map.serialize_entry(TYPE_KEY, name)?,
            Some(TypeTag::Id(id)) => map.serialize_entry(TYPE_KEY, id)?,
            None => {}
        }
        if let Some(id) = &self.identity {
            map.serialize_entry(ID_KEY, id)?;
        }
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl Serialize for Link {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            Link::File(path) => map.serialize_entry(REFERENCE_FILE_KEY, path)?,
            Link::Guid(id) => map.serialize_entry(REFERENCE_GUID_KEY, id)?,
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DocumentVisitor)
    }
}

struct DocumentVisitor;

impl<'de> Visitor<'de> for DocumentVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a document value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
        Ok(Value::Bool(v))
    }
    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
        Ok(Value::I64(v))
    }
    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
        Ok(Value::U64(v))
    }
    fn visit_f32<E: de::Error>(self, v: f32) -> Result<Value, E> {
        Ok(Value::F32(v))
    }
    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
        Ok(Value::F64(v))
    }
    fn visit_char<E: de::Error>(self, v: char) -> Result<Value, E> {
        Ok(Value::String(v.to_string()))
    }
    fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
        Ok(Value::String(v.to_owned()))
    }
    fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
        Ok(Value::String(v))
    }
    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Value, E> {
        Ok(Value::Bytes(v.to_vec()))
    }
    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Value, E> {
        Ok(Value::Bytes(v))
    }
    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }
    fn visit_none<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }
    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
        Value::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Value::List(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Value, A::Error> {
        let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((key, value)) = map.next_entry::<String, Value>()? {
            entries.push((key, value));
        }
        Ok(Value::from_entries(entries))
    }
}

// ---------------------------------------------------------------------------
// to_value: T -> Value
// ---------------------------------------------------------------------------

/// Convert any `T: Serialize` into a primitive [`Value`].
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value, FieldError> {
    value
        .serialize(ValueSerializer)
        .map_err(|e| FieldError::Value(e.0))
}

/// Convert a [`Value`] back into any `T: DeserializeOwned`.
pub fn from_value<T: de::DeserializeOwned>(value: Value) -> Result<T, FieldError> {
    T::deserialize(ValueDeserializer(value)).map_err(|e| FieldError::Value(e.0))
}

#[derive(Debug)]
struct ValueError(String);

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ValueError {}

impl serde::ser::Error for ValueError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        ValueError(msg.to_string())
    }
}

impl de::Error for ValueError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        ValueError(msg.to_string())
    }
}

struct ValueSerializer;

macro_rules! serialize_as {
    ($($method:ident($ty:ty) => $variant:ident as $target:ty;)*) => {
        $(
            fn $method(self, v: $ty) -> Result<Value, ValueError> {
                Ok(Value::$variant(v as $target))
            }
        )*
    };
}

impl Serializer for ValueSerializer {
    type Ok = Value;
    type Error = ValueError;
    type SerializeSeq = SeqBuilder;
    type SerializeTuple = SeqBuilder;
    type SerializeTupleStruct = SeqBuilder;
    type SerializeTupleVariant = VariantBuilder<SeqBuilder>;
    type SerializeMap = MapBuilder;
    type SerializeStruct = MapBuilder;
    type SerializeStructVariant = VariantBuilder<MapBuilder>;

    serialize_as! {
        serialize_i8(i8) => I64 as i64;
        serialize_i16(i16) => I64 as i64;
        serialize_i32(i32) => I64 as i64;
        serialize_i64(i64) => I64 as i64;
        serialize_u8(u8) => U64 as u64;
        serialize_u16(u16) => U64 as u64;
        serialize_u32(u32) => U64 as u64;
        serialize_u64(u64) => U64 as u64;
        serialize_f32(f32) => F32 as f32;
        serialize_f64(f64) => F64 as f64;
    }

    fn serialize_bool(self, v: bool) -> Result<Value, ValueError> {
        Ok(Value::Bool(v))
    }
    fn serialize_char(self, v: char) -> Result<Value, ValueError> {
        Ok(Value::String(v.to_string()))
    }
    fn serialize_str(self, v: &str) -> Result<Value, ValueError> {
        Ok(Value::String(v.to_owned()))
    }
    fn serialize_bytes(self, v: &[u8]) -> Result<Value, ValueError> {
        Ok(Value::Bytes(v.to_vec()))
    }
    fn serialize_none(self) -> Result<Value, ValueError> {
        Ok(Value::Null)
    }
    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<Value, ValueError> {
        value.serialize(self)
    }
    fn serialize_unit(self) -> Result<Value, ValueError> {
        Ok(Value::Null)
    }
    fn serialize_unit_struct(self, _name: &'static str) -> Result<Value, ValueError> {
        Ok(Value::Null)
    }
    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<Value, ValueError> {
        Ok(Value::String(variant.to_owned()))
    }
    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Value, ValueError> {
        value.serialize(self)
    }
    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Value, ValueError> {
        Ok(Value::Map(vec![(
            variant.to_owned(),
            value.serialize(ValueSerializer)?,
        )]))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqBuilder, ValueError> {
        Ok(SeqBuilder(Vec::with_capacity(len.unwrap_or(0))))
    }
    fn serialize_tuple(self, len: usize) -> Result<SeqBuilder, ValueError> {
        self.serialize_seq(Some(len))
    }
    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<SeqBuilder, ValueError> {
        self.serialize_seq(Some(len))
    }
    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<VariantBuilder<SeqBuilder>, ValueError> {
        Ok(VariantBuilder {
            variant,
            inner: SeqBuilder(Vec::with_capacity(len)),
        })
    }
    fn serialize_map(self, len: Option<usize>) -> Result<MapBuilder, ValueError> {
        Ok(MapBuilder {
            entries: Vec::with_capacity(len.unwrap_or(0)),
            key: None,
        })
    }
    fn serialize_struct(self, _name: &'static str, len: usize) -> Result<MapBuilder, ValueError> {
        self.serialize_map(Some(len))
    }
    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<VariantBuilder<MapBuilder>, ValueError> {
        Ok(VariantBuilder {
            variant,
            inner: MapBuilder {
                entries: Vec::with_capacity(len),
                key: None,
            },
        })
    }
}

struct SeqBuilder(Vec<Value>);

impl SeqBuilder {
    fn push<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), ValueError> {
        self.0.push(value.serialize(ValueSerializer)?);
        Ok(())
    }
}

impl serde::ser::SerializeSeq for SeqBuilder {
    type Ok = Value;
    type Error = ValueError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), ValueError> {
        self.push(value)
    }
    fn end(self) -> Result<Value, ValueError> {
        Ok(Value::List(self.0))
    }
}

impl serde::ser::SerializeTuple for SeqBuilder {
    type Ok = Value;
    type Error = ValueError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), ValueError> {
        self.push(value)
    }
    fn end(self) -> Result<Value, ValueError> {
        Ok(Value::List(self.0))
    }
}

impl serde::ser::SerializeTupleStruct for SeqBuilder {
    type Ok = Value;
    type Error = ValueError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), ValueError> {
        self.push(value)
    }
    fn end(self) -> Result<Value, ValueError> {
        Ok(Value::List(self.0))
    }
}

struct MapBuilder {
    entries: Vec<(String, Value)>,
    key: Option<String>,
}

impl serde::ser::SerializeMap for MapBuilder {
    type Ok = Value;
    type Error = ValueError;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<(), ValueError> {
        let key = match key.serialize(ValueSerializer)? {
            Value::String(s) => s,
            Value::I64(v) => v.to_string(),
            Value::U64(v) => v.to_string(),
            Value::Bool(v) => v.to_string(),
            other => {
                return Err(ValueError(format!(
                    "map key must be a string or integer, found {}",
                    other.kind_name()
                )));
            }
        };
        self.key = Some(key);
        Ok(())
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), ValueError> {
        let key = self
            .key
            .take()
            .ok_or_else(|| ValueError("map value serialized before its key".into()))?;
        self.entries.push((key, value.serialize(ValueSerializer)?));
        Ok(())
    }

    fn end(self) -> Result<Value, ValueError> {
        Ok(Value::Map(self.entries))
    }
}

impl serde::ser::SerializeStruct for MapBuilder {
    type Ok = Value;
    type Error = ValueError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), ValueError> {
        self.entries
            .push((key.to_owned(), value.serialize(ValueSerializer)?));
        Ok(())
    }

    fn end(self) -> Result<Value, ValueError> {
        Ok(Value::Map(self.entries))
    }
}

/// Wraps a tuple or struct variant body as `{variant: body}`.
struct VariantBuilder<B> {
    variant: &'static str,
    inner: B,
}

impl serde::ser::SerializeTupleVariant for VariantBuilder<SeqBuilder> {
    type Ok = Value;
    type Error = ValueError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), ValueError> {
        self.inner.push(value)
    }
    fn end(self) -> Result<Value, ValueError> {
        Ok(Value::Map(vec![(
            self.variant.to_owned(),
            Value::List(self.inner.0),
        )]))
    }
}

impl serde::ser::SerializeStructVariant for VariantBuilder<MapBuilder> {
    type Ok = Value;
    type Error = ValueError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), ValueError> {
        serde::ser::SerializeStruct::serialize_field(&mut self.inner, key, value)
    }
    fn end(self) -> Result<Value, ValueError> {
        Ok(Value::Map(vec![(
            self.variant.to_owned(),
            Value::Map(self.inner.entries),
        )]))
    }
}

// ---------------------------------------------------------------------------
// from_value: Value -> T
// ---------------------------------------------------------------------------

struct ValueDeserializer(Value);

impl<'de> Deserializer<'de> for ValueDeserializer {
    type Error = ValueError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ValueError> {
        match self.0.into_plain() {
            Value::Null => visitor.visit_unit(),
            Value::Bool(v) => visitor.visit_bool(v),
            Value::I64(v) => visitor.visit_i64(v),
            Value::U64(v) => visitor.visit_u64(v),
            Value::F32(v) => visitor.visit_f32(v),
            Value::F64(v) => visitor.visit_f64(v),
            Value::String(v) => visitor.visit_string(v),
            Value::Bytes(v) => visitor.visit_byte_buf(v),
            Value::List(v) => visitor.visit_seq(ListAccess(v.into_iter())),
            Value::Map(v) => visitor.visit_map(EntryAccess {
                iter: v.into_iter(),
                value: None,
            }),
            Value::Node(_) | Value::Link(_) => Err(ValueError("unexpected object node".into())),
        }
    }

    fn deserialize_i64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ValueError> {
        match self.0 {
            Value::U64(v) => match i64::try_from(v) {
                Ok(v) => visitor.visit_i64(v),
                Err(_) => visitor.visit_u64(v),
            },
            other => ValueDeserializer(other).deserialize_any(visitor),
        }
    }

    fn deserialize_f32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ValueError> {
        match self.0 {
            Value::F64(v) => visitor.visit_f32(v as f32),
            Value::I64(v) => visitor.visit_f32(v as f32),
            Value::U64(v) => visitor.visit_f32(v as f32),
            other => ValueDeserializer(other).deserialize_any(visitor),
        }
    }

    fn deserialize_f64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ValueError> {
        match self.0 {
            Value::F32(v) => visitor.visit_f64(v as f64),
            Value::I64(v) => visitor.visit_f64(v as f64),
            Value::U64(v) => visitor.visit_f64(v as f64),
            other => ValueDeserializer(other).deserialize_any(visitor),
        }
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ValueError> {
        self.deserialize_byte_buf(visitor)
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ValueError> {
        match self.0 {
            Value::List(items) => {
                let bytes = items
                    .into_iter()
                    .map(|item| match item {
                        Value::U64(b) => u8::try_from(b).ok(),
                        _ => None,
                    })
                    .collect::<Option<Vec<u8>>>()
                    .ok_or_else(|| ValueError("expected list of bytes".into()))?;
                visitor.visit_byte_buf(bytes)
            }
            other => ValueDeserializer(other).deserialize_any(visitor),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ValueError> {
        match self.0 {
            Value::Null => visitor.visit_none(),
            other => visitor.visit_some(ValueDeserializer(other)),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, ValueError> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, ValueError> {
        match self.0.into_plain() {
            Value::String(variant) => visitor.visit_enum(EnumBody {
                variant,
                body: None,
            }),
            Value::Map(entries) => {
                let mut iter = entries.into_iter();
                match (iter.next(), iter.next()) {
                    (Some((variant, body)), None) => visitor.visit_enum(EnumBody {
                        variant,
                        body: Some(body),
                    }),
                    _ => Err(ValueError("enum map must have exactly one entry".into())),
                }
            }
            other => Err(ValueError(format!(
                "expected string or map for enum, found {}",
                other.kind_name()
            ))),
        }
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ValueError> {
        visitor.visit_unit()
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 u8 u16 u32 u64 char str string
        unit unit_struct seq tuple tuple_struct map struct identifier
    }
}

struct ListAccess(std::vec::IntoIter<Value>);

impl<'de> SeqAccess<'de> for ListAccess {
    type Error = ValueError;

    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>, ValueError> {
        self.0
            .next()
            .map(|v| seed.deserialize(ValueDeserializer(v)))
            .transpose()
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.0.len())
    }
}

struct EntryAccess {
    iter: std::vec::IntoIter<(String, Value)>,
    value: Option<Value>,
}

impl<'de> MapAccess<'de> for EntryAccess {
    type Error = ValueError;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, ValueError> {
        match self.iter.next() {
            Some((key, value)) => {
                self.value = Some(value);
                seed.deserialize(ValueDeserializer(Value::String(key)))
                    .map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(
        &mut self,
        seed: V,
    ) -> Result<V::Value, ValueError> {
        let value = self
            .value
            .take()
            .ok_or_else(|| ValueError("map value requested before its key".into()))?;
        seed.deserialize(ValueDeserializer(value))
    }
}

struct EnumBody {
    variant: String,
    body: Option<Value>,
}

impl<'de> de::EnumAccess<'de> for EnumBody {
    type Error = ValueError;
    type Variant = VariantBody;

    fn variant_seed<V: DeserializeSeed<'de>>(
        self,
        seed: V,
    ) -> Result<(V::Value, VariantBody), ValueError> {
        let tag = seed.deserialize(ValueDeserializer(Value::String(self.variant)))?;
        Ok((tag, VariantBody(self.body)))
    }
}

struct VariantBody(Option<Value>);

impl<'de> de::VariantAccess<'de> for VariantBody {
    type Error = ValueError;

    fn unit_variant(self) -> Result<(), ValueError> {
        Ok(())
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(
        self,
        seed: T,
    ) -> Result<T::Value, ValueError> {
        match self.0 {
            Some(body) => seed.deserialize(ValueDeserializer(body)),
            None => Err(ValueError("expected newtype variant".into())),
        }
    }

    fn tuple_variant<V: Visitor<'de>>(
        self,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, ValueError> {
        match self.0 {
            Some(body) => ValueDeserializer(body).deserialize_any(visitor),
            None => Err(ValueError("expected tuple variant".into())),
        }
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, ValueError> {
        match self.0 {
            Some(body) => ValueDeserializer(body).deserialize_any(visitor),
            None => Err(ValueError("expected struct variant".into())),
        }
    }
}
