//! Per-field conversion between Rust values and document values.
//!
//! Every field type of a `#[derive(Serializable)]` struct implements [`Field`].
//! The impl decides the field's [`FieldShape`] at compile time and converts
//! the value to a borrowed [`FieldRef`] for writing or from an owned
//! [`FieldValue`] produced by the reader.
//!
//! | Rust type | Shape |
//! |---|---|
//! | scalars, `String`, `Option<scalar>` | primitive |
//! | `Vec<T>` | sequence of `T`'s shape |
//! | `Option<ObjectRef>` | reference to any type |
//! | `Option<Ref<T>>` | reference to `T` |
//! | `Box<dyn Serializable>` and its `Option` | embedded, any type |
//! | derived struct `T` and `Option<T>` | embedded `T` |
//!
//! Other serde types opt in with `#[serialize(value)]` and are stored as
//! primitives through [`value_to_field`] / [`value_from_field`].

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::FieldError;
use crate::object::{ObjectRef, Ref, Serializable, SerializableType};
use crate::schema::{DeclaredType, FieldShape};
use crate::value::{Value, from_value, to_value};

/// Borrowed view of a field for writing.
pub enum FieldRef<'a> {
    Primitive(Value),
    Embedded(Option<&'a (dyn Serializable + 'static)>),
    Reference(Option<&'a ObjectRef>),
    Sequence(Vec<FieldRef<'a>>),
}

/// Owned field value produced by reading.
pub enum FieldValue {
    Primitive(Value),
    Embedded(Option<Box<dyn Serializable>>),
    Reference(Option<ObjectRef>),
    Sequence(Vec<FieldValue>),
}

impl FieldValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldValue::Primitive(_) => "primitive",
            FieldValue::Embedded(_) => "embedded object",
            FieldValue::Reference(_) => "reference",
            FieldValue::Sequence(_) => "sequence",
        }
    }

    fn mismatch(self, expected: &'static str) -> FieldError {
        FieldError::ShapeMismatch {
            expected,
            found: self.kind_name(),
        }
    }
}

/// Conversion of one field type.
pub trait Field: Sized {
    fn shape() -> FieldShape;

    fn to_field(&self) -> Result<FieldRef<'_>, FieldError>;

    fn from_field(value: FieldValue) -> Result<Self, FieldError>;

    /// Owned embedded object inside this field, following sequence `indices`.
    fn embedded_mut(&mut self, _indices: &[usize]) -> Option<&mut (dyn Serializable + 'static)> {
        None
    }

    /// Push every shared object referenced by this field.
    fn collect_refs(&self, _out: &mut Vec<ObjectRef>) {}
}

// ---------------------------------------------------------------------------
// Primitives
// ---------------------------------------------------------------------------

macro_rules! primitive_field {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Field for $ty {
                fn shape() -> FieldShape {
                    FieldShape::Primitive
                }
                fn to_field(&self) -> Result<FieldRef<'_>, FieldError> {
                    value_to_field(self)
                }
                fn from_field(value: FieldValue) -> Result<Self, FieldError> {
                    value_from_field(value)
                }
            }

            impl Field for Option<$ty> {
                fn shape() -> FieldShape {
                    FieldShape::Primitive
                }
                fn to_field(&self) -> Result<FieldRef<'_>, FieldError> {
                    value_to_field(self)
                }
                fn from_field(value: FieldValue) -> Result<Self, FieldError> {
                    value_from_field(value)
                }
            }
        )*
    };
}

primitive_field!(
    bool, i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, char, String
);

/// Primitive view of any serde value. Used for `#[serialize(value)]` fields.
pub fn value_to_field<T: Serialize + ?Sized>(value: &T) -> Result<FieldRef<'static>, FieldError> {
    to_value(value).map(FieldRef::Primitive)
}

/// Rebuild a serde value from a primitive field value.
pub fn value_from_field<T: DeserializeOwned>(value: FieldValue) -> Result<T, FieldError> {
    match value {
        FieldValue::Primitive(v) => from_value(v),
        other => Err(other.mismatch("primitive")),
    }
}

// ---------------------------------------------------------------------------
// Sequences
// ---------------------------------------------------------------------------

impl<T: Field> Field for Vec<T> {
    fn shape() -> FieldShape {
        FieldShape::Sequence(Box::new(T::shape()))
    }

    fn to_field(&self) -> Result<FieldRef<'_>, FieldError> {
        self.iter()
            .map(Field::to_field)
            .collect::<Result<Vec<_>, _>>()
            .map(FieldRef::Sequence)
    }

    fn from_field(value: FieldValue) -> Result<Self, FieldError> {
        match value {
            FieldValue::Sequence(items) => items.into_iter().map(T::from_field).collect(),
            other => Err(other.mismatch("sequence")),
        }
    }

    fn embedded_mut(&mut self, indices: &[usize]) -> Option<&mut (dyn Serializable + 'static)> {
        let (index, rest) = indices.split_first()?;
        self.get_mut(*index)?.embedded_mut(rest)
    }

    fn collect_refs(&self, out: &mut Vec<ObjectRef>) {
        for item in self {
            item.collect_refs(out);
        }
    }
}

// ---------------------------------------------------------------------------
// References
// ---------------------------------------------------------------------------

impl Field for Option<ObjectRef> {
    fn shape() -> FieldShape {
        FieldShape::Reference(DeclaredType::Any)
    }

    fn to_field(&self) -> Result<FieldRef<'_>, FieldError> {
        Ok(FieldRef::Reference(self.as_ref()))
    }

    fn from_field(value: FieldValue) -> Result<Self, FieldError> {
        match value {
            FieldValue::Reference(object) => Ok(object),
            other => Err(other.mismatch("reference")),
        }
    }

    fn collect_refs(&self, out: &mut Vec<ObjectRef>) {
        out.extend(self.iter().cloned());
    }
}

impl<T: SerializableType> Field for Option<Ref<T>> {
    fn shape() -> FieldShape {
        FieldShape::Reference(DeclaredType::of::<T>())
    }

    fn to_field(&self) -> Result<FieldRef<'_>, FieldError> {
        Ok(FieldRef::Reference(self.as_ref().map(Ref::object)))
    }

    fn from_field(value: FieldValue) -> Result<Self, FieldError> {
        match value {
            FieldValue::Reference(None) => Ok(None),
            FieldValue::Reference(Some(object)) => object
                .downcast::<T>()
                .map(Some)
                .map_err(|object| FieldError::TypeMismatch {
                    expected: T::TYPE_TAG,
                    found: object.type_tag(),
                }),
            other => Err(other.mismatch("reference")),
        }
    }

    fn collect_refs(&self, out: &mut Vec<ObjectRef>) {
        out.extend(self.iter().map(|r| r.object().clone()));
    }
}

// ---------------------------------------------------------------------------
// Embedded objects
// ---------------------------------------------------------------------------

impl Field for Box<dyn Serializable> {
    fn shape() -> FieldShape {
        FieldShape::Embedded(DeclaredType::Any)
    }

    fn to_field(&self) -> Result<FieldRef<'_>, FieldError> {
        Ok(FieldRef::Embedded(Some(&**self)))
    }

    fn from_field(value: FieldValue) -> Result<Self, FieldError> {
        match value {
            FieldValue::Embedded(Some(object)) => Ok(object),
            FieldValue::Embedded(None) => Err(FieldError::ShapeMismatch {
                expected: "embedded object",
                found: "null",
            }),
            other => Err(other.mismatch("embedded object")),
        }
    }

    fn embedded_mut(&mut self, indices: &[usize]) -> Option<&mut (dyn Serializable + 'static)> {
        if indices.is_empty() {
            Some(&mut **self)
        } else {
            None
        }
    }

    fn collect_refs(&self, out: &mut Vec<ObjectRef>) {
        out.extend((**self).parts());
    }
}

impl Field for Option<Box<dyn Serializable>> {
    fn shape() -> FieldShape {
        FieldShape::Embedded(DeclaredType::Any)
    }

    fn to_field(&self) -> Result<FieldRef<'_>, FieldError> {
        Ok(FieldRef::Embedded(self.as_deref()))
    }

    fn from_field(value: FieldValue) -> Result<Self, FieldError> {
        match value {
            FieldValue::Embedded(object) => Ok(object),
            other => Err(other.mismatch("embedded object")),
        }
    }

    fn embedded_mut(&mut self, indices: &[usize]) -> Option<&mut (dyn Serializable + 'static)> {
        match self {
            Some(object) if indices.is_empty() => Some(&mut **object),
            _ => None,
        }
    }

    fn collect_refs(&self, out: &mut Vec<ObjectRef>) {
        if let Some(object) = self {
            out.extend((**object).parts());
        }
    }
}

impl<T: SerializableType> Field for Option<T> {
    fn shape() -> FieldShape {
        FieldShape::Embedded(DeclaredType::of::<T>())
    }

    fn to_field(&self) -> Result<FieldRef<'_>, FieldError> {
        Ok(FieldRef::Embedded(
            self.as_ref().map(|v| v as &(dyn Serializable + 'static)),
        ))
    }

    fn from_field(value: FieldValue) -> Result<Self, FieldError> {
        match value {
            FieldValue::Embedded(None) => Ok(None),
            other => embedded_from_field(other).map(Some),
        }
    }

    fn embedded_mut(&mut self, indices: &[usize]) -> Option<&mut (dyn Serializable + 'static)> {
        match self {
            Some(object) if indices.is_empty() => Some(object),
            _ => None,
        }
    }

    fn collect_refs(&self, out: &mut Vec<ObjectRef>) {
        if let Some(object) = self {
            out.extend(object.parts());
        }
    }
}

/// Rebuild a derived struct from an embedded field value.
///
/// A null embedded value yields `T::default()`.
pub fn embedded_from_field<T: SerializableType>(value: FieldValue) -> Result<T, FieldError> {
    match value {
        FieldValue::Embedded(None) => Ok(T::default()),
        FieldValue::Embedded(Some(object)) => {
            let found = object.type_tag();
            object
                .into_any()
                .downcast::<T>()
                .map(|boxed| *boxed)
                .map_err(|_| FieldError::TypeMismatch {
                    expected: T::TYPE_TAG,
                    found,
                })
        }
        other => Err(other.mismatch("embedded object")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn primitive(field: FieldRef<'_>) -> Value {
        match field {
            FieldRef::Primitive(v) => v,
            _ => panic!("expected primitive"),
        }
    }

    #[test]
    fn scalars_are_primitive() {
        assert_eq!(<f32 as Field>::shape(), FieldShape::Primitive);
        assert_eq!(<Option<String> as Field>::shape(), FieldShape::Primitive);
        assert_eq!(primitive(2.5f32.to_field().unwrap()), Value::F32(2.5));
        assert_eq!(primitive(7u8.to_field().unwrap()), Value::U64(7));
        assert_eq!(
            primitive(None::<String>.to_field().unwrap()),
            Value::Null
        );

        let back = <i16 as Field>::from_field(FieldValue::Primitive(Value::I64(-3))).unwrap();
        assert_eq!(back, -3);
    }

    #[test]
    fn sequences_nest_shapes() {
        assert_eq!(
            <Vec<Vec<u32>> as Field>::shape(),
            FieldShape::Sequence(Box::new(FieldShape::Sequence(Box::new(
                FieldShape::Primitive
            ))))
        );
        let items = vec![1u32, 2, 3];
        let FieldRef::Sequence(refs) = items.to_field().unwrap() else {
            panic!("expected sequence");
        };
        assert_eq!(refs.len(), 3);

        let back = <Vec<u32> as Field>::from_field(FieldValue::Sequence(vec![
            FieldValue::Primitive(Value::U64(4)),
            FieldValue::Primitive(Value::U64(5)),
        ]))
        .unwrap();
        assert_eq!(back, vec![4, 5]);
    }

    #[test]
    fn shape_mismatch_is_reported() {
        let err = <u32 as Field>::from_field(FieldValue::Reference(None)).unwrap_err();
        assert!(matches!(
            err,
            FieldError::ShapeMismatch {
                expected: "primitive",
                found: "reference"
            }
        ));
        let err = <Vec<u32> as Field>::from_field(FieldValue::Primitive(Value::Null)).unwrap_err();
        assert!(matches!(err, FieldError::ShapeMismatch { .. }));
    }

    #[test]
    fn untyped_references() {
        assert_eq!(
            <Option<ObjectRef> as Field>::shape(),
            FieldShape::Reference(DeclaredType::Any)
        );
        let none = <Option<ObjectRef> as Field>::from_field(FieldValue::Reference(None)).unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn value_fields_use_serde() {
        #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
        struct Vec3 {
            x: f32,
            y: f32,
            z: f32,
        }
        let v = Vec3 {
            x: 1.0,
            y: 2.0,
            z: 3.0,
        };
        let FieldRef::Primitive(value) = value_to_field(&v).unwrap() else {
            panic!("expected primitive");
        };
        let back: Vec3 = value_from_field(FieldValue::Primitive(value)).unwrap();
        assert_eq!(back, v);
    }
}
