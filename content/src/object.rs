//! Serializable objects and shared object handles.
//!
//! [`Serializable`] is the object-safe view the writer and reader use to walk
//! any content type. [`SerializableType`] adds the static descriptor table
//! produced by `#[derive(Serializable)]`.
//!
//! Objects that can be referenced from more than one place live behind an
//! [`ObjectRef`]. The handle carries the object's [`Identity`] (generated
//! lazily), its optional [`ContentPath`] and the read-only flag set by the
//! loader for shared assets.

use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use crate::error::FieldError;
use crate::field::{FieldRef, FieldValue};
use crate::identity::{ContentPath, Identity};
use crate::schema::FieldDecl;

/// Upcast helpers for downcasting trait objects.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Object-safe access to a content object's fields.
///
/// Implemented by `#[derive(Serializable)]`. Field names passed to these
/// methods are in-memory names, not serialized names.
pub trait Serializable: AsAny + Send + Sync {
    /// Long-form type tag.
    fn type_tag(&self) -> &'static str;

    /// Read view of one field.
    fn field(&self, name: &str) -> Result<FieldRef<'_>, FieldError>;

    /// Replace one field's value.
    fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), FieldError>;

    /// Owned embedded object stored in `name`, following sequence `indices`.
    fn embedded_mut(
        &mut self,
        name: &str,
        indices: &[usize],
    ) -> Option<&mut (dyn Serializable + 'static)>;

    /// Shared objects this object is composed of.
    ///
    /// Used to narrow a reference whose target has the wrong type to a
    /// compatible sub-part.
    fn parts(&self) -> Vec<ObjectRef> {
        Vec::new()
    }
}

impl fmt::Debug for dyn Serializable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Serializable")
            .field("type", &self.type_tag())
            .finish_non_exhaustive()
    }
}

impl dyn Serializable {
    pub fn is<T: Any>(&self) -> bool {
        self.as_any().is::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_any().downcast_ref()
    }

    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut()
    }
}

/// Static descriptor table of a content type.
pub trait SerializableType: Serializable + Default + Sized {
    /// Long-form, stable type tag.
    const TYPE_TAG: &'static str;
    /// Optional short numeric id.
    const SHORT_ID: Option<u32> = None;
    /// Legacy long-form names that also resolve to this type.
    const ALIASES: &'static [&'static str] = &[];
    /// Always write a type tag for nodes of this type.
    const ALWAYS_EMIT_TYPE_TAG: bool = false;

    /// Serializable fields in declaration order.
    fn field_decls() -> Vec<FieldDecl>;
}

// ---------------------------------------------------------------------------
// ObjectRef
// ---------------------------------------------------------------------------

struct ObjectCell {
    identity: OnceLock<Identity>,
    content_path: OnceLock<ContentPath>,
    read_only: AtomicBool,
    type_id: TypeId,
    type_tag: &'static str,
    data: RwLock<Box<dyn Serializable>>,
}

/// Shared handle to a content object.
///
/// Clones refer to the same object. Equality is pointer identity.
#[derive(Clone)]
pub struct ObjectRef(Arc<ObjectCell>);

impl ObjectRef {
    pub fn new<T: Serializable>(value: T) -> Self {
        Self::from_boxed(Box::new(value))
    }

    pub fn from_boxed(value: Box<dyn Serializable>) -> Self {
        let type_id = (*value).as_any().type_id();
        let type_tag = value.type_tag();
        Self(Arc::new(ObjectCell {
            identity: OnceLock::new(),
            content_path: OnceLock::new(),
            read_only: AtomicBool::new(false),
            type_id,
            type_tag,
            data: RwLock::new(value),
        }))
    }

    /// The object's identity, generated on first access.
    pub fn identity(&self) -> Identity {
        *self.0.identity.get_or_init(Identity::new)
    }

    /// The identity if one has been observed or assigned.
    pub fn peek_identity(&self) -> Option<Identity> {
        self.0.identity.get().copied()
    }

    /// Assign the identity. Fails if one is already set.
    pub fn assign_identity(&self, identity: Identity) -> Result<(), Identity> {
        self.0.identity.set(identity)
    }

    pub fn content_path(&self) -> Option<&ContentPath> {
        self.0.content_path.get()
    }

    pub fn has_content_path(&self) -> bool {
        self.0.content_path.get().is_some()
    }

    /// Record where this object is persisted. Fails if a path is already set.
    pub fn set_content_path(&self, path: ContentPath) -> Result<(), ContentPath> {
        self.0.content_path.set(path)
    }

    pub fn is_read_only(&self) -> bool {
        self.0.read_only.load(Ordering::Acquire)
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.0.read_only.store(read_only, Ordering::Release);
    }

    pub fn type_id(&self) -> TypeId {
        self.0.type_id
    }

    pub fn type_tag(&self) -> &'static str {
        self.0.type_tag
    }

    pub fn is<T: Any>(&self) -> bool {
        self.0.type_id == TypeId::of::<T>()
    }

    pub fn read(&self) -> MappedRwLockReadGuard<'_, dyn Serializable> {
        RwLockReadGuard::map(self.0.data.read(), |data| &**data)
    }

    pub fn write(&self) -> MappedRwLockWriteGuard<'_, dyn Serializable> {
        RwLockWriteGuard::map(self.0.data.write(), |data| &mut **data)
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Typed handle if the object is a `T`.
    pub fn downcast<T: SerializableType>(self) -> Result<Ref<T>, ObjectRef> {
        if self.is::<T>() {
            Ok(Ref {
                object: self,
                _marker: PhantomData,
            })
        } else {
            Err(self)
        }
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ObjectRef {}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRef")
            .field("type", &self.0.type_tag)
            .field("identity", &self.peek_identity())
            .field("content_path", &self.content_path())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Ref<T>
// ---------------------------------------------------------------------------

/// Typed shared handle. Always wraps an object of type `T`.
pub struct Ref<T> {
    object: ObjectRef,
    _marker: PhantomData<fn() -> T>,
}

impl<T: SerializableType> Ref<T> {
    pub fn new(value: T) -> Self {
        Self {
            object: ObjectRef::new(value),
            _marker: PhantomData,
        }
    }

    pub fn object(&self) -> &ObjectRef {
        &self.object
    }

    pub fn into_object(self) -> ObjectRef {
        self.object
    }

    pub fn identity(&self) -> Identity {
        self.object.identity()
    }

    pub fn read(&self) -> MappedRwLockReadGuard<'_, T> {
        MappedRwLockReadGuard::map(self.object.read(), |data| {
            match data.downcast_ref::<T>() {
                Some(value) => value,
                None => unreachable!("Ref<{}> wraps a different type", T::TYPE_TAG),
            }
        })
    }

    pub fn write(&self) -> MappedRwLockWriteGuard<'_, T> {
        MappedRwLockWriteGuard::map(self.object.write(), |data| {
            match data.downcast_mut::<T>() {
                Some(value) => value,
                None => unreachable!("Ref<{}> wraps a different type", T::TYPE_TAG),
            }
        })
    }
}

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Self {
            object: self.object.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> PartialEq for Ref<T> {
    fn eq(&self, other: &Self) -> bool {
        self.object.ptr_eq(&other.object)
    }
}

impl<T> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.object, f)
    }
}

impl<T> From<Ref<T>> for ObjectRef {
    fn from(value: Ref<T>) -> Self {
        value.object
    }
}

impl<T> AsRef<ObjectRef> for Ref<T> {
    fn as_ref(&self) -> &ObjectRef {
        &self.object
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Serializable;

    #[derive(Default, Serializable)]
    #[serialize(tag = "test.Counter")]
    struct Counter {
        value: i32,
    }

    #[derive(Default, Serializable)]
    #[serialize(tag = "test.Other")]
    struct Other {}

    #[test]
    fn identity_is_lazy_and_stable() {
        let object = ObjectRef::new(Counter::default());
        assert_eq!(object.peek_identity(), None);
        let id = object.identity();
        assert_eq!(object.identity(), id);
        assert_eq!(object.clone().peek_identity(), Some(id));
        assert!(object.assign_identity(Identity::new()).is_err());
    }

    #[test]
    fn assigned_identity_wins() {
        let object = ObjectRef::new(Counter::default());
        let id = Identity::new();
        object.assign_identity(id).unwrap();
        assert_eq!(object.identity(), id);
    }

    #[test]
    fn content_path_is_set_once() {
        let object = ObjectRef::new(Counter::default());
        let first = ContentPath::new("a.json").unwrap();
        object.set_content_path(first.clone()).unwrap();
        let rejected = object
            .set_content_path(ContentPath::new("b.json").unwrap())
            .unwrap_err();
        assert_eq!(rejected.as_str(), "b.json");
        assert_eq!(object.content_path(), Some(&first));
    }

    #[test]
    fn typed_handles() {
        let counter = Ref::new(Counter { value: 3 });
        counter.write().value += 1;
        assert_eq!(counter.read().value, 4);

        let object = counter.clone().into_object();
        assert_eq!(object.type_tag(), "test.Counter");
        assert!(object.is::<Counter>());
        assert_eq!(object.clone().downcast::<Counter>().unwrap(), counter);
        assert!(object.downcast::<Other>().is_err());
    }

    #[test]
    fn equality_is_pointer_identity() {
        let a = ObjectRef::new(Counter::default());
        let b = ObjectRef::new(Counter::default());
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }
}
