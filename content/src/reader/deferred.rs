//! Field values whose references could not be resolved when they were read.
//!
//! A `ReferenceGuid` link may point at an object that appears later in the
//! document. The reader records the field as a [`DeferredBinding`] and
//! resolves it once every object has been constructed.

use crate::field::FieldValue;
use crate::identity::Identity;
use crate::schema::DeclaredType;

use super::table::SlotId;

/// One step from a shared object down to an owned embedded object.
#[derive(Clone, Debug)]
pub(crate) struct PathSegment {
    pub field: &'static str,
    /// Positions inside nested sequences.
    pub indices: Vec<usize>,
}

/// The object a deferred field belongs to: a shared object, or an owned
/// object reached from it through `path`.
#[derive(Clone, Debug)]
pub(crate) struct BindingTarget {
    pub slot: SlotId,
    pub path: Vec<PathSegment>,
}

impl BindingTarget {
    pub fn shared(slot: SlotId) -> Self {
        Self {
            slot,
            path: Vec::new(),
        }
    }

    pub fn child(&self, field: &'static str, indices: Vec<usize>) -> Self {
        let mut path = self.path.clone();
        path.push(PathSegment { field, indices });
        Self {
            slot: self.slot,
            path,
        }
    }
}

/// A field value that may still contain unresolved references.
pub(crate) enum Pending {
    Ready(FieldValue),
    Unresolved {
        identity: Identity,
        declared: DeclaredType,
    },
    Sequence(Vec<Pending>),
    /// Nothing to assign; the field keeps its default.
    Skip,
}

impl Pending {
    pub fn has_unresolved(&self) -> bool {
        match self {
            Pending::Unresolved { .. } => true,
            Pending::Sequence(items) => items.iter().any(Pending::has_unresolved),
            Pending::Ready(_) | Pending::Skip => false,
        }
    }

    /// Final value of a pending field without unresolved parts.
    pub fn into_ready(self) -> Option<FieldValue> {
        match self {
            Pending::Ready(value) => Some(value),
            Pending::Sequence(items) => items
                .into_iter()
                .map(Pending::into_ready)
                .collect::<Option<Vec<_>>>()
                .map(FieldValue::Sequence),
            Pending::Unresolved { .. } | Pending::Skip => None,
        }
    }
}

/// A field assignment postponed until the end of the read.
pub(crate) struct DeferredBinding {
    pub target: BindingTarget,
    pub field: &'static str,
    pub pending: Pending,
    /// Document path, for diagnostics.
    pub path: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectRef;
    use crate::reader::table::InstanceTable;
    use crate::value::Value;

    #[test]
    fn unresolved_is_found_in_sequences() {
        let pending = Pending::Sequence(vec![
            Pending::Ready(FieldValue::Reference(None)),
            Pending::Sequence(vec![Pending::Unresolved {
                identity: Identity::new(),
                declared: DeclaredType::Any,
            }]),
        ]);
        assert!(pending.has_unresolved());
        assert!(pending.into_ready().is_none());
    }

    #[test]
    fn ready_sequence_collapses() {
        let pending = Pending::Sequence(vec![
            Pending::Ready(FieldValue::Primitive(Value::U64(1))),
            Pending::Ready(FieldValue::Primitive(Value::U64(2))),
        ]);
        assert!(!pending.has_unresolved());
        let Some(FieldValue::Sequence(items)) = pending.into_ready() else {
            panic!("expected sequence");
        };
        assert_eq!(items.len(), 2);
    }

    #[derive(Default, crate::Serializable)]
    struct Dummy {
        value: u32,
    }

    #[test]
    fn child_target_extends_path() {
        let mut table = InstanceTable::default();
        let slot = table.insert(ObjectRef::new(Dummy::default()));
        let target = BindingTarget::shared(slot).child("items", vec![2]);
        let nested = target.child("inner", Vec::new());
        assert_eq!(nested.path.len(), 2);
        assert_eq!(nested.path[0].indices, [2]);
        assert_eq!(nested.slot, slot);
    }
}
