//! Per-read table of shared objects constructed so far.

use std::collections::HashMap;

use crate::identity::Identity;
use crate::object::ObjectRef;

/// Index of a shared object in an [`InstanceTable`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SlotId(usize);

/// Every shared object of one read, in construction order, plus the
/// identity index used to resolve `ReferenceGuid` links.
#[derive(Default)]
pub(crate) struct InstanceTable {
    slots: Vec<ObjectRef>,
    by_identity: HashMap<Identity, SlotId>,
}

impl InstanceTable {
    pub fn insert(&mut self, object: ObjectRef) -> SlotId {
        let slot = SlotId(self.slots.len());
        self.slots.push(object);
        slot
    }

    /// Index `slot` under `identity`. Returns `false` if the identity is
    /// already taken.
    pub fn bind(&mut self, identity: Identity, slot: SlotId) -> bool {
        if self.by_identity.contains_key(&identity) {
            return false;
        }
        self.by_identity.insert(identity, slot);
        true
    }

    pub fn get(&self, identity: Identity) -> Option<ObjectRef> {
        self.by_identity
            .get(&identity)
            .map(|slot| self.slots[slot.0].clone())
    }

    pub fn object(&self, slot: SlotId) -> &ObjectRef {
        &self.slots[slot.0]
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Serializable;

    #[derive(Default, Serializable)]
    struct Dummy {
        value: u32,
    }

    #[test]
    fn bind_rejects_taken_identity() {
        let mut table = InstanceTable::default();
        let id = Identity::new();
        let first = table.insert(ObjectRef::new(Dummy::default()));
        let second = table.insert(ObjectRef::new(Dummy { value: 1 }));

        assert!(table.bind(id, first));
        assert!(!table.bind(id, second));
        assert!(table.get(id).unwrap().ptr_eq(table.object(first)));
        assert_eq!(table.len(), 2);
        assert!(table.get(Identity::new()).is_none());
    }
}
