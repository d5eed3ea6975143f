//! Serialized form of an object graph.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::FormatError;
use crate::format::{self, Format};
use crate::identity::{ContentPath, Identity};
use crate::value::{Link, Value};

/// A document tree. The root is normally an object node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    pub root: Value,
}

impl Document {
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    pub fn encode(&self, format: Format) -> Result<Vec<u8>, FormatError> {
        format::encode(self, format)
    }

    pub fn decode(bytes: &[u8], format: Format) -> Result<Self, FormatError> {
        format::decode(bytes, format)
    }

    pub fn to_json(&self) -> Result<String, FormatError> {
        serde_json::to_string(self).map_err(|e| FormatError::Encode(e.to_string()))
    }

    pub fn to_json_pretty(&self) -> Result<String, FormatError> {
        serde_json::to_string_pretty(self).map_err(|e| FormatError::Encode(e.to_string()))
    }

    pub fn from_json(text: &str) -> Result<Self, FormatError> {
        serde_json::from_str(text).map_err(|e| FormatError::Decode(e.to_string()))
    }

    /// External files this document references, in first-seen order.
    pub fn dependencies(&self) -> Vec<&ContentPath> {
        let mut seen = HashSet::new();
        let mut paths = Vec::new();
        self.root.walk(&mut |value| {
            if let Value::Link(Link::File(path)) = value
                && seen.insert(path)
            {
                paths.push(path);
            }
        });
        paths
    }

    /// Identities declared by object nodes, in document order.
    pub fn identities(&self) -> Vec<Identity> {
        let mut ids = Vec::new();
        self.root.walk(&mut |value| {
            if let Value::Node(node) = value
                && let Some(id) = node.identity
            {
                ids.push(id);
            }
        });
        ids
    }

    /// Identifier references with no matching object node in this document.
    pub fn dangling_references(&self) -> Vec<Identity> {
        let declared: HashSet<Identity> = self.identities().into_iter().collect();
        let mut reported = HashSet::new();
        let mut dangling = Vec::new();
        self.root.walk(&mut |value| {
            if let Value::Link(Link::Guid(id)) = value
                && !declared.contains(id)
                && reported.insert(*id)
            {
                dangling.push(*id);
            }
        });
        dangling
    }

    /// Number of object nodes, tagged or not.
    pub fn object_count(&self) -> usize {
        let mut count = 0;
        self.root.walk(&mut |value| {
            if matches!(value, Value::Node(_) | Value::Map(_)) {
                count += 1;
            }
        });
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_links() {
        let a = Identity::new();
        let missing = Identity::new();
        let json = format!(
            r#"{{"$type": "Scene", "$id": "{a}",
                "items": [
                    {{"ReferenceFile": "meshes/rock.mesh"}},
                    {{"ReferenceFile": "meshes/rock.mesh"}},
                    {{"ReferenceFile": "materials/moss.mat"}},
                    {{"ReferenceGuid": "{a}"}},
                    {{"ReferenceGuid": "{missing}"}},
                    {{"ReferenceGuid": "{missing}"}}
                ]}}"#
        );
        let doc = Document::from_json(&json).unwrap();
        let deps: Vec<_> = doc.dependencies().iter().map(|p| p.as_str()).collect();
        assert_eq!(deps, ["meshes/rock.mesh", "materials/moss.mat"]);
        assert_eq!(doc.identities(), vec![a]);
        assert_eq!(doc.dangling_references(), vec![missing]);
        assert_eq!(doc.object_count(), 1);
    }

    #[test]
    fn json_is_transparent() {
        let doc = Document::from_json(r#"{"a":1}"#).unwrap();
        assert_eq!(doc.to_json().unwrap(), r#"{"a":1}"#);
    }
}
