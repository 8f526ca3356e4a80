//! Trigger annotations and the JSON patches that mutate them
//!
//! Annotations are both the trigger and the completion marker of each
//! workflow: a workflow is done exactly when its annotation is gone.
//! Every mutation is an RFC 6902 patch guarded by a `test` on the value the
//! workflow acted on, so an operator edit made mid-pass wins over ours.

use json_patch::{PatchOperation, RemoveOperation, ReplaceOperation, TestOperation};
use jsonptr::PointerBuf;

/// Presence-only trigger: issue a scoped vault token for this cluster
pub const ISSUE_TOKEN_ANNOTATION: &str = "percona.com/issue-vault-token";

/// Comma-separated `name.namespace` list of clusters to copy transition keys from
pub const TRANSFER_KEYS_ANNOTATION: &str = "percona.com/vault-transfer-keys";

/// Set on a source cluster: `*` or a comma-separated `name.namespace` allow-list
pub const ALLOW_TRANSFER_ANNOTATION: &str = "percona.com/allow-transition-key-transfer";

/// Allow-list value that authorizes any requester
pub const ALLOW_ANY: &str = "*";

/// A single-key mutation of a resource's annotation map
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AnnotationPatch {
    /// Remove the annotation
    Remove {
        /// Annotation key
        key: String,
        /// Value the annotation must still have for the patch to apply
        expected: Option<String>,
    },
    /// Replace the annotation value
    Replace {
        /// Annotation key
        key: String,
        /// Value the annotation must still have for the patch to apply
        expected: Option<String>,
        /// New value
        value: String,
    },
}

impl AnnotationPatch {
    /// Remove `key`, provided it still holds `expected`
    pub fn remove(key: impl Into<String>, expected: Option<&str>) -> Self {
        Self::Remove {
            key: key.into(),
            expected: expected.map(str::to_string),
        }
    }

    /// Replace `key` with `value`, provided it still holds `expected`
    pub fn replace(
        key: impl Into<String>,
        expected: Option<&str>,
        value: impl Into<String>,
    ) -> Self {
        Self::Replace {
            key: key.into(),
            expected: expected.map(str::to_string),
            value: value.into(),
        }
    }

    /// Annotation key this patch touches
    pub fn key(&self) -> &str {
        match self {
            Self::Remove { key, .. } | Self::Replace { key, .. } => key,
        }
    }

    /// Apply to an in-memory annotation map
    ///
    /// Mirrors the API server: returns false and leaves the map untouched when
    /// the guard fails or the key to remove/replace is absent.
    pub fn apply_to(&self, annotations: &mut std::collections::BTreeMap<String, String>) -> bool {
        let (key, expected) = match self {
            Self::Remove { key, expected } | Self::Replace { key, expected, .. } => {
                (key, expected)
            }
        };
        let Some(current) = annotations.get(key) else {
            return false;
        };
        if matches!(expected, Some(e) if e != current) {
            return false;
        }
        match self {
            Self::Remove { .. } => {
                annotations.remove(key);
            }
            Self::Replace { value, .. } => {
                annotations.insert(key.clone(), value.clone());
            }
        }
        true
    }

    /// Build the RFC 6902 patch document
    pub fn to_json_patch(&self) -> json_patch::Patch {
        let path = annotation_pointer(self.key());
        let mut ops = Vec::with_capacity(2);

        let expected = match self {
            Self::Remove { expected, .. } | Self::Replace { expected, .. } => expected,
        };
        if let Some(expected) = expected {
            ops.push(PatchOperation::Test(TestOperation {
                path: path.clone(),
                value: serde_json::Value::String(expected.clone()),
            }));
        }

        match self {
            Self::Remove { .. } => ops.push(PatchOperation::Remove(RemoveOperation { path })),
            Self::Replace { value, .. } => ops.push(PatchOperation::Replace(ReplaceOperation {
                path,
                value: serde_json::Value::String(value.clone()),
            })),
        }

        json_patch::Patch(ops)
    }
}

/// JSON pointer to `/metadata/annotations/<key>` with `/` in the key escaped
pub fn annotation_pointer(key: &str) -> PointerBuf {
    PointerBuf::from_tokens(["metadata", "annotations", key])
}
