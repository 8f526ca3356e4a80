//! Cluster identity in `name.namespace` form
//!
//! Annotation values name clusters as comma-separated `name.namespace`
//! tokens, both in transfer requests and in allow-lists.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Identity of one cluster resource
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClusterIdentity {
    /// Resource name
    pub name: String,
    /// Resource namespace
    pub namespace: String,
}

/// A token that is not a valid `name.namespace` pair
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid cluster reference {token:?}, expected clusterName.namespace")]
pub struct InvalidClusterRef {
    /// The offending token, verbatim
    pub token: String,
}

impl ClusterIdentity {
    /// Create an identity from name and namespace
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

impl fmt::Display for ClusterIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.name, self.namespace)
    }
}

impl FromStr for ClusterIdentity {
    type Err = InvalidClusterRef;

    /// Parse `name.namespace`. Exactly one dot, both sides non-empty.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidClusterRef {
            token: s.to_string(),
        };
        let mut parts = s.split('.');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(name), Some(namespace), None) if !name.is_empty() && !namespace.is_empty() => {
                Ok(Self::new(name, namespace))
            }
            _ => Err(invalid()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_as_name_dot_namespace() {
        let id = ClusterIdentity::new("cluster1", "pxc");
        assert_eq!(id.to_string(), "cluster1.pxc");
    }

    #[test]
    fn parses_valid_reference() {
        let id: ClusterIdentity = "cluster1.pxc".parse().unwrap();
        assert_eq!(id, ClusterIdentity::new("cluster1", "pxc"));
    }

    #[test]
    fn rejects_wrong_part_count() {
        for bad in ["badtoken", "a.b.c", "", "."] {
            let err = bad.parse::<ClusterIdentity>().unwrap_err();
            assert_eq!(err.token, bad);
        }
    }

    #[test]
    fn rejects_empty_halves() {
        assert!("cluster1.".parse::<ClusterIdentity>().is_err());
        assert!(".pxc".parse::<ClusterIdentity>().is_err());
    }

    #[test]
    fn equality_is_case_sensitive() {
        assert_ne!(
            ClusterIdentity::new("Cluster1", "pxc"),
            ClusterIdentity::new("cluster1", "pxc")
        );
    }
}
