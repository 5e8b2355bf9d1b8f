//! Typed resource identifiers for the convoy control plane.
//!
//! Every persisted record carries a prefixed ULID id (`node_<ulid>`,
//! `cfg_<ulid>`). The prefix keeps different resource types from being
//! mixed up at API boundaries; the ULID keeps ids unique and sortable by
//! creation time. Parsing is strict: the prefix must match the type and
//! the remainder must be a valid ULID.

use thiserror::Error;

/// Re-export for consumers that need raw ULID operations.
pub use ulid::Ulid;

/// Errors produced when parsing an id string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The input was empty.
    #[error("id cannot be empty")]
    Empty,

    /// The input has no `_` between prefix and ULID.
    #[error("id is missing the '_' separator")]
    MissingSeparator,

    /// The prefix does not match the expected resource type.
    #[error("wrong id prefix: expected '{expected}', got '{actual}'")]
    WrongPrefix {
        expected: &'static str,
        actual: String,
    },

    /// The part after the prefix is not a valid ULID.
    #[error("invalid ulid in id: {0}")]
    InvalidUlid(String),
}

macro_rules! typed_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(Ulid);

        impl $name {
            /// String prefix identifying this resource type.
            pub const PREFIX: &'static str = $prefix;

            /// Generates a fresh id.
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            /// Parses the canonical `{prefix}_{ulid}` form.
            pub fn parse(s: &str) -> Result<Self, IdError> {
                if s.is_empty() {
                    return Err(IdError::Empty);
                }
                let (prefix, rest) = s.split_once('_').ok_or(IdError::MissingSeparator)?;
                if prefix != Self::PREFIX {
                    return Err(IdError::WrongPrefix {
                        expected: Self::PREFIX,
                        actual: prefix.to_string(),
                    });
                }
                let ulid = rest
                    .parse::<Ulid>()
                    .map_err(|e| IdError::InvalidUlid(e.to_string()))?;
                Ok(Self(ulid))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}_{}", Self::PREFIX, self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = <String as serde::Deserialize>::deserialize(deserializer)?;
                Self::parse(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

typed_id!(
    /// Identifier of a managed fleet node.
    NodeId,
    "node"
);

typed_id!(
    /// Identifier of a configuration version record.
    VersionId,
    "cfg"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_roundtrip() {
        let id = NodeId::new();
        let parsed: NodeId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn version_id_has_cfg_prefix() {
        assert!(VersionId::new().to_string().starts_with("cfg_"));
    }

    #[test]
    fn rejects_wrong_prefix() {
        let err = NodeId::parse("cfg_01HV4Z2WQXKJNM8GPQY6VBKC3D").unwrap_err();
        assert!(matches!(err, IdError::WrongPrefix { expected: "node", .. }));
    }

    #[test]
    fn rejects_missing_separator() {
        assert_eq!(
            NodeId::parse("node01HV4Z2WQXKJNM8GPQY6VBKC3D"),
            Err(IdError::MissingSeparator)
        );
    }

    #[test]
    fn rejects_empty_and_garbage() {
        assert_eq!(NodeId::parse(""), Err(IdError::Empty));
        assert!(matches!(
            NodeId::parse("node_not-a-ulid"),
            Err(IdError::InvalidUlid(_))
        ));
    }

    #[test]
    fn serde_uses_canonical_string_form() {
        let id = NodeId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn ids_sort_by_creation_time() {
        let a = VersionId::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = VersionId::new();
        assert!(a < b);
    }
}
