//! Strongly-typed identifiers for domain entities.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

macro_rules! define_name {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Default,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            Serialize,
            Deserialize,
            JsonSchema,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(name: impl Into<String>) -> Self {
                Self(name.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

define_name!(
    /// Name of a builder definition; unique within a definition set.
    BuilderName
);

define_name!(
    /// Opaque tool identifier of a step (`cmake`, `ninja`, `npm`, ...).
    CommandKind
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_builder_name_display() {
        let name = BuilderName::new("cpp-test");
        assert_eq!(name.to_string(), "cpp-test");
        assert_eq!(name.as_str(), "cpp-test");
    }

    #[test]
    fn test_builder_name_borrow_lookup() {
        let mut map = BTreeMap::new();
        map.insert(BuilderName::new("rust-test"), 1);
        assert_eq!(map.get("rust-test"), Some(&1));
    }

    #[test]
    fn test_command_kind_serializes_transparently() {
        let kind = CommandKind::new("ninja");
        assert_eq!(serde_json::to_string(&kind).unwrap(), "\"ninja\"");
    }
}
