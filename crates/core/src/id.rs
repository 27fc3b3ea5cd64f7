// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Newtype identifiers

/// Define a newtype ID wrapper around `String`.
///
/// Generates `new()`, `as_str()`, `Display`, `From<String>`, `From<&str>`,
/// `PartialEq<str>`, `PartialEq<&str>`, and `Borrow<str>` implementations.
#[macro_export]
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id! {
    /// Identifies a single match / dedicated-server instance.
    pub struct MatchId;
}

impl MatchId {
    /// The reserved sentinel id used for the startup version probe.
    pub fn null() -> Self {
        Self::new(crate::NULL_MATCH_ID)
    }

    pub fn is_null(&self) -> bool {
        self.0 == crate::NULL_MATCH_ID
    }
}

define_id! {
    /// Identifies a player/user that can be attached to a match.
    pub struct UserId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_match_id_round_trips() {
        assert!(MatchId::null().is_null());
        assert!(!MatchId::new("abc").is_null());
    }

    #[test]
    fn display_matches_inner_string() {
        let id = MatchId::new("m-1");
        assert_eq!(id.to_string(), "m-1");
        assert_eq!(id, "m-1");
    }
}
