//! Core identifier types with validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// The provided value had surrounding whitespace.
    #[error("{field} cannot start or end with whitespace: {value:?}")]
    Untrimmed { field: &'static str, value: String },
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new value after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                if id.trim() != id {
                    return Err(ValidationError::Untrimmed {
                        field: $field_name,
                        value: id,
                    });
                }
                Ok(Self(id))
            }

            /// Returns the value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }
    };
}

define_string_id!(
    /// An application package name (e.g. `com.example.reader`).
    ///
    /// Usage events and per-app summaries are keyed by this value.
    PackageName, "package name"
);

define_string_id!(
    /// A validated goal identifier.
    GoalId, "goal ID"
);

define_string_id!(
    /// A validated habit identifier.
    HabitId, "habit ID"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_name_rejects_empty() {
        assert_eq!(
            PackageName::new("").unwrap_err(),
            ValidationError::Empty {
                field: "package name"
            }
        );
        assert!(PackageName::new("com.example.app").is_ok());
    }

    #[test]
    fn package_name_rejects_surrounding_whitespace() {
        assert!(PackageName::new(" com.example.app").is_err());
        assert!(PackageName::new("com.example.app\n").is_err());
    }

    #[test]
    fn goal_id_serde_roundtrip() {
        let id = GoalId::new("goal-1").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"goal-1\"");
        let parsed: GoalId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn habit_id_serde_rejects_empty() {
        let result: Result<HabitId, _> = serde_json::from_str("\"\"");
        assert!(result.is_err());
    }

    #[test]
    fn ids_order_lexicographically() {
        let mut ids = vec![
            GoalId::new("b").unwrap(),
            GoalId::new("a").unwrap(),
            GoalId::new("c").unwrap(),
        ];
        ids.sort();
        let names: Vec<&str> = ids.iter().map(GoalId::as_str).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }
}
