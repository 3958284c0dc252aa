use std::fmt;

use serde::{Deserialize, Serialize};

/// Primary key type for database rows.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Position of a physical door inside a multi-door controller (0-based).
pub type DoorIndex = u16;

macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

define_string_id! {
    /// Logical identifier of one physical compartment ("rack number").
    ///
    /// Stable across reconnects; which controller serves it is not.
    LockerId
}

define_string_id! {
    /// Identity a controller reports when it registers.
    ///
    /// For a single-door controller this is usually the locker identifier
    /// it serves; for a shelf it is the shelf identifier.
    ControllerId
}
