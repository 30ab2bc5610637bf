//! Domain ID types with the NewType pattern
//!
//! Machines and passwords are both keyed by UUID strings; wrapping them keeps
//! a password id from ever being passed where a machine id is expected.

use serde::{Deserialize, Serialize};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::{Decode, Encode, Sqlite, Type};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Generate a UUID-backed identifier with the traits the store and API need
macro_rules! domain_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a fresh random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Wrap a value read back from the database
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }

            /// Parse a caller-supplied identifier, normalising it to the
            /// lowercase hyphenated form used at rest
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                let uuid = Uuid::parse_str(s.trim())?;
                Ok(Self(uuid.hyphenated().to_string()))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl Type<Sqlite> for $name {
            fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
                <String as Type<Sqlite>>::type_info()
            }

            fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
                <String as Type<Sqlite>>::compatible(ty)
            }
        }

        impl<'q> Encode<'q, Sqlite> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
            ) -> Result<IsNull, BoxDynError> {
                <String as Encode<'q, Sqlite>>::encode_by_ref(&self.0, buf)
            }
        }

        impl<'r> Decode<'r, Sqlite> for $name {
            fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, BoxDynError> {
                let s = <String as Decode<'r, Sqlite>>::decode(value)?;
                Ok(Self(s))
            }
        }
    };
}

domain_id!(
    /// Identity of an enrolled device; doubles as its certificate common name
    MachineId
);

domain_id!(
    /// Identifier of one stored password rotation record
    PasswordId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn machine_id_creation() {
        let id = MachineId::new();
        assert!(Uuid::parse_str(id.as_str()).is_ok());
    }

    #[test]
    fn parse_normalises_case() {
        let upper = "6F9619FF-8B86-D011-B42D-00C04FC964FF";
        let id = MachineId::parse(upper).unwrap();
        assert_eq!(id.as_str(), "6f9619ff-8b86-d011-b42d-00c04fc964ff");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(PasswordId::parse("not-a-uuid").is_err());
        assert!("".parse::<MachineId>().is_err());
    }

    #[test]
    fn serializes_transparently() {
        let id = PasswordId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        let back: PasswordId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
