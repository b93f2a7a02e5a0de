//! Fixed-length opaque identifiers.
//!
//! Every record in the store is keyed by an opaque byte value of fixed
//! length: 16 bytes for accounts and devices, 32 bytes for tokens. At the
//! boundary these render as lowercase hex strings; internally they are plain
//! byte arrays so lookups never depend on an encoding convention.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CoreError, Result};

macro_rules! opaque_id {
    ($(#[$doc:meta])* $name:ident, $len:expr) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; $len]);

        impl $name {
            /// Length of this identifier in bytes.
            pub const LEN: usize = $len;

            /// Wraps a raw byte array.
            #[must_use]
            pub const fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// Parses a hex string of exactly `2 * LEN` characters.
            ///
            /// # Errors
            ///
            /// Returns `CoreError::InvalidId` for a wrong length or a
            /// non-hex character.
            pub fn from_hex(s: &str) -> Result<Self> {
                let raw = hex::decode(s).map_err(|e| {
                    CoreError::invalid_id(format!("{}: {e}", stringify!($name)))
                })?;
                let bytes: [u8; $len] = raw.try_into().map_err(|_| {
                    CoreError::invalid_id(format!(
                        "{} must be {} bytes, got {} hex characters",
                        stringify!($name),
                        $len,
                        s.len()
                    ))
                })?;
                Ok(Self(bytes))
            }

            /// Renders the identifier as lowercase hex.
            #[must_use]
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Raw bytes of the identifier.
            #[must_use]
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self> {
                Self::from_hex(s)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::from_hex(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

opaque_id!(
    /// Account identifier: a 16-byte opaque key naming one account.
    Uid,
    16
);

opaque_id!(
    /// Token identifier: a 32-byte opaque key naming a session, key-fetch,
    /// or workflow token.
    TokenId,
    32
);

opaque_id!(
    /// Device identifier: a 16-byte opaque key, unique within one account.
    DeviceId,
    16
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uid_hex_round_trip() {
        let uid = Uid::from_bytes([0xab; 16]);
        let hex = uid.to_hex();
        assert_eq!(hex, "ab".repeat(16));
        assert_eq!(Uid::from_hex(&hex).unwrap(), uid);
    }

    #[test]
    fn test_token_id_length() {
        assert_eq!(TokenId::LEN, 32);
        let id = TokenId::from_hex(&"00".repeat(32)).unwrap();
        assert_eq!(id.as_bytes(), &[0u8; 32]);
    }

    #[test]
    fn test_from_hex_rejects_wrong_length() {
        assert!(Uid::from_hex("abcd").is_err());
        assert!(Uid::from_hex(&"ab".repeat(32)).is_err());
        assert!(Uid::from_hex("").is_err());
        assert!(DeviceId::from_hex(&"ff".repeat(32)).is_err());
    }

    #[test]
    fn test_from_hex_rejects_non_hex() {
        let err = Uid::from_hex(&"zz".repeat(16)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidId(_)));
    }

    #[test]
    fn test_from_hex_accepts_uppercase() {
        let upper = Uid::from_hex(&"AB".repeat(16)).unwrap();
        let lower = Uid::from_hex(&"ab".repeat(16)).unwrap();
        assert_eq!(upper, lower);
    }

    #[test]
    fn test_display_is_lowercase_hex() {
        let id = DeviceId::from_bytes([0xCD; 16]);
        assert_eq!(id.to_string(), "cd".repeat(16));
    }

    #[test]
    fn test_debug_includes_type_name() {
        let id = TokenId::from_bytes([1; 32]);
        let debug = format!("{id:?}");
        assert!(debug.starts_with("TokenId("));
        assert!(debug.contains(&"01".repeat(32)));
    }

    #[test]
    fn test_from_str() {
        let hex = "0f".repeat(16);
        let uid: Uid = hex.parse().unwrap();
        assert_eq!(uid.to_hex(), hex);
    }

    #[test]
    fn test_serde_round_trip() {
        let uid = Uid::from_bytes([0x42; 16]);
        let json = serde_json::to_string(&uid).unwrap();
        assert_eq!(json, format!("\"{}\"", "42".repeat(16)));

        let back: Uid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, uid);
    }

    #[test]
    fn test_deserialize_rejects_bad_input() {
        assert!(serde_json::from_str::<Uid>("\"nope\"").is_err());
        assert!(serde_json::from_str::<TokenId>("42").is_err());
    }

    #[test]
    fn test_ids_usable_as_map_keys() {
        use std::collections::HashMap;

        let mut map = HashMap::new();
        map.insert(Uid::from_bytes([1; 16]), "first");
        map.insert(Uid::from_bytes([2; 16]), "second");

        assert_eq!(map.get(&Uid::from_bytes([1; 16])), Some(&"first"));
        assert_eq!(map.len(), 2);
    }
}
