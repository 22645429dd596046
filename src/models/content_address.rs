//! Content addresses: the hex SHA-256 digest of a payload.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::{
    Decode, Encode, Sqlite, Type,
    encode::IsNull,
    error::BoxDynError,
    sqlite::{SqliteArgumentValue, SqliteTypeInfo, SqliteValueRef},
};
use std::{fmt, str::FromStr};

/// Length of a hex-encoded SHA-256 digest.
pub const ADDRESS_HEX_LEN: usize = 64;

/// Deterministic storage key for a blob.
///
/// Always 64 lowercase hex characters. Equal payloads produce equal addresses,
/// which is what makes blob writes idempotent. Values read back from SQLite
/// go through the same validation as parsed ones.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentAddress(String);

#[derive(Debug, thiserror::Error)]
#[error("`{0}` is not a valid content address")]
pub struct InvalidAddress(pub String);

impl ContentAddress {
    /// Address of an in-memory payload.
    pub fn of(data: &[u8]) -> Self {
        Self::from_digest(Sha256::digest(data).as_slice())
    }

    /// Wrap a finished SHA-256 digest.
    pub fn from_digest(digest: &[u8]) -> Self {
        Self(hex::encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Two-level shard directories (first and second byte of the digest).
    pub fn shards(&self) -> (&str, &str) {
        (&self.0[0..2], &self.0[2..4])
    }
}

impl FromStr for ContentAddress {
    type Err = InvalidAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() == ADDRESS_HEX_LEN
            && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        {
            Ok(Self(s.to_string()))
        } else {
            Err(InvalidAddress(s.to_string()))
        }
    }
}

impl TryFrom<String> for ContentAddress {
    type Error = InvalidAddress;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ContentAddress> for String {
    fn from(value: ContentAddress) -> Self {
        value.0
    }
}

impl Type<Sqlite> for ContentAddress {
    fn type_info() -> SqliteTypeInfo {
        <String as Type<Sqlite>>::type_info()
    }

    fn compatible(ty: &SqliteTypeInfo) -> bool {
        <String as Type<Sqlite>>::compatible(ty)
    }
}

impl<'q> Encode<'q, Sqlite> for ContentAddress {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<SqliteArgumentValue<'q>>,
    ) -> Result<IsNull, BoxDynError> {
        <String as Encode<'q, Sqlite>>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> Decode<'r, Sqlite> for ContentAddress {
    fn decode(value: SqliteValueRef<'r>) -> Result<Self, BoxDynError> {
        let raw = <String as Decode<'r, Sqlite>>::decode(value)?;
        Ok(raw.parse::<ContentAddress>()?)
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_is_sha256_hex() {
        let addr = ContentAddress::of(b"abc");
        assert_eq!(
            addr.as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(addr.shards(), ("ba", "78"));
    }

    #[test]
    fn parse_rejects_malformed_addresses() {
        assert!("abc".parse::<ContentAddress>().is_err());
        assert!("../../etc/passwd".parse::<ContentAddress>().is_err());
        let upper = "BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD";
        assert!(upper.parse::<ContentAddress>().is_err());

        let ok = ContentAddress::of(b"abc");
        assert_eq!(ok.as_str().parse::<ContentAddress>().unwrap(), ok);
    }
}
