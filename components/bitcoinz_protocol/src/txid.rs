use core::fmt;
use core::str::FromStr;

#[cfg(feature = "std")]
use memuse::DynamicUsage;

/// The identifier for a BitcoinZ transaction.
///
/// The identifier is a double-SHA-256 hash of the encoded transaction. Like block explorers
/// and the lite-client JSON interface, its string form is the byte-reversed hex encoding.
#[derive(Clone, Copy, PartialOrd, Ord, PartialEq, Eq, Hash)]
pub struct TxId([u8; 32]);

#[cfg(feature = "std")]
memuse::impl_no_dynamic_usage!(TxId);

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The (byte-flipped) hex string is more useful than the raw bytes, because we can
        // look that up in RPC methods and block explorers.
        let txid_str = self.to_string();
        f.debug_tuple("TxId").field(&txid_str).finish()
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut data = self.0;
        data.reverse();
        formatter.write_str(&hex::encode(data))
    }
}

impl AsRef<[u8; 32]> for TxId {
    fn as_ref(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<TxId> for [u8; 32] {
    fn from(value: TxId) -> Self {
        value.0
    }
}

impl TxId {
    /// Wraps the given byte array as a TxId value
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        TxId(bytes)
    }

    /// Returns true when the txid consists of all zeros; this only occurs for coinbase
    /// transactions.
    pub fn is_null(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

/// Errors that may occur when parsing a [`TxId`] from its hex form.
#[derive(Debug, Clone, PartialEq)]
pub enum TxIdError {
    /// The input was not valid hex.
    InvalidHex(hex::FromHexError),
    /// The input decoded to the wrong number of bytes.
    InvalidLength(usize),
}

impl fmt::Display for TxIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxIdError::InvalidHex(e) => write!(f, "Transaction id is not valid hex: {e}"),
            TxIdError::InvalidLength(n) => {
                write!(f, "Transaction id must be 32 bytes, got {n}")
            }
        }
    }
}

impl std::error::Error for TxIdError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TxIdError::InvalidHex(e) => Some(e),
            TxIdError::InvalidLength(_) => None,
        }
    }
}

impl FromStr for TxId {
    type Err = TxIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = hex::decode(s.trim()).map_err(TxIdError::InvalidHex)?;
        let len = bytes.len();
        bytes.reverse();
        <[u8; 32]>::try_from(bytes)
            .map(TxId)
            .map_err(|_| TxIdError::InvalidLength(len))
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for TxId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for TxId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(any(test, feature = "test-dependencies"))]
pub mod testing {
    use proptest::prelude::{any, prop_compose};

    use super::TxId;

    prop_compose! {
        pub fn arb_txid()(bytes in any::<[u8; 32]>()) -> TxId {
            TxId::from_bytes(bytes)
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::proptest;

    use super::{testing::arb_txid, TxId, TxIdError};

    #[test]
    fn display_is_byte_reversed() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xab;
        let txid = TxId::from_bytes(bytes);
        let s = txid.to_string();
        assert!(s.ends_with("ab"));
        assert!(s.starts_with("00"));
        assert_eq!(s.parse::<TxId>(), Ok(txid));
    }

    #[test]
    fn rejects_wrong_lengths() {
        assert_eq!("abcd".parse::<TxId>(), Err(TxIdError::InvalidLength(2)));
        assert!(matches!("zz".parse::<TxId>(), Err(TxIdError::InvalidHex(_))));
    }

    proptest! {
        #[test]
        fn prop_string_form_parses(txid in arb_txid()) {
            assert_eq!(txid.to_string().parse::<TxId>(), Ok(txid));
        }
    }
}
