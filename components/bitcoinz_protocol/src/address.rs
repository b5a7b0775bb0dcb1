//! Types related to BitcoinZ address recognition.
//!
//! Recognition here is a prefix and length heuristic. It does not validate checksums or
//! decode the address payload; the wallet engine performs full validation when a transaction
//! is built.

use core::fmt;
use core::str::FromStr;

/// The prefix of a transparent P2PKH address.
pub const TRANSPARENT_PREFIX: &str = "t1";

/// The prefixes of shielded addresses (Sprout and Sapling respectively).
pub const SHIELDED_PREFIXES: [&str; 2] = ["zc", "zs"];

/// The minimum length of an address recognized as transparent.
pub const MIN_TRANSPARENT_LEN: usize = 34;

/// The minimum length of an address recognized as shielded.
pub const MIN_SHIELDED_LEN: usize = 60;

/// The value pool an address belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum AddressKind {
    /// A `t1...` address with public balances.
    Transparent,
    /// A `zc...` or `zs...` address whose transfers are private and may carry memos.
    Shielded,
}

impl AddressKind {
    /// Classifies an address string, returning `None` when it matches neither pool.
    pub fn detect(address: &str) -> Option<AddressKind> {
        if address.starts_with(TRANSPARENT_PREFIX) && address.len() >= MIN_TRANSPARENT_LEN {
            Some(AddressKind::Transparent)
        } else if SHIELDED_PREFIXES.iter().any(|p| address.starts_with(p))
            && address.len() >= MIN_SHIELDED_LEN
        {
            Some(AddressKind::Shielded)
        } else {
            None
        }
    }

    /// Returns whether transfers to addresses of this kind may carry a memo.
    pub fn can_receive_memo(self) -> bool {
        matches!(self, AddressKind::Shielded)
    }

    pub fn is_shielded(self) -> bool {
        self == AddressKind::Shielded
    }

    /// The engine's name for this kind, as used by the `new` address command.
    pub fn as_str(self) -> &'static str {
        match self {
            AddressKind::Transparent => "transparent",
            AddressKind::Shielded => "shielded",
        }
    }

    /// The short form accepted by lite-client commands (`t` or `z`).
    pub fn command_arg(self) -> &'static str {
        match self {
            AddressKind::Transparent => "t",
            AddressKind::Shielded => "z",
        }
    }
}

impl fmt::Display for AddressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An address type name that is not recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAddressKind(pub String);

impl fmt::Display for UnknownAddressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown address type {:?}", self.0)
    }
}

impl std::error::Error for UnknownAddressKind {}

impl FromStr for AddressKind {
    type Err = UnknownAddressKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transparent" | "t" => Ok(AddressKind::Transparent),
            "shielded" | "z" => Ok(AddressKind::Shielded),
            other => Err(UnknownAddressKind(other.to_string())),
        }
    }
}

/// Returns whether `address` looks like a BitcoinZ address of either kind.
pub fn is_valid_address(address: &str) -> bool {
    AddressKind::detect(address).is_some()
}

#[cfg(any(test, feature = "test-dependencies"))]
pub mod testing {
    use proptest::prelude::{prop_compose, prop_oneof, Strategy};

    use super::{MIN_SHIELDED_LEN, MIN_TRANSPARENT_LEN};

    prop_compose! {
        /// A string that passes the transparent heuristic.
        pub fn arb_transparent_address()(body in "[1-9A-HJ-NP-Za-km-z]{32,40}") -> String {
            debug_assert!(body.len() + 2 >= MIN_TRANSPARENT_LEN);
            format!("t1{}", body)
        }
    }

    prop_compose! {
        /// A string that passes the shielded heuristic.
        pub fn arb_shielded_address()(
            prefix in prop_oneof!["zs", "zc"],
            body in "[02-9ac-hj-np-z]{58,90}",
        ) -> String {
            debug_assert!(body.len() + 2 >= MIN_SHIELDED_LEN);
            format!("{}{}", prefix, body)
        }
    }

    pub fn arb_address() -> impl Strategy<Value = String> {
        prop_oneof![arb_transparent_address(), arb_shielded_address()]
    }
}
