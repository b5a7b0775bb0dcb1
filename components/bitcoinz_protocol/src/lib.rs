//! *A crate for BitcoinZ protocol value types.*
//!
//! `bitcoinz_protocol` contains Rust structs, traits and functions that describe the values a
//! BitcoinZ light wallet exchanges with its engine: BTCZ amounts in zatoshis, the two address
//! pools, transaction identifiers, memos and block heights.
//!
#![cfg_attr(feature = "std", doc = "## Feature flags")]
#![cfg_attr(feature = "std", doc = document_features::document_features!())]
//!

#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
// Catch documentation errors caused by code changes.
#![deny(rustdoc::broken_intra_doc_links)]

use core::fmt;

#[cfg(feature = "std")]
use memuse::DynamicUsage;

pub mod address;
pub mod memo;
pub mod txid;
pub mod value;

pub use txid::{TxId, TxIdError};

/// The number of confirmations after which a transaction is considered final by the wallet.
pub const CONFIRMATION_DEPTH: u32 = 6;

/// The default number of blocks after which an unmined transaction expires.
pub const DEFAULT_TX_EXPIRY_DELTA: u32 = 40;

/// A block height on the BitcoinZ chain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct BlockHeight(u32);

#[cfg(feature = "std")]
memuse::impl_no_dynamic_usage!(BlockHeight);

impl BlockHeight {
    /// Constructs a block height from its integer value.
    pub const fn from_u32(v: u32) -> BlockHeight {
        BlockHeight(v)
    }

    /// Returns the height `delta` blocks above this one, saturating at `u32::MAX`.
    pub fn saturating_add(self, delta: u32) -> BlockHeight {
        BlockHeight(self.0.saturating_add(delta))
    }

    /// Returns the number of confirmations a transaction mined at this height has when the
    /// chain tip is at `tip`.
    ///
    /// A transaction mined in the tip block has one confirmation.
    pub fn confirmations_at(self, tip: BlockHeight) -> u32 {
        if tip < self {
            0
        } else {
            tip.0 - self.0 + 1
        }
    }
}

impl fmt::Display for BlockHeight {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(formatter)
    }
}

impl From<u32> for BlockHeight {
    fn from(value: u32) -> Self {
        BlockHeight(value)
    }
}

impl From<BlockHeight> for u32 {
    fn from(value: BlockHeight) -> u32 {
        value.0
    }
}
