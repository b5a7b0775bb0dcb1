//! Interfaces for wallet engines.
//!
//! A wallet engine owns the keys, the chain view and transaction construction. The client
//! never inspects any of those directly: it reads snapshots through [`WalletEngine`] and asks
//! the engine to act on its behalf.
//!
//! # Engine responsibilities
//!
//! - [`WalletEngine::sync`] brings the engine's view of the chain up to date. Snapshots read
//!   afterwards reflect the new chain state.
//! - [`WalletEngine::balance`], [`WalletEngine::transactions`] and
//!   [`WalletEngine::addresses`] return complete snapshots, not deltas. The client merges them
//!   into its own ledger (see [`crate::reconcile`]).
//! - [`WalletEngine::send_transaction`] builds, signs and broadcasts a transaction. It either
//!   returns the new transaction's id or fails; the client does not retry.

use async_trait::async_trait;
use getset::{CopyGetters, Getters};
use serde::{Deserialize, Serialize};

use bitcoinz_protocol::{address::AddressKind, memo::Memo, value::Zatoshis, BlockHeight, TxId};

use crate::wallet::{Balance, Transaction, WalletAddress};

#[cfg(any(test, feature = "test-dependencies"))]
pub mod testing;

/// Information about the lightwalletd server an engine is connected to.
#[derive(Clone, Debug, PartialEq, Eq, Getters, CopyGetters, Serialize, Deserialize)]
pub struct ServerInfo {
    #[getset(get = "pub")]
    version: String,
    #[getset(get = "pub")]
    vendor: String,
    #[getset(get = "pub")]
    chain_name: String,
    #[getset(get_copy = "pub")]
    latest_block_height: BlockHeight,
    #[getset(get = "pub")]
    server_uri: String,
}

impl ServerInfo {
    pub fn new(
        version: String,
        vendor: String,
        chain_name: String,
        latest_block_height: BlockHeight,
        server_uri: String,
    ) -> Self {
        ServerInfo {
            version,
            vendor,
            chain_name,
            latest_block_height,
            server_uri,
        }
    }
}

/// Progress of an engine's chain scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, CopyGetters, Serialize, Deserialize)]
pub struct SyncStatus {
    #[getset(get_copy = "pub")]
    synced_blocks: u32,
    #[getset(get_copy = "pub")]
    total_blocks: u32,
    #[getset(get_copy = "pub")]
    in_progress: bool,
}

impl SyncStatus {
    pub fn new(synced_blocks: u32, total_blocks: u32, in_progress: bool) -> Self {
        SyncStatus {
            synced_blocks,
            total_blocks,
            in_progress,
        }
    }

    /// Returns the scan progress as a fraction in `0.0..=1.0`.
    pub fn progress(&self) -> f64 {
        if self.total_blocks == 0 {
            1.0
        } else {
            (f64::from(self.synced_blocks) / f64::from(self.total_blocks)).min(1.0)
        }
    }
}

/// The contract between the wallet client and the engine that manages keys and chain state.
#[async_trait]
pub trait WalletEngine: Send + Sync {
    /// The type of errors that may be generated when calling into the engine.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Scans the chain up to the current tip.
    async fn sync(&self) -> Result<(), Self::Error>;

    /// Returns the current balance of the wallet.
    async fn balance(&self) -> Result<Balance, Self::Error>;

    /// Returns every transaction the engine knows about, in any order.
    async fn transactions(&self) -> Result<Vec<Transaction>, Self::Error>;

    /// Returns all addresses owned by the wallet.
    async fn addresses(&self) -> Result<Vec<WalletAddress>, Self::Error>;

    /// Derives a new receiving address of the given kind.
    async fn generate_new_address(&self, kind: AddressKind) -> Result<WalletAddress, Self::Error>;

    /// Builds and broadcasts a transaction paying `amount` to `to`, returning its id.
    async fn send_transaction(
        &self,
        to: &str,
        amount: Zatoshis,
        memo: Option<&Memo>,
    ) -> Result<TxId, Self::Error>;

    /// Returns the height of the chain tip as last seen by the engine.
    async fn chain_height(&self) -> Result<BlockHeight, Self::Error>;

    async fn server_info(&self) -> Result<ServerInfo, Self::Error>;

    /// Returns the progress of an ongoing scan, if the engine reports one.
    async fn sync_status(&self) -> Result<Option<SyncStatus>, Self::Error> {
        Ok(None)
    }
}
