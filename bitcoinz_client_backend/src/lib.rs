//! *A crate for implementing BitcoinZ light clients.*
//!
//! `bitcoinz_client_backend` holds the wallet-facing logic of a BitcoinZ light client that
//! sits between a user interface and a wallet engine:
//!
//! - [`data_api::WalletEngine`] is the contract an engine (key management, chain sync,
//!   transaction construction) must provide. [`lite::LiteClientEngine`] adapts a lite-client
//!   command interface to it.
//! - [`state::WalletState`] is the shared application state. It caches engine snapshots,
//!   reconciles the transaction ledger, guards in-flight operations and broadcasts
//!   [`state::WalletEvent`]s to subscribers.
//! - [`send`], [`receive`], [`history`] and [`messages`] hold the pure validation, filtering
//!   and formatting rules used by the wallet screens.
//!
#![doc = document_features::document_features!()]
//!

#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
// Catch documentation errors caused by code changes.
#![deny(rustdoc::broken_intra_doc_links)]

pub mod annotations;
pub mod config;
pub mod data_api;
mod error;
pub mod history;
pub mod inflight;
pub mod lite;
pub mod messages;
pub mod receive;
pub mod reconcile;
pub mod send;
pub mod state;
pub mod sync;
pub mod wallet;

pub use bitcoinz_protocol::{address::AddressKind, memo::Memo, value::Zatoshis, BlockHeight, TxId};
pub use error::{Error, Operation};
