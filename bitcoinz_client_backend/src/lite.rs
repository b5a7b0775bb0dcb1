//! A [`WalletEngine`] backed by a lite-client command interface.
//!
//! Lite clients expose their wallet as a set of named commands that take a whitespace- or
//! JSON-encoded argument string and return a JSON document. A failed command returns an
//! object of the form `{"error": "..."}`. [`LiteClientEngine`] issues these commands through
//! a [`CommandExecutor`] and decodes the responses into the wallet's data model.
//!
//! | Command | Arguments | Response |
//! |---|---|---|
//! | `sync` | | `{"result": "success", ...}` |
//! | `syncstatus` | | `{"in_progress": bool, "synced_blocks": n, "total_blocks": n}` |
//! | `balance` | | `{"zbalance", "verified_zbalance", "spendable_zbalance", ...}` |
//! | `list` | | array of transaction entries |
//! | `addresses` | | `{"z_addresses": [...], "t_addresses": [...]}` |
//! | `new` | `z` or `t` | `["<address>"]` |
//! | `send` | `[{"address", "amount", "memo"}]` | `{"txid": "..."}` |
//! | `height` | | `{"height": n}` |
//! | `info` | | `{"version", "vendor", "chain_name", "latest_block_height", "server_uri"}` |

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use bitcoinz_protocol::{
    address::AddressKind,
    memo::Memo,
    value::{BalanceError, Zatoshis},
    BlockHeight, TxId, TxIdError,
};

use crate::{
    config::{WalletConfig, DEFAULT_SERVER_URI},
    data_api::{ServerInfo, SyncStatus, WalletEngine},
    wallet::{Balance, InvalidBalance, Transaction, TxType, WalletAddress},
};

/// Runs a lite-client command and returns its raw JSON response.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, command: &str, args: &str) -> String;
}

/// Errors produced while talking to a lite client.
#[derive(Debug, Error)]
pub enum LiteError {
    /// The client answered with an `{"error": ...}` object.
    #[error("{command} failed: {message}")]
    Rejected { command: String, message: String },

    #[error("Could not decode {command} response: {source}")]
    Json {
        command: String,
        #[source]
        source: serde_json::Error,
    },

    /// The response decoded but did not make sense.
    #[error("Unexpected {command} response: {reason}")]
    Malformed { command: String, reason: String },

    #[error("Invalid transaction id: {0}")]
    InvalidTxId(#[from] TxIdError),

    #[error("Value out of range: {0}")]
    Value(#[from] BalanceError),

    #[error(transparent)]
    Balance(#[from] InvalidBalance),
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct BalanceResponse {
    zbalance: u64,
    verified_zbalance: u64,
    spendable_zbalance: u64,
    unverified_zbalance: u64,
    tbalance: u64,
}

#[derive(Deserialize)]
struct OutgoingEntry {
    address: String,
    value: u64,
    #[serde(default)]
    memo: Option<String>,
}

#[derive(Deserialize)]
struct ListEntry {
    #[serde(default)]
    block_height: u32,
    #[serde(default)]
    unconfirmed: bool,
    #[serde(default)]
    datetime: u64,
    txid: String,
    /// Signed: negative for spends, including the fee.
    amount: i64,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    memo: Option<String>,
    #[serde(default)]
    outgoing_metadata: Vec<OutgoingEntry>,
}

#[derive(Deserialize)]
struct AddressesResponse {
    #[serde(default)]
    z_addresses: Vec<String>,
    #[serde(default)]
    t_addresses: Vec<String>,
}

#[derive(Serialize)]
struct SendArg<'a> {
    address: &'a str,
    amount: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    memo: Option<&'a str>,
}

#[derive(Deserialize)]
struct SendResponse {
    txid: String,
}

#[derive(Deserialize)]
struct HeightResponse {
    height: u32,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct InfoResponse {
    version: String,
    vendor: String,
    chain_name: String,
    latest_block_height: u32,
    server_uri: String,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct SyncStatusResponse {
    in_progress: bool,
    synced_blocks: u32,
    total_blocks: u32,
}

/// A wallet engine that delegates to a lite client.
pub struct LiteClientEngine<X> {
    executor: X,
    server_uri: String,
}

impl<X: CommandExecutor> LiteClientEngine<X> {
    /// Creates an engine for a lite client connected to [`DEFAULT_SERVER_URI`].
    pub fn new(executor: X) -> Self {
        LiteClientEngine {
            executor,
            server_uri: DEFAULT_SERVER_URI.to_string(),
        }
    }

    /// Creates an engine for a lite client connected to the configured server.
    pub fn from_config(executor: X, config: &WalletConfig) -> Self {
        LiteClientEngine {
            executor,
            server_uri: config.server_uri.clone(),
        }
    }

    pub fn executor(&self) -> &X {
        &self.executor
    }

    /// The lightwalletd server the lite client was pointed at.
    pub fn server_uri(&self) -> &str {
        &self.server_uri
    }

    async fn call<T: DeserializeOwned>(&self, command: &str, args: &str) -> Result<T, LiteError> {
        trace!("lite-client command {} {}", command, args);
        let response = self.executor.execute(command, args).await;
        decode(command, &response)
    }

    async fn tip(&self) -> Result<BlockHeight, LiteError> {
        let height: HeightResponse = self.call("height", "").await?;
        Ok(BlockHeight::from_u32(height.height))
    }

    async fn list(&self) -> Result<Vec<ListEntry>, LiteError> {
        self.call("list", "").await
    }
}

fn decode<T: DeserializeOwned>(command: &str, response: &str) -> Result<T, LiteError> {
    let json_error = |source| LiteError::Json {
        command: command.to_string(),
        source,
    };
    let value: serde_json::Value = serde_json::from_str(response).map_err(json_error)?;
    // Only an object carrying a string `error` is a rejection. Other responses, such as the
    // address array returned by `new`, are decoded as-is.
    if let Some(error) = value.get("error").and_then(serde_json::Value::as_str) {
        debug!("lite-client {} rejected: {}", command, error);
        return Err(LiteError::Rejected {
            command: command.to_string(),
            message: error.to_string(),
        });
    }
    serde_json::from_value(value).map_err(json_error)
}

fn zats(value: u64) -> Result<Zatoshis, LiteError> {
    Ok(Zatoshis::from_u64(value)?)
}

/// Folds `list` entries into one transaction per txid.
///
/// A transaction that pays several of the wallet's notes appears once per note.
fn transactions_from_list(
    entries: Vec<ListEntry>,
    tip: BlockHeight,
) -> Result<Vec<Transaction>, LiteError> {
    let mut by_txid: BTreeMap<TxId, Transaction> = BTreeMap::new();
    let mut order = vec![];

    for entry in entries {
        let txid: TxId = entry.txid.parse()?;
        let block_height = (!entry.unconfirmed && entry.block_height > 0)
            .then(|| BlockHeight::from_u32(entry.block_height));
        let confirmations = block_height.map_or(0, |h| h.confirmations_at(tip));

        let mut tx = if entry.amount < 0 {
            let spent = zats(entry.amount.unsigned_abs())?;
            let outputs = entry
                .outgoing_metadata
                .iter()
                .map(|o| zats(o.value))
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .sum::<Option<Zatoshis>>()
                .ok_or(BalanceError::Overflow)?;
            let amount = if entry.outgoing_metadata.is_empty() {
                spent
            } else {
                outputs
            };
            let mut tx = Transaction::new(txid, TxType::Sent, amount, entry.datetime);
            tx.fee = spent.saturating_sub(amount);
            let first = entry.outgoing_metadata.first();
            tx.to_address = first.map(|o| o.address.clone());
            tx.memo = first.and_then(|o| o.memo.clone());
            tx
        } else {
            let mut tx = Transaction::new(
                txid,
                TxType::Received,
                zats(entry.amount.unsigned_abs())?,
                entry.datetime,
            );
            // The lite client reports the receiving address.
            tx.to_address = entry.address;
            tx.memo = entry.memo;
            tx
        };

        tx.block_height = block_height;
        tx.confirmations = confirmations;

        match by_txid.get_mut(&txid) {
            Some(existing) if existing.tx_type == tx.tx_type => {
                existing.amount = (existing.amount + tx.amount).ok_or(BalanceError::Overflow)?;
                if existing.memo_text().is_none() {
                    existing.memo = tx.memo;
                }
            }
            Some(existing) if tx.is_sent() => {
                // The change entry was listed before the spend it belongs to.
                trace!("Replacing change entry for {} with its spend", txid);
                *existing = tx;
            }
            Some(_) => {
                // Change notes returning to the wallet are part of the send.
                trace!("Ignoring change entry for {}", txid);
            }
            None => {
                order.push(txid);
                by_txid.insert(txid, tx);
            }
        }
    }

    Ok(order
        .into_iter()
        .filter_map(|txid| by_txid.remove(&txid))
        .collect())
}

/// Sums unmined value received from other wallets. Change outputs of the wallet's own sends
/// are excluded.
fn pure_incoming(entries: &[ListEntry]) -> Result<Zatoshis, LiteError> {
    let own_sends: Vec<&str> = entries
        .iter()
        .filter(|e| e.amount < 0)
        .map(|e| e.txid.as_str())
        .collect();
    entries
        .iter()
        .filter(|e| e.unconfirmed && e.amount > 0 && !own_sends.contains(&e.txid.as_str()))
        .map(|e| zats(e.amount.unsigned_abs()))
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .sum::<Option<Zatoshis>>()
        .ok_or_else(|| BalanceError::Overflow.into())
}

#[async_trait]
impl<X: CommandExecutor> WalletEngine for LiteClientEngine<X> {
    type Error = LiteError;

    async fn sync(&self) -> Result<(), Self::Error> {
        let _: serde_json::Value = self.call("sync", "").await?;
        Ok(())
    }

    /// Transparent funds count as spendable: the lite client shields them as part of a send.
    async fn balance(&self) -> Result<Balance, Self::Error> {
        let b: BalanceResponse = self.call("balance", "").await?;
        let total = zats(b.zbalance)?;
        let transparent = zats(b.tbalance)?;
        let spendable = (zats(b.spendable_zbalance)? + transparent).ok_or(BalanceError::Overflow)?;
        let total = (total + transparent).ok_or(BalanceError::Overflow)?;

        let unconfirmed_incoming = pure_incoming(&self.list().await?)?;

        Ok(Balance::new(spendable, total)?
            .with_transparent(transparent)
            .with_unverified(zats(b.unverified_zbalance)?)
            .with_unconfirmed(zats(b.zbalance.saturating_sub(b.verified_zbalance))?)
            .with_pure_incoming(unconfirmed_incoming))
    }

    async fn transactions(&self) -> Result<Vec<Transaction>, Self::Error> {
        let tip = self.tip().await?;
        transactions_from_list(self.list().await?, tip)
    }

    async fn addresses(&self) -> Result<Vec<WalletAddress>, Self::Error> {
        let a: AddressesResponse = self.call("addresses", "").await?;
        a.t_addresses
            .iter()
            .chain(a.z_addresses.iter())
            .map(|s| {
                WalletAddress::from_encoded(s).ok_or_else(|| LiteError::Malformed {
                    command: "addresses".to_string(),
                    reason: format!("unrecognized address {s}"),
                })
            })
            .collect()
    }

    async fn generate_new_address(&self, kind: AddressKind) -> Result<WalletAddress, Self::Error> {
        let created: Vec<String> = self.call("new", kind.command_arg()).await?;
        let malformed = |reason: String| LiteError::Malformed {
            command: "new".to_string(),
            reason,
        };
        let encoded = created
            .first()
            .ok_or_else(|| malformed("no address returned".to_string()))?;
        match WalletAddress::from_encoded(encoded) {
            Some(address) if address.kind == kind => Ok(address),
            _ => Err(malformed(format!("expected a {kind} address, got {encoded}"))),
        }
    }

    async fn send_transaction(
        &self,
        to: &str,
        amount: Zatoshis,
        memo: Option<&Memo>,
    ) -> Result<TxId, Self::Error> {
        let args = serde_json::to_string(&[SendArg {
            address: to,
            amount: amount.into_u64(),
            memo: memo.map(|m| m.as_str()),
        }])
        .map_err(|source| LiteError::Json {
            command: "send".to_string(),
            source,
        })?;
        let response: SendResponse = self.call("send", &args).await?;
        Ok(response.txid.parse()?)
    }

    async fn chain_height(&self) -> Result<BlockHeight, Self::Error> {
        self.tip().await
    }

    async fn server_info(&self) -> Result<ServerInfo, Self::Error> {
        let info: InfoResponse = self.call("info", "").await?;
        // Older lite clients leave the server out of `info`.
        let server_uri = if info.server_uri.is_empty() {
            self.server_uri.clone()
        } else {
            info.server_uri
        };
        Ok(ServerInfo::new(
            info.version,
            info.vendor,
            info.chain_name,
            BlockHeight::from_u32(info.latest_block_height),
            server_uri,
        ))
    }

    async fn sync_status(&self) -> Result<Option<SyncStatus>, Self::Error> {
        let s: SyncStatusResponse = self.call("syncstatus", "").await?;
        Ok(Some(SyncStatus::new(
            s.synced_blocks,
            s.total_blocks,
            s.in_progress,
        )))
    }
}
