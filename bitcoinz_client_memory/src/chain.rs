//! The simulated chain and wallet tables.

use std::collections::BTreeMap;

use bitcoinz_client_backend::wallet::{Balance, Transaction, TxType, WalletAddress};
use bitcoinz_protocol::{
    address::AddressKind,
    value::{BalanceError, Zatoshis},
    BlockHeight, TxId,
};

use crate::error::{Error, Result};

/// Seconds between simulated blocks.
pub const BLOCK_INTERVAL: u64 = 150;

/// A transaction as stored by the simulated wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TxRecord {
    pub(crate) txid: TxId,
    pub(crate) direction: TxType,
    pub(crate) amount: Zatoshis,
    pub(crate) fee: Zatoshis,
    /// For received transactions, the wallet address paid. For sends, the recipient.
    pub(crate) address: String,
    pub(crate) memo: Option<String>,
    pub(crate) created_at: u64,
    pub(crate) mined_height: Option<BlockHeight>,
    pub(crate) expiry_height: BlockHeight,
    /// How much of a send was drawn from transparent funds.
    pub(crate) transparent_part: Zatoshis,
    /// Set when the transaction is evicted from the simulated mempool.
    pub(crate) dropped: bool,
}

impl TxRecord {
    fn is_expired(&self, tip: BlockHeight) -> bool {
        self.mined_height.is_none() && tip > self.expiry_height
    }

    fn is_live(&self, tip: BlockHeight) -> bool {
        !self.dropped && !self.is_expired(tip)
    }

    /// The value the transaction removed from the wallet, fee included.
    fn debit(&self) -> Zatoshis {
        (self.amount + self.fee).unwrap_or(self.amount)
    }
}

#[derive(Debug)]
pub(crate) struct MemoryDb {
    pub(crate) seed: [u8; 32],
    pub(crate) tip: BlockHeight,
    pub(crate) genesis_time: u64,
    pub(crate) min_confirmations: u32,
    pub(crate) addresses: Vec<WalletAddress>,
    pub(crate) next_index: BTreeMap<AddressKind, u32>,
    pub(crate) txs: Vec<TxRecord>,
    pub(crate) nonce: u64,
}

impl MemoryDb {
    pub(crate) fn new(seed: [u8; 32], tip: BlockHeight, genesis_time: u64) -> Self {
        MemoryDb {
            seed,
            tip,
            genesis_time,
            min_confirmations: 1,
            addresses: vec![],
            next_index: BTreeMap::new(),
            txs: vec![],
            nonce: 0,
        }
    }

    pub(crate) fn now(&self) -> u64 {
        self.genesis_time + u64::from(u32::from(self.tip)) * BLOCK_INTERVAL
    }

    pub(crate) fn owned(&self, address: &str) -> Option<&WalletAddress> {
        self.addresses.iter().find(|a| a.address == address)
    }

    pub(crate) fn record(&self, txid: &TxId) -> Result<&TxRecord> {
        self.txs
            .iter()
            .find(|r| &r.txid == txid)
            .ok_or(Error::TransactionNotFound(*txid))
    }

    pub(crate) fn record_mut(&mut self, txid: &TxId) -> Result<&mut TxRecord> {
        self.txs
            .iter_mut()
            .find(|r| &r.txid == txid)
            .ok_or(Error::TransactionNotFound(*txid))
    }

    fn received_kind(&self, record: &TxRecord) -> AddressKind {
        self.owned(&record.address)
            .map_or(AddressKind::Shielded, |a| a.kind)
    }

    /// Advances the tip by `blocks`, mining every live unmined transaction into the first
    /// new block.
    pub(crate) fn mine(&mut self, blocks: u32) -> BlockHeight {
        if blocks == 0 {
            return self.tip;
        }
        let next = self.tip.saturating_add(1);
        for record in self.txs.iter_mut() {
            if record.mined_height.is_none() && !record.dropped && next <= record.expiry_height {
                record.mined_height = Some(next);
            }
        }
        self.tip = self.tip.saturating_add(blocks);
        self.tip
    }

    /// Rewinds the tip by `depth` blocks, returning transactions mined above the new tip to
    /// the mempool.
    pub(crate) fn rewind(&mut self, depth: u32) -> Result<BlockHeight> {
        let tip = u32::from(self.tip);
        let new_tip = tip.checked_sub(depth).ok_or(Error::InvalidRewind { depth, tip })?;
        let new_tip = BlockHeight::from_u32(new_tip);
        for record in self.txs.iter_mut() {
            if record.mined_height.is_some_and(|h| h > new_tip) {
                record.mined_height = None;
            }
        }
        self.tip = new_tip;
        Ok(new_tip)
    }

    fn confirmations(&self, record: &TxRecord) -> u32 {
        record
            .mined_height
            .map_or(0, |h| h.confirmations_at(self.tip))
    }

    pub(crate) fn balance(&self) -> Result<Balance> {
        let mut received_total = Zatoshis::ZERO;
        let mut verified = Zatoshis::ZERO;
        let mut unverified = Zatoshis::ZERO;
        let mut unconfirmed = Zatoshis::ZERO;
        let mut transparent_in = Zatoshis::ZERO;
        let mut debits = Zatoshis::ZERO;
        let mut transparent_out = Zatoshis::ZERO;

        let add = |a: Zatoshis, b: Zatoshis| (a + b).ok_or(Error::Balance(BalanceError::Overflow));

        for record in self.txs.iter().filter(|r| r.is_live(self.tip)) {
            match record.direction {
                TxType::Received => {
                    received_total = add(received_total, record.amount)?;
                    let confirmations = self.confirmations(record);
                    if confirmations == 0 {
                        unconfirmed = add(unconfirmed, record.amount)?;
                    } else if confirmations < self.min_confirmations {
                        unverified = add(unverified, record.amount)?;
                    } else {
                        verified = add(verified, record.amount)?;
                    }
                    if self.received_kind(record) == AddressKind::Transparent {
                        transparent_in = add(transparent_in, record.amount)?;
                    }
                }
                TxType::Sent => {
                    debits = add(debits, record.debit())?;
                    transparent_out = add(transparent_out, record.transparent_part)?;
                }
            }
        }

        let total = received_total.saturating_sub(debits);
        let spendable = verified.saturating_sub(debits).min(total);
        let transparent = transparent_in.saturating_sub(transparent_out).min(total);
        Ok(Balance::new(spendable, total)
            .map_err(|_| Error::Balance(BalanceError::Underflow))?
            .with_transparent(transparent)
            .with_unconfirmed(unconfirmed)
            .with_unverified(unverified)
            .with_pure_incoming(unconfirmed))
    }

    /// Splits a debit between the shielded and transparent pools, shielded first.
    pub(crate) fn transparent_share(&self, debit: Zatoshis) -> Result<Zatoshis> {
        let balance = self.balance()?;
        let shielded_spendable = balance.spendable().saturating_sub(balance.transparent());
        Ok(debit.saturating_sub(shielded_spendable).min(balance.transparent()))
    }

    pub(crate) fn transactions(&self) -> Vec<Transaction> {
        self.txs
            .iter()
            .filter(|r| !r.dropped)
            .map(|r| {
                let mut tx = Transaction::new(r.txid, r.direction, r.amount, r.created_at);
                tx.fee = r.fee;
                tx.memo = r.memo.clone();
                tx.block_height = r.mined_height;
                tx.confirmations = self.confirmations(r);
                tx.expiry_height = Some(r.expiry_height);
                tx.failed = r.is_expired(self.tip);
                tx.to_address = Some(r.address.clone());
                tx
            })
            .collect()
    }
}
