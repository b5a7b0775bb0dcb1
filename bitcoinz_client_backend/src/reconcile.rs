//! Merging engine snapshots into the wallet's transaction ledger.
//!
//! The engine reports its full transaction list on every sync. The [`Ledger`] folds each
//! snapshot into what the wallet already knows, subject to these rules:
//!
//! - Transactions are keyed by txid and never removed.
//! - A transaction's confirmation count never decreases. A snapshot that reports fewer
//!   confirmations than already seen (for example, from a lagging server) is clamped.
//! - Sends broadcast by this wallet are tracked as local pending transactions until the
//!   engine reports them. An unmined send that is missing from the snapshot once the chain
//!   passes its expiry height is marked failed.

use tracing::{debug, info, warn};

use bitcoinz_protocol::{BlockHeight, TxId, CONFIRMATION_DEPTH};

use crate::wallet::Transaction;

/// What changed in the ledger as the result of a merge.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Transactions seen for the first time.
    pub added: Vec<TxId>,
    /// Transactions that reached the confirmation depth during this merge.
    pub confirmed: Vec<TxId>,
    /// Local sends that expired without being mined.
    pub expired: Vec<TxId>,
    /// The number of snapshot entries whose confirmation count was clamped.
    pub regressions: usize,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.confirmed.is_empty()
            && self.expired.is_empty()
            && self.regressions == 0
    }
}

/// The wallet's view of its transactions, newest first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Ledger {
    transactions: Vec<Transaction>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// All known transactions, sorted by descending timestamp.
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn get(&self, txid: &TxId) -> Option<&Transaction> {
        self.transactions.iter().find(|tx| &tx.txid == txid)
    }

    /// Records a send that the wallet has just broadcast.
    ///
    /// Returns `false` without changing anything if the txid is already known.
    pub fn insert_pending_send(&mut self, mut tx: Transaction) -> bool {
        if self.get(&tx.txid).is_some() {
            return false;
        }
        tx.local_pending = true;
        tx.confirmations = 0;
        tx.block_height = None;
        self.transactions.push(tx);
        self.sort();
        true
    }

    /// Folds an engine snapshot taken at chain tip `tip` into the ledger.
    pub fn merge(&mut self, incoming: Vec<Transaction>, tip: BlockHeight) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let reported: Vec<TxId> = incoming.iter().map(|tx| tx.txid).collect();

        for tx in incoming {
            match self.transactions.iter_mut().find(|t| t.txid == tx.txid) {
                Some(existing) => {
                    let was_confirmed = existing.confirmations >= CONFIRMATION_DEPTH;
                    if merge_one(existing, tx) {
                        report.regressions += 1;
                    }
                    if !was_confirmed && existing.confirmations >= CONFIRMATION_DEPTH {
                        report.confirmed.push(existing.txid);
                    }
                }
                None => {
                    debug!("New transaction {}", tx.txid);
                    report.added.push(tx.txid);
                    if tx.confirmations >= CONFIRMATION_DEPTH {
                        report.confirmed.push(tx.txid);
                    }
                    self.transactions.push(tx);
                }
            }
        }

        for tx in self.transactions.iter_mut() {
            // Mined transactions the snapshot omitted still deepen with the chain.
            if let Some(height) = tx.block_height {
                let depth = height.confirmations_at(tip);
                if depth > tx.confirmations {
                    let was_confirmed = tx.confirmations >= CONFIRMATION_DEPTH;
                    tx.confirmations = depth;
                    if !was_confirmed
                        && depth >= CONFIRMATION_DEPTH
                        && !report.confirmed.contains(&tx.txid)
                    {
                        report.confirmed.push(tx.txid);
                    }
                }
            }

            let unmined_send = tx.is_sent() && tx.block_height.is_none() && tx.confirmations == 0;
            if unmined_send && !tx.failed && !reported.contains(&tx.txid) {
                if let Some(expiry) = tx.expiry_height {
                    if tip > expiry {
                        info!(
                            "Pending send {} expired at height {} (tip {})",
                            tx.txid, expiry, tip
                        );
                        tx.failed = true;
                        report.expired.push(tx.txid);
                    }
                }
            }
        }

        self.sort();
        report
    }

    fn sort(&mut self) {
        self.transactions
            .sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    }
}

/// Updates `existing` from a newer report of the same transaction. Returns `true` if the
/// report's confirmation count was lower than already recorded.
fn merge_one(existing: &mut Transaction, reported: Transaction) -> bool {
    let regressed = reported.confirmations < existing.confirmations;
    if regressed {
        warn!(
            "Engine reported {} confirmations for {} after {} were seen; keeping {}",
            reported.confirmations, existing.txid, existing.confirmations, existing.confirmations
        );
    }

    let confirmations = existing.confirmations.max(reported.confirmations);
    let block_height = if regressed {
        existing.block_height.or(reported.block_height)
    } else {
        reported.block_height.or(existing.block_height)
    };

    // Locally known details survive when the engine omits them.
    let memo = reported.memo.or_else(|| existing.memo.take());
    let from_address = reported.from_address.or_else(|| existing.from_address.take());
    let to_address = reported.to_address.or_else(|| existing.to_address.take());

    *existing = Transaction {
        confirmations,
        block_height,
        memo,
        from_address,
        to_address,
        local_pending: false,
        expiry_height: reported.expiry_height.or(existing.expiry_height),
        ..reported
    };
    regressed
}

#[cfg(test)]
mod tests {
    use proptest::collection::vec;
    use proptest::prelude::*;

    use bitcoinz_protocol::{value::Zatoshis, BlockHeight, TxId};

    use super::Ledger;
    use crate::wallet::{testing::arb_transaction, Transaction, TxStatus, TxType};

    fn tx(n: u8, confirmations: u32, timestamp: u64) -> Transaction {
        let mut tx = Transaction::new(
            TxId::from_bytes([n; 32]),
            TxType::Received,
            Zatoshis::const_from_u64(1_000),
            timestamp,
        );
        tx.confirmations = confirmations;
        tx
    }

    #[test]
    fn merge_adds_and_sorts() {
        let mut ledger = Ledger::new();
        let report = ledger.merge(vec![tx(1, 0, 10), tx(2, 7, 20)], BlockHeight::from_u32(100));
        assert_eq!(report.added.len(), 2);
        assert_eq!(report.confirmed, vec![TxId::from_bytes([2; 32])]);
        let stamps: Vec<_> = ledger.transactions().iter().map(|t| t.timestamp).collect();
        assert_eq!(stamps, vec![20, 10]);
    }

    #[test]
    fn confirmations_never_regress() {
        let mut ledger = Ledger::new();
        ledger.merge(vec![tx(1, 4, 10)], BlockHeight::from_u32(100));
        let report = ledger.merge(vec![tx(1, 2, 10)], BlockHeight::from_u32(100));
        assert_eq!(report.regressions, 1);
        assert_eq!(ledger.get(&TxId::from_bytes([1; 32])).unwrap().confirmations, 4);
    }

    #[test]
    fn transactions_are_never_deleted() {
        let mut ledger = Ledger::new();
        ledger.merge(vec![tx(1, 1, 10), tx(2, 1, 20)], BlockHeight::from_u32(100));
        let report = ledger.merge(vec![], BlockHeight::from_u32(101));
        assert!(report.is_empty());
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn mined_transactions_deepen_with_tip() {
        let mut ledger = Ledger::new();
        let mut mined = tx(1, 1, 10);
        mined.block_height = Some(BlockHeight::from_u32(100));
        ledger.merge(vec![mined], BlockHeight::from_u32(100));

        let report = ledger.merge(vec![], BlockHeight::from_u32(105));
        let stored = ledger.get(&TxId::from_bytes([1; 32])).unwrap();
        assert_eq!(stored.confirmations, 6);
        assert_eq!(stored.status(), TxStatus::Confirmed);
        assert_eq!(report.confirmed, vec![TxId::from_bytes([1; 32])]);
    }

    #[test]
    fn pending_send_is_replaced_when_reported() {
        let mut ledger = Ledger::new();
        let mut pending = tx(1, 0, 10);
        pending.tx_type = TxType::Sent;
        pending.memo = Some("thanks".into());
        pending.to_address = Some("t1Recipient".into());
        pending.expiry_height = Some(BlockHeight::from_u32(140));
        assert!(ledger.insert_pending_send(pending.clone()));
        assert!(!ledger.insert_pending_send(pending));

        let mut reported = tx(1, 1, 12);
        reported.tx_type = TxType::Sent;
        reported.block_height = Some(BlockHeight::from_u32(101));
        let report = ledger.merge(vec![reported], BlockHeight::from_u32(101));
        assert!(report.added.is_empty());

        let stored = ledger.get(&TxId::from_bytes([1; 32])).unwrap();
        assert!(!stored.local_pending);
        assert_eq!(stored.confirmations, 1);
        assert_eq!(stored.timestamp, 12);
        assert_eq!(stored.memo.as_deref(), Some("thanks"));
        assert_eq!(stored.to_address.as_deref(), Some("t1Recipient"));
    }

    #[test]
    fn unreported_pending_send_expires() {
        let mut ledger = Ledger::new();
        let mut pending = tx(1, 0, 10);
        pending.tx_type = TxType::Sent;
        pending.expiry_height = Some(BlockHeight::from_u32(140));
        ledger.insert_pending_send(pending);

        assert!(ledger.merge(vec![], BlockHeight::from_u32(140)).expired.is_empty());
        let report = ledger.merge(vec![], BlockHeight::from_u32(141));
        assert_eq!(report.expired, vec![TxId::from_bytes([1; 32])]);
        assert_eq!(
            ledger.get(&TxId::from_bytes([1; 32])).unwrap().status(),
            TxStatus::Failed
        );

        // Expiry is reported once.
        assert!(ledger.merge(vec![], BlockHeight::from_u32(142)).expired.is_empty());
    }

    #[test]
    fn reported_send_that_disappears_expires() {
        let mut ledger = Ledger::new();
        let mut send = tx(1, 0, 10);
        send.tx_type = TxType::Sent;
        send.expiry_height = Some(BlockHeight::from_u32(140));
        ledger.merge(vec![send.clone()], BlockHeight::from_u32(100));

        // Still reported by the engine, so it is left alone.
        assert!(ledger.merge(vec![send], BlockHeight::from_u32(141)).expired.is_empty());
        let report = ledger.merge(vec![], BlockHeight::from_u32(141));
        assert_eq!(report.expired, vec![TxId::from_bytes([1; 32])]);
    }

    proptest! {
        #[test]
        fn merging_is_monotonic(
            first in vec(arb_transaction(), 0..10),
            second in vec(arb_transaction(), 0..10),
        ) {
            let tip = BlockHeight::from_u32(1000);
            let mut ledger = Ledger::new();
            ledger.merge(first.clone(), tip);
            let before = ledger.clone();
            ledger.merge(second, tip);

            for tx in before.transactions() {
                let after = ledger.get(&tx.txid);
                prop_assert!(after.is_some());
                prop_assert!(after.map_or(0, |t| t.confirmations) >= tx.confirmations);
            }
            for pair in ledger.transactions().windows(2) {
                prop_assert!(pair[0].timestamp >= pair[1].timestamp);
            }
        }
    }
}
