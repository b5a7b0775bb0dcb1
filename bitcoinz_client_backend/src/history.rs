//! Filtering, paging and summary views over the transaction history.

use std::collections::BTreeMap;

use bitcoinz_protocol::{value::Zatoshis, CONFIRMATION_DEPTH};

use crate::wallet::{Transaction, TxStatus, TxType};

/// A coarse transaction category selected in the history view.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TransactionFilter {
    #[default]
    All,
    Sent,
    Received,
    /// Transactions that are neither confirmed nor failed.
    Confirming,
}

impl TransactionFilter {
    pub fn matches(self, tx: &Transaction) -> bool {
        match self {
            TransactionFilter::All => true,
            TransactionFilter::Sent => tx.tx_type == TxType::Sent,
            TransactionFilter::Received => tx.tx_type == TxType::Received,
            TransactionFilter::Confirming => tx.status() == TxStatus::Confirming,
        }
    }
}

/// Returns the transactions matching both the search text and the filter, in their original
/// order.
///
/// The search is a case-insensitive substring match against the txid, the from and to
/// addresses and the memo. Surrounding whitespace in `search` is ignored and an empty search
/// matches everything.
pub fn filter_transactions(
    transactions: &[Transaction],
    search: &str,
    filter: TransactionFilter,
) -> Vec<Transaction> {
    let needle = search.trim().to_lowercase();
    transactions
        .iter()
        .filter(|tx| filter.matches(tx) && tx.matches_lowercase(&needle))
        .cloned()
        .collect()
}

/// Renders a confirmation count for display.
///
/// `0` is "Unconfirmed", counts below the confirmation depth show progress toward it, and
/// deeper counts are shown as a plain number.
pub fn confirmation_text(confirmations: u32) -> String {
    match confirmations {
        0 => "Unconfirmed".to_string(),
        n if n < CONFIRMATION_DEPTH => format!("Confirming... ({}/{})", n, CONFIRMATION_DEPTH),
        n => n.to_string(),
    }
}

/// Counts and totals over a transaction list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransactionStats {
    pub total: u64,
    pub sent: u64,
    pub received: u64,
    pub confirming: u64,
    pub failed: u64,
    pub with_memo: u64,
    pub total_sent: Zatoshis,
    pub total_received: Zatoshis,
}

impl TransactionStats {
    pub fn from_transactions<'a>(transactions: impl IntoIterator<Item = &'a Transaction>) -> Self {
        transactions
            .into_iter()
            .fold(TransactionStats::default(), |mut stats, tx| {
                stats.total += 1;
                match tx.tx_type {
                    TxType::Sent => {
                        stats.sent += 1;
                        if !tx.failed {
                            stats.total_sent =
                                (stats.total_sent + tx.amount).unwrap_or(stats.total_sent);
                        }
                    }
                    TxType::Received => {
                        stats.received += 1;
                        if !tx.failed {
                            stats.total_received = (stats.total_received + tx.amount)
                                .unwrap_or(stats.total_received);
                        }
                    }
                }
                match tx.status() {
                    TxStatus::Confirming => stats.confirming += 1,
                    TxStatus::Failed => stats.failed += 1,
                    TxStatus::Confirmed => {}
                }
                if tx.has_memo() {
                    stats.with_memo += 1;
                }
                stats
            })
    }

    /// Returns the counts keyed by name. Totals are in zatoshis.
    pub fn to_map(&self) -> BTreeMap<String, u64> {
        [
            ("total", self.total),
            ("sent", self.sent),
            ("received", self.received),
            ("confirming", self.confirming),
            ("failed", self.failed),
            ("with_memo", self.with_memo),
            ("total_sent", self.total_sent.into_u64()),
            ("total_received", self.total_received.into_u64()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}

/// Returns the `limit` most recent transactions, newest first.
pub fn recent(transactions: &[Transaction], limit: usize) -> Vec<Transaction> {
    let mut sorted = transactions.to_vec();
    sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    sorted.truncate(limit);
    sorted
}

/// A window over a list that grows one page at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pager {
    page_size: usize,
    pages: usize,
}

impl Pager {
    /// Creates a pager showing the first page. A zero page size is treated as one.
    pub fn new(page_size: usize) -> Self {
        Pager {
            page_size: page_size.max(1),
            pages: 1,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// The number of items currently revealed, before clamping to the list length.
    pub fn limit(&self) -> usize {
        self.page_size.saturating_mul(self.pages)
    }

    pub fn visible<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        &items[..items.len().min(self.limit())]
    }

    pub fn has_more(&self, total: usize) -> bool {
        total > self.limit()
    }

    /// Reveals the next page. Returns `false` if everything was already visible.
    pub fn load_more(&mut self, total: usize) -> bool {
        if self.has_more(total) {
            self.pages += 1;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.pages = 1;
    }
}
