//! The memo inbox: transactions that carry a message.

use crate::wallet::{Transaction, TxType};

/// The read state assumed for a memo that has never been marked.
///
/// Memos the wallet sent were written by the user and start out read. Received memos start
/// out unread.
pub fn default_read_status(tx: &Transaction) -> bool {
    tx.tx_type == TxType::Sent
}

/// Returns the transactions with a non-empty memo, newest first.
///
/// The sort is stable: transactions with equal timestamps keep their relative order.
pub fn memo_messages(transactions: &[Transaction]) -> Vec<Transaction> {
    let mut messages: Vec<Transaction> = transactions
        .iter()
        .filter(|tx| tx.has_memo())
        .cloned()
        .collect();
    messages.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    messages
}

/// Which messages the inbox shows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MessageFilter {
    #[default]
    All,
    Unread,
    Read,
    Sent,
    Received,
}

/// Applies a [`MessageFilter`], looking up read state through `is_read`.
pub fn filter_messages<F>(
    messages: &[Transaction],
    filter: MessageFilter,
    is_read: F,
) -> Vec<Transaction>
where
    F: Fn(&Transaction) -> bool,
{
    messages
        .iter()
        .filter(|tx| match filter {
            MessageFilter::All => true,
            MessageFilter::Unread => !is_read(tx),
            MessageFilter::Read => is_read(tx),
            MessageFilter::Sent => tx.tx_type == TxType::Sent,
            MessageFilter::Received => tx.tx_type == TxType::Received,
        })
        .cloned()
        .collect()
}

pub fn unread_count<F>(messages: &[Transaction], is_read: F) -> usize
where
    F: Fn(&Transaction) -> bool,
{
    messages.iter().filter(|tx| !is_read(tx)).count()
}

#[cfg(test)]
mod tests {
    use proptest::collection::vec;
    use proptest::prelude::*;

    use bitcoinz_protocol::{value::Zatoshis, TxId};

    use super::{default_read_status, filter_messages, memo_messages, unread_count, MessageFilter};
    use crate::wallet::{testing::arb_transaction, Transaction, TxType};

    fn msg(n: u8, tx_type: TxType, timestamp: u64, memo: Option<&str>) -> Transaction {
        let mut tx =
            Transaction::new(TxId::from_bytes([n; 32]), tx_type, Zatoshis::ZERO, timestamp);
        tx.memo = memo.map(String::from);
        tx
    }

    #[test]
    fn only_non_empty_memos_newest_first() {
        let txs = vec![
            msg(1, TxType::Received, 10, Some("first")),
            msg(2, TxType::Received, 30, None),
            msg(3, TxType::Sent, 20, Some("  ")),
            msg(6, TxType::Sent, 25, Some("")),
            msg(4, TxType::Sent, 40, Some("latest")),
            msg(5, TxType::Received, 10, Some("tie")),
        ];
        let memos: Vec<_> = memo_messages(&txs)
            .iter()
            .map(|t| t.memo.clone().unwrap_or_default())
            .collect();
        assert_eq!(memos, vec!["latest", "  ", "first", "tie"]);
    }

    #[test]
    fn read_filters_use_lookup() {
        let txs = vec![
            msg(1, TxType::Received, 1, Some("a")),
            msg(2, TxType::Sent, 2, Some("b")),
            msg(3, TxType::Received, 3, Some("c")),
        ];
        let is_read =
            |tx: &Transaction| tx.txid == TxId::from_bytes([3; 32]) || default_read_status(tx);

        assert_eq!(unread_count(&txs, is_read), 1);
        assert_eq!(
            filter_messages(&txs, MessageFilter::Unread, is_read),
            vec![txs[0].clone()]
        );
        assert_eq!(filter_messages(&txs, MessageFilter::Read, is_read).len(), 2);
        assert_eq!(
            filter_messages(&txs, MessageFilter::Sent, is_read),
            vec![txs[1].clone()]
        );
        assert_eq!(filter_messages(&txs, MessageFilter::All, is_read), txs);
    }

    proptest! {
        #[test]
        fn memo_sort_is_stable_and_descending(txs in vec(arb_transaction(), 0..30)) {
            let sorted = memo_messages(&txs);
            for pair in sorted.windows(2) {
                prop_assert!(pair[0].timestamp >= pair[1].timestamp);
                if pair[0].timestamp == pair[1].timestamp {
                    let pos = |t: &Transaction| txs.iter().position(|x| x == t);
                    prop_assert!(pos(&pair[0]) < pos(&pair[1]));
                }
            }
            prop_assert!(sorted.iter().all(|t| t.has_memo()));
            prop_assert_eq!(sorted.len(), txs.iter().filter(|t| t.has_memo()).count());
        }
    }
}
