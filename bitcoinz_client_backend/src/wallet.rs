//! Structs representing transactions, addresses, balances and user annotations as the wallet
//! presents them.

use serde::{Deserialize, Serialize};

use bitcoinz_protocol::{
    address::AddressKind, value::Zatoshis, BlockHeight, TxId, CONFIRMATION_DEPTH,
};

/// The direction of a transaction relative to the wallet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxType {
    Sent,
    Received,
}

/// The lifecycle status of a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    /// Seen in the mempool or mined with fewer than [`CONFIRMATION_DEPTH`] confirmations.
    Confirming,
    /// Mined with at least [`CONFIRMATION_DEPTH`] confirmations.
    Confirmed,
    /// Rejected by the engine, or expired before being mined.
    Failed,
}

/// A ledger event that sent funds from or delivered funds to the wallet.
///
/// Transactions are created when the engine detects them (or locally, when the wallet
/// broadcasts a send) and are never deleted. Their confirmation count only grows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub txid: TxId,
    pub tx_type: TxType,
    /// The value moved to or from the wallet, excluding the fee.
    pub amount: Zatoshis,
    pub fee: Zatoshis,
    /// Seconds since the Unix epoch at which the transaction was first seen or mined.
    pub timestamp: u64,
    pub confirmations: u32,
    pub block_height: Option<BlockHeight>,
    pub memo: Option<String>,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub failed: bool,
    /// Set for sends broadcast by this wallet that the engine has not yet reported.
    #[serde(default)]
    pub local_pending: bool,
    /// The height after which an unmined send can no longer be mined.
    #[serde(default)]
    pub expiry_height: Option<BlockHeight>,
}

impl Transaction {
    /// Constructs an unmined transaction with no memo or counterparty.
    pub fn new(txid: TxId, tx_type: TxType, amount: Zatoshis, timestamp: u64) -> Self {
        Transaction {
            txid,
            tx_type,
            amount,
            fee: Zatoshis::ZERO,
            timestamp,
            confirmations: 0,
            block_height: None,
            memo: None,
            from_address: None,
            to_address: None,
            failed: false,
            local_pending: false,
            expiry_height: None,
        }
    }

    pub fn status(&self) -> TxStatus {
        if self.failed {
            TxStatus::Failed
        } else if self.confirmations >= CONFIRMATION_DEPTH {
            TxStatus::Confirmed
        } else {
            TxStatus::Confirming
        }
    }

    pub fn is_sent(&self) -> bool {
        self.tx_type == TxType::Sent
    }

    /// Returns the memo text when it is present and not blank.
    pub fn memo_text(&self) -> Option<&str> {
        self.memo
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }

    /// Whether the transaction carries a non-empty memo. A memo of only whitespace counts,
    /// though [`Transaction::memo_text`] renders it as absent.
    pub fn has_memo(&self) -> bool {
        self.memo.as_deref().is_some_and(|m| !m.is_empty())
    }

    /// The address on the other side of the transfer, if known.
    pub fn counterparty(&self) -> Option<&str> {
        match self.tx_type {
            TxType::Sent => self.to_address.as_deref(),
            TxType::Received => self.from_address.as_deref(),
        }
    }

    /// Case-insensitive substring match on the txid, addresses and memo.
    ///
    /// `needle` must already be lowercase.
    pub(crate) fn matches_lowercase(&self, needle: &str) -> bool {
        if needle.is_empty() {
            return true;
        }
        let contains = |s: &str| s.to_lowercase().contains(needle);
        contains(&self.txid.to_string())
            || self.from_address.as_deref().is_some_and(contains)
            || self.to_address.as_deref().is_some_and(contains)
            || self.memo.as_deref().is_some_and(contains)
    }
}

/// A wallet-owned receiving address. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WalletAddress {
    pub address: String,
    pub kind: AddressKind,
    /// The encoding the address was derived under (`p2pkh`, `sprout` or `sapling`).
    pub type_tag: String,
}

impl WalletAddress {
    /// Recognizes an address string, returning `None` if it is not a BitcoinZ address.
    pub fn from_encoded(address: &str) -> Option<Self> {
        let kind = AddressKind::detect(address)?;
        let type_tag = match kind {
            AddressKind::Transparent => "p2pkh",
            AddressKind::Shielded if address.starts_with("zc") => "sprout",
            AddressKind::Shielded => "sapling",
        };
        Some(WalletAddress {
            address: address.to_string(),
            kind,
            type_tag: type_tag.to_string(),
        })
    }

    pub fn is_shielded(&self) -> bool {
        self.kind.is_shielded()
    }
}

/// A user-assigned annotation on an address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressLabel {
    pub address: String,
    pub name: String,
    /// A display color in `#RRGGBB` form.
    pub color: String,
    pub category: String,
    /// Whether the address belongs to this wallet.
    pub is_owned: bool,
}

/// A user-assigned annotation on a transaction's message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageLabel {
    pub txid: TxId,
    pub name: String,
    pub color: String,
}

/// An address book entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub address: String,
    pub photo: Option<String>,
    pub favorite: bool,
    pub is_transparent: bool,
}

impl Contact {
    /// Constructs a contact, returning `None` if the name is blank or the address is not
    /// recognized.
    pub fn new(name: &str, address: &str) -> Option<Self> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let kind = AddressKind::detect(address.trim())?;
        Some(Contact {
            name: name.to_string(),
            address: address.trim().to_string(),
            photo: None,
            favorite: false,
            is_transparent: kind == AddressKind::Transparent,
        })
    }
}

/// The balance invariant `spendable ≤ total` was violated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("Spendable balance {spendable} exceeds total balance {total}")]
pub struct InvalidBalance {
    pub spendable: Zatoshis,
    pub total: Zatoshis,
}

/// A snapshot of the wallet's balance, recomputed by the engine on every sync.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    spendable: Zatoshis,
    total: Zatoshis,
    transparent: Zatoshis,
    unconfirmed: Zatoshis,
    unverified: Zatoshis,
    pure_incoming: Zatoshis,
}

impl Balance {
    /// The [`Balance`] value having zero values for all its fields.
    pub const ZERO: Self = Balance {
        spendable: Zatoshis::ZERO,
        total: Zatoshis::ZERO,
        transparent: Zatoshis::ZERO,
        unconfirmed: Zatoshis::ZERO,
        unverified: Zatoshis::ZERO,
        pure_incoming: Zatoshis::ZERO,
    };

    /// Constructs a balance with the given spendable and total values and all other
    /// components zero.
    pub fn new(spendable: Zatoshis, total: Zatoshis) -> Result<Self, InvalidBalance> {
        if spendable > total {
            return Err(InvalidBalance { spendable, total });
        }
        Ok(Balance {
            spendable,
            total,
            ..Balance::ZERO
        })
    }

    pub fn with_transparent(mut self, value: Zatoshis) -> Self {
        self.transparent = value;
        self
    }

    pub fn with_unconfirmed(mut self, value: Zatoshis) -> Self {
        self.unconfirmed = value;
        self
    }

    pub fn with_unverified(mut self, value: Zatoshis) -> Self {
        self.unverified = value;
        self
    }

    pub fn with_pure_incoming(mut self, value: Zatoshis) -> Self {
        self.pure_incoming = value;
        self
    }

    /// The value that can be spent right now.
    pub fn spendable(&self) -> Zatoshis {
        self.spendable
    }

    /// The value of all funds owned by the wallet, spendable or not.
    pub fn total(&self) -> Zatoshis {
        self.total
    }

    /// The portion of [`Self::total`] held at transparent addresses.
    pub fn transparent(&self) -> Zatoshis {
        self.transparent
    }

    /// The portion of [`Self::total`] held at shielded addresses.
    pub fn shielded(&self) -> Zatoshis {
        self.total.saturating_sub(self.transparent)
    }

    /// Value in transactions that have not been mined yet.
    pub fn unconfirmed(&self) -> Zatoshis {
        self.unconfirmed
    }

    /// Value that is mined but not yet deep enough to spend.
    pub fn unverified(&self) -> Zatoshis {
        self.unverified
    }

    /// Unmined value arriving from other wallets, excluding change from our own sends.
    pub fn pure_incoming(&self) -> Zatoshis {
        self.pure_incoming
    }
}

#[cfg(any(test, feature = "test-dependencies"))]
pub mod testing {
    use proptest::prelude::{prop_compose, prop_oneof, Just};
    use proptest::{option, strategy::Strategy};

    use bitcoinz_protocol::{txid::testing::arb_txid, value::Zatoshis, BlockHeight};

    use super::{Transaction, TxType};

    pub fn arb_tx_type() -> impl Strategy<Value = TxType> {
        prop_oneof![Just(TxType::Sent), Just(TxType::Received)]
    }

    prop_compose! {
        pub fn arb_transaction()(
            txid in arb_txid(),
            tx_type in arb_tx_type(),
            amount in 0u64..10_000_000_000,
            timestamp in 1_600_000_000u64..1_600_000_100,
            confirmations in 0u32..12,
            memo in option::of(prop_oneof![Just(String::new()), "[a-z ]{1,16}"]),
            counterparty in option::of("t1[a-z]{32}"),
        ) -> Transaction {
            let amount = Zatoshis::const_from_u64(amount);
            let mut tx = Transaction::new(txid, tx_type, amount, timestamp);
            tx.confirmations = confirmations;
            tx.block_height =
                (confirmations > 0).then(|| BlockHeight::from_u32(1000 - confirmations));
            tx.memo = memo;
            match tx_type {
                TxType::Sent => tx.to_address = counterparty,
                TxType::Received => tx.from_address = counterparty,
            }
            tx
        }
    }
}

#[cfg(test)]
mod tests {
    use bitcoinz_protocol::{address::AddressKind, value::Zatoshis, TxId};

    use super::{Balance, Contact, InvalidBalance, Transaction, TxStatus, TxType, WalletAddress};

    const T_ADDR: &str = "t1XgfkH3GVD2Yv8kAn8RkSeLiPXWSpcqy4M";

    fn tx(confirmations: u32) -> Transaction {
        let mut tx = Transaction::new(
            TxId::from_bytes([7; 32]),
            TxType::Received,
            Zatoshis::const_from_u64(5),
            0,
        );
        tx.confirmations = confirmations;
        tx
    }

    #[test]
    fn status_follows_confirmation_depth() {
        assert_eq!(tx(0).status(), TxStatus::Confirming);
        assert_eq!(tx(5).status(), TxStatus::Confirming);
        assert_eq!(tx(6).status(), TxStatus::Confirmed);

        let mut failed = tx(10);
        failed.failed = true;
        assert_eq!(failed.status(), TxStatus::Failed);
    }

    #[test]
    fn empty_memo_is_no_memo() {
        let mut t = tx(1);
        t.memo = Some(String::new());
        assert!(!t.has_memo());
        t.memo = Some("   ".into());
        assert!(t.has_memo());
        assert_eq!(t.memo_text(), None);
        t.memo = Some(" hello ".into());
        assert_eq!(t.memo_text(), Some("hello"));
    }

    #[test]
    fn balance_rejects_spendable_over_total() {
        let one = Zatoshis::const_from_u64(1);
        let two = Zatoshis::const_from_u64(2);
        assert!(Balance::new(one, two).is_ok());
        assert_eq!(
            Balance::new(two, one),
            Err(InvalidBalance {
                spendable: two,
                total: one
            })
        );
    }

    #[test]
    fn shielded_is_total_minus_transparent() {
        let b = Balance::new(Zatoshis::const_from_u64(3), Zatoshis::const_from_u64(10))
            .unwrap()
            .with_transparent(Zatoshis::const_from_u64(4));
        assert_eq!(b.shielded(), Zatoshis::const_from_u64(6));
    }

    #[test]
    fn address_type_tags() {
        let t = WalletAddress::from_encoded(T_ADDR).unwrap();
        assert_eq!(t.kind, AddressKind::Transparent);
        assert_eq!(t.type_tag, "p2pkh");

        let sprout = format!("zc{}", "a".repeat(93));
        assert_eq!(WalletAddress::from_encoded(&sprout).unwrap().type_tag, "sprout");
        assert!(WalletAddress::from_encoded("bogus").is_none());
    }

    #[test]
    fn contact_requires_name_and_address() {
        let c = Contact::new("  Alice ", T_ADDR).unwrap();
        assert_eq!(c.name, "Alice");
        assert!(c.is_transparent);
        assert!(Contact::new(" ", T_ADDR).is_none());
        assert!(Contact::new("Bob", "not-an-address").is_none());
    }
}
