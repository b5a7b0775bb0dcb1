//! *An in-memory wallet engine for BitcoinZ light clients.*
//!
//! [`MemoryWallet`] implements [`WalletEngine`] over a simulated chain. It derives addresses
//! deterministically from a seed, tracks incoming and outgoing transactions and derives
//! confirmations and balances from the simulated chain tip. Test code drives the chain
//! directly: it can deliver funds, mine blocks, rewind the tip, evict transactions from the
//! mempool and make the engine fail.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use bitcoinz_client_backend::{
    data_api::{ServerInfo, WalletEngine},
    wallet::{Balance, Transaction, TxType, WalletAddress},
};
use bitcoinz_protocol::{
    address::AddressKind,
    memo::Memo,
    value::{BalanceError, Zatoshis},
    BlockHeight, TxId, DEFAULT_TX_EXPIRY_DELTA,
};

mod chain;
mod error;
pub mod keys;

use chain::{MemoryDb, TxRecord};
pub use error::Error;

/// The fee charged by the simulated wallet for every send.
pub const DEFAULT_FEE: Zatoshis = Zatoshis::const_from_u64(1_000);

/// The chain height at which a new simulated wallet starts.
pub const DEFAULT_START_HEIGHT: u32 = 1_000_000;

const GENESIS_TIME: u64 = 1_478_403_829;

/// Failures that can be injected into a [`MemoryWallet`].
#[derive(Debug, Clone, Default)]
struct Faults {
    offline: bool,
    reject_next_send: Option<String>,
}

/// A wallet engine over a simulated chain.
#[derive(Debug)]
pub struct MemoryWallet {
    db: Mutex<MemoryDb>,
    faults: Mutex<Faults>,
    fee: Zatoshis,
}

impl MemoryWallet {
    /// Creates an empty wallet whose addresses derive from `seed`.
    pub fn new(seed: [u8; 32]) -> Self {
        MemoryWallet {
            db: Mutex::new(MemoryDb::new(
                seed,
                BlockHeight::from_u32(DEFAULT_START_HEIGHT),
                GENESIS_TIME,
            )),
            faults: Mutex::new(Faults::default()),
            fee: DEFAULT_FEE,
        }
    }

    /// Sets the number of confirmations a received transaction needs to become spendable.
    pub fn with_min_confirmations(self, min_confirmations: u32) -> Self {
        self.db().min_confirmations = min_confirmations.max(1);
        self
    }

    pub fn with_fee(mut self, fee: Zatoshis) -> Self {
        self.fee = fee;
        self
    }

    fn db(&self) -> MutexGuard<'_, MemoryDb> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn online(&self) -> Result<MutexGuard<'_, MemoryDb>, Error> {
        if self.faults().offline {
            return Err(Error::Offline);
        }
        Ok(self.db())
    }

    pub fn tip(&self) -> BlockHeight {
        self.db().tip
    }

    /// Makes every engine call fail with [`Error::Offline`] until cleared.
    pub fn set_offline(&self, offline: bool) {
        self.faults().offline = offline;
    }

    /// Makes the next send fail with [`Error::SendRejected`].
    pub fn reject_next_send(&self, reason: &str) {
        self.faults().reject_next_send = Some(reason.to_string());
    }

    /// Derives and stores the next address of the given kind.
    pub fn create_address(&self, kind: AddressKind) -> Result<WalletAddress, Error> {
        let mut db = self.db();
        let index = db.next_index.get(&kind).copied().unwrap_or(0);
        let encoded = keys::derive_address(&db.seed, kind, index)?;
        let address = WalletAddress::from_encoded(&encoded)
            .ok_or_else(|| Error::AddressNotRecognized(encoded.clone()))?;
        db.next_index.insert(kind, index + 1);
        db.addresses.push(address.clone());
        Ok(address)
    }

    fn new_txid(db: &mut MemoryDb, tag: &[u8], address: &str, amount: Zatoshis) -> TxId {
        db.nonce += 1;
        let mut hasher = Sha256::new();
        hasher.update(db.seed);
        hasher.update(tag);
        hasher.update(db.nonce.to_le_bytes());
        hasher.update(address.as_bytes());
        hasher.update(amount.into_u64().to_le_bytes());
        // Double SHA-256, as for real transaction ids.
        TxId::from_bytes(Sha256::digest(hasher.finalize()).into())
    }

    /// Delivers an unmined payment of `amount` to one of the wallet's addresses.
    pub fn receive(&self, to: &str, amount: Zatoshis, memo: Option<&str>) -> Result<TxId, Error> {
        if amount.is_zero() {
            return Err(Error::ZeroAmount);
        }
        let mut db = self.db();
        let kind = db
            .owned(to)
            .map(|a| a.kind)
            .ok_or_else(|| Error::AddressNotOwned(to.to_string()))?;
        if memo.is_some() && !kind.can_receive_memo() {
            return Err(Error::MemoToTransparent);
        }
        let txid = Self::new_txid(&mut db, b"recv", to, amount);
        let record = TxRecord {
            txid,
            direction: TxType::Received,
            amount,
            fee: Zatoshis::ZERO,
            address: to.to_string(),
            memo: memo.map(String::from),
            created_at: db.now(),
            mined_height: None,
            expiry_height: db.tip.saturating_add(DEFAULT_TX_EXPIRY_DELTA),
            transparent_part: Zatoshis::ZERO,
            dropped: false,
        };
        db.txs.push(record);
        debug!("Received {} at {}", amount, to);
        Ok(txid)
    }

    /// Mines `blocks` blocks. Pending transactions are included in the first one.
    pub fn mine_blocks(&self, blocks: u32) -> BlockHeight {
        let tip = self.db().mine(blocks);
        debug!("Mined to height {}", tip);
        tip
    }

    /// Rolls the chain back by `depth` blocks.
    pub fn reorg(&self, depth: u32) -> Result<BlockHeight, Error> {
        let tip = self.db().rewind(depth)?;
        info!("Rewound chain to height {}", tip);
        Ok(tip)
    }

    /// Evicts an unmined transaction so that it is never mined or reported.
    pub fn drop_transaction(&self, txid: &TxId) -> Result<(), Error> {
        self.db().record_mut(txid)?.dropped = true;
        Ok(())
    }

    /// Returns the chain height a transaction was mined at, if any.
    pub fn mined_height(&self, txid: &TxId) -> Result<Option<BlockHeight>, Error> {
        Ok(self.db().record(txid)?.mined_height)
    }
}

#[async_trait]
impl WalletEngine for MemoryWallet {
    type Error = Error;

    async fn sync(&self) -> Result<(), Self::Error> {
        let _db = self.online()?;
        Ok(())
    }

    async fn balance(&self) -> Result<Balance, Self::Error> {
        self.online()?.balance()
    }

    async fn transactions(&self) -> Result<Vec<Transaction>, Self::Error> {
        Ok(self.online()?.transactions())
    }

    async fn addresses(&self) -> Result<Vec<WalletAddress>, Self::Error> {
        Ok(self.online()?.addresses.clone())
    }

    async fn generate_new_address(&self, kind: AddressKind) -> Result<WalletAddress, Self::Error> {
        drop(self.online()?);
        self.create_address(kind)
    }

    async fn send_transaction(
        &self,
        to: &str,
        amount: Zatoshis,
        memo: Option<&Memo>,
    ) -> Result<TxId, Self::Error> {
        let recipient =
            AddressKind::detect(to).ok_or_else(|| Error::AddressNotRecognized(to.to_string()))?;
        if memo.is_some() && !recipient.can_receive_memo() {
            return Err(Error::MemoToTransparent);
        }
        if amount.is_zero() {
            return Err(Error::ZeroAmount);
        }
        if let Some(reason) = self.faults().reject_next_send.take() {
            return Err(Error::SendRejected(reason));
        }

        let mut db = self.online()?;
        let debit = (amount + self.fee).ok_or(Error::Balance(BalanceError::Overflow))?;
        let available = db.balance()?.spendable();
        if debit > available {
            return Err(Error::InsufficientFunds {
                available,
                required: debit,
            });
        }

        let transparent_part = db.transparent_share(debit)?;
        let txid = Self::new_txid(&mut db, b"send", to, amount);
        let record = TxRecord {
            txid,
            direction: TxType::Sent,
            amount,
            fee: self.fee,
            address: to.to_string(),
            memo: memo.map(|m| m.as_str().to_string()),
            created_at: db.now(),
            mined_height: None,
            expiry_height: db.tip.saturating_add(DEFAULT_TX_EXPIRY_DELTA),
            transparent_part,
            dropped: false,
        };
        db.txs.push(record);
        info!("Broadcast {} to {}", txid, to);
        Ok(txid)
    }

    async fn chain_height(&self) -> Result<BlockHeight, Self::Error> {
        Ok(self.online()?.tip)
    }

    async fn server_info(&self) -> Result<ServerInfo, Self::Error> {
        let tip = self.online()?.tip;
        Ok(ServerInfo::new(
            env!("CARGO_PKG_VERSION").to_string(),
            "bitcoinz_client_memory".to_string(),
            "main".to_string(),
            tip,
            "memory://".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use bitcoinz_client_backend::{
        config::WalletConfig,
        data_api::WalletEngine,
        state::{WalletEvent, WalletState},
        wallet::{TxStatus, TxType},
        Error as StateError,
    };
    use bitcoinz_protocol::{
        address::AddressKind,
        value::{parse_coins, Zatoshis},
        BlockHeight, DEFAULT_TX_EXPIRY_DELTA,
    };

    use super::{Error, MemoryWallet, DEFAULT_START_HEIGHT};

    const EXTERNAL_T: &str = "t1XgfkH3GVD2Yv8kAn8RkSeLiPXWSpcqy4M";

    fn coins(s: &str) -> Zatoshis {
        parse_coins(s).unwrap()
    }

    #[tokio::test]
    async fn received_funds_become_spendable_when_mined() {
        let wallet = MemoryWallet::new([1; 32]).with_min_confirmations(3);
        let z = wallet.create_address(AddressKind::Shielded).unwrap();
        let txid = wallet.receive(&z.address, coins("2"), Some("welcome")).unwrap();

        let b = wallet.balance().await.unwrap();
        assert_eq!(b.total(), coins("2"));
        assert_eq!(b.spendable(), Zatoshis::ZERO);
        assert_eq!(b.unconfirmed(), coins("2"));
        assert_eq!(b.pure_incoming(), coins("2"));

        wallet.mine_blocks(1);
        let b = wallet.balance().await.unwrap();
        assert_eq!(b.unverified(), coins("2"));
        assert_eq!(b.spendable(), Zatoshis::ZERO);

        wallet.mine_blocks(2);
        assert_eq!(wallet.balance().await.unwrap().spendable(), coins("2"));
        assert_eq!(
            wallet.mined_height(&txid).unwrap(),
            Some(BlockHeight::from_u32(DEFAULT_START_HEIGHT + 1))
        );

        let txs = wallet.transactions().await.unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].confirmations, 3);
        assert_eq!(txs[0].memo.as_deref(), Some("welcome"));
    }

    #[tokio::test]
    async fn sends_debit_amount_and_fee() {
        let wallet = MemoryWallet::new([2; 32]);
        let t = wallet.create_address(AddressKind::Transparent).unwrap();
        let z = wallet.create_address(AddressKind::Shielded).unwrap();
        wallet.receive(&t.address, coins("1"), None).unwrap();
        wallet.receive(&z.address, coins("0.5"), None).unwrap();
        wallet.mine_blocks(1);

        let b = wallet.balance().await.unwrap();
        assert_eq!(b.transparent(), coins("1"));
        assert_eq!(b.shielded(), coins("0.5"));

        wallet
            .send_transaction(EXTERNAL_T, coins("0.6"), None)
            .await
            .unwrap();
        let b = wallet.balance().await.unwrap();
        assert_eq!(b.total(), coins("0.89999"));
        // Shielded funds are spent first.
        assert_eq!(b.transparent(), coins("0.89999"));

        assert_matches!(
            wallet.send_transaction(EXTERNAL_T, coins("0.89999"), None).await,
            Err(Error::InsufficientFunds { .. })
        );
        assert_matches!(
            wallet.receive(&t.address, coins("1"), Some("no")),
            Err(Error::MemoToTransparent)
        );
        assert_matches!(
            wallet.receive(EXTERNAL_T, coins("1"), None),
            Err(Error::AddressNotOwned(_))
        );
    }

    #[tokio::test]
    async fn reorg_unmines_and_drop_hides() {
        let wallet = MemoryWallet::new([3; 32]);
        let z = wallet.create_address(AddressKind::Shielded).unwrap();
        let txid = wallet.receive(&z.address, coins("1"), None).unwrap();
        wallet.mine_blocks(5);

        wallet.reorg(5).unwrap();
        assert_eq!(wallet.mined_height(&txid).unwrap(), None);
        assert_eq!(wallet.transactions().await.unwrap()[0].confirmations, 0);
        assert_matches!(wallet.reorg(u32::MAX), Err(Error::InvalidRewind { .. }));

        wallet.drop_transaction(&txid).unwrap();
        assert!(wallet.transactions().await.unwrap().is_empty());
        assert_eq!(wallet.balance().await.unwrap().total(), Zatoshis::ZERO);
    }

    #[tokio::test]
    async fn injected_failures() {
        let wallet = MemoryWallet::new([4; 32]);
        wallet.set_offline(true);
        assert_matches!(wallet.sync().await, Err(Error::Offline));
        assert_matches!(
            wallet.generate_new_address(AddressKind::Shielded).await,
            Err(Error::Offline)
        );
        wallet.set_offline(false);
        assert!(wallet.sync().await.is_ok());

        let z = wallet.create_address(AddressKind::Shielded).unwrap();
        wallet.receive(&z.address, coins("5"), None).unwrap();
        wallet.mine_blocks(1);
        wallet.reject_next_send("mempool full");
        assert_matches!(
            wallet.send_transaction(EXTERNAL_T, coins("1"), None).await,
            Err(Error::SendRejected(reason)) if reason == "mempool full"
        );
        assert!(wallet
            .send_transaction(EXTERNAL_T, coins("1"), None)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn wallet_state_end_to_end() {
        let state = WalletState::new(MemoryWallet::new([5; 32]), WalletConfig::default()).unwrap();
        let mut events = state.subscribe();

        let address = state.receive_address(AddressKind::Shielded).await.unwrap();
        assert_matches!(events.recv().await, Ok(WalletEvent::AddressCreated(_)));

        state
            .engine()
            .receive(&address, coins("1.00001"), Some("first payment"))
            .unwrap();
        state.engine().mine_blocks(1);
        state.sync_wallet().await.unwrap();
        assert_eq!(state.balance().spendable(), coins("1.00001"));
        assert_eq!(state.unread_message_count(), 1);

        // Exactly enough for amount plus fee.
        let txid = state
            .send_transaction(EXTERNAL_T, coins("1"), None)
            .await
            .unwrap();
        assert_eq!(state.balance().spendable(), Zatoshis::ZERO);
        assert_matches!(
            state.send_transaction(EXTERNAL_T, coins("0.1"), None).await,
            Err(StateError::Send(_))
        );

        let sent = state.transaction(&txid).unwrap();
        assert_eq!(sent.tx_type, TxType::Sent);
        assert!(!sent.local_pending);
        assert_eq!(sent.status(), TxStatus::Confirming);

        state.engine().mine_blocks(6);
        state.refresh_wallet(true).await.unwrap();
        assert_eq!(state.transaction(&txid).unwrap().status(), TxStatus::Confirmed);
        assert_eq!(state.get_transaction_stats()["confirming"], 0);
    }

    #[tokio::test]
    async fn dropped_send_expires_in_ledger() {
        let state = WalletState::new(MemoryWallet::new([6; 32]), WalletConfig::default()).unwrap();
        let address = state.receive_address(AddressKind::Shielded).await.unwrap();
        state.engine().receive(&address, coins("3"), None).unwrap();
        state.engine().mine_blocks(1);
        state.sync_wallet().await.unwrap();

        let txid = state
            .send_transaction(EXTERNAL_T, coins("1"), None)
            .await
            .unwrap();
        state.engine().drop_transaction(&txid).unwrap();
        let mut events = state.subscribe();

        state.engine().mine_blocks(DEFAULT_TX_EXPIRY_DELTA + 1);
        state.sync_wallet().await.unwrap();

        // The engine no longer reports the send, but the ledger keeps it as failed.
        let tx = state.transaction(&txid).unwrap();
        assert_eq!(tx.status(), TxStatus::Failed);
        let mut saw_expiry = false;
        while let Ok(event) = events.try_recv() {
            saw_expiry |= event == WalletEvent::TransactionExpired(txid);
        }
        assert!(saw_expiry);
    }

    #[tokio::test]
    async fn sync_failure_is_reported_and_recovers() {
        let state = WalletState::new(MemoryWallet::new([7; 32]), WalletConfig::default()).unwrap();
        state.engine().set_offline(true);
        assert_matches!(state.sync_wallet().await, Err(StateError::Engine(Error::Offline)));
        assert!(!state.is_connected());

        state.engine().set_offline(false);
        state.sync_wallet().await.unwrap();
        assert!(state.is_connected());
    }
}
