//! Shared application state for a wallet client.
//!
//! [`WalletState`] is a cloneable handle that every screen or service holds. It caches the
//! most recent snapshot read from the [`WalletEngine`], owns the reconciled transaction
//! [`Ledger`] and the user's [`Annotations`], and publishes a [`WalletEvent`] on a broadcast
//! channel whenever anything observable changes.
//!
//! User-initiated operations that must not overlap (sending, creating an address, syncing
//! and paging in history) each hold an [`InFlight`] slot for their duration. A second request
//! of the same kind fails fast with [`Error::Busy`].
//!
//! Locks guarding the snapshot are never held across an `.await`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use bitcoinz_protocol::{address::AddressKind, value::Zatoshis, BlockHeight, TxId};
use bitcoinz_uri::PaymentRequest;

use crate::{
    annotations::Annotations,
    config::WalletConfig,
    data_api::{ServerInfo, SyncStatus, WalletEngine},
    error::{Error, Operation},
    history::{self, Pager},
    inflight::InFlight,
    messages::{self, MessageFilter},
    receive::ReceiveRequest,
    reconcile::{Ledger, ReconcileReport},
    send::{SendForm, SendProposal},
    wallet::{AddressLabel, Balance, Contact, MessageLabel, Transaction, TxType, WalletAddress},
};

const EVENT_CAPACITY: usize = 64;

/// Notifications published by [`WalletState`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WalletEvent {
    SyncStarted,
    /// A sync finished. `height` is the chain tip it reached, if it succeeded.
    SyncFinished { height: Option<BlockHeight> },
    ConnectionChanged { connected: bool },
    BalanceChanged(Balance),
    /// The transaction list or its visible page changed.
    TransactionsUpdated { added: usize },
    TransactionConfirmed(TxId),
    TransactionExpired(TxId),
    TransactionSent { txid: TxId, amount: Zatoshis },
    AddressCreated(WalletAddress),
    /// Labels, contacts or memo read flags changed.
    AnnotationsChanged,
}

#[derive(Debug)]
struct Snapshot {
    balance: Balance,
    ledger: Ledger,
    addresses: Vec<WalletAddress>,
    tip: Option<BlockHeight>,
    pager: Pager,
    server_info: Option<ServerInfo>,
}

struct Inner<E> {
    engine: E,
    config: WalletConfig,
    snapshot: RwLock<Snapshot>,
    annotations: Mutex<Annotations>,
    events: broadcast::Sender<WalletEvent>,
    sending: InFlight,
    creating_address: InFlight,
    syncing: InFlight,
    loading_more: InFlight,
    connected: AtomicBool,
    last_refresh: Mutex<Option<Instant>>,
}

/// A handle to the shared state of one wallet.
pub struct WalletState<E> {
    inner: Arc<Inner<E>>,
}

impl<E> Clone for WalletState<E> {
    fn clone(&self) -> Self {
        WalletState {
            inner: Arc::clone(&self.inner),
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl<E: WalletEngine> WalletState<E> {
    /// Creates the state for `engine`, loading persisted annotations if a path is configured.
    ///
    /// Nothing is read from the engine until the first sync.
    pub fn new(engine: E, config: WalletConfig) -> Result<Self, Error<E::Error>> {
        let annotations = match &config.annotations_path {
            Some(path) => Annotations::load(path)?,
            None => Annotations::default(),
        };
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(WalletState {
            inner: Arc::new(Inner {
                snapshot: RwLock::new(Snapshot {
                    balance: Balance::ZERO,
                    ledger: Ledger::new(),
                    addresses: vec![],
                    tip: None,
                    pager: Pager::new(config.page_size),
                    server_info: None,
                }),
                engine,
                config,
                annotations: Mutex::new(annotations),
                events,
                sending: InFlight::new(),
                creating_address: InFlight::new(),
                syncing: InFlight::new(),
                loading_more: InFlight::new(),
                connected: AtomicBool::new(false),
                last_refresh: Mutex::new(None),
            }),
        })
    }

    pub fn engine(&self) -> &E {
        &self.inner.engine
    }

    pub fn config(&self) -> &WalletConfig {
        &self.inner.config
    }

    /// Returns a receiver for all events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.inner.events.subscribe()
    }

    fn emit(&self, event: WalletEvent) {
        // No subscribers is not an error.
        let _ = self.inner.events.send(event);
    }

    fn snapshot(&self) -> RwLockReadGuard<'_, Snapshot> {
        self.inner
            .snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot_mut(&self) -> RwLockWriteGuard<'_, Snapshot> {
        self.inner
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn annotations(&self) -> MutexGuard<'_, Annotations> {
        self.inner
            .annotations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn last_refresh(&self) -> MutexGuard<'_, Option<Instant>> {
        self.inner
            .last_refresh
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies `f` to a copy of the annotations. If `f` reports a change, the copy is
    /// persisted and only then replaces the current annotations, and subscribers are notified.
    fn update_annotations<T, F>(&self, f: F) -> Result<T, Error<E::Error>>
    where
        F: FnOnce(&mut Annotations) -> Result<(T, bool), Error<E::Error>>,
    {
        let (value, changed) = {
            let mut annotations = self.annotations();
            let mut updated = annotations.clone();
            let (value, changed) = f(&mut updated)?;
            if changed {
                if let Some(path) = &self.inner.config.annotations_path {
                    updated.save(path)?;
                }
                *annotations = updated;
            }
            (value, changed)
        };
        if changed {
            self.emit(WalletEvent::AnnotationsChanged);
        }
        Ok(value)
    }

    fn set_connected(&self, connected: bool) {
        if self.inner.connected.swap(connected, Ordering::AcqRel) != connected {
            info!("Wallet engine {}", if connected { "connected" } else { "disconnected" });
            self.emit(WalletEvent::ConnectionChanged { connected });
        }
    }

    //
    // Sync
    //

    /// Syncs the engine and reloads the balance, transactions and addresses.
    pub async fn sync_wallet(&self) -> Result<(), Error<E::Error>> {
        let _token = self
            .inner
            .syncing
            .try_acquire()
            .ok_or(Error::Busy(Operation::Sync))?;

        debug!("Wallet sync started");
        self.emit(WalletEvent::SyncStarted);
        let result = self.load_from_engine().await;
        if result.is_ok() {
            *self.last_refresh() = Some(Instant::now());
        }
        self.set_connected(result.is_ok());

        match &result {
            Ok(height) => debug!("Wallet sync finished at height {}", height),
            Err(e) => debug!("Wallet sync failed: {}", e),
        }
        self.emit(WalletEvent::SyncFinished {
            height: result.as_ref().ok().copied(),
        });
        result.map(|_| ())
    }

    async fn load_from_engine(&self) -> Result<BlockHeight, Error<E::Error>> {
        let engine = &self.inner.engine;
        engine.sync().await.map_err(Error::Engine)?;
        let tip = engine.chain_height().await.map_err(Error::Engine)?;
        let balance = engine.balance().await.map_err(Error::Engine)?;
        let transactions = engine.transactions().await.map_err(Error::Engine)?;
        let addresses = engine.addresses().await.map_err(Error::Engine)?;

        let (report, balance_changed) = {
            let mut snapshot = self.snapshot_mut();
            let report = snapshot.ledger.merge(transactions, tip);
            let balance_changed = snapshot.balance != balance;
            snapshot.balance = balance;
            snapshot.tip = Some(tip);
            // Keep locally created addresses the engine has not listed yet.
            let local_only: Vec<WalletAddress> = snapshot
                .addresses
                .drain(..)
                .filter(|a| !addresses.contains(a))
                .collect();
            snapshot.addresses = addresses;
            snapshot.addresses.extend(local_only);
            (report, balance_changed)
        };

        if balance_changed {
            self.emit(WalletEvent::BalanceChanged(balance));
        }
        self.publish_report(&report);
        Ok(tip)
    }

    fn publish_report(&self, report: &ReconcileReport) {
        if report.regressions > 0 {
            warn!(
                "Ignored {} confirmation regressions in engine snapshot",
                report.regressions
            );
        }
        if !report.added.is_empty() {
            self.emit(WalletEvent::TransactionsUpdated {
                added: report.added.len(),
            });
        }
        for txid in &report.confirmed {
            self.emit(WalletEvent::TransactionConfirmed(*txid));
        }
        for txid in &report.expired {
            self.emit(WalletEvent::TransactionExpired(*txid));
        }
    }

    /// Syncs unless a sync is already running or, when `force` is false, the last one
    /// finished within the minimum refresh interval.
    ///
    /// Returns whether a sync was performed.
    pub async fn refresh_wallet(&self, force: bool) -> Result<bool, Error<E::Error>> {
        if self.is_syncing() {
            return Ok(false);
        }
        if !force {
            let recent = self
                .last_refresh()
                .is_some_and(|at| at.elapsed() < self.inner.config.min_refresh_interval());
            if recent {
                return Ok(false);
            }
        }
        match self.sync_wallet().await {
            Ok(()) => Ok(true),
            // Lost the race to another refresh.
            Err(Error::Busy(Operation::Sync)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Asks the engine how far its chain scan has progressed. `None` if the engine does not
    /// report progress.
    pub async fn sync_status(&self) -> Result<Option<SyncStatus>, Error<E::Error>> {
        self.inner.engine.sync_status().await.map_err(Error::Engine)
    }

    pub fn is_syncing(&self) -> bool {
        self.inner.syncing.is_active()
    }

    /// Whether the last engine round trip succeeded.
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    /// The chain tip as of the last successful sync.
    pub fn chain_height(&self) -> Option<BlockHeight> {
        self.snapshot().tip
    }

    /// Fetches information about the engine's server and caches it.
    pub async fn server_info(&self) -> Result<ServerInfo, Error<E::Error>> {
        let result = self.inner.engine.server_info().await;
        self.set_connected(result.is_ok());
        let info = result.map_err(Error::Engine)?;
        self.snapshot_mut().server_info = Some(info.clone());
        Ok(info)
    }

    pub fn cached_server_info(&self) -> Option<ServerInfo> {
        self.snapshot().server_info.clone()
    }

    //
    // Balance
    //

    pub fn balance(&self) -> Balance {
        self.snapshot().balance
    }

    //
    // Addresses
    //

    pub fn addresses(&self) -> Vec<WalletAddress> {
        self.snapshot().addresses.clone()
    }

    pub fn get_addresses_of_type(&self, is_shielded: bool) -> Vec<String> {
        self.snapshot()
            .addresses
            .iter()
            .filter(|a| a.is_shielded() == is_shielded)
            .map(|a| a.address.clone())
            .collect()
    }

    /// Returns the wallet's first address of the requested kind.
    pub fn get_address_by_type(&self, is_shielded: bool) -> Option<String> {
        self.snapshot()
            .addresses
            .iter()
            .find(|a| a.is_shielded() == is_shielded)
            .map(|a| a.address.clone())
    }

    pub fn is_creating_address(&self) -> bool {
        self.inner.creating_address.is_active()
    }

    pub async fn generate_new_address(
        &self,
        kind: AddressKind,
    ) -> Result<WalletAddress, Error<E::Error>> {
        let _token = self
            .inner
            .creating_address
            .try_acquire()
            .ok_or(Error::Busy(Operation::CreateAddress))?;

        let address = self
            .inner
            .engine
            .generate_new_address(kind)
            .await
            .map_err(Error::Engine)?;
        info!("Created new {} address", kind);

        {
            let mut snapshot = self.snapshot_mut();
            if !snapshot.addresses.contains(&address) {
                snapshot.addresses.push(address.clone());
            }
        }
        self.emit(WalletEvent::AddressCreated(address.clone()));
        Ok(address)
    }

    /// Returns an existing address of the given kind, creating one if the wallet has none.
    pub async fn receive_address(&self, kind: AddressKind) -> Result<String, Error<E::Error>> {
        match self.get_address_by_type(kind.is_shielded()) {
            Some(address) => Ok(address),
            None => Ok(self.generate_new_address(kind).await?.address),
        }
    }

    /// Renders the payment URI for a receive request.
    pub fn payment_uri(&self, request: &ReceiveRequest) -> Result<String, Error<E::Error>> {
        Ok(request.to_uri()?)
    }

    //
    // Sending
    //

    pub fn is_sending(&self) -> bool {
        self.inner.sending.is_active()
    }

    /// Validates a send form against the cached balance and the configured fee.
    pub fn prepare_send(&self, form: &SendForm) -> Result<SendProposal, Error<E::Error>> {
        Ok(form.validate(&self.balance(), self.inner.config.default_fee)?)
    }

    /// Parses a scanned payment URI into a pre-filled send form.
    pub fn parse_payment_uri(&self, uri: &str) -> Result<SendForm, Error<E::Error>> {
        let request = PaymentRequest::from_uri(uri.trim())?;
        Ok(SendForm::from_payment_request(&request))
    }

    /// Submits a confirmed send.
    ///
    /// Only one send may be in flight. On success the transaction is recorded as pending
    /// until the engine reports it, and the wallet is refreshed in the background of this
    /// call. A failed refresh does not fail the send.
    pub async fn send(&self, proposal: &SendProposal) -> Result<TxId, Error<E::Error>> {
        let token = self
            .inner
            .sending
            .try_acquire()
            .ok_or(Error::Busy(Operation::Send))?;

        info!(
            "Sending {} BTCZ to a {} address",
            proposal.amount(),
            proposal.kind()
        );
        let txid = self
            .inner
            .engine
            .send_transaction(proposal.recipient(), proposal.amount(), proposal.memo())
            .await
            .map_err(|e| {
                warn!("Send failed: {}", e);
                Error::Engine(e)
            })?;
        drop(token);

        {
            let mut snapshot = self.snapshot_mut();
            let mut tx = Transaction::new(txid, TxType::Sent, proposal.amount(), now_secs());
            tx.fee = proposal.fee();
            tx.memo = proposal.memo().map(|m| m.as_str().to_string());
            tx.to_address = Some(proposal.recipient().to_string());
            tx.expiry_height = snapshot
                .tip
                .map(|tip| tip.saturating_add(self.inner.config.pending_expiry_delta));
            snapshot.ledger.insert_pending_send(tx);
        }
        self.emit(WalletEvent::TransactionSent {
            txid,
            amount: proposal.amount(),
        });
        self.emit(WalletEvent::TransactionsUpdated { added: 1 });

        if let Err(e) = self.refresh_wallet(true).await {
            debug!("Refresh after send failed: {}", e);
        }
        Ok(txid)
    }

    /// Validates and submits a send in one step.
    pub async fn send_transaction(
        &self,
        to: &str,
        amount: Zatoshis,
        memo: Option<&str>,
    ) -> Result<TxId, Error<E::Error>> {
        let form = SendForm {
            address: to.to_string(),
            amount: amount.to_string(),
            memo: memo.unwrap_or_default().to_string(),
        };
        let proposal = self.prepare_send(&form)?;
        self.send(&proposal).await
    }

    //
    // Transactions
    //

    /// Every known transaction, newest first.
    pub fn transactions(&self) -> Vec<Transaction> {
        self.snapshot().ledger.transactions().to_vec()
    }

    pub fn transaction(&self, txid: &TxId) -> Option<Transaction> {
        self.snapshot().ledger.get(txid).cloned()
    }

    /// The currently revealed page of history.
    pub fn visible_transactions(&self) -> Vec<Transaction> {
        let snapshot = self.snapshot();
        snapshot
            .pager
            .visible(snapshot.ledger.transactions())
            .to_vec()
    }

    pub fn recent_transactions(&self) -> Vec<Transaction> {
        history::recent(
            self.snapshot().ledger.transactions(),
            self.inner.config.recent_limit,
        )
    }

    pub fn get_transaction_stats(&self) -> BTreeMap<String, u64> {
        history::TransactionStats::from_transactions(self.snapshot().ledger.transactions())
            .to_map()
    }

    /// Reveals the next page of history. Returns whether anything new became visible.
    pub async fn load_more_transactions(&self) -> Result<bool, Error<E::Error>> {
        let _token = self
            .inner
            .loading_more
            .try_acquire()
            .ok_or(Error::Busy(Operation::LoadMore))?;

        let revealed = {
            let mut snapshot = self.snapshot_mut();
            let total = snapshot.ledger.len();
            snapshot.pager.load_more(total)
        };
        if revealed {
            self.emit(WalletEvent::TransactionsUpdated { added: 0 });
        }
        Ok(revealed)
    }

    pub fn has_more_transactions(&self) -> bool {
        let snapshot = self.snapshot();
        snapshot.pager.has_more(snapshot.ledger.len())
    }

    pub fn is_loading_more(&self) -> bool {
        self.inner.loading_more.is_active()
    }

    //
    // Messages
    //

    pub fn get_transaction_memo_read_status(&self, txid: &TxId, fallback: bool) -> bool {
        self.annotations().is_memo_read(txid, fallback)
    }

    /// The read status of a memo, defaulting by direction when never set.
    pub fn is_memo_read(&self, tx: &Transaction) -> bool {
        self.get_transaction_memo_read_status(&tx.txid, messages::default_read_status(tx))
    }

    pub fn mark_memo_as_read(&self, txid: TxId) -> Result<(), Error<E::Error>> {
        self.update_annotations(|a| Ok(((), a.set_memo_read(txid, true))))
    }

    pub fn mark_memo_as_unread(&self, txid: TxId) -> Result<(), Error<E::Error>> {
        self.update_annotations(|a| Ok(((), a.set_memo_read(txid, false))))
    }

    /// All transactions with a memo, newest first.
    pub fn memo_messages(&self) -> Vec<Transaction> {
        messages::memo_messages(self.snapshot().ledger.transactions())
    }

    pub fn filtered_messages(&self, filter: MessageFilter) -> Vec<Transaction> {
        let all = self.memo_messages();
        let annotations = self.annotations();
        messages::filter_messages(&all, filter, |tx| {
            annotations.is_memo_read(&tx.txid, messages::default_read_status(tx))
        })
    }

    pub fn unread_message_count(&self) -> usize {
        let all = self.memo_messages();
        let annotations = self.annotations();
        messages::unread_count(&all, |tx| {
            annotations.is_memo_read(&tx.txid, messages::default_read_status(tx))
        })
    }

    /// Marks every message matching `filter` read or unread, one at a time.
    ///
    /// Stops at the first failure. Returns the number of messages updated.
    pub fn mark_all_messages(
        &self,
        filter: MessageFilter,
        read: bool,
    ) -> Result<usize, Error<E::Error>> {
        let targets = self.filtered_messages(filter);
        for tx in &targets {
            if read {
                self.mark_memo_as_read(tx.txid)?;
            } else {
                self.mark_memo_as_unread(tx.txid)?;
            }
        }
        Ok(targets.len())
    }

    pub fn get_message_labels(&self, txid: &TxId) -> Vec<MessageLabel> {
        self.annotations().message_labels(txid)
    }

    pub fn add_message_label(&self, label: MessageLabel) -> Result<(), Error<E::Error>> {
        self.update_annotations(|a| Ok(((), a.add_message_label(label))))
    }

    pub fn remove_message_label(&self, txid: &TxId, name: &str) -> Result<bool, Error<E::Error>> {
        self.update_annotations(|a| {
            let removed = a.remove_message_label(txid, name);
            Ok((removed, removed))
        })
    }

    //
    // Address labels and contacts
    //

    pub fn get_all_address_labels(&self) -> Vec<AddressLabel> {
        self.annotations().address_labels().to_vec()
    }

    pub fn set_address_label(&self, label: AddressLabel) -> Result<(), Error<E::Error>> {
        self.update_annotations(|a| {
            a.set_address_label(label);
            Ok(((), true))
        })
    }

    pub fn remove_address_label(&self, address: &str) -> Result<bool, Error<E::Error>> {
        self.update_annotations(|a| {
            let removed = a.remove_address_label(address);
            Ok((removed, removed))
        })
    }

    pub fn contacts(&self) -> Vec<Contact> {
        self.annotations().contacts().to_vec()
    }

    pub fn add_contact(&self, contact: Contact) -> Result<(), Error<E::Error>> {
        self.update_annotations(|a| {
            a.add_contact(contact)?;
            Ok(((), true))
        })
    }

    pub fn update_contact(&self, address: &str, contact: Contact) -> Result<(), Error<E::Error>> {
        self.update_annotations(|a| {
            a.update_contact(address, contact)?;
            Ok(((), true))
        })
    }

    pub fn remove_contact(&self, address: &str) -> Result<bool, Error<E::Error>> {
        self.update_annotations(|a| {
            let removed = a.remove_contact(address);
            Ok((removed, removed))
        })
    }

    pub fn set_contact_favorite(
        &self,
        address: &str,
        favorite: bool,
    ) -> Result<(), Error<E::Error>> {
        self.update_annotations(|a| {
            a.set_favorite(address, favorite)?;
            Ok(((), true))
        })
    }
}
