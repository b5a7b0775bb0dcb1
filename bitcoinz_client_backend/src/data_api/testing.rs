//! A scriptable [`WalletEngine`] for exercising wallet state logic.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::Notify;

use bitcoinz_protocol::{address::AddressKind, memo::Memo, value::Zatoshis, BlockHeight, TxId};

use super::{ServerInfo, SyncStatus, WalletEngine};
use crate::wallet::{Balance, Transaction, WalletAddress};

/// The error returned by [`MockEngine`] when failure is scripted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("mock engine failure: {0}")]
pub struct MockError(pub String);

/// A request recorded by [`MockEngine::send_transaction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentRequest {
    pub to: String,
    pub amount: Zatoshis,
    pub memo: Option<String>,
}

/// The mutable contents of a [`MockEngine`].
#[derive(Debug, Default)]
pub struct MockData {
    pub tip: u32,
    pub balance: Balance,
    pub transactions: Vec<Transaction>,
    pub addresses: Vec<WalletAddress>,
    /// When set, every call fails with this message.
    pub fail_with: Option<String>,
    pub sync_calls: usize,
    /// What [`WalletEngine::sync_status`] reports.
    pub sync_status: Option<SyncStatus>,
    pub sent: Vec<SentRequest>,
    next_id: u8,
}

/// An engine whose responses are whatever the test puts in its [`MockData`].
#[derive(Debug, Default)]
pub struct MockEngine {
    data: Mutex<MockData>,
    gate_sends: bool,
    gate: Notify,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes each send wait for [`MockEngine::release_send`] before completing.
    pub fn with_gated_sends(mut self) -> Self {
        self.gate_sends = true;
        self
    }

    pub fn release_send(&self) {
        self.gate.notify_one();
    }

    pub fn data(&self) -> MutexGuard<'_, MockData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self) -> Result<MutexGuard<'_, MockData>, MockError> {
        let data = self.data();
        match &data.fail_with {
            Some(msg) => Err(MockError(msg.clone())),
            None => Ok(data),
        }
    }

    fn next_id(&self) -> Result<u8, MockError> {
        let mut data = self.check()?;
        data.next_id = data.next_id.wrapping_add(1);
        Ok(data.next_id)
    }
}

#[async_trait]
impl WalletEngine for MockEngine {
    type Error = MockError;

    async fn sync(&self) -> Result<(), Self::Error> {
        let mut data = self.check()?;
        data.sync_calls += 1;
        Ok(())
    }

    async fn balance(&self) -> Result<Balance, Self::Error> {
        Ok(self.check()?.balance)
    }

    async fn transactions(&self) -> Result<Vec<Transaction>, Self::Error> {
        Ok(self.check()?.transactions.clone())
    }

    async fn addresses(&self) -> Result<Vec<WalletAddress>, Self::Error> {
        Ok(self.check()?.addresses.clone())
    }

    async fn generate_new_address(&self, kind: AddressKind) -> Result<WalletAddress, Self::Error> {
        let n = self.next_id()?;
        let encoded = match kind {
            AddressKind::Transparent => format!("t1Mock{:0>29}", n),
            AddressKind::Shielded => format!("zs1mock{:0>60}", n),
        };
        let address = WalletAddress::from_encoded(&encoded)
            .ok_or_else(|| MockError(format!("generated unrecognized address {encoded}")))?;
        self.data().addresses.push(address.clone());
        Ok(address)
    }

    async fn send_transaction(
        &self,
        to: &str,
        amount: Zatoshis,
        memo: Option<&Memo>,
    ) -> Result<TxId, Self::Error> {
        if self.gate_sends {
            self.gate.notified().await;
        }
        let n = self.next_id()?;
        self.data().sent.push(SentRequest {
            to: to.to_string(),
            amount,
            memo: memo.map(|m| m.as_str().to_string()),
        });
        Ok(TxId::from_bytes([n; 32]))
    }

    async fn chain_height(&self) -> Result<BlockHeight, Self::Error> {
        Ok(BlockHeight::from_u32(self.check()?.tip))
    }

    async fn server_info(&self) -> Result<ServerInfo, Self::Error> {
        let tip = self.check()?.tip;
        Ok(ServerInfo::new(
            "v0.0.0-mock".to_string(),
            "mock".to_string(),
            "main".to_string(),
            BlockHeight::from_u32(tip),
            "mock://".to_string(),
        ))
    }

    async fn sync_status(&self) -> Result<Option<SyncStatus>, Self::Error> {
        Ok(self.check()?.sync_status)
    }
}
