use bitcoinz_protocol::{value::BalanceError, value::Zatoshis, TxId};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("Address not owned by this wallet: {0}")]
    AddressNotOwned(String),
    #[error("Address not recognized: {0}")]
    AddressNotRecognized(String),
    #[error("Balance error: {0}")]
    Balance(#[from] BalanceError),
    #[error("Error encoding address: {0}")]
    Encoding(String),
    #[error("Insufficient funds: {available} available, {required} required")]
    InsufficientFunds {
        available: Zatoshis,
        required: Zatoshis,
    },
    #[error("Cannot attach a memo to a transparent output")]
    MemoToTransparent,
    #[error("Transaction not found: {0}")]
    TransactionNotFound(TxId),
    #[error("Cannot rewind {depth} blocks from height {tip}")]
    InvalidRewind { depth: u32, tip: u32 },
    #[error("Server unreachable")]
    Offline,
    #[error("Send rejected: {0}")]
    SendRejected(String),
    #[error("Amount must be positive")]
    ZeroAmount,
}
