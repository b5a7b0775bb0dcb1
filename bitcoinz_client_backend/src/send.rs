//! Validation of outgoing payments.
//!
//! The user fills in a [`SendForm`] with raw text. [`SendForm::validate`] checks it against
//! the current [`Balance`] and the estimated fee and produces a [`SendProposal`], which is
//! what the user confirms and what [`crate::state::WalletState::send`] submits.

use std::fmt;

use thiserror::Error;

use bitcoinz_protocol::{
    address::AddressKind,
    memo::{self, Memo},
    value::{format_coins, parse_coins, AmountError, Zatoshis},
};
use bitcoinz_uri::PaymentRequest;

use crate::wallet::Balance;

/// Reasons a send cannot go ahead.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("{0:?} is not a valid BitcoinZ address")]
    InvalidAddress(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(AmountError),

    #[error("Amount must be greater than zero")]
    ZeroAmount,

    /// `required` is the amount plus the fee.
    #[error("Insufficient funds: {available} BTCZ available, {required} BTCZ required")]
    InsufficientFunds {
        available: Zatoshis,
        required: Zatoshis,
    },

    #[error("Memos can only be sent to shielded addresses")]
    MemoToTransparent,

    #[error("Invalid memo: {0}")]
    Memo(memo::Error),

    #[error("Amount plus fee exceeds the maximum BitcoinZ value")]
    Overflow,
}

/// Returns whether `amount` can be sent paying `fee` out of `spendable`.
///
/// True iff `amount > 0` and `amount + fee ≤ spendable`.
pub fn can_send(amount: Zatoshis, fee: Zatoshis, spendable: Zatoshis) -> bool {
    amount.is_positive() && (amount + fee).is_some_and(|total| total <= spendable)
}

/// The largest amount that can be sent paying `fee` out of `spendable`.
pub fn max_sendable(spendable: Zatoshis, fee: Zatoshis) -> Zatoshis {
    spendable.saturating_sub(fee)
}

/// Raw user input for a payment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SendForm {
    pub address: String,
    /// A decimal BTCZ amount such as `"1.5"`.
    pub amount: String,
    /// Memo text. Empty means no memo.
    pub memo: String,
}

impl SendForm {
    pub fn new(address: impl Into<String>, amount: impl Into<String>) -> Self {
        SendForm {
            address: address.into(),
            amount: amount.into(),
            memo: String::new(),
        }
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = memo.into();
        self
    }

    /// Pre-fills a form from a scanned or pasted payment request.
    pub fn from_payment_request(request: &PaymentRequest) -> Self {
        SendForm {
            address: request.address().to_string(),
            amount: request.amount().map(format_coins).unwrap_or_default(),
            memo: request
                .memo()
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
        }
    }

    /// Checks the form against the available balance.
    ///
    /// Errors are reported in field order: address, amount, memo, then funds.
    pub fn validate(&self, balance: &Balance, fee: Zatoshis) -> Result<SendProposal, SendError> {
        let address = self.address.trim();
        let kind = AddressKind::detect(address)
            .ok_or_else(|| SendError::InvalidAddress(address.to_string()))?;

        let amount = parse_coins(&self.amount).map_err(SendError::InvalidAmount)?;
        if amount.is_zero() {
            return Err(SendError::ZeroAmount);
        }

        let memo = Memo::from_text(&self.memo).map_err(SendError::Memo)?;
        if memo.is_some() && !kind.can_receive_memo() {
            return Err(SendError::MemoToTransparent);
        }

        let total = (amount + fee).ok_or(SendError::Overflow)?;
        if !can_send(amount, fee, balance.spendable()) {
            return Err(SendError::InsufficientFunds {
                available: balance.spendable(),
                required: total,
            });
        }

        Ok(SendProposal {
            recipient: address.to_string(),
            kind,
            amount,
            fee,
            memo,
        })
    }
}

/// A validated payment awaiting user confirmation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendProposal {
    recipient: String,
    kind: AddressKind,
    amount: Zatoshis,
    fee: Zatoshis,
    memo: Option<Memo>,
}

impl SendProposal {
    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn kind(&self) -> AddressKind {
        self.kind
    }

    pub fn amount(&self) -> Zatoshis {
        self.amount
    }

    pub fn fee(&self) -> Zatoshis {
        self.fee
    }

    pub fn memo(&self) -> Option<&Memo> {
        self.memo.as_ref()
    }

    /// The amount plus the fee. Validation guarantees this is in range.
    pub fn total(&self) -> Zatoshis {
        (self.amount + self.fee).unwrap_or(self.amount)
    }

    pub fn summary(&self) -> SendSummary {
        SendSummary {
            to: self.recipient.clone(),
            amount: format_coins(self.amount),
            fee: format_coins(self.fee),
            total: format_coins(self.total()),
            memo: self.memo.as_ref().map(|m| m.as_str().to_string()),
        }
    }
}

/// The values shown to the user before a send is confirmed, rendered as BTCZ strings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendSummary {
    pub to: String,
    pub amount: String,
    pub fee: String,
    pub total: String,
    pub memo: Option<String>,
}

impl fmt::Display for SendSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "To: {}", self.to)?;
        writeln!(f, "Amount: {} BTCZ", self.amount)?;
        writeln!(f, "Fee: {} BTCZ", self.fee)?;
        write!(f, "Total: {} BTCZ", self.total)?;
        if let Some(memo) = &self.memo {
            write!(f, "\nMemo: {}", memo)?;
        }
        Ok(())
    }
}
