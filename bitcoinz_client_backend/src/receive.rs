//! Payment requests for receiving funds.

use thiserror::Error;

use bitcoinz_protocol::{
    memo::{self, Memo},
    value::{parse_coins, AmountError, Zatoshis},
};
use bitcoinz_uri::{PaymentRequest, UriError};

/// Errors that prevent a payment request from being produced.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ReceiveError {
    #[error("No receiving address selected")]
    EmptyAddress,
    #[error("Invalid amount: {0}")]
    InvalidAmount(AmountError),
    #[error("Invalid memo: {0}")]
    Memo(memo::Error),
    #[error(transparent)]
    Uri(UriError),
}

/// The fields of a receive screen: one of the wallet's addresses plus an optional amount and
/// memo to request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReceiveRequest {
    pub address: String,
    pub amount: Option<Zatoshis>,
    pub memo: Option<String>,
}

impl ReceiveRequest {
    pub fn new(address: impl Into<String>) -> Self {
        ReceiveRequest {
            address: address.into(),
            amount: None,
            memo: None,
        }
    }

    pub fn with_amount(mut self, amount: Zatoshis) -> Self {
        self.amount = Some(amount);
        self
    }

    /// Sets the amount from user-entered decimal text. Blank text clears it.
    pub fn with_amount_text(mut self, text: &str) -> Result<Self, ReceiveError> {
        self.amount = if text.trim().is_empty() {
            None
        } else {
            Some(parse_coins(text).map_err(ReceiveError::InvalidAmount)?)
        };
        Ok(self)
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }

    /// Builds the payment request.
    ///
    /// The address must not be empty. A zero amount and an empty memo are omitted.
    pub fn to_payment_request(&self) -> Result<PaymentRequest, ReceiveError> {
        let address = self.address.trim();
        if address.is_empty() {
            return Err(ReceiveError::EmptyAddress);
        }
        let memo = match self.memo.as_deref() {
            Some(text) => Memo::from_text(text).map_err(ReceiveError::Memo)?,
            None => None,
        };
        PaymentRequest::new(address, self.amount, memo).map_err(ReceiveError::Uri)
    }

    /// Renders the `bitcoinz:` URI encoded into the receive QR code.
    pub fn to_uri(&self) -> Result<String, ReceiveError> {
        self.to_payment_request().map(|r| r.to_uri())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use bitcoinz_protocol::value::Zatoshis;
    use bitcoinz_uri::{PaymentRequest, UriError};

    use super::{ReceiveError, ReceiveRequest};

    const T_ADDR: &str = "t1XgfkH3GVD2Yv8kAn8RkSeLiPXWSpcqy4M";
    const Z_ADDR: &str =
        "zs1m2l5e9c4h6mjq0cfvx7k0ym6p9k5w0d2pq0u3d5u2tqyqvfz9u5x3xj7t9l4pz0uf6t8y9qlwnf";

    #[test]
    fn bare_address() {
        assert_eq!(
            ReceiveRequest::new(T_ADDR).to_uri().unwrap(),
            format!("bitcoinz:{T_ADDR}")
        );
    }

    #[test]
    fn amount_and_memo() {
        let uri = ReceiveRequest::new(Z_ADDR)
            .with_amount_text("1.25")
            .unwrap()
            .with_memo("for the pizza")
            .to_uri()
            .unwrap();
        assert_eq!(
            uri,
            format!("bitcoinz:{Z_ADDR}?amount=1.25&memo=for%20the%20pizza")
        );

        let parsed = PaymentRequest::from_uri(&uri).unwrap();
        assert_eq!(parsed.amount(), Some(Zatoshis::const_from_u64(125_000_000)));
        assert_eq!(parsed.memo().map(|m| m.as_str()), Some("for the pizza"));
    }

    #[test]
    fn zero_amount_and_empty_memo_are_omitted() {
        let uri = ReceiveRequest::new(Z_ADDR)
            .with_amount(Zatoshis::ZERO)
            .with_memo("")
            .to_uri()
            .unwrap();
        assert_eq!(uri, format!("bitcoinz:{Z_ADDR}"));
    }

    #[test]
    fn empty_address_is_rejected() {
        assert_matches!(
            ReceiveRequest::new("  ").to_uri(),
            Err(ReceiveError::EmptyAddress)
        );
        assert_matches!(
            ReceiveRequest::new(T_ADDR).with_memo("hi").to_uri(),
            Err(ReceiveError::Uri(UriError::TransparentMemo))
        );
        assert_matches!(
            ReceiveRequest::new(T_ADDR).with_amount_text("abc"),
            Err(ReceiveError::InvalidAmount(_))
        );
    }
}
