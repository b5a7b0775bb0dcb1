//! Types for wallet client error handling.

use std::fmt;

use thiserror::Error;

use crate::{annotations::AnnotationError, receive::ReceiveError, send::SendError};

/// The single-slot operations that the wallet state refuses to run concurrently.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Send,
    CreateAddress,
    Sync,
    LoadMore,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Send => "send",
            Operation::CreateAddress => "address creation",
            Operation::Sync => "sync",
            Operation::LoadMore => "load more",
        })
    }
}

/// Errors that can occur while operating on the wallet state.
#[derive(Debug, Error)]
pub enum Error<EngineError> {
    /// The wallet engine reported an error.
    #[error("Wallet engine error: {0}")]
    Engine(EngineError),

    /// The requested send failed validation.
    #[error("Invalid send: {0}")]
    Send(#[from] SendError),

    /// A payment request could not be produced.
    #[error("Invalid payment request: {0}")]
    Receive(#[from] ReceiveError),

    /// A payment URI could not be parsed.
    #[error("Invalid payment URI: {0}")]
    Uri(#[from] bitcoinz_uri::UriError),

    /// Another operation of the same kind is still in flight.
    #[error("A {0} operation is already in progress")]
    Busy(Operation),

    /// Annotations could not be loaded or saved.
    #[error(transparent)]
    Annotations(#[from] AnnotationError),
}
