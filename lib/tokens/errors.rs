//! Bridge error kinds and the register/reject gate

use thiserror::Error;

use crate::types::SwapStatus;

/// Classification of a transaction verification failure.
///
/// Every verification error carries exactly one kind; all routing decisions
/// (register vs reject, initial status, acceptance voting) match on the kind
/// rather than comparing error values.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, strum::Display)]
pub enum VerifyErrorKind {
    #[strum(serialize = "tx not stable")]
    TxNotStable,
    #[strum(serialize = "tx not found")]
    TxNotFound,
    #[strum(serialize = "rpc query error")]
    RpcQuery,
    #[strum(serialize = "sender not registered")]
    SenderNotRegistered,
    #[strum(serialize = "tx with wrong memo")]
    WrongMemo,
    #[strum(serialize = "tx with too big value")]
    BigValue,
    #[strum(serialize = "tx with wrong value")]
    WrongValue,
    #[strum(serialize = "tx with wrong receiver")]
    WrongReceiver,
    #[strum(serialize = "tx with wrong sender")]
    WrongSender,
    #[strum(serialize = "tx with wrong contract")]
    WrongContract,
    #[strum(serialize = "deposit log not found")]
    DepositLogNotFound,
    #[strum(serialize = "tx is not related swap tx")]
    NotOurSwap,
    #[strum(serialize = "unknown pair id")]
    UnknownPairId,
    #[strum(serialize = "malformed transaction")]
    MalformedTx,
}

impl VerifyErrorKind {
    /// The single gate between "persist the swap with a memo" and "reject
    /// outright". True for errors that a later re-verification can clear
    /// and for the non-fatal kinds whose statuses permit a retry.
    pub fn should_register_swap(self) -> bool {
        matches!(
            self,
            Self::TxNotStable
                | Self::TxNotFound
                | Self::RpcQuery
                | Self::SenderNotRegistered
                | Self::WrongMemo
                | Self::BigValue
        )
    }

    /// Initial registration status for a registrable kind
    pub fn registration_status(self) -> SwapStatus {
        match self {
            Self::TxNotStable | Self::TxNotFound | Self::RpcQuery => {
                SwapStatus::TxNotStable
            }
            Self::SenderNotRegistered => SwapStatus::TxSenderNotRegistered,
            Self::WrongMemo => SwapStatus::TxWithWrongMemo,
            Self::BigValue => SwapStatus::TxWithBigValue,
            // non-registrable kinds never reach persistence; fall back to
            // the initial status
            _ => SwapStatus::TxNotStable,
        }
    }
}

/// A transaction verification failure with its classification
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("{kind}: {message}")]
pub struct VerifyError {
    kind: VerifyErrorKind,
    message: String,
}

impl VerifyError {
    pub fn new(kind: VerifyErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> VerifyErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Non-verification bridge failures (transport, construction, hashing)
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("bridge transport error: {0}")]
    Transport(String),
    #[error("bridge rpc error {code}: {message}")]
    Rpc { code: i32, message: String },
    #[error("invalid bridge response: {0}")]
    InvalidResponse(String),
    #[error("msg hash mismatch: {0}")]
    MsgHashMismatch(String),
    #[error("bridge does not support {0}")]
    NotSupported(&'static str),
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registrable_kinds_are_exactly_the_recoverable_set() {
        use VerifyErrorKind as K;
        let registrable = [
            K::TxNotStable,
            K::TxNotFound,
            K::RpcQuery,
            K::SenderNotRegistered,
            K::WrongMemo,
            K::BigValue,
        ];
        for kind in registrable {
            assert!(kind.should_register_swap(), "{kind} should register");
        }
        let rejected = [
            K::WrongValue,
            K::WrongReceiver,
            K::WrongSender,
            K::WrongContract,
            K::DepositLogNotFound,
            K::NotOurSwap,
            K::UnknownPairId,
            K::MalformedTx,
        ];
        for kind in rejected {
            assert!(!kind.should_register_swap(), "{kind} should reject");
        }
    }

    #[test]
    fn registrable_error_statuses_permit_retry_where_expected() {
        use VerifyErrorKind as K;
        // "unverifiable now" kinds start at the initial status
        assert_eq!(
            K::TxNotStable.registration_status(),
            SwapStatus::TxNotStable
        );
        assert_eq!(K::TxNotFound.registration_status(), SwapStatus::TxNotStable);
        // non-fatal kinds map to the retryable statuses
        for kind in [K::SenderNotRegistered, K::WrongMemo, K::BigValue] {
            assert!(kind.registration_status().can_retry());
        }
    }
}
