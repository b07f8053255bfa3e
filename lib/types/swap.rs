//! Swap records, identities and lifecycle

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Unix timestamp in seconds
pub fn now_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Normalize a bind address for use in a swap identity.
///
/// Address-based chains (EVM-family and router chains) compare addresses
/// case-insensitively, so the bind is lowercased there. Other chains
/// (e.g. Bitcoin base58/bech32) are case-sensitive and keep the original.
pub fn normalize_bind(bind: &str, address_based: bool) -> String {
    if address_based {
        bind.to_lowercase()
    } else {
        bind.to_owned()
    }
}

/// Direction of a classic swap relative to the configured chain pair
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    PartialEq,
    Serialize,
    utoipa::ToSchema,
)]
pub enum SwapDirection {
    /// Deposit on the source chain, counterpart minted on the destination
    Swapin,
    /// Burn on the destination chain, counterpart released on the source
    Swapout,
}

/// Kind of on-chain transaction that produced a swap registration
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    PartialEq,
    Serialize,
    strum::Display,
    utoipa::ToSchema,
)]
pub enum SwapTxType {
    SwapinTx,
    SwapoutTx,
    P2shSwapinTx,
    RouterSwapTx,
}

impl SwapTxType {
    /// Direction of the classic flavors. Router swaps are keyed by chain id
    /// instead of direction.
    pub fn direction(&self) -> Option<SwapDirection> {
        match self {
            Self::SwapinTx | Self::P2shSwapinTx => Some(SwapDirection::Swapin),
            Self::SwapoutTx => Some(SwapDirection::Swapout),
            Self::RouterSwapTx => None,
        }
    }
}

/// Swap lifecycle status.
///
/// A registration starts at `TxNotStable` (or one of the non-fatal error
/// statuses) and is advanced by downstream executors:
/// `TxNotStable → TxVerified → Processing → MatchTxNotStable → MatchTxStable`
/// on success, or to one of the failure statuses.
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    PartialEq,
    Serialize,
    strum::Display,
    utoipa::ToSchema,
)]
pub enum SwapStatus {
    TxNotStable,
    TxVerified,
    Processing,
    MatchTxEmpty,
    MatchTxNotStable,
    MatchTxStable,
    TxWithBigValue,
    TxWithWrongMemo,
    TxSenderNotRegistered,
    TxSwapFailed,
    TxCanRecall,
    ManualMakeFail,
}

impl SwapStatus {
    /// Whether a registration in this status may be reset by `retry_swapin`.
    /// Only the non-terminal failure statuses qualify.
    pub fn can_retry(&self) -> bool {
        matches!(
            self,
            Self::TxWithBigValue
                | Self::TxWithWrongMemo
                | Self::TxSenderNotRegistered
        )
    }

    /// Whether this status marks a finished (successful or failed) swap
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::MatchTxStable
                | Self::TxSwapFailed
                | Self::TxCanRecall
                | Self::ManualMakeFail
        )
    }
}

/// Composite identity of a swap registration or result.
///
/// Classic swaps are unique per `(direction, pair, txid, bind)`; router
/// swaps are unique per `(from chain, txid, log index)`, which permits many
/// swaps per transaction (one per event log).
#[derive(
    Clone,
    Debug,
    Deserialize,
    Eq,
    Hash,
    PartialEq,
    Serialize,
    utoipa::ToSchema,
)]
pub enum SwapKey {
    Classic {
        direction: SwapDirection,
        pair_id: String,
        txid: String,
        bind: String,
    },
    Router {
        from_chain_id: String,
        txid: String,
        log_index: u32,
    },
}

impl SwapKey {
    /// Classic key. The pair id is case-insensitive and stored lowercased;
    /// the bind must already be normalized for the source chain.
    pub fn classic(
        direction: SwapDirection,
        pair_id: &str,
        txid: &str,
        bind: &str,
    ) -> Self {
        Self::Classic {
            direction,
            pair_id: pair_id.to_lowercase(),
            txid: txid.to_owned(),
            bind: bind.to_owned(),
        }
    }

    pub fn router(from_chain_id: &str, txid: &str, log_index: u32) -> Self {
        Self::Router {
            from_chain_id: from_chain_id.to_owned(),
            txid: txid.to_owned(),
            log_index,
        }
    }

    pub fn txid(&self) -> &str {
        match self {
            Self::Classic { txid, .. } | Self::Router { txid, .. } => txid,
        }
    }

    pub fn pair_id(&self) -> Option<&str> {
        match self {
            Self::Classic { pair_id, .. } => Some(pair_id),
            Self::Router { .. } => None,
        }
    }

    pub fn bind(&self) -> Option<&str> {
        match self {
            Self::Classic { bind, .. } => Some(bind),
            Self::Router { .. } => None,
        }
    }

    pub fn from_chain_id(&self) -> Option<&str> {
        match self {
            Self::Classic { .. } => None,
            Self::Router { from_chain_id, .. } => Some(from_chain_id),
        }
    }

    pub fn log_index(&self) -> Option<u32> {
        match self {
            Self::Classic { .. } => None,
            Self::Router { log_index, .. } => Some(*log_index),
        }
    }
}

/// Router-specific swap fields carried by both the on-chain event info and
/// the persisted router swap records
#[derive(
    Clone,
    Debug,
    Default,
    Deserialize,
    Eq,
    PartialEq,
    Serialize,
    utoipa::ToSchema,
)]
pub struct RouterSwapFields {
    pub token: String,
    /// Ordered hop addresses on the destination chain
    pub path: Vec<String>,
    /// Decimal big-integer string
    pub amount_out_min: String,
    pub from_chain_id: String,
    pub to_chain_id: String,
    pub log_index: u32,
    /// Deliver native coin on the destination chain
    pub for_native: bool,
    /// Unwrap to the underlying token
    pub for_underlying: bool,
}

/// A swap registration record
#[derive(
    Clone, Debug, Deserialize, Eq, PartialEq, Serialize, utoipa::ToSchema,
)]
pub struct Swap {
    pub key: SwapKey,
    pub tx_type: SwapTxType,
    /// Contract or deposit address observed on-chain (empty while the
    /// transaction could not be inspected yet)
    pub tx_to: String,
    /// Bind address; equals the key bind for classic swaps, the receiver
    /// for router swaps
    pub bind: String,
    pub status: SwapStatus,
    pub timestamp: u64,
    /// Last error text, empty on success
    pub memo: String,
    pub router: Option<RouterSwapFields>,
}

impl Swap {
    pub fn classic(
        tx_type: SwapTxType,
        pair_id: &str,
        txid: &str,
        bind: &str,
        tx_to: &str,
        status: SwapStatus,
        memo: String,
    ) -> Self {
        let direction = tx_type
            .direction()
            .unwrap_or(SwapDirection::Swapin);
        Self {
            key: SwapKey::classic(direction, pair_id, txid, bind),
            tx_type,
            tx_to: tx_to.to_owned(),
            bind: bind.to_owned(),
            status,
            timestamp: now_timestamp(),
            memo,
            router: None,
        }
    }

    pub fn router(
        from_chain_id: &str,
        txid: &str,
        log_index: u32,
        bind: &str,
        tx_to: &str,
        fields: RouterSwapFields,
        status: SwapStatus,
        memo: String,
    ) -> Self {
        Self {
            key: SwapKey::router(from_chain_id, txid, log_index),
            tx_type: SwapTxType::RouterSwapTx,
            tx_to: tx_to.to_owned(),
            bind: bind.to_owned(),
            status,
            timestamp: now_timestamp(),
            memo,
            router: Some(fields),
        }
    }
}

/// A post-execution swap result record, written by downstream executors
#[derive(
    Clone, Debug, Deserialize, Eq, PartialEq, Serialize, utoipa::ToSchema,
)]
pub struct SwapResult {
    pub key: SwapKey,
    pub tx_type: SwapTxType,
    pub tx_to: String,
    pub bind: String,
    pub status: SwapStatus,
    pub timestamp: u64,
    pub memo: String,
    /// Destination transaction hash
    pub swap_tx: String,
    /// Swapped value, decimal big-integer string
    pub value: String,
    pub swap_height: u64,
    pub swap_time: u64,
    pub swap_nonce: u64,
    pub swap_type: SwapTxType,
    pub router: Option<RouterSwapFields>,
}

impl SwapResult {
    /// Seed a result record from a registration. Executors fill in the
    /// destination transaction fields afterwards.
    pub fn from_swap(swap: &Swap, swap_tx: &str, value: &str) -> Self {
        Self {
            key: swap.key.clone(),
            tx_type: swap.tx_type,
            tx_to: swap.tx_to.clone(),
            bind: swap.bind.clone(),
            status: SwapStatus::MatchTxNotStable,
            timestamp: now_timestamp(),
            memo: String::new(),
            swap_tx: swap_tx.to_owned(),
            value: value.to_owned(),
            swap_height: 0,
            swap_time: 0,
            swap_nonce: 0,
            swap_type: swap.tx_type,
            router: swap.router.clone(),
        }
    }
}
