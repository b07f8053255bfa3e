//! API response types

use serde::{Deserialize, Serialize};

use crate::types::{
    RouterSwapFields, Swap, SwapResult, SwapStatus, SwapTxType,
};

/// Unified swap view merging the "pending registration" and "final result"
/// records
#[derive(Clone, Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct SwapInfo {
    pub txid: String,
    pub tx_type: SwapTxType,
    pub tx_to: String,
    pub bind: String,
    pub status: SwapStatus,
    pub timestamp: u64,
    pub memo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pair_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_chain_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_index: Option<u32>,
    /// Destination transaction hash, present once a result exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swap_tx: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swap_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swap_height: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swap_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swap_nonce: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router: Option<RouterSwapFields>,
}

impl From<&Swap> for SwapInfo {
    fn from(swap: &Swap) -> Self {
        Self {
            txid: swap.key.txid().to_owned(),
            tx_type: swap.tx_type,
            tx_to: swap.tx_to.clone(),
            bind: swap.bind.clone(),
            status: swap.status,
            timestamp: swap.timestamp,
            memo: swap.memo.clone(),
            pair_id: swap.key.pair_id().map(str::to_owned),
            from_chain_id: swap.key.from_chain_id().map(str::to_owned),
            log_index: swap.key.log_index(),
            swap_tx: None,
            swap_value: None,
            swap_height: None,
            swap_time: None,
            swap_nonce: None,
            router: swap.router.clone(),
        }
    }
}

impl From<&SwapResult> for SwapInfo {
    fn from(result: &SwapResult) -> Self {
        Self {
            txid: result.key.txid().to_owned(),
            tx_type: result.tx_type,
            tx_to: result.tx_to.clone(),
            bind: result.bind.clone(),
            status: result.status,
            timestamp: result.timestamp,
            memo: result.memo.clone(),
            pair_id: result.key.pair_id().map(str::to_owned),
            from_chain_id: result.key.from_chain_id().map(str::to_owned),
            log_index: result.key.log_index(),
            swap_tx: Some(result.swap_tx.clone()),
            swap_value: Some(result.value.clone()),
            swap_height: Some(result.swap_height),
            swap_time: Some(result.swap_time),
            swap_nonce: Some(result.swap_nonce),
            router: result.router.clone(),
        }
    }
}

/// Response of `get_server_info`
#[derive(Clone, Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct ServerInfo {
    pub identifier: String,
    pub src_chain: String,
    pub dest_chain: String,
    pub pair_ids: Vec<String>,
    pub version: String,
}

/// Response of the P2SH address endpoints
#[derive(Clone, Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct P2shAddressInfo {
    pub bind_address: String,
    pub p2sh_address: String,
    /// Hex-encoded redeem script
    pub redeem_script: String,
    /// Canonical textual disassembly of the redeem script
    pub redeem_script_disasm: String,
}
