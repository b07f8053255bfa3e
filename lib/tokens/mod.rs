//! Chain bridge abstraction and registry.
//!
//! All chain-specific knowledge lives behind the [`ChainBridge`] trait; the
//! coordination plane only ever talks to a bridge through this capability
//! set. Optional capabilities are exposed as accessor methods returning
//! trait objects rather than runtime downcasts.

use std::{collections::HashMap, sync::Arc};

use num_bigint::BigUint;
use num_traits::Zero as _;
use serde::{Deserialize, Serialize};

use crate::types::{RouterSwapFields, SwapDirection, SwapTxType};

mod errors;

pub use errors::{BridgeError, VerifyError, VerifyErrorKind};

/// Identifier accepted on sign requests that replace a stuck swap
/// transaction, in addition to the node's own configured identifier.
pub const REPLACE_SWAP_IDENTIFIER: &str = "ReplaceSwap";

/// Parse a decimal big-integer value string, rejecting zero. Values and
/// amounts cross the wire as strings to survive chains whose units exceed
/// u64.
pub fn parse_nonzero_value(s: &str) -> Option<BigUint> {
    let value = s.parse::<BigUint>().ok()?;
    if value.is_zero() { None } else { Some(value) }
}

/// Canonical view of a verified on-chain swap transaction
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
pub struct TxSwapInfo {
    pub pair_id: String,
    pub txid: String,
    /// Contract or deposit address the transaction paid into
    pub tx_to: String,
    pub from: String,
    /// Destination-chain receiver
    pub bind: String,
    /// Decimal big-integer string
    pub value: String,
    pub height: u64,
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router: Option<RouterSwapFields>,
}

/// Mining status of an on-chain transaction
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
pub struct TxStatus {
    pub block_height: u64,
    pub confirmations: u64,
}

/// Opaque destination-chain transaction bytes; only the owning bridge can
/// interpret them
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RawTx(pub Vec<u8>);

/// Result of deriving a P2SH deposit address for a bind address
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct P2shAddressPair {
    pub p2sh_address: String,
    #[serde(with = "hex::serde")]
    pub redeem_script: Vec<u8>,
}

/// Arguments for constructing a destination-chain transaction.
///
/// This document is also what circulates as the sign request's msg context:
/// each follower deserializes it, rebuilds the transaction and compares
/// hashes.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BuildTxArgs {
    pub identifier: String,
    /// Source-chain transaction hash of the swap
    pub swap_id: String,
    pub tx_type: SwapTxType,
    #[serde(default)]
    pub pair_id: String,
    #[serde(default)]
    pub bind: String,
    #[serde(default)]
    pub log_index: u32,
    #[serde(default)]
    pub from_chain_id: String,
    #[serde(default)]
    pub to_chain_id: String,
    pub swap_info: TxSwapInfo,
    /// Sender on the destination chain (the threshold-signed account)
    #[serde(default)]
    pub from: String,
    /// Value observed on the source chain, decimal big-integer string
    #[serde(default)]
    pub origin_value: Option<String>,
    #[serde(default)]
    pub extra: Option<serde_json::Value>,
}

/// One per-log outcome of scanning a router swap transaction
#[derive(Debug)]
pub struct RouterRegisterItem {
    pub log_index: u32,
    pub result: Result<TxSwapInfo, VerifyError>,
}

/// A chain adapter.
///
/// Implementations are expected to be cheap to share (`Arc<dyn ChainBridge>`)
/// and safe to call from blocking worker threads.
pub trait ChainBridge: Send + Sync {
    fn chain_name(&self) -> &str;

    /// Decimal big-integer chain id for chains that have one
    fn chain_id(&self) -> Option<&str> {
        None
    }

    /// Whether binds on this chain are case-insensitive account addresses
    fn is_address_based(&self) -> bool;

    /// Whether the bridge manages destination nonces, which is what makes
    /// controlled re-registration safe
    fn supports_nonce(&self) -> bool {
        false
    }

    /// The threshold-signed account used as sender for classic swaps built
    /// on this chain
    fn signer_address(&self) -> &str;

    fn verify_transaction(
        &self,
        pair_id: &str,
        txid: &str,
        allow_unstable: bool,
    ) -> Result<TxSwapInfo, VerifyError>;

    fn get_transaction_status(&self, txid: &str)
    -> Result<TxStatus, BridgeError>;

    fn build_raw_transaction(
        &self,
        args: &BuildTxArgs,
    ) -> Result<RawTx, BridgeError>;

    /// Recompute the signing hash(es) of `raw_tx` and require bit-exact
    /// equality with `expected_hashes`
    fn verify_msg_hash(
        &self,
        raw_tx: &RawTx,
        expected_hashes: &[String],
    ) -> Result<(), BridgeError>;

    fn is_valid_address(&self, address: &str) -> bool;

    /// Router capability, when the chain participates in router swaps
    fn router(&self) -> Option<&dyn RouterBridge> {
        None
    }

    /// Bitcoin P2SH capability
    fn p2sh(&self) -> Option<&dyn P2shBridge> {
        None
    }
}

/// Router swap capability
pub trait RouterBridge: Send + Sync {
    /// Scan the transaction's event logs and return one item per swap log
    fn register_router_swap_tx(
        &self,
        txid: &str,
    ) -> Result<Vec<RouterRegisterItem>, BridgeError>;

    fn verify_router_swap_tx(
        &self,
        txid: &str,
        log_index: u32,
        allow_unstable: bool,
    ) -> Result<TxSwapInfo, VerifyError>;

    /// The threshold-signed router account on this chain
    fn router_mpc_address(&self) -> &str;
}

/// Bitcoin P2SH deposit capability
pub trait P2shBridge: Send + Sync {
    fn get_p2sh_address(
        &self,
        bind_address: &str,
    ) -> Result<P2shAddressPair, BridgeError>;

    fn verify_p2sh_transaction(
        &self,
        pair_id: &str,
        txid: &str,
        bind_address: &str,
        allow_unstable: bool,
    ) -> Result<TxSwapInfo, VerifyError>;
}

/// Process-wide bridge registry.
///
/// Built once at startup and read-only afterwards; carried inside
/// [`crate::core::Core`] instead of a global.
#[derive(Clone)]
pub struct Bridges {
    src: Arc<dyn ChainBridge>,
    dest: Arc<dyn ChainBridge>,
    by_chain_id: HashMap<String, Arc<dyn ChainBridge>>,
}

impl Bridges {
    /// Build the registry from the classic source/destination pair. Bridges
    /// that expose a chain id are also reachable through the chain-id map.
    pub fn new(src: Arc<dyn ChainBridge>, dest: Arc<dyn ChainBridge>) -> Self {
        let mut by_chain_id = HashMap::new();
        for bridge in [&src, &dest] {
            if let Some(chain_id) = bridge.chain_id() {
                by_chain_id.insert(chain_id.to_owned(), Arc::clone(bridge));
            }
        }
        Self {
            src,
            dest,
            by_chain_id,
        }
    }

    /// Register an additional router bridge under its chain id
    pub fn register_chain(
        &mut self,
        bridge: Arc<dyn ChainBridge>,
    ) -> Result<(), BridgeError> {
        let Some(chain_id) = bridge.chain_id() else {
            return Err(BridgeError::InvalidResponse(format!(
                "bridge {} has no chain id",
                bridge.chain_name()
            )));
        };
        if self
            .by_chain_id
            .insert(chain_id.to_owned(), Arc::clone(&bridge))
            .is_some()
        {
            return Err(BridgeError::InvalidResponse(format!(
                "duplicate bridge for chain id {chain_id}"
            )));
        }
        Ok(())
    }

    pub fn source(&self) -> &Arc<dyn ChainBridge> {
        &self.src
    }

    pub fn destination(&self) -> &Arc<dyn ChainBridge> {
        &self.dest
    }

    /// The bridge that observes the swap transaction for a direction
    pub fn by_direction(
        &self,
        direction: SwapDirection,
    ) -> &Arc<dyn ChainBridge> {
        match direction {
            SwapDirection::Swapin => &self.src,
            SwapDirection::Swapout => &self.dest,
        }
    }

    /// The bridge that builds the counterpart transaction for a direction
    pub fn counterpart(
        &self,
        direction: SwapDirection,
    ) -> &Arc<dyn ChainBridge> {
        match direction {
            SwapDirection::Swapin => &self.dest,
            SwapDirection::Swapout => &self.src,
        }
    }

    pub fn by_chain_id(
        &self,
        chain_id: &str,
    ) -> Option<&Arc<dyn ChainBridge>> {
        self.by_chain_id.get(chain_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_strings_parse_as_nonzero_big_integers() {
        assert!(parse_nonzero_value("1000").is_some());
        // beyond u64
        assert!(
            parse_nonzero_value("340282366920938463463374607431768211456")
                .is_some()
        );
        assert!(parse_nonzero_value("0").is_none());
        assert!(parse_nonzero_value("").is_none());
        assert!(parse_nonzero_value("0x10").is_none());
        assert!(parse_nonzero_value("-5").is_none());
        assert!(parse_nonzero_value("1.5").is_none());
    }
}
