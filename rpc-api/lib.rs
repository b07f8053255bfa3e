//! JSON-RPC surface of the bridge coordinator.
//!
//! The `#[rpc]` macro generates both the server trait implemented by the
//! app and the client used by the CLI.

use std::collections::BTreeMap;

use crossbridge::{
    config::TokenPairConfig,
    state::{LatestScanInfo, RegisteredAddress, SwapStatistics},
    swapapi::{P2shAddressInfo, ServerInfo, SwapInfo},
    types::{Swap, SwapResult},
};
use jsonrpsee::{core::RpcResult, proc_macros::rpc};

#[rpc(client, server)]
pub trait Rpc {
    /// Identifier, chain pair and version of this deployment
    #[method(name = "get_server_info")]
    async fn get_server_info(&self) -> RpcResult<ServerInfo>;

    /// Configuration of a token pair
    #[method(name = "get_token_pair_info")]
    async fn get_token_pair_info(
        &self,
        pair_id: String,
    ) -> RpcResult<TokenPairConfig>;

    /// Per-pair result counters
    #[method(name = "get_swap_statistics")]
    async fn get_swap_statistics(
        &self,
        pair_id: String,
    ) -> RpcResult<SwapStatistics>;

    /// Register a swapin by source-chain transaction hash
    #[method(name = "swapin")]
    async fn swapin(&self, txid: String, pair_id: String)
    -> RpcResult<String>;

    /// Register a swapout by destination-chain transaction hash
    #[method(name = "swapout")]
    async fn swapout(
        &self,
        txid: String,
        pair_id: String,
    ) -> RpcResult<String>;

    /// Reset a failed swapin for another processing round
    #[method(name = "retry_swapin")]
    async fn retry_swapin(
        &self,
        txid: String,
        pair_id: String,
    ) -> RpcResult<String>;

    /// Register a Bitcoin P2SH deposit
    #[method(name = "p2sh_swapin")]
    async fn p2sh_swapin(
        &self,
        txid: String,
        bind: String,
    ) -> RpcResult<String>;

    /// Merged registration/result view of a swapin
    #[method(name = "get_swapin")]
    async fn get_swapin(
        &self,
        txid: String,
        pair_id: String,
        bind: String,
    ) -> RpcResult<SwapInfo>;

    #[method(name = "get_swapout")]
    async fn get_swapout(
        &self,
        txid: String,
        pair_id: String,
        bind: String,
    ) -> RpcResult<SwapInfo>;

    /// Raw registration record of a swapin
    #[method(name = "get_raw_swapin")]
    async fn get_raw_swapin(
        &self,
        txid: String,
        pair_id: String,
        bind: String,
    ) -> RpcResult<Swap>;

    /// Raw result record of a swapin
    #[method(name = "get_raw_swapin_result")]
    async fn get_raw_swapin_result(
        &self,
        txid: String,
        pair_id: String,
        bind: String,
    ) -> RpcResult<SwapResult>;

    #[method(name = "get_raw_swapout")]
    async fn get_raw_swapout(
        &self,
        txid: String,
        pair_id: String,
        bind: String,
    ) -> RpcResult<Swap>;

    #[method(name = "get_raw_swapout_result")]
    async fn get_raw_swapout_result(
        &self,
        txid: String,
        pair_id: String,
        bind: String,
    ) -> RpcResult<SwapResult>;

    #[method(name = "get_swapin_history")]
    async fn get_swapin_history(
        &self,
        address: String,
        pair_id: String,
        offset: u64,
        limit: i64,
    ) -> RpcResult<Vec<SwapInfo>>;

    #[method(name = "get_swapout_history")]
    async fn get_swapout_history(
        &self,
        address: String,
        pair_id: String,
        offset: u64,
        limit: i64,
    ) -> RpcResult<Vec<SwapInfo>>;

    /// Register every swap log of a router transaction; returns
    /// `log index → "success" | "failed: <reason>"`
    #[method(name = "register_router_swap")]
    async fn register_router_swap(
        &self,
        from_chain_id: String,
        txid: String,
    ) -> RpcResult<BTreeMap<u32, String>>;

    #[method(name = "get_router_swap")]
    async fn get_router_swap(
        &self,
        from_chain_id: String,
        txid: String,
        log_index: u32,
    ) -> RpcResult<SwapInfo>;

    #[method(name = "get_router_swap_history")]
    async fn get_router_swap_history(
        &self,
        from_chain_id: String,
        address: String,
        offset: u64,
        limit: i64,
    ) -> RpcResult<Vec<SwapInfo>>;

    /// Derive and record the P2SH deposit address for a bind address
    #[method(name = "register_p2sh_address")]
    async fn register_p2sh_address(
        &self,
        bind_address: String,
    ) -> RpcResult<P2shAddressInfo>;

    /// Resolve a P2SH address back to its bind address
    #[method(name = "get_p2sh_address_info")]
    async fn get_p2sh_address_info(
        &self,
        p2sh_address: String,
    ) -> RpcResult<P2shAddressInfo>;

    /// Register a user address (lowercased before use)
    #[method(name = "register_address")]
    async fn register_address(&self, address: String) -> RpcResult<String>;

    #[method(name = "get_registered_address")]
    async fn get_registered_address(
        &self,
        address: String,
    ) -> RpcResult<RegisteredAddress>;

    /// Scan checkpoint of the source or destination chain
    #[method(name = "get_latest_scan_info")]
    async fn get_latest_scan_info(
        &self,
        is_src: bool,
    ) -> RpcResult<LatestScanInfo>;
}
