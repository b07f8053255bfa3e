//! API-layer services: swap registration, queries and P2SH addresses.
//!
//! Everything here is stateless with respect to other requests; concurrency
//! safety is delegated to the store's per-transaction atomicity.

use thiserror::Error;

use crate::{
    state,
    tokens::{BridgeError, VerifyError},
};

mod p2sh;
mod query;
mod register;
mod types;

pub use p2sh::{get_p2sh_address_info, register_p2sh_address};
pub use query::{
    get_latest_scan_info, get_raw_swap, get_raw_swap_result,
    get_registered_address, get_router_swap, get_router_swap_history,
    get_server_info, get_swap, get_swap_history, get_swap_statistics,
    get_token_pair_info, process_history_limit, register_address,
};
pub use register::{
    p2sh_swapin, register_router_swap, retry_swapin, swapin, swapout,
};
pub use types::{P2shAddressInfo, ServerInfo, SwapInfo};

#[derive(Debug, Error)]
pub enum Error {
    #[error("swap cannot retry")]
    SwapCannotRetry,
    #[error("token pair does not exist: {0}")]
    TokenPairNotExist(String),
    #[error("bridge is not btc")]
    NotBtcBridge,
    #[error("swap is not found")]
    SwapNotFound,
    #[error("address is not registered")]
    AddressNotRegistered,
    #[error("p2sh address is not registered")]
    P2shMappingNotFound,
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("no bridge for chain id {0}")]
    NoBridgeForChainId(String),
    #[error("router swap not supported on chain {0}")]
    RouterSwapNotSupported(String),
    #[error("verify swap failed! {0}")]
    CannotVerify(VerifyError),
    #[error(transparent)]
    Store(state::Error),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl From<state::Error> for Error {
    fn from(err: state::Error) -> Self {
        match err {
            state::Error::SwapNotFound { .. } => Self::SwapNotFound,
            other => Self::Store(other),
        }
    }
}
