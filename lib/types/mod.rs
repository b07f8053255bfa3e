//! Core data types shared across the coordination plane

mod swap;

pub use swap::{
    RouterSwapFields, Swap, SwapDirection, SwapKey, SwapResult, SwapStatus,
    SwapTxType, normalize_bind, now_timestamp,
};

/// Crate version reported by `get_server_info`
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
