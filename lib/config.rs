//! Coordinator configuration.
//!
//! Loaded once at startup from a JSON file and validated before anything
//! else runs; read-only afterwards.

use std::{net::SocketAddr, path::Path};

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("parse config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Gateway endpoint of a per-chain adapter daemon
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GatewayConfig {
    pub url: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

/// One side of the classic source/destination chain pair
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ChainConfig {
    pub name: String,
    /// Decimal big-integer chain id, absent for chains without one
    #[serde(default)]
    pub chain_id: Option<String>,
    /// EVM-family account chains compare addresses case-insensitively
    #[serde(default)]
    pub address_based: bool,
    /// The bridge manages destination nonces (retry permitted)
    #[serde(default)]
    pub enable_nonce: bool,
    /// Bitcoin P2SH deposit support
    #[serde(default)]
    pub enable_p2sh: bool,
    /// Threshold-signed sender account for classic swaps on this chain
    #[serde(default)]
    pub signer_address: String,
    pub gateway: GatewayConfig,
}

/// A chain participating in router swaps
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RouterChainConfig {
    pub name: String,
    pub chain_id: String,
    /// Threshold-signed router account on this chain
    pub router_mpc_address: String,
    pub gateway: GatewayConfig,
}

#[derive(Clone, Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct TokenConfig {
    pub symbol: String,
    pub decimals: u8,
    #[serde(default)]
    pub contract_address: Option<String>,
    #[serde(default)]
    pub deposit_address: Option<String>,
}

/// A configured (source token, destination token) mapping
#[derive(Clone, Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct TokenPairConfig {
    pub pair_id: String,
    pub src_token: TokenConfig,
    pub dest_token: TokenConfig,
}

/// Threshold-sign subsystem settings
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct MpcConfig {
    /// The sign-acceptance worker only runs when enabled
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub rpc_url: String,
    /// Accounts allowed to initiate sign requests
    #[serde(default)]
    pub initiators: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    /// This deployment's identifier; sign requests for other identifiers
    /// are ignored
    pub identifier: String,
    pub rpc_listen_addr: SocketAddr,
    pub src_chain: ChainConfig,
    pub dest_chain: ChainConfig,
    #[serde(default)]
    pub router_chains: Vec<RouterChainConfig>,
    pub pairs: Vec<TokenPairConfig>,
    /// Pair used for Bitcoin P2SH deposits, when the source chain is Bitcoin
    #[serde(default)]
    pub p2sh_pair_id: Option<String>,
    #[serde(default)]
    pub mpc: MpcConfig,
}

impl Config {
    pub fn load_from_path(path: &Path) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path).map_err(|source| {
            Error::Io {
                path: path.display().to_string(),
                source,
            }
        })?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.identifier.is_empty() {
            return Err(Error::Invalid("identifier must not be empty".into()));
        }
        for chain in [&self.src_chain, &self.dest_chain] {
            if let Some(chain_id) = &chain.chain_id {
                parse_chain_id(&chain.name, chain_id)?;
            }
        }
        for router in &self.router_chains {
            parse_chain_id(&router.name, &router.chain_id)?;
            if router.router_mpc_address.is_empty() {
                return Err(Error::Invalid(format!(
                    "router chain {} has no mpc address",
                    router.name
                )));
            }
        }
        let mut pair_ids: Vec<String> =
            self.pairs.iter().map(|p| p.pair_id.to_lowercase()).collect();
        pair_ids.sort();
        pair_ids.dedup();
        if pair_ids.len() != self.pairs.len() {
            return Err(Error::Invalid("duplicate pair id".into()));
        }
        if let Some(p2sh_pair) = &self.p2sh_pair_id {
            if self.find_pair(p2sh_pair).is_none() {
                return Err(Error::Invalid(format!(
                    "p2sh pair {p2sh_pair} is not configured"
                )));
            }
        }
        if self.mpc.enable {
            if self.mpc.rpc_url.is_empty() {
                return Err(Error::Invalid(
                    "mpc enabled without an rpc url".into(),
                ));
            }
            if self.mpc.initiators.is_empty() {
                return Err(Error::Invalid(
                    "mpc enabled without initiators".into(),
                ));
            }
        }
        Ok(())
    }

    /// Look up a pair config; pair ids are case-insensitive
    pub fn find_pair(&self, pair_id: &str) -> Option<&TokenPairConfig> {
        self.pairs
            .iter()
            .find(|p| p.pair_id.eq_ignore_ascii_case(pair_id))
    }

    pub fn pair_ids(&self) -> Vec<String> {
        self.pairs.iter().map(|p| p.pair_id.to_lowercase()).collect()
    }

    /// Whether the account is a configured sign-request initiator
    pub fn is_initiator(&self, account: &str) -> bool {
        self.mpc
            .initiators
            .iter()
            .any(|i| i.eq_ignore_ascii_case(account))
    }
}

fn parse_chain_id(chain_name: &str, chain_id: &str) -> Result<BigUint, Error> {
    chain_id.parse::<BigUint>().map_err(|err| {
        Error::Invalid(format!(
            "chain {chain_name} has invalid chain id {chain_id:?}: {err}"
        ))
    })
}
