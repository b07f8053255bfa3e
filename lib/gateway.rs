//! JSON-RPC gateway bridge adapter.
//!
//! The one concrete [`ChainBridge`] implementation: every capability call is
//! forwarded to a per-chain adapter daemon that implements the standard
//! `bridge_*` JSON-RPC interface. Chain-specific knowledge (contract ABIs,
//! script formats, confirmation rules) lives in the daemon; this client only
//! shuttles documents and classifies errors.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    config::{ChainConfig, GatewayConfig, RouterChainConfig},
    tokens::{
        BridgeError, BuildTxArgs, ChainBridge, P2shAddressPair, P2shBridge,
        RawTx, RouterBridge, RouterRegisterItem, TxStatus, TxSwapInfo,
        VerifyError, VerifyErrorKind,
    },
};

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i32,
    message: String,
}

/// Adapter daemons report verification failures with these codes so the
/// coordinator can classify without parsing message text
fn verify_kind_from_code(code: i32) -> VerifyErrorKind {
    match code {
        -20001 => VerifyErrorKind::TxNotStable,
        -20002 => VerifyErrorKind::TxNotFound,
        -20003 => VerifyErrorKind::SenderNotRegistered,
        -20004 => VerifyErrorKind::WrongMemo,
        -20005 => VerifyErrorKind::BigValue,
        -20006 => VerifyErrorKind::WrongValue,
        -20007 => VerifyErrorKind::WrongReceiver,
        -20008 => VerifyErrorKind::WrongSender,
        -20009 => VerifyErrorKind::WrongContract,
        -20010 => VerifyErrorKind::DepositLogNotFound,
        -20011 => VerifyErrorKind::NotOurSwap,
        -20012 => VerifyErrorKind::UnknownPairId,
        -20013 => VerifyErrorKind::MalformedTx,
        _ => VerifyErrorKind::RpcQuery,
    }
}

/// Wire form of one router registration item
#[derive(Debug, Deserialize, Serialize)]
struct RouterRegisterItemWire {
    log_index: u32,
    #[serde(default)]
    swap_info: Option<TxSwapInfo>,
    #[serde(default)]
    error_code: Option<i32>,
    #[serde(default)]
    error: Option<String>,
}

struct GatewayClient {
    config: GatewayConfig,
    client: reqwest::blocking::Client,
}

impl GatewayClient {
    fn new(config: GatewayConfig) -> Result<Self, BridgeError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| BridgeError::Transport(err.to_string()))?;
        Ok(Self { config, client })
    }

    fn call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, BridgeError> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": "crossbridge",
            "method": method,
            "params": params
        });

        tracing::debug!(
            url = %self.config.url,
            method = %method,
            "gateway call"
        );

        let mut request_builder =
            self.client.post(&self.config.url).json(&request);
        if !self.config.user.is_empty() {
            request_builder = request_builder
                .basic_auth(&self.config.user, Some(&self.config.password));
        }

        let response = request_builder.send().map_err(|err| {
            tracing::warn!(
                url = %self.config.url,
                method = %method,
                error = %err,
                "gateway request failed"
            );
            BridgeError::Transport(err.to_string())
        })?;

        let response: RpcResponse<T> = response
            .json()
            .map_err(|err| BridgeError::Transport(err.to_string()))?;

        if let Some(error) = response.error {
            tracing::debug!(
                url = %self.config.url,
                method = %method,
                code = error.code,
                message = %error.message,
                "gateway returned error"
            );
            return Err(BridgeError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        response.result.ok_or_else(|| {
            BridgeError::InvalidResponse(format!(
                "{method}: missing result"
            ))
        })
    }

    /// Verification calls classify gateway errors into [`VerifyError`]s
    fn call_verify(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<TxSwapInfo, VerifyError> {
        match self.call::<TxSwapInfo>(method, params) {
            Ok(info) => Ok(info),
            Err(BridgeError::Rpc { code, message }) => {
                Err(VerifyError::new(verify_kind_from_code(code), message))
            }
            Err(err) => {
                Err(VerifyError::new(VerifyErrorKind::RpcQuery, err.to_string()))
            }
        }
    }
}

/// A chain adapter reached over its gateway daemon
pub struct GatewayBridge {
    name: String,
    chain_id: Option<String>,
    address_based: bool,
    supports_nonce: bool,
    enable_p2sh: bool,
    signer_address: String,
    router_mpc_address: Option<String>,
    client: GatewayClient,
}

impl GatewayBridge {
    pub fn from_chain_config(config: &ChainConfig) -> Result<Self, BridgeError> {
        Ok(Self {
            name: config.name.clone(),
            chain_id: config.chain_id.clone(),
            address_based: config.address_based,
            supports_nonce: config.enable_nonce,
            enable_p2sh: config.enable_p2sh,
            signer_address: config.signer_address.clone(),
            router_mpc_address: None,
            client: GatewayClient::new(config.gateway.clone())?,
        })
    }

    pub fn from_router_config(
        config: &RouterChainConfig,
    ) -> Result<Self, BridgeError> {
        Ok(Self {
            name: config.name.clone(),
            chain_id: Some(config.chain_id.clone()),
            // router chains are account chains
            address_based: true,
            supports_nonce: true,
            enable_p2sh: false,
            signer_address: config.router_mpc_address.clone(),
            router_mpc_address: Some(config.router_mpc_address.clone()),
            client: GatewayClient::new(config.gateway.clone())?,
        })
    }
}

impl ChainBridge for GatewayBridge {
    fn chain_name(&self) -> &str {
        &self.name
    }

    fn chain_id(&self) -> Option<&str> {
        self.chain_id.as_deref()
    }

    fn is_address_based(&self) -> bool {
        self.address_based
    }

    fn supports_nonce(&self) -> bool {
        self.supports_nonce
    }

    fn signer_address(&self) -> &str {
        &self.signer_address
    }

    fn verify_transaction(
        &self,
        pair_id: &str,
        txid: &str,
        allow_unstable: bool,
    ) -> Result<TxSwapInfo, VerifyError> {
        self.client.call_verify(
            "bridge_verifyTransaction",
            json!([pair_id, txid, allow_unstable]),
        )
    }

    fn get_transaction_status(
        &self,
        txid: &str,
    ) -> Result<TxStatus, BridgeError> {
        self.client.call("bridge_getTransactionStatus", json!([txid]))
    }

    fn build_raw_transaction(
        &self,
        args: &BuildTxArgs,
    ) -> Result<RawTx, BridgeError> {
        let raw_hex: String = self
            .client
            .call("bridge_buildRawTransaction", json!([args]))?;
        let raw = hex::decode(raw_hex.trim_start_matches("0x")).map_err(
            |err| {
                BridgeError::InvalidResponse(format!(
                    "raw tx is not hex: {err}"
                ))
            },
        )?;
        Ok(RawTx(raw))
    }

    fn verify_msg_hash(
        &self,
        raw_tx: &RawTx,
        expected_hashes: &[String],
    ) -> Result<(), BridgeError> {
        let matches: bool = self.client.call(
            "bridge_verifyMsgHash",
            json!([hex::encode(&raw_tx.0), expected_hashes]),
        )?;
        if matches {
            Ok(())
        } else {
            Err(BridgeError::MsgHashMismatch(format!(
                "recomputed hashes differ from {expected_hashes:?}"
            )))
        }
    }

    fn is_valid_address(&self, address: &str) -> bool {
        match self
            .client
            .call::<bool>("bridge_isValidAddress", json!([address]))
        {
            Ok(valid) => valid,
            Err(err) => {
                tracing::warn!(
                    chain = %self.name,
                    address = %address,
                    error = %err,
                    "address validation failed, treating as invalid"
                );
                false
            }
        }
    }

    fn router(&self) -> Option<&dyn RouterBridge> {
        if self.router_mpc_address.is_some() {
            Some(self)
        } else {
            None
        }
    }

    fn p2sh(&self) -> Option<&dyn P2shBridge> {
        if self.enable_p2sh { Some(self) } else { None }
    }
}

impl RouterBridge for GatewayBridge {
    fn register_router_swap_tx(
        &self,
        txid: &str,
    ) -> Result<Vec<RouterRegisterItem>, BridgeError> {
        let items: Vec<RouterRegisterItemWire> = self
            .client
            .call("bridge_registerRouterSwap", json!([txid]))?;
        let items = items
            .into_iter()
            .map(|item| {
                let result = match (item.swap_info, item.error_code) {
                    (Some(info), None) => Ok(info),
                    (_, Some(code)) => Err(VerifyError::new(
                        verify_kind_from_code(code),
                        item.error.unwrap_or_default(),
                    )),
                    (None, None) => Err(VerifyError::new(
                        VerifyErrorKind::RpcQuery,
                        "item carries neither swap info nor error",
                    )),
                };
                RouterRegisterItem {
                    log_index: item.log_index,
                    result,
                }
            })
            .collect();
        Ok(items)
    }

    fn verify_router_swap_tx(
        &self,
        txid: &str,
        log_index: u32,
        allow_unstable: bool,
    ) -> Result<TxSwapInfo, VerifyError> {
        self.client.call_verify(
            "bridge_verifyRouterSwapTx",
            json!([txid, log_index, allow_unstable]),
        )
    }

    fn router_mpc_address(&self) -> &str {
        self.router_mpc_address.as_deref().unwrap_or_default()
    }
}

impl P2shBridge for GatewayBridge {
    fn get_p2sh_address(
        &self,
        bind_address: &str,
    ) -> Result<P2shAddressPair, BridgeError> {
        self.client.call("bridge_getP2shAddress", json!([bind_address]))
    }

    fn verify_p2sh_transaction(
        &self,
        pair_id: &str,
        txid: &str,
        bind_address: &str,
        allow_unstable: bool,
    ) -> Result<TxSwapInfo, VerifyError> {
        self.client.call_verify(
            "bridge_verifyP2shTransaction",
            json!([pair_id, txid, bind_address, allow_unstable]),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_error_codes_classify_as_rpc_query() {
        assert_eq!(verify_kind_from_code(-20001), VerifyErrorKind::TxNotStable);
        assert_eq!(verify_kind_from_code(-20002), VerifyErrorKind::TxNotFound);
        assert_eq!(verify_kind_from_code(-1), VerifyErrorKind::RpcQuery);
        assert_eq!(verify_kind_from_code(0), VerifyErrorKind::RpcQuery);
    }

    #[test]
    fn router_capability_follows_the_mpc_address() {
        let chain = ChainConfig {
            name: "Bitcoin".into(),
            chain_id: None,
            address_based: false,
            enable_nonce: false,
            enable_p2sh: true,
            signer_address: String::new(),
            gateway: GatewayConfig {
                url: "http://localhost:8332".into(),
                user: String::new(),
                password: String::new(),
            },
        };
        let bridge = GatewayBridge::from_chain_config(&chain).unwrap();
        assert!(bridge.router().is_none());
        assert!(bridge.p2sh().is_some());
        assert!(!bridge.supports_nonce());

        let router = RouterChainConfig {
            name: "BSC".into(),
            chain_id: "56".into(),
            router_mpc_address: "0xmpc".into(),
            gateway: GatewayConfig {
                url: "http://localhost:8575".into(),
                user: String::new(),
                password: String::new(),
            },
        };
        let bridge = GatewayBridge::from_router_config(&router).unwrap();
        assert!(bridge.router().is_some());
        assert!(bridge.p2sh().is_none());
        assert_eq!(bridge.chain_id(), Some("56"));
    }
}
