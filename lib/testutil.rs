//! In-memory mock bridges and a scratch core for unit tests

use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;

use crate::{
    config::{
        ChainConfig, Config, GatewayConfig, MpcConfig, TokenConfig,
        TokenPairConfig,
    },
    core::Core,
    state::{self, Store},
    tokens::{
        BridgeError, Bridges, BuildTxArgs, ChainBridge, P2shAddressPair,
        P2shBridge, RawTx, RouterBridge, RouterRegisterItem, TxStatus,
        TxSwapInfo, VerifyError, VerifyErrorKind,
    },
};

/// The mock's "signing hash" of a raw transaction
pub(crate) fn mock_msg_hash(args: &BuildTxArgs) -> String {
    hex::encode(serde_json::to_vec(args).expect("args serialize"))
}

#[derive(Default)]
pub(crate) struct MockBridge {
    pub name: String,
    pub chain_id: Option<String>,
    pub address_based: bool,
    pub supports_nonce: bool,
    pub signer: String,
    pub router_mpc: Option<String>,
    pub p2sh_enabled: bool,
    /// txid (or "txid:log_index") → verification outcome
    pub verify_results:
        Mutex<HashMap<String, Result<TxSwapInfo, VerifyError>>>,
    /// outcomes that only the stable view (`allow_unstable = false`) sees;
    /// falls back to `verify_results` when absent
    pub verify_results_stable:
        Mutex<HashMap<String, Result<TxSwapInfo, VerifyError>>>,
    pub verify_calls: Mutex<u32>,
    pub tx_status: Mutex<HashMap<String, TxStatus>>,
    /// txid → per-log outcomes
    pub router_items:
        Mutex<HashMap<String, Vec<(u32, Result<TxSwapInfo, VerifyError>)>>>,
    /// bind → derived p2sh pair
    pub p2sh_pairs: Mutex<HashMap<String, P2shAddressPair>>,
}

impl MockBridge {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            signer: format!("{name}-signer"),
            ..Self::default()
        }
    }

    pub fn set_verify(
        &self,
        key: &str,
        result: Result<TxSwapInfo, VerifyError>,
    ) {
        self.verify_results.lock().insert(key.to_owned(), result);
    }

    pub fn set_verify_stable(
        &self,
        key: &str,
        result: Result<TxSwapInfo, VerifyError>,
    ) {
        self.verify_results_stable
            .lock()
            .insert(key.to_owned(), result);
    }

    pub fn set_status(&self, txid: &str, status: TxStatus) {
        self.tx_status.lock().insert(txid.to_owned(), status);
    }

    fn lookup_verify(
        &self,
        key: &str,
        allow_unstable: bool,
    ) -> Result<TxSwapInfo, VerifyError> {
        *self.verify_calls.lock() += 1;
        if !allow_unstable {
            if let Some(result) = self.verify_results_stable.lock().get(key) {
                return result.clone();
            }
        }
        self.verify_results
            .lock()
            .get(key)
            .cloned()
            .unwrap_or_else(|| {
                Err(VerifyError::new(
                    VerifyErrorKind::TxNotFound,
                    format!("no mock result for {key}"),
                ))
            })
    }
}

impl ChainBridge for MockBridge {
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
        &self.signer
    }

    fn verify_transaction(
        &self,
        _pair_id: &str,
        txid: &str,
        allow_unstable: bool,
    ) -> Result<TxSwapInfo, VerifyError> {
        self.lookup_verify(txid, allow_unstable)
    }

    fn get_transaction_status(
        &self,
        txid: &str,
    ) -> Result<TxStatus, BridgeError> {
        Ok(self
            .tx_status
            .lock()
            .get(txid)
            .copied()
            .unwrap_or_default())
    }

    fn build_raw_transaction(
        &self,
        args: &BuildTxArgs,
    ) -> Result<RawTx, BridgeError> {
        Ok(RawTx(serde_json::to_vec(args)?))
    }

    fn verify_msg_hash(
        &self,
        raw_tx: &RawTx,
        expected_hashes: &[String],
    ) -> Result<(), BridgeError> {
        let recomputed = hex::encode(&raw_tx.0);
        if expected_hashes.len() == 1 && expected_hashes[0] == recomputed {
            Ok(())
        } else {
            Err(BridgeError::MsgHashMismatch(format!(
                "recomputed {recomputed} differs from {expected_hashes:?}"
            )))
        }
    }

    fn is_valid_address(&self, address: &str) -> bool {
        !address.is_empty()
    }

    fn router(&self) -> Option<&dyn RouterBridge> {
        if self.router_mpc.is_some() {
            Some(self)
        } else {
            None
        }
    }

    fn p2sh(&self) -> Option<&dyn P2shBridge> {
        if self.p2sh_enabled { Some(self) } else { None }
    }
}

impl RouterBridge for MockBridge {
    fn register_router_swap_tx(
        &self,
        txid: &str,
    ) -> Result<Vec<RouterRegisterItem>, BridgeError> {
        let items = self
            .router_items
            .lock()
            .get(txid)
            .cloned()
            .unwrap_or_default();
        Ok(items
            .into_iter()
            .map(|(log_index, result)| RouterRegisterItem {
                log_index,
                result,
            })
            .collect())
    }

    fn verify_router_swap_tx(
        &self,
        txid: &str,
        log_index: u32,
        allow_unstable: bool,
    ) -> Result<TxSwapInfo, VerifyError> {
        self.lookup_verify(&format!("{txid}:{log_index}"), allow_unstable)
    }

    fn router_mpc_address(&self) -> &str {
        self.router_mpc.as_deref().unwrap_or_default()
    }
}

impl P2shBridge for MockBridge {
    fn get_p2sh_address(
        &self,
        bind_address: &str,
    ) -> Result<P2shAddressPair, BridgeError> {
        self.p2sh_pairs
            .lock()
            .get(bind_address)
            .cloned()
            .ok_or(BridgeError::NotSupported("p2sh derivation"))
    }

    fn verify_p2sh_transaction(
        &self,
        _pair_id: &str,
        txid: &str,
        _bind_address: &str,
        allow_unstable: bool,
    ) -> Result<TxSwapInfo, VerifyError> {
        self.lookup_verify(txid, allow_unstable)
    }
}

/// A core over a throwaway LMDB env and mock bridges. Keeps the temp dir
/// alive for the test's duration.
pub(crate) struct TestCore {
    pub core: Core,
    _tmp: tempfile::TempDir,
}

pub(crate) fn test_config() -> Config {
    Config {
        identifier: "crossbridge-test".to_owned(),
        rpc_listen_addr: "127.0.0.1:0".parse().expect("socket addr"),
        src_chain: ChainConfig {
            name: "Bitcoin".to_owned(),
            chain_id: None,
            address_based: false,
            enable_nonce: false,
            enable_p2sh: true,
            signer_address: "btc-signer".to_owned(),
            gateway: GatewayConfig {
                url: String::new(),
                user: String::new(),
                password: String::new(),
            },
        },
        dest_chain: ChainConfig {
            name: "Ethereum".to_owned(),
            chain_id: Some("1".to_owned()),
            address_based: true,
            enable_nonce: true,
            enable_p2sh: false,
            signer_address: "0xsigner".to_owned(),
            gateway: GatewayConfig {
                url: String::new(),
                user: String::new(),
                password: String::new(),
            },
        },
        router_chains: Vec::new(),
        pairs: vec![
            TokenPairConfig {
                pair_id: "usdc".to_owned(),
                src_token: TokenConfig {
                    symbol: "USDC".to_owned(),
                    decimals: 6,
                    contract_address: None,
                    deposit_address: Some("deposit-addr".to_owned()),
                },
                dest_token: TokenConfig {
                    symbol: "aUSDC".to_owned(),
                    decimals: 6,
                    contract_address: Some("0xanyusdc".to_owned()),
                    deposit_address: None,
                },
            },
            TokenPairConfig {
                pair_id: "btc".to_owned(),
                src_token: TokenConfig {
                    symbol: "BTC".to_owned(),
                    decimals: 8,
                    contract_address: None,
                    deposit_address: None,
                },
                dest_token: TokenConfig {
                    symbol: "aBTC".to_owned(),
                    decimals: 8,
                    contract_address: Some("0xanybtc".to_owned()),
                    deposit_address: None,
                },
            },
        ],
        p2sh_pair_id: Some("btc".to_owned()),
        mpc: MpcConfig {
            enable: true,
            rpc_url: "http://127.0.0.1:2921".to_owned(),
            initiators: vec!["0xInitiator".to_owned()],
        },
    }
}

pub(crate) fn test_core(
    src: Arc<MockBridge>,
    dest: Arc<MockBridge>,
    routers: &[Arc<MockBridge>],
) -> TestCore {
    let tmp = tempfile::TempDir::new().expect("temp dir");
    let db_path = tmp.path().join("data.mdb");
    std::fs::create_dir_all(&db_path).expect("create db dir");
    let env = state::open_env(&db_path).expect("open env");
    let store = Store::new(&env).expect("create store");
    let mut bridges = Bridges::new(src, dest);
    for router in routers {
        bridges
            .register_chain(Arc::clone(router) as Arc<dyn ChainBridge>)
            .expect("register router bridge");
    }
    TestCore {
        core: Core::new(test_config(), bridges, env, store),
        _tmp: tmp,
    }
}

/// Swap info the mocks hand out for a classic verification
pub(crate) fn classic_swap_info(
    pair_id: &str,
    txid: &str,
    bind: &str,
    value: &str,
) -> TxSwapInfo {
    TxSwapInfo {
        pair_id: pair_id.to_owned(),
        txid: txid.to_owned(),
        tx_to: "deposit-addr".to_owned(),
        from: "sender-addr".to_owned(),
        bind: bind.to_owned(),
        value: value.to_owned(),
        height: 100,
        timestamp: 1_700_000_000,
        router: None,
    }
}
