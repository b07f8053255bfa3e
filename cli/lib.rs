use std::{io::IsTerminal as _, time::Duration};

use clap::{Parser, Subcommand};
use http::HeaderMap;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};

use crossbridge_app_rpc_api::RpcClient;
use tracing_subscriber::{
    EnvFilter, filter::LevelFilter, layer::SubscriberExt as _,
    util::SubscriberInitExt as _,
};

/// Install the process-wide tracing subscriber. The given level is the
/// default; `RUST_LOG` directives override it when set. Shared by the CLI
/// and the coordinator binary so both log the same way.
pub fn init_tracing(default_level: tracing::Level) -> anyhow::Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(default_level).into())
        .from_env_lossy();
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(std::io::stdout().is_terminal());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;
    Ok(())
}

#[derive(Clone, Debug, Subcommand)]
#[command(arg_required_else_help(true))]
pub enum Command {
    /// Show identifier, chain pair and version of the coordinator
    GetServerInfo,
    /// Show configuration of a token pair
    GetTokenPairInfo { pair_id: String },
    /// Show per-pair result counters
    GetSwapStatistics { pair_id: String },
    /// Register a swapin by source-chain transaction hash
    Swapin { txid: String, pair_id: String },
    /// Register a swapout by destination-chain transaction hash
    Swapout { txid: String, pair_id: String },
    /// Reset a failed swapin for another processing round
    RetrySwapin { txid: String, pair_id: String },
    /// Register a Bitcoin P2SH deposit
    P2shSwapin { txid: String, bind: String },
    /// Show the merged registration/result view of a swapin
    GetSwapin {
        txid: String,
        pair_id: String,
        #[arg(long, default_value = "")]
        bind: String,
    },
    /// Show the merged registration/result view of a swapout
    GetSwapout {
        txid: String,
        pair_id: String,
        #[arg(long, default_value = "")]
        bind: String,
    },
    /// Show the raw swapin registration record
    GetRawSwapin {
        txid: String,
        pair_id: String,
        #[arg(long, default_value = "")]
        bind: String,
    },
    /// Show the raw swapin result record
    GetRawSwapinResult {
        txid: String,
        pair_id: String,
        #[arg(long, default_value = "")]
        bind: String,
    },
    /// Show the raw swapout registration record
    GetRawSwapout {
        txid: String,
        pair_id: String,
        #[arg(long, default_value = "")]
        bind: String,
    },
    /// Show the raw swapout result record
    GetRawSwapoutResult {
        txid: String,
        pair_id: String,
        #[arg(long, default_value = "")]
        bind: String,
    },
    /// Page through swapin results for an address
    GetSwapinHistory {
        address: String,
        pair_id: String,
        #[arg(long, default_value_t = 0)]
        offset: u64,
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        limit: i64,
    },
    /// Page through swapout results for an address
    GetSwapoutHistory {
        address: String,
        pair_id: String,
        #[arg(long, default_value_t = 0)]
        offset: u64,
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        limit: i64,
    },
    /// Register every swap log of a router transaction
    RegisterRouterSwap { from_chain_id: String, txid: String },
    /// Show one router swap by source chain, transaction and log index
    GetRouterSwap {
        from_chain_id: String,
        txid: String,
        #[arg(long, default_value_t = 0)]
        log_index: u32,
    },
    /// Page through router swap results for an address
    GetRouterSwapHistory {
        from_chain_id: String,
        address: String,
        #[arg(long, default_value_t = 0)]
        offset: u64,
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        limit: i64,
    },
    /// Derive and record the P2SH deposit address for a bind address
    RegisterP2shAddress { bind_address: String },
    /// Resolve a P2SH address back to its bind address
    GetP2shAddressInfo { p2sh_address: String },
    /// Register a user address (lowercased before use)
    RegisterAddress { address: String },
    /// Look up a registered address
    GetRegisteredAddress { address: String },
    /// Show the scan checkpoint of the source or destination chain
    GetLatestScanInfo {
        #[arg(long)]
        is_src: bool,
    },
}

fn pretty<T: serde::Serialize>(value: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

async fn handle_command(
    rpc_client: &HttpClient,
    command: Command,
) -> anyhow::Result<String> {
    Ok(match command {
        Command::GetServerInfo => {
            pretty(&rpc_client.get_server_info().await?)?
        }
        Command::GetTokenPairInfo { pair_id } => {
            pretty(&rpc_client.get_token_pair_info(pair_id).await?)?
        }
        Command::GetSwapStatistics { pair_id } => {
            pretty(&rpc_client.get_swap_statistics(pair_id).await?)?
        }
        Command::Swapin { txid, pair_id } => {
            rpc_client.swapin(txid, pair_id).await?
        }
        Command::Swapout { txid, pair_id } => {
            rpc_client.swapout(txid, pair_id).await?
        }
        Command::RetrySwapin { txid, pair_id } => {
            rpc_client.retry_swapin(txid, pair_id).await?
        }
        Command::P2shSwapin { txid, bind } => {
            rpc_client.p2sh_swapin(txid, bind).await?
        }
        Command::GetSwapin {
            txid,
            pair_id,
            bind,
        } => pretty(&rpc_client.get_swapin(txid, pair_id, bind).await?)?,
        Command::GetSwapout {
            txid,
            pair_id,
            bind,
        } => pretty(&rpc_client.get_swapout(txid, pair_id, bind).await?)?,
        Command::GetRawSwapin {
            txid,
            pair_id,
            bind,
        } => pretty(&rpc_client.get_raw_swapin(txid, pair_id, bind).await?)?,
        Command::GetRawSwapinResult {
            txid,
            pair_id,
            bind,
        } => pretty(
            &rpc_client
                .get_raw_swapin_result(txid, pair_id, bind)
                .await?,
        )?,
        Command::GetRawSwapout {
            txid,
            pair_id,
            bind,
        } => pretty(&rpc_client.get_raw_swapout(txid, pair_id, bind).await?)?,
        Command::GetRawSwapoutResult {
            txid,
            pair_id,
            bind,
        } => pretty(
            &rpc_client
                .get_raw_swapout_result(txid, pair_id, bind)
                .await?,
        )?,
        Command::GetSwapinHistory {
            address,
            pair_id,
            offset,
            limit,
        } => pretty(
            &rpc_client
                .get_swapin_history(address, pair_id, offset, limit)
                .await?,
        )?,
        Command::GetSwapoutHistory {
            address,
            pair_id,
            offset,
            limit,
        } => pretty(
            &rpc_client
                .get_swapout_history(address, pair_id, offset, limit)
                .await?,
        )?,
        Command::RegisterRouterSwap {
            from_chain_id,
            txid,
        } => pretty(
            &rpc_client.register_router_swap(from_chain_id, txid).await?,
        )?,
        Command::GetRouterSwap {
            from_chain_id,
            txid,
            log_index,
        } => pretty(
            &rpc_client
                .get_router_swap(from_chain_id, txid, log_index)
                .await?,
        )?,
        Command::GetRouterSwapHistory {
            from_chain_id,
            address,
            offset,
            limit,
        } => pretty(
            &rpc_client
                .get_router_swap_history(from_chain_id, address, offset, limit)
                .await?,
        )?,
        Command::RegisterP2shAddress { bind_address } => {
            pretty(&rpc_client.register_p2sh_address(bind_address).await?)?
        }
        Command::GetP2shAddressInfo { p2sh_address } => {
            pretty(&rpc_client.get_p2sh_address_info(p2sh_address).await?)?
        }
        Command::RegisterAddress { address } => {
            rpc_client.register_address(address).await?
        }
        Command::GetRegisteredAddress { address } => {
            pretty(&rpc_client.get_registered_address(address).await?)?
        }
        Command::GetLatestScanInfo { is_src } => {
            pretty(&rpc_client.get_latest_scan_info(is_src).await?)?
        }
    })
}

/// Applied when `--timeout` is not given; registration calls can sit on a
/// slow chain verification for a while.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Clone, Debug, Parser)]
#[command(name = "crossbridge_app_cli", about = "Bridge coordinator client")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
    /// Coordinator RPC url
    #[arg(default_value = "http://127.0.0.1:7750", long)]
    pub rpc_url: url::Url,
    /// Request timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,
    #[arg(long, default_value_t = tracing::Level::WARN)]
    pub log_level: tracing::Level,
}

impl Cli {
    fn build_client(&self) -> anyhow::Result<HttpClient> {
        // every invocation carries its own id so a request can be chased
        // through the coordinator's logs
        let request_id = format!("cli_{}", uuid::Uuid::new_v4().as_simple());
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::HeaderName::from_static("x-request-id"),
            http::header::HeaderValue::from_str(&request_id)?,
        );
        tracing::debug!(%request_id, url = %self.rpc_url, "sending request");

        let timeout = self
            .timeout
            .map_or(DEFAULT_REQUEST_TIMEOUT, Duration::from_secs);
        let client = HttpClientBuilder::default()
            .request_timeout(timeout)
            .set_headers(headers)
            .build(self.rpc_url.as_str())?;
        Ok(client)
    }

    pub async fn run(self) -> anyhow::Result<String> {
        init_tracing(self.log_level)?;
        let client = self.build_client()?;
        handle_command(&client, self.command).await
    }
}
