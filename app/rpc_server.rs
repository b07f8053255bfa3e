use std::{collections::BTreeMap, net::SocketAddr, sync::Arc};

use crossbridge::{
    config::TokenPairConfig,
    core::Core,
    state::{LatestScanInfo, RegisteredAddress, SwapStatistics},
    swapapi::{self, P2shAddressInfo, ServerInfo, SwapInfo},
    types::{Swap, SwapDirection, SwapResult},
};
use crossbridge_app_rpc_api::RpcServer;
use jsonrpsee::{
    core::{RpcResult, async_trait, middleware::RpcServiceBuilder},
    server::Server,
    types::ErrorObject,
};
use tower_http::{
    request_id::{
        MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
    },
    trace::{DefaultOnFailure, DefaultOnResponse, TraceLayer},
};

use crate::app::App;

pub struct RpcServerImpl {
    app: App,
}

fn custom_err_msg(err_msg: impl Into<String>) -> ErrorObject<'static> {
    ErrorObject::owned(-32000, err_msg.into(), Option::<()>::None)
}

fn swapapi_err(err: swapapi::Error) -> ErrorObject<'static> {
    use swapapi::Error as E;
    let code = match &err {
        E::SwapCannotRetry => -32094,
        E::TokenPairNotExist(_) => -32095,
        E::NotBtcBridge => -32096,
        E::CannotVerify(_) => -32099,
        _ => -32000,
    };
    let message = if code == -32000 {
        format!("rpcError: {err}")
    } else {
        err.to_string()
    };
    ErrorObject::owned(code, message, Option::<()>::None)
}

const SUCCESS: &str = "Success";

impl RpcServerImpl {
    /// Run a blocking service call off the async worker
    async fn blocking<T, F>(&self, f: F) -> RpcResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Core) -> Result<T, swapapi::Error> + Send + 'static,
    {
        let core = Arc::clone(&self.app.core);
        tokio::task::spawn_blocking(move || f(&core).map_err(swapapi_err))
            .await
            .map_err(|err| custom_err_msg(format!("task join error: {err}")))?
    }
}

#[async_trait]
impl RpcServer for RpcServerImpl {
    async fn get_server_info(&self) -> RpcResult<ServerInfo> {
        self.blocking(|core| Ok(swapapi::get_server_info(core))).await
    }

    async fn get_token_pair_info(
        &self,
        pair_id: String,
    ) -> RpcResult<TokenPairConfig> {
        self.blocking(move |core| swapapi::get_token_pair_info(core, &pair_id))
            .await
    }

    async fn get_swap_statistics(
        &self,
        pair_id: String,
    ) -> RpcResult<SwapStatistics> {
        self.blocking(move |core| swapapi::get_swap_statistics(core, &pair_id))
            .await
    }

    async fn swapin(
        &self,
        txid: String,
        pair_id: String,
    ) -> RpcResult<String> {
        self.blocking(move |core| {
            swapapi::swapin(core, &txid, &pair_id)?;
            Ok(SUCCESS.to_owned())
        })
        .await
    }

    async fn swapout(
        &self,
        txid: String,
        pair_id: String,
    ) -> RpcResult<String> {
        self.blocking(move |core| {
            swapapi::swapout(core, &txid, &pair_id)?;
            Ok(SUCCESS.to_owned())
        })
        .await
    }

    async fn retry_swapin(
        &self,
        txid: String,
        pair_id: String,
    ) -> RpcResult<String> {
        self.blocking(move |core| {
            swapapi::retry_swapin(core, &txid, &pair_id)?;
            Ok(SUCCESS.to_owned())
        })
        .await
    }

    async fn p2sh_swapin(
        &self,
        txid: String,
        bind: String,
    ) -> RpcResult<String> {
        self.blocking(move |core| {
            swapapi::p2sh_swapin(core, &txid, &bind)?;
            Ok(SUCCESS.to_owned())
        })
        .await
    }

    async fn get_swapin(
        &self,
        txid: String,
        pair_id: String,
        bind: String,
    ) -> RpcResult<SwapInfo> {
        self.blocking(move |core| {
            swapapi::get_swap(
                core,
                SwapDirection::Swapin,
                &txid,
                &pair_id,
                &bind,
            )
        })
        .await
    }

    async fn get_swapout(
        &self,
        txid: String,
        pair_id: String,
        bind: String,
    ) -> RpcResult<SwapInfo> {
        self.blocking(move |core| {
            swapapi::get_swap(
                core,
                SwapDirection::Swapout,
                &txid,
                &pair_id,
                &bind,
            )
        })
        .await
    }

    async fn get_raw_swapin(
        &self,
        txid: String,
        pair_id: String,
        bind: String,
    ) -> RpcResult<Swap> {
        self.blocking(move |core| {
            swapapi::get_raw_swap(
                core,
                SwapDirection::Swapin,
                &txid,
                &pair_id,
                &bind,
            )
        })
        .await
    }

    async fn get_raw_swapin_result(
        &self,
        txid: String,
        pair_id: String,
        bind: String,
    ) -> RpcResult<SwapResult> {
        self.blocking(move |core| {
            swapapi::get_raw_swap_result(
                core,
                SwapDirection::Swapin,
                &txid,
                &pair_id,
                &bind,
            )
        })
        .await
    }

    async fn get_raw_swapout(
        &self,
        txid: String,
        pair_id: String,
        bind: String,
    ) -> RpcResult<Swap> {
        self.blocking(move |core| {
            swapapi::get_raw_swap(
                core,
                SwapDirection::Swapout,
                &txid,
                &pair_id,
                &bind,
            )
        })
        .await
    }

    async fn get_raw_swapout_result(
        &self,
        txid: String,
        pair_id: String,
        bind: String,
    ) -> RpcResult<SwapResult> {
        self.blocking(move |core| {
            swapapi::get_raw_swap_result(
                core,
                SwapDirection::Swapout,
                &txid,
                &pair_id,
                &bind,
            )
        })
        .await
    }

    async fn get_swapin_history(
        &self,
        address: String,
        pair_id: String,
        offset: u64,
        limit: i64,
    ) -> RpcResult<Vec<SwapInfo>> {
        self.blocking(move |core| {
            swapapi::get_swap_history(
                core,
                SwapDirection::Swapin,
                &address,
                &pair_id,
                offset,
                limit,
            )
        })
        .await
    }

    async fn get_swapout_history(
        &self,
        address: String,
        pair_id: String,
        offset: u64,
        limit: i64,
    ) -> RpcResult<Vec<SwapInfo>> {
        self.blocking(move |core| {
            swapapi::get_swap_history(
                core,
                SwapDirection::Swapout,
                &address,
                &pair_id,
                offset,
                limit,
            )
        })
        .await
    }

    async fn register_router_swap(
        &self,
        from_chain_id: String,
        txid: String,
    ) -> RpcResult<BTreeMap<u32, String>> {
        self.blocking(move |core| {
            swapapi::register_router_swap(core, &from_chain_id, &txid)
        })
        .await
    }

    async fn get_router_swap(
        &self,
        from_chain_id: String,
        txid: String,
        log_index: u32,
    ) -> RpcResult<SwapInfo> {
        self.blocking(move |core| {
            swapapi::get_router_swap(core, &from_chain_id, &txid, log_index)
        })
        .await
    }

    async fn get_router_swap_history(
        &self,
        from_chain_id: String,
        address: String,
        offset: u64,
        limit: i64,
    ) -> RpcResult<Vec<SwapInfo>> {
        self.blocking(move |core| {
            swapapi::get_router_swap_history(
                core,
                &from_chain_id,
                &address,
                offset,
                limit,
            )
        })
        .await
    }

    async fn register_p2sh_address(
        &self,
        bind_address: String,
    ) -> RpcResult<P2shAddressInfo> {
        self.blocking(move |core| {
            swapapi::register_p2sh_address(core, &bind_address)
        })
        .await
    }

    async fn get_p2sh_address_info(
        &self,
        p2sh_address: String,
    ) -> RpcResult<P2shAddressInfo> {
        self.blocking(move |core| {
            swapapi::get_p2sh_address_info(core, &p2sh_address)
        })
        .await
    }

    async fn register_address(&self, address: String) -> RpcResult<String> {
        self.blocking(move |core| {
            swapapi::register_address(core, &address)?;
            Ok(SUCCESS.to_owned())
        })
        .await
    }

    async fn get_registered_address(
        &self,
        address: String,
    ) -> RpcResult<RegisteredAddress> {
        self.blocking(move |core| {
            swapapi::get_registered_address(core, &address)
        })
        .await
    }

    async fn get_latest_scan_info(
        &self,
        is_src: bool,
    ) -> RpcResult<LatestScanInfo> {
        self.blocking(move |core| swapapi::get_latest_scan_info(core, is_src))
            .await
    }
}

/// Header clients may set to correlate their logs with ours; generated
/// when absent. The CLI sends `cli_…` ids, generated ones are `req_…`.
const REQUEST_ID_HEADER: http::HeaderName =
    http::HeaderName::from_static("x-request-id");

#[derive(Clone, Debug)]
struct RequestIdMaker;

impl MakeRequestId for RequestIdMaker {
    fn make_request_id<B>(
        &mut self,
        _: &http::Request<B>,
    ) -> Option<RequestId> {
        // dashless uuid so the id survives copy/paste from log lines
        let id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
        http::HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

pub async fn run_server(
    app: App,
    rpc_addr: SocketAddr,
) -> anyhow::Result<SocketAddr> {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &http::Request<_>| {
            // the id must already be stamped when the span opens, so the
            // set-request-id layer sits outside this one
            let request_id = request
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|value| value.to_str().ok());
            tracing::debug_span!(
                "rpc",
                method = %request.method(),
                uri = %request.uri(),
                request_id,
            )
        })
        .on_request(())
        .on_eos(())
        .on_response(DefaultOnResponse::new().level(tracing::Level::INFO))
        .on_failure(DefaultOnFailure::new().level(tracing::Level::ERROR));

    let http_middleware = tower::ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, RequestIdMaker))
        .layer(trace_layer)
        .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER));
    let rpc_middleware = RpcServiceBuilder::new().rpc_logger(1024);

    let server = Server::builder()
        .set_http_middleware(http_middleware)
        .set_rpc_middleware(rpc_middleware)
        .build(rpc_addr)
        .await?;
    let addr = server.local_addr()?;

    let handle = server.start(RpcServerImpl { app }.into_rpc());
    // server lifetime is the process lifetime
    tokio::spawn(handle.stopped());

    Ok(addr)
}
