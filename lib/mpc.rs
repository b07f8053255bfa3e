//! Interface to the threshold-signature subsystem.
//!
//! The coordinator only needs two operations: fetch the sign requests
//! currently pending for this node, and submit a vote. Both are behind the
//! [`SignBackend`] trait so the acceptance worker can be driven by a mock
//! in tests; [`MpcClient`] is the JSON-RPC implementation.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

/// Vote accepting a sign request
pub const AGREE: &str = "AGREE";
/// Vote rejecting a sign request
pub const DISAGREE: &str = "DISAGREE";

#[derive(Debug, Error)]
pub enum Error {
    #[error("mpc transport error: {0}")]
    Transport(String),
    #[error("mpc rpc error {code}: {message}")]
    Rpc { code: i32, message: String },
    #[error("invalid mpc response: {0}")]
    InvalidResponse(String),
}

/// A pending sign request as reported by the threshold-sign subsystem
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SignInfo {
    /// Unique id of the sign request
    pub key_id: String,
    /// Account of the initiator that proposed the request
    pub account: String,
    /// Hash(es) the group is asked to sign; never trusted, always
    /// recomputed by each follower
    pub msg_hash: Vec<String>,
    /// Serialized `BuildTxArgs` documents; must be a single element
    pub msg_context: Vec<String>,
}

pub trait SignBackend: Send + Sync {
    fn get_cur_node_sign_info(&self) -> Result<Vec<SignInfo>, Error>;

    fn do_accept_sign(
        &self,
        key_id: &str,
        agree_result: &str,
        msg_hash: &[String],
        msg_context: &[String],
    ) -> Result<String, Error>;
}

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

pub struct MpcClient {
    url: String,
    client: reqwest::blocking::Client,
}

impl MpcClient {
    pub fn new(url: &str) -> Result<Self, Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| Error::Transport(err.to_string()))?;
        Ok(Self {
            url: url.to_owned(),
            client,
        })
    }

    fn call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, Error> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": "crossbridge",
            "method": method,
            "params": params
        });
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .map_err(|err| Error::Transport(err.to_string()))?;
        let response: RpcResponse<T> = response
            .json()
            .map_err(|err| Error::Transport(err.to_string()))?;
        if let Some(error) = response.error {
            return Err(Error::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        response.result.ok_or_else(|| {
            Error::InvalidResponse(format!("{method}: missing result"))
        })
    }
}

impl SignBackend for MpcClient {
    fn get_cur_node_sign_info(&self) -> Result<Vec<SignInfo>, Error> {
        self.call("mpc_getCurNodeSignInfo", json!([]))
    }

    fn do_accept_sign(
        &self,
        key_id: &str,
        agree_result: &str,
        msg_hash: &[String],
        msg_context: &[String],
    ) -> Result<String, Error> {
        self.call(
            "mpc_acceptSign",
            json!([key_id, agree_result, msg_hash, msg_context]),
        )
    }
}
