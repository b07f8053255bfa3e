//! Sign-acceptance worker.
//!
//! Each node in the threshold-signing quorum runs one of these. The worker
//! polls the sign requests pending for this node and votes AGREE or
//! DISAGREE on each. The vote is a pure function of observable on-chain
//! state: the initiator's proposed hash is never trusted, the worker
//! rebuilds the destination transaction from the original source event and
//! requires the recomputed hash to match bit-exactly.
//!
//! A bounded history of submitted votes makes replays idempotent: a request
//! seen before is answered with the recorded vote without re-verification.

use std::{sync::Arc, time::Duration};

use hashlink::LinkedHashMap;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::{task, time::sleep};

use crate::{
    core::Core,
    mpc::{AGREE, DISAGREE, SignBackend, SignInfo},
    tokens::{
        BridgeError, BuildTxArgs, REPLACE_SWAP_IDENTIFIER, VerifyError,
        VerifyErrorKind,
    },
    types::SwapTxType,
};

const RETRY_INTERVAL: Duration = Duration::from_secs(3);
const WAIT_INTERVAL: Duration = Duration::from_secs(20);
const MAX_ACCEPT_HISTORY: usize = 500;

/// Why a sign request was not accepted.
///
/// The ignorable subset leaves the request pending for a later round
/// instead of voting DISAGREE, so transient chain instability cannot poison
/// the quorum.
#[derive(Debug, Error)]
pub enum AcceptError {
    #[error("initiator mismatch: {0}")]
    InitiatorMismatch(String),
    #[error("wrong msg context: {0}")]
    WrongMsgContext(String),
    #[error("identifier mismatch: {0}")]
    IdentifierMismatch(String),
    #[error("no bridge for chain id {0}")]
    NoBridge(String),
    #[error("router swap not supported on chain {0}")]
    RouterSwapNotSupported(String),
    #[error("unknown token pair {0}")]
    UnknownPairId(String),
    #[error("bridge is not btc")]
    NoBtcBridge,
    #[error("tx not stable")]
    TxNotStable,
    #[error("tx not found")]
    TxNotFound,
    #[error("verify failed: {0}")]
    Verify(VerifyError),
    #[error("build tx failed: {0}")]
    Build(BridgeError),
    #[error("msg hash mismatch: {0}")]
    MsgHashMismatch(String),
}

impl AcceptError {
    /// Whether this error skips voting entirely
    pub fn is_ignorable(&self) -> bool {
        matches!(
            self,
            Self::InitiatorMismatch(_)
                | Self::WrongMsgContext(_)
                | Self::IdentifierMismatch(_)
                | Self::NoBridge(_)
                | Self::RouterSwapNotSupported(_)
                | Self::UnknownPairId(_)
                | Self::NoBtcBridge
                | Self::TxNotStable
                | Self::TxNotFound
        )
    }

    fn from_verify(err: VerifyError) -> Self {
        match err.kind() {
            VerifyErrorKind::TxNotStable => Self::TxNotStable,
            VerifyErrorKind::TxNotFound => Self::TxNotFound,
            _ => Self::Verify(err),
        }
    }
}

/// A submitted vote remembered for replay
#[derive(Clone, Debug)]
pub struct AcceptRecord {
    pub key_id: String,
    pub agree: bool,
    pub msg_hash: Vec<String>,
    pub msg_context: Vec<String>,
}

/// Bounded FIFO vote history keyed by sign-request id.
///
/// Reads may overlap; a single writer mutates both the ring and its
/// contents. Discarded on restart by design.
pub struct AcceptHistory {
    capacity: usize,
    inner: RwLock<LinkedHashMap<String, AcceptRecord>>,
}

impl AcceptHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: RwLock::new(LinkedHashMap::new()),
        }
    }

    pub fn find(&self, key_id: &str) -> Option<AcceptRecord> {
        self.inner.read().get(key_id).cloned()
    }

    pub fn add(&self, record: AcceptRecord) {
        let mut inner = self.inner.write();
        if !inner.contains_key(&record.key_id) && inner.len() >= self.capacity
        {
            let _evicted = inner.pop_front();
        }
        inner.insert(record.key_id.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

/// Verify a pending sign request against the chains.
///
/// The pipeline: confirm the initiator and identifier, decode the
/// `BuildTxArgs` document from the msg context, re-verify the source
/// transaction with the stable chain view, rebuild the destination
/// transaction with the verified origin value, and require the recomputed
/// signing hash to equal the circulated one.
pub fn verify_sign_info(
    core: &Core,
    info: &SignInfo,
) -> Result<BuildTxArgs, AcceptError> {
    if !core.config.is_initiator(&info.account) {
        return Err(AcceptError::InitiatorMismatch(info.account.clone()));
    }
    let [context] = info.msg_context.as_slice() else {
        return Err(AcceptError::WrongMsgContext(format!(
            "expected 1 element, got {}",
            info.msg_context.len()
        )));
    };
    let args: BuildTxArgs = serde_json::from_str(context)
        .map_err(|err| AcceptError::WrongMsgContext(err.to_string()))?;
    if args.identifier != core.config.identifier
        && args.identifier != REPLACE_SWAP_IDENTIFIER
    {
        return Err(AcceptError::IdentifierMismatch(args.identifier));
    }
    match args.tx_type {
        SwapTxType::RouterSwapTx => {
            verify_router_sign(core, &args, &info.msg_hash)?
        }
        _ => verify_classic_sign(core, &args, &info.msg_hash)?,
    }
    Ok(args)
}

fn check_origin_value(value: &str) -> Result<(), AcceptError> {
    if crate::tokens::parse_nonzero_value(value).is_none() {
        return Err(AcceptError::Verify(VerifyError::new(
            VerifyErrorKind::WrongValue,
            format!("swap value {value:?} is not a positive integer"),
        )));
    }
    Ok(())
}

fn verify_router_sign(
    core: &Core,
    args: &BuildTxArgs,
    msg_hash: &[String],
) -> Result<(), AcceptError> {
    let src = core
        .bridges
        .by_chain_id(&args.from_chain_id)
        .ok_or_else(|| AcceptError::NoBridge(args.from_chain_id.clone()))?;
    let dst = core
        .bridges
        .by_chain_id(&args.to_chain_id)
        .ok_or_else(|| AcceptError::NoBridge(args.to_chain_id.clone()))?;
    let src_router = src.router().ok_or_else(|| {
        AcceptError::RouterSwapNotSupported(args.from_chain_id.clone())
    })?;
    let dst_router = dst.router().ok_or_else(|| {
        AcceptError::RouterSwapNotSupported(args.to_chain_id.clone())
    })?;

    // the source event is the only trusted input
    let swap_info = src_router
        .verify_router_swap_tx(&args.swap_id, args.log_index, false)
        .map_err(AcceptError::from_verify)?;
    check_origin_value(&swap_info.value)?;

    let build_args = BuildTxArgs {
        from: dst_router.router_mpc_address().to_owned(),
        origin_value: Some(swap_info.value.clone()),
        ..args.clone()
    };
    let raw_tx = dst
        .build_raw_transaction(&build_args)
        .map_err(AcceptError::Build)?;
    dst.verify_msg_hash(&raw_tx, msg_hash)
        .map_err(|err| AcceptError::MsgHashMismatch(err.to_string()))
}

fn verify_classic_sign(
    core: &Core,
    args: &BuildTxArgs,
    msg_hash: &[String],
) -> Result<(), AcceptError> {
    if core.config.find_pair(&args.pair_id).is_none() {
        return Err(AcceptError::UnknownPairId(args.pair_id.clone()));
    }
    let Some(direction) = args.tx_type.direction() else {
        return Err(AcceptError::WrongMsgContext(format!(
            "tx type {} has no direction",
            args.tx_type
        )));
    };
    let src = core.bridges.by_direction(direction);
    let dst = core.bridges.counterpart(direction);

    let swap_info = match args.tx_type {
        SwapTxType::P2shSwapinTx => {
            let p2sh = src.p2sh().ok_or(AcceptError::NoBtcBridge)?;
            p2sh.verify_p2sh_transaction(
                &args.pair_id,
                &args.swap_id,
                &args.bind,
                false,
            )
        }
        _ => src.verify_transaction(&args.pair_id, &args.swap_id, false),
    }
    .map_err(AcceptError::from_verify)?;
    check_origin_value(&swap_info.value)?;

    let build_args = BuildTxArgs {
        from: dst.signer_address().to_owned(),
        origin_value: Some(swap_info.value.clone()),
        ..args.clone()
    };
    let raw_tx = dst
        .build_raw_transaction(&build_args)
        .map_err(AcceptError::Build)?;
    dst.verify_msg_hash(&raw_tx, msg_hash)
        .map_err(|err| AcceptError::MsgHashMismatch(err.to_string()))
}

/// The worker. One per process; runs for the process lifetime.
pub struct AcceptSignTask<B> {
    core: Arc<Core>,
    backend: B,
    history: AcceptHistory,
}

impl<B: SignBackend> AcceptSignTask<B> {
    pub fn new(core: Arc<Core>, backend: B) -> Self {
        Self {
            core,
            backend,
            history: AcceptHistory::new(MAX_ACCEPT_HISTORY),
        }
    }

    pub fn history(&self) -> &AcceptHistory {
        &self.history
    }

    pub async fn run(self) {
        tracing::info!("sign acceptance worker started");
        loop {
            let infos =
                match task::block_in_place(|| self.backend.get_cur_node_sign_info()) {
                    Ok(infos) => infos,
                    Err(err) => {
                        tracing::warn!(
                            error = %err,
                            "fetching sign info failed, backing off"
                        );
                        sleep(RETRY_INTERVAL).await;
                        continue;
                    }
                };
            if !infos.is_empty() {
                tracing::debug!(count = infos.len(), "processing sign requests");
            }
            for info in &infos {
                task::block_in_place(|| self.process_sign_info(info));
            }
            sleep(WAIT_INTERVAL).await;
        }
    }

    /// Handle one pending sign request: replay a recorded vote, or verify
    /// and vote fresh
    pub fn process_sign_info(&self, info: &SignInfo) {
        if let Some(prev) = self.history.find(&info.key_id) {
            let vote = if prev.agree { AGREE } else { DISAGREE };
            tracing::info!(
                key_id = %info.key_id,
                vote,
                "replaying recorded vote"
            );
            if let Err(err) = self.backend.do_accept_sign(
                &info.key_id,
                vote,
                &prev.msg_hash,
                &prev.msg_context,
            ) {
                tracing::warn!(
                    key_id = %info.key_id,
                    error = %err,
                    "vote replay failed"
                );
            }
            return;
        }

        let agree = match verify_sign_info(&self.core, info) {
            Ok(_) => true,
            Err(err) if err.is_ignorable() => {
                tracing::debug!(
                    key_id = %info.key_id,
                    error = %err,
                    "leaving sign request for a later round"
                );
                return;
            }
            Err(err) => {
                tracing::warn!(
                    key_id = %info.key_id,
                    error = %err,
                    "sign request failed verification"
                );
                false
            }
        };
        let vote = if agree { AGREE } else { DISAGREE };
        match self.backend.do_accept_sign(
            &info.key_id,
            vote,
            &info.msg_hash,
            &info.msg_context,
        ) {
            Ok(result) => {
                tracing::info!(
                    key_id = %info.key_id,
                    vote,
                    result = %result,
                    "submitted sign vote"
                );
                self.history.add(AcceptRecord {
                    key_id: info.key_id.clone(),
                    agree,
                    msg_hash: info.msg_hash.clone(),
                    msg_context: info.msg_context.clone(),
                });
            }
            Err(err) => {
                tracing::warn!(
                    key_id = %info.key_id,
                    error = %err,
                    "submitting sign vote failed"
                );
            }
        }
    }
}

/// Spawn the worker unless threshold signing is disabled
pub fn spawn<B: SignBackend + 'static>(
    core: Arc<Core>,
    backend: B,
) -> Option<tokio::task::JoinHandle<()>> {
    if !core.config.mpc.enable {
        tracing::info!("threshold signing disabled, not starting acceptance worker");
        return None;
    }
    Some(tokio::spawn(AcceptSignTask::new(core, backend).run()))
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::{
        mpc,
        testutil::{MockBridge, classic_swap_info, mock_msg_hash, test_core},
        tokens::TxSwapInfo,
        types::RouterSwapFields,
    };

    struct MockBackend {
        votes: Mutex<Vec<(String, String)>>,
    }

    impl MockBackend {
        fn new() -> Self {
            Self {
                votes: Mutex::new(Vec::new()),
            }
        }

        fn votes(&self) -> Vec<(String, String)> {
            self.votes.lock().clone()
        }
    }

    impl SignBackend for &MockBackend {
        fn get_cur_node_sign_info(
            &self,
        ) -> Result<Vec<SignInfo>, mpc::Error> {
            Ok(Vec::new())
        }

        fn do_accept_sign(
            &self,
            key_id: &str,
            agree_result: &str,
            _msg_hash: &[String],
            _msg_context: &[String],
        ) -> Result<String, mpc::Error> {
            self.votes
                .lock()
                .push((key_id.to_owned(), agree_result.to_owned()));
            Ok("queued".to_owned())
        }
    }

    fn router_swap_info(txid: &str, log_index: u32) -> TxSwapInfo {
        TxSwapInfo {
            pair_id: String::new(),
            txid: txid.to_owned(),
            tx_to: "0xrouter".to_owned(),
            from: "0xsender".to_owned(),
            bind: "0xreceiver".to_owned(),
            value: "1000".to_owned(),
            height: 100,
            timestamp: 1_700_000_000,
            router: Some(RouterSwapFields {
                token: "0xtoken".to_owned(),
                path: vec!["0xtoken".to_owned(), "0xout".to_owned()],
                amount_out_min: "990".to_owned(),
                from_chain_id: "56".to_owned(),
                to_chain_id: "97".to_owned(),
                log_index,
                for_native: false,
                for_underlying: true,
            }),
        }
    }

    fn router_args(identifier: &str) -> BuildTxArgs {
        BuildTxArgs {
            identifier: identifier.to_owned(),
            swap_id: "0xT".to_owned(),
            tx_type: SwapTxType::RouterSwapTx,
            pair_id: String::new(),
            bind: "0xreceiver".to_owned(),
            log_index: 0,
            from_chain_id: "56".to_owned(),
            to_chain_id: "97".to_owned(),
            swap_info: router_swap_info("0xT", 0),
            from: String::new(),
            origin_value: None,
            extra: None,
        }
    }

    fn router_setup() -> (
        std::sync::Arc<MockBridge>,
        std::sync::Arc<MockBridge>,
        crate::testutil::TestCore,
    ) {
        let src = MockBridge::named("btc");
        let dest = MockBridge::named("eth");
        let mut bsc = MockBridge::named("bsc");
        bsc.chain_id = Some("56".to_owned());
        bsc.router_mpc = Some("0xmpc56".to_owned());
        let mut chapel = MockBridge::named("chapel");
        chapel.chain_id = Some("97".to_owned());
        chapel.router_mpc = Some("0xmpc97".to_owned());
        let bsc = Arc::new(bsc);
        let chapel = Arc::new(chapel);
        let tc = test_core(
            Arc::new(src),
            Arc::new(dest),
            &[Arc::clone(&bsc), Arc::clone(&chapel)],
        );
        (bsc, chapel, tc)
    }

    fn sign_info_for(args: &BuildTxArgs, msg_hash: Vec<String>) -> SignInfo {
        SignInfo {
            key_id: "key-1".to_owned(),
            account: "0xInitiator".to_owned(),
            msg_hash,
            msg_context: vec![
                serde_json::to_string(args).expect("serialize args"),
            ],
        }
    }

    fn expected_router_hash(args: &BuildTxArgs) -> String {
        let build_args = BuildTxArgs {
            from: "0xmpc97".to_owned(),
            origin_value: Some("1000".to_owned()),
            ..args.clone()
        };
        mock_msg_hash(&build_args)
    }

    #[test]
    fn router_sign_request_is_agreed_and_replayed_from_history() {
        let (bsc, _chapel, tc) = router_setup();
        bsc.set_verify("0xT:0", Ok(router_swap_info("0xT", 0)));

        let args = router_args("crossbridge-test");
        let info = sign_info_for(&args, vec![expected_router_hash(&args)]);

        let backend = MockBackend::new();
        let task = AcceptSignTask::new(Arc::new(tc.core), &backend);
        task.process_sign_info(&info);
        assert_eq!(
            backend.votes(),
            vec![("key-1".to_owned(), AGREE.to_owned())]
        );
        assert_eq!(task.history().len(), 1);

        // replay: the recorded vote is resubmitted without re-verification
        let calls_before = *bsc.verify_calls.lock();
        task.process_sign_info(&info);
        assert_eq!(*bsc.verify_calls.lock(), calls_before);
        assert_eq!(backend.votes().len(), 2);
        assert_eq!(backend.votes()[1].1, AGREE);
    }

    #[test]
    fn diverging_destination_tx_is_disagreed() {
        let (bsc, _chapel, tc) = router_setup();
        bsc.set_verify("0xT:0", Ok(router_swap_info("0xT", 0)));

        let args = router_args("crossbridge-test");
        // the initiator circulated a hash for a different transaction
        let info =
            sign_info_for(&args, vec!["deadbeef".to_owned()]);

        let backend = MockBackend::new();
        let task = AcceptSignTask::new(Arc::new(tc.core), &backend);
        task.process_sign_info(&info);
        assert_eq!(
            backend.votes(),
            vec![("key-1".to_owned(), DISAGREE.to_owned())]
        );

        // replay yields DISAGREE again straight from history
        let calls_before = *bsc.verify_calls.lock();
        task.process_sign_info(&info);
        assert_eq!(*bsc.verify_calls.lock(), calls_before);
        assert_eq!(backend.votes()[1].1, DISAGREE);
    }

    #[test]
    fn ignorable_failures_skip_voting() {
        let (bsc, _chapel, tc) = router_setup();
        let core = Arc::new(tc.core);
        let backend = MockBackend::new();
        let task = AcceptSignTask::new(Arc::clone(&core), &backend);

        // unknown initiator
        let args = router_args("crossbridge-test");
        let mut info = sign_info_for(&args, vec![expected_router_hash(&args)]);
        info.account = "0xImpostor".to_owned();
        task.process_sign_info(&info);

        // identifier of some other deployment
        let foreign = router_args("other-bridge");
        let info =
            sign_info_for(&foreign, vec![expected_router_hash(&foreign)]);
        task.process_sign_info(&info);

        // source tx not stable yet
        bsc.set_verify(
            "0xT:0",
            Err(VerifyError::new(
                VerifyErrorKind::TxNotStable,
                "3 of 12 confirmations",
            )),
        );
        let args = router_args("crossbridge-test");
        let info = sign_info_for(&args, vec![expected_router_hash(&args)]);
        task.process_sign_info(&info);

        assert!(backend.votes().is_empty());
        assert!(task.history().is_empty());
    }

    #[test]
    fn classic_swapin_sign_request_is_agreed() {
        let src = Arc::new(MockBridge::named("btc"));
        let dest = Arc::new(MockBridge::named("eth"));
        src.set_verify(
            "0xA",
            Ok(classic_swap_info("usdc", "0xA", "0xbob", "1000")),
        );
        let tc = test_core(Arc::clone(&src), Arc::clone(&dest), &[]);

        let args = BuildTxArgs {
            identifier: "crossbridge-test".to_owned(),
            swap_id: "0xA".to_owned(),
            tx_type: SwapTxType::SwapinTx,
            pair_id: "usdc".to_owned(),
            bind: "0xbob".to_owned(),
            log_index: 0,
            from_chain_id: String::new(),
            to_chain_id: String::new(),
            swap_info: classic_swap_info("usdc", "0xA", "0xbob", "1000"),
            from: String::new(),
            origin_value: None,
            extra: None,
        };
        let build_args = BuildTxArgs {
            from: "eth-signer".to_owned(),
            origin_value: Some("1000".to_owned()),
            ..args.clone()
        };
        let info = sign_info_for(&args, vec![mock_msg_hash(&build_args)]);

        let backend = MockBackend::new();
        let task = AcceptSignTask::new(Arc::new(tc.core), &backend);
        task.process_sign_info(&info);
        assert_eq!(
            backend.votes(),
            vec![("key-1".to_owned(), AGREE.to_owned())]
        );
    }

    #[test]
    fn unknown_pair_is_ignorable() {
        let src = Arc::new(MockBridge::named("btc"));
        let dest = Arc::new(MockBridge::named("eth"));
        let tc = test_core(Arc::clone(&src), Arc::clone(&dest), &[]);
        let args = BuildTxArgs {
            identifier: "crossbridge-test".to_owned(),
            swap_id: "0xA".to_owned(),
            tx_type: SwapTxType::SwapinTx,
            pair_id: "doge".to_owned(),
            bind: String::new(),
            log_index: 0,
            from_chain_id: String::new(),
            to_chain_id: String::new(),
            swap_info: TxSwapInfo::default(),
            from: String::new(),
            origin_value: None,
            extra: None,
        };
        let info = sign_info_for(&args, vec!["00".to_owned()]);
        let err = verify_sign_info(&tc.core, &info).unwrap_err();
        assert!(matches!(err, AcceptError::UnknownPairId(_)));
        assert!(err.is_ignorable());
    }

    #[test]
    fn history_evicts_oldest_entry_at_capacity() {
        let history = AcceptHistory::new(3);
        for i in 0..4 {
            history.add(AcceptRecord {
                key_id: format!("key-{i}"),
                agree: true,
                msg_hash: Vec::new(),
                msg_context: Vec::new(),
            });
        }
        assert_eq!(history.len(), 3);
        assert!(history.find("key-0").is_none());
        assert!(history.find("key-1").is_some());
        assert!(history.find("key-3").is_some());
    }

    #[test]
    fn history_replaces_existing_key_without_eviction() {
        let history = AcceptHistory::new(2);
        for i in 0..2 {
            history.add(AcceptRecord {
                key_id: format!("key-{i}"),
                agree: true,
                msg_hash: Vec::new(),
                msg_context: Vec::new(),
            });
        }
        history.add(AcceptRecord {
            key_id: "key-0".to_owned(),
            agree: false,
            msg_hash: Vec::new(),
            msg_context: Vec::new(),
        });
        assert_eq!(history.len(), 2);
        assert!(!history.find("key-0").expect("present").agree);
    }
}
