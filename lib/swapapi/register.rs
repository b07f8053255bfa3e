//! Swap registration: converting user submissions into verified swap records

use std::collections::BTreeMap;

use sneed::rwtxn::Error as RwTxnError;

use crate::{
    core::Core,
    state,
    swapapi::Error,
    tokens::{TxSwapInfo, VerifyError},
    types::{
        RouterSwapFields, Swap, SwapDirection, SwapKey, SwapStatus,
        SwapTxType, normalize_bind,
    },
};

/// Register a swapin by its source-chain transaction hash
pub fn swapin(core: &Core, txid: &str, pair_id: &str) -> Result<(), Error> {
    register_classic(core, SwapTxType::SwapinTx, txid, pair_id)
}

/// Register a swapout by its destination-chain transaction hash
pub fn swapout(core: &Core, txid: &str, pair_id: &str) -> Result<(), Error> {
    register_classic(core, SwapTxType::SwapoutTx, txid, pair_id)
}

fn register_classic(
    core: &Core,
    tx_type: SwapTxType,
    txid: &str,
    pair_id: &str,
) -> Result<(), Error> {
    if core.config.find_pair(pair_id).is_none() {
        return Err(Error::TokenPairNotExist(pair_id.to_owned()));
    }
    let direction = tx_type.direction().unwrap_or(SwapDirection::Swapin);
    let bridge = core.bridges.by_direction(direction);

    // Try the fast unstable view first. If it fails but the transaction is
    // already mined, the stable view is authoritative for the error.
    let verify_res = match bridge.verify_transaction(pair_id, txid, true) {
        Ok(info) => Ok(info),
        Err(unstable_err) => match bridge.get_transaction_status(txid) {
            Ok(status) if status.block_height > 0 => {
                bridge.verify_transaction(pair_id, txid, false)
            }
            _ => Err(unstable_err),
        },
    };

    let (status, memo, info) = gate_registration(verify_res)?;
    let bind = info
        .as_ref()
        .map(|i| normalize_bind(&i.bind, bridge.is_address_based()))
        .unwrap_or_default();
    let tx_to = info.as_ref().map(|i| i.tx_to.clone()).unwrap_or_default();
    let swap =
        Swap::classic(tx_type, pair_id, txid, &bind, &tx_to, status, memo);

    let mut rwtxn = core.write_txn()?;
    core.store.add_swap(&mut rwtxn, &swap)?;
    rwtxn
        .commit()
        .map_err(RwTxnError::from)
        .map_err(state::Error::from)?;
    tracing::info!(
        %txid,
        pair_id = %pair_id,
        tx_type = %tx_type,
        status = %status,
        "registered swap"
    );
    Ok(())
}

/// Apply the register/reject gate to a verification outcome. Returns the
/// initial status, the memo and the swap info when available.
fn gate_registration(
    verify_res: Result<TxSwapInfo, VerifyError>,
) -> Result<(SwapStatus, String, Option<TxSwapInfo>), Error> {
    match verify_res {
        Ok(info) => Ok((SwapStatus::TxNotStable, String::new(), Some(info))),
        Err(err) if err.kind().should_register_swap() => Ok((
            err.kind().registration_status(),
            err.to_string(),
            None,
        )),
        Err(err) => Err(Error::CannotVerify(err)),
    }
}

/// Reset a failed swapin so a downstream worker picks it up again.
///
/// Permitted only when the source bridge manages nonces (otherwise a
/// replayed registration could double-spend the destination nonce), the
/// transaction still verifies against the stable chain view, and the
/// current status is retryable.
pub fn retry_swapin(
    core: &Core,
    txid: &str,
    pair_id: &str,
) -> Result<(), Error> {
    let bridge = core.bridges.by_direction(SwapDirection::Swapin);
    if !bridge.supports_nonce() {
        return Err(Error::SwapCannotRetry);
    }
    let info = bridge
        .verify_transaction(pair_id, txid, false)
        .map_err(Error::CannotVerify)?;
    let bind = normalize_bind(&info.bind, bridge.is_address_based());
    let key =
        SwapKey::classic(SwapDirection::Swapin, pair_id, txid, &bind);
    {
        let rotxn = core.read_txn()?;
        let swap = core
            .store
            .try_get_swap(&rotxn, &key)?
            .ok_or(Error::SwapNotFound)?;
        if !swap.status.can_retry() {
            return Err(Error::SwapCannotRetry);
        }
    }
    let mut rwtxn = core.write_txn()?;
    core.store.update_swap_status(
        &mut rwtxn,
        &key,
        SwapStatus::TxNotStable,
        String::new(),
    )?;
    rwtxn
        .commit()
        .map_err(RwTxnError::from)
        .map_err(state::Error::from)?;
    tracing::info!(%txid, pair_id = %pair_id, "swapin retried");
    Ok(())
}

/// Register a Bitcoin P2SH deposit. The bind address is supplied by the
/// caller and kept with its original case (Bitcoin binds are
/// case-sensitive).
pub fn p2sh_swapin(
    core: &Core,
    txid: &str,
    bind_address: &str,
) -> Result<(), Error> {
    let bridge = core.bridges.source();
    let p2sh = bridge.p2sh().ok_or(Error::NotBtcBridge)?;
    let pair_id = core
        .config
        .p2sh_pair_id
        .clone()
        .ok_or(Error::NotBtcBridge)?;
    let key = SwapKey::classic(
        SwapDirection::Swapin,
        &pair_id,
        txid,
        bind_address,
    );
    {
        let rotxn = core.read_txn()?;
        if core.store.try_get_swap(&rotxn, &key)?.is_some() {
            return Err(Error::Store(state::Error::ItemIsDup));
        }
    }
    let verify_res =
        p2sh.verify_p2sh_transaction(&pair_id, txid, bind_address, true);
    let (status, memo, info) = gate_registration(verify_res)?;
    let tx_to = info.as_ref().map(|i| i.tx_to.clone()).unwrap_or_default();
    let swap = Swap::classic(
        SwapTxType::P2shSwapinTx,
        &pair_id,
        txid,
        bind_address,
        &tx_to,
        status,
        memo,
    );
    let mut rwtxn = core.write_txn()?;
    core.store.add_swap(&mut rwtxn, &swap)?;
    rwtxn
        .commit()
        .map_err(RwTxnError::from)
        .map_err(state::Error::from)?;
    tracing::info!(%txid, bind = %bind_address, "registered p2sh swapin");
    Ok(())
}

/// Register every swap log of a router transaction.
///
/// The source bridge scans the transaction and yields one outcome per swap
/// log; each log is gated and persisted independently, so partial success
/// is normal. The returned map carries `"success"` or `"failed: <msg>"`
/// per log index.
pub fn register_router_swap(
    core: &Core,
    from_chain_id: &str,
    txid: &str,
) -> Result<BTreeMap<u32, String>, Error> {
    let bridge = core
        .bridges
        .by_chain_id(from_chain_id)
        .ok_or_else(|| Error::NoBridgeForChainId(from_chain_id.to_owned()))?;
    let router = bridge
        .router()
        .ok_or_else(|| Error::RouterSwapNotSupported(from_chain_id.to_owned()))?;
    let items = router.register_router_swap_tx(txid)?;

    let mut outcomes = BTreeMap::new();
    for item in items {
        let outcome = register_router_item(
            core,
            from_chain_id,
            txid,
            item.log_index,
            item.result,
        );
        let rendered = match outcome {
            Ok(()) => "success".to_owned(),
            Err(err) => format!("failed: {err}"),
        };
        outcomes.insert(item.log_index, rendered);
    }
    Ok(outcomes)
}

fn register_router_item(
    core: &Core,
    from_chain_id: &str,
    txid: &str,
    log_index: u32,
    verify_res: Result<TxSwapInfo, VerifyError>,
) -> Result<(), Error> {
    let (status, memo, info) = gate_registration(verify_res)?;
    // router chains are address-based; binds compare lowercased
    let bind = info
        .as_ref()
        .map(|i| normalize_bind(&i.bind, true))
        .unwrap_or_default();
    let tx_to = info.as_ref().map(|i| i.tx_to.clone()).unwrap_or_default();
    let fields = info
        .and_then(|i| i.router)
        .unwrap_or_else(|| RouterSwapFields {
            from_chain_id: from_chain_id.to_owned(),
            log_index,
            ..RouterSwapFields::default()
        });
    let swap = Swap::router(
        from_chain_id,
        txid,
        log_index,
        &bind,
        &tx_to,
        fields,
        status,
        memo,
    );
    let mut rwtxn = core.write_txn()?;
    core.store.add_swap(&mut rwtxn, &swap)?;
    rwtxn
        .commit()
        .map_err(RwTxnError::from)
        .map_err(state::Error::from)?;
    tracing::info!(
        %txid,
        from_chain_id = %from_chain_id,
        log_index,
        status = %status,
        "registered router swap"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        swapapi,
        testutil::{MockBridge, classic_swap_info, test_core},
        tokens::{TxStatus, VerifyErrorKind},
    };

    #[test]
    fn happy_swapin_registers_and_duplicates_are_rejected() {
        let src = Arc::new(MockBridge::named("btc"));
        let dest = Arc::new(MockBridge::named("eth"));
        src.set_verify(
            "0xA",
            Ok(classic_swap_info("usdc", "0xA", "0xbob", "1000")),
        );
        let tc = test_core(Arc::clone(&src), Arc::clone(&dest), &[]);

        swapin(&tc.core, "0xA", "usdc").expect("first registration");
        let swap = swapapi::get_raw_swap(
            &tc.core,
            SwapDirection::Swapin,
            "0xA",
            "usdc",
            "0xbob",
        )
        .expect("registered swap");
        assert_eq!(swap.status, SwapStatus::TxNotStable);
        assert_eq!(swap.tx_type, SwapTxType::SwapinTx);
        assert_eq!(swap.tx_to, "deposit-addr");
        assert!(swap.memo.is_empty());

        let err = swapin(&tc.core, "0xA", "usdc").unwrap_err();
        assert!(matches!(
            err,
            Error::Store(state::Error::ItemIsDup)
        ));
    }

    #[test]
    fn unknown_pair_is_rejected_before_verification() {
        let src = Arc::new(MockBridge::named("btc"));
        let dest = Arc::new(MockBridge::named("eth"));
        let tc = test_core(Arc::clone(&src), Arc::clone(&dest), &[]);
        let err = swapin(&tc.core, "0xA", "doge").unwrap_err();
        assert!(matches!(err, Error::TokenPairNotExist(_)));
        assert_eq!(*src.verify_calls.lock(), 0);
    }

    #[test]
    fn not_yet_stable_swap_is_persisted_with_memo() {
        let src = Arc::new(MockBridge::named("btc"));
        let dest = Arc::new(MockBridge::named("eth"));
        src.set_verify(
            "0xB",
            Err(VerifyError::new(
                VerifyErrorKind::TxNotStable,
                "2 of 6 confirmations",
            )),
        );
        // not mined yet: height 0, the unstable error stands
        let tc = test_core(Arc::clone(&src), Arc::clone(&dest), &[]);

        swapin(&tc.core, "0xB", "usdc").expect("registrable error persists");
        let info = swapapi::get_swap(
            &tc.core,
            SwapDirection::Swapin,
            "0xB",
            "usdc",
            "",
        )
        .expect("pending registration visible");
        assert_eq!(info.status, SwapStatus::TxNotStable);
        assert!(info.memo.contains("tx not stable"));
        assert!(info.swap_tx.is_none());
    }

    #[test]
    fn stable_view_error_wins_once_the_tx_is_mined() {
        let src = Arc::new(MockBridge::named("btc"));
        let dest = Arc::new(MockBridge::named("eth"));
        src.set_verify(
            "0xC",
            Err(VerifyError::new(VerifyErrorKind::TxNotStable, "unstable")),
        );
        src.set_verify_stable(
            "0xC",
            Err(VerifyError::new(
                VerifyErrorKind::WrongValue,
                "value below dust",
            )),
        );
        src.set_status("0xC", TxStatus {
            block_height: 50,
            confirmations: 7,
        });
        let tc = test_core(Arc::clone(&src), Arc::clone(&dest), &[]);

        let err = swapin(&tc.core, "0xC", "usdc").unwrap_err();
        let Error::CannotVerify(verify_err) = err else {
            panic!("expected CannotVerify, got {err:?}");
        };
        assert_eq!(verify_err.kind(), VerifyErrorKind::WrongValue);
    }

    #[test]
    fn permanently_invalid_tx_is_not_persisted() {
        let src = Arc::new(MockBridge::named("btc"));
        let dest = Arc::new(MockBridge::named("eth"));
        src.set_verify(
            "0xD",
            Err(VerifyError::new(
                VerifyErrorKind::MalformedTx,
                "no swap output",
            )),
        );
        let tc = test_core(Arc::clone(&src), Arc::clone(&dest), &[]);

        let err = swapin(&tc.core, "0xD", "usdc").unwrap_err();
        assert!(matches!(err, Error::CannotVerify(_)));
        let missing = swapapi::get_raw_swap(
            &tc.core,
            SwapDirection::Swapin,
            "0xD",
            "usdc",
            "",
        );
        assert!(matches!(missing, Err(Error::SwapNotFound)));
    }

    #[test]
    fn swapout_is_verified_on_the_destination_bridge() {
        let src = Arc::new(MockBridge::named("btc"));
        let mut dest = MockBridge::named("eth");
        dest.address_based = true;
        let dest = Arc::new(dest);
        dest.set_verify(
            "0xE",
            Ok(classic_swap_info("usdc", "0xE", "0xAlice", "500")),
        );
        let tc = test_core(Arc::clone(&src), Arc::clone(&dest), &[]);

        swapout(&tc.core, "0xE", "usdc").expect("swapout registration");
        // the bind is lowercased on the address-based destination chain
        let swap = swapapi::get_raw_swap(
            &tc.core,
            SwapDirection::Swapout,
            "0xE",
            "usdc",
            "0xALICE",
        )
        .expect("registered swapout");
        assert_eq!(swap.bind, "0xalice");
        assert_eq!(*src.verify_calls.lock(), 0);
        assert_eq!(*dest.verify_calls.lock(), 1);
    }

    #[test]
    fn retry_requires_nonce_support_and_a_retryable_status() {
        let src = Arc::new(MockBridge::named("btc"));
        let dest = Arc::new(MockBridge::named("eth"));
        let tc = test_core(Arc::clone(&src), Arc::clone(&dest), &[]);
        // source bridge does not manage nonces
        let err = retry_swapin(&tc.core, "0xF", "usdc").unwrap_err();
        assert!(matches!(err, Error::SwapCannotRetry));
    }

    #[test]
    fn retry_resets_status_and_clears_memo() {
        let mut src = MockBridge::named("btc");
        src.supports_nonce = true;
        let src = Arc::new(src);
        let dest = Arc::new(MockBridge::named("eth"));
        src.set_verify(
            "0xF",
            Ok(classic_swap_info("usdc", "0xF", "0xbob", "1000")),
        );
        let tc = test_core(Arc::clone(&src), Arc::clone(&dest), &[]);

        // a registration stuck on a non-fatal failure
        let stuck = Swap::classic(
            SwapTxType::SwapinTx,
            "usdc",
            "0xF",
            "0xbob",
            "deposit-addr",
            SwapStatus::TxWithWrongMemo,
            "tx with wrong memo: bad payload".to_owned(),
        );
        let mut rwtxn = tc.core.write_txn().unwrap();
        tc.core.store.add_swap(&mut rwtxn, &stuck).unwrap();
        rwtxn.commit().unwrap();

        retry_swapin(&tc.core, "0xF", "usdc").expect("retry");
        let swap = swapapi::get_raw_swap(
            &tc.core,
            SwapDirection::Swapin,
            "0xF",
            "usdc",
            "0xbob",
        )
        .unwrap();
        assert_eq!(swap.status, SwapStatus::TxNotStable);
        assert!(swap.memo.is_empty());

        // once reset, the status is no longer retryable
        let err = retry_swapin(&tc.core, "0xF", "usdc").unwrap_err();
        assert!(matches!(err, Error::SwapCannotRetry));
        let swap_after = swapapi::get_raw_swap(
            &tc.core,
            SwapDirection::Swapin,
            "0xF",
            "usdc",
            "0xbob",
        )
        .unwrap();
        assert_eq!(swap_after.status, SwapStatus::TxNotStable);
    }

    #[test]
    fn p2sh_swapin_requires_the_btc_capability() {
        let src = Arc::new(MockBridge::named("btc"));
        let dest = Arc::new(MockBridge::named("eth"));
        let tc = test_core(Arc::clone(&src), Arc::clone(&dest), &[]);
        let err = p2sh_swapin(&tc.core, "0xG", "1BindAddr").unwrap_err();
        assert!(matches!(err, Error::NotBtcBridge));
    }

    #[test]
    fn p2sh_swapin_rejects_duplicates_before_verification() {
        let mut src = MockBridge::named("btc");
        src.p2sh_enabled = true;
        let src = Arc::new(src);
        let dest = Arc::new(MockBridge::named("eth"));
        src.set_verify(
            "0xG",
            Ok(classic_swap_info("btc", "0xG", "1BindAddr", "70000")),
        );
        let tc = test_core(Arc::clone(&src), Arc::clone(&dest), &[]);

        p2sh_swapin(&tc.core, "0xG", "1BindAddr").expect("registration");
        let swap = swapapi::get_raw_swap(
            &tc.core,
            SwapDirection::Swapin,
            "0xG",
            "btc",
            "1BindAddr",
        )
        .unwrap();
        assert_eq!(swap.tx_type, SwapTxType::P2shSwapinTx);

        let calls_before = *src.verify_calls.lock();
        let err = p2sh_swapin(&tc.core, "0xG", "1BindAddr").unwrap_err();
        assert!(matches!(err, Error::Store(state::Error::ItemIsDup)));
        assert_eq!(*src.verify_calls.lock(), calls_before);
    }

    #[test]
    fn router_swap_registers_every_log_independently() {
        let src = Arc::new(MockBridge::named("btc"));
        let dest = Arc::new(MockBridge::named("eth"));
        let mut bsc = MockBridge::named("bsc");
        bsc.chain_id = Some("56".to_owned());
        bsc.router_mpc = Some("0xmpc56".to_owned());
        let mut info0 = classic_swap_info("", "0xT", "0xBob", "1000");
        info0.router = Some(RouterSwapFields {
            token: "0xtoken".to_owned(),
            path: vec!["0xtoken".to_owned(), "0xout".to_owned()],
            amount_out_min: "990".to_owned(),
            from_chain_id: "56".to_owned(),
            to_chain_id: "1".to_owned(),
            log_index: 0,
            for_native: true,
            for_underlying: false,
        });
        bsc.router_items.lock().insert(
            "0xT".to_owned(),
            vec![
                (0, Ok(info0)),
                (
                    3,
                    Err(VerifyError::new(
                        VerifyErrorKind::TxNotStable,
                        "1 of 15 confirmations",
                    )),
                ),
            ],
        );
        let bsc = Arc::new(bsc);
        let tc = test_core(src, dest, &[Arc::clone(&bsc)]);

        let outcomes =
            register_router_swap(&tc.core, "56", "0xT").expect("register");
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[&0], "success");
        assert_eq!(outcomes[&3], "success");

        let info = swapapi::get_router_swap(&tc.core, "56", "0xT", 0)
            .expect("log 0 visible");
        assert_eq!(info.log_index, Some(0));
        assert_eq!(info.bind, "0xbob");
        assert_eq!(
            info.router.as_ref().map(|r| r.for_native),
            Some(true)
        );
        let info3 = swapapi::get_router_swap(&tc.core, "56", "0xT", 3)
            .expect("log 3 visible");
        assert_eq!(info3.status, SwapStatus::TxNotStable);
        assert!(info3.memo.contains("tx not stable"));
    }

    #[test]
    fn router_swap_rejects_unregistrable_logs() {
        let src = Arc::new(MockBridge::named("btc"));
        let dest = Arc::new(MockBridge::named("eth"));
        let mut bsc = MockBridge::named("bsc");
        bsc.chain_id = Some("56".to_owned());
        bsc.router_mpc = Some("0xmpc56".to_owned());
        bsc.router_items.lock().insert(
            "0xU".to_owned(),
            vec![(
                2,
                Err(VerifyError::new(
                    VerifyErrorKind::NotOurSwap,
                    "no router log at index",
                )),
            )],
        );
        let bsc = Arc::new(bsc);
        let tc = test_core(src, dest, &[Arc::clone(&bsc)]);

        let outcomes =
            register_router_swap(&tc.core, "56", "0xU").expect("register");
        assert!(outcomes[&2].starts_with("failed:"));
        assert!(matches!(
            swapapi::get_router_swap(&tc.core, "56", "0xU", 2),
            Err(Error::SwapNotFound)
        ));
    }

    #[test]
    fn router_swap_requires_a_router_bridge() {
        let src = Arc::new(MockBridge::named("btc"));
        let mut dest = MockBridge::named("eth");
        dest.chain_id = Some("1".to_owned());
        let dest = Arc::new(dest);
        let tc = test_core(src, Arc::clone(&dest), &[]);

        let err = register_router_swap(&tc.core, "777", "0xT").unwrap_err();
        assert!(matches!(err, Error::NoBridgeForChainId(_)));
        // chain id 1 resolves to the classic destination bridge, which has
        // no router capability
        let err = register_router_swap(&tc.core, "1", "0xT").unwrap_err();
        assert!(matches!(err, Error::RouterSwapNotSupported(_)));
    }
}
