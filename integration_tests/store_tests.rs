//! Store-level tests against a real LMDB environment: unique-key
//! invariants, router log-index identity, persistence across reopen, and
//! statistics monotonicity.

use crossbridge::{
    state::{Error, Store},
    types::{
        RouterSwapFields, Swap, SwapDirection, SwapKey, SwapResult,
        SwapStatus, SwapTxType,
    },
};
use crossbridge_integration_tests::open_test_store;

fn sample_swap(txid: &str, bind: &str) -> Swap {
    Swap::classic(
        SwapTxType::SwapinTx,
        "usdc",
        txid,
        bind,
        "deposit-addr",
        SwapStatus::TxNotStable,
        String::new(),
    )
}

fn sample_router_swap(txid: &str, log_index: u32) -> Swap {
    Swap::router(
        "56",
        txid,
        log_index,
        "0xreceiver",
        "0xrouter",
        RouterSwapFields {
            token: "0xtoken".to_owned(),
            path: vec!["0xtoken".to_owned(), "0xout".to_owned()],
            amount_out_min: "990".to_owned(),
            from_chain_id: "56".to_owned(),
            to_chain_id: "1".to_owned(),
            log_index,
            for_native: false,
            for_underlying: false,
        },
        SwapStatus::TxNotStable,
        String::new(),
    )
}

#[test]
fn duplicate_swap_insert_is_rejected() {
    let ts = open_test_store();
    let swap = sample_swap("0xA", "0xbob");

    let mut rwtxn = ts.env.write_txn().unwrap();
    ts.store.add_swap(&mut rwtxn, &swap).unwrap();
    rwtxn.commit().unwrap();

    let mut rwtxn = ts.env.write_txn().unwrap();
    let err = ts.store.add_swap(&mut rwtxn, &swap).unwrap_err();
    assert!(matches!(err, Error::ItemIsDup));
    drop(rwtxn);

    // the original record is untouched
    let rotxn = ts.env.read_txn().unwrap();
    let stored = ts
        .store
        .try_get_swap(&rotxn, &swap.key)
        .unwrap()
        .expect("first insert persisted");
    assert_eq!(stored, swap);
}

#[test]
fn duplicate_result_insert_is_rejected() {
    let ts = open_test_store();
    let swap = sample_swap("0xA", "0xbob");
    let result = SwapResult::from_swap(&swap, "0xdest", "1000");

    let mut rwtxn = ts.env.write_txn().unwrap();
    ts.store.add_swap_result(&mut rwtxn, &result).unwrap();
    let err = ts.store.add_swap_result(&mut rwtxn, &result).unwrap_err();
    assert!(matches!(err, Error::ItemIsDup));
    rwtxn.commit().unwrap();
}

#[test]
fn swapin_and_swapout_records_do_not_collide() {
    let ts = open_test_store();
    let swapin = sample_swap("0xA", "0xbob");
    let mut swapout = sample_swap("0xA", "0xbob");
    swapout.tx_type = SwapTxType::SwapoutTx;
    swapout.key =
        SwapKey::classic(SwapDirection::Swapout, "usdc", "0xA", "0xbob");

    let mut rwtxn = ts.env.write_txn().unwrap();
    ts.store.add_swap(&mut rwtxn, &swapin).unwrap();
    ts.store.add_swap(&mut rwtxn, &swapout).unwrap();
    rwtxn.commit().unwrap();

    let rotxn = ts.env.read_txn().unwrap();
    assert!(ts.store.try_get_swap(&rotxn, &swapin.key).unwrap().is_some());
    assert!(
        ts.store
            .try_get_swap(&rotxn, &swapout.key)
            .unwrap()
            .is_some()
    );
}

#[test]
fn router_swaps_coexist_per_log_index() {
    let ts = open_test_store();
    let log0 = sample_router_swap("0xT", 0);
    let log3 = sample_router_swap("0xT", 3);

    let mut rwtxn = ts.env.write_txn().unwrap();
    ts.store.add_swap(&mut rwtxn, &log0).unwrap();
    ts.store.add_swap(&mut rwtxn, &log3).unwrap();
    // same (chain, txid, log) is still unique
    let err = ts
        .store
        .add_swap(&mut rwtxn, &sample_router_swap("0xT", 0))
        .unwrap_err();
    assert!(matches!(err, Error::ItemIsDup));
    rwtxn.commit().unwrap();

    let rotxn = ts.env.read_txn().unwrap();
    let stored0 = ts
        .store
        .try_get_swap(&rotxn, &SwapKey::router("56", "0xT", 0))
        .unwrap()
        .expect("log 0");
    assert_eq!(stored0.router.as_ref().map(|r| r.log_index), Some(0));
    assert!(
        ts.store
            .try_get_swap(&rotxn, &SwapKey::router("56", "0xT", 3))
            .unwrap()
            .is_some()
    );
    assert!(
        ts.store
            .try_get_swap(&rotxn, &SwapKey::router("56", "0xT", 1))
            .unwrap()
            .is_none()
    );
}

#[test]
fn status_update_refuses_missing_keys() {
    let ts = open_test_store();
    let mut rwtxn = ts.env.write_txn().unwrap();
    let missing = SwapKey::classic(SwapDirection::Swapin, "usdc", "0xZ", "");
    let err = ts
        .store
        .update_swap_status(
            &mut rwtxn,
            &missing,
            SwapStatus::TxVerified,
            String::new(),
        )
        .unwrap_err();
    assert!(matches!(err, Error::SwapNotFound { .. }));
}

#[test]
fn status_lifecycle_round_trips() {
    let ts = open_test_store();
    let swap = sample_swap("0xA", "0xbob");
    let mut rwtxn = ts.env.write_txn().unwrap();
    ts.store.add_swap(&mut rwtxn, &swap).unwrap();
    rwtxn.commit().unwrap();

    for status in [
        SwapStatus::TxVerified,
        SwapStatus::Processing,
        SwapStatus::MatchTxNotStable,
        SwapStatus::MatchTxStable,
    ] {
        let mut rwtxn = ts.env.write_txn().unwrap();
        ts.store
            .update_swap_status(&mut rwtxn, &swap.key, status, String::new())
            .unwrap();
        rwtxn.commit().unwrap();
        let rotxn = ts.env.read_txn().unwrap();
        let stored =
            ts.store.try_get_swap(&rotxn, &swap.key).unwrap().unwrap();
        assert_eq!(stored.status, status);
    }
}

#[test]
fn swaps_survive_env_reopen() {
    let tmp = tempfile::TempDir::new().unwrap();
    let db_path = tmp.path().join("data.mdb");
    std::fs::create_dir_all(&db_path).unwrap();

    let swap = sample_swap("0xA", "0xbob");
    {
        let env = crossbridge::state::open_env(&db_path).unwrap();
        let store = Store::new(&env).unwrap();
        let mut rwtxn = env.write_txn().unwrap();
        store.add_swap(&mut rwtxn, &swap).unwrap();
        rwtxn.commit().unwrap();
    }
    let env = crossbridge::state::open_env(&db_path).unwrap();
    let store = Store::new(&env).unwrap();
    let rotxn = env.read_txn().unwrap();
    let stored = store
        .try_get_swap(&rotxn, &swap.key)
        .unwrap()
        .expect("swap survives reopen");
    assert_eq!(stored, swap);
}

#[test]
fn statistics_never_decrease() {
    let ts = open_test_store();
    let mut last = 0;
    for i in 0..5 {
        let swap = sample_swap(&format!("0x{i}"), "0xbob");
        let result = SwapResult::from_swap(&swap, &format!("0xd{i}"), "100");
        let mut rwtxn = ts.env.write_txn().unwrap();
        ts.store.add_swap_result(&mut rwtxn, &result).unwrap();
        rwtxn.commit().unwrap();

        let rotxn = ts.env.read_txn().unwrap();
        let stats = ts.store.get_swap_statistics(&rotxn, "usdc").unwrap();
        assert!(stats.swapin_count > last);
        last = stats.swapin_count;
    }
    assert_eq!(last, 5);
}

#[test]
fn p2sh_mapping_is_first_write_wins() {
    let ts = open_test_store();
    let mut rwtxn = ts.env.write_txn().unwrap();
    ts.store
        .add_p2sh_address(&mut rwtxn, "0xbob", "3Deposit1")
        .unwrap();
    // second registration for the same bind is a no-op
    ts.store
        .add_p2sh_address(&mut rwtxn, "0xbob", "3Deposit2")
        .unwrap();
    rwtxn.commit().unwrap();

    let rotxn = ts.env.read_txn().unwrap();
    assert_eq!(
        ts.store.try_get_p2sh_address(&rotxn, "0xbob").unwrap(),
        Some("3Deposit1".to_owned())
    );
    assert_eq!(
        ts.store
            .try_get_p2sh_bind_address(&rotxn, "3Deposit1")
            .unwrap(),
        Some("0xbob".to_owned())
    );
    assert_eq!(
        ts.store
            .try_get_p2sh_bind_address(&rotxn, "3Deposit2")
            .unwrap(),
        None
    );
}

#[test]
fn registered_addresses_are_lowercased() {
    let ts = open_test_store();
    let mut rwtxn = ts.env.write_txn().unwrap();
    ts.store.register_address(&mut rwtxn, "0xAliCE").unwrap();
    let err = ts
        .store
        .register_address(&mut rwtxn, "0xALICE")
        .unwrap_err();
    assert!(matches!(err, Error::ItemIsDup));
    rwtxn.commit().unwrap();

    let rotxn = ts.env.read_txn().unwrap();
    let record = ts
        .store
        .try_get_registered_address(&rotxn, "0xAlice")
        .unwrap()
        .expect("registered");
    assert_eq!(record.address, "0xalice");
}
