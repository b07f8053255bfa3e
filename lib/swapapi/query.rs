//! Read paths: unified swap info, raw records, histories and server info

use crate::{
    core::Core,
    state::{self, LatestScanInfo, RegisteredAddress, SwapStatistics},
    swapapi::{Error, ServerInfo, SwapInfo},
    types::{
        Swap, SwapDirection, SwapKey, SwapResult, VERSION, normalize_bind,
    },
};
use sneed::rwtxn::Error as RwTxnError;

use crate::config::TokenPairConfig;

/// Default page size when the caller passes limit 0
const DEFAULT_HISTORY_LIMIT: i64 = 20;
/// Hard page-size cap in both directions
const MAX_HISTORY_LIMIT: i64 = 100;

/// Sanitize a history limit. Zero selects the default page size; the
/// magnitude is capped at 100; the sign (descending order for negative
/// values) is preserved.
pub fn process_history_limit(limit: i64) -> i64 {
    if limit == 0 {
        DEFAULT_HISTORY_LIMIT
    } else {
        limit.clamp(-MAX_HISTORY_LIMIT, MAX_HISTORY_LIMIT)
    }
}

fn classic_key(
    core: &Core,
    direction: SwapDirection,
    txid: &str,
    pair_id: &str,
    bind: &str,
) -> SwapKey {
    let bridge = core.bridges.by_direction(direction);
    let bind = normalize_bind(bind, bridge.is_address_based());
    SwapKey::classic(direction, pair_id, txid, &bind)
}

/// Unified swap lookup: the result record wins when present, the pending
/// registration is the fallback
pub fn get_swap(
    core: &Core,
    direction: SwapDirection,
    txid: &str,
    pair_id: &str,
    bind: &str,
) -> Result<SwapInfo, Error> {
    let key = classic_key(core, direction, txid, pair_id, bind);
    get_swap_info(core, &key)
}

pub fn get_router_swap(
    core: &Core,
    from_chain_id: &str,
    txid: &str,
    log_index: u32,
) -> Result<SwapInfo, Error> {
    let key = SwapKey::router(from_chain_id, txid, log_index);
    get_swap_info(core, &key)
}

fn get_swap_info(core: &Core, key: &SwapKey) -> Result<SwapInfo, Error> {
    let rotxn = core.read_txn()?;
    if let Some(result) = core.store.try_get_swap_result(&rotxn, key)? {
        return Ok(SwapInfo::from(&result));
    }
    if let Some(swap) = core.store.try_get_swap(&rotxn, key)? {
        return Ok(SwapInfo::from(&swap));
    }
    Err(Error::SwapNotFound)
}

/// Raw registration record, without merging in the result store
pub fn get_raw_swap(
    core: &Core,
    direction: SwapDirection,
    txid: &str,
    pair_id: &str,
    bind: &str,
) -> Result<Swap, Error> {
    let key = classic_key(core, direction, txid, pair_id, bind);
    let rotxn = core.read_txn()?;
    core.store
        .try_get_swap(&rotxn, &key)?
        .ok_or(Error::SwapNotFound)
}

/// Raw result record
pub fn get_raw_swap_result(
    core: &Core,
    direction: SwapDirection,
    txid: &str,
    pair_id: &str,
    bind: &str,
) -> Result<SwapResult, Error> {
    let key = classic_key(core, direction, txid, pair_id, bind);
    let rotxn = core.read_txn()?;
    core.store
        .try_get_swap_result(&rotxn, &key)?
        .ok_or(Error::SwapNotFound)
}

/// Paginated classic result history for an address (empty address matches
/// everything)
pub fn get_swap_history(
    core: &Core,
    direction: SwapDirection,
    address: &str,
    pair_id: &str,
    offset: u64,
    limit: i64,
) -> Result<Vec<SwapInfo>, Error> {
    let limit = process_history_limit(limit);
    let bridge = core.bridges.by_direction(direction);
    let address = normalize_bind(address, bridge.is_address_based());
    let rotxn = core.read_txn()?;
    let results = core.store.get_swap_history(
        &rotxn,
        direction,
        pair_id,
        &address,
        offset as usize,
        limit.unsigned_abs() as usize,
        limit < 0,
    )?;
    Ok(results.iter().map(SwapInfo::from).collect())
}

pub fn get_router_swap_history(
    core: &Core,
    from_chain_id: &str,
    address: &str,
    offset: u64,
    limit: i64,
) -> Result<Vec<SwapInfo>, Error> {
    let limit = process_history_limit(limit);
    let address = normalize_bind(address, true);
    let rotxn = core.read_txn()?;
    let results = core.store.get_router_swap_history(
        &rotxn,
        from_chain_id,
        &address,
        offset as usize,
        limit.unsigned_abs() as usize,
        limit < 0,
    )?;
    Ok(results.iter().map(SwapInfo::from).collect())
}

pub fn get_server_info(core: &Core) -> ServerInfo {
    ServerInfo {
        identifier: core.config.identifier.clone(),
        src_chain: core.config.src_chain.name.clone(),
        dest_chain: core.config.dest_chain.name.clone(),
        pair_ids: core.config.pair_ids(),
        version: VERSION.to_owned(),
    }
}

pub fn get_token_pair_info(
    core: &Core,
    pair_id: &str,
) -> Result<TokenPairConfig, Error> {
    core.config
        .find_pair(pair_id)
        .cloned()
        .ok_or_else(|| Error::TokenPairNotExist(pair_id.to_owned()))
}

pub fn get_swap_statistics(
    core: &Core,
    pair_id: &str,
) -> Result<SwapStatistics, Error> {
    let rotxn = core.read_txn()?;
    let stats = core.store.get_swap_statistics(&rotxn, pair_id)?;
    Ok(stats)
}

pub fn get_latest_scan_info(
    core: &Core,
    is_src: bool,
) -> Result<LatestScanInfo, Error> {
    let rotxn = core.read_txn()?;
    let info = core.store.get_latest_scan_info(&rotxn, is_src)?;
    Ok(info)
}

/// Register a user address. Addresses are lowercased before use, so
/// registration and lookups are case-insensitive.
pub fn register_address(core: &Core, address: &str) -> Result<(), Error> {
    let mut rwtxn = core.write_txn()?;
    core.store.register_address(&mut rwtxn, address)?;
    rwtxn
        .commit()
        .map_err(RwTxnError::from)
        .map_err(state::Error::from)?;
    Ok(())
}

pub fn get_registered_address(
    core: &Core,
    address: &str,
) -> Result<RegisteredAddress, Error> {
    let rotxn = core.read_txn()?;
    core.store
        .try_get_registered_address(&rotxn, address)?
        .ok_or(Error::AddressNotRegistered)
}
