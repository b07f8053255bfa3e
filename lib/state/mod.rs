//! Typed persistence façade over the document database.
//!
//! Each collection is a [`DatabaseUnique`] keyed and valued with bincode.
//! Concurrency safety is delegated to LMDB's per-transaction atomicity:
//! inserts are check-then-put inside one write transaction, so the first
//! writer wins and later writers surface [`Error::ItemIsDup`].

use std::path::Path;

use fallible_iterator::FallibleIterator;
use heed::{EnvFlags, EnvOpenOptions, types::SerdeBincode};
use serde::{Deserialize, Serialize};
use sneed::{
    DatabaseUnique, Env, RoTxn, RwTxn, UnitKey,
    db::error::{self as db_error, Error as DbError},
    env::Error as EnvError,
    rwtxn::Error as RwTxnError,
};

use crate::types::{
    Swap, SwapDirection, SwapKey, SwapResult, SwapStatus, VERSION,
    now_timestamp,
};

mod error;

pub use error::Error;

/// A registered user address, stored lowercased
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, utoipa::ToSchema)]
pub struct RegisteredAddress {
    pub address: String,
    pub timestamp: u64,
}

/// Scan checkpoint per direction
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Serialize, utoipa::ToSchema,
)]
pub struct LatestScanInfo {
    pub block_height: u64,
    pub timestamp: u64,
}

/// Per-pair result counters. Monotonic: bumped on every result insert,
/// never decremented.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Serialize, utoipa::ToSchema,
)]
pub struct SwapStatistics {
    pub swapin_count: u64,
    pub swapout_count: u64,
}

#[derive(Clone)]
pub struct Store {
    /// Swap registrations
    swaps: DatabaseUnique<SerdeBincode<SwapKey>, SerdeBincode<Swap>>,
    /// Post-execution results, at most one per swap
    swap_results: DatabaseUnique<SerdeBincode<SwapKey>, SerdeBincode<SwapResult>>,
    /// bind address → p2sh address
    p2sh_addresses: DatabaseUnique<SerdeBincode<String>, SerdeBincode<String>>,
    /// p2sh address → bind address
    p2sh_bind_addresses:
        DatabaseUnique<SerdeBincode<String>, SerdeBincode<String>>,
    /// lowercased address → registration record
    registered_addresses:
        DatabaseUnique<SerdeBincode<String>, SerdeBincode<RegisteredAddress>>,
    /// is_src → checkpoint
    latest_scan_info:
        DatabaseUnique<SerdeBincode<bool>, SerdeBincode<LatestScanInfo>>,
    /// pair id → counters
    swap_statistics:
        DatabaseUnique<SerdeBincode<String>, SerdeBincode<SwapStatistics>>,
    _version: DatabaseUnique<UnitKey, SerdeBincode<String>>,
}

/// Open an LMDB environment suitable for [`Store::new`]. The directory
/// must already exist.
pub fn open_env(path: &Path) -> Result<Env, Error> {
    let mut env_open_opts = EnvOpenOptions::new();
    env_open_opts.max_dbs(Store::NUM_DBS);
    env_open_opts.map_size(1024 * 1024 * 1024);
    let fast_flags = EnvFlags::WRITE_MAP
        | EnvFlags::MAP_ASYNC
        | EnvFlags::NO_SYNC
        | EnvFlags::NO_META_SYNC
        | EnvFlags::NO_READ_AHEAD
        | EnvFlags::NO_TLS;
    unsafe { env_open_opts.flags(fast_flags) };
    let env = unsafe { Env::open(&env_open_opts, path) }
        .map_err(EnvError::from)?;
    Ok(env)
}

impl Store {
    pub const NUM_DBS: u32 = 8;

    pub fn new(env: &Env) -> Result<Self, Error> {
        let mut rwtxn = env.write_txn().map_err(EnvError::from)?;
        let swaps = DatabaseUnique::create(env, &mut rwtxn, "swaps")
            .map_err(EnvError::from)?;
        let swap_results =
            DatabaseUnique::create(env, &mut rwtxn, "swap_results")
                .map_err(EnvError::from)?;
        let p2sh_addresses =
            DatabaseUnique::create(env, &mut rwtxn, "p2sh_addresses")
                .map_err(EnvError::from)?;
        let p2sh_bind_addresses =
            DatabaseUnique::create(env, &mut rwtxn, "p2sh_bind_addresses")
                .map_err(EnvError::from)?;
        let registered_addresses =
            DatabaseUnique::create(env, &mut rwtxn, "registered_addresses")
                .map_err(EnvError::from)?;
        let latest_scan_info =
            DatabaseUnique::create(env, &mut rwtxn, "latest_scan_info")
                .map_err(EnvError::from)?;
        let swap_statistics =
            DatabaseUnique::create(env, &mut rwtxn, "swap_statistics")
                .map_err(EnvError::from)?;
        let version = DatabaseUnique::create(env, &mut rwtxn, "db_version")
            .map_err(EnvError::from)?;
        if version
            .try_get(&rwtxn, &())
            .map_err(DbError::from)?
            .is_none()
        {
            version
                .put(&mut rwtxn, &(), &VERSION.to_owned())
                .map_err(DbError::from)?;
        }
        rwtxn.commit().map_err(RwTxnError::from)?;
        Ok(Self {
            swaps,
            swap_results,
            p2sh_addresses,
            p2sh_bind_addresses,
            registered_addresses,
            latest_scan_info,
            swap_statistics,
            _version: version,
        })
    }

    // Swap registrations

    /// Insert a registration. The key is unique; a second insert for the
    /// same key fails with [`Error::ItemIsDup`] and leaves the original
    /// record untouched.
    pub fn add_swap(&self, rwtxn: &mut RwTxn, swap: &Swap) -> Result<(), Error> {
        if self
            .swaps
            .try_get(rwtxn, &swap.key)
            .map_err(DbError::from)?
            .is_some()
        {
            return Err(Error::ItemIsDup);
        }
        self.swaps
            .put(rwtxn, &swap.key, swap)
            .map_err(DbError::from)?;
        tracing::debug!(key = ?swap.key, status = %swap.status, "added swap");
        Ok(())
    }

    pub fn try_get_swap(
        &self,
        rotxn: &RoTxn,
        key: &SwapKey,
    ) -> Result<Option<Swap>, Error> {
        let swap = self.swaps.try_get(rotxn, key).map_err(DbError::from)?;
        Ok(swap)
    }

    /// Update status and memo of an existing registration. The timestamp is
    /// refreshed so pollers see the transition.
    pub fn update_swap_status(
        &self,
        rwtxn: &mut RwTxn,
        key: &SwapKey,
        status: SwapStatus,
        memo: String,
    ) -> Result<(), Error> {
        let Some(mut swap) =
            self.swaps.try_get(rwtxn, key).map_err(DbError::from)?
        else {
            return Err(Error::SwapNotFound { key: key.clone() });
        };
        swap.status = status;
        swap.memo = memo;
        swap.timestamp = now_timestamp();
        self.swaps.put(rwtxn, key, &swap).map_err(DbError::from)?;
        tracing::debug!(key = ?key, status = %status, "updated swap status");
        Ok(())
    }

    // Swap results

    /// Insert a result record and bump the pair statistics. At most one
    /// result may exist per swap key.
    pub fn add_swap_result(
        &self,
        rwtxn: &mut RwTxn,
        result: &SwapResult,
    ) -> Result<(), Error> {
        if self
            .swap_results
            .try_get(rwtxn, &result.key)
            .map_err(DbError::from)?
            .is_some()
        {
            return Err(Error::ItemIsDup);
        }
        self.swap_results
            .put(rwtxn, &result.key, result)
            .map_err(DbError::from)?;
        if let Some(pair_id) = result.key.pair_id() {
            let mut stats = self
                .swap_statistics
                .try_get(rwtxn, &pair_id.to_owned())
                .map_err(DbError::from)?
                .unwrap_or_default();
            match result.swap_type.direction() {
                Some(SwapDirection::Swapin) => stats.swapin_count += 1,
                Some(SwapDirection::Swapout) => stats.swapout_count += 1,
                None => {}
            }
            self.swap_statistics
                .put(rwtxn, &pair_id.to_owned(), &stats)
                .map_err(DbError::from)?;
        }
        Ok(())
    }

    pub fn try_get_swap_result(
        &self,
        rotxn: &RoTxn,
        key: &SwapKey,
    ) -> Result<Option<SwapResult>, Error> {
        let result = self
            .swap_results
            .try_get(rotxn, key)
            .map_err(DbError::from)?;
        Ok(result)
    }

    /// Page through classic result records for a pair, optionally filtered
    /// by bind address. Results are ordered by swap time; `descending`
    /// reverses the order before `offset`/`limit` apply.
    pub fn get_swap_history(
        &self,
        rotxn: &RoTxn,
        direction: SwapDirection,
        pair_id: &str,
        address: &str,
        offset: usize,
        limit: usize,
        descending: bool,
    ) -> Result<Vec<SwapResult>, Error> {
        let pair_id = pair_id.to_lowercase();
        let mut results: Vec<SwapResult> = self
            .swap_results
            .iter(rotxn)
            .map_err(db_error::Iter::from)?
            .filter_map(|(key, result)| {
                let matches = match &key {
                    SwapKey::Classic {
                        direction: dir,
                        pair_id: pair,
                        bind,
                        ..
                    } => {
                        *dir == direction
                            && *pair == pair_id
                            && (address.is_empty()
                                || bind.as_str() == address)
                    }
                    SwapKey::Router { .. } => false,
                };
                Ok(matches.then_some(result))
            })
            .collect()
            .map_err(db_error::Iter::from)?;
        Self::paginate(&mut results, offset, limit, descending);
        Ok(results)
    }

    /// Router flavor of [`Self::get_swap_history`], keyed by source chain id
    pub fn get_router_swap_history(
        &self,
        rotxn: &RoTxn,
        from_chain_id: &str,
        address: &str,
        offset: usize,
        limit: usize,
        descending: bool,
    ) -> Result<Vec<SwapResult>, Error> {
        let mut results: Vec<SwapResult> = self
            .swap_results
            .iter(rotxn)
            .map_err(db_error::Iter::from)?
            .filter_map(|(key, result)| {
                let matches = matches!(
                    &key,
                    SwapKey::Router { from_chain_id: chain, .. }
                        if *chain == from_chain_id
                ) && (address.is_empty() || result.bind == address);
                Ok(matches.then_some(result))
            })
            .collect()
            .map_err(db_error::Iter::from)?;
        Self::paginate(&mut results, offset, limit, descending);
        Ok(results)
    }

    fn paginate(
        results: &mut Vec<SwapResult>,
        offset: usize,
        limit: usize,
        descending: bool,
    ) {
        results.sort_by_key(|r| (r.swap_time, r.timestamp));
        if descending {
            results.reverse();
        }
        if offset > 0 {
            results.drain(..offset.min(results.len()));
        }
        results.truncate(limit);
    }

    // Address registration

    /// Register a lowercased user address. Duplicate registration fails
    /// with [`Error::ItemIsDup`].
    pub fn register_address(
        &self,
        rwtxn: &mut RwTxn,
        address: &str,
    ) -> Result<(), Error> {
        let address = address.to_lowercase();
        if self
            .registered_addresses
            .try_get(rwtxn, &address)
            .map_err(DbError::from)?
            .is_some()
        {
            return Err(Error::ItemIsDup);
        }
        let record = RegisteredAddress {
            address: address.clone(),
            timestamp: now_timestamp(),
        };
        self.registered_addresses
            .put(rwtxn, &address, &record)
            .map_err(DbError::from)?;
        Ok(())
    }

    pub fn try_get_registered_address(
        &self,
        rotxn: &RoTxn,
        address: &str,
    ) -> Result<Option<RegisteredAddress>, Error> {
        let record = self
            .registered_addresses
            .try_get(rotxn, &address.to_lowercase())
            .map_err(DbError::from)?;
        Ok(record)
    }

    // P2SH bindings

    /// Record the `bind → p2sh` mapping (and its reverse) unless the bind
    /// address is already mapped
    pub fn add_p2sh_address(
        &self,
        rwtxn: &mut RwTxn,
        bind_address: &str,
        p2sh_address: &str,
    ) -> Result<(), Error> {
        let bind = bind_address.to_owned();
        let p2sh = p2sh_address.to_owned();
        if self
            .p2sh_addresses
            .try_get(rwtxn, &bind)
            .map_err(DbError::from)?
            .is_some()
        {
            return Ok(());
        }
        self.p2sh_addresses
            .put(rwtxn, &bind, &p2sh)
            .map_err(DbError::from)?;
        self.p2sh_bind_addresses
            .put(rwtxn, &p2sh, &bind)
            .map_err(DbError::from)?;
        Ok(())
    }

    pub fn try_get_p2sh_address(
        &self,
        rotxn: &RoTxn,
        bind_address: &str,
    ) -> Result<Option<String>, Error> {
        let p2sh = self
            .p2sh_addresses
            .try_get(rotxn, &bind_address.to_owned())
            .map_err(DbError::from)?;
        Ok(p2sh)
    }

    pub fn try_get_p2sh_bind_address(
        &self,
        rotxn: &RoTxn,
        p2sh_address: &str,
    ) -> Result<Option<String>, Error> {
        let bind = self
            .p2sh_bind_addresses
            .try_get(rotxn, &p2sh_address.to_owned())
            .map_err(DbError::from)?;
        Ok(bind)
    }

    // Checkpoints and statistics

    pub fn update_latest_scan_info(
        &self,
        rwtxn: &mut RwTxn,
        is_src: bool,
        block_height: u64,
    ) -> Result<(), Error> {
        let info = LatestScanInfo {
            block_height,
            timestamp: now_timestamp(),
        };
        self.latest_scan_info
            .put(rwtxn, &is_src, &info)
            .map_err(DbError::from)?;
        Ok(())
    }

    pub fn get_latest_scan_info(
        &self,
        rotxn: &RoTxn,
        is_src: bool,
    ) -> Result<LatestScanInfo, Error> {
        let info = self
            .latest_scan_info
            .try_get(rotxn, &is_src)
            .map_err(DbError::from)?
            .unwrap_or_default();
        Ok(info)
    }

    pub fn get_swap_statistics(
        &self,
        rotxn: &RoTxn,
        pair_id: &str,
    ) -> Result<SwapStatistics, Error> {
        let stats = self
            .swap_statistics
            .try_get(rotxn, &pair_id.to_lowercase())
            .map_err(DbError::from)?
            .unwrap_or_default();
        Ok(stats)
    }
}
