//! Shared setup for integration tests: a store over a real temporary LMDB
//! environment

use crossbridge::state::{self, Store};
use sneed::Env;
use tempfile::TempDir;

/// A store with its env and backing directory. Dropping this removes the
/// database.
pub struct TestStore {
    pub env: Env,
    pub store: Store,
    _tmp: TempDir,
}

pub fn open_test_store() -> TestStore {
    let tmp = TempDir::new().expect("create temp dir");
    let db_path = tmp.path().join("data.mdb");
    std::fs::create_dir_all(&db_path).expect("create db dir");
    let env = state::open_env(&db_path).expect("open env");
    let store = Store::new(&env).expect("create store");
    TestStore {
        env,
        store,
        _tmp: tmp,
    }
}
