use sneed::{db::error as db_error, env::Error as EnvError, rwtxn};
use thiserror::Error;

use crate::types::SwapKey;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database env error")]
    DbEnv(#[from] EnvError),
    #[error("database error")]
    Db(#[from] db_error::Error),
    #[error("database iteration error")]
    DbIter(#[from] db_error::Iter),
    #[error("database write error")]
    DbWrite(#[from] rwtxn::Error),
    #[error("item is duplicate")]
    ItemIsDup,
    #[error("swap not found: {key:?}")]
    SwapNotFound { key: SwapKey },
}
