//! Process-wide context threaded through the service boundaries.
//!
//! Everything here is initialized once at startup and read-only afterwards;
//! the only mutable process state outside the store is the sign-acceptance
//! history, which lives with its worker.

use sneed::{Env, RoTxn, RwTxn, env::Error as EnvError};

use crate::{config::Config, state, state::Store, tokens::Bridges};

pub struct Core {
    pub config: Config,
    pub bridges: Bridges,
    pub env: Env,
    pub store: Store,
}

impl Core {
    pub fn new(
        config: Config,
        bridges: Bridges,
        env: Env,
        store: Store,
    ) -> Self {
        Self {
            config,
            bridges,
            env,
            store,
        }
    }

    pub fn read_txn(&self) -> Result<RoTxn<'_>, state::Error> {
        let rotxn = self.env.read_txn().map_err(EnvError::from)?;
        Ok(rotxn)
    }

    pub fn write_txn(&self) -> Result<RwTxn<'_>, state::Error> {
        let rwtxn = self.env.write_txn().map_err(EnvError::from)?;
        Ok(rwtxn)
    }
}
