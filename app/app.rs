use std::{path::Path, sync::Arc};

use crossbridge::{
    config::Config,
    core::Core,
    gateway::GatewayBridge,
    state::{self, Store},
    tokens::{Bridges, ChainBridge},
};

/// The running coordinator: config, bridges and store behind one shared
/// context
#[derive(Clone)]
pub struct App {
    pub core: Arc<Core>,
}

fn build_bridges(config: &Config) -> anyhow::Result<Bridges> {
    let src: Arc<dyn ChainBridge> =
        Arc::new(GatewayBridge::from_chain_config(&config.src_chain)?);
    let dest: Arc<dyn ChainBridge> =
        Arc::new(GatewayBridge::from_chain_config(&config.dest_chain)?);
    let mut bridges = Bridges::new(src, dest);
    for router in &config.router_chains {
        let bridge: Arc<dyn ChainBridge> =
            Arc::new(GatewayBridge::from_router_config(router)?);
        bridges.register_chain(bridge)?;
        tracing::info!(
            chain = %router.name,
            chain_id = %router.chain_id,
            "registered router bridge"
        );
    }
    Ok(bridges)
}

impl App {
    pub fn new(config: Config, data_dir: &Path) -> anyhow::Result<Self> {
        config.validate()?;
        let db_path = data_dir.join("data.mdb");
        std::fs::create_dir_all(&db_path)?;
        let env = state::open_env(&db_path)?;
        let store = Store::new(&env)?;
        let bridges = build_bridges(&config)?;
        tracing::info!(
            identifier = %config.identifier,
            src_chain = %config.src_chain.name,
            dest_chain = %config.dest_chain.name,
            pairs = config.pairs.len(),
            "coordinator initialized"
        );
        Ok(Self {
            core: Arc::new(Core::new(config, bridges, env, store)),
        })
    }
}
