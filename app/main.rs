use std::path::PathBuf;

use clap::Parser;
use crossbridge::{config::Config, mpc::MpcClient, node};
use crossbridge_app_cli_lib::init_tracing;

mod app;
mod rpc_server;

#[derive(Debug, Parser)]
#[command(name = "crossbridge_app", about = "Cross-chain bridge coordinator")]
struct Args {
    /// Path to the JSON config file
    #[arg(long)]
    config: PathBuf,
    /// Data directory; defaults to the platform data dir
    #[arg(long)]
    data_dir: Option<PathBuf>,
    #[arg(long, default_value_t = tracing::Level::INFO)]
    log_level: tracing::Level,
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("crossbridge")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_level)?;

    let config = Config::load_from_path(&args.config)?;
    let rpc_addr = config.rpc_listen_addr;
    let mpc_config = config.mpc.clone();

    let data_dir = args.data_dir.unwrap_or_else(default_data_dir);
    std::fs::create_dir_all(&data_dir)?;
    let app = app::App::new(config, &data_dir)?;

    let addr = rpc_server::run_server(app.clone(), rpc_addr).await?;
    tracing::info!(%addr, "rpc server listening");

    let accept_task = if mpc_config.enable {
        let backend = MpcClient::new(&mpc_config.rpc_url)?;
        node::spawn(app.core.clone(), backend)
    } else {
        None
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    if let Some(task) = accept_task {
        task.abort();
    }
    Ok(())
}
