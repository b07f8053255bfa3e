use clap::Parser as _;
use crossbridge_app_cli_lib::Cli;

#[allow(clippy::print_stdout)]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let output = cli.run().await?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}
