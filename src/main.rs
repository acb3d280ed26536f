// uartmon - Multi-session serial port monitor
use clap::Parser;
use uartmon::cli::{execute_command, Args};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    execute_command(args).await?;
    Ok(())
}
