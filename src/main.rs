use anyhow::Result;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use room_relay::{
    cli::{Cli, Command},
    client, proxy,
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Proxy(args) => {
            let listener = TcpListener::bind(args.listen).await?;
            let proxy = proxy::Proxy::new(listener, args.backend);
            let addr = proxy.local_addr()?;
            info!("proxy listening on {}", addr);
            if let Err(err) = proxy.run_until_ctrl_c().await {
                warn!("proxy exited with error: {err:?}");
                return Err(err);
            }
        }
        Command::Client(args) => client::run(args).await?,
    }

    Ok(())
}
