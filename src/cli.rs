use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the directory/auth proxy in front of the hosted chat backend.
    Proxy(ProxyArgs),
    /// Start an interactive chat session.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ProxyArgs {
    /// Socket address the proxy should bind to. Use 0 for an ephemeral port.
    #[arg(long, default_value = "127.0.0.1:3001")]
    pub listen: SocketAddr,

    /// Base URL of the hosted chat backend.
    #[arg(long, default_value = "http://127.0.0.1:4000")]
    pub backend: String,
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Base URL of the directory/auth proxy.
    #[arg(long, default_value = "http://127.0.0.1:3001")]
    pub proxy: String,

    /// Base URL of the hosted chat backend.
    #[arg(long, default_value = "http://127.0.0.1:4000")]
    pub backend: String,
}
