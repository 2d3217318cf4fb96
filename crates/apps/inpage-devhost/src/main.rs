use anyhow::{Context, Result};
use clap::Parser;
use inpage_devhost::{run, Session};
use inpage_provider::{DuplicateIdPolicy, ProviderConfig};
use std::path::PathBuf;
use tokio::io::BufReader;

#[derive(Parser, Debug)]
#[command(name = "inpage-devhost", about = "Drive an inpage provider over JSON lines")]
struct Args {
    /// TOML provider configuration; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    rpc_url: Option<String>,
    #[arg(long)]
    address: Option<String>,
    #[arg(long)]
    chain_id: Option<u64>,
    /// Expire unanswered host calls after this many milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,
    #[arg(long)]
    reject_duplicate_ids: bool,
    #[arg(long)]
    debug: bool,
}

impl Args {
    fn provider_config(&self) -> Result<ProviderConfig> {
        let mut config = match &self.config {
            Some(path) => ProviderConfig::from_path(path)
                .with_context(|| format!("load config {}", path.display()))?,
            None => ProviderConfig::new(1, ""),
        };
        if let Some(rpc_url) = &self.rpc_url {
            config.rpc_url = rpc_url.clone();
        }
        if let Some(address) = &self.address {
            config.address = Some(address.clone());
        }
        if let Some(chain_id) = self.chain_id {
            config.chain_id = chain_id;
        }
        if self.timeout_ms.is_some() {
            config.request_timeout_ms = self.timeout_ms;
        }
        if self.reject_duplicate_ids {
            config.duplicate_ids = DuplicateIdPolicy::Reject;
        }
        config.debug |= self.debug;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = args.provider_config()?;
    log::info!("inpage-devhost: chain {} upstream {:?}", config.chain_id, config.rpc_url);

    let (session, out_rx) = Session::start(config);
    run(session, out_rx, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await
}
