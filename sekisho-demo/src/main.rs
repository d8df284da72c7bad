#[macro_use]
extern crate tracing;

use clap::Parser;
use color_eyre::eyre::{self, Context};
use sekisho_config::Configuration;
use std::path::PathBuf;

mod gate;
mod server;
mod signal;

/// Small web server guarded by the sekisho anti-forgery gate
#[derive(Parser)]
#[command(about, author, version)]
struct Args {
    /// Path to the configuration file
    #[clap(long, short)]
    config: PathBuf,
}

async fn boot() -> eyre::Result<()> {
    let args = Args::parse();
    let config = Configuration::load(args.config).await?;
    sekisho_observability::initialise()?;

    let gate = gate::build(&config.gate).wrap_err("Failed to build the anti-forgery gate")?;
    let router = server::create_router(gate);

    server::run(router, config.server, signal::Shutdown::on_signal()).await
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(boot())
}
