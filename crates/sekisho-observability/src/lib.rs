use eyre::Context;
use std::env;
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    filter::{LevelFilter, Targets},
    layer::SubscriberExt,
    Layer, Registry,
};

fn targets(value: Option<&str>) -> Targets {
    value
        .ok_or_else(|| eyre::eyre!("RUST_LOG not set"))
        .and_then(|targets| targets.parse().context("Failed to parse RUST_LOG value"))
        .unwrap_or_else(|_| Targets::default().with_default(LevelFilter::INFO))
}

/// Install the global tracing subscriber
///
/// Filtered through `RUST_LOG`, defaulting to `INFO` if it's unset or malformed.
pub fn initialise() -> eyre::Result<()> {
    let env_filter = targets(env::var("RUST_LOG").ok().as_deref());

    let subscriber = Registry::default()
        .with(tracing_subscriber::fmt::layer().with_filter(env_filter))
        .with(ErrorLayer::default());

    tracing::subscriber::set_global_default(subscriber)
        .context("Couldn't install the global tracing subscriber")?;

    Ok(())
}
