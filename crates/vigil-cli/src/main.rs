//! Vigil CLI - races streamed generation against a safety classifier
#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::missing_panics_doc,
        reason = "Allow for tests"
    )
)]

use core::time::Duration;
use std::env;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser as _;
use console::Term;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _, util::SubscriberInitExt as _};
use vigil_core::{StreamSource, Validator, VigilConfig};
use vigil_gate::RaceGate;
use vigil_providers::{
    ChatCompletionValidator, MockValidator, ScriptedStream, stream_source_from_config,
};

use cli::Cli;
use render::ConsoleConsumer;

mod cli;
mod render;

/// Pacing of scripted fragments in mock mode.
const MOCK_FRAGMENT_DELAY: Duration = Duration::from_millis(40);
/// Latency of the keyword classifier in mock mode.
const MOCK_VERDICT_DELAY: Duration = Duration::from_millis(120);

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "vigil=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    match dotenv {
        Ok(path) => debug!(path = %path.display(), "loaded .env"),
        Err(error) if error.not_found() => {}
        Err(error) => warn!(%error, "failed to read .env"),
    }

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let gate = build_gate(&cli, &config)?;

    let term = Term::stdout();
    let mut console = ConsoleConsumer::new(term);
    for prompt in cli.prompts() {
        console.start(&prompt)?;
        let report = gate.run(&prompt, &mut console).await;
        console.finish(&report)?;
    }

    Ok(())
}

/// Resolves configuration: file, then environment, then flags.
fn load_config(cli: &Cli) -> Result<VigilConfig> {
    let path: Option<PathBuf> = match &cli.config {
        Some(path) => Some(path.clone()),
        None => match VigilConfig::config_path() {
            Ok(path) => Some(path),
            Err(error) => {
                debug!(%error, "no default config location");
                None
            }
        },
    };

    let mut config = match path {
        Some(path) => VigilConfig::load_or_default(&path)?,
        None => VigilConfig::default(),
    };
    config.apply_env(|key| env::var(key).ok())?;
    cli.apply(&mut config);
    config.validate()?;
    Ok(config)
}

fn build_gate(cli: &Cli, config: &VigilConfig) -> Result<RaceGate> {
    let (source, validator): (Arc<dyn StreamSource>, Arc<dyn Validator>) = if cli.mock {
        info!("mock mode: scripted generator and keyword classifier");
        (
            Arc::new(ScriptedStream::echo().with_delay(MOCK_FRAGMENT_DELAY)),
            Arc::new(MockValidator::demo().with_delay(MOCK_VERDICT_DELAY)),
        )
    } else {
        let validator = ChatCompletionValidator::from_config(&config.validator)?;
        info!(
            generator = config.generator.base_url(),
            validator = validator.url(),
            "using HTTP backends"
        );
        (stream_source_from_config(&config.generator), Arc::new(validator))
    };

    Ok(RaceGate::from_config(source, validator, config))
}
