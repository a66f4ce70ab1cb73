//! Adversarial story writing from the command line.
//!
//! Two models, one for the protagonist and one for the antagonist, take turns
//! rewriting a story that starts from a seed prompt:
//!
//! ```bash
//! cargo run -p adverstorial -- "A lighthouse keeper finds a bottle" \
//!     --protagonist openai.gpt-5 --antagonist anthropic.claude-3-opus --rounds 2
//! ```
//!
//! Configuration comes from the environment (and a `.env` file if present);
//! see `Config::from_env` for the variables.

mod cli;

use adverstorial_core::{meter_for, Config, Dialogue};
use anyhow::Context;
use clap::Parser;
use cli::Args;
use providers::Client;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = Config::from_env().context("failed to load configuration")?;
    let config = args.configure(config)?;
    let invocation = args.resolve(&config).unwrap_or_else(|e| e.exit());

    // Missing keys should fail now, not after the first turn.
    config.check_role(&invocation.protagonist)?;
    config.check_role(&invocation.antagonist)?;

    let client = Client::new(&config.providers)?;
    let meter = meter_for(&config.metering, config.providers.timeout)?;

    log::info!(
        "{} (protagonist) vs {} (antagonist)",
        invocation.protagonist,
        invocation.antagonist
    );

    let outcome = Dialogue::new(&config, &client, meter.as_ref())
        .run(
            &invocation.prompt,
            invocation.protagonist,
            invocation.antagonist,
            invocation.rounds,
        )
        .await?;

    println!("{}", outcome.story);

    if let Some(path) = &args.output {
        std::fs::write(path, outcome.story.to_string())
            .with_context(|| format!("failed to write story to {}", path.display()))?;
        log::info!("Story written to {}", path.display());
    }

    println!("Game Over: {}", outcome.game_id);
    Ok(())
}
