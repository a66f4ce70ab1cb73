//! Adversarial story-writing engine.
//!
//! Two language models, each backed by its own provider, take turns
//! rewriting one story: one writes for the protagonist, the other for the
//! antagonist. This crate provides:
//! - Role parsing (`provider.model[/resource]`)
//! - A tolerant parser for `Title: ... The End` story output
//! - Per-turn prompt construction
//! - The turn-based dialogue engine with its retry policy
//! - Usage-metering hooks
//!
//! # Quick Start
//!
//! ```ignore
//! use adverstorial_core::{parse_role, Config, Dialogue, NoopMeter, RoleType};
//! use providers::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let client = Client::new(&config.providers)?;
//!
//!     let protagonist = parse_role("openai.gpt-5", RoleType::Protagonist)?;
//!     let antagonist = parse_role("anthropic.claude-3-opus", RoleType::Antagonist)?;
//!
//!     let outcome = Dialogue::new(&config, &client, &NoopMeter)
//!         .run("A lighthouse keeper finds a bottle", protagonist, antagonist, 2)
//!         .await?;
//!     println!("{}", outcome.story);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dialogue;
pub mod metering;
pub mod prompt;
pub mod role;
pub mod story;
pub mod testing;

// Primary public API
pub use config::{Config, ConfigError, MeteringConfig};
pub use dialogue::{
    Dialogue, DialogueError, DialogueOutcome, DialogueState, TextSource, TurnFailure, TurnRecord,
};
pub use metering::{meter_for, MeterError, NoopMeter, PayiMeter, SessionStart, UsageMeter};
pub use role::{parse_role, Role, RoleError, RoleType};
pub use story::{parse_story, ParseError, Story};
pub use testing::{RecordingMeter, ScriptedSource};
