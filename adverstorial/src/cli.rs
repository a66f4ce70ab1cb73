//! Command-line arguments and their validation.

use adverstorial_core::{parse_role, prompt, Config, Role, RoleType};
use anyhow::Context;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use providers::Temperature;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "adverstorial",
    version,
    about = "Two language models write one story, one turn at a time"
)]
pub struct Args {
    /// Seed prompt for the story
    #[arg(value_name = "PROMPT")]
    pub prompt: Option<String>,

    /// Seed prompt (takes precedence over the positional prompt)
    #[arg(long = "prompt", id = "prompt_flag", value_name = "TEXT")]
    pub prompt_flag: Option<String>,

    /// Protagonist role [env: PROTAGONIST, default: openai.gpt-5]
    #[arg(short = 'P', long, value_name = "PROVIDER.MODEL[/RESOURCE]")]
    pub protagonist: Option<String>,

    /// Antagonist role [env: ANTAGONIST, default: anthropic.claude-3-opus]
    #[arg(short = 'A', long, value_name = "PROVIDER.MODEL[/RESOURCE]")]
    pub antagonist: Option<String>,

    /// Number of rounds; each role writes once per round [env: ROUNDS]
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
    pub rounds: Option<u32>,

    /// Output token cap per call [env: MAX_OUTPUT_TOKENS]
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_output_tokens: Option<u32>,

    /// Reasoning effort for reasoning models [env: REASONING_EFFORT]
    #[arg(long, value_name = "LEVEL")]
    pub reasoning_effort: Option<String>,

    /// Base temperature, jittered by up to 1% per call [env: TEMPERATURE]
    #[arg(long, conflicts_with = "temperature_range")]
    pub temperature: Option<f64>,

    /// Draw each call's temperature uniformly from this range
    #[arg(long, value_name = "MIN..MAX", value_parser = parse_temperature_range)]
    pub temperature_range: Option<Temperature>,

    /// Seed for the coin toss and temperature draws [env: SEED]
    #[arg(long)]
    pub seed: Option<u64>,

    /// Markdown file whose "## Instructions" section replaces the built-in rules
    #[arg(long, value_name = "FILE")]
    pub instructions: Option<PathBuf>,

    /// Also write the final story to this file
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// A validated request to run one dialogue.
#[derive(Debug)]
pub struct Invocation {
    pub prompt: String,
    pub protagonist: Role,
    pub antagonist: Role,
    pub rounds: u32,
}

impl Args {
    /// Apply the sampling and instruction overrides to `config`.
    pub fn configure(&self, mut config: Config) -> anyhow::Result<Config> {
        if let Some(tokens) = self.max_output_tokens {
            config = config.with_max_output_tokens(tokens);
        }
        if let Some(effort) = &self.reasoning_effort {
            config = config.with_reasoning_effort(effort.clone());
        }
        if let Some(base) = self.temperature {
            config = config.with_temperature(Temperature::Jittered(base));
        }
        if let Some(range) = self.temperature_range {
            config = config.with_temperature(range);
        }
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        if let Some(rounds) = self.rounds {
            config = config.with_rounds(rounds);
        }
        if let Some(path) = &self.instructions {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read instructions from {}", path.display()))?;
            let instructions =
                prompt::instructions_section(&text).unwrap_or_else(|| text.trim().to_string());
            if instructions.is_empty() {
                anyhow::bail!("instructions file {} is empty", path.display());
            }
            config = config.with_instructions(instructions);
        }
        Ok(config)
    }

    /// Resolve the prompt and roles, reporting problems as usage errors.
    pub fn resolve(&self, config: &Config) -> Result<Invocation, clap::Error> {
        let prompt = self
            .prompt_flag
            .as_deref()
            .or(self.prompt.as_deref())
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                usage_error(
                    ErrorKind::MissingRequiredArgument,
                    "a seed prompt is required (positional PROMPT or --prompt)",
                )
            })?;

        let protagonist = role_arg(
            self.protagonist.as_deref(),
            &config.protagonist,
            "--protagonist",
            "PROTAGONIST",
            RoleType::Protagonist,
        )?;
        let antagonist = role_arg(
            self.antagonist.as_deref(),
            &config.antagonist,
            "--antagonist",
            "ANTAGONIST",
            RoleType::Antagonist,
        )?;

        if config.rounds == 0 {
            return Err(usage_error(
                ErrorKind::ValueValidation,
                "ROUNDS must be at least 1",
            ));
        }

        Ok(Invocation {
            prompt: prompt.to_string(),
            protagonist,
            antagonist,
            rounds: config.rounds,
        })
    }
}

fn role_arg(
    given: Option<&str>,
    default: &str,
    flag: &str,
    var: &str,
    kind: RoleType,
) -> Result<Role, clap::Error> {
    let (value, source) = match given {
        Some(value) => (value, flag.to_string()),
        None => (default, format!("default {kind} ({var})")),
    };
    parse_role(value, kind)
        .map_err(|e| usage_error(ErrorKind::ValueValidation, format!("{source}: {e}")))
}

fn parse_temperature_range(s: &str) -> Result<Temperature, String> {
    if !s.contains("..") {
        return Err(format!("expected MIN..MAX, got {s:?}"));
    }
    s.parse()
}

fn usage_error(kind: ErrorKind, message: impl std::fmt::Display) -> clap::Error {
    Args::command().error(kind, message)
}
