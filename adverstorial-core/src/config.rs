//! Process-wide configuration, read once from the environment.

use crate::prompt;
use crate::role::Role;
use providers::{Credentials, Provider, ProviderConfig, Temperature};
use reqwest::Url;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default `provider.model` for the protagonist.
pub const DEFAULT_PROTAGONIST: &str = "openai.gpt-5";

/// Default `provider.model` for the antagonist.
pub const DEFAULT_ANTAGONIST: &str = "anthropic.claude-3-opus";

/// Errors from building a [`Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("{provider} requires {var} to be set")]
    MissingCredential { provider: Provider, var: &'static str },

    #[error(transparent)]
    Provider(#[from] providers::Error),
}

/// Where usage-metering calls go.
#[derive(Debug, Clone)]
pub struct MeteringConfig {
    pub api_url: Url,
    /// Metering is disabled without a key.
    pub api_key: Option<String>,
    pub verify_ssl: bool,
}

impl MeteringConfig {
    /// Metering settings for a proxy, with the API URL derived from it.
    pub fn for_proxy(proxy_url: &Url) -> Self {
        let api_url = derive_api_url(proxy_url);
        let verify_ssl = !(mentions_localhost(&api_url) || mentions_localhost(proxy_url));
        Self {
            api_url,
            api_key: None,
            verify_ssl,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.as_deref().is_some_and(|key| !key.is_empty())
    }
}

/// Immutable settings for one process, passed by reference to the engine.
#[derive(Debug, Clone)]
pub struct Config {
    pub providers: ProviderConfig,
    pub metering: MeteringConfig,
    pub temperature: Temperature,
    /// System instructions sent with every turn.
    pub instructions: String,
    pub rounds: u32,
    pub protagonist: String,
    pub antagonist: String,
    pub default_user_id: Option<String>,
    pub default_account_name: Option<String>,
    /// Seed for the coin toss and temperature draws.
    pub seed: Option<u64>,
}

impl Config {
    pub const DEFAULT_ROUNDS: u32 = 1;

    /// Defaults around an already-built provider config.
    pub fn new(providers: ProviderConfig) -> Self {
        let metering = MeteringConfig::for_proxy(&providers.proxy_url);
        Self {
            providers,
            metering,
            temperature: Temperature::default(),
            instructions: prompt::default_instructions(),
            rounds: Self::DEFAULT_ROUNDS,
            protagonist: DEFAULT_PROTAGONIST.to_string(),
            antagonist: DEFAULT_ANTAGONIST.to_string(),
            default_user_id: None,
            default_account_name: None,
            seed: None,
        }
    }

    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let proxy_url = var("PAYI_PROXY_URL").ok_or(ConfigError::Missing("PAYI_PROXY_URL"))?;
        let credentials = Credentials {
            openai_api_key: var("OPENAI_API_KEY"),
            azure_openai_api_key: var("AZURE_OPENAI_API_KEY"),
            azure_openai_base_uri: var("AZURE_OPENAI_BASE_URI"),
            anthropic_api_key: var("ANTHROPIC_API_KEY"),
            proxy_api_key: var("PAYI_API_KEY"),
        };

        let mut providers = ProviderConfig::new(&proxy_url)?
            .with_credentials(credentials)
            .with_max_output_tokens(parse_var(
                "MAX_OUTPUT_TOKENS",
                var("MAX_OUTPUT_TOKENS"),
                ProviderConfig::DEFAULT_MAX_OUTPUT_TOKENS,
            )?)
            .with_timeout(Duration::from_secs(parse_var(
                "REQUEST_TIMEOUT_SECS",
                var("REQUEST_TIMEOUT_SECS"),
                ProviderConfig::DEFAULT_TIMEOUT.as_secs(),
            )?));
        if let Some(effort) = var("REASONING_EFFORT") {
            providers = providers.with_reasoning_effort(effort);
        }

        let mut config = Self::new(providers);

        if let Some(api_url) = var("PAYI_API_URL") {
            config.metering.api_url = Url::parse(&api_url).map_err(|e| ConfigError::Invalid {
                var: "PAYI_API_URL",
                value: api_url.clone(),
                reason: e.to_string(),
            })?;
            config.metering.verify_ssl = !(mentions_localhost(&config.metering.api_url)
                || mentions_localhost(&config.providers.proxy_url));
        }
        if let Some(verify) = var("PAYI_VERIFY_SSL") {
            config.metering.verify_ssl = parse_bool(&verify);
        }
        config.metering.api_key = var("PAYI_API_KEY");

        config.temperature = parse_var("TEMPERATURE", var("TEMPERATURE"), Temperature::default())?;
        config.rounds = parse_var("ROUNDS", var("ROUNDS"), Self::DEFAULT_ROUNDS)?;
        config.seed = var("SEED")
            .map(|seed| parse_var("SEED", Some(seed), 0))
            .transpose()?;

        if let Some(role) = var("PROTAGONIST") {
            config.protagonist = role;
        }
        if let Some(role) = var("ANTAGONIST") {
            config.antagonist = role;
        }
        config.default_user_id = var("DEFAULT_USER_ID");
        config.default_account_name = var("DEFAULT_ACCOUNT_NAME");

        Ok(config)
    }

    pub fn with_temperature(mut self, temperature: Temperature) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.providers.max_output_tokens = tokens;
        self
    }

    pub fn with_reasoning_effort(mut self, effort: impl Into<String>) -> Self {
        self.providers.reasoning_effort = effort.into();
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_rounds(mut self, rounds: u32) -> Self {
        self.rounds = rounds;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.providers.credentials = credentials;
        self
    }

    /// Fail early if `role`'s provider is missing a credential.
    pub fn check_role(&self, role: &Role) -> Result<(), ConfigError> {
        self.providers
            .require_credentials(role.provider)
            .map_err(|e| match e {
                providers::Error::MissingCredential(var) => ConfigError::MissingCredential {
                    provider: role.provider,
                    var,
                },
                other => ConfigError::Provider(other),
            })
    }
}

/// Truthy spellings accepted for boolean variables.
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "yes" | "1" | "on"
    )
}

fn parse_var<T>(name: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match value {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var: name,
            reason: e.to_string(),
            value,
        }),
    }
}

// The metering API lives on the proxy's host, under `api.` rather than
// `developer.`.
fn derive_api_url(proxy_url: &Url) -> Url {
    let mut url = proxy_url.clone();
    url.set_path("/");
    url.set_query(None);
    url.set_fragment(None);

    if let Some(host) = proxy_url.host_str() {
        let host = host.replace("developer.", "api.");
        if url.set_host(Some(&host)).is_err() {
            log::warn!("could not derive metering host from {proxy_url}");
        }
    }

    url
}

fn mentions_localhost(url: &Url) -> bool {
    url.as_str().contains("localhost")
}
