//! Provider-side configuration: proxy location, credentials and sampling.

use crate::{Error, Provider};
use rand::Rng;
use reqwest::Url;
use std::str::FromStr;
use std::time::Duration;

/// API keys and provider-specific settings.
///
/// Every key is optional here; [`ProviderConfig::require_credentials`] checks
/// the ones a given provider actually needs.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub openai_api_key: Option<String>,
    pub azure_openai_api_key: Option<String>,
    pub azure_openai_base_uri: Option<String>,
    pub anthropic_api_key: Option<String>,
    /// Key for the metering proxy, appended to each provider key.
    pub proxy_api_key: Option<String>,
}

impl Credentials {
    /// Read credentials from the standard environment variables.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            openai_api_key: var("OPENAI_API_KEY"),
            azure_openai_api_key: var("AZURE_OPENAI_API_KEY"),
            azure_openai_base_uri: var("AZURE_OPENAI_BASE_URI"),
            anthropic_api_key: var("ANTHROPIC_API_KEY"),
            proxy_api_key: var("PAYI_API_KEY"),
        }
    }

    /// A provider key followed by the proxy key, skipping empty parts.
    pub(crate) fn with_proxy_key(&self, key: &str) -> String {
        [Some(key), self.proxy_api_key.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Everything the provider adapters need besides the request itself.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL every provider endpoint is joined onto.
    pub proxy_url: Url,
    pub credentials: Credentials,
    pub max_output_tokens: u32,
    /// Effort level sent to reasoning-family models instead of a temperature.
    pub reasoning_effort: String,
    /// Upper bound on a single provider call.
    pub timeout: Duration,
}

impl ProviderConfig {
    pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 5000;
    pub const DEFAULT_REASONING_EFFORT: &'static str = "minimal";
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

    /// Create a config for the given proxy base URL with default limits.
    pub fn new(proxy_url: &str) -> Result<Self, Error> {
        Ok(Self {
            proxy_url: base_url(proxy_url)?,
            credentials: Credentials::default(),
            max_output_tokens: Self::DEFAULT_MAX_OUTPUT_TOKENS,
            reasoning_effort: Self::DEFAULT_REASONING_EFFORT.to_string(),
            timeout: Self::DEFAULT_TIMEOUT,
        })
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = tokens;
        self
    }

    pub fn with_reasoning_effort(mut self, effort: impl Into<String>) -> Self {
        self.reasoning_effort = effort.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The proxy endpoint for `path` under the provider's prefix.
    pub fn endpoint(&self, provider: Provider, path: &str) -> Result<Url, Error> {
        self.proxy_url
            .join(&format!("{}/{}", provider.prefix(), path))
            .map_err(|e| Error::InvalidConfig(format!("bad endpoint for {provider}: {e}")))
    }

    /// Check that every credential the provider needs is present.
    pub fn require_credentials(&self, provider: Provider) -> Result<(), Error> {
        let creds = &self.credentials;
        match provider {
            Provider::OpenAi => {
                require(&creds.openai_api_key, "OPENAI_API_KEY")?;
            }
            Provider::AzureOpenAi => {
                require(&creds.azure_openai_api_key, "AZURE_OPENAI_API_KEY")?;
                require(&creds.azure_openai_base_uri, "AZURE_OPENAI_BASE_URI")?;
            }
            Provider::Anthropic => {
                require(&creds.anthropic_api_key, "ANTHROPIC_API_KEY")?;
            }
        }
        Ok(())
    }
}

pub(crate) fn require<'a>(
    value: &'a Option<String>,
    name: &'static str,
) -> Result<&'a str, Error> {
    value.as_deref().ok_or(Error::MissingCredential(name))
}

// Relative joins replace the last path segment unless the base ends in '/'.
fn base_url(raw: &str) -> Result<Url, Error> {
    let mut raw = raw.trim().to_string();
    if !raw.ends_with('/') {
        raw.push('/');
    }
    Url::parse(&raw).map_err(|e| Error::InvalidConfig(format!("invalid proxy URL {raw:?}: {e}")))
}

/// How the sampling temperature is chosen for each call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Temperature {
    /// The base value nudged by up to one percent either way.
    Jittered(f64),
    /// Drawn uniformly from `min..max`.
    Uniform { min: f64, max: f64 },
}

impl Temperature {
    pub const DEFAULT_BASE: f64 = 0.7;

    /// Draw the temperature for one call.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match *self {
            Temperature::Jittered(base) => {
                let spread = base / 100.0;
                base + rng.gen::<f64>() * spread - rng.gen::<f64>() * spread
            }
            Temperature::Uniform { min, max } if max > min => rng.gen_range(min..max),
            Temperature::Uniform { min, .. } => min,
        }
    }

    /// Inclusive bounds every draw falls within.
    pub fn bounds(&self) -> (f64, f64) {
        match *self {
            Temperature::Jittered(base) => {
                let spread = (base / 100.0).abs();
                (base - spread, base + spread)
            }
            Temperature::Uniform { min, max } => (min, max.max(min)),
        }
    }
}

impl Default for Temperature {
    fn default() -> Self {
        Temperature::Jittered(Self::DEFAULT_BASE)
    }
}

impl FromStr for Temperature {
    type Err = String;

    /// Parses `0.7` as a jittered base or `0.5..0.9` as a uniform range.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let number = |v: &str| {
            v.trim()
                .parse::<f64>()
                .map_err(|e| format!("invalid temperature {v:?}: {e}"))
        };

        match s.split_once("..") {
            Some((min, max)) => {
                let (min, max) = (number(min)?, number(max)?);
                if min > max {
                    return Err(format!("temperature range {s:?} is reversed"));
                }
                Ok(Temperature::Uniform { min, max })
            }
            None => Ok(Temperature::Jittered(number(s)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_endpoint_joins_under_prefix() {
        let config = ProviderConfig::new("https://proxy.example.com/api").unwrap();
        assert_eq!(
            config.endpoint(Provider::AzureOpenAi, "openai/v1/responses").unwrap().as_str(),
            "https://proxy.example.com/api/azure.openai/openai/v1/responses"
        );
        assert_eq!(
            config.endpoint(Provider::Anthropic, "v1/messages").unwrap().as_str(),
            "https://proxy.example.com/api/anthropic/v1/messages"
        );
    }

    #[test]
    fn test_invalid_proxy_url() {
        assert!(matches!(
            ProviderConfig::new("not a url"),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_require_credentials() {
        let config = ProviderConfig::new("http://localhost:8000").unwrap().with_credentials(
            Credentials {
                azure_openai_api_key: Some("azure".to_string()),
                ..Default::default()
            },
        );

        assert!(matches!(
            config.require_credentials(Provider::OpenAi),
            Err(Error::MissingCredential("OPENAI_API_KEY"))
        ));
        assert!(matches!(
            config.require_credentials(Provider::AzureOpenAi),
            Err(Error::MissingCredential("AZURE_OPENAI_BASE_URI"))
        ));
    }

    #[test]
    fn test_proxy_key_joining() {
        let mut creds = Credentials::default();
        assert_eq!(creds.with_proxy_key("sk-1"), "sk-1");

        creds.proxy_api_key = Some("px-2".to_string());
        assert_eq!(creds.with_proxy_key("sk-1"), "sk-1 px-2");
    }

    #[test]
    fn test_jittered_temperature_stays_within_one_percent() {
        let mut rng = StdRng::seed_from_u64(7);
        let temperature = Temperature::Jittered(0.7);
        let (low, high) = temperature.bounds();

        for _ in 0..500 {
            let t = temperature.draw(&mut rng);
            assert!(t >= low && t <= high, "{t} outside {low}..{high}");
        }
    }

    #[test]
    fn test_uniform_temperature() {
        let mut rng = StdRng::seed_from_u64(7);
        let temperature = Temperature::Uniform { min: 0.2, max: 0.4 };
        for _ in 0..500 {
            let t = temperature.draw(&mut rng);
            assert!((0.2..0.4).contains(&t));
        }

        let pinned = Temperature::Uniform { min: 0.3, max: 0.3 };
        assert_eq!(pinned.draw(&mut rng), 0.3);
    }

    #[test]
    fn test_temperature_from_str() {
        assert_eq!("0.9".parse::<Temperature>().unwrap(), Temperature::Jittered(0.9));
        assert_eq!(
            "0.5..0.8".parse::<Temperature>().unwrap(),
            Temperature::Uniform { min: 0.5, max: 0.8 }
        );
        assert!("0.8..0.5".parse::<Temperature>().is_err());
        assert!("warm".parse::<Temperature>().is_err());
    }
}
