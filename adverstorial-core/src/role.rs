//! Participants in a dialogue and how they are named on the command line.

use providers::{GenerationRequest, Provider};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors from parsing a role string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoleError {
    #[error("invalid role {value:?}: {reason}")]
    InvalidRoleFormat { value: String, reason: String },
}

/// Which side of the story a role writes for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleType {
    Protagonist,
    Antagonist,
}

impl RoleType {
    pub fn as_str(self) -> &'static str {
        match self {
            RoleType::Protagonist => "protagonist",
            RoleType::Antagonist => "antagonist",
        }
    }

    /// The other side.
    pub fn opponent(self) -> Self {
        match self {
            RoleType::Protagonist => RoleType::Antagonist,
            RoleType::Antagonist => RoleType::Protagonist,
        }
    }
}

impl fmt::Display for RoleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "protagonist" => Ok(RoleType::Protagonist),
            "antagonist" => Ok(RoleType::Antagonist),
            other => Err(format!("unknown role type: {other}")),
        }
    }
}

/// A participant bound to one provider and model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub provider: Provider,
    pub model: String,
    /// Reference model used to price Azure deployments.
    pub resource: Option<String>,
    pub kind: RoleType,
}

impl Role {
    pub fn new(provider: Provider, model: impl Into<String>, kind: RoleType) -> Self {
        Self {
            provider,
            model: model.into(),
            resource: None,
            kind,
        }
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// `provider.model`, without any resource suffix.
    pub fn identifier(&self) -> String {
        format!("{}.{}", self.provider, self.model)
    }

    /// Start a generation request addressed to this role's model.
    pub fn request(&self, message: impl Into<String>) -> GenerationRequest {
        let request = GenerationRequest::new(self.provider, self.model.clone(), message);
        match &self.resource {
            Some(resource) => request.with_resource(resource.clone()),
            None => request,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.provider, self.model)?;
        if let Some(resource) = &self.resource {
            write!(f, "/{resource}")?;
        }
        Ok(())
    }
}

/// Parse `provider.model` or `provider.model/resource` into a role.
///
/// The provider must be one of the known prefixes; everything after the
/// first `/` in the model portion becomes the resource.
pub fn parse_role(value: &str, kind: RoleType) -> Result<Role, RoleError> {
    let invalid = |reason: String| RoleError::InvalidRoleFormat {
        value: value.to_string(),
        reason,
    };

    let (provider, rest) = Provider::ALL
        .into_iter()
        .find_map(|p| {
            value
                .strip_prefix(p.prefix())
                .and_then(|rest| rest.strip_prefix('.'))
                .map(|rest| (p, rest))
        })
        .ok_or_else(|| {
            let known: Vec<_> = Provider::ALL.iter().map(|p| p.prefix()).collect();
            invalid(format!("unknown provider, expected one of: {}", known.join(", ")))
        })?;

    let (model, resource) = match rest.split_once('/') {
        Some((model, resource)) => (model, Some(resource).filter(|r| !r.is_empty())),
        None => (rest, None),
    };

    if model.is_empty() {
        return Err(invalid(format!("missing model after {provider}.")));
    }

    Ok(Role {
        provider,
        model: model.to_string(),
        resource: resource.map(str::to_string),
        kind,
    })
}
