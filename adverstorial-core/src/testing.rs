//! Testing utilities for dialogues.
//!
//! This module provides tools for integration testing:
//! - `ScriptedSource` for deterministic provider replies without API calls
//! - `RecordingMeter` for asserting what was reported to metering
//! - Small fixtures for configs, roles and story text

use crate::config::Config;
use crate::dialogue::TextSource;
use crate::metering::{SessionStart, UsageMeter};
use crate::role::{Role, RoleType};
use async_trait::async_trait;
use providers::{Generation, GenerationRequest, Provider, ProviderConfig};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A text source that replays scripted replies in order.
///
/// Once the script runs out it keeps returning the fallback text, if one was
/// given, or a network error otherwise.
#[derive(Default)]
pub struct ScriptedSource {
    /// Scripted replies to return in order.
    script: Mutex<VecDeque<Result<Generation, providers::Error>>>,
    /// Returned after the script is exhausted.
    fallback: Option<String>,
    /// Every request received, in order.
    calls: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedSource {
    /// An empty script with no fallback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Always reply with `text`.
    pub fn always(text: impl Into<String>) -> Self {
        Self {
            fallback: Some(text.into()),
            ..Self::default()
        }
    }

    /// Queue a plain text reply.
    pub fn then_text(self, text: impl Into<String>) -> Self {
        self.then_generation(Generation::text(text))
    }

    /// Queue a reply with identifiers.
    pub fn then_generation(self, generation: Generation) -> Self {
        lock(&self.script).push_back(Ok(generation));
        self
    }

    /// Queue a failed call.
    pub fn then_error(self, error: providers::Error) -> Self {
        lock(&self.script).push_back(Err(error));
        self
    }

    /// Requests received so far.
    pub fn calls(&self) -> Vec<GenerationRequest> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }
}

#[async_trait]
impl TextSource for ScriptedSource {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, providers::Error> {
        lock(&self.calls).push(request.clone());

        if let Some(reply) = lock(&self.script).pop_front() {
            return reply;
        }

        match &self.fallback {
            Some(text) => Ok(Generation::text(text.clone())),
            None => Err(providers::Error::Network(
                "no more scripted replies".to_string(),
            )),
        }
    }
}

/// One thing reported to a [`RecordingMeter`].
#[derive(Debug, Clone, PartialEq)]
pub enum MeterEvent {
    SessionStart(SessionStart),
    RequestProperty {
        request_id: String,
        key: String,
        value: String,
    },
    SessionProperty {
        game_id: String,
        key: String,
        value: String,
    },
}

/// A meter that remembers everything it is told.
///
/// Response ids resolve to `req-<response id>`.
#[derive(Default)]
pub struct RecordingMeter {
    events: Mutex<Vec<MeterEvent>>,
}

impl RecordingMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MeterEvent> {
        lock(&self.events).clone()
    }

    /// Properties set on one metered request, in order.
    pub fn request_properties(&self, request_id: &str) -> Vec<(String, String)> {
        lock(&self.events)
            .iter()
            .filter_map(|event| match event {
                MeterEvent::RequestProperty {
                    request_id: id,
                    key,
                    value,
                } if id == request_id => Some((key.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }

    /// Properties set on the session, in order.
    pub fn session_properties(&self) -> Vec<(String, String)> {
        lock(&self.events)
            .iter()
            .filter_map(|event| match event {
                MeterEvent::SessionProperty { key, value, .. } => {
                    Some((key.clone(), value.clone()))
                }
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl UsageMeter for RecordingMeter {
    async fn start_session(&self, start: &SessionStart) {
        lock(&self.events).push(MeterEvent::SessionStart(start.clone()));
    }

    async fn resolve_request_id(&self, _provider: Provider, response_id: &str) -> Option<String> {
        Some(format!("req-{response_id}"))
    }

    async fn set_request_property(&self, request_id: &str, key: &str, value: &str) {
        lock(&self.events).push(MeterEvent::RequestProperty {
            request_id: request_id.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        });
    }

    async fn set_session_property(&self, game_id: &str, key: &str, value: &str) {
        lock(&self.events).push(MeterEvent::SessionProperty {
            game_id: game_id.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        });
    }
}

/// A config pointing at a local proxy, with short test instructions.
pub fn test_config() -> Config {
    let providers = ProviderConfig::new("http://localhost:8000/")
        .unwrap_or_else(|e| panic!("static proxy URL rejected: {e}"));
    Config::new(providers).with_instructions("Write the next part of the story.")
}

/// An OpenAI protagonist and an Anthropic antagonist.
pub fn sample_roles() -> (Role, Role) {
    (
        Role::new(Provider::OpenAi, "gpt-5", RoleType::Protagonist),
        Role::new(Provider::Anthropic, "claude-3-opus", RoleType::Antagonist),
    )
}

/// Model output in the expected story format.
pub fn story_text(title: &str, content: &str) -> String {
    format!("Title: {title}\n\n{content}\n\nThe End")
}

// A panicking test thread must not hide what was recorded before it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
