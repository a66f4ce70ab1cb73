//! The turn-based dialogue engine.
//!
//! A dialogue tosses a coin to order the two roles, then for each round lets
//! both roles rewrite the story once, in that fixed order. Each turn builds a
//! message from the session state, asks the role's provider for text and
//! parses a [`Story`] out of it. A turn that produces no usable story is
//! retried once; a second failure ends the dialogue.

use crate::config::Config;
use crate::metering::{SessionStart, UsageMeter};
use crate::prompt::{self, TurnContext};
use crate::role::{Role, RoleType};
use crate::story::{parse_story, ParseError, Story};
use async_trait::async_trait;
use providers::{Client, Generation, GenerationRequest, Transport};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use thiserror::Error;

/// Provider calls allowed per turn: the first attempt and one retry.
pub const MAX_ATTEMPTS: u32 = 2;

/// Anything that can turn a generation request into text.
#[async_trait]
pub trait TextSource: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, providers::Error>;
}

#[async_trait]
impl<'a, T: Transport> TextSource for Client<'a, T> {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, providers::Error> {
        Client::generate(self, request).await
    }
}

/// Why a single attempt at a turn produced no story. Retried once.
#[derive(Debug, Error)]
pub enum TurnFailure {
    #[error("provider call failed: {0}")]
    Provider(#[from] providers::Error),

    #[error("could not parse story: {0}")]
    Parse(#[from] ParseError),
}

impl TurnFailure {
    /// Label reported to the metering service.
    pub fn kind(&self) -> String {
        match self {
            TurnFailure::Provider(e) => e.failure_kind(),
            TurnFailure::Parse(_) => "parse_story".to_string(),
        }
    }

    /// Whether another provider call could succeed. Configuration problems
    /// such as a missing credential fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        match self {
            TurnFailure::Provider(e) => e.is_transient(),
            TurnFailure::Parse(_) => true,
        }
    }
}

/// Errors that end a dialogue.
#[derive(Debug, Error)]
pub enum DialogueError {
    #[error("rounds must be at least 1")]
    InvalidRounds,

    /// The turn failed on its last attempt. `attempts` is 1 when the failure
    /// was not retryable.
    #[error("round {round}, turn {turn} ({role}) failed after {attempts} attempts: {failure}")]
    RetryExhausted {
        round: u32,
        turn: usize,
        role: RoleType,
        attempts: u32,
        /// The message the failing turn sent.
        message: String,
        #[source]
        failure: TurnFailure,
    },
}

/// Where a dialogue is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogueState {
    NotStarted,
    InRound { round: u32, turn: usize },
    Completed,
    Failed,
}

/// One accepted turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRecord {
    pub round: u32,
    pub turn: usize,
    pub role: RoleType,
    /// Provider calls it took, 1 or 2.
    pub attempts: u32,
    /// Title of the story the turn produced.
    pub title: String,
    pub request_id: Option<String>,
}

/// Result of a completed dialogue.
#[derive(Debug, Clone)]
pub struct DialogueOutcome {
    pub game_id: String,
    /// Roles in the order they spoke.
    pub order: [Role; 2],
    /// The story as the last turn left it.
    pub story: Story,
    pub turns: Vec<TurnRecord>,
}

/// Drives one dialogue between two roles.
pub struct Dialogue<'a> {
    config: &'a Config,
    source: &'a dyn TextSource,
    meter: &'a dyn UsageMeter,
    rng: StdRng,
    state: DialogueState,
}

impl<'a> Dialogue<'a> {
    /// Create a dialogue. The random source is seeded from `config.seed` if
    /// set, otherwise from entropy.
    pub fn new(config: &'a Config, source: &'a dyn TextSource, meter: &'a dyn UsageMeter) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            source,
            meter,
            rng,
            state: DialogueState::NotStarted,
        }
    }

    /// Replace the random source used for the coin toss, game id and
    /// temperatures.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn state(&self) -> DialogueState {
        self.state
    }

    /// Run the full dialogue and return the final story.
    pub async fn run(
        &mut self,
        seed_prompt: &str,
        protagonist: Role,
        antagonist: Role,
        rounds: u32,
    ) -> Result<DialogueOutcome, DialogueError> {
        if rounds == 0 {
            return Err(DialogueError::InvalidRounds);
        }

        let game_id = uuid::Builder::from_random_bytes(self.rng.gen())
            .into_uuid()
            .simple()
            .to_string();

        let protagonist_id = protagonist.identifier();
        let antagonist_id = antagonist.identifier();

        // The coin toss.
        let mut order = [protagonist, antagonist];
        order.shuffle(&mut self.rng);

        let session = SessionStart {
            game_id: game_id.clone(),
            protagonist: protagonist_id,
            antagonist: antagonist_id,
            rounds,
            seed_prompt: seed_prompt.to_string(),
            order: [order[0].kind, order[1].kind],
        };

        log::info!("Game {game_id}: {rounds} round(s), seed prompt: {seed_prompt}");
        log::info!(
            "Coin toss: {} ({}) goes first, then {} ({})",
            order[0].kind,
            order[0],
            order[1].kind,
            order[1]
        );
        self.meter.start_session(&session).await;

        let mut story: Option<Story> = None;
        let mut turns = Vec::new();

        for round in 1..=rounds {
            for turn in 1..=2 {
                self.state = DialogueState::InRound { round, turn };
                let ctx = TurnContext {
                    seed_prompt,
                    order: &order,
                    round,
                    turn,
                    story: story.as_ref(),
                };
                let role = ctx.speaker();

                log::info!("### Round {round} of {rounds} / Turn {turn} of 2");
                let message = prompt::build_message(&ctx);
                log::debug!("{message}");

                let request = role
                    .request(message)
                    .with_instructions(self.config.instructions.clone())
                    .with_correlation_id(game_id.clone());
                let step = prompt::use_case_step(round, turn);

                let mut attempts = 0;
                let accepted = loop {
                    attempts += 1;
                    match self.attempt(&request, role, &game_id, &step).await {
                        Ok(accepted) => break accepted,
                        Err(failure) if attempts < MAX_ATTEMPTS && failure.is_retryable() => {
                            log::warn!("{failure}, retrying...");
                        }
                        Err(failure) => {
                            log::error!(
                                "Round {round}, turn {turn} ({}) failed after {attempts} attempts: {failure}\n{}",
                                role.kind,
                                request.message
                            );
                            self.state = DialogueState::Failed;
                            self.report_session(&game_id, "system.failure", &failure.kind())
                                .await;
                            return Err(DialogueError::RetryExhausted {
                                round,
                                turn,
                                role: role.kind,
                                attempts,
                                message: request.message.clone(),
                                failure,
                            });
                        }
                    }
                };

                log::info!("{accepted}");
                turns.push(TurnRecord {
                    round,
                    turn,
                    role: role.kind,
                    attempts,
                    title: accepted.title().to_string(),
                    request_id: accepted.request_id().map(str::to_string),
                });
                story = Some(accepted);
            }
        }

        // rounds >= 1, so at least one turn was accepted.
        let Some(story) = story else {
            self.state = DialogueState::Failed;
            return Err(DialogueError::InvalidRounds);
        };

        self.report_session(&game_id, "story.title", story.title())
            .await;
        self.state = DialogueState::Completed;
        log::info!("Game Over: {game_id}");

        Ok(DialogueOutcome {
            game_id,
            order,
            story,
            turns,
        })
    }

    /// One provider call for a turn, with a fresh temperature.
    async fn attempt(
        &mut self,
        request: &GenerationRequest,
        role: &Role,
        game_id: &str,
        step: &str,
    ) -> Result<Story, TurnFailure> {
        let temperature = self.config.temperature.draw(&mut self.rng);
        let request = request.clone().with_temperature(temperature);

        let generation = match self.source.generate(&request).await {
            Ok(generation) => generation,
            Err(e) => {
                log::error!("{} call failed: {e}", role.identifier());
                self.report_session(game_id, "system.failure", &e.failure_kind())
                    .await;
                self.report_session(game_id, "system.failure.description", &e.to_string())
                    .await;
                return Err(e.into());
            }
        };

        let request_id = match generation.response_id.as_deref() {
            Some(response_id) => {
                self.meter
                    .resolve_request_id(role.provider, response_id)
                    .await
            }
            None => None,
        };

        if let Some(request_id) = request_id.as_deref() {
            let user_id = generation
                .end_user
                .as_deref()
                .or(self.config.default_user_id.as_deref());
            let account = generation
                .organization
                .as_deref()
                .or(self.config.default_account_name.as_deref());

            self.report_request(request_id, "role", Some(role.kind.as_str()))
                .await;
            self.report_request(request_id, "system.user_id", user_id)
                .await;
            self.report_request(request_id, "system.account_name", account)
                .await;
            self.report_request(request_id, "system.use_case_step", Some(step))
                .await;
        }

        match parse_story(&generation.text) {
            Ok(story) => Ok(story.with_request_id(request_id)),
            Err(e) => {
                log::warn!("Failed to parse story output: {e}");
                log::debug!("Unparseable output:\n{}", generation.text);
                if let Some(request_id) = request_id.as_deref() {
                    self.report_request(request_id, "system.failure", Some("parse_story"))
                        .await;
                    self.report_request(
                        request_id,
                        "system.failure.description",
                        Some(&e.to_string()),
                    )
                    .await;
                }
                Err(e.into())
            }
        }
    }

    async fn report_request(&self, request_id: &str, key: &str, value: Option<&str>) {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            self.meter.set_request_property(request_id, key, value).await;
        }
    }

    async fn report_session(&self, game_id: &str, key: &str, value: &str) {
        if !value.is_empty() {
            self.meter.set_session_property(game_id, key, value).await;
        }
    }
}
