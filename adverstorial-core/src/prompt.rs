//! Per-turn message construction.

use crate::role::Role;
use crate::story::Story;

/// Bundled game rules; the `## Instructions` section is the system prompt.
pub const INSTRUCTIONS_DOCUMENT: &str = include_str!("prompts/instructions.md");

const INSTRUCTIONS_HEADING: &str = "## Instructions";

/// Session state the message for one turn is built from.
#[derive(Debug, Clone, Copy)]
pub struct TurnContext<'a> {
    pub seed_prompt: &'a str,
    /// Both roles in coin-toss order.
    pub order: &'a [Role; 2],
    pub round: u32,
    /// 1 or 2.
    pub turn: usize,
    /// The story as the previous turn left it.
    pub story: Option<&'a Story>,
}

impl<'a> TurnContext<'a> {
    /// The role being addressed this turn.
    pub fn speaker(&self) -> &'a Role {
        &self.order[(self.turn + 1) % 2]
    }

    /// The role that is not being addressed.
    pub fn opponent(&self) -> &'a Role {
        &self.order[self.turn % 2]
    }
}

/// Build the user message for one turn.
///
/// A short list of facts about the game comes first, then a blank line, then
/// either the seed prompt (first turn of the session) or the current story.
pub fn build_message(ctx: &TurnContext<'_>) -> String {
    let speaker = ctx.speaker();
    let opponent = ctx.opponent();

    let mut facts = vec![
        format!("* Coin toss winner: {}", ctx.order[0].kind),
        format!("* Seed prompt: {}", ctx.seed_prompt),
        format!("* It is round {}, turn {} of 2.", ctx.round, ctx.turn),
        // The model is told it plays its own side against "me", the other side.
        format!("* I am writing on the side of the {}.", opponent.kind),
        format!("* You are writing on the side of the {}.", speaker.kind),
    ];
    if let Some(story) = ctx.story {
        facts.push(format!("* Story Title: {}", story.title()));
    }
    if ctx.round > 1 {
        facts.push("* Previous round data has been truncated for brevity.".to_string());
    }

    let payload = match ctx.story {
        Some(story) => story.to_string(),
        None => format!("You won the coin toss so you go first: {}", ctx.seed_prompt),
    };

    format!("{}\n\n{}", facts.join("\n"), payload)
}

/// Metering label for one turn, e.g. `round-2-turn-1-write`.
pub fn use_case_step(round: u32, turn: usize) -> String {
    format!("round-{round}-turn-{turn}-write")
}

/// The body of the `## Instructions` section of a markdown document.
///
/// The section runs until the next top- or second-level heading. Returns
/// `None` if there is no such section or it is empty.
pub fn instructions_section(markdown: &str) -> Option<String> {
    let mut lines = markdown.lines();
    lines.find(|line| line.trim_end().eq_ignore_ascii_case(INSTRUCTIONS_HEADING))?;

    let body = lines
        .take_while(|line| !(line.starts_with("# ") || line.starts_with("## ")))
        .collect::<Vec<_>>()
        .join("\n");
    let body = body.trim();

    (!body.is_empty()).then(|| body.to_string())
}

/// Instructions from the bundled rules document.
pub fn default_instructions() -> String {
    instructions_section(INSTRUCTIONS_DOCUMENT).unwrap_or_default()
}
