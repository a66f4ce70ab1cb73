//! Stories and the marker-line parser that extracts them from model output.
//!
//! A model reply is expected to contain a `Title: ...` line and, somewhere
//! after it, a `The End` line. Models decorate these lines freely (markdown
//! headings, bold, code spans), so matching ignores any run of non-word
//! characters around the marker.

use std::fmt;
use thiserror::Error;

/// Marker keyword introducing the title line.
pub const TITLE_MARKER: &str = "Title";

/// Marker phrase closing the story body.
pub const END_MARKER: &str = "The End";

/// Why a piece of model output could not be turned into a [`Story`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Empty story content")]
    EmptyContent,

    #[error("Missing 'Title:' marker line")]
    MissingTitle,

    #[error("Missing 'The End' marker line after the title")]
    MissingEndMarker,

    #[error("No story text between 'Title:' and 'The End'")]
    EmptyStoryBody,

    #[error("Story text contains a 'The End' line")]
    EndMarkerInBody,
}

/// A parsed narrative artifact. Title and content are never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Story {
    title: String,
    content: String,
    lines: Vec<String>,
    request_id: Option<String>,
}

impl Story {
    /// Build a story directly from a title and body.
    ///
    /// The title is reduced to what [`parse_story`] would read back from its
    /// serialized form: the first line, with surrounding decoration removed.
    /// A body containing a standalone end-marker line is rejected, since it
    /// would cut the story short when parsed.
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Result<Self, ParseError> {
        let title = title.into();
        let title = title
            .lines()
            .next()
            .unwrap_or_default()
            .trim_matches(|c: char| !is_word(c))
            .to_string();
        let content = content
            .into()
            .lines()
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string();
        if title.is_empty() {
            return Err(ParseError::MissingTitle);
        }
        if content.is_empty() {
            return Err(ParseError::EmptyStoryBody);
        }
        if content.lines().any(is_end_marker) {
            return Err(ParseError::EndMarkerInBody);
        }

        let mut story = Self {
            title,
            content,
            lines: Vec::new(),
            request_id: None,
        };
        story.lines = story.to_string().lines().map(str::to_string).collect();
        Ok(story)
    }

    /// Attach the metering request id of the call that produced this story.
    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id.filter(|id| !id.is_empty());
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Every line of the text the story was parsed from.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }
}

impl fmt::Display for Story {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Title: {}\n\n{}\n\n{END_MARKER}\n", self.title, self.content)
    }
}

/// Extract a story from raw model output.
pub fn parse_story(raw: &str) -> Result<Story, ParseError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ParseError::EmptyContent);
    }

    let lines: Vec<&str> = raw.lines().collect();

    let (title, body_start) = lines
        .iter()
        .enumerate()
        .find_map(|(i, line)| {
            marker_value(line, TITLE_MARKER)
                .filter(|title| !title.is_empty())
                .map(|title| (title, i + 1))
        })
        .ok_or(ParseError::MissingTitle)?;

    let body_end = lines[body_start..]
        .iter()
        .position(|line| is_end_marker(line))
        .map(|offset| body_start + offset)
        .ok_or(ParseError::MissingEndMarker)?;

    let content = lines[body_start..body_end].join("\n").trim().to_string();
    if content.is_empty() {
        return Err(ParseError::EmptyStoryBody);
    }

    Ok(Story {
        title,
        content,
        lines: lines.into_iter().map(str::to_string).collect(),
        request_id: None,
    })
}

/// If `line` is a `marker` line, the rest of the line with decoration removed.
///
/// `"## **Title: Foo**"` with marker `Title` yields `Some("Foo")`. The marker
/// must be followed by a non-word character or the end of the line, so
/// `"Titles"` is not a title line.
pub fn marker_value(line: &str, marker: &str) -> Option<String> {
    let rest = line.trim_start_matches(|c: char| !is_word(c));
    let head = rest.get(..marker.len())?;
    if !head.eq_ignore_ascii_case(marker) {
        return None;
    }

    let tail = &rest[marker.len()..];
    if tail.chars().next().is_some_and(is_word) {
        return None;
    }

    Some(tail.trim_matches(|c: char| !is_word(c)).to_string())
}

/// Whether `line` consists of the end marker and decoration only.
pub fn is_end_marker(line: &str) -> bool {
    marker_value(line, END_MARKER).is_some_and(|rest| rest.is_empty())
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_story() {
        let story = parse_story("Title: The Bottle\n\nShe found it at dawn.\n\nThe End").unwrap();
        assert_eq!(story.title(), "The Bottle");
        assert_eq!(story.content(), "She found it at dawn.");
        assert_eq!(story.lines().len(), 5);
        assert_eq!(story.request_id(), None);
    }

    #[test]
    fn test_title_marker_tolerance() {
        for line in [
            "Title: Foo",
            "## Title: Foo",
            "`Title: Foo`",
            "**Title:** Foo",
            "# TITLE - Foo",
            "*title: Foo*",
        ] {
            assert_eq!(marker_value(line, TITLE_MARKER).as_deref(), Some("Foo"), "{line}");
        }
    }

    #[test]
    fn test_title_marker_needs_boundary() {
        assert_eq!(marker_value("Titles are hard", TITLE_MARKER), None);
        assert_eq!(marker_value("Entitled: Foo", TITLE_MARKER), None);
        assert_eq!(marker_value("Title:", TITLE_MARKER).as_deref(), Some(""));
    }

    #[test]
    fn test_end_marker_tolerance() {
        assert!(is_end_marker("The End"));
        assert!(is_end_marker("**THE END**"));
        assert!(is_end_marker("## the end."));
        assert!(is_end_marker("  `The End`  "));
        assert!(!is_end_marker("The End of the beginning"));
        assert!(!is_end_marker("The Endless sea"));
        assert!(!is_end_marker("Not The End"));
    }

    #[test]
    fn test_empty_content() {
        assert_eq!(parse_story(""), Err(ParseError::EmptyContent));
        assert_eq!(parse_story("  \n\t\n "), Err(ParseError::EmptyContent));
    }

    #[test]
    fn test_missing_title() {
        assert_eq!(
            parse_story("Once upon a time.\n\nThe End"),
            Err(ParseError::MissingTitle)
        );
        // A title line with no value does not count.
        assert_eq!(
            parse_story("Title:\n\nBody\n\nThe End"),
            Err(ParseError::MissingTitle)
        );
    }

    #[test]
    fn test_missing_end_marker() {
        assert_eq!(
            parse_story("Title: Adrift\n\nThe boat drifted on."),
            Err(ParseError::MissingEndMarker)
        );
        // An end marker before the title is not searched.
        assert_eq!(
            parse_story("The End\nTitle: Adrift\n\nThe boat drifted on."),
            Err(ParseError::MissingEndMarker)
        );
    }

    #[test]
    fn test_empty_story_body() {
        assert_eq!(
            parse_story("Title: Nothing\n\n\nThe End"),
            Err(ParseError::EmptyStoryBody)
        );
        assert_eq!(parse_story("Title: Nothing\nThe End"), Err(ParseError::EmptyStoryBody));
    }

    #[test]
    fn test_first_title_and_first_end_win() {
        let raw = "Preamble from the model.\n\
                   ## Title: First\n\
                   Line one.\n\
                   Title: Second\n\
                   Line two.\n\
                   *The End*\n\
                   Trailing chatter.\n\
                   The End";
        let story = parse_story(raw).unwrap();
        assert_eq!(story.title(), "First");
        assert_eq!(story.content(), "Line one.\nTitle: Second\nLine two.");
    }

    #[test]
    fn test_windows_line_endings() {
        let story = parse_story("Title: Crlf\r\n\r\nBody.\r\n\r\nThe End\r\n").unwrap();
        assert_eq!(story.title(), "Crlf");
        assert_eq!(story.content(), "Body.");
    }

    #[test]
    fn test_serialization_format() {
        let story = Story::new("The Bottle", "She found it at dawn.").unwrap();
        assert_eq!(
            story.to_string(),
            "Title: The Bottle\n\nShe found it at dawn.\n\nThe End\n"
        );
    }

    #[test]
    fn test_story_new_rejects_empty_parts() {
        assert_eq!(Story::new("  ", "body"), Err(ParseError::MissingTitle));
        assert_eq!(Story::new("Title", "\n"), Err(ParseError::EmptyStoryBody));
    }

    #[test]
    fn test_parse_is_repeatable() {
        let raw = "Title: Echo\n\nAgain and again.\n\nThe End";
        assert_eq!(parse_story(raw), parse_story(raw));
        assert_eq!(parse_story("no markers"), parse_story("no markers"));
    }

    #[test]
    fn test_story_new_normalizes_title() {
        let story = Story::new("**Run!**", "Body.").unwrap();
        assert_eq!(story.title(), "Run");
        assert_eq!(Story::new("First\nSecond", "Body.").unwrap().title(), "First");
        assert_eq!(Story::new("?!", "Body."), Err(ParseError::MissingTitle));
    }

    #[test]
    fn test_story_new_rejects_end_marker_line() {
        assert_eq!(
            Story::new("Finale", "She whispered.\n**The End**\nBut it wasn't."),
            Err(ParseError::EndMarkerInBody)
        );
        // Mentioning the phrase mid-sentence is fine.
        assert!(Story::new("Finale", "It was not The End of her.").is_ok());
    }

    #[test]
    fn test_request_id() {
        let story = Story::new("T", "C").unwrap();
        assert_eq!(story.clone().with_request_id(Some("r-1".into())).request_id(), Some("r-1"));
        assert_eq!(story.with_request_id(Some(String::new())).request_id(), None);
    }
}
