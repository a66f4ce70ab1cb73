//! Story parser tests on realistic model output.
//!
//! Models rarely return exactly the requested format. These tests cover the
//! decorations seen in practice and check that a serialized story always
//! parses back to itself.

use adverstorial_core::{parse_story, ParseError, Story};

#[test]
fn test_marker_variants_parse_to_same_title() {
    for title_line in ["## Title: Foo", "`Title: Foo`", "Title: Foo"] {
        let raw = format!("{title_line}\n\nThe fog rolled in.\n\nThe End");
        let story = parse_story(&raw).unwrap();
        assert_eq!(story.title(), "Foo", "{title_line}");
        assert_eq!(story.content(), "The fog rolled in.");
    }
}

#[test]
fn test_markdown_heavy_reply() {
    let raw = "Sure! Here is my turn.\n\
               \n\
               ```\n\
               **Title: The Keeper's Bargain**\n\
               \n\
               The keeper uncorked the bottle.\n\
               \n\
               A voice spoke from inside it.\n\
               \n\
               ### *The End*\n\
               ```\n\
               Let me know if you'd like changes.";

    let story = parse_story(raw).unwrap();
    assert_eq!(story.title(), "The Keeper's Bargain");
    assert_eq!(
        story.content(),
        "The keeper uncorked the bottle.\n\nA voice spoke from inside it."
    );
    assert_eq!(story.lines().first().map(String::as_str), Some("Sure! Here is my turn."));
}

#[test]
fn test_round_trip_preserves_title_and_content() {
    let stories = [
        Story::new("The Bottle", "She found it at dawn.").unwrap(),
        Story::new(
            "Two Keepers",
            "First paragraph.\n\nSecond paragraph,\nwith a hard wrap.",
        )
        .unwrap(),
        Story::new("Ünïcödé Tide", "Salt — and söme wind.").unwrap(),
        Story::new("Dialogue", "\"Title: nothing,\" she said.\nHe laughed.").unwrap(),
    ];

    for story in stories {
        let parsed = parse_story(&story.to_string()).unwrap();
        assert_eq!(parsed.title(), story.title());
        assert_eq!(parsed.content(), story.content());
    }
}

#[test]
fn test_failures_are_distinct() {
    assert_eq!(parse_story("").unwrap_err(), ParseError::EmptyContent);
    assert_eq!(
        parse_story("A story with no markers.").unwrap_err(),
        ParseError::MissingTitle
    );
    assert_eq!(
        parse_story("Title: Open Ending\n\nIt never stops.").unwrap_err(),
        ParseError::MissingEndMarker
    );
    assert_eq!(
        parse_story("Title: Blank\n\n   \n\nThe End").unwrap_err(),
        ParseError::EmptyStoryBody
    );
}

#[test]
fn test_end_marker_must_stand_alone() {
    let raw = "Title: Almost\n\nIt was the end of the line.\nThe End is near, he said.\n\nThe End.";
    let story = parse_story(raw).unwrap();
    assert_eq!(
        story.content(),
        "It was the end of the line.\nThe End is near, he said."
    );
}

#[test]
fn test_decorated_title_round_trips() {
    for title in ["Run!", "  *Who Goes There?*  ", "## Tide ##"] {
        let story = Story::new(title, "Body.").unwrap();
        let parsed = parse_story(&story.to_string()).unwrap();
        assert_eq!(parsed.title(), story.title(), "{title}");
        assert_eq!(parsed.content(), story.content());
    }
    assert_eq!(Story::new("Run!", "Body.").unwrap().title(), "Run");
}

#[test]
fn test_body_with_end_marker_line_is_rejected() {
    assert_eq!(
        Story::new("Finale", "She whispered.\nThe End\nBut it wasn't."),
        Err(ParseError::EndMarkerInBody)
    );
    assert_eq!(
        Story::new("Finale", "She whispered.\n\n## *the end.*"),
        Err(ParseError::EndMarkerInBody)
    );
}

#[test]
fn test_crlf_body_round_trips() {
    let story = Story::new("Crlf", "One.\r\nTwo.").unwrap();
    assert_eq!(story.content(), "One.\nTwo.");
    let parsed = parse_story(&story.to_string()).unwrap();
    assert_eq!(parsed.content(), story.content());
}
