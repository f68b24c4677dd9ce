//! Parsing of the free-text meeting command.
//!
//! Two grammars are accepted, tried in order:
//!
//! 1. `"<title with spaces>" <minutes> [<@mentions>...]`
//! 2. `<title> <minutes> [<@mentions>...]`

use regex::{Captures, Regex};
use std::sync::OnceLock;

use crate::models::MeetingRequest;
use crate::{Error, Result};

/// Usage hint returned for unparseable input.
pub const USAGE: &str = "The command format is not valid.\n\
Format:\n  \
`/mtg \"Meeting title with spaces\" <minutes> [@guest...]`\n\
or\n  \
`/mtg TitleWithoutSpaces <minutes> [@guest...]`";

fn grammars() -> &'static [Regex; 2] {
    static GRAMMARS: OnceLock<[Regex; 2]> = OnceLock::new();
    GRAMMARS.get_or_init(|| {
        [
            Regex::new(r#"^"([^"]+)"\s+([0-9]+)(?s)\s*(.*)$"#).expect("quoted grammar is valid"),
            Regex::new(r"^(\S+)\s+([0-9]+)(?s)\s*(.*)$").expect("unquoted grammar is valid"),
        ]
    })
}

fn mention_pattern() -> &'static Regex {
    static MENTION: OnceLock<Regex> = OnceLock::new();
    MENTION.get_or_init(|| {
        Regex::new(r"<@([UW][A-Z0-9]+)(?:\|[^>]+)?>").expect("mention pattern is valid")
    })
}

/// Parse raw command text into a meeting request.
pub fn parse_meeting_command(text: &str) -> Result<MeetingRequest> {
    let text = text.trim();

    let captures = grammars()
        .iter()
        .find_map(|grammar| grammar.captures(text))
        .ok_or_else(malformed)?;

    request_from(&captures)
}

fn request_from(captures: &Captures<'_>) -> Result<MeetingRequest> {
    let title = &captures[1];
    if title.chars().any(char::is_control) {
        return Err(malformed());
    }

    // A digit run that does not fit is not a duration we can schedule.
    let duration_minutes: u32 = captures[2].parse().map_err(|_| malformed())?;

    let remainder = captures.get(3).map_or("", |m| m.as_str());

    Ok(MeetingRequest {
        title: title.to_string(),
        duration_minutes,
        guest_handles: extract_mentions(remainder),
    })
}

/// Extract mentioned user ids in order of appearance.
pub fn extract_mentions(text: &str) -> Vec<String> {
    mention_pattern()
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect()
}

fn malformed() -> Error {
    Error::MalformedCommand(USAGE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoted_title_keeps_spaces() {
        let request = parse_meeting_command(r#""Weekly Sync" 30 <@U123>"#).unwrap();
        assert_eq!(request.title, "Weekly Sync");
        assert_eq!(request.duration_minutes, 30);
        assert_eq!(request.guest_handles, vec!["U123"]);
    }

    #[test]
    fn test_unquoted_title_is_first_token() {
        let request = parse_meeting_command("standup 15").unwrap();
        assert_eq!(request.title, "standup");
        assert_eq!(request.duration_minutes, 15);
        assert!(request.guest_handles.is_empty());
    }

    #[test]
    fn test_mentions_with_display_names() {
        let request =
            parse_meeting_command("review 45 <@U1ABC|alice> and <@W2XYZ|bob> <@U1ABC>").unwrap();
        assert_eq!(request.guest_handles, vec!["U1ABC", "W2XYZ", "U1ABC"]);
    }

    #[test]
    fn test_mentions_only_come_from_remainder() {
        let request = parse_meeting_command(r#""Sync <@U999>" 30 <@U123>"#).unwrap();
        assert_eq!(request.title, "Sync <@U999>");
        assert_eq!(request.guest_handles, vec!["U123"]);
    }

    #[test]
    fn test_malformed_mentions_yield_no_guests() {
        let request = parse_meeting_command("sync 30 @bob <#C123> <@lowercase>").unwrap();
        assert!(request.guest_handles.is_empty());
    }

    #[test]
    fn test_surrounding_whitespace_is_ignored() {
        let request = parse_meeting_command("   sync   10   ").unwrap();
        assert_eq!(request.title, "sync");
        assert_eq!(request.duration_minutes, 10);
    }

    #[test]
    fn test_zero_duration_is_accepted() {
        let request = parse_meeting_command("sync 0").unwrap();
        assert_eq!(request.duration_minutes, 0);
    }

    #[test]
    fn test_unterminated_quote_is_malformed() {
        let err = parse_meeting_command(r#""unterminated quote 5"#).unwrap_err();
        assert!(matches!(err, Error::MalformedCommand(ref hint) if hint == USAGE));
    }

    #[test]
    fn test_single_word_is_malformed() {
        assert!(matches!(
            parse_meeting_command("onlyoneword"),
            Err(Error::MalformedCommand(_))
        ));
    }

    #[test]
    fn test_non_numeric_duration_is_malformed() {
        assert!(matches!(
            parse_meeting_command("sync thirty"),
            Err(Error::MalformedCommand(_))
        ));
        assert!(matches!(parse_meeting_command(""), Err(Error::MalformedCommand(_))));
    }

    #[test]
    fn test_overflowing_duration_is_malformed() {
        assert!(matches!(
            parse_meeting_command("sync 99999999999999999999"),
            Err(Error::MalformedCommand(_))
        ));
    }

    #[test]
    fn test_control_characters_in_title_are_malformed() {
        assert!(matches!(
            parse_meeting_command("\"line\none\" 30"),
            Err(Error::MalformedCommand(_))
        ));
    }

    #[test]
    fn test_non_ascii_digits_are_not_a_duration() {
        for text in ["sync \u{663}\u{660}", "\"Weekly Sync\" \u{663}\u{660} <@U1>", "sync \u{ff13}\u{ff10}"] {
            assert!(matches!(
                parse_meeting_command(text),
                Err(Error::MalformedCommand(hint)) if hint == USAGE
            ));
        }
    }

    #[test]
    fn test_quoted_title_without_trailing_space_falls_back() {
        // `"a"30` has no separator, so only the unquoted grammar could apply, and it fails too.
        assert!(parse_meeting_command(r#""a"30"#).is_err());
    }
}
