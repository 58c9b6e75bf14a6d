//! Textual side-channel detection of context compaction.
//!
//! The agent CLI does not emit a structured event before it compacts its own
//! context, so this is a plain substring heuristic over every raw line, JSON
//! or not. False positives are possible when the agent quotes one of these
//! phrases in its own narration; false negatives when the CLI rewords them.

/// Lower-case phrases that announce an imminent or completed compaction
pub const COMPACTION_PATTERNS: &[&str] = &[
    "conversation has been automatically summarized",
    "conversation has unlimited context through automatic summarization",
    "the conversation has been compacted",
    "compacting the conversation",
    "summarizing previous messages",
    "context window is nearly full",
];

/// Return the first compaction phrase found in `line`, if any.
pub fn detect_compaction(line: &str) -> Option<&'static str> {
    let lower = line.to_lowercase();
    COMPACTION_PATTERNS
        .iter()
        .copied()
        .find(|pattern| lower.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_phrase_case_insensitively() {
        assert_eq!(
            detect_compaction("WARNING: Context window is nearly full"),
            Some("context window is nearly full")
        );
    }

    #[test]
    fn test_detects_phrase_inside_json() {
        let line = r#"{"type":"system","message":"The conversation has been compacted"}"#;
        assert_eq!(detect_compaction(line), Some("the conversation has been compacted"));
    }

    #[test]
    fn test_ordinary_lines_pass() {
        assert_eq!(detect_compaction("compiling 12 crates"), None);
        assert_eq!(detect_compaction(""), None);
    }
}
