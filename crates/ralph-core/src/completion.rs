/// Token the agent prints when the whole task is done
pub const COMPLETION_MARKER: &str = "RALPH_LOOP_COMPLETE";

/// Glyph that must accompany the marker
pub const COMPLETION_GLYPH: &str = "🎯";

/// Whether `output` carries the completion signal.
///
/// Both the marker and the glyph are required; prose that merely mentions
/// the marker does not stop the loop.
pub fn signals_completion(output: &str) -> bool {
    output.contains(COMPLETION_MARKER) && output.contains(COMPLETION_GLYPH)
}

/// Whether the agent's own output shows it ran `git commit`
pub fn mentions_commit(output: &str) -> bool {
    output.to_lowercase().contains("git commit")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_and_glyph_required() {
        assert!(signals_completion("🎯 RALPH_LOOP_COMPLETE"));
        assert!(signals_completion(
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"RALPH_LOOP_COMPLETE 🎯"}]}}"#
        ));
        assert!(!signals_completion("Not done; will print RALPH_LOOP_COMPLETE later"));
        assert!(!signals_completion("🎯 on target"));
    }

    #[test]
    fn test_mentions_commit() {
        assert!(mentions_commit("⚡ Bash: Git Commit -m 'wip'"));
        assert!(!mentions_commit("committed nothing"));
    }
}
