use crate::IterationResult;

/// How much of an error message is carried into the next prompt
const ERROR_EXCERPT: usize = 500;

const COMPACTION: &str = "⚠️ PREVIOUS ITERATION DETECTED CONVERSATION COMPACTION\n\
The last iteration was stopped early because the agent was about to compact the conversation.\n\
This indicates the context window was getting full.\n\
GUIDANCE: The iteration was terminated to preserve context. Continue with the next task.";

const MAX_TURNS: &str = "⚠️ PREVIOUS ITERATION HIT MAX TURNS LIMIT\n\
The last iteration was stopped because it reached the maximum turn limit.\n\
This usually means the plan has tasks that are too large or complex.\n\
GUIDANCE: Break down the current task into smaller, more focused steps.";

const TIMEOUT: &str = "⚠️ PREVIOUS ITERATION TIMED OUT\n\
The last iteration exceeded the time limit.\n\
GUIDANCE: Simplify the current task or break it into smaller pieces.";

pub const SUCCESS_ACK: &str = "✅ Previous iteration completed successfully.";
pub const NO_FEEDBACK: &str = "No feedback from previous iteration.";

/// Turn the previous iteration's outcome into guidance for the next prompt.
///
/// This is the only state that crosses iterations in-process.
pub fn build_feedback(result: &IterationResult) -> String {
    let mut parts: Vec<String> = Vec::new();

    if result.compaction_detected {
        parts.push(COMPACTION.to_string());
    }
    if result.max_turns_reached {
        parts.push(MAX_TURNS.to_string());
    }
    if result.timeout_occurred {
        parts.push(TIMEOUT.to_string());
    }

    let specific = result.compaction_detected || result.max_turns_reached || result.timeout_occurred;
    if let Some(error) = result.error.as_deref().filter(|e| !e.trim().is_empty()) {
        if !specific {
            let excerpt: String = error.chars().take(ERROR_EXCERPT).collect();
            parts.push(format!(
                "⚠️ PREVIOUS ITERATION ENCOUNTERED AN ERROR\nError: {}\nGUIDANCE: Address this error before proceeding.",
                excerpt
            ));
        }
    }

    if parts.is_empty() {
        if result.success {
            SUCCESS_ACK.to_string()
        } else {
            NO_FEEDBACK.to_string()
        }
    } else {
        parts.join("\n\n")
    }
}
