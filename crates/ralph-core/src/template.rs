use std::path::{Path, PathBuf};
use thiserror::Error;

const FEEDBACK_RULE_WIDTH: usize = 60;

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Outer prompt file not found: {0}")]
    NotFound(PathBuf),

    #[error("Error reading outer prompt file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The outer prompt that wraps the operator's task.
///
/// Recognizes `{iteration_num}`, `{user_prompt}` and `{feedback}`. `{{` and
/// `}}` render as literal braces; any other `{...}` is left untouched.
/// Substitution is a single pass, so placeholders inside substituted text
/// are never expanded.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    text: String,
    source: Option<PathBuf>,
}

impl PromptTemplate {
    pub fn load(path: &Path) -> Result<Self, TemplateError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TemplateError::NotFound(path.to_path_buf())
            } else {
                TemplateError::Read {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })?;
        Ok(Self {
            text,
            source: Some(path.to_path_buf()),
        })
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: None,
        }
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// The prompt sent to the agent for one iteration.
    ///
    /// Feedback is only spliced in from the second iteration on.
    pub fn render(&self, iteration: usize, user_prompt: &str, feedback: Option<&str>) -> String {
        let feedback_section = match feedback {
            Some(feedback) if iteration > 1 && !feedback.is_empty() => {
                let rule = "=".repeat(FEEDBACK_RULE_WIDTH);
                format!(
                    "\n\n{rule}\nFEEDBACK FROM PREVIOUS ITERATION:\n{rule}\n{}\n{rule}\n",
                    feedback,
                    rule = rule
                )
            }
            _ => String::new(),
        };
        let iteration_num = iteration.to_string();

        let mut out = String::with_capacity(self.text.len() + user_prompt.len());
        let mut rest = self.text.as_str();
        while let Some(pos) = rest.find(|c: char| c == '{' || c == '}') {
            out.push_str(&rest[..pos]);
            rest = &rest[pos..];

            if rest.starts_with("{{") || rest.starts_with("}}") {
                out.push_str(&rest[..1]);
                rest = &rest[2..];
                continue;
            }

            let replacement = [
                ("{iteration_num}", iteration_num.as_str()),
                ("{user_prompt}", user_prompt),
                ("{feedback}", feedback_section.as_str()),
            ]
            .into_iter()
            .find(|(placeholder, _)| rest.starts_with(placeholder));

            match replacement {
                Some((placeholder, value)) => {
                    out.push_str(value);
                    rest = &rest[placeholder.len()..];
                }
                None => {
                    out.push_str(&rest[..1]);
                    rest = &rest[1..];
                }
            }
        }
        out.push_str(rest);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = "# Iteration {iteration_num}\n\nTask: {user_prompt}{feedback}\n";

    #[test]
    fn test_first_iteration_has_no_feedback() {
        let template = PromptTemplate::from_text(TEMPLATE);
        let prompt = template.render(1, "Fix the tests", Some("ignored"));
        assert_eq!(prompt, "# Iteration 1\n\nTask: Fix the tests\n");
    }

    #[test]
    fn test_feedback_block_from_second_iteration() {
        let template = PromptTemplate::from_text(TEMPLATE);
        let prompt = template.render(2, "Fix the tests", Some("✅ Previous iteration completed successfully."));
        assert!(prompt.starts_with("# Iteration 2\n"));
        assert!(prompt.contains("FEEDBACK FROM PREVIOUS ITERATION:"));
        assert!(prompt.contains(&"=".repeat(60)));
        assert!(prompt.contains("✅ Previous iteration completed successfully."));
    }

    #[test]
    fn test_substitution_is_not_recursive() {
        let template = PromptTemplate::from_text(TEMPLATE);
        let prompt = template.render(2, "literal {feedback} and {iteration_num}", None);
        assert!(prompt.contains("Task: literal {feedback} and {iteration_num}"));
    }

    #[test]
    fn test_escaped_and_unknown_braces() {
        let template = PromptTemplate::from_text("{{json}} {unknown} {iteration_num} }} {");
        assert_eq!(template.render(7, "", None), "{json} {unknown} 7 } {");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.md");
        assert!(matches!(
            PromptTemplate::load(&missing),
            Err(TemplateError::NotFound(path)) if path == missing
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outer.md");
        std::fs::write(&path, TEMPLATE).unwrap();

        let template = PromptTemplate::load(&path).unwrap();
        assert_eq!(template.source(), Some(path.as_path()));
        assert!(template.render(3, "x", None).starts_with("# Iteration 3"));
    }
}
