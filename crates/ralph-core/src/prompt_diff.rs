/// Line-level change between two consecutive prompts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptChange {
    /// `-old` / `+new` lines, in prompt order
    pub lines: Vec<String>,
    /// Characters on lines kept from the previous prompt
    pub unchanged_chars: usize,
    /// New length minus old length, in characters
    pub char_delta: i64,
}

impl PromptChange {
    pub fn between(old: &str, new: &str) -> Self {
        let old_lines: Vec<&str> = old.lines().collect();
        let new_lines: Vec<&str> = new.lines().collect();
        let (n, m) = (old_lines.len(), new_lines.len());

        // lcs[i][j]: longest common subsequence of old[i..] and new[j..]
        let mut lcs = vec![vec![0usize; m + 1]; n + 1];
        for i in (0..n).rev() {
            for j in (0..m).rev() {
                lcs[i][j] = if old_lines[i] == new_lines[j] {
                    lcs[i + 1][j + 1] + 1
                } else {
                    lcs[i + 1][j].max(lcs[i][j + 1])
                };
            }
        }

        let mut lines = Vec::new();
        let mut unchanged_chars = 0;
        let (mut i, mut j) = (0, 0);
        while i < n && j < m {
            if old_lines[i] == new_lines[j] {
                // newline included
                unchanged_chars += old_lines[i].chars().count() + 1;
                i += 1;
                j += 1;
            } else if lcs[i + 1][j] >= lcs[i][j + 1] {
                lines.push(format!("-{}", old_lines[i]));
                i += 1;
            } else {
                lines.push(format!("+{}", new_lines[j]));
                j += 1;
            }
        }
        lines.extend(old_lines[i..].iter().map(|l| format!("-{}", l)));
        lines.extend(new_lines[j..].iter().map(|l| format!("+{}", l)));

        Self {
            lines,
            unchanged_chars,
            char_delta: new.chars().count() as i64 - old.chars().count() as i64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// `+12` / `-3`
    pub fn delta_label(&self) -> String {
        if self.char_delta >= 0 {
            format!("+{}", self.char_delta)
        } else {
            self.char_delta.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_prompts() {
        let change = PromptChange::between("a\nb\n", "a\nb\n");
        assert!(change.is_empty());
        assert_eq!(change.char_delta, 0);
        assert_eq!(change.delta_label(), "+0");
    }

    #[test]
    fn test_changed_iteration_line() {
        let old = "# Iteration 1\nTask: fix\n";
        let new = "# Iteration 2\nTask: fix\nFEEDBACK\n";
        let change = PromptChange::between(old, new);
        assert_eq!(
            change.lines,
            vec!["-# Iteration 1", "+# Iteration 2", "+FEEDBACK"]
        );
        assert_eq!(change.unchanged_chars, "Task: fix\n".len());
        assert_eq!(change.delta_label(), "+9");
    }

    #[test]
    fn test_removed_lines() {
        let change = PromptChange::between("keep\ndrop\n", "keep\n");
        assert_eq!(change.lines, vec!["-drop"]);
        assert_eq!(change.delta_label(), "-5");
    }
}
