//! Bundled outer prompts and their installation under `~/.ralph/prompts/`.

use anyhow::{Context, Result};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_PROMPT: &str = "outer-prompt-default.md";
pub const CONCISE_PROMPT: &str = "outer-prompt-concise.md";

const BUNDLED: &[(&str, &str)] = &[
    (DEFAULT_PROMPT, include_str!("../prompts/outer-prompt-default.md")),
    (CONCISE_PROMPT, include_str!("../prompts/outer-prompt-concise.md")),
];

/// `~/.ralph/prompts`
pub fn user_prompts_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".ralph").join("prompts"))
}

/// Write the bundled prompts into `dir`.
///
/// An existing directory is left alone unless `force` is set.
/// Returns whether anything was written.
pub fn install_prompts_into(dir: &Path, force: bool) -> Result<bool> {
    if dir.exists() && !force {
        return Ok(false);
    }
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    for (name, text) in BUNDLED {
        let dest = dir.join(name);
        fs::write(&dest, text).with_context(|| format!("Failed to write {}", dest.display()))?;
    }
    Ok(true)
}

/// `ralph --init`: (re)install the bundled prompts for customization
pub fn handle_init() -> Result<()> {
    let dir = user_prompts_dir()?;
    install_prompts_into(&dir, true)?;
    eprintln!(
        "{} Initialized prompts to {}",
        "✓".bright_green(),
        dir.display()
    );
    eprintln!(
        "  Edit them, or point {} at your own template.",
        "--outer-prompt".bright_cyan()
    );
    Ok(())
}

/// Path of an installed prompt, installing the bundled set on first use
pub fn installed_prompt(name: &str) -> Result<PathBuf> {
    let dir = user_prompts_dir()?;
    if install_prompts_into(&dir, false)? {
        eprintln!(
            "{} Initialized prompts to {}",
            "✓".bright_green(),
            dir.display()
        );
    }

    let path = dir.join(name);
    if !path.exists() {
        anyhow::bail!(
            "Could not find {} at {}. Run 'ralph --init' to reinstall default prompts.",
            name,
            path.display()
        );
    }
    Ok(path)
}
