use std::path::Path;

use anyhow::{bail, Result};
use autodoc_core::{AppConfig, ConfigOverrides};

const ENV_TEMPLATE: &str = "\
# Repository to document and where to write the site
TARGET_REPO_URL=
OUTPUT_DIR=./docs-output

# OpenRouter (completions and embeddings)
OPENROUTER_API_KEY=
OPENROUTER_BASE_URL=https://openrouter.ai/api/v1

# Vector index
QDRANT_URL=http://localhost:6333

# Private repositories
GITHUB_PAT=

# Comma-separated: EN, VI
OUTPUT_LANGUAGES=EN,VI
LOG_LEVEL=INFO

# Models
EMBEDDING_MODEL_NAME=openai/text-embedding-3-small
SUMMARIZER_MODEL_NAME=anthropic/claude-3-haiku
TRANSLATION_MODEL_NAME=google/gemini-pro
RAG_MODEL_NAME=anthropic/claude-3-haiku

# Notifications (all optional; email needs all three SendGrid values)
SENDGRID_API_KEY=
SENDGRID_FROM_EMAIL=
NOTIFICATION_EMAIL_TO=
NOTIFY_WEBHOOK_URL=
NOTIFY_NTFY_URL=

# Tools and batching
GIT_EXECUTABLE_PATH=git
NPM_EXECUTABLE_PATH=npm
SUMMARY_BATCH_SIZE=10
TRANSLATION_BATCH_SIZE=5
";

/// Execute `autodoc configure`
pub fn write_template(cwd: &Path, force: bool) -> Result<()> {
    let path = cwd.join(".env");
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    std::fs::write(&path, ENV_TEMPLATE)?;
    println!("Wrote {}", path.display());
    println!("Fill in OPENROUTER_API_KEY and TARGET_REPO_URL, then run `autodoc generate`.");
    Ok(())
}

/// Execute `autodoc configure --show`
pub fn show() -> Result<()> {
    let config = AppConfig::from_env(&ConfigOverrides::default())?;
    let entries = config.display_entries();
    let width = entries
        .iter()
        .map(|(k, _)| k.len())
        .max()
        .unwrap_or(0);
    for (key, value) in entries {
        let value = if value.is_empty() { "(not set)".to_string() } else { value };
        println!("{key:<width$}  {value}");
    }
    let mut check = config.clone();
    match check.validate() {
        Ok(warnings) => {
            for w in warnings {
                println!("\nwarning: {w}");
            }
        }
        Err(e) => println!("\n{e}"),
    }
    Ok(())
}
