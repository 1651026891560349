use anyhow::{Context, Result};
use autodoc_conductor::{ProgressObserver, ProgressUpdate, RunDriver, RunOutcome};
use autodoc_core::{AppConfig, ConfigOverrides, MessageType, RunStats, WorkflowState};
use tracing::warn;

/// Prints one line per finished stage.
struct ConsoleProgress;

#[async_trait::async_trait]
impl ProgressObserver for ConsoleProgress {
    async fn on_progress(&self, update: &ProgressUpdate, state: &WorkflowState) -> Result<()> {
        let agent = update.stage.agent_name();
        let failed = state
            .errors
            .iter()
            .any(|e| e.agent == agent);
        let warnings = state
            .messages
            .iter()
            .filter(|m| m.agent_name == agent && m.message_type == MessageType::Warning)
            .count();
        let mark = if failed {
            "✗"
        } else if warnings > 0 {
            "!"
        } else {
            "✓"
        };
        let suffix = match warnings {
            0 => String::new(),
            1 => " (1 warning)".to_string(),
            n => format!(" ({n} warnings)"),
        };
        println!("  {mark} [{}/{}] {}{suffix}", update.index, update.total, update.label);
        Ok(())
    }
}

fn print_stats(stats: &RunStats) {
    println!("\nStatistics:");
    println!("  Files processed:       {}", stats.files_processed);
    println!("  Modules documented:    {}", stats.modules_documented);
    println!("  Functions documented:  {}", stats.functions_documented);
    println!("  Classes documented:    {}", stats.classes_documented);
    println!("  Methods documented:    {}", stats.methods_documented);
    println!("  Diagrams generated:    {}", stats.diagrams_generated);
}

/// Process exit code for a finished run: 0 iff the site was built.
fn exit_code(outcome: &RunOutcome) -> i32 {
    if outcome.is_success() {
        0
    } else {
        1
    }
}

/// Execute `autodoc generate`. Returns the process exit code.
pub fn execute(overrides: &ConfigOverrides) -> Result<i32> {
    let mut config = AppConfig::from_env(overrides)?;
    let warnings = match config.validate() {
        Ok(w) => w,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("Run `autodoc configure` to create a .env template.");
            return Ok(1);
        }
    };
    crate::init_tracing(config.log_level);
    for w in &warnings {
        warn!("{w}");
    }

    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("creating {}", config.output_dir.display()))?;
    config.output_dir = config.output_dir.canonicalize()?;

    let langs: Vec<&str> = config.output_languages.iter().map(|l| l.as_str()).collect();
    println!("Generating documentation for {}", config.target_repo_url);
    println!("  Output:    {}", config.output_dir.display());
    println!("  Languages: {}\n", langs.join(", "));

    let driver = RunDriver::production(&config)?;
    let runtime = tokio::runtime::Runtime::new()?;
    let report = runtime.block_on(driver.run(
        &config.target_repo_url,
        &config.output_dir,
        Some(&ConsoleProgress),
    ))?;

    match &report.outcome {
        RunOutcome::Success { build_location, stats } => {
            println!("\n✅ Documentation generated successfully in {}", config.output_dir.display());
            println!("   Documentation available at: {build_location}");
            if stats.snippets_total() > 0 || stats.diagrams_generated > 0 {
                print_stats(stats);
            }
        }
        RunOutcome::Failure { message, stage } => {
            eprintln!("\n❌ Documentation generation failed (last stage: {stage})");
            for line in message.lines() {
                eprintln!("  - {line}");
            }
            eprintln!(
                "\nRun log: {}",
                autodoc_store::events_path(&config.output_dir).display()
            );
        }
    }
    Ok(exit_code(&report.outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use autodoc_core::{ErrorEntry, WorkflowState};

    #[test]
    fn exit_code_follows_outcome() {
        let mut state = WorkflowState::new("https://example.com/r.git", "/tmp/out");
        state.errors.push(ErrorEntry::new("SiteBuilder", "Failed to build documentation site"));
        assert_eq!(exit_code(&RunOutcome::from_state(&state)), 1);

        let fatal = WorkflowState::fallback("https://example.com/r.git", "/tmp/out", "progress aborted");
        assert_eq!(exit_code(&RunOutcome::from_state(&fatal)), 1);

        state.build_location = Some(String::new());
        assert_eq!(exit_code(&RunOutcome::from_state(&state)), 1);

        state.build_location = Some("/tmp/out/build".into());
        assert_eq!(exit_code(&RunOutcome::from_state(&state)), 0);
    }
}
