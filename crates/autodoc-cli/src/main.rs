mod cmd_configure;
mod cmd_generate;
mod cmd_info;

use std::path::PathBuf;

use autodoc_core::LogLevel;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "autodoc",
    version,
    about = "Generate Docusaurus documentation from a repository using AI"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate documentation for a repository
    Generate {
        /// Repository URL (falls back to TARGET_REPO_URL)
        #[arg(long)]
        repo_url: Option<String>,
        /// Directory to write the documentation site into (falls back to OUTPUT_DIR)
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Comma-separated output languages, e.g. "EN,VI"
        #[arg(long)]
        languages: Option<String>,
        /// GitHub personal access token for private repositories
        #[arg(long)]
        github_pat: Option<String>,
        /// Verbose logging
        #[arg(long)]
        debug: bool,
    },
    /// Write a .env template, or show the resolved configuration
    Configure {
        /// Print the resolved configuration with secrets masked
        #[arg(long)]
        show: bool,
        /// Overwrite an existing .env
        #[arg(long)]
        force: bool,
    },
    /// Fetch a repository and print what was detected
    Info {
        /// Repository URL or local path
        repo_url: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// `RUST_LOG` wins; otherwise the crates log at `level`.
fn init_tracing(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("autodoc={}", level.as_filter())));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();
    let cli = Cli::parse();
    let cwd = std::env::current_dir()?;

    match cli.cmd {
        Command::Generate {
            repo_url,
            output_dir,
            languages,
            github_pat,
            debug,
        } => {
            let overrides = autodoc_core::ConfigOverrides {
                repo_url,
                output_dir,
                languages,
                github_pat,
                debug,
            };
            let code = cmd_generate::execute(&overrides)?;
            std::process::exit(code);
        }
        Command::Configure { show, force } => {
            if show {
                cmd_configure::show()
            } else {
                cmd_configure::write_template(&cwd, force)
            }
        }
        Command::Info { repo_url, json } => {
            init_tracing(LogLevel::Warning);
            tokio::runtime::Runtime::new()?.block_on(cmd_info::execute(&repo_url, json))
        }
    }
}
