use anyhow::{Context, Result};
use autodoc_conductor::collab::acquire::{GitAcquirer, RepositoryAcquirer};
use autodoc_core::{AppConfig, ConfigOverrides};

/// Execute `autodoc info <repo-url>`
pub async fn execute(repo_url: &str, json: bool) -> Result<()> {
    let config = AppConfig::from_env(&ConfigOverrides::default())?;
    let workdir = tempfile::tempdir().context("creating scratch directory")?;
    let acquirer = GitAcquirer::with_bin(config.git_executable_path.clone().into());
    let repo = acquirer
        .acquire(repo_url, config.github_pat.as_deref(), workdir.path())
        .await
        .with_context(|| format!("fetching {repo_url}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&repo)?);
        return Ok(());
    }
    println!("Repository:  {}", repo.name);
    println!("URL:         {}", repo.url);
    println!("Branch:      {}", repo.default_branch);
    let languages = if repo.languages.is_empty() {
        "(none detected)".to_string()
    } else {
        repo.languages.join(", ")
    };
    println!("Languages:   {languages}");
    println!("Private:     {}", if repo.is_private { "yes" } else { "no" });
    if let Some(desc) = &repo.description {
        println!("\n{desc}");
    }
    Ok(())
}
