use std::sync::Mutex;
use std::time::Duration;

use autodoc_core::{AppConfig, RunStats};
use serde::Deserialize;
use tracing::{debug, info, warn};

// ── Config ──

fn all_events() -> Vec<String> {
    vec!["*".to_string()]
}

/// Notification channel configuration.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Channel {
    #[serde(rename = "sendgrid")]
    SendGrid {
        api_key: String,
        from_email: String,
        to_email: String,
        #[serde(default = "all_events")]
        events: Vec<String>,
    },
    #[serde(rename = "webhook")]
    Webhook {
        url: String,
        #[serde(default = "all_events")]
        events: Vec<String>,
    },
    #[serde(rename = "ntfy")]
    Ntfy {
        url: String,
        #[serde(default = "all_events")]
        events: Vec<String>,
    },
}

impl Channel {
    fn events(&self) -> &[String] {
        match self {
            Channel::SendGrid { events, .. } => events,
            Channel::Webhook { events, .. } => events,
            Channel::Ntfy { events, .. } => events,
        }
    }

    pub fn display_name(&self) -> String {
        match self {
            Channel::SendGrid { to_email, .. } => format!("sendgrid({to_email})"),
            Channel::Webhook { url, .. } => format!("webhook({url})"),
            Channel::Ntfy { url, .. } => format!("ntfy({url})"),
        }
    }

    fn matches(&self, event: &NotifyEvent) -> bool {
        let name = event.event_name();
        self.events().iter().any(|e| e == name || e == "*")
    }
}

/// Set of channels a run reports to.
#[derive(Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct NotifyConfig {
    pub channels: Vec<Channel>,
}

impl NotifyConfig {
    /// Channels implied by the application configuration. Email is only
    /// enabled when the full SendGrid triple is present.
    pub fn from_app_config(config: &AppConfig) -> Self {
        let mut channels = Vec::new();
        if let (Some(api_key), Some(from_email), Some(to_email)) = (
            &config.sendgrid_api_key,
            &config.sendgrid_from_email,
            &config.notification_email_to,
        ) {
            channels.push(Channel::SendGrid {
                api_key: api_key.clone(),
                from_email: from_email.clone(),
                to_email: to_email.clone(),
                events: all_events(),
            });
        }
        if let Some(url) = &config.notify_webhook_url {
            channels.push(Channel::Webhook {
                url: url.clone(),
                events: all_events(),
            });
        }
        if let Some(url) = &config.notify_ntfy_url {
            channels.push(Channel::Ntfy {
                url: url.clone(),
                events: all_events(),
            });
        }
        Self { channels }
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

// ── Notification Events ──

/// Terminal run outcome being reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyEvent {
    Success {
        repo: String,
        build_location: String,
        stats: RunStats,
    },
    Error {
        repo: String,
        message: String,
        stage: String,
    },
}

impl NotifyEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            NotifyEvent::Success { .. } => "success",
            NotifyEvent::Error { .. } => "error",
        }
    }

    pub fn repo(&self) -> &str {
        match self {
            NotifyEvent::Success { repo, .. } | NotifyEvent::Error { repo, .. } => repo,
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            NotifyEvent::Success {
                repo,
                build_location,
                stats,
            } => serde_json::json!({
                "repo": repo,
                "build_location": build_location,
                "stats": stats,
            }),
            NotifyEvent::Error {
                repo,
                message,
                stage,
            } => serde_json::json!({
                "repo": repo,
                "message": message,
                "stage": stage,
            }),
        }
    }
}

/// Short repository name for subjects: last URL segment without `.git`.
pub fn repo_display_name(repo: &str) -> &str {
    let trimmed = repo.trim_end_matches('/');
    let last = trimmed.rsplit(['/', ':']).next().unwrap_or(trimmed);
    let name = last.strip_suffix(".git").unwrap_or(last);
    if name.is_empty() {
        repo
    } else {
        name
    }
}

// ── Dispatch ──

const TIMEOUT: Duration = Duration::from_secs(5);
const SENDGRID_URL: &str = "https://api.sendgrid.com/v3/mail/send";

/// Send an event to every matching channel. Blocking.
/// Errors are logged but never propagated.
pub fn dispatch(config: &NotifyConfig, event: &NotifyEvent) {
    for channel in &config.channels {
        if !channel.matches(event) {
            continue;
        }
        let name = channel.display_name();
        match send(channel, event) {
            Ok(()) => info!(channel = %name, event = event.event_name(), "notification sent"),
            Err(e) => warn!(channel = %name, error = %e, "failed to send notification"),
        }
    }
}

fn agent() -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(TIMEOUT))
        .build()
        .new_agent()
}

fn send(channel: &Channel, event: &NotifyEvent) -> anyhow::Result<()> {
    match channel {
        Channel::SendGrid {
            api_key,
            from_email,
            to_email,
            ..
        } => send_email(api_key, from_email, to_email, event),
        Channel::Webhook { url, .. } => send_webhook(url, event),
        Channel::Ntfy { url, .. } => send_ntfy(url, event),
    }
}

// ── SendGrid email ──

fn send_email(
    api_key: &str,
    from_email: &str,
    to_email: &str,
    event: &NotifyEvent,
) -> anyhow::Result<()> {
    let (subject, html) = format_email(event);
    let body = serde_json::json!({
        "personalizations": [{ "to": [{ "email": to_email }] }],
        "from": { "email": from_email },
        "subject": subject,
        "content": [{ "type": "text/html", "value": html }],
    });
    agent()
        .post(SENDGRID_URL)
        .header("Authorization", &format!("Bearer {api_key}"))
        .header("Content-Type", "application/json")
        .send(body.to_string())?;
    Ok(())
}

fn format_email(event: &NotifyEvent) -> (String, String) {
    let name = repo_display_name(event.repo());
    match event {
        NotifyEvent::Success {
            repo,
            build_location,
            stats,
        } => (
            format!("AutoDoc AI: Documentation generated successfully for {name}"),
            format!(
                "<h2>Documentation Generation Successful</h2>\n\
                 <p>AutoDoc AI has generated documentation for repository: <strong>{}</strong></p>\n\
                 <h3>Statistics:</h3>\n\
                 <ul>\n\
                 <li>Files processed: {}</li>\n\
                 <li>Functions documented: {}</li>\n\
                 <li>Classes documented: {}</li>\n\
                 <li>Methods documented: {}</li>\n\
                 <li>Diagrams generated: {}</li>\n\
                 </ul>\n\
                 <p>Documentation is available at: {}</p>",
                escape_html(repo),
                stats.files_processed,
                stats.functions_documented,
                stats.classes_documented,
                stats.methods_documented,
                stats.diagrams_generated,
                escape_html(build_location),
            ),
        ),
        NotifyEvent::Error {
            repo,
            message,
            stage,
        } => (
            format!("AutoDoc AI: Error processing {name}"),
            format!(
                "<h2>Documentation Generation Failed</h2>\n\
                 <p>AutoDoc AI encountered an error while generating documentation for repository: <strong>{}</strong></p>\n\
                 <h3>Error Details:</h3>\n\
                 <p><strong>Stage:</strong> {}</p>\n\
                 <p><strong>Error Message:</strong></p>\n\
                 <pre>{}</pre>\n\
                 <p>Please check the logs for more details.</p>",
                escape_html(repo),
                escape_html(stage),
                escape_html(message),
            ),
        ),
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

// ── Webhook (generic JSON POST) ──

fn send_webhook(url: &str, event: &NotifyEvent) -> anyhow::Result<()> {
    let payload = format_webhook(event);
    agent()
        .post(url)
        .header("Content-Type", "application/json")
        .send(payload.to_string())?;
    Ok(())
}

fn format_webhook(event: &NotifyEvent) -> serde_json::Value {
    serde_json::json!({
        "event_type": event.event_name(),
        "data": event.to_json(),
    })
}

// ── ntfy ──

fn send_ntfy(url: &str, event: &NotifyEvent) -> anyhow::Result<()> {
    let (title, body, priority) = format_ntfy(event);
    agent()
        .post(url)
        .header("Title", &title)
        .header("Priority", &priority)
        .send(&body)?;
    Ok(())
}

fn format_ntfy(event: &NotifyEvent) -> (String, String, String) {
    let name = repo_display_name(event.repo());
    match event {
        NotifyEvent::Success {
            build_location,
            stats,
            ..
        } => (
            format!("Docs ready: {name}"),
            format!(
                "{} snippets from {} files, {} diagrams\n{build_location}",
                stats.snippets_total(),
                stats.files_processed,
                stats.diagrams_generated
            ),
            "default".to_string(),
        ),
        NotifyEvent::Error { message, stage, .. } => (
            format!("Docs failed: {name} ({stage})"),
            message.clone(),
            "high".to_string(),
        ),
    }
}

// ── Notifier ──

/// Run outcome reporting. Fire-and-forget: implementations never fail.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_success(&self, repo: &str, build_location: &str, stats: &RunStats);
    async fn notify_error(&self, repo: &str, message: &str, stage: &str);
}

/// Delivers to configured channels on the blocking pool.
pub struct NotifyService {
    config: NotifyConfig,
}

impl NotifyService {
    pub fn new(config: NotifyConfig) -> Self {
        if config.is_empty() {
            debug!("no notification channels configured");
        }
        Self { config }
    }

    async fn deliver(&self, event: NotifyEvent) {
        if self.config.is_empty() {
            debug!(event = event.event_name(), "skipping notification, no channels");
            return;
        }
        let config = self.config.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || dispatch(&config, &event)).await {
            warn!(error = %e, "notification task failed");
        }
    }
}

#[async_trait::async_trait]
impl Notifier for NotifyService {
    async fn notify_success(&self, repo: &str, build_location: &str, stats: &RunStats) {
        self.deliver(NotifyEvent::Success {
            repo: repo.to_string(),
            build_location: build_location.to_string(),
            stats: *stats,
        })
        .await;
    }

    async fn notify_error(&self, repo: &str, message: &str, stage: &str) {
        self.deliver(NotifyEvent::Error {
            repo: repo.to_string(),
            message: message.to_string(),
            stage: stage.to_string(),
        })
        .await;
    }
}

/// Discards everything.
pub struct NoopNotifier;

#[async_trait::async_trait]
impl Notifier for NoopNotifier {
    async fn notify_success(&self, _repo: &str, _build_location: &str, _stats: &RunStats) {}
    async fn notify_error(&self, _repo: &str, _message: &str, _stage: &str) {}
}

/// Collects events in memory (for testing).
#[derive(Default)]
pub struct CollectNotifier {
    events: Mutex<Vec<NotifyEvent>>,
}

impl CollectNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<NotifyEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn success_count(&self) -> usize {
        self.count("success")
    }

    pub fn error_count(&self) -> usize {
        self.count("error")
    }

    fn count(&self, name: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| e.event_name() == name)
            .count()
    }

    fn push(&self, event: NotifyEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

#[async_trait::async_trait]
impl Notifier for CollectNotifier {
    async fn notify_success(&self, repo: &str, build_location: &str, stats: &RunStats) {
        self.push(NotifyEvent::Success {
            repo: repo.to_string(),
            build_location: build_location.to_string(),
            stats: *stats,
        });
    }

    async fn notify_error(&self, repo: &str, message: &str, stage: &str) {
        self.push(NotifyEvent::Error {
            repo: repo.to_string(),
            message: message.to_string(),
            stage: stage.to_string(),
        });
    }
}

// ── Tests ──
