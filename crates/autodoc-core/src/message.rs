use serde::{Deserialize, Serialize};

/// Severity of an [`AgentMessage`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Info,
    Success,
    Warning,
    Error,
    Debug,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Info => "info",
            MessageType::Success => "success",
            MessageType::Warning => "warning",
            MessageType::Error => "error",
            MessageType::Debug => "debug",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the run's audit log. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentMessage {
    pub agent_name: String,
    pub message_type: MessageType,
    pub content: String,
    pub timestamp: String,
}

impl AgentMessage {
    pub fn new(agent_name: &str, message_type: MessageType, content: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.to_string(),
            message_type,
            content: content.into(),
            timestamp: crate::now_rfc3339(),
        }
    }
}

/// An error attributed to the stage (agent) that raised it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorEntry {
    pub agent: String,
    pub message: String,
}

impl ErrorEntry {
    pub fn new(agent: &str, message: impl Into<String>) -> Self {
        Self {
            agent: agent.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_serializes_snake_case() {
        let json = serde_json::to_string(&MessageType::Warning).unwrap();
        assert_eq!(json, "\"warning\"");
    }

    #[test]
    fn new_message_is_timestamped() {
        let m = AgentMessage::new("Summarizer", MessageType::Info, "started");
        assert_eq!(m.agent_name, "Summarizer");
        assert!(!m.timestamp.is_empty());
        assert!(m.timestamp.contains('T'));
    }
}
