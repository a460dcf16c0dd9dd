use serde::{Deserialize, Serialize};
use std::fmt;

/// A notification pushed on the per-user notification channel.
///
/// Wire form: `{"id", "title", "body", "severity", "createdAt"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationMessage {
    pub id: NotificationId,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub severity: Severity,
    /// Creation timestamp exactly as sent by the server
    pub created_at: String,
}

/// Notification identifier; servers send either a number or a string
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NotificationId {
    Number(i64),
    Text(String),
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationId::Number(n) => write!(f, "{}", n),
            NotificationId::Text(s) => f.write_str(s),
        }
    }
}

/// Notification severity. Unknown values are kept as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    #[default]
    Info,
    Success,
    Warning,
    Error,
    Other,
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.to_ascii_uppercase().as_str() {
            "INFO" => Severity::Info,
            "SUCCESS" => Severity::Success,
            "WARNING" | "WARN" => Severity::Warning,
            "ERROR" => Severity::Error,
            _ => Severity::Other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_notification() {
        let raw = r#"{"id":17,"title":"Report ready","body":"Q3 export finished","severity":"WARNING","createdAt":"2024-05-01T10:15:00"}"#;
        let msg: NotificationMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.id, NotificationId::Number(17));
        assert_eq!(msg.severity, Severity::Warning);
        assert_eq!(msg.created_at, "2024-05-01T10:15:00");
    }

    #[test]
    fn test_string_id_and_unknown_severity() {
        let raw = r#"{"id":"a-1","title":"t","severity":"critical","createdAt":"x"}"#;
        let msg: NotificationMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.id.to_string(), "a-1");
        assert_eq!(msg.severity, Severity::Other);
        assert_eq!(msg.body, "");
    }

    #[test]
    fn test_missing_required_field_fails() {
        let raw = r#"{"id":1,"body":"no title","createdAt":"x"}"#;
        assert!(serde_json::from_str::<NotificationMessage>(raw).is_err());
    }
}
