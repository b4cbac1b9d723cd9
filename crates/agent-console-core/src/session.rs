//! Session records owned by the directory collaborator.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Session identifier: an opaque string assigned by the directory.
pub type SessionId = String;

/// A named conversation bound to a working directory and model.
///
/// Created and mutated only by the directory; the engine holds at most a
/// read-only snapshot of the currently selected session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier.
    pub id: SessionId,
    /// Human-readable title.
    pub title: String,
    /// Directory the remote command session executes in.
    pub working_dir: PathBuf,
    /// Model name the session runs with.
    pub model: String,
    /// Creation timestamp (Unix epoch seconds).
    pub created_at: i64,
    /// Last activity timestamp.
    pub last_activity: i64,
}

/// Models a directory offers, with the one used when none is requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCatalog {
    pub default_model: String,
    pub available_models: Vec<String>,
}

impl ModelCatalog {
    /// Whether `name` is an offered model.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.available_models.iter().any(|m| m == name)
    }
}

/// Current Unix timestamp in seconds.
#[must_use]
pub fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_round_trips_through_json() {
        let session = Session {
            id: "abc123".to_string(),
            title: "Refactor the parser".to_string(),
            working_dir: PathBuf::from("/srv/projects/parser"),
            model: "glm-4.7".to_string(),
            created_at: now(),
            last_activity: now(),
        };
        let json = serde_json::to_string(&session).unwrap();
        let back: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(back, session);
    }

    #[test]
    fn catalog_lookup() {
        let catalog = ModelCatalog {
            default_model: "glm-4.7".to_string(),
            available_models: vec!["glm-4.7".to_string(), "qwen3-coder".to_string()],
        };
        assert!(catalog.contains("qwen3-coder"));
        assert!(!catalog.contains("gpt-1"));
    }
}
