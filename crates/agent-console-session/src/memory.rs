//! In-memory session directory.

use std::{collections::HashMap, path::PathBuf, sync::RwLock};

use agent_console_core::{
    session::{ModelCatalog, Session, SessionId, now},
    traits::{DirectoryError, NewSession, SessionDirectory},
};
use async_trait::async_trait;
use uuid::Uuid;

/// Validation rules and model catalog for a directory.
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    /// Working directories sessions may be created in; `None` allows any.
    pub allowed_working_dirs: Option<Vec<PathBuf>>,
    /// Models offered, with the default used when none is requested.
    pub catalog: ModelCatalog,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            allowed_working_dirs: None,
            catalog: ModelCatalog {
                default_model: "glm-4.7".to_string(),
                available_models: vec![
                    "glm-4.7".to_string(),
                    "glm-4.6".to_string(),
                    "qwen3-coder-plus".to_string(),
                    "qwen3-max".to_string(),
                    "kimi-k2".to_string(),
                    "deepseek-v3.2".to_string(),
                ],
            },
        }
    }
}

/// In-memory directory implementation.
///
/// Useful for development and single-process deployments.
/// Records are lost on restart.
pub struct MemoryDirectory {
    config: DirectoryConfig,
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl MemoryDirectory {
    /// Create an empty directory with default validation rules.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DirectoryConfig::default())
    }

    /// Create an empty directory with explicit validation rules.
    #[must_use]
    pub fn with_config(config: DirectoryConfig) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Record activity on a session, refreshing its `last_activity` stamp.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown id.
    pub fn touch(&self, id: &str) -> Result<(), DirectoryError> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|e| DirectoryError::Internal(e.to_string()))?;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| DirectoryError::NotFound(id.to_string()))?;
        session.last_activity = now();
        Ok(())
    }

    fn validate(&self, req: &NewSession) -> Result<String, DirectoryError> {
        if req.title.trim().is_empty() {
            return Err(DirectoryError::Rejected("title must not be empty".to_string()));
        }
        if let Some(allowed) = &self.config.allowed_working_dirs {
            if !allowed.iter().any(|dir| dir == &req.working_dir) {
                return Err(DirectoryError::Rejected(format!(
                    "working directory not allowed: {}",
                    req.working_dir.display()
                )));
            }
        }
        match &req.model {
            Some(model) if !self.config.catalog.contains(model) => Err(DirectoryError::Rejected(
                format!("unknown model: {model}"),
            )),
            Some(model) => Ok(model.clone()),
            None => Ok(self.config.catalog.default_model.clone()),
        }
    }
}

impl Default for MemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionDirectory for MemoryDirectory {
    async fn list_sessions(&self) -> Result<Vec<Session>, DirectoryError> {
        let sessions = self
            .sessions
            .read()
            .map_err(|e| DirectoryError::Internal(e.to_string()))?;

        let mut result: Vec<Session> = sessions.values().cloned().collect();
        // Newest first
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, DirectoryError> {
        Ok(self
            .sessions
            .read()
            .map_err(|e| DirectoryError::Internal(e.to_string()))?
            .get(id)
            .cloned())
    }

    async fn create_session(&self, req: NewSession) -> Result<Session, DirectoryError> {
        let model = self.validate(&req)?;
        let timestamp = now();

        let session = Session {
            id: Uuid::new_v4().to_string(),
            title: req.title,
            working_dir: req.working_dir,
            model,
            created_at: timestamp,
            last_activity: timestamp,
        };

        self.sessions
            .write()
            .map_err(|e| DirectoryError::Internal(e.to_string()))?
            .insert(session.id.clone(), session.clone());

        tracing::info!(session_id = %session.id, title = %session.title, "session created");
        Ok(session)
    }

    async fn delete_session(&self, id: &str) -> Result<(), DirectoryError> {
        let removed = self
            .sessions
            .write()
            .map_err(|e| DirectoryError::Internal(e.to_string()))?
            .remove(id);

        match removed {
            Some(_) => {
                tracing::info!(session_id = %id, "session deleted");
                Ok(())
            }
            None => Err(DirectoryError::NotFound(id.to_string())),
        }
    }

    async fn models(&self) -> Result<ModelCatalog, DirectoryError> {
        Ok(self.config.catalog.clone())
    }
}
