//! HTTP-backed session directory.
//!
//! Client for the directory REST surface a console server exposes next to
//! its WebSocket endpoint. Server rejections map onto [`DirectoryError`]:
//! 404 becomes `NotFound`, 400 becomes `Rejected` carrying the server's
//! detail string, anything else becomes `Internal`.

use async_trait::async_trait;
use serde::Deserialize;

use agent_console_core::{DirectoryError, ModelCatalog, NewSession, Session, SessionDirectory};

/// Wire shape of `GET /api/sessions`.
#[derive(Debug, Deserialize)]
struct SessionList {
    sessions: Vec<Session>,
}

/// Error body the server sends with 4xx responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: String,
}

/// [`SessionDirectory`] backed by a console server's REST API.
#[derive(Debug, Clone)]
pub struct HttpDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDirectory {
    /// Build a directory client for `base_url`, e.g. `http://127.0.0.1:8000`.
    /// Trailing slashes are stripped.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn request(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, DirectoryError> {
        req.send()
            .await
            .map_err(|e| DirectoryError::Internal(e.to_string()))
    }

    /// Probe the server's `/health` endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Internal`] when the server is unreachable
    /// or reports anything other than success.
    pub async fn health(&self) -> Result<(), DirectoryError> {
        let response = self.request(self.client.get(self.url("/health"))).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(DirectoryError::Internal(format!(
                "Health check failed: {}",
                response.status()
            )))
        }
    }

    /// Map a non-success response onto a directory error. `id` is the
    /// session id the request was about, when there was one.
    async fn fail(response: reqwest::Response, id: Option<&str>) -> DirectoryError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorBody>(&body).map_or(body, |e| e.detail);
        match (status, id) {
            (reqwest::StatusCode::NOT_FOUND, Some(id)) => DirectoryError::NotFound(id.to_string()),
            (reqwest::StatusCode::BAD_REQUEST, _) => DirectoryError::Rejected(detail),
            _ => DirectoryError::Internal(format!("{status}: {detail}")),
        }
    }
}

#[async_trait]
impl SessionDirectory for HttpDirectory {
    async fn list_sessions(&self) -> Result<Vec<Session>, DirectoryError> {
        let response = self
            .request(self.client.get(self.url("/api/sessions")))
            .await?;
        if !response.status().is_success() {
            return Err(Self::fail(response, None).await);
        }
        let list: SessionList = response
            .json()
            .await
            .map_err(|e| DirectoryError::Internal(e.to_string()))?;
        Ok(list.sessions)
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, DirectoryError> {
        let response = self
            .request(self.client.get(self.url(&format!("/api/sessions/{id}"))))
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::fail(response, Some(id)).await);
        }
        let session: Session = response
            .json()
            .await
            .map_err(|e| DirectoryError::Internal(e.to_string()))?;
        Ok(Some(session))
    }

    async fn create_session(&self, req: NewSession) -> Result<Session, DirectoryError> {
        let response = self
            .request(self.client.post(self.url("/api/sessions")).json(&req))
            .await?;
        if !response.status().is_success() {
            return Err(Self::fail(response, None).await);
        }
        response
            .json()
            .await
            .map_err(|e| DirectoryError::Internal(e.to_string()))
    }

    async fn delete_session(&self, id: &str) -> Result<(), DirectoryError> {
        let response = self
            .request(self.client.delete(self.url(&format!("/api/sessions/{id}"))))
            .await?;
        if !response.status().is_success() {
            return Err(Self::fail(response, Some(id)).await);
        }
        Ok(())
    }

    async fn models(&self) -> Result<ModelCatalog, DirectoryError> {
        let response = self
            .request(self.client.get(self.url("/api/models")))
            .await?;
        if !response.status().is_success() {
            return Err(Self::fail(response, None).await);
        }
        response
            .json()
            .await
            .map_err(|e| DirectoryError::Internal(e.to_string()))
    }
}
