//! Projects and project API keys
//!
//! Project management uses the user session. [`ApiClient::use_project`]
//! selects the project whose key authenticates every project-scoped call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use urlencoding::encode;

use crate::api::timestamp;
use crate::error::Result;
use crate::http::{ApiClient, ApiRequest};
use crate::session::{id_string, ProjectContext};

/// A project (tenant) the user belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Metadata of an issued API key. The secret itself is only returned once,
/// at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKeyInfo {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Leading characters of the key, for display.
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default, deserialize_with = "timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp")]
    pub last_used_at: Option<DateTime<Utc>>,
}

fn default_active() -> bool {
    true
}

/// Response of key creation; `key` is the plaintext secret.
#[derive(Clone, PartialEq, Deserialize)]
pub struct CreatedApiKey {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(alias = "api_key")]
    pub key: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl std::fmt::Debug for CreatedApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreatedApiKey")
            .field("id", &self.id)
            .field("key", &"<redacted>")
            .field("name", &self.name)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct NewProject<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct NewApiKey<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

fn project_path(project_id: &str) -> String {
    format!("/projects/{}", encode(project_id))
}

fn keys_path(project_id: &str) -> String {
    format!("{}/api-keys", project_path(project_id))
}

impl ApiClient {
    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        self.require_session()?;
        self.get_json("/projects").await
    }

    pub async fn get_project(&self, project_id: &str) -> Result<Project> {
        self.require_session()?;
        self.get_json(&project_path(project_id)).await
    }

    pub async fn create_project(&self, name: &str, description: Option<&str>) -> Result<Project> {
        self.require_session()?;
        let project: Project = self
            .post_json("/projects", &NewProject { name, description })
            .await?;
        tracing::info!(project_id = %project.id, "Project created");
        Ok(project)
    }

    /// Deletes a project. If it is the active project, the selection is
    /// cleared too.
    pub async fn delete_project(&self, project_id: &str) -> Result<()> {
        self.require_session()?;
        self.send_empty(ApiRequest::delete(project_path(project_id)))
            .await?;
        let was_active = self
            .session()
            .project()
            .map_or(false, |p| p.project_id == project_id);
        if was_active {
            self.session().clear_project()?;
        }
        Ok(())
    }

    pub async fn list_api_keys(&self, project_id: &str) -> Result<Vec<ApiKeyInfo>> {
        self.require_session()?;
        self.get_json(&keys_path(project_id)).await
    }

    pub async fn create_api_key(
        &self,
        project_id: &str,
        name: Option<&str>,
    ) -> Result<CreatedApiKey> {
        self.require_session()?;
        self.post_json(&keys_path(project_id), &NewApiKey { name })
            .await
    }

    pub async fn revoke_api_key(&self, project_id: &str, key_id: &str) -> Result<()> {
        self.require_session()?;
        let path = format!("{}/{}", keys_path(project_id), encode(key_id));
        self.send_empty(ApiRequest::delete(path)).await
    }

    /// Makes `project_id` the active project, authenticated with `api_key`.
    ///
    /// The project name is looked up when a session exists; the selection is
    /// persisted either way.
    pub async fn use_project(&self, project_id: &str, api_key: Option<String>) -> Result<()> {
        let mut context = ProjectContext::new(project_id, api_key);
        if self.session().is_authenticated() {
            match self.get_project(project_id).await {
                Ok(project) => context.name = Some(project.name),
                Err(e) => tracing::debug!("Could not look up project name: {}", e),
            }
        }
        self.session().set_project(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_info_defaults() {
        let info: ApiKeyInfo = serde_json::from_str(r#"{"id": 3, "prefix": "bk_12"}"#).unwrap();
        assert_eq!(info.id, "3");
        assert!(info.is_active);
        assert!(info.created_at.is_none());
    }

    #[test]
    fn test_created_key_accepts_api_key_alias_and_redacts() {
        let created: CreatedApiKey =
            serde_json::from_str(r#"{"id":"k1","api_key":"bk_secret"}"#).unwrap();
        assert_eq!(created.key, "bk_secret");
        assert!(!format!("{:?}", created).contains("bk_secret"));
    }

    #[test]
    fn test_key_paths_escape_ids() {
        assert_eq!(keys_path("p 1"), "/projects/p%201/api-keys");
    }
}
