//! Google Meet client for enabling recording artifacts on a meeting space.
//!
//! Everything here is best effort: failures are reported as an
//! [`ArtifactConfigOutcome`] and never abort the command.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::models::{AccessToken, ArtifactConfigOutcome};

/// Fields touched by the artifact patch; nothing else on the space changes.
pub const ARTIFACT_UPDATE_MASK: &str = "config.artifactConfig.recordingConfig.autoRecordingGeneration,\
config.artifactConfig.transcriptionConfig.autoTranscriptionGeneration,\
config.artifactConfig.smartNotesConfig.autoSmartNotesGeneration";

const PERMISSION_HINT: &str =
    "(likely missing permissions: check the Meet API scope and Google Workspace settings)";

/// Why artifact configuration did not happen.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArtifactError {
    #[error("the created event has no conference id")]
    MissingConferenceId,

    /// The space is not materialized yet; common right after creation
    #[error("Meet space not found (404): {0}")]
    SpaceNotFound(String),

    #[error("Meet API transport error: {0}")]
    Transport(String),

    #[error("Meet space response was missing its name: {0}")]
    Malformed(String),

    #[error("Meet space lookup failed ({status}): {conference_id}")]
    UnexpectedStatus { status: u16, conference_id: String },

    #[error("Meet auto-recording setup failed ({status}) for {space}: {body}{}", suffix(.hint))]
    PatchRejected {
        status: u16,
        space: String,
        body: String,
        hint: Option<&'static str>,
    },
}

impl ArtifactError {
    /// Build the failure for a rejected patch, adding the permission hint on 403.
    pub fn patch_rejected(status: StatusCode, space: &str, body: String) -> Self {
        Self::PatchRejected {
            status: status.as_u16(),
            space: space.to_string(),
            body,
            hint: (status == StatusCode::FORBIDDEN).then_some(PERMISSION_HINT),
        }
    }
}

fn suffix(hint: &Option<&'static str>) -> String {
    hint.map(|h| format!(" {}", h)).unwrap_or_default()
}

/// Meeting-space operations used to enable artifacts.
#[async_trait]
pub trait ArtifactConfigurator: Send + Sync {
    /// Resolve a short conference id (`abc-defg-hij`) to `spaces/{id}`.
    async fn resolve_space(
        &self,
        credential: &AccessToken,
        conference_id: &str,
    ) -> Result<String, ArtifactError>;

    /// Turn on auto recording, transcription and smart notes.
    async fn enable_artifacts(
        &self,
        credential: &AccessToken,
        space_name: &str,
    ) -> Result<(), ArtifactError>;
}

/// Run both steps and fold the result into one outcome.
pub async fn configure_artifacts(
    configurator: &dyn ArtifactConfigurator,
    credential: &AccessToken,
    conference_id: Option<&str>,
) -> ArtifactConfigOutcome {
    let result = async {
        let conference_id = conference_id.ok_or(ArtifactError::MissingConferenceId)?;
        let space = configurator.resolve_space(credential, conference_id).await?;
        configurator.enable_artifacts(credential, &space).await
    }
    .await;

    match result {
        Ok(()) => ArtifactConfigOutcome::configured(),
        Err(e) => {
            warn!("Auto-recording not configured: {}", e);
            ArtifactConfigOutcome::failed(e.to_string())
        }
    }
}

/// Request body enabling all three artifacts.
pub fn artifact_patch_body() -> Value {
    json!({
        "config": {
            "artifactConfig": {
                "recordingConfig": { "autoRecordingGeneration": "ON" },
                "transcriptionConfig": { "autoTranscriptionGeneration": "ON" },
                "smartNotesConfig": { "autoSmartNotesGeneration": "ON" }
            }
        }
    })
}

#[derive(Debug, Deserialize)]
struct Space {
    name: Option<String>,
}

/// Meet REST API v2 client.
pub struct GoogleMeetClient {
    http_client: Client,
    base_url: String,
}

impl GoogleMeetClient {
    pub fn new(http_client: Client, base_url: impl Into<String>) -> Self {
        Self {
            http_client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ArtifactConfigurator for GoogleMeetClient {
    async fn resolve_space(
        &self,
        credential: &AccessToken,
        conference_id: &str,
    ) -> Result<String, ArtifactError> {
        let url = format!("{}/spaces/{}", self.base_url, conference_id);
        debug!("[Meet API] GET {}", url);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&credential.token)
            .send()
            .await
            .map_err(|e| {
                error!("[Meet API] Exception during GET {}: {}", url, e);
                ArtifactError::Transport(e.to_string())
            })?;

        match response.status() {
            StatusCode::OK => {
                let space: Space = response.json().await.map_err(|e| {
                    warn!("[Meet API] Unparseable space for {}: {}", conference_id, e);
                    ArtifactError::Malformed(conference_id.to_string())
                })?;
                space.name.filter(|n| !n.is_empty()).ok_or_else(|| {
                    warn!("[Meet API] 'name' missing in space data for {}", conference_id);
                    ArtifactError::Malformed(conference_id.to_string())
                })
            }
            StatusCode::NOT_FOUND => {
                warn!("[Meet API] Space not found (404) for {}", conference_id);
                Err(ArtifactError::SpaceNotFound(conference_id.to_string()))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                error!(
                    "[Meet API] Error getting space for {}. Status: {}, Body: {}",
                    conference_id, status, body
                );
                Err(ArtifactError::UnexpectedStatus {
                    status: status.as_u16(),
                    conference_id: conference_id.to_string(),
                })
            }
        }
    }

    async fn enable_artifacts(
        &self,
        credential: &AccessToken,
        space_name: &str,
    ) -> Result<(), ArtifactError> {
        let url = format!("{}/{}", self.base_url, space_name);
        debug!("[Meet API] PATCH {}", url);

        let response = self
            .http_client
            .patch(&url)
            .bearer_auth(&credential.token)
            .query(&[("updateMask", ARTIFACT_UPDATE_MASK)])
            .json(&artifact_patch_body())
            .send()
            .await
            .map_err(|e| {
                error!("[Meet API] Exception during PATCH {}: {}", url, e);
                ArtifactError::Transport(e.to_string())
            })?;

        let status = response.status();
        if status.is_success() {
            debug!("[Meet API] Configured auto-recording for {}", space_name);
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        error!(
            "[Meet API] Error configuring auto-recording for {}. Status: {}, Body: {}",
            space_name, status, body
        );
        Err(ArtifactError::patch_rejected(status, space_name, body))
    }
}
