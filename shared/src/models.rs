//! Shared data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured meeting request produced by the command parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeetingRequest {
    pub title: String,
    pub duration_minutes: u32,
    /// Mentioned user ids, in mention order
    pub guest_handles: Vec<String>,
}

/// Result of resolving a chat handle to an email address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub handle: String,
    pub email: Option<String>,
}

/// Prefix configured for a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPrefix {
    pub channel_id: String,
    pub prefix: String,
}

/// Calendar event to create on the owner's primary calendar.
#[derive(Debug, Clone)]
pub struct NewEvent {
    /// Title with the channel prefix already applied
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub attendee_emails: Vec<String>,
    /// Idempotency token for conference creation
    pub request_id: String,
}

/// What the calendar returned for a created event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduledMeeting {
    pub event_url: Option<String>,
    pub meeting_url: Option<String>,
    pub conference_id: Option<String>,
}

/// Outcome of enabling recording artifacts. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactConfigOutcome {
    pub configured: bool,
    pub error_detail: Option<String>,
}

impl ArtifactConfigOutcome {
    pub fn configured() -> Self {
        Self {
            configured: true,
            error_detail: None,
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            configured: false,
            error_detail: Some(detail.into()),
        }
    }
}

/// Bearer token issued for a delegated user.
#[derive(Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Whether the token is still usable at `now`, with a safety margin.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - chrono::Duration::seconds(60) > now
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// A slash command delivered by the chat platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandInvocation {
    pub command: String,
    pub channel_id: String,
    pub user_id: String,
    pub text: String,
}

/// Who sees a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Only the invoking user
    Ephemeral,
    /// Everyone in the channel
    InChannel,
}

/// Reply to a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    #[serde(rename = "response_type")]
    pub visibility: Visibility,
    pub text: String,
}

impl Reply {
    pub fn private(text: impl Into<String>) -> Self {
        Self {
            visibility: Visibility::Ephemeral,
            text: text.into(),
        }
    }

    pub fn public(text: impl Into<String>) -> Self {
        Self {
            visibility: Visibility::InChannel,
            text: text.into(),
        }
    }
}
