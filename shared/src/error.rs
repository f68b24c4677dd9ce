//! Error types for the meeting scheduler.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while handling a chat command.
///
/// Every variant is reported privately to the invoking user. Non-fatal
/// conditions (unresolved guests, artifact configuration) never become an
/// `Error`; they are folded into the public success message instead.
#[derive(Error, Debug)]
pub enum Error {
    /// Command text matched neither accepted grammar. Carries a usage hint.
    #[error("Malformed command: {0}")]
    MalformedCommand(String),

    /// Caller may not change the channel prefix
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Prefix store lock timed out or the filesystem refused access
    #[error("Prefix store unavailable: {0}")]
    StoreUnavailable(String),

    /// No email address could be resolved for a chat user
    #[error("Could not resolve an email address for user {0}")]
    IdentityUnresolved(String),

    /// Owner's email domain is not the organization's domain
    #[error("Email {email} is outside the allowed domain {domain}")]
    DomainRejected { email: String, domain: String },

    /// Calendar event creation failed upstream
    #[error("Calendar event creation failed: {0}")]
    EventCreationFailed(String),

    /// Credential issuer refused or could not mint a token
    #[error("Credential error: {0}")]
    Credential(String),

    /// Slack Web API error
    #[error("Slack API error: {0}")]
    Slack(String),

    /// AWS SDK error
    #[error("AWS error: {0}")]
    Aws(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Text of the private reply sent back to the invoking user.
    pub fn user_message(&self) -> String {
        match self {
            Error::MalformedCommand(hint) => hint.clone(),
            Error::PermissionDenied(msg) => msg.clone(),
            Error::StoreUnavailable(cause) => {
                format!("Could not access the meeting prefix setting: {}", cause)
            }
            Error::IdentityUnresolved(user_id) => format!(
                "Could not get an email address for <@{}> from their Slack profile.",
                user_id
            ),
            Error::DomainRejected { domain, .. } => {
                format!("This command is only available to users in the {} domain.", domain)
            }
            Error::EventCreationFailed(detail) => format!(
                "An error occurred while creating the Google Calendar event: {}",
                detail
            ),
            Error::Credential(detail) => {
                format!("Google API authentication failed: {}", detail)
            }
            other => format!("An unexpected error occurred: {}", other),
        }
    }
}
