//! Resolution of chat users to email addresses.

use tracing::{debug, error, warn};

use crate::models::ResolvedIdentity;
use crate::slack::Directory;

/// Resolve a user handle to an email address with a single directory call.
///
/// A profile without an email and a failed lookup both resolve to `None`;
/// only the logs tell them apart.
pub async fn resolve(directory: &dyn Directory, handle: &str) -> ResolvedIdentity {
    let email = match directory.user(handle).await {
        Ok(user) => match user.profile.email.filter(|e| !e.trim().is_empty()) {
            Some(email) => {
                debug!("Fetched email for user {}: {}", handle, email);
                Some(email)
            }
            None => {
                warn!("User {} has no email on their profile", handle);
                None
            }
        },
        Err(e) => {
            error!("Error fetching email for user {}: {}", handle, e);
            None
        }
    };

    ResolvedIdentity {
        handle: handle.to_string(),
        email,
    }
}
