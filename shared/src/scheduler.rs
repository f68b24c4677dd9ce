//! Meeting scheduling pipeline.
//!
//! parse → resolve owner → validate domain → resolve guests → load prefix →
//! acquire credential → create event → configure artifacts → respond.
//!
//! Any failure up to and including event creation ends the command with a
//! private reply. Guest lookups and artifact configuration only add warnings
//! to the public confirmation.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::CredentialProvider;
use crate::calendar::EventService;
use crate::identity;
use crate::meet::{configure_artifacts, ArtifactConfigurator};
use crate::models::{
    ArtifactConfigOutcome, CommandInvocation, MeetingRequest, NewEvent, Reply, ScheduledMeeting,
};
use crate::parser::{parse_meeting_command, USAGE};
use crate::slack::Directory;
use crate::store::PrefixStore;
use crate::{Config, Error, Result};

/// Settings the pipeline needs from [`Config`].
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Organization domain owners must belong to
    pub workspace_domain: String,
    /// Timezone used in the confirmation message
    pub display_timezone: Tz,
}

impl From<&Config> for SchedulerSettings {
    fn from(config: &Config) -> Self {
        Self {
            workspace_domain: config.workspace_domain.clone(),
            display_timezone: config.display_timezone,
        }
    }
}

/// Outcome of resolving the mentioned guests.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct GuestResolution {
    /// Deduplicated attendee emails
    pub attendee_emails: Vec<String>,
    /// Mentioned handles, owner excluded, in mention order
    pub displayed: Vec<String>,
    /// Handles with no resolvable email, in mention order
    pub unresolved: Vec<String>,
}

/// Orchestrates the `schedule-meeting` command.
pub struct Scheduler {
    settings: SchedulerSettings,
    directory: Arc<dyn Directory>,
    store: Arc<PrefixStore>,
    credentials: Arc<dyn CredentialProvider>,
    events: Arc<dyn EventService>,
    artifacts: Arc<dyn ArtifactConfigurator>,
}

impl Scheduler {
    pub fn new(
        settings: SchedulerSettings,
        directory: Arc<dyn Directory>,
        store: Arc<PrefixStore>,
        credentials: Arc<dyn CredentialProvider>,
        events: Arc<dyn EventService>,
        artifacts: Arc<dyn ArtifactConfigurator>,
    ) -> Self {
        Self {
            settings,
            directory,
            store,
            credentials,
            events,
            artifacts,
        }
    }

    /// Run the pipeline for one invocation and produce its single reply.
    pub async fn schedule_meeting(&self, invocation: &CommandInvocation, now: DateTime<Utc>) -> Reply {
        match self.run(invocation, now).await {
            Ok(text) => Reply::public(text),
            Err(e) => {
                warn!(
                    "Meeting command from {} in {} failed: {}",
                    invocation.user_id, invocation.channel_id, e
                );
                Reply::private(e.user_message())
            }
        }
    }

    async fn run(&self, invocation: &CommandInvocation, now: DateTime<Utc>) -> Result<String> {
        let request = parse_meeting_command(&invocation.text)?;
        info!(
            "Parsed meeting command: title='{}', duration={}, guests={}",
            request.title,
            request.duration_minutes,
            request.guest_handles.len()
        );

        let owner = identity::resolve(self.directory.as_ref(), &invocation.user_id).await;
        let owner_email = owner
            .email
            .ok_or_else(|| Error::IdentityUnresolved(owner.handle.clone()))?;

        self.validate_domain(&owner_email)?;

        let guests = self.resolve_guests(&invocation.user_id, &request.guest_handles).await;

        let prefix = self.store.get_prefix(&invocation.channel_id).await?;

        let start = now;
        let end = start
            .checked_add_signed(Duration::minutes(i64::from(request.duration_minutes)))
            .ok_or_else(|| Error::MalformedCommand(USAGE.to_string()))?;

        let credential = self.credentials.access_token(&owner_email).await?;

        let event = NewEvent {
            title: format!("{}{}", prefix, request.title),
            start,
            end,
            attendee_emails: guests.attendee_emails.clone(),
            request_id: format!("{}-{}", invocation.user_id, start.timestamp_millis()),
        };
        let meeting = self.events.create_event(&credential, &event).await?;

        let artifacts = configure_artifacts(
            self.artifacts.as_ref(),
            &credential,
            meeting.conference_id.as_deref(),
        )
        .await;

        Ok(self.render_confirmation(&request, &event, invocation, &guests, &meeting, &artifacts))
    }

    fn validate_domain(&self, email: &str) -> Result<()> {
        let rejected = || Error::DomainRejected {
            email: email.to_string(),
            domain: self.settings.workspace_domain.clone(),
        };

        let (_, domain) = email.rsplit_once('@').ok_or_else(|| {
            warn!("Could not parse domain from email: {}", email);
            rejected()
        })?;

        if !domain.eq_ignore_ascii_case(&self.settings.workspace_domain) {
            info!(
                "{} is not in allowed domain {}",
                email, self.settings.workspace_domain
            );
            return Err(rejected());
        }
        Ok(())
    }

    async fn resolve_guests(&self, owner_handle: &str, handles: &[String]) -> GuestResolution {
        let mut resolution = GuestResolution::default();

        for handle in handles {
            if handle == owner_handle || resolution.displayed.contains(handle) {
                continue;
            }
            resolution.displayed.push(handle.clone());

            match identity::resolve(self.directory.as_ref(), handle).await.email {
                Some(email) => {
                    if !resolution.attendee_emails.contains(&email) {
                        resolution.attendee_emails.push(email);
                    }
                }
                None => {
                    warn!("Could not find email for mentioned user: {}", handle);
                    resolution.unresolved.push(handle.clone());
                }
            }
        }

        resolution
    }

    fn render_confirmation(
        &self,
        request: &MeetingRequest,
        event: &NewEvent,
        invocation: &CommandInvocation,
        guests: &GuestResolution,
        meeting: &ScheduledMeeting,
        artifacts: &ArtifactConfigOutcome,
    ) -> String {
        let guest_list = if guests.displayed.is_empty() {
            "none".to_string()
        } else {
            mentions(&guests.displayed)
        };

        let mut message = format!(
            "✅ Created a Google Calendar event\n\
             *{}*\n\
             When: {}\n\
             Owner: <@{}>\n\
             Guests: {}\n\
             Google Meet: {}\n\
             View in Calendar: {}",
            event.title,
            self.format_window(event.start, event.end),
            invocation.user_id,
            guest_list,
            meeting.meeting_url.as_deref().unwrap_or("unavailable"),
            meeting.event_url.as_deref().unwrap_or("unavailable"),
        );

        if let Some(detail) = artifacts.error_detail.as_deref().filter(|_| !artifacts.configured) {
            message.push_str(&format!("\nAuto-recording: ⚠️ setup failed ({})", detail));
        }

        if !guests.unresolved.is_empty() {
            message.push_str(&format!(
                "\n\n⚠️ Note: no email address was found for these guests, so they were not invited: {}",
                mentions(&guests.unresolved)
            ));
        }

        info!(
            "Scheduled '{}' ({} min) for {}",
            request.title, request.duration_minutes, invocation.user_id
        );
        message
    }

    fn format_window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
        let tz = self.settings.display_timezone;
        let start = start.with_timezone(&tz);
        let end = end.with_timezone(&tz);

        let end_format = if start.date_naive() == end.date_naive() {
            "%H:%M"
        } else {
            "%Y-%m-%d %H:%M"
        };
        format!(
            "{} – {}",
            start.format("%Y-%m-%d %H:%M"),
            end.format(end_format)
        )
    }
}

fn mentions(handles: &[String]) -> String {
    handles
        .iter()
        .map(|h| format!("<@{}>", h))
        .collect::<Vec<_>>()
        .join(", ")
}
