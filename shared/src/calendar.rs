//! Google Calendar client for creating meetings with a Meet conference.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::models::{AccessToken, NewEvent, ScheduledMeeting};
use crate::{Error, Result};

/// Creates calendar events on the owner's behalf.
#[async_trait]
pub trait EventService: Send + Sync {
    /// Create an event together with its video conference.
    async fn create_event(&self, credential: &AccessToken, event: &NewEvent) -> Result<ScheduledMeeting>;
}

/// Subset of the Calendar API event resource we read back.
#[derive(Debug, Deserialize)]
struct CreatedEvent {
    #[serde(rename = "htmlLink")]
    html_link: Option<String>,
    #[serde(rename = "hangoutLink")]
    hangout_link: Option<String>,
    #[serde(rename = "conferenceData")]
    conference_data: Option<ConferenceData>,
}

#[derive(Debug, Deserialize)]
struct ConferenceData {
    #[serde(rename = "conferenceId")]
    conference_id: Option<String>,
}

impl From<CreatedEvent> for ScheduledMeeting {
    fn from(event: CreatedEvent) -> Self {
        Self {
            event_url: event.html_link,
            meeting_url: event.hangout_link,
            conference_id: event.conference_data.and_then(|c| c.conference_id),
        }
    }
}

/// Build the `events.insert` request body.
pub fn event_body(event: &NewEvent) -> Value {
    json!({
        "summary": event.title,
        "description": "",
        "start": { "dateTime": event.start.to_rfc3339(), "timeZone": "UTC" },
        "end": { "dateTime": event.end.to_rfc3339(), "timeZone": "UTC" },
        "attendees": event
            .attendee_emails
            .iter()
            .map(|email| json!({ "email": email }))
            .collect::<Vec<_>>(),
        "conferenceData": {
            "createRequest": {
                "requestId": event.request_id,
                "conferenceSolutionKey": { "type": "hangoutsMeet" }
            }
        },
        "reminders": { "useDefault": true }
    })
}

/// Calendar API v3 client.
pub struct GoogleCalendarClient {
    http_client: Client,
    base_url: String,
}

impl GoogleCalendarClient {
    pub fn new(http_client: Client, base_url: impl Into<String>) -> Self {
        Self {
            http_client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl EventService for GoogleCalendarClient {
    async fn create_event(&self, credential: &AccessToken, event: &NewEvent) -> Result<ScheduledMeeting> {
        let url = format!("{}/calendars/primary/events", self.base_url);
        let body = event_body(event);
        debug!("Creating calendar event: {}", body);

        // conferenceDataVersion=1 is required for the Meet room to be provisioned
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&credential.token)
            .query(&[("conferenceDataVersion", "1")])
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Calendar API request failed: {}", e);
                Error::EventCreationFailed(e.to_string())
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            error!("Calendar API error {}: {}", status, detail);
            return Err(Error::EventCreationFailed(if detail.is_empty() {
                status.to_string()
            } else {
                detail
            }));
        }

        let created: CreatedEvent = response
            .json()
            .await
            .map_err(|e| Error::EventCreationFailed(format!("Failed to parse event response: {}", e)))?;

        let meeting = ScheduledMeeting::from(created);
        info!(
            "Created event {:?}, conference id {:?}",
            meeting.event_url, meeting.conference_id
        );
        Ok(meeting)
    }
}
