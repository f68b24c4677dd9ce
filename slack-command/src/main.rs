//! Slack Command Lambda - Handles the meeting scheduler slash commands.
//!
//! This Lambda receives slash-command webhooks from API Gateway, verifies the
//! Slack signature, and acknowledges immediately. The command itself runs in
//! an asynchronous self-invocation that posts its reply to the command's
//! `response_url`, which keeps the acknowledgement inside Slack's 3-second limit.

use aws_sdk_lambda::primitives::Blob;
use chrono::Utc;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::http::build_client;
use shared::{
    load_service_account_key, verify_signature, Bot, CommandInvocation, CommandNames, Config,
    Directory, GoogleCalendarClient, GoogleMeetClient, PrefixStore, Reply, Scheduler,
    SchedulerSettings, ServiceAccountCredentials, SlackClient, SlashCommand, GOOGLE_API_SCOPES,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Payload for async follow-up processing
#[derive(Debug, Serialize, Deserialize)]
struct FollowUpPayload {
    follow_up: bool,
    invocation: CommandInvocation,
    response_url: String,
}

/// API Gateway proxy request (simplified)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiGatewayRequest {
    headers: Option<HashMap<String, String>>,
    body: Option<String>,
    is_base64_encoded: Option<bool>,
}

/// API Gateway proxy response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiGatewayResponse {
    status_code: u16,
    headers: HashMap<String, String>,
    body: String,
    is_base64_encoded: bool,
}

impl ApiGatewayResponse {
    fn new(status_code: u16, body: &str, content_type: &str) -> Self {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), content_type.to_string());
        Self {
            status_code,
            headers,
            body: body.to_string(),
            is_base64_encoded: false,
        }
    }

    fn json<T: Serialize>(status_code: u16, data: &T) -> Result<Self, Error> {
        let body = serde_json::to_string(data)?;
        Ok(Self::new(status_code, &body, "application/json"))
    }

    fn into_value(self) -> Result<Value, Error> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Application state
struct AppState {
    bot: Bot,
    slack: Arc<SlackClient>,
    lambda_client: aws_sdk_lambda::Client,
    signing_secret: String,
    function_name: String,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env()?;
        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let lambda_client = aws_sdk_lambda::Client::new(&aws_config);
        let secrets_client = aws_sdk_secretsmanager::Client::new(&aws_config);

        let function_name = std::env::var("AWS_LAMBDA_FUNCTION_NAME")
            .unwrap_or_else(|_| "meeting-scheduler-slack-command".to_string());

        let http_client = build_client(config.http_timeout)?;

        let key = load_service_account_key(&config.service_account, Some(&secrets_client)).await?;
        let scopes = GOOGLE_API_SCOPES.iter().map(|s| s.to_string()).collect();
        let credentials = ServiceAccountCredentials::new(http_client.clone(), key, scopes)?;

        let slack = Arc::new(SlackClient::new(
            http_client.clone(),
            config.slack_api_base_url.clone(),
            config.slack_bot_token.clone(),
        ));
        let directory: Arc<dyn Directory> = slack.clone();
        let store = Arc::new(PrefixStore::open(&config.storage_dir, config.lock_timeout)?);

        let scheduler = Scheduler::new(
            SchedulerSettings::from(&config),
            Arc::clone(&directory),
            Arc::clone(&store),
            Arc::new(credentials),
            Arc::new(GoogleCalendarClient::new(
                http_client.clone(),
                config.calendar_api_base_url.clone(),
            )),
            Arc::new(GoogleMeetClient::new(
                http_client,
                config.meet_api_base_url.clone(),
            )),
        );

        info!(
            "Scheduler ready: domain={}, commands={} {}",
            config.workspace_domain, config.set_prefix_command, config.schedule_command
        );

        Ok(Self {
            bot: Bot::new(CommandNames::from(&config), directory, store, scheduler),
            slack,
            lambda_client,
            signing_secret: config.slack_signing_secret,
            function_name,
        })
    }

    /// Invoke self asynchronously for follow-up processing
    async fn invoke_follow_up(&self, payload: &FollowUpPayload) -> Result<(), Error> {
        let payload_json = serde_json::to_vec(payload)?;

        self.lambda_client
            .invoke()
            .function_name(&self.function_name)
            .invocation_type(aws_sdk_lambda::types::InvocationType::Event)
            .payload(Blob::new(payload_json))
            .send()
            .await
            .map_err(|e| format!("Failed to invoke follow-up: {}", e))?;

        info!("Follow-up invocation triggered");
        Ok(())
    }
}

/// Case-insensitive header lookup
fn header<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

async fn handler(state: Arc<AppState>, event: LambdaEvent<Value>) -> Result<Value, Error> {
    let (payload, _context) = event.into_parts();

    // Check if this is a direct follow-up invocation (not from API Gateway)
    if let Ok(follow_up) = serde_json::from_value::<FollowUpPayload>(payload.clone()) {
        if follow_up.follow_up {
            info!(
                "Processing follow-up for {} from user {}",
                follow_up.invocation.command, follow_up.invocation.user_id
            );
            return handle_follow_up(state, follow_up).await;
        }
    }

    // This is an API Gateway request
    let api_request: ApiGatewayRequest = serde_json::from_value(payload)?;
    if api_request.is_base64_encoded.unwrap_or(false) {
        warn!("Rejecting base64-encoded request body");
        return ApiGatewayResponse::new(400, "Invalid request", "text/plain").into_value();
    }

    let body_str = api_request.body.unwrap_or_default();
    let headers = api_request.headers.unwrap_or_default();
    let signature = header(&headers, "x-slack-signature").unwrap_or("");
    let timestamp = header(&headers, "x-slack-request-timestamp").unwrap_or("");

    if !verify_signature(
        &state.signing_secret,
        signature,
        timestamp,
        &body_str,
        Utc::now().timestamp(),
    ) {
        warn!("Invalid Slack signature");
        return ApiGatewayResponse::new(401, "Invalid signature", "text/plain").into_value();
    }

    // Slack retries when the first ack is slow; the first delivery is already running
    if let Some(retry) = header(&headers, "x-slack-retry-num") {
        info!("Ignoring Slack retry #{}", retry);
        return ApiGatewayResponse::new(200, "", "text/plain").into_value();
    }

    let command = match SlashCommand::from_form(&body_str) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to parse slash command: {}", e);
            return ApiGatewayResponse::new(400, "Invalid request", "text/plain").into_value();
        }
    };

    let follow_up_payload = FollowUpPayload {
        follow_up: true,
        invocation: command.invocation,
        response_url: command.response_url,
    };

    if let Err(e) = state.invoke_follow_up(&follow_up_payload).await {
        error!("Failed to invoke follow-up: {}", e);
        return ApiGatewayResponse::json(
            200,
            &Reply::private("Sorry, something went wrong. Please try again."),
        )?
        .into_value();
    }

    // Empty 200 acknowledges the command; the reply arrives via response_url
    ApiGatewayResponse::new(200, "", "text/plain").into_value()
}

/// Handle follow-up processing (async invocation)
async fn handle_follow_up(state: Arc<AppState>, payload: FollowUpPayload) -> Result<Value, Error> {
    let reply = state.bot.handle(&payload.invocation, Utc::now()).await;

    if let Err(e) = state.slack.respond(&payload.response_url, &reply).await {
        error!("Failed to send command reply: {}", e);
    }

    // Return success for async invocation
    Ok(serde_json::json!({"status": "ok"}))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let state = Arc::new(AppState::new().await?);

    lambda_runtime::run(service_fn(move |event| {
        let state = Arc::clone(&state);
        async move { handler(state, event).await }
    }))
    .await
}
