//! Slack Web API client and slash-command request handling.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

use crate::http::error_detail;
use crate::models::{CommandInvocation, Reply};
use crate::{Error, Result};

/// Requests older than this are rejected as possible replays.
pub const MAX_REQUEST_AGE_SECS: i64 = 60 * 5;

/// Slack user as returned by `users.info`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlackUser {
    pub id: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_owner: bool,
    #[serde(default)]
    pub profile: SlackProfile,
}

/// Slack user profile
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlackProfile {
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsersInfoResponse {
    ok: bool,
    error: Option<String>,
    user: Option<SlackUser>,
}

#[derive(Debug, Deserialize)]
struct ConversationsInfoResponse {
    ok: bool,
    error: Option<String>,
    channel: Option<SlackChannel>,
}

#[derive(Debug, Deserialize)]
struct SlackChannel {
    creator: Option<String>,
}

/// Directory lookups the command handlers depend on.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Look up a workspace user by id.
    async fn user(&self, user_id: &str) -> Result<SlackUser>;

    /// Look up who created a channel.
    async fn channel_creator(&self, channel_id: &str) -> Result<Option<String>>;
}

/// Slack Web API client authenticated with the bot token.
pub struct SlackClient {
    http_client: Client,
    base_url: String,
    bot_token: String,
}

impl SlackClient {
    pub fn new(http_client: Client, base_url: impl Into<String>, bot_token: impl Into<String>) -> Self {
        Self {
            http_client,
            base_url: base_url.into(),
            bot_token: bot_token.into(),
        }
    }

    /// Deliver a command reply through its `response_url`.
    pub async fn respond(&self, response_url: &str, reply: &Reply) -> Result<()> {
        let response = self
            .http_client
            .post(response_url)
            .json(reply)
            .send()
            .await?;

        if !response.status().is_success() {
            let detail = error_detail(response).await;
            error!("Slack response_url rejected reply: {}", detail);
            return Err(Error::Slack(format!("response_url rejected reply: {}", detail)));
        }

        info!("Reply delivered ({:?})", reply.visibility);
        Ok(())
    }
}

#[async_trait]
impl Directory for SlackClient {
    async fn user(&self, user_id: &str) -> Result<SlackUser> {
        let response = self
            .http_client
            .get(format!("{}/users.info", self.base_url))
            .bearer_auth(&self.bot_token)
            .query(&[("user", user_id)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Slack(format!("users.info: {}", error_detail(response).await)));
        }

        let body: UsersInfoResponse = response.json().await?;
        match (body.ok, body.user) {
            (true, Some(user)) => {
                debug!("users.info returned user {}", user.id);
                Ok(user)
            }
            _ => Err(Error::Slack(format!(
                "users.info failed for {}: {}",
                user_id,
                body.error.unwrap_or_else(|| "no user in response".to_string())
            ))),
        }
    }

    async fn channel_creator(&self, channel_id: &str) -> Result<Option<String>> {
        let response = self
            .http_client
            .get(format!("{}/conversations.info", self.base_url))
            .bearer_auth(&self.bot_token)
            .query(&[("channel", channel_id)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Slack(format!(
                "conversations.info: {}",
                error_detail(response).await
            )));
        }

        let body: ConversationsInfoResponse = response.json().await?;
        if !body.ok {
            return Err(Error::Slack(format!(
                "conversations.info failed for {}: {}",
                channel_id,
                body.error.unwrap_or_default()
            )));
        }

        Ok(body.channel.and_then(|c| c.creator))
    }
}

/// Slash command as posted by Slack.
#[derive(Debug, Clone)]
pub struct SlashCommand {
    pub invocation: CommandInvocation,
    pub response_url: String,
}

impl SlashCommand {
    /// Build from an `application/x-www-form-urlencoded` request body.
    pub fn from_form(body: &str) -> Result<Self> {
        let mut fields = parse_form(body);
        let mut take = |key: &str| {
            fields
                .remove(key)
                .ok_or_else(|| Error::Slack(format!("slash command payload missing '{}'", key)))
        };

        Ok(Self {
            invocation: CommandInvocation {
                command: take("command")?,
                channel_id: take("channel_id")?,
                user_id: take("user_id")?,
                text: take("text").unwrap_or_default(),
            },
            response_url: take("response_url")?,
        })
    }
}

/// Decode a form-urlencoded body. Later duplicates win.
pub fn parse_form(body: &str) -> HashMap<String, String> {
    body.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(key), decode_component(value))
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

/// Verify a Slack request signature (`X-Slack-Signature`).
///
/// The signed base string is `v0:{timestamp}:{body}`; stale timestamps are
/// rejected even when the signature matches.
pub fn verify_signature(
    signing_secret: &str,
    signature: &str,
    timestamp: &str,
    body: &str,
    now_unix: i64,
) -> bool {
    let Ok(sent_at) = timestamp.parse::<i64>() else {
        return false;
    };
    if now_unix.abs_diff(sent_at) > MAX_REQUEST_AGE_SECS.unsigned_abs() {
        warn!("Slack request timestamp is stale: {}", timestamp);
        return false;
    }

    let Some(signature_hex) = signature.strip_prefix("v0=") else {
        return false;
    };
    let Ok(expected) = hex::decode(signature_hex) else {
        return false;
    };

    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(signing_secret.as_bytes()) else {
        return false;
    };
    mac.update(format!("v0:{}:{}", timestamp, body).as_bytes());
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "8f742231b10e8888abcd99yyyzzz85a5";

    fn sign(signing_secret: &str, timestamp: &str, body: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(signing_secret.as_bytes()).unwrap();
        mac.update(format!("v0:{}:{}", timestamp, body).as_bytes());
        format!("v0={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn test_signature_round_trip() {
        let body = "token=x&command=%2Fmtg&text=sync+30";
        let signature = sign(SECRET, "1700000000", body);
        assert!(verify_signature(SECRET, &signature, "1700000000", body, 1700000010));
    }

    #[test]
    fn test_tampered_body_is_rejected() {
        let signature = sign(SECRET, "1700000000", "text=sync+30");
        assert!(!verify_signature(SECRET, &signature, "1700000000", "text=sync+31", 1700000000));
    }

    #[test]
    fn test_stale_timestamp_is_rejected() {
        let signature = sign(SECRET, "1700000000", "text=a");
        assert!(!verify_signature(SECRET, &signature, "1700000000", "text=a", 1700000000 + 301));
    }

    #[test]
    fn test_extreme_timestamps_are_stale() {
        for timestamp in ["-9223372036854775808", "9223372036854775807"] {
            let signature = sign(SECRET, timestamp, "text=a");
            assert!(!verify_signature(SECRET, &signature, timestamp, "text=a", 1700000000));
        }
    }

    #[test]
    fn test_garbage_signature_is_rejected() {
        assert!(!verify_signature(SECRET, "v1=abc", "1700000000", "", 1700000000));
        assert!(!verify_signature(SECRET, "v0=zz", "1700000000", "", 1700000000));
        assert!(!verify_signature(SECRET, "v0=00", "not-a-number", "", 1700000000));
    }

    #[test]
    fn test_slash_command_from_form() {
        let body = "command=%2Fmtg&channel_id=C024BE91L&user_id=U2147483697\
            &text=%22Weekly+Sync%22+30+%3C%40U123%7Cbob%3E\
            &response_url=https%3A%2F%2Fhooks.slack.com%2Fcommands%2F1234%2F5678";
        let command = SlashCommand::from_form(body).unwrap();
        assert_eq!(command.invocation.command, "/mtg");
        assert_eq!(command.invocation.channel_id, "C024BE91L");
        assert_eq!(command.invocation.user_id, "U2147483697");
        assert_eq!(command.invocation.text, "\"Weekly Sync\" 30 <@U123|bob>");
        assert_eq!(command.response_url, "https://hooks.slack.com/commands/1234/5678");
    }

    #[test]
    fn test_slash_command_without_text_is_empty() {
        let body = "command=%2Freg-mtg-prefix&channel_id=C1&user_id=U1&response_url=https%3A%2F%2Fx";
        let command = SlashCommand::from_form(body).unwrap();
        assert_eq!(command.invocation.text, "");
    }

    #[test]
    fn test_slash_command_missing_field() {
        assert!(matches!(
            SlashCommand::from_form("command=%2Fmtg&text=x"),
            Err(Error::Slack(_))
        ));
    }

    #[test]
    fn test_user_deserializes_without_profile_email() {
        let json = r#"{"ok":true,"user":{"id":"U1","is_admin":true,"profile":{}}}"#;
        let body: UsersInfoResponse = serde_json::from_str(json).unwrap();
        let user = body.user.unwrap();
        assert!(user.is_admin);
        assert!(!user.is_owner);
        assert_eq!(user.profile.email, None);
    }

    mod slack_client {
        use super::*;
        use httpmock::Method::{GET, POST};
        use httpmock::MockServer;

        fn client(server: &MockServer) -> SlackClient {
            SlackClient::new(Client::new(), server.base_url(), "xoxb-test")
        }

        #[tokio::test]
        async fn test_user_lookup_returns_profile() {
            let server = MockServer::start_async().await;
            let lookup = server
                .mock_async(|when, then| {
                    when.method(GET)
                        .path("/users.info")
                        .query_param("user", "U123")
                        .header("authorization", "Bearer xoxb-test");
                    then.status(200)
                        .header("content-type", "application/json")
                        .body(r#"{"ok":true,"user":{"id":"U123","profile":{"email":"bob@org.com"}}}"#);
                })
                .await;

            let user = client(&server).user("U123").await.unwrap();

            assert_eq!(user.profile.email.as_deref(), Some("bob@org.com"));
            lookup.assert_async().await;
        }

        #[tokio::test]
        async fn test_user_lookup_not_ok_is_slack_error() {
            let server = MockServer::start_async().await;
            server
                .mock_async(|when, then| {
                    when.method(GET).path("/users.info");
                    then.status(200)
                        .header("content-type", "application/json")
                        .body(r#"{"ok":false,"error":"user_not_found"}"#);
                })
                .await;

            match client(&server).user("U404").await {
                Err(Error::Slack(detail)) => assert!(detail.contains("user_not_found")),
                other => panic!("expected Slack error, got {:?}", other),
            }
        }

        #[tokio::test]
        async fn test_channel_creator_is_read() {
            let server = MockServer::start_async().await;
            server
                .mock_async(|when, then| {
                    when.method(GET)
                        .path("/conversations.info")
                        .query_param("channel", "C1");
                    then.status(200)
                        .header("content-type", "application/json")
                        .body(r#"{"ok":true,"channel":{"id":"C1","creator":"U9"}}"#);
                })
                .await;

            let creator = client(&server).channel_creator("C1").await.unwrap();

            assert_eq!(creator.as_deref(), Some("U9"));
        }

        #[tokio::test]
        async fn test_channel_lookup_not_ok_is_slack_error() {
            let server = MockServer::start_async().await;
            server
                .mock_async(|when, then| {
                    when.method(GET).path("/conversations.info");
                    then.status(200)
                        .header("content-type", "application/json")
                        .body(r#"{"ok":false,"error":"channel_not_found"}"#);
                })
                .await;

            assert!(matches!(
                client(&server).channel_creator("C404").await,
                Err(Error::Slack(_))
            ));
        }

        #[tokio::test]
        async fn test_respond_posts_reply_json() {
            let server = MockServer::start_async().await;
            let hook = server
                .mock_async(|when, then| {
                    when.method(POST)
                        .path("/commands/T1/1/abc")
                        .header("content-type", "application/json")
                        .body(r#"{"response_type":"in_channel","text":"done"}"#);
                    then.status(200).body("ok");
                })
                .await;

            let url = server.url("/commands/T1/1/abc");
            client(&server).respond(&url, &Reply::public("done")).await.unwrap();

            hook.assert_async().await;
        }

        #[tokio::test]
        async fn test_rejected_reply_is_slack_error() {
            let server = MockServer::start_async().await;
            server
                .mock_async(|when, then| {
                    when.method(POST).path("/commands/expired");
                    then.status(404).body("expired_url");
                })
                .await;

            let url = server.url("/commands/expired");
            let result = client(&server).respond(&url, &Reply::private("late")).await;

            assert!(matches!(result, Err(Error::Slack(_))));
        }
    }
}
