//! Google service-account credentials with domain-wide delegation.
//!
//! Tokens are minted with the JWT bearer grant: a claim set naming the
//! impersonated user (`sub`) is signed with the service-account key and
//! exchanged at the key's token endpoint.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, error};

use crate::http::error_detail;
use crate::models::AccessToken;
use crate::{Error, Result};

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Issues access tokens on behalf of a workspace user.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn access_token(&self, subject: &str) -> Result<AccessToken>;
}

/// The fields we need from a service-account key JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Credential(format!("Invalid service account key: {}", e)))
    }
}

/// JWT claims for the bearer grant.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssertionClaims {
    /// Service account email
    pub iss: String,
    /// Space-separated scopes
    pub scope: String,
    /// Token endpoint
    pub aud: String,
    /// Impersonated user
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

impl AssertionClaims {
    pub fn new(key: &ServiceAccountKey, scopes: &[String], subject: &str, now: DateTime<Utc>) -> Self {
        Self {
            iss: key.client_email.clone(),
            scope: scopes.join(" "),
            aud: key.token_uri.clone(),
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::hours(1)).timestamp(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Credential provider backed by a service-account key.
pub struct ServiceAccountCredentials {
    http_client: Client,
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    scopes: Vec<String>,
    cache: RwLock<HashMap<String, AccessToken>>,
}

impl ServiceAccountCredentials {
    pub fn new(http_client: Client, key: ServiceAccountKey, scopes: Vec<String>) -> Result<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| Error::Credential(format!("Invalid service account private key: {}", e)))?;

        Ok(Self {
            http_client,
            key,
            encoding_key,
            scopes,
            cache: RwLock::new(HashMap::new()),
        })
    }

    async fn exchange(&self, subject: &str, now: DateTime<Utc>) -> Result<AccessToken> {
        let claims = AssertionClaims::new(&self.key, &self.scopes, subject, now);
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|e| Error::Credential(format!("Failed to sign assertion: {}", e)))?;

        let params = [("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())];
        let response = self
            .http_client
            .post(&self.key.token_uri)
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::Credential(format!("Token request failed: {}", e)))?;

        if !response.status().is_success() {
            let detail = error_detail(response).await;
            error!("Failed to obtain Google API credentials for {}: {}", subject, detail);
            return Err(Error::Credential(format!("Token exchange failed: {}", detail)));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Credential(format!("Failed to parse token response: {}", e)))?;

        Ok(AccessToken {
            token: token.access_token,
            expires_at: now + Duration::seconds(token.expires_in),
        })
    }
}

#[async_trait]
impl CredentialProvider for ServiceAccountCredentials {
    async fn access_token(&self, subject: &str) -> Result<AccessToken> {
        let now = Utc::now();

        // Check cache first
        {
            let cache = self.cache.read().await;
            if let Some(token) = cache.get(subject).filter(|t| t.is_fresh(now)) {
                return Ok(token.clone());
            }
        }

        let token = self.exchange(subject, now).await?;
        debug!("Obtained Google API credentials for user: {}", subject);

        {
            let mut cache = self.cache.write().await;
            cache.insert(subject.to_string(), token.clone());
        }

        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn key() -> ServiceAccountKey {
        ServiceAccountKey::from_json(
            r#"{
                "type": "service_account",
                "client_email": "scheduler@project.iam.gserviceaccount.com",
                "private_key": "not a pem encoded key",
                "token_uri": "https://oauth2.googleapis.com/token"
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_parse_service_account_key() {
        let key = key();
        assert_eq!(key.client_email, "scheduler@project.iam.gserviceaccount.com");
        assert_eq!(key.token_uri, "https://oauth2.googleapis.com/token");
    }

    #[test]
    fn test_token_uri_defaults() {
        let key = ServiceAccountKey::from_json(r#"{"client_email":"a@b","private_key":"k"}"#).unwrap();
        assert_eq!(key.token_uri, DEFAULT_TOKEN_URI);
    }

    #[test]
    fn test_invalid_key_json() {
        assert!(matches!(
            ServiceAccountKey::from_json(r#"{"client_email":"a@b"}"#),
            Err(Error::Credential(_))
        ));
    }

    #[test]
    fn test_claims_impersonate_subject() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let scopes = vec![
            "https://www.googleapis.com/auth/calendar".to_string(),
            "https://www.googleapis.com/auth/meetings.space.settings".to_string(),
        ];
        let claims = AssertionClaims::new(&key(), &scopes, "alice@org.com", now);

        assert_eq!(claims.iss, "scheduler@project.iam.gserviceaccount.com");
        assert_eq!(claims.sub, "alice@org.com");
        assert_eq!(claims.aud, "https://oauth2.googleapis.com/token");
        assert_eq!(
            claims.scope,
            "https://www.googleapis.com/auth/calendar https://www.googleapis.com/auth/meetings.space.settings"
        );
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_unparseable_private_key_is_rejected() {
        let result = ServiceAccountCredentials::new(Client::new(), key(), vec![]);
        assert!(matches!(result, Err(Error::Credential(_))));
    }
}
