//! AWS Secrets Manager integration and service-account key loading.

use aws_sdk_secretsmanager::Client as SecretsClient;
use std::collections::HashMap;
use std::sync::OnceLock;
use tokio::sync::RwLock;
use tracing::info;

use crate::auth::ServiceAccountKey;
use crate::config::ServiceAccountSource;
use crate::{Error, Result};

/// Cached secrets with lazy initialization.
static SECRETS_CACHE: OnceLock<RwLock<HashMap<String, String>>> = OnceLock::new();

fn get_cache() -> &'static RwLock<HashMap<String, String>> {
    SECRETS_CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Get a secret value from Secrets Manager with caching.
pub async fn get_secret(client: &SecretsClient, secret_arn: &str) -> Result<String> {
    // Check cache first
    {
        let cache = get_cache().read().await;
        if let Some(value) = cache.get(secret_arn) {
            return Ok(value.clone());
        }
    }

    // Fetch from Secrets Manager
    let response = client
        .get_secret_value()
        .secret_id(secret_arn)
        .send()
        .await
        .map_err(|e| Error::Aws(format!("Failed to get secret: {}", e)))?;

    let secret_string = response
        .secret_string()
        .ok_or_else(|| Error::Aws("Secret has no string value".to_string()))?
        .to_string();

    // Cache the result
    {
        let mut cache = get_cache().write().await;
        cache.insert(secret_arn.to_string(), secret_string.clone());
    }

    Ok(secret_string)
}

/// Load the service-account key from wherever the configuration points.
///
/// The Secrets Manager client is only needed for [`ServiceAccountSource::Secret`].
pub async fn load_service_account_key(
    source: &ServiceAccountSource,
    client: Option<&SecretsClient>,
) -> Result<ServiceAccountKey> {
    let json = match source {
        ServiceAccountSource::Secret(arn) => {
            let client = client.ok_or_else(|| {
                Error::Config("Secrets Manager client required for secret-backed key".to_string())
            })?;
            get_secret(client, arn).await?
        }
        ServiceAccountSource::File(path) => tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::Config(format!(
                "Google service account file not readable at {}: {}",
                path.display(),
                e
            ))
        })?,
    };

    let key = ServiceAccountKey::from_json(&json)?;
    info!("Loaded service account key for {}", key.client_email);
    Ok(key)
}
