//! HTTP helpers shared by the outbound API clients.

use reqwest::{Client, Response};
use std::time::Duration;

use crate::Result;

/// Build the HTTP client used for every outbound call.
///
/// The timeout bounds each call as a whole, so one slow dependency cannot
/// stall an invocation.
pub fn build_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()?)
}

/// Consume a failed response into `"<status>: <body>"` for diagnostics.
pub async fn error_detail(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if body.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, body)
    }
}
