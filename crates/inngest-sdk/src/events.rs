//! Sends events to the Executor's event API (`POST /e/<event key>`), shared
//! by the top-level [`crate::client::Inngest::send_event`] and the
//! `step.sendEvent` tool. See spec §6 "External interfaces".

use inngest_core::{EventPayload, InngestError, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct SendEventResponse {
    ids: Vec<String>,
}

/// POST `events` to `{base_url}/e/{event_key}` and return the ids the
/// Executor assigned them.
pub async fn send_events(
    http: &reqwest::Client,
    base_url: &str,
    event_key: Option<&str>,
    events: &[EventPayload],
) -> Result<Vec<String>> {
    let key = event_key.unwrap_or("");
    let url = format!("{}/e/{}", base_url.trim_end_matches('/'), key);

    let response = http
        .post(url)
        .json(events)
        .send()
        .await
        .map_err(|e| InngestError::Internal(format!("failed to send events: {e}")))?;

    if !response.status().is_success() {
        return Err(InngestError::Internal(format!(
            "event API returned {}",
            response.status()
        )));
    }

    let parsed: SendEventResponse = response
        .json()
        .await
        .map_err(|e| InngestError::Deserialization(e.to_string()))?;
    Ok(parsed.ids)
}
