//! Blocking HTTP implementation of `CloudApi`.

use super::wire::{AuthData, AuthRequest, Envelope, ReadingPayload, SchedulePayload};
use super::{CloudApi, CloudError, CloudResult, Credential};
use crate::model::command::Command;
use crate::model::reading::Reading;
use log::{debug, warn};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use std::time::{Duration, Instant};

const AUTHENTICATE_PATH: &str = "/api/devices/authenticate";
const READINGS_PATH: &str = "/api/sensors/readings";
const SCHEDULES_PATH: &str = "/api/irrigation/schedules";
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Static configuration of the HTTP adapter.
#[derive(Debug, Clone)]
pub struct CloudClientConfig {
    pub base_url: String,
    pub device_id: String,
    pub security_key: String,
    pub zone_filter: Option<String>,
    pub auth_timeout: Duration,
    pub push_timeout: Duration,
    pub pull_timeout: Duration,
}

/// `CloudApi` over the upstream REST gateway.
pub struct HttpCloudClient {
    client: Client,
    config: CloudClientConfig,
}

impl HttpCloudClient {
    pub fn new(config: CloudClientConfig) -> CloudResult<Self> {
        let connect_timeout = config
            .auth_timeout
            .min(config.pull_timeout)
            .min(config.push_timeout);
        let client = Client::builder()
            .cookie_store(true)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|err| CloudError::Network(format!("failed to build HTTP client: {err}")))?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn send(&self, operation: &'static str, request: RequestBuilder) -> CloudResult<Response> {
        let started_at = Instant::now();
        let result = request.send();
        let elapsed = started_at.elapsed().as_millis();
        match result {
            Ok(response) => {
                debug!(
                    "event=cloud_call module=cloud status=ok operation={} http_status={} duration_ms={}",
                    operation,
                    response.status().as_u16(),
                    elapsed
                );
                Ok(response)
            }
            Err(err) => {
                let reason = if err.is_timeout() {
                    "timeout"
                } else if err.is_connect() {
                    "connect"
                } else {
                    "transport"
                };
                warn!(
                    "event=cloud_call module=cloud status=error operation={} error_code=network_error reason={} duration_ms={}",
                    operation, reason, elapsed
                );
                Err(CloudError::Network(format!("{operation} {reason}: {err}")))
            }
        }
    }
}

impl CloudApi for HttpCloudClient {
    fn authenticate(&self) -> CloudResult<Credential> {
        let request = self
            .client
            .post(self.url(AUTHENTICATE_PATH))
            .timeout(self.config.auth_timeout)
            .json(&AuthRequest {
                device_id: &self.config.device_id,
                security_key: &self.config.security_key,
            });
        let response = self.send("authenticate", request)?;
        let status = response.status();
        let body = read_body(response)?;

        check_status(status, &body)?;

        // Upstreams that only set a session cookie may return any body.
        let envelope = serde_json::from_str::<Envelope<AuthData>>(&body).ok();
        if let Some(envelope) = &envelope {
            if envelope.success == Some(false) {
                return Err(CloudError::Auth(
                    envelope
                        .error
                        .clone()
                        .unwrap_or_else(|| "upstream reported failure".to_string()),
                ));
            }
        }

        let token = envelope.and_then(|envelope| {
            envelope
                .data
                .and_then(|data| data.token)
                .or(envelope.token)
        });
        Ok(match token {
            Some(token) => Credential::bearer(token),
            None => Credential::session(),
        })
    }

    fn push_readings(&self, credential: &Credential, batch: &[Reading]) -> CloudResult<()> {
        let payload: Vec<ReadingPayload<'_>> = batch.iter().map(ReadingPayload::from).collect();
        let request = with_credential(
            self.client
                .post(self.url(READINGS_PATH))
                .timeout(self.config.push_timeout)
                .json(&payload),
            credential,
        );
        let response = self.send("push_readings", request)?;
        let status = response.status();
        let body = read_body(response)?;
        check_status(status, &body)?;

        if let Ok(envelope) = serde_json::from_str::<Envelope<serde_json::Value>>(&body) {
            if envelope.success == Some(false) {
                return Err(CloudError::Upstream {
                    status: status.as_u16(),
                    message: envelope
                        .error
                        .unwrap_or_else(|| "upstream reported failure".to_string()),
                });
            }
        }

        Ok(())
    }

    fn pull_commands(&self, credential: &Credential) -> CloudResult<Vec<Command>> {
        let mut request = self
            .client
            .get(self.url(SCHEDULES_PATH))
            .timeout(self.config.pull_timeout);
        if let Some(zone_id) = &self.config.zone_filter {
            request = request.query(&[("zoneId", zone_id.as_str())]);
        }
        let response = self.send("pull_commands", with_credential(request, credential))?;
        let status = response.status();
        let body = read_body(response)?;
        check_status(status, &body)?;

        let envelope: Envelope<Vec<serde_json::Value>> = serde_json::from_str(&body)
            .map_err(|err| CloudError::InvalidResponse(format!("schedules body: {err}")))?;
        if envelope.success == Some(false) {
            return Err(CloudError::Upstream {
                status: status.as_u16(),
                message: envelope
                    .error
                    .unwrap_or_else(|| "upstream reported failure".to_string()),
            });
        }

        let entries = envelope.data.unwrap_or_default();
        let mut commands = Vec::with_capacity(entries.len());
        for entry in entries {
            let parsed = serde_json::from_value::<SchedulePayload>(entry)
                .map_err(|err| err.to_string())
                .and_then(SchedulePayload::into_command);
            match parsed {
                Ok(command) => commands.push(command),
                Err(reason) => warn!(
                    "event=pull_commands module=cloud status=skipped reason={}",
                    reason
                ),
            }
        }

        Ok(commands)
    }
}

fn with_credential(request: RequestBuilder, credential: &Credential) -> RequestBuilder {
    match credential.token() {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}

fn read_body(response: Response) -> CloudResult<String> {
    response
        .text()
        .map_err(|err| CloudError::Network(format!("failed to read response body: {err}")))
}

fn check_status(status: StatusCode, body: &str) -> CloudResult<()> {
    if status.is_success() {
        return Ok(());
    }

    let message = error_message(body);
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(CloudError::Auth(format!("status {}: {message}", status.as_u16())));
    }

    Err(CloudError::Upstream {
        status: status.as_u16(),
        message,
    })
}

fn error_message(body: &str) -> String {
    if let Ok(envelope) = serde_json::from_str::<Envelope<serde_json::Value>>(body) {
        if let Some(error) = envelope.error {
            return error;
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect()
}
