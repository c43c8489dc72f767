//! SOAP-style delivery client

use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use billrelay_common::RelayError;

use super::config::DeliveryConfig;
use crate::models::RecordRow;

const ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const SERVICE_NS: &str = "http://billrelay.io/processing";

/// Terminal classification of one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The remote accepted the record
    Success,
    /// The remote explicitly refused the record; retrying could
    /// double-submit, so this is terminal
    Rejected(String),
}

/// Attempt-level failures, retryable within the attempt budget
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("unreadable response envelope: {0}")]
    Envelope(String),
}

/// Field set sent in one ProcessTransaction call
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    pub entry_id: String,
    pub name: String,
    pub amount: String,
    pub currency: String,
    pub timestamp: String,
}

impl From<&RecordRow> for DeliveryRequest {
    fn from(record: &RecordRow) -> Self {
        Self {
            entry_id: record.entry_id.clone(),
            name: record.name.clone(),
            amount: record.amount.to_string(),
            currency: record.currency.clone(),
            timestamp: record.entry_timestamp.clone(),
        }
    }
}

/// Client for the remote processing endpoint
///
/// Owns its HTTP client and connection pool; construct once and share by
/// reference with the delivery stage.
pub struct DeliveryClient {
    client: Client,
    config: DeliveryConfig,
}

impl DeliveryClient {
    pub fn new(config: DeliveryConfig) -> Result<Self, RelayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("billrelay/0.1")
            .build()
            .map_err(|e| RelayError::network(format!("Failed to build delivery client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Deliver one record under the given correlation id
    ///
    /// Transport-level failures (connect, timeout, non-2xx, SOAP fault)
    /// come back as `Err` for the caller to retry; an explicit non-success
    /// result from the remote is `Ok(Rejected)` and terminal.
    pub async fn deliver(
        &self,
        request: &DeliveryRequest,
        correlation_id: &str,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        let envelope = build_envelope(request, correlation_id);

        let mut http = self
            .client
            .post(&self.config.endpoint)
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("SOAPAction", "ProcessTransaction")
            .body(envelope);

        if let (Some(user), Some(pass)) = (&self.config.user, &self.config.pass) {
            http = http.basic_auth(user, Some(pass));
        }

        let response = http
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        if !status.is_success() {
            // Faults ride on error statuses; surface the fault string when
            // the body carries one.
            if let Some(fault) = parse_fault(&body) {
                return Err(DeliveryError::Transport(format!("SOAP fault: {}", fault)));
            }
            return Err(DeliveryError::Transport(format!("HTTP {}", status)));
        }

        let outcome = parse_response(&body)?;
        debug!(entry_id = %request.entry_id, correlation_id, outcome = ?outcome, "Delivery call completed");
        Ok(outcome)
    }
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn build_envelope(request: &DeliveryRequest, correlation_id: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<soapenv:Envelope xmlns:soapenv="{env}" xmlns:prc="{svc}">
  <soapenv:Body>
    <prc:ProcessTransaction>
      <prc:recordId>{record_id}</prc:recordId>
      <prc:name>{name}</prc:name>
      <prc:amount>{amount}</prc:amount>
      <prc:currency>{currency}</prc:currency>
      <prc:timestamp>{timestamp}</prc:timestamp>
      <prc:correlationId>{correlation_id}</prc:correlationId>
    </prc:ProcessTransaction>
  </soapenv:Body>
</soapenv:Envelope>"#,
        env = ENVELOPE_NS,
        svc = SERVICE_NS,
        record_id = xml_escape(&request.entry_id),
        name = xml_escape(&request.name),
        amount = xml_escape(&request.amount),
        currency = xml_escape(&request.currency),
        timestamp = xml_escape(&request.timestamp),
        correlation_id = xml_escape(correlation_id),
    )
}

/// Extract the text of the first element whose local name matches
fn element_text(body: &str, wanted: &[&str]) -> Option<String> {
    use quick_xml::events::Event;

    let mut reader = quick_xml::Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut capture = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let local = String::from_utf8_lossy(e.local_name().as_ref()).to_lowercase();
                capture = wanted.iter().any(|w| *w == local);
            },
            Ok(Event::Text(t)) if capture => {
                if let Ok(text) = t.unescape() {
                    let text = text.trim();
                    if !text.is_empty() {
                        return Some(text.to_string());
                    }
                }
            },
            Ok(Event::End(_)) => capture = false,
            Ok(Event::Eof) => return None,
            Err(_) => return None,
            _ => {},
        }
    }
}

fn parse_fault(body: &str) -> Option<String> {
    if !body.contains("Fault") {
        return None;
    }
    element_text(body, &["faultstring"]).or_else(|| Some("unspecified fault".to_string()))
}

fn parse_response(body: &str) -> Result<DeliveryOutcome, DeliveryError> {
    let result = element_text(body, &["result"])
        .ok_or_else(|| DeliveryError::Envelope("no <result> element in response".to_string()))?;

    if result.eq_ignore_ascii_case("SUCCESS") {
        Ok(DeliveryOutcome::Success)
    } else {
        let message = element_text(body, &["message", "reason"]).unwrap_or_default();
        let reason = if message.is_empty() {
            format!("result={}", result)
        } else {
            format!("result={}: {}", result, message)
        };
        Ok(DeliveryOutcome::Rejected(reason))
    }
}
