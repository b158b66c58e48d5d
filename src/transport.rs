// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signed gateway transport.
//!
//! Builds and sends authenticated outbound requests, parses the gateway's
//! flat JSON responses, and validates the authenticity of inbound
//! notifications. This layer knows nothing about economic semantics.
//!
//! ## Wire format
//!
//! Outbound calls are HTTP POSTs with an `application/x-www-form-urlencoded`
//! body of `key=value` pairs joined by `&`; values are assumed to already be
//! wire-safe. Responses are flat JSON objects with scalar values. Inbound
//! notifications carry a keyed hash over the *sorted-by-key* concatenation
//! of all domain parameters plus a per-region secret; the digest is SHA-1
//! rendered as lowercase hex. Changing either breaks wire compatibility.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sha1::{Digest, Sha1};
use tracing::debug;

use crate::error::{AuthenticationError, TransportError};
use crate::protocol::{NotificationEnvelope, Params, VerifyNotification};
use crate::secrets::RegionSecrets;

/// Bound on every outbound gateway round trip.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Ensure a URL carries a scheme prefix and a trailing separator.
///
/// Pure and total; normalizing an already-normalized URL is a no-op.
pub fn normalize_url(url: &str) -> String {
    let mut url = if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("http://{url}")
    };
    if !url.ends_with('/') {
        url.push('/');
    }
    url
}

/// Keyed hash of `message + secret`, lowercase hex.
pub fn hash_string(message: &str, secret: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(message.as_bytes());
    hasher.update(secret.as_bytes());
    let digest = hasher.finalize();

    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

/// Keyed hash over the sorted-by-key concatenation of all parameters.
///
/// Sorting makes the hash independent of the order the caller assembled the
/// mapping in; the same logical call is built in several code paths.
pub fn hash_parameters(params: &Params, secret: &str) -> String {
    let sorted: BTreeMap<&String, &String> = params.iter().collect();
    let mut concat = String::new();
    for (key, value) in sorted {
        concat.push_str(key);
        concat.push_str(value);
    }
    hash_string(&concat, secret)
}

/// Form-encode a parameter mapping. No percent-encoding is applied; keys are
/// emitted in sorted order so the body is deterministic.
pub fn serialize_params(params: &Params) -> String {
    let sorted: BTreeMap<&String, &String> = params.iter().collect();
    sorted
        .into_iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Seam between the orchestration layers and the network.
///
/// The production implementation is [`HttpTransport`]; tests substitute a
/// mock that replays canned gateway responses.
#[async_trait]
pub trait GatewayTransport: Send + Sync {
    /// One synchronous call-and-response round trip.
    async fn request(&self, url: &str, params: &Params) -> Result<Params, TransportError>;
}

/// Production transport over a pooled `reqwest` client.
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TransportError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl GatewayTransport for HttpTransport {
    async fn request(&self, url: &str, params: &Params) -> Result<Params, TransportError> {
        let body = serialize_params(params);
        debug!(%url, %body, "gateway request");

        let response = self
            .http
            .post(url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| TransportError::Request(format!("POST {url} failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(TransportError::Request(format!(
                "POST {url} returned {status}"
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| TransportError::Request(format!("POST {url} body read failed: {e}")))?;
        debug!(%url, response = %text, "gateway response");

        parse_response(&text)
    }
}

/// Parse a gateway response body into a flat string mapping.
///
/// Scalar values (numbers, booleans) are stringified; nested structures are
/// a protocol violation and reported as an invalid response.
fn parse_response(body: &str) -> Result<Params, TransportError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| TransportError::InvalidResponse(format!("not valid JSON: {e}")))?;

    let object = value
        .as_object()
        .ok_or_else(|| TransportError::InvalidResponse("expected a JSON object".to_string()))?;

    let mut params = Params::new();
    for (key, value) in object {
        let text = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => String::new(),
            _ => {
                return Err(TransportError::InvalidResponse(format!(
                    "field `{key}` is not a scalar"
                )))
            }
        };
        params.insert(key.clone(), text);
    }
    Ok(params)
}

/// A transport bound to the resolved gateway endpoint.
#[derive(Clone)]
pub struct GatewayClient {
    transport: Arc<dyn GatewayTransport>,
    endpoint: String,
}

impl GatewayClient {
    pub fn new(transport: Arc<dyn GatewayTransport>, endpoint: &str) -> Self {
        Self {
            transport,
            endpoint: normalize_url(endpoint),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn call(&self, params: Params) -> Result<Params, TransportError> {
        self.transport.request(&self.endpoint, &params).await
    }
}

/// Validates inbound notifications before any handler may run.
///
/// The verification secret is not stored locally: it is fetched from the
/// gateway per call, keyed by the claimed region and notification id and
/// signed with a nonce-derived hash under the region's own secret.
pub struct Authenticator {
    client: GatewayClient,
    secrets: Arc<RegionSecrets>,
}

impl Authenticator {
    pub fn new(client: GatewayClient, secrets: Arc<RegionSecrets>) -> Self {
        Self { client, secrets }
    }

    /// A request is authentic iff the claimed hash equals the hash recomputed
    /// from the domain parameters under the gateway-supplied secret. No
    /// partial trust.
    pub async fn validate(
        &self,
        envelope: &NotificationEnvelope,
        domain: &Params,
    ) -> Result<(), AuthenticationError> {
        let region_secret = self
            .secrets
            .get(envelope.region)
            .ok_or(AuthenticationError::UnknownRegion(envelope.region))?;

        let verify = VerifyNotification {
            notification_id: envelope.notification_id.clone(),
            region: envelope.region,
            hash_value: hash_string(&envelope.nonce.to_string(), &region_secret),
        };
        let response = self.client.call(verify.into_params()).await?;

        let secret = response.get("secret").ok_or_else(|| {
            AuthenticationError::InvalidEnvelope(
                "verification response carried no secret".to_string(),
            )
        })?;

        if envelope.hash_value == hash_parameters(domain, secret) {
            Ok(())
        } else {
            Err(AuthenticationError::HashMismatch)
        }
    }
}
