// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Inbound notification dispatch.
//!
//! One-pass state machine per inbound call: extract the envelope,
//! authenticate, route by the `method` discriminator, execute the bound
//! handler, wrap its structured result. No state is retained across calls.
//!
//! The `method` key is removed from the domain mapping before
//! authentication: the keyed hash covers the remaining domain parameters
//! only. No handler executes unless authentication succeeded. Unknown
//! methods are tolerated (logged, default success-shaped result); any other
//! failure at the envelope boundary becomes a generic fault with the
//! internal detail logged locally, never put on the wire.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, warn};

use crate::error::AuthenticationError;
use crate::protocol::{NotificationEnvelope, Params};
use crate::transport::Authenticator;

/// Message of every fault reply; internal detail stays in the logs.
const FAULT_MESSAGE: &str = "Could not parse the requested method";

/// Structured handler result, always carrying at least `success`.
pub type HandlerResult = Map<String, Value>;

pub fn success_result() -> HandlerResult {
    let mut result = HandlerResult::new();
    result.insert("success".to_string(), Value::Bool(true));
    result
}

pub fn failure_result() -> HandlerResult {
    let mut result = HandlerResult::new();
    result.insert("success".to_string(), Value::Bool(false));
    result
}

/// A reconciliation handler bound to one inbound method name.
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    /// Receives the authenticated domain parameters, `method` removed.
    /// Handlers swallow their own failures into the result's `success`.
    async fn handle(&self, params: Params) -> HandlerResult;
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Fault {
    #[serde(rename = "faultCode")]
    pub code: i32,
    #[serde(rename = "faultString")]
    pub message: String,
}

/// RPC-level reply returned synchronously over the notification channel.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub enum DispatchReply {
    #[serde(rename = "result")]
    Result(HandlerResult),
    #[serde(rename = "fault")]
    Fault(Fault),
}

impl DispatchReply {
    pub(crate) fn fault() -> Self {
        DispatchReply::Fault(Fault {
            code: 1,
            message: FAULT_MESSAGE.to_string(),
        })
    }
}

/// Routing table for one notification channel, built once at startup.
pub struct NotificationDispatcher {
    channel: &'static str,
    authenticator: Authenticator,
    handlers: HashMap<&'static str, Arc<dyn NotificationHandler>>,
}

impl NotificationDispatcher {
    pub fn new(channel: &'static str, authenticator: Authenticator) -> Self {
        Self {
            channel,
            authenticator,
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, method: &'static str, handler: Arc<dyn NotificationHandler>) {
        self.handlers.insert(method, handler);
    }

    /// Run one inbound call through the state machine.
    pub async fn dispatch(&self, domain: Params, auth: Params) -> DispatchReply {
        match self.run(domain, auth).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(channel = self.channel, error = %e, "inbound notification rejected");
                DispatchReply::fault()
            }
        }
    }

    async fn run(
        &self,
        mut domain: Params,
        auth: Params,
    ) -> Result<DispatchReply, AuthenticationError> {
        let envelope = NotificationEnvelope::from_params(&auth)
            .map_err(|e| AuthenticationError::InvalidEnvelope(e.to_string()))?;

        let method = domain.remove("method").ok_or_else(|| {
            AuthenticationError::InvalidEnvelope("request carried no method".to_string())
        })?;

        // Sole gate protecting local state from forged remote calls.
        self.authenticator.validate(&envelope, &domain).await?;

        let Some(handler) = self.handlers.get(method.as_str()) else {
            warn!(channel = self.channel, %method, "method is not supported");
            return Ok(DispatchReply::Result(HandlerResult::new()));
        };

        Ok(DispatchReply::Result(handler.handle(domain).await))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::RegionSecrets;
    use crate::transport::testing::{init_tracing, params, MockTransport};
    use crate::transport::{hash_parameters, GatewayClient};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    const VERIFICATION_SECRET: &str = "per-call-secret";

    struct CountingHandler {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl NotificationHandler for CountingHandler {
        async fn handle(&self, _params: Params) -> HandlerResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            success_result()
        }
    }

    fn dispatcher_with(
        region: Uuid,
        handler: Arc<CountingHandler>,
    ) -> (NotificationDispatcher, Arc<MockTransport>) {
        let secrets = Arc::new(RegionSecrets::new());
        secrets.insert(region, "region-secret".to_string()).unwrap();

        let transport =
            MockTransport::replying(vec![Ok(params(&[("secret", VERIFICATION_SECRET)]))]);
        let authenticator = Authenticator::new(
            GatewayClient::new(transport.clone(), "gateway.example.com"),
            secrets,
        );

        let mut dispatcher = NotificationDispatcher::new("currency", authenticator);
        dispatcher.register("notifyBalanceUpdate", handler);
        (dispatcher, transport)
    }

    fn auth_params(region: Uuid, domain_without_method: &Params) -> Params {
        params(&[
            (
                "hashValue",
                &hash_parameters(domain_without_method, VERIFICATION_SECRET),
            ),
            ("regionUUID", &region.to_string()),
            ("nonce", "7"),
            ("notificationID", "n-1"),
        ])
    }

    #[tokio::test]
    async fn authenticated_call_reaches_its_handler() {
        let region = Uuid::new_v4();
        let handler = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
        });
        let (dispatcher, _) = dispatcher_with(region, handler.clone());

        let signed = params(&[("avatarUUID", "a"), ("balance", "250")]);
        let auth = auth_params(region, &signed);
        let mut domain = signed;
        domain.insert("method".to_string(), "notifyBalanceUpdate".to_string());

        let reply = dispatcher.dispatch(domain, auth).await;
        assert_eq!(reply, DispatchReply::Result(success_result()));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn forged_hash_is_rejected_before_any_handler_runs() {
        init_tracing();
        let region = Uuid::new_v4();
        let handler = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
        });
        let (dispatcher, _) = dispatcher_with(region, handler.clone());

        let mut domain = params(&[("avatarUUID", "a"), ("balance", "250")]);
        domain.insert("method".to_string(), "notifyBalanceUpdate".to_string());
        let auth = params(&[
            ("hashValue", "forged"),
            ("regionUUID", &region.to_string()),
            ("nonce", "7"),
            ("notificationID", "n-1"),
        ]);

        let reply = dispatcher.dispatch(domain, auth).await;
        assert!(matches!(reply, DispatchReply::Fault(ref f) if f.message == FAULT_MESSAGE));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_method_is_tolerated_with_a_default_result() {
        let region = Uuid::new_v4();
        let handler = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
        });
        let (dispatcher, _) = dispatcher_with(region, handler.clone());

        let signed = Params::new();
        let auth = auth_params(region, &signed);
        let mut domain = signed;
        domain.insert("method".to_string(), "notifySomethingNew".to_string());

        let reply = dispatcher.dispatch(domain, auth).await;
        assert_eq!(reply, DispatchReply::Result(HandlerResult::new()));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_envelope_becomes_a_generic_fault() {
        init_tracing();
        let region = Uuid::new_v4();
        let handler = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
        });
        let (dispatcher, transport) = dispatcher_with(region, handler);

        let mut domain = Params::new();
        domain.insert("method".to_string(), "notifyBalanceUpdate".to_string());
        // Envelope is missing everything but the region.
        let auth = params(&[("regionUUID", &region.to_string())]);

        let reply = dispatcher.dispatch(domain, auth).await;
        assert!(matches!(reply, DispatchReply::Fault(ref f) if f.code == 1));
        // Rejected before the verification round trip.
        assert!(transport.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn replies_serialize_in_the_wire_shape() {
        let ok = DispatchReply::Result(success_result());
        assert_eq!(
            serde_json::to_string(&ok).unwrap(),
            r#"{"result":{"success":true}}"#
        );

        let fault = DispatchReply::fault();
        assert_eq!(
            serde_json::to_string(&fault).unwrap(),
            r#"{"fault":{"faultCode":1,"faultString":"Could not parse the requested method"}}"#
        );
    }
}
