// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Error taxonomy for the gateway core.
//!
//! Transport and authentication failures short-circuit before any local
//! state mutation. Everything else is caught per-handler and converted into
//! a `success=false` result; nothing in this crate terminates the host.

use uuid::Uuid;

/// Outbound round-trip failure. Callers must treat every variant as
/// "gateway unreachable", never as an empty result.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("gateway request failed: {0}")]
    Request(String),

    #[error("gateway response was invalid: {0}")]
    InvalidResponse(String),
}

/// Inbound notification rejected before any handler ran.
#[derive(Debug, thiserror::Error)]
pub enum AuthenticationError {
    #[error("hash values do not match")]
    HashMismatch,

    #[error("notification envelope was invalid: {0}")]
    InvalidEnvelope(String),

    #[error("no secret is registered for region {0}")]
    UnknownRegion(Uuid),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// A gateway payload that could not be mapped onto its typed form.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("missing field `{0}` in gateway payload")]
    MissingField(&'static str),

    #[error("invalid value for field `{0}`: {1}")]
    InvalidField(&'static str, String),
}

/// Domain-level failure inside the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// A region secret, once assigned, is immutable for the process
    /// lifetime. Logged as an error, never fatal.
    #[error("the secret for region {0} is already set")]
    DuplicateRegistration(Uuid),

    /// Referenced avatar/object/scene is not locally present.
    #[error("{0}")]
    Precondition(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl GatewayError {
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precondition_keeps_message() {
        let err = GatewayError::precondition("avatar not here");
        assert_eq!(err.to_string(), "avatar not here");
    }

    #[test]
    fn protocol_errors_convert_into_gateway_errors() {
        let err: GatewayError = ProtocolError::MissingField("amount").into();
        assert!(matches!(
            err,
            GatewayError::Protocol(ProtocolError::MissingField("amount"))
        ));
    }

    #[test]
    fn transport_errors_convert_into_authentication_errors() {
        let err: AuthenticationError = TransportError::Request("timeout".into()).into();
        assert!(matches!(err, AuthenticationError::Transport(_)));
    }
}
