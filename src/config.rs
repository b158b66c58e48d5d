// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines the module's identity, the environment variable
//! names it is configured through, and the bootstrap handshake that
//! resolves the economy gateway endpoint at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `ECONOMY_INIT_URL` | Bootstrap lookup service URL | Required |
//! | `ECONOMY_ENVIRONMENT` | Gateway environment selector (`TEST` or `LIVE`) | `TEST` |
//! | `ECONOMY_GRID_URL` | Public URL of this grid | Required |
//! | `RUST_LOG` | Log level filter | `info` |

use std::env;
use std::sync::Arc;

use tracing::info;

use crate::error::GatewayError;
use crate::protocol::{require, Params};
use crate::transport::{normalize_url, GatewayClient, GatewayTransport};

/// Environment variable name for the bootstrap lookup service URL.
///
/// The lookup service is the only statically configured endpoint; the
/// actual gateway URL is resolved from it at startup, which lets the
/// operator move gateways without touching simulator configuration.
pub const INIT_URL_ENV: &str = "ECONOMY_INIT_URL";

/// Environment variable name for the gateway environment selector.
pub const ENVIRONMENT_ENV: &str = "ECONOMY_ENVIRONMENT";

/// Environment variable name for this grid's public URL.
pub const GRID_URL_ENV: &str = "ECONOMY_GRID_URL";

/// Module name reported in every gateway handshake.
pub const MODULE_NAME: &str = "economy-gateway";

/// Module version reported in every gateway handshake.
pub const MODULE_VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_ENVIRONMENT: &str = "TEST";

/// Static configuration read from the environment at startup.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub init_url: String,
    pub environment: String,
    pub grid_url: String,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, GatewayError> {
        let init_url = env::var(INIT_URL_ENV)
            .map_err(|_| GatewayError::precondition(format!("{INIT_URL_ENV} is not set")))?;
        let grid_url = env::var(GRID_URL_ENV)
            .map_err(|_| GatewayError::precondition(format!("{GRID_URL_ENV} is not set")))?;
        let environment =
            env::var(ENVIRONMENT_ENV).unwrap_or_else(|_| DEFAULT_ENVIRONMENT.to_string());

        Ok(Self {
            init_url: normalize_url(&init_url),
            environment,
            grid_url: normalize_url(&grid_url),
        })
    }
}

/// Resolve the gateway endpoint through the bootstrap lookup service and
/// return a client bound to it.
pub async fn resolve_gateway(
    transport: Arc<dyn GatewayTransport>,
    config: &GatewayConfig,
) -> Result<GatewayClient, GatewayError> {
    let bootstrap = GatewayClient::new(Arc::clone(&transport), &config.init_url);

    let mut params = Params::new();
    params.insert("method".to_string(), "getGatewayURL".to_string());
    params.insert("moduleName".to_string(), MODULE_NAME.to_string());
    params.insert("moduleVersion".to_string(), MODULE_VERSION.to_string());
    params.insert(
        "gatewayEnvironment".to_string(),
        config.environment.clone(),
    );

    let response = bootstrap.call(params).await?;
    let gateway_url = require(&response, "gatewayURL")?;

    info!(%gateway_url, environment = %config.environment, "gateway endpoint resolved");
    Ok(GatewayClient::new(transport, gateway_url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::{params, MockTransport};

    fn config() -> GatewayConfig {
        GatewayConfig {
            init_url: "http://init.example.com/".to_string(),
            environment: "TEST".to_string(),
            grid_url: "http://grid.example.com/".to_string(),
        }
    }

    #[tokio::test]
    async fn resolves_and_normalizes_the_gateway_endpoint() {
        let transport =
            MockTransport::replying(vec![Ok(params(&[("gatewayURL", "gateway.example.com")]))]);
        let client = resolve_gateway(transport.clone(), &config()).await.unwrap();
        assert_eq!(client.endpoint(), "http://gateway.example.com/");

        let sent = transport.requests.lock().unwrap();
        assert_eq!(sent[0].get("method").unwrap(), "getGatewayURL");
        assert_eq!(sent[0].get("gatewayEnvironment").unwrap(), "TEST");
        assert_eq!(sent[0].get("moduleName").unwrap(), MODULE_NAME);
    }

    #[tokio::test]
    async fn missing_gateway_url_is_an_error() {
        let transport = MockTransport::replying(vec![Ok(params(&[("status", "ok")]))]);
        assert!(resolve_gateway(transport, &config()).await.is_err());
    }
}
