// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Economy Gateway - Virtual World Currency Client
//!
//! This crate connects a virtual-world simulator to a remote economy
//! gateway: signed outbound RPC for money transfers and avatar lifecycle,
//! authenticated inbound notifications for balance updates, object
//! deliveries and land purchases. The gateway holds all balances; the
//! simulator holds none.
//!
//! ## Modules
//!
//! - `api` - HTTP notification routes (Axum)
//! - `balance` - Local mirror of gateway-confirmed avatar balances
//! - `config` - Environment configuration and gateway endpoint resolution
//! - `dispatch` - Inbound notification routing
//! - `error` - Error taxonomy (thiserror)
//! - `orchestrator` - Transaction orchestration and reconciliation
//! - `protocol` - Typed wire messages over the flat string mapping
//! - `secrets` - Per-region shared secret registry
//! - `transport` - Signed request transport and inbound authentication
//! - `world` - Collaborator traits toward the simulator host

pub mod api;
pub mod balance;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod orchestrator;
pub mod protocol;
pub mod secrets;
pub mod transport;
pub mod world;
