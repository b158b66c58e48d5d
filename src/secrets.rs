// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-region shared secrets.
//!
//! One secret per region, established once during region registration with
//! the gateway and read by the authentication routine for every inbound
//! request addressed to that region.

use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

use crate::error::GatewayError;

/// Registry of region secrets. A secret, once assigned, is immutable for
/// the process lifetime.
pub struct RegionSecrets {
    secrets: Mutex<HashMap<Uuid, String>>,
}

impl RegionSecrets {
    pub fn new() -> Self {
        Self {
            secrets: Mutex::new(HashMap::new()),
        }
    }

    /// Store a region's secret. Overwriting an existing entry is a logic
    /// error, rejected without altering the stored value.
    pub fn insert(&self, region: Uuid, secret: String) -> Result<(), GatewayError> {
        let mut secrets = self.secrets.lock().unwrap_or_else(|e| e.into_inner());
        if secrets.contains_key(&region) {
            return Err(GatewayError::DuplicateRegistration(region));
        }
        secrets.insert(region, secret);
        Ok(())
    }

    /// Look up a region's secret. `None` is the valid "not yet registered"
    /// state, never an error.
    pub fn get(&self, region: Uuid) -> Option<String> {
        let secrets = self.secrets.lock().unwrap_or_else(|e| e.into_inner());
        secrets.get(&region).cloned()
    }

    /// Regions registered so far, for the close-region farewell call.
    pub fn regions(&self) -> Vec<Uuid> {
        let secrets = self.secrets.lock().unwrap_or_else(|e| e.into_inner());
        secrets.keys().copied().collect()
    }
}

impl Default for RegionSecrets {
    fn default() -> Self {
        Self::new()
    }
}
