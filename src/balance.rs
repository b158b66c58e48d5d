// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Local balance cache.
//!
//! A read-through mirror of gateway-confirmed avatar balances for fast local
//! balance queries. The gateway is the source of truth: the cache is never
//! incremented or decremented from unconfirmed outbound requests, only set
//! from confirmed inbound balance updates and cleared on session end.
//!
//! A single mutex serializes get/set/remove as one critical-section group.
//! The cache is small; correctness against racing session-close and
//! balance-update notifications dominates over per-key locking.

use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

pub struct BalanceCache {
    balances: Mutex<HashMap<Uuid, i64>>,
}

impl BalanceCache {
    pub fn new() -> Self {
        Self {
            balances: Mutex::new(HashMap::new()),
        }
    }

    /// Current cached balance. Unknown avatars read as 0; at this layer
    /// absence is indistinguishable from a confirmed zero balance.
    pub fn get(&self, avatar: Uuid) -> i64 {
        let balances = self.balances.lock().unwrap_or_else(|e| e.into_inner());
        balances.get(&avatar).copied().unwrap_or(0)
    }

    /// Upsert a confirmed balance. Idempotent.
    pub fn set(&self, avatar: Uuid, balance: i64) {
        let mut balances = self.balances.lock().unwrap_or_else(|e| e.into_inner());
        balances.insert(avatar, balance);
    }

    /// Drop an avatar's entry on session end. No error if absent.
    pub fn remove(&self, avatar: Uuid) {
        let mut balances = self.balances.lock().unwrap_or_else(|e| e.into_inner());
        balances.remove(&avatar);
    }
}

impl Default for BalanceCache {
    fn default() -> Self {
        Self::new()
    }
}
