// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP surface for inbound gateway notifications.
//!
//! Two POST routes, one per notification channel. The body is a two-element
//! JSON array: domain parameters first, authentication parameters second.
//! Scalar values are accepted and stringified; anything else about the
//! envelope that does not parse becomes the generic fault reply, the same
//! one every authentication failure produces.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;
use tracing::warn;

use crate::dispatch::{DispatchReply, NotificationDispatcher};
use crate::protocol::Params;

/// Shared handles to the two channel dispatchers.
#[derive(Clone)]
pub struct ApiState {
    pub base: Arc<NotificationDispatcher>,
    pub currency: Arc<NotificationDispatcher>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/notifications/base", post(base_notifications))
        .route("/notifications/currency", post(currency_notifications))
        .with_state(state)
}

async fn base_notifications(
    State(state): State<ApiState>,
    Json(body): Json<Value>,
) -> Json<DispatchReply> {
    dispatch_call(&state.base, body).await
}

async fn currency_notifications(
    State(state): State<ApiState>,
    Json(body): Json<Value>,
) -> Json<DispatchReply> {
    dispatch_call(&state.currency, body).await
}

async fn dispatch_call(dispatcher: &NotificationDispatcher, body: Value) -> Json<DispatchReply> {
    let halves = body.as_array().map(Vec::as_slice);
    let Some([domain, auth]) = halves else {
        warn!("notification body is not a two-element array");
        return Json(DispatchReply::fault());
    };
    let (Some(domain), Some(auth)) = (decode_mapping(domain), decode_mapping(auth)) else {
        warn!("notification body carried a non-scalar mapping");
        return Json(DispatchReply::fault());
    };

    Json(dispatcher.dispatch(domain, auth).await)
}

/// Flatten one JSON object into a string mapping, stringifying scalars.
fn decode_mapping(value: &Value) -> Option<Params> {
    let object = value.as_object()?;
    let mut params = Params::new();
    for (key, value) in object {
        let text = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => String::new(),
            _ => return None,
        };
        params.insert(key.clone(), text);
    }
    Some(params)
}
