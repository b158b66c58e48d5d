// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Inbound reconciliation handlers.
//!
//! Gateway-confirmed economic facts arrive on two notification channels and
//! become local effects here. Notices carry only a correlation identifier;
//! the authoritative payload is fetched back from the gateway before any
//! local state changes, so a notification can never smuggle transaction
//! detail past the signed detail fetch.
//!
//! Handlers swallow their own failures: any error is logged locally and
//! collapsed into a `success: false` result, never a transport fault.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::MODULE_VERSION;
use crate::dispatch::{
    failure_result, success_result, HandlerResult, NotificationDispatcher, NotificationHandler,
};
use crate::error::{GatewayError, ProtocolError};
use crate::protocol::{
    detail_fetch, is_affirmative, message_fetch, require, BalanceUpdate, CorrelationId,
    DeliveryDetail, LandSaleDetail, NotificationKind, ObjectPaymentDetail, Params,
    PrimPermissionChange, UserNotification,
};
use crate::transport::Authenticator;
use crate::world::LandSale;

use super::EconomyOrchestrator;

/// Decompose a permission bitmask into its set bits, descending by value:
/// `25` becomes `[16, 8, 1]`.
pub fn slice_bits(mask: u32) -> Vec<u32> {
    let mut bits = Vec::new();
    let mut bit = 1u32 << 31;
    while bit > 0 {
        if mask & bit != 0 {
            bits.push(bit);
        }
        bit >>= 1;
    }
    bits
}

#[derive(Debug, Clone, Copy)]
enum InboundMethod {
    NotifyUser,
    WriteLog,
    IsAlive,
    DeliverObject,
    ObjectPaid,
    LandBuy,
    PrimPermission,
    BalanceUpdate,
    GetVersion,
}

/// Adapter binding one inbound method to its orchestrator routine.
struct InboundHandler {
    orchestrator: Arc<EconomyOrchestrator>,
    method: InboundMethod,
    name: &'static str,
}

#[async_trait]
impl NotificationHandler for InboundHandler {
    async fn handle(&self, params: Params) -> HandlerResult {
        let orchestrator = &self.orchestrator;
        let outcome = match self.method {
            InboundMethod::NotifyUser => orchestrator.notify_user(params).await,
            InboundMethod::WriteLog => orchestrator.write_remote_log(params),
            InboundMethod::IsAlive => orchestrator.confirm_alive(params),
            InboundMethod::DeliverObject => orchestrator.deliver_object(params).await,
            InboundMethod::ObjectPaid => orchestrator.object_paid(params).await,
            InboundMethod::LandBuy => orchestrator.complete_land_buy(params).await,
            InboundMethod::PrimPermission => orchestrator.change_prim_permission(params),
            InboundMethod::BalanceUpdate => orchestrator.apply_balance_update(params),
            InboundMethod::GetVersion => orchestrator.report_version(),
        };
        match outcome {
            Ok(result) => result,
            Err(e) => {
                error!(method = self.name, error = %e, "inbound notification failed");
                failure_result()
            }
        }
    }
}

fn bind(
    dispatcher: &mut NotificationDispatcher,
    orchestrator: &Arc<EconomyOrchestrator>,
    name: &'static str,
    method: InboundMethod,
) {
    dispatcher.register(
        name,
        Arc::new(InboundHandler {
            orchestrator: Arc::clone(orchestrator),
            method,
            name,
        }),
    );
}

/// Base notification channel: user messaging and liveness.
pub fn base_channel(
    orchestrator: Arc<EconomyOrchestrator>,
    authenticator: Authenticator,
) -> NotificationDispatcher {
    let mut dispatcher = NotificationDispatcher::new("base", authenticator);
    bind(&mut dispatcher, &orchestrator, "notifyUser", InboundMethod::NotifyUser);
    bind(&mut dispatcher, &orchestrator, "writeLog", InboundMethod::WriteLog);
    bind(&mut dispatcher, &orchestrator, "notifyIsAlive", InboundMethod::IsAlive);
    dispatcher
}

/// Currency notification channel: transaction reconciliation.
pub fn currency_channel(
    orchestrator: Arc<EconomyOrchestrator>,
    authenticator: Authenticator,
) -> NotificationDispatcher {
    let mut dispatcher = NotificationDispatcher::new("currency", authenticator);
    bind(
        &mut dispatcher,
        &orchestrator,
        "notifyDeliverObject",
        InboundMethod::DeliverObject,
    );
    bind(
        &mut dispatcher,
        &orchestrator,
        "notifyOnObjectPaid",
        InboundMethod::ObjectPaid,
    );
    bind(&mut dispatcher, &orchestrator, "notifyLandBuy", InboundMethod::LandBuy);
    bind(
        &mut dispatcher,
        &orchestrator,
        "notifyChangePrimPermission",
        InboundMethod::PrimPermission,
    );
    bind(
        &mut dispatcher,
        &orchestrator,
        "notifyBalanceUpdate",
        InboundMethod::BalanceUpdate,
    );
    bind(&mut dispatcher, &orchestrator, "notifyGetVersion", InboundMethod::GetVersion);
    dispatcher
}

impl EconomyOrchestrator {
    /// Deliver a gateway-originated message to a local avatar over the
    /// channel the payload selects (URL, chat, alert, dialog, IM).
    async fn notify_user(&self, params: Params) -> Result<HandlerResult, GatewayError> {
        let note = UserNotification::from_params(&params)?;
        let kind = NotificationKind::from_code(note.kind_code).ok_or(
            ProtocolError::InvalidField("type", note.kind_code.to_string()),
        )?;
        if self.world.sessions.session(note.receiver).is_none() {
            return Err(GatewayError::precondition(format!(
                "avatar {} is not in this simulator",
                note.receiver
            )));
        }

        let payload = self.client.call(message_fetch(&note.payload_id)).await?;
        let message = require(&payload, "message")?;

        let sender: Uuid = payload
            .get("senderUUID")
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(Uuid::nil);
        let sender_name = payload
            .get("senderName")
            .cloned()
            .unwrap_or_else(|| self.display_name(sender));
        let sender_is_local =
            !sender.is_nil() && self.world.sessions.session(sender).is_some();

        match kind {
            NotificationKind::LoadUrl => {
                let url = require(&payload, "url")?;
                self.world.events.send_url(note.receiver, message, url);
            }
            NotificationKind::ChatMessage => {
                self.world
                    .events
                    .send_chat(note.receiver, sender, &sender_name, message);
                // Echo to the sender so their chat log shows the line.
                if sender_is_local && sender != note.receiver {
                    self.world
                        .events
                        .send_chat(sender, sender, &sender_name, message);
                }
            }
            NotificationKind::Alert => {
                self.world.events.send_alert(note.receiver, message);
            }
            NotificationKind::Dialog => {
                self.world.events.send_dialog(note.receiver, message);
            }
            NotificationKind::GiveNotecard => {
                // Notecard content travels through the asset pipeline; the
                // notification is acknowledged only.
                info!(receiver = %note.receiver, "notecard notification acknowledged");
            }
            NotificationKind::InstantMessage => {
                let session_id: Uuid = payload
                    .get("sessionUUID")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(Uuid::nil);
                self.world.events.send_instant_message(
                    note.receiver,
                    sender,
                    &sender_name,
                    session_id,
                    message,
                );
                if sender_is_local && sender != note.receiver {
                    self.world.events.send_instant_message(
                        sender,
                        sender,
                        &sender_name,
                        session_id,
                        message,
                    );
                }
            }
        }
        Ok(success_result())
    }

    /// The gateway writes into the simulator's log for operator visibility.
    fn write_remote_log(&self, params: Params) -> Result<HandlerResult, GatewayError> {
        let message = require(&params, "message")?;
        error!(source = "gateway", "{message}");
        Ok(success_result())
    }

    /// Liveness probe. With an `avatarUUID` this confirms the avatar's
    /// presence; without one it confirms the simulator itself and reports
    /// the module version.
    fn confirm_alive(&self, params: Params) -> Result<HandlerResult, GatewayError> {
        match params.get("avatarUUID") {
            None => {
                let mut result = success_result();
                result.insert(
                    "version".to_string(),
                    Value::String(MODULE_VERSION.to_string()),
                );
                Ok(result)
            }
            Some(raw) => {
                let avatar: Uuid = raw
                    .parse()
                    .map_err(|_| ProtocolError::InvalidField("avatarUUID", raw.clone()))?;
                if self.world.sessions.session(avatar).is_some() {
                    Ok(success_result())
                } else {
                    Ok(failure_result())
                }
            }
        }
    }

    /// Deliver a bought object once the gateway confirms payment. The
    /// authoritative sale parameters come from the detail fetch, not the
    /// notification.
    async fn deliver_object(&self, params: Params) -> Result<HandlerResult, GatewayError> {
        let id = CorrelationId::from_params(&params)?;
        let payload = self.client.call(detail_fetch("deliverObject", &id.0)).await?;

        if !payload.get("success").is_some_and(|s| is_affirmative(s)) {
            return Err(GatewayError::precondition(format!(
                "the gateway did not confirm delivery {}",
                id.0
            )));
        }
        let detail = DeliveryDetail::from_params(&payload)?;
        if self.world.sessions.session(detail.receiver).is_none() {
            return Err(GatewayError::precondition(format!(
                "buyer {} is not in this simulator",
                detail.receiver
            )));
        }

        self.world.sales.complete_sale(
            detail.receiver,
            detail.category,
            detail.local_id,
            detail.sale_type,
            detail.sale_price,
        )?;
        Ok(success_result())
    }

    /// Fire the object-paid script event once the gateway confirms a
    /// payment into a scripted object.
    async fn object_paid(&self, params: Params) -> Result<HandlerResult, GatewayError> {
        let id = CorrelationId::from_params(&params)?;
        let payload = self.client.call(detail_fetch("objectPaid", &id.0)).await?;
        let detail = ObjectPaymentDetail::from_params(&payload)?;

        if self.world.sessions.session(detail.sender).is_none() {
            return Err(GatewayError::precondition(format!(
                "payer {} is not in this simulator",
                detail.sender
            )));
        }
        self.world
            .events
            .object_paid(detail.object, detail.sender, detail.amount);
        Ok(success_result())
    }

    /// Step 3 of the land purchase: the gateway confirms the debit and the
    /// purchase completes locally against live parcel state.
    async fn complete_land_buy(&self, params: Params) -> Result<HandlerResult, GatewayError> {
        let id = CorrelationId::from_params(&params)?;
        let payload = self.client.call(detail_fetch("buyLand", &id.0)).await?;
        let detail = LandSaleDetail::from_params(&payload)?;

        if self.world.sessions.session(detail.buyer).is_none() {
            return Err(GatewayError::precondition(format!(
                "buyer {} is not in this simulator",
                detail.buyer
            )));
        }
        let parcel = self
            .world
            .land
            .parcel(detail.region, detail.parcel_local_id)
            .ok_or_else(|| {
                GatewayError::precondition(format!(
                    "could not find parcel {} in region {}",
                    detail.parcel_local_id, detail.region
                ))
            })?;

        let mut sale = LandSale {
            buyer: detail.buyer,
            region: detail.region,
            parcel_local_id: detail.parcel_local_id,
            parcel_owner: parcel.owner,
            group: parcel.group,
            group_owned: parcel.group_owned,
            parcel_area: parcel.area,
            parcel_price: parcel.sale_price,
            amount_debited: detail.amount_debited,
            transaction_id: detail.transaction_id,
            finalized: detail.finalized,
            authenticated: detail.authenticated,
            remove_contribution: detail.remove_contribution,
            economy_validated: false,
        };
        self.world.land.validate(&mut sale);
        sale.economy_validated = true;
        self.world.land.complete(&sale);
        Ok(success_result())
    }

    /// Apply a gateway-side permission decision to scripted inventory
    /// items. A value of `"0"` revokes; anything else grants that mask.
    fn change_prim_permission(&self, params: Params) -> Result<HandlerResult, GatewayError> {
        let change = PrimPermissionChange::from_params(&params)?;
        if self.world.objects.find(change.object).is_none() {
            return Err(GatewayError::precondition(format!(
                "could not find prim {}",
                change.object
            )));
        }

        for (raw_item, value) in &change.inventory_items {
            let item: Uuid = raw_item
                .parse()
                .map_err(|_| ProtocolError::InvalidField("inventoryItems", raw_item.clone()))?;
            if value == "0" {
                self.world.objects.remove_script_events(change.object, item)?;
            } else {
                let mask: i32 = value
                    .parse()
                    .map_err(|_| ProtocolError::InvalidField("inventoryItems", value.clone()))?;
                debug!(object = %change.object, %item, bits = ?slice_bits(mask as u32),
                    "granting script events");
                self.world.objects.set_script_events(change.object, item, mask)?;
            }
        }
        Ok(success_result())
    }

    /// Apply a confirmed balance. The cache only ever moves on this path;
    /// an absent session leaves it untouched.
    fn apply_balance_update(&self, params: Params) -> Result<HandlerResult, GatewayError> {
        let update = BalanceUpdate::from_params(&params)?;
        if self.world.sessions.session(update.avatar).is_none() {
            warn!(avatar = %update.avatar, "balance update for an absent avatar dropped");
            return Ok(failure_result());
        }
        self.balances.set(update.avatar, update.balance);
        self.world.events.push_balance(update.avatar, update.balance);
        Ok(success_result())
    }

    fn report_version(&self) -> Result<HandlerResult, GatewayError> {
        let mut result = success_result();
        result.insert(
            "version".to_string(),
            Value::String(MODULE_VERSION.to_string()),
        );
        Ok(result)
    }
}
