// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Wire Protocol Types
//!
//! The gateway speaks flat string-keyed mappings in both directions. This
//! module is the thin serialization boundary between that wire form and the
//! typed request/notification structures the rest of the crate works with:
//! outbound structs flatten via `into_params()`, inbound notifications parse
//! via `from_params()`.
//!
//! Every outbound mapping carries a `method` discriminator; inbound calls
//! are routed solely by that discriminator after authentication.

use std::collections::HashMap;

use uuid::Uuid;

use crate::error::ProtocolError;

/// Flat string-keyed mapping, the wire payload in both directions.
/// Key order is irrelevant; the transport hash sorts before digesting.
pub type Params = HashMap<String, String>;

// =============================================================================
// Field access helpers
// =============================================================================

pub(crate) fn require<'a>(
    params: &'a Params,
    field: &'static str,
) -> Result<&'a str, ProtocolError> {
    params
        .get(field)
        .map(String::as_str)
        .ok_or(ProtocolError::MissingField(field))
}

pub(crate) fn require_uuid(params: &Params, field: &'static str) -> Result<Uuid, ProtocolError> {
    let raw = require(params, field)?;
    raw.parse()
        .map_err(|_| ProtocolError::InvalidField(field, raw.to_string()))
}

pub(crate) fn require_i64(params: &Params, field: &'static str) -> Result<i64, ProtocolError> {
    let raw = require(params, field)?;
    raw.parse()
        .map_err(|_| ProtocolError::InvalidField(field, raw.to_string()))
}

pub(crate) fn require_i32(params: &Params, field: &'static str) -> Result<i32, ProtocolError> {
    let raw = require(params, field)?;
    raw.parse()
        .map_err(|_| ProtocolError::InvalidField(field, raw.to_string()))
}

pub(crate) fn require_u32(params: &Params, field: &'static str) -> Result<u32, ProtocolError> {
    let raw = require(params, field)?;
    raw.parse()
        .map_err(|_| ProtocolError::InvalidField(field, raw.to_string()))
}

/// Boolean flags arrive as `"1"`/`"0"` or `"TRUE"`/`"FALSE"`.
pub(crate) fn require_flag(params: &Params, field: &'static str) -> Result<bool, ProtocolError> {
    let raw = require(params, field)?;
    match raw {
        "1" | "TRUE" | "true" => Ok(true),
        "0" | "FALSE" | "false" => Ok(false),
        other => Err(ProtocolError::InvalidField(field, other.to_string())),
    }
}

/// `success` values in gateway responses are affirmative as `"TRUE"` or `"1"`.
pub(crate) fn is_affirmative(value: &str) -> bool {
    value == "TRUE" || value == "1" || value == "true"
}

// =============================================================================
// Transaction and notification codes
// =============================================================================

/// Economic acts this core can transmit. A closed set with fixed wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionType {
    BuyObject,
    Gift,
    PayObject,
    ObjectPays,
    BuyLand,
}

impl TransactionType {
    /// Gateway ledger code for this transaction type.
    pub fn code(self) -> i32 {
        match self {
            TransactionType::BuyObject => 5000,
            TransactionType::Gift => 5001,
            TransactionType::PayObject => 5008,
            TransactionType::ObjectPays => 5009,
            TransactionType::BuyLand => 5013,
        }
    }
}

/// Delivery channel for a user notification fetched from the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    LoadUrl,
    InstantMessage,
    Alert,
    Dialog,
    GiveNotecard,
    ChatMessage,
}

impl NotificationKind {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(NotificationKind::LoadUrl),
            2 => Some(NotificationKind::InstantMessage),
            3 => Some(NotificationKind::Alert),
            4 => Some(NotificationKind::Dialog),
            5 => Some(NotificationKind::GiveNotecard),
            6 => Some(NotificationKind::ChatMessage),
            _ => None,
        }
    }
}

// =============================================================================
// Inbound envelope
// =============================================================================

/// Communication-authentication half of an inbound call. Consumed once per
/// call, never persisted.
#[derive(Debug, Clone)]
pub struct NotificationEnvelope {
    pub hash_value: String,
    pub region: Uuid,
    pub nonce: u32,
    pub notification_id: String,
}

impl NotificationEnvelope {
    pub fn from_params(params: &Params) -> Result<Self, ProtocolError> {
        Ok(Self {
            hash_value: require(params, "hashValue")?.to_string(),
            region: require_uuid(params, "regionUUID")?,
            nonce: require_u32(params, "nonce")?,
            notification_id: require(params, "notificationID")?.to_string(),
        })
    }
}

// =============================================================================
// Outbound requests
// =============================================================================

/// Region registration handshake.
#[derive(Debug, Clone)]
pub struct InitializeRegion {
    pub region: Uuid,
    pub region_ip: String,
    pub region_name: String,
    pub grid_url: String,
    pub simulator_version: String,
    pub module_version: String,
}

impl InitializeRegion {
    pub fn into_params(self) -> Params {
        let mut p = Params::new();
        p.insert("method".to_string(), "initializeRegion".to_string());
        p.insert("regionIP".to_string(), self.region_ip);
        p.insert("regionName".to_string(), self.region_name);
        p.insert("regionUUID".to_string(), self.region.to_string());
        p.insert("gridURL".to_string(), self.grid_url);
        p.insert("simulatorVersion".to_string(), self.simulator_version);
        p.insert("moduleVersion".to_string(), self.module_version);
        p
    }
}

/// Farewell for every region registered by this process.
#[derive(Debug, Clone)]
pub struct CloseRegion {
    pub grid_url: String,
    pub regions: Vec<Uuid>,
}

impl CloseRegion {
    pub fn into_params(self) -> Params {
        let regions: Vec<String> = self.regions.iter().map(Uuid::to_string).collect();
        let mut p = Params::new();
        p.insert("method".to_string(), "closeRegion".to_string());
        p.insert("gridURL".to_string(), self.grid_url);
        p.insert(
            "regions".to_string(),
            serde_json::to_string(&regions).unwrap_or_else(|_| "[]".to_string()),
        );
        p
    }
}

/// One-time grid activation, driven by an operator command.
#[derive(Debug, Clone)]
pub struct RegisterGrid {
    pub short_name: String,
    pub long_name: String,
    pub description: String,
    pub grid_url: String,
}

impl RegisterGrid {
    pub fn into_params(self) -> Params {
        let mut p = Params::new();
        p.insert("method".to_string(), "registerScript".to_string());
        p.insert("gridShortName".to_string(), self.short_name);
        p.insert("gridLongName".to_string(), self.long_name);
        p.insert("gridDescription".to_string(), self.description);
        p.insert("gridURL".to_string(), self.grid_url);
        p
    }
}

/// Avatar-entered-world claim. The single intentionally fire-and-forget call.
#[derive(Debug, Clone)]
pub struct ClaimAvatar {
    pub avatar: Uuid,
    pub avatar_name: String,
    pub language: String,
    pub viewer: String,
    pub client_ip: String,
    pub region: Uuid,
    pub region_ip: String,
    pub grid_url: String,
}

impl ClaimAvatar {
    pub fn into_params(self) -> Params {
        let mut p = Params::new();
        p.insert("method".to_string(), "claimUser".to_string());
        p.insert("avatarUUID".to_string(), self.avatar.to_string());
        p.insert("avatarName".to_string(), self.avatar_name);
        p.insert("language".to_string(), self.language);
        p.insert("viewer".to_string(), self.viewer);
        p.insert("clientIP".to_string(), self.client_ip);
        p.insert("regionUUID".to_string(), self.region.to_string());
        p.insert("gridURL".to_string(), self.grid_url);
        p.insert("regionIP".to_string(), self.region_ip);
        p
    }
}

#[derive(Debug, Clone)]
pub struct LeaveAvatar {
    pub avatar: Uuid,
    pub region: Uuid,
}

impl LeaveAvatar {
    pub fn into_params(self) -> Params {
        let mut p = Params::new();
        p.insert("method".to_string(), "leaveUser".to_string());
        p.insert("avatarUUID".to_string(), self.avatar.to_string());
        p.insert("regionUUID".to_string(), self.region.to_string());
        p
    }
}

/// One economic act. The `extra` mapping carries type-specific metadata
/// (object fields for object transactions, parcel fields for land buys).
#[derive(Debug, Clone)]
pub struct TransferMoney {
    pub sender: Uuid,
    pub sender_name: String,
    pub receiver: Uuid,
    pub receiver_name: String,
    pub amount: i64,
    pub kind: TransactionType,
    /// Region the gateway attributes the transaction to. For OBJECT_PAYS
    /// this is the receiver's current region, for everything else the
    /// sender's.
    pub region: Uuid,
    pub grid_url: String,
    pub extra: Params,
}

impl TransferMoney {
    pub fn into_params(self) -> Params {
        let mut p = Params::new();
        p.insert("method".to_string(), "transferMoney".to_string());
        p.insert("senderUUID".to_string(), self.sender.to_string());
        p.insert("senderName".to_string(), self.sender_name);
        p.insert("recipientUUID".to_string(), self.receiver.to_string());
        p.insert("recipientName".to_string(), self.receiver_name);
        p.insert("amount".to_string(), self.amount.to_string());
        p.insert("transactionType".to_string(), self.kind.code().to_string());
        p.insert("regionUUID".to_string(), self.region.to_string());
        p.insert("gridURL".to_string(), self.grid_url);
        p.extend(self.extra);
        p
    }
}

/// Signed secret fetch used to authenticate one inbound notification.
#[derive(Debug, Clone)]
pub struct VerifyNotification {
    pub notification_id: String,
    pub region: Uuid,
    pub hash_value: String,
}

impl VerifyNotification {
    pub fn into_params(self) -> Params {
        let mut p = Params::new();
        p.insert("method".to_string(), "verifyNotification".to_string());
        p.insert("notificationID".to_string(), self.notification_id);
        p.insert("regionUUID".to_string(), self.region.to_string());
        p.insert("hashValue".to_string(), self.hash_value);
        p
    }
}

/// Script debit permission grant or revocation for one inventory item.
#[derive(Debug, Clone)]
pub struct DebitPermission {
    pub object: Uuid,
    pub object_name: String,
    pub object_description: String,
    pub object_location: String,
    pub owner: Uuid,
    pub region: Uuid,
    pub grid_url: String,
    pub item: Uuid,
    pub item_name: String,
    /// Raw permission answer from the script dialog; bit 0x2 grants debit.
    pub answer: i32,
}

impl DebitPermission {
    pub fn allows_debit(&self) -> bool {
        self.answer & 0x2 == 0x2
    }

    pub fn into_params(self) -> Params {
        let method = if self.allows_debit() {
            "allowPrimDebit"
        } else {
            "removePrimDebit"
        };
        let items: HashMap<String, [String; 2]> = HashMap::from([(
            self.item.to_string(),
            [self.answer.to_string(), self.item_name.clone()],
        )]);

        let mut p = Params::new();
        p.insert("method".to_string(), method.to_string());
        p.insert("primUUID".to_string(), self.object.to_string());
        p.insert("primName".to_string(), self.object_name);
        p.insert("primDescription".to_string(), self.object_description);
        p.insert("primLocation".to_string(), self.object_location);
        p.insert("parentUUID".to_string(), self.owner.to_string());
        p.insert("regionUUID".to_string(), self.region.to_string());
        p.insert("gridURL".to_string(), self.grid_url);
        p.insert(
            "inventoryItems".to_string(),
            serde_json::to_string(&items).unwrap_or_else(|_| "{}".to_string()),
        );
        p
    }
}

/// Single-field detail fetches: the initial inbound notification carries
/// only a correlation identifier; the full payload is fetched from the
/// gateway, the single source of transaction detail.
pub(crate) fn detail_fetch(method: &str, id: &str) -> Params {
    let mut p = Params::new();
    p.insert("method".to_string(), method.to_string());
    p.insert("id".to_string(), id.to_string());
    p
}

/// Message-body fetch for a user notification. Unlike the transaction
/// detail fetches this one is keyed by `payloadID`, not `id`.
pub(crate) fn message_fetch(payload_id: &str) -> Params {
    let mut p = Params::new();
    p.insert("method".to_string(), "getNotificationMessage".to_string());
    p.insert("payloadID".to_string(), payload_id.to_string());
    p
}

pub(crate) fn simple_call(method: &str) -> Params {
    let mut p = Params::new();
    p.insert("method".to_string(), method.to_string());
    p
}

// =============================================================================
// Inbound notifications (typed parses)
// =============================================================================

/// Confirmed balance fact pushed by the gateway.
#[derive(Debug, Clone, Copy)]
pub struct BalanceUpdate {
    pub avatar: Uuid,
    pub balance: i64,
}

impl BalanceUpdate {
    pub fn from_params(params: &Params) -> Result<Self, ProtocolError> {
        Ok(Self {
            avatar: require_uuid(params, "avatarUUID")?,
            balance: require_i64(params, "balance")?,
        })
    }
}

/// User-notification header; the message body is fetched separately.
#[derive(Debug, Clone)]
pub struct UserNotification {
    pub receiver: Uuid,
    pub kind_code: i32,
    pub payload_id: String,
}

impl UserNotification {
    pub fn from_params(params: &Params) -> Result<Self, ProtocolError> {
        Ok(Self {
            receiver: require_uuid(params, "receiverUUID")?,
            kind_code: require_i32(params, "type")?,
            payload_id: require(params, "payloadID")?.to_string(),
        })
    }
}

/// Correlation identifier carried by delivery/payment/land-buy notices.
#[derive(Debug, Clone)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn from_params(params: &Params) -> Result<Self, ProtocolError> {
        Ok(Self(require(params, "id")?.to_string()))
    }
}

/// Permission change for scripted inventory items in one object.
#[derive(Debug, Clone)]
pub struct PrimPermissionChange {
    pub object: Uuid,
    /// item id -> raw permission value; `"0"` revokes.
    pub inventory_items: HashMap<String, String>,
}

impl PrimPermissionChange {
    pub fn from_params(params: &Params) -> Result<Self, ProtocolError> {
        let raw = require(params, "inventoryItems")?;
        let inventory_items: HashMap<String, String> = serde_json::from_str(raw)
            .map_err(|_| ProtocolError::InvalidField("inventoryItems", raw.to_string()))?;
        Ok(Self {
            object: require_uuid(params, "primUUID")?,
            inventory_items,
        })
    }
}

// =============================================================================
// Detail payloads (second round trips)
// =============================================================================

/// Full object-delivery detail, fetched by correlation id.
#[derive(Debug, Clone)]
pub struct DeliveryDetail {
    pub local_id: u32,
    pub receiver: Uuid,
    pub category: Uuid,
    pub sale_type: u8,
    pub sale_price: i64,
}

impl DeliveryDetail {
    pub fn from_params(params: &Params) -> Result<Self, ProtocolError> {
        let sale_type_raw = require(params, "saleType")?;
        let sale_type: u8 = sale_type_raw
            .parse()
            .map_err(|_| ProtocolError::InvalidField("saleType", sale_type_raw.to_string()))?;
        // salePrice is omitted for free deliveries.
        let sale_price = match params.get("salePrice") {
            Some(_) => require_i64(params, "salePrice")?,
            None => 0,
        };
        Ok(Self {
            local_id: require_u32(params, "localID")?,
            receiver: require_uuid(params, "receiverUUID")?,
            category: require_uuid(params, "categoryID")?,
            sale_type,
            sale_price,
        })
    }
}

/// Full object-payment detail, fetched by correlation id.
#[derive(Debug, Clone, Copy)]
pub struct ObjectPaymentDetail {
    pub object: Uuid,
    pub sender: Uuid,
    pub amount: i64,
}

impl ObjectPaymentDetail {
    pub fn from_params(params: &Params) -> Result<Self, ProtocolError> {
        Ok(Self {
            object: require_uuid(params, "primUUID")?,
            sender: require_uuid(params, "senderUUID")?,
            amount: require_i64(params, "amount")?,
        })
    }
}

/// Full land-sale detail, fetched by correlation id.
#[derive(Debug, Clone)]
pub struct LandSaleDetail {
    pub buyer: Uuid,
    pub parcel_local_id: i32,
    pub transaction_id: i32,
    pub amount_debited: i64,
    pub finalized: bool,
    pub authenticated: bool,
    pub remove_contribution: bool,
    pub region: Uuid,
}

impl LandSaleDetail {
    pub fn from_params(params: &Params) -> Result<Self, ProtocolError> {
        Ok(Self {
            buyer: require_uuid(params, "senderUUID")?,
            parcel_local_id: require_i32(params, "parcelLocalID")?,
            transaction_id: require_i32(params, "transactionID")?,
            amount_debited: require_i64(params, "amountDebited")?,
            finalized: require_flag(params, "final")?,
            authenticated: require_flag(params, "authenticated")?,
            remove_contribution: require_flag(params, "removeContribution")?,
            region: require_uuid(params, "regionUUID")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn transaction_codes_are_stable() {
        assert_eq!(TransactionType::BuyObject.code(), 5000);
        assert_eq!(TransactionType::Gift.code(), 5001);
        assert_eq!(TransactionType::PayObject.code(), 5008);
        assert_eq!(TransactionType::ObjectPays.code(), 5009);
        assert_eq!(TransactionType::BuyLand.code(), 5013);
    }

    #[test]
    fn notification_kinds_map_from_wire_codes() {
        assert_eq!(NotificationKind::from_code(1), Some(NotificationKind::LoadUrl));
        assert_eq!(NotificationKind::from_code(6), Some(NotificationKind::ChatMessage));
        assert_eq!(NotificationKind::from_code(7), None);
    }

    #[test]
    fn envelope_parses_all_four_fields() {
        let region = Uuid::new_v4();
        let p = params(&[
            ("hashValue", "abcd"),
            ("regionUUID", &region.to_string()),
            ("nonce", "17"),
            ("notificationID", "n-9"),
        ]);
        let envelope = NotificationEnvelope::from_params(&p).unwrap();
        assert_eq!(envelope.hash_value, "abcd");
        assert_eq!(envelope.region, region);
        assert_eq!(envelope.nonce, 17);
        assert_eq!(envelope.notification_id, "n-9");
    }

    #[test]
    fn envelope_rejects_missing_nonce() {
        let p = params(&[
            ("hashValue", "abcd"),
            ("regionUUID", &Uuid::new_v4().to_string()),
            ("notificationID", "n-9"),
        ]);
        assert!(matches!(
            NotificationEnvelope::from_params(&p),
            Err(ProtocolError::MissingField("nonce"))
        ));
    }

    #[test]
    fn transfer_flattens_with_method_and_extras() {
        let sender = Uuid::new_v4();
        let receiver = Uuid::new_v4();
        let region = Uuid::new_v4();
        let transfer = TransferMoney {
            sender,
            sender_name: "Ada Lovelace".to_string(),
            receiver,
            receiver_name: "Charles Babbage".to_string(),
            amount: 100,
            kind: TransactionType::PayObject,
            region,
            grid_url: "http://grid.example.com/".to_string(),
            extra: params(&[("primName", "Vendor")]),
        };

        let p = transfer.into_params();
        assert_eq!(p.get("method").unwrap(), "transferMoney");
        assert_eq!(p.get("transactionType").unwrap(), "5008");
        assert_eq!(p.get("senderUUID").unwrap(), &sender.to_string());
        assert_eq!(p.get("recipientUUID").unwrap(), &receiver.to_string());
        assert_eq!(p.get("regionUUID").unwrap(), &region.to_string());
        assert_eq!(p.get("primName").unwrap(), "Vendor");
    }

    #[test]
    fn debit_permission_picks_method_from_answer_bit() {
        let base = DebitPermission {
            object: Uuid::new_v4(),
            object_name: "box".to_string(),
            object_description: String::new(),
            object_location: "region/1/2/3".to_string(),
            owner: Uuid::new_v4(),
            region: Uuid::new_v4(),
            grid_url: "http://grid.example.com/".to_string(),
            item: Uuid::new_v4(),
            item_name: "script".to_string(),
            answer: 2,
        };
        let revoked = DebitPermission { answer: 0, ..base.clone() };

        assert_eq!(base.into_params().get("method").unwrap(), "allowPrimDebit");
        assert_eq!(
            revoked.into_params().get("method").unwrap(),
            "removePrimDebit"
        );
    }

    #[test]
    fn balance_update_parses_and_rejects_garbage() {
        let avatar = Uuid::new_v4();
        let good = params(&[("avatarUUID", &avatar.to_string()), ("balance", "250")]);
        let update = BalanceUpdate::from_params(&good).unwrap();
        assert_eq!(update.avatar, avatar);
        assert_eq!(update.balance, 250);

        let bad = params(&[("avatarUUID", "not-a-uuid"), ("balance", "250")]);
        assert!(BalanceUpdate::from_params(&bad).is_err());
    }

    #[test]
    fn land_sale_detail_parses_flags() {
        let buyer = Uuid::new_v4();
        let region = Uuid::new_v4();
        let p = params(&[
            ("senderUUID", &buyer.to_string()),
            ("parcelLocalID", "12"),
            ("transactionID", "77"),
            ("amountDebited", "300"),
            ("final", "1"),
            ("authenticated", "0"),
            ("removeContribution", "1"),
            ("regionUUID", &region.to_string()),
        ]);
        let detail = LandSaleDetail::from_params(&p).unwrap();
        assert!(detail.finalized);
        assert!(!detail.authenticated);
        assert!(detail.remove_contribution);
        assert_eq!(detail.amount_debited, 300);
    }

    #[test]
    fn delivery_detail_defaults_missing_sale_price() {
        let p = params(&[
            ("localID", "42"),
            ("receiverUUID", &Uuid::new_v4().to_string()),
            ("categoryID", &Uuid::new_v4().to_string()),
            ("saleType", "2"),
        ]);
        let detail = DeliveryDetail::from_params(&p).unwrap();
        assert_eq!(detail.sale_price, 0);
        assert_eq!(detail.local_id, 42);
    }
}
