// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Transaction Orchestrator
//!
//! Bidirectional mapping between domain economic events and gateway calls.
//! Outbound: domain events (object payment, land purchase, gift, object
//! sale, script permission change) become signed gateway requests with
//! event-specific metadata. Inbound: gateway-confirmed economic facts become
//! local effects (balance push, object delivery, land-buy completion); those
//! handlers live in [`handlers`].
//!
//! A failed round trip is surfaced once as unavailability: the transaction
//! is treated as not-happened, nothing was locally committed, and no retry
//! is attempted here. Retry cadence belongs to the operator.

pub mod handlers;

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::balance::BalanceCache;
use crate::config::{MODULE_NAME, MODULE_VERSION};
use crate::error::{GatewayError, ProtocolError};
use crate::protocol::{
    is_affirmative, require, simple_call, ClaimAvatar, CloseRegion, DebitPermission,
    InitializeRegion, LeaveAvatar, Params, RegisterGrid, TransactionType, TransferMoney,
};
use crate::secrets::RegionSecrets;
use crate::transport::GatewayClient;
use crate::world::{LandSale, WorldHandles};

/// Notice shown to a local avatar when the gateway is unreachable.
pub const SERVICE_UNAVAILABLE: &str =
    "The currency service is not available. Please try again later.";

/// One domain-level economic act to transmit.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub sender: Uuid,
    pub receiver: Uuid,
    pub amount: i64,
    pub kind: TransactionType,
    /// Type-specific metadata merged into the wire mapping.
    pub extra: Params,
}

/// Viewer-facing currency purchase quote, or the gateway's charge-account
/// instruction when no quote can be computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CurrencyQuote {
    Quote {
        currency_to_buy: i64,
        estimated_cost: i64,
    },
    ChargeAccount {
        message: String,
        uri: String,
    },
}

pub struct EconomyOrchestrator {
    client: GatewayClient,
    secrets: Arc<RegionSecrets>,
    balances: Arc<BalanceCache>,
    world: WorldHandles,
    grid_url: String,
    simulator_version: String,
}

impl EconomyOrchestrator {
    pub fn new(
        client: GatewayClient,
        secrets: Arc<RegionSecrets>,
        balances: Arc<BalanceCache>,
        world: WorldHandles,
        grid_url: String,
        simulator_version: String,
    ) -> Self {
        Self {
            client,
            secrets,
            balances,
            world,
            grid_url,
            simulator_version,
        }
    }

    pub fn balances(&self) -> &BalanceCache {
        &self.balances
    }

    /// Cached balance for a viewer's balance request.
    pub fn balance_of(&self, avatar: Uuid) -> i64 {
        self.balances.get(avatar)
    }

    /// Push the cached balance to the avatar's viewer.
    pub fn push_cached_balance(&self, avatar: Uuid) {
        self.world.events.push_balance(avatar, self.balances.get(avatar));
    }

    fn display_name(&self, avatar: Uuid) -> String {
        // Fall back to the identity's string form when the party is not
        // known here (e.g. a payee in another simulator).
        self.world
            .sessions
            .display_name(avatar)
            .unwrap_or_else(|| avatar.to_string())
    }

    fn notify_unavailable(&self, avatar: Uuid) {
        self.world.events.send_dialog(avatar, SERVICE_UNAVAILABLE);
    }

    // =========================================================================
    // Region lifecycle
    // =========================================================================

    /// Register a region with the gateway and store its secret. Exactly one
    /// registration per region; duplicates are rejected without altering the
    /// stored secret.
    pub async fn initialize_region(
        &self,
        region: Uuid,
        region_ip: &str,
        region_name: &str,
    ) -> Result<(), GatewayError> {
        let request = InitializeRegion {
            region,
            region_ip: region_ip.to_string(),
            region_name: region_name.to_string(),
            grid_url: self.grid_url.clone(),
            simulator_version: self.simulator_version.clone(),
            module_version: MODULE_VERSION.to_string(),
        };

        let response = match self.client.call(request.into_params()).await {
            Ok(response) => response,
            Err(e) => {
                error!(%region, "the currency service is not available");
                return Err(e.into());
            }
        };

        let secret = require(&response, "regionSecret")?.to_string();
        match self.secrets.insert(region, secret) {
            Ok(()) => {
                info!(%region, "the currency service is available");
                Ok(())
            }
            Err(e) => {
                error!(%region, "the region secret is already set");
                Err(e)
            }
        }
    }

    /// Farewell call for every region this process registered. Best effort.
    pub async fn close_regions(&self) {
        let request = CloseRegion {
            grid_url: self.grid_url.clone(),
            regions: self.secrets.regions(),
        };
        if let Err(e) = self.client.call(request.into_params()).await {
            warn!(error = %e, "closeRegion was not acknowledged");
        }
    }

    /// One-time grid activation, driven by an operator command. Returns the
    /// URL the operator must visit to fetch the terminal script.
    pub async fn register_grid(
        &self,
        short_name: &str,
        long_name: &str,
    ) -> Result<String, GatewayError> {
        let request = RegisterGrid {
            short_name: short_name.to_string(),
            long_name: long_name.to_string(),
            description: String::new(),
            grid_url: self.grid_url.clone(),
        };
        let response = self.client.call(request.into_params()).await?;

        if response.get("success").is_some_and(|s| is_affirmative(s)) {
            Ok(require(&response, "scriptURL")?.to_string())
        } else {
            Err(GatewayError::precondition(
                "could not activate the grid; check the parameters and try again",
            ))
        }
    }

    /// Operator connectivity probe.
    pub async fn check_status(&self) -> bool {
        match self.client.call(simple_call("checkStatus")).await {
            Ok(response) => response.get("status").map(String::as_str) == Some("INSOMNIA"),
            Err(e) => {
                warn!(error = %e, "status check failed");
                false
            }
        }
    }

    // =========================================================================
    // Avatar lifecycle
    // =========================================================================

    /// Claim an avatar that just entered the world. Fire-and-forget: entry
    /// must not block on a network round trip, so the call is spawned and
    /// only the failure branch surfaces, as an unavailability notice.
    pub fn claim_avatar(
        &self,
        avatar: Uuid,
        avatar_name: &str,
        client_ip: &str,
        region: Uuid,
        region_ip: &str,
    ) -> JoinHandle<()> {
        let request = ClaimAvatar {
            avatar,
            avatar_name: avatar_name.to_string(),
            language: "ENG".to_string(),
            viewer: "HIPPO".to_string(),
            client_ip: client_ip.to_string(),
            region,
            region_ip: region_ip.to_string(),
            grid_url: self.grid_url.clone(),
        };

        let client = self.client.clone();
        let events = Arc::clone(&self.world.events);
        tokio::spawn(async move {
            if let Err(e) = client.call(request.into_params()).await {
                warn!(%avatar, error = %e, "claimUser failed");
                events.send_dialog(avatar, SERVICE_UNAVAILABLE);
            }
        })
    }

    /// Release an avatar on session end. Clears the cached balance first so
    /// no stale value survives the session.
    pub async fn leave_avatar(&self, avatar: Uuid) {
        self.balances.remove(avatar);

        let Some(session) = self.world.sessions.session(avatar) else {
            info!(%avatar, "leaveUser skipped; session already gone");
            return;
        };
        let request = LeaveAvatar {
            avatar,
            region: session.region,
        };
        if let Err(e) = self.client.call(request.into_params()).await {
            warn!(%avatar, error = %e, "leaveUser was not acknowledged");
        }
    }

    // =========================================================================
    // Money transfers
    // =========================================================================

    /// Transmit one economic act to the gateway.
    ///
    /// The gateway attributes OBJECT_PAYS transactions to the *receiver's*
    /// current region and every other type to the *sender's*; that asymmetry
    /// is how the correct region ledger is charged.
    ///
    /// A transport failure means the transaction did not happen: nothing was
    /// committed locally, the payer gets one unavailability notice, and no
    /// retry is attempted.
    pub async fn transfer(&self, request: TransferRequest) -> Result<(), GatewayError> {
        let region_owner = match request.kind {
            TransactionType::ObjectPays => request.receiver,
            _ => request.sender,
        };
        let region = self
            .world
            .sessions
            .session(region_owner)
            .map(|s| s.region)
            .ok_or_else(|| {
                GatewayError::precondition(format!(
                    "could not find avatar {region_owner} to attribute the transaction region"
                ))
            })?;

        let transfer = TransferMoney {
            sender: request.sender,
            sender_name: self.display_name(request.sender),
            receiver: request.receiver,
            receiver_name: self.display_name(request.receiver),
            amount: request.amount,
            kind: request.kind,
            region,
            grid_url: self.grid_url.clone(),
            extra: request.extra,
        };

        if let Err(e) = self.client.call(transfer.into_params()).await {
            error!(sender = %request.sender, error = %e, "transferMoney failed");
            self.notify_unavailable(request.sender);
            return Err(e.into());
        }
        Ok(())
    }

    /// Avatar pays a scripted object (PAY_OBJECT).
    pub async fn pay_object(
        &self,
        sender: Uuid,
        object: Uuid,
        amount: i64,
    ) -> Result<(), GatewayError> {
        let part = self
            .world
            .objects
            .find(object)
            .ok_or_else(|| GatewayError::precondition(format!("could not find prim {object}")))?;

        let mut extra = Params::new();
        extra.insert("primUUID".to_string(), part.id.to_string());
        extra.insert("primName".to_string(), part.name.clone());
        extra.insert("primDescription".to_string(), part.description.clone());
        extra.insert("primLocation".to_string(), part.location.clone());

        self.transfer(TransferRequest {
            sender,
            receiver: part.owner,
            amount,
            kind: TransactionType::PayObject,
            extra,
        })
        .await
    }

    /// Scripted object pays an avatar (OBJECT_PAYS).
    pub async fn object_gives_money(
        &self,
        object: Uuid,
        sender: Uuid,
        receiver: Uuid,
        amount: i64,
    ) -> Result<(), GatewayError> {
        let part = self
            .world
            .objects
            .find(object)
            .ok_or_else(|| GatewayError::precondition(format!("could not find prim {object}")))?;

        let mut extra = Params::new();
        extra.insert("primUUID".to_string(), part.id.to_string());
        extra.insert("primName".to_string(), part.name.clone());
        extra.insert("primDescription".to_string(), part.description.clone());
        extra.insert("primLocation".to_string(), part.location.clone());
        extra.insert("parentUUID".to_string(), part.owner.to_string());

        self.transfer(TransferRequest {
            sender,
            receiver,
            amount,
            kind: TransactionType::ObjectPays,
            extra,
        })
        .await
    }

    /// Direct avatar-to-avatar gift.
    pub async fn gift(
        &self,
        sender: Uuid,
        receiver: Uuid,
        amount: i64,
    ) -> Result<(), GatewayError> {
        self.transfer(TransferRequest {
            sender,
            receiver,
            amount,
            kind: TransactionType::Gift,
            extra: Params::new(),
        })
        .await
    }

    /// Avatar buys an object. A zero price completes locally without a
    /// gateway round trip; a paid sale becomes a BUY_OBJECT transfer and
    /// completes later via the delivery notification.
    #[allow(clippy::too_many_arguments)]
    pub async fn buy_object(
        &self,
        buyer: Uuid,
        object: Uuid,
        category: Uuid,
        local_id: u32,
        sale_type: u8,
        sale_price: i64,
    ) -> Result<(), GatewayError> {
        let part = self
            .world
            .objects
            .find(object)
            .ok_or_else(|| GatewayError::precondition(format!("could not find prim {object}")))?;

        if sale_price == 0 {
            return self
                .world
                .sales
                .complete_sale(buyer, category, local_id, sale_type, 0);
        }

        let mut extra = Params::new();
        extra.insert("categoryID".to_string(), category.to_string());
        extra.insert("localID".to_string(), local_id.to_string());
        extra.insert("saleType".to_string(), sale_type.to_string());
        extra.insert("objectUUID".to_string(), part.id.to_string());
        extra.insert("objectName".to_string(), part.name.clone());
        extra.insert("objectDescription".to_string(), part.description.clone());
        extra.insert("objectLocation".to_string(), part.location.clone());

        self.transfer(TransferRequest {
            sender: buyer,
            receiver: part.owner,
            amount: sale_price,
            kind: TransactionType::BuyObject,
            extra,
        })
        .await
    }

    /// Forward a script debit-permission answer to the gateway.
    pub async fn change_debit_permission(
        &self,
        object: Uuid,
        item: Uuid,
        item_name: &str,
        answer: i32,
    ) -> Result<(), GatewayError> {
        let part = self
            .world
            .objects
            .find(object)
            .ok_or_else(|| GatewayError::precondition(format!("could not find prim {object}")))?;

        let request = DebitPermission {
            object: part.id,
            object_name: part.name,
            object_description: part.description,
            object_location: part.location,
            owner: part.owner,
            region: part.region,
            grid_url: self.grid_url.clone(),
            item,
            item_name: item_name.to_string(),
            answer,
        };
        self.client.call(request.into_params()).await?;
        Ok(())
    }

    // =========================================================================
    // Land purchase (steps 1-2 of the three-step handshake)
    // =========================================================================

    /// Step 1: local validation hook. Defers to the gateway ("not yet
    /// validated") unless the price is zero, which is auto-approved.
    pub fn validate_land_buy(&self, sale: &mut LandSale) {
        sale.economy_validated = sale.parcel_price == 0;
    }

    /// Step 2: a non-zero-price purchase event fired locally. Sends the
    /// signed purchase-transfer request and returns; completion arrives
    /// later as a gateway callback (step 3, see [`handlers`]).
    pub async fn process_land_buy(&self, sale: &LandSale) -> Result<(), GatewayError> {
        if sale.economy_validated {
            return Ok(());
        }

        let parcel = self
            .world
            .land
            .parcel(sale.region, sale.parcel_local_id)
            .ok_or_else(|| {
                GatewayError::precondition(format!(
                    "could not find parcel {} in region {}",
                    sale.parcel_local_id, sale.region
                ))
            })?;

        let mut extra = Params::new();
        extra.insert(
            "final".to_string(),
            if sale.finalized { "1" } else { "0" }.to_string(),
        );
        extra.insert(
            "removeContribution".to_string(),
            if sale.remove_contribution { "1" } else { "0" }.to_string(),
        );
        extra.insert("parcelLocalID".to_string(), sale.parcel_local_id.to_string());
        extra.insert("parcelName".to_string(), parcel.name);
        extra.insert("transactionID".to_string(), sale.transaction_id.to_string());
        extra.insert("amountDebited".to_string(), sale.amount_debited.to_string());
        extra.insert(
            "authenticated".to_string(),
            if sale.authenticated { "1" } else { "0" }.to_string(),
        );

        self.transfer(TransferRequest {
            sender: sale.buyer,
            receiver: sale.parcel_owner,
            amount: sale.parcel_price,
            kind: TransactionType::BuyLand,
            extra,
        })
        .await
    }

    // =========================================================================
    // Currency purchase surfaces
    // =========================================================================

    /// Current gateway exchange rate.
    pub async fn exchange_rate(&self) -> Result<i64, GatewayError> {
        let response = self.client.call(simple_call("getExchangeRate")).await?;
        let raw = require(&response, "currentExchangeRate")?;
        raw.parse()
            .map_err(|_| ProtocolError::InvalidField("currentExchangeRate", raw.to_string()).into())
    }

    /// Execute a currency purchase for a viewer.
    pub async fn buy_currency(&self, avatar: Uuid, amount: i64) -> Result<(), GatewayError> {
        let mut params = simple_call("buyCurrency");
        params.insert("avatarUUID".to_string(), avatar.to_string());
        params.insert("amount".to_string(), amount.to_string());

        let response = self.client.call(params).await?;
        if response.get("success").is_some_and(|s| is_affirmative(s)) {
            Ok(())
        } else {
            Err(GatewayError::precondition("the gateway refused the purchase"))
        }
    }

    /// Quote a currency purchase. The quoted amount is rounded up to the
    /// next whole exchange-rate multiple. When no rate is available the
    /// gateway supplies a charge-account notice instead.
    pub async fn currency_quote(
        &self,
        avatar: Uuid,
        amount: i64,
    ) -> Result<CurrencyQuote, GatewayError> {
        match self.exchange_rate().await {
            Ok(rate) if rate > 0 => {
                let real_amount = amount / rate + 1;
                Ok(CurrencyQuote::Quote {
                    currency_to_buy: real_amount * rate,
                    estimated_cost: real_amount * 100,
                })
            }
            _ => {
                let mut params = simple_call("getString");
                params.insert("type".to_string(), "chargeAccount".to_string());
                params.insert("avatarUUID".to_string(), avatar.to_string());

                let response = self.client.call(params).await?;
                Ok(CurrencyQuote::ChargeAccount {
                    message: require(&response, "errorMessage")?.to_string(),
                    uri: require(&response, "errorURI")?.to_string(),
                })
            }
        }
    }

    /// Module identity reported to the gateway.
    pub fn module_identity(&self) -> (&'static str, &'static str) {
        (MODULE_NAME, MODULE_VERSION)
    }
}
