// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Collaborator seams toward the simulator host.
//!
//! The core never reaches into simulator internals; everything it needs from
//! the surrounding world comes through these traits, implemented by the host
//! and passed in as explicit registry objects at construction time. Tests
//! substitute in-memory mocks.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::GatewayError;

/// A live local avatar session.
#[derive(Debug, Clone)]
pub struct AvatarSession {
    pub avatar: Uuid,
    /// Display name, e.g. "Ada Lovelace".
    pub name: String,
    /// Region the avatar currently resides in.
    pub region: Uuid,
}

/// A scripted world object (prim) as the core sees it.
#[derive(Debug, Clone)]
pub struct WorldObject {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    /// Human-readable location, e.g. "Sandbox/128/128/23".
    pub location: String,
    pub owner: Uuid,
    pub region: Uuid,
}

/// Live parcel state needed to complete a land purchase.
#[derive(Debug, Clone)]
pub struct ParcelInfo {
    pub local_id: i32,
    pub name: String,
    pub owner: Uuid,
    pub group: Uuid,
    pub group_owned: bool,
    pub area: i32,
    pub sale_price: i64,
}

/// Structured argument bundle for the land-buy validate/complete sequence.
#[derive(Debug, Clone)]
pub struct LandSale {
    pub buyer: Uuid,
    pub region: Uuid,
    pub parcel_local_id: i32,
    pub parcel_owner: Uuid,
    pub group: Uuid,
    pub group_owned: bool,
    pub parcel_area: i32,
    pub parcel_price: i64,
    pub amount_debited: i64,
    pub transaction_id: i32,
    pub finalized: bool,
    pub authenticated: bool,
    pub remove_contribution: bool,
    /// Set only once the purchase is economically confirmed; the paying
    /// click and the gateway's authorization are decoupled in time.
    pub economy_validated: bool,
}

/// Resolve avatar identities to live sessions and display names.
pub trait SessionRegistry: Send + Sync {
    /// The avatar's live local session, if any.
    fn session(&self, avatar: Uuid) -> Option<AvatarSession>;

    /// Display name for an avatar, resolvable even when the avatar has no
    /// live session here (e.g. a remote payee).
    fn display_name(&self, avatar: Uuid) -> Option<String>;
}

/// Resolve world objects and mutate their scriptable-event capabilities.
pub trait ObjectRegistry: Send + Sync {
    fn find(&self, object: Uuid) -> Option<WorldObject>;

    fn set_script_events(
        &self,
        object: Uuid,
        item: Uuid,
        events: i32,
    ) -> Result<(), GatewayError>;

    fn remove_script_events(&self, object: Uuid, item: Uuid) -> Result<(), GatewayError>;
}

/// Deliver user-visible effects to live sessions.
pub trait EventDelivery: Send + Sync {
    /// Blocking blue-box dialog; also carries the unavailability notice.
    fn send_dialog(&self, avatar: Uuid, message: &str);

    fn send_alert(&self, avatar: Uuid, message: &str);

    fn send_url(&self, avatar: Uuid, message: &str, url: &str);

    /// Chat is echoed to the sender as well when the sender is local.
    fn send_chat(&self, avatar: Uuid, sender: Uuid, sender_name: &str, message: &str);

    fn send_instant_message(
        &self,
        avatar: Uuid,
        sender: Uuid,
        sender_name: &str,
        session: Uuid,
        message: &str,
    );

    /// Push a confirmed balance to the avatar's viewer.
    fn push_balance(&self, avatar: Uuid, balance: i64);

    /// Fire the object-paid event toward the scripted object.
    fn object_paid(&self, object: Uuid, payer: Uuid, amount: i64);
}

/// Finalize object purchases.
pub trait ObjectSales: Send + Sync {
    fn complete_sale(
        &self,
        buyer: Uuid,
        category: Uuid,
        local_id: u32,
        sale_type: u8,
        price: i64,
    ) -> Result<(), GatewayError>;
}

/// Land parcel lookup and the validate/complete event sequence.
pub trait LandTransactions: Send + Sync {
    fn parcel(&self, region: Uuid, local_id: i32) -> Option<ParcelInfo>;

    /// Local validation hook; may veto by leaving `economy_validated` false.
    fn validate(&self, sale: &mut LandSale);

    /// Complete a validated purchase.
    fn complete(&self, sale: &LandSale);
}

/// The full set of host collaborators, handed to the orchestrator at
/// construction time.
#[derive(Clone)]
pub struct WorldHandles {
    pub sessions: Arc<dyn SessionRegistry>,
    pub objects: Arc<dyn ObjectRegistry>,
    pub events: Arc<dyn EventDelivery>,
    pub sales: Arc<dyn ObjectSales>,
    pub land: Arc<dyn LandTransactions>,
}

#[cfg(test)]
pub(crate) mod testing {
    //! One in-memory world standing in for every host collaborator; records
    //! each delivered effect so tests can assert on it.

    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub(crate) struct TestWorld {
        pub sessions: Mutex<HashMap<Uuid, AvatarSession>>,
        pub names: Mutex<HashMap<Uuid, String>>,
        pub objects: Mutex<HashMap<Uuid, WorldObject>>,
        pub parcels: Mutex<HashMap<(Uuid, i32), ParcelInfo>>,

        pub dialogs: Mutex<Vec<(Uuid, String)>>,
        pub alerts: Mutex<Vec<(Uuid, String)>>,
        pub urls: Mutex<Vec<(Uuid, String, String)>>,
        pub chats: Mutex<Vec<(Uuid, Uuid, String, String)>>,
        pub instant_messages: Mutex<Vec<(Uuid, Uuid, String, Uuid, String)>>,
        pub balance_pushes: Mutex<Vec<(Uuid, i64)>>,
        pub object_payments: Mutex<Vec<(Uuid, Uuid, i64)>>,
        pub completed_sales: Mutex<Vec<(Uuid, Uuid, u32, u8, i64)>>,
        /// `(object, item, Some(mask))` for a grant, `None` for a revocation.
        pub script_events: Mutex<Vec<(Uuid, Uuid, Option<i32>)>>,
        pub completed_land: Mutex<Vec<LandSale>>,
    }

    impl TestWorld {
        pub fn add_session(&self, avatar: Uuid, name: &str, region: Uuid) {
            self.sessions.lock().unwrap().insert(
                avatar,
                AvatarSession {
                    avatar,
                    name: name.to_string(),
                    region,
                },
            );
            self.names.lock().unwrap().insert(avatar, name.to_string());
        }

        pub fn add_object(&self, object: WorldObject) {
            self.objects.lock().unwrap().insert(object.id, object);
        }

        pub fn add_parcel(&self, region: Uuid, parcel: ParcelInfo) {
            self.parcels
                .lock()
                .unwrap()
                .insert((region, parcel.local_id), parcel);
        }

        pub fn handles(self: &Arc<Self>) -> WorldHandles {
            WorldHandles {
                sessions: Arc::clone(self) as Arc<dyn SessionRegistry>,
                objects: Arc::clone(self) as Arc<dyn ObjectRegistry>,
                events: Arc::clone(self) as Arc<dyn EventDelivery>,
                sales: Arc::clone(self) as Arc<dyn ObjectSales>,
                land: Arc::clone(self) as Arc<dyn LandTransactions>,
            }
        }
    }

    impl SessionRegistry for TestWorld {
        fn session(&self, avatar: Uuid) -> Option<AvatarSession> {
            self.sessions.lock().unwrap().get(&avatar).cloned()
        }

        fn display_name(&self, avatar: Uuid) -> Option<String> {
            self.names.lock().unwrap().get(&avatar).cloned()
        }
    }

    impl ObjectRegistry for TestWorld {
        fn find(&self, object: Uuid) -> Option<WorldObject> {
            self.objects.lock().unwrap().get(&object).cloned()
        }

        fn set_script_events(
            &self,
            object: Uuid,
            item: Uuid,
            events: i32,
        ) -> Result<(), GatewayError> {
            self.script_events
                .lock()
                .unwrap()
                .push((object, item, Some(events)));
            Ok(())
        }

        fn remove_script_events(&self, object: Uuid, item: Uuid) -> Result<(), GatewayError> {
            self.script_events.lock().unwrap().push((object, item, None));
            Ok(())
        }
    }

    impl EventDelivery for TestWorld {
        fn send_dialog(&self, avatar: Uuid, message: &str) {
            self.dialogs
                .lock()
                .unwrap()
                .push((avatar, message.to_string()));
        }

        fn send_alert(&self, avatar: Uuid, message: &str) {
            self.alerts
                .lock()
                .unwrap()
                .push((avatar, message.to_string()));
        }

        fn send_url(&self, avatar: Uuid, message: &str, url: &str) {
            self.urls
                .lock()
                .unwrap()
                .push((avatar, message.to_string(), url.to_string()));
        }

        fn send_chat(&self, avatar: Uuid, sender: Uuid, sender_name: &str, message: &str) {
            self.chats.lock().unwrap().push((
                avatar,
                sender,
                sender_name.to_string(),
                message.to_string(),
            ));
        }

        fn send_instant_message(
            &self,
            avatar: Uuid,
            sender: Uuid,
            sender_name: &str,
            session: Uuid,
            message: &str,
        ) {
            self.instant_messages.lock().unwrap().push((
                avatar,
                sender,
                sender_name.to_string(),
                session,
                message.to_string(),
            ));
        }

        fn push_balance(&self, avatar: Uuid, balance: i64) {
            self.balance_pushes.lock().unwrap().push((avatar, balance));
        }

        fn object_paid(&self, object: Uuid, payer: Uuid, amount: i64) {
            self.object_payments
                .lock()
                .unwrap()
                .push((object, payer, amount));
        }
    }

    impl ObjectSales for TestWorld {
        fn complete_sale(
            &self,
            buyer: Uuid,
            category: Uuid,
            local_id: u32,
            sale_type: u8,
            price: i64,
        ) -> Result<(), GatewayError> {
            self.completed_sales
                .lock()
                .unwrap()
                .push((buyer, category, local_id, sale_type, price));
            Ok(())
        }
    }

    impl LandTransactions for TestWorld {
        fn parcel(&self, region: Uuid, local_id: i32) -> Option<ParcelInfo> {
            self.parcels.lock().unwrap().get(&(region, local_id)).cloned()
        }

        fn validate(&self, _sale: &mut LandSale) {}

        fn complete(&self, sale: &LandSale) {
            self.completed_land.lock().unwrap().push(sale.clone());
        }
    }
}
