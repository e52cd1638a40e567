//! Shared test harness: the full service graph over the in-memory store,
//! a steerable clock and a capturing push sender.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Value, json};
use tokio::sync::mpsc::Receiver;
use uuid::Uuid;

use dispatch_server::app::App;
use dispatch_server::config::Settings;
use dispatch_server::gateway::SessionId;
use dispatch_server::gateway::router::EventRouter;
use dispatch_server::ports::clock::FakeClock;
use dispatch_server::store::MemoryStore;
use dispatch_server::types::entities::{Driver, User};
use dispatch_server::types::enums::{DriverStatus, VehicleType};
use dispatch_server::types::events::InboundFrame;
use dispatch_server::types::primitives::{Amount, CustomerId, DriverId};
use push_relay::CapturingSender;

/// Fully wired core over fakes.
pub struct Harness {
    pub app: Arc<App>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<FakeClock>,
    pub push: Arc<CapturingSender>,
    pub router: EventRouter,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    pub fn new() -> Self {
        let settings = Settings::load("test").expect("default settings");
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FakeClock::now_fake());
        let push = Arc::new(CapturingSender::new());
        let app = App::build(settings, store.clone(), push.clone(), clock.clone());
        let router = EventRouter::new(app.clone());
        Self {
            app,
            store,
            clock,
            push,
            router,
        }
    }

    /// Seed a driver row.
    pub fn driver(&self, id: &str, vehicle_type: VehicleType, wallet: i64) -> Driver {
        let driver = Driver {
            id: Uuid::new_v4(),
            driver_id: DriverId::new(id),
            name: format!("Driver {id}"),
            phone: format!("90000{id}"),
            vehicle_type,
            vehicle_number: "TN 33 A 1234".into(),
            wallet: Amount::saturating(wallet),
            status: DriverStatus::Offline,
            working_hours_limit: 12,
            deduction_amount: Amount::saturating(100),
            remaining_working_seconds: 0,
            timer_active: false,
            warnings_issued: 0,
            extended_hours_purchased: false,
            last_location: None,
            push_token: Some(format!("token-{id}")),
            updated_at: Utc::now(),
        };
        self.store.seed_driver(driver.clone());
        driver
    }

    /// Seed a passenger row.
    pub fn user(&self, customer_id: &str, wallet: i64) -> User {
        let user = User {
            id: Uuid::new_v4(),
            customer_id: CustomerId::new(customer_id),
            name: "Meena".into(),
            phone: "9000000002".into(),
            wallet: Amount::saturating(wallet),
            updated_at: Utc::now(),
        };
        self.store.seed_user(user.clone());
        user
    }

    /// Open a realtime session.
    pub fn connect(&self) -> (SessionId, Receiver<Value>) {
        self.app.gateway.register()
    }

    /// Route one inbound frame (as the wire would carry it) and return the
    /// acknowledgement body.
    pub async fn send(&self, session: SessionId, frame: Value) -> Value {
        let frame: InboundFrame = serde_json::from_value(frame).expect("frame decodes");
        self.router.handle(session, frame.event).await
    }

    /// Register a driver connection the way the app does it.
    pub async fn register_driver(&self, session: SessionId, driver_id: &str) -> Value {
        self.send(
            session,
            json!({
                "event": "registerDriver",
                "data": { "driverId": driver_id, "lat": 11.3459, "lng": 77.7216 }
            }),
        )
        .await
    }

    /// Register a passenger connection.
    pub async fn register_user(&self, session: SessionId, customer_id: &str) -> Value {
        self.send(
            session,
            json!({
                "event": "registerUser",
                "data": { "customerId": customer_id }
            }),
        )
        .await
    }

    /// A standard bike booking frame for the seeded passenger.
    pub fn book_ride_frame(customer_id: &str, vehicle_type: &str) -> Value {
        json!({
            "event": "bookRide",
            "data": {
                "customerId": customer_id,
                "userName": "Meena",
                "userMobile": "9000000002",
                "pickup": { "lat": 11.3459, "lng": 77.7216, "address": "Perundurai Rd" },
                "drop": { "lat": 11.3099, "lng": 77.7387, "address": "Bus Stand" },
                "vehicleType": vehicle_type,
                "distance": 5.4
            }
        })
    }
}

/// Drain everything queued on a session.
pub fn drain(rx: &mut Receiver<Value>) -> Vec<Value> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(frame);
    }
    frames
}

/// Event names in queue order.
pub fn event_names(frames: &[Value]) -> Vec<String> {
    frames
        .iter()
        .filter_map(|f| f.get("event").and_then(Value::as_str).map(str::to_string))
        .collect()
}
