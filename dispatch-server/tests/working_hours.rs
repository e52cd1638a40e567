//! Working-hours scenarios: the go-online decision tree, warning ladder,
//! auto-debit at expiry and the forced stop.

mod common;

use serde_json::json;

use common::{Harness, drain, event_names};
use dispatch_server::gateway::Room;
use dispatch_server::ports::store::{DriverStore, LedgerStore};
use dispatch_server::types::entities::HoursPatch;
use dispatch_server::types::enums::{DriverStatus, TxMethod, VehicleType};
use dispatch_server::types::primitives::DriverId;

#[tokio::test]
async fn resume_does_not_charge_a_second_fee() {
    let h = Harness::new();
    h.driver("DRV002", VehicleType::Bike, 150);
    let id = DriverId::new("DRV002");

    // New shift: 150 -> 50 with one shift_start_fee, timer at 12h.
    let outcome = h.app.hours.start(&id).await.expect("start");
    assert_eq!(outcome.amount_deducted.get(), 100);
    assert_eq!(outcome.remaining_seconds, 12 * 3600);
    assert!(!outcome.resumed);

    // Interrupt the shift, then model time having run it down to 30,000
    // seconds before the driver went offline.
    h.app.hours.stop(&id).await.expect("stop");
    h.store
        .update_hours(
            &id,
            &HoursPatch {
                remaining_working_seconds: Some(30_000),
                ..HoursPatch::default()
            },
        )
        .await
        .expect("patch");

    let driver = h.store.get_driver(&id).await.expect("read").expect("exists");
    assert!(!driver.timer_active);
    assert_eq!(driver.status, DriverStatus::Offline);

    // Going online again resumes: wallet untouched, no new transaction.
    let outcome = h.app.hours.start(&id).await.expect("resume");
    assert!(outcome.resumed);
    assert_eq!(outcome.amount_deducted.get(), 0);
    assert_eq!(outcome.remaining_seconds, 30_000);

    let driver = h.store.get_driver(&id).await.expect("read").expect("exists");
    assert_eq!(driver.wallet.get(), 50);
    let fees = h
        .store
        .transactions_for_driver(&id, 10)
        .await
        .expect("ledger")
        .iter()
        .filter(|t| t.method == TxMethod::ShiftStartFee)
        .count();
    assert_eq!(fees, 1, "one contiguous session, one shift fee");
}

#[tokio::test]
async fn double_go_online_debits_once() {
    let h = Harness::new();
    h.driver("DRV001", VehicleType::Bike, 500);
    let id = DriverId::new("DRV001");

    let first = h.app.hours.start(&id).await.expect("start");
    let second = h.app.hours.start(&id).await.expect("duplicate start");

    assert_eq!(first.amount_deducted.get(), 100);
    assert_eq!(second.amount_deducted.get(), 0);

    let driver = h.store.get_driver(&id).await.expect("read").expect("exists");
    assert_eq!(driver.wallet.get(), 400, "only one fee taken");
}

#[tokio::test]
async fn concurrent_go_online_debits_once() {
    let h = Harness::new();
    h.driver("DRV001", VehicleType::Bike, 500);
    let id = DriverId::new("DRV001");

    // Both calls race for the driver-row lock; the loser must re-read the
    // row and land in the duplicate branch.
    let (first, second) = tokio::join!(h.app.hours.start(&id), h.app.hours.start(&id));
    let first = first.expect("start");
    let second = second.expect("start");

    let total_deducted = first.amount_deducted.get() + second.amount_deducted.get();
    assert_eq!(total_deducted, 100, "exactly one call may charge the fee");

    let driver = h.store.get_driver(&id).await.expect("read").expect("exists");
    assert_eq!(driver.wallet.get(), 400);
    let fees = h
        .store
        .transactions_for_driver(&id, 10)
        .await
        .expect("ledger")
        .iter()
        .filter(|t| t.method == TxMethod::ShiftStartFee)
        .count();
    assert_eq!(fees, 1, "one shift fee in the ledger");
}

#[tokio::test]
async fn insufficient_balance_blocks_go_online() {
    let h = Harness::new();
    h.driver("DRV004", VehicleType::Bike, 50);

    let (session, _rx) = h.connect();
    let ack = h
        .send(session, json!({ "event": "driverGoOnline", "data": { "driverId": "DRV004" } }))
        .await;

    assert_eq!(ack["success"], false);
    let message = ack["message"].as_str().expect("message");
    assert!(
        message.contains("Insufficient wallet balance") && message.contains("100"),
        "unexpected message: {message}"
    );

    let id = DriverId::new("DRV004");
    let driver = h.store.get_driver(&id).await.expect("read").expect("exists");
    assert_eq!(driver.wallet.get(), 50);
    assert_eq!(driver.status, DriverStatus::Offline);
    assert!(h.store.transactions_for_driver(&id, 10).await.expect("ledger").is_empty());
}

#[tokio::test]
async fn warnings_fire_at_the_three_boundaries_only() {
    let h = Harness::new();
    h.driver("DRV001", VehicleType::Bike, 500);
    let id = DriverId::new("DRV001");

    // Shift interrupted just above the first warning boundary.
    h.app.hours.start(&id).await.expect("start");
    h.store
        .update_hours(
            &id,
            &HoursPatch {
                remaining_working_seconds: Some(3602),
                timer_active: Some(false),
                ..HoursPatch::default()
            },
        )
        .await
        .expect("patch");
    h.app.hours.resume(&id).await.expect("resume");

    let (session, mut rx) = h.connect();
    h.app.gateway.join(session, &Room::Driver(id.clone()));

    h.app.hours.tick_once().await; // 3601
    assert!(event_names(&drain(&mut rx)).is_empty());

    h.app.hours.tick_once().await; // 3600: warning 1
    let frames = drain(&mut rx);
    assert_eq!(event_names(&frames), vec!["workingHoursWarning"]);
    assert_eq!(frames[0]["data"]["warning"], 1);
    assert_eq!(frames[0]["data"]["remainingSeconds"], 3600);

    h.app.hours.tick_once().await; // 3599: nothing
    assert!(event_names(&drain(&mut rx)).is_empty());

    let driver = h.store.get_driver(&id).await.expect("read").expect("exists");
    assert_eq!(driver.warnings_issued, 1);
}

#[tokio::test]
async fn expiry_auto_debits_and_extends() {
    let h = Harness::new();
    h.driver("DRV003", VehicleType::Bike, 300);
    let id = DriverId::new("DRV003");

    h.app.hours.start(&id).await.expect("start");
    h.store
        .update_hours(
            &id,
            &HoursPatch {
                remaining_working_seconds: Some(1),
                timer_active: Some(false),
                ..HoursPatch::default()
            },
        )
        .await
        .expect("patch");
    h.app.hours.resume(&id).await.expect("resume");

    h.app.hours.tick_once().await; // hits zero, auto-debit

    let driver = h.store.get_driver(&id).await.expect("read").expect("exists");
    assert_eq!(driver.wallet.get(), 300 - 100 - 100, "shift fee + auto-debit");
    assert_eq!(driver.remaining_working_seconds, 12 * 3600);
    assert_eq!(driver.warnings_issued, 0);
    assert!(driver.extended_hours_purchased);

    let auto = h
        .store
        .transactions_for_driver(&id, 10)
        .await
        .expect("ledger")
        .iter()
        .filter(|t| t.method == TxMethod::ExtendedHoursAutoDebit)
        .count();
    assert_eq!(auto, 1);

    // The countdown keeps running after the extension.
    let snapshot = h.app.hours.status(&id).await.expect("status");
    assert!(snapshot.timer_active);
}

#[tokio::test]
async fn expiry_with_an_empty_wallet_forces_offline() {
    let h = Harness::new();
    h.driver("DRV005", VehicleType::Bike, 150);
    let id = DriverId::new("DRV005");

    h.app.hours.start(&id).await.expect("start"); // wallet 50 now
    h.store
        .update_hours(
            &id,
            &HoursPatch {
                remaining_working_seconds: Some(1),
                timer_active: Some(false),
                ..HoursPatch::default()
            },
        )
        .await
        .expect("patch");
    h.app.hours.resume(&id).await.expect("resume");

    let (session, mut rx) = h.connect();
    h.app.gateway.join(session, &Room::Driver(id.clone()));

    h.app.hours.tick_once().await;

    let driver = h.store.get_driver(&id).await.expect("read").expect("exists");
    assert_eq!(driver.wallet.get(), 50, "no auto-debit without cover");
    assert_eq!(driver.status, DriverStatus::Offline);
    assert!(!driver.timer_active);

    let names = event_names(&drain(&mut rx));
    assert!(names.contains(&"autoStop".to_string()));

    // Only the shift fee ever hit the ledger.
    let txs = h.store.transactions_for_driver(&id, 10).await.expect("ledger");
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].method, TxMethod::ShiftStartFee);
}

#[tokio::test]
async fn purchases_add_time_at_the_limit_scaled_price() {
    let h = Harness::new();
    h.driver("DRV001", VehicleType::Bike, 1000);
    let id = DriverId::new("DRV001");

    h.app.hours.start(&id).await.expect("start"); // wallet 900, 12h

    let remaining = h.app.hours.add_half_time(&id).await.expect("half");
    assert_eq!(remaining, 12 * 3600 + 6 * 3600);

    let remaining = h.app.hours.add_full_time(&id).await.expect("full");
    assert_eq!(remaining, 12 * 3600 + 6 * 3600 + 12 * 3600);

    let driver = h.store.get_driver(&id).await.expect("read").expect("exists");
    // 1000 - 100 (shift) - 50 (half @ 12h) - 100 (full @ 12h)
    assert_eq!(driver.wallet.get(), 750);

    let methods: Vec<TxMethod> = h
        .store
        .transactions_for_driver(&id, 10)
        .await
        .expect("ledger")
        .iter()
        .map(|t| t.method)
        .collect();
    assert!(methods.contains(&TxMethod::ExtraHalfTime));
    assert!(methods.contains(&TxMethod::ExtraFullTime));
}

#[tokio::test]
async fn timers_recover_after_a_restart() {
    let h = Harness::new();
    h.driver("DRV001", VehicleType::Bike, 500);
    let id = DriverId::new("DRV001");

    // A crashed process left the row armed mid-shift.
    h.store
        .update_hours(
            &id,
            &HoursPatch {
                remaining_working_seconds: Some(20_000),
                timer_active: Some(true),
                status: Some(DriverStatus::Live),
                ..HoursPatch::default()
            },
        )
        .await
        .expect("patch");

    let recovered = h.app.hours.recover().await.expect("recover");
    assert_eq!(recovered, 1);

    h.app.hours.tick_once().await;
    let snapshot = h.app.hours.status(&id).await.expect("status");
    assert_eq!(snapshot.remaining_seconds, 19_999);
    assert!(snapshot.timer_active);
}
