//! End-to-end ride flow over the realtime router: booking, type-filtered
//! fan-out, acceptance arbitration and the completion protocol.

mod common;

use serde_json::json;

use common::{Harness, drain, event_names};
use dispatch_server::ports::store::{DriverStore, LedgerStore, UserStore};
use dispatch_server::types::enums::{DriverStatus, TxMethod, VehicleType};
use dispatch_server::types::primitives::DriverId;

#[tokio::test]
async fn happy_bike_ride_settles_the_driver_wallet() {
    let h = Harness::new();
    h.driver("DRV001", VehicleType::Bike, 500);
    h.user("CUS0065", 0);

    // Driver comes online: wallet 500 -> 400, one shift_start_fee record.
    let (driver_session, mut driver_rx) = h.connect();
    h.register_driver(driver_session, "DRV001").await;
    let ack = h
        .send(driver_session, json!({ "event": "driverGoOnline", "data": { "driverId": "DRV001" } }))
        .await;
    assert_eq!(ack["success"], true);
    assert_eq!(ack["amountDeducted"], 100);

    let txs = h
        .store
        .transactions_for_driver(&DriverId::new("DRV001"), 10)
        .await
        .expect("ledger read");
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].method, TxMethod::ShiftStartFee);
    assert_eq!(txs[0].balance_after.get(), 400);

    // Passenger books a bike: fare = round(5.4 * 15) = 81, otp from the
    // customer id, first sequence id.
    let (user_session, mut user_rx) = h.connect();
    h.register_user(user_session, "CUS0065").await;

    let ack = h
        .send(user_session, Harness::book_ride_frame("CUS0065", "bike"))
        .await;
    assert_eq!(ack["success"], true);
    assert_eq!(ack["rideId"], "RID000001");
    assert_eq!(ack["fare"], 81);
    assert_eq!(ack["otp"], "0065");

    // The bike driver got the offer.
    let offers = drain(&mut driver_rx);
    assert!(event_names(&offers).contains(&"newRideRequest".to_string()));

    // Driver accepts and runs the ride through to completion.
    let ack = h
        .send(
            driver_session,
            json!({ "event": "acceptRide", "data": { "rideId": "RID000001", "driverId": "DRV001" } }),
        )
        .await;
    assert_eq!(ack["success"], true);

    let frames = drain(&mut user_rx);
    assert!(event_names(&frames).contains(&"rideAccepted".to_string()));

    let ack = h
        .send(
            driver_session,
            json!({ "event": "otpVerified", "data": { "rideId": "RID000001", "driverId": "DRV001", "otp": "0065" } }),
        )
        .await;
    assert_eq!(ack["success"], true);
    drain(&mut user_rx);

    let ack = h
        .send(
            driver_session,
            json!({
                "event": "driverCompletedRide",
                "data": { "rideId": "RID000001", "driverId": "DRV001", "distance": 5.4, "fare": 9999.0 }
            }),
        )
        .await;
    assert_eq!(ack["success"], true, "completion ack: {ack}");
    // The client-supplied fare is ignored; the server recomputed 81.
    assert_eq!(ack["fare"], 81);
    assert_eq!(ack["newWalletBalance"], 481);

    // Passenger event order: bill before the completion notice, terminal
    // status last, and no status field inside rideCompleted.
    let frames = drain(&mut user_rx);
    let names = event_names(&frames);
    let bill = names.iter().position(|n| n == "billAlert").expect("billAlert");
    let completed = names
        .iter()
        .position(|n| n == "rideCompleted")
        .expect("rideCompleted");
    let status = names
        .iter()
        .position(|n| n == "rideStatusUpdate")
        .expect("rideStatusUpdate");
    assert!(bill < completed, "billAlert must precede rideCompleted");
    assert!(completed < status, "terminal status must come last");

    let completed_frame = &frames[completed];
    assert!(completed_frame["data"].get("status").is_none());
    assert_eq!(frames[bill]["data"]["fare"], 81);
    assert_eq!(frames[status]["data"]["status"], "completed");

    // Ledger: exactly one ride_fare credit of 81; driver is live again.
    let txs = h
        .store
        .transactions_for_driver(&DriverId::new("DRV001"), 10)
        .await
        .expect("ledger read");
    let fares: Vec<_> = txs.iter().filter(|t| t.method == TxMethod::RideFare).collect();
    assert_eq!(fares.len(), 1);
    assert_eq!(fares[0].amount.get(), 81);

    let driver = h
        .store
        .get_driver(&DriverId::new("DRV001"))
        .await
        .expect("read")
        .expect("exists");
    assert_eq!(driver.wallet.get(), 481);
    assert_eq!(driver.status, DriverStatus::Live);
}

#[tokio::test]
async fn fan_out_is_vehicle_type_filtered() {
    let h = Harness::new();
    h.driver("DRV_BIKE", VehicleType::Bike, 500);
    h.driver("DRV_TAXI", VehicleType::Taxi, 500);
    h.driver("DRV_PORT", VehicleType::Port, 500);
    h.user("CUS0065", 0);

    let (bike, mut bike_rx) = h.connect();
    let (taxi, mut taxi_rx) = h.connect();
    let (port, mut port_rx) = h.connect();
    h.register_driver(bike, "DRV_BIKE").await;
    h.register_driver(taxi, "DRV_TAXI").await;
    h.register_driver(port, "DRV_PORT").await;
    drain(&mut bike_rx);
    drain(&mut taxi_rx);
    drain(&mut port_rx);

    let (user, _user_rx) = h.connect();
    h.register_user(user, "CUS0065").await;
    let ack = h.send(user, Harness::book_ride_frame("CUS0065", "taxi")).await;
    assert_eq!(ack["success"], true);

    assert!(
        event_names(&drain(&mut taxi_rx)).contains(&"newRideRequest".to_string()),
        "the taxi driver must be offered the ride"
    );
    assert!(
        !event_names(&drain(&mut bike_rx)).contains(&"newRideRequest".to_string()),
        "bike drivers must not see a taxi request"
    );
    assert!(
        !event_names(&drain(&mut port_rx)).contains(&"newRideRequest".to_string()),
        "port drivers must not see a taxi request"
    );

    // Nobody's vehicle type moved.
    for id in ["DRV_BIKE", "DRV_TAXI", "DRV_PORT"] {
        let driver = h
            .store
            .get_driver(&DriverId::new(id))
            .await
            .expect("read")
            .expect("exists");
        assert_eq!(driver.driver_id, DriverId::new(id));
    }
}

#[tokio::test]
async fn acceptance_race_has_exactly_one_winner() {
    let h = Harness::new();
    h.driver("DRV001", VehicleType::Bike, 500);
    h.driver("DRV002", VehicleType::Bike, 500);
    h.user("CUS0065", 0);

    let (a, mut a_rx) = h.connect();
    let (b, mut b_rx) = h.connect();
    h.register_driver(a, "DRV001").await;
    h.register_driver(b, "DRV002").await;
    drain(&mut a_rx);
    drain(&mut b_rx);

    let (user, mut user_rx) = h.connect();
    h.register_user(user, "CUS0065").await;
    let ack = h.send(user, Harness::book_ride_frame("CUS0065", "bike")).await;
    let ride_id = ack["rideId"].as_str().expect("ride id").to_string();

    let accept = |session, driver: &str| {
        h.send(
            session,
            json!({ "event": "acceptRide", "data": { "rideId": ride_id, "driverId": driver } }),
        )
    };
    let (first, second) = tokio::join!(accept(a, "DRV001"), accept(b, "DRV002"));

    let successes = [&first, &second]
        .iter()
        .filter(|ack| ack["success"] == true)
        .count();
    assert_eq!(successes, 1, "exactly one acceptance may win: {first} {second}");

    let loser = if first["success"] == true { &second } else { &first };
    let message = loser["message"].as_str().expect("failure message");
    assert!(
        message.contains("not available"),
        "loser should see a not-available message, got: {message}"
    );

    // The passenger hears exactly one rideAccepted.
    let accepted = event_names(&drain(&mut user_rx))
        .iter()
        .filter(|n| *n == "rideAccepted")
        .count();
    assert_eq!(accepted, 1);
}

#[tokio::test]
async fn duplicate_booking_is_suppressed_inside_the_window() {
    let h = Harness::new();
    h.driver("DRV001", VehicleType::Bike, 500);
    h.user("CUS0065", 0);

    let (driver, mut driver_rx) = h.connect();
    h.register_driver(driver, "DRV001").await;
    drain(&mut driver_rx);

    let (user, _user_rx) = h.connect();
    h.register_user(user, "CUS0065").await;

    let first = h.send(user, Harness::book_ride_frame("CUS0065", "bike")).await;
    assert_eq!(first["alreadySent"], false);

    h.clock.advance_secs(2);
    let second = h.send(user, Harness::book_ride_frame("CUS0065", "bike")).await;
    assert_eq!(second["alreadySent"], true);
    assert_eq!(second["rideId"], first["rideId"], "same raid id on both calls");

    // One fan-out only.
    let offers = event_names(&drain(&mut driver_rx))
        .iter()
        .filter(|n| *n == "newRideRequest")
        .count();
    assert_eq!(offers, 1);

    // Past the window the same booking dispatches a fresh ride.
    h.clock.advance_secs(10);
    let third = h.send(user, Harness::book_ride_frame("CUS0065", "bike")).await;
    assert_eq!(third["alreadySent"], false);
    assert_ne!(third["rideId"], first["rideId"]);
}

#[tokio::test]
async fn wrong_otp_blocks_the_start() {
    let h = Harness::new();
    h.driver("DRV001", VehicleType::Bike, 500);
    h.user("CUS0065", 0);

    let (driver, _driver_rx) = h.connect();
    h.register_driver(driver, "DRV001").await;
    let (user, _user_rx) = h.connect();
    h.register_user(user, "CUS0065").await;

    h.send(user, Harness::book_ride_frame("CUS0065", "bike")).await;
    h.send(
        driver,
        json!({ "event": "acceptRide", "data": { "rideId": "RID000001", "driverId": "DRV001" } }),
    )
    .await;

    let ack = h
        .send(
            driver,
            json!({ "event": "otpVerified", "data": { "rideId": "RID000001", "driverId": "DRV001", "otp": "9999" } }),
        )
        .await;
    assert_eq!(ack["success"], false);

    // Correct code still works afterwards: the failed attempt changed
    // nothing.
    let ack = h
        .send(
            driver,
            json!({ "event": "otpVerified", "data": { "rideId": "RID000001", "driverId": "DRV001", "otp": "0065" } }),
        )
        .await;
    assert_eq!(ack["success"], true);
}

#[tokio::test]
async fn short_customer_ids_get_random_otps() {
    let h = Harness::new();
    h.driver("DRV001", VehicleType::Bike, 500);
    h.user("42", 0);

    let (user, _rx) = h.connect();
    h.register_user(user, "42").await;
    let ack = h.send(user, Harness::book_ride_frame("42", "bike")).await;

    let otp = ack["otp"].as_str().expect("otp");
    assert_eq!(otp.len(), 4);
    assert!(otp.bytes().all(|b| b.is_ascii_digit()));
}

#[tokio::test]
async fn cancel_after_start_settles_as_completion() {
    let h = Harness::new();
    h.driver("DRV001", VehicleType::Bike, 500);
    h.user("CUS0065", 0);

    let (driver, _driver_rx) = h.connect();
    h.register_driver(driver, "DRV001").await;
    let (user, mut user_rx) = h.connect();
    h.register_user(user, "CUS0065").await;

    h.send(user, Harness::book_ride_frame("CUS0065", "bike")).await;
    h.send(
        driver,
        json!({ "event": "acceptRide", "data": { "rideId": "RID000001", "driverId": "DRV001" } }),
    )
    .await;
    h.send(
        driver,
        json!({ "event": "otpVerified", "data": { "rideId": "RID000001", "driverId": "DRV001", "otp": "0065" } }),
    )
    .await;
    drain(&mut user_rx);

    // A cancel on a trip already underway settles through the completion
    // protocol with the recorded distance.
    let raid: dispatch_server::types::primitives::RideId =
        "RID000001".parse().expect("ride id");
    h.app.rides.cancel(&raid).await.expect("cancel settles");

    let ride = h
        .app
        .rides
        .get_ride(&raid)
        .await
        .expect("ride exists");
    assert_eq!(ride.status.as_str(), "completed");
    // Fare recomputed from the quoted 5.4 km: round(5.4 * 15) = 81.
    assert_eq!(ride.actual_fare.map(|f| f.get()), Some(81));

    let names = event_names(&drain(&mut user_rx));
    let bill = names.iter().position(|n| n == "billAlert").expect("billAlert");
    let completed = names
        .iter()
        .position(|n| n == "rideCompleted")
        .expect("rideCompleted");
    assert!(bill < completed, "billed before the completion notice");

    let driver = h
        .store
        .get_driver(&DriverId::new("DRV001"))
        .await
        .expect("read")
        .expect("exists");
    assert_eq!(driver.wallet.get(), 581, "fare credited on settlement");
    assert_eq!(driver.status, DriverStatus::Live);
}

#[tokio::test]
async fn wallet_payment_debits_the_passenger() {
    let h = Harness::new();
    h.driver("DRV001", VehicleType::Bike, 500);
    let user = h.user("CUS0065", 200);

    let (driver, _driver_rx) = h.connect();
    h.register_driver(driver, "DRV001").await;
    let (session, _user_rx) = h.connect();
    h.register_user(session, "CUS0065").await;

    let mut frame = Harness::book_ride_frame("CUS0065", "bike");
    frame["data"]["paymentMethod"] = json!("wallet");
    h.send(session, frame).await;

    h.send(
        driver,
        json!({ "event": "acceptRide", "data": { "rideId": "RID000001", "driverId": "DRV001" } }),
    )
    .await;
    h.send(
        driver,
        json!({
            "event": "driverCompletedRide",
            "data": { "rideId": "RID000001", "driverId": "DRV001", "distance": 5.4 }
        }),
    )
    .await;

    let balance = h
        .store
        .get_user_by_customer_id("CUS0065")
        .await
        .expect("read")
        .expect("exists")
        .wallet;
    assert_eq!(balance.get(), 200 - 81);
    assert_eq!(user.wallet.get(), 200, "snapshot from before is untouched");
}
