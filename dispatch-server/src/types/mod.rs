//! Domain types: enums, invariant-carrying primitives, persisted entities
//! and the realtime event protocol.

pub mod entities;
pub mod enums;
pub mod events;
pub mod primitives;

pub use entities::{
    Driver, HoursPatch, LocationSample, Place, Rejection, Ride, TimerSnapshot, Transaction, User,
    WalletReceipt,
};
pub use enums::{
    DriverStatus, PaymentMethod, RideStatus, SubjectKind, TxKind, TxMethod, VehicleType,
};
pub use events::{InboundEvent, InboundFrame, OutboundEvent};
pub use primitives::{Amount, CustomerId, DriverId, GeoPoint, Otp, RideId};
