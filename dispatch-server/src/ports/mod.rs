//! Port traits decoupling the core from infrastructure.
//!
//! - [`store`] - persistence contracts (drivers, users, rides, ledger,
//!   locations, counters, pricing)
//! - [`clock`] - wall-clock and monotonic time

pub mod clock;
pub mod store;

pub use clock::{Clock, FakeClock, SystemClock};
pub use store::{
    CounterStore, DriverStore, LedgerStore, LocationStore, PricingStore, RideStore, Store,
    UserStore,
};
