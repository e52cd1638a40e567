//! Rideway dispatch core.
//!
//! The real-time backend of the Rideway ride-hailing platform: it matches
//! ride requests to eligible drivers, runs the ride lifecycle through to
//! billing, drives per-driver working-hours timers with automatic wallet
//! debits, and fans out live locations — over one WebSocket channel plus a
//! small REST surface.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                        DISPATCH CORE                           │
//! │  ┌──────────┐   ┌───────────┐   ┌─────────┐   ┌────────────┐  │
//! │  │ Realtime │──▶│   Event   │──▶│Dispatch/│──▶│   Wallet   │  │
//! │  │ Gateway  │   │  Router   │   │  Rides  │   │   Ledger   │  │
//! │  └──────────┘   └───────────┘   └─────────┘   └────────────┘  │
//! │        │              │              │               │        │
//! │        ▼              ▼              ▼               ▼        │
//! │  ┌──────────┐   ┌───────────┐   ┌─────────┐   ┌────────────┐  │
//! │  │ Presence │   │  Working  │   │  Store  │   │ Push Relay │  │
//! │  │ Registry │   │   Hours   │   │ (ports) │   │ (advisory) │  │
//! │  └──────────┘   └───────────┘   └─────────┘   └────────────┘  │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`types`] - domain types (enums, primitives, entities, events)
//! - [`error`] - layered error types
//! - [`config`] - configuration loading and validation
//! - [`ports`] - store and clock contracts
//! - [`store`] - PostgreSQL and in-memory adapters
//! - [`pricing`] - per-vehicle-type fare table
//! - [`wallet`] - monetary ledger front door
//! - [`dispatch`] - booking, dedup, fan-out, acceptance arbitration
//! - [`rides`] - post-acceptance lifecycle and the completion protocol
//! - [`hours`] - working-hours timers, warnings and auto-debit
//! - [`presence`] - driver soft state and live-location fan-out
//! - [`gateway`] - realtime sessions, rooms and the event router
//! - [`api`] - REST surface and the WebSocket endpoint
//! - [`app`] - process-wide wiring

pub mod api;
pub mod app;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod hours;
pub mod ports;
pub mod presence;
pub mod pricing;
pub mod rides;
pub mod store;
pub mod types;
pub mod wallet;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
