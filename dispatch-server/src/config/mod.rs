//! Configuration loading and validation.

mod settings;

pub use settings::{
    ApiSettings, DatabaseSettings, DispatchSettings, LoggingSettings, PresenceSettings,
    PushSettings, Settings, WorkingHoursSettings,
};
