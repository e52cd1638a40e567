//! Working-hours service.
//!
//! Drives the per-driver shift countdown: the go-online decision tree
//! (duplicate start, resume, new shift), tiered warnings, automatic
//! extension or stop at expiry, and the purchase operations. All wallet
//! movement goes through the ledger; the go-online path is the only debit
//! site for the shift-start fee.
//!
//! The driver row is the serialisation point for wallet and working-hours
//! mutations: every mutating operation here holds a per-driver async lock
//! for its full read-decide-write sequence, so two concurrent go-online
//! calls can never both take the new-shift branch.

pub mod timer;

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use push_relay::{PushMessage, PushSender};

use crate::error::{DomainError, Result};
use crate::gateway::{Gateway, Room};
use crate::ports::store::{DriverStore, Store};
use crate::presence::PresenceRegistry;
use crate::types::entities::{Driver, HoursPatch, TimerSnapshot};
use crate::types::enums::{DriverStatus, TxMethod};
use crate::types::events::{HoursWarningNotice, OutboundEvent};
use crate::types::primitives::{Amount, DriverId};
use crate::wallet::WalletLedger;

use timer::{TimerEntry, TimerWheel, warnings_already_past};

// ═══════════════════════════════════════════════════════════════════════════════
// OUTCOME
// ═══════════════════════════════════════════════════════════════════════════════

/// What a go-online call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOutcome {
    /// Fee taken (zero for duplicates and resumes).
    pub amount_deducted: Amount,
    /// Seconds on the countdown after the call.
    pub remaining_seconds: i64,
    /// Whether an interrupted shift was resumed.
    pub resumed: bool,
}

// ═══════════════════════════════════════════════════════════════════════════════
// HOURS SERVICE
// ═══════════════════════════════════════════════════════════════════════════════

/// Shift timer lifecycle and purchases.
pub struct HoursService {
    store: Arc<dyn Store>,
    gateway: Arc<Gateway>,
    push: Arc<dyn PushSender>,
    wallet: Arc<WalletLedger>,
    presence: Arc<PresenceRegistry>,
    wheel: Arc<TimerWheel>,
    shift_fee: Amount,
    /// Per-driver serialisation for the read-decide-write sequences. One
    /// entry per driver, kept for the process lifetime.
    row_locks: DashMap<DriverId, Arc<Mutex<()>>>,
}

impl std::fmt::Debug for HoursService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HoursService")
            .field("armed", &self.wheel.armed_count())
            .finish_non_exhaustive()
    }
}

impl HoursService {
    /// Wire up the service.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<Gateway>,
        push: Arc<dyn PushSender>,
        wallet: Arc<WalletLedger>,
        presence: Arc<PresenceRegistry>,
        wheel: Arc<TimerWheel>,
        shift_fee: Amount,
    ) -> Self {
        Self {
            store,
            gateway,
            push,
            wallet,
            presence,
            wheel,
            shift_fee,
            row_locks: DashMap::new(),
        }
    }

    fn row_lock(&self, id: &DriverId) -> Arc<Mutex<()>> {
        self.row_locks.entry(id.clone()).or_default().clone()
    }

    async fn load_driver(&self, id: &DriverId) -> Result<Driver> {
        self.store
            .get_driver(id)
            .await?
            .ok_or_else(|| DomainError::DriverNotFound(id.clone()).into())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // START / STOP
    // ═══════════════════════════════════════════════════════════════════════════

    /// Go-online decision tree, evaluated under the driver-row lock.
    ///
    /// 1. Running timer + armed wheel → duplicate start, idempotent success
    /// 2. Paused with seconds left → resume, no debit
    /// 3. Otherwise → new shift, fee debited before any state changes
    ///
    /// The lock spans the whole sequence: a second go-online racing this
    /// one waits, re-reads the row, and lands in the duplicate branch.
    ///
    /// # Errors
    ///
    /// `INSUFFICIENT_BALANCE` when a new shift cannot pay the fee (no
    /// mutation happens), plus store failures.
    #[instrument(skip(self), fields(driver_id = %driver_id))]
    pub async fn start(&self, driver_id: &DriverId) -> Result<StartOutcome> {
        let lock = self.row_lock(driver_id);
        let _row = lock.lock().await;

        let driver = self.load_driver(driver_id).await?;

        // Duplicate go-online from a flaky client: succeed without charging.
        if driver.status == DriverStatus::Live
            && driver.timer_active
            && self.wheel.is_armed(driver_id)
        {
            let remaining = self
                .wheel
                .get(driver_id)
                .map_or(driver.remaining_working_seconds, |e| e.remaining_seconds);
            return Ok(StartOutcome {
                amount_deducted: Amount::ZERO,
                remaining_seconds: remaining,
                resumed: false,
            });
        }

        if driver.is_resumable() {
            return self.resume_shift(&driver).await;
        }

        self.new_shift(&driver).await
    }

    async fn resume_shift(&self, driver: &Driver) -> Result<StartOutcome> {
        let remaining = driver.remaining_working_seconds;
        let warnings = driver.warnings_issued.max(warnings_already_past(remaining));

        self.store
            .update_hours(
                &driver.driver_id,
                &HoursPatch {
                    timer_active: Some(true),
                    warnings_issued: Some(warnings),
                    status: Some(DriverStatus::Live),
                    ..HoursPatch::default()
                },
            )
            .await?;
        self.wheel
            .arm(driver.driver_id.clone(), TimerEntry::new(remaining, warnings));
        self.presence
            .mark_status(&driver.driver_id, DriverStatus::Live);

        info!(driver_id = %driver.driver_id, remaining, "Shift resumed");
        Ok(StartOutcome {
            amount_deducted: Amount::ZERO,
            remaining_seconds: remaining,
            resumed: true,
        })
    }

    async fn new_shift(&self, driver: &Driver) -> Result<StartOutcome> {
        // Sole debit site for the shift-start fee. An insufficient balance
        // fails here, before any state is touched.
        self.wallet
            .debit(
                &driver.driver_id,
                self.shift_fee,
                TxMethod::ShiftStartFee,
                "Shift start fee",
                None,
            )
            .await?;

        let remaining = driver.working_seconds_limit();
        self.store
            .update_hours(
                &driver.driver_id,
                &HoursPatch {
                    remaining_working_seconds: Some(remaining),
                    timer_active: Some(true),
                    warnings_issued: Some(0),
                    extended_hours_purchased: Some(false),
                    status: Some(DriverStatus::Live),
                },
            )
            .await?;
        self.wheel
            .arm(driver.driver_id.clone(), TimerEntry::new(remaining, 0));
        self.presence
            .mark_status(&driver.driver_id, DriverStatus::Live);

        info!(driver_id = %driver.driver_id, remaining, "New shift started");
        Ok(StartOutcome {
            amount_deducted: self.shift_fee,
            remaining_seconds: remaining,
            resumed: false,
        })
    }

    /// Go-offline: pause semantics. The countdown stops, the remainder is
    /// persisted, and no money moves.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` for unknown drivers, plus store failures.
    #[instrument(skip(self), fields(driver_id = %driver_id))]
    pub async fn stop(&self, driver_id: &DriverId) -> Result<i64> {
        let lock = self.row_lock(driver_id);
        let _row = lock.lock().await;

        let driver = self.load_driver(driver_id).await?;

        let (remaining, warnings) = self.wheel.disarm(driver_id).map_or(
            (driver.remaining_working_seconds, driver.warnings_issued),
            |entry| (entry.remaining_seconds, entry.warnings_issued),
        );

        self.store
            .update_hours(
                driver_id,
                &HoursPatch {
                    remaining_working_seconds: Some(remaining),
                    timer_active: Some(false),
                    warnings_issued: Some(warnings),
                    status: Some(DriverStatus::Offline),
                    ..HoursPatch::default()
                },
            )
            .await?;
        self.presence.mark_status(driver_id, DriverStatus::Offline);

        info!(driver_id = %driver_id, remaining, "Shift paused");
        Ok(remaining)
    }

    /// Explicit pause; same semantics as [`Self::stop`].
    ///
    /// # Errors
    ///
    /// As [`Self::stop`].
    pub async fn pause(&self, driver_id: &DriverId) -> Result<i64> {
        self.stop(driver_id).await
    }

    /// Explicit resume; never debits. Fails when there is no interrupted
    /// shift to pick up.
    ///
    /// # Errors
    ///
    /// `INVALID_INPUT` when no paused shift exists.
    pub async fn resume(&self, driver_id: &DriverId) -> Result<StartOutcome> {
        let lock = self.row_lock(driver_id);
        let _row = lock.lock().await;

        let driver = self.load_driver(driver_id).await?;
        if !driver.is_resumable() {
            return Err(
                DomainError::InvalidInput("no paused shift to resume".into()).into(),
            );
        }
        self.resume_shift(&driver).await
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PURCHASES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Manual extension purchase: the deduction amount buys
    /// `additional_hours` and resets the warning ladder.
    ///
    /// # Errors
    ///
    /// `INSUFFICIENT_BALANCE`, `NOT_FOUND`, plus store failures.
    #[instrument(skip(self), fields(driver_id = %driver_id, additional_hours))]
    pub async fn extend(&self, driver_id: &DriverId, additional_hours: u32) -> Result<i64> {
        let lock = self.row_lock(driver_id);
        let _row = lock.lock().await;

        let driver = self.load_driver(driver_id).await?;
        let added = i64::from(additional_hours) * 3600;

        self.wallet
            .debit(
                driver_id,
                driver.deduction_amount,
                TxMethod::ExtendedHoursPurchase,
                &format!("Extended hours purchase ({additional_hours}h)"),
                None,
            )
            .await?;

        self.apply_purchase(&driver, added, true, true).await
    }

    /// Buy half the shift length extra.
    ///
    /// # Errors
    ///
    /// `INSUFFICIENT_BALANCE`, `NOT_FOUND`, plus store failures.
    #[instrument(skip(self), fields(driver_id = %driver_id))]
    pub async fn add_half_time(&self, driver_id: &DriverId) -> Result<i64> {
        let lock = self.row_lock(driver_id);
        let _row = lock.lock().await;

        let driver = self.load_driver(driver_id).await?;
        let added = driver.working_seconds_limit() / 2;

        self.wallet
            .debit(
                driver_id,
                driver.half_time_price(),
                TxMethod::ExtraHalfTime,
                "Extra half time",
                None,
            )
            .await?;

        self.apply_purchase(&driver, added, false, false).await
    }

    /// Buy the full shift length extra.
    ///
    /// # Errors
    ///
    /// `INSUFFICIENT_BALANCE`, `NOT_FOUND`, plus store failures.
    #[instrument(skip(self), fields(driver_id = %driver_id))]
    pub async fn add_full_time(&self, driver_id: &DriverId) -> Result<i64> {
        let lock = self.row_lock(driver_id);
        let _row = lock.lock().await;

        let driver = self.load_driver(driver_id).await?;
        let added = driver.working_seconds_limit();

        self.wallet
            .debit(
                driver_id,
                driver.full_time_price(),
                TxMethod::ExtraFullTime,
                "Extra full time",
                None,
            )
            .await?;

        self.apply_purchase(&driver, added, false, false).await
    }

    async fn apply_purchase(
        &self,
        driver: &Driver,
        added_seconds: i64,
        reset_warnings: bool,
        mark_extended: bool,
    ) -> Result<i64> {
        let base = self
            .wheel
            .get(&driver.driver_id)
            .map_or(driver.remaining_working_seconds, |e| e.remaining_seconds);
        let remaining = base + added_seconds;

        self.store
            .update_hours(
                &driver.driver_id,
                &HoursPatch {
                    remaining_working_seconds: Some(remaining),
                    warnings_issued: reset_warnings.then_some(0),
                    extended_hours_purchased: mark_extended.then_some(true),
                    ..HoursPatch::default()
                },
            )
            .await?;
        self.wheel
            .add_seconds(&driver.driver_id, added_seconds, reset_warnings);
        self.wheel.mark_persisted(&driver.driver_id);
        Ok(remaining)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // STATUS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Point-in-time timer snapshot, preferring the live wheel over the
    /// persisted row.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` for unknown drivers, plus store failures.
    pub async fn status(&self, driver_id: &DriverId) -> Result<TimerSnapshot> {
        let driver = self.load_driver(driver_id).await?;
        let (remaining, warnings, active) = self.wheel.get(driver_id).map_or(
            (
                driver.remaining_working_seconds,
                driver.warnings_issued,
                driver.timer_active,
            ),
            |e| (e.remaining_seconds, e.warnings_issued, true),
        );
        Ok(TimerSnapshot {
            remaining_seconds: remaining,
            timer_active: active,
            warnings_issued: warnings,
            working_hours_limit: driver.working_hours_limit,
            extended_hours_purchased: driver.extended_hours_purchased,
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // TICKING
    // ═══════════════════════════════════════════════════════════════════════════

    /// Advance every armed countdown by one second and apply the outcomes.
    /// Called by the timer task once per second and by tests directly.
    pub async fn tick_once(&self) {
        for outcome in self.wheel.tick_all() {
            if let Some(warning) = outcome.warning_due {
                self.deliver_warning(&outcome.driver_id, warning, outcome.remaining_seconds)
                    .await;
            }
            if outcome.expired {
                self.handle_expiry(&outcome.driver_id).await;
            } else if outcome.persist_due || outcome.warning_due.is_some() {
                self.persist_remaining(&outcome.driver_id).await;
            }
        }
    }

    async fn deliver_warning(&self, driver_id: &DriverId, warning: u8, remaining: i64) {
        self.wheel.mark_warned(driver_id, warning);

        let message = match warning {
            1 => "1 hour of working time remaining".to_string(),
            2 => "30 minutes of working time remaining".to_string(),
            _ => "10 minutes of working time remaining".to_string(),
        };
        info!(driver_id = %driver_id, warning, remaining, "Working-hours warning");

        self.gateway.emit_room(
            &Room::Driver(driver_id.clone()),
            &OutboundEvent::WorkingHoursWarning(HoursWarningNotice {
                driver_id: driver_id.clone(),
                warning,
                remaining_seconds: remaining,
                message: message.clone(),
            }),
            None,
        );

        // Push copy is advisory; failures are counted, never propagated.
        if let Ok(Some(driver)) = self.store.get_driver(driver_id).await {
            if let Some(token) = driver.push_token {
                let push = self.push.clone();
                let msg = PushMessage::new(token, "Working hours", message)
                    .with_data(json!({ "event": "workingHoursWarning", "warning": warning }));
                tokio::spawn(async move {
                    if let Err(err) = push.send(&msg).await {
                        metrics::counter!("push_send_failures").increment(1);
                        warn!(error = %err, "Push delivery failed");
                    }
                });
            }
        }
    }

    /// At expiry: extend for the deduction amount when the wallet covers
    /// it, otherwise force the driver offline.
    async fn handle_expiry(&self, driver_id: &DriverId) {
        // Same serialisation point as the go-online path: the auto-debit
        // must not interleave with a concurrent start or purchase.
        let lock = self.row_lock(driver_id);
        let _row = lock.lock().await;

        let driver = match self.store.get_driver(driver_id).await {
            Ok(Some(driver)) => driver,
            Ok(None) => {
                warn!(driver_id = %driver_id, "Expired timer for unknown driver");
                self.wheel.disarm(driver_id);
                return;
            }
            Err(err) => {
                // Store unavailable: leave the entry at zero; the next tick
                // pass skips it and expiry is re-attempted by re-arm.
                warn!(driver_id = %driver_id, error = %err, "Expiry handling deferred");
                return;
            }
        };

        let auto_debit = self
            .wallet
            .debit(
                driver_id,
                driver.deduction_amount,
                TxMethod::ExtendedHoursAutoDebit,
                "Automatic extended hours",
                None,
            )
            .await;

        match auto_debit {
            Ok(_) => {
                self.wheel.extend_after_expiry(driver_id);
                let remaining = self
                    .wheel
                    .get(driver_id)
                    .map_or(timer::AUTO_EXTENSION_SECONDS, |e| e.remaining_seconds);
                let patch = HoursPatch {
                    remaining_working_seconds: Some(remaining),
                    warnings_issued: Some(0),
                    extended_hours_purchased: Some(true),
                    ..HoursPatch::default()
                };
                if let Err(err) = self.store.update_hours(driver_id, &patch).await {
                    warn!(driver_id = %driver_id, error = %err, "Failed to persist auto-extension");
                }
                self.wheel.mark_persisted(driver_id);
                info!(driver_id = %driver_id, "Working hours auto-extended");
            }
            Err(err) => {
                // Unpayable: stop the shift.
                info!(driver_id = %driver_id, error = %err, "Auto-debit failed, stopping driver");
                self.wheel.disarm(driver_id);
                let patch = HoursPatch {
                    remaining_working_seconds: Some(0),
                    timer_active: Some(false),
                    status: Some(DriverStatus::Offline),
                    ..HoursPatch::default()
                };
                if let Err(err) = self.store.update_hours(driver_id, &patch).await {
                    warn!(driver_id = %driver_id, error = %err, "Failed to persist auto-stop");
                }
                self.presence.mark_status(driver_id, DriverStatus::Offline);
                self.gateway.emit_room(
                    &Room::Driver(driver_id.clone()),
                    &OutboundEvent::AutoStop {
                        driver_id: driver_id.clone(),
                        message: "Working hours exhausted and wallet balance too low".into(),
                    },
                    None,
                );
            }
        }
    }

    async fn persist_remaining(&self, driver_id: &DriverId) {
        let Some(entry) = self.wheel.get(driver_id) else {
            return;
        };
        let patch = HoursPatch {
            remaining_working_seconds: Some(entry.remaining_seconds),
            warnings_issued: Some(entry.warnings_issued),
            ..HoursPatch::default()
        };
        if let Err(err) = self.store.update_hours(driver_id, &patch).await {
            warn!(driver_id = %driver_id, error = %err, "Failed to persist timer remainder");
        } else {
            self.wheel.mark_persisted(driver_id);
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // RECOVERY & SHUTDOWN
    // ═══════════════════════════════════════════════════════════════════════════

    /// Re-arm countdowns for drivers whose timers were running when the
    /// process last stopped.
    ///
    /// # Errors
    ///
    /// Returns store failures; recovery is retried by a restart.
    pub async fn recover(&self) -> Result<usize> {
        let drivers = self.store.drivers_with_armed_timers().await?;
        let count = drivers.len();
        for driver in drivers {
            let warnings = driver
                .warnings_issued
                .max(warnings_already_past(driver.remaining_working_seconds));
            self.wheel.arm(
                driver.driver_id.clone(),
                TimerEntry::new(driver.remaining_working_seconds, warnings),
            );
        }
        if count > 0 {
            info!(count, "Re-armed working-hours timers");
        }
        Ok(count)
    }

    /// Persist every armed remainder; called on graceful shutdown.
    pub async fn flush(&self) {
        for driver_id in self.wheel.driver_ids() {
            self.persist_remaining(&driver_id).await;
        }
    }
}
