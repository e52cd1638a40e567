//! Application context: process-wide state and service wiring.
//!
//! Everything the handlers need travels inside one `Arc<App>` — no ambient
//! singletons. `start` performs the init-on-start duties (price cache,
//! timer recovery), `spawn_background` launches the periodic tasks, and
//! `shutdown` flushes in-memory-only state before the process exits.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use push_relay::PushSender;

use crate::api::auth::TokenSigner;
use crate::config::Settings;
use crate::dispatch::{ActiveRides, DedupMap, DispatchEngine};
use crate::error::Result;
use crate::gateway::Gateway;
use crate::hours::HoursService;
use crate::hours::timer::TimerWheel;
use crate::ports::clock::Clock;
use crate::ports::store::Store;
use crate::presence::PresenceRegistry;
use crate::presence::sweeper::Sweeper;
use crate::pricing::PricingCache;
use crate::rides::RideService;
use crate::types::primitives::Amount;
use crate::wallet::WalletLedger;

// ═══════════════════════════════════════════════════════════════════════════════
// APP
// ═══════════════════════════════════════════════════════════════════════════════

/// The assembled dispatch core.
pub struct App {
    /// Loaded configuration.
    pub settings: Settings,
    /// Persistence adapter.
    pub store: Arc<dyn Store>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Realtime connection registry.
    pub gateway: Arc<Gateway>,
    /// Price table cache.
    pub pricing: Arc<PricingCache>,
    /// Online-driver soft state.
    pub presence: Arc<PresenceRegistry>,
    /// Active-ride mirror.
    pub active: Arc<ActiveRides>,
    /// Booking dedup window.
    pub dedup: Arc<DedupMap>,
    /// Monetary ledger front door.
    pub wallet: Arc<WalletLedger>,
    /// Booking, fan-out and acceptance.
    pub dispatch: Arc<DispatchEngine>,
    /// Post-acceptance lifecycle.
    pub rides: Arc<RideService>,
    /// Working-hours timers.
    pub hours: Arc<HoursService>,
    /// Staleness sweeper.
    pub sweeper: Arc<Sweeper>,
    /// Session token signer.
    pub tokens: TokenSigner,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App").finish_non_exhaustive()
    }
}

impl App {
    /// Assemble the service graph.
    #[must_use]
    pub fn build(
        settings: Settings,
        store: Arc<dyn Store>,
        push: Arc<dyn PushSender>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let gateway = Arc::new(Gateway::new());
        let pricing = Arc::new(PricingCache::new());
        let presence = Arc::new(PresenceRegistry::new(
            clock.clone(),
            std::time::Duration::from_secs(settings.presence.offline_after_secs),
            std::time::Duration::from_secs(settings.presence.evict_after_secs),
            std::time::Duration::from_secs(settings.presence.user_track_ttl_secs),
        ));
        let active = Arc::new(ActiveRides::new());
        let dedup = Arc::new(DedupMap::new());
        let wallet = Arc::new(WalletLedger::new(
            store.clone(),
            gateway.clone(),
            clock.clone(),
        ));
        let wheel = Arc::new(TimerWheel::new(settings.working_hours.persist_every_secs));

        let dispatch = Arc::new(DispatchEngine::new(
            store.clone(),
            clock.clone(),
            pricing.clone(),
            gateway.clone(),
            push.clone(),
            presence.clone(),
            active.clone(),
            dedup.clone(),
            settings.dispatch.dedup_window(),
        ));
        let rides = Arc::new(RideService::new(
            store.clone(),
            clock.clone(),
            pricing.clone(),
            gateway.clone(),
            wallet.clone(),
            presence.clone(),
            active.clone(),
        ));
        let hours = Arc::new(HoursService::new(
            store.clone(),
            gateway.clone(),
            push,
            wallet.clone(),
            presence.clone(),
            wheel,
            Amount::saturating(settings.working_hours.shift_start_fee),
        ));
        let sweeper = Arc::new(Sweeper::new(
            presence.clone(),
            active.clone(),
            dedup.clone(),
            wallet.clone(),
            store.clone(),
            clock.clone(),
            std::time::Duration::from_secs(settings.presence.active_ride_ttl_secs),
            std::time::Duration::from_secs(settings.dispatch.dedup_ttl_secs),
        ));
        let tokens = TokenSigner::new(&settings.api.token_secret, settings.api.token_ttl_secs);

        Arc::new(Self {
            settings,
            store,
            clock,
            gateway,
            pricing,
            presence,
            active,
            dedup,
            wallet,
            dispatch,
            rides,
            hours,
            sweeper,
            tokens,
        })
    }

    /// Init-on-start duties: load the price cache, re-arm recovered timers.
    ///
    /// # Errors
    ///
    /// Returns store failures; the caller decides whether to keep serving
    /// with defaults or abort startup.
    pub async fn start(&self) -> Result<()> {
        self.pricing.load_from(self.store.as_ref()).await?;
        let recovered = self.hours.recover().await?;
        info!(recovered, "Dispatch core ready");
        Ok(())
    }

    /// Launch the periodic tasks: the one-second timer tick, the location
    /// broadcaster and the staleness sweeper.
    pub fn spawn_background(self: &Arc<Self>, cancel: &CancellationToken) {
        let app = self.clone();
        let token = cancel.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(std::time::Duration::from_secs(1));
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = tick.tick() => app.hours.tick_once().await,
                }
            }
        });

        let app = self.clone();
        let token = cancel.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(app.settings.presence.broadcast_interval());
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = tick.tick() => app.presence.broadcast_once(&app.gateway),
                }
            }
        });

        let app = self.clone();
        let token = cancel.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(app.settings.presence.sweep_interval());
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = tick.tick() => {
                        if let Err(err) = app.sweeper.sweep_once().await {
                            tracing::warn!(error = %err, "Sweep pass failed");
                        }
                    }
                }
            }
        });
    }

    /// Flush in-memory-only state before exit.
    pub async fn shutdown(&self) {
        self.hours.flush().await;
        info!("Dispatch core flushed");
    }
}
