//! Tally Core - credential vault and balance synchronization engine
//!
//! This crate implements the monitor following hexagonal architecture:
//!
//! - **domain**: Core entities (BalanceSnapshot, EncryptionKey, Request, etc.)
//! - **ports**: Trait definitions for the host (KeyValueStore, BalanceProvider, IndicatorSink)
//! - **services**: Key store, vault, balance, scheduler, router
//! - **adapters**: Concrete implementations (JSON file store, DeepSeek client, etc.)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

use adapters::deepseek::DeepSeekClient;
use adapters::file_store::JsonFileStore;
use config::Config;
use domain::RefreshSchedule;
use ports::{keys, BalanceProvider, IndicatorSink, KeyValueStore};
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::{Error, OperationResult, Result};
pub use domain::{BalanceSnapshot, Indicator, Reply, Request, Response};
pub use services::{MonitorEvent, StatusSummary};

/// Why the monitor is being (re)started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// First run: default settings are written
    Install,
    /// Any later start, including resuming after the host reclaimed the process
    Startup,
}

/// One request on the message channel, answered exactly once through `reply`
#[derive(Debug)]
pub struct Envelope {
    pub id: Uuid,
    pub message: JsonValue,
    pub reply: oneshot::Sender<Reply>,
}

impl Envelope {
    pub fn new(message: JsonValue) -> (Self, oneshot::Receiver<Reply>) {
        let (reply, receiver) = oneshot::channel();
        let envelope = Self {
            id: Uuid::new_v4(),
            message,
            reply,
        };
        (envelope, receiver)
    }
}

/// Main entry point for the background monitor
///
/// Holds the host capabilities and every service. All state that must
/// survive a restart lives in the key-value store; the rest is rebuilt by
/// [`Monitor::activate`].
pub struct Monitor {
    pub config: Config,
    store: Arc<dyn KeyValueStore>,
    vault: Arc<CredentialVault>,
    balance: Arc<BalanceService>,
    scheduler: Arc<SyncScheduler>,
    router: Arc<MessageRouter>,
    status_service: StatusService,
}

impl Monitor {
    /// Wire a monitor from explicit host capabilities
    pub fn new(
        config: Config,
        store: Arc<dyn KeyValueStore>,
        provider: Arc<dyn BalanceProvider>,
        indicator: Arc<dyn IndicatorSink>,
        event_log: Option<Arc<LoggingService>>,
    ) -> Self {
        let key_store = Arc::new(KeyStore::new(Arc::clone(&store)));
        let vault = Arc::new(CredentialVault::new(Arc::clone(&store), Arc::clone(&key_store)));

        let mut balance = BalanceService::new(
            Arc::clone(&vault),
            provider,
            indicator,
            config.currency.clone(),
            config.low_balance_threshold,
        );
        if let Some(log) = &event_log {
            balance = balance.with_event_log(Arc::clone(log));
        }
        let balance = Arc::new(balance);

        let scheduler = Arc::new(SyncScheduler::new(
            Arc::clone(&balance),
            Arc::clone(&store),
            config.keep_alive,
        ));

        let mut router = MessageRouter::new(
            Arc::clone(&store),
            Arc::clone(&vault),
            Arc::clone(&balance),
            Arc::clone(&scheduler),
        );
        if let Some(log) = event_log {
            router = router.with_event_log(log);
        }

        let status_service = StatusService::new(
            Arc::clone(&store),
            key_store,
            Arc::clone(&vault),
            Arc::clone(&balance),
            Arc::clone(&scheduler),
        );

        Self {
            config,
            store,
            vault,
            balance,
            scheduler,
            router: Arc::new(router),
            status_service,
        }
    }

    /// Open the monitor on a data directory: `storage.json` plus the
    /// DeepSeek client configured from `settings.json`
    pub fn open(
        tally_dir: &Path,
        indicator: Arc<dyn IndicatorSink>,
        event_log: Option<Arc<LoggingService>>,
    ) -> anyhow::Result<Self> {
        let config = Config::load(tally_dir)?;
        let store = Arc::new(JsonFileStore::new(tally_dir)?);
        let provider = Arc::new(DeepSeekClient::new_with_base_url(
            &config.api_base_url,
            config.request_timeout,
        )?);
        Ok(Self::new(config, store, provider, indicator, event_log))
    }

    /// Bring the monitor up
    ///
    /// Safe to call on every start: the key is reloaded rather than
    /// regenerated and timers are re-armed rather than duplicated. A failed
    /// initial refresh is logged, not returned.
    pub async fn activate(&self, activation: Activation) -> Result<()> {
        self.vault.ensure_key().await?;

        let stored = self.store.get_one(keys::REFRESH_INTERVAL).await?;
        if activation == Activation::Install && stored.is_none() {
            let default = RefreshSchedule::default();
            self.store
                .set(
                    [(
                        keys::REFRESH_INTERVAL.to_string(),
                        JsonValue::from(default.interval_minutes),
                    )]
                    .into(),
                )
                .await?;
        }
        let schedule = RefreshSchedule::from_stored(stored.as_ref());

        self.scheduler.arm(schedule)?;
        self.scheduler.arm_keep_alive()?;
        tracing::info!(
            ?activation,
            interval_minutes = schedule.interval_minutes,
            "monitor activated"
        );

        if self.vault.has_credential().await? {
            if let Err(e) = self.balance.fetch_balance().await {
                tracing::warn!(error = %e, "initial refresh failed");
            }
        } else {
            self.balance.refresh_indicator().await?;
        }
        Ok(())
    }

    /// `Install` when nothing has been persisted yet, `Startup` otherwise
    pub async fn detect_activation(&self) -> Result<Activation> {
        let stored = self
            .store
            .get(&[keys::ENCRYPTION_KEY, keys::REFRESH_INTERVAL])
            .await?;
        Ok(if stored.is_empty() {
            Activation::Install
        } else {
            Activation::Startup
        })
    }

    pub async fn handle(&self, request: Request) -> Reply {
        self.router.dispatch(request).await
    }

    /// Handle a raw JSON message and return the JSON reply
    pub async fn handle_json(&self, message: JsonValue) -> JsonValue {
        self.router.dispatch_json(message).await.to_json()
    }

    /// Answer envelopes until every sender is dropped
    ///
    /// Requests are handled concurrently; each reply goes back on its own
    /// channel.
    pub async fn serve(&self, mut receiver: mpsc::Receiver<Envelope>) {
        while let Some(envelope) = receiver.recv().await {
            let router = Arc::clone(&self.router);
            tokio::spawn(async move {
                let Envelope { id, message, reply } = envelope;
                let response = router.dispatch_json(message).await;
                if reply.send(response).is_err() {
                    tracing::debug!(request = %id, "caller went away before the reply");
                }
            });
        }
        tracing::debug!("message channel closed");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.balance.subscribe()
    }

    pub async fn status(&self) -> Result<StatusSummary> {
        self.status_service.get_status().await
    }

    /// Remove the stored credential and its key
    pub async fn reset(&self) -> Result<()> {
        self.vault.reset_credential().await?;
        self.balance.refresh_indicator().await?;
        Ok(())
    }

    /// Cancel every timer
    pub fn shutdown(&self) {
        self.scheduler.disarm_all();
        tracing::info!("monitor shut down");
    }

    pub fn vault(&self) -> &CredentialVault {
        &self.vault
    }

    pub fn balance(&self) -> &BalanceService {
        &self.balance
    }

    pub fn scheduler(&self) -> &SyncScheduler {
        &self.scheduler
    }
}
