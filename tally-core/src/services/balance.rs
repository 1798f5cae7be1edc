//! Balance service - fetches the balance and publishes the outcome
//!
//! Every fetch ends in exactly one publication: on success the snapshot is
//! replaced wholesale, the indicator is redrawn, and `BalanceUpdated` is
//! broadcast. On failure the previous snapshot is left untouched, the error
//! is recorded, and `BalanceError` is broadcast.

use std::sync::{Arc, RwLock, RwLockWriteGuard};

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::domain::result::{Error, Result};
use crate::domain::{BalanceSnapshot, Indicator, IndicatorInput};
use crate::ports::{BalanceProvider, IndicatorSink};
use crate::services::{CredentialVault, LogEvent, LoggingService};

/// Capacity of the event channel; slow subscribers lose the oldest events
const EVENT_CAPACITY: usize = 32;

/// Broadcast to every open UI surface
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum MonitorEvent {
    BalanceUpdated { balance: BalanceSnapshot },
    BalanceError { error: String },
}

/// Process-wide view of the last fetch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceState {
    pub snapshot: Option<BalanceSnapshot>,
    pub last_error: Option<String>,
    pub indicator: Option<Indicator>,
}

pub struct BalanceService {
    vault: Arc<CredentialVault>,
    provider: Arc<dyn BalanceProvider>,
    indicator: Arc<dyn IndicatorSink>,
    state: RwLock<BalanceState>,
    events: broadcast::Sender<MonitorEvent>,
    event_log: Option<Arc<LoggingService>>,
    currency: String,
    low_threshold: Decimal,
}

impl BalanceService {
    pub fn new(
        vault: Arc<CredentialVault>,
        provider: Arc<dyn BalanceProvider>,
        indicator: Arc<dyn IndicatorSink>,
        currency: impl Into<String>,
        low_threshold: Decimal,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            vault,
            provider,
            indicator,
            state: RwLock::new(BalanceState::default()),
            events,
            event_log: None,
            currency: currency.into(),
            low_threshold,
        }
    }

    /// Record fetch outcomes in the persistent event log as well
    pub fn with_event_log(mut self, event_log: Arc<LoggingService>) -> Self {
        self.event_log = Some(event_log);
        self
    }

    /// Fetch the balance with the stored credential and publish the result
    ///
    /// Concurrent calls are not coalesced; whichever finishes last is what
    /// the state shows.
    pub async fn fetch_balance(&self) -> Result<BalanceSnapshot> {
        let result = self.fetch_with_stored_credential().await;
        match &result {
            Ok(snapshot) => self.publish_success(snapshot),
            Err(e) => self.publish_failure(e),
        }
        result
    }

    /// Check whether `candidate` is accepted by the remote endpoint
    ///
    /// Leaves every piece of state alone. Transport problems are errors
    /// rather than a `false`, so "rejected" and "could not check" stay
    /// distinguishable.
    pub async fn validate_credential(&self, candidate: &str) -> Result<bool> {
        match self.provider.fetch(candidate).await {
            Ok(_) => Ok(true),
            Err(Error::AuthRejected(reason)) => {
                tracing::info!(provider = self.provider.name(), reason = %reason, "candidate API key rejected");
                Ok(false)
            }
            Err(Error::Validation(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Copy of the current state
    pub fn current(&self) -> BalanceState {
        self.state
            .read()
            .map(|s| s.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn snapshot(&self) -> Option<BalanceSnapshot> {
        self.current().snapshot
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    /// Redraw the indicator from the current state (after a restart or a
    /// credential change)
    ///
    /// With a credential but no snapshot yet there is nothing to draw.
    pub async fn refresh_indicator(&self) -> Result<Option<Indicator>> {
        let indicator = if !self.vault.has_credential().await? {
            Indicator::derive(IndicatorInput::NoCredential, self.low_threshold)
        } else if let Some(snapshot) = self.snapshot() {
            Indicator::derive(IndicatorInput::Snapshot(&snapshot), self.low_threshold)
        } else {
            return Ok(None);
        };
        self.show(indicator.clone());
        Ok(Some(indicator))
    }

    async fn fetch_with_stored_credential(&self) -> Result<BalanceSnapshot> {
        let api_key = self
            .vault
            .get_credential()
            .await?
            .ok_or(Error::CredentialMissing)?;

        let response = self.provider.fetch(&api_key).await?;
        Ok(BalanceSnapshot::from_response(&response, &self.currency, Utc::now()))
    }

    fn publish_success(&self, snapshot: &BalanceSnapshot) {
        let indicator = Indicator::derive(IndicatorInput::Snapshot(snapshot), self.low_threshold);
        {
            let mut state = self.state_mut();
            state.snapshot = Some(snapshot.clone());
            state.last_error = None;
        }
        self.show(indicator);

        tracing::info!(
            provider = self.provider.name(),
            currency = %snapshot.currency,
            "balance refreshed"
        );
        self.record(LogEvent::new("balance_refreshed").with_provider(self.provider.name()));

        // No receivers is fine
        let _ = self.events.send(MonitorEvent::BalanceUpdated {
            balance: snapshot.clone(),
        });
    }

    fn publish_failure(&self, error: &Error) {
        let input = match error {
            Error::CredentialMissing => IndicatorInput::NoCredential,
            _ => IndicatorInput::Error,
        };
        let indicator = Indicator::derive(input, self.low_threshold);
        self.state_mut().last_error = Some(error.to_string());
        self.show(indicator);

        tracing::warn!(provider = self.provider.name(), error = %error, "balance refresh failed");
        self.record(
            LogEvent::new("balance_refresh_failed")
                .with_provider(self.provider.name())
                .with_error(error.to_string()),
        );

        let _ = self.events.send(MonitorEvent::BalanceError {
            error: error.to_string(),
        });
    }

    fn show(&self, indicator: Indicator) {
        self.indicator.show(&indicator);
        self.state_mut().indicator = Some(indicator);
    }

    fn state_mut(&self) -> RwLockWriteGuard<'_, BalanceState> {
        self.state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, event: LogEvent) {
        if let Some(log) = &self.event_log {
            if let Err(e) = log.log(event) {
                tracing::debug!(error = %e, "failed to write event log");
            }
        }
    }
}
