//! Status service - a read-only summary of the monitor

use std::sync::Arc;

use serde::Serialize;

use crate::domain::result::Result;
use crate::domain::{BalanceSnapshot, Indicator, RefreshSchedule};
use crate::ports::{keys, KeyValueStore};
use crate::services::{ArmedTimer, BalanceService, CredentialVault, KeyStore, SyncScheduler};

pub struct StatusService {
    store: Arc<dyn KeyValueStore>,
    key_store: Arc<KeyStore>,
    vault: Arc<CredentialVault>,
    balance: Arc<BalanceService>,
    scheduler: Arc<SyncScheduler>,
}

impl StatusService {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        key_store: Arc<KeyStore>,
        vault: Arc<CredentialVault>,
        balance: Arc<BalanceService>,
        scheduler: Arc<SyncScheduler>,
    ) -> Self {
        Self {
            store,
            key_store,
            vault,
            balance,
            scheduler,
        }
    }

    /// Summarize without side effects: no key is generated, nothing is fetched
    pub async fn get_status(&self) -> Result<StatusSummary> {
        let key_fingerprint = self.key_store.load_key().await?.map(|k| k.fingerprint());
        let has_api_key = self.vault.has_credential().await?;
        let schedule =
            RefreshSchedule::from_stored(self.store.get_one(keys::REFRESH_INTERVAL).await?.as_ref());
        let state = self.balance.current();

        Ok(StatusSummary {
            has_api_key,
            key_fingerprint,
            refresh_interval_minutes: schedule.interval_minutes,
            balance: state.snapshot,
            last_error: state.last_error,
            indicator: state.indicator,
            timers: self.scheduler.armed(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSummary {
    pub has_api_key: bool,
    pub key_fingerprint: Option<String>,
    pub refresh_interval_minutes: u32,
    pub balance: Option<BalanceSnapshot>,
    pub last_error: Option<String>,
    pub indicator: Option<Indicator>,
    pub timers: Vec<ArmedTimer>,
}
