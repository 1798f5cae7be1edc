//! Message router - dispatches UI requests to the services
//!
//! Every request gets exactly one reply. Failures become `{ "error": ... }`
//! replies instead of escaping to the caller.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::domain::result::Result;
use crate::domain::{RefreshSchedule, Reply, Request, Response};
use crate::ports::{keys, KeyValueStore};
use crate::services::{BalanceService, CredentialVault, LogEvent, LoggingService, SyncScheduler};

pub struct MessageRouter {
    store: Arc<dyn KeyValueStore>,
    vault: Arc<CredentialVault>,
    balance: Arc<BalanceService>,
    scheduler: Arc<SyncScheduler>,
    event_log: Option<Arc<LoggingService>>,
}

impl MessageRouter {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        vault: Arc<CredentialVault>,
        balance: Arc<BalanceService>,
        scheduler: Arc<SyncScheduler>,
    ) -> Self {
        Self {
            store,
            vault,
            balance,
            scheduler,
            event_log: None,
        }
    }

    pub fn with_event_log(mut self, event_log: Arc<LoggingService>) -> Self {
        self.event_log = Some(event_log);
        self
    }

    /// Parse a raw message and dispatch it
    pub async fn dispatch_json(&self, raw: JsonValue) -> Reply {
        match Request::from_json(raw) {
            Ok(request) => self.dispatch(request).await,
            Err(e) => {
                tracing::warn!(error = %e, "rejected message");
                self.record_failure(None, &e.to_string());
                Reply::from(Err(e))
            }
        }
    }

    pub async fn dispatch(&self, request: Request) -> Reply {
        let action = request.action();
        tracing::debug!(action, "handling request");

        let result = self.handle(request).await;
        if let Err(e) = &result {
            tracing::warn!(action, error = %e, "request failed");
            self.record_failure(Some(action), &e.to_string());
        }
        Reply::from(result)
    }

    async fn handle(&self, request: Request) -> Result<Response> {
        match request {
            Request::ForceRefresh => Ok(Response::Balance(self.balance.fetch_balance().await?)),
            Request::ValidateApiKey { api_key } => Ok(Response::Validation {
                success: self.balance.validate_credential(&api_key).await?,
            }),
            Request::GetBalance => self.balance_state().await,
            Request::SetApiKey { key } => {
                self.vault.replace_credential(&key).await?;
                Ok(Response::Balance(self.balance.fetch_balance().await?))
            }
            Request::SetRefreshInterval { interval } => {
                let schedule = RefreshSchedule::clamped(interval);
                if i64::from(schedule.interval_minutes) != interval {
                    tracing::info!(
                        requested = interval,
                        applied = schedule.interval_minutes,
                        "refresh interval clamped"
                    );
                }
                self.store
                    .set(HashMap::from([(
                        keys::REFRESH_INTERVAL.to_string(),
                        JsonValue::from(schedule.interval_minutes),
                    )]))
                    .await?;
                self.scheduler.arm(schedule)?;
                Ok(Response::Ack(true))
            }
        }
    }

    /// Never fails: an unreadable credential reads as "no key"
    async fn balance_state(&self) -> Result<Response> {
        let has_api_key = match self.vault.has_credential().await {
            Ok(has) => has,
            Err(e) => {
                tracing::warn!(error = %e, "could not read stored credential");
                false
            }
        };
        Ok(Response::BalanceState {
            balance: self.balance.snapshot(),
            has_api_key,
        })
    }

    fn record_failure(&self, action: Option<&str>, message: &str) {
        let Some(log) = &self.event_log else {
            return;
        };
        let mut event = LogEvent::new("request_failed").with_error(message);
        if let Some(action) = action {
            event = event.with_action(action);
        }
        if let Err(e) = log.log(event) {
            tracing::debug!(error = %e, "failed to write event log");
        }
    }
}
