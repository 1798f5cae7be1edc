//! End-to-end tests for the monitor: message contract, persistence across
//! restarts, and timer behavior

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use tally_core::adapters::file_store::JsonFileStore;
use tally_core::adapters::indicator::RecordingIndicator;
use tally_core::adapters::memory_store::MemoryStore;
use tally_core::config::Config;
use tally_core::domain::BadgeColor;
use tally_core::ports::{keys, BalanceInfo, BalanceProvider, BalanceResponse, KeyValueStore};
use tally_core::services::{KEEP_ALIVE_TIMER, REFRESH_TIMER};
use tally_core::{Activation, Envelope, Error, Monitor, MonitorEvent, Reply, Request, Response};

/// Provider that answers from memory and counts calls
struct FakeProvider {
    calls: AtomicUsize,
    failing: AtomicBool,
    total: Mutex<Decimal>,
    seen_keys: Mutex<Vec<String>>,
}

impl FakeProvider {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            total: Mutex::new(Decimal::new(4250, 2)),
            seen_keys: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn set_total(&self, total: Decimal) {
        *self.total.lock().unwrap() = total;
    }
}

#[async_trait]
impl BalanceProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    async fn fetch(&self, api_key: &str) -> tally_core::Result<BalanceResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_keys.lock().unwrap().push(api_key.to_string());

        if !api_key.starts_with("sk-") {
            return Err(Error::AuthRejected("HTTP 401".to_string()));
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::transport("DeepSeek API error: HTTP 503"));
        }
        let total = *self.total.lock().unwrap();
        Ok(BalanceResponse {
            is_available: true,
            balance_infos: vec![BalanceInfo {
                currency: "CNY".to_string(),
                total_balance: Some(total),
                granted_balance: Some(Decimal::ZERO),
                topped_up_balance: Some(total),
            }],
        })
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    provider: Arc<FakeProvider>,
    indicator: Arc<RecordingIndicator>,
    monitor: Monitor,
}

fn harness_with_store(store: Arc<MemoryStore>) -> Harness {
    let provider = FakeProvider::new();
    let indicator = Arc::new(RecordingIndicator::new());
    let monitor = Monitor::new(
        Config::default(),
        store.clone(),
        provider.clone(),
        indicator.clone(),
        None,
    );
    Harness {
        store,
        provider,
        indicator,
        monitor,
    }
}

fn harness() -> Harness {
    harness_with_store(Arc::new(MemoryStore::new()))
}

fn minutes(n: u64) -> Duration {
    Duration::from_secs(n * 60)
}

#[tokio::test]
async fn test_get_balance_before_key_is_set() {
    let h = harness();
    h.monitor.activate(Activation::Install).await.unwrap();

    let reply = h.monitor.handle_json(json!({ "action": "getBalance" })).await;

    assert_eq!(reply, json!({ "balance": null, "hasApiKey": false }));
    assert_eq!(h.provider.calls(), 0);
    assert_eq!(h.indicator.last().unwrap().text, "!");
}

#[tokio::test]
async fn test_install_writes_default_interval() {
    let h = harness();
    h.monitor.activate(Activation::Install).await.unwrap();

    let contents = h.store.contents();
    assert_eq!(contents[keys::REFRESH_INTERVAL], json!(5));
    assert!(contents.contains_key(keys::ENCRYPTION_KEY));
    assert!(!contents.contains_key(keys::CIPHERTEXT));
}

#[tokio::test]
async fn test_set_key_then_force_refresh() {
    let h = harness();
    h.monitor.activate(Activation::Install).await.unwrap();

    let first = h
        .monitor
        .handle_json(json!({ "action": "setApiKey", "key": "sk-abc" }))
        .await;
    assert_eq!(first["total"], json!("42.50"));
    assert_eq!(first["currency"], json!("CNY"));

    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = h.monitor.handle_json(json!({ "action": "forceRefresh" })).await;

    let first_updated: chrono::DateTime<chrono::Utc> =
        serde_json::from_value(first["lastUpdated"].clone()).unwrap();
    let second_updated: chrono::DateTime<chrono::Utc> =
        serde_json::from_value(second["lastUpdated"].clone()).unwrap();
    assert!(second_updated > first_updated);

    // The plaintext never reaches the store
    let stored = serde_json::to_string(&h.store.contents()).unwrap();
    assert!(!stored.contains("sk-abc"));
    assert_eq!(h.provider.seen_keys.lock().unwrap().last().unwrap(), "sk-abc");

    let balance = h.monitor.handle_json(json!({ "action": "getBalance" })).await;
    assert_eq!(balance["hasApiKey"], json!(true));
    assert_eq!(balance["balance"]["total"], json!("42.50"));
}

#[tokio::test]
async fn test_failed_refresh_keeps_snapshot() {
    let h = harness();
    h.monitor
        .handle(Request::SetApiKey {
            key: "sk-abc".to_string(),
        })
        .await;
    let before = h.monitor.balance().snapshot().unwrap();
    let mut events = h.monitor.subscribe();

    h.provider.fail(true);
    let reply = h.monitor.handle(Request::ForceRefresh).await;

    match reply {
        Reply::Err { error } => assert!(error.contains("503"), "got {}", error),
        other => panic!("expected error reply, got {:?}", other),
    }
    let state = h.monitor.balance().current();
    assert_eq!(state.snapshot, Some(before));
    assert!(state.last_error.is_some());
    assert!(matches!(
        events.recv().await.unwrap(),
        MonitorEvent::BalanceError { .. }
    ));
    assert_eq!(h.indicator.last().unwrap().tooltip, "Failed to fetch balance");
}

#[tokio::test]
async fn test_low_balance_badge() {
    let h = harness();
    h.provider.set_total(Decimal::new(500, 2));

    h.monitor
        .handle(Request::SetApiKey {
            key: "sk-abc".to_string(),
        })
        .await;

    let shown = h.indicator.last().unwrap();
    assert_eq!(shown.text, "5.00");
    assert_eq!(shown.color, Some(BadgeColor::Low));
    assert!(shown.tooltip.starts_with("Balance: 5.00 CNY | Last updated: "));
}

#[tokio::test]
async fn test_set_api_key_rotates_encryption_key() {
    let h = harness();
    h.monitor.activate(Activation::Install).await.unwrap();
    h.monitor
        .handle(Request::SetApiKey {
            key: "sk-old".to_string(),
        })
        .await;
    let old = h.store.contents();

    h.monitor
        .handle(Request::SetApiKey {
            key: "sk-new".to_string(),
        })
        .await;
    let new = h.store.contents();

    assert_ne!(old[keys::ENCRYPTION_KEY], new[keys::ENCRYPTION_KEY]);
    assert_eq!(
        h.monitor.vault().get_credential().await.unwrap().as_deref(),
        Some("sk-new")
    );

    // Old ciphertext under the new key reads as absent
    h.store
        .set(
            [
                (keys::CIPHERTEXT.to_string(), old[keys::CIPHERTEXT].clone()),
                (keys::NONCE.to_string(), old[keys::NONCE].clone()),
            ]
            .into(),
        )
        .await
        .unwrap();
    assert_eq!(h.monitor.vault().get_credential().await.unwrap(), None);
}

#[tokio::test]
async fn test_empty_key_rejected_before_storage() {
    let h = harness();
    h.monitor.activate(Activation::Install).await.unwrap();
    let before = h.store.contents();

    let reply = h
        .monitor
        .handle_json(json!({ "action": "setApiKey", "key": "  " }))
        .await;

    assert!(reply["error"].as_str().unwrap().contains("empty"));
    assert_eq!(h.store.contents(), before);
    assert_eq!(h.provider.calls(), 0);
}

#[tokio::test]
async fn test_restart_rehydrates_key_and_credential() {
    let h = harness();
    h.monitor.activate(Activation::Install).await.unwrap();
    h.monitor
        .handle(Request::SetApiKey {
            key: "sk-abc".to_string(),
        })
        .await;
    let persisted = h.store.contents();
    h.monitor.shutdown();
    drop(h);

    // A new process with only the persisted store
    let restarted = harness_with_store(Arc::new(MemoryStore::with_entries(persisted.clone())));
    restarted.monitor.activate(Activation::Startup).await.unwrap();

    assert_eq!(
        restarted.store.contents()[keys::ENCRYPTION_KEY],
        persisted[keys::ENCRYPTION_KEY]
    );
    assert_eq!(
        restarted.monitor.vault().get_credential().await.unwrap().as_deref(),
        Some("sk-abc")
    );
    // Startup performs the initial refresh on its own
    assert_eq!(restarted.provider.calls(), 1);
    assert!(restarted.monitor.balance().snapshot().is_some());
}

#[tokio::test]
async fn test_unknown_action() {
    let h = harness();

    let reply = h.monitor.handle_json(json!({ "action": "mineBitcoin" })).await;
    assert_eq!(reply, json!({ "error": "Unknown action: mineBitcoin" }));

    let reply = h.monitor.handle_json(json!({ "key": "sk-abc" })).await;
    assert!(reply["error"].as_str().unwrap().starts_with("Unknown action"));
    assert_eq!(h.provider.calls(), 0);
}

#[tokio::test]
async fn test_validate_api_key_leaves_state_alone() {
    let h = harness();
    h.monitor.activate(Activation::Install).await.unwrap();
    let before = h.store.contents();

    let good = h
        .monitor
        .handle_json(json!({ "action": "validateApiKey", "apiKey": "sk-candidate" }))
        .await;
    let bad = h
        .monitor
        .handle_json(json!({ "action": "validateApiKey", "apiKey": "nope" }))
        .await;

    assert_eq!(good, json!({ "success": true }));
    assert_eq!(bad, json!({ "success": false }));
    assert_eq!(h.store.contents(), before);
    assert!(h.monitor.balance().snapshot().is_none());

    h.provider.fail(true);
    let unreachable = h
        .monitor
        .handle_json(json!({ "action": "validateApiKey", "apiKey": "sk-candidate" }))
        .await;
    assert!(unreachable.get("error").is_some());
}

#[tokio::test(start_paused = true)]
async fn test_set_refresh_interval_clamps_and_rearms() {
    let h = harness();
    h.monitor.activate(Activation::Install).await.unwrap();

    let reply = h
        .monitor
        .handle_json(json!({ "action": "setRefreshInterval", "interval": 0 }))
        .await;
    assert_eq!(reply, json!(true));
    assert_eq!(h.store.contents()[keys::REFRESH_INTERVAL], json!(1));
    assert_eq!(h.monitor.scheduler().refresh_period(), Some(minutes(1)));

    h.monitor
        .handle_json(json!({ "action": "setRefreshInterval", "interval": "99999" }))
        .await;
    assert_eq!(h.store.contents()[keys::REFRESH_INTERVAL], json!(1440));
    assert_eq!(h.monitor.scheduler().refresh_period(), Some(minutes(1440)));
}

#[tokio::test(start_paused = true)]
async fn test_timer_cadence_after_rearm() {
    let h = harness();
    h.monitor
        .handle(Request::SetApiKey {
            key: "sk-abc".to_string(),
        })
        .await;
    assert_eq!(h.provider.calls(), 1);

    h.monitor
        .handle(Request::SetRefreshInterval { interval: 5 })
        .await;
    h.monitor
        .handle(Request::SetRefreshInterval { interval: 5 })
        .await;

    tokio::time::sleep(minutes(5) + Duration::from_secs(1)).await;
    assert_eq!(h.provider.calls(), 2);

    tokio::time::sleep(minutes(5)).await;
    assert_eq!(h.provider.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_tick_failure_does_not_cancel_schedule() {
    let h = harness();
    h.monitor
        .handle(Request::SetApiKey {
            key: "sk-abc".to_string(),
        })
        .await;
    h.monitor.activate(Activation::Startup).await.unwrap();
    let calls_after_activation = h.provider.calls();
    let before = h.monitor.handle_json(json!({ "action": "getBalance" })).await;
    assert!(before["balance"].is_object());

    h.provider.fail(true);
    tokio::time::sleep(minutes(5) + Duration::from_secs(1)).await;
    assert_eq!(h.provider.calls(), calls_after_activation + 1);
    let after_failure = h.monitor.handle_json(json!({ "action": "getBalance" })).await;
    assert_eq!(after_failure, before);
    assert!(h.monitor.balance().current().last_error.is_some());

    h.provider.fail(false);
    tokio::time::sleep(minutes(5)).await;

    assert_eq!(h.provider.calls(), calls_after_activation + 2);
    assert!(h.monitor.balance().current().last_error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_running_monitor_follows_interval_set_elsewhere() {
    let store = Arc::new(MemoryStore::new());
    let daemon = harness_with_store(store.clone());
    daemon.monitor.activate(Activation::Install).await.unwrap();
    assert_eq!(daemon.monitor.scheduler().refresh_period(), Some(minutes(5)));

    // A one-shot command on the same store
    let command = harness_with_store(store.clone());
    command
        .monitor
        .handle(Request::SetRefreshInterval { interval: 1 })
        .await;
    command.monitor.shutdown();

    tokio::time::sleep(minutes(5) + Duration::from_secs(1)).await;

    assert_eq!(store.contents()[keys::REFRESH_INTERVAL], json!(1));
    assert_eq!(daemon.monitor.scheduler().refresh_period(), Some(minutes(1)));
}

#[tokio::test]
async fn test_unreadable_encryption_key_reads_as_no_key() {
    let h = harness();
    h.monitor
        .handle(Request::SetApiKey {
            key: "sk-abc".to_string(),
        })
        .await;
    h.store
        .set([(keys::ENCRYPTION_KEY.to_string(), json!("dG9vIHNob3J0"))].into())
        .await
        .unwrap();

    let reply = h.monitor.handle(Request::ForceRefresh).await;
    assert_eq!(
        reply,
        Reply::Err {
            error: "API key is not set".to_string()
        }
    );
    assert_eq!(h.indicator.last().unwrap().text, "!");

    // Startup replaces the key and drops what was sealed under it
    h.monitor.activate(Activation::Startup).await.unwrap();
    let contents = h.store.contents();
    assert_ne!(contents[keys::ENCRYPTION_KEY], json!("dG9vIHNob3J0"));
    assert!(!contents.contains_key(keys::CIPHERTEXT));
    assert!(!contents.contains_key(keys::NONCE));
    h.monitor.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_set_api_key_on_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonFileStore::new(dir.path()).unwrap());
    let monitor = Arc::new(Monitor::new(
        Config::default(),
        store,
        FakeProvider::new(),
        Arc::new(RecordingIndicator::new()),
        None,
    ));

    for round in 0..10 {
        let keys_sent = [format!("sk-a-{}", round), format!("sk-b-{}", round)];
        let tasks: Vec<_> = keys_sent
            .iter()
            .cloned()
            .map(|key| {
                let monitor = monitor.clone();
                tokio::spawn(async move { monitor.handle(Request::SetApiKey { key }).await })
            })
            .collect();
        for task in tasks {
            assert!(!task.await.unwrap().is_error());
        }

        let stored = monitor.vault().get_credential().await.unwrap();
        assert!(
            stored.as_ref().is_some_and(|k| keys_sent.contains(k)),
            "round {}: {:?}",
            round,
            stored
        );
    }
    monitor.shutdown();
}

#[tokio::test]
async fn test_activate_twice_arms_each_timer_once() {
    let h = harness();
    h.monitor.activate(Activation::Install).await.unwrap();
    h.monitor.activate(Activation::Startup).await.unwrap();

    let status = h.monitor.status().await.unwrap();
    let names: Vec<&str> = status.timers.iter().map(|t| t.name).collect();
    assert_eq!(names, vec![REFRESH_TIMER, KEEP_ALIVE_TIMER]);
    assert_eq!(status.refresh_interval_minutes, 5);
    assert!(!status.has_api_key);
    assert!(status.key_fingerprint.is_some());

    h.monitor.shutdown();
    assert!(h.monitor.status().await.unwrap().timers.is_empty());
}

#[tokio::test]
async fn test_reset_clears_credential() {
    let h = harness();
    h.monitor
        .handle(Request::SetApiKey {
            key: "sk-abc".to_string(),
        })
        .await;

    h.monitor.reset().await.unwrap();

    let contents = h.store.contents();
    assert!(!contents.contains_key(keys::CIPHERTEXT));
    assert!(!contents.contains_key(keys::ENCRYPTION_KEY));
    assert_eq!(h.indicator.last().unwrap().text, "!");
    let reply = h.monitor.handle(Request::ForceRefresh).await;
    assert_eq!(
        reply,
        Reply::Err {
            error: "API key is not set".to_string()
        }
    );
}

#[tokio::test]
async fn test_serve_answers_every_envelope() {
    let h = Arc::new(harness());
    let (sender, receiver) = mpsc::channel(8);

    let server = {
        let h = Arc::clone(&h);
        tokio::spawn(async move { h.monitor.serve(receiver).await })
    };

    let mut replies = Vec::new();
    for message in [
        json!({ "action": "getBalance" }),
        json!({ "action": "setRefreshInterval", "interval": 7 }),
        json!({ "action": "bogus" }),
    ] {
        let (envelope, reply) = Envelope::new(message);
        sender.send(envelope).await.unwrap();
        replies.push(reply);
    }

    let mut answers: Vec<Value> = Vec::new();
    for reply in replies {
        answers.push(reply.await.unwrap().to_json());
    }
    drop(sender);
    server.await.unwrap();

    assert_eq!(answers[0], json!({ "balance": null, "hasApiKey": false }));
    assert_eq!(answers[1], json!(true));
    assert!(answers[2].get("error").is_some());
}

#[tokio::test]
async fn test_response_shapes() {
    let h = harness();
    let reply = h.monitor.handle(Request::GetBalance).await;
    assert_eq!(
        reply,
        Reply::Ok(Response::BalanceState {
            balance: None,
            has_api_key: false
        })
    );
}
