//! Behavioural tests for the response cache.

use std::sync::Arc;
use std::time::Duration;

use manjaka_cache::{ResponseCache, ResponseCacheBuilder, TtlClass};
use manjaka_core::{ManualClock, Method, Params, RequestKey};
use pretty_assertions::assert_eq;
use regex::Regex;
use serde_json::json;

fn get_key(path: &str, params: Params) -> RequestKey {
    RequestKey::new(Method::GET, path, &params)
}

fn cache_with_clock(ttl: Duration) -> (ResponseCache, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let cache = ResponseCache::builder()
        .clock(clock.clone())
        .default_ttl(ttl)
        .build();
    (cache, clock)
}

#[test]
fn test_ttl_scenario() {
    let (cache, clock) = cache_with_clock(Duration::from_millis(5000));
    let accounts = get_key("/comptes", Params::new());

    cache.set(accounts.clone(), json!(["A", "B"]));

    clock.advance(Duration::from_millis(4000));
    assert_eq!(cache.get(&accounts), Some(json!(["A", "B"])));

    clock.advance(Duration::from_millis(2000));
    assert_eq!(cache.get(&accounts), None);
}

#[test]
fn test_read_exactly_at_expiry_is_absent() {
    let (cache, clock) = cache_with_clock(Duration::from_millis(5000));
    let key = get_key("/categories", Params::new());

    cache.set(key.clone(), json!([]));
    clock.advance(Duration::from_millis(4999));
    assert!(cache.get(&key).is_some());
    clock.advance(Duration::from_millis(1));
    assert!(cache.get(&key).is_none());
}

#[test]
fn test_per_key_ttl_override() {
    let (cache, clock) = cache_with_clock(TtlClass::Default.default_ttl());
    let categories = get_key("/categories", Params::new());
    let transactions = get_key("/transactions", Params::new().with("limit", 20));

    cache.set_with_ttl(categories.clone(), json!(["Dime"]), TtlClass::Static.default_ttl());
    cache.set_with_ttl(transactions.clone(), json!([]), TtlClass::Dynamic.default_ttl());

    clock.advance(Duration::from_secs(90));
    assert!(cache.get(&categories).is_some());
    assert!(cache.get(&transactions).is_none());

    clock.advance(Duration::from_secs(9 * 60));
    assert!(cache.get(&categories).is_none());
}

#[test]
fn test_invalidate_removes_value() {
    let (cache, _clock) = cache_with_clock(Duration::from_secs(60));
    let key = get_key("/comptes/3", Params::new());

    cache.set(key.clone(), json!({"solde": 1200}));
    assert!(cache.invalidate(&key));
    assert_eq!(cache.get(&key), None);
    assert!(!cache.invalidate(&key));
}

#[test]
fn test_invalidate_pattern_is_exact() {
    let (cache, _clock) = cache_with_clock(Duration::from_secs(60));
    let keys = [
        get_key("/transactions", Params::new().with("limit", 10)),
        get_key("/transactions/7", Params::new()),
        get_key("/stats/recapitulatif", Params::new().with("annee", 2024)),
        get_key("/comptes", Params::new()),
        get_key("/categories", Params::new()),
        get_key("/transactionsArchive", Params::new()),
    ];
    for (i, key) in keys.iter().enumerate() {
        cache.set(key.clone(), json!(i));
    }

    let pattern = Regex::new(r"^GET:/(transactions|stats)(/|\?|#|$)").unwrap();
    let removed = cache.invalidate_pattern(&pattern);

    assert_eq!(removed, 3);
    assert!(cache.get(&keys[0]).is_none());
    assert!(cache.get(&keys[1]).is_none());
    assert!(cache.get(&keys[2]).is_none());
    assert_eq!(cache.get(&keys[3]), Some(json!(3)));
    assert_eq!(cache.get(&keys[4]), Some(json!(4)));
    assert_eq!(cache.get(&keys[5]), Some(json!(5)));
}

#[test]
fn test_cleanup_sweeps_only_expired() {
    let (cache, clock) = cache_with_clock(Duration::from_secs(60));
    cache.set_with_ttl(get_key("/a", Params::new()), json!(1), Duration::from_secs(10));
    cache.set_with_ttl(get_key("/b", Params::new()), json!(2), Duration::from_secs(10));
    cache.set_with_ttl(get_key("/c", Params::new()), json!(3), Duration::from_secs(100));

    clock.advance(Duration::from_secs(30));
    assert_eq!(cache.cleanup(), 2);
    assert_eq!(cache.len(), 1);
    assert!(cache.contains(&get_key("/c", Params::new())));
}

#[test]
fn test_custom_payload_type() {
    #[derive(Clone, Debug, PartialEq)]
    struct Account {
        id: u32,
        balance: i64,
    }

    let cache = ResponseCacheBuilder::<Vec<Account>>::new().build();
    let key = get_key("/comptes", Params::new());
    cache.set(key.clone(), vec![Account { id: 1, balance: 50_000 }]);
    assert_eq!(cache.get(&key), Some(vec![Account { id: 1, balance: 50_000 }]));
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_task_sweeps_periodically() {
    let (cache, clock) = cache_with_clock(Duration::from_secs(1));
    cache.set(get_key("/stats", Params::new()), json!({}));

    let task = cache.spawn_cleanup(Duration::from_secs(600));
    clock.advance(Duration::from_secs(5));

    // Nothing runs before the first period elapses.
    tokio::time::sleep(Duration::from_secs(599)).await;
    assert_eq!(cache.len(), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(cache.len(), 0);
    assert!(task.is_running());

    task.stop();
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_task_exits_when_cache_dropped() {
    let (cache, _clock) = cache_with_clock(Duration::from_secs(1));
    let task = cache.spawn_cleanup(Duration::from_secs(10));
    drop(cache);

    tokio::time::sleep(Duration::from_secs(11)).await;
    tokio::task::yield_now().await;
    assert!(!task.is_running());
}
