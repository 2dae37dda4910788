//! Offline walkthrough of the client's coordination features.
//!
//! A simulated backend answers after a short delay and fails the first
//! statistics call with a 503. The dashboard then:
//!
//! 1. loads the same account list from five widgets at once (one call)
//! 2. reloads it (served from cache)
//! 3. loads statistics (retried after the 503)
//! 4. records a transaction (cached transactions, statistics and accounts are dropped)
//!
//! Run with `RUST_LOG=manjaka=debug cargo run -p manjaka-demos --example dashboard`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use manjaka::{
    ApiClient, ApiError, ApiRequest, ApiResponse, Method, Params, RetryPolicy, StatusCode,
    Transport,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

#[derive(Default)]
struct SimulatedBackend {
    calls: AtomicUsize,
    stats_calls: AtomicUsize,
}

#[async_trait]
impl Transport for SimulatedBackend {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(80)).await;

        let read = request.method == Method::GET;
        let data = match (read, request.resource()) {
            (true, Some("comptes")) => json!([
                { "id": 1, "nom": "Caisse", "solde": 125000 },
                { "id": 2, "nom": "Banque", "solde": 2480000 },
            ]),
            (true, Some("stats")) => {
                if self.stats_calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Ok(ApiResponse::new(StatusCode::SERVICE_UNAVAILABLE, ""));
                }
                json!({ "recettes": 3200000, "depenses": 594000 })
            }
            (false, Some("transactions")) => {
                let amount = request.body.as_ref().and_then(|body| body.get("montant"));
                json!({ "id": 77, "montant": amount })
            }
            _ => Value::Null,
        };
        let body = json!({ "success": true, "data": data }).to_string();
        Ok(ApiResponse::new(StatusCode::OK, body))
    }
}

#[derive(Debug, Deserialize)]
struct Account {
    id: u32,
    nom: String,
    solde: i64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("manjaka=info")),
        )
        .init();

    let backend = Arc::new(SimulatedBackend::default());
    let client = ApiClient::builder(backend.clone()).build();
    let mut refresh = client.subscribe();

    println!("=== Five widgets load the accounts at once ===");
    let widgets =
        join_all((0..5).map(|_| client.get::<Vec<Account>>("/comptes", Params::new()))).await;
    for accounts in widgets {
        let accounts = accounts?;
        println!("widget sees {} accounts", accounts.len());
    }
    println!("backend calls so far: {}", backend.calls.load(Ordering::SeqCst));

    tokio::time::sleep(Duration::from_millis(200)).await;
    println!("\n=== Reload (cache) ===");
    for account in client.get::<Vec<Account>>("/comptes", Params::new()).await? {
        println!("#{} {:<8} {:>10}", account.id, account.nom, account.solde);
    }
    println!("backend calls so far: {}", backend.calls.load(Ordering::SeqCst));

    println!("\n=== Statistics (first attempt fails with 503) ===");
    let retry = RetryPolicy::default();
    println!("retrying up to {} times", retry.max_retries());
    let stats: Value = client.get("/stats", Params::new()).await?;
    println!("stats: {stats}");

    println!("\n=== Record a transaction ===");
    let created: Value = client
        .post(
            "/transactions",
            &json!({ "compte_id": 1, "montant": -18000, "libelle": "Fournitures" }),
        )
        .await?;
    println!("created: {created}");
    while let Ok(event) = refresh.try_recv() {
        println!("refresh: {event:?}");
    }
    println!("cached reads left: {}", client.cache().len());

    Ok(())
}
