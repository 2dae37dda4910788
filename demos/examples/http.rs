//! Talks to a running backend over HTTP.
//!
//! The base URL comes from `MANJAKA_API_URL` (default
//! `http://localhost:5000/api`); an optional YAML configuration file can be
//! passed as the first argument. Credentials are read from `MANJAKA_EMAIL` and
//! `MANJAKA_PASSWORD`.
//!
//! ```text
//! MANJAKA_API_URL=https://finance.example.org/api \
//! MANJAKA_EMAIL=tresorier@example.org MANJAKA_PASSWORD=... \
//!     cargo run -p manjaka-demos --example http
//! ```

use std::sync::Arc;

use manjaka::{ClientConfig, Params};
use manjaka_core::{MemorySessionStore, NoopNavigator};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("manjaka=debug,manjaka_reqwest=debug")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => ClientConfig::from_yaml(&std::fs::read_to_string(path)?)?,
        None => ClientConfig::from_env()?,
    };
    println!("backend: {}", config.base_url);

    let session = Arc::new(MemorySessionStore::new());
    let client = manjaka_reqwest::connect(config, session, Arc::new(NoopNavigator));

    if let (Ok(email), Ok(password)) = (
        std::env::var("MANJAKA_EMAIL"),
        std::env::var("MANJAKA_PASSWORD"),
    ) {
        let user = client
            .login(&json!({ "email": email, "mot_de_passe": password }))
            .await?;
        println!("logged in as {user}");
    }

    let accounts: Value = client.get("/comptes", Params::new()).await?;
    println!("accounts: {accounts}");

    let recent: Value = client
        .get("/transactions", Params::new().with("limit", 10))
        .await?;
    println!("recent transactions: {recent}");

    client.logout();
    Ok(())
}
