// Connection helpers shared by the backup run and `doctor`
use anyhow::{Context, Result};
use sqlx::{Connection, PgConnection};
use std::time::Duration;
use tokio::time::timeout;
use url::Url;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens and closes a connection to prove the database is reachable.
pub async fn check_db_connection(db_url: &str) -> Result<()> {
    let conn = timeout(CONNECT_TIMEOUT, PgConnection::connect(db_url))
        .await
        .with_context(|| {
            format!(
                "Timed out after {}s connecting to {}",
                CONNECT_TIMEOUT.as_secs(),
                redact_url(db_url)
            )
        })?
        .with_context(|| format!("Failed to connect to {}", redact_url(db_url)))?;
    conn.close().await.context("Failed to close probe connection")?;
    Ok(())
}

/// Database name from the URL path, e.g. `app` for `postgres://h:5432/app`.
pub fn database_name(db_url: &str) -> Option<String> {
    let parsed = Url::parse(db_url).ok()?;
    let name = parsed.path().trim_start_matches('/');
    (!name.is_empty()).then(|| name.to_string())
}

/// Replaces the password in a connection string so it can be logged.
pub fn redact_url(db_url: &str) -> String {
    match Url::parse(db_url) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("****"));
            }
            parsed.to_string()
        }
        Err(_) => "<unparseable database url>".to_string(),
    }
}
