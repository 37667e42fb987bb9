use crate::{
    api,
    identity::{IdentityConfig, IdentityService, LogMailer, Mailer, MemorySessionCache, WebhookMailer},
    store::{is_memory_dsn, MemoryStore, PgStore, Store},
};
use anyhow::Result;
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub db_max_connections: u32,
    pub db_acquire_timeout_seconds: u64,
    pub apply_schema: bool,
    pub jwt_secret: SecretString,
    pub jwt_issuer: String,
    pub access_token_ttl_seconds: i64,
    pub session_ttl_seconds: i64,
    pub registration_code_ttl_seconds: i64,
    pub change_token_ttl_seconds: i64,
    pub skip_verification: bool,
    pub mail_webhook_url: Option<Url>,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the store cannot be reached, the service cannot be built, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let store = connect_store(&args).await?;

    let mailer: Arc<dyn Mailer> = match args.mail_webhook_url {
        Some(url) => {
            info!("Delivering mail through webhook {}", url);
            Arc::new(WebhookMailer::new(url)?)
        }
        None => {
            warn!("No mail webhook configured, outgoing mail is only logged");
            Arc::new(LogMailer)
        }
    };

    let config = IdentityConfig::new(args.jwt_secret)
        .with_jwt_issuer(args.jwt_issuer)
        .with_access_token_ttl_seconds(args.access_token_ttl_seconds)
        .with_session_ttl_seconds(args.session_ttl_seconds)
        .with_registration_code_ttl_seconds(args.registration_code_ttl_seconds)
        .with_change_token_ttl_seconds(args.change_token_ttl_seconds)
        .with_require_verification(!args.skip_verification);

    let service = IdentityService::new(
        config,
        store,
        Arc::new(MemorySessionCache::new()),
        mailer,
    )?;

    api::new(args.port, Arc::new(service)).await
}

async fn connect_store(args: &Args) -> Result<Arc<dyn Store>> {
    if is_memory_dsn(&args.dsn) {
        warn!("Using the in-process store, data is lost on restart");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let store = PgStore::connect(
        &args.dsn,
        args.db_max_connections,
        Duration::from_secs(args.db_acquire_timeout_seconds),
    )
    .await?;

    if args.apply_schema {
        store.apply_schema().await?;
        info!("Database schema applied");
    }

    Ok(Arc::new(store))
}
