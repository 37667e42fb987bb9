//! Maps validated CLI arguments to the server action.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{identity, mail, store, ARG_DSN, ARG_PORT};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;

    let store_opts = store::Options::parse(matches)?;
    let identity_opts = identity::Options::parse(matches)?;
    let mail_opts = mail::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        db_max_connections: store_opts.max_connections,
        db_acquire_timeout_seconds: store_opts.acquire_timeout_seconds,
        apply_schema: store_opts.apply_schema,
        jwt_secret: identity_opts.jwt_secret,
        jwt_issuer: identity_opts.jwt_issuer,
        access_token_ttl_seconds: identity_opts.access_token_ttl_seconds,
        session_ttl_seconds: identity_opts.session_ttl_seconds,
        registration_code_ttl_seconds: identity_opts.registration_code_ttl_seconds,
        change_token_ttl_seconds: identity_opts.change_token_ttl_seconds,
        skip_verification: identity_opts.skip_verification,
        mail_webhook_url: mail_opts.webhook_url,
    }))
}
