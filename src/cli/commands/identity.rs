use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_JWT_SECRET: &str = "jwt-secret";
pub const ARG_JWT_ISSUER: &str = "jwt-issuer";
pub const ARG_ACCESS_TOKEN_TTL_SECONDS: &str = "access-token-ttl-seconds";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_REGISTRATION_CODE_TTL_SECONDS: &str = "registration-code-ttl-seconds";
pub const ARG_CHANGE_TOKEN_TTL_SECONDS: &str = "change-token-ttl-seconds";
pub const ARG_SKIP_VERIFICATION: &str = "skip-verification";

const MIN_SECRET_LEN: usize = 32;
// Ten years.
const MAX_TTL_SECONDS: i64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct Options {
    pub jwt_secret: SecretString,
    pub jwt_issuer: String,
    pub access_token_ttl_seconds: i64,
    pub session_ttl_seconds: i64,
    pub registration_code_ttl_seconds: i64,
    pub change_token_ttl_seconds: i64,
    pub skip_verification: bool,
}

impl Options {
    /// Parse identity arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the signing secret is missing or too short, or a TTL is out of range.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let secret = matches
            .get_one::<String>(ARG_JWT_SECRET)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        let secret = match secret {
            Some(value) => value,
            None => anyhow::bail!("missing required argument: --{ARG_JWT_SECRET}"),
        };
        if secret.len() < MIN_SECRET_LEN {
            anyhow::bail!("--{ARG_JWT_SECRET} must be at least {MIN_SECRET_LEN} bytes");
        }

        let ttl = |id: &str, default: i64| -> anyhow::Result<i64> {
            let value = matches.get_one::<i64>(id).copied().unwrap_or(default);
            if value <= 0 {
                anyhow::bail!("--{id} must be greater than zero");
            }
            if value > MAX_TTL_SECONDS {
                anyhow::bail!("--{id} must be at most {MAX_TTL_SECONDS} seconds");
            }
            Ok(value)
        };

        let jwt_issuer = matches
            .get_one::<String>(ARG_JWT_ISSUER)
            .cloned()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "accountd".to_string());

        Ok(Self {
            jwt_secret: SecretString::from(secret),
            jwt_issuer,
            access_token_ttl_seconds: ttl(ARG_ACCESS_TOKEN_TTL_SECONDS, 900)?,
            session_ttl_seconds: ttl(ARG_SESSION_TTL_SECONDS, 1_209_600)?,
            registration_code_ttl_seconds: ttl(ARG_REGISTRATION_CODE_TTL_SECONDS, 86_400)?,
            change_token_ttl_seconds: ttl(ARG_CHANGE_TOKEN_TTL_SECONDS, 1_800)?,
            skip_verification: matches.get_flag(ARG_SKIP_VERIFICATION),
        })
    }
}

pub fn with_args(command: Command) -> Command {
    let command = with_token_args(command);
    with_ttl_args(command)
}

fn with_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_JWT_SECRET)
                .long(ARG_JWT_SECRET)
                .help("HMAC secret used to sign access tokens")
                .env("ACCOUNTD_JWT_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_JWT_ISSUER)
                .long(ARG_JWT_ISSUER)
                .help("Issuer (iss) claim of access tokens")
                .env("ACCOUNTD_JWT_ISSUER")
                .default_value("accountd"),
        )
        .arg(
            Arg::new(ARG_SKIP_VERIFICATION)
                .long(ARG_SKIP_VERIFICATION)
                .help("Register accounts as verified without a confirmation code")
                .env("ACCOUNTD_SKIP_VERIFICATION")
                .action(ArgAction::SetTrue),
        )
}

fn with_ttl_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_TTL_SECONDS)
                .long(ARG_ACCESS_TOKEN_TTL_SECONDS)
                .help("Access token TTL in seconds")
                .env("ACCOUNTD_ACCESS_TOKEN_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session and refresh cookie TTL in seconds")
                .env("ACCOUNTD_SESSION_TTL_SECONDS")
                .default_value("1209600")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_REGISTRATION_CODE_TTL_SECONDS)
                .long(ARG_REGISTRATION_CODE_TTL_SECONDS)
                .help("Registration code TTL in seconds")
                .env("ACCOUNTD_REGISTRATION_CODE_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_CHANGE_TOKEN_TTL_SECONDS)
                .long(ARG_CHANGE_TOKEN_TTL_SECONDS)
                .help("Email update and password reset token TTL in seconds")
                .env("ACCOUNTD_CHANGE_TOKEN_TTL_SECONDS")
                .default_value("1800")
                .value_parser(clap::value_parser!(i64)),
        )
}
