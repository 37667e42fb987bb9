use clap::{Arg, ArgAction, ArgMatches, Command};

pub const ARG_DB_MAX_CONNECTIONS: &str = "db-max-connections";
pub const ARG_DB_ACQUIRE_TIMEOUT_SECONDS: &str = "db-acquire-timeout-seconds";
pub const ARG_APPLY_SCHEMA: &str = "apply-schema";

#[derive(Debug, Clone)]
pub struct Options {
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub apply_schema: bool,
}

impl Options {
    /// Parse store arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the pool size is zero.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let max_connections = matches
            .get_one::<u32>(ARG_DB_MAX_CONNECTIONS)
            .copied()
            .unwrap_or(5);
        if max_connections == 0 {
            anyhow::bail!("--{ARG_DB_MAX_CONNECTIONS} must be greater than zero");
        }

        Ok(Self {
            max_connections,
            acquire_timeout_seconds: matches
                .get_one::<u64>(ARG_DB_ACQUIRE_TIMEOUT_SECONDS)
                .copied()
                .unwrap_or(5),
            apply_schema: matches.get_flag(ARG_APPLY_SCHEMA),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_DB_MAX_CONNECTIONS)
                .long(ARG_DB_MAX_CONNECTIONS)
                .help("Maximum number of pooled database connections")
                .env("ACCOUNTD_DB_MAX_CONNECTIONS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_DB_ACQUIRE_TIMEOUT_SECONDS)
                .long(ARG_DB_ACQUIRE_TIMEOUT_SECONDS)
                .help("Seconds to wait for a pooled connection")
                .env("ACCOUNTD_DB_ACQUIRE_TIMEOUT_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_APPLY_SCHEMA)
                .long(ARG_APPLY_SCHEMA)
                .help("Create tables and indexes on startup")
                .env("ACCOUNTD_APPLY_SCHEMA")
                .action(ArgAction::SetTrue),
        )
}
