use clap::{Arg, ArgMatches, Command};
use url::Url;

pub const ARG_MAIL_WEBHOOK_URL: &str = "mail-webhook-url";

#[derive(Debug, Clone)]
pub struct Options {
    pub webhook_url: Option<Url>,
}

impl Options {
    /// Parse mail arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the webhook URL is not an http(s) URL.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let raw = matches
            .get_one::<String>(ARG_MAIL_WEBHOOK_URL)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty());

        let webhook_url = match raw {
            Some(value) => {
                let url = Url::parse(value)
                    .map_err(|err| anyhow::anyhow!("invalid --{ARG_MAIL_WEBHOOK_URL}: {err}"))?;
                if !matches!(url.scheme(), "http" | "https") {
                    anyhow::bail!("--{ARG_MAIL_WEBHOOK_URL} must use http or https");
                }
                Some(url)
            }
            None => None,
        };

        Ok(Self { webhook_url })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_MAIL_WEBHOOK_URL)
            .long(ARG_MAIL_WEBHOOK_URL)
            .help("HTTP endpoint that receives outgoing mail as JSON (unset: log only)")
            .env("ACCOUNTD_MAIL_WEBHOOK_URL"),
    )
}
